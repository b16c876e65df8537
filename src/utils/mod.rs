use anyhow::{anyhow, Result};

/// Install a `tracing` subscriber for embedding applications.
///
/// Does nothing if a global subscriber is already set.
pub fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose { "debug" } else { "info" };

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();

    if let Err(e) = installed {
        tracing::debug!("Logging already configured: {}", e);
    }
    Ok(())
}

/// Format number with commas
pub fn format_number(n: usize) -> String {
    let digits = n.to_string();
    let mut result = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }

    result
}

/// Validation utilities
pub mod validation {
    use super::*;

    /// Validate that a probability lies in `(0, 1]`
    pub fn unit_interval(value: f64, name: &str) -> Result<()> {
        if value > 0.0 && value <= 1.0 {
            Ok(())
        } else {
            Err(anyhow!("{} must be in (0, 1], got {}", name, value))
        }
    }
}

/// Seeded random tensors
pub mod random {
    use burn::prelude::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    /// Create RNG with fixed seed
    pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(seed)
    }

    /// Uniform `[0, 1)` tensor of the given shape, reproducible across backends
    pub fn random_input<B: Backend>(shape: [usize; 6], seed: u64, device: &B::Device) -> Tensor<B, 6> {
        let mut rng = seeded_rng(seed);
        let size: usize = shape.iter().product();
        let values: Vec<f32> = (0..size).map(|_| rng.gen::<f32>()).collect();

        Tensor::<B, 1>::from_floats(values.as_slice(), device).reshape(shape)
    }
}
