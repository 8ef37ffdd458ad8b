//! Run parameters.
//!
//! Everything here is a plain struct with a `Default` implementation and a
//! `validate` method; nothing is read from files or the environment.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Returned when zero samples are requested.
    #[error("config error: number of samples must be positive")]
    ZeroSamples,

    /// Returned when the configured number of sites does not match the chain.
    #[error("config error: expected {expected} sites, but the chain has {got}")]
    SiteMismatch { expected: usize, got: usize },

    /// Returned when a tolerance is negative, NaN, or otherwise out of range.
    #[error("config error: invalid value {val} for {name}")]
    InvalidTolerance { name: &'static str, val: f64 },
}
use ConfigError::*;
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level parameters of a sampling run.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RunConfig {
    /// Number of samples to draw.
    pub num_samples: usize,
    /// Number of sites in the chain.
    pub n: usize,
    /// Whether to also extract and store the full amplitude vector.
    pub store_amplitudes: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self { num_samples: 20000, n: 5, store_amplitudes: true }
    }
}

impl RunConfig {
    /// Check that at least one sample is requested and that the number of
    /// sites matches `chain_len`.
    pub fn validate(&self, chain_len: usize) -> ConfigResult<()> {
        if self.num_samples == 0 { return Err(ZeroSamples); }
        if self.n != chain_len {
            return Err(SiteMismatch { expected: self.n, got: chain_len });
        }
        Ok(())
    }
}

/// Parameters of a [`Sampler`][crate::sampler::Sampler].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SamplerConfig {
    /// A conditional probability of 0 above `1 - certainty_eps` selects 0
    /// regardless of the random number drawn.
    pub certainty_eps: f64,
    /// Conditional probabilities are allowed to stray this far outside of
    /// `[0, 1]` before a sweep fails.
    pub prob_tol: f64,
    /// Allowed deviation of ⟨ψ|ψ⟩ from 1.
    pub norm_tol: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self { certainty_eps: 1e-4, prob_tol: 1e-4, norm_tol: 1e-6 }
    }
}

impl SamplerConfig {
    /// Check that `certainty_eps` lies in `[0, 1)` and that both remaining
    /// tolerances are finite and non-negative.
    pub fn validate(&self) -> ConfigResult<()> {
        if !(0.0..1.0).contains(&self.certainty_eps) {
            return Err(InvalidTolerance {
                name: "certainty_eps",
                val: self.certainty_eps,
            });
        }
        if !(self.prob_tol >= 0.0 && self.prob_tol.is_finite()) {
            return Err(InvalidTolerance { name: "prob_tol", val: self.prob_tol });
        }
        if !(self.norm_tol >= 0.0 && self.norm_tol.is_finite()) {
            return Err(InvalidTolerance { name: "norm_tol", val: self.norm_tol });
        }
        Ok(())
    }
}

/// Parameters of amplitude extraction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AmplitudeConfig {
    /// Largest chain for which the full state vector may be formed.
    pub max_sites: usize,
}

impl Default for AmplitudeConfig {
    fn default() -> Self { Self { max_sites: 20 } }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_config_validation() {
        let config = RunConfig::default();
        assert!(config.validate(5).is_ok());
        assert!(matches!(
            config.validate(4),
            Err(SiteMismatch { expected: 5, got: 4 })
        ));
        let config = RunConfig { num_samples: 0, ..RunConfig::default() };
        assert!(matches!(config.validate(5), Err(ZeroSamples)));
    }

    #[test]
    fn sampler_config_validation() {
        assert!(SamplerConfig::default().validate().is_ok());
        let config = SamplerConfig { certainty_eps: 1.0, ..SamplerConfig::default() };
        assert!(matches!(
            config.validate(),
            Err(InvalidTolerance { name: "certainty_eps", .. })
        ));
        let config = SamplerConfig { prob_tol: f64::NAN, ..SamplerConfig::default() };
        assert!(matches!(
            config.validate(),
            Err(InvalidTolerance { name: "prob_tol", .. })
        ));
        let config = SamplerConfig { norm_tol: -1.0, ..SamplerConfig::default() };
        assert!(config.validate().is_err());
    }
}
