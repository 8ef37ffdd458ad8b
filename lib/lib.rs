#![allow(non_snake_case)]

//! Tools for simulating projective measurements of one-dimensional spin chains
//! represented as matrix product states.
//!
//! The core of the crate is [`Sampler`][sampler::Sampler], which draws
//! bitstrings from the Born-rule distribution of a normalized
//! [`ChainState`][mps::ChainState] one site at a time, reusing the partial
//! traces held in an [`Environment`][environment::Environment]. For small
//! chains, [`Amplitudes`][amplitude::Amplitudes] recovers the full state
//! vector so that sampled frequencies can be checked against exact
//! probabilities.
//!
//! ```
//! use rand::{ SeedableRng, rngs::StdRng };
//! use mps_sampler::{
//!     amplitude::{ AmplitudeConfig, Amplitudes },
//!     environment::Environment,
//!     mps::ChainState,
//!     sampler::{ Sampler, SamplerConfig },
//! };
//!
//! // (|00⟩ + |11⟩) / √2
//! let h = std::f64::consts::FRAC_1_SQRT_2;
//! let state: ChainState<f64> =
//!     ChainState::from_vector(2, [h, 0.0, 0.0, h], None).unwrap();
//! let env = Environment::build(&state).unwrap();
//! let sampler = Sampler::new(&state, &env, SamplerConfig::default()).unwrap();
//!
//! let mut rng = StdRng::seed_from_u64(10546);
//! let samples = sampler.sample_many(100, &mut rng).unwrap();
//! assert!(samples.iter().all(|s| s.to_string() == "0 0" || s.to_string() == "1 1"));
//!
//! let amps = Amplitudes::extract(&state, &AmplitudeConfig::default()).unwrap();
//! assert!((amps.norm_sqr() - 1.0).abs() < 1e-12);
//! ```

use num_complex::{ ComplexFloat, Complex };
use num_traits::{ Float, Zero };

pub mod tensor;
pub mod mps;
pub mod environment;
pub mod sampler;
pub mod amplitude;
pub mod observable;
pub mod verify;
pub mod output;
pub mod config;

/// Extension trait for [`ComplexFloat`], covering both real and complex
/// element types.
pub trait ComplexFloatExt: ComplexFloat {
    /// Convert from `Self::Real`.
    ///
    /// Should adhere to the usual relationship between ordinary complex and
    /// real numbers, i.e. the result should have imaginary part equal to zero.
    fn from_re(x: Self::Real) -> Self;

    /// Return the squared modulus, `|z|²`.
    fn abs_sq(self) -> Self::Real;
}

impl<T> ComplexFloatExt for Complex<T>
where
    Complex<T>: ComplexFloat<Real = T>,
    T: Zero + Float,
{
    fn from_re(x: Self::Real) -> Self {
        Self { re: x, im: <Self::Real as Zero>::zero() }
    }

    fn abs_sq(self) -> Self::Real { self.re * self.re + self.im * self.im }
}

macro_rules! impl_complexfloatext_real {
    ( $( $t:ty ),* ) => {
        $(
            impl ComplexFloatExt for $t {
                fn from_re(x: $t) -> Self { x }

                fn abs_sq(self) -> $t { self * self }
            }
        )*
    }
}
impl_complexfloatext_real!(f32, f64);
