//! Full state-vector extraction for small chains.
//!
//! Contracting every tensor of a chain over its bonds gives the state vector
//! in the computational basis. This grows as 2<sup>N</sup>, so extraction is
//! refused beyond [`AmplitudeConfig::max_sites`] sites.
//!
//! Amplitudes are ordered with site 0 as the most significant digit: the
//! configuration `(s_0, s_1, ..., s_{N-1})` of a qubit chain sits at index
//! `Σ_k s_k 2^(N-1-k)`, which is the sample printed as `"s_0 s_1 ... s_{N-1}"`
//! read as a binary number.

use itertools::Itertools;
use log::debug;
use num_traits::{ Float, Zero };
use thiserror::Error;
use crate::{
    mps::{ ChainIndex, ChainState },
    tensor::{ Elem, Tensor, TensorError },
};

pub use crate::config::AmplitudeConfig;

#[derive(Debug, Error)]
pub enum AmplitudeError {
    /// Returned when the chain is too long for its state vector to be formed.
    #[error("cannot extract amplitudes for {n} sites (max {max})")]
    TooManySites { n: usize, max: usize },

    /// Returned when the contracted chain has zero norm.
    #[error("contracted chain has zero norm")]
    ZeroNorm,

    /// Returned when contraction leaves the wrong set of open indices.
    #[error("contracted chain has unexpected open indices")]
    OpenIndices,

    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),
}
use AmplitudeError::*;
pub type AmpResult<T> = Result<T, AmplitudeError>;

/// The normalized state vector of a chain.
#[derive(Clone, Debug, PartialEq)]
pub struct Amplitudes<A> {
    dims: Vec<usize>,
    amps: Vec<A>,
}

impl<A> Amplitudes<A>
where A: Elem
{
    /// Contract all of `state` and read off every amplitude, renormalizing so
    /// that Σ|a|² = 1.
    pub fn extract(state: &ChainState<A>, config: &AmplitudeConfig)
        -> AmpResult<Self>
    {
        let n = state.n();
        if n > config.max_sites {
            return Err(TooManySites { n, max: config.max_sites });
        }
        let psi: Tensor<ChainIndex, A> =
            state.tensors().iter()
            .try_fold(
                Tensor::new_scalar(A::one()),
                |acc, t| acc.contract(t),
            )?;
        if psi.rank() != n { return Err(OpenIndices); }
        let (psi, norm) = psi.into_normalized();
        if norm <= A::Real::zero() || !Float::is_finite(norm) {
            return Err(ZeroNorm);
        }

        let dims: Vec<usize> = state.phys_dims().to_vec();
        let phys: Vec<ChainIndex> =
            (0..n).filter_map(|k| state.physical_index(k)).collect();
        let mut amps: Vec<A> = Vec::with_capacity(dims.iter().product());
        let mut vals: Vec<(ChainIndex, usize)> =
            phys.iter().map(|p| (*p, 0)).collect();
        for outcomes in dims.iter().map(|d| 0..*d).multi_cartesian_product() {
            vals.iter_mut().zip(outcomes)
                .for_each(|((_, v), c)| { *v = c; });
            amps.push(psi.get(&vals)?);
        }
        debug!(n = n, len = amps.len(); "extracted amplitudes");
        Ok(Self { dims, amps })
    }

    /// Return the number of sites.
    pub fn n(&self) -> usize { self.dims.len() }

    /// Return the number of amplitudes.
    pub fn len(&self) -> usize { self.amps.len() }

    /// Return `true` if there are no amplitudes.
    pub fn is_empty(&self) -> bool { self.amps.is_empty() }

    /// Return all amplitudes in configuration order.
    pub fn amplitudes(&self) -> &[A] { &self.amps }

    /// Return the amplitude at configuration index `index`.
    pub fn get(&self, index: usize) -> Option<A> {
        self.amps.get(index).copied()
    }

    /// Return the amplitude of a configuration given as per-site outcomes.
    pub fn get_config(&self, config: &[usize]) -> Option<A> {
        self.index_of(config).and_then(|k| self.get(k))
    }

    /// Return the configuration index of per-site outcomes, with site 0 as the
    /// most significant digit.
    ///
    /// Returns `None` if `config` has the wrong length or holds an outcome out
    /// of range for its site.
    pub fn index_of(&self, config: &[usize]) -> Option<usize> {
        if config.len() != self.dims.len() { return None; }
        config.iter().zip(&self.dims)
            .try_fold(0, |acc, (s, d)| (s < d).then_some(acc * d + s))
    }

    /// Return the per-site outcomes of configuration index `index`.
    pub fn config_of(&self, mut index: usize) -> Option<Vec<usize>> {
        if index >= self.amps.len() { return None; }
        let mut config: Vec<usize> = vec![0; self.dims.len()];
        for (c, d) in config.iter_mut().zip(&self.dims).rev() {
            *c = index % d;
            index /= d;
        }
        Some(config)
    }
}

impl<A> Amplitudes<A>
where
    A: Elem,
    A::Real: Into<f64>,
{
    /// Return the real part of every amplitude.
    pub fn signed(&self) -> Vec<f64> {
        self.amps.iter().map(|a| a.re().into()).collect()
    }

    /// Return the modulus of every amplitude.
    pub fn unsigned(&self) -> Vec<f64> {
        self.amps.iter().map(|a| a.abs().into()).collect()
    }

    /// Return the Born-rule probability of every configuration.
    pub fn probs(&self) -> Vec<f64> {
        self.amps.iter().map(|a| a.abs_sq().into()).collect()
    }

    /// Return Σ|a|².
    pub fn norm_sqr(&self) -> f64 {
        self.amps.iter().map(|a| a.abs_sq().into()).sum()
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;
    use num_complex::Complex64 as C64;
    use rand::{ SeedableRng, rngs::StdRng };
    use super::*;

    #[test]
    fn product_state_amplitudes() {
        let state: ChainState<f64> = ChainState::product([0, 0]).unwrap();
        let amps = Amplitudes::extract(&state, &AmplitudeConfig::default()).unwrap();
        assert_eq!(amps.signed(), vec![1.0, 0.0, 0.0, 0.0]);
        assert_approx_eq!(f64, amps.norm_sqr(), 1.0);
    }

    #[test]
    fn bit_order_round_trip() {
        let state: ChainState<f64> = ChainState::product([0, 1]).unwrap();
        let amps = Amplitudes::extract(&state, &AmplitudeConfig::default()).unwrap();
        assert_eq!(amps.index_of(&[0, 1]), Some(1));
        assert_eq!(amps.config_of(1), Some(vec![0, 1]));
        assert_approx_eq!(f64, amps.get(1).unwrap(), 1.0);
        assert_approx_eq!(f64, amps.get_config(&[1, 0]).unwrap(), 0.0);
        assert_eq!(amps.index_of(&[0, 2]), None);
        assert_eq!(amps.index_of(&[0]), None);
    }

    #[test]
    fn from_vector_round_trip() {
        let psi: Vec<f64> = vec![0.1, -0.3, 0.0, 0.5, 0.2, 0.0, -0.4, 0.6];
        let norm = psi.iter().map(|a| a * a).sum::<f64>().sqrt();
        let state: ChainState<f64> = ChainState::from_vector(3, psi.clone(), None).unwrap();
        let amps = Amplitudes::extract(&state, &AmplitudeConfig::default()).unwrap();
        for (a, b) in amps.signed().into_iter().zip(&psi) {
            assert_approx_eq!(f64, a, b / norm, epsilon = 1e-12);
        }
    }

    #[test]
    fn unnormalized_chain_is_renormalized() {
        let t: Tensor<ChainIndex, f64> = Tensor::from_elems(
            [ChainIndex::physical(0, 2)],
            vec![3.0, -4.0],
        ).unwrap();
        let state = ChainState::new([t]).unwrap();
        let amps = Amplitudes::extract(&state, &AmplitudeConfig::default()).unwrap();
        assert_approx_eq!(f64, amps.signed()[1], -0.8, epsilon = 1e-12);
        assert_approx_eq!(f64, amps.unsigned()[1], 0.8, epsilon = 1e-12);
        assert_approx_eq!(f64, amps.norm_sqr(), 1.0);
    }

    #[test]
    fn complex_amplitudes() {
        let psi: Vec<C64> = vec![
            C64::new(0.0, 0.6),
            C64::new(0.8, 0.0),
        ];
        let state: ChainState<C64> = ChainState::from_vector(1, psi, None).unwrap();
        let amps = Amplitudes::extract(&state, &AmplitudeConfig::default()).unwrap();
        let probs = amps.probs();
        assert_approx_eq!(f64, probs[0], 0.36, epsilon = 1e-12);
        assert_approx_eq!(f64, probs[1], 0.64, epsilon = 1e-12);
        assert_approx_eq!(f64, amps.unsigned()[0], 0.6, epsilon = 1e-12);
    }

    #[test]
    fn random_state_is_normalized() {
        let mut rng = StdRng::seed_from_u64(10546);
        let state: ChainState<f64> = ChainState::random(8, 6, &mut rng).unwrap();
        let amps = Amplitudes::extract(&state, &AmplitudeConfig::default()).unwrap();
        assert_eq!(amps.len(), 256);
        assert_approx_eq!(f64, amps.norm_sqr(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn too_many_sites() {
        let state: ChainState<f64> = ChainState::product([0; 4]).unwrap();
        let config = AmplitudeConfig { max_sites: 3 };
        assert!(matches!(
            Amplitudes::extract(&state, &config),
            Err(TooManySites { n: 4, max: 3 })
        ));
    }

    #[test]
    fn zero_chain_is_rejected() {
        let t: Tensor<ChainIndex, f64> =
            Tensor::zeros([ChainIndex::physical(0, 2)]).unwrap();
        let state = ChainState::new([t]).unwrap();
        assert!(matches!(
            Amplitudes::extract(&state, &AmplitudeConfig::default()),
            Err(ZeroNorm)
        ));
    }
}
