//! Left environments of a [`ChainState`].
//!
//! The `i`-th environment is the contraction of sites `0..=i` of the chain with
//! their conjugates, tracing out every physical index:
//!
//! ```text
//!   .- T[0] --- T[1] --- ... --- T[i] --- b[i]
//!   |   |        |                |
//!   |   |        |                |
//!   '- T[0]* -- T[1]* -- ... --- T[i]* -- b[i]'
//! ```
//!
//! leaving only the bond `b[i]` and its primed copy open. Environments are
//! built once per chain in a single left-to-right pass and are read-only
//! afterward, so they can be shared freely between samplers and threads.

use log::debug;
use num_complex::ComplexFloat;
use thiserror::Error;
use crate::{
    mps::{ ChainError, ChainIndex, ChainState },
    tensor::{ Elem, Tensor, TensorError },
};

#[derive(Debug, Error)]
pub enum EnvError {
    /// Returned when a contraction leaves the wrong set of open indices.
    #[error("error in environment construction: unexpected open indices at site {0}")]
    OpenIndices(usize),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),
}
use EnvError::*;
pub type EnvResult<T> = Result<T, EnvError>;

/// Cumulative partial traces `E[0..N-2]` of a chain, plus the full
/// contraction ⟨ψ|ψ⟩.
///
/// `E[-1]` is implicitly the scalar 1 and is not stored.
#[derive(Clone, Debug, PartialEq)]
pub struct Environment<A>
where A: ComplexFloat
{
    envs: Vec<Tensor<ChainIndex, A>>,
    norm_sqr: A::Real,
}

impl<A> Environment<A>
where A: Elem
{
    /// Build all environments of `state`.
    ///
    /// The result is bit-for-bit identical on every call with the same chain.
    pub fn build(state: &ChainState<A>) -> EnvResult<Self> {
        let n = state.n();
        let mut envs: Vec<Tensor<ChainIndex, A>> =
            Vec::with_capacity(n.saturating_sub(1));
        let mut acc: Tensor<ChainIndex, A> = Tensor::new_scalar(A::one());
        for (k, t) in state.tensors().iter().enumerate() {
            acc = acc.contract(t)?.contract(&state.bra(k)?)?;
            if k + 1 < n {
                let expected = [
                    state.bond_index(k).ok_or(OpenIndices(k))?,
                    state.bond_index(k).ok_or(OpenIndices(k))?.prime(),
                ];
                if acc.rank() != 2 || !expected.iter().all(|b| acc.has_index(b)) {
                    return Err(OpenIndices(k));
                }
                envs.push(acc.clone());
            }
        }
        let norm_sqr = acc.into_scalar().ok_or(OpenIndices(n - 1))?.re();
        debug!(n = n, envs = envs.len(); "built environments");
        Ok(Self { envs, norm_sqr })
    }

    /// Return the `i`-th environment, if it exists.
    pub fn get(&self, i: usize) -> Option<&Tensor<ChainIndex, A>> {
        self.envs.get(i)
    }

    /// Return the number of stored environments (`N - 1`).
    pub fn len(&self) -> usize { self.envs.len() }

    /// Return `true` if no environments are stored, i.e. the chain has a
    /// single site.
    pub fn is_empty(&self) -> bool { self.envs.is_empty() }

    /// Return ⟨ψ|ψ⟩ as computed during construction.
    pub fn norm_sqr(&self) -> A::Real { self.norm_sqr }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;
    use rand::{ SeedableRng, rngs::StdRng };
    use super::*;

    #[test]
    fn product_state_environment_is_one() {
        let state: ChainState<f64> = ChainState::product([0, 0]).unwrap();
        let env = Environment::build(&state).unwrap();
        assert_eq!(env.len(), 1);
        let e0 = env.get(0).unwrap();
        let b = state.bond_index(0).unwrap();
        assert_approx_eq!(f64, e0.get(&[(b, 0), (b.prime(), 0)]).unwrap(), 1.0);
        assert_approx_eq!(f64, env.norm_sqr(), 1.0);
    }

    #[test]
    fn bell_state_environment_is_diagonal() {
        let h = std::f64::consts::FRAC_1_SQRT_2;
        let state: ChainState<f64> =
            ChainState::from_vector(2, [h, 0.0, 0.0, h], None).unwrap();
        let env = Environment::build(&state).unwrap();
        let e0 = env.get(0).unwrap();
        let b = state.bond_index(0).unwrap();
        // T[0] has orthonormal columns, so E[0] is the identity on the bond
        for v in 0..2 {
            assert_approx_eq!(f64, e0.get(&[(b, v), (b.prime(), v)]).unwrap(), 1.0, epsilon = 1e-12);
        }
        assert_approx_eq!(f64, e0.get(&[(b, 0), (b.prime(), 1)]).unwrap(), 0.0, epsilon = 1e-12);
        assert_approx_eq!(f64, e0.get(&[(b, 1), (b.prime(), 0)]).unwrap(), 0.0, epsilon = 1e-12);
        assert_approx_eq!(f64, env.norm_sqr(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn rebuild_is_identical() {
        let mut rng = StdRng::seed_from_u64(10546);
        let state: ChainState<f64> = ChainState::random(7, 5, &mut rng).unwrap();
        let env1 = Environment::build(&state).unwrap();
        let env2 = Environment::build(&state).unwrap();
        assert_eq!(env1, env2);
        assert_eq!(env1.len(), 6);
        assert_approx_eq!(f64, env1.norm_sqr(), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn single_site_has_no_environments() {
        let state: ChainState<f64> = ChainState::product([1]).unwrap();
        let env = Environment::build(&state).unwrap();
        assert!(env.is_empty());
        assert_approx_eq!(f64, env.norm_sqr(), 1.0);
    }
}
