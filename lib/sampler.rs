//! Sequential conditional sampling of computational-basis measurements.
//!
//! A single sample is drawn by sweeping the chain from the last site to the
//! first. At each site the reduced density matrix of that site is formed,
//! conditioned on the outcomes already drawn to its right:
//!
//! ```text
//!   .- E[i-1] -- T[i] --- ket ---.
//!   |            |               |
//!   |            p               |     (only the suffix of the chain to the
//!   |            p'              |      right of site i is ever projected)
//!   |            |               |
//!   '---------- T[i]* --- bra ---'
//! ```
//!
//! where `ket` and `bra` hold the already-projected tensors of sites
//! `i + 1..N`. The probability of reading a 0 on site `i` is then the `(0, 0)`
//! element of this matrix divided by the probability of the outcomes drawn so
//! far. After an outcome is chosen, `T[i]` and its conjugate are projected onto
//! it and absorbed into the suffix, and the sweep moves one site to the left.
//!
//! A sweep is an explicit fold over [`Suffix`] values driven by
//! [`Sampler::step`]; [`Sampler::sample`] runs the whole fold with random
//! numbers drawn from a caller-supplied [`Rng`].

use std::fmt;
use log::{ debug, trace };
use num_complex::ComplexFloat;
use rand::{ Rng, SeedableRng, rngs::StdRng };
use rayon::prelude::*;
use thiserror::Error;
use crate::{
    config::ConfigError,
    environment::Environment,
    mps::{ ChainError, ChainIndex, ChainState },
    tensor::{ Elem, Tensor, TensorError },
};

pub use crate::config::SamplerConfig;

#[derive(Debug, Error)]
pub enum SamplerError {
    /// Returned when the environment was not built from the chain being
    /// sampled.
    #[error("environment does not match chain: expected {expected} environments, got {got}")]
    EnvMismatch { expected: usize, got: usize },

    /// Returned when a site does not have a two-dimensional physical index.
    #[error("site {site} has physical dimension {dim}; sampling requires qubits")]
    NonQubitSite { site: usize, dim: usize },

    /// Returned when the chain does not satisfy ⟨ψ|ψ⟩ = 1 within tolerance.
    #[error("chain is not normalized: ⟨ψ|ψ⟩ = {0}")]
    NotNormalized(f64),

    /// Returned when a sweep step is requested for a site outside the chain.
    #[error("site {0} is out of range")]
    SiteOutOfRange(usize),

    /// Returned when a conditional probability falls outside of
    /// `[-prob_tol, 1 + prob_tol]`, which signals a corrupted or unnormalized
    /// chain.
    #[error("conditional probability {prob} at site {site} is out of bounds")]
    ProbabilityOutOfBounds { site: usize, prob: f64 },

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),
}
use SamplerError::*;
pub type SamplerResult<T> = Result<T, SamplerError>;

/// A single measurement record.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    bits: Vec<u8>,
    prob: f64,
}

impl Sample {
    /// Create a new sample from per-site outcomes and the probability of their
    /// occurrence.
    pub fn new(bits: Vec<u8>, prob: f64) -> Self { Self { bits, prob } }

    /// Return the outcome on each site, indexed by site.
    pub fn bits(&self) -> &[u8] { &self.bits }

    /// Return the number of sites.
    pub fn n(&self) -> usize { self.bits.len() }

    /// Return the probability of the sample, i.e. the product of the
    /// conditional probabilities realized during its sweep.
    pub fn prob(&self) -> f64 { self.prob }

    /// Return the index of the sample's configuration in the amplitude vector,
    /// reading site 0 as the most significant bit.
    ///
    /// Returns `None` if the index does not fit in a `usize`, which can only
    /// happen for chains longer than `usize::BITS` sites.
    pub fn index(&self) -> Option<usize> {
        self.bits.iter()
            .try_fold(0_usize, |acc, b| {
                acc.checked_mul(2).map(|a| a | usize::from(*b))
            })
    }

    /// Return the sample as a string of `'0'` and `'1'` without separators.
    pub fn to_bitstring(&self) -> String {
        self.bits.iter().map(|b| if *b == 0 { '0' } else { '1' }).collect()
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.bits.len();
        for (k, b) in self.bits.iter().enumerate() {
            write!(f, "{b}")?;
            if k + 1 < n { write!(f, " ")?; }
        }
        Ok(())
    }
}

/// Result of a single sweep step.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SiteOutcome {
    /// Site the step acted on.
    pub site: usize,
    /// Conditional probability of reading 0, after clamping into `[0, 1]`.
    pub prob_zero: f64,
    /// Realized outcome.
    pub bit: u8,
    /// Conditional probability of the realized outcome.
    pub prob: f64,
}

/// Working state of a sweep: the projected tensors of every site already
/// visited, and the probability of the outcomes drawn so far.
///
/// `ket` is open on the unprimed bond to the left of the last visited site and
/// `bra` on its primed copy. A fresh suffix holds scalar 1s, so the first step
/// of a sweep sees no right-hand context.
#[derive(Clone, Debug)]
pub struct Suffix<A> {
    ket: Tensor<ChainIndex, A>,
    bra: Tensor<ChainIndex, A>,
    norm: f64,
}

impl<A> Suffix<A>
where A: Elem
{
    /// Create the suffix that starts a sweep.
    pub fn new() -> Self {
        Self {
            ket: Tensor::new_scalar(A::one()),
            bra: Tensor::new_scalar(A::one()),
            norm: 1.0,
        }
    }

    /// Return the probability of the outcomes drawn so far.
    pub fn norm(&self) -> f64 { self.norm }
}

impl<A> Default for Suffix<A>
where A: Elem
{
    fn default() -> Self { Self::new() }
}

/// Draws samples from a normalized chain with the help of its precomputed
/// environments.
///
/// Both the chain and the environments are borrowed immutably, so any number
/// of samplers (or threads) can share them.
#[derive(Copy, Clone)]
pub struct Sampler<'a, A>
where A: ComplexFloat
{
    state: &'a ChainState<A>,
    env: &'a Environment<A>,
    config: SamplerConfig,
}

impl<'a, A> Sampler<'a, A>
where
    A: Elem,
    A::Real: Into<f64>,
{
    /// Create a new sampler.
    ///
    /// Fails if `config` is invalid, `env` does not belong to `state`, any site
    /// is not a qubit, or `state` is not normalized to within
    /// `config.norm_tol`.
    pub fn new(
        state: &'a ChainState<A>,
        env: &'a Environment<A>,
        config: SamplerConfig,
    ) -> SamplerResult<Self>
    {
        config.validate()?;
        let n = state.n();
        if env.len() != n - 1 {
            return Err(EnvMismatch { expected: n - 1, got: env.len() });
        }
        for b in 0..n - 1 {
            let matches =
                state.bond_index(b)
                .zip(env.get(b))
                .is_some_and(|(idx, e)| e.has_index(&idx) && e.has_index(&idx.prime()));
            if !matches {
                return Err(EnvMismatch { expected: n - 1, got: env.len() });
            }
        }
        if let Some((site, dim)) =
            state.phys_dims().iter().copied().enumerate().find(|(_, d)| *d != 2)
        {
            return Err(NonQubitSite { site, dim });
        }
        let norm: f64 = env.norm_sqr().into();
        if (norm - 1.0).abs() > config.norm_tol {
            return Err(NotNormalized(norm));
        }
        debug!(
            n = n,
            max_bond_dim = state.max_bond_dim(),
            certainty_eps = config.certainty_eps,
            prob_tol = config.prob_tol;
            "initialized sampler"
        );
        Ok(Self { state, env, config })
    }

    /// Return the number of sites in the chain.
    pub fn n(&self) -> usize { self.state.n() }

    /// Compute the conditional probability of reading 0 on `site`, given the
    /// outcomes already absorbed into `suffix`.
    ///
    /// Values within `config.prob_tol` of `[0, 1]` are clamped into it; values
    /// any further out fail with [`SamplerError::ProbabilityOutOfBounds`].
    pub fn prob_zero(&self, suffix: &Suffix<A>, site: usize) -> SamplerResult<f64> {
        let t = self.state.tensor(site).ok_or(SiteOutOfRange(site))?;
        let p = self.state.physical_index(site).ok_or(SiteOutOfRange(site))?;
        let ket_side =
            if site > 0 {
                let e = self.env.get(site - 1).ok_or(SiteOutOfRange(site))?;
                e.contract(t)?.contract(&suffix.ket)?
            } else {
                t.contract(&suffix.ket)?
            };
        let bra_side = self.state.bra_open(site)?.contract(&suffix.bra)?;
        let rho = ket_side.contract(&bra_side)?;
        let rho00: f64 = rho.get(&[(p, 0), (p.prime(), 0)])?.re().into();
        let prob = rho00 / suffix.norm;
        let tol = self.config.prob_tol;
        if !(-tol..=1.0 + tol).contains(&prob) {
            return Err(ProbabilityOutOfBounds { site, prob });
        }
        Ok(prob.clamp(0.0, 1.0))
    }

    /// Perform a single step of a sweep on `site` with uniform random number
    /// `r`, returning the updated suffix and the outcome.
    ///
    /// The outcome is 0 if the probability of 0 is nonzero and at least `r`,
    /// or if it exceeds `1 - config.certainty_eps`; otherwise it is 1. Site 0
    /// is the last site of a sweep, so its tensors are not absorbed into the
    /// returned suffix.
    pub fn step(&self, suffix: Suffix<A>, site: usize, r: f64)
        -> SamplerResult<(Suffix<A>, SiteOutcome)>
    {
        let prob_zero = self.prob_zero(&suffix, site)?;
        let bit: u8 =
            if (prob_zero > 0.0 && r <= prob_zero)
                || prob_zero > 1.0 - self.config.certainty_eps
            { 0 } else { 1 };
        let prob = if bit == 0 { prob_zero } else { 1.0 - prob_zero };
        trace!(site = site, prob_zero = prob_zero, r = r, bit = bit; "sweep step");
        let Suffix { mut ket, mut bra, norm } = suffix;
        if site > 0 {
            let t = self.state.tensor(site).ok_or(SiteOutOfRange(site))?;
            let p = self.state.physical_index(site).ok_or(SiteOutOfRange(site))?;
            let mut proj: Tensor<ChainIndex, A> = Tensor::zeros([p])?;
            proj.set(&[(p, usize::from(bit))], A::one())?;
            let mut proj_bra: Tensor<ChainIndex, A> = Tensor::zeros([p.prime()])?;
            proj_bra.set(&[(p.prime(), usize::from(bit))], A::one())?;
            ket = ket.contract(t)?.contract(&proj)?;
            bra = bra.contract(&self.state.bra_open(site)?)?.contract(&proj_bra)?;
        }
        let outcome = SiteOutcome { site, prob_zero, bit, prob };
        Ok((Suffix { ket, bra, norm: norm * prob }, outcome))
    }

    /// Draw a single sample.
    pub fn sample<R>(&self, rng: &mut R) -> SamplerResult<Sample>
    where R: Rng + ?Sized
    {
        let n = self.state.n();
        let mut bits: Vec<u8> = vec![0; n];
        let suffix =
            (0..n).rev()
            .try_fold(Suffix::new(), |suffix, site| {
                let r: f64 = rng.gen();
                let (next, outcome) = self.step(suffix, site, r)?;
                bits[site] = outcome.bit;
                Ok::<_, SamplerError>(next)
            })?;
        Ok(Sample { bits, prob: suffix.norm })
    }

    /// Draw `m` samples in sequence.
    pub fn sample_many<R>(&self, m: usize, rng: &mut R)
        -> SamplerResult<Vec<Sample>>
    where R: Rng + ?Sized
    {
        debug!(m = m; "sampling");
        let mut samples: Vec<Sample> = Vec::with_capacity(m);
        for _ in 0..m {
            samples.push(self.sample(rng)?);
        }
        Ok(samples)
    }
}

impl<'a, A> Sampler<'a, A>
where
    A: Elem,
    A::Real: Into<f64> + Send + Sync,
{
    /// Draw `m` samples in parallel.
    ///
    /// The `k`-th sample is drawn with its own generator seeded from
    /// `seed + k`, so the result depends only on `seed` and not on how the
    /// work is distributed among threads.
    pub fn sample_par(&self, m: usize, seed: u64) -> SamplerResult<Vec<Sample>> {
        debug!(m = m, seed = seed; "sampling in parallel");
        (0..m).into_par_iter()
            .map(|k| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(k as u64));
                self.sample(&mut rng)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;
    use rand::rngs::mock::StepRng;
    use super::*;

    // StepRng yields `val` on every call; rand maps the top 53 bits of a u64
    // onto [0, 1)
    fn const_rng(r: f64) -> StepRng {
        StepRng::new(((r * (1_u64 << 53) as f64) as u64) << 11, 0)
    }

    fn bell() -> ChainState<f64> {
        let h = std::f64::consts::FRAC_1_SQRT_2;
        ChainState::from_vector(2, [h, 0.0, 0.0, h], None).unwrap()
    }

    fn single(p0: f64) -> ChainState<f64> {
        let t = Tensor::from_elems(
            [ChainIndex::physical(0, 2)],
            vec![p0.sqrt(), (1.0 - p0).max(0.0).sqrt()],
        ).unwrap();
        ChainState::new([t]).unwrap()
    }

    #[test]
    fn const_rng_values() {
        let mut rng = const_rng(0.25);
        assert_eq!(rng.gen::<f64>(), 0.25);
        let mut rng = StepRng::new(u64::MAX, 0);
        assert_eq!(rng.gen::<f64>(), 1.0 - f64::EPSILON / 2.0);
    }

    #[test]
    fn product_state_always_zero() {
        let state: ChainState<f64> = ChainState::product([0, 0]).unwrap();
        let env = Environment::build(&state).unwrap();
        let sampler = Sampler::new(&state, &env, SamplerConfig::default()).unwrap();
        for r in [0.0, 0.5, 0.999] {
            let sample = sampler.sample(&mut const_rng(r)).unwrap();
            assert_eq!(sample.to_string(), "0 0");
            assert_approx_eq!(f64, sample.prob(), 1.0);
        }
        let sample = sampler.sample(&mut StepRng::new(u64::MAX, 0)).unwrap();
        assert_eq!(sample.to_string(), "0 0");
    }

    #[test]
    fn bell_state_steps() {
        let state = bell();
        let env = Environment::build(&state).unwrap();
        let sampler = Sampler::new(&state, &env, SamplerConfig::default()).unwrap();

        let (suffix, first) = sampler.step(Suffix::new(), 1, 0.25).unwrap();
        assert_approx_eq!(f64, first.prob_zero, 0.5, epsilon = 1e-12);
        assert_eq!(first.bit, 0);
        assert_approx_eq!(f64, suffix.norm(), 0.5, epsilon = 1e-12);
        let (suffix, second) = sampler.step(suffix, 0, 0.99).unwrap();
        assert_approx_eq!(f64, second.prob_zero, 1.0, epsilon = 1e-12);
        assert_eq!(second.bit, 0);
        assert_approx_eq!(f64, suffix.norm(), 0.5, epsilon = 1e-12);

        let (suffix, first) = sampler.step(Suffix::new(), 1, 0.75).unwrap();
        assert_eq!(first.bit, 1);
        let (_, second) = sampler.step(suffix, 0, 0.01).unwrap();
        assert_approx_eq!(f64, second.prob_zero, 0.0, epsilon = 1e-12);
        assert_eq!(second.bit, 1);
    }

    #[test]
    fn bell_state_only_correlated_outcomes() {
        let state = bell();
        let env = Environment::build(&state).unwrap();
        let sampler = Sampler::new(&state, &env, SamplerConfig::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(10546);
        let samples = sampler.sample_many(1000, &mut rng).unwrap();
        assert!(samples.iter().all(|s| s.bits()[0] == s.bits()[1]));
        assert!(samples.iter().any(|s| s.to_string() == "0 0"));
        assert!(samples.iter().any(|s| s.to_string() == "1 1"));
        assert!(samples.iter().all(|s| (s.prob() - 0.5).abs() < 1e-12));
    }

    #[test]
    fn certainty_clamp_boundary() {
        let config = SamplerConfig::default();
        let eps = config.certainty_eps;
        let delta = 1e-6;

        let above = single(1.0 - eps + delta);
        let env = Environment::build(&above).unwrap();
        let sampler = Sampler::new(&above, &env, config).unwrap();
        let sample = sampler.sample(&mut StepRng::new(u64::MAX, 0)).unwrap();
        assert_eq!(sample.bits(), &[0]);

        let below = single(1.0 - eps - delta);
        let env = Environment::build(&below).unwrap();
        let sampler = Sampler::new(&below, &env, config).unwrap();
        let sample = sampler.sample(&mut StepRng::new(u64::MAX, 0)).unwrap();
        assert_eq!(sample.bits(), &[1]);
        assert_approx_eq!(f64, sample.prob(), eps + delta, epsilon = 1e-12);
    }

    #[test]
    fn zero_probability_never_selected() {
        let state = single(0.0);
        let env = Environment::build(&state).unwrap();
        let sampler = Sampler::new(&state, &env, SamplerConfig::default()).unwrap();
        let sample = sampler.sample(&mut StepRng::new(0, 0)).unwrap();
        assert_eq!(sample.bits(), &[1]);
        assert_approx_eq!(f64, sample.prob(), 1.0);
    }

    #[test]
    fn near_unit_probability_is_clamped() {
        let t = Tensor::from_elems(
            [ChainIndex::physical(0, 2)],
            vec![(1.0_f64 + 5e-5).sqrt(), 0.0],
        ).unwrap();
        let state = ChainState::new([t]).unwrap();
        let env = Environment::build(&state).unwrap();
        let config = SamplerConfig { norm_tol: 1e-3, ..SamplerConfig::default() };
        let sampler = Sampler::new(&state, &env, config).unwrap();
        let p0 = sampler.prob_zero(&Suffix::new(), 0).unwrap();
        assert_eq!(p0, 1.0);
    }

    #[test]
    fn corrupted_state_is_rejected() {
        let t = Tensor::from_elems(
            [ChainIndex::physical(0, 2)],
            vec![2.0_f64, 0.0],
        ).unwrap();
        let state = ChainState::new([t]).unwrap();
        let env = Environment::build(&state).unwrap();
        assert!(matches!(
            Sampler::new(&state, &env, SamplerConfig::default()),
            Err(NotNormalized(_))
        ));

        let config = SamplerConfig { norm_tol: 10.0, ..SamplerConfig::default() };
        let sampler = Sampler::new(&state, &env, config).unwrap();
        let res = sampler.sample(&mut StdRng::seed_from_u64(0));
        assert!(matches!(
            res,
            Err(ProbabilityOutOfBounds { site: 0, prob }) if (prob - 4.0).abs() < 1e-12
        ));
    }

    #[test]
    fn mismatched_environment_is_rejected() {
        let state = bell();
        let other: ChainState<f64> = ChainState::product([0, 0, 0]).unwrap();
        let env = Environment::build(&other).unwrap();
        assert!(matches!(
            Sampler::new(&state, &env, SamplerConfig::default()),
            Err(EnvMismatch { expected: 1, got: 2 })
        ));
    }

    #[test]
    fn qutrit_is_rejected() {
        let t = Tensor::from_elems(
            [ChainIndex::physical(0, 3)],
            vec![1.0_f64, 0.0, 0.0],
        ).unwrap();
        let state = ChainState::new([t]).unwrap();
        let env = Environment::build(&state).unwrap();
        assert!(matches!(
            Sampler::new(&state, &env, SamplerConfig::default()),
            Err(NonQubitSite { site: 0, dim: 3 })
        ));
    }

    #[test]
    fn seeded_sampling_is_reproducible() {
        let mut rng = StdRng::seed_from_u64(10546);
        let state: ChainState<f64> = ChainState::random(6, 4, &mut rng).unwrap();
        let env = Environment::build(&state).unwrap();
        let sampler = Sampler::new(&state, &env, SamplerConfig::default()).unwrap();

        let a = sampler.sample_many(50, &mut StdRng::seed_from_u64(1)).unwrap();
        let b = sampler.sample_many(50, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(a, b);

        let c = sampler.sample_par(50, 7).unwrap();
        let d = sampler.sample_par(50, 7).unwrap();
        assert_eq!(c, d);
        let first = sampler.sample(&mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(c[0], first);
    }

    #[test]
    fn sample_index_reads_site_zero_first() {
        let sample = Sample::new(vec![0, 1], 1.0);
        assert_eq!(sample.index(), Some(1));
        assert_eq!(sample.to_string(), "0 1");
        let sample = Sample::new(vec![1, 1, 0], 1.0);
        assert_eq!(sample.index(), Some(6));
        assert_eq!(sample.to_bitstring(), "110");
    }

    #[test]
    fn sample_index_overflow() {
        let bits = usize::BITS as usize;
        let mut leading_zero = vec![1; bits];
        leading_zero[0] = 0;
        assert_eq!(Sample::new(leading_zero, 1.0).index(), Some(usize::MAX >> 1));
        assert_eq!(Sample::new(vec![1; bits], 1.0).index(), Some(usize::MAX));
        assert_eq!(Sample::new(vec![1; bits + 1], 1.0).index(), None);
        let mut high = vec![0; bits + 1];
        high[1] = 1;
        assert_eq!(Sample::new(high.clone(), 1.0).index(), Some(1 << (bits - 1)));
        high[0] = 1;
        assert_eq!(Sample::new(high, 1.0).index(), None);
    }
}
