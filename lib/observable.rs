//! Exact expectation values of products of single-site spin operators.
//!
//! Expectation values are computed by sweeping a transfer matrix along the
//! chain. Sites without an operator are traced out the same way as in
//! [`Environment`][crate::environment::Environment]; on sites with an operator
//! `O`, the operator is inserted between the ket and bra tensors:
//!
//! ```text
//!   .- T[k] -
//!   |   |
//!   |   O      O[a, b] = ⟨a|O|b⟩, with `b` on the ket side
//!   |   |
//!   '- T[k]* -
//! ```
//!
//! Spin-1/2 basis states are labeled so that outcome 0 is spin-up
//! (S<sup>z</sup> = +1/2) and outcome 1 is spin-down.

use ndarray as nd;
use thiserror::Error;
use crate::{
    mps::{ ChainError, ChainIndex, ChainState },
    tensor::{ Elem, Tensor, TensorError },
};

#[derive(Debug, Error)]
pub enum ObservableError {
    /// Returned when an operator is placed on a site outside the chain.
    #[error("site {site} is out of range for a chain of {n} sites")]
    SiteOutOfRange { site: usize, n: usize },

    /// Returned when more than one operator is placed on the same site.
    #[error("more than one operator placed on site {0}")]
    DuplicateSite(usize),

    /// Returned when a spin-1/2 operator is placed on a site whose physical
    /// dimension is not 2.
    #[error("site {site} has physical dimension {dim}; spin-1/2 operators require 2")]
    NonQubitSite { site: usize, dim: usize },

    /// Returned when the chain has zero norm.
    #[error("chain has zero norm")]
    ZeroNorm,

    /// Returned when the full contraction does not reduce to a scalar.
    #[error("contraction did not reduce to a scalar")]
    NonScalar,

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),
}
use ObservableError::*;
pub type ObsResult<T> = Result<T, ObservableError>;

/// Single-site spin-1/2 operators.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SpinOp {
    /// Identity
    Id,
    /// S<sup>z</sup>
    Sz,
    /// Raising operator S<sup>+</sup>, taking outcome 1 to outcome 0.
    SPlus,
    /// Lowering operator S<sup>-</sup>, taking outcome 0 to outcome 1.
    SMinus,
}

impl SpinOp {
    /// Return the matrix element ⟨a|O|b⟩.
    pub fn elem<A>(&self, a: usize, b: usize) -> A
    where A: Elem
    {
        let half = A::one() / (A::one() + A::one());
        match (self, a, b) {
            (Self::Id, a, b) if a == b => A::one(),
            (Self::Sz, 0, 0) => half,
            (Self::Sz, 1, 1) => -half,
            (Self::SPlus, 0, 1) => A::one(),
            (Self::SMinus, 1, 0) => A::one(),
            _ => A::zero(),
        }
    }

    /// Return the operator as a dense 2×2 matrix.
    pub fn matrix(&self) -> nd::Array2<f64> {
        nd::Array2::from_shape_fn((2, 2), |(a, b)| self.elem(a, b))
    }

    // O[s', s] as a tensor over the primed and unprimed physical indices of a
    // site
    fn tensor<A>(&self, p: ChainIndex) -> ObsResult<Tensor<ChainIndex, A>>
    where A: Elem
    {
        Ok(Tensor::new([p.prime(), p], |ab| self.elem(ab[0], ab[1]))?)
    }
}

/// Compute ⟨ψ|O|ψ⟩ / ⟨ψ|ψ⟩ for a product `O` of single-site operators.
///
/// Sites not listed in `ops` carry the identity.
pub fn expectation<A>(state: &ChainState<A>, ops: &[(usize, SpinOp)])
    -> ObsResult<A>
where A: Elem
{
    let n = state.n();
    for (k, (site, _)) in ops.iter().enumerate() {
        if *site >= n { return Err(SiteOutOfRange { site: *site, n }); }
        if ops[..k].iter().any(|(s, _)| s == site) {
            return Err(DuplicateSite(*site));
        }
        let dim = state.phys_dims()[*site];
        if dim != 2 { return Err(NonQubitSite { site: *site, dim }); }
    }

    let mut num: Tensor<ChainIndex, A> = Tensor::new_scalar(A::one());
    let mut den: Tensor<ChainIndex, A> = Tensor::new_scalar(A::one());
    for (k, t) in state.tensors().iter().enumerate() {
        let bra = state.bra(k)?;
        den = den.contract(t)?.contract(&bra)?;
        num =
            match ops.iter().find(|(site, _)| *site == k) {
                Some((_, op)) => {
                    let p =
                        state.physical_index(k)
                        .ok_or(SiteOutOfRange { site: k, n })?;
                    num.contract(t)?
                        .contract(&op.tensor(p)?)?
                        .contract(&state.bra_open(k)?)?
                },
                None => num.contract(t)?.contract(&bra)?,
            };
    }
    let num = num.into_scalar().ok_or(NonScalar)?;
    let den = den.into_scalar().ok_or(NonScalar)?;
    if den == A::zero() { return Err(ZeroNorm); }
    Ok(num / den)
}

/// Compute ⟨S<sup>z</sup><sub>j</sub> S<sup>z</sup><sub>j+1</sub>⟩.
pub fn sz_sz<A>(state: &ChainState<A>, j: usize) -> ObsResult<f64>
where
    A: Elem,
    A::Real: Into<f64>,
{
    expectation(state, &[(j, SpinOp::Sz), (j + 1, SpinOp::Sz)])
        .map(|z| z.re().into())
}

/// Compute the nearest-neighbor correlation ⟨S<sup>z</sup><sub>1</sub>
/// S<sup>z</sup><sub>2</sub>⟩ between the second and third sites, written to
/// output files as `S2S3`.
pub fn s2s3<A>(state: &ChainState<A>) -> ObsResult<f64>
where
    A: Elem,
    A::Real: Into<f64>,
{
    sz_sz(state, 1)
}

/// Compute the energy of the spin-1/2 Heisenberg chain with open boundaries,
///
/// H = J Σ<sub>j</sub> [S<sup>z</sup><sub>j</sub> S<sup>z</sup><sub>j+1</sub>
///   + (S<sup>+</sup><sub>j</sub> S<sup>-</sup><sub>j+1</sub>
///   + S<sup>-</sup><sub>j</sub> S<sup>+</sup><sub>j+1</sub>) / 2],
///
/// with coupling `j_coupling` (J > 0 is antiferromagnetic).
pub fn heisenberg_energy<A>(state: &ChainState<A>, j_coupling: f64)
    -> ObsResult<f64>
where
    A: Elem,
    A::Real: Into<f64>,
{
    let mut energy: f64 = 0.0;
    for j in 0..state.n().saturating_sub(1) {
        let zz: f64 = sz_sz(state, j)?;
        let pm: f64 =
            expectation(state, &[(j, SpinOp::SPlus), (j + 1, SpinOp::SMinus)])?
            .re().into();
        let mp: f64 =
            expectation(state, &[(j, SpinOp::SMinus), (j + 1, SpinOp::SPlus)])?
            .re().into();
        energy += zz + 0.5 * (pm + mp);
    }
    Ok(j_coupling * energy)
}
