//! Matrix product states on an open chain.
//!
//! A [`ChainState`] holds one tensor per particle. Every tensor carries exactly
//! one physical index and the bond indices it shares with its nearest
//! neighbors, so that contracting all tensors over their bonds yields the full
//! *N*-particle state vector.
//!
//! ```text
//!        .-bond 0-.      .-bond 1-.           .-bond n-2-.
//!        V        V      V        V           V          V
//!   T[0] ---------- T[1] ---------- ... ------------------- T[n-1]
//!    |               |                                        |
//!    | <- physical   | <- physical                            | <- physical
//!         site 0          site 1                                   site n-1
//! ```
//!
//! Indices are tagged with their role ([`ChainIndex::Physical`] or
//! [`ChainIndex::Bond`]) and position in the chain when tensors are created,
//! and [`ChainState::new`] checks that every tensor has exactly the indices its
//! position requires. Conjugated ("bra") copies of tensors are distinguished
//! from the originals by priming indices, so that contractions between the two
//! sides pair up only the intended axes.

use std::fmt;
use nalgebra as na;
use num_traits::{ Float, One, Zero };
use rand::{ Rng, distributions::{ Distribution, Standard } };
use thiserror::Error;
use crate::tensor::{ Elem, Idx, Tensor, TensorError };

#[derive(Debug, Error)]
pub enum ChainError {
    /// Returned when attempting to create a new chain of less than 1 particle.
    #[error("error in chain creation: cannot create for an empty system")]
    EmptySystem,

    /// Returned when a tensor holds an index that doesn't belong at its
    /// position in the chain.
    #[error("error in chain creation: unexpected index {index} on site {site}")]
    UnexpectedIndex { site: usize, index: String },

    /// Returned when a tensor is missing its physical index.
    #[error("error in chain creation: site {0} has no physical index")]
    MissingPhysical(usize),

    /// Returned when a tensor is missing one of its bond indices.
    #[error("error in chain creation: site {site} is missing bond {link}")]
    MissingBond { site: usize, link: usize },

    /// Returned when the two tensors sharing a bond disagree on its dimension.
    #[error("error in chain creation: bond {link} has dimension {left} on the left and {right} on the right")]
    BondMismatch { link: usize, left: usize, right: usize },

    /// Returned when attempting to create a new chain from a state vector whose
    /// length doesn't match the number of particles.
    #[error("error in chain creation: state vector length doesn't match 2^n")]
    StateIncompatibleShape,

    /// Returned when attempting to create a new chain from a state vector with
    /// zero norm.
    #[error("error in chain creation: state vector has zero norm")]
    ZeroState,

    /// Returned when a product state is requested with an invalid basis state.
    #[error("error in chain creation: invalid basis state {val} on site {site}")]
    InvalidBasisState { site: usize, val: usize },

    /// Returned when a singular value decomposition does not produce singular
    /// vectors.
    #[error("error in chain creation: singular value decomposition failed")]
    SvdFailure,

    /// Returned when the chain does not satisfy ⟨ψ|ψ⟩ = 1 within tolerance.
    #[error("chain is not normalized: ⟨ψ|ψ⟩ = {0}")]
    NotNormalized(f64),

    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),
}
use ChainError::*;
pub type ChainResult<T> = Result<T, ChainError>;

/// An index of a tensor in a [`ChainState`], tagged with its role.
///
/// Bond `link` joins sites `link` and `link + 1`. Primed indices belong to
/// the conjugated (bra) side of a contraction and never match their unprimed
/// counterparts.
///
/// ```text
///              Bond { link: k - 1, .. }   Bond { link: k, .. }
///                         |                   |
///                         V                   V
///              ... ------------- T[k] -------------- ...
///                                 |
///                                 | <- Physical { site: k, .. }
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChainIndex {
    /// Physical degree of freedom of the `site`-th particle.
    Physical { site: usize, dim: usize, prime: bool },
    /// Virtual bond between particles `link` and `link + 1`.
    Bond { link: usize, dim: usize, prime: bool },
}

impl Idx for ChainIndex {
    fn dim(&self) -> usize {
        match self {
            Self::Physical { dim, .. } => *dim,
            Self::Bond { dim, .. } => *dim,
        }
    }

    fn label(&self) -> String {
        match self {
            Self::Physical { site, prime, .. } =>
                format!("s{site}{}", if *prime { "'" } else { "" }),
            Self::Bond { link, prime, .. } =>
                format!("b{link}{}", if *prime { "'" } else { "" }),
        }
    }
}

impl ChainIndex {
    /// Create an unprimed physical index.
    pub fn physical(site: usize, dim: usize) -> Self {
        Self::Physical { site, dim, prime: false }
    }

    /// Create an unprimed bond index.
    pub fn bond(link: usize, dim: usize) -> Self {
        Self::Bond { link, dim, prime: false }
    }

    /// Return `true` if `self` is `Bond`.
    pub fn is_bond(&self) -> bool { matches!(self, Self::Bond { .. }) }

    /// Return a primed copy of `self`.
    pub fn prime(self) -> Self {
        match self {
            Self::Physical { site, dim, .. } =>
                Self::Physical { site, dim, prime: true },
            Self::Bond { link, dim, .. } =>
                Self::Bond { link, dim, prime: true },
        }
    }

    /// Return a primed copy of `self` if `self` is a bond index, otherwise
    /// return `self` unchanged.
    pub fn prime_bond(self) -> Self {
        if self.is_bond() { self.prime() } else { self }
    }
}

/// A matrix product state on an open chain of `n` particles.
///
/// The chain is immutable once built: everything downstream (environments,
/// samplers, amplitude extraction) only reads its tensors and derives new,
/// temporary ones.
#[derive(Clone, Debug, PartialEq)]
pub struct ChainState<A> {
    // Number of particles.
    n: usize, // ≥ 1
    // Tensors for each particle. Tensor `k` holds `Physical { site: k }` and
    // the unprimed bonds `k - 1` (if k > 0) and `k` (if k < n - 1).
    data: Vec<Tensor<ChainIndex, A>>, // length n
    // Physical dimension of each particle.
    phys: Vec<usize>, // length n
    // Dimension of each bond.
    bonds: Vec<usize>, // length n - 1
}

impl<A> ChainState<A>
where A: Elem
{
    /// Build a chain from a sequence of site tensors, checking that every
    /// tensor carries exactly the indices its position requires and that
    /// neighboring tensors agree on the dimensions of their shared bond.
    ///
    /// Normalization is not checked here; see [`Self::check_normalized`].
    pub fn new<I>(tensors: I) -> ChainResult<Self>
    where I: IntoIterator<Item = Tensor<ChainIndex, A>>
    {
        let data: Vec<Tensor<ChainIndex, A>> = tensors.into_iter().collect();
        if data.is_empty() { return Err(EmptySystem); }
        let n = data.len();
        let mut phys: Vec<usize> = Vec::with_capacity(n);
        let mut bonds: Vec<usize> = Vec::with_capacity(n - 1);
        for (k, t) in data.iter().enumerate() {
            let mut phys_k: Option<usize> = None;
            let mut left: Option<usize> = None;
            let mut right: Option<usize> = None;
            for idx in t.indices() {
                let slot =
                    match *idx {
                        ChainIndex::Physical { site, dim, prime: false }
                            if site == k => { (&mut phys_k, dim) },
                        ChainIndex::Bond { link, dim, prime: false }
                            if k > 0 && link == k - 1 => { (&mut left, dim) },
                        ChainIndex::Bond { link, dim, prime: false }
                            if link == k && k + 1 < n => { (&mut right, dim) },
                        _ => {
                            return Err(UnexpectedIndex {
                                site: k,
                                index: idx.label(),
                            });
                        },
                    };
                if slot.0.replace(slot.1).is_some() {
                    return Err(UnexpectedIndex { site: k, index: idx.label() });
                }
            }
            let dk = phys_k.ok_or(MissingPhysical(k))?;
            phys.push(dk);
            if k > 0 {
                let dl = left.ok_or(MissingBond { site: k, link: k - 1 })?;
                if dl != bonds[k - 1] {
                    return Err(BondMismatch {
                        link: k - 1,
                        left: bonds[k - 1],
                        right: dl,
                    });
                }
            }
            if k + 1 < n {
                let dr = right.ok_or(MissingBond { site: k, link: k })?;
                bonds.push(dr);
            }
        }
        Ok(Self { n, data, phys, bonds })
    }

    /// Build the product state ∣s<sub>0</sub> s<sub>1</sub> … s<sub>n-1</sub>⟩
    /// of `n` qubits, with all bond dimensions equal to 1.
    ///
    /// Fails if no basis states are given or any of them is not 0 or 1.
    pub fn product<I>(basis_states: I) -> ChainResult<Self>
    where I: IntoIterator<Item = usize>
    {
        let basis_states: Vec<usize> = basis_states.into_iter().collect();
        let n = basis_states.len();
        if n == 0 { return Err(EmptySystem); }
        let tensors: Vec<Tensor<ChainIndex, A>> =
            basis_states.iter().copied().enumerate()
            .map(|(k, s)| {
                if s >= 2 { return Err(InvalidBasisState { site: k, val: s }); }
                let mut idxs: Vec<ChainIndex> = Vec::with_capacity(3);
                if k > 0 { idxs.push(ChainIndex::bond(k - 1, 1)); }
                idxs.push(ChainIndex::physical(k, 2));
                if k + 1 < n { idxs.push(ChainIndex::bond(k, 1)); }
                let vals: Vec<(ChainIndex, usize)> =
                    idxs.iter()
                    .map(|idx| (*idx, if idx.is_bond() { 0 } else { s }))
                    .collect();
                let mut t = Tensor::zeros(idxs)?;
                t.set(&vals, A::one())?;
                Ok(t)
            })
            .collect::<ChainResult<_>>()?;
        Self::new(tensors)
    }

    /// Generate a random, normalized chain of `n` qubits whose bond dimensions
    /// are at most `bond_dim`.
    ///
    /// Elements are drawn uniformly from `[-1, 1)` before normalization. Fails
    /// if `n == 0` or `bond_dim == 0`.
    pub fn random<R>(n: usize, bond_dim: usize, rng: &mut R) -> ChainResult<Self>
    where
        R: Rng + ?Sized,
        Standard: Distribution<A::Real>,
    {
        if n == 0 { return Err(EmptySystem); }
        if bond_dim == 0 { return Err(TensorError::ZeroDimIndex.into()); }
        // no bond needs to be larger than the smaller of the two Hilbert
        // spaces it separates
        let bonds: Vec<usize> =
            (0..n - 1)
            .map(|b| {
                let left = 1_usize.checked_shl((b + 1) as u32).unwrap_or(usize::MAX);
                let right = 1_usize.checked_shl((n - b - 1) as u32).unwrap_or(usize::MAX);
                bond_dim.min(left).min(right)
            })
            .collect();
        let two = A::Real::one() + A::Real::one();
        let tensors: Vec<Tensor<ChainIndex, A>> =
            (0..n)
            .map(|k| {
                let mut idxs: Vec<ChainIndex> = Vec::with_capacity(3);
                if k > 0 { idxs.push(ChainIndex::bond(k - 1, bonds[k - 1])); }
                idxs.push(ChainIndex::physical(k, 2));
                if k + 1 < n { idxs.push(ChainIndex::bond(k, bonds[k])); }
                Tensor::new(idxs, |_| {
                    A::from_re(rng.gen::<A::Real>() * two - A::Real::one())
                })
            })
            .collect::<Result<_, _>>()?;
        let mut state = Self::new(tensors)?;
        let norm = state.norm_sqr()?;
        if norm <= A::Real::zero() { return Err(ZeroState); }
        let first = state.data[0].clone().scale(A::from_re(Float::recip(Float::sqrt(norm))));
        state.data[0] = first;
        Ok(state)
    }

    /// Return the number of particles.
    pub fn n(&self) -> usize { self.n }

    /// Return a reference to the `k`-th site tensor, if it exists.
    pub fn tensor(&self, k: usize) -> Option<&Tensor<ChainIndex, A>> {
        self.data.get(k)
    }

    /// Return a reference to all site tensors.
    pub fn tensors(&self) -> &[Tensor<ChainIndex, A>] { &self.data }

    /// Return the (unprimed) physical index of the `k`-th site, if it exists.
    pub fn physical_index(&self, k: usize) -> Option<ChainIndex> {
        self.phys.get(k).map(|d| ChainIndex::physical(k, *d))
    }

    /// Return the (unprimed) `b`-th bond index, if it exists.
    pub fn bond_index(&self, b: usize) -> Option<ChainIndex> {
        self.bonds.get(b).map(|d| ChainIndex::bond(b, *d))
    }

    /// Return the physical dimensions of all sites.
    pub fn phys_dims(&self) -> &[usize] { &self.phys }

    /// Return the dimensions of all bonds.
    pub fn bond_dims(&self) -> &[usize] { &self.bonds }

    /// Return the largest bond dimension in the chain, or 1 for a single site.
    pub fn max_bond_dim(&self) -> usize {
        self.bonds.iter().copied().max().unwrap_or(1)
    }

    /// Return the conjugate of the `k`-th site tensor with its bonds primed,
    /// for use on the bra side of a contraction that traces out the physical
    /// index.
    ///
    /// *Panics* if `k` is out of bounds.
    pub(crate) fn bra(&self, k: usize) -> ChainResult<Tensor<ChainIndex, A>> {
        Ok(self.data[k].conj().map_indices(ChainIndex::prime_bond)?)
    }

    /// Return the conjugate of the `k`-th site tensor with all indices primed,
    /// leaving the physical index open against the ket side.
    ///
    /// *Panics* if `k` is out of bounds.
    pub(crate) fn bra_open(&self, k: usize) -> ChainResult<Tensor<ChainIndex, A>> {
        Ok(self.data[k].conj().map_indices(ChainIndex::prime)?)
    }

    /// Compute ⟨ψ|ψ⟩ by contracting the chain against its conjugate from left
    /// to right.
    pub fn norm_sqr(&self) -> ChainResult<A::Real> {
        let mut acc: Tensor<ChainIndex, A> = Tensor::new_scalar(A::one());
        for (k, t) in self.data.iter().enumerate() {
            acc = acc.contract(t)?.contract(&self.bra(k)?)?;
        }
        acc.into_scalar()
            .map(|z| z.re())
            .ok_or_else(|| UnexpectedIndex {
                site: self.n - 1,
                index: "<open bond>".into(),
            })
    }
}

impl<A> ChainState<A>
where
    A: Elem,
    A::Real: Into<f64>,
{
    /// Check that ⟨ψ|ψ⟩ = 1 to within `tol`.
    ///
    /// The chain is never renormalized; a failed check is reported as
    /// [`ChainError::NotNormalized`].
    pub fn check_normalized(&self, tol: f64) -> ChainResult<()> {
        let norm: f64 = self.norm_sqr()?.into();
        if (norm - 1.0).abs() <= tol {
            Ok(())
        } else {
            Err(NotNormalized(norm))
        }
    }
}

impl<A> ChainState<A>
where A: Elem + na::ComplexField
{
    /// Factor a pure state vector of `n` qubits into a chain by a series of
    /// singular value decompositions, sweeping left to right.
    ///
    /// The state is normalized before factoring. Basis states are ordered with
    /// site 0 as the most significant digit, i.e. element `c` of the vector is
    /// the amplitude of the configuration whose `k`-th site holds bit
    /// `n - 1 - k` of `c`. Singular values not exceeding `eps` (default:
    /// machine epsilon) are discarded, which sets the bond dimensions.
    ///
    /// Fails if `n == 0`, the vector does not have length 2<sup>`n`</sup>, or
    /// the vector has zero norm.
    pub fn from_vector<I>(n: usize, state: I, eps: Option<f64>)
        -> ChainResult<Self>
    where I: IntoIterator<Item = A>
    {
        if n == 0 { return Err(EmptySystem); }
        let mut rest: Vec<A> = state.into_iter().collect();
        let expected = 1_usize.checked_shl(n as u32).ok_or(StateIncompatibleShape)?;
        if rest.len() != expected { return Err(StateIncompatibleShape); }
        let norm =
            Float::sqrt(
                rest.iter()
                    .map(|a| a.abs_sq())
                    .fold(A::Real::zero(), |acc, x| acc + x)
            );
        if norm <= A::Real::zero() { return Err(ZeroState); }
        let renorm = A::from_re(Float::recip(norm));
        rest.iter_mut().for_each(|a| { *a = *a * renorm; });

        let eps: A::RealField = na::convert(eps.unwrap_or(f64::EPSILON).abs());
        let mut tensors: Vec<Tensor<ChainIndex, A>> = Vec::with_capacity(n);
        let mut bl: usize = 1;
        for k in 0..n - 1 {
            let cols = rest.len() / (bl * 2);
            let q: na::DMatrix<A> =
                na::DMatrix::from_fn(bl * 2, cols, |r, c| rest[r * cols + c]);
            let svd = q.svd(true, true);
            let u = svd.u.ok_or(SvdFailure)?;
            let v_t = svd.v_t.ok_or(SvdFailure)?;
            let s = svd.singular_values;
            let keep: Vec<usize> =
                (0..s.len()).filter(|j| s[*j] > eps).collect();
            if keep.is_empty() { return Err(ZeroState); }
            let r = keep.len();

            let mut idxs: Vec<ChainIndex> = Vec::with_capacity(3);
            if k > 0 { idxs.push(ChainIndex::bond(k - 1, bl)); }
            idxs.push(ChainIndex::physical(k, 2));
            idxs.push(ChainIndex::bond(k, r));
            let elems: Vec<A> =
                (0..bl * 2)
                .flat_map(|row| keep.iter().map(move |j| (row, *j)))
                .map(|(row, j)| u[(row, j)])
                .collect();
            tensors.push(Tensor::from_elems(idxs, elems)?);

            rest =
                keep.iter()
                .flat_map(|j| (0..cols).map(move |c| (*j, c)))
                .map(|(j, c)| A::from_real(s[j].clone()) * v_t[(j, c)])
                .collect();
            bl = r;
        }
        let mut idxs: Vec<ChainIndex> = Vec::with_capacity(2);
        if n > 1 { idxs.push(ChainIndex::bond(n - 2, bl)); }
        idxs.push(ChainIndex::physical(n - 1, 2));
        tensors.push(Tensor::from_elems(idxs, rest)?);
        Self::new(tensors)
    }
}

impl<A> fmt::Display for ChainState<A>
where A: fmt::Display
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, t) in self.data.iter().enumerate() {
            write!(f, "T[{k}] :: {{ ")?;
            if k > 0 { write!(f, "<{}>, ", self.bonds[k - 1])?; }
            write!(f, "s{k}<{}>", self.phys[k])?;
            if k + 1 < self.n { write!(f, ", <{}>", self.bonds[k])?; }
            writeln!(f, " }}")?;
            fmt::Display::fmt(t, f)?;
            if k + 1 < self.n { writeln!(f)?; }
        }
        Ok(())
    }
}
