//! Minimal dense tensors with labeled indices.
//!
//! A [`Tensor`] is an N-dimensional array whose axes are identified by values
//! of some index type implementing [`Idx`] rather than by position. Two tensors
//! are contracted by summing over every index they have in common; all other
//! indices are carried over to the result. When two tensors have no indices in
//! common, the contraction is an ordinary tensor (outer) product.
//!
//! ```
//! use mps_sampler::tensor::{ Idx, Tensor };
//!
//! #[derive(Copy, Clone, Debug, PartialEq, Eq)]
//! enum Index { A, B, C }
//!
//! impl Idx for Index {
//!     fn dim(&self) -> usize {
//!         match self {
//!             Self::A => 3,
//!             Self::B => 4,
//!             Self::C => 5,
//!         }
//!     }
//! }
//!
//! let a: Tensor<Index, f64> = Tensor::new([Index::A, Index::B], |_| 1.0).unwrap();
//! let b: Tensor<Index, f64> = Tensor::new([Index::B, Index::C], |_| 2.0).unwrap();
//! let c = a.contract(&b).unwrap(); // C_{a,c} = Σ_b A_{a,b} B_{b,c}
//! assert_eq!(c.shape(), vec![3, 5]);
//! assert_eq!(c.get(&[(Index::A, 0), (Index::C, 4)]).unwrap(), 8.0);
//! ```

use std::fmt;
use ndarray::{ self as nd, Dimension };
use num_complex::ComplexFloat;
use num_traits::{ Float, Zero };
use thiserror::Error;
use crate::ComplexFloatExt;

#[derive(Debug, Error)]
pub enum TensorError {
    /// Returned when attempting to create a new tensor with duplicate indices.
    #[error("error in tensor creation: duplicate indices")]
    DuplicateIndices,

    /// Returned when attempting to create a new tensor with at least one index
    /// that has zero dimension.
    #[error("error in tensor creation: encountered a zero-dimensional index")]
    ZeroDimIndex,

    /// Returned when attempting to create a new tensor from a pre-existing
    /// collection of elements and the provided indices have non-matching total
    /// dimension.
    #[error("error in tensor creation: non-matching indices and number of elements")]
    IncompatibleNumElems,

    /// Returned when an index relabeling would change the dimension of an
    /// axis.
    #[error("error in index relabeling: {0} and {1} have different dimensions")]
    IncompatibleRelabel(String, String),

    /// Returned when element access is missing a value for one of the tensor's
    /// indices.
    #[error("error in element access: no value given for index {0}")]
    MissingIndexValue(String),

    /// Returned when element access names an index the tensor doesn't have.
    #[error("error in element access: tensor has no index {0}")]
    UnknownIndex(String),

    /// Returned when element access supplies a value outside of an index's
    /// range.
    #[error("error in element access: value {val} out of range for index {label} (dim {dim})")]
    IndexValueOutOfRange { label: String, val: usize, dim: usize },

    /// Returned when the underlying array could not be reshaped.
    #[error("array shape error: {0}")]
    Shape(#[from] nd::ShapeError),
}
use TensorError::*;
pub type TensorResult<T> = Result<T, TensorError>;

/// Describes a tensor index.
///
/// Indices are compared by value: two tensors share an axis exactly when they
/// hold indices that compare equal, so anything distinguishing two axes (e.g. a
/// "prime" level separating a bra from a ket) must be part of the index value.
pub trait Idx: Clone + PartialEq + fmt::Debug {
    /// Return the number of values the index can take.
    ///
    /// This value must never be zero.
    fn dim(&self) -> usize;

    /// Return an identifying label for the index. This method is used only for
    /// printing and error reporting.
    ///
    /// The default implementation renders `self` using `Debug`.
    fn label(&self) -> String { format!("{self:?}") }
}

/// Element types that tensors can be contracted over.
///
/// This is implemented for `f32`, `f64`, and their complex counterparts.
pub trait Elem
where Self: ComplexFloat + ComplexFloatExt + nd::LinalgScalar + fmt::Debug + Send + Sync
{ }

impl<A> Elem for A
where A: ComplexFloat + ComplexFloatExt + nd::LinalgScalar + fmt::Debug + Send + Sync
{ }

/// Basic implementation of an abstract tensor quantity.
///
/// A `Tensor<T, A>` consists of some number of quantities of type `A` and a
/// series of unique indices belonging to a type `T` that implements [`Idx`].
///
/// This implementation distinguishes between rank 0 (scalar) and rank > 0
/// (array) quantities; a scalar tensor acts as a multiplicative identity-like
/// factor under contraction.
#[derive(Clone, PartialEq)]
pub struct Tensor<T, A>(TensorData<T, A>);

impl<T, A> fmt::Debug for Tensor<T, A>
where
    T: fmt::Debug,
    A: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor(")?;
        match &self.0 {
            TensorData::Scalar(_) => {
                fmt::Debug::fmt(&self.0, f)?;
            },
            TensorData::Tensor(..) => {
                writeln!(f)?;
                fmt::Debug::fmt(&self.0, f)?;
                writeln!(f)?;
            },
        }
        write!(f, ")")?;
        Ok(())
    }
}

impl<T, A> fmt::Display for Tensor<T, A>
where
    T: Idx,
    A: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Clone, PartialEq)]
enum TensorData<T, A> {
    Scalar(A),
    Tensor(Vec<T>, nd::ArrayD<A>),
}

impl<T, A> fmt::Debug for TensorData<T, A>
where
    T: fmt::Debug,
    A: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(a) => {
                fmt::Debug::fmt(a, f)?;
                write!(f, ", type=scalar, rank=0, indices=[]")?;
            },
            Self::Tensor(idxs, a) => {
                fmt::Debug::fmt(a, f)?;
                write!(
                    f,
                    ",\ntype=tensor, rank={}, indices={:?}",
                    idxs.len(),
                    idxs,
                )?;
            },
        }
        Ok(())
    }
}

impl<T, A> fmt::Display for TensorData<T, A>
where
    T: Idx,
    A: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(a) => {
                fmt::Display::fmt(a, f)?;
                write!(f, " {{ }}")?;
            },
            Self::Tensor(idxs, a) => {
                fmt::Display::fmt(a, f)?;
                write!(f, " {{ ")?;
                let n_idxs = idxs.len();
                for (k, idx) in idxs.iter().enumerate() {
                    write!(f, "{}", idx.label())?;
                    if k < n_idxs - 1 { write!(f, ", ")?; }
                }
                write!(f, " }}")?;
            },
        }
        Ok(())
    }
}

/// Iterator type over the indices of a given [`Tensor`].
///
/// The iterator item type is `&T`.
pub struct Indices<'a, T>(IndicesData<'a, T>);

enum IndicesData<'a, T> {
    Scalar,
    Tensor(std::slice::Iter<'a, T>),
}

impl<'a, T> Iterator for Indices<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.0 {
            IndicesData::Scalar => None,
            IndicesData::Tensor(iter) => iter.next(),
        }
    }
}

fn is_unique<T: PartialEq>(idxs: &[T]) -> bool {
    idxs.iter().enumerate()
        .all(|(k, idx)| !idxs[k + 1..].contains(idx))
}

// resolve a set of (index, value) pairs into an array position
fn position<T>(idxs: &[T], vals: &[(T, usize)]) -> TensorResult<Vec<usize>>
where T: Idx
{
    if let Some((unknown, _)) = vals.iter().find(|(idx, _)| !idxs.contains(idx)) {
        return Err(UnknownIndex(unknown.label()));
    }
    idxs.iter()
        .map(|idx| {
            let (_, val) =
                vals.iter()
                .find(|(jdx, _)| jdx == idx)
                .ok_or_else(|| MissingIndexValue(idx.label()))?;
            (*val < idx.dim()).then_some(*val)
                .ok_or_else(|| IndexValueOutOfRange {
                    label: idx.label(),
                    val: *val,
                    dim: idx.dim(),
                })
        })
        .collect()
}

// contract two arrays over all common indices by permuting them into matrices
// and taking an ordinary matrix product
fn contract_arrays<T, A>(
    idxs_a: &[T],
    a: &nd::ArrayD<A>,
    idxs_b: &[T],
    b: &nd::ArrayD<A>,
) -> TensorResult<TensorData<T, A>>
where
    T: Idx,
    A: nd::LinalgScalar,
{
    let common: Vec<(usize, usize)> =
        idxs_a.iter().enumerate()
        .filter_map(|(ka, idx)| {
            idxs_b.iter().position(|jdx| jdx == idx).map(|kb| (ka, kb))
        })
        .collect();
    let free_a: Vec<usize> =
        (0..idxs_a.len())
        .filter(|k| !common.iter().any(|(ka, _)| ka == k))
        .collect();
    let free_b: Vec<usize> =
        (0..idxs_b.len())
        .filter(|k| !common.iter().any(|(_, kb)| kb == k))
        .collect();

    let m: usize = free_a.iter().map(|k| idxs_a[*k].dim()).product();
    let s: usize = common.iter().map(|(ka, _)| idxs_a[*ka].dim()).product();
    let n: usize = free_b.iter().map(|k| idxs_b[*k].dim()).product();

    let perm_a: Vec<usize> =
        free_a.iter().copied()
        .chain(common.iter().map(|(ka, _)| *ka))
        .collect();
    let perm_b: Vec<usize> =
        common.iter().map(|(_, kb)| *kb)
        .chain(free_b.iter().copied())
        .collect();
    let mat_a: nd::Array2<A> =
        a.view().permuted_axes(perm_a)
        .as_standard_layout().into_owned()
        .into_shape((m, s))?;
    let mat_b: nd::Array2<A> =
        b.view().permuted_axes(perm_b)
        .as_standard_layout().into_owned()
        .into_shape((s, n))?;
    let mat_c = mat_a.dot(&mat_b);

    let new_idxs: Vec<T> =
        free_a.iter().map(|k| idxs_a[*k].clone())
        .chain(free_b.iter().map(|k| idxs_b[*k].clone()))
        .collect();
    if new_idxs.is_empty() {
        Ok(TensorData::Scalar(mat_c[[0, 0]]))
    } else {
        let shape: Vec<usize> = new_idxs.iter().map(|idx| idx.dim()).collect();
        let data = mat_c.into_shape(nd::IxDyn(&shape))?;
        Ok(TensorData::Tensor(new_idxs, data))
    }
}

impl<T, A> TensorData<T, A>
where T: Idx
{
    fn new<I, F>(indices: I, mut elems: F) -> TensorResult<Self>
    where
        I: IntoIterator<Item = T>,
        F: FnMut(&[usize]) -> A,
    {
        let indices: Vec<T> = indices.into_iter().collect();
        if !is_unique(&indices) { return Err(DuplicateIndices); }
        if indices.is_empty() {
            let scalar: A = elems(&[]);
            Ok(Self::Scalar(scalar))
        } else {
            if indices.iter().any(|idx| idx.dim() == 0) {
                return Err(ZeroDimIndex);
            }
            let shape: Vec<usize> =
                indices.iter().map(|idx| idx.dim()).collect();
            let data: nd::ArrayD<A> =
                nd::ArrayD::from_shape_fn(shape, |idxs| elems(idxs.slice()));
            Ok(Self::Tensor(indices, data))
        }
    }

    fn from_elems<I>(indices: I, elems: Vec<A>) -> TensorResult<Self>
    where I: IntoIterator<Item = T>
    {
        let indices: Vec<T> = indices.into_iter().collect();
        if !is_unique(&indices) { return Err(DuplicateIndices); }
        if indices.is_empty() {
            let mut elems = elems;
            match (elems.pop(), elems.is_empty()) {
                (Some(a), true) => Ok(Self::Scalar(a)),
                _ => Err(IncompatibleNumElems),
            }
        } else {
            if indices.iter().any(|idx| idx.dim() == 0) {
                return Err(ZeroDimIndex);
            }
            let shape: Vec<usize> =
                indices.iter().map(|idx| idx.dim()).collect();
            if shape.iter().product::<usize>() != elems.len() {
                return Err(IncompatibleNumElems);
            }
            let data = nd::ArrayD::from_shape_vec(nd::IxDyn(&shape), elems)?;
            Ok(Self::Tensor(indices, data))
        }
    }

    fn is_scalar(&self) -> bool { matches!(self, Self::Scalar(_)) }

    fn has_index(&self, index: &T) -> bool {
        match self {
            Self::Scalar(_) => false,
            Self::Tensor(idxs, _) => idxs.contains(index),
        }
    }

    fn rank(&self) -> usize {
        match self {
            Self::Scalar(_) => 0,
            Self::Tensor(idxs, _) => idxs.len(),
        }
    }

    fn shape(&self) -> Vec<usize> {
        match self {
            Self::Scalar(_) => Vec::new(),
            Self::Tensor(idxs, _) =>
                idxs.iter().map(|idx| idx.dim()).collect(),
        }
    }

    fn indices(&self) -> Indices<'_, T> {
        match self {
            Self::Scalar(_) => Indices(IndicesData::Scalar),
            Self::Tensor(idxs, _) =>
                Indices(IndicesData::Tensor(idxs.iter())),
        }
    }

    fn map_indices<F>(self, mut f: F) -> TensorResult<Self>
    where F: FnMut(T) -> T
    {
        match self {
            Self::Scalar(a) => Ok(Self::Scalar(a)),
            Self::Tensor(idxs, data) => {
                let new_idxs: Vec<T> =
                    idxs.into_iter()
                    .map(|idx| {
                        let new = f(idx.clone());
                        if new.dim() == idx.dim() {
                            Ok(new)
                        } else {
                            Err(IncompatibleRelabel(idx.label(), new.label()))
                        }
                    })
                    .collect::<TensorResult<Vec<T>>>()?;
                if !is_unique(&new_idxs) { return Err(DuplicateIndices); }
                Ok(Self::Tensor(new_idxs, data))
            },
        }
    }

    fn get(&self, vals: &[(T, usize)]) -> TensorResult<&A> {
        match self {
            Self::Scalar(a) => {
                if let Some((idx, _)) = vals.first() {
                    Err(UnknownIndex(idx.label()))
                } else {
                    Ok(a)
                }
            },
            Self::Tensor(idxs, data) => {
                let pos = position(idxs, vals)?;
                Ok(&data[pos.as_slice()])
            },
        }
    }

    fn get_mut(&mut self, vals: &[(T, usize)]) -> TensorResult<&mut A> {
        match self {
            Self::Scalar(a) => {
                if let Some((idx, _)) = vals.first() {
                    Err(UnknownIndex(idx.label()))
                } else {
                    Ok(a)
                }
            },
            Self::Tensor(idxs, data) => {
                let pos = position(idxs, vals)?;
                Ok(&mut data[pos.as_slice()])
            },
        }
    }
}

impl<T, A> TensorData<T, A>
where
    T: Idx,
    A: Elem,
{
    fn contract(&self, other: &Self) -> TensorResult<Self> {
        match (self, other) {
            (Self::Scalar(a), Self::Scalar(b)) => Ok(Self::Scalar(*a * *b)),
            (Self::Scalar(a), Self::Tensor(idxs, b)) => {
                Ok(Self::Tensor(idxs.clone(), b.mapv(|bk| *a * bk)))
            },
            (Self::Tensor(idxs, a), Self::Scalar(b)) => {
                Ok(Self::Tensor(idxs.clone(), a.mapv(|ak| ak * *b)))
            },
            (Self::Tensor(idxs_a, a), Self::Tensor(idxs_b, b)) => {
                contract_arrays(idxs_a, a, idxs_b, b)
            },
        }
    }

    fn conj(&self) -> Self {
        match self {
            Self::Scalar(z) => Self::Scalar(z.conj()),
            Self::Tensor(idxs, z) => {
                Self::Tensor(idxs.clone(), z.mapv(|zk| zk.conj()))
            },
        }
    }

    fn norm_sqr(&self) -> A::Real {
        match self {
            Self::Scalar(z) => z.abs_sq(),
            Self::Tensor(_, z) => {
                z.iter()
                    .map(|zk| zk.abs_sq())
                    .fold(A::Real::zero(), |acc, x| acc + x)
            },
        }
    }

    fn scale(self, a: A) -> Self {
        match self {
            Self::Scalar(z) => Self::Scalar(z * a),
            Self::Tensor(idxs, mut z) => {
                z.map_inplace(|zk| { *zk = *zk * a; });
                Self::Tensor(idxs, z)
            },
        }
    }
}

impl<T, A> From<TensorData<T, A>> for Tensor<T, A> {
    fn from(data: TensorData<T, A>) -> Self { Self(data) }
}

impl<T, A> Tensor<T, A>
where T: Idx
{
    /// Create a new tensor using a function over index values.
    ///
    /// Fails if duplicate indices are provided or an index with zero dimension
    /// is encountered.
    pub fn new<I, F>(indices: I, elems: F) -> TensorResult<Self>
    where
        I: IntoIterator<Item = T>,
        F: FnMut(&[usize]) -> A,
    {
        TensorData::new(indices, elems).map(Self::from)
    }

    /// Create a new tensor from a pre-existing vector of elements in row-major
    /// order with respect to the given indices.
    ///
    /// Fails if duplicate indices are provided, the length of the vector does
    /// not match the total dimension of the indices, or an index with zero
    /// dimension is encountered.
    pub fn from_elems<I>(indices: I, elems: Vec<A>) -> TensorResult<Self>
    where I: IntoIterator<Item = T>
    {
        TensorData::from_elems(indices, elems).map(Self::from)
    }

    /// Create a new rank-0 (scalar) tensor.
    pub fn new_scalar(val: A) -> Self { TensorData::Scalar(val).into() }

    /// Return `true` if `self` has rank 0.
    pub fn is_scalar(&self) -> bool { self.0.is_scalar() }

    /// Return `true` if `self` has the given index.
    pub fn has_index(&self, index: &T) -> bool { self.0.has_index(index) }

    /// Return the rank (i.e. the number of indices) of `self`.
    pub fn rank(&self) -> usize { self.0.rank() }

    /// Return the shape (dimensions of each index) of `self` in a vector.
    ///
    /// If `self` is a scalar, the returned vector is empty.
    pub fn shape(&self) -> Vec<usize> { self.0.shape() }

    /// Return an iterator over all indices.
    ///
    /// If `self` is a scalar, the iterator is empty.
    pub fn indices(&self) -> Indices<'_, T> { self.0.indices() }

    /// Relabel every index of `self` through `f`, consuming `self`.
    ///
    /// The underlying data is untouched. Fails if `f` changes the dimension of
    /// an index or produces duplicate indices.
    pub fn map_indices<F>(self, f: F) -> TensorResult<Self>
    where F: FnMut(T) -> T
    {
        self.0.map_indices(f).map(Self::from)
    }

    /// Return the element selected by a value for every index.
    ///
    /// Values may be given in any order. Fails if a value is missing, out of
    /// range, or given for an index `self` doesn't have. Scalars take an empty
    /// slice.
    pub fn get(&self, vals: &[(T, usize)]) -> TensorResult<A>
    where A: Clone
    {
        self.0.get(vals).cloned()
    }

    /// Overwrite the element selected by a value for every index.
    ///
    /// Fails under the same conditions as [`Self::get`].
    pub fn set(&mut self, vals: &[(T, usize)], val: A) -> TensorResult<()> {
        *self.0.get_mut(vals)? = val;
        Ok(())
    }

    /// If `self` is a scalar, return its value.
    pub fn into_scalar(self) -> Option<A> {
        match self.0 {
            TensorData::Scalar(a) => Some(a),
            TensorData::Tensor(..) => None,
        }
    }
}

impl<T, A> Tensor<T, A>
where
    T: Idx,
    A: Elem,
{
    /// Create a new tensor with all elements equal to zero.
    pub fn zeros<I>(indices: I) -> TensorResult<Self>
    where I: IntoIterator<Item = T>
    {
        Self::new(indices, |_| A::zero())
    }

    /// Contract `self` with `other` over all common indices.
    ///
    /// The result holds all non-common indices of `self` followed by those of
    /// `other`. If there are no common indices, the result is the tensor
    /// product of the two.
    pub fn contract(&self, other: &Self) -> TensorResult<Self> {
        self.0.contract(&other.0).map(Self::from)
    }

    /// Return a new tensor containing the element-wise conjugation of `self`.
    ///
    /// Indices are left as they are.
    pub fn conj(&self) -> Self { self.0.conj().into() }

    /// Return the sum of the squared moduli of all elements.
    pub fn norm_sqr(&self) -> A::Real { self.0.norm_sqr() }

    /// Multiply every element by `a`, consuming `self`.
    pub fn scale(self, a: A) -> Self { self.0.scale(a).into() }

    /// Divide every element by the Frobenius norm of `self`, returning the
    /// normalized tensor and the norm.
    ///
    /// A tensor with zero norm is returned as-is.
    pub fn into_normalized(self) -> (Self, A::Real) {
        let norm = Float::sqrt(self.norm_sqr());
        if norm > A::Real::zero() {
            (self.scale(A::from_re(Float::recip(norm))), norm)
        } else {
            (self, norm)
        }
    }
}
