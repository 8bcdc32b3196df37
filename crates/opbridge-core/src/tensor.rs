//! Tensor - Dense CPU Tensor
//!
//! The `Tensor` struct is the native value that bridged operators consume and
//! produce. It is a dynamically typed, contiguous, row-major array whose
//! storage is reference-counted: clones are cheap and in-place updates copy
//! only when the storage is shared.
//!
//! The math here is deliberately small. It covers what the reference operator
//! library and its gradient functions need (broadcasting arithmetic, sums,
//! expansion, transposition, extrema) and is defined for float dtypes only.
//!
//! @version 0.1.0
//! @author `OpBridge` Development Team

use std::sync::Arc;

use crate::dtype::{DType, Element};
use crate::error::{Error, Result};
use crate::shape::{
    broadcast_shape, broadcast_strides, contiguous_strides, linear_index, numel, unravel_index,
    Shape,
};
use crate::storage::Storage;

// =============================================================================
// Tensor Struct
// =============================================================================

/// A contiguous N-dimensional array.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    /// Underlying element buffer (reference-counted).
    storage: Arc<Storage>,
    /// Dimensions in row-major order.
    shape: Shape,
}

/// Which extremum [`Tensor::extremum`] searches for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extremum {
    /// Smallest element.
    Min,
    /// Largest element.
    Max,
}

impl Tensor {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Creates a tensor from storage, validating the element count.
    pub fn from_storage(storage: Storage, shape: &[usize]) -> Result<Self> {
        if numel(shape) != storage.len() {
            return Err(Error::shape_mismatch(&[storage.len()], shape));
        }
        Ok(Self {
            storage: Arc::new(storage),
            shape: Shape::from_slice(shape),
        })
    }

    /// Creates a tensor from a vector with the given shape.
    pub fn from_vec<T: Element>(data: Vec<T>, shape: &[usize]) -> Result<Self> {
        Self::from_storage(T::into_storage(data), shape)
    }

    /// Creates a 0-dimensional tensor holding `value`.
    #[must_use]
    pub fn scalar<T: Element>(value: T) -> Self {
        Self {
            storage: Arc::new(T::into_storage(vec![value])),
            shape: Shape::new(),
        }
    }

    /// Creates a zero-filled tensor.
    #[must_use]
    pub fn zeros(dtype: DType, shape: &[usize]) -> Self {
        Self {
            storage: Arc::new(Storage::zeros(dtype, numel(shape))),
            shape: Shape::from_slice(shape),
        }
    }

    fn from_f64_values(dtype: DType, values: Vec<f64>, shape: &[usize]) -> Result<Self> {
        Self::from_storage(Storage::from_f64_values(dtype, values)?, shape)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Returns the dimensions.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the number of dimensions.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Returns the total number of elements.
    #[must_use]
    pub fn numel(&self) -> usize {
        numel(&self.shape)
    }

    /// Returns the element type.
    #[must_use]
    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    /// Returns the underlying storage.
    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Consumes the tensor, returning its storage without copying when unshared.
    #[must_use]
    pub fn into_storage(self) -> Storage {
        Arc::try_unwrap(self.storage).unwrap_or_else(|shared| (*shared).clone())
    }

    /// Borrows the elements as a typed slice.
    pub fn as_slice<T: Element>(&self) -> Result<&[T]> {
        T::slice(&self.storage).ok_or(Error::DTypeMismatch {
            expected: T::DTYPE,
            actual: self.dtype(),
        })
    }

    /// Copies the elements into a vector.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        self.as_slice().map(<[T]>::to_vec)
    }

    /// Returns the single element of a one-element tensor.
    pub fn item<T: Element>(&self) -> Result<T> {
        let data = self.as_slice::<T>()?;
        if data.len() != 1 {
            return Err(Error::shape_mismatch(&[1], &self.shape));
        }
        Ok(data[0])
    }

    /// Returns a tensor sharing this storage with a new shape of equal size.
    pub fn reshape(&self, shape: &[usize]) -> Result<Self> {
        if numel(shape) != self.numel() {
            return Err(Error::shape_mismatch(&self.shape, shape));
        }
        Ok(Self {
            storage: Arc::clone(&self.storage),
            shape: Shape::from_slice(shape),
        })
    }

    fn float_values(&self, op: &'static str) -> Result<Vec<f64>> {
        if !self.dtype().is_float() {
            return Err(Error::UnsupportedDType {
                op,
                dtype: self.dtype(),
            });
        }
        Ok(self.storage.to_f64_values())
    }

    fn check_same_dtype(&self, other: &Self) -> Result<()> {
        if self.dtype() == other.dtype() {
            Ok(())
        } else {
            Err(Error::DTypeMismatch {
                expected: self.dtype(),
                actual: other.dtype(),
            })
        }
    }

    // =========================================================================
    // Element-wise Arithmetic
    // =========================================================================

    fn zip_with<F>(&self, other: &Self, op: &'static str, f: F) -> Result<Self>
    where
        F: Fn(f64, f64) -> f64,
    {
        self.check_same_dtype(other)?;
        let lhs = self.float_values(op)?;
        let rhs = other.float_values(op)?;

        let out_shape = broadcast_shape(&self.shape, &other.shape)?;
        let lhs_strides = broadcast_strides(&self.shape, &out_shape);
        let rhs_strides = broadcast_strides(&other.shape, &out_shape);

        let values = (0..numel(&out_shape))
            .map(|i| {
                let idx = unravel_index(i, &out_shape);
                f(
                    lhs[linear_index(&idx, &lhs_strides)],
                    rhs[linear_index(&idx, &rhs_strides)],
                )
            })
            .collect();

        Self::from_f64_values(self.dtype(), values, &out_shape)
    }

    fn map_values<F>(&self, op: &'static str, f: F) -> Result<Self>
    where
        F: Fn(f64) -> f64,
    {
        let values = self.float_values(op)?.into_iter().map(f).collect();
        Self::from_f64_values(self.dtype(), values, &self.shape)
    }

    /// Element-wise addition with broadcasting.
    pub fn add(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, "add", |a, b| a + b)
    }

    /// Element-wise subtraction with broadcasting.
    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, "sub", |a, b| a - b)
    }

    /// Element-wise multiplication with broadcasting.
    pub fn mul(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, "mul", |a, b| a * b)
    }

    /// Element-wise negation.
    pub fn neg(&self) -> Result<Self> {
        self.map_values("neg", |a| -a)
    }

    /// Multiplies every element by `factor`.
    pub fn scale(&self, factor: f64) -> Result<Self> {
        self.map_values("scale", |a| a * factor)
    }

    /// Leaky rectifier: keeps positive elements, scales the rest by `slope`.
    ///
    /// A slope of zero is the plain rectifier.
    pub fn leaky_relu(&self, slope: f64) -> Result<Self> {
        self.map_values("leaky_relu", |a| if a > 0.0 { a } else { a * slope })
    }

    /// Scales elements of `self` by `slope` wherever `gate` is not positive.
    ///
    /// This is the gradient of [`Tensor::leaky_relu`] evaluated at `gate`.
    pub fn gated_by(&self, gate: &Self, slope: f64) -> Result<Self> {
        if gate.shape() != self.shape() {
            return Err(Error::shape_mismatch(&self.shape, &gate.shape));
        }
        self.zip_with(gate, "gated_by", |g, x| if x > 0.0 { g } else { g * slope })
    }

    /// Adds `other` into `self`, broadcasting `other` to `self`'s shape.
    ///
    /// The storage is copied first only if another tensor shares it.
    pub fn add_assign(&mut self, other: &Self) -> Result<()> {
        self.check_same_dtype(other)?;
        let rhs = if other.shape() == self.shape() {
            other.float_values("add_assign")?
        } else {
            other.expand(&self.shape)?.float_values("add_assign")?
        };

        match Arc::make_mut(&mut self.storage) {
            Storage::F32(data) => {
                for (a, b) in data.iter_mut().zip(rhs) {
                    *a = (f64::from(*a) + b) as f32;
                }
            }
            Storage::F64(data) => {
                for (a, b) in data.iter_mut().zip(rhs) {
                    *a += b;
                }
            }
            other => {
                return Err(Error::UnsupportedDType {
                    op: "add_assign",
                    dtype: other.dtype(),
                })
            }
        }
        Ok(())
    }

    // =========================================================================
    // Reductions
    // =========================================================================

    /// Sums every element into a 0-dimensional tensor.
    pub fn sum(&self) -> Result<Self> {
        let total = self.float_values("sum")?.into_iter().sum();
        Self::from_f64_values(self.dtype(), vec![total], &[])
    }

    /// Sums over `dims`; an empty list sums over every dimension.
    pub fn sum_dims(&self, dims: &[usize], keepdim: bool) -> Result<Self> {
        if let Some(&bad) = dims.iter().find(|&&d| d >= self.ndim()) {
            return Err(Error::InvalidDimension {
                index: bad as i64,
                ndim: self.ndim(),
            });
        }
        let reduce_all = dims.is_empty();
        let kept: Vec<usize> = self
            .shape
            .iter()
            .enumerate()
            .map(|(d, &size)| if reduce_all || dims.contains(&d) { 1 } else { size })
            .collect();

        let reduced = self.sum_to_shape(&kept)?;
        if keepdim {
            return Ok(reduced);
        }
        let squeezed: Vec<usize> = self
            .shape
            .iter()
            .enumerate()
            .filter(|(d, _)| !(reduce_all || dims.contains(d)))
            .map(|(_, &size)| size)
            .collect();
        reduced.reshape(&squeezed)
    }

    /// Reduces a broadcast result back to `target` by summing broadcast dimensions.
    pub fn sum_to_shape(&self, target: &[usize]) -> Result<Self> {
        if target == self.shape() {
            return Ok(self.clone());
        }
        if target.len() > self.ndim() || broadcast_shape(target, &self.shape)? != self.shape {
            return Err(Error::BroadcastError {
                shape1: self.shape.to_vec(),
                shape2: target.to_vec(),
            });
        }

        let values = self.float_values("sum_to_shape")?;
        let offset = self.ndim() - target.len();
        let target_strides = contiguous_strides(target);
        let mut out = vec![0.0; numel(target)];

        for (i, value) in values.into_iter().enumerate() {
            let idx = unravel_index(i, &self.shape);
            let pos: usize = target
                .iter()
                .enumerate()
                .map(|(d, &size)| if size == 1 { 0 } else { idx[d + offset] * target_strides[d] })
                .sum();
            out[pos] += value;
        }

        Self::from_f64_values(self.dtype(), out, target)
    }

    /// Returns the extremum and the flat index of its first occurrence.
    pub fn extremum(&self, which: Extremum) -> Result<(Self, usize)> {
        let values = self.float_values("extremum")?;
        let mut best: Option<(usize, f64)> = None;
        for (i, v) in values.into_iter().enumerate() {
            let better = match (best, which) {
                (None, _) => true,
                (Some((_, b)), Extremum::Min) => v < b,
                (Some((_, b)), Extremum::Max) => v > b,
            };
            if better {
                best = Some((i, v));
            }
        }
        let (index, value) = best.ok_or(Error::EmptyTensor)?;
        Ok((Self::from_f64_values(self.dtype(), vec![value], &[])?, index))
    }

    // =========================================================================
    // Layout
    // =========================================================================

    /// Materializes `self` broadcast to `shape`.
    pub fn expand(&self, shape: &[usize]) -> Result<Self> {
        if self.ndim() > shape.len() || broadcast_shape(&self.shape, shape)?.as_slice() != shape {
            return Err(Error::BroadcastError {
                shape1: self.shape.to_vec(),
                shape2: shape.to_vec(),
            });
        }
        let strides = broadcast_strides(&self.shape, shape);
        let indices: Vec<usize> = (0..numel(shape))
            .map(|i| linear_index(&unravel_index(i, shape), &strides))
            .collect();
        Self::from_storage(self.storage.gather(&indices)?, shape)
    }

    /// Swaps two dimensions, producing a contiguous result.
    pub fn transpose(&self, dim0: usize, dim1: usize) -> Result<Self> {
        for dim in [dim0, dim1] {
            if dim >= self.ndim() {
                return Err(Error::InvalidDimension {
                    index: dim as i64,
                    ndim: self.ndim(),
                });
            }
        }
        let mut out_shape = self.shape.clone();
        out_shape.swap(dim0, dim1);
        let src_strides = contiguous_strides(&self.shape);

        let indices: Vec<usize> = (0..self.numel())
            .map(|i| {
                let mut idx = unravel_index(i, &out_shape);
                idx.swap(dim0, dim1);
                linear_index(&idx, &src_strides)
            })
            .collect();
        Self::from_storage(self.storage.gather(&indices)?, &out_shape)
    }

    /// Returns a zero tensor shaped like `self` with `value` at flat `index`.
    pub fn one_hot_like(&self, index: usize, value: f64) -> Result<Self> {
        let mut values = vec![0.0; self.numel()];
        let size = values.len();
        *values
            .get_mut(index)
            .ok_or(Error::IndexOutOfBounds { index, size })? = value;
        Self::from_f64_values(self.dtype(), values, &self.shape)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn t(data: Vec<f32>, shape: &[usize]) -> Tensor {
        Tensor::from_vec(data, shape).unwrap()
    }

    #[test]
    fn test_from_vec_validates_shape() {
        assert!(Tensor::from_vec(vec![1.0f32, 2.0], &[3]).is_err());
        let scalar = Tensor::scalar(5i64);
        assert_eq!(scalar.ndim(), 0);
        assert_eq!(scalar.item::<i64>().unwrap(), 5);
    }

    #[test]
    fn test_typed_access() {
        let a = t(vec![1.0, 2.0], &[2]);
        assert!(a.as_slice::<f64>().is_err());
        assert_eq!(a.as_slice::<f32>().unwrap(), &[1.0, 2.0]);
    }

    #[test]
    fn test_broadcast_add() {
        let a = t(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let b = t(vec![10.0, 20.0, 30.0], &[3]);
        let c = a.add(&b).unwrap();
        assert_eq!(c.shape(), &[2, 3]);
        assert_eq!(
            c.to_vec::<f32>().unwrap(),
            vec![11.0, 22.0, 33.0, 14.0, 25.0, 36.0]
        );
    }

    #[test]
    fn test_integer_math_rejected() {
        let a = Tensor::from_vec(vec![1i64, 2], &[2]).unwrap();
        assert!(matches!(
            a.add(&a),
            Err(Error::UnsupportedDType { op: "add", .. })
        ));
    }

    #[test]
    fn test_add_assign_copy_on_write() {
        let mut a = t(vec![1.0, 2.0], &[2]);
        let shared = a.clone();
        a.add_assign(&t(vec![1.0], &[1])).unwrap();
        assert_eq!(a.to_vec::<f32>().unwrap(), vec![2.0, 3.0]);
        assert_eq!(shared.to_vec::<f32>().unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_sum_to_shape() {
        let a = t(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        assert_eq!(a.sum_to_shape(&[3]).unwrap().to_vec::<f32>().unwrap(), vec![5.0, 7.0, 9.0]);
        assert_eq!(a.sum_to_shape(&[2, 1]).unwrap().to_vec::<f32>().unwrap(), vec![6.0, 15.0]);
        assert!(a.sum_to_shape(&[2]).is_err());
    }

    #[test]
    fn test_sum_dims() {
        let a = t(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let rows = a.sum_dims(&[1], false).unwrap();
        assert_eq!(rows.shape(), &[2]);
        assert_eq!(rows.to_vec::<f32>().unwrap(), vec![6.0, 15.0]);

        let kept = a.sum_dims(&[0], true).unwrap();
        assert_eq!(kept.shape(), &[1, 3]);

        let all = a.sum_dims(&[], false).unwrap();
        assert_eq!(all.shape(), &[] as &[usize]);
        assert_eq!(all.item::<f32>().unwrap(), 21.0);
    }

    #[test]
    fn test_expand_and_transpose() {
        let a = t(vec![1.0, 2.0], &[2, 1]);
        let e = a.expand(&[2, 3]).unwrap();
        assert_eq!(e.to_vec::<f32>().unwrap(), vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0]);

        let m = t(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let tr = m.transpose(0, 1).unwrap();
        assert_eq!(tr.shape(), &[3, 2]);
        assert_eq!(tr.to_vec::<f32>().unwrap(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_extremum() {
        let a = t(vec![3.0, -1.0, 7.0, -1.0], &[4]);
        let (min, min_idx) = a.extremum(Extremum::Min).unwrap();
        let (max, max_idx) = a.extremum(Extremum::Max).unwrap();
        assert_eq!(min.item::<f32>().unwrap(), -1.0);
        assert_eq!(min_idx, 1);
        assert_eq!(max.item::<f32>().unwrap(), 7.0);
        assert_eq!(max_idx, 2);

        let empty = Tensor::zeros(DType::F32, &[0]);
        assert_eq!(empty.extremum(Extremum::Min).unwrap_err(), Error::EmptyTensor);
    }

    #[test]
    fn test_leaky_relu_and_gate() {
        let x = t(vec![-2.0, 0.0, 3.0], &[3]);
        assert_eq!(x.leaky_relu(0.0).unwrap().to_vec::<f32>().unwrap(), vec![0.0, 0.0, 3.0]);

        let g = t(vec![1.0, 1.0, 1.0], &[3]);
        assert_eq!(
            g.gated_by(&x, 0.5).unwrap().to_vec::<f32>().unwrap(),
            vec![0.5, 0.5, 1.0]
        );
    }

    #[test]
    fn test_one_hot_like() {
        let a = t(vec![0.0; 3], &[3]);
        assert_eq!(a.one_hot_like(1, 2.5).unwrap().to_vec::<f32>().unwrap(), vec![0.0, 2.5, 0.0]);
        assert!(a.one_hot_like(3, 1.0).is_err());
    }
}
