// Copyright (c) 2026 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the Apache-style license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::{Result, TensorgradError};

/// Dimensions of a tensor.
///
/// A scalar has zero dimensions and one element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Create a shape from explicit dimensions
    #[inline(always)]
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    /// The zero-dimensional scalar shape
    #[inline(always)]
    pub fn scalar() -> Self {
        Self { dims: Vec::new() }
    }

    /// Get the dimensions as a slice
    #[inline(always)]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Number of dimensions
    #[inline(always)]
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements (1 for scalars)
    #[inline(always)]
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    /// Size of a specific dimension
    #[inline(always)]
    pub fn size(&self, dim: usize) -> Result<usize> {
        self.dims.get(dim).copied().ok_or_else(|| {
            TensorgradError::invalid_argument(format!(
                "dimension {} out of range for shape with {} dimensions",
                dim,
                self.dims.len()
            ))
        })
    }

    /// Compute the shape resulting from broadcasting `self` with `other`.
    ///
    /// Standard rules: dimensions are aligned from the trailing end, and a
    /// size-1 dimension stretches to match the other operand.
    pub fn broadcast_with(&self, other: &Shape) -> Result<Shape> {
        let lhs = &self.dims;
        let rhs = &other.dims;
        let ndim = lhs.len().max(rhs.len());
        let mut dims = vec![0; ndim];

        for i in 0..ndim {
            let l = if i < ndim - lhs.len() {
                1
            } else {
                lhs[i - (ndim - lhs.len())]
            };
            let r = if i < ndim - rhs.len() {
                1
            } else {
                rhs[i - (ndim - rhs.len())]
            };

            dims[i] = if l == r {
                l
            } else if l == 1 {
                r
            } else if r == 1 {
                l
            } else {
                return Err(TensorgradError::broadcast_error(lhs, rhs));
            };
        }

        Ok(Shape::new(dims))
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.dims)
    }
}

/// Row-major memory strides, in elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strides {
    strides: Vec<usize>,
}

impl Strides {
    /// Contiguous row-major strides for a shape
    pub fn from_shape(shape: &Shape) -> Self {
        let dims = shape.dims();
        let mut strides = vec![1; dims.len()];
        for i in (0..dims.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * dims[i + 1];
        }
        Self { strides }
    }

    #[inline(always)]
    pub fn as_slice(&self) -> &[usize] {
        &self.strides
    }

    /// Whether these strides describe a contiguous row-major layout for the
    /// given shape
    #[inline(always)]
    pub fn is_contiguous(&self, shape: &Shape) -> bool {
        *self == Strides::from_shape(shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_basics() {
        let shape = Shape::new(vec![2, 3, 4]);
        assert_eq!(shape.ndim(), 3);
        assert_eq!(shape.numel(), 24);
        assert_eq!(shape.dims(), &[2, 3, 4]);
        assert_eq!(shape.size(1).unwrap(), 3);
        assert!(shape.size(3).is_err());
    }

    #[test]
    fn test_scalar_shape() {
        let shape = Shape::scalar();
        assert_eq!(shape.ndim(), 0);
        assert_eq!(shape.numel(), 1);
    }

    #[test]
    fn test_broadcast_same_shape() {
        let a = Shape::new(vec![2, 3]);
        let b = Shape::new(vec![2, 3]);
        assert_eq!(a.broadcast_with(&b).unwrap().dims(), &[2, 3]);
    }

    #[test]
    fn test_broadcast_stretch() {
        let a = Shape::new(vec![3, 1]);
        let b = Shape::new(vec![1, 2]);
        assert_eq!(a.broadcast_with(&b).unwrap().dims(), &[3, 2]);
    }

    #[test]
    fn test_broadcast_trailing_alignment() {
        let a = Shape::new(vec![2, 3, 4]);
        let b = Shape::new(vec![4]);
        assert_eq!(a.broadcast_with(&b).unwrap().dims(), &[2, 3, 4]);
    }

    #[test]
    fn test_broadcast_scalar() {
        let a = Shape::new(vec![2, 3]);
        let b = Shape::scalar();
        assert_eq!(a.broadcast_with(&b).unwrap().dims(), &[2, 3]);
    }

    #[test]
    fn test_broadcast_incompatible() {
        let a = Shape::new(vec![3]);
        let b = Shape::new(vec![2]);
        assert!(a.broadcast_with(&b).is_err());
    }

    #[test]
    fn test_strides_row_major() {
        let shape = Shape::new(vec![2, 3, 4]);
        let strides = Strides::from_shape(&shape);
        assert_eq!(strides.as_slice(), &[12, 4, 1]);
        assert!(strides.is_contiguous(&shape));
    }

    #[test]
    fn test_strides_scalar() {
        let shape = Shape::scalar();
        let strides = Strides::from_shape(&shape);
        assert!(strides.as_slice().is_empty());
        assert!(strides.is_contiguous(&shape));
    }
}
