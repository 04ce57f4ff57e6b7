// Copyright (c) 2026 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the Apache-style license found in the
// LICENSE file in the root directory of this source tree.

use crate::{
    error::Result,
    operations::PAR_THRESHOLD,
    tensor::{core::Tensor, dtype::DataType},
};
use rayon::prelude::*;

impl Tensor {
    /// Element-wise addition with broadcasting
    #[inline(always)]
    pub fn add(&self, other: &Tensor) -> Result<Self> {
        crate::operations::arithmetic::add(self, other)
    }

    /// Element-wise subtraction with broadcasting
    #[inline(always)]
    pub fn sub(&self, other: &Tensor) -> Result<Self> {
        crate::operations::arithmetic::sub(self, other)
    }

    /// Element-wise multiplication with broadcasting
    #[inline(always)]
    pub fn mul(&self, other: &Tensor) -> Result<Self> {
        crate::operations::arithmetic::mul(self, other)
    }

    /// Element-wise division with broadcasting
    #[inline(always)]
    pub fn div(&self, other: &Tensor) -> Result<Self> {
        crate::operations::arithmetic::div(self, other)
    }

    /// Element-wise negation
    #[inline(always)]
    pub fn neg(&self) -> Result<Self> {
        crate::operations::arithmetic::neg(self)
    }

    /// Element-wise exponential
    #[inline(always)]
    pub fn exp(&self) -> Result<Self> {
        crate::operations::arithmetic::exp(self)
    }

    /// Element-wise natural logarithm
    #[inline(always)]
    pub fn log(&self) -> Result<Self> {
        crate::operations::arithmetic::log(self)
    }

    /// Element-wise power with a tensor exponent
    #[inline(always)]
    pub fn pow(&self, exponent: &Tensor) -> Result<Self> {
        crate::operations::arithmetic::pow(self, exponent)
    }

    /// Element-wise power with a scalar exponent
    #[inline(always)]
    pub fn powf(&self, exponent: f64) -> Result<Self> {
        crate::operations::arithmetic::powf(self, exponent)
    }

    /// Matrix multiplication for 2-D operands
    #[inline(always)]
    pub fn matmul(&self, other: &Tensor) -> Result<Self> {
        crate::operations::linalg::matmul(self, other)
    }

    /// Matrix transpose for 2-D operands. The result is detached from the
    /// computation graph.
    #[inline(always)]
    pub fn t(&self) -> Result<Self> {
        crate::operations::linalg::transpose(self)
    }

    /// Sum over all axes (`dim = None`) or a single axis
    #[inline(always)]
    pub fn sum(&self, dim: Option<usize>, keepdim: bool) -> Result<Self> {
        crate::operations::reduction::sum(self, dim, keepdim)
    }

    /// Mean over all axes (`dim = None`) or a single axis
    #[inline(always)]
    pub fn mean(&self, dim: Option<usize>, keepdim: bool) -> Result<Self> {
        crate::operations::reduction::mean(self, dim, keepdim)
    }

    /// Maximum over all axes (`dim = None`) or a single axis
    #[inline(always)]
    pub fn max(&self, dim: Option<usize>, keepdim: bool) -> Result<Self> {
        crate::operations::reduction::max(self, dim, keepdim)
    }

    /// Check if tensors are approximately equal
    pub fn allclose(&self, other: &Tensor, rtol: f64, atol: f64) -> bool {
        if self.shape() != other.shape() || self.dtype() != other.dtype() {
            return false;
        }

        let numel = self.numel();
        match self.dtype() {
            DataType::Float32 => {
                let (Some(lhs), Some(rhs)) =
                    (self.data().as_f32_slice(), other.data().as_f32_slice())
                else {
                    return false;
                };
                let close = |(&a, &b): (&f32, &f32)| {
                    (a - b).abs() <= atol as f32 + rtol as f32 * b.abs()
                };
                if numel >= PAR_THRESHOLD {
                    lhs.par_iter().zip(rhs.par_iter()).all(close)
                } else {
                    lhs.iter().zip(rhs.iter()).all(close)
                }
            }
            DataType::Float64 => {
                let (Some(lhs), Some(rhs)) =
                    (self.data().as_f64_slice(), other.data().as_f64_slice())
                else {
                    return false;
                };
                let close = |(&a, &b): (&f64, &f64)| (a - b).abs() <= atol + rtol * b.abs();
                if numel >= PAR_THRESHOLD {
                    lhs.par_iter().zip(rhs.par_iter()).all(close)
                } else {
                    lhs.iter().zip(rhs.iter()).all(close)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::shape::Shape;

    #[test]
    fn test_allclose() {
        let a = Tensor::from_vec_f32(vec![1.0, 2.0], Shape::new(vec![2]), false).unwrap();
        let b = Tensor::from_vec_f32(vec![1.0 + 1e-7, 2.0], Shape::new(vec![2]), false).unwrap();
        assert!(a.allclose(&b, 1e-5, 1e-6));

        let c = Tensor::from_vec_f32(vec![1.5, 2.0], Shape::new(vec![2]), false).unwrap();
        assert!(!a.allclose(&c, 1e-5, 1e-6));
    }

    #[test]
    fn test_allclose_shape_mismatch() {
        let a = Tensor::from_vec_f32(vec![1.0, 2.0], Shape::new(vec![2]), false).unwrap();
        let b = Tensor::from_vec_f32(vec![1.0, 2.0], Shape::new(vec![2, 1]), false).unwrap();
        assert!(!a.allclose(&b, 1e-5, 1e-6));
    }
}
