// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the BSD-style license found in the
// LICENSE file in the root directory of this source tree.

use crate::{
    backends::simd,
    error::{Result, TensorgradError},
    operations::PAR_THRESHOLD,
    tensor::{DataType, Shape, Tensor, TensorData},
};
use rayon::prelude::*;

/// Generic broadcasting binary kernel over flat row-major buffers.
///
/// Operand shapes are padded with leading size-1 axes to the output rank and
/// broadcast axes are given stride 0, so each output position maps straight
/// to its source elements.
pub(crate) fn broadcast_binary_op<T, F>(
    lhs: &[T],
    rhs: &[T],
    output: &mut [T],
    lhs_shape: &Shape,
    rhs_shape: &Shape,
    output_shape: &Shape,
    op: F,
) -> Result<()>
where
    T: Copy + Send + Sync,
    F: Fn(T, T) -> T + Send + Sync,
{
    let out_dims = output_shape.dims();
    let n = out_dims.len();

    let pad = |dims: &[usize]| {
        let mut padded = vec![1usize; n];
        padded[n - dims.len()..].copy_from_slice(dims);
        padded
    };
    let lhs_pad = pad(lhs_shape.dims());
    let rhs_pad = pad(rhs_shape.dims());

    let mut out_strides = vec![1usize; n];
    let mut lhs_strides = vec![1usize; n];
    let mut rhs_strides = vec![1usize; n];
    for d in (0..n.saturating_sub(1)).rev() {
        out_strides[d] = out_strides[d + 1] * out_dims[d + 1];
        lhs_strides[d] = lhs_strides[d + 1] * lhs_pad[d + 1];
        rhs_strides[d] = rhs_strides[d + 1] * rhs_pad[d + 1];
    }
    for d in 0..n {
        if lhs_pad[d] == 1 {
            lhs_strides[d] = 0;
        }
        if rhs_pad[d] == 1 {
            rhs_strides[d] = 0;
        }
    }

    let body = |(pos, out): (usize, &mut T)| {
        let mut lhs_idx = 0;
        let mut rhs_idx = 0;
        for d in 0..n {
            let coord = (pos / out_strides[d]) % out_dims[d];
            lhs_idx += coord * lhs_strides[d];
            rhs_idx += coord * rhs_strides[d];
        }
        *out = op(lhs[lhs_idx], rhs[rhs_idx]);
    };

    if output.len() >= PAR_THRESHOLD {
        output.par_iter_mut().enumerate().for_each(body);
    } else {
        output.iter_mut().enumerate().for_each(body);
    }

    Ok(())
}

fn binary_slices_f32<'a>(
    lhs: &'a Tensor,
    rhs: &'a Tensor,
    output: &'a mut TensorData,
) -> Result<(&'a [f32], &'a [f32], &'a mut [f32])> {
    let lhs_data = lhs
        .data()
        .as_f32_slice()
        .ok_or_else(|| TensorgradError::internal_error("failed to get f32 slice from lhs"))?;
    let rhs_data = rhs
        .data()
        .as_f32_slice()
        .ok_or_else(|| TensorgradError::internal_error("failed to get f32 slice from rhs"))?;
    let out = output
        .as_f32_slice_mut()
        .ok_or_else(|| TensorgradError::internal_error("failed to get mutable f32 slice"))?;
    Ok((lhs_data, rhs_data, out))
}

fn binary_slices_f64<'a>(
    lhs: &'a Tensor,
    rhs: &'a Tensor,
    output: &'a mut TensorData,
) -> Result<(&'a [f64], &'a [f64], &'a mut [f64])> {
    let lhs_data = lhs
        .data()
        .as_f64_slice()
        .ok_or_else(|| TensorgradError::internal_error("failed to get f64 slice from lhs"))?;
    let rhs_data = rhs
        .data()
        .as_f64_slice()
        .ok_or_else(|| TensorgradError::internal_error("failed to get f64 slice from rhs"))?;
    let out = output
        .as_f64_slice_mut()
        .ok_or_else(|| TensorgradError::internal_error("failed to get mutable f64 slice"))?;
    Ok((lhs_data, rhs_data, out))
}

/// CPU forward kernel for element-wise addition
pub fn add_kernel(
    lhs: &Tensor,
    rhs: &Tensor,
    output: &mut TensorData,
    output_shape: &Shape,
) -> Result<()> {
    let fast = simd::can_use_simd_fast_path(lhs.shape(), rhs.shape(), output_shape);
    match lhs.dtype() {
        DataType::Float32 => {
            let (a, b, out) = binary_slices_f32(lhs, rhs, output)?;
            if fast {
                simd::simd_add_f32(a, b, out)
            } else {
                broadcast_binary_op(a, b, out, lhs.shape(), rhs.shape(), output_shape, |x, y| {
                    x + y
                })
            }
        }
        DataType::Float64 => {
            let (a, b, out) = binary_slices_f64(lhs, rhs, output)?;
            if fast {
                simd::simd_add_f64(a, b, out)
            } else {
                broadcast_binary_op(a, b, out, lhs.shape(), rhs.shape(), output_shape, |x, y| {
                    x + y
                })
            }
        }
    }
}

/// CPU forward kernel for element-wise subtraction
pub fn sub_kernel(
    lhs: &Tensor,
    rhs: &Tensor,
    output: &mut TensorData,
    output_shape: &Shape,
) -> Result<()> {
    let fast = simd::can_use_simd_fast_path(lhs.shape(), rhs.shape(), output_shape);
    match lhs.dtype() {
        DataType::Float32 => {
            let (a, b, out) = binary_slices_f32(lhs, rhs, output)?;
            if fast {
                simd::simd_sub_f32(a, b, out)
            } else {
                broadcast_binary_op(a, b, out, lhs.shape(), rhs.shape(), output_shape, |x, y| {
                    x - y
                })
            }
        }
        DataType::Float64 => {
            let (a, b, out) = binary_slices_f64(lhs, rhs, output)?;
            if fast {
                simd::simd_sub_f64(a, b, out)
            } else {
                broadcast_binary_op(a, b, out, lhs.shape(), rhs.shape(), output_shape, |x, y| {
                    x - y
                })
            }
        }
    }
}

/// CPU forward kernel for element-wise multiplication
pub fn mul_kernel(
    lhs: &Tensor,
    rhs: &Tensor,
    output: &mut TensorData,
    output_shape: &Shape,
) -> Result<()> {
    let fast = simd::can_use_simd_fast_path(lhs.shape(), rhs.shape(), output_shape);
    match lhs.dtype() {
        DataType::Float32 => {
            let (a, b, out) = binary_slices_f32(lhs, rhs, output)?;
            if fast {
                simd::simd_mul_f32(a, b, out)
            } else {
                broadcast_binary_op(a, b, out, lhs.shape(), rhs.shape(), output_shape, |x, y| {
                    x * y
                })
            }
        }
        DataType::Float64 => {
            let (a, b, out) = binary_slices_f64(lhs, rhs, output)?;
            if fast {
                simd::simd_mul_f64(a, b, out)
            } else {
                broadcast_binary_op(a, b, out, lhs.shape(), rhs.shape(), output_shape, |x, y| {
                    x * y
                })
            }
        }
    }
}

/// CPU forward kernel for element-wise division
pub fn div_kernel(
    lhs: &Tensor,
    rhs: &Tensor,
    output: &mut TensorData,
    output_shape: &Shape,
) -> Result<()> {
    let fast = simd::can_use_simd_fast_path(lhs.shape(), rhs.shape(), output_shape);
    match lhs.dtype() {
        DataType::Float32 => {
            let (a, b, out) = binary_slices_f32(lhs, rhs, output)?;
            if fast {
                simd::simd_div_f32(a, b, out)
            } else {
                broadcast_binary_op(a, b, out, lhs.shape(), rhs.shape(), output_shape, |x, y| {
                    if y == 0.0 {
                        f32::INFINITY
                    } else {
                        x / y
                    }
                })
            }
        }
        DataType::Float64 => {
            let (a, b, out) = binary_slices_f64(lhs, rhs, output)?;
            if fast {
                simd::simd_div_f64(a, b, out)
            } else {
                broadcast_binary_op(a, b, out, lhs.shape(), rhs.shape(), output_shape, |x, y| {
                    if y == 0.0 {
                        f64::INFINITY
                    } else {
                        x / y
                    }
                })
            }
        }
    }
}

/// CPU forward kernel for element-wise power
pub fn pow_kernel(
    lhs: &Tensor,
    rhs: &Tensor,
    output: &mut TensorData,
    output_shape: &Shape,
) -> Result<()> {
    match lhs.dtype() {
        DataType::Float32 => {
            let (a, b, out) = binary_slices_f32(lhs, rhs, output)?;
            broadcast_binary_op(a, b, out, lhs.shape(), rhs.shape(), output_shape, |x, y| {
                x.powf(y)
            })
        }
        DataType::Float64 => {
            let (a, b, out) = binary_slices_f64(lhs, rhs, output)?;
            broadcast_binary_op(a, b, out, lhs.shape(), rhs.shape(), output_shape, |x, y| {
                x.powf(y)
            })
        }
    }
}

/// CPU forward kernel for 2-D matrix multiplication.
/// The output buffer is expected to be zero-initialized.
pub fn matmul_kernel(
    lhs: &Tensor,
    rhs: &Tensor,
    output: &mut TensorData,
    _output_shape: &Shape,
) -> Result<()> {
    let (k, n) = (lhs.shape().dims()[1], rhs.shape().dims()[1]);
    if k == 0 || n == 0 {
        return Ok(());
    }

    match lhs.dtype() {
        DataType::Float32 => {
            let (a, b, out) = binary_slices_f32(lhs, rhs, output)?;
            matmul_2d(a, b, out, k, n);
        }
        DataType::Float64 => {
            let (a, b, out) = binary_slices_f64(lhs, rhs, output)?;
            matmul_2d(a, b, out, k, n);
        }
    }
    Ok(())
}

fn matmul_2d<T>(lhs: &[T], rhs: &[T], output: &mut [T], k: usize, n: usize)
where
    T: Copy + Send + Sync + std::ops::Mul<Output = T> + std::ops::AddAssign,
{
    output.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
        for p in 0..k {
            let a = lhs[i * k + p];
            let rhs_row = &rhs[p * n..(p + 1) * n];
            for (r, &b) in row.iter_mut().zip(rhs_row) {
                *r += a * b;
            }
        }
    });
}
