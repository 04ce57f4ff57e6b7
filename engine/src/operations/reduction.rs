// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the BSD-style license found in the
// LICENSE file in the root directory of this source tree.

use crate::{
    autograd::{
        add_to_graph,
        functions::{MaxBackward, MeanBackward, SumBackward},
    },
    error::{Result, TensorgradError},
    operations::PAR_THRESHOLD,
    tensor::{DataType, Shape, Tensor, TensorData},
};
use rayon::prelude::*;
use std::sync::Arc;

/// Shape of a reduction result: reducing all axes yields a scalar (or an
/// all-ones shape under keepdim); reducing one axis drops it or pins it to 1.
fn reduced_shape(dims: &[usize], dim: Option<usize>, keepdim: bool) -> Shape {
    match dim {
        None => {
            if keepdim {
                Shape::new(vec![1; dims.len()])
            } else {
                Shape::scalar()
            }
        }
        Some(d) => {
            let mut out = dims.to_vec();
            if keepdim {
                out[d] = 1;
            } else {
                out.remove(d);
            }
            Shape::new(out)
        }
    }
}

fn check_axis(tensor: &Tensor, dim: Option<usize>) -> Result<()> {
    if let Some(d) = dim {
        if d >= tensor.ndim() {
            return Err(TensorgradError::invalid_argument(format!(
                "reduction axis {} out of range for shape {}",
                d,
                tensor.shape()
            )));
        }
    }
    Ok(())
}

fn sum_all<T>(src: &[T]) -> T
where
    T: Copy + Send + Sync + std::iter::Sum<T>,
{
    if src.len() >= PAR_THRESHOLD {
        src.par_iter().copied().sum()
    } else {
        src.iter().copied().sum()
    }
}

fn sum_axis<T>(src: &[T], dims: &[usize], d: usize) -> Vec<T>
where
    T: Copy + Default + std::ops::AddAssign,
{
    let axis = dims[d];
    let after: usize = dims[d + 1..].iter().product();
    let before: usize = dims[..d].iter().product();

    let mut out = vec![T::default(); before * after];
    for b in 0..before {
        for k in 0..axis {
            let base = (b * axis + k) * after;
            for a in 0..after {
                out[b * after + a] += src[base + a];
            }
        }
    }
    out
}

fn max_all<T: Copy + PartialOrd>(src: &[T]) -> T {
    let mut max_val = src[0];
    for &v in &src[1..] {
        if v > max_val {
            max_val = v;
        }
    }
    max_val
}

fn max_axis<T: Copy + PartialOrd>(src: &[T], dims: &[usize], d: usize) -> Vec<T> {
    let axis = dims[d];
    let after: usize = dims[d + 1..].iter().product();
    let before: usize = dims[..d].iter().product();

    let mut out = Vec::with_capacity(before * after);
    for b in 0..before {
        for a in 0..after {
            let base = b * axis * after + a;
            let mut max_val = src[base];
            for k in 1..axis {
                let v = src[base + k * after];
                if v > max_val {
                    max_val = v;
                }
            }
            out.push(max_val);
        }
    }
    out
}

/// Sum over all axes (`dim = None`) or a single axis
pub fn sum(tensor: &Tensor, dim: Option<usize>, keepdim: bool) -> Result<Tensor> {
    check_axis(tensor, dim)?;

    let output_shape = reduced_shape(tensor.shape().dims(), dim, keepdim);
    let mut output_data =
        TensorData::zeros_on_device(output_shape.numel(), tensor.dtype(), tensor.device());

    match tensor.dtype() {
        DataType::Float32 => {
            let src = tensor.data().as_f32_slice().ok_or_else(|| {
                TensorgradError::internal_error("failed to get f32 slice for sum")
            })?;
            let dst = output_data.as_f32_slice_mut().ok_or_else(|| {
                TensorgradError::internal_error("failed to get mutable f32 slice for sum")
            })?;
            match dim {
                None => dst[0] = sum_all(src),
                Some(d) => dst.copy_from_slice(&sum_axis(src, tensor.shape().dims(), d)),
            }
        }
        DataType::Float64 => {
            let src = tensor.data().as_f64_slice().ok_or_else(|| {
                TensorgradError::internal_error("failed to get f64 slice for sum")
            })?;
            let dst = output_data.as_f64_slice_mut().ok_or_else(|| {
                TensorgradError::internal_error("failed to get mutable f64 slice for sum")
            })?;
            match dim {
                None => dst[0] = sum_all(src),
                Some(d) => dst.copy_from_slice(&sum_axis(src, tensor.shape().dims(), d)),
            }
        }
    }

    let output = Tensor::new(
        Arc::new(output_data),
        output_shape,
        tensor.dtype(),
        tensor.device(),
        tensor.requires_grad(),
    );

    if output.requires_grad() {
        let grad_fn = Arc::new(SumBackward {
            input_id: tensor.id(),
            input_shape: tensor.shape().dims().to_vec(),
            dim,
            keepdim,
        });

        let mut output_with_grad = output;
        output_with_grad.set_grad_fn(Some(grad_fn.clone()));
        add_to_graph(&output_with_grad, Some(grad_fn))?;
        Ok(output_with_grad)
    } else {
        Ok(output)
    }
}

/// Mean over all axes (`dim = None`) or a single axis
pub fn mean(tensor: &Tensor, dim: Option<usize>, keepdim: bool) -> Result<Tensor> {
    check_axis(tensor, dim)?;

    let count = match dim {
        Some(d) => tensor.shape().dims()[d],
        None => tensor.numel(),
    };
    if count == 0 {
        return Err(TensorgradError::invalid_operation(
            "mean of an empty axis is undefined",
        ));
    }

    let output_shape = reduced_shape(tensor.shape().dims(), dim, keepdim);
    let mut output_data =
        TensorData::zeros_on_device(output_shape.numel(), tensor.dtype(), tensor.device());

    match tensor.dtype() {
        DataType::Float32 => {
            let src = tensor.data().as_f32_slice().ok_or_else(|| {
                TensorgradError::internal_error("failed to get f32 slice for mean")
            })?;
            let dst = output_data.as_f32_slice_mut().ok_or_else(|| {
                TensorgradError::internal_error("failed to get mutable f32 slice for mean")
            })?;
            let scale = 1.0 / count as f32;
            match dim {
                None => dst[0] = sum_all(src) * scale,
                Some(d) => {
                    let sums = sum_axis(src, tensor.shape().dims(), d);
                    for (o, s) in dst.iter_mut().zip(sums) {
                        *o = s * scale;
                    }
                }
            }
        }
        DataType::Float64 => {
            let src = tensor.data().as_f64_slice().ok_or_else(|| {
                TensorgradError::internal_error("failed to get f64 slice for mean")
            })?;
            let dst = output_data.as_f64_slice_mut().ok_or_else(|| {
                TensorgradError::internal_error("failed to get mutable f64 slice for mean")
            })?;
            let scale = 1.0 / count as f64;
            match dim {
                None => dst[0] = sum_all(src) * scale,
                Some(d) => {
                    let sums = sum_axis(src, tensor.shape().dims(), d);
                    for (o, s) in dst.iter_mut().zip(sums) {
                        *o = s * scale;
                    }
                }
            }
        }
    }

    let output = Tensor::new(
        Arc::new(output_data),
        output_shape,
        tensor.dtype(),
        tensor.device(),
        tensor.requires_grad(),
    );

    if output.requires_grad() {
        let grad_fn = Arc::new(MeanBackward {
            input_id: tensor.id(),
            input_shape: tensor.shape().dims().to_vec(),
            dim,
            keepdim,
        });

        let mut output_with_grad = output;
        output_with_grad.set_grad_fn(Some(grad_fn.clone()));
        add_to_graph(&output_with_grad, Some(grad_fn))?;
        Ok(output_with_grad)
    } else {
        Ok(output)
    }
}

/// Maximum over all axes (`dim = None`) or a single axis
pub fn max(tensor: &Tensor, dim: Option<usize>, keepdim: bool) -> Result<Tensor> {
    check_axis(tensor, dim)?;
    if tensor.numel() == 0 {
        return Err(TensorgradError::invalid_operation(
            "max of an empty tensor is undefined",
        ));
    }

    let output_shape = reduced_shape(tensor.shape().dims(), dim, keepdim);
    let mut output_data =
        TensorData::zeros_on_device(output_shape.numel(), tensor.dtype(), tensor.device());

    match tensor.dtype() {
        DataType::Float32 => {
            let src = tensor.data().as_f32_slice().ok_or_else(|| {
                TensorgradError::internal_error("failed to get f32 slice for max")
            })?;
            let dst = output_data.as_f32_slice_mut().ok_or_else(|| {
                TensorgradError::internal_error("failed to get mutable f32 slice for max")
            })?;
            match dim {
                None => dst[0] = max_all(src),
                Some(d) => dst.copy_from_slice(&max_axis(src, tensor.shape().dims(), d)),
            }
        }
        DataType::Float64 => {
            let src = tensor.data().as_f64_slice().ok_or_else(|| {
                TensorgradError::internal_error("failed to get f64 slice for max")
            })?;
            let dst = output_data.as_f64_slice_mut().ok_or_else(|| {
                TensorgradError::internal_error("failed to get mutable f64 slice for max")
            })?;
            match dim {
                None => dst[0] = max_all(src),
                Some(d) => dst.copy_from_slice(&max_axis(src, tensor.shape().dims(), d)),
            }
        }
    }

    let output = Tensor::new(
        Arc::new(output_data),
        output_shape,
        tensor.dtype(),
        tensor.device(),
        tensor.requires_grad(),
    );

    if output.requires_grad() {
        let grad_fn = Arc::new(MaxBackward {
            input_id: tensor.id(),
            input: tensor.detach(),
            dim,
            keepdim,
        });

        let mut output_with_grad = output;
        output_with_grad.set_grad_fn(Some(grad_fn.clone()));
        add_to_graph(&output_with_grad, Some(grad_fn))?;
        Ok(output_with_grad)
    } else {
        Ok(output)
    }
}
