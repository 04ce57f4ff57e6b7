// Copyright (c) 2026 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the Apache-style license found in the
// LICENSE file in the root directory of this source tree.

use crate::{
    autograd::{GradientFunction, TensorId},
    error::{Result, TensorgradError},
    operations::{arithmetic, linalg, reduction},
    tensor::{DataType, Shape, Tensor, TensorData},
};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::Arc;

/// Accumulate a partial gradient into the map, adding when the input already
/// has an entry. Required when the same tensor feeds an operation twice
/// (e.g. `x * x`).
fn accumulate_into(
    map: &mut FxHashMap<TensorId, Tensor>,
    id: TensorId,
    grad: Tensor,
) -> Result<()> {
    match map.get_mut(&id) {
        Some(existing) => {
            *existing = arithmetic::add(existing, &grad)?;
        }
        None => {
            map.insert(id, grad);
        }
    }
    Ok(())
}

/// Reduce a cotangent back down to an operand's original shape after the
/// forward pass broadcast it up: sum over the extra leading axes and over
/// every axis the operand contributed as size 1.
pub(crate) fn reduce_gradient_for_broadcasting(
    grad_output: &Tensor,
    target_shape: &Shape,
) -> Result<Tensor> {
    if grad_output.shape() == target_shape {
        return Ok(grad_output.clone());
    }

    let grad_dims = grad_output.shape().dims();
    let target_dims = target_shape.dims();
    if target_dims.len() > grad_dims.len() {
        return Err(TensorgradError::broadcast_error(grad_dims, target_dims));
    }
    let extra = grad_dims.len() - target_dims.len();

    let mut axes_to_sum: SmallVec<[usize; 8]> = SmallVec::with_capacity(grad_dims.len());
    axes_to_sum.extend(0..extra);
    for i in 0..target_dims.len() {
        let gdim = grad_dims[extra + i];
        let tdim = target_dims[i];
        if tdim == 1 {
            if gdim != 1 {
                axes_to_sum.push(extra + i);
            }
        } else if gdim != tdim {
            return Err(TensorgradError::broadcast_error(grad_dims, target_dims));
        }
    }

    let mut grad = grad_output.clone();
    for &axis in &axes_to_sum {
        grad = reduction::sum(&grad, Some(axis), true)?;
    }

    if grad.shape() != target_shape {
        grad = grad.view(target_shape.clone())?;
    }

    Ok(grad)
}

/// Reinsert the reduced axis into a reduction gradient so it broadcasts
/// against the pre-reduction shape. The forward pass dropped the axis when
/// `keepdim` was false.
fn expand_reduction_grad(
    grad_output: &Tensor,
    input_ndim: usize,
    dim: Option<usize>,
    keepdim: bool,
) -> Result<Tensor> {
    if keepdim {
        return Ok(grad_output.clone());
    }
    match dim {
        Some(d) => {
            let mut dims = grad_output.shape().dims().to_vec();
            dims.insert(d, 1);
            grad_output.view(Shape::new(dims))
        }
        None => grad_output.view(Shape::new(vec![1; input_ndim])),
    }
}

fn scalar_tensor(value: f64, dtype: DataType, device: crate::device::Device) -> Tensor {
    Tensor::full(Shape::scalar(), value, dtype, device, false)
}

/// Gradient function for tensor cloning
pub struct CloneBackward {
    pub input_id: TensorId,
}

impl GradientFunction for CloneBackward {
    fn backward(&self, grad_output: &Tensor) -> Result<FxHashMap<TensorId, Tensor>> {
        let mut gradients = FxHashMap::default();
        let data = Arc::new(grad_output.data().clone_data());
        let copied = Tensor::new(
            data,
            grad_output.shape().clone(),
            grad_output.dtype(),
            grad_output.device(),
            false,
        );
        gradients.insert(self.input_id, copied);
        Ok(gradients)
    }

    fn input_ids(&self) -> &[TensorId] {
        std::slice::from_ref(&self.input_id)
    }
}

/// Gradient function for addition
pub struct AddBackward {
    pub input_shapes: [Vec<usize>; 2],
    pub input_ids: [TensorId; 2],
}

impl GradientFunction for AddBackward {
    fn backward(&self, grad_output: &Tensor) -> Result<FxHashMap<TensorId, Tensor>> {
        let mut gradients = FxHashMap::default();

        let lhs_shape = Shape::new(self.input_shapes[0].clone());
        let rhs_shape = Shape::new(self.input_shapes[1].clone());

        let lhs_grad = reduce_gradient_for_broadcasting(grad_output, &lhs_shape)?;
        let rhs_grad = reduce_gradient_for_broadcasting(grad_output, &rhs_shape)?;

        accumulate_into(&mut gradients, self.input_ids[0], lhs_grad)?;
        accumulate_into(&mut gradients, self.input_ids[1], rhs_grad)?;

        Ok(gradients)
    }

    fn input_ids(&self) -> &[TensorId] {
        &self.input_ids
    }
}

/// Gradient function for subtraction
pub struct SubBackward {
    pub input_shapes: [Vec<usize>; 2],
    pub input_ids: [TensorId; 2],
}

impl GradientFunction for SubBackward {
    fn backward(&self, grad_output: &Tensor) -> Result<FxHashMap<TensorId, Tensor>> {
        let mut gradients = FxHashMap::default();

        let lhs_shape = Shape::new(self.input_shapes[0].clone());
        let rhs_shape = Shape::new(self.input_shapes[1].clone());

        let lhs_grad = reduce_gradient_for_broadcasting(grad_output, &lhs_shape)?;
        let rhs_base = reduce_gradient_for_broadcasting(grad_output, &rhs_shape)?;
        let rhs_grad = arithmetic::neg(&rhs_base)?;

        accumulate_into(&mut gradients, self.input_ids[0], lhs_grad)?;
        accumulate_into(&mut gradients, self.input_ids[1], rhs_grad)?;

        Ok(gradients)
    }

    fn input_ids(&self) -> &[TensorId] {
        &self.input_ids
    }
}

/// Gradient function for multiplication
pub struct MulBackward {
    pub lhs: Tensor,
    pub rhs: Tensor,
    pub input_ids: [TensorId; 2],
}

impl GradientFunction for MulBackward {
    fn backward(&self, grad_output: &Tensor) -> Result<FxHashMap<TensorId, Tensor>> {
        let mut gradients = FxHashMap::default();

        // d/dx(x*y) = y and d/dy(x*y) = x
        let lhs_term = arithmetic::mul(grad_output, &self.rhs)?;
        let rhs_term = arithmetic::mul(grad_output, &self.lhs)?;

        let lhs_grad = reduce_gradient_for_broadcasting(&lhs_term, self.lhs.shape())?;
        let rhs_grad = reduce_gradient_for_broadcasting(&rhs_term, self.rhs.shape())?;

        accumulate_into(&mut gradients, self.input_ids[0], lhs_grad)?;
        accumulate_into(&mut gradients, self.input_ids[1], rhs_grad)?;

        Ok(gradients)
    }

    fn input_ids(&self) -> &[TensorId] {
        &self.input_ids
    }
}

/// Gradient function for division
pub struct DivBackward {
    pub lhs: Tensor,
    pub rhs: Tensor,
    pub input_ids: [TensorId; 2],
}

impl GradientFunction for DivBackward {
    fn backward(&self, grad_output: &Tensor) -> Result<FxHashMap<TensorId, Tensor>> {
        let mut gradients = FxHashMap::default();

        // d/dx(x/y) = 1/y
        let lhs_term = arithmetic::div(grad_output, &self.rhs)?;
        let lhs_grad = reduce_gradient_for_broadcasting(&lhs_term, self.lhs.shape())?;

        // d/dy(x/y) = -x/y^2
        let num = arithmetic::mul(grad_output, &self.lhs)?;
        let rhs_sq = arithmetic::mul(&self.rhs, &self.rhs)?;
        let rhs_term = arithmetic::neg(&arithmetic::div(&num, &rhs_sq)?)?;
        let rhs_grad = reduce_gradient_for_broadcasting(&rhs_term, self.rhs.shape())?;

        accumulate_into(&mut gradients, self.input_ids[0], lhs_grad)?;
        accumulate_into(&mut gradients, self.input_ids[1], rhs_grad)?;

        Ok(gradients)
    }

    fn input_ids(&self) -> &[TensorId] {
        &self.input_ids
    }
}

/// Gradient function for negation
pub struct NegBackward {
    pub input_id: TensorId,
}

impl GradientFunction for NegBackward {
    fn backward(&self, grad_output: &Tensor) -> Result<FxHashMap<TensorId, Tensor>> {
        let mut gradients = FxHashMap::default();
        let grad = arithmetic::neg(grad_output)?;
        gradients.insert(self.input_id, grad);
        Ok(gradients)
    }

    fn input_ids(&self) -> &[TensorId] {
        std::slice::from_ref(&self.input_id)
    }
}

/// Gradient function for the exponential
pub struct ExpBackward {
    pub input_id: TensorId,
    pub output: Tensor,
}

impl GradientFunction for ExpBackward {
    fn backward(&self, grad_output: &Tensor) -> Result<FxHashMap<TensorId, Tensor>> {
        let mut gradients = FxHashMap::default();

        // d/dx(exp(x)) = exp(x), recovered from the saved forward output
        let grad = arithmetic::mul(&self.output, grad_output)?;
        gradients.insert(self.input_id, grad);

        Ok(gradients)
    }

    fn input_ids(&self) -> &[TensorId] {
        std::slice::from_ref(&self.input_id)
    }
}

/// Gradient function for the natural logarithm
pub struct LogBackward {
    pub input_id: TensorId,
    pub input: Tensor,
}

impl GradientFunction for LogBackward {
    fn backward(&self, grad_output: &Tensor) -> Result<FxHashMap<TensorId, Tensor>> {
        let mut gradients = FxHashMap::default();

        // d/dx(log(x)) = 1/x
        let grad = arithmetic::div(grad_output, &self.input)?;
        gradients.insert(self.input_id, grad);

        Ok(gradients)
    }

    fn input_ids(&self) -> &[TensorId] {
        std::slice::from_ref(&self.input_id)
    }
}

/// Gradient function for element-wise power
pub struct PowBackward {
    pub base: Tensor,
    pub exponent: Tensor,
    pub output: Tensor,
    pub input_ids: [TensorId; 2],
    pub base_requires_grad: bool,
    pub exp_requires_grad: bool,
}

impl GradientFunction for PowBackward {
    fn backward(&self, grad_output: &Tensor) -> Result<FxHashMap<TensorId, Tensor>> {
        let mut gradients = FxHashMap::default();

        if self.base_requires_grad {
            // d/db(b^e) = e * b^(e-1)
            let ones = Tensor::ones(
                self.exponent.shape().clone(),
                self.exponent.dtype(),
                self.exponent.device(),
                false,
            );
            let exp_minus_one = arithmetic::sub(&self.exponent, &ones)?;
            let pow_term = arithmetic::pow(&self.base, &exp_minus_one)?;
            let local = arithmetic::mul(&self.exponent, &pow_term)?;
            let term = arithmetic::mul(grad_output, &local)?;
            let reduced = reduce_gradient_for_broadcasting(&term, self.base.shape())?;
            accumulate_into(&mut gradients, self.input_ids[0], reduced)?;
        }

        if self.exp_requires_grad {
            // d/de(b^e) = b^e * ln(b), recovered from the saved forward output
            let ln_base = arithmetic::log(&self.base)?;
            let local = arithmetic::mul(&self.output, &ln_base)?;
            let term = arithmetic::mul(grad_output, &local)?;
            let reduced = reduce_gradient_for_broadcasting(&term, self.exponent.shape())?;
            accumulate_into(&mut gradients, self.input_ids[1], reduced)?;
        }

        Ok(gradients)
    }

    fn input_ids(&self) -> &[TensorId] {
        &self.input_ids
    }
}

/// Gradient function for matrix multiplication
pub struct MatMulBackward {
    pub lhs: Tensor,
    pub rhs: Tensor,
    pub input_ids: [TensorId; 2],
    pub lhs_requires_grad: bool,
    pub rhs_requires_grad: bool,
}

impl GradientFunction for MatMulBackward {
    fn backward(&self, grad_output: &Tensor) -> Result<FxHashMap<TensorId, Tensor>> {
        let mut gradients = FxHashMap::default();

        if self.lhs_requires_grad {
            // dL/dA = dL/dZ @ B^T
            let rhs_t = linalg::transpose(&self.rhs)?;
            let lhs_grad = linalg::matmul(grad_output, &rhs_t)?;
            accumulate_into(&mut gradients, self.input_ids[0], lhs_grad)?;
        }

        if self.rhs_requires_grad {
            // dL/dB = A^T @ dL/dZ
            let lhs_t = linalg::transpose(&self.lhs)?;
            let rhs_grad = linalg::matmul(&lhs_t, grad_output)?;
            accumulate_into(&mut gradients, self.input_ids[1], rhs_grad)?;
        }

        Ok(gradients)
    }

    fn input_ids(&self) -> &[TensorId] {
        &self.input_ids
    }
}

/// Gradient function for sum reduction
pub struct SumBackward {
    pub input_id: TensorId,
    pub input_shape: Vec<usize>,
    pub dim: Option<usize>,
    pub keepdim: bool,
}

impl GradientFunction for SumBackward {
    fn backward(&self, grad_output: &Tensor) -> Result<FxHashMap<TensorId, Tensor>> {
        let mut gradients = FxHashMap::default();

        let grad =
            expand_reduction_grad(grad_output, self.input_shape.len(), self.dim, self.keepdim)?;
        let ones = Tensor::ones(
            Shape::new(self.input_shape.clone()),
            grad_output.dtype(),
            grad_output.device(),
            false,
        );
        let grad_input = arithmetic::mul(&ones, &grad)?;
        gradients.insert(self.input_id, grad_input);

        Ok(gradients)
    }

    fn input_ids(&self) -> &[TensorId] {
        std::slice::from_ref(&self.input_id)
    }
}

/// Gradient function for mean reduction
pub struct MeanBackward {
    pub input_id: TensorId,
    pub input_shape: Vec<usize>,
    pub dim: Option<usize>,
    pub keepdim: bool,
}

impl GradientFunction for MeanBackward {
    fn backward(&self, grad_output: &Tensor) -> Result<FxHashMap<TensorId, Tensor>> {
        let mut gradients = FxHashMap::default();

        let count = match self.dim {
            Some(d) => self.input_shape[d],
            None => self.input_shape.iter().product(),
        };

        let grad =
            expand_reduction_grad(grad_output, self.input_shape.len(), self.dim, self.keepdim)?;
        let scale = scalar_tensor(
            1.0 / count as f64,
            grad_output.dtype(),
            grad_output.device(),
        );
        let grad = arithmetic::mul(&grad, &scale)?;
        let ones = Tensor::ones(
            Shape::new(self.input_shape.clone()),
            grad_output.dtype(),
            grad_output.device(),
            false,
        );
        let grad_input = arithmetic::mul(&ones, &grad)?;
        gradients.insert(self.input_id, grad_input);

        Ok(gradients)
    }

    fn input_ids(&self) -> &[TensorId] {
        std::slice::from_ref(&self.input_id)
    }
}

/// Gradient function for max reduction.
///
/// The arg-max mask is rebuilt from the saved input values; positions that
/// tie for the maximum all receive the full incoming gradient.
pub struct MaxBackward {
    pub input_id: TensorId,
    pub input: Tensor,
    pub dim: Option<usize>,
    pub keepdim: bool,
}

fn max_backward_fill<T: Copy + PartialOrd>(
    input: &[T],
    grad_output: &[T],
    out: &mut [T],
    dims: &[usize],
    dim: Option<usize>,
    zero: T,
) {
    match dim {
        None => {
            let Some(&first) = input.first() else {
                return;
            };
            let mut max_val = first;
            for &v in &input[1..] {
                if v > max_val {
                    max_val = v;
                }
            }
            let g = grad_output[0];
            for (o, &v) in out.iter_mut().zip(input.iter()) {
                *o = if v == max_val { g } else { zero };
            }
        }
        Some(d) => {
            let axis = dims[d];
            if axis == 0 {
                return;
            }
            let after: usize = dims[d + 1..].iter().product();
            let before: usize = dims[..d].iter().product();
            for b in 0..before {
                for a in 0..after {
                    let base = b * axis * after + a;
                    let mut max_val = input[base];
                    for k in 1..axis {
                        let v = input[base + k * after];
                        if v > max_val {
                            max_val = v;
                        }
                    }
                    let g = grad_output[b * after + a];
                    for k in 0..axis {
                        let idx = base + k * after;
                        out[idx] = if input[idx] == max_val { g } else { zero };
                    }
                }
            }
        }
    }
}

impl GradientFunction for MaxBackward {
    fn backward(&self, grad_output: &Tensor) -> Result<FxHashMap<TensorId, Tensor>> {
        let mut gradients = FxHashMap::default();

        let dims = self.input.shape().dims();
        let mut grad_data = TensorData::zeros_on_device(
            self.input.numel(),
            grad_output.dtype(),
            grad_output.device(),
        );

        match grad_output.dtype() {
            DataType::Float32 => {
                let input = self.input.data().as_f32_slice().ok_or_else(|| {
                    TensorgradError::internal_error("failed to get f32 slice from saved max input")
                })?;
                let go = grad_output.data().as_f32_slice().ok_or_else(|| {
                    TensorgradError::internal_error("failed to get f32 slice from grad output")
                })?;
                let out = grad_data.as_f32_slice_mut().ok_or_else(|| {
                    TensorgradError::internal_error("failed to get mutable f32 slice")
                })?;
                max_backward_fill(input, go, out, dims, self.dim, 0.0f32);
            }
            DataType::Float64 => {
                let input = self.input.data().as_f64_slice().ok_or_else(|| {
                    TensorgradError::internal_error("failed to get f64 slice from saved max input")
                })?;
                let go = grad_output.data().as_f64_slice().ok_or_else(|| {
                    TensorgradError::internal_error("failed to get f64 slice from grad output")
                })?;
                let out = grad_data.as_f64_slice_mut().ok_or_else(|| {
                    TensorgradError::internal_error("failed to get mutable f64 slice")
                })?;
                max_backward_fill(input, go, out, dims, self.dim, 0.0f64);
            }
        }

        let grad_input = Tensor::new(
            Arc::new(grad_data),
            self.input.shape().clone(),
            grad_output.dtype(),
            grad_output.device(),
            false,
        );
        gradients.insert(self.input_id, grad_input);

        Ok(gradients)
    }

    fn input_ids(&self) -> &[TensorId] {
        std::slice::from_ref(&self.input_id)
    }
}
