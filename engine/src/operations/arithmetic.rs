// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the BSD-style license found in the
// LICENSE file in the root directory of this source tree.

use crate::{
    autograd::{
        add_to_graph,
        functions::{
            AddBackward, DivBackward, ExpBackward, LogBackward, MulBackward, NegBackward,
            PowBackward, SubBackward,
        },
    },
    backends::registry::{self, OpKind},
    error::{Result, TensorgradError},
    operations::PAR_THRESHOLD,
    tensor::{DataType, Shape, Tensor, TensorData},
};
use rayon::prelude::*;
use std::sync::Arc;

/// Validate a binary operand pair and compute the broadcast output shape
fn check_binary_operands(lhs: &Tensor, rhs: &Tensor) -> Result<Shape> {
    if lhs.device() != rhs.device() {
        return Err(TensorgradError::device_mismatch(
            lhs.device().to_string(),
            rhs.device().to_string(),
        ));
    }
    if lhs.dtype() != rhs.dtype() {
        return Err(TensorgradError::type_mismatch(
            lhs.dtype().to_string(),
            rhs.dtype().to_string(),
        ));
    }
    lhs.shape().broadcast_with(rhs.shape())
}

/// Run a binary elementwise forward through the kernel dispatch table.
/// On failure no output node is created and the graph is untouched.
fn binary_forward(lhs: &Tensor, rhs: &Tensor, op: OpKind) -> Result<Tensor> {
    let output_shape = check_binary_operands(lhs, rhs)?;
    let mut output_data =
        TensorData::zeros_on_device(output_shape.numel(), lhs.dtype(), lhs.device());

    let kernel = registry::get_forward(op, lhs.device().device_type())?;
    kernel(lhs, rhs, &mut output_data, &output_shape)?;

    Ok(Tensor::new(
        Arc::new(output_data),
        output_shape,
        lhs.dtype(),
        lhs.device(),
        lhs.requires_grad() || rhs.requires_grad(),
    ))
}

/// Element-wise addition with broadcasting support
pub fn add(lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
    let output = binary_forward(lhs, rhs, OpKind::Add)?;

    if output.requires_grad() {
        let grad_fn = Arc::new(AddBackward {
            input_shapes: [lhs.shape().dims().to_vec(), rhs.shape().dims().to_vec()],
            input_ids: [lhs.id(), rhs.id()],
        });

        let mut output_with_grad = output;
        output_with_grad.set_grad_fn(Some(grad_fn.clone()));
        add_to_graph(&output_with_grad, Some(grad_fn))?;
        Ok(output_with_grad)
    } else {
        Ok(output)
    }
}

/// Element-wise subtraction with broadcasting support
pub fn sub(lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
    let output = binary_forward(lhs, rhs, OpKind::Sub)?;

    if output.requires_grad() {
        let grad_fn = Arc::new(SubBackward {
            input_shapes: [lhs.shape().dims().to_vec(), rhs.shape().dims().to_vec()],
            input_ids: [lhs.id(), rhs.id()],
        });

        let mut output_with_grad = output;
        output_with_grad.set_grad_fn(Some(grad_fn.clone()));
        add_to_graph(&output_with_grad, Some(grad_fn))?;
        Ok(output_with_grad)
    } else {
        Ok(output)
    }
}

/// Element-wise multiplication with broadcasting support
pub fn mul(lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
    let output = binary_forward(lhs, rhs, OpKind::Mul)?;

    if output.requires_grad() {
        let grad_fn = Arc::new(MulBackward {
            lhs: lhs.detach(),
            rhs: rhs.detach(),
            input_ids: [lhs.id(), rhs.id()],
        });

        let mut output_with_grad = output;
        output_with_grad.set_grad_fn(Some(grad_fn.clone()));
        add_to_graph(&output_with_grad, Some(grad_fn))?;
        Ok(output_with_grad)
    } else {
        Ok(output)
    }
}

/// Element-wise division with broadcasting support
pub fn div(lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
    let output = binary_forward(lhs, rhs, OpKind::Div)?;

    if output.requires_grad() {
        let grad_fn = Arc::new(DivBackward {
            lhs: lhs.detach(),
            rhs: rhs.detach(),
            input_ids: [lhs.id(), rhs.id()],
        });

        let mut output_with_grad = output;
        output_with_grad.set_grad_fn(Some(grad_fn.clone()));
        add_to_graph(&output_with_grad, Some(grad_fn))?;
        Ok(output_with_grad)
    } else {
        Ok(output)
    }
}

/// Element-wise power with broadcasting support
pub fn pow(base: &Tensor, exponent: &Tensor) -> Result<Tensor> {
    let output = binary_forward(base, exponent, OpKind::Pow)?;

    if output.requires_grad() {
        let grad_fn = Arc::new(PowBackward {
            base: base.detach(),
            exponent: exponent.detach(),
            output: output.detach(),
            input_ids: [base.id(), exponent.id()],
            base_requires_grad: base.requires_grad(),
            exp_requires_grad: exponent.requires_grad(),
        });

        let mut output_with_grad = output;
        output_with_grad.set_grad_fn(Some(grad_fn.clone()));
        add_to_graph(&output_with_grad, Some(grad_fn))?;
        Ok(output_with_grad)
    } else {
        Ok(output)
    }
}

/// Element-wise power with a scalar exponent
pub fn powf(base: &Tensor, exponent: f64) -> Result<Tensor> {
    let exponent = Tensor::full(
        Shape::scalar(),
        exponent,
        base.dtype(),
        base.device(),
        false,
    );
    pow(base, &exponent)
}

/// Apply an elementwise unary function, producing fresh storage
fn unary_elementwise<F32Op, F64Op>(
    tensor: &Tensor,
    f32_op: F32Op,
    f64_op: F64Op,
) -> Result<TensorData>
where
    F32Op: Fn(f32) -> f32 + Send + Sync,
    F64Op: Fn(f64) -> f64 + Send + Sync,
{
    let mut output = TensorData::zeros_on_device(tensor.numel(), tensor.dtype(), tensor.device());

    match tensor.dtype() {
        DataType::Float32 => {
            let src = tensor.data().as_f32_slice().ok_or_else(|| {
                TensorgradError::internal_error("failed to get f32 slice from input tensor")
            })?;
            let dst = output.as_f32_slice_mut().ok_or_else(|| {
                TensorgradError::internal_error("failed to get mutable f32 slice from output")
            })?;
            if src.len() >= PAR_THRESHOLD {
                dst.par_iter_mut()
                    .zip(src.par_iter())
                    .for_each(|(d, &s)| *d = f32_op(s));
            } else {
                for (d, &s) in dst.iter_mut().zip(src.iter()) {
                    *d = f32_op(s);
                }
            }
        }
        DataType::Float64 => {
            let src = tensor.data().as_f64_slice().ok_or_else(|| {
                TensorgradError::internal_error("failed to get f64 slice from input tensor")
            })?;
            let dst = output.as_f64_slice_mut().ok_or_else(|| {
                TensorgradError::internal_error("failed to get mutable f64 slice from output")
            })?;
            if src.len() >= PAR_THRESHOLD {
                dst.par_iter_mut()
                    .zip(src.par_iter())
                    .for_each(|(d, &s)| *d = f64_op(s));
            } else {
                for (d, &s) in dst.iter_mut().zip(src.iter()) {
                    *d = f64_op(s);
                }
            }
        }
    }

    Ok(output)
}

/// Element-wise negation
pub fn neg(tensor: &Tensor) -> Result<Tensor> {
    let output_data = unary_elementwise(tensor, |x| -x, |x| -x)?;
    let output = Tensor::new(
        Arc::new(output_data),
        tensor.shape().clone(),
        tensor.dtype(),
        tensor.device(),
        tensor.requires_grad(),
    );

    if output.requires_grad() {
        let grad_fn = Arc::new(NegBackward {
            input_id: tensor.id(),
        });

        let mut output_with_grad = output;
        output_with_grad.set_grad_fn(Some(grad_fn.clone()));
        add_to_graph(&output_with_grad, Some(grad_fn))?;
        Ok(output_with_grad)
    } else {
        Ok(output)
    }
}

/// Element-wise exponential
pub fn exp(tensor: &Tensor) -> Result<Tensor> {
    let output_data = unary_elementwise(tensor, f32::exp, f64::exp)?;
    let output = Tensor::new(
        Arc::new(output_data),
        tensor.shape().clone(),
        tensor.dtype(),
        tensor.device(),
        tensor.requires_grad(),
    );

    if output.requires_grad() {
        let grad_fn = Arc::new(ExpBackward {
            input_id: tensor.id(),
            output: output.detach(),
        });

        let mut output_with_grad = output;
        output_with_grad.set_grad_fn(Some(grad_fn.clone()));
        add_to_graph(&output_with_grad, Some(grad_fn))?;
        Ok(output_with_grad)
    } else {
        Ok(output)
    }
}

/// Element-wise natural logarithm
pub fn log(tensor: &Tensor) -> Result<Tensor> {
    let output_data = unary_elementwise(tensor, f32::ln, f64::ln)?;
    let output = Tensor::new(
        Arc::new(output_data),
        tensor.shape().clone(),
        tensor.dtype(),
        tensor.device(),
        tensor.requires_grad(),
    );

    if output.requires_grad() {
        let grad_fn = Arc::new(LogBackward {
            input_id: tensor.id(),
            input: tensor.detach(),
        });

        let mut output_with_grad = output;
        output_with_grad.set_grad_fn(Some(grad_fn.clone()));
        add_to_graph(&output_with_grad, Some(grad_fn))?;
        Ok(output_with_grad)
    } else {
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;

    fn tensor_f32(data: Vec<f32>, shape: Vec<usize>, requires_grad: bool) -> Tensor {
        Tensor::from_vec_f32(data, Shape::new(shape), requires_grad).unwrap()
    }

    #[test]
    fn test_add_basic() {
        let a = tensor_f32(vec![1.0, 2.0, 3.0], vec![3], false);
        let b = tensor_f32(vec![4.0, 5.0, 6.0], vec![3], false);
        let result = add(&a, &b).unwrap();
        assert_eq!(result.data().as_f32_slice().unwrap(), &[5.0, 7.0, 9.0]);
        assert_eq!(result.shape().dims(), &[3]);
    }

    #[test]
    fn test_add_broadcasting() {
        let a = tensor_f32(vec![1.0, 2.0, 3.0], vec![3], false);
        let b = tensor_f32(vec![10.0], vec![1], false);
        let result = add(&a, &b).unwrap();
        assert_eq!(result.data().as_f32_slice().unwrap(), &[11.0, 12.0, 13.0]);
    }

    #[test]
    fn test_sub_broadcasting_2d() {
        let a = tensor_f32(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2], false);
        let b = tensor_f32(vec![1.0, 2.0], vec![1, 2], false);
        let result = sub(&a, &b).unwrap();
        assert_eq!(result.data().as_f32_slice().unwrap(), &[0.0, 0.0, 2.0, 2.0]);
    }

    #[test]
    fn test_mul_basic() {
        let a = tensor_f32(vec![2.0, 3.0, 4.0], vec![3], false);
        let b = tensor_f32(vec![5.0, 6.0, 7.0], vec![3], false);
        let result = mul(&a, &b).unwrap();
        assert_eq!(result.data().as_f32_slice().unwrap(), &[10.0, 18.0, 28.0]);
    }

    #[test]
    fn test_div_by_zero_returns_inf() {
        let a = tensor_f32(vec![1.0, 2.0], vec![2], false);
        let b = tensor_f32(vec![0.0, 1.0], vec![2], false);
        let result = div(&a, &b).unwrap();
        let data = result.data().as_f32_slice().unwrap();
        assert!(data[0].is_infinite());
        assert_eq!(data[1], 2.0);
    }

    #[test]
    fn test_pow_basic() {
        let base = tensor_f32(vec![2.0, 3.0], vec![2], false);
        let exponent = tensor_f32(vec![3.0, 2.0], vec![2], false);
        let result = pow(&base, &exponent).unwrap();
        assert_eq!(result.data().as_f32_slice().unwrap(), &[8.0, 9.0]);
    }

    #[test]
    fn test_powf_scalar_exponent() {
        let base = tensor_f32(vec![2.0, 4.0], vec![2], false);
        let result = powf(&base, 2.0).unwrap();
        assert_eq!(result.data().as_f32_slice().unwrap(), &[4.0, 16.0]);
    }

    #[test]
    fn test_neg_exp_log() {
        let t = tensor_f32(vec![1.0, 2.0], vec![2], false);
        assert_eq!(
            neg(&t).unwrap().data().as_f32_slice().unwrap(),
            &[-1.0, -2.0]
        );

        let e = exp(&t).unwrap();
        let expected = [1.0f32.exp(), 2.0f32.exp()];
        assert_eq!(e.data().as_f32_slice().unwrap(), &expected);

        let l = log(&e).unwrap();
        let back = l.data().as_f32_slice().unwrap();
        assert!((back[0] - 1.0).abs() < 1e-6);
        assert!((back[1] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_incompatible_shapes_error() {
        let a = tensor_f32(vec![1.0, 2.0, 3.0], vec![3], false);
        let b = tensor_f32(vec![1.0, 2.0], vec![2], false);
        assert!(add(&a, &b).is_err());
        assert!(sub(&a, &b).is_err());
        assert!(mul(&a, &b).is_err());
        assert!(div(&a, &b).is_err());
    }

    #[test]
    fn test_type_mismatch_error() {
        let a = tensor_f32(vec![1.0, 2.0], vec![2], false);
        let b = Tensor::from_vec_f64(vec![1.0, 2.0], Shape::new(vec![2]), false).unwrap();
        assert!(add(&a, &b).is_err());
    }

    #[test]
    fn test_device_mismatch_error() {
        let a = tensor_f32(vec![1.0, 2.0], vec![2], false);
        let b = Tensor::ones(
            Shape::new(vec![2]),
            DataType::Float32,
            Device::cuda(0),
            false,
        );
        assert!(add(&a, &b).is_err());
    }

    #[test]
    fn test_gradient_tracking_on_outputs() {
        let a = tensor_f32(vec![1.0, 2.0], vec![2], true);
        let b = tensor_f32(vec![3.0, 4.0], vec![2], false);
        let result = add(&a, &b).unwrap();
        assert!(result.requires_grad());
        assert!(result.grad_fn().is_some());

        let untracked = add(&b, &b).unwrap();
        assert!(!untracked.requires_grad());
        assert!(untracked.grad_fn().is_none());
    }

    #[test]
    fn test_failed_op_produces_no_node() {
        let before = crate::autograd::with_graph(|g| g.num_nodes());
        let a = tensor_f32(vec![1.0, 2.0, 3.0], vec![3], true);
        let b = tensor_f32(vec![1.0, 2.0], vec![2], true);
        assert!(add(&a, &b).is_err());
        let after = crate::autograd::with_graph(|g| g.num_nodes());
        assert_eq!(before, after);
    }

    #[test]
    fn test_scalar_broadcast() {
        let a = tensor_f32(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2], false);
        let s = Tensor::full(Shape::scalar(), 2.0, DataType::Float32, Device::cpu(), false);
        let result = mul(&a, &s).unwrap();
        assert_eq!(result.data().as_f32_slice().unwrap(), &[2.0, 4.0, 6.0, 8.0]);
        assert_eq!(result.shape().dims(), &[2, 2]);
    }
}
