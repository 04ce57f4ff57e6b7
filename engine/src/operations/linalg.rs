// Copyright (c) 2026 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the Apache-style license found in the
// LICENSE file in the root directory of this source tree.

use crate::{
    autograd::{add_to_graph, functions::MatMulBackward},
    backends::registry::{self, OpKind},
    error::{Result, TensorgradError},
    tensor::{DataType, Shape, Tensor, TensorData},
};
use std::sync::Arc;

/// Matrix multiplication for 2-D operands.
///
/// The forward routine resolves through the kernel dispatch table, so a
/// device-specific kernel can override the CPU default.
pub fn matmul(lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
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
    if lhs.ndim() != 2 || rhs.ndim() != 2 {
        return Err(TensorgradError::invalid_operation(format!(
            "matmul requires 2-D operands, got {} and {}",
            lhs.shape(),
            rhs.shape()
        )));
    }

    let (m, k) = (lhs.shape().dims()[0], lhs.shape().dims()[1]);
    let (k2, n) = (rhs.shape().dims()[0], rhs.shape().dims()[1]);
    if k != k2 {
        return Err(TensorgradError::shape_mismatch(
            lhs.shape().dims().to_vec(),
            rhs.shape().dims().to_vec(),
        ));
    }

    let output_shape = Shape::new(vec![m, n]);
    let mut output_data =
        TensorData::zeros_on_device(output_shape.numel(), lhs.dtype(), lhs.device());

    let kernel = registry::get_forward(OpKind::MatMul, lhs.device().device_type())?;
    kernel(lhs, rhs, &mut output_data, &output_shape)?;

    let output = Tensor::new(
        Arc::new(output_data),
        output_shape,
        lhs.dtype(),
        lhs.device(),
        lhs.requires_grad() || rhs.requires_grad(),
    );

    if output.requires_grad() {
        let grad_fn = Arc::new(MatMulBackward {
            lhs: lhs.detach(),
            rhs: rhs.detach(),
            input_ids: [lhs.id(), rhs.id()],
            lhs_requires_grad: lhs.requires_grad(),
            rhs_requires_grad: rhs.requires_grad(),
        });

        let mut output_with_grad = output;
        output_with_grad.set_grad_fn(Some(grad_fn.clone()));
        add_to_graph(&output_with_grad, Some(grad_fn))?;
        Ok(output_with_grad)
    } else {
        Ok(output)
    }
}

/// Matrix transpose for 2-D operands.
///
/// This is an array-backend primitive, not a differentiable operation: the
/// result is detached from the computation graph. It exists to serve the
/// matmul backward rule and inspection.
pub fn transpose(tensor: &Tensor) -> Result<Tensor> {
    if tensor.ndim() != 2 {
        return Err(TensorgradError::invalid_operation(format!(
            "transpose requires a 2-D operand, got {}",
            tensor.shape()
        )));
    }

    let dims = tensor.shape().dims();
    let (rows, cols) = (dims[0], dims[1]);
    let mut output_data =
        TensorData::zeros_on_device(tensor.numel(), tensor.dtype(), tensor.device());

    match tensor.dtype() {
        DataType::Float32 => {
            let src = tensor.data().as_f32_slice().ok_or_else(|| {
                TensorgradError::internal_error("failed to get f32 slice for transpose")
            })?;
            let dst = output_data.as_f32_slice_mut().ok_or_else(|| {
                TensorgradError::internal_error("failed to get mutable f32 slice for transpose")
            })?;
            transpose_2d(src, dst, rows, cols);
        }
        DataType::Float64 => {
            let src = tensor.data().as_f64_slice().ok_or_else(|| {
                TensorgradError::internal_error("failed to get f64 slice for transpose")
            })?;
            let dst = output_data.as_f64_slice_mut().ok_or_else(|| {
                TensorgradError::internal_error("failed to get mutable f64 slice for transpose")
            })?;
            transpose_2d(src, dst, rows, cols);
        }
    }

    Ok(Tensor::new(
        Arc::new(output_data),
        Shape::new(vec![cols, rows]),
        tensor.dtype(),
        tensor.device(),
        false,
    ))
}

fn transpose_2d<T: Copy>(src: &[T], dst: &mut [T], rows: usize, cols: usize) {
    for i in 0..rows {
        for j in 0..cols {
            dst[j * rows + i] = src[i * cols + j];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensor_f32(data: Vec<f32>, shape: Vec<usize>, requires_grad: bool) -> Tensor {
        Tensor::from_vec_f32(data, Shape::new(shape), requires_grad).unwrap()
    }

    #[test]
    fn test_matmul_2x2() {
        let a = tensor_f32(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2], false);
        let b = tensor_f32(vec![5.0, 6.0, 7.0, 8.0], vec![2, 2], false);
        let c = matmul(&a, &b).unwrap();
        assert_eq!(c.data().as_f32_slice().unwrap(), &[19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_matmul_rectangular() {
        // (2x3) @ (3x1) = (2x1)
        let a = tensor_f32(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3], false);
        let b = tensor_f32(vec![1.0, 0.0, 1.0], vec![3, 1], false);
        let c = matmul(&a, &b).unwrap();
        assert_eq!(c.shape().dims(), &[2, 1]);
        assert_eq!(c.data().as_f32_slice().unwrap(), &[4.0, 10.0]);
    }

    #[test]
    fn test_matmul_inner_dim_mismatch() {
        let a = tensor_f32(vec![1.0, 2.0], vec![1, 2], false);
        let b = tensor_f32(vec![1.0, 2.0, 3.0], vec![3, 1], false);
        assert!(matmul(&a, &b).is_err());
    }

    #[test]
    fn test_matmul_requires_2d() {
        let a = tensor_f32(vec![1.0, 2.0], vec![2], false);
        let b = tensor_f32(vec![1.0, 2.0], vec![2, 1], false);
        assert!(matmul(&a, &b).is_err());
    }

    #[test]
    fn test_matmul_tracks_gradient() {
        let a = tensor_f32(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2], true);
        let b = tensor_f32(vec![5.0, 6.0, 7.0, 8.0], vec![2, 2], false);
        let c = matmul(&a, &b).unwrap();
        assert!(c.requires_grad());
        assert!(c.grad_fn().is_some());
    }

    #[test]
    fn test_transpose() {
        let a = tensor_f32(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3], false);
        let t = transpose(&a).unwrap();
        assert_eq!(t.shape().dims(), &[3, 2]);
        assert_eq!(
            t.data().as_f32_slice().unwrap(),
            &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]
        );
    }

    #[test]
    fn test_transpose_is_detached() {
        let a = tensor_f32(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2], true);
        let t = transpose(&a).unwrap();
        assert!(!t.requires_grad());
        assert!(t.grad_fn().is_none());
    }
}
