// Copyright (c) 2026 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the Apache-style license found in the
// LICENSE file in the root directory of this source tree.

use tensorgrad::backends::registry;
use tensorgrad::{
    DataType, Device, DeviceType, OpKind, Result, Shape, Tensor, TensorData,
};

#[test]
fn test_device_fallback_runs_graph_on_cpu_kernels() {
    // No CUDA kernels are registered; the dispatch table substitutes the CPU
    // routine, so a graph built on a CUDA device still executes.
    let a = Tensor::ones(
        Shape::new(vec![2, 2]),
        DataType::Float32,
        Device::cuda(0),
        false,
    );
    let b = Tensor::full(
        Shape::new(vec![2, 2]),
        3.0,
        DataType::Float32,
        Device::cuda(0),
        false,
    );

    let sum = a.add(&b).unwrap();
    assert_eq!(sum.data().as_f32_slice().unwrap(), &[4.0; 4]);
    assert!(sum.device().is_cuda());

    let product = a.matmul(&b).unwrap();
    assert_eq!(product.data().as_f32_slice().unwrap(), &[6.0; 4]);
}

fn constant_pow(
    _lhs: &Tensor,
    _rhs: &Tensor,
    output: &mut TensorData,
    _shape: &Shape,
) -> Result<()> {
    if let Some(out) = output.as_f32_slice_mut() {
        out.fill(42.0);
    }
    Ok(())
}

#[test]
fn test_device_specific_registration_overrides_fallback() {
    registry::register_forward(OpKind::Pow, DeviceType::Cuda, constant_pow);

    let base = Tensor::full(
        Shape::new(vec![3]),
        2.0,
        DataType::Float32,
        Device::cuda(0),
        false,
    );
    let result = base.powf(3.0).unwrap();
    assert_eq!(result.data().as_f32_slice().unwrap(), &[42.0; 3]);

    // The CPU path is unaffected by the CUDA override
    let cpu_base = Tensor::full(
        Shape::new(vec![3]),
        2.0,
        DataType::Float32,
        Device::cpu(),
        false,
    );
    let cpu_result = cpu_base.powf(3.0).unwrap();
    assert_eq!(cpu_result.data().as_f32_slice().unwrap(), &[8.0; 3]);
}

fn fused_add_backward(
    _lhs: &Tensor,
    _rhs: &Tensor,
    grad_output: &Tensor,
) -> Result<[Option<Tensor>; 2]> {
    Ok([Some(grad_output.detach()), Some(grad_output.detach())])
}

#[test]
fn test_backward_lookup_absent_then_registered() {
    // Nothing registered: callers fall back to the graph-based backward
    assert!(registry::get_backward(OpKind::Sub, DeviceType::Cuda).is_none());

    registry::register_backward(OpKind::Sub, DeviceType::Cpu, fused_add_backward);

    // CPU registration also serves the CUDA lookup through the fallback rule
    let kernel = registry::get_backward(OpKind::Sub, DeviceType::Cuda).unwrap();
    let lhs = Tensor::ones(Shape::new(vec![2]), DataType::Float32, Device::cpu(), false);
    let rhs = Tensor::ones(Shape::new(vec![2]), DataType::Float32, Device::cpu(), false);
    let grad = Tensor::full(
        Shape::new(vec![2]),
        5.0,
        DataType::Float32,
        Device::cpu(),
        false,
    );
    let grads = kernel(&lhs, &rhs, &grad).unwrap();
    assert_eq!(
        grads[0].as_ref().unwrap().data().as_f32_slice().unwrap(),
        &[5.0, 5.0]
    );
}

#[test]
fn test_forward_lookup_always_resolves_for_builtin_ops() {
    for op in [OpKind::Add, OpKind::Sub, OpKind::Mul, OpKind::Div] {
        assert!(registry::get_forward(op, DeviceType::Cpu).is_ok());
        assert!(registry::get_forward(op, DeviceType::Cuda).is_ok());
    }
}
