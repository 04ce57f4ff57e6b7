// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the Apache-style license found in the
// LICENSE file in the root directory of this source tree.

use tensorgrad::{autograd, DataType, Device, Shape, Tensor};

#[test]
fn test_row_major_round_trip_up_to_four_axes() {
    let shapes: Vec<Vec<usize>> = vec![
        vec![1],
        vec![5],
        vec![2, 3],
        vec![3, 1, 4],
        vec![2, 3, 4, 2],
    ];

    for dims in shapes {
        let shape = Shape::new(dims.clone());
        let values: Vec<f32> = (0..shape.numel()).map(|x| x as f32).collect();
        let tensor = Tensor::from_vec_f32(values.clone(), shape, false).unwrap();

        assert_eq!(tensor.shape().dims(), dims.as_slice());
        assert_eq!(tensor.data().as_f32_slice().unwrap(), values.as_slice());

        // Host copy-out reproduces the exact row-major sequence
        let host: Vec<f64> = tensor.data().to_f64_vec();
        let expected: Vec<f64> = values.iter().map(|&x| x as f64).collect();
        assert_eq!(host, expected);
    }
}

#[test]
fn test_round_trip_f64() {
    let shape = Shape::new(vec![2, 2]);
    let values = vec![0.5, 1.5, 2.5, 3.5];
    let tensor = Tensor::from_vec_f64(values.clone(), shape, false).unwrap();
    assert_eq!(tensor.data().as_f64_slice().unwrap(), values.as_slice());
}

#[test]
fn test_zero_grad_is_idempotent() {
    autograd::clear_graph().unwrap();
    let x = Tensor::from_vec_f32(vec![1.0, 2.0, 3.0], Shape::new(vec![3]), true).unwrap();

    x.zero_grad();
    let first = x.grad().expect("zero_grad materializes the gradient");
    assert_eq!(first.data().as_f32_slice().unwrap(), &[0.0, 0.0, 0.0]);

    x.zero_grad();
    let second = x.grad().expect("gradient still present after second call");
    assert_eq!(second.data().as_f32_slice().unwrap(), &[0.0, 0.0, 0.0]);
    autograd::clear_graph().unwrap();
}

#[test]
fn test_zero_grad_noop_without_tracking() {
    autograd::clear_graph().unwrap();
    let x = Tensor::from_vec_f32(vec![1.0], Shape::new(vec![1]), false).unwrap();
    x.zero_grad();
    assert!(x.grad().is_none());
    autograd::clear_graph().unwrap();
}

#[test]
fn test_constructors() {
    let zeros = Tensor::zeros(
        Shape::new(vec![2, 2]),
        DataType::Float32,
        Device::cpu(),
        false,
    );
    assert_eq!(zeros.data().as_f32_slice().unwrap(), &[0.0; 4]);

    let ones = Tensor::ones(
        Shape::new(vec![3]),
        DataType::Float64,
        Device::cpu(),
        false,
    );
    assert_eq!(ones.data().as_f64_slice().unwrap(), &[1.0; 3]);

    let full = Tensor::full(
        Shape::new(vec![2]),
        -2.5,
        DataType::Float32,
        Device::cpu(),
        false,
    );
    assert_eq!(full.data().as_f32_slice().unwrap(), &[-2.5, -2.5]);

    let tracked = full.requires_grad_(true);
    assert!(tracked.requires_grad());
}

#[test]
fn test_transpose_sugar() {
    let t = Tensor::from_vec_f32(
        vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        Shape::new(vec![2, 3]),
        false,
    )
    .unwrap();
    let tt = t.t().unwrap();
    assert_eq!(tt.shape().dims(), &[3, 2]);
    assert_eq!(
        tt.data().as_f32_slice().unwrap(),
        &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]
    );
}

#[test]
fn test_randn_properties() {
    let t = Tensor::randn(
        Shape::new(vec![4, 4]),
        DataType::Float64,
        Device::cpu(),
        false,
    );
    assert_eq!(t.numel(), 16);
    assert_eq!(t.dtype(), DataType::Float64);
    // Samples from a continuous distribution are all finite
    assert!(t.data().as_f64_slice().unwrap().iter().all(|x| x.is_finite()));
}

#[test]
fn test_from_vec_rejects_wrong_count() {
    let result = Tensor::from_vec_f32(vec![1.0, 2.0, 3.0], Shape::new(vec![2, 2]), false);
    assert!(result.is_err());
}

#[test]
fn test_scalar_tensor_item() {
    let t = Tensor::full(Shape::scalar(), 42.0, DataType::Float32, Device::cpu(), false);
    assert_eq!(t.ndim(), 0);
    assert_eq!(t.numel(), 1);
    assert_eq!(t.item().unwrap(), 42.0);
}

#[test]
fn test_unique_ids_and_leaf_status() {
    let a = Tensor::zeros(Shape::new(vec![1]), DataType::Float32, Device::cpu(), true);
    let b = Tensor::zeros(Shape::new(vec![1]), DataType::Float32, Device::cpu(), true);
    assert_ne!(a.id(), b.id());
    assert!(a.is_leaf());

    let c = a.add(&b).unwrap();
    assert!(!c.is_leaf());
}

#[test]
fn test_graph_stats_reflect_construction() {
    autograd::clear_graph().unwrap();
    let a = Tensor::ones(Shape::new(vec![2]), DataType::Float32, Device::cpu(), true);
    let b = Tensor::ones(Shape::new(vec![2]), DataType::Float32, Device::cpu(), true);
    let _c = a.mul(&b).unwrap();

    let stats = autograd::graph_stats();
    assert_eq!(stats.total_nodes, 1);
    assert_eq!(stats.grad_enabled_nodes, 1);
    autograd::clear_graph().unwrap();
}
