// Copyright (c) 2026 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the Apache-style license found in the
// LICENSE file in the root directory of this source tree.

use crate::{
    autograd::{self, functions::CloneBackward, GradientFunction, TensorId},
    device::Device,
    error::{Result, TensorgradError},
    tensor::{data::TensorData, dtype::DataType, shape::{Shape, Strides}},
};
use std::sync::Arc;

/// Core tensor structure: one node record per tensor value ever produced.
///
/// The value is immutable after creation and shared by every downstream node
/// that references it as an input. Gradient storage is centralized in the
/// thread-local computation graph, keyed by `tensor_id`; it is materialized
/// lazily on first accumulation, so "never differentiated yet" is distinct
/// from "gradient is exactly zero".
#[derive(Clone)]
pub struct Tensor {
    /// Tensor data storage
    data: Arc<TensorData>,
    /// Tensor shape (dimensions)
    shape: Shape,
    /// Memory strides for each dimension
    strides: Strides,
    /// Data type of tensor elements
    dtype: DataType,
    /// Device where tensor is associated
    device: Device,
    /// Whether this tensor requires gradient computation
    requires_grad: bool,
    /// Gradient function for automatic differentiation; absent on leaves
    grad_fn: Option<Arc<dyn GradientFunction>>,
    /// Unique identifier for this tensor
    tensor_id: TensorId,
}

impl Tensor {
    /// Create a new tensor with the given data, shape, and properties
    #[inline(always)]
    pub fn new(
        data: Arc<TensorData>,
        shape: Shape,
        dtype: DataType,
        device: Device,
        requires_grad: bool,
    ) -> Self {
        let strides = Strides::from_shape(&shape);
        Self {
            data,
            shape,
            strides,
            dtype,
            device,
            requires_grad,
            grad_fn: None,
            tensor_id: TensorId::new(),
        }
    }

    /// Create a tensor filled with zeros
    #[inline(always)]
    pub fn zeros(shape: Shape, dtype: DataType, device: Device, requires_grad: bool) -> Self {
        let data = Arc::new(TensorData::zeros_on_device(shape.numel(), dtype, device));
        Self::new(data, shape, dtype, device, requires_grad)
    }

    /// Create a tensor filled with ones
    #[inline(always)]
    pub fn ones(shape: Shape, dtype: DataType, device: Device, requires_grad: bool) -> Self {
        let data = Arc::new(TensorData::ones_on_device(shape.numel(), dtype, device));
        Self::new(data, shape, dtype, device, requires_grad)
    }

    /// Create a tensor filled with a constant value
    #[inline(always)]
    pub fn full(
        shape: Shape,
        value: f64,
        dtype: DataType,
        device: Device,
        requires_grad: bool,
    ) -> Self {
        let data = Arc::new(TensorData::full_on_device(
            shape.numel(),
            dtype,
            value,
            device,
        ));
        Self::new(data, shape, dtype, device, requires_grad)
    }

    /// Create a tensor filled with standard normal samples
    #[inline(always)]
    pub fn randn(shape: Shape, dtype: DataType, device: Device, requires_grad: bool) -> Self {
        let data = Arc::new(TensorData::randn_on_device(shape.numel(), dtype, device));
        Self::new(data, shape, dtype, device, requires_grad)
    }

    /// Create a tensor from flat row-major f32 values
    pub fn from_vec_f32(values: Vec<f32>, shape: Shape, requires_grad: bool) -> Result<Self> {
        if values.len() != shape.numel() {
            return Err(TensorgradError::invalid_argument(format!(
                "number of values ({}) does not match shape {} ({} elements)",
                values.len(),
                shape,
                shape.numel()
            )));
        }
        let data = Arc::new(TensorData::from_vec_f32(values, Device::cpu()));
        Ok(Self::new(
            data,
            shape,
            DataType::Float32,
            Device::cpu(),
            requires_grad,
        ))
    }

    /// Create a tensor from flat row-major f64 values
    pub fn from_vec_f64(values: Vec<f64>, shape: Shape, requires_grad: bool) -> Result<Self> {
        if values.len() != shape.numel() {
            return Err(TensorgradError::invalid_argument(format!(
                "number of values ({}) does not match shape {} ({} elements)",
                values.len(),
                shape,
                shape.numel()
            )));
        }
        let data = Arc::new(TensorData::from_vec_f64(values, Device::cpu()));
        Ok(Self::new(
            data,
            shape,
            DataType::Float64,
            Device::cpu(),
            requires_grad,
        ))
    }

    /// Get the tensor's shape
    #[inline(always)]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Get the tensor's strides
    #[inline(always)]
    pub fn strides(&self) -> &Strides {
        &self.strides
    }

    /// Get the tensor's data type
    #[inline(always)]
    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    /// Get the tensor's device
    #[inline(always)]
    pub fn device(&self) -> Device {
        self.device
    }

    /// Check if this tensor requires gradients
    #[inline(always)]
    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// Get the tensor's unique ID
    #[inline(always)]
    pub fn id(&self) -> TensorId {
        self.tensor_id
    }

    /// Get the number of dimensions
    #[inline(always)]
    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }

    /// Get the total number of elements
    #[inline(always)]
    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    /// Get the size of a specific dimension
    #[inline(always)]
    pub fn size(&self, dim: usize) -> Result<usize> {
        self.shape.size(dim)
    }

    /// Check if the tensor is contiguous in memory
    #[inline(always)]
    pub fn is_contiguous(&self) -> bool {
        self.strides.is_contiguous(&self.shape)
    }

    /// Get a reference to the tensor data. Never fails.
    #[inline(always)]
    pub fn data(&self) -> &Arc<TensorData> {
        &self.data
    }

    /// Read the value of a single-element tensor as f64
    pub fn item(&self) -> Result<f64> {
        if self.numel() != 1 {
            return Err(TensorgradError::invalid_operation(format!(
                "item() requires a single-element tensor, got shape {}",
                self.shape
            )));
        }
        let value = match self.dtype {
            DataType::Float32 => self
                .data
                .as_f32_slice()
                .ok_or_else(|| TensorgradError::internal_error("expected f32 storage"))?[0]
                as f64,
            DataType::Float64 => self
                .data
                .as_f64_slice()
                .ok_or_else(|| TensorgradError::internal_error("expected f64 storage"))?[0],
        };
        Ok(value)
    }

    /// Enable or disable gradient tracking, builder style
    #[inline(always)]
    pub fn requires_grad_(mut self, requires_grad: bool) -> Self {
        self.requires_grad = requires_grad;
        self
    }

    /// Create a deep copy of the tensor data while preserving autograd
    /// history through a `CloneBackward` node.
    pub fn deep_clone(&self) -> Result<Self> {
        let data = Arc::new(self.data.clone_data());
        let mut cloned = Tensor::new(
            data,
            self.shape.clone(),
            self.dtype,
            self.device,
            self.requires_grad,
        );

        if self.requires_grad {
            let grad_fn = Arc::new(CloneBackward {
                input_id: self.tensor_id,
            });
            cloned.set_grad_fn(Some(grad_fn.clone()));
            autograd::add_to_graph(&cloned, Some(grad_fn))?;
        }

        Ok(cloned)
    }

    /// Create a view of this tensor with a new shape. The element count must
    /// be preserved; the view shares storage and identity with `self`.
    pub fn view(&self, new_shape: Shape) -> Result<Self> {
        if new_shape.numel() != self.numel() {
            return Err(TensorgradError::shape_mismatch(
                vec![self.numel()],
                vec![new_shape.numel()],
            ));
        }

        let mut tensor = self.clone();
        tensor.strides = Strides::from_shape(&new_shape);
        tensor.shape = new_shape;
        Ok(tensor)
    }
}

impl Tensor {
    /// Set the gradient function for this tensor
    #[inline(always)]
    pub fn set_grad_fn(&mut self, grad_fn: Option<Arc<dyn GradientFunction>>) {
        self.grad_fn = grad_fn;
    }

    /// Get the gradient function for this tensor
    #[inline(always)]
    pub fn grad_fn(&self) -> Option<&Arc<dyn GradientFunction>> {
        self.grad_fn.as_ref()
    }

    /// Whether this tensor is a graph leaf (no backward function)
    #[inline(always)]
    pub fn is_leaf(&self) -> bool {
        self.grad_fn.is_none()
    }

    /// Get the accumulated gradient for this tensor.
    ///
    /// Returns `None`, with a debug diagnostic, when the tensor does not
    /// track gradients or nothing has been accumulated yet. Never a hard
    /// error.
    pub fn grad(&self) -> Option<Tensor> {
        if !self.requires_grad {
            log::debug!(
                "grad() queried on tensor {} which does not require grad",
                self.tensor_id
            );
            return None;
        }
        let grad = autograd::get_gradient(self);
        if grad.is_none() {
            log::debug!(
                "grad() queried on tensor {} before any gradient was accumulated",
                self.tensor_id
            );
        }
        grad
    }

    /// Reset the stored gradient to all-zero of this tensor's shape,
    /// materializing it if absent. No-op when gradients are not tracked.
    pub fn zero_grad(&self) {
        if !self.requires_grad {
            return;
        }
        let zeros = Tensor::zeros(self.shape.clone(), self.dtype, self.device, false);
        autograd::set_gradient(self, zeros);
    }

    /// Perform a backward pass from this tensor.
    ///
    /// An explicit `gradient` seed is honored (enabling vector-Jacobian
    /// products); with `None` the pass is seeded with ones of this tensor's
    /// shape. Calling backward on a tensor that does not require grad is an
    /// error. Repeated calls are allowed: each re-seeds and re-propagates,
    /// adding further contributions to the stored gradients.
    pub fn backward(&self, gradient: Option<Tensor>) -> Result<()> {
        autograd::backward(self, gradient).map(|_| ())
    }

    /// Detach from the computation graph: same storage, no gradient tracking
    #[inline(always)]
    pub fn detach(&self) -> Self {
        let mut detached = self.clone();
        detached.requires_grad = false;
        detached.grad_fn = None;
        detached
    }
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("id", &self.tensor_id)
            .field("shape", &self.shape)
            .field("dtype", &self.dtype)
            .field("device", &self.device)
            .field("requires_grad", &self.requires_grad)
            .field("grad_fn", &self.grad_fn.as_ref().map(|g| g.name()))
            .finish()
    }
}
