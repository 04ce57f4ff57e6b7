// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the BSD-style license found in the
// LICENSE file in the root directory of this source tree.

use crate::{device::Device, tensor::dtype::DataType};
use rand::Rng;
use rand_distr::StandardNormal;

/// Typed buffer backing a tensor.
///
/// Buffers always live in host memory; the `Device` recorded alongside them
/// drives kernel dispatch, not placement. Device-resident storage is an
/// external collaborator of this engine.
#[derive(Debug, Clone)]
enum TensorBuffer {
    F32(Vec<f32>),
    F64(Vec<f64>),
}

/// Dense storage for one tensor value: a flat row-major buffer plus the
/// element type and device it is associated with.
#[derive(Debug, Clone)]
pub struct TensorData {
    buffer: TensorBuffer,
    device: Device,
}

impl TensorData {
    /// Create zero-filled storage on the CPU
    pub fn zeros(numel: usize, dtype: DataType) -> Self {
        Self::zeros_on_device(numel, dtype, Device::cpu())
    }

    /// Create zero-filled storage associated with the given device
    pub fn zeros_on_device(numel: usize, dtype: DataType, device: Device) -> Self {
        let buffer = match dtype {
            DataType::Float32 => TensorBuffer::F32(vec![0.0; numel]),
            DataType::Float64 => TensorBuffer::F64(vec![0.0; numel]),
        };
        Self { buffer, device }
    }

    /// Create one-filled storage associated with the given device
    pub fn ones_on_device(numel: usize, dtype: DataType, device: Device) -> Self {
        Self::full_on_device(numel, dtype, 1.0, device)
    }

    /// Create storage filled with a constant value
    pub fn full_on_device(numel: usize, dtype: DataType, value: f64, device: Device) -> Self {
        let buffer = match dtype {
            DataType::Float32 => TensorBuffer::F32(vec![value as f32; numel]),
            DataType::Float64 => TensorBuffer::F64(vec![value; numel]),
        };
        Self { buffer, device }
    }

    /// Create storage filled with samples from the standard normal
    /// distribution
    pub fn randn_on_device(numel: usize, dtype: DataType, device: Device) -> Self {
        let mut rng = rand::rng();
        let buffer = match dtype {
            DataType::Float32 => {
                TensorBuffer::F32((0..numel).map(|_| rng.sample::<f32, _>(StandardNormal)).collect())
            }
            DataType::Float64 => {
                TensorBuffer::F64((0..numel).map(|_| rng.sample::<f64, _>(StandardNormal)).collect())
            }
        };
        Self { buffer, device }
    }

    /// Wrap a vector of f32 values as tensor storage
    pub fn from_vec_f32(values: Vec<f32>, device: Device) -> Self {
        Self {
            buffer: TensorBuffer::F32(values),
            device,
        }
    }

    /// Wrap a vector of f64 values as tensor storage
    pub fn from_vec_f64(values: Vec<f64>, device: Device) -> Self {
        Self {
            buffer: TensorBuffer::F64(values),
            device,
        }
    }

    /// Number of elements in the buffer
    #[inline(always)]
    pub fn numel(&self) -> usize {
        match &self.buffer {
            TensorBuffer::F32(v) => v.len(),
            TensorBuffer::F64(v) => v.len(),
        }
    }

    /// Element type of the buffer
    #[inline(always)]
    pub fn dtype(&self) -> DataType {
        match &self.buffer {
            TensorBuffer::F32(_) => DataType::Float32,
            TensorBuffer::F64(_) => DataType::Float64,
        }
    }

    /// Device this storage is associated with
    #[inline(always)]
    pub fn device(&self) -> Device {
        self.device
    }

    /// View the buffer as f32 elements
    #[inline(always)]
    pub fn as_f32_slice(&self) -> Option<&[f32]> {
        match &self.buffer {
            TensorBuffer::F32(v) => Some(v),
            _ => None,
        }
    }

    /// View the buffer as f64 elements
    #[inline(always)]
    pub fn as_f64_slice(&self) -> Option<&[f64]> {
        match &self.buffer {
            TensorBuffer::F64(v) => Some(v),
            _ => None,
        }
    }

    /// Mutable view of the buffer as f32 elements
    #[inline(always)]
    pub fn as_f32_slice_mut(&mut self) -> Option<&mut [f32]> {
        match &mut self.buffer {
            TensorBuffer::F32(v) => Some(v),
            _ => None,
        }
    }

    /// Mutable view of the buffer as f64 elements
    #[inline(always)]
    pub fn as_f64_slice_mut(&mut self) -> Option<&mut [f64]> {
        match &mut self.buffer {
            TensorBuffer::F64(v) => Some(v),
            _ => None,
        }
    }

    /// Deep copy of the storage
    pub fn clone_data(&self) -> TensorData {
        self.clone()
    }

    /// Copy the flat buffer out to host memory as f64, regardless of the
    /// element type. Intended for inspection and printing.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match &self.buffer {
            TensorBuffer::F32(v) => v.iter().map(|&x| x as f64).collect(),
            TensorBuffer::F64(v) => v.clone(),
        }
    }
}
