// Copyright (c) 2026 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the Apache-style license found in the
// LICENSE file in the root directory of this source tree.

pub mod autograd;
pub mod backends;
pub mod device;
pub mod error;
pub mod operations;
pub mod tensor;

// Re-export core types
pub use autograd::{ComputationGraph, GradientFunction, GraphStats, TensorId};
pub use backends::registry::{KernelRegistry, OpKind};
pub use device::{Device, DeviceType};
pub use error::{Result, TensorgradError};
pub use tensor::{DataType, Shape, Strides, Tensor, TensorData};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
