// Copyright (c) 2026 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the Apache-style license found in the
// LICENSE file in the root directory of this source tree.

use thiserror::Error;

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, TensorgradError>;

/// Errors surfaced by tensor construction, forward operations and the
/// backward pass. Every error is reported synchronously to the immediate
/// caller; a failed operation produces no graph node.
#[derive(Debug, Error)]
pub enum TensorgradError {
    /// Shapes are incompatible for the requested operation
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// Shapes cannot be aligned under the broadcasting rules
    #[error("shapes {lhs:?} and {rhs:?} are not broadcast compatible")]
    BroadcastError { lhs: Vec<usize>, rhs: Vec<usize> },

    /// Operands live on different devices
    #[error("device mismatch: expected {expected}, got {got}")]
    DeviceMismatch { expected: String, got: String },

    /// Operands have different data types
    #[error("data type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    /// Gradient bookkeeping error, e.g. `backward()` on a tensor that does
    /// not require grad
    #[error("gradient error: {0}")]
    GradientError(String),

    /// The dispatch table has no routine for an (operation, device) pair and
    /// no CPU fallback exists
    #[error("no kernel registered for operation {op}")]
    KernelNotFound { op: String },

    /// A caller-supplied argument is out of range or malformed
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not defined for the given operands
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// An invariant the crate maintains internally was violated
    #[error("internal error: {0}")]
    InternalError(String),
}

impl TensorgradError {
    pub fn shape_mismatch(expected: Vec<usize>, got: Vec<usize>) -> Self {
        Self::ShapeMismatch { expected, got }
    }

    pub fn broadcast_error(lhs: &[usize], rhs: &[usize]) -> Self {
        Self::BroadcastError {
            lhs: lhs.to_vec(),
            rhs: rhs.to_vec(),
        }
    }

    pub fn device_mismatch(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self::DeviceMismatch {
            expected: expected.into(),
            got: got.into(),
        }
    }

    pub fn type_mismatch(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            got: got.into(),
        }
    }

    pub fn gradient_error(msg: impl Into<String>) -> Self {
        Self::GradientError(msg.into())
    }

    pub fn kernel_not_found(op: impl Into<String>) -> Self {
        Self::KernelNotFound { op: op.into() }
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }
}
