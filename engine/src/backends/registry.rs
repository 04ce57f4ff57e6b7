// Copyright (c) 2026 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the Apache-style license found in the
// LICENSE file in the root directory of this source tree.

use crate::{
    backends::cpu,
    device::DeviceType,
    error::{Result, TensorgradError},
    tensor::{Shape, Tensor, TensorData},
};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::OnceLock;

/// Operations the dispatch table can route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    MatMul,
}

impl OpKind {
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Add => "Add",
            OpKind::Sub => "Sub",
            OpKind::Mul => "Mul",
            OpKind::Div => "Div",
            OpKind::Pow => "Pow",
            OpKind::MatMul => "MatMul",
        }
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Forward compute routine for a binary operation: fills the output buffer
/// from the two operands.
pub type ForwardKernel = fn(&Tensor, &Tensor, &mut TensorData, &Shape) -> Result<()>;

/// Fused backward routine for a binary operation: maps (lhs, rhs,
/// grad_output) to the operand gradients. Entries are optional; when no
/// routine is registered, callers fall back to the graph-based backward.
pub type BackwardKernel = fn(&Tensor, &Tensor, &Tensor) -> Result<[Option<Tensor>; 2]>;

/// Dispatch table mapping (operation, device) pairs to compute routines.
///
/// Forward lookups fall back to the CPU routine when no device-specific
/// kernel exists, so a CPU-only build can run any graph; backward lookups
/// return `None` instead of failing so callers can use the generic
/// graph-based backward.
pub struct KernelRegistry {
    forward: FxHashMap<(OpKind, DeviceType), ForwardKernel>,
    backward: FxHashMap<(OpKind, DeviceType), BackwardKernel>,
}

impl KernelRegistry {
    /// An empty registry with no routines installed
    pub fn new() -> Self {
        Self {
            forward: FxHashMap::default(),
            backward: FxHashMap::default(),
        }
    }

    /// A registry with the CPU forward kernels installed for every operation
    pub fn with_cpu_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_forward(OpKind::Add, DeviceType::Cpu, cpu::add_kernel);
        registry.register_forward(OpKind::Sub, DeviceType::Cpu, cpu::sub_kernel);
        registry.register_forward(OpKind::Mul, DeviceType::Cpu, cpu::mul_kernel);
        registry.register_forward(OpKind::Div, DeviceType::Cpu, cpu::div_kernel);
        registry.register_forward(OpKind::Pow, DeviceType::Cpu, cpu::pow_kernel);
        registry.register_forward(OpKind::MatMul, DeviceType::Cpu, cpu::matmul_kernel);
        registry
    }

    /// Install a forward routine; a later registration for the same
    /// (operation, device) pair overwrites the former.
    pub fn register_forward(&mut self, op: OpKind, device: DeviceType, kernel: ForwardKernel) {
        self.forward.insert((op, device), kernel);
    }

    /// Install a backward routine; a later registration for the same
    /// (operation, device) pair overwrites the former.
    pub fn register_backward(&mut self, op: OpKind, device: DeviceType, kernel: BackwardKernel) {
        self.backward.insert((op, device), kernel);
    }

    /// Resolve the forward routine for (op, device), falling back to the CPU
    /// routine. Fails with `KernelNotFound` naming the operation when
    /// neither exists.
    pub fn forward(&self, op: OpKind, device: DeviceType) -> Result<ForwardKernel> {
        self.forward
            .get(&(op, device))
            .or_else(|| self.forward.get(&(op, DeviceType::Cpu)))
            .copied()
            .ok_or_else(|| TensorgradError::kernel_not_found(op.name()))
    }

    /// Resolve the backward routine for (op, device) with the same CPU
    /// fallback, returning `None` when nothing is registered at all.
    pub fn backward(&self, op: OpKind, device: DeviceType) -> Option<BackwardKernel> {
        self.backward
            .get(&(op, device))
            .or_else(|| self.backward.get(&(op, DeviceType::Cpu)))
            .copied()
    }
}

impl Default for KernelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// Process-wide registry, initialized lazily with the CPU defaults.
// Lookups are read-mostly; registration takes the write lock.
static REGISTRY: OnceLock<RwLock<KernelRegistry>> = OnceLock::new();

fn global() -> &'static RwLock<KernelRegistry> {
    REGISTRY.get_or_init(|| RwLock::new(KernelRegistry::with_cpu_defaults()))
}

/// Install a forward routine in the process-wide registry
pub fn register_forward(op: OpKind, device: DeviceType, kernel: ForwardKernel) {
    global().write().register_forward(op, device, kernel);
}

/// Install a backward routine in the process-wide registry
pub fn register_backward(op: OpKind, device: DeviceType, kernel: BackwardKernel) {
    global().write().register_backward(op, device, kernel);
}

/// Resolve a forward routine from the process-wide registry
pub fn get_forward(op: OpKind, device: DeviceType) -> Result<ForwardKernel> {
    global().read().forward(op, device)
}

/// Resolve a backward routine from the process-wide registry
pub fn get_backward(op: OpKind, device: DeviceType) -> Option<BackwardKernel> {
    global().read().backward(op, device)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_forward(
        _lhs: &Tensor,
        _rhs: &Tensor,
        _output: &mut TensorData,
        _shape: &Shape,
    ) -> Result<()> {
        Ok(())
    }

    fn other_forward(
        _lhs: &Tensor,
        _rhs: &Tensor,
        _output: &mut TensorData,
        _shape: &Shape,
    ) -> Result<()> {
        Ok(())
    }

    fn dummy_backward(
        _lhs: &Tensor,
        _rhs: &Tensor,
        _grad_output: &Tensor,
    ) -> Result<[Option<Tensor>; 2]> {
        Ok([None, None])
    }

    #[test]
    fn test_empty_registry_reports_kernel_not_found() {
        let registry = KernelRegistry::new();
        let err = registry.forward(OpKind::MatMul, DeviceType::Cpu).unwrap_err();
        assert!(format!("{}", err).contains("MatMul"));
    }

    #[test]
    fn test_cpu_fallback_for_unregistered_device() {
        let mut registry = KernelRegistry::new();
        registry.register_forward(OpKind::Add, DeviceType::Cpu, dummy_forward);

        let kernel = registry.forward(OpKind::Add, DeviceType::Cuda).unwrap();
        assert_eq!(kernel as usize, dummy_forward as usize);
    }

    #[test]
    fn test_exact_match_wins_over_fallback() {
        let mut registry = KernelRegistry::new();
        registry.register_forward(OpKind::Add, DeviceType::Cpu, dummy_forward);
        registry.register_forward(OpKind::Add, DeviceType::Cuda, other_forward);

        let kernel = registry.forward(OpKind::Add, DeviceType::Cuda).unwrap();
        assert_eq!(kernel as usize, other_forward as usize);
    }

    #[test]
    fn test_reregistration_overwrites() {
        let mut registry = KernelRegistry::new();
        registry.register_forward(OpKind::Mul, DeviceType::Cpu, dummy_forward);
        registry.register_forward(OpKind::Mul, DeviceType::Cpu, other_forward);

        let kernel = registry.forward(OpKind::Mul, DeviceType::Cpu).unwrap();
        assert_eq!(kernel as usize, other_forward as usize);
    }

    #[test]
    fn test_backward_lookup_is_optional() {
        let mut registry = KernelRegistry::new();
        assert!(registry.backward(OpKind::Mul, DeviceType::Cpu).is_none());

        registry.register_backward(OpKind::Mul, DeviceType::Cpu, dummy_backward);
        assert!(registry.backward(OpKind::Mul, DeviceType::Cuda).is_some());
    }

    #[test]
    fn test_with_cpu_defaults_covers_all_ops() {
        let registry = KernelRegistry::with_cpu_defaults();
        for op in [
            OpKind::Add,
            OpKind::Sub,
            OpKind::Mul,
            OpKind::Div,
            OpKind::Pow,
            OpKind::MatMul,
        ] {
            assert!(registry.forward(op, DeviceType::Cpu).is_ok());
            assert!(registry.forward(op, DeviceType::Cuda).is_ok());
        }
    }

    #[test]
    fn test_op_kind_names() {
        assert_eq!(OpKind::Add.name(), "Add");
        assert_eq!(format!("{}", OpKind::MatMul), "MatMul");
    }
}
