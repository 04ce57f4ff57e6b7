// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the BSD-style license found in the
// LICENSE file in the root directory of this source tree.

pub mod arithmetic;
pub mod linalg;
pub mod reduction;

/// Element count above which elementwise loops switch to rayon
pub(crate) const PAR_THRESHOLD: usize = 1 << 12; // 4096 elements
