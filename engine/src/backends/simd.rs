// Copyright (c) 2026 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the Apache-style license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::Result;
use crate::tensor::Shape;

#[cfg(target_arch = "x86_64")]
use std::arch::is_x86_feature_detected;
#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

/// The vectorized path applies only when no broadcasting is involved
#[inline(always)]
pub fn can_use_simd_fast_path(lhs: &Shape, rhs: &Shape, output: &Shape) -> bool {
    lhs == rhs && lhs == output
}

pub fn simd_add_f32(lhs: &[f32], rhs: &[f32], output: &mut [f32]) -> Result<()> {
    #[cfg(target_arch = "x86_64")]
    if is_x86_feature_detected!("avx2") {
        return unsafe { add_f32_avx2(lhs, rhs, output) };
    }
    add_f32_scalar(lhs, rhs, output)
}

pub fn simd_sub_f32(lhs: &[f32], rhs: &[f32], output: &mut [f32]) -> Result<()> {
    #[cfg(target_arch = "x86_64")]
    if is_x86_feature_detected!("avx2") {
        return unsafe { sub_f32_avx2(lhs, rhs, output) };
    }
    sub_f32_scalar(lhs, rhs, output)
}

pub fn simd_mul_f32(lhs: &[f32], rhs: &[f32], output: &mut [f32]) -> Result<()> {
    #[cfg(target_arch = "x86_64")]
    if is_x86_feature_detected!("avx2") {
        return unsafe { mul_f32_avx2(lhs, rhs, output) };
    }
    mul_f32_scalar(lhs, rhs, output)
}

pub fn simd_div_f32(lhs: &[f32], rhs: &[f32], output: &mut [f32]) -> Result<()> {
    #[cfg(target_arch = "x86_64")]
    if is_x86_feature_detected!("avx2") {
        return unsafe { div_f32_avx2(lhs, rhs, output) };
    }
    div_f32_scalar(lhs, rhs, output)
}

pub fn simd_add_f64(lhs: &[f64], rhs: &[f64], output: &mut [f64]) -> Result<()> {
    #[cfg(target_arch = "x86_64")]
    if is_x86_feature_detected!("avx2") {
        return unsafe { add_f64_avx2(lhs, rhs, output) };
    }
    add_f64_scalar(lhs, rhs, output)
}

pub fn simd_sub_f64(lhs: &[f64], rhs: &[f64], output: &mut [f64]) -> Result<()> {
    #[cfg(target_arch = "x86_64")]
    if is_x86_feature_detected!("avx2") {
        return unsafe { sub_f64_avx2(lhs, rhs, output) };
    }
    sub_f64_scalar(lhs, rhs, output)
}

pub fn simd_mul_f64(lhs: &[f64], rhs: &[f64], output: &mut [f64]) -> Result<()> {
    #[cfg(target_arch = "x86_64")]
    if is_x86_feature_detected!("avx2") {
        return unsafe { mul_f64_avx2(lhs, rhs, output) };
    }
    mul_f64_scalar(lhs, rhs, output)
}

pub fn simd_div_f64(lhs: &[f64], rhs: &[f64], output: &mut [f64]) -> Result<()> {
    #[cfg(target_arch = "x86_64")]
    if is_x86_feature_detected!("avx2") {
        return unsafe { div_f64_avx2(lhs, rhs, output) };
    }
    div_f64_scalar(lhs, rhs, output)
}

// Scalar fallbacks

fn add_f32_scalar(lhs: &[f32], rhs: &[f32], output: &mut [f32]) -> Result<()> {
    for i in 0..lhs.len() {
        output[i] = lhs[i] + rhs[i];
    }
    Ok(())
}

fn sub_f32_scalar(lhs: &[f32], rhs: &[f32], output: &mut [f32]) -> Result<()> {
    for i in 0..lhs.len() {
        output[i] = lhs[i] - rhs[i];
    }
    Ok(())
}

fn mul_f32_scalar(lhs: &[f32], rhs: &[f32], output: &mut [f32]) -> Result<()> {
    for i in 0..lhs.len() {
        output[i] = lhs[i] * rhs[i];
    }
    Ok(())
}

fn div_f32_scalar(lhs: &[f32], rhs: &[f32], output: &mut [f32]) -> Result<()> {
    for i in 0..lhs.len() {
        output[i] = if rhs[i] == 0.0 {
            f32::INFINITY
        } else {
            lhs[i] / rhs[i]
        };
    }
    Ok(())
}

fn add_f64_scalar(lhs: &[f64], rhs: &[f64], output: &mut [f64]) -> Result<()> {
    for i in 0..lhs.len() {
        output[i] = lhs[i] + rhs[i];
    }
    Ok(())
}

fn sub_f64_scalar(lhs: &[f64], rhs: &[f64], output: &mut [f64]) -> Result<()> {
    for i in 0..lhs.len() {
        output[i] = lhs[i] - rhs[i];
    }
    Ok(())
}

fn mul_f64_scalar(lhs: &[f64], rhs: &[f64], output: &mut [f64]) -> Result<()> {
    for i in 0..lhs.len() {
        output[i] = lhs[i] * rhs[i];
    }
    Ok(())
}

fn div_f64_scalar(lhs: &[f64], rhs: &[f64], output: &mut [f64]) -> Result<()> {
    for i in 0..lhs.len() {
        output[i] = if rhs[i] == 0.0 {
            f64::INFINITY
        } else {
            lhs[i] / rhs[i]
        };
    }
    Ok(())
}

// x86_64 AVX2 implementations

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn add_f32_avx2(lhs: &[f32], rhs: &[f32], output: &mut [f32]) -> Result<()> {
    const SIMD_WIDTH: usize = 8; // AVX2 processes 8 f32s at once

    let len = lhs.len();
    let simd_len = len - (len % SIMD_WIDTH);

    for i in (0..simd_len).step_by(SIMD_WIDTH) {
        unsafe {
            let a = _mm256_loadu_ps(lhs.as_ptr().add(i));
            let b = _mm256_loadu_ps(rhs.as_ptr().add(i));
            _mm256_storeu_ps(output.as_mut_ptr().add(i), _mm256_add_ps(a, b));
        }
    }

    for i in simd_len..len {
        output[i] = lhs[i] + rhs[i];
    }

    Ok(())
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn sub_f32_avx2(lhs: &[f32], rhs: &[f32], output: &mut [f32]) -> Result<()> {
    const SIMD_WIDTH: usize = 8;

    let len = lhs.len();
    let simd_len = len - (len % SIMD_WIDTH);

    for i in (0..simd_len).step_by(SIMD_WIDTH) {
        unsafe {
            let a = _mm256_loadu_ps(lhs.as_ptr().add(i));
            let b = _mm256_loadu_ps(rhs.as_ptr().add(i));
            _mm256_storeu_ps(output.as_mut_ptr().add(i), _mm256_sub_ps(a, b));
        }
    }

    for i in simd_len..len {
        output[i] = lhs[i] - rhs[i];
    }

    Ok(())
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn mul_f32_avx2(lhs: &[f32], rhs: &[f32], output: &mut [f32]) -> Result<()> {
    const SIMD_WIDTH: usize = 8;

    let len = lhs.len();
    let simd_len = len - (len % SIMD_WIDTH);

    for i in (0..simd_len).step_by(SIMD_WIDTH) {
        unsafe {
            let a = _mm256_loadu_ps(lhs.as_ptr().add(i));
            let b = _mm256_loadu_ps(rhs.as_ptr().add(i));
            _mm256_storeu_ps(output.as_mut_ptr().add(i), _mm256_mul_ps(a, b));
        }
    }

    for i in simd_len..len {
        output[i] = lhs[i] * rhs[i];
    }

    Ok(())
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn div_f32_avx2(lhs: &[f32], rhs: &[f32], output: &mut [f32]) -> Result<()> {
    const SIMD_WIDTH: usize = 8;

    let len = lhs.len();
    let simd_len = len - (len % SIMD_WIDTH);

    for i in (0..simd_len).step_by(SIMD_WIDTH) {
        unsafe {
            let a = _mm256_loadu_ps(lhs.as_ptr().add(i));
            let b = _mm256_loadu_ps(rhs.as_ptr().add(i));
            _mm256_storeu_ps(output.as_mut_ptr().add(i), _mm256_div_ps(a, b));
        }
    }

    for i in simd_len..len {
        output[i] = if rhs[i] == 0.0 {
            f32::INFINITY
        } else {
            lhs[i] / rhs[i]
        };
    }

    Ok(())
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn add_f64_avx2(lhs: &[f64], rhs: &[f64], output: &mut [f64]) -> Result<()> {
    const SIMD_WIDTH: usize = 4; // AVX2 processes 4 f64s at once

    let len = lhs.len();
    let simd_len = len - (len % SIMD_WIDTH);

    for i in (0..simd_len).step_by(SIMD_WIDTH) {
        unsafe {
            let a = _mm256_loadu_pd(lhs.as_ptr().add(i));
            let b = _mm256_loadu_pd(rhs.as_ptr().add(i));
            _mm256_storeu_pd(output.as_mut_ptr().add(i), _mm256_add_pd(a, b));
        }
    }

    for i in simd_len..len {
        output[i] = lhs[i] + rhs[i];
    }

    Ok(())
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn sub_f64_avx2(lhs: &[f64], rhs: &[f64], output: &mut [f64]) -> Result<()> {
    const SIMD_WIDTH: usize = 4;

    let len = lhs.len();
    let simd_len = len - (len % SIMD_WIDTH);

    for i in (0..simd_len).step_by(SIMD_WIDTH) {
        unsafe {
            let a = _mm256_loadu_pd(lhs.as_ptr().add(i));
            let b = _mm256_loadu_pd(rhs.as_ptr().add(i));
            _mm256_storeu_pd(output.as_mut_ptr().add(i), _mm256_sub_pd(a, b));
        }
    }

    for i in simd_len..len {
        output[i] = lhs[i] - rhs[i];
    }

    Ok(())
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn mul_f64_avx2(lhs: &[f64], rhs: &[f64], output: &mut [f64]) -> Result<()> {
    const SIMD_WIDTH: usize = 4;

    let len = lhs.len();
    let simd_len = len - (len % SIMD_WIDTH);

    for i in (0..simd_len).step_by(SIMD_WIDTH) {
        unsafe {
            let a = _mm256_loadu_pd(lhs.as_ptr().add(i));
            let b = _mm256_loadu_pd(rhs.as_ptr().add(i));
            _mm256_storeu_pd(output.as_mut_ptr().add(i), _mm256_mul_pd(a, b));
        }
    }

    for i in simd_len..len {
        output[i] = lhs[i] * rhs[i];
    }

    Ok(())
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn div_f64_avx2(lhs: &[f64], rhs: &[f64], output: &mut [f64]) -> Result<()> {
    const SIMD_WIDTH: usize = 4;

    let len = lhs.len();
    let simd_len = len - (len % SIMD_WIDTH);

    for i in (0..simd_len).step_by(SIMD_WIDTH) {
        unsafe {
            let a = _mm256_loadu_pd(lhs.as_ptr().add(i));
            let b = _mm256_loadu_pd(rhs.as_ptr().add(i));
            _mm256_storeu_pd(output.as_mut_ptr().add(i), _mm256_div_pd(a, b));
        }
    }

    for i in simd_len..len {
        output[i] = if rhs[i] == 0.0 {
            f64::INFINITY
        } else {
            lhs[i] / rhs[i]
        };
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simd_add_matches_scalar() {
        // 19 elements exercises both the vector body and the tail loop
        let lhs: Vec<f32> = (0..19).map(|x| x as f32).collect();
        let rhs: Vec<f32> = (0..19).map(|x| (x * 2) as f32).collect();
        let mut out = vec![0.0f32; 19];
        simd_add_f32(&lhs, &rhs, &mut out).unwrap();
        for i in 0..19 {
            assert_eq!(out[i], lhs[i] + rhs[i]);
        }
    }

    #[test]
    fn test_simd_mul_f64() {
        let lhs: Vec<f64> = (0..11).map(|x| x as f64).collect();
        let rhs = vec![3.0f64; 11];
        let mut out = vec![0.0f64; 11];
        simd_mul_f64(&lhs, &rhs, &mut out).unwrap();
        for i in 0..11 {
            assert_eq!(out[i], lhs[i] * 3.0);
        }
    }

    #[test]
    fn test_simd_div_zero_denominator_tail() {
        let lhs = vec![1.0f32; 9];
        let mut rhs = vec![2.0f32; 9];
        rhs[8] = 0.0; // falls in the tail loop
        let mut out = vec![0.0f32; 9];
        simd_div_f32(&lhs, &rhs, &mut out).unwrap();
        assert_eq!(out[0], 0.5);
        assert!(out[8].is_infinite());
    }

    #[test]
    fn test_fast_path_requires_equal_shapes() {
        let a = Shape::new(vec![2, 3]);
        let b = Shape::new(vec![2, 3]);
        let c = Shape::new(vec![1, 3]);
        assert!(can_use_simd_fast_path(&a, &b, &a));
        assert!(!can_use_simd_fast_path(&a, &c, &a));
    }
}
