//! Moving-average and triangular smoothing kernels
//!
//! All convolutions here are "same"-length: output length equals input
//! length and samples outside the input count as zero.

use ndarray::{Array2, Axis};

/// Convolve with a uniform kernel of `width` taps, output length `x.len()`
///
/// Even widths center one tap to the left, matching full-convolution
/// cropping at `(width - 1) / 2`.
pub fn moving_average(x: &[f64], width: usize) -> Vec<f64> {
    if width <= 1 || x.is_empty() {
        return x.to_vec();
    }

    let mut prefix = Vec::with_capacity(x.len() + 1);
    prefix.push(0.0);
    let mut acc = 0.0;
    for &v in x {
        acc += v;
        prefix.push(acc);
    }

    let n = x.len() as isize;
    let reach_right = ((width - 1) / 2) as isize;
    let reach_left = width as isize - 1 - reach_right;
    let scale = 1.0 / width as f64;

    (0..n)
        .map(|i| {
            let lo = (i - reach_left).clamp(0, n) as usize;
            let hi = (i + reach_right + 1).clamp(0, n) as usize;
            (prefix[hi] - prefix[lo]) * scale
        })
        .collect()
}

/// Moving average applied independently along one axis of a matrix
pub fn moving_average_axis(matrix: &mut Array2<f64>, axis: Axis, width: usize) {
    if width <= 1 {
        return;
    }
    for mut lane in matrix.lanes_mut(axis) {
        let smoothed = moving_average(&lane.to_vec(), width);
        for (dst, src) in lane.iter_mut().zip(smoothed) {
            *dst = src;
        }
    }
}

/// Normalized triangular kernel with `2n + 1` taps
///
/// `n == 0` yields the identity kernel `[1.0]`.
pub fn triangle_kernel(n: usize) -> Vec<f64> {
    let step = 1.0 / (n + 1) as f64;
    let kernel: Vec<f64> = (1..=n)
        .map(|k| k as f64 * step)
        .chain(std::iter::once(1.0))
        .chain((1..=n).rev().map(|k| k as f64 * step))
        .collect();
    let sum: f64 = kernel.iter().sum();
    kernel.into_iter().map(|v| v / sum).collect()
}

/// Centered convolution with an odd-length kernel
fn convolve_centered(x: &[f64], kernel: &[f64]) -> Vec<f64> {
    let half = (kernel.len() / 2) as isize;
    let n = x.len() as isize;
    (0..n)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .filter_map(|(k, &w)| {
                    let j = i + half - k as isize;
                    (0..n).contains(&j).then(|| w * x[j as usize])
                })
                .sum()
        })
        .collect()
}

/// Smooth a `[bin, frame]` mask with a separable triangular kernel
///
/// Equivalent to a 2-D convolution with the outer product of a
/// `2 * n_freq + 1` and a `2 * n_time + 1` triangle, normalized to unit sum.
pub fn smooth_mask(mask: &Array2<f64>, n_freq: usize, n_time: usize) -> Array2<f64> {
    let mut out = mask.clone();
    if n_freq > 0 {
        let kernel = triangle_kernel(n_freq);
        for mut column in out.lanes_mut(Axis(0)) {
            let smoothed = convolve_centered(&column.to_vec(), &kernel);
            column.iter_mut().zip(smoothed).for_each(|(d, s)| *d = s);
        }
    }
    if n_time > 0 {
        let kernel = triangle_kernel(n_time);
        for mut row in out.lanes_mut(Axis(1)) {
            let smoothed = convolve_centered(&row.to_vec(), &kernel);
            row.iter_mut().zip(smoothed).for_each(|(d, s)| *d = s);
        }
    }
    out
}
