#![allow(dead_code)]

use rand::{rngs::StdRng, Rng, SeedableRng};
use std::f64::consts::PI;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Beat times (seconds) starting at 0.6 s with a slowly varying rhythm.
pub fn beat_times(count: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut times = Vec::with_capacity(count);
    let mut t = 0.6;
    for k in 0..count {
        times.push(t);
        let base = 0.8 + 0.06 * (k as f64 * 0.4).sin();
        t += base + rng.gen_range(-0.03..0.03);
    }
    times
}

/// Renders a synthetic single-lead ECG at `fs` Hz: sharp R waves, broad
/// T waves, baseline wander and small uniform noise.
pub fn render_ecg(beats: &[f64], fs: u32, noise: f64, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let fs_f = fs as f64;
    let duration = beats.last().copied().unwrap_or(0.0) + 1.0;
    let samples = (duration * fs_f).round() as usize;
    (0..samples)
        .map(|i| {
            let time = i as f64 / fs_f;
            let mut v = 0.08 * (2.0 * PI * 0.25 * time).sin();
            for &bt in beats {
                let dt = time - bt;
                if dt.abs() > 0.6 {
                    continue;
                }
                v += 1.1 * (-0.5 * (dt / 0.012).powi(2)).exp();
                v -= 0.15 * (-0.5 * ((dt - 0.03) / 0.01).powi(2)).exp();
                v += 0.3 * (-0.5 * ((dt - 0.3) / 0.045).powi(2)).exp();
            }
            if noise > 0.0 {
                v += rng.gen_range(-noise..noise);
            }
            v
        })
        .collect()
}

/// Maps indices at `fs` Hz onto a 360 Hz grid.
pub fn to_360(indices: &[usize], fs: u32) -> Vec<usize> {
    indices
        .iter()
        .map(|&i| (i as f64 * 360.0 / fs as f64).round() as usize)
        .collect()
}
