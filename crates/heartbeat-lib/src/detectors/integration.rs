//! Squared moving-window integration.
//!
//! Squares every sample and sums the squares over a window centred on each
//! output sample. The alignment matches a "same"-mode convolution with a
//! rectangular kernel of ones: output `i` covers `x[i - w/2 ..= i - w/2 + w - 1]`,
//! truncated at both ends of the sequence.

use crate::error::{check_samples, BeatError, Result};

/// Squares `x` and applies a centred moving sum of `window_length` samples.
///
/// The output has the same length as `x`. `window_length` must lie in
/// `1..=x.len()`.
pub fn squared_moving_integration(x: &[f64], window_length: usize) -> Result<Vec<f64>> {
    check_samples("x", x)?;
    if window_length == 0 || window_length > x.len() {
        return Err(BeatError::value_error(
            "window_length",
            format!(
                "window length must be between 1 and {}, got {}",
                x.len(),
                window_length
            ),
        ));
    }

    let n = x.len();
    let lead = window_length / 2;
    let lag = window_length - 1 - lead;
    let squared: Vec<f64> = x.iter().map(|v| v * v).collect();

    let mut acc = CompensatedSum::default();
    for &s in &squared[..=lag.min(n - 1)] {
        acc.add(s);
    }
    let mut out = Vec::with_capacity(n);
    out.push(acc.value());
    for i in 1..n {
        if i + lag < n {
            acc.add(squared[i + lag]);
        }
        if i > lead {
            acc.add(-squared[i - lead - 1]);
        }
        // The window only ever holds squares; cancellation residue must not go negative.
        out.push(acc.value().max(0.0));
    }
    Ok(out)
}

/// Neumaier-compensated running sum, so long recordings with large QRS
/// energy do not leave drift in the quiet segments that follow.
#[derive(Debug, Default, Clone, Copy)]
struct CompensatedSum {
    sum: f64,
    compensation: f64,
}

impl CompensatedSum {
    fn add(&mut self, v: f64) {
        let t = self.sum + v;
        if self.sum.abs() >= v.abs() {
            self.compensation += (self.sum - t) + v;
        } else {
            self.compensation += (v - t) + self.sum;
        }
        self.sum = t;
    }

    fn value(&self) -> f64 {
        self.sum + self.compensation
    }
}
