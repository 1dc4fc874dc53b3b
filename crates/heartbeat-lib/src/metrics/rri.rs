use crate::{
    error::{check_fs, BeatError, Result},
    signal::{Events, RRSeries},
};

/// Pearson correlation between the RR-interval series of two beat sequences.
///
/// Both RR series are linearly interpolated onto a common grid sampled at
/// `fs_resample` Hz spanning the time range where both are defined.
pub fn rri_similarity(
    detection: &[usize],
    annotation: &[usize],
    fs: u32,
    fs_resample: f64,
) -> Result<f64> {
    check_fs(fs)?;
    if !(fs_resample.is_finite() && fs_resample > 0.0) {
        return Err(BeatError::value_error(
            "fs_resample",
            format!("resampling rate must be positive, got {}", fs_resample),
        ));
    }
    let det = rr_series("detection", detection, fs)?;
    let ann = rr_series("annotation", annotation, fs)?;

    let start = det.t[0].max(ann.t[0]);
    let end = det.t[det.len() - 1].min(ann.t[ann.len() - 1]);
    if end <= start {
        return Err(BeatError::value_error(
            "annotation",
            "RR series of detection and annotation do not overlap",
        ));
    }

    let step = 1.0 / fs_resample;
    let count = ((end - start) / step).floor() as usize + 1;
    let grid = (0..count).map(|k| start + k as f64 * step);
    let (a, b): (Vec<f64>, Vec<f64>) = grid
        .map(|t| (interp(t, &det.t, &det.rr), interp(t, &ann.t, &ann.rr)))
        .unzip();

    pearson(&a, &b).ok_or_else(|| {
        BeatError::value_error(
            "detection",
            "RR series is constant over the overlap; correlation is undefined",
        )
    })
}

fn rr_series(arg: &'static str, beats: &[usize], fs: u32) -> Result<RRSeries> {
    let rr = RRSeries::from_events(&Events::from_indices(beats.to_vec()), fs);
    if rr.len() < 2 {
        return Err(BeatError::value_error(
            arg,
            "at least three distinct beats are needed",
        ));
    }
    Ok(rr)
}

/// Piecewise-linear interpolation, clamped to the end values.
fn interp(t: f64, xs: &[f64], ys: &[f64]) -> f64 {
    let i = xs.partition_point(|&x| x <= t);
    if i == 0 {
        return ys[0];
    }
    if i == xs.len() {
        return ys[ys.len() - 1];
    }
    let (x0, x1) = (xs[i - 1], xs[i]);
    let w = (t - x0) / (x1 - x0);
    ys[i - 1] + w * (ys[i] - ys[i - 1])
}

fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let (dx, dy) = (x - mean_a, y - mean_b);
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    if var_a == 0.0 || var_b == 0.0 {
        return None;
    }
    Some((cov / (var_a.sqrt() * var_b.sqrt())).clamp(-1.0, 1.0))
}
