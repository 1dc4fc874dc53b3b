use crate::{
    detectors::{
        integration::squared_moving_integration,
        thresholding::{thresholding_with_config, ThresholdConfig},
    },
    error::{check_fs, check_samples, BeatError, Result},
    signal::{Events, TimeSeries},
};
use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type, Q_BUTTERWORTH_F64};
use log::debug;
use serde::{Deserialize, Serialize};

/// Configurable parameters of the QRS detection pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcgPipelineConfig {
    /// Lower edge of the QRS band (Hz). Zero disables the high-pass stage.
    pub lowcut_hz: f64,
    /// Upper edge of the QRS band (Hz). Skipped when at or above Nyquist.
    pub highcut_hz: f64,
    /// Cascaded second-order Butterworth sections per band edge.
    pub filter_sections: usize,
    /// Odd-reflection padding on each side before zero-phase filtering (seconds).
    pub padding_s: f64,
    /// Moving window integration length (seconds), about one QRS duration.
    pub integration_window_s: f64,
    pub threshold: ThresholdConfig,
}

impl Default for EcgPipelineConfig {
    fn default() -> Self {
        Self {
            lowcut_hz: 5.0,
            highcut_hz: 15.0,
            filter_sections: 1,
            padding_s: 1.0,
            integration_window_s: 0.150,
            threshold: ThresholdConfig::default(),
        }
    }
}

impl EcgPipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.lowcut_hz.is_finite() && self.lowcut_hz >= 0.0) {
            return Err(BeatError::value_error(
                "config",
                format!("lowcut_hz must be non-negative, got {}", self.lowcut_hz),
            ));
        }
        if !(self.highcut_hz.is_finite() && self.highcut_hz > self.lowcut_hz) {
            return Err(BeatError::value_error(
                "config",
                format!(
                    "highcut_hz ({}) must exceed lowcut_hz ({})",
                    self.highcut_hz, self.lowcut_hz
                ),
            ));
        }
        if self.filter_sections == 0 {
            return Err(BeatError::value_error(
                "config",
                "filter_sections must be at least 1",
            ));
        }
        if !(self.padding_s.is_finite() && self.padding_s >= 0.0) {
            return Err(BeatError::value_error(
                "config",
                format!("padding_s must be non-negative, got {}", self.padding_s),
            ));
        }
        if !(self.integration_window_s.is_finite() && self.integration_window_s > 0.0) {
            return Err(BeatError::value_error(
                "config",
                format!(
                    "integration_window_s must be positive, got {}",
                    self.integration_window_s
                ),
            ));
        }
        self.threshold.validate()
    }
}

/// Detect heartbeats with the default configuration.
///
/// Returns ascending sample indices of the detected R-peaks.
pub fn detect_heartbeats(ecg: &[f64], fs: u32) -> Result<Vec<usize>> {
    detect_heartbeats_in(ecg, fs, &EcgPipelineConfig::default())
}

/// Detect heartbeats in a typed recording using the configurable pipeline.
pub fn detect_heartbeats_with_config(
    ts: &TimeSeries,
    cfg: &EcgPipelineConfig,
) -> Result<Events> {
    let beats = detect_heartbeats_in(&ts.data, ts.fs, cfg)?;
    Ok(Events::from_indices(beats))
}

fn detect_heartbeats_in(ecg: &[f64], fs: u32, cfg: &EcgPipelineConfig) -> Result<Vec<usize>> {
    check_samples("ecg", ecg)?;
    check_fs(fs)?;
    cfg.validate()?;

    let (filtered, integrated) = pan_tompkins_envelope(ecg, fs, cfg)?;
    let beats = thresholding_with_config(&filtered, &integrated, fs, &cfg.threshold)?;
    debug!(
        "detected {} beats in {} samples ({:.1} s at {} Hz)",
        beats.len(),
        ecg.len(),
        ecg.len() as f64 / fs as f64,
        fs
    );
    Ok(beats)
}

/// Bandpass-filtered signal and its squared, integrated derivative.
pub(crate) fn pan_tompkins_envelope(
    ecg: &[f64],
    fs: u32,
    cfg: &EcgPipelineConfig,
) -> Result<(Vec<f64>, Vec<f64>)> {
    let filtered = bandpass(ecg, fs, cfg)?;
    let derivative = derivative(&filtered);
    let win = ((cfg.integration_window_s * fs as f64).round() as usize).clamp(1, ecg.len());
    debug!("integration window: {} samples", win);
    let integrated = squared_moving_integration(&derivative, win)?;
    Ok((filtered, integrated))
}

/// Zero-phase Butterworth bandpass: high-pass then low-pass sections run
/// forwards and backwards over an odd-reflected extension of the signal.
fn bandpass(data: &[f64], fs: u32, cfg: &EcgPipelineConfig) -> Result<Vec<f64>> {
    let nyquist = fs as f64 * 0.5;
    let mut stages = Vec::with_capacity(2 * cfg.filter_sections);
    if cfg.lowcut_hz > 0.0 && cfg.lowcut_hz < nyquist {
        let hp = design(Type::HighPass, fs, cfg.lowcut_hz)?;
        stages.extend(std::iter::repeat(hp).take(cfg.filter_sections));
    }
    if cfg.highcut_hz < nyquist {
        let lp = design(Type::LowPass, fs, cfg.highcut_hz)?;
        stages.extend(std::iter::repeat(lp).take(cfg.filter_sections));
    }
    if stages.is_empty() {
        return Ok(data.to_vec());
    }

    let pad = ((cfg.padding_s * fs as f64).round() as usize).min(data.len() - 1);
    let mut buffer = odd_extend(data, pad);
    for coeffs in &stages {
        run_forward(&mut buffer, coeffs);
    }
    buffer.reverse();
    for coeffs in &stages {
        run_forward(&mut buffer, coeffs);
    }
    buffer.reverse();
    Ok(buffer[pad..pad + data.len()].to_vec())
}

fn design(kind: Type<f64>, fs: u32, cutoff: f64) -> Result<Coefficients<f64>> {
    Coefficients::<f64>::from_params(kind, (fs as f64).hz(), cutoff.hz(), Q_BUTTERWORTH_F64)
        .map_err(|e| {
            BeatError::value_error(
                "fs",
                format!("cannot design {:.1} Hz section at {} Hz: {:?}", cutoff, fs, e),
            )
        })
}

fn run_forward(data: &mut [f64], coeffs: &Coefficients<f64>) {
    let mut section = DirectForm2Transposed::<f64>::new(*coeffs);
    for sample in data.iter_mut() {
        *sample = section.run(*sample);
    }
}

/// Extends `data` by `pad` samples on each side, reflected through the end points.
fn odd_extend(data: &[f64], pad: usize) -> Vec<f64> {
    let n = data.len();
    let first = data[0];
    let last = data[n - 1];
    let mut out = Vec::with_capacity(n + 2 * pad);
    out.extend((1..=pad).rev().map(|i| 2.0 * first - data[i]));
    out.extend_from_slice(data);
    out.extend((1..=pad).map(|i| 2.0 * last - data[n - 1 - i]));
    out
}

fn derivative(data: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; data.len()];
    for i in 1..data.len() {
        out[i] = data[i] - data[i - 1];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::f64::consts::PI;

    fn synthetic_timeseries(fs: u32, rr: &[f64]) -> (TimeSeries, Vec<f64>) {
        let fs_f = fs as f64;
        let mut beats = Vec::with_capacity(rr.len() + 1);
        let mut t = 0.5;
        beats.push(t);
        for &interval in rr {
            t += interval;
            beats.push(t);
        }
        let duration = beats.last().copied().unwrap_or(1.0) + 1.0;
        let samples = (duration * fs_f) as usize;
        let mut data = Vec::with_capacity(samples);
        for i in 0..samples {
            let time = i as f64 / fs_f;
            let mut v = 0.05 * (2.0 * PI * 0.3 * time).sin();
            for &bt in &beats {
                let dt = time - bt;
                v += 1.2 * (-0.5 * (dt / 0.012).powi(2)).exp();
                v += 0.25 * (-0.5 * ((dt - 0.28) / 0.04).powi(2)).exp();
            }
            data.push(v);
        }
        (TimeSeries::new(fs, data), beats)
    }

    #[test]
    fn detects_regular_beats() {
        let rr = [0.82, 0.78, 0.8, 0.79, 0.81, 0.77, 0.84, 0.88];
        let (ts, beats) = synthetic_timeseries(250, &rr);
        let detected = detect_heartbeats(&ts.data, ts.fs).unwrap();
        assert_eq!(detected.len(), beats.len());
        for (&idx, &bt) in detected.iter().zip(&beats) {
            let err = (idx as f64 / 250.0 - bt).abs();
            assert!(err < 0.02, "beat at {} s found at {} s", bt, idx as f64 / 250.0);
        }
    }

    #[test]
    fn typed_pipeline_returns_events() {
        let rr = [0.9, 0.85, 0.88, 0.86, 0.82, 0.81, 0.8];
        let (ts, beats) = synthetic_timeseries(360, &rr);
        let events = detect_heartbeats_with_config(&ts, &EcgPipelineConfig::default()).unwrap();
        assert_eq!(events.len(), beats.len());
        assert!(events.indices.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn envelope_keeps_length() {
        let (ts, _) = synthetic_timeseries(200, &[0.8, 0.8]);
        let (filtered, integrated) =
            pan_tompkins_envelope(&ts.data, ts.fs, &EcgPipelineConfig::default()).unwrap();
        assert_eq!(filtered.len(), ts.len());
        assert_eq!(integrated.len(), ts.len());
        assert!(integrated.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn bandpass_removes_offset() {
        let data = vec![3.0; 500];
        let out = bandpass(&data, 250, &EcgPipelineConfig::default()).unwrap();
        assert!(out.iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn odd_extension_reflects_through_end_points() {
        let out = odd_extend(&[1.0, 2.0, 4.0], 2);
        assert_eq!(out, vec![-2.0, 0.0, 1.0, 2.0, 4.0, 6.0, 7.0]);
    }

    #[test]
    fn very_low_rate_skips_lowpass() {
        let data: Vec<f64> = (0..50).map(|i| (i as f64 * 0.9).sin()).collect();
        // 15 Hz is above Nyquist at 20 Hz; only the high-pass runs.
        assert!(detect_heartbeats(&data, 20).is_ok());
    }

    #[test]
    fn single_sample_is_accepted() {
        assert_eq!(detect_heartbeats(&[1.0], 360).unwrap(), Vec::<usize>::new());
    }

    #[test]
    fn rejects_invalid_arguments() {
        assert_eq!(detect_heartbeats(&[], 360).unwrap_err().kind(), ErrorKind::Value);
        assert_eq!(
            detect_heartbeats(&[0.0, 1.0], 0).unwrap_err().arg(),
            "fs"
        );
        let ts = TimeSeries::new(360, vec![0.0; 10]);
        let cfg = EcgPipelineConfig {
            highcut_hz: 2.0,
            ..EcgPipelineConfig::default()
        };
        let err = detect_heartbeats_with_config(&ts, &cfg).unwrap_err();
        assert_eq!(err.arg(), "config");
    }
}
