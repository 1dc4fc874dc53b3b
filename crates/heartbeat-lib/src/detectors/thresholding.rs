//! Adaptive dual-threshold peak search (Pan–Tompkins style).
//!
//! Local maxima of the integrated signal are classified one at a time by
//! [`ThresholdState`], which tracks a signal level and a noise level, rejects
//! peaks inside the refractory period, discriminates T-waves by slope and
//! runs a searchback with a relaxed threshold when a beat is overdue. Every
//! accepted candidate is refined to the maximum of the filtered signal close
//! to it.
//!
//! All decisions compare levels with each other, never with an absolute
//! magnitude, so rescaling the input by a positive factor does not change
//! the result.

use crate::error::{check_fs, check_samples, BeatError, Result};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Coefficients of the threshold state machine. Durations are in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Span at the start of the recording used to seed the levels.
    pub learning_period_s: f64,
    /// No beat may follow an accepted beat closer than this.
    pub refractory_s: f64,
    /// Peaks closer than this to the previous beat are checked for being T-waves.
    pub t_wave_window_s: f64,
    /// Half width of the window used for slope measurement and peak refinement.
    pub refine_half_window_s: f64,
    /// Assumed RR interval before any has been measured.
    pub initial_rr_s: f64,
    /// Seed signal level as a fraction of the learning-period maximum.
    pub init_signal_fraction: f64,
    /// Seed noise level as a fraction of the learning-period mean.
    pub init_noise_fraction: f64,
    /// Blend weight of a new peak into the signal or noise level.
    pub level_weight: f64,
    /// Blend weight of a peak recovered by searchback into the signal level.
    pub searchback_level_weight: f64,
    /// Position of threshold 1 between the noise and signal levels.
    pub threshold_fraction: f64,
    /// Threshold 2 as a fraction of threshold 1.
    pub searchback_fraction: f64,
    /// A T-wave candidate is rejected if its slope is below this fraction of the last beat's.
    pub t_wave_slope_ratio: f64,
    /// Searchback starts once the RR average has been exceeded by this ratio.
    pub rr_missed_ratio: f64,
    /// Lower bound of a regular RR interval relative to the regular average.
    pub rr_low_ratio: f64,
    /// Upper bound of a regular RR interval relative to the regular average.
    pub rr_high_ratio: f64,
    /// Number of intervals kept in each running RR average.
    pub rr_history: usize,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            learning_period_s: 2.0,
            refractory_s: 0.200,
            t_wave_window_s: 0.360,
            refine_half_window_s: 0.075,
            initial_rr_s: 1.0,
            init_signal_fraction: 1.0 / 3.0,
            init_noise_fraction: 0.5,
            level_weight: 0.125,
            searchback_level_weight: 0.25,
            threshold_fraction: 0.25,
            searchback_fraction: 0.5,
            t_wave_slope_ratio: 0.5,
            rr_missed_ratio: 1.66,
            rr_low_ratio: 0.92,
            rr_high_ratio: 1.16,
            rr_history: 8,
        }
    }
}

impl ThresholdConfig {
    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("learning_period_s", self.learning_period_s),
            ("refractory_s", self.refractory_s),
            ("t_wave_window_s", self.t_wave_window_s),
            ("refine_half_window_s", self.refine_half_window_s),
            ("initial_rr_s", self.initial_rr_s),
        ];
        for (name, value) in durations {
            if !(value.is_finite() && value > 0.0) {
                return Err(BeatError::value_error(
                    "config",
                    format!("{} must be a positive duration, got {}", name, value),
                ));
            }
        }
        let fractions = [
            ("init_signal_fraction", self.init_signal_fraction),
            ("init_noise_fraction", self.init_noise_fraction),
            ("level_weight", self.level_weight),
            ("searchback_level_weight", self.searchback_level_weight),
            ("threshold_fraction", self.threshold_fraction),
            ("searchback_fraction", self.searchback_fraction),
            ("t_wave_slope_ratio", self.t_wave_slope_ratio),
        ];
        for (name, value) in fractions {
            if !(value > 0.0 && value <= 1.0) {
                return Err(BeatError::value_error(
                    "config",
                    format!("{} must lie in (0, 1], got {}", name, value),
                ));
            }
        }
        if !(self.rr_low_ratio > 0.0
            && self.rr_low_ratio <= 1.0
            && self.rr_high_ratio >= 1.0
            && self.rr_missed_ratio > 1.0)
        {
            return Err(BeatError::value_error(
                "config",
                "RR ratios must satisfy 0 < low <= 1 <= high and missed > 1",
            ));
        }
        if self.rr_history == 0 {
            return Err(BeatError::value_error(
                "config",
                "rr_history must be at least 1",
            ));
        }
        Ok(())
    }
}

/// A local maximum of the integrated signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub index: usize,
    pub value: f64,
}

/// How [`ThresholdState::push_peak`] classified a peak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeakClass {
    Beat,
    Noise,
    TWave,
    Refractory,
}

#[derive(Debug, Clone, Copy)]
struct AcceptedBeat {
    index: usize,
    slope: f64,
}

/// Bounded running average of RR intervals in samples.
#[derive(Debug, Clone)]
struct RrAverage {
    intervals: VecDeque<usize>,
    capacity: usize,
}

impl RrAverage {
    fn new(capacity: usize) -> Self {
        Self {
            intervals: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, rr: usize) {
        if self.intervals.len() == self.capacity {
            self.intervals.pop_front();
        }
        self.intervals.push_back(rr);
    }

    fn mean(&self) -> Option<f64> {
        if self.intervals.is_empty() {
            None
        } else {
            Some(self.intervals.iter().sum::<usize>() as f64 / self.intervals.len() as f64)
        }
    }
}

/// Sample counts derived from a [`ThresholdConfig`] at a given rate.
#[derive(Debug, Clone, Copy)]
struct Windows {
    learning: usize,
    refractory: usize,
    t_wave: usize,
    half: usize,
    initial_rr: f64,
}

impl Windows {
    fn new(cfg: &ThresholdConfig, fs: u32) -> Self {
        let fs = fs as f64;
        let samples = |s: f64| (s * fs).round().max(1.0) as usize;
        Self {
            learning: samples(cfg.learning_period_s),
            refractory: samples(cfg.refractory_s),
            t_wave: samples(cfg.t_wave_window_s),
            half: samples(cfg.refine_half_window_s),
            initial_rr: cfg.initial_rr_s * fs,
        }
    }
}

/// Explicit state machine of the adaptive threshold search.
///
/// Peaks must be pushed in ascending index order. The state borrows the
/// filtered signal for slope measurement and beat refinement; it must be as
/// long as the integrated signal the peaks come from.
#[derive(Debug, Clone)]
pub struct ThresholdState<'a> {
    cfg: ThresholdConfig,
    windows: Windows,
    filtered: &'a [f64],
    signal_level: f64,
    noise_level: f64,
    last_beat: Option<AcceptedBeat>,
    rr_recent: RrAverage,
    rr_regular: RrAverage,
    /// Noise peaks since the last beat, candidates for searchback.
    pending: Vec<Peak>,
    beats: Vec<usize>,
}

impl<'a> ThresholdState<'a> {
    /// Seeds the levels from the learning period of `integrated`.
    pub fn new(
        filtered: &'a [f64],
        integrated: &[f64],
        fs: u32,
        cfg: &ThresholdConfig,
    ) -> Self {
        let windows = Windows::new(cfg, fs);
        let learn = &integrated[..windows.learning.min(integrated.len())];
        let (max, mean) = if learn.is_empty() {
            (0.0, 0.0)
        } else {
            (
                learn.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                learn.iter().sum::<f64>() / learn.len() as f64,
            )
        };
        Self {
            cfg: *cfg,
            windows,
            filtered,
            signal_level: cfg.init_signal_fraction * max,
            noise_level: cfg.init_noise_fraction * mean,
            last_beat: None,
            rr_recent: RrAverage::new(cfg.rr_history),
            rr_regular: RrAverage::new(cfg.rr_history),
            pending: Vec::new(),
            beats: Vec::new(),
        }
    }

    pub fn signal_level(&self) -> f64 {
        self.signal_level
    }

    pub fn noise_level(&self) -> f64 {
        self.noise_level
    }

    pub fn threshold_1(&self) -> f64 {
        self.noise_level + self.cfg.threshold_fraction * (self.signal_level - self.noise_level)
    }

    pub fn threshold_2(&self) -> f64 {
        self.cfg.searchback_fraction * self.threshold_1()
    }

    /// Candidate indices accepted so far, in the integrated-signal domain.
    pub fn candidates(&self) -> &[usize] {
        &self.beats
    }

    /// Distance (samples) after the last beat beyond which a beat counts as missed.
    fn missed_limit(&self) -> f64 {
        let average = self
            .rr_regular
            .mean()
            .or_else(|| self.rr_recent.mean())
            .unwrap_or(self.windows.initial_rr);
        self.cfg.rr_missed_ratio * average
    }

    fn anchor(&self) -> usize {
        self.last_beat.map(|b| b.index).unwrap_or(0)
    }

    /// Classifies the next local maximum, running a searchback first if the
    /// gap since the last beat has grown past the missed-beat limit.
    pub fn push_peak(&mut self, peak: Peak) -> PeakClass {
        self.searchback_until(peak.index);

        if let Some(last) = self.last_beat {
            if peak.index < last.index + self.windows.refractory {
                return PeakClass::Refractory;
            }
        }

        if peak.value > self.threshold_1() {
            let slope = self.max_slope(peak.index);
            if let Some(last) = self.last_beat {
                let is_t_wave = peak.index - last.index < self.windows.t_wave
                    && slope < self.cfg.t_wave_slope_ratio * last.slope;
                if is_t_wave {
                    trace!("peak at {} rejected as T-wave", peak.index);
                    self.update_noise(peak.value);
                    return PeakClass::TWave;
                }
            }
            self.signal_level = blend(self.cfg.level_weight, peak.value, self.signal_level);
            self.accept(peak.index, slope);
            PeakClass::Beat
        } else {
            self.update_noise(peak.value);
            self.pending.push(peak);
            PeakClass::Noise
        }
    }

    /// Runs the final searchback up to `end` and returns the refined beats.
    ///
    /// Refined beats closer than the refractory period are merged into the
    /// one with the larger filtered value.
    pub fn finish(mut self, end: usize) -> Vec<usize> {
        self.searchback_until(end);
        let filtered = self.filtered;
        let half = self.windows.half;
        let mut refined: Vec<usize> = self
            .beats
            .iter()
            .map(|&i| refine(filtered, i, half))
            .collect();
        refined.sort_unstable();

        let mut beats: Vec<usize> = Vec::with_capacity(refined.len());
        for index in refined {
            match beats.last_mut() {
                Some(prev) if index - *prev < self.windows.refractory => {
                    if filtered[index] > filtered[*prev] {
                        trace!("beat at {} replaces {} after refinement", index, prev);
                        *prev = index;
                    }
                }
                _ => beats.push(index),
            }
        }
        beats
    }

    fn searchback_until(&mut self, index: usize) {
        while index.saturating_sub(self.anchor()) as f64 > self.missed_limit() {
            let threshold = self.threshold_2();
            let earliest = self.anchor() + self.windows.refractory;
            let best = self
                .pending
                .iter()
                .filter(|p| p.index >= earliest && p.index < index && p.value > threshold)
                .fold(None::<Peak>, |best, &p| match best {
                    Some(b) if b.value >= p.value => Some(b),
                    _ => Some(p),
                });
            let Some(found) = best else {
                break;
            };
            trace!(
                "searchback recovered peak at {} (value {:e}, threshold {:e})",
                found.index,
                found.value,
                threshold
            );
            self.signal_level = blend(
                self.cfg.searchback_level_weight,
                found.value,
                self.signal_level,
            );
            let slope = self.max_slope(found.index);
            self.accept(found.index, slope);
        }
    }

    fn accept(&mut self, index: usize, slope: f64) {
        if let Some(last) = self.last_beat {
            let rr = index - last.index;
            self.rr_recent.push(rr);
            let regular = match self.rr_regular.mean() {
                Some(avg) => {
                    let rr = rr as f64;
                    rr >= self.cfg.rr_low_ratio * avg && rr <= self.cfg.rr_high_ratio * avg
                }
                None => true,
            };
            if regular {
                self.rr_regular.push(rr);
            }
        }
        self.pending.retain(|p| p.index > index);
        self.last_beat = Some(AcceptedBeat { index, slope });
        self.beats.push(index);
    }

    fn update_noise(&mut self, value: f64) {
        self.noise_level = blend(self.cfg.level_weight, value, self.noise_level);
    }

    /// Steepest first difference of the filtered signal around `index`.
    fn max_slope(&self, index: usize) -> f64 {
        let (start, end) = window_bounds(self.filtered.len(), index, self.windows.half);
        self.filtered[start..=end]
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .fold(0.0, f64::max)
    }
}

fn blend(weight: f64, value: f64, level: f64) -> f64 {
    weight * value + (1.0 - weight) * level
}

fn window_bounds(len: usize, index: usize, half: usize) -> (usize, usize) {
    let start = index.saturating_sub(half);
    let end = (index + half).min(len - 1);
    (start, end)
}

/// Index of the filtered-signal maximum within `half` samples of `index`.
fn refine(filtered: &[f64], index: usize, half: usize) -> usize {
    let (start, end) = window_bounds(filtered.len(), index, half);
    let mut best = start;
    for j in start..=end {
        if filtered[j] > filtered[best] {
            best = j;
        }
    }
    best
}

/// Local maxima with a strict rise on the left; a plateau yields its first sample.
pub fn local_maxima(x: &[f64]) -> Vec<Peak> {
    if x.len() < 3 {
        return Vec::new();
    }
    (1..x.len() - 1)
        .filter(|&i| x[i] > x[i - 1] && x[i] >= x[i + 1])
        .map(|i| Peak {
            index: i,
            value: x[i],
        })
        .collect()
}

/// Locates beats from a bandpass-filtered signal and its integrated energy.
pub fn thresholding(
    filtered_ecg: &[f64],
    integrated_ecg: &[f64],
    fs: u32,
) -> Result<Vec<usize>> {
    thresholding_with_config(filtered_ecg, integrated_ecg, fs, &ThresholdConfig::default())
}

/// [`thresholding`] with explicit coefficients.
pub fn thresholding_with_config(
    filtered_ecg: &[f64],
    integrated_ecg: &[f64],
    fs: u32,
    cfg: &ThresholdConfig,
) -> Result<Vec<usize>> {
    check_samples("filtered_ecg", filtered_ecg)?;
    check_samples("integrated_ecg", integrated_ecg)?;
    if filtered_ecg.len() != integrated_ecg.len() {
        return Err(BeatError::value_error(
            "integrated_ecg",
            format!(
                "length {} does not match filtered_ecg length {}",
                integrated_ecg.len(),
                filtered_ecg.len()
            ),
        ));
    }
    check_fs(fs)?;
    cfg.validate()?;

    let mut state = ThresholdState::new(filtered_ecg, integrated_ecg, fs, cfg);
    let peaks = local_maxima(integrated_ecg);
    for &peak in &peaks {
        state.push_peak(peak);
    }
    let beats = state.finish(integrated_ecg.len() - 1);
    debug!(
        "thresholding: {} local maxima -> {} beats ({} samples at {} Hz)",
        peaks.len(),
        beats.len(),
        integrated_ecg.len(),
        fs
    );
    Ok(beats)
}
