use serde::{Deserialize, Serialize};

/// Single-lead recording sampled at a uniform integer rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Sampling frequency in Hz
    pub fs: u32,
    /// Samples
    pub data: Vec<f64>,
}

impl TimeSeries {
    pub fn new(fs: u32, data: Vec<f64>) -> Self {
        Self { fs, data }
    }
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn duration(&self) -> f64 {
        self.data.len() as f64 / self.fs as f64
    }
}

/// Beat locations as ascending sample indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Events {
    pub indices: Vec<usize>,
}

impl Events {
    /// Sorts and deduplicates the given indices.
    pub fn from_indices(mut indices: Vec<usize>) -> Self {
        indices.sort_unstable();
        indices.dedup();
        Self { indices }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Event times in seconds.
    pub fn times(&self, fs: u32) -> Vec<f64> {
        self.indices.iter().map(|&i| i as f64 / fs as f64).collect()
    }
}

/// RR intervals (seconds), each stamped with the time of the beat closing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RRSeries {
    pub t: Vec<f64>,
    pub rr: Vec<f64>,
}

impl RRSeries {
    pub fn from_events(events: &Events, fs: u32) -> Self {
        let fs = fs as f64;
        let mut t = Vec::with_capacity(events.len().saturating_sub(1));
        let mut rr = Vec::with_capacity(events.len().saturating_sub(1));
        for w in events.indices.windows(2) {
            t.push(w[1] as f64 / fs);
            rr.push((w[1] as f64 - w[0] as f64) / fs);
        }
        Self { t, rr }
    }

    pub fn len(&self) -> usize {
        self.rr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rr.is_empty()
    }
}
