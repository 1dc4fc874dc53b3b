//! Matching of detected beats against a reference annotation.

use serde::{Deserialize, Serialize};

/// Partition of two beat sequences into matched and unmatched indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Detected indices matched to an annotation.
    pub tp: Vec<usize>,
    /// Detected indices without a matching annotation.
    pub fp: Vec<usize>,
    /// Annotated indices without a matching detection.
    #[serde(rename = "fn")]
    pub fn_: Vec<usize>,
}

impl MatchResult {
    pub fn precision(&self) -> f64 {
        ratio(self.tp.len(), self.tp.len() + self.fp.len())
    }

    pub fn recall(&self) -> f64 {
        ratio(self.tp.len(), self.tp.len() + self.fn_.len())
    }

    /// `tp / (tp + (fp + fn) / 2)`; 1.0 when both sequences are empty.
    pub fn f1_score(&self) -> f64 {
        let tp = self.tp.len() as f64;
        let errors = (self.fp.len() + self.fn_.len()) as f64;
        if tp + errors == 0.0 {
            return 1.0;
        }
        tp / (tp + 0.5 * errors)
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        1.0
    } else {
        num as f64 / den as f64
    }
}

/// Candidate pairing of one detection with one annotation.
#[derive(Debug, Clone, Copy)]
struct Pair {
    distance: usize,
    detection: usize,
    annotation: usize,
}

impl Pair {
    /// Ordering key: nearest first, then the pair lying earlier in time.
    ///
    /// The key only depends on the two positions, not on which sequence
    /// each came from, so swapping the inputs yields the same matching.
    fn key(&self) -> (usize, usize, usize) {
        let lo = self.detection.min(self.annotation);
        let hi = self.detection.max(self.annotation);
        (self.distance, lo, hi)
    }
}

/// Matches detected beats to annotated beats at most `max_distance` samples apart.
///
/// Each beat is used at most once. Pairs are taken greedily, closest first;
/// among equally close candidates the earlier annotation wins. Both inputs
/// are sorted and deduplicated internally, and every detection ends up in
/// exactly one of `tp`/`fp`, every annotation in exactly one of `tp`/`fn_`.
pub fn compare_heartbeats(
    detection: &[usize],
    annotation: &[usize],
    max_distance: usize,
) -> MatchResult {
    let detection = sorted_unique(detection);
    let annotation = sorted_unique(annotation);

    let mut pairs = Vec::new();
    for (di, &d) in detection.iter().enumerate() {
        let lo = d.saturating_sub(max_distance);
        let hi = d.saturating_add(max_distance);
        let start = annotation.partition_point(|&a| a < lo);
        for (offset, &a) in annotation[start..].iter().enumerate() {
            if a > hi {
                break;
            }
            pairs.push((
                Pair {
                    distance: d.abs_diff(a),
                    detection: d,
                    annotation: a,
                },
                di,
                start + offset,
            ));
        }
    }
    pairs.sort_by_key(|(pair, _, _)| pair.key());

    let mut detection_used = vec![false; detection.len()];
    let mut annotation_used = vec![false; annotation.len()];
    for (_, di, ai) in pairs {
        if !detection_used[di] && !annotation_used[ai] {
            detection_used[di] = true;
            annotation_used[ai] = true;
        }
    }

    let mut result = MatchResult {
        tp: Vec::new(),
        fp: Vec::new(),
        fn_: Vec::new(),
    };
    for (&d, used) in detection.iter().zip(&detection_used) {
        if *used {
            result.tp.push(d);
        } else {
            result.fp.push(d);
        }
    }
    result.fn_ = annotation
        .iter()
        .zip(&annotation_used)
        .filter(|(_, used)| !**used)
        .map(|(&a, _)| a)
        .collect();
    result
}

fn sorted_unique(indices: &[usize]) -> Vec<usize> {
    let mut out = indices.to_vec();
    out.sort_unstable();
    out.dedup();
    out
}
