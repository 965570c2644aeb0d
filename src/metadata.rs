//! Reproducibility metadata attached to every metric set
//!
//! Nothing here carries a wall-clock value and every map is a `BTreeMap`, so two
//! runs over identical inputs serialize to identical bytes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A threshold together with the rule that produced or applies it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub value: f64,
    pub formula: String,
}

impl Threshold {
    pub fn new(value: f64, formula: impl Into<String>) -> Self {
        Self {
            value,
            formula: formula.into(),
        }
    }
}

/// Confidence statistics for the vision stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    /// Valid frames / total sampled frames (0-1)
    pub valid_frame_ratio: f64,
    /// Mean detector face-presence score, when the detector reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_presence_mean: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_presence_std: Option<f64>,
    /// Mean of the averaged left/right iris position ratio
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gaze_ratio_mean: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gaze_ratio_std: Option<f64>,
    /// Valid frames whose expression label came from the landmark rules while
    /// the blendshape backend was selected
    #[serde(default)]
    pub expression_fallback_frames: usize,
}

/// Outlier ratios with the rule used to flag them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierFlags {
    /// Fraction of valid frames with an implausible head pose (0-1)
    pub pose_outlier_ratio: f64,
    pub rule: String,
}

/// Reproducibility record for one metric set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Sampling rate used for frame analysis (Hz)
    pub fps_analyzed: f64,
    /// Sampled frames, valid or not
    pub frame_count_total: usize,
    pub frame_count_valid: usize,
    /// `round(duration_sec × fps_analyzed)`
    pub frame_count_expected: u64,
    pub thresholds: BTreeMap<String, Threshold>,
    /// Model role → identifier (e.g. `landmarks` → `face_landmarker_v2`)
    pub models: BTreeMap<String, String>,
    pub confidence: Confidence,
    pub outliers: OutlierFlags,
}

/// Expected sampled-frame count for a recording
pub fn expected_frame_count(duration_sec: f64, fps: f64) -> u64 {
    let expected = duration_sec * fps;
    if !expected.is_finite() || expected <= 0.0 {
        return 0;
    }
    expected.round() as u64
}

/// Mean and population standard deviation; `None` for an empty slice
pub fn mean_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance.sqrt()))
}
