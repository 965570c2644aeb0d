//! Core data types for Answer Lens
//!
//! These types flow through the pipeline: per-frame samples from the facial
//! feature extractor, the transcript from the speech collaborator, the joined
//! metric set, and the feedback report.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::metadata::Metadata;

/// Named blendshape activations (e.g. `mouthSmileLeft` → 0.42)
pub type Blendshapes = BTreeMap<String, f64>;

/// Horizontal gaze class. A missing value (`null`) means unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Gaze {
    Left,
    Right,
    Center,
}

/// Expression label. Variants are declared in lexical order so the derived
/// `Ord` matches the serialized label order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Concerned,
    Focused,
    Happy,
    Neutral,
    Pleasant,
    Surprised,
}

impl Emotion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Concerned => "concerned",
            Emotion::Focused => "focused",
            Emotion::Happy => "happy",
            Emotion::Neutral => "neutral",
            Emotion::Pleasant => "pleasant",
            Emotion::Surprised => "surprised",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Features extracted from one sampled frame.
///
/// When `valid` is false every feature field is `None`; use
/// [`FrameSample::invalid`] to build such a sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSample {
    /// Seconds from the start of the recording
    #[serde(alias = "t")]
    pub timestamp: f64,
    /// Whether a face was found and analyzed
    pub valid: bool,
    pub gaze: Option<Gaze>,
    #[serde(alias = "smile")]
    pub smile_score: Option<f64>,
    pub yaw: Option<f64>,
    pub pitch: Option<f64>,
    pub roll: Option<f64>,
    #[serde(default)]
    pub emotion: Option<Emotion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blendshapes: Option<Blendshapes>,
}

impl FrameSample {
    /// A frame with no detected face (or one that failed analysis)
    pub fn invalid(timestamp: f64) -> Self {
        Self {
            timestamp,
            valid: false,
            gaze: None,
            smile_score: None,
            yaw: None,
            pitch: None,
            roll: None,
            emotion: None,
            blendshapes: None,
        }
    }
}

/// Ordered per-frame samples, ascending by timestamp, including invalid frames
pub type Timeline = Vec<FrameSample>;

/// A timed span of the transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Output of the transcription collaborator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
}

/// Session-level metrics for one recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    /// Valid frames looking at the camera / valid frames (0-1)
    pub center_gaze_ratio: f64,
    /// Fraction of scored frames above the smile threshold (0-1)
    pub smile_ratio: f64,
    /// Threshold actually applied (absent when no frame had a smile score)
    pub smile_threshold_used: Option<f64>,
    pub nod_count: u32,
    #[serde(default)]
    pub emotion_distribution: BTreeMap<Emotion, f64>,
    #[serde(default)]
    pub primary_emotion: Option<Emotion>,
    /// Words per minute
    pub wpm: f64,
    pub filler_count: u32,
    /// Computation metadata; absent on records produced before it existed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Feedback severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Suggestion,
}

/// Scope of a feedback item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackLevel {
    /// Applies to the whole recording
    Video,
    /// Applies to a time span (`start_sec`..`end_sec`)
    Segment,
}

/// One coaching statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackItem {
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub level: FeedbackLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_sec: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_sec: Option<f64>,
}

impl FeedbackItem {
    /// A whole-recording item
    pub fn video(title: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            severity,
            level: FeedbackLevel::Video,
            start_sec: None,
            end_sec: None,
        }
    }

    /// An item bound to a time span
    pub fn segment(
        title: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
        start_sec: f64,
        end_sec: f64,
    ) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            severity,
            level: FeedbackLevel::Segment,
            start_sec: Some(start_sec),
            end_sec: Some(end_sec),
        }
    }
}

/// Which synthesis path produced a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeedbackMode {
    ModelAssisted,
    RuleBased,
}

/// Language of generated and rule-based feedback text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackLanguage {
    #[default]
    En,
    Ko,
}

impl FeedbackLanguage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackLanguage::En => "en",
            FeedbackLanguage::Ko => "ko",
        }
    }
}

impl FromStr for FeedbackLanguage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(FeedbackLanguage::En),
            "ko" | "korean" => Ok(FeedbackLanguage::Ko),
            other => Err(format!("unsupported feedback language: {other}")),
        }
    }
}

/// Ordered feedback items plus the path that produced them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackReport {
    pub mode: FeedbackMode,
    pub items: Vec<FeedbackItem>,
}
