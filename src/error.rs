//! Error types for Answer Lens
//!
//! Run-level failures (decode, audio extraction, transcription) propagate to the
//! caller. Per-frame and per-credential failures are absorbed at the component
//! boundary and only surface through logs and the diagnostics buffer.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::aggregator::VisionMetrics;

/// Pipeline stage an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Media,
    Audio,
    Vision,
    Speech,
    Feedback,
    Config,
    Io,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Media => "media",
            Stage::Audio => "audio",
            Stage::Vision => "vision",
            Stage::Speech => "speech",
            Stage::Feedback => "feedback",
            Stage::Config => "config",
            Stage::Io => "io",
        };
        f.write_str(name)
    }
}

/// One failed attempt against the generation service
#[derive(Debug, Clone)]
pub struct CredentialAttempt {
    /// Position of the credential in the configured list (0-based)
    pub index: usize,
    /// Error reported by the backend
    pub error: String,
    /// Whether the failure looked like an unreachable service rather than a rejection
    pub transport: bool,
}

/// Errors that can occur during analysis
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Cannot read media {path}: {reason}")]
    MediaRead {
        path: PathBuf,
        reason: String,
        /// The external tool could not be started at all
        tool_missing: bool,
    },

    #[error("Audio extraction failed for {path}: {reason}")]
    AudioExtraction {
        path: PathBuf,
        reason: String,
        tool_missing: bool,
    },

    #[error("Frame analysis failed at {timestamp:.3}s: {reason}")]
    FrameAnalysis { timestamp: f64, reason: String },

    #[error("Pose solve failed: {0}")]
    PoseSolve(String),

    #[error("Transcription failed for {path}: {reason}")]
    Transcription {
        path: PathBuf,
        reason: String,
        tool_missing: bool,
    },

    #[error("Generation service failed after {} attempt(s)", attempts.len())]
    GenerationService { attempts: Vec<CredentialAttempt> },

    #[error("Speech metrics unavailable: {source}")]
    SpeechUnavailable {
        /// Vision metrics computed before the speech stage failed
        partial: Box<VisionMetrics>,
        #[source]
        source: Box<AnalysisError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl AnalysisError {
    /// The pipeline stage this error belongs to
    pub fn stage(&self) -> Stage {
        match self {
            AnalysisError::MediaRead { .. } => Stage::Media,
            AnalysisError::AudioExtraction { .. } => Stage::Audio,
            AnalysisError::FrameAnalysis { .. } | AnalysisError::PoseSolve(_) => Stage::Vision,
            AnalysisError::Transcription { .. } | AnalysisError::SpeechUnavailable { .. } => {
                Stage::Speech
            }
            AnalysisError::GenerationService { .. } => Stage::Feedback,
            AnalysisError::Config(_) => Stage::Config,
            AnalysisError::Io(_) | AnalysisError::Json(_) => Stage::Io,
        }
    }

    /// Whether retrying the run could succeed (infrastructure fault) as opposed
    /// to permanently bad input.
    pub fn is_retryable(&self) -> bool {
        match self {
            AnalysisError::MediaRead { tool_missing, .. }
            | AnalysisError::AudioExtraction { tool_missing, .. }
            | AnalysisError::Transcription { tool_missing, .. } => *tool_missing,
            AnalysisError::GenerationService { attempts } => attempts.iter().any(|a| a.transport),
            AnalysisError::SpeechUnavailable { source, .. } => source.is_retryable(),
            AnalysisError::Io(_) => true,
            AnalysisError::FrameAnalysis { .. }
            | AnalysisError::PoseSolve(_)
            | AnalysisError::Config(_)
            | AnalysisError::Json(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
