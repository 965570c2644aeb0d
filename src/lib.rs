//! Answer Lens - nonverbal and speech analysis for recorded interview answers
//!
//! A recording goes through a deterministic pipeline: media decomposition →
//! per-frame facial features → timeline aggregation → transcription and speech
//! metrics → coaching feedback.
//!
//! ## Modules
//!
//! - **Vision**: landmarks, gaze, smile, head pose and expression per frame
//! - **Aggregation**: session metrics plus reproducibility metadata
//! - **Speech**: speech rate and filler words from a transcript
//! - **Feedback**: model-assisted coaching with a rule-based fallback

pub mod aggregator;
pub mod config;
pub mod encoder;
pub mod error;
pub mod feedback;
pub mod media;
pub mod metadata;
pub mod pipeline;
pub mod speech;
pub mod types;
pub mod vision;

pub use aggregator::{AggregatorSettings, TimelineAggregator, VisionMetrics};
pub use config::AnalysisConfig;
pub use encoder::{AnalysisReport, ReportEncoder};
pub use error::{AnalysisError, Stage};
pub use feedback::{CredentialPool, FeedbackSynthesizer};
pub use pipeline::{metrics_from_timeline, AnalysisOutcome, InterviewAnalyzer};
pub use speech::{SpeechMetrics, SpeechMetricsExtractor, Transcriber, WhisperCli};
pub use types::{
    Emotion, FeedbackItem, FeedbackLanguage, FeedbackMode, FeedbackReport, FrameSample, Gaze,
    MetricSet, Timeline,
};
pub use vision::{FacialFeatureExtractor, LandmarkDetector, SidecarDetector};

/// Version embedded in every report
pub const LENS_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "answer-lens";
