//! Report encoding
//!
//! Wraps a metric set and its feedback with producer and provenance fields.
//! The metric set itself stays free of wall-clock values; only the envelope
//! records when it was computed.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{FeedbackReport, MetricSet};
use crate::{LENS_VERSION, PRODUCER_NAME};

/// Current report schema version
pub const REPORT_VERSION: &str = "1.0.0";

/// Who produced a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Producer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Where the analyzed data came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Video file or timeline artifact
    pub source: String,
    pub duration_sec: f64,
    pub computed_at_utc: String,
}

/// Serialized analysis result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub report_version: String,
    pub producer: Producer,
    pub provenance: Provenance,
    pub metrics: MetricSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<FeedbackReport>,
}

/// Builds [`AnalysisReport`] envelopes
pub struct ReportEncoder {
    instance_id: String,
}

impl Default for ReportEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn encode(
        &self,
        source: &str,
        duration_sec: f64,
        metrics: &MetricSet,
        feedback: Option<&FeedbackReport>,
    ) -> AnalysisReport {
        AnalysisReport {
            report_version: REPORT_VERSION.to_string(),
            producer: Producer {
                name: PRODUCER_NAME.to_string(),
                version: LENS_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            provenance: Provenance {
                source: source.to_string(),
                duration_sec,
                computed_at_utc: Utc::now().to_rfc3339(),
            },
            metrics: metrics.clone(),
            feedback: feedback.cloned(),
        }
    }

    /// Encode to an indented JSON string
    pub fn encode_to_json(
        &self,
        source: &str,
        duration_sec: f64,
        metrics: &MetricSet,
        feedback: Option<&FeedbackReport>,
    ) -> Result<String> {
        let report = self.encode(source, duration_sec, metrics, feedback);
        Ok(serde_json::to_string_pretty(&report)?)
    }
}
