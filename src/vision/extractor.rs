//! Facial feature extraction over sampled frames
//!
//! Each frame is analyzed independently, so frames are fanned out over scoped
//! worker threads and re-sorted by timestamp afterwards. A failure on one frame
//! downgrades it to `valid = false` and never aborts the run.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AnalysisError, Result};
use crate::media::SampledFrame;
use crate::types::{FrameSample, Timeline};
use crate::vision::emotion::{EmotionClassifier, ExpressionBackend, ExpressionCues};
use crate::vision::gaze::{average_iris_ratio, classify_gaze};
use crate::vision::landmarks::{FaceMesh, LandmarkDetector};
use crate::vision::pose::{estimate_head_pose, HeadPose};
use crate::vision::smile::mouth_openness;

/// Averaged iris ratio for one valid frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GazeRatioSample {
    pub timestamp: f64,
    pub ratio: f64,
}

/// A frame downgraded to invalid by an analysis error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameFailure {
    pub timestamp: f64,
    pub reason: String,
}

/// Per-run diagnostics returned alongside the timeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionDiagnostics {
    pub gaze_ratios: Vec<GazeRatioSample>,
    /// Detector face-presence scores, for detectors that report them
    pub face_presence: Vec<f64>,
    pub failed_frames: Vec<FrameFailure>,
    /// Frames whose pose solve failed and were given `(0, 0, 0)`
    pub pose_failures: usize,
    /// Frames labeled by the landmark rules because the blendshape backend
    /// received no activations for them
    pub expression_fallbacks: usize,
}

impl ExtractionDiagnostics {
    pub fn gaze_ratio_values(&self) -> Vec<f64> {
        self.gaze_ratios.iter().map(|g| g.ratio).collect()
    }
}

/// Result of analyzing one frame
#[derive(Debug, Clone)]
struct FrameOutcome {
    sample: FrameSample,
    gaze_ratio: Option<f64>,
    presence: Option<f64>,
    failure: Option<String>,
    pose_failed: bool,
    expression_fallback: bool,
}

impl FrameOutcome {
    fn invalid(timestamp: f64, failure: Option<String>) -> Self {
        Self {
            sample: FrameSample::invalid(timestamp),
            gaze_ratio: None,
            presence: None,
            failure,
            pose_failed: false,
            expression_fallback: false,
        }
    }
}

/// Extraction settings
#[derive(Debug, Clone, Copy)]
pub struct ExtractorSettings {
    pub gaze_yaw_thresh_deg: f64,
    /// Worker threads; available cores when `None`
    pub workers: Option<usize>,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            gaze_yaw_thresh_deg: crate::config::DEFAULT_GAZE_YAW_THRESH_DEG,
            workers: None,
        }
    }
}

/// Turns sampled frames into a timeline
pub struct FacialFeatureExtractor {
    detector: Arc<dyn LandmarkDetector>,
    backend: ExpressionBackend,
    classifier: Box<dyn EmotionClassifier>,
    settings: ExtractorSettings,
}

impl FacialFeatureExtractor {
    pub fn new(detector: Arc<dyn LandmarkDetector>, settings: ExtractorSettings) -> Self {
        let backend = ExpressionBackend::for_detector(detector.as_ref());
        info!(
            detector = detector.model_id(),
            backend = backend.name(),
            "Expression backend selected"
        );
        Self {
            classifier: backend.classifier(),
            detector,
            backend,
            settings,
        }
    }

    pub fn backend(&self) -> ExpressionBackend {
        self.backend
    }

    pub fn detector_id(&self) -> &str {
        self.detector.model_id()
    }

    pub fn classifier_name(&self) -> &'static str {
        self.classifier.name()
    }

    fn analyze_frame(&self, frame: &SampledFrame) -> FrameOutcome {
        let timestamp = frame.timestamp;

        let detection = match self.detector.detect(&frame.image) {
            Ok(Some(detection)) => detection,
            Ok(None) => return FrameOutcome::invalid(timestamp, None),
            Err(e) => return FrameOutcome::invalid(timestamp, Some(e.to_string())),
        };

        let mesh = match FaceMesh::from_normalized(
            &detection.landmarks,
            frame.image.width,
            frame.image.height,
        ) {
            Ok(mesh) => mesh,
            Err(reason) => return FrameOutcome::invalid(timestamp, Some(reason)),
        };

        let (pose, pose_failed) =
            match estimate_head_pose(&mesh.pose_points(), frame.image.width, frame.image.height) {
                Ok(pose) => (pose, false),
                Err(e) => {
                    debug!(timestamp, error = %e, "Pose solve failed, using zeros");
                    (HeadPose::ZERO, true)
                }
            };

        let gaze = classify_gaze(Some(pose.yaw), self.settings.gaze_yaw_thresh_deg);
        let expression_fallback = self.backend == ExpressionBackend::Blendshape
            && detection.blendshapes.as_ref().map_or(true, |b| b.is_empty());
        let smile = self.backend.smile(&mesh, detection.blendshapes.as_ref());
        let emotion = self.classifier.classify(&ExpressionCues {
            smile: Some(smile),
            yaw: Some(pose.yaw),
            pitch: Some(pose.pitch),
            gaze: Some(gaze),
            mouth_open: Some(mouth_openness(&mesh)),
            blendshapes: detection.blendshapes.as_ref(),
        });

        FrameOutcome {
            sample: FrameSample {
                timestamp,
                valid: true,
                gaze: Some(gaze),
                smile_score: Some(smile),
                yaw: Some(pose.yaw),
                pitch: Some(pose.pitch),
                roll: Some(pose.roll),
                emotion,
                blendshapes: detection.blendshapes,
            },
            gaze_ratio: Some(average_iris_ratio(&mesh)),
            presence: detection.presence,
            failure: None,
            pose_failed,
            expression_fallback,
        }
    }

    fn worker_count(&self, frames: usize) -> usize {
        let available = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.settings
            .workers
            .unwrap_or(available)
            .clamp(1, frames.max(1))
    }

    /// Analyze every frame and return the timeline sorted by timestamp
    pub fn extract(&self, frames: &[SampledFrame]) -> (Timeline, ExtractionDiagnostics) {
        let workers = self.worker_count(frames.len());
        let chunk_size = frames.len().div_ceil(workers).max(1);

        let mut outcomes: Vec<FrameOutcome> = thread::scope(|scope| {
            let handles: Vec<_> = frames
                .chunks(chunk_size)
                .map(|chunk| {
                    let handle = scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|frame| self.analyze_frame(frame))
                            .collect::<Vec<_>>()
                    });
                    (chunk, handle)
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|(chunk, handle)| match handle.join() {
                    Ok(outcomes) => outcomes,
                    Err(_) => chunk
                        .iter()
                        .map(|frame| {
                            FrameOutcome::invalid(
                                frame.timestamp,
                                Some("frame worker panicked".to_string()),
                            )
                        })
                        .collect(),
                })
                .collect()
        });

        outcomes.sort_by(|a, b| a.sample.timestamp.total_cmp(&b.sample.timestamp));

        let mut diagnostics = ExtractionDiagnostics::default();
        let mut timeline = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            let timestamp = outcome.sample.timestamp;
            if let Some(reason) = outcome.failure {
                let error = AnalysisError::FrameAnalysis {
                    timestamp,
                    reason: reason.clone(),
                };
                warn!(error = %error, "Frame downgraded to invalid");
                diagnostics.failed_frames.push(FrameFailure { timestamp, reason });
            }
            if let Some(ratio) = outcome.gaze_ratio {
                diagnostics.gaze_ratios.push(GazeRatioSample { timestamp, ratio });
            }
            if let Some(presence) = outcome.presence {
                diagnostics.face_presence.push(presence);
            }
            if outcome.pose_failed {
                diagnostics.pose_failures += 1;
            }
            if outcome.expression_fallback {
                diagnostics.expression_fallbacks += 1;
            }
            timeline.push(outcome.sample);
        }

        let valid = timeline.iter().filter(|f| f.valid).count();
        info!(
            frames = timeline.len(),
            valid,
            failed = diagnostics.failed_frames.len(),
            pose_failures = diagnostics.pose_failures,
            expression_fallbacks = diagnostics.expression_fallbacks,
            workers,
            "Facial features extracted"
        );
        (timeline, diagnostics)
    }
}

/// Write the timeline as indented UTF-8 JSON, replacing any previous file
pub fn save_timeline(path: &Path, timeline: &[FrameSample]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(timeline)?;
    fs::write(path, json)?;
    Ok(())
}

/// Read a timeline written by [`save_timeline`] (legacy `t`/`smile` keys accepted)
pub fn load_timeline(path: &Path) -> Result<Timeline> {
    let raw = fs::read_to_string(path)?;
    let mut timeline: Timeline = serde_json::from_str(&raw)?;
    timeline.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    Ok(timeline)
}
