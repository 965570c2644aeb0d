//! Pipeline orchestration
//!
//! Runs one recording through media decomposition, facial feature extraction,
//! timeline aggregation, transcription, speech metrics and feedback synthesis.
//! Stages run sequentially; only per-frame analysis is parallel.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::aggregator::{AggregatorSettings, TimelineAggregator, VisionMetrics};
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};
use crate::feedback::{CredentialPool, FeedbackSynthesizer};
use crate::media::{wav_duration, MediaDecomposer, SampledFrame, VideoInfo};
use crate::speech::{SpeechMetricsExtractor, Transcriber, WhisperCli};
use crate::types::{FeedbackReport, FrameSample, MetricSet, Timeline, Transcript};
use crate::vision::{
    save_timeline, ExtractionDiagnostics, ExtractorSettings, FacialFeatureExtractor,
    LandmarkDetector, SidecarDetector,
};

/// Head-pose solver identifier recorded in metadata
pub const POSE_SOLVER_ID: &str = "pnp-lm-6pt";

pub const FRAMES_DIR: &str = "frames";
pub const AUDIO_FILE: &str = "audio.wav";
pub const TIMELINE_FILE: &str = "timeline.json";

/// Everything produced for one recording
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    /// Decoded audio length, or the container duration when unreadable
    pub duration_sec: f64,
    pub timeline: Timeline,
    pub diagnostics: ExtractionDiagnostics,
    pub transcript: Transcript,
    pub metrics: MetricSet,
    pub feedback: FeedbackReport,
    /// Where the timeline artifact was written
    pub timeline_path: PathBuf,
}

/// Compute a metric set from a stored timeline and transcript text.
///
/// Used when the timeline artifact already exists; metadata carries no
/// extraction diagnostics and no model identifiers.
pub fn metrics_from_timeline(
    timeline: &[FrameSample],
    duration_sec: f64,
    transcript: &str,
    settings: AggregatorSettings,
) -> MetricSet {
    let vision = TimelineAggregator::new(settings).aggregate(
        timeline,
        duration_sec,
        &ExtractionDiagnostics::default(),
        &BTreeMap::new(),
    );
    let speech = SpeechMetricsExtractor::default().compute(transcript, duration_sec);
    vision.with_speech(&speech)
}

/// End-to-end analyzer for recorded interview answers
pub struct InterviewAnalyzer {
    config: AnalysisConfig,
    media: MediaDecomposer,
    extractor: FacialFeatureExtractor,
    aggregator: TimelineAggregator,
    transcriber: Box<dyn Transcriber>,
    speech: SpeechMetricsExtractor,
    feedback: FeedbackSynthesizer,
}

impl InterviewAnalyzer {
    /// Assemble an analyzer from explicit collaborators
    pub fn new(
        config: AnalysisConfig,
        detector: Arc<dyn LandmarkDetector>,
        transcriber: Box<dyn Transcriber>,
        feedback: FeedbackSynthesizer,
    ) -> Self {
        let extractor = FacialFeatureExtractor::new(
            detector,
            ExtractorSettings {
                gaze_yaw_thresh_deg: config.gaze_yaw_thresh_deg,
                workers: config.workers,
            },
        );
        let aggregator = TimelineAggregator::new(AggregatorSettings {
            fps_target: config.fps_target,
            smile_threshold: config.smile_threshold,
            pitch_thresh_deg: config.pitch_thresh_deg,
            gaze_yaw_thresh_deg: config.gaze_yaw_thresh_deg,
        });
        Self {
            media: MediaDecomposer::new(&config.media),
            extractor,
            aggregator,
            transcriber,
            speech: SpeechMetricsExtractor::default(),
            feedback,
            config,
        }
    }

    /// Sidecar landmark detector, whisper CLI and, when credentials exist in the
    /// environment, model-assisted feedback.
    pub fn from_config(config: AnalysisConfig) -> Result<Self> {
        let detector = SidecarDetector::from_config(&config.landmarks).ok_or_else(|| {
            AnalysisError::Config(
                "no landmark detector configured (set landmarks.program or LENS_LANDMARK_CMD)"
                    .to_string(),
            )
        })?;
        let transcriber = WhisperCli::from_config(&config.transcription)
            .with_output_dir(config.work_dir.clone());
        let feedback = FeedbackSynthesizer::from_config(&config.generation, CredentialPool::from_env())?;
        Ok(Self::new(
            config,
            Arc::new(detector),
            Box::new(transcriber),
            feedback,
        ))
    }

    /// Force rule-based feedback
    pub fn with_rule_based_feedback(mut self) -> Self {
        let language = self.feedback.language();
        self.feedback = FeedbackSynthesizer::rule_based().with_language(language);
        self
    }

    pub fn with_speech_extractor(mut self, speech: SpeechMetricsExtractor) -> Self {
        self.speech = speech;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Model role → identifier, as recorded in metadata
    pub fn models(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("landmarks".to_string(), self.extractor.detector_id().to_string()),
            ("expression".to_string(), self.extractor.backend().name().to_string()),
            (
                "emotion_classifier".to_string(),
                self.extractor.classifier_name().to_string(),
            ),
            ("pose".to_string(), POSE_SOLVER_ID.to_string()),
            ("transcription".to_string(), self.transcriber.model_id()),
        ])
    }

    /// Analyze one video file.
    ///
    /// Frames, audio and the timeline artifact are written under the
    /// configured work directory.
    pub fn analyze(&self, video: &Path) -> Result<AnalysisOutcome> {
        let work_dir = &self.config.work_dir;
        info!(video = %video.display(), work_dir = %work_dir.display(), "Starting analysis");

        // Stage 1: Probe the container
        let probe = self.media.probe(video)?;

        // Stage 2: Sample frames at the target rate
        let frames = self.media.extract_frames(
            video,
            &probe,
            &work_dir.join(FRAMES_DIR),
            self.config.fps_target,
        )?;

        // Stage 3: Extract the audio track
        let audio = work_dir.join(AUDIO_FILE);
        self.media.extract_audio(video, &audio)?;

        let duration_sec = self.duration(&audio, &probe);
        self.analyze_media(&frames, &audio, duration_sec)
    }

    /// Decoded audio length, falling back to the container duration
    fn duration(&self, audio: &Path, probe: &VideoInfo) -> f64 {
        match wav_duration(audio) {
            Ok(duration) if duration > 0.0 => duration,
            Ok(_) => probe.duration_sec,
            Err(e) => {
                warn!(error = %e, fallback = probe.duration_sec, "Cannot read audio duration");
                probe.duration_sec
            }
        }
    }

    /// Run the stages after media decomposition.
    ///
    /// A transcription failure returns [`AnalysisError::SpeechUnavailable`]
    /// carrying the vision metrics computed so far.
    pub fn analyze_media(
        &self,
        frames: &[SampledFrame],
        audio: &Path,
        duration_sec: f64,
    ) -> Result<AnalysisOutcome> {
        // Stage 4: Per-frame facial features
        let (timeline, diagnostics) = self.extractor.extract(frames);

        // Stage 5: Persist the timeline artifact
        let timeline_path = self.config.work_dir.join(TIMELINE_FILE);
        save_timeline(&timeline_path, &timeline)?;

        // Stage 6: Aggregate vision metrics
        let vision = self
            .aggregator
            .aggregate(&timeline, duration_sec, &diagnostics, &self.models());

        // Stage 7: Transcribe
        let language = self.config.transcription.language.as_deref();
        let transcript = match self.transcriber.transcribe(audio, language) {
            Ok(transcript) => transcript,
            Err(source) => return Err(speech_unavailable(vision, source)),
        };

        // Stage 8: Speech metrics
        let speech = self.speech.compute(&transcript.text, duration_sec);
        let metrics = vision.with_speech(&speech);

        // Stage 9: Feedback
        let feedback = self
            .feedback
            .synthesize(&metrics, Some(&transcript.text), Some(&timeline));

        info!(
            frames = timeline.len(),
            feedback_items = feedback.items.len(),
            "Analysis complete"
        );

        Ok(AnalysisOutcome {
            duration_sec,
            timeline,
            diagnostics,
            transcript,
            metrics,
            feedback,
            timeline_path,
        })
    }
}

fn speech_unavailable(vision: VisionMetrics, source: AnalysisError) -> AnalysisError {
    warn!(error = %source, "Transcription failed; returning vision metrics only");
    AnalysisError::SpeechUnavailable {
        partial: Box::new(vision),
        source: Box::new(source),
    }
}
