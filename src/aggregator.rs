//! Timeline metrics aggregation
//!
//! Reduces an ordered timeline to session-level vision metrics and the
//! reproducibility metadata block. Every function here is pure and
//! deterministic; ordering of the timeline matters for nod detection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::metadata::{
    expected_frame_count, mean_std, Confidence, Metadata, OutlierFlags, Threshold,
};
use crate::speech::SpeechMetrics;
use crate::types::{Emotion, FrameSample, Gaze, MetricSet};
use crate::vision::ExtractionDiagnostics;

/// EMA smoothing factor for the pitch series
pub const NOD_EMA_ALPHA: f64 = 0.2;

/// Weight of the standard deviation in the adaptive smile threshold
pub const SMILE_STD_WEIGHT: f64 = 0.5;

/// Minimum valid pitch samples for nod detection
const MIN_NOD_SAMPLES: usize = 3;

pub const OUTLIER_YAW_DEG: f64 = 60.0;
pub const OUTLIER_PITCH_DEG: f64 = 45.0;
pub const OUTLIER_ROLL_DEG: f64 = 40.0;

/// Vision-side metrics for one recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionMetrics {
    pub center_gaze_ratio: f64,
    pub smile_ratio: f64,
    pub smile_threshold_used: Option<f64>,
    pub nod_count: u32,
    pub emotion_distribution: BTreeMap<Emotion, f64>,
    pub primary_emotion: Option<Emotion>,
    pub metadata: Metadata,
}

impl VisionMetrics {
    /// Join with the speech metrics into the final metric set
    pub fn with_speech(self, speech: &SpeechMetrics) -> MetricSet {
        MetricSet {
            center_gaze_ratio: self.center_gaze_ratio,
            smile_ratio: self.smile_ratio,
            smile_threshold_used: self.smile_threshold_used,
            nod_count: self.nod_count,
            emotion_distribution: self.emotion_distribution,
            primary_emotion: self.primary_emotion,
            wpm: speech.wpm,
            filler_count: speech.filler_count,
            metadata: Some(self.metadata),
        }
    }
}

/// Aggregation settings
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorSettings {
    /// Sampling rate the timeline was produced at (Hz)
    pub fps_target: f64,
    /// Fixed smile threshold; adaptive when `None`
    pub smile_threshold: Option<f64>,
    pub pitch_thresh_deg: f64,
    pub gaze_yaw_thresh_deg: f64,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            fps_target: crate::config::DEFAULT_FPS_TARGET,
            smile_threshold: None,
            pitch_thresh_deg: crate::config::DEFAULT_PITCH_THRESH_DEG,
            gaze_yaw_thresh_deg: crate::config::DEFAULT_GAZE_YAW_THRESH_DEG,
        }
    }
}

fn valid_frames(timeline: &[FrameSample]) -> impl Iterator<Item = &FrameSample> {
    timeline.iter().filter(|f| f.valid)
}

/// Compute the share of valid frames looking at the camera
///
/// Formula: `count(valid ∧ gaze = CENTER) / count(valid)`, 0 when no frame is valid
pub fn compute_center_gaze_ratio(timeline: &[FrameSample]) -> f64 {
    let (valid, center) = valid_frames(timeline).fold((0usize, 0usize), |(v, c), f| {
        (v + 1, c + usize::from(f.gaze == Some(Gaze::Center)))
    });
    if valid == 0 {
        return 0.0;
    }
    center as f64 / valid as f64
}

/// Compute the adaptive smile threshold
///
/// Formula: `mean + 0.5 · std` (population standard deviation)
pub fn adaptive_smile_threshold(scores: &[f64]) -> Option<f64> {
    mean_std(scores).map(|(mean, std)| mean + SMILE_STD_WEIGHT * std)
}

/// Compute the fraction of scored frames strictly above the smile threshold.
///
/// Returns `(ratio, threshold_used)`; the threshold is `None` when no valid
/// frame carries a smile score.
pub fn compute_smile_ratio(timeline: &[FrameSample], threshold: Option<f64>) -> (f64, Option<f64>) {
    let scores: Vec<f64> = valid_frames(timeline)
        .filter_map(|f| f.smile_score)
        .collect();
    if scores.is_empty() {
        return (0.0, threshold);
    }
    let threshold = match threshold.or_else(|| adaptive_smile_threshold(&scores)) {
        Some(t) => t,
        None => return (0.0, None),
    };
    let smiling = scores.iter().filter(|&&s| s > threshold).count();
    (smiling as f64 / scores.len() as f64, Some(threshold))
}

/// Exponential moving average seeded with the first value
pub fn smooth_ema(values: &[f64], alpha: f64) -> Vec<f64> {
    let mut smoothed = Vec::with_capacity(values.len());
    for &v in values {
        let next = match smoothed.last() {
            Some(&prev) => alpha * v + (1.0 - alpha) * prev,
            None => v,
        };
        smoothed.push(next);
    }
    smoothed
}

/// Count nods in a pitch series.
///
/// The series is EMA-smoothed, then walked with a direction state and the value
/// at the last reversal. A move above that value by more than the threshold
/// flips the state up; a move below it by more than the threshold flips the
/// state down and counts one nod.
pub fn count_nods(pitches: &[f64], pitch_thresh_deg: f64) -> u32 {
    if pitches.len() < MIN_NOD_SAMPLES {
        return 0;
    }
    let smoothed = smooth_ema(pitches, NOD_EMA_ALPHA);

    let mut nods = 0;
    let mut direction = 0i8;
    let mut last_extreme = smoothed[0];
    for &v in &smoothed {
        let diff = v - last_extreme;
        if direction <= 0 && diff > pitch_thresh_deg {
            direction = 1;
            last_extreme = v;
        } else if direction >= 0 && diff < -pitch_thresh_deg {
            direction = -1;
            last_extreme = v;
            nods += 1;
        }
    }
    nods
}

/// Nod count over the valid pitch samples of a timeline
pub fn compute_nod_count(timeline: &[FrameSample], pitch_thresh_deg: f64) -> u32 {
    let pitches: Vec<f64> = valid_frames(timeline).filter_map(|f| f.pitch).collect();
    count_nods(&pitches, pitch_thresh_deg)
}

/// Relative frequency of each expression label over labeled valid frames
pub fn compute_emotion_distribution(timeline: &[FrameSample]) -> BTreeMap<Emotion, f64> {
    let mut counts: BTreeMap<Emotion, usize> = BTreeMap::new();
    for emotion in valid_frames(timeline).filter_map(|f| f.emotion) {
        *counts.entry(emotion).or_default() += 1;
    }
    let total: usize = counts.values().sum();
    counts
        .into_iter()
        .map(|(emotion, n)| (emotion, n as f64 / total as f64))
        .collect()
}

/// Most frequent label; ties go to the lexically smallest label
pub fn primary_emotion(distribution: &BTreeMap<Emotion, f64>) -> Option<Emotion> {
    let mut best: Option<(Emotion, f64)> = None;
    // BTreeMap iterates in lexical label order, so strict `>` keeps the first
    for (&emotion, &ratio) in distribution {
        if best.map_or(true, |(_, top)| ratio > top) {
            best = Some((emotion, ratio));
        }
    }
    best.map(|(emotion, _)| emotion)
}

/// Fraction of valid frames with an implausible head pose
///
/// Rule: `|yaw| > 60° ∨ |pitch| > 45° ∨ |roll| > 40°`
pub fn compute_pose_outlier_ratio(timeline: &[FrameSample]) -> f64 {
    let (valid, outliers) = valid_frames(timeline).fold((0usize, 0usize), |(v, o), f| {
        let outlier = f.yaw.is_some_and(|y| y.abs() > OUTLIER_YAW_DEG)
            || f.pitch.is_some_and(|p| p.abs() > OUTLIER_PITCH_DEG)
            || f.roll.is_some_and(|r| r.abs() > OUTLIER_ROLL_DEG);
        (v + 1, o + usize::from(outlier))
    });
    if valid == 0 {
        return 0.0;
    }
    outliers as f64 / valid as f64
}

/// Reduces a timeline to [`VisionMetrics`]
#[derive(Debug, Clone, Default)]
pub struct TimelineAggregator {
    settings: AggregatorSettings,
}

impl TimelineAggregator {
    pub fn new(settings: AggregatorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &AggregatorSettings {
        &self.settings
    }

    /// Aggregate a timeline.
    ///
    /// `models` maps a model role to its identifier and is copied verbatim
    /// into the metadata.
    pub fn aggregate(
        &self,
        timeline: &[FrameSample],
        duration_sec: f64,
        diagnostics: &ExtractionDiagnostics,
        models: &BTreeMap<String, String>,
    ) -> VisionMetrics {
        let center_gaze_ratio = compute_center_gaze_ratio(timeline);
        let (smile_ratio, smile_threshold_used) =
            compute_smile_ratio(timeline, self.settings.smile_threshold);
        let nod_count = compute_nod_count(timeline, self.settings.pitch_thresh_deg);
        let emotion_distribution = compute_emotion_distribution(timeline);
        let primary_emotion = primary_emotion(&emotion_distribution);
        let pose_outlier_ratio = compute_pose_outlier_ratio(timeline);

        let metadata = self.build_metadata(
            timeline,
            duration_sec,
            smile_threshold_used,
            pose_outlier_ratio,
            diagnostics,
            models,
        );

        info!(
            center_gaze_ratio,
            smile_ratio,
            nod_count,
            valid = metadata.frame_count_valid,
            total = metadata.frame_count_total,
            "Timeline aggregated"
        );

        VisionMetrics {
            center_gaze_ratio,
            smile_ratio,
            smile_threshold_used,
            nod_count,
            emotion_distribution,
            primary_emotion,
            metadata,
        }
    }

    fn build_metadata(
        &self,
        timeline: &[FrameSample],
        duration_sec: f64,
        smile_threshold_used: Option<f64>,
        pose_outlier_ratio: f64,
        diagnostics: &ExtractionDiagnostics,
        models: &BTreeMap<String, String>,
    ) -> Metadata {
        let settings = &self.settings;
        let total = timeline.len();
        let valid = valid_frames(timeline).count();

        let mut thresholds = BTreeMap::new();
        if let Some(value) = smile_threshold_used {
            let formula = if settings.smile_threshold.is_some() {
                "fixed; smiling when score > threshold"
            } else {
                "mean + 0.5*std (population) over valid smile scores; smiling when score > threshold"
            };
            thresholds.insert("smile".to_string(), Threshold::new(value, formula));
        }
        thresholds.insert(
            "gaze_yaw_deg".to_string(),
            Threshold::new(settings.gaze_yaw_thresh_deg, "CENTER when |yaw| <= value"),
        );
        thresholds.insert(
            "nod_pitch_deg".to_string(),
            Threshold::new(
                settings.pitch_thresh_deg,
                "nod when EMA pitch falls more than value below the last upward reversal",
            ),
        );
        thresholds.insert(
            "nod_ema_alpha".to_string(),
            Threshold::new(NOD_EMA_ALPHA, "s[i] = alpha*x[i] + (1-alpha)*s[i-1]"),
        );
        thresholds.insert(
            "pose_outlier_yaw_deg".to_string(),
            Threshold::new(OUTLIER_YAW_DEG, "outlier when |yaw| > value"),
        );
        thresholds.insert(
            "pose_outlier_pitch_deg".to_string(),
            Threshold::new(OUTLIER_PITCH_DEG, "outlier when |pitch| > value"),
        );
        thresholds.insert(
            "pose_outlier_roll_deg".to_string(),
            Threshold::new(OUTLIER_ROLL_DEG, "outlier when |roll| > value"),
        );

        let presence = mean_std(&diagnostics.face_presence);
        let gaze = mean_std(&diagnostics.gaze_ratio_values());
        let confidence = Confidence {
            valid_frame_ratio: if total == 0 {
                0.0
            } else {
                valid as f64 / total as f64
            },
            face_presence_mean: presence.map(|(m, _)| m),
            face_presence_std: presence.map(|(_, s)| s),
            gaze_ratio_mean: gaze.map(|(m, _)| m),
            gaze_ratio_std: gaze.map(|(_, s)| s),
            expression_fallback_frames: diagnostics.expression_fallbacks,
        };

        Metadata {
            fps_analyzed: settings.fps_target,
            frame_count_total: total,
            frame_count_valid: valid,
            frame_count_expected: expected_frame_count(duration_sec, settings.fps_target),
            thresholds,
            models: models.clone(),
            confidence,
            outliers: OutlierFlags {
                pose_outlier_ratio,
                rule: format!(
                    "|yaw|>{OUTLIER_YAW_DEG} or |pitch|>{OUTLIER_PITCH_DEG} or |roll|>{OUTLIER_ROLL_DEG}"
                ),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn frame(t: f64, gaze: Gaze, smile: f64, pitch: f64, emotion: Option<Emotion>) -> FrameSample {
        FrameSample {
            timestamp: t,
            valid: true,
            gaze: Some(gaze),
            smile_score: Some(smile),
            yaw: Some(0.0),
            pitch: Some(pitch),
            roll: Some(0.0),
            emotion,
            blendshapes: None,
        }
    }

    fn smiles(scores: &[f64]) -> Vec<FrameSample> {
        scores
            .iter()
            .enumerate()
            .map(|(i, &s)| frame(i as f64 * 0.2, Gaze::Center, s, 0.0, None))
            .collect()
    }

    fn pitch_series(segments: &[(f64, usize)]) -> Vec<f64> {
        segments
            .iter()
            .flat_map(|&(value, n)| std::iter::repeat(value).take(n))
            .collect()
    }

    #[test]
    fn test_all_invalid_timeline_is_zero() {
        let timeline: Vec<FrameSample> = (0..10).map(|i| FrameSample::invalid(i as f64)).collect();
        let metrics = TimelineAggregator::default().aggregate(
            &timeline,
            2.0,
            &ExtractionDiagnostics::default(),
            &BTreeMap::new(),
        );

        assert_eq!(metrics.center_gaze_ratio, 0.0);
        assert_eq!(metrics.smile_ratio, 0.0);
        assert_eq!(metrics.nod_count, 0);
        assert_eq!(metrics.smile_threshold_used, None);
        assert!(metrics.emotion_distribution.is_empty());
        assert_eq!(metrics.primary_emotion, None);
        assert_eq!(metrics.metadata.confidence.valid_frame_ratio, 0.0);
        assert_eq!(metrics.metadata.frame_count_total, 10);
        assert_eq!(metrics.metadata.frame_count_valid, 0);
    }

    #[test]
    fn test_center_gaze_ratio_ignores_invalid() {
        let timeline = vec![
            frame(0.0, Gaze::Center, 0.5, 0.0, None),
            frame(0.2, Gaze::Left, 0.5, 0.0, None),
            FrameSample::invalid(0.4),
            frame(0.6, Gaze::Center, 0.5, 0.0, None),
        ];
        let ratio = compute_center_gaze_ratio(&timeline);
        assert!((ratio - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_adaptive_smile_threshold() {
        let (ratio, threshold) = compute_smile_ratio(&smiles(&[0.2, 0.2, 0.2, 0.9]), None);
        let threshold = threshold.unwrap();

        // mean 0.375, population std ≈ 0.30311
        assert!((threshold - 0.526554).abs() < 1e-5);
        assert_eq!(ratio, 0.25);
    }

    #[test]
    fn test_score_equal_to_threshold_excluded() {
        // Zero spread puts every score exactly on the threshold
        let (ratio, threshold) = compute_smile_ratio(&smiles(&[0.5, 0.5, 0.5, 0.5]), None);
        assert_eq!(threshold, Some(0.5));
        assert_eq!(ratio, 0.0);

        let (ratio, threshold) = compute_smile_ratio(&smiles(&[0.5, 0.75]), Some(0.5));
        assert_eq!(threshold, Some(0.5));
        assert_eq!(ratio, 0.5);
    }

    #[test]
    fn test_ratios_within_unit_interval() {
        let timeline = smiles(&[0.1, 0.9, 0.3, 0.7, 0.5, 0.2]);
        let (smile_ratio, _) = compute_smile_ratio(&timeline, None);
        let gaze_ratio = compute_center_gaze_ratio(&timeline);
        assert!((0.0..=1.0).contains(&smile_ratio));
        assert!((0.0..=1.0).contains(&gaze_ratio));
    }

    #[test]
    fn test_smooth_ema() {
        let smoothed = smooth_ema(&[10.0, 0.0, 0.0], 0.2);
        assert_eq!(smoothed[0], 10.0);
        assert!((smoothed[1] - 8.0).abs() < 1e-12);
        assert!((smoothed[2] - 6.4).abs() < 1e-12);
    }

    #[test]
    fn test_count_nods_single_cycle() {
        let pitches = pitch_series(&[(0.0, 3), (30.0, 15), (0.0, 20)]);
        assert_eq!(count_nods(&pitches, 8.0), 1);
    }

    #[test]
    fn test_count_nods_two_cycles() {
        let pitches = pitch_series(&[(0.0, 3), (30.0, 15), (0.0, 20), (30.0, 15), (0.0, 20)]);
        assert_eq!(count_nods(&pitches, 8.0), 2);
    }

    #[test]
    fn test_count_nods_small_motion_ignored() {
        let pitches = pitch_series(&[(0.0, 3), (5.0, 15), (0.0, 20)]);
        assert_eq!(count_nods(&pitches, 8.0), 0);
    }

    #[test]
    fn test_count_nods_too_few_samples() {
        assert_eq!(count_nods(&[0.0, 40.0], 8.0), 0);
        assert_eq!(count_nods(&[], 8.0), 0);
    }

    #[test]
    fn test_count_nods_idempotent() {
        let pitches = pitch_series(&[(0.0, 3), (30.0, 15), (0.0, 20), (25.0, 12), (-5.0, 25)]);
        let first = count_nods(&pitches, 8.0);
        assert_eq!(count_nods(&pitches, 8.0), first);
    }

    #[test]
    fn test_nods_skip_invalid_frames() {
        let mut timeline: Vec<FrameSample> = pitch_series(&[(0.0, 3), (30.0, 15), (0.0, 20)])
            .into_iter()
            .enumerate()
            .map(|(i, p)| frame(i as f64 * 0.2, Gaze::Center, 0.5, p, None))
            .collect();
        timeline.insert(10, FrameSample::invalid(1.9));
        assert_eq!(compute_nod_count(&timeline, 8.0), 1);
    }

    #[test]
    fn test_emotion_distribution_and_primary() {
        let timeline = vec![
            frame(0.0, Gaze::Center, 0.5, 0.0, Some(Emotion::Neutral)),
            frame(0.2, Gaze::Center, 0.5, 0.0, Some(Emotion::Happy)),
            frame(0.4, Gaze::Center, 0.5, 0.0, Some(Emotion::Neutral)),
            frame(0.6, Gaze::Center, 0.5, 0.0, None),
            FrameSample::invalid(0.8),
        ];
        let dist = compute_emotion_distribution(&timeline);

        assert!((dist[&Emotion::Neutral] - 2.0 / 3.0).abs() < 1e-12);
        assert!((dist[&Emotion::Happy] - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(primary_emotion(&dist), Some(Emotion::Neutral));
    }

    #[test]
    fn test_primary_emotion_tie_uses_lexical_order() {
        let dist: BTreeMap<Emotion, f64> = [
            (Emotion::Pleasant, 0.4),
            (Emotion::Focused, 0.4),
            (Emotion::Neutral, 0.2),
        ]
        .into_iter()
        .collect();
        assert_eq!(primary_emotion(&dist), Some(Emotion::Focused));
    }

    #[test]
    fn test_pose_outlier_ratio() {
        let mut timeline = smiles(&[0.5, 0.5, 0.5, 0.5]);
        timeline[0].yaw = Some(75.0);
        timeline[1].roll = Some(-41.0);
        timeline[2].pitch = Some(45.0);
        assert_eq!(compute_pose_outlier_ratio(&timeline), 0.5);
    }

    #[test]
    fn test_metadata_contents() {
        let timeline = smiles(&[0.2, 0.2, 0.2, 0.9]);
        let diagnostics = ExtractionDiagnostics {
            face_presence: vec![0.9, 1.0],
            expression_fallbacks: 1,
            ..Default::default()
        };
        let models: BTreeMap<String, String> =
            [("landmarks".to_string(), "scripted".to_string())].into_iter().collect();

        let metrics = TimelineAggregator::default().aggregate(&timeline, 1.0, &diagnostics, &models);
        let metadata = &metrics.metadata;

        assert_eq!(metadata.fps_analyzed, 5.0);
        assert_eq!(metadata.frame_count_expected, 5);
        assert_eq!(metadata.frame_count_valid, 4);
        assert_eq!(metadata.thresholds["smile"].value, metrics.smile_threshold_used.unwrap());
        assert!(metadata.thresholds["smile"].formula.starts_with("mean + 0.5*std"));
        assert_eq!(metadata.models["landmarks"], "scripted");
        assert!((metadata.confidence.face_presence_mean.unwrap() - 0.95).abs() < 1e-12);
        assert_eq!(metadata.confidence.gaze_ratio_mean, None);
        assert_eq!(metadata.confidence.expression_fallback_frames, 1);
        assert_eq!(metadata.outliers.rule, "|yaw|>60 or |pitch|>45 or |roll|>40");
    }

    #[test]
    fn test_metadata_bytes_stable() {
        let timeline = smiles(&[0.3, 0.6, 0.4, 0.8]);
        let aggregator = TimelineAggregator::default();
        let diagnostics = ExtractionDiagnostics::default();
        let models = BTreeMap::new();

        let first = aggregator.aggregate(&timeline, 0.8, &diagnostics, &models);
        let second = aggregator.aggregate(&timeline, 0.8, &diagnostics, &models);
        assert_eq!(
            serde_json::to_string(&first.metadata).unwrap(),
            serde_json::to_string(&second.metadata).unwrap()
        );
    }

    #[test]
    fn test_with_speech_attaches_metadata() {
        let vision = TimelineAggregator::default().aggregate(
            &smiles(&[0.5]),
            0.2,
            &ExtractionDiagnostics::default(),
            &BTreeMap::new(),
        );
        let metrics = vision.with_speech(&SpeechMetrics {
            wpm: 120.0,
            filler_count: 3,
        });
        assert_eq!(metrics.wpm, 120.0);
        assert_eq!(metrics.filler_count, 3);
        assert!(metrics.metadata.is_some());
    }
}
