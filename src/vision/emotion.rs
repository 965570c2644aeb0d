//! Expression classification
//!
//! Two strategies share one interface. The blendshape strategy reads named
//! activations from the detector; the landmark strategy works from the smile
//! score, head pose and gaze. Their thresholds are independent and are not
//! calibrated against each other.

use crate::types::{Blendshapes, Emotion, Gaze};
use crate::vision::landmarks::{FaceMesh, LandmarkDetector};
use crate::vision::smile::{blendshape_smile, geometric_smile};

/// Per-frame inputs available to a classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpressionCues<'a> {
    pub smile: Option<f64>,
    pub yaw: Option<f64>,
    pub pitch: Option<f64>,
    pub gaze: Option<Gaze>,
    /// Lip gap / interocular distance
    pub mouth_open: Option<f64>,
    pub blendshapes: Option<&'a Blendshapes>,
}

/// Maps per-frame cues to an expression label
pub trait EmotionClassifier: Send + Sync {
    fn classify(&self, cues: &ExpressionCues<'_>) -> Option<Emotion>;

    /// Identifier recorded in metadata
    fn name(&self) -> &'static str;
}

/// Blendshape strategy thresholds
pub mod blendshape_thresholds {
    pub const HAPPY_SMILE: f64 = 0.5;
    pub const SURPRISED_EYE_WIDE: f64 = 0.4;
    pub const SURPRISED_BROW_RAISE: f64 = 0.4;
    pub const CONCERNED_FROWN: f64 = 0.3;
    pub const CONCERNED_BROW_DOWN: f64 = 0.4;
    pub const PLEASANT_SMILE: f64 = 0.2;
}

/// Landmark strategy thresholds (geometric smile scale)
pub mod landmark_thresholds {
    pub const HAPPY_SMILE: f64 = 0.70;
    pub const PLEASANT_SMILE: f64 = 0.62;
    pub const SURPRISED_MOUTH_OPEN: f64 = 0.35;
    pub const CONCERNED_PITCH_DEG: f64 = 20.0;
    pub const CONCERNED_YAW_DEG: f64 = 30.0;
    pub const FOCUSED_YAW_DEG: f64 = 8.0;
    pub const FOCUSED_PITCH_DEG: f64 = 10.0;
}

fn mean_of(shapes: &Blendshapes, names: &[&str]) -> f64 {
    let values: Vec<f64> = names.iter().filter_map(|n| shapes.get(*n).copied()).collect();
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Threshold rules over blendshape activations.
///
/// Priority: happy → surprised → concerned → pleasant → neutral. Frames
/// without blendshapes are handed to [`LandmarkEmotion`]; the extractor counts
/// them in its diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlendshapeEmotion;

impl BlendshapeEmotion {
    fn from_shapes(shapes: &Blendshapes) -> Emotion {
        use blendshape_thresholds::*;

        let smile = blendshape_smile(shapes).unwrap_or(0.0);
        let eye_wide = mean_of(shapes, &["eyeWideLeft", "eyeWideRight"]);
        let brow_raise = shapes
            .get("browInnerUp")
            .copied()
            .unwrap_or(0.0)
            .max(mean_of(shapes, &["browOuterUpLeft", "browOuterUpRight"]));
        let frown = mean_of(shapes, &["mouthFrownLeft", "mouthFrownRight"]);
        let brow_down = mean_of(shapes, &["browDownLeft", "browDownRight"]);

        if smile >= HAPPY_SMILE {
            Emotion::Happy
        } else if eye_wide >= SURPRISED_EYE_WIDE && brow_raise >= SURPRISED_BROW_RAISE {
            Emotion::Surprised
        } else if frown >= CONCERNED_FROWN || brow_down >= CONCERNED_BROW_DOWN {
            Emotion::Concerned
        } else if smile >= PLEASANT_SMILE {
            Emotion::Pleasant
        } else {
            Emotion::Neutral
        }
    }
}

impl EmotionClassifier for BlendshapeEmotion {
    fn classify(&self, cues: &ExpressionCues<'_>) -> Option<Emotion> {
        match cues.blendshapes {
            Some(shapes) if !shapes.is_empty() => Some(Self::from_shapes(shapes)),
            _ => LandmarkEmotion.classify(cues),
        }
    }

    fn name(&self) -> &'static str {
        "blendshape-rules"
    }
}

/// Lower-fidelity rules over smile score, head pose and gaze.
///
/// Priority: happy → surprised → concerned → pleasant → focused → neutral.
#[derive(Debug, Clone, Copy, Default)]
pub struct LandmarkEmotion;

impl EmotionClassifier for LandmarkEmotion {
    fn classify(&self, cues: &ExpressionCues<'_>) -> Option<Emotion> {
        use landmark_thresholds::*;

        let smile = cues.smile?;
        let yaw = cues.yaw.unwrap_or(0.0);
        let pitch = cues.pitch.unwrap_or(0.0);
        let mouth_open = cues.mouth_open.unwrap_or(0.0);

        let label = if smile >= HAPPY_SMILE {
            Emotion::Happy
        } else if mouth_open > SURPRISED_MOUTH_OPEN && smile < PLEASANT_SMILE {
            Emotion::Surprised
        } else if pitch.abs() > CONCERNED_PITCH_DEG || yaw.abs() > CONCERNED_YAW_DEG {
            Emotion::Concerned
        } else if smile >= PLEASANT_SMILE {
            Emotion::Pleasant
        } else if cues.gaze == Some(Gaze::Center)
            && yaw.abs() <= FOCUSED_YAW_DEG
            && pitch.abs() <= FOCUSED_PITCH_DEG
        {
            Emotion::Focused
        } else {
            Emotion::Neutral
        };
        Some(label)
    }

    fn name(&self) -> &'static str {
        "landmark-rules"
    }
}

/// Expression backend, chosen once from the detector's capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionBackend {
    Blendshape,
    Geometric,
}

impl ExpressionBackend {
    pub fn for_detector(detector: &dyn LandmarkDetector) -> Self {
        if detector.supports_blendshapes() {
            ExpressionBackend::Blendshape
        } else {
            ExpressionBackend::Geometric
        }
    }

    /// Smile score for a frame. The blendshape backend uses the geometric
    /// proxy for a frame that arrived without smile activations.
    pub fn smile(&self, mesh: &FaceMesh, blendshapes: Option<&Blendshapes>) -> f64 {
        match self {
            ExpressionBackend::Blendshape => blendshapes
                .and_then(blendshape_smile)
                .unwrap_or_else(|| geometric_smile(mesh)),
            ExpressionBackend::Geometric => geometric_smile(mesh),
        }
    }

    pub fn classifier(&self) -> Box<dyn EmotionClassifier> {
        match self {
            ExpressionBackend::Blendshape => Box::new(BlendshapeEmotion),
            ExpressionBackend::Geometric => Box::new(LandmarkEmotion),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExpressionBackend::Blendshape => "blendshape",
            ExpressionBackend::Geometric => "geometric",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shapes(pairs: &[(&str, f64)]) -> Blendshapes {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn classify_shapes(pairs: &[(&str, f64)]) -> Option<Emotion> {
        let bs = shapes(pairs);
        BlendshapeEmotion.classify(&ExpressionCues {
            blendshapes: Some(&bs),
            ..Default::default()
        })
    }

    #[test]
    fn test_blendshape_priority() {
        assert_eq!(
            classify_shapes(&[("mouthSmileLeft", 0.6), ("mouthSmileRight", 0.6), ("eyeWideLeft", 0.9)]),
            Some(Emotion::Happy)
        );
        assert_eq!(
            classify_shapes(&[
                ("eyeWideLeft", 0.5),
                ("eyeWideRight", 0.5),
                ("browInnerUp", 0.45),
            ]),
            Some(Emotion::Surprised)
        );
        assert_eq!(
            classify_shapes(&[("mouthFrownLeft", 0.4), ("mouthFrownRight", 0.3)]),
            Some(Emotion::Concerned)
        );
        assert_eq!(
            classify_shapes(&[("mouthSmileLeft", 0.3), ("mouthSmileRight", 0.25)]),
            Some(Emotion::Pleasant)
        );
        assert_eq!(classify_shapes(&[("jawOpen", 0.1)]), Some(Emotion::Neutral));
    }

    fn pair(prefix: &str, value: f64) -> [(String, f64); 2] {
        [
            (format!("{prefix}Left"), value),
            (format!("{prefix}Right"), value),
        ]
    }

    fn classify_pairs(groups: &[(&str, f64)]) -> Option<Emotion> {
        let bs: Blendshapes = groups
            .iter()
            .flat_map(|(prefix, value)| pair(prefix, *value))
            .collect();
        BlendshapeEmotion.classify(&ExpressionCues {
            blendshapes: Some(&bs),
            ..Default::default()
        })
    }

    #[test]
    fn test_blendshape_boundaries() {
        use blendshape_thresholds::*;
        let below = |v: f64| v - 1e-6;

        assert_eq!(classify_pairs(&[("mouthSmile", HAPPY_SMILE)]), Some(Emotion::Happy));
        assert_eq!(classify_pairs(&[("mouthSmile", below(HAPPY_SMILE))]), Some(Emotion::Pleasant));

        let surprised = |eye: f64, brow: f64| {
            let mut bs: Blendshapes = pair("eyeWide", eye).into_iter().collect();
            bs.insert("browInnerUp".to_string(), brow);
            BlendshapeEmotion.classify(&ExpressionCues {
                blendshapes: Some(&bs),
                ..Default::default()
            })
        };
        assert_eq!(surprised(SURPRISED_EYE_WIDE, SURPRISED_BROW_RAISE), Some(Emotion::Surprised));
        assert_eq!(surprised(below(SURPRISED_EYE_WIDE), 0.9), Some(Emotion::Neutral));
        assert_eq!(surprised(0.9, below(SURPRISED_BROW_RAISE)), Some(Emotion::Neutral));

        assert_eq!(classify_pairs(&[("mouthFrown", CONCERNED_FROWN)]), Some(Emotion::Concerned));
        assert_eq!(classify_pairs(&[("mouthFrown", below(CONCERNED_FROWN))]), Some(Emotion::Neutral));
        assert_eq!(classify_pairs(&[("browDown", CONCERNED_BROW_DOWN)]), Some(Emotion::Concerned));
        assert_eq!(classify_pairs(&[("browDown", below(CONCERNED_BROW_DOWN))]), Some(Emotion::Neutral));

        assert_eq!(classify_pairs(&[("mouthSmile", PLEASANT_SMILE)]), Some(Emotion::Pleasant));
        assert_eq!(classify_pairs(&[("mouthSmile", below(PLEASANT_SMILE))]), Some(Emotion::Neutral));

        // Priority: happy beats concerned, surprised beats concerned
        assert_eq!(
            classify_pairs(&[("mouthSmile", HAPPY_SMILE), ("mouthFrown", 0.9)]),
            Some(Emotion::Happy)
        );
        assert_eq!(
            classify_pairs(&[("eyeWide", 0.9), ("browOuterUp", 0.9), ("browDown", 0.9)]),
            Some(Emotion::Surprised)
        );
    }

    #[test]
    fn test_landmark_boundaries() {
        use landmark_thresholds::*;
        let eps = 1e-6;
        let base = ExpressionCues {
            smile: Some(0.3),
            yaw: Some(0.0),
            pitch: Some(0.0),
            gaze: Some(Gaze::Center),
            mouth_open: Some(0.05),
            blendshapes: None,
        };
        let classify = |cues: ExpressionCues| LandmarkEmotion.classify(&cues);

        assert_eq!(classify(ExpressionCues { smile: Some(HAPPY_SMILE), ..base }), Some(Emotion::Happy));
        assert_eq!(
            classify(ExpressionCues { smile: Some(HAPPY_SMILE - eps), ..base }),
            Some(Emotion::Pleasant)
        );

        // Mouth openness must strictly exceed the threshold
        assert_eq!(
            classify(ExpressionCues { mouth_open: Some(SURPRISED_MOUTH_OPEN), ..base }),
            Some(Emotion::Focused)
        );
        assert_eq!(
            classify(ExpressionCues { mouth_open: Some(SURPRISED_MOUTH_OPEN + eps), ..base }),
            Some(Emotion::Surprised)
        );
        assert_eq!(
            classify(ExpressionCues {
                mouth_open: Some(0.5),
                smile: Some(PLEASANT_SMILE),
                ..base
            }),
            Some(Emotion::Pleasant)
        );

        assert_eq!(
            classify(ExpressionCues { pitch: Some(CONCERNED_PITCH_DEG), ..base }),
            Some(Emotion::Neutral)
        );
        assert_eq!(
            classify(ExpressionCues { pitch: Some(-(CONCERNED_PITCH_DEG + eps)), ..base }),
            Some(Emotion::Concerned)
        );
        assert_eq!(
            classify(ExpressionCues { yaw: Some(CONCERNED_YAW_DEG), ..base }),
            Some(Emotion::Neutral)
        );
        assert_eq!(
            classify(ExpressionCues { yaw: Some(CONCERNED_YAW_DEG + eps), ..base }),
            Some(Emotion::Concerned)
        );

        assert_eq!(classify(ExpressionCues { smile: Some(PLEASANT_SMILE), ..base }), Some(Emotion::Pleasant));
        assert_eq!(
            classify(ExpressionCues { smile: Some(PLEASANT_SMILE - eps), ..base }),
            Some(Emotion::Focused)
        );

        assert_eq!(classify(ExpressionCues { yaw: Some(FOCUSED_YAW_DEG), ..base }), Some(Emotion::Focused));
        assert_eq!(
            classify(ExpressionCues { yaw: Some(-(FOCUSED_YAW_DEG + eps)), ..base }),
            Some(Emotion::Neutral)
        );
        assert_eq!(classify(ExpressionCues { pitch: Some(FOCUSED_PITCH_DEG), ..base }), Some(Emotion::Focused));
        assert_eq!(
            classify(ExpressionCues { pitch: Some(FOCUSED_PITCH_DEG + eps), ..base }),
            Some(Emotion::Neutral)
        );
        assert_eq!(classify(ExpressionCues { gaze: Some(Gaze::Left), ..base }), Some(Emotion::Neutral));
    }

    #[test]
    fn test_blendshape_falls_back_without_shapes() {
        let cues = ExpressionCues {
            smile: Some(0.5),
            yaw: Some(0.0),
            pitch: Some(0.0),
            gaze: Some(Gaze::Center),
            mouth_open: Some(0.05),
            blendshapes: None,
        };
        assert_eq!(BlendshapeEmotion.classify(&cues), Some(Emotion::Focused));
    }

    #[test]
    fn test_landmark_rules() {
        let base = ExpressionCues {
            smile: Some(0.5),
            yaw: Some(2.0),
            pitch: Some(1.0),
            gaze: Some(Gaze::Center),
            mouth_open: Some(0.05),
            blendshapes: None,
        };
        let classify = |cues: ExpressionCues| LandmarkEmotion.classify(&cues);

        assert_eq!(classify(ExpressionCues { smile: Some(0.75), ..base }), Some(Emotion::Happy));
        assert_eq!(classify(ExpressionCues { mouth_open: Some(0.4), ..base }), Some(Emotion::Surprised));
        assert_eq!(classify(ExpressionCues { pitch: Some(25.0), ..base }), Some(Emotion::Concerned));
        assert_eq!(classify(ExpressionCues { yaw: Some(-35.0), ..base }), Some(Emotion::Concerned));
        assert_eq!(classify(ExpressionCues { smile: Some(0.65), ..base }), Some(Emotion::Pleasant));
        assert_eq!(classify(base), Some(Emotion::Focused));
        assert_eq!(classify(ExpressionCues { yaw: Some(15.0), gaze: Some(Gaze::Right), ..base }), Some(Emotion::Neutral));
    }

    #[test]
    fn test_landmark_rules_need_smile() {
        assert_eq!(LandmarkEmotion.classify(&ExpressionCues::default()), None);
    }
}
