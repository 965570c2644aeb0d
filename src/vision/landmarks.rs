//! Face landmark mesh and the landmark-detection collaborator
//!
//! Indices follow the MediaPipe FaceMesh topology with refined iris landmarks
//! (478 points).

use std::process::Command;

use serde::Deserialize;
use thiserror::Error;

use crate::config::LandmarkConfig;
use crate::media::FrameImage;
use crate::types::Blendshapes;

pub const MOUTH_LEFT: usize = 61;
pub const MOUTH_RIGHT: usize = 291;
pub const LIP_UPPER: usize = 13;
pub const LIP_LOWER: usize = 14;

pub const RIGHT_EYE_OUTER: usize = 33;
pub const RIGHT_EYE_INNER: usize = 133;
pub const LEFT_EYE_INNER: usize = 362;
pub const LEFT_EYE_OUTER: usize = 263;

pub const LEFT_IRIS: [usize; 4] = [474, 475, 476, 477];
pub const RIGHT_IRIS: [usize; 4] = [469, 470, 471, 472];

pub const NOSE_TIP: usize = 1;
pub const CHIN: usize = 152;

/// Pose correspondences, in the order of the canonical 3D template:
/// nose tip, chin, right eye outer, left eye outer, mouth left, mouth right
pub const POSE_POINTS: [usize; 6] = [
    NOSE_TIP,
    CHIN,
    RIGHT_EYE_OUTER,
    LEFT_EYE_OUTER,
    MOUTH_LEFT,
    MOUTH_RIGHT,
];

/// Smallest mesh that contains every index used above
pub const REQUIRED_POINTS: usize = 478;

/// Output of the landmark collaborator for the primary face
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FaceDetection {
    /// Normalized `(x, y, z)`; x and y in image-relative units, z scaled like x
    pub landmarks: Vec<[f64; 3]>,
    #[serde(default)]
    pub blendshapes: Option<Blendshapes>,
    /// Detector confidence that a face is present (0-1)
    #[serde(default)]
    pub presence: Option<f64>,
}

/// Landmark collaborator failures
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("cannot start detector: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("detector exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error("unreadable detector output: {0}")]
    Output(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Landmark-detection collaborator.
///
/// Implementations are shared read-only across extraction workers.
pub trait LandmarkDetector: Send + Sync {
    /// Detect the primary face; `Ok(None)` when no face is found
    fn detect(&self, image: &FrameImage) -> Result<Option<FaceDetection>, DetectionError>;

    /// Whether detections carry blendshape activations
    fn supports_blendshapes(&self) -> bool;

    /// Identifier recorded in metadata
    fn model_id(&self) -> &str;
}

/// Landmarks in pixel space: `(x·w, y·h, z·w)`
#[derive(Debug, Clone)]
pub struct FaceMesh {
    points: Vec<[f64; 3]>,
}

impl FaceMesh {
    pub fn from_normalized(
        landmarks: &[[f64; 3]],
        width: u32,
        height: u32,
    ) -> Result<Self, String> {
        if landmarks.len() < REQUIRED_POINTS {
            return Err(format!(
                "mesh has {} points, need {REQUIRED_POINTS}",
                landmarks.len()
            ));
        }
        if width == 0 || height == 0 {
            return Err("unknown frame dimensions".to_string());
        }
        let (w, h) = (width as f64, height as f64);
        let points = landmarks
            .iter()
            .map(|[x, y, z]| [x * w, y * h, z * w])
            .collect();
        Ok(Self { points })
    }

    /// 2D pixel position of a landmark
    pub fn xy(&self, index: usize) -> [f64; 2] {
        let [x, y, _] = self.points[index];
        [x, y]
    }

    /// 2D centroid of a set of landmarks
    pub fn centroid(&self, indices: &[usize]) -> [f64; 2] {
        let n = indices.len() as f64;
        let (sx, sy) = indices.iter().fold((0.0, 0.0), |(sx, sy), &i| {
            let [x, y] = self.xy(i);
            (sx + x, sy + y)
        });
        [sx / n, sy / n]
    }

    /// Euclidean 2D distance between two landmarks
    pub fn distance(&self, a: usize, b: usize) -> f64 {
        let [ax, ay] = self.xy(a);
        let [bx, by] = self.xy(b);
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }

    /// Distance between the outer eye corners
    pub fn interocular(&self) -> f64 {
        self.distance(RIGHT_EYE_OUTER, LEFT_EYE_OUTER)
    }

    /// Image points for the pose solver, in template order
    pub fn pose_points(&self) -> [[f64; 2]; 6] {
        POSE_POINTS.map(|i| self.xy(i))
    }
}

#[derive(Debug, Deserialize)]
struct SidecarOutput {
    #[serde(default)]
    landmarks: Vec<[f64; 3]>,
    #[serde(default)]
    blendshapes: Option<Blendshapes>,
    #[serde(default)]
    presence: Option<f64>,
}

/// Runs an external landmark program once per frame.
///
/// The frame path is appended to the configured arguments; the program prints
/// `{"landmarks": [[x,y,z],...], "blendshapes": {...}, "presence": 0.98}` to
/// stdout. An empty landmark list means no face.
#[derive(Debug, Clone)]
pub struct SidecarDetector {
    program: String,
    args: Vec<String>,
    blendshapes: bool,
    model_id: String,
}

impl SidecarDetector {
    pub fn new(program: impl Into<String>, args: Vec<String>, blendshapes: bool) -> Self {
        let program = program.into();
        Self {
            model_id: format!("sidecar:{program}"),
            program,
            args,
            blendshapes,
        }
    }

    /// Build from configuration; `None` when no program is configured
    pub fn from_config(config: &LandmarkConfig) -> Option<Self> {
        let program = config.program.as_ref()?;
        let mut detector = Self::new(program.clone(), config.args.clone(), config.blendshapes);
        if let Some(model_id) = &config.model_id {
            detector.model_id = model_id.clone();
        }
        Some(detector)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn parse(stdout: &[u8]) -> Result<Option<FaceDetection>, DetectionError> {
        let output: SidecarOutput = serde_json::from_slice(stdout)?;
        if output.landmarks.is_empty() {
            return Ok(None);
        }
        Ok(Some(FaceDetection {
            landmarks: output.landmarks,
            blendshapes: output.blendshapes,
            presence: output.presence,
        }))
    }
}

impl LandmarkDetector for SidecarDetector {
    fn detect(&self, image: &FrameImage) -> Result<Option<FaceDetection>, DetectionError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(&image.path)
            .output()?;

        if !output.status.success() {
            return Err(DetectionError::Exit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Self::parse(&output.stdout)
    }

    fn supports_blendshapes(&self) -> bool {
        self.blendshapes
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_mesh_rejected() {
        let landmarks = vec![[0.5, 0.5, 0.0]; 468];
        let err = FaceMesh::from_normalized(&landmarks, 640, 480).unwrap_err();
        assert!(err.contains("468"));
    }

    #[test]
    fn test_pixel_conversion() {
        let mut landmarks = vec![[0.0, 0.0, 0.0]; REQUIRED_POINTS];
        landmarks[NOSE_TIP] = [0.5, 0.25, -0.1];
        let mesh = FaceMesh::from_normalized(&landmarks, 640, 480).unwrap();

        assert_eq!(mesh.xy(NOSE_TIP), [320.0, 120.0]);
        assert_eq!(mesh.pose_points()[0], [320.0, 120.0]);
    }

    #[test]
    fn test_centroid_and_distance() {
        let mut landmarks = vec![[0.0, 0.0, 0.0]; REQUIRED_POINTS];
        landmarks[RIGHT_EYE_OUTER] = [0.25, 0.5, 0.0];
        landmarks[LEFT_EYE_OUTER] = [0.75, 0.5, 0.0];
        for (k, &i) in LEFT_IRIS.iter().enumerate() {
            landmarks[i] = [0.1 * k as f64, 0.2, 0.0];
        }
        let mesh = FaceMesh::from_normalized(&landmarks, 100, 100).unwrap();

        assert!((mesh.interocular() - 50.0).abs() < 1e-9);
        let [cx, cy] = mesh.centroid(&LEFT_IRIS);
        assert!((cx - 15.0).abs() < 1e-9);
        assert!((cy - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_sidecar_parse() {
        assert!(SidecarDetector::parse(br#"{"landmarks": []}"#)
            .unwrap()
            .is_none());

        let detection = SidecarDetector::parse(
            br#"{"landmarks": [[0.1, 0.2, 0.0]], "blendshapes": {"mouthSmileLeft": 0.4}, "presence": 0.9}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(detection.landmarks.len(), 1);
        assert_eq!(detection.presence, Some(0.9));
        assert!(detection.blendshapes.unwrap().contains_key("mouthSmileLeft"));

        assert!(SidecarDetector::parse(b"not json").is_err());
    }

    #[test]
    fn test_sidecar_from_config() {
        assert!(SidecarDetector::from_config(&LandmarkConfig::default()).is_none());

        let config = LandmarkConfig {
            program: Some("face-mesh".to_string()),
            args: vec!["--refine".to_string()],
            blendshapes: true,
            model_id: Some("face_landmarker_v2".to_string()),
        };
        let detector = SidecarDetector::from_config(&config).unwrap();
        assert!(detector.supports_blendshapes());
        assert_eq!(detector.model_id(), "face_landmarker_v2");
        assert_eq!(detector.program(), "face-mesh");
    }
}
