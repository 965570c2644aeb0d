//! Facial feature extraction
//!
//! Per frame: landmark mesh → head pose → gaze class, smile score and
//! expression label.

pub mod emotion;
pub mod extractor;
pub mod gaze;
pub mod landmarks;
pub mod pose;
pub mod smile;

pub use emotion::{
    BlendshapeEmotion, EmotionClassifier, ExpressionBackend, ExpressionCues, LandmarkEmotion,
};
pub use extractor::{
    load_timeline, save_timeline, ExtractionDiagnostics, ExtractorSettings,
    FacialFeatureExtractor, FrameFailure, GazeRatioSample,
};
pub use landmarks::{DetectionError, FaceDetection, FaceMesh, LandmarkDetector, SidecarDetector};
pub use pose::{estimate_head_pose, fold_pitch, wrap_angle, HeadPose};
