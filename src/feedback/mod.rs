//! Coaching feedback from session metrics
//!
//! The model-assisted path turns metrics into a prompt for a text-generation
//! service and splits its reply into items. The rule-based path maps each
//! metric onto fixed bands and needs no service at all.

pub mod generator;
pub mod parser;
pub mod prompt;
pub mod rules;
pub mod synthesizer;

pub use generator::{
    Credential, CredentialPool, GeminiBackend, GenerationBackend, GenerationError,
    GenerationRequest,
};
pub use parser::parse_response;
pub use prompt::build_prompt;
pub use rules::{off_camera_spans, segment_items, video_items, OffCameraSpan};
pub use synthesizer::FeedbackSynthesizer;
