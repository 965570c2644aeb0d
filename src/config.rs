//! Pipeline configuration
//!
//! Every field has a default suitable for local runs. Values can come from a JSON
//! file, from environment variables, or both (environment wins).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};
use crate::feedback::Credential;
use crate::types::FeedbackLanguage;

/// Default frame sampling rate (Hz)
pub const DEFAULT_FPS_TARGET: f64 = 5.0;

/// Default nod detection threshold (degrees)
pub const DEFAULT_PITCH_THRESH_DEG: f64 = 8.0;

/// Default half-width of the centered-gaze yaw band (degrees)
pub const DEFAULT_GAZE_YAW_THRESH_DEG: f64 = 8.0;

/// Number of numbered credential slots read from the environment
const CREDENTIAL_SLOTS: usize = 3;

/// Top-level analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Target frame sampling rate in Hz
    pub fps_target: f64,
    /// Fixed smile threshold; adaptive (mean + 0.5·std) when absent
    pub smile_threshold: Option<f64>,
    /// Minimum smoothed pitch reversal counted as a nod (degrees)
    pub pitch_thresh_deg: f64,
    /// Yaw magnitude still classified as CENTER gaze (degrees)
    pub gaze_yaw_thresh_deg: f64,
    /// Frame analysis worker threads; available cores when absent
    pub workers: Option<usize>,
    /// Directory for frames, audio and the timeline artifact
    pub work_dir: PathBuf,
    pub media: MediaConfig,
    pub transcription: TranscriptionConfig,
    pub landmarks: LandmarkConfig,
    pub generation: GenerationConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fps_target: DEFAULT_FPS_TARGET,
            smile_threshold: None,
            pitch_thresh_deg: DEFAULT_PITCH_THRESH_DEG,
            gaze_yaw_thresh_deg: DEFAULT_GAZE_YAW_THRESH_DEG,
            workers: None,
            work_dir: PathBuf::from("artifacts"),
            media: MediaConfig::default(),
            transcription: TranscriptionConfig::default(),
            landmarks: LandmarkConfig::default(),
            generation: GenerationConfig::default(),
        }
    }
}

/// External decode tools
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
        }
    }
}

/// Speech-to-text collaborator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Whisper CLI executable
    pub program: String,
    /// Model size (tiny, base, small, medium, large)
    pub model: String,
    /// Language hint passed to the engine
    pub language: Option<String>,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            program: "whisper".to_string(),
            model: "base".to_string(),
            language: Some("ko".to_string()),
        }
    }
}

/// Landmark detection sidecar settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LandmarkConfig {
    /// Executable invoked once per frame (frame path appended to `args`)
    pub program: Option<String>,
    pub args: Vec<String>,
    /// Whether the sidecar's model reports blendshapes
    pub blendshapes: bool,
    /// Identifier recorded in metadata
    pub model_id: Option<String>,
}

/// Text-generation collaborator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Whether model-assisted feedback should be attempted
    pub enabled: bool,
    pub model: String,
    /// Base URL of the generateContent API
    pub endpoint: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Language of the prompt and of rule-based feedback
    pub language: FeedbackLanguage,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "gemini-2.5-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            max_tokens: 1024,
            temperature: 0.7,
            timeout_secs: 30,
            language: FeedbackLanguage::En,
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from a JSON file; missing fields take defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| AnalysisError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with the process environment
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay environment values onto this configuration.
    ///
    /// | Env Var               | Field                      |
    /// |-----------------------|----------------------------|
    /// | `LENS_FPS`            | `fps_target`               |
    /// | `LENS_WORK_DIR`       | `work_dir`                 |
    /// | `LENS_WORKERS`        | `workers`                  |
    /// | `LENS_LANDMARK_CMD`   | `landmarks.program`        |
    /// | `WHISPER_LOCAL_MODEL` | `transcription.model`      |
    /// | `GEMINI_MODEL`        | `generation.model`         |
    /// | `LENS_FEEDBACK_LANG`  | `generation.language`      |
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(fps) = lookup("LENS_FPS") {
            self.fps_target = fps
                .trim()
                .parse()
                .map_err(|_| AnalysisError::Config(format!("LENS_FPS is not a number: {fps}")))?;
        }
        if let Some(dir) = lookup("LENS_WORK_DIR") {
            self.work_dir = PathBuf::from(dir);
        }
        if let Some(workers) = lookup("LENS_WORKERS") {
            let parsed = workers.trim().parse().map_err(|_| {
                AnalysisError::Config(format!("LENS_WORKERS is not an integer: {workers}"))
            })?;
            self.workers = Some(parsed);
        }
        if let Some(program) = lookup("LENS_LANDMARK_CMD") {
            self.landmarks.program = Some(program);
        }
        if let Some(model) = lookup("WHISPER_LOCAL_MODEL") {
            self.transcription.model = model;
        }
        if let Some(model) = lookup("GEMINI_MODEL") {
            self.generation.model = model;
        }
        if let Some(lang) = lookup("LENS_FEEDBACK_LANG") {
            self.generation.language = lang.parse().map_err(AnalysisError::Config)?;
        }
        self.validate()
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(self.fps_target.is_finite() && self.fps_target > 0.0) {
            return Err(AnalysisError::Config(format!(
                "fps_target must be positive, got {}",
                self.fps_target
            )));
        }
        if self.pitch_thresh_deg <= 0.0 {
            return Err(AnalysisError::Config(
                "pitch_thresh_deg must be positive".to_string(),
            ));
        }
        if self.workers == Some(0) {
            return Err(AnalysisError::Config("workers must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Generation credentials from the environment: `GEMINI_API_KEY1`..`3` in
/// order, then the legacy `GEMINI_API_KEY`, skipping duplicates.
pub fn credentials_from_env() -> Vec<Credential> {
    credentials_from(|key| std::env::var(key).ok())
}

/// Same as [`credentials_from_env`] with an injectable lookup
pub fn credentials_from<F>(lookup: F) -> Vec<Credential>
where
    F: Fn(&str) -> Option<String>,
{
    let mut keys: Vec<String> = Vec::new();
    for slot in 1..=CREDENTIAL_SLOTS {
        if let Some(key) = lookup(&format!("GEMINI_API_KEY{slot}")) {
            let key = key.trim().to_string();
            if !key.is_empty() && !keys.contains(&key) {
                keys.push(key);
            }
        }
    }
    if let Some(legacy) = lookup("GEMINI_API_KEY") {
        let legacy = legacy.trim().to_string();
        if !legacy.is_empty() && !keys.contains(&legacy) {
            keys.push(legacy);
        }
    }
    keys.into_iter().map(Credential::new).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = AnalysisConfig::default();
        assert_eq!(config.fps_target, 5.0);
        assert_eq!(config.pitch_thresh_deg, 8.0);
        assert_eq!(config.transcription.model, "base");
        assert!(config.smile_threshold.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config: AnalysisConfig =
            serde_json::from_str(r#"{"fps_target": 10.0, "generation": {"enabled": false}}"#)
                .unwrap();
        assert_eq!(config.fps_target, 10.0);
        assert!(!config.generation.enabled);
        assert_eq!(config.generation.model, "gemini-2.5-flash");
        assert_eq!(config.media.ffmpeg_path, "ffmpeg");
    }

    #[test]
    fn test_env_overlay() {
        let vars = env(&[
            ("LENS_FPS", "2.5"),
            ("WHISPER_LOCAL_MODEL", "small"),
            ("LENS_LANDMARK_CMD", "face-mesh"),
        ]);
        let mut config = AnalysisConfig::default();
        config.apply_env(|k| vars.get(k).cloned()).unwrap();

        assert_eq!(config.fps_target, 2.5);
        assert_eq!(config.transcription.model, "small");
        assert_eq!(config.landmarks.program.as_deref(), Some("face-mesh"));
    }

    #[test]
    fn test_feedback_language_from_json_and_env() {
        let config: AnalysisConfig =
            serde_json::from_str(r#"{"generation": {"language": "ko"}}"#).unwrap();
        assert_eq!(config.generation.language, FeedbackLanguage::Ko);
        assert_eq!(AnalysisConfig::default().generation.language, FeedbackLanguage::En);

        let vars = env(&[("LENS_FEEDBACK_LANG", "KO")]);
        let mut config = AnalysisConfig::default();
        config.apply_env(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.generation.language, FeedbackLanguage::Ko);

        let vars = env(&[("LENS_FEEDBACK_LANG", "fr")]);
        let mut config = AnalysisConfig::default();
        assert!(config.apply_env(|k| vars.get(k).cloned()).is_err());
    }

    #[test]
    fn test_env_rejects_bad_fps() {
        let vars = env(&[("LENS_FPS", "fast")]);
        let mut config = AnalysisConfig::default();
        assert!(config.apply_env(|k| vars.get(k).cloned()).is_err());

        let vars = env(&[("LENS_FPS", "0")]);
        let mut config = AnalysisConfig::default();
        assert!(config.apply_env(|k| vars.get(k).cloned()).is_err());
    }

    #[test]
    fn test_credentials_order_and_dedup() {
        let vars = env(&[
            ("GEMINI_API_KEY2", "key-b"),
            ("GEMINI_API_KEY1", "key-a"),
            ("GEMINI_API_KEY3", "key-a"),
            ("GEMINI_API_KEY", "key-legacy"),
        ]);
        let creds = credentials_from(|k| vars.get(k).cloned());
        let secrets: Vec<&str> = creds.iter().map(|c| c.secret()).collect();
        assert_eq!(secrets, vec!["key-a", "key-b", "key-legacy"]);
    }

    #[test]
    fn test_no_credentials() {
        let creds = credentials_from(|_| None);
        assert!(creds.is_empty());
    }
}
