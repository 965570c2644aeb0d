//! Speech metrics and the transcription collaborator
//!
//! Speech rate counts Latin-script words and individual Hangul syllable blocks,
//! since Korean has no reliable whitespace word unit for this purpose.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::TranscriptionConfig;
use crate::error::{AnalysisError, Result};
use crate::types::{Transcript, TranscriptSegment};

/// Default disfluency lexicon: Korean interjections then English markers
pub const DEFAULT_FILLERS: &[&str] = &[
    "음", "어", "그", "저", "아", "뭐", "막", "uh", "um", "erm", "like", "you know",
];

/// Floor for the duration in minutes
const MIN_MINUTES: f64 = 1e-6;

/// Words are non-Hangul word runs (inner apostrophes allowed) or single Hangul syllables
const WORD_PATTERN: &str = r"[\w--\p{Hangul}]+(?:'[\w--\p{Hangul}]+)*|[가-힣]";

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(WORD_PATTERN).expect("valid regex"));

/// Speech-side metrics for one recording
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeechMetrics {
    pub wpm: f64,
    pub filler_count: u32,
}

/// Count words: Latin-script runs plus individual Hangul syllable blocks
pub fn count_words(text: &str) -> usize {
    WORD_RE.find_iter(text).count()
}

/// Compute words per minute
///
/// Formula: `words / max(duration_sec / 60, 1e-6)`
pub fn compute_wpm(text: &str, duration_sec: f64) -> f64 {
    let minutes = (duration_sec / 60.0).max(MIN_MINUTES);
    count_words(text) as f64 / minutes
}

fn is_hangul(c: char) -> bool {
    matches!(c, '\u{AC00}'..='\u{D7A3}' | '\u{1100}'..='\u{11FF}' | '\u{3130}'..='\u{318F}')
}

enum FillerMatcher {
    /// Scripts without usable word boundaries
    Substring(String),
    WordBounded(Regex),
}

/// Compiled filler lexicon
pub struct FillerLexicon {
    terms: Vec<(String, FillerMatcher)>,
}

impl Default for FillerLexicon {
    fn default() -> Self {
        Self::compile(DEFAULT_FILLERS.iter().copied())
    }
}

impl FillerLexicon {
    /// Compile a lexicon. Hangul terms match as substrings, other terms only
    /// at word boundaries.
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::compile(terms)
    }

    fn compile<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let terms = terms
            .into_iter()
            .filter_map(|term| {
                let term = term.as_ref().trim().to_lowercase();
                if term.is_empty() {
                    return None;
                }
                let matcher = if term.chars().any(is_hangul) {
                    FillerMatcher::Substring(term.clone())
                } else {
                    // Escaped literals always compile
                    let pattern = format!(r"\b{}\b", regex::escape(&term));
                    FillerMatcher::WordBounded(Regex::new(&pattern).ok()?)
                };
                Some((term, matcher))
            })
            .collect();
        Self { terms }
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(|(t, _)| t.as_str())
    }

    /// Total filler occurrences in a transcript (case-insensitive)
    pub fn count(&self, text: &str) -> u32 {
        let lowered = text.to_lowercase();
        self.terms
            .iter()
            .map(|(_, matcher)| match matcher {
                FillerMatcher::Substring(term) => lowered.matches(term.as_str()).count(),
                FillerMatcher::WordBounded(re) => re.find_iter(&lowered).count(),
            })
            .sum::<usize>() as u32
    }
}

/// Computes [`SpeechMetrics`] from transcript text
#[derive(Default)]
pub struct SpeechMetricsExtractor {
    lexicon: FillerLexicon,
}

impl SpeechMetricsExtractor {
    pub fn new(lexicon: FillerLexicon) -> Self {
        Self { lexicon }
    }

    pub fn lexicon(&self) -> &FillerLexicon {
        &self.lexicon
    }

    pub fn compute(&self, text: &str, duration_sec: f64) -> SpeechMetrics {
        let metrics = SpeechMetrics {
            wpm: compute_wpm(text, duration_sec),
            filler_count: self.lexicon.count(text),
        };
        info!(
            wpm = metrics.wpm,
            filler_count = metrics.filler_count,
            duration_sec,
            "Speech metrics computed"
        );
        metrics
    }
}

/// Speech-to-text collaborator
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, audio: &Path, language: Option<&str>) -> Result<Transcript>;

    /// Identifier recorded in metadata
    fn model_id(&self) -> String;
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
}

#[derive(Debug, Deserialize)]
struct WhisperOutput {
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

impl From<WhisperOutput> for Transcript {
    fn from(output: WhisperOutput) -> Self {
        Transcript {
            text: output.text.trim().to_string(),
            language: output.language,
            segments: output
                .segments
                .into_iter()
                .map(|s| TranscriptSegment {
                    start: s.start,
                    end: s.end,
                    text: s.text.trim().to_string(),
                })
                .collect(),
        }
    }
}

/// Runs the `whisper` command-line tool and reads its JSON output
#[derive(Debug, Clone)]
pub struct WhisperCli {
    program: String,
    model: String,
    output_dir: Option<PathBuf>,
}

impl WhisperCli {
    pub fn new(program: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            model: model.into(),
            output_dir: None,
        }
    }

    pub fn from_config(config: &TranscriptionConfig) -> Self {
        Self::new(config.program.clone(), config.model.clone())
    }

    /// Directory for whisper's JSON output; the audio file's directory by default
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn read_output(path: &Path) -> std::result::Result<Transcript, String> {
        let raw = fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
        let output: WhisperOutput =
            serde_json::from_str(&raw).map_err(|e| format!("unreadable whisper output: {e}"))?;
        Ok(output.into())
    }
}

impl Transcriber for WhisperCli {
    fn transcribe(&self, audio: &Path, language: Option<&str>) -> Result<Transcript> {
        let error = |reason: String, tool_missing: bool| AnalysisError::Transcription {
            path: audio.to_path_buf(),
            reason,
            tool_missing,
        };

        let output_dir = self
            .output_dir
            .clone()
            .or_else(|| audio.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&output_dir)?;

        let mut command = Command::new(&self.program);
        command
            .arg(audio)
            .args(["--model", &self.model])
            .args(["--output_format", "json", "--verbose", "False"])
            .arg("--output_dir")
            .arg(&output_dir);
        if let Some(language) = language {
            command.args(["--language", language]);
        }

        debug!(program = %self.program, model = %self.model, "Running transcription");
        let output = command
            .output()
            .map_err(|e| error(format!("cannot run {}: {e}", self.program), true))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last = stderr.lines().last().unwrap_or("").trim().to_string();
            return Err(error(format!("exited with {}: {last}", output.status), false));
        }

        let stem = audio
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        let transcript =
            Self::read_output(&output_dir.join(format!("{stem}.json"))).map_err(|r| error(r, false))?;

        info!(
            chars = transcript.text.chars().count(),
            segments = transcript.segments.len(),
            "Transcription complete"
        );
        Ok(transcript)
    }

    fn model_id(&self) -> String {
        format!("whisper-{}", self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wpm_mixed_script() {
        assert_eq!(count_words("hello world 안녕"), 4);
        assert_eq!(compute_wpm("hello world 안녕", 60.0), 4.0);
    }

    #[test]
    fn test_wpm_apostrophes_and_punctuation() {
        assert_eq!(count_words("I don't know, really."), 4);
        assert_eq!(count_words("네, 맞습니다!"), 5);
    }

    #[test]
    fn test_wpm_zero_duration_is_clamped() {
        let wpm = compute_wpm("hello", 0.0);
        assert!(wpm.is_finite());
        assert_eq!(compute_wpm("", 0.0), 0.0);
    }

    #[test]
    fn test_filler_count_mixed() {
        let lexicon = FillerLexicon::new(["음", "um"]);
        assert_eq!(lexicon.count("음 안녕하세요 um 반갑습니다"), 2);

        let default = FillerLexicon::default();
        assert_eq!(default.count("음 안녕하세요 um 반갑습니다"), 2);
    }

    #[test]
    fn test_filler_word_boundaries_and_case() {
        let lexicon = FillerLexicon::new(["um", "like", "you know"]);
        // "umbrella" and "likely" are not fillers
        assert_eq!(lexicon.count("Um, the umbrella is likely here"), 1);
        assert_eq!(lexicon.count("It was, LIKE, you know, fine. You know?"), 3);
    }

    #[test]
    fn test_hangul_fillers_count_substrings() {
        let lexicon = FillerLexicon::new(["음"]);
        assert_eq!(lexicon.count("음음 그러니까"), 2);
    }

    #[test]
    fn test_blank_terms_dropped() {
        let lexicon = FillerLexicon::new(["", "  ", "um"]);
        assert_eq!(lexicon.terms().collect::<Vec<_>>(), vec!["um"]);
    }

    #[test]
    fn test_extractor_compute() {
        let metrics = SpeechMetricsExtractor::default().compute("hello world 안녕", 60.0);
        assert_eq!(metrics.wpm, 4.0);
        assert_eq!(metrics.filler_count, 0);
    }

    #[test]
    fn test_whisper_output_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio.json");
        fs::write(
            &path,
            r#"{"text": " 안녕하세요 ", "language": "ko",
                "segments": [{"id": 0, "start": 0.0, "end": 1.5, "text": " 안녕하세요", "tokens": []}]}"#,
        )
        .unwrap();

        let transcript = WhisperCli::read_output(&path).unwrap();
        assert_eq!(transcript.text, "안녕하세요");
        assert_eq!(transcript.language.as_deref(), Some("ko"));
        assert_eq!(transcript.segments.len(), 1);
        assert_eq!(transcript.segments[0].end, 1.5);
    }

    #[test]
    fn test_missing_whisper_is_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let cli = WhisperCli::new("definitely-not-whisper-xyz", "base");
        let err = cli
            .transcribe(&dir.path().join("audio.wav"), Some("ko"))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Transcription { .. }));
        assert!(err.is_retryable());
        assert_eq!(cli.model_id(), "whisper-base");
    }
}
