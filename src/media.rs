//! Media decomposition
//!
//! Samples frames from a recording at a target rate and extracts a mono 16 kHz
//! audio track, both through the external ffmpeg/ffprobe tools.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::MediaConfig;
use crate::error::{AnalysisError, Result};

/// Audio sample rate handed to the transcription collaborator
pub const AUDIO_SAMPLE_RATE: u32 = 16_000;

/// Container and primary video stream properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub duration_sec: f64,
    pub width: u32,
    pub height: u32,
    /// Source frame rate (Hz)
    pub framerate: f64,
    pub codec: String,
    /// Frame count reported by the container, when present
    pub frame_count: Option<u64>,
}

impl VideoInfo {
    /// Frame count from the container, or estimated from duration
    pub fn estimated_frame_count(&self) -> u64 {
        self.frame_count.unwrap_or_else(|| {
            let estimate = self.duration_sec * self.framerate;
            if estimate.is_finite() && estimate > 0.0 {
                estimate.round() as u64
            } else {
                0
            }
        })
    }
}

/// A decoded frame on disk
#[derive(Debug, Clone, PartialEq)]
pub struct FrameImage {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// A frame selected by the sampling plan
#[derive(Debug, Clone, PartialEq)]
pub struct SampledFrame {
    /// Index of the frame in the source stream
    pub index: u64,
    /// `index / source_fps`
    pub timestamp: f64,
    pub image: FrameImage,
}

/// Frame stride for a target sampling rate
///
/// Formula: `max(round(source_fps / fps_target), 1)`
pub fn sampling_step(source_fps: f64, fps_target: f64) -> u64 {
    if fps_target <= 0.0 || !source_fps.is_finite() {
        return 1;
    }
    let step = (source_fps / fps_target).round();
    if step.is_finite() && step >= 1.0 {
        step as u64
    } else {
        1
    }
}

/// `(frame_index, timestamp_sec)` for every sampled frame of a stream
pub fn sampling_plan(source_fps: f64, fps_target: f64, frame_count: u64) -> Vec<(u64, f64)> {
    let step = sampling_step(source_fps, fps_target);
    (0..frame_count)
        .step_by(step as usize)
        .map(|index| (index, index as f64 / source_fps))
        .collect()
}

/// Parse an ffprobe rate such as `30000/1001` or `25`
fn parse_framerate(rate: &str) -> f64 {
    if let Some((num, den)) = rate.split_once('/') {
        let num: f64 = num.trim().parse().unwrap_or(0.0);
        let den: f64 = den.trim().parse().unwrap_or(0.0);
        if den != 0.0 {
            return num / den;
        }
        return 0.0;
    }
    rate.trim().parse().unwrap_or(0.0)
}

/// Parse ffprobe's JSON report into [`VideoInfo`]
fn parse_probe_output(stdout: &[u8]) -> std::result::Result<VideoInfo, String> {
    let json: serde_json::Value =
        serde_json::from_slice(stdout).map_err(|e| format!("unreadable ffprobe output: {e}"))?;

    let stream = json["streams"]
        .as_array()
        .and_then(|s| s.first())
        .ok_or_else(|| "no video stream found".to_string())?;

    let width = stream["width"].as_u64().unwrap_or(0) as u32;
    let height = stream["height"].as_u64().unwrap_or(0) as u32;
    let codec = stream["codec_name"]
        .as_str()
        .unwrap_or("unknown")
        .to_string();

    let mut framerate = stream["r_frame_rate"]
        .as_str()
        .map(parse_framerate)
        .unwrap_or(0.0);
    if framerate <= 0.0 {
        framerate = stream["avg_frame_rate"]
            .as_str()
            .map(parse_framerate)
            .unwrap_or(0.0);
    }

    let duration_sec = json["format"]["duration"]
        .as_str()
        .or_else(|| stream["duration"].as_str())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let frame_count = stream["nb_frames"]
        .as_str()
        .and_then(|n| n.parse::<u64>().ok())
        .filter(|n| *n > 0);

    Ok(VideoInfo {
        duration_sec,
        width,
        height,
        framerate,
        codec,
        frame_count,
    })
}

/// Duration of a PCM WAV file from its RIFF header (data size / byte rate)
pub fn wav_duration(path: &Path) -> Result<f64> {
    let bytes = fs::read(path)?;
    let malformed = |reason: &str| AnalysisError::AudioExtraction {
        path: path.to_path_buf(),
        reason: reason.to_string(),
        tool_missing: false,
    };

    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(malformed("not a RIFF/WAVE file"));
    }

    let mut byte_rate: Option<u32> = None;
    let mut offset = 12;
    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = u32::from_le_bytes([
            bytes[offset + 4],
            bytes[offset + 5],
            bytes[offset + 6],
            bytes[offset + 7],
        ]) as usize;
        let body = offset + 8;

        if id == b"fmt " {
            if size < 12 || body + 12 > bytes.len() {
                return Err(malformed("truncated fmt chunk"));
            }
            byte_rate = Some(u32::from_le_bytes([
                bytes[body + 8],
                bytes[body + 9],
                bytes[body + 10],
                bytes[body + 11],
            ]));
        } else if id == b"data" {
            let rate = byte_rate.ok_or_else(|| malformed("data chunk before fmt chunk"))?;
            if rate == 0 {
                return Err(malformed("zero byte rate"));
            }
            // ffmpeg writes a placeholder size when the output is not seekable
            let available = bytes.len().saturating_sub(body);
            let data_size = size.min(available);
            return Ok(data_size as f64 / rate as f64);
        }

        // Chunks are padded to even sizes
        offset = body + size + (size & 1);
    }

    Err(malformed("no data chunk"))
}

/// ffmpeg/ffprobe wrapper
pub struct MediaDecomposer {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl Default for MediaDecomposer {
    fn default() -> Self {
        Self::new(&MediaConfig::default())
    }
}

impl MediaDecomposer {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            ffprobe_path: config.ffprobe_path.clone(),
        }
    }

    /// Read container and video stream properties
    pub fn probe(&self, video: &Path) -> Result<VideoInfo> {
        let media_error = |reason: String, tool_missing: bool| AnalysisError::MediaRead {
            path: video.to_path_buf(),
            reason,
            tool_missing,
        };

        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                "-select_streams",
                "v:0",
            ])
            .arg(video)
            .output()
            .map_err(|e| media_error(format!("cannot run {}: {e}", self.ffprobe_path), true))?;

        if !output.status.success() {
            return Err(media_error(
                format!("ffprobe exited with {}", output.status),
                false,
            ));
        }

        let info = parse_probe_output(&output.stdout).map_err(|reason| media_error(reason, false))?;
        if info.framerate <= 0.0 {
            return Err(media_error(
                format!("non-positive frame rate {}", info.framerate),
                false,
            ));
        }

        info!(
            video = %video.display(),
            duration_sec = info.duration_sec,
            framerate = info.framerate,
            width = info.width,
            height = info.height,
            "Probed video"
        );
        Ok(info)
    }

    /// Decode every `sampling_step`-th frame into `out_dir` as numbered JPEGs
    pub fn extract_frames(
        &self,
        video: &Path,
        info: &VideoInfo,
        out_dir: &Path,
        fps_target: f64,
    ) -> Result<Vec<SampledFrame>> {
        let step = sampling_step(info.framerate, fps_target);
        fs::create_dir_all(out_dir)?;
        clear_frames(out_dir)?;

        let filter = format!("select=not(mod(n\\,{step}))");
        let pattern = out_dir.join("%06d.jpg");
        let output = Command::new(&self.ffmpeg_path)
            .args(["-v", "error", "-y", "-i"])
            .arg(video)
            .args(["-vf", &filter, "-vsync", "vfr", "-q:v", "2"])
            .arg(&pattern)
            .output()
            .map_err(|e| AnalysisError::MediaRead {
                path: video.to_path_buf(),
                reason: format!("cannot run {}: {e}", self.ffmpeg_path),
                tool_missing: true,
            })?;
        check_exit(&output).map_err(|reason| AnalysisError::MediaRead {
            path: video.to_path_buf(),
            reason,
            tool_missing: false,
        })?;

        let mut files: Vec<PathBuf> = fs::read_dir(out_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "jpg"))
            .collect();
        files.sort();

        let frames: Vec<SampledFrame> = files
            .into_iter()
            .enumerate()
            .map(|(k, path)| {
                let index = k as u64 * step;
                SampledFrame {
                    index,
                    timestamp: index as f64 / info.framerate,
                    image: FrameImage {
                        path,
                        width: info.width,
                        height: info.height,
                    },
                }
            })
            .collect();

        info!(
            step,
            sampled = frames.len(),
            fps_target,
            "Extracted frames"
        );
        Ok(frames)
    }

    /// Extract a mono 16 kHz PCM WAV track
    pub fn extract_audio(&self, video: &Path, out_wav: &Path) -> Result<()> {
        if let Some(parent) = out_wav.parent() {
            fs::create_dir_all(parent)?;
        }
        let sample_rate = AUDIO_SAMPLE_RATE.to_string();
        let output = Command::new(&self.ffmpeg_path)
            .args(["-v", "error", "-y", "-i"])
            .arg(video)
            .args(["-vn", "-ac", "1", "-ar", &sample_rate, "-acodec", "pcm_s16le"])
            .arg(out_wav)
            .output()
            .map_err(|e| AnalysisError::AudioExtraction {
                path: video.to_path_buf(),
                reason: format!("cannot run {}: {e}", self.ffmpeg_path),
                tool_missing: true,
            })?;
        check_exit(&output).map_err(|reason| AnalysisError::AudioExtraction {
            path: video.to_path_buf(),
            reason,
            tool_missing: false,
        })?;

        debug!(wav = %out_wav.display(), "Extracted audio");
        Ok(())
    }

    /// Whether both tools can be started
    pub fn tools_available(&self) -> (bool, bool) {
        (
            tool_responds(&self.ffmpeg_path),
            tool_responds(&self.ffprobe_path),
        )
    }
}

fn check_exit(output: &Output) -> std::result::Result<(), String> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let last_line = stderr.lines().last().unwrap_or("").trim();
    Err(format!("exited with {}: {last_line}", output.status))
}

fn clear_frames(dir: &Path) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "jpg") {
            fs::remove_file(path)?;
        }
    }
    Ok(())
}

fn tool_responds(program: &str) -> bool {
    Command::new(program)
        .arg("-version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_sampling_step() {
        assert_eq!(sampling_step(30.0, 5.0), 6);
        assert_eq!(sampling_step(29.97, 5.0), 6);
        assert_eq!(sampling_step(24.0, 5.0), 5);
        // Target above source rate keeps every frame
        assert_eq!(sampling_step(10.0, 30.0), 1);
        assert_eq!(sampling_step(30.0, 0.0), 1);
    }

    #[test]
    fn test_sampling_plan_timestamps() {
        let plan = sampling_plan(30.0, 5.0, 20);
        assert_eq!(plan.len(), 4);
        assert_eq!(plan[0], (0, 0.0));
        assert_eq!(plan[1].0, 6);
        assert!((plan[1].1 - 0.2).abs() < 1e-12);
        assert_eq!(plan[3].0, 18);
        assert!((plan[3].1 - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_parse_framerate() {
        assert!((parse_framerate("30000/1001") - 29.97).abs() < 0.01);
        assert_eq!(parse_framerate("25"), 25.0);
        assert_eq!(parse_framerate("0/0"), 0.0);
        assert_eq!(parse_framerate("garbage"), 0.0);
    }

    #[test]
    fn test_parse_probe_output() {
        let json = br#"{
            "streams": [{
                "codec_name": "h264",
                "width": 1280,
                "height": 720,
                "r_frame_rate": "30/1",
                "avg_frame_rate": "30/1",
                "nb_frames": "300"
            }],
            "format": {"duration": "10.000000"}
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.width, 1280);
        assert_eq!(info.height, 720);
        assert_eq!(info.framerate, 30.0);
        assert_eq!(info.frame_count, Some(300));
        assert_eq!(info.estimated_frame_count(), 300);
        assert_eq!(info.codec, "h264");
    }

    #[test]
    fn test_probe_without_stream_fails() {
        let err = parse_probe_output(br#"{"streams": [], "format": {}}"#).unwrap_err();
        assert!(err.contains("no video stream"));
    }

    #[test]
    fn test_probe_missing_tool_is_media_error() {
        let decomposer = MediaDecomposer::new(&MediaConfig {
            ffmpeg_path: "definitely-not-ffmpeg-xyz".to_string(),
            ffprobe_path: "definitely-not-ffprobe-xyz".to_string(),
        });
        let err = decomposer.probe(Path::new("missing.mp4")).unwrap_err();
        match err {
            AnalysisError::MediaRead { tool_missing, .. } => assert!(tool_missing),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    fn write_wav(path: &Path, samples: u32) {
        let byte_rate = AUDIO_SAMPLE_RATE * 2;
        let data_size = samples * 2;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_size).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
        bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
        bytes.extend_from_slice(&AUDIO_SAMPLE_RATE.to_le_bytes());
        bytes.extend_from_slice(&byte_rate.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_size.to_le_bytes());
        bytes.extend(std::iter::repeat(0u8).take(data_size as usize));

        let mut file = fs::File::create(path).unwrap();
        file.write_all(&bytes).unwrap();
    }

    #[test]
    fn test_wav_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio.wav");
        write_wav(&path, 32_000);

        let duration = wav_duration(&path).unwrap();
        assert!((duration - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_wav_duration_rejects_non_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio.wav");
        fs::write(&path, b"not audio at all").unwrap();

        assert!(matches!(
            wav_duration(&path),
            Err(AnalysisError::AudioExtraction { .. })
        ));
    }
}
