//! Lens CLI - Command-line interface for Answer Lens
//!
//! Commands:
//! - analyze: Run the full pipeline on a recorded answer
//! - metrics: Re-aggregate a saved timeline
//! - feedback: Synthesize feedback for a metric set
//! - doctor: Diagnose tool availability and configuration

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use answer_lens::config::credentials_from_env;
use answer_lens::encoder::{AnalysisReport, ReportEncoder};
use answer_lens::feedback::{CredentialPool, FeedbackSynthesizer};
use answer_lens::media::MediaDecomposer;
use answer_lens::pipeline::metrics_from_timeline;
use answer_lens::vision::load_timeline;
use answer_lens::{
    AggregatorSettings, AnalysisConfig, AnalysisError, InterviewAnalyzer, MetricSet, Stage,
    LENS_VERSION, PRODUCER_NAME,
};

/// Lens - Nonverbal and speech analysis for recorded interview answers
#[derive(Parser)]
#[command(name = "lens")]
#[command(version = LENS_VERSION)]
#[command(about = "Analyze recorded interview answers", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline on a video file
    Analyze {
        /// Video file to analyze
        #[arg(short, long)]
        video: PathBuf,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory for frames, audio and the timeline artifact
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Frame sampling rate (Hz)
        #[arg(long)]
        fps: Option<f64>,

        /// Skip the generation service
        #[arg(long)]
        rule_based: bool,

        /// Output file path (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compute metrics from a saved timeline
    Metrics {
        /// Timeline JSON written by `analyze`
        #[arg(short, long)]
        timeline: PathBuf,

        /// Recording duration in seconds
        #[arg(short, long)]
        duration: f64,

        /// Plain-text transcript file
        #[arg(long)]
        transcript: Option<PathBuf>,

        /// Fixed smile threshold (adaptive when omitted)
        #[arg(long)]
        smile_threshold: Option<f64>,
    },

    /// Synthesize feedback for a metric set
    Feedback {
        /// Metric set or analysis report JSON
        #[arg(short, long)]
        metrics: PathBuf,

        /// Plain-text transcript file
        #[arg(long)]
        transcript: Option<PathBuf>,

        /// Skip the generation service
        #[arg(long)]
        rule_based: bool,
    },

    /// Diagnose tool availability and configuration
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "answer_lens=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(io::stderr)).init();
    }
}

fn run(cli: Cli) -> Result<(), LensCliError> {
    match cli.command {
        Commands::Analyze {
            video,
            config,
            work_dir,
            fps,
            rule_based,
            output,
        } => cmd_analyze(
            &video,
            config.as_deref(),
            work_dir,
            fps,
            rule_based,
            output.as_deref(),
        ),

        Commands::Metrics {
            timeline,
            duration,
            transcript,
            smile_threshold,
        } => cmd_metrics(&timeline, duration, transcript.as_deref(), smile_threshold),

        Commands::Feedback {
            metrics,
            transcript,
            rule_based,
        } => cmd_feedback(&metrics, transcript.as_deref(), rule_based),

        Commands::Doctor { json } => cmd_doctor(json),
    }
}

/// File configuration when given, then the environment on top
fn load_config(path: Option<&Path>) -> Result<AnalysisConfig, LensCliError> {
    let config = match path {
        Some(path) => {
            let mut config = AnalysisConfig::from_json_file(path)?;
            config.apply_env(|key| std::env::var(key).ok())?;
            config
        }
        None => AnalysisConfig::from_env()?,
    };
    Ok(config)
}

fn cmd_analyze(
    video: &Path,
    config_path: Option<&Path>,
    work_dir: Option<PathBuf>,
    fps: Option<f64>,
    rule_based: bool,
    output: Option<&Path>,
) -> Result<(), LensCliError> {
    let mut config = load_config(config_path)?;
    if let Some(work_dir) = work_dir {
        config.work_dir = work_dir;
    }
    if let Some(fps) = fps {
        config.fps_target = fps;
    }
    config.validate()?;

    let mut analyzer = InterviewAnalyzer::from_config(config)?;
    if rule_based {
        analyzer = analyzer.with_rule_based_feedback();
    }

    match analyzer.analyze(video) {
        Ok(outcome) => {
            let report = ReportEncoder::new().encode(
                &video.display().to_string(),
                outcome.duration_sec,
                &outcome.metrics,
                Some(&outcome.feedback),
            );
            write_json(&report, output)
        }
        Err(AnalysisError::SpeechUnavailable { partial, source }) => {
            // Vision metrics are still worth keeping
            write_json(&partial, output)?;
            Err(LensCliError::Analysis(AnalysisError::SpeechUnavailable { partial, source }))
        }
        Err(e) => Err(e.into()),
    }
}

fn cmd_metrics(
    timeline_path: &Path,
    duration: f64,
    transcript: Option<&Path>,
    smile_threshold: Option<f64>,
) -> Result<(), LensCliError> {
    let config = AnalysisConfig::from_env()?;
    let timeline = load_timeline(timeline_path)?;
    if timeline.is_empty() {
        return Err(LensCliError::EmptyTimeline);
    }
    let text = read_transcript(transcript)?;

    let settings = AggregatorSettings {
        fps_target: config.fps_target,
        smile_threshold: smile_threshold.or(config.smile_threshold),
        pitch_thresh_deg: config.pitch_thresh_deg,
        gaze_yaw_thresh_deg: config.gaze_yaw_thresh_deg,
    };
    let metrics = metrics_from_timeline(&timeline, duration, &text, settings);
    write_json(&metrics, None)
}

fn cmd_feedback(
    metrics_path: &Path,
    transcript: Option<&Path>,
    rule_based: bool,
) -> Result<(), LensCliError> {
    let metrics = read_metrics(metrics_path)?;
    let text = read_transcript(transcript)?;

    let config = AnalysisConfig::from_env()?;
    let synthesizer = if rule_based {
        FeedbackSynthesizer::rule_based().with_language(config.generation.language)
    } else {
        FeedbackSynthesizer::from_config(&config.generation, CredentialPool::from_env())?
    };

    let transcript = (!text.trim().is_empty()).then_some(text.as_str());
    let report = synthesizer.synthesize(&metrics, transcript, None);
    write_json(&report, None)
}

/// Accepts a bare metric set or a full analysis report
fn read_metrics(path: &Path) -> Result<MetricSet, LensCliError> {
    let raw = fs::read_to_string(path)?;
    if let Ok(metrics) = serde_json::from_str::<MetricSet>(&raw) {
        return Ok(metrics);
    }
    serde_json::from_str::<AnalysisReport>(&raw)
        .map(|report| report.metrics)
        .map_err(|e| LensCliError::InvalidMetrics(e.to_string()))
}

fn read_transcript(path: Option<&Path>) -> Result<String, LensCliError> {
    match path {
        Some(path) => Ok(fs::read_to_string(path)?),
        None => Ok(String::new()),
    }
}

/// Pretty JSON for files and terminals, compact JSON for pipes
fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<(), LensCliError> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            fs::write(path, serde_json::to_string_pretty(value)?)?;
        }
        None if atty::is(atty::Stream::Stdout) => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        None => println!("{}", serde_json::to_string(value)?),
    }
    Ok(())
}

/// Whether a program can be started at all
fn program_starts(program: &str) -> bool {
    Command::new(program).arg("--help").output().is_ok()
}

fn cmd_doctor(json: bool) -> Result<(), LensCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "lens_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Answer Lens version {}", LENS_VERSION),
    });

    let config = match AnalysisConfig::from_env() {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "fps {} Hz, work dir {}",
                    config.fps_target,
                    config.work_dir.display()
                ),
            });
            config
        }
        Err(e) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            });
            AnalysisConfig::default()
        }
    };

    // Decode tools are required for `analyze`
    let (ffmpeg, ffprobe) = MediaDecomposer::new(&config.media).tools_available();
    for (name, program, found) in [
        ("ffmpeg", &config.media.ffmpeg_path, ffmpeg),
        ("ffprobe", &config.media.ffprobe_path, ffprobe),
    ] {
        checks.push(DoctorCheck {
            name: name.to_string(),
            status: if found { CheckStatus::Ok } else { CheckStatus::Error },
            message: if found {
                format!("{program} is available")
            } else {
                format!("{program} cannot be started")
            },
        });
    }

    let whisper = &config.transcription.program;
    checks.push(if program_starts(whisper) {
        DoctorCheck {
            name: "transcription".to_string(),
            status: CheckStatus::Ok,
            message: format!("{whisper} is available (model {})", config.transcription.model),
        }
    } else {
        DoctorCheck {
            name: "transcription".to_string(),
            status: CheckStatus::Error,
            message: format!("{whisper} cannot be started"),
        }
    });

    checks.push(match &config.landmarks.program {
        Some(program) if program_starts(program) => DoctorCheck {
            name: "landmarks".to_string(),
            status: CheckStatus::Ok,
            message: format!(
                "{program} is available (blendshapes: {})",
                config.landmarks.blendshapes
            ),
        },
        Some(program) => DoctorCheck {
            name: "landmarks".to_string(),
            status: CheckStatus::Error,
            message: format!("{program} cannot be started"),
        },
        None => DoctorCheck {
            name: "landmarks".to_string(),
            status: CheckStatus::Error,
            message: "No landmark detector configured (LENS_LANDMARK_CMD)".to_string(),
        },
    });

    let credentials = credentials_from_env().len();
    checks.push(if !config.generation.enabled {
        DoctorCheck {
            name: "generation".to_string(),
            status: CheckStatus::Ok,
            message: "Generation disabled; rule-based feedback only".to_string(),
        }
    } else if credentials == 0 {
        DoctorCheck {
            name: "generation".to_string(),
            status: CheckStatus::Warning,
            message: "No GEMINI_API_KEY credentials; rule-based feedback only".to_string(),
        }
    } else {
        DoctorCheck {
            name: "generation".to_string(),
            status: CheckStatus::Ok,
            message: format!("{credentials} credential(s) for {}", config.generation.model),
        }
    });

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: LENS_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Lens Doctor Report");
        println!("==================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(LensCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum LensCliError {
    Analysis(AnalysisError),
    Io(io::Error),
    Json(serde_json::Error),
    InvalidMetrics(String),
    EmptyTimeline,
    DoctorFailed,
}

impl From<AnalysisError> for LensCliError {
    fn from(e: AnalysisError) -> Self {
        LensCliError::Analysis(e)
    }
}

impl From<io::Error> for LensCliError {
    fn from(e: io::Error) -> Self {
        LensCliError::Io(e)
    }
}

impl From<serde_json::Error> for LensCliError {
    fn from(e: serde_json::Error) -> Self {
        LensCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
    retryable: bool,
}

impl From<AnalysisError> for CliError {
    fn from(e: AnalysisError) -> Self {
        let retryable = e.is_retryable();
        let (code, hint) = match e.stage() {
            Stage::Media => ("MEDIA_ERROR", "Check the video path and that ffprobe/ffmpeg are installed"),
            Stage::Audio => ("AUDIO_ERROR", "Check that the video has an audio track"),
            Stage::Vision => ("VISION_ERROR", "Check the landmark detector configuration"),
            Stage::Speech => ("SPEECH_ERROR", "Check the whisper installation; vision metrics were written"),
            Stage::Feedback => ("FEEDBACK_ERROR", "Check GEMINI_API_KEY credentials or use --rule-based"),
            Stage::Config => ("CONFIG_ERROR", "Run 'lens doctor' to inspect the configuration"),
            Stage::Io => ("IO_ERROR", "Check file paths and permissions"),
        };
        CliError {
            code: code.to_string(),
            message: e.to_string(),
            hint: Some(hint.to_string()),
            retryable,
        }
    }
}

impl From<LensCliError> for CliError {
    fn from(e: LensCliError) -> Self {
        match e {
            LensCliError::Analysis(e) => CliError::from(e),
            LensCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
                retryable: true,
            },
            LensCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
                retryable: false,
            },
            LensCliError::InvalidMetrics(msg) => CliError {
                code: "INVALID_METRICS".to_string(),
                message: msg,
                hint: Some("Pass a metric set from 'lens metrics' or a report from 'lens analyze'".to_string()),
                retryable: false,
            },
            LensCliError::EmptyTimeline => CliError {
                code: "EMPTY_TIMELINE".to_string(),
                message: "Timeline contains no frames".to_string(),
                hint: Some("Re-run 'lens analyze' to regenerate the timeline".to_string()),
                retryable: false,
            },
            LensCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
                retryable: false,
            },
        }
    }
}

// Report types

#[derive(Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
