//! Feedback synthesis
//!
//! Two paths, never mixed within one report:
//! - model-assisted: prompt → generation service (credential failover) → parsed items
//! - rule-based: fixed-threshold templates, always available and deterministic
//!
//! A generation failure is logged and the rule-based path takes over.

use tracing::{info, warn};

use crate::config::GenerationConfig;
use crate::error::Result;
use crate::types::{
    FeedbackItem, FeedbackLanguage, FeedbackMode, FeedbackReport, FrameSample, MetricSet, Severity,
};

use super::generator::{CredentialPool, GeminiBackend, GenerationBackend, GenerationRequest};
use super::parser::parse_response;
use super::prompt::build_prompt;
use super::rules::{segment_items, video_items};

struct ModelAssist {
    backend: Box<dyn GenerationBackend>,
    credentials: CredentialPool,
    settings: GenerationConfig,
}

/// Produces a [`FeedbackReport`] from a metric set
pub struct FeedbackSynthesizer {
    assist: Option<ModelAssist>,
    language: FeedbackLanguage,
}

impl Default for FeedbackSynthesizer {
    fn default() -> Self {
        Self::rule_based()
    }
}

impl FeedbackSynthesizer {
    /// Rule-based only
    pub fn rule_based() -> Self {
        Self {
            assist: None,
            language: FeedbackLanguage::default(),
        }
    }

    /// Render prompt and rule text in `language`
    pub fn with_language(mut self, language: FeedbackLanguage) -> Self {
        self.language = language;
        self
    }

    pub fn language(&self) -> FeedbackLanguage {
        self.language
    }

    /// Prefer the generation backend, falling back to rules on failure
    pub fn model_assisted(
        backend: Box<dyn GenerationBackend>,
        credentials: CredentialPool,
        config: &GenerationConfig,
    ) -> Self {
        Self {
            assist: Some(ModelAssist {
                backend,
                credentials,
                settings: config.clone(),
            }),
            language: config.language,
        }
    }

    /// Model-assisted with [`GeminiBackend`] when generation is enabled and at
    /// least one credential exists, rule-based otherwise.
    pub fn from_config(config: &GenerationConfig, credentials: CredentialPool) -> Result<Self> {
        if !config.enabled {
            info!("Generation disabled, using rule-based feedback");
            return Ok(Self::rule_based().with_language(config.language));
        }
        if credentials.is_empty() {
            info!("No generation credentials configured, using rule-based feedback");
            return Ok(Self::rule_based().with_language(config.language));
        }
        let backend = GeminiBackend::from_config(config)?;
        Ok(Self::model_assisted(Box::new(backend), credentials, config))
    }

    pub fn is_model_assisted(&self) -> bool {
        self.assist.is_some()
    }

    /// Synthesize feedback. Segment items are added on the rule-based path
    /// when a timeline is supplied.
    pub fn synthesize(
        &self,
        metrics: &MetricSet,
        transcript: Option<&str>,
        timeline: Option<&[FrameSample]>,
    ) -> FeedbackReport {
        if let Some(assist) = &self.assist {
            match Self::model_items(assist, metrics, transcript, self.language) {
                Ok(items) if !items.is_empty() => {
                    info!(items = items.len(), "Model-assisted feedback generated");
                    return FeedbackReport {
                        mode: FeedbackMode::ModelAssisted,
                        items,
                    };
                }
                Ok(_) => warn!("Generation returned no usable text, falling back to rules"),
                Err(e) => warn!(error = %e, "Generation failed, falling back to rules"),
            }
        }
        Self::rule_based_report(metrics, timeline, self.language)
    }

    /// Deterministic report from fixed thresholds
    pub fn rule_based_report(
        metrics: &MetricSet,
        timeline: Option<&[FrameSample]>,
        language: FeedbackLanguage,
    ) -> FeedbackReport {
        let mut items = video_items(metrics, language);
        if let Some(timeline) = timeline {
            items.extend(segment_items(timeline, language));
        }
        info!(
            items = items.len(),
            language = language.as_str(),
            "Rule-based feedback generated"
        );
        FeedbackReport {
            mode: FeedbackMode::RuleBased,
            items,
        }
    }

    fn model_items(
        assist: &ModelAssist,
        metrics: &MetricSet,
        transcript: Option<&str>,
        language: FeedbackLanguage,
    ) -> Result<Vec<FeedbackItem>> {
        let request = GenerationRequest::from_config(
            build_prompt(metrics, transcript, language),
            &assist.settings,
        );
        let text = assist
            .credentials
            .generate(assist.backend.as_ref(), &request)?;

        Ok(parse_response(&text)
            .into_iter()
            .enumerate()
            .map(|(i, message)| {
                FeedbackItem::video(format!("Coaching note {}", i + 1), message, Severity::Suggestion)
            })
            .collect())
    }
}
