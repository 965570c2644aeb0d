//! Text-generation collaborator
//!
//! [`CredentialPool`] walks the configured credentials in order and returns the
//! first successful completion. Every failed attempt is captured so the caller
//! can tell a rejected key from an unreachable service.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{credentials_from_env, GenerationConfig};
use crate::error::{AnalysisError, CredentialAttempt, Result};

/// An API credential. The secret never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tail: String = self
            .0
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        write!(f, "Credential(***{tail})")
    }
}

/// One generation call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl GenerationRequest {
    pub fn from_config(prompt: String, config: &GenerationConfig) -> Self {
        Self {
            prompt,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

/// Failure of a single generation attempt
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Connection, DNS or timeout failure
    #[error("request failed: {0}")]
    Transport(String),

    #[error("service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unusable response: {0}")]
    Response(String),
}

impl GenerationError {
    /// Service unreachable or overloaded, as opposed to a rejected request
    pub fn is_transport(&self) -> bool {
        match self {
            GenerationError::Transport(_) => true,
            GenerationError::Status { status, .. } => *status == 429 || *status >= 500,
            GenerationError::Response(_) => false,
        }
    }
}

/// Generation collaborator contract
pub trait GenerationBackend: Send + Sync {
    fn generate(
        &self,
        credential: &Credential,
        request: &GenerationRequest,
    ) -> std::result::Result<String, GenerationError>;

    /// Identifier recorded in logs
    fn model_id(&self) -> &str;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationParams,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationParams {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate
    fn into_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        let text = text.trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}

/// Gemini `generateContent` over blocking HTTP
pub struct GeminiBackend {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
}

impl GeminiBackend {
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AnalysisError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

impl GenerationBackend for GeminiBackend {
    fn generate(
        &self,
        credential: &Credential,
        request: &GenerationRequest,
    ) -> std::result::Result<String, GenerationError> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart {
                    text: &request.prompt,
                }],
            }],
            generation_config: GenerationParams {
                max_output_tokens: request.max_tokens,
                temperature: request.temperature,
            },
        };

        debug!(model = %self.model, prompt_chars = request.prompt.len(), "Calling generation service");
        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", credential.secret())
            .json(&body)
            .send()
            .map_err(|e| GenerationError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let parsed: GenerateContentResponse = response
            .json()
            .map_err(|e| GenerationError::Response(e.without_url().to_string()))?;
        parsed
            .into_text()
            .ok_or_else(|| GenerationError::Response("no text in first candidate".to_string()))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Ordered list of credentials tried one after another
#[derive(Debug, Clone, Default)]
pub struct CredentialPool {
    credentials: Vec<Credential>,
}

impl CredentialPool {
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self { credentials }
    }

    /// `GEMINI_API_KEY1..3` then `GEMINI_API_KEY`
    pub fn from_env() -> Self {
        Self::new(credentials_from_env())
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Try each credential in order until one succeeds.
    ///
    /// Returns `GenerationService` with every captured attempt when all fail,
    /// or with no attempts when the pool is empty.
    pub fn generate(
        &self,
        backend: &dyn GenerationBackend,
        request: &GenerationRequest,
    ) -> Result<String> {
        let mut attempts = Vec::with_capacity(self.credentials.len());

        for (index, credential) in self.credentials.iter().enumerate() {
            match backend.generate(credential, request) {
                Ok(text) => {
                    info!(
                        model = backend.model_id(),
                        credential = index,
                        failed_before = attempts.len(),
                        "Generation succeeded"
                    );
                    return Ok(text);
                }
                Err(e) => {
                    warn!(
                        model = backend.model_id(),
                        credential = index,
                        error = %e,
                        "Generation attempt failed, trying next credential"
                    );
                    attempts.push(CredentialAttempt {
                        index,
                        error: e.to_string(),
                        transport: e.is_transport(),
                    });
                }
            }
        }

        Err(AnalysisError::GenerationService { attempts })
    }
}
