//! Generative provider collaborator and its HTTP implementation.
//!
//! The wire contract is the request/response pair below. Prompt wording is
//! the provider endpoint's business; this crate only sends the utterance and
//! a bounded catalog summary.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::learning::pattern::PatternKind;
use crate::types::{ScenarioId, TenantId};

/// One catalog entry as shown to the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSummary {
    pub id: ScenarioId,
    pub triggers: Vec<String>,
    pub reply: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub tenant_id: TenantId,
    pub utterance: String,
    pub scenario_catalog_summary: Vec<ScenarioSummary>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A reusable pattern proposed by the provider, not yet validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPattern {
    pub kind: PatternKind,
    pub payload: serde_json::Value,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    #[serde(default)]
    pub matched_scenario_id: Option<ScenarioId>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reply: Option<String>,
    #[serde(default)]
    pub extracted_patterns: Vec<ExtractedPattern>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

/// Machine-readable provider failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// Non-2xx HTTP status.
    Status,
    /// No answer within the tier-3 timeout.
    Timeout,
    /// Connection or I/O failure.
    Transport,
    /// Answer was not a valid response body.
    Decode,
    /// Skipped because the provider's circuit is open.
    CircuitOpen,
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status => write!(f, "status"),
            Self::Timeout => write!(f, "timeout"),
            Self::Transport => write!(f, "transport"),
            Self::Decode => write!(f, "decode"),
            Self::CircuitOpen => write!(f, "circuit_open"),
        }
    }
}

/// Error type for provider calls
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("provider transport error: {0}")]
    Transport(String),

    #[error("provider response could not be decoded: {0}")]
    Decode(String),

    #[error("provider {0} circuit is open")]
    CircuitOpen(String),
}

impl ProviderError {
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            Self::Status { .. } => ProviderErrorKind::Status,
            Self::Timeout { .. } => ProviderErrorKind::Timeout,
            Self::Transport(_) => ProviderErrorKind::Transport,
            Self::Decode(_) => ProviderErrorKind::Decode,
            Self::CircuitOpen(_) => ProviderErrorKind::CircuitOpen,
        }
    }
}

/// Result type for provider calls
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Paid generative fallback.
#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    /// Name used for circuit breaking and logs.
    fn name(&self) -> &str;

    async fn complete(&self, request: ProviderRequest) -> ProviderResult<ProviderResponse>;
}

/// Provider endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpProviderConfig {
    pub url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: Option<String>,
    /// Client-level timeout; the escalator applies its own tighter one.
    pub timeout_ms: u64,
}

impl Default for HttpProviderConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8088/v1/route".to_string(),
            api_key: None,
            model: None,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Serialize)]
struct HttpRequestBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    #[serde(flatten)]
    request: &'a ProviderRequest,
}

/// POSTs [`ProviderRequest`] as JSON and expects [`ProviderResponse`] back.
pub struct HttpProvider {
    http: reqwest::Client,
    config: HttpProviderConfig,
}

impl HttpProvider {
    pub fn new(config: HttpProviderConfig) -> ProviderResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms.max(1)))
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &HttpProviderConfig {
        &self.config
    }
}

#[async_trait]
impl GenerativeProvider for HttpProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn complete(&self, request: ProviderRequest) -> ProviderResult<ProviderResponse> {
        let body = HttpRequestBody {
            model: self.config.model.as_deref(),
            request: &request,
        };
        let mut builder = self.http.post(&self.config.url).json(&body);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    after_ms: self.config.timeout_ms,
                }
            } else {
                ProviderError::Transport(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status, body });
        }

        let parsed: ProviderResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        debug!(
            tenant = %request.tenant_id,
            matched = parsed.matched_scenario_id.is_some(),
            patterns = parsed.extracted_patterns.len(),
            "Provider responded"
        );
        Ok(parsed)
    }
}
