//! Reasoning backend: strategic coaching calls routed through OpenRouter.
//!
//! The engine keeps every reflex and all state local; this service is only
//! consulted for the slow "what should the agent do next" question, and its
//! answers are parsed defensively before anything reaches the UI.
//!
//! API key: `OPENROUTER_API_KEY` in `.env`. Default model: `google/gemini-flash-1.5`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::MaestroConfig;
use crate::error::{CoreError, CoreResult};

const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// One-shot text completion. Implementations must be cheap to share.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn complete(&self, prompt: &str) -> CoreResult<String>;
}

// OpenAI-compatible request/response for OpenRouter
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

/// OpenRouter-backed completion client.
pub struct OpenRouterReasoner {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenRouterReasoner {
    /// Create a reasoner with an explicit API key. Base URL honors
    /// `OPENROUTER_BASE_URL` when set.
    pub fn new(api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let base_url = std::env::var("OPENROUTER_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| OPENROUTER_API_BASE.to_string());
        Self {
            api_key: api_key.trim().to_string(),
            model: MaestroConfig::default().llm_model,
            base_url,
            client,
        }
    }

    /// Create a reasoner from `OPENROUTER_API_KEY`. Returns `None` when the
    /// key is missing or blank.
    pub fn from_env() -> Option<Self> {
        let key = std::env::var("OPENROUTER_API_KEY").ok()?.trim().to_string();
        if key.is_empty() {
            return None;
        }
        Some(Self::new(key))
    }

    /// Set the model (e.g. `google/gemini-flash-1.5`, `anthropic/claude-3.5-sonnet`).
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }
}

#[async_trait]
impl ReasoningService for OpenRouterReasoner {
    async fn complete(&self, prompt: &str) -> CoreResult<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: 0.4,
            max_tokens: 2048,
        };

        let res = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", "https://maestro-copilot.local")
            .header("X-Title", "MAESTRO-Live-Coach")
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Reasoning(format!("OpenRouter request failed: {e}")))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(CoreError::Reasoning(format!(
                "OpenRouter API error {status}: {body}"
            )));
        }

        let parsed: ChatResponse = res
            .json()
            .await
            .map_err(|e| CoreError::Reasoning(format!("OpenRouter response parse failed: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| CoreError::Reasoning("OpenRouter returned no choices".to_string()))
    }
}

/// No-backend stand-in: every consultation fails fast and the engine keeps
/// running on reflexes alone.
pub struct PlaceholderReasoner;

#[async_trait]
impl ReasoningService for PlaceholderReasoner {
    async fn complete(&self, _prompt: &str) -> CoreResult<String> {
        Err(CoreError::Reasoning(
            "no reasoning backend configured".to_string(),
        ))
    }
}

/// Pops canned completions in order; errors once the script runs dry.
pub struct ScriptedReasoner {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedReasoner {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
        }
    }
}

#[async_trait]
impl ReasoningService for ScriptedReasoner {
    async fn complete(&self, _prompt: &str) -> CoreResult<String> {
        let mut queue = self
            .responses
            .lock()
            .map_err(|_| CoreError::Reasoning("scripted reasoner poisoned".to_string()))?;
        queue
            .pop_front()
            .ok_or_else(|| CoreError::Reasoning("scripted reasoner exhausted".to_string()))
    }
}

/// Best available reasoning backend: OpenRouter when the key is present,
/// otherwise the placeholder.
pub fn create_best_reasoner(config: &MaestroConfig) -> Arc<dyn ReasoningService> {
    match OpenRouterReasoner::from_env() {
        Some(reasoner) => {
            info!(target: "maestro::reasoning", "🧠 Reasoning via OpenRouter ({})", config.llm_model);
            Arc::new(reasoner.with_model(&config.llm_model))
        }
        None => {
            warn!(
                target: "maestro::reasoning",
                "OPENROUTER_API_KEY not set; consultations disabled (reflex rules still run)"
            );
            Arc::new(PlaceholderReasoner)
        }
    }
}
