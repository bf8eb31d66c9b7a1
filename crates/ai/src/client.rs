// HTTP assistant for OpenAI-compatible chat completion APIs
// (DeepSeek, OpenAI). Blocking reqwest; no async runtime required.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use ledgermatch_config::ResolvedAIConfig;

use crate::{AiError, Assistant, ChatMessage, ChatRequest};

const USER_AGENT: &str = concat!("ledgermatch/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ProviderError {
    error: ProviderErrorDetail,
}

#[derive(Deserialize)]
struct ProviderErrorDetail {
    message: String,
}

// ============================================================================
// Client
// ============================================================================

/// Chat completion client for one endpoint and model.
#[derive(Clone)]
pub struct HttpAssistant {
    http: reqwest::blocking::Client,
    endpoint: String,
    model: String,
}

impl HttpAssistant {
    /// `endpoint` is the API base URL, e.g. `https://api.deepseek.com/v1`
    pub fn new(endpoint: &str, model: &str, timeout: Duration) -> Result<Self, AiError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AiError::Network(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    pub fn from_config(config: &ResolvedAIConfig) -> Result<Self, AiError> {
        Self::new(
            &config.endpoint,
            &config.model,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Verify the endpoint accepts the credential (`GET /models`)
    pub fn check_connection(&self, credential: &str) -> Result<(), AiError> {
        let response = self
            .http
            .get(format!("{}/models", self.endpoint))
            .bearer_auth(credential)
            .send()
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().unwrap_or_default();
        Err(api_error(status.as_u16(), &body))
    }
}

impl Assistant for HttpAssistant {
    fn complete(&self, credential: &str, request: &ChatRequest) -> Result<String, AiError> {
        if credential.trim().is_empty() {
            return Err(AiError::MissingKey);
        }

        let body = CompletionRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: false,
        };

        let mut builder = self
            .http
            .post(format!("{}/chat/completions", self.endpoint))
            .bearer_auth(credential)
            .json(&body);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        log::debug!(
            "chat completion: model={} temperature={} max_tokens={}",
            self.model,
            request.temperature,
            request.max_tokens
        );

        let response = builder.send().map_err(map_transport_error)?;
        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().unwrap_or_default();
            return Err(api_error(status.as_u16(), &error_text));
        }

        let text = response.text().map_err(map_transport_error)?;
        let parsed: CompletionResponse =
            serde_json::from_str(&text).map_err(|e| AiError::Parse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(AiError::EmptyResponse);
        }
        Ok(content)
    }
}

fn map_transport_error(e: reqwest::Error) -> AiError {
    if e.is_timeout() {
        AiError::Timeout
    } else {
        AiError::Network(e.to_string())
    }
}

fn api_error(status: u16, body: &str) -> AiError {
    let message = match serde_json::from_str::<ProviderError>(body) {
        Ok(err) => err.error.message,
        Err(_) => body.trim().to_string(),
    };
    AiError::Api { status, message }
}
