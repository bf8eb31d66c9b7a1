//! Chat-completion access for the reconciliation engine.
//!
//! - [`Assistant`] is the seam every AI-backed stage calls through.
//! - [`HttpAssistant`] talks to an OpenAI-compatible endpoint (blocking reqwest).
//! - [`json`] salvages a JSON value out of free-form model output.
//! - [`reply`] turns that value into one of the typed reply shapes.

pub mod client;
pub mod json;
pub mod reply;

use std::fmt;
use std::time::Duration;

use serde::Serialize;

pub use client::HttpAssistant;
pub use json::extract_json;
pub use reply::{parse_reply, Reply, ReplyError, ReplyShape};

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One chat completion: messages plus sampling parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Overrides the client-wide timeout for this request
    pub timeout: Option<Duration>,
}

impl ChatRequest {
    /// System instruction followed by one user message
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            temperature: 0.3,
            max_tokens: 1024,
            timeout: None,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Concatenated user content (handy for logging and fakes)
    pub fn user_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum AiError {
    /// No credential available
    MissingKey,
    /// Credential failed the local shape check
    MalformedKey,
    /// Transport failure
    Network(String),
    /// Request exceeded its timeout
    Timeout,
    /// Provider answered with a non-success status
    Api { status: u16, message: String },
    /// Provider answered without any content
    EmptyResponse,
    /// Provider envelope could not be decoded
    Parse(String),
}

impl fmt::Display for AiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AiError::MissingKey => write!(f, "API key not configured"),
            AiError::MalformedKey => write!(f, "API key is malformed"),
            AiError::Network(msg) => write!(f, "Network error: {}", msg),
            AiError::Timeout => write!(f, "Request timed out"),
            AiError::Api { status, message } => write!(f, "API error ({}): {}", status, message),
            AiError::EmptyResponse => write!(f, "Provider returned an empty response"),
            AiError::Parse(msg) => write!(f, "Failed to parse response: {}", msg),
        }
    }
}

impl std::error::Error for AiError {}

// ============================================================================
// Assistant seam
// ============================================================================

/// A chat-completion backend. Blocking; callers run it off the main flow.
pub trait Assistant: Send + Sync {
    /// Send one request and return the raw text of the first choice
    fn complete(&self, credential: &str, request: &ChatRequest) -> Result<String, AiError>;
}

impl<T: Assistant + ?Sized> Assistant for &T {
    fn complete(&self, credential: &str, request: &ChatRequest) -> Result<String, AiError> {
        (**self).complete(credential, request)
    }
}

impl<T: Assistant + ?Sized> Assistant for Box<T> {
    fn complete(&self, credential: &str, request: &ChatRequest) -> Result<String, AiError> {
        (**self).complete(credential, request)
    }
}

/// Backend used when AI is switched off: every call reports a missing key.
#[derive(Debug, Clone, Copy, Default)]
pub struct Offline;

impl Assistant for Offline {
    fn complete(&self, _credential: &str, _request: &ChatRequest) -> Result<String, AiError> {
        Err(AiError::MissingKey)
    }
}
