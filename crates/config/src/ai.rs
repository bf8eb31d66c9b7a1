// AI configuration and secrets management
//
// API keys are resolved from:
// 1. An explicit value (command-line flag, workflow SetCredential)
// 2. System keychain
// 3. Environment variables (fallback for CI/headless)
//
// Keys are NEVER stored in settings.json

use std::env;
use std::fmt;

use crate::settings::{AIProvider, AISettings, Settings};

/// Service name for keychain storage
const KEYCHAIN_SERVICE: &str = "ledgermatch";

const KEY_PREFIX: &str = "sk-";
const KEY_MIN_LEN: usize = 30;
const KEY_MAX_LEN: usize = 200;

/// Source of an API key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Key passed in directly by the caller
    Explicit,
    /// Key retrieved from system keychain
    Keychain,
    /// Key retrieved from environment variable
    Environment,
    /// No key found
    None,
}

impl KeySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeySource::Explicit => "explicit",
            KeySource::Keychain => "keychain",
            KeySource::Environment => "environment",
            KeySource::None => "none",
        }
    }
}

/// An API credential. Only its shape is ever checked locally.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `sk-` prefix, 30..=200 characters, no whitespace
    pub fn is_well_formed(&self) -> bool {
        let len = self.0.chars().count();
        self.0.starts_with(KEY_PREFIX)
            && (KEY_MIN_LEN..=KEY_MAX_LEN).contains(&len)
            && !self.0.chars().any(char::is_whitespace)
    }

    /// Masked form for diagnostics: `sk-a…wxyz`
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 8 {
            return "*".repeat(chars.len());
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}…{}", head, tail)
    }
}

// Never print the key itself
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", self.masked())
    }
}

/// Result of key lookup
#[derive(Debug, Clone)]
pub struct KeyLookup {
    pub key: Option<Credential>,
    pub source: KeySource,
}

/// Get the environment variable name for a provider
pub fn env_var_name(provider: &str) -> String {
    format!("LEDGERMATCH_{}_KEY", provider.to_uppercase())
}

/// Get the keychain account name for a provider
fn keychain_account(provider: &str) -> String {
    format!("ai/{}", provider.to_lowercase())
}

/// Get an API key for the specified provider
///
/// Checks in order:
/// 1. `explicit`, when non-empty
/// 2. System keychain
/// 3. Environment variable (LEDGERMATCH_DEEPSEEK_KEY, etc.)
pub fn get_api_key(provider: &str, explicit: Option<&str>) -> KeyLookup {
    if let Some(value) = explicit {
        let credential = Credential::new(value);
        if !credential.is_empty() {
            return KeyLookup {
                key: Some(credential),
                source: KeySource::Explicit,
            };
        }
    }

    #[cfg(feature = "keychain")]
    {
        if let Ok(entry) = keyring::Entry::new(KEYCHAIN_SERVICE, &keychain_account(provider)) {
            if let Ok(key) = entry.get_password() {
                log::debug!("API key for {} found in keychain", provider);
                return KeyLookup {
                    key: Some(Credential::new(key)),
                    source: KeySource::Keychain,
                };
            }
        }
    }

    let env_name = env_var_name(provider);
    if let Ok(key) = env::var(&env_name) {
        if !key.trim().is_empty() {
            log::debug!("API key for {} found in {}", provider, env_name);
            return KeyLookup {
                key: Some(Credential::new(key)),
                source: KeySource::Environment,
            };
        }
    }

    KeyLookup {
        key: None,
        source: KeySource::None,
    }
}

/// Store an API key in the system keychain
#[cfg(feature = "keychain")]
pub fn store_api_key(provider: &str, key: &str) -> Result<(), String> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, &keychain_account(provider))
        .map_err(|e| format!("Failed to create keychain entry: {}", e))?;

    entry
        .set_password(key)
        .map_err(|e| format!("Failed to store key in keychain: {}", e))
}

#[cfg(not(feature = "keychain"))]
pub fn store_api_key(provider: &str, _key: &str) -> Result<(), String> {
    Err(format!(
        "Keychain support not enabled. Set {} instead.",
        env_var_name(provider)
    ))
}

/// Delete an API key from the system keychain
#[cfg(feature = "keychain")]
pub fn delete_api_key(provider: &str) -> Result<(), String> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, &keychain_account(provider))
        .map_err(|e| format!("Failed to access keychain entry: {}", e))?;

    entry
        .delete_credential()
        .map_err(|e| format!("Failed to delete key from keychain: {}", e))
}

#[cfg(not(feature = "keychain"))]
pub fn delete_api_key(_provider: &str) -> Result<(), String> {
    Err("Keychain support not enabled.".to_string())
}

/// Check if keychain support is available
pub fn keychain_available() -> bool {
    #[cfg(feature = "keychain")]
    {
        keyring::Entry::new(KEYCHAIN_SERVICE, "probe").is_ok()
    }
    #[cfg(not(feature = "keychain"))]
    {
        false
    }
}

// ============================================================================
// Resolved AI Configuration (single source of truth)
// ============================================================================

/// Status of the AI configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AIConfigStatus {
    /// AI is disabled (provider = None)
    Disabled,
    /// A well-formed key is available
    Ready,
    /// Provider is configured but API key is missing
    MissingKey,
    /// A key was found but failed the shape check
    MalformedKey,
}

impl AIConfigStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Ready => "ready",
            Self::MissingKey => "missing_key",
            Self::MalformedKey => "malformed_key",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// The effective AI configuration, fully resolved from all sources.
#[derive(Debug, Clone)]
pub struct ResolvedAIConfig {
    pub provider: AIProvider,
    /// Effective model (settings or provider default)
    pub model: String,
    /// Effective API base URL, no trailing slash
    pub endpoint: String,
    /// Timeout for one chat completion
    pub request_timeout_secs: u64,
    pub credential: Option<Credential>,
    pub key_source: KeySource,
    pub status: AIConfigStatus,
    /// Human-readable reason if not ready
    pub blocking_reason: Option<String>,
}

impl ResolvedAIConfig {
    /// Resolve the effective AI configuration from settings and an optional
    /// explicit key.
    pub fn resolve(settings: &AISettings, explicit_key: Option<&str>) -> Self {
        let provider = settings.provider;

        if !provider.is_enabled() {
            return Self {
                provider,
                model: String::new(),
                endpoint: String::new(),
                request_timeout_secs: settings.request_timeout_secs,
                credential: None,
                key_source: KeySource::None,
                status: AIConfigStatus::Disabled,
                blocking_reason: Some("AI provider is set to \"none\"".to_string()),
            };
        }

        let lookup = get_api_key(provider.name(), explicit_key);
        let (status, blocking_reason) = match &lookup.key {
            None => (
                AIConfigStatus::MissingKey,
                Some(format!(
                    "No API key found. Pass --key, use the keychain, or set {}",
                    env_var_name(provider.name())
                )),
            ),
            Some(key) if !key.is_well_formed() => (
                AIConfigStatus::MalformedKey,
                Some(format!(
                    "API key from {} does not look like a valid key (expected \"{}\" prefix, {}-{} characters)",
                    lookup.source.as_str(),
                    KEY_PREFIX,
                    KEY_MIN_LEN,
                    KEY_MAX_LEN
                )),
            ),
            Some(_) => (AIConfigStatus::Ready, None),
        };

        Self {
            provider,
            model: settings.effective_model().to_string(),
            endpoint: settings.effective_endpoint().to_string(),
            request_timeout_secs: settings.request_timeout_secs,
            credential: lookup.key,
            key_source: lookup.source,
            status,
            blocking_reason,
        }
    }

    /// Load settings and resolve in one call
    pub fn load(explicit_key: Option<&str>) -> Self {
        let settings = Settings::load();
        Self::resolve(&settings.ai, explicit_key)
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }
}

// ============================================================================
// Diagnostics (for CLI doctor)
// ============================================================================

#[derive(Debug)]
pub struct AIDiagnostics {
    pub provider: String,
    pub model: String,
    pub endpoint: String,
    pub status: AIConfigStatus,
    pub key_present: bool,
    pub key_masked: Option<String>,
    pub key_source: KeySource,
    pub keychain_available: bool,
    pub blocking_reason: Option<String>,
}

impl AIDiagnostics {
    pub fn from_resolved(config: &ResolvedAIConfig) -> Self {
        Self {
            provider: config.provider.name().to_string(),
            model: config.model.clone(),
            endpoint: config.endpoint.clone(),
            status: config.status,
            key_present: config.credential.is_some(),
            key_masked: config.credential.as_ref().map(Credential::masked),
            key_source: config.key_source,
            keychain_available: keychain_available(),
            blocking_reason: config.blocking_reason.clone(),
        }
    }
}

impl fmt::Display for AIDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "AI Configuration")?;
        writeln!(f, "──────────────────────────────")?;
        writeln!(f, "Provider:          {}", self.provider)?;
        writeln!(f, "Status:            {}", self.status.as_str())?;
        writeln!(f, "Model:             {}", self.model)?;
        writeln!(f, "Endpoint:          {}", self.endpoint)?;
        writeln!(f, "Key present:       {}", if self.key_present { "yes" } else { "no" })?;
        if let Some(masked) = &self.key_masked {
            writeln!(f, "Key:               {}", masked)?;
        }
        writeln!(f, "Key source:        {}", self.key_source.as_str())?;
        writeln!(f, "Keychain available:{}", if self.keychain_available { "yes" } else { "no" })?;
        if let Some(reason) = &self.blocking_reason {
            writeln!(f, "Blocking:          {}", reason)?;
        }
        Ok(())
    }
}
