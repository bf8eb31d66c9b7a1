// Application settings
// Loaded from ~/.config/ledgermatch/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// AI provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AIProvider {
    /// AI features disabled; every stage runs heuristic-only
    None,
    /// DeepSeek chat completions (default)
    #[default]
    #[serde(rename = "deepseek")]
    DeepSeek,
    /// OpenAI chat completions
    #[serde(rename = "openai")]
    OpenAI,
}

impl AIProvider {
    /// Returns true if AI features are enabled
    pub fn is_enabled(&self) -> bool {
        !matches!(self, AIProvider::None)
    }

    /// Short lowercase name, used for env vars and keychain accounts
    pub fn name(&self) -> &'static str {
        match self {
            AIProvider::None => "none",
            AIProvider::DeepSeek => "deepseek",
            AIProvider::OpenAI => "openai",
        }
    }

    /// Returns the default model for this provider
    pub fn default_model(&self) -> &'static str {
        match self {
            AIProvider::None => "",
            AIProvider::DeepSeek => "deepseek-chat",
            AIProvider::OpenAI => "gpt-4o",
        }
    }

    /// Returns the default API base URL for this provider
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            AIProvider::None => "",
            AIProvider::DeepSeek => "https://api.deepseek.com/v1",
            AIProvider::OpenAI => "https://api.openai.com/v1",
        }
    }
}

/// Row-level summarization batching (AI-backed name synthesis)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RowSummarySettings {
    /// Maximum number of unique rows sent for summarization
    pub sample_cap: usize,
    /// Unique inputs per request
    pub batch_size: usize,
    /// Per-request timeout for one batch
    pub batch_timeout_secs: u64,
    /// Batches in flight at once
    pub max_concurrent_batches: usize,
}

impl Default for RowSummarySettings {
    fn default() -> Self {
        Self {
            sample_cap: 60,
            batch_size: 20,
            batch_timeout_secs: 20,
            max_concurrent_batches: 3,
        }
    }
}

/// AI-specific settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AISettings {
    /// Selected AI provider
    pub provider: AIProvider,

    /// Model identifier (provider-specific, empty = provider default)
    pub model: String,

    /// API base URL override (empty = provider default)
    pub endpoint: String,

    /// Timeout for a single chat completion request
    pub request_timeout_secs: u64,

    /// Row summary batching
    pub row_summary: RowSummarySettings,
}

impl Default for AISettings {
    fn default() -> Self {
        Self {
            provider: AIProvider::DeepSeek,
            model: String::new(),
            endpoint: String::new(),
            request_timeout_secs: 60,
            row_summary: RowSummarySettings::default(),
        }
    }
}

impl AISettings {
    /// Get the effective model (user-specified or provider default)
    pub fn effective_model(&self) -> &str {
        if self.model.is_empty() {
            self.provider.default_model()
        } else {
            &self.model
        }
    }

    /// Get the effective endpoint, without a trailing slash
    pub fn effective_endpoint(&self) -> &str {
        let endpoint = if self.endpoint.is_empty() {
            self.provider.default_endpoint()
        } else {
            &self.endpoint
        };
        endpoint.trim_end_matches('/')
    }
}

/// Limits for the tabular extraction pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseSettings {
    /// Rows inspected when locating the header
    pub header_scan_rows: usize,
    /// Rows sampled for composite "name:amount" detection
    pub composite_sample_rows: usize,
    /// Character budget of an entry's context text
    pub context_max_chars: usize,
    /// Largest accepted input file
    pub max_file_bytes: u64,
}

impl Default for ParseSettings {
    fn default() -> Self {
        Self {
            header_scan_rows: 10,
            composite_sample_rows: 10,
            context_max_chars: 240,
            max_file_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub ai: AISettings,
    pub parse: ParseSettings,
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ledgermatch");
        config_dir.join("settings.json")
    }

    /// Load settings from disk, falling back to defaults
    pub fn load() -> Self {
        let path = Self::config_path();

        if !path.exists() {
            let settings = Self::default();
            settings.create_default_file(&path);
            return settings;
        }

        Self::load_from(&path)
    }

    /// Load settings from an explicit path, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(settings) => settings,
                Err(e) => {
                    log::warn!("Error parsing {}: {}; using default settings", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Error reading {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Parse settings JSON, ignoring lines that start with `//`
    pub fn parse(contents: &str) -> Result<Self, String> {
        let cleaned: String = contents
            .lines()
            .filter(|line| !line.trim().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");

        serde_json::from_str(&cleaned).map_err(|e| e.to_string())
    }

    /// Save current settings to disk
    pub fn save(&self) -> Result<(), String> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;

        fs::write(&path, json).map_err(|e| e.to_string())
    }

    /// Create default settings file with comments
    fn create_default_file(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                log::warn!("Error creating config directory: {}", e);
                return;
            }
        }

        let default_config = r#"{
    // AI provider options: "none", "deepseek", "openai"
    // API keys are stored in the system keychain or LEDGERMATCH_<PROVIDER>_KEY,
    // never in this file
    "ai": {
        "provider": "deepseek",
        "model": "",
        "endpoint": "",
        "request_timeout_secs": 60,
        "row_summary": {
            "sample_cap": 60,
            "batch_size": 20,
            "batch_timeout_secs": 20,
            "max_concurrent_batches": 3
        }
    },

    // Spreadsheet parsing limits
    "parse": {
        "header_scan_rows": 10,
        "composite_sample_rows": 10,
        "context_max_chars": 240,
        "max_file_bytes": 10485760
    }
}
"#;

        if let Err(e) = fs::write(path, default_config) {
            log::warn!("Error writing default settings.json: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_deepseek() {
        let settings = Settings::default();
        assert_eq!(settings.ai.provider, AIProvider::DeepSeek);
        assert_eq!(settings.ai.effective_model(), "deepseek-chat");
        assert_eq!(settings.ai.effective_endpoint(), "https://api.deepseek.com/v1");
        assert_eq!(settings.parse.header_scan_rows, 10);
        assert_eq!(settings.parse.context_max_chars, 240);
    }

    #[test]
    fn parse_strips_comment_lines() {
        let input = r#"{
    // pick a provider
    "ai": { "provider": "openai", "model": "gpt-4o-mini" }
}"#;
        let settings = Settings::parse(input).unwrap();
        assert_eq!(settings.ai.provider, AIProvider::OpenAI);
        assert_eq!(settings.ai.effective_model(), "gpt-4o-mini");
        // Unspecified blocks keep their defaults
        assert_eq!(settings.ai.row_summary.batch_size, 20);
        assert_eq!(settings.parse.max_file_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn endpoint_override_drops_trailing_slash() {
        let ai = AISettings {
            endpoint: "http://localhost:8080/v1/".into(),
            ..AISettings::default()
        };
        assert_eq!(ai.effective_endpoint(), "http://localhost:8080/v1");
    }

    #[test]
    fn load_from_malformed_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        let settings = Settings::load_from(&path);
        assert_eq!(settings.ai.provider, AIProvider::DeepSeek);
    }

    #[test]
    fn default_file_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        Settings::default().create_default_file(&path);
        let contents = fs::read_to_string(&path).unwrap();
        let settings = Settings::parse(&contents).unwrap();
        assert_eq!(settings.ai.row_summary.max_concurrent_batches, 3);
        assert_eq!(settings.parse.composite_sample_rows, 10);
    }
}
