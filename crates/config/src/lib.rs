// Configuration loading

pub mod ai;
pub mod settings;

pub use ai::{AIConfigStatus, AIDiagnostics, Credential, KeySource, ResolvedAIConfig};
pub use settings::{AIProvider, AISettings, ParseSettings, RowSummarySettings, Settings};
