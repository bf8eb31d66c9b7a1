//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                                  |
//! |---------|------------------|----------------------------------------------|
//! | 0       | Universal        | Success                                      |
//! | 1       | Universal        | General error (unspecified)                  |
//! | 2       | Universal        | CLI usage error (bad args)                   |
//! | 3-9     | input            | Files, structure, credential                 |
//! | 10-19   | ai               | Provider availability and replies            |
//! | 20-29   | recon            | Reconciliation outcome (`--strict` only)     |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

use ledgermatch_recon::{ErrorKind, ReconError};

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, malformed `--move`.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Input (3-9)
// =============================================================================

/// A file or the credential was not provided.
pub const EXIT_INPUT_MISSING: u8 = 3;

/// File missing, too large, of an unsupported type, or undecodable.
pub const EXIT_FILE_UNREADABLE: u8 = 4;

/// No header, name column, amount column, or data rows could be found.
pub const EXIT_STRUCTURE_UNRESOLVED: u8 = 5;

// =============================================================================
// AI (10-19)
// =============================================================================

/// AI disabled (provider=none) or no API key found.
pub const EXIT_AI_UNAVAILABLE: u8 = 10;

/// Provider unreachable, timed out, or rejected the request.
pub const EXIT_AI_REMOTE: u8 = 11;

/// Provider answered with text of the wrong shape.
pub const EXIT_AI_UNPARSEABLE: u8 = 12;

// =============================================================================
// Recon (20-29)
// =============================================================================

/// Run finished but at least one category is mismatched or missing.
/// Only returned with `--strict`.
pub const EXIT_RECON_MISMATCH: u8 = 20;

// =============================================================================
// Recon Error Types
// =============================================================================

/// Map a ReconError to its exit code.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err.kind() {
        ErrorKind::InputMissing => EXIT_INPUT_MISSING,
        ErrorKind::FileUnreadable => EXIT_FILE_UNREADABLE,
        ErrorKind::StructureUnresolved => EXIT_STRUCTURE_UNRESOLVED,
        ErrorKind::RemoteCallFailed => EXIT_AI_REMOTE,
        ErrorKind::ResponseUnparseable => EXIT_AI_UNPARSEABLE,
    }
}

/// Structured error output for `--json` runs.
#[derive(Debug, serde::Serialize)]
pub struct ReconErrorOutput {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    pub exit_code: u8,
}

impl ReconErrorOutput {
    pub fn new(err: &ReconError, message: String, stage: Option<String>) -> Self {
        Self {
            error: err.kind().as_str(),
            message,
            stage,
            exit_code: recon_exit_code(err),
        }
    }

    /// Print error to stderr (human-readable by default).
    pub fn print(&self, json: bool) {
        if json {
            if let Ok(output) = serde_json::to_string(self) {
                eprintln!("{}", output);
            }
        } else if let Some(stage) = &self.stage {
            eprintln!("error: {} (stage: {})", self.message, stage);
        } else {
            eprintln!("error: {}", self.message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgermatch_recon::Source;

    #[test]
    fn every_kind_has_a_distinct_code() {
        let errors = [
            ReconError::InputMissing("x".into()),
            ReconError::FileUnreadable { source: None, detail: "x".into() },
            ReconError::StructureUnresolved { source: Some(Source::Check), detail: "x".into() },
            ReconError::RemoteCallFailed(ledgermatch_ai::AiError::Timeout),
            ReconError::ResponseUnparseable("x".into()),
        ];
        let mut codes: Vec<u8> = errors.iter().map(recon_exit_code).collect();
        assert_eq!(codes, vec![3, 4, 5, 11, 12]);
        codes.dedup();
        assert_eq!(codes.len(), 5);
    }

    #[test]
    fn json_output_names_the_kind() {
        let err = ReconError::ResponseUnparseable("not json".into());
        let out = ReconErrorOutput::new(&err, "bad reply".into(), Some("classify".into()));
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["error"], "response_unparseable");
        assert_eq!(json["exit_code"], 12);
        assert_eq!(json["stage"], "classify");
    }
}
