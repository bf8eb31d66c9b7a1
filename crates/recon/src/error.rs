use std::fmt;

use ledgermatch_ai::{AiError, ReplyError};
use ledgermatch_io::IoError;

use crate::model::Source;

/// Failure causes the workflow distinguishes.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconError {
    /// A file or the credential was not provided.
    InputMissing(String),
    /// The file could not be read or decoded.
    FileUnreadable { source: Option<Source>, detail: String },
    /// No header, name column, amount column, or data rows could be found.
    StructureUnresolved { source: Option<Source>, detail: String },
    /// The AI provider could not be reached or refused the request.
    RemoteCallFailed(AiError),
    /// The AI answered with text of the wrong shape.
    ResponseUnparseable(String),
}

/// Fieldless mirror of [`ReconError`] used for message lookup and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InputMissing,
    FileUnreadable,
    StructureUnresolved,
    RemoteCallFailed,
    ResponseUnparseable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InputMissing => "input_missing",
            Self::FileUnreadable => "file_unreadable",
            Self::StructureUnresolved => "structure_unresolved",
            Self::RemoteCallFailed => "remote_call_failed",
            Self::ResponseUnparseable => "response_unparseable",
        }
    }
}

impl ReconError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InputMissing(_) => ErrorKind::InputMissing,
            Self::FileUnreadable { .. } => ErrorKind::FileUnreadable,
            Self::StructureUnresolved { .. } => ErrorKind::StructureUnresolved,
            Self::RemoteCallFailed(_) => ErrorKind::RemoteCallFailed,
            Self::ResponseUnparseable(_) => ErrorKind::ResponseUnparseable,
        }
    }

    /// Missing role after every strategy ran.
    pub fn unresolved(missing: &str, headers: &[String], strategies: &[String]) -> Self {
        let shown: Vec<String> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| {
                if h.is_empty() {
                    format!("#{i} <blank>")
                } else {
                    format!("#{i} {h}")
                }
            })
            .collect();
        Self::StructureUnresolved {
            source: None,
            detail: format!(
                "no {missing} column found; headers: [{}]; strategies tried: {}",
                shown.join(", "),
                if strategies.is_empty() {
                    "none".to_string()
                } else {
                    strategies.join(", ")
                }
            ),
        }
    }

    /// Attach the file role to file-level errors.
    pub fn for_source(self, role: Source) -> Self {
        match self {
            Self::FileUnreadable { source: None, detail } => Self::FileUnreadable {
                source: Some(role),
                detail,
            },
            Self::StructureUnresolved { source: None, detail } => Self::StructureUnresolved {
                source: Some(role),
                detail,
            },
            other => other,
        }
    }
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InputMissing(what) => write!(f, "missing input: {what}"),
            Self::FileUnreadable { source, detail } => match source {
                Some(s) => write!(f, "{s} file unreadable: {detail}"),
                None => write!(f, "file unreadable: {detail}"),
            },
            Self::StructureUnresolved { source, detail } => match source {
                Some(s) => write!(f, "{s} file structure unresolved: {detail}"),
                None => write!(f, "structure unresolved: {detail}"),
            },
            Self::RemoteCallFailed(e) => write!(f, "AI request failed: {e}"),
            Self::ResponseUnparseable(msg) => write!(f, "AI response unusable: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::RemoteCallFailed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<AiError> for ReconError {
    fn from(e: AiError) -> Self {
        Self::RemoteCallFailed(e)
    }
}

impl From<ReplyError> for ReconError {
    fn from(e: ReplyError) -> Self {
        Self::ResponseUnparseable(e.to_string())
    }
}

impl From<IoError> for ReconError {
    fn from(e: IoError) -> Self {
        Self::FileUnreadable {
            source: None,
            detail: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_lists_headers_and_strategies() {
        let err = ReconError::unresolved(
            "amount",
            &["项目".into(), "".into()],
            &["keyword".into(), "local-amount".into()],
        )
        .for_source(Source::Check);
        assert_eq!(err.kind(), ErrorKind::StructureUnresolved);
        let text = err.to_string();
        assert!(text.starts_with("check file structure unresolved: no amount column found"));
        assert!(text.contains("#0 项目, #1 <blank>"));
        assert!(text.contains("keyword, local-amount"));
    }

    #[test]
    fn conversions() {
        assert_eq!(ReconError::from(AiError::Timeout).kind(), ErrorKind::RemoteCallFailed);
        assert_eq!(
            ReconError::from(ReplyError::NoJson).kind(),
            ErrorKind::ResponseUnparseable
        );
        let io = ReconError::from(IoError::UnsupportedExtension("txt".into()));
        assert_eq!(io.kind(), ErrorKind::FileUnreadable);
    }
}
