// AI access for the pipeline stages: an assistant plus the credential state.

use ledgermatch_ai::{parse_reply, AiError, Assistant, ChatRequest, Offline, Reply};
use ledgermatch_config::Credential;

use crate::error::ReconError;

static OFFLINE: Offline = Offline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    Missing,
    Malformed,
    Ready,
}

/// What an AI-backed step may call. Cheap to copy into worker threads.
#[derive(Clone, Copy)]
pub struct AiAccess<'a> {
    assistant: &'a dyn Assistant,
    credential: Option<&'a str>,
    state: CredentialState,
}

impl<'a> AiAccess<'a> {
    /// Shape-checks the credential; a malformed one is never sent.
    pub fn new(assistant: &'a dyn Assistant, credential: Option<&'a Credential>) -> Self {
        let (credential, state) = match credential {
            None => (None, CredentialState::Missing),
            Some(c) if c.is_empty() => (None, CredentialState::Missing),
            Some(c) if !c.is_well_formed() => (None, CredentialState::Malformed),
            Some(c) => (Some(c.as_str()), CredentialState::Ready),
        };
        Self {
            assistant,
            credential,
            state,
        }
    }

    /// No AI at all: every stage runs its heuristics.
    pub fn offline() -> AiAccess<'static> {
        AiAccess {
            assistant: &OFFLINE,
            credential: None,
            state: CredentialState::Missing,
        }
    }

    pub fn is_available(&self) -> bool {
        self.state == CredentialState::Ready
    }

    pub fn state(&self) -> CredentialState {
        self.state
    }

    /// Raw completion text
    pub fn complete(&self, request: &ChatRequest) -> Result<String, ReconError> {
        let credential = match (self.state, self.credential) {
            (CredentialState::Ready, Some(c)) => c,
            (CredentialState::Malformed, _) => return Err(AiError::MalformedKey.into()),
            _ => return Err(AiError::MissingKey.into()),
        };
        Ok(self.assistant.complete(credential, request)?)
    }

    /// Completion parsed into a typed reply
    pub fn ask<T: Reply>(&self, request: &ChatRequest) -> Result<T, ReconError> {
        let text = self.complete(request)?;
        Ok(parse_reply::<T>(&text)?)
    }
}

impl std::fmt::Debug for AiAccess<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiAccess").field("state", &self.state).finish()
    }
}
