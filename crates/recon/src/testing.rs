// Shared fixtures for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use ledgermatch_ai::{AiError, Assistant, ChatRequest};
use ledgermatch_io::Grid;

/// A credential that passes the shape check
pub const KEY: &str = "sk-0123456789abcdef0123456789abcdef";

pub fn grid(rows: &[&[&str]]) -> Grid {
    let rows: Vec<Vec<&str>> = rows.iter().map(|r| r.to_vec()).collect();
    Grid::from_rows(&rows).expect("fixture grid")
}

/// Answers requests from a queue, in call order. An exhausted queue
/// answers with a network error.
pub struct ScriptedAssistant {
    replies: Mutex<VecDeque<Result<String, AiError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedAssistant {
    pub fn new(replies: Vec<Result<String, AiError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Assistant for ScriptedAssistant {
    fn complete(&self, _credential: &str, request: &ChatRequest) -> Result<String, AiError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AiError::Network("script exhausted".into())))
    }
}
