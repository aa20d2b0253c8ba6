//! Deterministic oracle that replays canned completions.
//!
//! Used by tests and demos to drive the pipeline without a network. Every
//! call is recorded so tests can inspect the prompts the pipeline built.

use std::cell::RefCell;
use std::collections::VecDeque;

use super::{Message, OracleError, OracleResult, TextOracle};

/// Replays `responses` in order, one per call.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    responses: RefCell<VecDeque<String>>,
    calls: RefCell<Vec<Vec<Message>>>,
}

impl ScriptedOracle {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: RefCell::new(responses.into_iter().map(Into::into).collect()),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Queue one more completion.
    pub fn push(&self, response: impl Into<String>) {
        self.responses.borrow_mut().push_back(response.into());
    }

    /// Every conversation received so far, in call order.
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.borrow().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    /// Completions not consumed yet.
    pub fn remaining(&self) -> usize {
        self.responses.borrow().len()
    }
}

impl TextOracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    fn complete(&self, messages: &[Message]) -> OracleResult<String> {
        self.calls.borrow_mut().push(messages.to_vec());
        let call = self.calls.borrow().len();
        self.responses
            .borrow_mut()
            .pop_front()
            .map(|r| r.trim().to_string())
            .ok_or(OracleError::ScriptExhausted { call })
    }
}
