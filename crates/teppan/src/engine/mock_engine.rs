use std::sync::Mutex;
use async_trait::async_trait;
use crate::config::GenerationConfig;
use crate::error::EngineError;
use crate::prompt::{Dialog, Role};
use super::{ChatPrediction, InferenceEngine};

// How the mock answers each call
#[derive(Clone, Copy, Debug)]
pub enum Behavior {
    /// Reply with the length of the last user message
    Echo,
    /// Echo, but leave out the reply to the final dialog
    DropLast,
    /// Echo until the call with this index, which fails
    FailOnCall(usize),
}

pub struct MockEngine {
    pub(crate) capacity: usize,
    pub(crate) behavior: Behavior,
    pub(crate) calls: Mutex<Vec<Vec<Dialog>>>,
}

impl MockEngine {
    pub fn new(capacity: usize, behavior: Behavior) -> Self {
        Self {
            capacity,
            behavior,
            calls: Mutex::new(vec![]),
        }
    }

    pub fn echo(capacity: usize) -> Self {
        Self::new(capacity, Behavior::Echo)
    }

    /// Dialogs received so far, grouped by call
    pub fn calls(&self) -> Vec<Vec<Dialog>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_sizes(&self) -> Vec<usize> {
        self.calls().iter().map(Vec::len).collect()
    }
}

pub fn echo_reply(dialog: &Dialog) -> String {
    dialog
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.len())
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl InferenceEngine for MockEngine {
    fn capacity(&self) -> usize {
        self.capacity
    }

    async fn chat_completion(
        &self,
        dialogs: &[Dialog],
        _config: &GenerationConfig,
    ) -> Result<Vec<ChatPrediction>, EngineError> {
        if dialogs.len() > self.capacity {
            return Err(EngineError::BatchTooLarge {
                size: dialogs.len(),
                capacity: self.capacity,
            });
        }
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(dialogs.to_vec());
            calls.len() - 1
        };

        let mut replies: Vec<ChatPrediction> = dialogs
            .iter()
            .map(|dialog| ChatPrediction::new(echo_reply(dialog)))
            .collect();
        match self.behavior {
            Behavior::Echo => {}
            Behavior::DropLast => {
                replies.pop();
            }
            Behavior::FailOnCall(idx) if idx == call => {
                return Err(EngineError::SequenceTooLong {
                    prompt_tokens: 513,
                    max_seq_len: 512,
                });
            }
            Behavior::FailOnCall(_) => {}
        }
        Ok(replies)
    }
}
