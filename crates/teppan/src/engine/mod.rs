//! # Inference Engine Boundary
//!
//! The batch runner talks to a language model only through the
//! [`InferenceEngine`] trait, so any engine (or a test stub) can drive a run.
//!
//! ## Feature Flags
//!
//! - `candle`: Enables [`candle::LlamaEngine`], a Llama-family engine built on
//!   candle-transformers
//!
//! ## Contract
//!
//! An engine declares a fixed [`capacity`](InferenceEngine::capacity) and
//! accepts at most that many dialogs per call. It answers with exactly one
//! [`ChatPrediction`] per dialog, in the order the dialogs were submitted.
//! Calls are never overlapped by the runner.

use async_trait::async_trait;
use crate::config::GenerationConfig;
use crate::error::EngineError;
use crate::prompt::{Dialog, Message};

pub mod chat_format;

#[cfg_attr(docsrs, doc(cfg(feature = "candle")))]
#[cfg(feature = "candle")]
/// Candle Llama engine implementation.
///
/// This module is only available when the `candle` feature flag is enabled.
pub mod candle;

#[cfg(test)]
/// Scripted engines for exercising the scheduler and pipeline.
pub(crate) mod mock_engine;

/// One generated reply, returned in the position of the dialog it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPrediction {
    pub generation: Message,
}

impl ChatPrediction {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            generation: Message::assistant(content),
        }
    }
}

/// A chat model that completes dialogs in bounded batches.
#[async_trait]
pub trait InferenceEngine {
    /// Maximum number of dialogs accepted by a single call
    fn capacity(&self) -> usize;

    /// Generate one reply per dialog, in submission order.
    ///
    /// # Parameters
    ///
    /// * `dialogs` - At most [`capacity`](Self::capacity) dialogs
    /// * `config` - Sampling parameters applied to every dialog in the call
    async fn chat_completion(
        &self,
        dialogs: &[Dialog],
        config: &GenerationConfig,
    ) -> Result<Vec<ChatPrediction>, EngineError>;
}
