//! # Teppan
//!
//! A batch runner that turns rows of a code-performance table into chat
//! prompts, pushes them through a fixed-capacity language-model engine in
//! bounded batches, and writes each reply next to the identifier of the row
//! it answers.
//!
//! ## Overview
//!
//! A run is a straight line of stages, each finishing before the next starts:
//!
//! 1. [`row`] loads the input table into ordered [`RowRecord`]s
//! 2. [`prompt`] renders each row into a [`PromptUnit`] carrying the row id
//! 3. [`batch`] partitions the units into contiguous batches and submits them
//!    to an [`InferenceEngine`] one at a time
//! 4. [`correlate`] zips each batch's replies back onto the row ids
//! 5. [`writer`] serializes the `id,result` table
//!
//! [`pipeline::Pipeline`] wires the stages together.
//!
//! ## Assumptions
//! Regardless of engine used, teppan relies on two guarantees:
//!  - An engine never receives more dialogs than its declared capacity
//!  - An engine answers every dialog of a call, in the order submitted
//!
//! A violation of the second is reported as a [`CorrelationError`] rather
//! than silently misaligning results.
//!
//! ## Features
//!
//! - **candle** - Enables the candle-transformers Llama engine
//!
//! ## Failure Policy
//!
//! Every error is fatal. A failing batch aborts the run and no output table
//! is written; there is no retry, no per-row skip and no resume.
//!

mod error;

pub mod batch;
pub mod config;
pub mod constant;
pub mod correlate;
pub mod engine;
pub mod pipeline;
pub mod prompt;
pub mod row;
pub mod writer;

pub use batch::{Batch, BatchScheduler, Batches, CompletedBatch};
pub use config::GenerationConfig;
pub use correlate::{Correlator, OutputRecord};
pub use engine::{ChatPrediction, InferenceEngine};
pub use error::{CorrelationError, EngineError, Error, LoadError, PromptError, Result, WriteError};
pub use pipeline::{Pipeline, RunSummary};
pub use prompt::{Dialog, Message, PromptBuilder, PromptUnit, Role};
pub use row::{CsvConfig, RowRecord};
