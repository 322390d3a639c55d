//! # Errors
//!
//! Every stage of a run has its own error type. All of them are fatal: the
//! pipeline never retries a batch or skips a row, it stops and reports the
//! stage that failed through [`Error`].

use std::path::PathBuf;

/// Result alias used throughout the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure while reading the input table
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The input file could not be opened
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The delimited text could not be parsed
    #[error("malformed input table: {0}")]
    Csv(#[from] csv::Error),

    /// A column the prompt template needs is absent from the header
    #[error("input table is missing required column `{0}`")]
    MissingColumn(String),

    /// The header names the same column twice
    #[error("input table repeats column `{0}`")]
    DuplicateColumn(String),

    /// A row has no identifier
    #[error("row on line {line} has an empty identifier")]
    EmptyId { line: u64 },

    /// Two rows share an identifier, which would make correlation ambiguous
    #[error("identifier `{id}` on line {line} was already used")]
    DuplicateId { id: String, line: u64 },
}

/// Failure while rendering a row into a prompt
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    /// The template references a field the row does not carry
    #[error("row `{id}` has no field `{field}`")]
    MissingField { id: String, field: String },

    /// A prompt unit must hold at least one user message
    #[error("prompt for row `{id}` has no user message")]
    NoUserMessage { id: String },
}

/// Failure reported by an inference engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// More prompts were submitted than the engine can hold at once
    #[error("batch of {size} exceeds engine capacity {capacity}")]
    BatchTooLarge { size: usize, capacity: usize },

    /// A prompt does not fit in the engine's sequence window
    #[error("prompt of {prompt_tokens} tokens exceeds max sequence length {max_seq_len}")]
    SequenceTooLong {
        prompt_tokens: usize,
        max_seq_len: usize,
    },

    /// The dialog cannot be rendered in the engine's chat format
    #[error("invalid dialog: {0}")]
    InvalidDialog(String),

    /// Tokenizer could not be loaded or failed on a prompt
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// The model or its files are not available
    #[error("model unavailable: {0}")]
    Unavailable(String),

    /// Failure inside the tensor backend
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// The engine broke its one-result-per-prompt contract
#[derive(Debug, thiserror::Error)]
#[error("batch {batch} submitted {expected} prompts but the engine returned {actual} results")]
pub struct CorrelationError {
    pub batch: usize,
    pub expected: usize,
    pub actual: usize,
}

/// Failure while writing the output table
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// The output file could not be created
    #[error("cannot create {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serializing or flushing records failed
    #[error("cannot write output table: {0}")]
    Csv(#[from] csv::Error),

    #[error("cannot flush output table: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level error for a batch run
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("loading rows failed: {0}")]
    Load(#[from] LoadError),

    #[error("building prompts failed: {0}")]
    Prompt(#[from] PromptError),

    #[error("inference failed on batch {batch}: {source}")]
    Engine {
        batch: usize,
        #[source]
        source: EngineError,
    },

    #[error("correlating results failed: {0}")]
    Correlation(#[from] CorrelationError),

    #[error("writing results failed: {0}")]
    Write(#[from] WriteError),
}

impl Error {
    /// Name of the pipeline stage that produced this error
    pub fn stage(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Load(_) => "load",
            Error::Prompt(_) => "prompt",
            Error::Engine { .. } => "engine",
            Error::Correlation(_) => "correlate",
            Error::Write(_) => "write",
        }
    }
}
