use std::path::PathBuf;
use candle_core::DType;
use clap::{Parser, ValueEnum};
use teppan::constant::{
    DEFAULT_MAX_BATCH_SIZE, DEFAULT_MAX_SEQ_LEN, DEFAULT_TEMPERATURE, DEFAULT_TOP_P,
};

/// Run every row of a code-performance table through a Llama chat model
/// and write one `id,result` row per input row.
#[derive(Parser, Debug)]
#[command(name = "teppan", version, about)]
pub struct Args {
    /// Input table with columns id, architecture, code, performance, task
    #[arg(long)]
    pub input: PathBuf,

    /// Output table, written only after every batch succeeds
    #[arg(long, required_unless_present = "dry_run")]
    pub output: Option<PathBuf>,

    /// Directory holding the model's config.json and *.safetensors weights
    #[arg(long, env = "TEPPAN_CKPT_DIR", required_unless_present = "dry_run")]
    pub ckpt_dir: Option<PathBuf>,

    /// Hugging Face tokenizer.json for the model
    #[arg(long, env = "TEPPAN_TOKENIZER_PATH", required_unless_present = "dry_run")]
    pub tokenizer_path: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
    pub temperature: f64,

    /// Nucleus-sampling threshold
    #[arg(long, default_value_t = DEFAULT_TOP_P)]
    pub top_p: f64,

    /// Longest prompt plus generation, in tokens
    #[arg(long, default_value_t = DEFAULT_MAX_SEQ_LEN)]
    pub max_seq_len: usize,

    /// Prompts submitted to the model per batch
    #[arg(long, default_value_t = DEFAULT_MAX_BATCH_SIZE)]
    pub max_batch_size: usize,

    /// Cap on generated tokens per reply [default: fill the sequence window]
    #[arg(long)]
    pub max_gen_len: Option<usize>,

    /// System message placed before every prompt
    #[arg(long)]
    pub system_prompt: Option<String>,

    /// Sampler seed [default: random]
    #[arg(long)]
    pub seed: Option<u64>,

    /// Precision the weights are loaded in
    #[arg(long, value_enum, default_value_t = Precision::F32)]
    pub dtype: Precision,

    /// Field delimiter of the input and output tables
    #[arg(long, default_value_t = ',')]
    pub delimiter: char,

    /// Print the built prompts as JSON lines instead of running the model
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Precision {
    F32,
    F16,
    Bf16,
}

impl From<Precision> for DType {
    fn from(precision: Precision) -> Self {
        match precision {
            Precision::F32 => DType::F32,
            Precision::F16 => DType::F16,
            Precision::Bf16 => DType::BF16,
        }
    }
}
