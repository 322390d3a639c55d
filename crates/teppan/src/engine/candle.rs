use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::llama as model;
use model::{Llama, LlamaConfig, LlamaEosToks};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};
use crate::config::GenerationConfig;
use crate::constant::{DEFAULT_MAX_BATCH_SIZE, DEFAULT_MAX_SEQ_LEN};
use crate::error::EngineError;
use crate::prompt::Dialog;
use super::chat_format::{format_dialog, has_special_tags, UNSAFE_ERROR};
use super::{ChatPrediction, InferenceEngine};

const BOS_TOKEN: &str = "<s>";
const EOS_TOKEN: &str = "</s>";

/// Build-time limits of a [`LlamaEngine`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Longest prompt plus generation, in tokens
    pub max_seq_len: usize,
    /// Dialogs accepted per call; this is the engine's capacity
    pub max_batch_size: usize,
    pub dtype: DType,
    /// Seed for the sampler; each call derives its own stream from it
    pub seed: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_seq_len: DEFAULT_MAX_SEQ_LEN,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            dtype: DType::F32,
            seed: 299792458,
        }
    }
}

/// A Llama-family chat model loaded from a local checkpoint directory.
///
/// The directory must hold the model's `config.json` and its
/// `*.safetensors` weights; the tokenizer is a Hugging Face `tokenizer.json`.
pub struct LlamaEngine {
    model: Llama,
    config: model::Config,
    tokenizer: Tokenizer,
    device: Device,
    options: EngineOptions,
    bos: u32,
    eos: Vec<u32>,
    calls: AtomicU64,
}

fn backend<E>(err: E) -> EngineError
where E: std::error::Error + Send + Sync + 'static
{
    EngineError::Backend(Box::new(err))
}

fn tokenizer_error(err: impl std::fmt::Display) -> EngineError {
    EngineError::Tokenizer(err.to_string())
}

impl LlamaEngine {
    pub fn load(
        ckpt_dir: impl AsRef<Path>,
        tokenizer_path: impl AsRef<Path>,
        options: EngineOptions,
    ) -> Result<Self, EngineError> {
        let ckpt_dir = ckpt_dir.as_ref();
        let device = Device::cuda_if_available(0).map_err(backend)?;

        let config_path = ckpt_dir.join("config.json");
        let raw = std::fs::read(&config_path).map_err(|e| {
            EngineError::Unavailable(format!("cannot read {}: {e}", config_path.display()))
        })?;
        let config: LlamaConfig = serde_json::from_slice(&raw).map_err(|e| {
            EngineError::Unavailable(format!("invalid {}: {e}", config_path.display()))
        })?;
        let config = config.into_config(false);
        if options.max_seq_len > config.max_position_embeddings {
            warn!(
                max_seq_len = options.max_seq_len,
                max_position_embeddings = config.max_position_embeddings,
                "max sequence length exceeds the model's position embeddings"
            );
        }

        let weights = safetensors_files(ckpt_dir)?;
        debug!(files = weights.len(), dir = %ckpt_dir.display(), "mapping weights");
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&weights, options.dtype, &device) }
            .map_err(backend)?;
        let model = Llama::load(vb, &config).map_err(backend)?;

        let tokenizer = Tokenizer::from_file(tokenizer_path.as_ref()).map_err(tokenizer_error)?;
        let bos = config
            .bos_token_id
            .or_else(|| tokenizer.token_to_id(BOS_TOKEN))
            .ok_or_else(|| tokenizer_error("no BOS token"))?;
        let eos = match &config.eos_token_id {
            Some(LlamaEosToks::Single(id)) => vec![*id],
            Some(LlamaEosToks::Multiple(ids)) => ids.clone(),
            None => tokenizer.token_to_id(EOS_TOKEN).into_iter().collect(),
        };
        if eos.is_empty() {
            return Err(tokenizer_error("no EOS token"));
        }

        info!(
            dir = %ckpt_dir.display(),
            device = ?device,
            capacity = options.max_batch_size,
            max_seq_len = options.max_seq_len,
            "loaded llama engine"
        );
        Ok(Self {
            model,
            config,
            tokenizer,
            device,
            options,
            bos,
            eos,
            calls: AtomicU64::new(0),
        })
    }

    /// Sample up to `max_new` tokens after `prompt`, stopping at EOS.
    fn generate(
        &self,
        prompt: &[u32],
        max_new: usize,
        processor: &mut LogitsProcessor,
    ) -> Result<Vec<u32>, EngineError> {
        let mut cache = model::Cache::new(true, self.options.dtype, &self.config, &self.device)
            .map_err(backend)?;
        let mut context = prompt.to_vec();
        let mut generated = Vec::with_capacity(max_new);
        let mut index_pos = 0;

        for _ in 0..max_new {
            let input = Tensor::new(context.as_slice(), &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(backend)?;
            let logits = self
                .model
                .forward(&input, index_pos, &mut cache)
                .and_then(|l| l.squeeze(0))
                .map_err(backend)?;
            index_pos += context.len();

            let next = processor.sample(&logits).map_err(backend)?;
            if self.eos.contains(&next) {
                break;
            }
            generated.push(next);
            context = vec![next];
        }
        Ok(generated)
    }
}

#[async_trait]
impl InferenceEngine for LlamaEngine {
    fn capacity(&self) -> usize {
        self.options.max_batch_size
    }

    async fn chat_completion(
        &self,
        dialogs: &[Dialog],
        config: &GenerationConfig,
    ) -> Result<Vec<ChatPrediction>, EngineError> {
        let prompts = encode_batch(&self.tokenizer, self.bos, self.eos[0], dialogs, &self.options)?;

        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        let mut processor =
            LogitsProcessor::from_sampling(self.options.seed.wrapping_add(call), sampling(config));

        let mut predictions = Vec::with_capacity(prompts.len());
        for prompt in prompts {
            let Some(tokens) = prompt else {
                predictions.push(ChatPrediction::new(UNSAFE_ERROR));
                continue;
            };
            let budget = generation_budget(tokens.len(), self.options.max_seq_len, config.max_gen_len);
            let generated = self.generate(&tokens, budget, &mut processor)?;
            debug!(prompt_tokens = tokens.len(), generated = generated.len(), "generated reply");
            let text = self
                .tokenizer
                .decode(&generated, true)
                .map_err(tokenizer_error)?;
            predictions.push(ChatPrediction::new(text.trim()));
        }
        Ok(predictions)
    }
}

/// Tokenize a dialog in the Llama-2 chat format.
fn encode_dialog(
    tokenizer: &Tokenizer,
    bos: u32,
    eos: u32,
    dialog: &Dialog,
) -> Result<Vec<u32>, EngineError> {
    let mut tokens = vec![];
    for segment in format_dialog(dialog)? {
        tokens.push(bos);
        let encoding = tokenizer
            .encode(segment.text, false)
            .map_err(tokenizer_error)?;
        tokens.extend_from_slice(encoding.get_ids());
        if segment.eos {
            tokens.push(eos);
        }
    }
    Ok(tokens)
}

/// Tokenize a whole batch, checking every limit before any generation starts.
///
/// Dialogs carrying reserved chat tags are never tokenized and come back as
/// `None`; their reply is [`UNSAFE_ERROR`].
fn encode_batch(
    tokenizer: &Tokenizer,
    bos: u32,
    eos: u32,
    dialogs: &[Dialog],
    options: &EngineOptions,
) -> Result<Vec<Option<Vec<u32>>>, EngineError> {
    if dialogs.len() > options.max_batch_size {
        return Err(EngineError::BatchTooLarge {
            size: dialogs.len(),
            capacity: options.max_batch_size,
        });
    }

    let mut prompts = Vec::with_capacity(dialogs.len());
    for dialog in dialogs {
        if has_special_tags(dialog) {
            warn!("dialog contains reserved chat tags; not sent to the model");
            prompts.push(None);
            continue;
        }
        let tokens = encode_dialog(tokenizer, bos, eos, dialog)?;
        if tokens.len() > options.max_seq_len {
            return Err(EngineError::SequenceTooLong {
                prompt_tokens: tokens.len(),
                max_seq_len: options.max_seq_len,
            });
        }
        prompts.push(Some(tokens));
    }
    Ok(prompts)
}

fn sampling(config: &GenerationConfig) -> Sampling {
    let temperature = config.temperature;
    if temperature <= 0. {
        Sampling::ArgMax
    } else if config.top_p >= 1. {
        Sampling::All { temperature }
    } else {
        Sampling::TopP { p: config.top_p, temperature }
    }
}

/// Tokens left for generation once the prompt is placed in the window.
///
/// Without an explicit cap the generation may fill the rest of the window.
fn generation_budget(prompt_len: usize, max_seq_len: usize, max_gen_len: Option<usize>) -> usize {
    let max_gen_len = max_gen_len.unwrap_or(max_seq_len.saturating_sub(1));
    let total_len = max_seq_len.min(prompt_len + max_gen_len);
    total_len.saturating_sub(prompt_len)
}

fn safetensors_files(dir: &Path) -> Result<Vec<PathBuf>, EngineError> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        EngineError::Unavailable(format!("cannot read {}: {e}", dir.display()))
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "safetensors"))
        .collect();
    if files.is_empty() {
        return Err(EngineError::Unavailable(format!(
            "no .safetensors weights in {}",
            dir.display()
        )));
    }
    files.sort();
    Ok(files)
}
