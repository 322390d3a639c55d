mod args;

use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;
use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use teppan::engine::candle::{EngineOptions, LlamaEngine};
use teppan::pipeline::prepare;
use teppan::{BatchScheduler, CsvConfig, EngineError, GenerationConfig, Pipeline, PromptBuilder};
use crate::args::Args;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // stdout is reserved for --dry-run output
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let stage = stage_of(&e);
            eprintln!("Error ({stage}): {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let csv = CsvConfig {
        delimiter: delimiter_byte(args.delimiter)?,
    };
    let prompts = match args.system_prompt {
        Some(system) => PromptBuilder::new().with_system_prompt(system),
        None => PromptBuilder::new(),
    };

    if args.dry_run {
        return dry_run(&args.input, &prompts, &csv);
    }

    let generation = GenerationConfig {
        temperature: args.temperature,
        top_p: args.top_p,
        max_gen_len: args.max_gen_len,
    };
    // fail on bad parameters before paying for the model load
    generation.validate()?;
    check_engine_limits(args.max_batch_size, args.max_seq_len)?;

    let (Some(output), Some(ckpt_dir), Some(tokenizer_path)) =
        (args.output, args.ckpt_dir, args.tokenizer_path)
    else {
        bail!("--output, --ckpt-dir and --tokenizer-path are required unless --dry-run is set");
    };

    let options = EngineOptions {
        max_seq_len: args.max_seq_len,
        max_batch_size: args.max_batch_size,
        dtype: args.dtype.into(),
        seed: args.seed.unwrap_or_else(rand::random),
    };
    info!(seed = options.seed, dtype = ?options.dtype, "loading model");
    let engine = LlamaEngine::load(&ckpt_dir, &tokenizer_path, options)
        .with_context(|| format!("loading model from {}", ckpt_dir.display()))?;

    let pipeline = Pipeline::new(BatchScheduler::new(engine, generation)?)
        .with_prompt_builder(prompts)
        .with_csv_config(csv);
    let summary = pipeline.run(&args.input, &output).await?;

    info!(
        run_id = %summary.run_id,
        rows = summary.rows,
        batches = summary.batches,
        output = %output.display(),
        "done"
    );
    Ok(())
}

/// Name of the stage a failed run is reported under.
fn stage_of(e: &anyhow::Error) -> &'static str {
    if let Some(err) = e.downcast_ref::<teppan::Error>() {
        err.stage()
    } else if e.downcast_ref::<EngineError>().is_some() {
        "engine"
    } else {
        "setup"
    }
}

fn check_engine_limits(max_batch_size: usize, max_seq_len: usize) -> teppan::Result<()> {
    if max_batch_size == 0 {
        return Err(teppan::Error::Config("max batch size must be at least 1".to_string()));
    }
    if max_seq_len == 0 {
        return Err(teppan::Error::Config("max sequence length must be at least 1".to_string()));
    }
    Ok(())
}

fn dry_run(input: &Path, prompts: &PromptBuilder, csv: &CsvConfig) -> anyhow::Result<()> {
    let mut stdout = io::stdout().lock();
    let count = dry_run_to(&mut stdout, input, prompts, csv)?;
    info!(prompts = count, "dry run complete");
    Ok(())
}

/// Write one JSON line per prompt unit, in input order.
fn dry_run_to<W: Write>(
    out: &mut W,
    input: &Path,
    prompts: &PromptBuilder,
    csv: &CsvConfig,
) -> anyhow::Result<usize> {
    let units = prepare(input, prompts, csv)?;
    for unit in &units {
        serde_json::to_writer(&mut *out, unit)?;
        writeln!(out)?;
    }
    out.flush()?;
    Ok(units.len())
}

fn delimiter_byte(delimiter: char) -> anyhow::Result<u8> {
    if !delimiter.is_ascii() {
        bail!("delimiter must be a single ASCII character, got {delimiter:?}");
    }
    Ok(delimiter as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    const TABLE: &str = "id,architecture,code,performance,task\n\
        b,x86,\"fn f() {}\",slow,Explain\n\
        a,arm,loop,fast,Optimize\n";

    fn table() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TABLE.as_bytes()).unwrap();
        file
    }

    fn json_lines(out: &[u8]) -> Vec<Value> {
        std::str::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_dry_run_lines() {
        let input = table();
        let mut out = Vec::new();
        let count = dry_run_to(&mut out, input.path(), &PromptBuilder::new(), &CsvConfig::default()).unwrap();

        let lines = json_lines(&out);
        assert_eq!(count, 2);
        assert_eq!(lines.len(), 2);
        // file order, not id order
        assert_eq!(lines[0]["id"], "b");
        assert_eq!(lines[1]["id"], "a");
        assert_eq!(lines[0]["messages"][0]["role"], "user");
        let content = lines[0]["messages"][0]["content"].as_str().unwrap();
        assert!(content.starts_with("Architecture:\nx86\n"));
        assert!(content.contains("fn f() {}"));
    }

    #[test]
    fn test_dry_run_with_system_prompt() {
        let input = table();
        let prompts = PromptBuilder::new().with_system_prompt("Be brief.");
        let mut out = Vec::new();
        dry_run_to(&mut out, input.path(), &prompts, &CsvConfig::default()).unwrap();

        for line in json_lines(&out) {
            assert_eq!(line["messages"][0]["role"], "system");
            assert_eq!(line["messages"][0]["content"], "Be brief.");
            assert_eq!(line["messages"][1]["role"], "user");
        }
    }

    #[test]
    fn test_dry_run_bad_table_writes_nothing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"id,code\na,c\n").unwrap();
        let mut out = Vec::new();
        let err = dry_run_to(&mut out, file.path(), &PromptBuilder::new(), &CsvConfig::default()).unwrap_err();

        assert!(out.is_empty());
        assert_eq!(stage_of(&err), "load");
    }

    #[test]
    fn test_engine_limits() {
        assert!(check_engine_limits(8, 512).is_ok());
        let err = check_engine_limits(0, 512).unwrap_err();
        assert_eq!(err.stage(), "config");
        assert!(check_engine_limits(8, 0).is_err());
    }

    #[test]
    fn test_stage_of() {
        let err = anyhow::Error::from(EngineError::Unavailable("no weights".to_string()))
            .context("loading model from /models/llama");
        assert_eq!(stage_of(&err), "engine");

        let err = anyhow::Error::from(teppan::Error::Config("bad".to_string()));
        assert_eq!(stage_of(&err), "config");

        assert_eq!(stage_of(&anyhow::anyhow!("no runtime")), "setup");
    }

    #[test]
    fn test_delimiter_byte() {
        assert_eq!(delimiter_byte(',').unwrap(), b',');
        assert_eq!(delimiter_byte('\t').unwrap(), b'\t');
        assert!(delimiter_byte('§').is_err());
    }
}
