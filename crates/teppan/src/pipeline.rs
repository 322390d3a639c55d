//! # Batch Run
//!
//! Wires the stages together: rows are loaded, rendered to prompt units,
//! scheduled through the engine batch by batch, correlated back to their
//! identifiers and finally written out. The output table is only written
//! once every batch has been answered; any failure aborts the run before
//! that point.

use std::path::Path;
use std::pin::pin;
use futures::TryStreamExt;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;
use crate::batch::{BatchScheduler, Batches};
use crate::correlate::{Correlator, OutputRecord};
use crate::engine::InferenceEngine;
use crate::error::{Error, Result};
use crate::prompt::{PromptBuilder, PromptUnit};
use crate::row::{load_rows, CsvConfig};
use crate::writer::write_results;

/// Counts reported at the end of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub rows: usize,
    pub batches: usize,
    pub records: usize,
}

/// Load the input table and render every row, without touching an engine.
pub fn prepare(
    input: impl AsRef<Path>,
    prompts: &PromptBuilder,
    csv: &CsvConfig,
) -> Result<Vec<PromptUnit>> {
    let rows = load_rows(input, csv)?;
    Ok(prompts.build_all(&rows)?)
}

/// Drive every unit through the scheduler and correlate the replies.
pub async fn generate<E>(scheduler: &BatchScheduler<E>, units: &[PromptUnit]) -> Result<Vec<OutputRecord>>
where E: InferenceEngine + Sync
{
    let mut correlator = Correlator::with_capacity(units.len());
    let mut completed = pin!(scheduler.run(units));
    while let Some(done) = completed.try_next().await? {
        correlator.push(&done.batch, done.predictions)?;
    }
    Ok(correlator.into_records())
}

/// A configured run: the scheduler (and its engine) plus table and prompt settings.
pub struct Pipeline<E> {
    scheduler: BatchScheduler<E>,
    prompts: PromptBuilder,
    csv: CsvConfig,
}

impl<E> Pipeline<E>
where E: InferenceEngine + Sync
{
    pub fn new(scheduler: BatchScheduler<E>) -> Self {
        Self {
            scheduler,
            prompts: PromptBuilder::default(),
            csv: CsvConfig::default(),
        }
    }

    pub fn with_prompt_builder(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_csv_config(mut self, csv: CsvConfig) -> Self {
        self.csv = csv;
        self
    }

    pub fn scheduler(&self) -> &BatchScheduler<E> {
        &self.scheduler
    }

    /// Run every row of `input` through the engine and write `output`.
    pub async fn run(&self, input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let input = input.as_ref();
        let output = output.as_ref();
        async move {
            let units = prepare(input, &self.prompts, &self.csv)?;
            let batches = Batches::new(units.len(), self.scheduler.capacity()).batch_count();
            info!(
                rows = units.len(),
                batches,
                capacity = self.scheduler.capacity().get(),
                input = %input.display(),
                "starting batch run"
            );

            let records = generate(&self.scheduler, &units).await?;
            write_results(output, &records, &self.csv)?;
            info!(records = records.len(), output = %output.display(), "run complete");

            Ok::<_, Error>(RunSummary {
                run_id,
                rows: units.len(),
                batches,
                records: records.len(),
            })
        }
        .instrument(info_span!("run", %run_id))
        .await
    }
}
