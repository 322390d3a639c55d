//! # Result Correlator
//!
//! Engines answer positionally: reply `k` of a call belongs to dialog `k` of
//! that call. The correlator zips each completed batch back onto the
//! identifiers of its prompt units and appends the pairs to one running
//! sequence, in batch order.

use serde::Serialize;
use tracing::trace;
use crate::batch::Batch;
use crate::engine::ChatPrediction;
use crate::error::CorrelationError;

/// A row identifier with the text generated for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputRecord {
    pub id: String,
    pub result: String,
}

#[derive(Debug, Default)]
pub struct Correlator {
    records: Vec<OutputRecord>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(rows: usize) -> Self {
        Self {
            records: Vec::with_capacity(rows),
        }
    }

    /// Pair every unit of `batch` with the prediction at the same position.
    ///
    /// A count mismatch means the engine broke its contract and nothing is
    /// paired.
    pub fn correlate(
        batch: &Batch<'_>,
        predictions: Vec<ChatPrediction>,
    ) -> Result<Vec<OutputRecord>, CorrelationError> {
        if batch.len() != predictions.len() {
            return Err(CorrelationError {
                batch: batch.index(),
                expected: batch.len(),
                actual: predictions.len(),
            });
        }
        Ok(batch
            .units()
            .iter()
            .zip(predictions)
            .map(|(unit, prediction)| OutputRecord {
                id: unit.id().to_string(),
                result: prediction.generation.content,
            })
            .collect())
    }

    /// Correlate `batch` and append its records after those already held.
    pub fn push(
        &mut self,
        batch: &Batch<'_>,
        predictions: Vec<ChatPrediction>,
    ) -> Result<(), CorrelationError> {
        let records = Self::correlate(batch, predictions)?;
        trace!(batch = batch.index(), records = records.len(), "correlated batch");
        self.records.extend(records);
        Ok(())
    }

    pub fn records(&self) -> &[OutputRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<OutputRecord> {
        self.records
    }
}
