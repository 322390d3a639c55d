//! # Batch Scheduler
//!
//! Splits the ordered prompt units of a run into contiguous batches no larger
//! than the engine's capacity and drives them through the engine one at a
//! time.
//!
//! Batch `i` of a run with `N` units and capacity `C` is the window
//! `[i * C, min(i * C + C, N))`. Every window but the last holds exactly `C`
//! units, and together they cover `0..N` once, in order. Results therefore
//! come back in row order as long as each batch is answered in order.

use std::num::NonZeroUsize;
use std::ops::Range;
use futures::stream::{self, Stream, StreamExt};
use tracing::{debug, info};
use crate::config::GenerationConfig;
use crate::engine::{ChatPrediction, InferenceEngine};
use crate::error::{Error, Result};
use crate::prompt::{Dialog, PromptUnit};

/// Lazy partition of `0..len` into windows of at most `capacity` indices.
#[derive(Debug, Clone)]
pub struct Batches {
    len: usize,
    capacity: usize,
    next: usize,
}

impl Batches {
    pub fn new(len: usize, capacity: NonZeroUsize) -> Self {
        Self {
            len,
            capacity: capacity.get(),
            next: 0,
        }
    }

    /// Total number of windows, `ceil(len / capacity)`
    pub fn batch_count(&self) -> usize {
        self.len.div_ceil(self.capacity)
    }
}

impl Iterator for Batches {
    type Item = Range<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.batch_count() {
            return None;
        }
        let start = self.next * self.capacity;
        let end = start.saturating_add(self.capacity).min(self.len);
        self.next += 1;
        Some(start..end)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.batch_count() - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Batches {}

/// A contiguous window of the run's prompt units.
#[derive(Debug, Clone)]
pub struct Batch<'a> {
    index: usize,
    range: Range<usize>,
    units: &'a [PromptUnit],
}

impl<'a> Batch<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Position of this window in the full unit sequence
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    pub fn units(&self) -> &'a [PromptUnit] {
        self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// The units stripped to what the engine consumes
    pub fn dialogs(&self) -> Vec<Dialog> {
        self.units.iter().map(|u| u.messages().to_vec()).collect()
    }
}

/// Partition `units` into batches of at most `capacity`.
pub fn partition(units: &[PromptUnit], capacity: NonZeroUsize) -> impl Iterator<Item = Batch<'_>> {
    Batches::new(units.len(), capacity)
        .enumerate()
        .map(move |(index, range)| Batch {
            index,
            units: &units[range.clone()],
            range,
        })
}

/// A batch together with the engine's replies to it.
#[derive(Debug)]
pub struct CompletedBatch<'a> {
    pub batch: Batch<'a>,
    pub predictions: Vec<ChatPrediction>,
}

/// Owns the engine for a run and feeds it batches sequentially.
pub struct BatchScheduler<E> {
    engine: E,
    config: GenerationConfig,
    capacity: NonZeroUsize,
}

impl<E> BatchScheduler<E>
where E: InferenceEngine + Sync
{
    /// Creates a scheduler whose batch size is the engine's declared capacity.
    pub fn new(engine: E, config: GenerationConfig) -> Result<Self> {
        config.validate()?;
        let capacity = NonZeroUsize::new(engine.capacity())
            .ok_or_else(|| Error::Config("engine capacity must be at least 1".to_string()))?;
        Ok(Self {
            engine,
            config,
            capacity,
        })
    }

    pub fn capacity(&self) -> NonZeroUsize {
        self.capacity
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Submit one batch and wait for all of its replies.
    pub async fn submit(&self, batch: &Batch<'_>) -> Result<Vec<ChatPrediction>> {
        let range = batch.range();
        debug!(batch = batch.index(), start = range.start, end = range.end, "submitting batch");
        let dialogs = batch.dialogs();
        self.engine
            .chat_completion(&dialogs, &self.config)
            .await
            .map_err(|source| Error::Engine {
                batch: batch.index(),
                source,
            })
    }

    /// Lazily submit every batch of `units`, in order.
    ///
    /// Nothing is sent to the engine until the stream is polled, and batch
    /// `i + 1` is only submitted after batch `i` has been answered. Stop
    /// polling after the first error to abort the run.
    pub fn run<'a>(
        &'a self,
        units: &'a [PromptUnit],
    ) -> impl Stream<Item = Result<CompletedBatch<'a>>> + 'a {
        let total = Batches::new(units.len(), self.capacity).batch_count();
        stream::iter(partition(units, self.capacity)).then(move |batch| async move {
            let predictions = self.submit(&batch).await?;
            info!(batch = batch.index() + 1, of = total, size = batch.len(), "batch complete");
            Ok::<_, Error>(CompletedBatch { batch, predictions })
        })
    }
}
