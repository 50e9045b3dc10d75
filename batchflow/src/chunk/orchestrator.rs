//! The chunk processing loop with fault isolation.
//!
//! Each iteration opens a transaction, fills a chunk from the source,
//! transforms it and writes the surviving outputs as one unit. Read failures
//! are retried or skipped in place while the chunk fills. A transform or write
//! failure rolls the chunk back and switches that chunk to one transaction
//! per item, so the offending item can be retried, skipped or reported
//! without blocking its siblings. The next chunk is processed normally again.

use super::{Chunk, ChunkItem, ChunkState};
use crate::core::{Phase, StepExecutionStats};
use crate::errors::{Failure, StepFailure};
use crate::events::{EventSink, EventType, NoOpEventSink};
use crate::items::{ItemSink, ItemSource, ItemTransformer, NoOpTransactionManager, TransactionManager};
use crate::policy::{ClassifiedFailure, FaultTolerance, RetryContext};
use serde_json::json;
use tracing::{debug, error, trace, warn};

static NO_TRANSACTIONS: NoOpTransactionManager = NoOpTransactionManager;
static NO_EVENTS: NoOpEventSink = NoOpEventSink;

/// Outcome of the chunk-level transform pass for one item.
#[derive(Debug, Clone, Copy)]
enum Slot {
    /// Not transformed yet.
    Pending,
    /// The transformer filtered the item out.
    Filtered,
    /// Index of the item's output in the chunk's output list.
    Kept(usize),
}

/// A chunk-level failure attributed to one item.
///
/// It counts as that item's first attempt when the item is isolated.
#[derive(Debug)]
struct Seed {
    index: usize,
    phase: Phase,
    failure: ClassifiedFailure,
}

/// Drives one step's read-transform-write loop.
///
/// The orchestrator borrows its collaborators for the duration of a run and
/// is the only writer of the step statistics passed to [`ChunkOrchestrator::run`].
pub struct ChunkOrchestrator<'a, I, O>
where
    I: Send + Sync,
    O: Send + Sync,
{
    step_name: &'a str,
    chunk_size: usize,
    policies: &'a FaultTolerance,
    source: &'a mut (dyn ItemSource<I> + 'a),
    transformer: &'a (dyn ItemTransformer<I, O> + 'a),
    sink: &'a (dyn ItemSink<O> + 'a),
    transactions: &'a (dyn TransactionManager + 'a),
    events: &'a (dyn EventSink + 'a),
    next_ordinal: u64,
    state: ChunkState,
}

impl<'a, I, O> ChunkOrchestrator<'a, I, O>
where
    I: Send + Sync,
    O: Send + Sync,
{
    /// Creates an orchestrator without transactions or events.
    ///
    /// A `chunk_size` of zero is treated as one.
    pub fn new(
        step_name: &'a str,
        chunk_size: usize,
        policies: &'a FaultTolerance,
        source: &'a mut (dyn ItemSource<I> + 'a),
        transformer: &'a (dyn ItemTransformer<I, O> + 'a),
        sink: &'a (dyn ItemSink<O> + 'a),
    ) -> Self {
        Self {
            step_name,
            chunk_size: chunk_size.max(1),
            policies,
            source,
            transformer,
            sink,
            transactions: &NO_TRANSACTIONS,
            events: &NO_EVENTS,
            next_ordinal: 1,
            state: ChunkState::default(),
        }
    }

    /// Sets the transaction manager.
    #[must_use]
    pub fn with_transactions(mut self, transactions: &'a (dyn TransactionManager + 'a)) -> Self {
        self.transactions = transactions;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: &'a (dyn EventSink + 'a)) -> Self {
        self.events = events;
        self
    }

    /// Returns the state of the current chunk.
    #[must_use]
    pub fn state(&self) -> ChunkState {
        self.state
    }

    /// Processes chunks until the source is exhausted.
    ///
    /// Returns the failure that terminated the step, if any. Counters in
    /// `stats` reflect all work done up to that point either way.
    pub async fn run(&mut self, stats: &mut StepExecutionStats) -> Result<(), StepFailure> {
        loop {
            self.transition(ChunkState::Reading);
            self.begin_chunk(stats).await?;

            let chunk = match self.read_chunk(stats).await {
                Ok(chunk) => chunk,
                Err(failure) => {
                    self.rollback(stats).await;
                    self.transition(ChunkState::Failed);
                    return Err(failure);
                }
            };

            if chunk.is_empty() {
                return self.commit_empty(stats).await;
            }

            let is_final = chunk.is_final();
            self.process_chunk(chunk, stats).await?;
            if is_final {
                return Ok(());
            }
        }
    }

    fn transition(&mut self, next: ChunkState) {
        trace!(step = self.step_name, from = %self.state, to = %next, "Chunk state change");
        self.state = next;
    }

    fn classify(&self, error: Failure) -> ClassifiedFailure {
        self.policies.classifier.classify(error)
    }

    fn open_context(&self) -> RetryContext {
        self.policies.retry_policy.open()
    }

    async fn begin_chunk(&mut self, stats: &mut StepExecutionStats) -> Result<(), StepFailure> {
        let mut context = self.open_context();
        loop {
            match self.transactions.begin().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    let failure = self.classify(e);
                    context.register_failure(failure.kind());
                    if let Err(failure) = self
                        .await_retry(&mut context, failure, Phase::Write, None, stats)
                        .await
                    {
                        error!(
                            step = self.step_name,
                            error = %failure.message(),
                            "Could not open a transaction"
                        );
                        return Err(StepFailure::new(Phase::Write, None, failure));
                    }
                }
            }
        }
    }

    async fn commit_empty(&mut self, stats: &mut StepExecutionStats) -> Result<(), StepFailure> {
        if let Err(e) = self.transactions.commit().await {
            let failure = self.classify(e);
            self.rollback(stats).await;
            self.transition(ChunkState::Failed);
            return Err(StepFailure::new(Phase::Write, None, failure));
        }
        self.transition(ChunkState::Committed);
        Ok(())
    }

    async fn read_chunk(&mut self, stats: &mut StepExecutionStats) -> Result<Chunk<I>, StepFailure> {
        let mut chunk = Chunk::with_capacity(self.chunk_size);
        while chunk.len() < self.chunk_size {
            match self.read_item(stats).await? {
                Some(item) => chunk.push(item),
                None => {
                    chunk.mark_final();
                    break;
                }
            }
        }
        Ok(chunk)
    }

    async fn read_item(
        &mut self,
        stats: &mut StepExecutionStats,
    ) -> Result<Option<ChunkItem<I>>, StepFailure> {
        let mut context = self.open_context();
        loop {
            let ordinal = self.next_ordinal;
            match self.source.read().await {
                Ok(Some(item)) => {
                    self.next_ordinal += 1;
                    stats.read_count += 1;
                    return Ok(Some(ChunkItem::new(ordinal, item)));
                }
                Ok(None) => return Ok(None),
                Err(e) => {
                    let failure = self.classify(e);
                    context.register_failure(failure.kind());
                    if let Err(failure) = self
                        .await_retry(&mut context, failure, Phase::Read, Some(ordinal), stats)
                        .await
                    {
                        self.next_ordinal += 1;
                        self.skip_or_fail(Phase::Read, Some(ordinal), failure, stats)
                            .await?;
                        context = self.open_context();
                    }
                }
            }
        }
    }

    /// Transforms and writes one chunk, isolating its items on failure.
    ///
    /// A transform failure counts as the failing item's first attempt. A failed
    /// chunk write counts toward an item's attempts only when that item was the
    /// chunk's sole output; otherwise every item gets its full budget in
    /// isolation.
    async fn process_chunk(
        &mut self,
        chunk: Chunk<I>,
        stats: &mut StepExecutionStats,
    ) -> Result<(), StepFailure> {
        self.transition(ChunkState::Transforming);
        let mut slots = Vec::with_capacity(chunk.len());
        let mut outputs = Vec::with_capacity(chunk.len());
        let mut seed = None;

        for entry in chunk.items() {
            match self.transformer.transform(&entry.item).await {
                Ok(Some(output)) => {
                    slots.push(Slot::Kept(outputs.len()));
                    outputs.push(output);
                }
                Ok(None) => slots.push(Slot::Filtered),
                Err(e) => {
                    let failure = self.classify(e);
                    debug!(
                        step = self.step_name,
                        ordinal = entry.ordinal,
                        error = %failure.message(),
                        "Transform failed during chunk pass"
                    );
                    seed = Some(Seed {
                        index: slots.len(),
                        phase: Phase::Process,
                        failure,
                    });
                    break;
                }
            }
        }

        if seed.is_none() {
            self.transition(ChunkState::Writing);
            match self.write_chunk(&outputs).await {
                Ok(()) => {
                    self.record_chunk_commit(&chunk, &slots, outputs.len(), stats)
                        .await;
                    return Ok(());
                }
                Err(e) => {
                    let failure = self.classify(e);
                    warn!(
                        step = self.step_name,
                        items = outputs.len(),
                        kind = %failure.kind(),
                        error = %failure.message(),
                        "Chunk write failed"
                    );
                    if outputs.len() == 1 {
                        let index = slots.iter().position(|s| matches!(s, Slot::Kept(_)));
                        seed = index.map(|index| Seed {
                            index,
                            phase: Phase::Write,
                            failure,
                        });
                    }
                }
            }
        }

        self.rollback(stats).await;
        self.transition(ChunkState::RolledBack);
        let range = chunk.ordinal_range();
        self.events
            .emit(
                EventType::ChunkRolledBack,
                json!({
                    "step": self.step_name,
                    "items": chunk.len(),
                    "first_ordinal": range.map(|r| r.0),
                    "last_ordinal": range.map(|r| r.1),
                }),
            )
            .await;

        self.transition(ChunkState::Isolating);
        self.events
            .emit(
                EventType::ChunkIsolating,
                json!({ "step": self.step_name, "items": chunk.len() }),
            )
            .await;

        let result = self.isolate(chunk, &slots, outputs, seed, stats).await;
        self.transition(if result.is_ok() {
            ChunkState::Resumed
        } else {
            ChunkState::Failed
        });
        result
    }

    async fn write_chunk(&mut self, outputs: &[O]) -> Result<(), Failure> {
        if !outputs.is_empty() {
            self.sink.write(outputs).await?;
        }
        self.transactions.commit().await
    }

    async fn record_chunk_commit(
        &mut self,
        chunk: &Chunk<I>,
        slots: &[Slot],
        written: usize,
        stats: &mut StepExecutionStats,
    ) {
        let filtered = slots.iter().filter(|s| matches!(s, Slot::Filtered)).count();
        stats.filter_count += filtered as u64;
        stats.write_count += written as u64;
        stats.commit_count += 1;
        self.transition(ChunkState::Committed);

        debug!(
            step = self.step_name,
            items = chunk.len(),
            written,
            filtered,
            "Chunk committed"
        );
        let range = chunk.ordinal_range();
        self.events
            .emit(
                EventType::ChunkCommitted,
                json!({
                    "step": self.step_name,
                    "items": chunk.len(),
                    "written": written,
                    "filtered": filtered,
                    "first_ordinal": range.map(|r| r.0),
                    "last_ordinal": range.map(|r| r.1),
                }),
            )
            .await;
    }

    /// Reprocesses a rolled-back chunk one item per transaction.
    ///
    /// An item whose transform already failed during the chunk pass is settled
    /// first, so a fatal verdict fails the step before any of its siblings is
    /// committed.
    async fn isolate(
        &mut self,
        chunk: Chunk<I>,
        slots: &[Slot],
        outputs: Vec<O>,
        seed: Option<Seed>,
        stats: &mut StepExecutionStats,
    ) -> Result<(), StepFailure> {
        let items = chunk.into_items();
        let (transform_seed, mut seed) = match seed {
            Some(s) if s.phase == Phase::Process => (Some(s), None),
            other => (None, other),
        };

        // The failed transform is the first pending slot.
        let mut settled = None;
        if let Some(s) = transform_seed {
            if let Some(entry) = items.get(s.index) {
                let ordinal = entry.ordinal;
                match self.transform_item(entry, Some(s), stats).await {
                    Err(failure)
                        if !self
                            .policies
                            .skip_policy
                            .should_skip(&failure, stats.skip_count()) =>
                    {
                        return self
                            .skip_or_fail(Phase::Process, Some(ordinal), failure, stats)
                            .await;
                    }
                    outcome => settled = Some(outcome),
                }
            }
        }

        let mut kept = outputs.into_iter();
        for (index, entry) in items.into_iter().enumerate() {
            let mut item_seed = if seed.as_ref().is_some_and(|s| s.index == index) {
                seed.take()
            } else {
                None
            };

            let output = match slots.get(index).copied().unwrap_or(Slot::Pending) {
                Slot::Filtered => {
                    stats.filter_count += 1;
                    continue;
                }
                Slot::Kept(_) => kept.next(),
                Slot::Pending => {
                    let outcome = match settled.take() {
                        Some(outcome) => outcome,
                        None => self.transform_item(&entry, item_seed.take(), stats).await,
                    };
                    match outcome {
                        Ok(Some(output)) => Some(output),
                        Ok(None) => {
                            stats.filter_count += 1;
                            continue;
                        }
                        Err(failure) => {
                            self.skip_or_fail(Phase::Process, Some(entry.ordinal), failure, stats)
                                .await?;
                            continue;
                        }
                    }
                }
            };
            let Some(output) = output else {
                continue;
            };

            match self.write_item(entry.ordinal, &output, item_seed, stats).await {
                Ok(()) => {
                    stats.write_count += 1;
                    stats.commit_count += 1;
                    self.events
                        .emit(
                            EventType::ChunkCommitted,
                            json!({
                                "step": self.step_name,
                                "items": 1,
                                "written": 1,
                                "filtered": 0,
                                "first_ordinal": entry.ordinal,
                                "last_ordinal": entry.ordinal,
                                "isolated": true,
                            }),
                        )
                        .await;
                }
                Err(failure) => {
                    self.skip_or_fail(Phase::Write, Some(entry.ordinal), failure, stats)
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn transform_item(
        &mut self,
        entry: &ChunkItem<I>,
        seed: Option<Seed>,
        stats: &mut StepExecutionStats,
    ) -> Result<Option<O>, ClassifiedFailure> {
        let mut context = self.open_context();
        let mut pending = seed.map(|s| s.failure);
        loop {
            if let Some(failure) = pending.take() {
                context.register_failure(failure.kind());
                self.await_retry(&mut context, failure, Phase::Process, Some(entry.ordinal), stats)
                    .await?;
            }
            match self.transformer.transform(&entry.item).await {
                Ok(output) => return Ok(output),
                Err(e) => pending = Some(self.classify(e)),
            }
        }
    }

    async fn write_item(
        &mut self,
        ordinal: u64,
        output: &O,
        seed: Option<Seed>,
        stats: &mut StepExecutionStats,
    ) -> Result<(), ClassifiedFailure> {
        let mut context = self.open_context();
        let mut pending = seed.map(|s| s.failure);
        loop {
            if let Some(failure) = pending.take() {
                context.register_failure(failure.kind());
                self.await_retry(&mut context, failure, Phase::Write, Some(ordinal), stats)
                    .await?;
            }
            match self.write_in_transaction(std::slice::from_ref(output), stats).await {
                Ok(()) => return Ok(()),
                Err(e) => pending = Some(self.classify(e)),
            }
        }
    }

    async fn write_in_transaction(
        &mut self,
        items: &[O],
        stats: &mut StepExecutionStats,
    ) -> Result<(), Failure> {
        self.transactions.begin().await?;
        let result = match self.sink.write(items).await {
            Ok(()) => self.transactions.commit().await,
            Err(e) => Err(e),
        };
        if result.is_err() {
            self.rollback(stats).await;
        }
        result
    }

    async fn rollback(&mut self, stats: &mut StepExecutionStats) {
        stats.rollback_count += 1;
        if let Err(e) = self.transactions.rollback().await {
            warn!(step = self.step_name, error = %e, "Rollback failed");
        }
    }

    /// Waits before the next attempt, or hands the failure back once the
    /// retry budget is spent.
    async fn await_retry(
        &mut self,
        context: &mut RetryContext,
        failure: ClassifiedFailure,
        phase: Phase,
        ordinal: Option<u64>,
        stats: &mut StepExecutionStats,
    ) -> Result<(), ClassifiedFailure> {
        let policy = &self.policies.retry_policy;
        if !policy.can_retry_context(context) {
            if context.attempts() > 1 {
                warn!(
                    step = self.step_name,
                    %phase,
                    ordinal,
                    attempts = context.attempts(),
                    kind = %failure.kind(),
                    "Retry limit exhausted"
                );
            }
            return Err(failure.exhausted());
        }

        stats.retry_count += 1;
        let delay = policy.backoff_delay(context);
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        warn!(
            step = self.step_name,
            %phase,
            ordinal,
            attempt = context.attempts() + 1,
            delay_ms,
            kind = %failure.kind(),
            error = %failure.message(),
            "Retrying after failure"
        );
        self.events
            .emit(
                EventType::ItemRetry,
                json!({
                    "step": self.step_name,
                    "phase": phase.to_string(),
                    "ordinal": ordinal,
                    "attempt": context.attempts() + 1,
                    "kind": failure.kind().to_string(),
                    "error": failure.message(),
                }),
            )
            .await;

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn skip_or_fail(
        &mut self,
        phase: Phase,
        ordinal: Option<u64>,
        failure: ClassifiedFailure,
        stats: &mut StepExecutionStats,
    ) -> Result<(), StepFailure> {
        let skip_policy = &self.policies.skip_policy;
        let skip_count = stats.skip_count();

        if skip_policy.should_skip(&failure, skip_count) {
            stats.record_skip(phase);
            warn!(
                step = self.step_name,
                %phase,
                ordinal,
                kind = %failure.kind(),
                skip_count = stats.skip_count(),
                skip_limit = skip_policy.skip_limit(),
                error = %failure.message(),
                "Skipping item"
            );
            self.events
                .emit(
                    EventType::ItemSkipped,
                    json!({
                        "step": self.step_name,
                        "phase": phase.to_string(),
                        "ordinal": ordinal,
                        "kind": failure.kind().to_string(),
                        "error": failure.message(),
                    }),
                )
                .await;
            return Ok(());
        }

        error!(
            step = self.step_name,
            %phase,
            ordinal,
            kind = %failure.kind(),
            skip_count,
            skip_limit = skip_policy.skip_limit(),
            error = %failure.message(),
            "Item failure cannot be skipped"
        );
        Err(StepFailure::new(phase, ordinal, failure))
    }
}
