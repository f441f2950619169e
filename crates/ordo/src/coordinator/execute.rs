//! Claim and batch loop. Both run on the coordinator's lane only.

use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ordo_core::{
    Checkpoint, CommandEnvelope, CommitOutcome, CommitOutcomeKind, CommitRequest, ContextRecord,
    EnvelopeKey, IssuerId, PlacementStrategy, StartOutcome, Ticket,
};

use crate::clock;
use crate::command::{CheckpointStore, Command, CommandError, Environment};
use crate::config::FailurePolicy;
use crate::lane::panic_message;
use crate::metrics;
use crate::oracle::Ownership;
use crate::store::{self, Decision, KeySpace, PartitionedStore, StoreError, StoreKey};

use super::books::BookSource;
use super::recovery::scan_backlog;
use super::stats::Counters;
use super::{Coordinator, CoordinatorError, CoordinatorState};

struct BatchPlan {
    source: BookSource,
    tickets: Vec<Ticket>,
    version: i64,
    placement: PlacementStrategy,
}

enum BatchEnd {
    Exhausted,
    Retry,
    Stop(String),
}

impl From<CoordinatorError> for BatchEnd {
    fn from(err: CoordinatorError) -> Self {
        if err.should_retry() {
            BatchEnd::Retry
        } else {
            BatchEnd::Stop(err.to_string())
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl<C: Command> Coordinator<C> {
    pub(super) fn claim(self: &Arc<Self>) {
        match self.services.oracle.ownership(&self.context_id) {
            Ownership::Owned => {}
            Ownership::NotOwned => return self.stop("not owned at start"),
            Ownership::InDoubt => return self.retry_later(CoordinatorState::Starting),
        }
        if let Err(err) = self.try_claim() {
            if err.should_retry() {
                tracing::warn!(context = %self.context_id, error = %err, "claim deferred");
                self.retry_later(CoordinatorState::Starting);
            } else {
                tracing::info!(context = %self.context_id, error = %err, "claim refused");
                self.stop("claim refused");
            }
        }
    }

    fn try_claim(self: &Arc<Self>) -> Result<(), CoordinatorError> {
        let ctx = &self.context_id;
        let store = self.services.store.as_ref();
        let key = StoreKey::Context(ctx.clone());
        let node = self.services.node;

        let claimed = store::update::<ContextRecord<C::Context>, _, _>(
            store,
            KeySpace::Contexts,
            &key,
            |record| match record {
                Some(record) => {
                    Decision::Write(Some((record.claim(node), record.config.clone())))
                }
                None => Decision::Keep(None),
            },
        )?;
        let Some((version, config)) = claimed else {
            return Err(CoordinatorError::ContextMissing {
                context: ctx.clone(),
            });
        };

        let generation = self.services.sequence.next(1)?.start;
        let issuer = IssuerId::configured(generation);
        let backlog = scan_backlog(store, ctx)?;

        let issuers = {
            let mut inner = self.lock();
            if inner.state.get().is_stopped() {
                return Ok(());
            }
            inner.books.reissue(issuer);
            for book in backlog {
                inner.books.adopt(book);
            }
            inner.placement = config.placement;
            inner.version_seen = Some(version);
            inner.batch_size = config
                .batch_size
                .unwrap_or(self.services.settings.batch_size)
                .max(1);
            inner.books.issuers()
        };

        // Marks of issuers with nothing left to recover can never matter again.
        let pruned = store::update::<ContextRecord<C::Context>, _, _>(
            store,
            KeySpace::Contexts,
            &key,
            |record| match record {
                Some(record) if record.version == version => {
                    let before = record.marks.len();
                    record.marks.retain_issuers(|issuer| issuers.contains(&issuer));
                    let removed = before - record.marks.len();
                    if removed == 0 {
                        Decision::Keep(0)
                    } else {
                        Decision::Write(removed)
                    }
                }
                _ => Decision::Keep(0),
            },
        );
        match pruned {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(context = %ctx, removed, "execution marks pruned"),
            Err(err) => tracing::warn!(context = %ctx, error = %err, "execution mark prune failed"),
        }

        let (next, recovered) = {
            let mut inner = self.lock();
            let next = if inner.books.has_visible_work() {
                CoordinatorState::Scheduled
            } else {
                CoordinatorState::Waiting
            };
            if !inner.state.set(next, ctx) {
                return Ok(());
            }
            (next, inner.books.recovered_len())
        };

        metrics::coordinator_started(ctx);
        tracing::info!(
            context = %ctx,
            version,
            issuer = %issuer,
            placement = %config.placement,
            recovered,
            "coordinator started"
        );
        if next == CoordinatorState::Scheduled {
            self.schedule(Duration::ZERO);
        }
        Ok(())
    }

    pub(super) fn run_batch(self: &Arc<Self>) {
        let ctx = &self.context_id;
        let started = Instant::now();

        let plan = {
            let mut inner = self.lock();
            if inner.state.get() != CoordinatorState::Scheduled {
                return;
            }
            let Some(version) = inner.version_seen else {
                return;
            };
            let Some(source) = inner.books.select() else {
                inner.state.set(CoordinatorState::Waiting, ctx);
                return;
            };
            inner.state.set(CoordinatorState::Executing, ctx);
            BatchPlan {
                source,
                tickets: inner.books.peek(source, inner.batch_size),
                version,
                placement: inner.placement,
            }
        };

        let span = tracing::info_span!(
            "batch",
            context = %ctx,
            source = ?plan.source,
            tickets = plan.tickets.len()
        );
        let _entered = span.enter();

        let mut batch = Counters::default();
        let mut done: u64 = 0;
        let mut end = BatchEnd::Exhausted;
        for ticket in &plan.tickets {
            match self.run_ticket(*ticket, &plan, &mut batch) {
                Ok(()) => done += 1,
                Err(err) => {
                    tracing::debug!(ticket = %ticket, error = %err, "batch interrupted");
                    end = err.into();
                    break;
                }
            }
        }
        batch.batches = 1;
        batch.last_batch_ms = millis(started.elapsed());
        metrics::batch_completed(ctx, usize::try_from(done).unwrap_or(usize::MAX));

        let retry = Duration::from_millis(self.services.settings.ownership_retry_ms);
        let reschedule = {
            let mut inner = self.lock();
            if let Err(err) = inner.books.consume(plan.source, done) {
                tracing::error!(error = %err, "ticket book out of step with batch");
            }
            inner.counters.absorb(&batch);
            if inner.state.get().is_stopped() {
                None
            } else {
                match &end {
                    BatchEnd::Exhausted if inner.books.has_visible_work() => {
                        inner.state.set(CoordinatorState::Scheduled, ctx);
                        Some(Duration::ZERO)
                    }
                    BatchEnd::Exhausted => {
                        inner.state.set(CoordinatorState::Waiting, ctx);
                        None
                    }
                    BatchEnd::Retry => {
                        inner.state.set(CoordinatorState::Scheduled, ctx);
                        Some(retry)
                    }
                    BatchEnd::Stop(_) => None,
                }
            }
        };

        tracing::debug!(done, elapsed_ms = batch.last_batch_ms, "batch finished");
        if let BatchEnd::Stop(reason) = &end {
            self.stop(reason);
        }
        if let Some(delay) = reschedule {
            if !delay.is_zero() {
                metrics::ownership_retry(ctx);
            }
            self.schedule(delay);
        }
    }

    /// Execute one ticket. `Ok` means the ticket is finished and may be
    /// consumed; `Err` leaves it at the front of its book.
    fn run_ticket(
        &self,
        ticket: Ticket,
        plan: &BatchPlan,
        batch: &mut Counters,
    ) -> Result<(), CoordinatorError> {
        let ctx = &self.context_id;
        let store = self.services.store.as_ref();

        if self.state().is_stopped() {
            return Err(CoordinatorError::Stopped {
                context: ctx.clone(),
            });
        }
        match self.services.oracle.ownership(ctx) {
            Ownership::Owned => {}
            Ownership::NotOwned => {
                return Err(CoordinatorError::OwnershipLost {
                    context: ctx.clone(),
                });
            }
            Ownership::InDoubt => {
                return Err(CoordinatorError::OwnershipInDoubt {
                    context: ctx.clone(),
                });
            }
        }

        let record_key = StoreKey::Context(ctx.clone());
        let record: ContextRecord<C::Context> =
            store::load(store, KeySpace::Contexts, &record_key)?.ok_or_else(|| {
                CoordinatorError::ContextMissing {
                    context: ctx.clone(),
                }
            })?;
        record.check_version(plan.version)?;

        let space = KeySpace::envelopes(PlacementStrategy::for_ticket(&ticket, plan.placement));
        let envelope_key = StoreKey::Envelope(EnvelopeKey::new(ctx.clone(), ticket));

        if record.marks.covers(&ticket) {
            // Already committed; only the envelope is left behind.
            let removed = store::update::<CommandEnvelope<C>, _, _>(
                store,
                space,
                &envelope_key,
                |envelope| match envelope {
                    Some(_) => Decision::Remove(()),
                    None => Decision::Keep(()),
                },
            );
            match removed {
                Ok(()) => {}
                Err(StoreError::Codec { .. }) => {
                    self.dead_letter_undecodable(space, &envelope_key)?;
                }
                Err(err) => return Err(err.into()),
            }
            batch.skipped += 1;
            metrics::command_skipped(ctx);
            tracing::debug!(ticket = %ticket, "already committed");
            return Ok(());
        }

        let started = match store::update::<CommandEnvelope<C>, _, _>(
            store,
            space,
            &envelope_key,
            |envelope| match envelope {
                None => Decision::Keep(None),
                Some(envelope) => {
                    let outcome = envelope.start();
                    let snapshot = envelope.clone();
                    if outcome == StartOutcome::Started {
                        Decision::Write(Some((outcome, snapshot)))
                    } else {
                        Decision::Keep(Some((outcome, snapshot)))
                    }
                }
            },
        ) {
            Ok(started) => started,
            Err(err @ StoreError::Codec { .. }) => {
                tracing::error!(ticket = %ticket, error = %err, "undecodable envelope");
                self.dead_letter_undecodable(space, &envelope_key)?;
                batch.skipped += 1;
                metrics::command_skipped(ctx);
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let Some((outcome, envelope)) = started else {
            tracing::trace!(ticket = %ticket, "no envelope");
            batch.skipped += 1;
            metrics::command_skipped(ctx);
            return Ok(());
        };
        match outcome {
            StartOutcome::Started | StartOutcome::Resumed => {}
            StartOutcome::Canceled => {
                store.remove(space, &envelope_key)?;
                batch.canceled += 1;
                metrics::command_canceled(ctx);
                tracing::debug!(ticket = %ticket, "canceled envelope dropped");
                return Ok(());
            }
            StartOutcome::Failed => {
                batch.skipped += 1;
                metrics::command_skipped(ctx);
                return Ok(());
            }
        }

        let recovering = plan.source == BookSource::Recovered || outcome == StartOutcome::Resumed;
        let checkpoints = EnvelopeCheckpoints::<C> {
            store,
            space,
            key: &envelope_key,
            _command: PhantomData,
        };
        let mut env = Environment::new(
            ctx,
            ticket,
            recovering,
            record.payload.clone(),
            &checkpoints,
        );

        let exec_started = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(|| envelope.command.execute(&mut env)))
            .unwrap_or_else(|panic| Err(CommandError::Panicked(panic_message(panic.as_ref()))));
        let execution = exec_started.elapsed();
        let waiting_ms = clock::now_ms().saturating_sub(envelope.queued_at_ms);
        let execution_ms = millis(execution);

        let (payload, kind, failure) = match result {
            Ok(()) => (
                env.into_changed_payload(),
                CommitOutcomeKind::Executed {
                    execution_ms,
                    waiting_ms,
                },
                None,
            ),
            Err(err) => {
                tracing::error!(ticket = %ticket, error = %err, recovering, "command failed");
                (
                    None,
                    CommitOutcomeKind::Failed {
                        execution_ms,
                        waiting_ms,
                    },
                    Some(err.to_string()),
                )
            }
        };

        let request = CommitRequest {
            ticket,
            payload,
            kind,
        };
        let committed = store::update::<ContextRecord<C::Context>, _, _>(
            store,
            KeySpace::Contexts,
            &record_key,
            |record| match record {
                None => Decision::Keep(Err(CoordinatorError::ContextMissing {
                    context: ctx.clone(),
                })),
                Some(record) => match record.apply_commit(plan.version, request.clone()) {
                    Ok(CommitOutcome::Committed) => Decision::Write(Ok(CommitOutcome::Committed)),
                    Ok(CommitOutcome::AlreadyCommitted) => {
                        Decision::Keep(Ok(CommitOutcome::AlreadyCommitted))
                    }
                    Err(mismatch) => Decision::Keep(Err(mismatch.into())),
                },
            },
        )??;

        if committed == CommitOutcome::AlreadyCommitted {
            store.remove(space, &envelope_key)?;
            batch.skipped += 1;
            metrics::command_skipped(ctx);
            return Ok(());
        }

        match failure {
            None => {
                batch.executed += 1;
                batch.total_execution_ms += execution_ms;
                batch.total_waiting_ms += waiting_ms;
                metrics::command_executed(ctx, execution, Duration::from_millis(waiting_ms));
                tracing::trace!(ticket = %ticket, execution_ms, "command executed");
                store.remove(space, &envelope_key)?;
            }
            Some(reason) => {
                batch.failed += 1;
                metrics::command_failed(ctx);
                self.dispose_failed(space, &envelope_key, envelope, reason)?;
            }
        }
        Ok(())
    }

    fn dispose_failed(
        &self,
        space: KeySpace,
        key: &StoreKey,
        envelope: CommandEnvelope<C>,
        reason: String,
    ) -> Result<(), StoreError> {
        let store = self.services.store.as_ref();
        match self.services.settings.failure_policy {
            FailurePolicy::DeadLetter => {
                // Reload so the dead letter carries the latest checkpoint.
                let mut envelope = store::load::<CommandEnvelope<C>>(store, space, key)?
                    .unwrap_or(envelope);
                envelope.fail(reason);
                store::insert(store, KeySpace::DeadLetters, key.clone(), &envelope)?;
                store.remove(space, key)?;
                tracing::warn!(ticket = %envelope.ticket(), "command dead-lettered");
            }
            FailurePolicy::Drop => {
                store.remove(space, key)?;
            }
        }
        Ok(())
    }

    /// Move an envelope that no longer decodes to the dead letters as raw
    /// bytes, whatever the failure policy.
    fn dead_letter_undecodable(&self, space: KeySpace, key: &StoreKey) -> Result<(), StoreError> {
        let store = self.services.store.as_ref();
        let Some(bytes) = store.get(space, key)? else {
            return Ok(());
        };
        store.put(KeySpace::DeadLetters, key.clone(), bytes)?;
        store.remove(space, key)?;
        tracing::warn!(space = %space, "undecodable envelope dead-lettered");
        Ok(())
    }
}

/// Checkpoints stored inside the envelope being executed.
struct EnvelopeCheckpoints<'a, C> {
    store: &'a dyn PartitionedStore,
    space: KeySpace,
    key: &'a StoreKey,
    _command: PhantomData<fn() -> C>,
}

impl<C: Command> CheckpointStore for EnvelopeCheckpoints<'_, C> {
    fn load(&self) -> Result<Option<Checkpoint>, StoreError> {
        Ok(
            store::load::<CommandEnvelope<C>>(self.store, self.space, self.key)?
                .and_then(|envelope| envelope.checkpoint),
        )
    }

    fn save(&self, checkpoint: Option<Checkpoint>) -> Result<(), StoreError> {
        store::update::<CommandEnvelope<C>, _, _>(self.store, self.space, self.key, |envelope| {
            match envelope {
                Some(envelope) => {
                    envelope.checkpoint = checkpoint.clone();
                    Decision::Write(())
                }
                None => Decision::Keep(()),
            }
        })
    }
}
