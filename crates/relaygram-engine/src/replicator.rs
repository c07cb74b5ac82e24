use std::time::Duration;

use relaygram_core::{aggregate, ChatId, MessageId, Progress, SendableUnit, SourceMessage};
use relaygram_state::{Checkpoint, FailedUnit, IdentityMap, StateError, StateResult, StateStore};
use relaygram_transport::Transport;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::EngineError;
use crate::report::{AbortReason, RunOutcome, RunReport};
use crate::sender::BackoffSender;
use crate::wait::wait_unless_shutdown;

/// Settings for one replication run.
#[derive(Debug, Clone)]
pub struct ReplicatorConfig {
    pub source: ChatId,
    pub destination: ChatId,
    /// Pause between consecutive units.
    pub send_delay: Duration,
    /// Added to every rate-limit wait.
    pub rate_limit_margin: Duration,
    /// Persist after this many units. Must be at least 1.
    pub checkpoint_every: usize,
}

impl ReplicatorConfig {
    pub fn new(source: ChatId, destination: ChatId) -> Self {
        Self {
            source,
            destination,
            send_delay: Duration::from_secs(1),
            rate_limit_margin: Duration::from_secs(1),
            checkpoint_every: 1,
        }
    }
}

/// In-memory progress of a run: what has been processed and what it mapped to.
#[derive(Debug)]
pub struct RunState {
    progress: Progress,
    identity_map: IdentityMap,
    durable: MessageId,
    unsaved_units: usize,
}

impl RunState {
    pub fn new(
        floor: MessageId,
        identity_map: IdentityMap,
        backlog: impl IntoIterator<Item = MessageId>,
    ) -> Self {
        Self {
            progress: Progress::new(floor, backlog),
            identity_map,
            durable: floor,
            unsaved_units: 0,
        }
    }

    /// The checkpoint this state would persist.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint::new(self.progress.checkpoint())
    }

    pub fn identity_map(&self) -> &IdentityMap {
        &self.identity_map
    }

    pub fn high_water(&self) -> MessageId {
        self.progress.high_water()
    }

    /// Last checkpoint successfully written by this run (or loaded at start).
    pub fn durable_checkpoint(&self) -> MessageId {
        self.durable
    }

    /// Write the identity map, then the checkpoint.
    pub fn persist<S: StateStore>(&mut self, store: &S) -> StateResult<()> {
        let checkpoint = self.checkpoint();
        store.save(checkpoint, &self.identity_map)?;
        self.durable = checkpoint.last_message_id;
        self.unsaved_units = 0;
        Ok(())
    }

    /// Record the destination ids of a sent unit and mark its members done.
    ///
    /// Either every member is mapped or, on an already-mapped member, none is.
    fn record_sent(&mut self, unit: &SendableUnit, dest_ids: &[MessageId]) -> StateResult<()> {
        for (member, dest_id) in unit.members().iter().zip(dest_ids) {
            if let Some(existing) = self.identity_map.get(member.id) {
                return Err(StateError::AlreadyMapped {
                    source_id: member.id,
                    existing,
                    attempted: *dest_id,
                });
            }
        }
        for (member, dest_id) in unit.members().iter().zip(dest_ids) {
            self.identity_map.put(member.id, *dest_id)?;
        }
        self.progress.complete(unit.source_ids());
        Ok(())
    }

    fn record_skipped(&mut self, ids: impl IntoIterator<Item = MessageId>) {
        self.progress.complete(ids);
    }
}

/// Sort the fetched backlog, drop duplicates and anything at or below the
/// checkpoint, and split off messages the identity map already covers.
///
/// Returns the messages left to send and the ids of the already-mapped ones.
pub fn prepare_backlog(
    mut fetched: Vec<SourceMessage>,
    checkpoint: MessageId,
    identity_map: &IdentityMap,
) -> (Vec<SourceMessage>, Vec<MessageId>) {
    fetched.sort_by_key(|m| m.id);
    fetched.dedup_by_key(|m| m.id);
    fetched.retain(|m| m.id > checkpoint);

    let (mapped, pending): (Vec<_>, Vec<_>) = fetched
        .into_iter()
        .partition(|m| identity_map.contains(m.id));

    (pending, mapped.into_iter().map(|m| m.id).collect())
}

/// Why `send_all` stopped early.
struct Abort {
    reason: AbortReason,
    error: String,
}

impl Abort {
    fn interrupted() -> Self {
        Self {
            reason: AbortReason::Interrupted,
            error: "shutdown requested".to_string(),
        }
    }

    fn state(e: StateError) -> Self {
        let reason = if e.is_invariant_violation() {
            AbortReason::InvariantViolation
        } else {
            AbortReason::Storage
        };
        Self {
            reason,
            error: e.to_string(),
        }
    }
}

/// Drives one replication run from a source channel to a destination channel.
pub struct Replicator<T, S> {
    transport: T,
    store: S,
    config: ReplicatorConfig,
    shutdown: watch::Receiver<bool>,
}

impl<T: Transport, S: StateStore> Replicator<T, S> {
    pub fn new(transport: T, store: S, config: ReplicatorConfig) -> Self {
        let (_tx, shutdown) = watch::channel(false);
        Self {
            transport,
            store,
            config,
            shutdown,
        }
    }

    /// Stop at the next unit boundary, or mid-wait, once this flips to `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Run until the backlog is drained or the run has to stop.
    pub async fn run(&self) -> RunReport {
        // Load
        let checkpoint = match self.store.load_checkpoint() {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                error!(error = %e, "Failed to load checkpoint");
                return RunReport::new(0).aborted(AbortReason::Storage, e);
            }
        };
        let floor = checkpoint.last_message_id;
        let mut report = RunReport::new(floor);

        let identity_map = match self.store.load_identity_map() {
            Ok(map) => map,
            Err(e) => {
                error!(error = %e, "Failed to load identity map");
                return report.aborted(AbortReason::Storage, e);
            }
        };

        info!(
            source = self.config.source,
            destination = self.config.destination,
            checkpoint = floor,
            mapped = identity_map.len(),
            "Starting replication"
        );

        // Fetch
        let fetched = match self
            .transport
            .fetch_backlog(self.config.source, floor)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                error!(error = %e, "Failed to fetch backlog");
                return report.aborted(AbortReason::Transport, e);
            }
        };

        let (pending, already_mapped) = prepare_backlog(fetched, floor, &identity_map);
        report.backlog_len = pending.len() + already_mapped.len();
        report.skipped_mapped = already_mapped.len();
        if !already_mapped.is_empty() {
            info!(count = already_mapped.len(), "Skipping messages that are already replicated");
        }

        let backlog_ids = pending
            .iter()
            .map(|m| m.id)
            .chain(already_mapped.iter().copied())
            .collect::<Vec<_>>();
        let mut state = RunState::new(floor, identity_map, backlog_ids);
        state.record_skipped(already_mapped);

        let units = aggregate(pending);
        report.units_total = units.len();
        info!(
            messages = report.backlog_len,
            units = units.len(),
            "Backlog fetched"
        );

        let mut sender = BackoffSender::new(
            &self.transport,
            &self.store,
            self.config.destination,
            self.config.rate_limit_margin,
            self.shutdown.clone(),
        );
        let drained = self
            .send_all(&units, &mut sender, &mut state, &mut report)
            .await;
        report.rate_limit_waits = sender.rate_limit_waits();

        if let Err(abort) = drained {
            return self.abort(state, report, abort.reason, abort.error);
        }

        // Finalize
        if let Err(e) = state.persist(&self.store) {
            return self.abort(state, report, AbortReason::Storage, e);
        }

        report.checkpoint_after = state.durable_checkpoint();
        report.high_water = state.high_water();
        report.outcome = if report.units_failed > 0 {
            RunOutcome::CompletedWithErrors
        } else {
            RunOutcome::Completed
        };

        info!(
            checkpoint = report.checkpoint_after,
            sent = report.units_sent,
            failed = report.units_failed,
            "Replication finished"
        );
        report
    }

    /// Send every unit in order, recording results into `state` and `report`.
    async fn send_all(
        &self,
        units: &[SendableUnit],
        sender: &mut BackoffSender<'_, T, S>,
        state: &mut RunState,
        report: &mut RunReport,
    ) -> Result<(), Abort> {
        let mut shutdown = self.shutdown.clone();

        for (index, unit) in units.iter().enumerate() {
            if *shutdown.borrow() {
                return Err(Abort::interrupted());
            }
            if index > 0
                && !self.config.send_delay.is_zero()
                && !wait_unless_shutdown(&mut shutdown, self.config.send_delay).await
            {
                return Err(Abort::interrupted());
            }

            let reply_to = self.resolve_reply(unit, state.identity_map());

            match sender.send(unit, reply_to, state).await {
                Ok(dest_ids) => {
                    state.record_sent(unit, &dest_ids).map_err(Abort::state)?;
                    report.units_sent += 1;
                    report.messages_sent += dest_ids.len();
                    info!(
                        source_ids = ?unit.source_ids(),
                        dest_ids = ?dest_ids,
                        "Replicated"
                    );
                }
                Err(e) if e.is_unit_failure() => {
                    error!(source_ids = ?unit.source_ids(), error = %e, "Failed to replicate unit");
                    let failure = FailedUnit::new(
                        unit.source_ids(),
                        unit.group_id().map(str::to_string),
                        e.to_string(),
                    );
                    self.store
                        .record_failure(&failure)
                        .map_err(Abort::state)?;
                    state.record_skipped(unit.source_ids());
                    report.units_failed += 1;
                    report.failures.push(failure);
                }
                Err(EngineError::State(e)) => return Err(Abort::state(e)),
                Err(e) => {
                    return Err(Abort {
                        reason: AbortReason::Interrupted,
                        error: e.to_string(),
                    })
                }
            }

            state.unsaved_units += 1;
            if state.unsaved_units >= self.config.checkpoint_every.max(1) {
                state.persist(&self.store).map_err(Abort::state)?;
                debug!(checkpoint = state.durable_checkpoint(), "Progress persisted");
            }
        }

        Ok(())
    }

    /// Destination id for the unit's reply target, if that target was replicated.
    fn resolve_reply(&self, unit: &SendableUnit, map: &IdentityMap) -> Option<MessageId> {
        let target = unit.reply_to()?;
        let resolved = map.get(target);
        if resolved.is_none() {
            debug!(
                source_ids = ?unit.source_ids(),
                reply_to = target,
                "Reply target not replicated, sending without reply"
            );
        }
        resolved
    }

    /// Persist whatever is safe to persist, then stop.
    fn abort(
        &self,
        mut state: RunState,
        mut report: RunReport,
        reason: AbortReason,
        error: impl ToString,
    ) -> RunReport {
        let error = error.to_string();
        match reason {
            AbortReason::Interrupted => warn!(
                error = %error,
                outstanding = state.progress.outstanding(),
                "Replication interrupted"
            ),
            _ => error!(
                reason = %reason,
                error = %error,
                outstanding = state.progress.outstanding(),
                "Replication aborted"
            ),
        }

        if reason != AbortReason::Storage {
            if let Err(e) = state.persist(&self.store) {
                warn!(error = %e, "Failed to persist progress while aborting");
            }
        }

        report.checkpoint_after = state.durable_checkpoint();
        report.high_water = state.high_water();
        report.aborted(reason, error)
    }
}
