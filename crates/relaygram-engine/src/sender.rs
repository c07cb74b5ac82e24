use std::time::Duration;

use relaygram_core::{ChatId, MessageId, SendableUnit};
use relaygram_state::StateStore;
use relaygram_transport::{SendError, Transport, TransportError};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::replicator::RunState;
use crate::wait::wait_unless_shutdown;

/// Sends one unit, waiting out rate limits for as long as it takes.
///
/// Before every wait the current checkpoint and identity map are persisted,
/// so a process killed mid-wait resumes without re-sending anything. The
/// sender itself never advances the checkpoint.
pub struct BackoffSender<'a, T, S> {
    transport: &'a T,
    store: &'a S,
    destination: ChatId,
    margin: Duration,
    shutdown: watch::Receiver<bool>,
    rate_limit_waits: usize,
}

impl<'a, T: Transport, S: StateStore> BackoffSender<'a, T, S> {
    pub fn new(
        transport: &'a T,
        store: &'a S,
        destination: ChatId,
        margin: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            transport,
            store,
            destination,
            margin,
            shutdown,
            rate_limit_waits: 0,
        }
    }

    /// Number of rate-limit waits so far.
    pub fn rate_limit_waits(&self) -> usize {
        self.rate_limit_waits
    }

    /// Send `unit` and return one destination id per member, in member order.
    pub async fn send(
        &mut self,
        unit: &SendableUnit,
        reply_to: Option<MessageId>,
        state: &mut RunState,
    ) -> EngineResult<Vec<MessageId>> {
        unit.validate().map_err(|source| EngineError::InvalidUnit {
            ids: unit.source_ids(),
            source,
        })?;

        loop {
            let result = match unit {
                SendableUnit::Single(message) => self
                    .transport
                    .send_single(self.destination, message, reply_to)
                    .await
                    .map(|id| vec![id]),
                SendableUnit::Group(group) => {
                    self.transport
                        .send_group(self.destination, &group.members, reply_to)
                        .await
                }
            };

            match result {
                Ok(dest_ids) if dest_ids.len() == unit.len() => return Ok(dest_ids),
                Ok(dest_ids) => {
                    return Err(EngineError::SendFailed {
                        ids: unit.source_ids(),
                        source: TransportError::Protocol(format!(
                            "expected {} destination ids, got {}",
                            unit.len(),
                            dest_ids.len()
                        )),
                    });
                }
                Err(SendError::RateLimited { retry_after }) => {
                    let wait = retry_after + self.margin;
                    state.persist(self.store)?;
                    self.rate_limit_waits += 1;

                    warn!(
                        source_ids = ?unit.source_ids(),
                        wait_secs = wait.as_secs_f64(),
                        checkpoint = state.checkpoint().last_message_id,
                        "Rate limited, waiting before retry"
                    );

                    if !wait_unless_shutdown(&mut self.shutdown, wait).await {
                        return Err(EngineError::Interrupted {
                            ids: unit.source_ids(),
                        });
                    }
                    debug!(source_ids = ?unit.source_ids(), "Retrying after rate limit");
                }
                Err(SendError::Failed(source)) => {
                    return Err(EngineError::SendFailed {
                        ids: unit.source_ids(),
                        source,
                    });
                }
            }
        }
    }
}
