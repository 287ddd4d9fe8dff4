//! Push-channel client with reconnect, backoff, and polling fallback.

use super::projection::ClientProjection;
use super::transport::{ChannelTransport, MessageStream, SnapshotSource};
use crate::config::ClientConfig;
use crate::core::JobId;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The connection state machine of the client.
///
/// `Connecting` carries the 0-indexed attempt counter used for the backoff
/// delay; it resets to a fresh `Streaming` on success. `Polling` is entered
/// after the attempt budget is exhausted and is left only at job end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Attempting to (re)establish the push connection.
    Connecting {
        /// 0-indexed reconnect attempt; the delay before attempt `n` is
        /// `min(base * 2^n, cap)`.
        attempt: u32,
    },
    /// Receiving live deltas from an established connection.
    Streaming,
    /// Reconnects exhausted; tracking the job via periodic snapshot polls.
    Polling,
}

/// Client-side connection manager for one job's progress channel.
///
/// On unexpected disconnect the client reconnects with exponential backoff;
/// every successful (re)connect replaces local state with the transport's
/// fresh snapshot, so the projection converges no matter how many deltas
/// were missed. After the configured attempt budget the client stops active
/// reconnection and falls back to polling the pull endpoint until the job
/// reaches a terminal state.
pub struct ChannelClient {
    transport: Arc<dyn ChannelTransport>,
    snapshots: Arc<dyn SnapshotSource>,
    projection: Arc<ClientProjection>,
    config: ClientConfig,
}

impl ChannelClient {
    /// Creates a client over the given transport and pull endpoint.
    #[must_use]
    pub fn new(
        transport: Arc<dyn ChannelTransport>,
        snapshots: Arc<dyn SnapshotSource>,
        config: ClientConfig,
    ) -> Self {
        Self {
            transport,
            snapshots,
            projection: Arc::new(ClientProjection::new()),
            config,
        }
    }

    /// Returns the projection this client feeds.
    #[must_use]
    pub fn projection(&self) -> Arc<ClientProjection> {
        self.projection.clone()
    }

    /// Spawns [`Self::run`] on its own task.
    pub fn connect(self: &Arc<Self>, job_id: JobId) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.run(job_id).await })
    }

    /// Drives the connection state machine until the observed job reaches a
    /// terminal state.
    pub async fn run(&self, job_id: JobId) {
        let mut state = ClientState::Connecting { attempt: 0 };
        let mut first_connect = true;
        let mut stream: Option<Box<dyn MessageStream>> = None;

        loop {
            match state {
                ClientState::Connecting { attempt } => {
                    if attempt >= self.config.max_reconnect_attempts {
                        warn!(%job_id, attempt, "Reconnect budget exhausted, falling back to polling");
                        state = ClientState::Polling;
                        continue;
                    }
                    if !first_connect {
                        let delay = self.config.backoff_delay(attempt);
                        debug!(%job_id, attempt, delay_ms = delay.as_millis() as u64, "Backing off before reconnect");
                        tokio::time::sleep(delay).await;
                    }
                    first_connect = false;

                    match self.transport.connect(job_id).await {
                        Ok((snapshot, new_stream)) => {
                            // Snapshot wins over any stale delta-derived
                            // local state.
                            self.projection.apply_snapshot(&snapshot);
                            if self.projection.is_terminal() {
                                return;
                            }
                            stream = Some(new_stream);
                            state = ClientState::Streaming;
                            info!(%job_id, "Channel connected");
                        }
                        Err(e) => {
                            debug!(%job_id, attempt, "Connect failed: {e}");
                            state = ClientState::Connecting {
                                attempt: attempt + 1,
                            };
                        }
                    }
                }
                ClientState::Streaming => {
                    let Some(active) = stream.as_mut() else {
                        state = ClientState::Connecting { attempt: 0 };
                        continue;
                    };
                    let next = tokio::time::timeout(
                        self.config.poll_interval(),
                        active.next_message(),
                    )
                    .await;
                    match next {
                        Ok(Ok(Some(message))) => {
                            self.projection.apply_message(&message);
                            if message.kind.is_terminal() && self.projection.is_terminal() {
                                debug!(%job_id, "Terminal message received, client done");
                                return;
                            }
                        }
                        Ok(Ok(None)) => {
                            if self.projection.is_terminal() {
                                return;
                            }
                            debug!(%job_id, "Stream closed, reconnecting");
                            stream = None;
                            state = ClientState::Connecting { attempt: 0 };
                        }
                        Ok(Err(e)) => {
                            warn!(%job_id, "Channel error, reconnecting: {e}");
                            stream = None;
                            state = ClientState::Connecting { attempt: 0 };
                        }
                        Err(_) => {
                            // Quiet connection; verify liveness.
                            if let Err(e) = active.ping().await {
                                warn!(%job_id, "Liveness ping failed, reconnecting: {e}");
                                stream = None;
                                state = ClientState::Connecting { attempt: 0 };
                            }
                        }
                    }
                }
                ClientState::Polling => {
                    tokio::time::sleep(self.config.poll_interval()).await;
                    match self.snapshots.fetch_snapshot(job_id).await {
                        Ok(snapshot) => {
                            self.projection.apply_snapshot(&snapshot);
                            if self.projection.is_terminal() {
                                debug!(%job_id, "Terminal snapshot observed, polling stopped");
                                return;
                            }
                        }
                        Err(e) => {
                            debug!(%job_id, "Snapshot poll failed: {e}");
                        }
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for ChannelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
