//! Client-side synchronization: connection management and the observed
//! state projection.
//!
//! [`ChannelClient`] owns the push connection (reconnect, backoff, poll
//! fallback); [`ClientProjection`] merges push deltas and pull snapshots
//! into the single state consumers read. Transport failures are resolved
//! entirely in this layer and never become job failures.

mod channel;
mod projection;
mod transport;

pub use channel::{ChannelClient, ClientState};
pub use projection::ClientProjection;
pub use transport::{
    ChannelTransport, LocalSnapshotSource, LocalTransport, MessageStream, SnapshotSource,
};
