//! Push Transport Port (Driven Port)
//!
//! Interface for a subscription to the push-event source. The transport
//! forwards lifecycle callbacks and raw text frames; classification and
//! merging happen in the stream connection.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::order::WorkspaceId;

/// Lifecycle callback or inbound frame from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Connection (re)established.
    Opened,
    /// Raw text frame.
    Message(String),
    /// Transport-level error. The connection may or may not survive it.
    Error(String),
    /// Connection closed.
    Closed,
}

/// Transport errors that end [`PushTransport::run`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Endpoint URL cannot be used.
    #[error("invalid push URL: {0}")]
    InvalidUrl(String),

    /// Could not connect.
    #[error("push connection failed: {0}")]
    Connect(String),

    /// Connection closed by the remote.
    #[error("push connection closed")]
    ConnectionClosed,

    /// Protocol or I/O failure on an established connection.
    #[error("push protocol error: {0}")]
    Protocol(String),

    /// Reconnect attempts exhausted.
    #[error("max reconnection attempts ({0}) exceeded")]
    MaxReconnectAttempts(u32),
}

/// Subscription to the push-event source.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Subscribe to events of `workspace_id` and forward them to `events`
    /// until `cancel` fires or the transport gives up.
    ///
    /// Reconnection, if any, is internal to the transport; every
    /// reconnect is reported as a new [`TransportEvent::Opened`].
    async fn run(
        &self,
        workspace_id: WorkspaceId,
        events: mpsc::Sender<TransportEvent>,
        cancel: CancellationToken,
    ) -> Result<(), TransportError>;
}
