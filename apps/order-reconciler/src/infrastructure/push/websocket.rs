//! WebSocket Push Client
//!
//! [`PushTransport`] over a WebSocket subscription at
//! `{push_url}?workspaceId={id}`. Text (and UTF-8 binary) frames are
//! forwarded untouched; pings are answered; drops are reported and followed
//! by a backoff reconnect.
//!
//! # Event mapping
//!
//! | WebSocket                  | Forwarded                     |
//! |----------------------------|-------------------------------|
//! | handshake completed        | `Opened`                      |
//! | text / UTF-8 binary frame  | `Message(text)`               |
//! | close frame, stream end    | `Closed`                      |
//! | connect or read error      | `Error(reason)`               |

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, StreamExt};
use reqwest::Url;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{PushTransport, TransportError, TransportEvent};
use crate::domain::order::WorkspaceId;

/// WebSocket push client settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PushSettings {
    /// Base WebSocket URL (`ws://` or `wss://`).
    pub url: String,
    /// Reconnect backoff.
    pub reconnect: ReconnectConfig,
}

/// How one connection ended without error.
enum Ended {
    Cancelled,
    ReceiverGone,
}

/// WebSocket implementation of [`PushTransport`].
#[derive(Debug, Clone)]
pub struct WebSocketPushTransport {
    settings: PushSettings,
}

impl WebSocketPushTransport {
    /// Create a transport.
    #[must_use]
    pub const fn new(settings: PushSettings) -> Self {
        Self { settings }
    }

    /// Subscription URL for `workspace_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL cannot be parsed or is not a
    /// WebSocket URL.
    pub fn subscription_url(&self, workspace_id: &WorkspaceId) -> Result<Url, TransportError> {
        let mut url = Url::parse(&self.settings.url)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {e}", self.settings.url)))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(TransportError::InvalidUrl(format!(
                "expected ws:// or wss://, got {}",
                url.scheme()
            )));
        }
        url.query_pairs_mut()
            .append_pair("workspaceId", workspace_id.as_str());
        Ok(url)
    }

    async fn connect_and_forward(
        &self,
        url: &Url,
        events: &mpsc::Sender<TransportEvent>,
        cancel: &CancellationToken,
        policy: &mut ReconnectPolicy,
    ) -> Result<Ended, TransportError> {
        let connect = tokio_tungstenite::connect_async(url.as_str());
        let (ws_stream, _response) = tokio::select! {
            () = cancel.cancelled() => return Ok(Ended::Cancelled),
            connected = connect => connected.map_err(|e| TransportError::Connect(e.to_string()))?,
        };
        info!(%url, "push subscription connected");
        policy.reset();

        let (mut write, mut read) = ws_stream.split();
        if events.send(TransportEvent::Opened).await.is_err() {
            return Ok(Ended::ReceiverGone);
        }

        loop {
            let frame = tokio::select! {
                () = cancel.cancelled() => {
                    send_close(&mut write).await;
                    return Ok(Ended::Cancelled);
                }
                frame = read.next() => frame,
            };

            let text = match frame {
                Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => text,
                    Err(_) => {
                        warn!(len = data.len(), "dropping non-UTF8 binary frame");
                        continue;
                    }
                },
                Some(Ok(Message::Ping(data))) => {
                    write
                        .send(Message::Pong(data))
                        .await
                        .map_err(|e| TransportError::Protocol(e.to_string()))?;
                    continue;
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "server sent close frame");
                    return Err(TransportError::ConnectionClosed);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(TransportError::Protocol(e.to_string())),
                None => return Err(TransportError::ConnectionClosed),
            };

            if events.send(TransportEvent::Message(text)).await.is_err() {
                return Ok(Ended::ReceiverGone);
            }
        }
    }
}

#[async_trait]
impl PushTransport for WebSocketPushTransport {
    async fn run(
        &self,
        workspace_id: WorkspaceId,
        events: mpsc::Sender<TransportEvent>,
        cancel: CancellationToken,
    ) -> Result<(), TransportError> {
        let url = self.subscription_url(&workspace_id)?;
        let mut policy = ReconnectPolicy::new(self.settings.reconnect.clone());

        loop {
            let failure = match self
                .connect_and_forward(&url, &events, &cancel, &mut policy)
                .await
            {
                Ok(Ended::Cancelled) => {
                    debug!("push subscription cancelled");
                    return Ok(());
                }
                Ok(Ended::ReceiverGone) => {
                    debug!("push event receiver dropped");
                    return Ok(());
                }
                Err(e) => e,
            };

            let event = match &failure {
                TransportError::ConnectionClosed => TransportEvent::Closed,
                other => TransportEvent::Error(other.to_string()),
            };
            if events.send(event).await.is_err() {
                return Ok(());
            }

            let Some(delay) = policy.next_delay() else {
                warn!(error = %failure, "push reconnect attempts exhausted");
                return Err(TransportError::MaxReconnectAttempts(policy.max_attempts()));
            };
            info!(
                attempt = policy.attempts(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %failure,
                "reconnecting push subscription"
            );

            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Send a close frame on shutdown, returning whether it was delivered.
async fn send_close<S>(write: &mut S) -> bool
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    match write.send(Message::Close(None)).await {
        Ok(()) => true,
        Err(e) => {
            debug!(error = %e, "close frame not delivered");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn transport(url: &str, max_attempts: u32) -> WebSocketPushTransport {
        WebSocketPushTransport::new(PushSettings {
            url: url.to_string(),
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(20),
                multiplier: 2.0,
                jitter_factor: 0.0,
                max_attempts,
            },
        })
    }

    #[test]
    fn subscription_url_carries_workspace() {
        let t = transport("wss://push.example.com/orders/stream", 0);
        let url = t.subscription_url(&WorkspaceId::new("ws 1")).unwrap();
        assert_eq!(
            url.as_str(),
            "wss://push.example.com/orders/stream?workspaceId=ws+1"
        );
    }

    #[test]
    fn subscription_url_rejects_http() {
        let t = transport("https://push.example.com", 0);
        assert!(matches!(
            t.subscription_url(&WorkspaceId::new("ws")),
            Err(TransportError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn forwards_frames_then_reports_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.send(Message::Text(r#"{"type":"ready"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        });

        let t = transport(&format!("ws://{addr}/stream"), 1);
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let run = tokio::spawn(async move { t.run(WorkspaceId::new("ws-1"), tx, cancel).await });

        assert_eq!(rx.recv().await, Some(TransportEvent::Opened));
        assert_eq!(
            rx.recv().await,
            Some(TransportEvent::Message(r#"{"type":"ready"}"#.to_string()))
        );
        assert_eq!(rx.recv().await, Some(TransportEvent::Closed));

        // The single reconnect attempt fails against the closed listener.
        assert!(matches!(rx.recv().await, Some(TransportEvent::Error(_))));
        assert!(matches!(
            run.await.unwrap(),
            Err(TransportError::MaxReconnectAttempts(1))
        ));
    }

    #[tokio::test]
    async fn cancellation_stops_reconnecting() {
        let t = transport("ws://127.0.0.1:9/unreachable", 0);
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let run = tokio::spawn(async move { t.run(WorkspaceId::new("ws-1"), tx, run_cancel).await });

        assert!(matches!(rx.recv().await, Some(TransportEvent::Error(_))));
        cancel.cancel();
        assert!(run.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn close_frame_failure_is_reported() {
        let (mut open, _rx) = futures::channel::mpsc::channel::<Message>(1);
        assert!(send_close(&mut open).await);

        let (mut gone, rx) = futures::channel::mpsc::channel::<Message>(1);
        drop(rx);
        assert!(!send_close(&mut gone).await);
    }
}
