//! Push Source Adapter
//!
//! WebSocket client for the push-event source with backoff reconnects.

pub mod reconnect;
pub mod websocket;

pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use websocket::{PushSettings, WebSocketPushTransport};
