//! Stream Message Classification
//!
//! Decodes text frames from the push source into order events and liveness
//! signals. A frame is a single JSON object or an array of objects; each
//! object names its kind in `type` (or `event`).
//!
//! ```json
//! {"type":"order","workspaceId":"ws-1","order":{"id":"1","dateCreated":"...","totalAmount":10,"items":[{"quantity":1}]}}
//! {"type":"ready"}
//! ```
//!
//! Order fields may also be wrapped in a `payload` object.

use serde::Deserialize;

use super::order::{Order, WorkspaceId};

/// Decoding errors. Callers discard the frame.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Body is not valid JSON or does not match the message shape.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Object carries no `type` field.
    #[error("message has no type")]
    MissingType,

    /// Unknown message type.
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// Frame is neither an object nor an array.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// One order observed on the stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
    /// Workspace the order belongs to.
    pub workspace_id: WorkspaceId,
    /// The order.
    pub order: Order,
}

/// Liveness signal kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Subscription confirmed by the source.
    Ready,
    /// Heartbeat.
    Ping,
}

/// A classified stream message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMessage {
    /// Carries one order.
    Order(OrderEvent),
    /// Carries no business payload.
    Liveness(Liveness),
}

/// Decode a text frame into one result per element.
///
/// Elements of a batch are decoded independently: a bad element yields an
/// `Err` in its slot and does not affect its siblings.
///
/// # Errors
///
/// Returns an error if the frame as a whole is not JSON or is neither an
/// object nor an array.
pub fn decode(text: &str) -> Result<Vec<Result<StreamMessage, CodecError>>, CodecError> {
    let value: serde_json::Value = serde_json::from_str(text.trim())?;

    match value {
        serde_json::Value::Array(elements) => Ok(elements.into_iter().map(decode_value).collect()),
        object @ serde_json::Value::Object(_) => Ok(vec![decode_value(object)]),
        other => Err(CodecError::InvalidFormat(format!(
            "expected JSON array or object, got: {}",
            truncate(&other.to_string(), 50)
        ))),
    }
}

fn decode_value(mut value: serde_json::Value) -> Result<StreamMessage, CodecError> {
    let kind = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .or_else(|| value.get("event").and_then(serde_json::Value::as_str))
        .map(str::to_owned)
        .ok_or(CodecError::MissingType)?;

    match kind.as_str() {
        "order" => {
            let payload = value.get_mut("payload").map(serde_json::Value::take);
            let body = match payload {
                Some(payload @ serde_json::Value::Object(_)) => payload,
                _ => value,
            };
            Ok(StreamMessage::Order(serde_json::from_value(body)?))
        }
        "ready" => Ok(StreamMessage::Liveness(Liveness::Ready)),
        "ping" => Ok(StreamMessage::Liveness(Liveness::Ping)),
        _ => Err(CodecError::UnknownType(kind)),
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(idx, _)| &text[..idx])
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDER: &str = r#"{"type":"order","workspaceId":"ws-1","order":{"id":"42","dateCreated":"2024-01-01T10:00:00Z","totalAmount":10.5,"items":[{"quantity":3}]}}"#;

    fn decode_ok(text: &str) -> Vec<StreamMessage> {
        decode(text)
            .unwrap()
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    fn decode_single(text: &str) -> Result<StreamMessage, CodecError> {
        let mut messages = decode(text)?;
        assert_eq!(messages.len(), 1);
        messages.remove(0)
    }

    #[test]
    fn decodes_order_event() {
        let messages = decode_ok(ORDER);
        let [StreamMessage::Order(event)] = messages.as_slice() else {
            panic!("expected one order event, got {messages:?}");
        };
        assert_eq!(event.workspace_id.as_str(), "ws-1");
        assert_eq!(event.order.id.as_str(), "42");
        assert_eq!(event.order.units(), 3);
    }

    #[test]
    fn decodes_wrapped_payload() {
        let raw = r#"{"event":"order","payload":{"workspaceId":"ws-1","order":{"id":7,"dateCreated":null,"totalAmount":"1.00","items":[]}}}"#;
        let messages = decode_ok(raw);
        assert!(matches!(&messages[0], StreamMessage::Order(e) if e.order.id.as_str() == "7"));
    }

    #[test]
    fn decodes_liveness_batch() {
        let messages = decode_ok(r#"[{"type":"ready"},{"type":"ping"}]"#);
        assert_eq!(
            messages,
            vec![
                StreamMessage::Liveness(Liveness::Ready),
                StreamMessage::Liveness(Liveness::Ping)
            ]
        );
    }

    #[test]
    fn bad_batch_element_keeps_its_siblings() {
        let raw = format!(r#"[{ORDER},{{"type":"order","workspaceId":"ws-1"}},{{"type":"ping"}}]"#);
        let results = decode(&raw).unwrap();

        assert_eq!(results.len(), 3);
        assert!(matches!(&results[0], Ok(StreamMessage::Order(e)) if e.order.id.as_str() == "42"));
        assert!(matches!(&results[1], Err(CodecError::Json(_))));
        assert_eq!(
            results[2].as_ref().ok(),
            Some(&StreamMessage::Liveness(Liveness::Ping))
        );
    }

    #[test]
    fn rejects_malformed_frames() {
        assert!(matches!(decode("not json"), Err(CodecError::Json(_))));
        assert!(matches!(decode("42"), Err(CodecError::InvalidFormat(_))));
        assert!(matches!(decode_single(r#"{"id":1}"#), Err(CodecError::MissingType)));
        assert!(matches!(
            decode_single(r#"{"type":"refund"}"#),
            Err(CodecError::UnknownType(t)) if t == "refund"
        ));
        assert!(matches!(
            decode_single(r#"{"type":"order","workspaceId":"ws-1"}"#),
            Err(CodecError::Json(_))
        ));
    }
}
