//! Wire messages pushed to live subscribers and their text framing.
//!
//! Each message is one JSON object sent as a single frame:
//! `data: <json>\n\n`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::EventType;
use crate::model::now_timestamp;

const FRAME_PREFIX: &str = "data: ";
const FRAME_SUFFIX: &str = "\n\n";

/// Message kinds carried by a [`Notification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    ProjectCreated,
    ProjectUpdated,
    ProjectDeleted,
    TaskCreated,
    TaskUpdated,
    TaskDeleted,
    CommentAdded,
    CommentDeleted,
    Heartbeat,
}

impl From<EventType> for NotificationKind {
    fn from(event_type: EventType) -> Self {
        match event_type {
            EventType::ProjectCreated => Self::ProjectCreated,
            EventType::ProjectUpdated => Self::ProjectUpdated,
            EventType::ProjectDeleted => Self::ProjectDeleted,
            EventType::TaskCreated => Self::TaskCreated,
            EventType::TaskUpdated => Self::TaskUpdated,
            EventType::TaskDeleted => Self::TaskDeleted,
            EventType::CommentAdded => Self::CommentAdded,
            EventType::CommentDeleted => Self::CommentDeleted,
        }
    }
}

/// A change notification (or heartbeat) delivered to a project's subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub project_id: String,
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    pub timestamp: String,
}

impl Notification {
    /// Notification for a committed event.
    #[must_use]
    pub fn for_event(
        event_type: EventType,
        project_id: impl Into<String>,
        entity_id: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            kind: event_type.into(),
            project_id: project_id.into(),
            entity_id: entity_id.into(),
            delta: None,
            version: None,
            timestamp: timestamp.into(),
        }
    }

    #[must_use]
    pub fn with_delta(mut self, delta: Value) -> Self {
        self.delta = Some(delta);
        self
    }

    #[must_use]
    pub const fn with_version(mut self, version: i64) -> Self {
        self.version = Some(version);
        self
    }

    /// Keep-alive message with empty project and entity ids.
    #[must_use]
    pub fn heartbeat() -> Self {
        Self {
            kind: NotificationKind::Heartbeat,
            project_id: String::new(),
            entity_id: String::new(),
            delta: None,
            version: None,
            timestamp: now_timestamp(),
        }
    }

    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        self.kind == NotificationKind::Heartbeat
    }
}

/// First message sent to a new subscriber, on its sink only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connected {
    #[serde(rename = "type")]
    kind: ConnectedTag,
    pub project_id: String,
    pub client_id: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum ConnectedTag {
    Connected,
}

impl Connected {
    #[must_use]
    pub fn new(project_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            kind: ConnectedTag::Connected,
            project_id: project_id.into(),
            client_id: client_id.into(),
            timestamp: now_timestamp(),
        }
    }
}

/// Any message a subscriber can receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HubMessage {
    Connected(Connected),
    Notification(Notification),
}

impl HubMessage {
    /// Consumers discard heartbeats.
    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, Self::Notification(n) if n.is_heartbeat())
    }

    #[must_use]
    pub const fn as_notification(&self) -> Option<&Notification> {
        match self {
            Self::Notification(n) => Some(n),
            Self::Connected(_) => None,
        }
    }
}

/// Frame decoding failure.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame is not valid UTF-8")]
    NotUtf8(#[from] std::str::Utf8Error),
    #[error("frame must start with 'data: ' and end with a blank line")]
    Malformed,
    #[error("frame body is not a known message: {0}")]
    Body(#[from] serde_json::Error),
}

/// Encode one message as a `data: <json>\n\n` frame.
///
/// # Errors
///
/// Returns an error if the message fails to serialize.
pub fn encode_frame<T: Serialize>(message: &T) -> serde_json::Result<Vec<u8>> {
    let json = serde_json::to_string(message)?;
    Ok(format!("{FRAME_PREFIX}{json}{FRAME_SUFFIX}").into_bytes())
}

/// Decode a single frame produced by [`encode_frame`].
///
/// # Errors
///
/// Returns [`FrameError`] when the framing or the JSON body is invalid.
pub fn decode_frame(frame: &[u8]) -> Result<HubMessage, FrameError> {
    let text = std::str::from_utf8(frame)?;
    let body = text
        .strip_prefix(FRAME_PREFIX)
        .and_then(|rest| rest.strip_suffix(FRAME_SUFFIX))
        .ok_or(FrameError::Malformed)?;
    Ok(serde_json::from_str(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn notification_frame_shape() {
        let note = Notification::for_event(EventType::TaskUpdated, "p1", "t1", "2024-01-01T00:00:00.000Z")
            .with_delta(json!({"status": "done"}))
            .with_version(2);
        let frame = encode_frame(&note).expect("encode");
        let text = String::from_utf8(frame).expect("utf8");
        assert!(text.starts_with("data: {"));
        assert!(text.ends_with("}\n\n"));

        let body: Value = serde_json::from_str(&text[6..text.len() - 2]).expect("json");
        assert_eq!(
            body,
            json!({
                "type": "TASK_UPDATED",
                "projectId": "p1",
                "entityId": "t1",
                "delta": {"status": "done"},
                "version": 2,
                "timestamp": "2024-01-01T00:00:00.000Z"
            })
        );
    }

    #[test]
    fn heartbeat_has_empty_ids() {
        let frame = encode_frame(&Notification::heartbeat()).expect("encode");
        let message = decode_frame(&frame).expect("decode");
        assert!(message.is_heartbeat());
        let note = message.as_notification().expect("notification");
        assert!(note.project_id.is_empty());
        assert!(note.entity_id.is_empty());
    }

    #[test]
    fn connected_frame_decodes_as_connected() {
        let frame = encode_frame(&Connected::new("p1", "c1")).expect("encode");
        let text = std::str::from_utf8(&frame).expect("utf8");
        assert!(text.contains(r#""type":"CONNECTED""#));

        match decode_frame(&frame).expect("decode") {
            HubMessage::Connected(connected) => {
                assert_eq!(connected.project_id, "p1");
                assert_eq!(connected.client_id, "c1");
            }
            HubMessage::Notification(other) => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn malformed_frames_are_rejected() {
        assert!(matches!(decode_frame(b"{}\n\n"), Err(FrameError::Malformed)));
        assert!(matches!(decode_frame(b"data: {}"), Err(FrameError::Malformed)));
        assert!(matches!(decode_frame(b"data: {\"type\":\"NOPE\"}\n\n"), Err(FrameError::Body(_))));
    }
}
