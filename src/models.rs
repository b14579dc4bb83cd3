//! Conversation data model
//!
//! `Message` is the only shape the rendering layer consumes. Its JSON form is
//! `{id, role, type, content, data?, timestamp}` where `type` is one of
//! `text`, `chart` or `table` and `data` carries the chart or table payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::queue::{ChatHandle, ChatSnapshot, QueueState};
use crate::storage::UploadProgress;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub chat: ChatHandle,
}

/// Creation-ordered message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out message ids in creation order.
#[derive(Debug, Default)]
pub struct MessageIdSequence {
    next: u64,
}

impl MessageIdSequence {
    pub fn next_id(&mut self) -> MessageId {
        self.next += 1;
        MessageId(self.next)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Chart,
    Table,
}

/// Variant payload of a message; serialized as the `type`/`data` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum MessageBody {
    Text,
    Chart(ChartData),
    Table(TableData),
}

impl MessageBody {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageBody::Text => MessageKind::Text,
            MessageBody::Chart(_) => MessageKind::Chart,
            MessageBody::Table(_) => MessageKind::Table,
        }
    }
}

/// A unit of conversation. Immutable once appended to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    /// Display text for text messages, caption otherwise
    pub content: String,
    #[serde(flatten)]
    pub body: MessageBody,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(id: MessageId, content: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::User,
            content: content.into(),
            body: MessageBody::Text,
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(id: MessageId, content: impl Into<String>, body: MessageBody) -> Self {
        Self {
            id,
            role: Role::Assistant,
            content: content.into(),
            body,
            timestamp: Utc::now(),
        }
    }

    pub fn assistant_text(id: MessageId, content: impl Into<String>) -> Self {
        Self::assistant(id, content, MessageBody::Text)
    }

    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Pie,
}

impl ChartKind {
    /// Probe order when no usable `default` hint is given.
    pub const ALL: [ChartKind; 3] = [ChartKind::Bar, ChartKind::Line, ChartKind::Pie];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Pie => "pie",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "bar" => Some(ChartKind::Bar),
            "line" => Some(ChartKind::Line),
            "pie" => Some(ChartKind::Pie),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChartKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisLabels {
    pub x: Option<String>,
    pub y: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartData {
    pub kind: ChartKind,
    pub series: Vec<ChartPoint>,
    pub title: String,
    pub axis_labels: AxisLabels,
}

/// Scalar table cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Text(String),
    Number(f64),
    Bool(bool),
    Empty,
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Text(s) => f.write_str(s),
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Bool(b) => write!(f, "{}", b),
            Cell::Empty => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

// HTTP request/response bodies

#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub message_id: MessageId,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub storage_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResetResponse {
    pub session_id: uuid::Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub session_id: uuid::Uuid,
    pub storage_key: Option<String>,
    pub messages: Vec<Message>,
    pub is_loading: bool,
    pub last_error: Option<String>,
    pub queue_state: QueueState,
    pub pending: usize,
    pub upload_progress: Option<UploadProgress>,
}

impl SessionResponse {
    pub fn new(snapshot: &ChatSnapshot, upload_progress: Option<UploadProgress>) -> Self {
        let session = &snapshot.session;
        Self {
            session_id: session.id,
            storage_key: session.storage_key.clone(),
            messages: session.messages.clone(),
            is_loading: session.is_loading,
            last_error: session.last_error.clone(),
            queue_state: snapshot.queue_state,
            pending: snapshot.pending,
            upload_progress,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub analysis_endpoint: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_message_serializes_without_data() {
        let message = Message::user(MessageId(7), "total sales?");
        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(value["id"], json!(7));
        assert_eq!(value["role"], json!("user"));
        assert_eq!(value["type"], json!("text"));
        assert_eq!(value["content"], json!("total sales?"));
        assert!(value.get("data").is_none());
    }

    #[test]
    fn test_chart_message_carries_data() {
        let chart = ChartData {
            kind: ChartKind::Line,
            series: vec![ChartPoint { label: "Jan".into(), value: 3.0 }],
            title: "Monthly".into(),
            axis_labels: AxisLabels { x: Some("Month".into()), y: None },
        };
        let message = Message::assistant(MessageId(2), "Here you go", MessageBody::Chart(chart));
        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(value["type"], json!("chart"));
        assert_eq!(value["data"]["kind"], json!("line"));
        assert_eq!(value["data"]["series"][0], json!({"label": "Jan", "value": 3.0}));
        assert_eq!(value["data"]["axisLabels"]["x"], json!("Month"));
        assert_eq!(message.kind(), MessageKind::Chart);
    }

    #[test]
    fn test_id_sequence_is_monotonic() {
        let mut ids = MessageIdSequence::default();
        let first = ids.next_id();
        let second = ids.next_id();
        assert!(first < second);
    }

    #[test]
    fn test_chart_kind_parse() {
        assert_eq!(ChartKind::parse("Pie"), Some(ChartKind::Pie));
        assert_eq!(ChartKind::parse(" bar "), Some(ChartKind::Bar));
        assert_eq!(ChartKind::parse("area"), None);
    }
}
