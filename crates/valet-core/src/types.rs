use serde::{Deserialize, Serialize};

/// Generate a ULID-like ID using timestamp + random bytes.
pub fn new_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64;

    let random: u64 = {
        let mut buf = [0u8; 8];
        if let Ok(mut f) = std::fs::File::open("/dev/urandom") {
            use std::io::Read;
            let _ = f.read_exact(&mut buf);
        } else {
            buf = ts.to_le_bytes();
        }
        u64::from_le_bytes(buf)
    };

    format!("{ts:012x}{random:016x}")
}

/// Unix epoch timestamp in seconds.
pub fn now_unix() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn text(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A conversation log row. Intent is recorded as a plain string label;
/// it is diagnostic, never read back for dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRow {
    pub id: String,
    pub chat_id: i64,
    pub role: String,
    pub content: String,
    pub intent: Option<String>,
    pub created_at: i64,
}

/// A persisted reminder. Status is one of "active", "sent", "cancelled".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    pub chat_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub remind_at: i64,
    pub is_recurring: bool,
    pub recurrence_rule: Option<String>,
    pub status: String,
    pub is_sent: bool,
    pub sent_at: Option<i64>,
    pub created_at: i64,
}

/// A persisted calendar event. Status is one of "confirmed", "tentative",
/// "cancelled". `external_id` links to the calendar backend when mirrored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub chat_id: i64,
    pub title: String,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub status: String,
    pub external_id: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preference {
    pub chat_id: i64,
    pub key: String,
    pub value: String,
    pub confidence: f64,
    pub updated_at: i64,
}
