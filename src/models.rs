use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(id: String, title: String) -> Self {
        let now = Utc::now();
        Self { id, title, created_at: now, updated_at: now }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    /// Maps the backend's `sender` column. Anything that is not the AI is the user.
    pub fn from_sender(sender: &str) -> Self {
        match sender.to_ascii_lowercase().as_str() {
            "ai" | "assistant" | "bot" => MessageRole::Assistant,
            _ => MessageRole::User,
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Optimistic user message shown before the backend confirms anything.
    pub fn pending_user(conversation_id: String, content: String) -> Self {
        let now = Utc::now();
        Self {
            id: format!("temp-{}", now.timestamp_millis()),
            conversation_id,
            role: MessageRole::User,
            content,
            created_at: now,
        }
    }

    pub fn assistant(conversation_id: String, content: String) -> Self {
        Self {
            id: format!("assistant-{}", uuid::Uuid::new_v4()),
            conversation_id,
            role: MessageRole::Assistant,
            content,
            created_at: Utc::now(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.id.starts_with("temp-")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub conversation_id: String,
    pub filename: String,
    pub size: Option<u64>,
    pub uploaded_at: DateTime<Utc>,
    pub is_included: bool,
    pub path: Option<String>,
}

impl Document {
    /// A document that only exists on this client because the upload failed.
    /// The id is `<millis>-<uuid>` so two failures in the same millisecond differ.
    pub fn local_only(conversation_id: String, file: &UploadFile) -> Self {
        let now = Utc::now();
        Self {
            id: format!("{}-{}", now.timestamp_millis(), uuid::Uuid::new_v4().simple()),
            conversation_id,
            filename: file.filename.clone(),
            size: Some(file.size()),
            uploaded_at: now,
            is_included: true,
            path: None,
        }
    }
}

/// A file picked by the user, held in memory until it is uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { filename: filename.into(), content_type: None, bytes }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

// ── Wire rows ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationRow {
    #[serde(alias = "id")]
    pub conversation_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        let created_at = parse_timestamp(row.created_at.as_deref()).unwrap_or_else(Utc::now);
        let updated_at = parse_timestamp(row.updated_at.as_deref()).unwrap_or(created_at);
        Conversation {
            id: row.conversation_id,
            title: row.title.unwrap_or_else(|| "Untitled chat".to_string()),
            created_at,
            updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageRow {
    #[serde(alias = "id")]
    pub message_id: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub sender: String,
    pub content: String,
    #[serde(default, alias = "created_at")]
    pub timestamp: Option<String>,
}

impl MessageRow {
    pub fn into_message(self, conversation_id: &str) -> Message {
        Message {
            id: self.message_id,
            conversation_id: self.conversation_id.unwrap_or_else(|| conversation_id.to_string()),
            role: MessageRole::from_sender(&self.sender),
            content: self.content,
            created_at: parse_timestamp(self.timestamp.as_deref()).unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentRow {
    #[serde(alias = "id")]
    pub doc_id: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub filename: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub uploaded_at: Option<String>,
    #[serde(default = "default_included", deserialize_with = "lenient_bool")]
    pub is_included: bool,
    #[serde(default)]
    pub path: Option<String>,
}

impl DocumentRow {
    pub fn into_document(self, conversation_id: &str) -> Document {
        Document {
            id: self.doc_id,
            conversation_id: self.conversation_id.unwrap_or_else(|| conversation_id.to_string()),
            filename: self.filename,
            size: self.size,
            uploaded_at: parse_timestamp(self.uploaded_at.as_deref()).unwrap_or_else(Utc::now),
            is_included: self.is_included,
            path: self.path,
        }
    }
}

fn default_included() -> bool {
    true
}

/// Accepts `true`, `"true"`, `"False"`, `1`, `null`; anything unrecognised means included.
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Bool(b)) => b,
        Some(serde_json::Value::String(s)) => !matches!(s.trim().to_ascii_lowercase().as_str(), "false" | "0" | "no"),
        Some(serde_json::Value::Number(n)) => n.as_i64() != Some(0),
        _ => true,
    })
}

/// Backend timestamps arrive either as RFC 3339 or as naive UTC.
pub fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

// ── Request / response bodies ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct TitleRequest<'a> {
    pub title: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateConversationResponse {
    pub conversation_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendMessageRequest<'a> {
    pub content: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageResponse {
    pub answer: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InclusionRequest {
    pub include: bool,
}

/// What the backend reports after ingesting an upload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadReceipt {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub chunks: Option<u64>,
    #[serde(default)]
    pub path: Option<String>,
    pub doc_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewUrlResponse {
    pub url: String,
}
