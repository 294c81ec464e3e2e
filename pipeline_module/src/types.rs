use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A mail message as fetched from the mail collaborator. Immutable once
/// fetched; the pipeline never writes back to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub received_at: DateTime<Utc>,
    pub body_text: String,
}

/// Structured fields pulled out of a model answer. Lives only for the
/// duration of one pipeline invocation; `task_text` is guaranteed non-empty
/// by the response parser.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionCandidate {
    pub task_text: String,
    pub raw_date_text: Option<String>,
    pub location: Option<String>,
    pub details: Option<String>,
    pub is_time_sensitive: bool,
    pub source_message_id: Option<String>,
}

/// Source-message metadata written into an event description and parsed
/// back out later for duplicate suppression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventProvenance {
    pub source_message_id: Option<String>,
    pub source_subject: Option<String>,
}

/// An event as returned by the calendar collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: String,
    #[serde(default)]
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub html_link: Option<String>,
}

/// Outbound create-event call payload. `reminders` asks the calendar
/// collaborator to attach the standard overrides (email 24h ahead, popup
/// 30m ahead).
#[derive(Debug, Clone, PartialEq)]
pub struct CreateEventRequest {
    pub summary: String,
    pub description: String,
    pub location: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub reminders: bool,
}

/// Per-user interest filter settings. Loaded fresh on every pipeline
/// invocation, never cached here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub interests: Vec<String>,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            enabled: true,
            interests: Vec::new(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// One suggested task, presented to the user for confirmation. Field names
/// match the JSON shape served to the frontend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub text: String,
    pub deadline: Option<String>,
    pub email_id: String,
    pub email_subject: String,
    pub location: Option<String>,
    pub event_date: Option<String>,
    pub is_time_sensitive: bool,
}
