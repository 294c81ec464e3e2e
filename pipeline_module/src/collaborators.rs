//! Trait seams for the remote collaborators the pipeline depends on.
//!
//! All state arrives through these traits or as call parameters; the
//! pipeline holds no clients of its own, so tests inject in-memory fakes.

use async_trait::async_trait;

use crate::errors::{CalendarError, MailError, ModelError};
use crate::types::{CalendarEvent, CreateEventRequest, InboundMessage};

/// A generative language model. One blocking call, no streaming, no
/// structured-output guarantee from the provider.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn generate_text(&self, prompt: &str) -> Result<String, ModelError>;
}

/// The calendar service, already authenticated for one user.
#[async_trait]
pub trait CalendarApi: Send + Sync {
    async fn list_upcoming_events(
        &self,
        max_results: usize,
    ) -> Result<Vec<CalendarEvent>, CalendarError>;

    async fn create_event(
        &self,
        request: &CreateEventRequest,
    ) -> Result<CalendarEvent, CalendarError>;

    async fn delete_event(&self, event_id: &str) -> Result<(), CalendarError>;
}

/// The mail service, already authenticated for one user. Listing excludes
/// messages the implementation has marked processed.
#[async_trait]
pub trait Mailbox: Send + Sync {
    async fn list_recent_messages(&self, limit: usize) -> Result<Vec<InboundMessage>, MailError>;

    async fn get_message(&self, message_id: &str) -> Result<InboundMessage, MailError>;

    async fn mark_processed(&self, message_id: &str) -> Result<(), MailError>;
}
