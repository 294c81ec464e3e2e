//! Turns a validated, date-resolved, non-duplicate candidate into a
//! create-event call.
//!
//! The description layout is a wire contract: banner first, then optional
//! `Details:` / `Location:` sections, then the `Subject:` and `Email ID:`
//! provenance lines, every section separated by one blank line. The
//! duplicate suppressor parses those exact labels back out of events this
//! module created, so the byte layout must not drift.

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::collaborators::CalendarApi;
use crate::errors::CalendarError;
use crate::types::{CalendarEvent, CreateEventRequest, EventProvenance, ExtractionCandidate};

/// Banner for events created through the chat interface.
pub const CHATBOT_BANNER: &str = "Created via RunDown Chatbot";
/// Banner for events created by confirming a suggestion or manual task.
pub const TASK_BANNER: &str = "Added from RunDown";
/// Banner for events created by the background mail sync.
pub const SYNC_BANNER: &str = "Created via RunDown email sync";

const DEFAULT_DURATION_HOURS: i64 = 1;

/// Assemble the outbound create-event request. `end` defaults to one hour
/// after `start` when the source text supplied no explicit end.
pub fn build_event_request(
    candidate: &ExtractionCandidate,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    provenance: &EventProvenance,
    banner: &str,
    reminders: bool,
) -> CreateEventRequest {
    CreateEventRequest {
        summary: candidate.task_text.clone(),
        description: build_description(
            banner,
            candidate.details.as_deref(),
            candidate.location.as_deref(),
            provenance,
        ),
        location: candidate.location.clone(),
        start,
        end: end.unwrap_or(start + Duration::hours(DEFAULT_DURATION_HOURS)),
        reminders,
    }
}

/// Fixed section order: banner, details, location, subject, email ID.
pub fn build_description(
    banner: &str,
    details: Option<&str>,
    location: Option<&str>,
    provenance: &EventProvenance,
) -> String {
    let mut sections = vec![banner.to_string()];
    if let Some(details) = details {
        sections.push(format!("Details: {}", details));
    }
    if let Some(location) = location {
        sections.push(format!("Location: {}", location));
    }
    if let Some(subject) = provenance.source_subject.as_deref() {
        sections.push(format!("Subject: {}", subject));
    }
    if let Some(message_id) = provenance.source_message_id.as_deref() {
        sections.push(format!("Email ID: {}", message_id));
    }
    sections.join("\n\n")
}

/// Issue the create call. Collaborator errors are surfaced untouched:
/// event creation failure is user-visible and must be reported.
pub async fn materialize(
    calendar: &dyn CalendarApi,
    request: &CreateEventRequest,
) -> Result<CalendarEvent, CalendarError> {
    let created = calendar.create_event(request).await?;
    info!(
        "created calendar event id={} summary={:?}",
        created.id, created.summary
    );
    Ok(created)
}
