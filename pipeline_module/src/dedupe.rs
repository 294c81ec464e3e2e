//! Duplicate suppression against existing calendar state.
//!
//! Provenance travels inside event descriptions as literal `Subject:` and
//! `Email ID:` lines (the materializer writes them, this module reads them
//! back). Matching is exact-string and case-insensitive on purpose:
//! near-duplicate titles are a known, accepted gap.

use std::collections::HashSet;

use crate::prompts::FYI_MARKER;
use crate::types::CalendarEvent;

const SUBJECT_LABEL: &str = "Subject:";
const EMAIL_ID_LABEL: &str = "Email ID:";

/// True when the task text carries the informational marker; such
/// candidates never reach the duplicate check or the calendar.
pub fn is_informational(task_text: &str) -> bool {
    task_text.trim_start().starts_with(FYI_MARKER)
}

/// Lowercased source subjects recorded in the descriptions of existing
/// events.
pub fn recorded_subjects(events: &[CalendarEvent]) -> HashSet<String> {
    labeled_values(events, SUBJECT_LABEL)
}

/// Source message IDs recorded in the descriptions of existing events.
pub fn recorded_email_ids(events: &[CalendarEvent]) -> HashSet<String> {
    labeled_values(events, EMAIL_ID_LABEL)
}

/// Either check alone suppresses: (a) the candidate's source subject was
/// already recorded as provenance on some event, or (b) the task text
/// exactly equals an existing event summary (case-insensitively).
pub fn is_duplicate(
    task_text: &str,
    source_subject: Option<&str>,
    events: &[CalendarEvent],
) -> bool {
    if let Some(subject) = source_subject {
        let subject = subject.trim().to_lowercase();
        if !subject.is_empty() && recorded_subjects(events).contains(&subject) {
            return true;
        }
    }
    let task = task_text.trim().to_lowercase();
    events
        .iter()
        .any(|event| event.summary.trim().to_lowercase() == task)
}

fn labeled_values(events: &[CalendarEvent], label: &str) -> HashSet<String> {
    let mut values = HashSet::new();
    for event in events {
        for line in event.description.lines() {
            if let Some(value) = line.trim().strip_prefix(label) {
                let value = value.trim();
                if !value.is_empty() {
                    values.insert(value.to_lowercase());
                }
            }
        }
    }
    values
}
