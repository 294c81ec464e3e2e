//! End-to-end suggestion generation over a batch of inbound messages.
//!
//! One model call per message that survives the interest filter. A model
//! failure skips that message only; a malformed answer still yields a
//! plain-text suggestion so the user sees something rather than nothing.

use chrono::{DateTime, Datelike, Utc};
use tracing::warn;

use crate::collaborators::TextModel;
use crate::dates::{display_deadline, NO_DATE_SENTINEL};
use crate::dedupe::{is_duplicate, is_informational, recorded_subjects};
use crate::extract::parse_candidate;
use crate::prompts::{build_extraction_prompt, PromptKind};
use crate::types::{CalendarEvent, InboundMessage, Suggestion, UserPreferences};

/// Generate suggestions for `messages`, suppressing anything already on the
/// calendar. Time-sensitive suggestions sort first; within each group the
/// original message order is kept.
pub async fn generate_suggestions(
    messages: &[InboundMessage],
    existing_events: &[CalendarEvent],
    preferences: &UserPreferences,
    model: &dyn TextModel,
    now: DateTime<Utc>,
) -> Vec<Suggestion> {
    let known_subjects = recorded_subjects(existing_events);
    let mut suggestions = Vec::new();

    for message in messages {
        if !matches_interests(message, preferences) {
            continue;
        }
        let subject_key = message.subject.trim().to_lowercase();
        if known_subjects.contains(&subject_key)
            || existing_events
                .iter()
                .any(|event| event.summary.trim().to_lowercase() == subject_key)
        {
            continue;
        }

        let prompt = build_extraction_prompt(
            &PromptKind::EmailTask {
                subject: &message.subject,
                body: &message.body_text,
            },
            now.year(),
        );
        let output = match model.generate_text(&prompt).await {
            Ok(output) => output,
            Err(err) => {
                warn!("model call failed for message {}: {}", message.id, err);
                continue;
            }
        };

        match parse_candidate(&output) {
            Ok(candidate) => {
                if is_informational(&candidate.task_text) {
                    continue;
                }
                if is_duplicate(
                    &candidate.task_text,
                    Some(&message.subject),
                    existing_events,
                ) {
                    continue;
                }
                let raw_date = candidate
                    .raw_date_text
                    .as_deref()
                    .map(str::trim)
                    .filter(|text| {
                        !text.is_empty() && !text.eq_ignore_ascii_case(NO_DATE_SENTINEL)
                    });
                suggestions.push(Suggestion {
                    text: candidate.task_text.clone(),
                    deadline: raw_date.and_then(|raw| display_deadline(raw, now)),
                    email_id: message.id.clone(),
                    email_subject: message.subject.clone(),
                    location: candidate.location.clone(),
                    event_date: raw_date.map(str::to_string),
                    is_time_sensitive: candidate.is_time_sensitive,
                });
            }
            Err(err) => {
                // Unstructured answer. Surface it as-is, undated.
                warn!(
                    "unstructured model answer for message {}: {}",
                    message.id, err
                );
                let text = output.trim();
                if text.is_empty() || is_informational(text) {
                    continue;
                }
                suggestions.push(Suggestion {
                    text: text.to_string(),
                    deadline: None,
                    email_id: message.id.clone(),
                    email_subject: message.subject.clone(),
                    location: None,
                    event_date: None,
                    is_time_sensitive: false,
                });
            }
        }
    }

    // Stable sort keeps message order within each group.
    suggestions.sort_by_key(|suggestion| !suggestion.is_time_sensitive);
    suggestions
}

/// With filtering enabled and at least one interest configured, a message
/// must mention an interest (case-insensitive substring of subject or body)
/// to proceed. Disabled filtering or an empty interest list passes
/// everything through.
fn matches_interests(message: &InboundMessage, preferences: &UserPreferences) -> bool {
    if !preferences.enabled || preferences.interests.is_empty() {
        return true;
    }
    let subject = message.subject.to_lowercase();
    let body = message.body_text.to_lowercase();
    preferences.interests.iter().any(|interest| {
        let interest = interest.trim().to_lowercase();
        !interest.is_empty() && (subject.contains(&interest) || body.contains(&interest))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::TextModel;
    use crate::errors::ModelError;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::HashMap;

    struct FakeModel {
        answers: HashMap<String, String>,
    }

    impl FakeModel {
        fn new(answers: &[(&str, &str)]) -> Self {
            Self {
                answers: answers
                    .iter()
                    .map(|(subject, answer)| (subject.to_string(), answer.to_string()))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl TextModel for FakeModel {
        async fn generate_text(&self, prompt: &str) -> Result<String, ModelError> {
            for (subject, answer) in &self.answers {
                if prompt.contains(subject.as_str()) {
                    return Ok(answer.clone());
                }
            }
            Err(ModelError::Api("unexpected prompt".to_string()))
        }
    }

    fn message(id: &str, subject: &str, body: &str) -> InboundMessage {
        InboundMessage {
            id: id.to_string(),
            subject: subject.to_string(),
            sender: "sender@example.com".to_string(),
            received_at: Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap(),
            body_text: body.to_string(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn interest_filter_drops_unrelated_messages() {
        let messages = vec![
            message("m1", "Robotics club meetup", "Join us Friday"),
            message("m2", "Gardening newsletter", "Tulip season"),
        ];
        let preferences = UserPreferences {
            enabled: true,
            interests: vec!["robotics".to_string()],
        };
        let model = FakeModel::new(&[(
            "Robotics club meetup",
            r#"{"task": "Attend robotics meetup", "event_date": "2025-06-06 18:00", "location": "Lab 2", "is_time_sensitive": true}"#,
        )]);
        let suggestions =
            generate_suggestions(&messages, &[], &preferences, &model, now()).await;
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].text, "Attend robotics meetup");
        assert_eq!(suggestions[0].email_id, "m1");
    }

    #[tokio::test]
    async fn disabled_filter_passes_everything() {
        let messages = vec![message("m2", "Gardening newsletter", "Tulip season")];
        let preferences = UserPreferences {
            enabled: false,
            interests: vec!["robotics".to_string()],
        };
        let model = FakeModel::new(&[(
            "Gardening newsletter",
            r#"{"task": "Plant tulips", "event_date": "none", "location": "none", "is_time_sensitive": false}"#,
        )]);
        let suggestions =
            generate_suggestions(&messages, &[], &preferences, &model, now()).await;
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].event_date, None);
        assert_eq!(suggestions[0].deadline, None);
    }

    #[tokio::test]
    async fn informational_answers_are_dropped() {
        let messages = vec![message("m3", "Statement ready", "Your statement is ready")];
        let model = FakeModel::new(&[(
            "Statement ready",
            r#"{"task": "FYI: bank statement is available", "event_date": "none", "location": "none", "is_time_sensitive": false}"#,
        )]);
        let suggestions =
            generate_suggestions(&messages, &[], &UserPreferences::default(), &model, now()).await;
        assert!(suggestions.is_empty());
    }

    #[tokio::test]
    async fn unstructured_answer_becomes_plain_suggestion() {
        let messages = vec![message("m4", "Lunch?", "Want to grab lunch Thursday?")];
        let model = FakeModel::new(&[("Lunch?", "Grab lunch with Sam on Thursday.")]);
        let suggestions =
            generate_suggestions(&messages, &[], &UserPreferences::default(), &model, now()).await;
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].text, "Grab lunch with Sam on Thursday.");
        assert_eq!(suggestions[0].deadline, None);
        assert!(!suggestions[0].is_time_sensitive);
    }

    #[tokio::test]
    async fn model_failure_skips_only_that_message() {
        let messages = vec![
            message("m5", "Broken", "no answer configured"),
            message("m6", "Conference talk", "Submit by June 10"),
        ];
        let model = FakeModel::new(&[(
            "Conference talk",
            r#"{"task": "Submit conference talk", "event_date": "2025-06-10 09:00", "location": "none", "is_time_sensitive": true}"#,
        )]);
        let suggestions =
            generate_suggestions(&messages, &[], &UserPreferences::default(), &model, now()).await;
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].email_id, "m6");
    }

    #[tokio::test]
    async fn recorded_subject_suppresses_before_any_model_call() {
        let start = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap();
        let events = vec![CalendarEvent {
            id: "evt".to_string(),
            summary: "Quarterly review".to_string(),
            description: "Created via RunDown email sync\n\nSubject: Quarterly review\n\nEmail ID: old1".to_string(),
            start,
            end: start + chrono::Duration::hours(1),
            html_link: None,
        }];
        let messages = vec![message("m7", "Quarterly review", "Reminder: review Monday")];
        // No answer configured: a model call would error and be logged, but
        // suppression happens before the call so the run stays clean.
        let model = FakeModel::new(&[]);
        let suggestions =
            generate_suggestions(&messages, &events, &UserPreferences::default(), &model, now())
                .await;
        assert!(suggestions.is_empty());
    }

    #[tokio::test]
    async fn time_sensitive_suggestions_sort_first() {
        let messages = vec![
            message("m8", "Newsletter digest", "Reading for the weekend"),
            message("m9", "Visa appointment", "Appointment on June 20 at 10am"),
        ];
        let model = FakeModel::new(&[
            (
                "Newsletter digest",
                r#"{"task": "Read weekend digest", "event_date": "none", "location": "none", "is_time_sensitive": false}"#,
            ),
            (
                "Visa appointment",
                r#"{"task": "Attend visa appointment", "event_date": "2025-06-20 10:00", "location": "Consulate", "is_time_sensitive": true}"#,
            ),
        ]);
        let suggestions =
            generate_suggestions(&messages, &[], &UserPreferences::default(), &model, now()).await;
        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0].text, "Attend visa appointment");
        assert_eq!(
            suggestions[0].deadline.as_deref(),
            Some("Jun 20, 2025 at 10:00 AM")
        );
        assert_eq!(suggestions[1].text, "Read weekend digest");
    }
}
