//! Slash-command handling for the chat interface.
//!
//! Command matching is prefix-based and case-insensitive; everything after
//! the prefix is the command's argument text. Replies are Markdown when
//! they embed formatting the frontend should render.

use chrono::{DateTime, Datelike, Utc};
use regex::Regex;
use tracing::warn;

use crate::collaborators::{CalendarApi, TextModel};
use crate::dates::{format_confirmation, format_listing, resolve_event_date};
use crate::dedupe::is_duplicate;
use crate::errors::CalendarError;
use crate::events::{build_event_request, materialize, CHATBOT_BANNER};
use crate::extract::parse_candidate;
use crate::prompts::{build_extraction_prompt, PromptKind};
use crate::types::{CalendarEvent, EventProvenance};

/// Maximum events shown by `@list`.
const LIST_LIMIT: usize = 8;
/// Maximum candidate matches shown by an ambiguous `@remove`.
const MATCH_LIMIT: usize = 5;
/// How many upcoming events to fetch for matching and duplicate checks.
const UPCOMING_FETCH_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    AddEvent,
    RemoveEvent,
    ListEvents,
    ShowHelp,
}

/// Aliases resolve to the same command. No entry is a prefix of another,
/// so first match wins.
const COMMAND_PREFIXES: &[(&str, Command)] = &[
    ("@add", Command::AddEvent),
    ("@remove", Command::RemoveEvent),
    ("@delete", Command::RemoveEvent),
    ("@list", Command::ListEvents),
    ("@events", Command::ListEvents),
    ("@help", Command::ShowHelp),
];

/// A rendered command reply. `markdown` tells the frontend whether to
/// render formatting or show the text verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandReply {
    pub text: String,
    pub markdown: bool,
}

impl CommandReply {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markdown: false,
        }
    }

    fn rendered(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markdown: true,
        }
    }
}

/// Match a chat message against the command table. Returns the command and
/// the trimmed argument text, or `None` for free-form messages.
pub fn parse_command(input: &str) -> Option<(Command, String)> {
    let trimmed = input.trim_start();
    for (prefix, command) in COMMAND_PREFIXES {
        let matches = trimmed
            .get(..prefix.len())
            .map_or(false, |head| head.eq_ignore_ascii_case(prefix));
        if matches {
            return Some((*command, trimmed[prefix.len()..].trim().to_string()));
        }
    }
    None
}

/// Execute a parsed command against the user's calendar.
pub async fn run_command(
    command: Command,
    content: &str,
    model: &dyn TextModel,
    calendar: &dyn CalendarApi,
    now: DateTime<Utc>,
) -> CommandReply {
    match command {
        Command::AddEvent => add_event(content, model, calendar, now).await,
        Command::RemoveEvent => remove_event(content, calendar).await,
        Command::ListEvents => list_events(calendar).await,
        Command::ShowHelp => show_help(),
    }
}

async fn add_event(
    content: &str,
    model: &dyn TextModel,
    calendar: &dyn CalendarApi,
    now: DateTime<Utc>,
) -> CommandReply {
    if content.is_empty() {
        return CommandReply::plain(
            "Please provide event details. Example: @add Meeting with John tomorrow at 3pm",
        );
    }

    let prompt = build_extraction_prompt(&PromptKind::ChatAdd { text: content }, now.year());
    let output = match model.generate_text(&prompt).await {
        Ok(output) => output,
        Err(err) => {
            warn!("model call failed for @add: {}", err);
            return add_failure();
        }
    };
    let mut candidate = match parse_candidate(&output) {
        Ok(candidate) => candidate,
        Err(err) => {
            warn!("unusable @add extraction: {}", err);
            return add_failure();
        }
    };
    candidate.source_message_id = email_id_from_link(content);

    let start = resolve_event_date(candidate.raw_date_text.as_deref(), now);

    match calendar.list_upcoming_events(UPCOMING_FETCH_LIMIT).await {
        Ok(events) => {
            if is_duplicate(&candidate.task_text, None, &events) {
                return CommandReply::rendered(format!(
                    "An event titled **{}** is already on your calendar.",
                    candidate.task_text
                ));
            }
        }
        Err(err) => {
            // Creation still proceeds; worst case is a duplicate entry.
            warn!("duplicate check failed for @add: {}", err);
        }
    }

    let provenance = EventProvenance {
        source_message_id: candidate.source_message_id.clone(),
        source_subject: None,
    };
    let request =
        build_event_request(&candidate, start, None, &provenance, CHATBOT_BANNER, true);
    match materialize(calendar, &request).await {
        Ok(created) => {
            let mut reply = format!(
                "Added to calendar: **{}**\n{}",
                created.summary,
                format_confirmation(created.start)
            );
            if let Some(location) = candidate.location.as_deref() {
                reply.push_str(&format!("\nLocation: {}", location));
            }
            if let Some(link) = created.html_link.as_deref() {
                reply.push_str(&format!("\n[View in Calendar]({})", link));
            }
            CommandReply::rendered(reply)
        }
        Err(err) => {
            warn!("event creation failed for @add: {}", err);
            CommandReply::plain("Failed to add the event to your calendar. Please try again.")
        }
    }
}

fn add_failure() -> CommandReply {
    CommandReply::plain(
        "I had trouble adding that event. Please try again with a clearer date and time.",
    )
}

async fn remove_event(content: &str, calendar: &dyn CalendarApi) -> CommandReply {
    if content.is_empty() {
        return CommandReply::plain(
            "Please specify which event to remove. Example: @remove Meeting with John",
        );
    }

    // The argument may already be an event ID.
    match calendar.delete_event(content).await {
        Ok(()) => {
            return CommandReply::plain("✅ Event has been deleted from your calendar.");
        }
        Err(CalendarError::NotFound(_)) => {}
        Err(err) => {
            warn!("deletion by ID failed for @remove: {}", err);
            return CommandReply::plain("Failed to remove the event. Please try again.");
        }
    }

    let events = match calendar.list_upcoming_events(UPCOMING_FETCH_LIMIT).await {
        Ok(events) => events,
        Err(err) => {
            warn!("event listing failed for @remove: {}", err);
            return CommandReply::plain("Failed to remove the event. Please try again.");
        }
    };

    let needle = content.to_lowercase();
    let matches: Vec<&CalendarEvent> = events
        .iter()
        .filter(|event| event.summary.to_lowercase().contains(&needle))
        .collect();

    match matches.as_slice() {
        [] => CommandReply::plain(format!(
            "No upcoming event matching \"{}\" was found.",
            content
        )),
        [only] => match calendar.delete_event(&only.id).await {
            Ok(()) => CommandReply::rendered(format!("✅ Deleted event: **{}**", only.summary)),
            Err(err) => {
                warn!("deletion failed for @remove: {}", err);
                CommandReply::plain("Failed to remove the event. Please try again.")
            }
        },
        several => {
            let mut reply = format!(
                "Found {} events matching \"{}\":\n\n",
                several.len(),
                content
            );
            for (index, event) in several.iter().take(MATCH_LIMIT).enumerate() {
                reply.push_str(&format!(
                    "{}. **{}** - {} (ID: `{}`)\n",
                    index + 1,
                    event.summary,
                    format_listing(event.start),
                    event.id
                ));
            }
            if several.len() > MATCH_LIMIT {
                reply.push_str(&format!("...and {} more\n", several.len() - MATCH_LIMIT));
            }
            reply.push_str("\nTo delete a specific event, use:\n`@remove EVENT_ID`");
            CommandReply::rendered(reply)
        }
    }
}

async fn list_events(calendar: &dyn CalendarApi) -> CommandReply {
    let events = match calendar.list_upcoming_events(UPCOMING_FETCH_LIMIT).await {
        Ok(events) => events,
        Err(err) => {
            warn!("event listing failed for @list: {}", err);
            return CommandReply::plain("Failed to fetch your events. Please try again.");
        }
    };
    if events.is_empty() {
        return CommandReply::plain("You don't have any upcoming events in your calendar.");
    }

    let mut reply = String::from("📅 **Upcoming Events**\n\n");
    for (index, event) in events.iter().take(LIST_LIMIT).enumerate() {
        reply.push_str(&format!(
            "{}. **{}** - {}\n",
            index + 1,
            event.summary,
            format_listing(event.start)
        ));
    }
    if events.len() > LIST_LIMIT {
        reply.push_str(&format!("...and {} more events\n", events.len() - LIST_LIMIT));
    }
    CommandReply::rendered(reply)
}

fn show_help() -> CommandReply {
    CommandReply::rendered(
        "**Available Commands:**\n\n\
         - `@add [event details]` - Add an event to your calendar\n\
         &nbsp;&nbsp;Example: `@add Meeting with John tomorrow at 3pm`\n\
         - `@remove [event ID or description]` - Remove an event from your calendar\n\
         &nbsp;&nbsp;Example: `@remove Meeting with John`\n\
         - `@list` - List your upcoming events\n\
         - `@help` - Show this help message\n\n\
         You can also ask me questions about your calendar or emails in plain language."
            .to_string(),
    )
}

/// When the argument text embeds a Gmail deep link, lift the message ID out
/// of it so the created event records its provenance.
fn email_id_from_link(content: &str) -> Option<String> {
    if !content.contains("https://mail.google.com/mail/") {
        return None;
    }
    let pattern =
        Regex::new(r"mail/u/\d+/#inbox/([a-zA-Z0-9]+)").expect("static pattern compiles");
    pattern
        .captures(content)
        .map(|captures| captures[1].to_string())
}
