//! Instruction text sent to the language model.
//!
//! Each extraction kind gets one instruction block requesting a fixed-key
//! JSON object. The caller's current year is embedded in the date guidance
//! so the model's guesses stay anchored to the same year the resolver
//! corrects against.

/// Marker the model is told to prefix onto non-actionable email summaries.
/// Anything starting with this is excluded from the calendar entirely.
pub const FYI_MARKER: &str = "FYI:";

/// What kind of raw text is being handed to the model for extraction.
#[derive(Debug, Clone, Copy)]
pub enum PromptKind<'a> {
    /// An email body that may or may not contain an actionable task.
    EmailTask { subject: &'a str, body: &'a str },
    /// The free text after an `@add` chat command.
    ChatAdd { text: &'a str },
    /// A manually entered task description.
    ManualTask { text: &'a str },
}

pub fn build_extraction_prompt(kind: &PromptKind<'_>, current_year: i32) -> String {
    match kind {
        PromptKind::EmailTask { subject, body } => format!(
            r#"**Email Subject:** {subject}
**Email Content:** {body}

Extract the following information from this email:
1. A task description (what needs to be done or attended)
2. When this task/event is happening (date and time in YYYY-MM-DD HH:MM format)
3. Where it's happening (location)
4. Is this time-sensitive? (yes/no)

Format your response as JSON:
{{
    "task": "task description",
    "event_date": "YYYY-MM-DD HH:MM or none if not found",
    "location": "location if mentioned or none",
    "is_time_sensitive": true/false
}}

If there is no clear task or this is just an informational email, respond with:
{{
    "task": "{FYI_MARKER} brief summary of what this email is about",
    "event_date": "none",
    "location": "none",
    "is_time_sensitive": false
}}

{date_rules}"#,
            subject = subject,
            body = body,
            date_rules = date_rules(current_year),
        ),
        PromptKind::ChatAdd { text } => format!(
            r#"Extract event details from the following text: "{text}"

Provide a JSON response with:
1. A concise event title
2. The date and time of the event (YYYY-MM-DD HH:MM format)
3. Location (if mentioned)
4. Any other important details

Format:
{{
    "title": "Event title",
    "date": "YYYY-MM-DD HH:MM",
    "location": "Location or null",
    "details": "Additional details or null"
}}

{date_rules}"#,
            text = text,
            date_rules = date_rules(current_year),
        ),
        PromptKind::ManualTask { text } => format!(
            r#"User wants to add a task: "{text}"

Extract the following information:
1. Task title (a concise version of the task, 5-10 words)
2. Date and time when this task is due or scheduled to happen (EXACT DATE AND TIME)
3. Location of the task/event (if mentioned)
4. Any other important details

Format your response as JSON with:
{{
    "title": "concise task title",
    "date": "YYYY-MM-DD HH:MM" or null if not specified,
    "location": "location string or null if not mentioned",
    "details": "other important details or null"
}}

{date_rules}"#,
            text = text,
            date_rules = date_rules(current_year),
        ),
    }
}

/// Prompt for free-form chat messages that did not match any command
/// prefix. `context` carries the user's calendar or mail summary.
pub fn build_chat_prompt(user_message: &str, context: &str) -> String {
    let context_section = if context.trim().is_empty() {
        String::new()
    } else {
        format!("**Relevant Data:**\n{}\n\n", context.trim_end())
    };
    format!(
        r#"You are an AI assistant for RunDown, a task management application. You have access to the following information:

{context_section}The user can use the following commands:
- @add [event details] - Add an event to calendar (e.g., "@add Meeting with John tomorrow at 3pm")
- @remove [event ID or description] - Remove an event from calendar
- @list - List upcoming events
- @help - Show available commands

Refer to the above details and answer the upcoming questions. Prefer a concise answer.
If the user is asking about adding or removing events, suggest using the appropriate command.

User Query: {user_message}"#,
        context_section = context_section,
        user_message = user_message,
    )
}

fn date_rules(current_year: i32) -> String {
    format!(
        r#"For dates:
- If no date is specified, use tomorrow at 9am
- If a date is specified without a year, use the current year {current_year}
- If a date mentions a month after the current month with no year, assume the current year
- If a date mentions a month before the current month with no year, assume next year
- Always provide the full date in YYYY-MM-DD HH:MM format"#,
        current_year = current_year,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_embeds_the_current_year() {
        let kinds = [
            PromptKind::EmailTask {
                subject: "Standup",
                body: "Daily sync at 9",
            },
            PromptKind::ChatAdd {
                text: "Dentist on Friday",
            },
            PromptKind::ManualTask {
                text: "File taxes",
            },
        ];
        for kind in &kinds {
            let prompt = build_extraction_prompt(kind, 2027);
            assert!(prompt.contains("2027"), "missing year in {:?}", kind);
            assert!(prompt.contains("YYYY-MM-DD HH:MM"));
        }
    }

    #[test]
    fn email_kind_carries_the_fyi_convention() {
        let prompt = build_extraction_prompt(
            &PromptKind::EmailTask {
                subject: "Newsletter",
                body: "This week in Rust",
            },
            2025,
        );
        assert!(prompt.contains(FYI_MARKER));
        assert!(prompt.contains("Newsletter"));
    }

    #[test]
    fn chat_prompt_lists_commands_and_context() {
        let prompt = build_chat_prompt("what is on my plate?", "1. Team Sync - Monday");
        assert!(prompt.contains("@add"));
        assert!(prompt.contains("Team Sync"));
        assert!(prompt.contains("what is on my plate?"));
    }
}
