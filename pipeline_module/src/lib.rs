pub mod collaborators;
pub mod commands;
pub mod dates;
pub mod dedupe;
pub mod errors;
pub mod events;
pub mod extract;
pub mod prompts;
pub mod suggest;
pub mod types;

pub use collaborators::{CalendarApi, Mailbox, TextModel};
pub use errors::{CalendarError, ExtractError, MailError, ModelError};
pub use types::{
    CalendarEvent, CreateEventRequest, EventProvenance, ExtractionCandidate, InboundMessage,
    Suggestion, UserPreferences,
};
