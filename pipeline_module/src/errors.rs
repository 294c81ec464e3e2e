use thiserror::Error;

/// The model's free-form answer could not be turned into a structured
/// candidate. Always recoverable: callers fall back to raw text or a
/// user-facing retry message, never a crash.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("model response could not be parsed: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model returned an empty response")]
    Empty,
    #[error("model call failed: {0}")]
    Api(String),
}

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("event not found: {0}")]
    NotFound(String),
    #[error("authentication required")]
    AuthRequired,
    #[error("calendar api error: {0}")]
    Api(String),
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("authentication required")]
    AuthRequired,
    #[error("mail api error: {0}")]
    Api(String),
}
