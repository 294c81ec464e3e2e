pub mod calendar;
pub mod config;
pub mod credentials;
pub mod gemini;
pub mod gmail;
pub mod preferences;
pub mod server;
pub mod sync;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub use config::ServiceConfig;
pub use server::run_server;
