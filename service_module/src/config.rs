use std::env;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::BoxError;

pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 3000;
pub const DEFAULT_MAIL_FETCH_LIMIT: usize = 10;
pub const DEFAULT_CALENDAR_MAX_RESULTS: usize = 50;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub tokens_dir: PathBuf,
    pub preferences_dir: PathBuf,
    pub processed_label: String,
    pub sync_interval: Duration,
    pub mail_fetch_limit: usize,
    pub calendar_max_results: usize,
    /// Allowed CORS origin for the frontend; unset means any origin.
    pub cors_origin: Option<String>,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, BoxError> {
        dotenvy::dotenv().ok();

        let host = env::var("RUNDOWN_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("RUNDOWN_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(5000);

        let gemini_api_key = env_var_non_empty("GEMINI_API_KEY")
            .ok_or_else(|| "GEMINI_API_KEY is not set".to_string())?;
        let gemini_model =
            env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-1.5-flash".to_string());
        let google_client_id = env_var_non_empty("GOOGLE_CLIENT_ID")
            .ok_or_else(|| "GOOGLE_CLIENT_ID is not set".to_string())?;
        let google_client_secret = env_var_non_empty("GOOGLE_CLIENT_SECRET")
            .ok_or_else(|| "GOOGLE_CLIENT_SECRET is not set".to_string())?;

        let tokens_dir =
            resolve_path(env::var("TOKENS_DIR").unwrap_or_else(|_| "tokens".to_string()))?;
        let preferences_dir = resolve_path(
            env::var("PREFERENCES_DIR").unwrap_or_else(|_| "preferences".to_string()),
        )?;
        let processed_label =
            env::var("PROCESSED_LABEL").unwrap_or_else(|_| "RunDownProcessed".to_string());

        let sync_interval = env::var("SYNC_INTERVAL_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|value| *value > 0)
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS));
        let mail_fetch_limit = env::var("MAIL_FETCH_LIMIT")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_MAIL_FETCH_LIMIT);
        let calendar_max_results = env::var("CALENDAR_MAX_RESULTS")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_CALENDAR_MAX_RESULTS);

        let cors_origin = env_var_non_empty("CORS_ORIGIN");

        Ok(Self {
            host,
            port,
            gemini_api_key,
            gemini_model,
            google_client_id,
            google_client_secret,
            tokens_dir,
            preferences_dir,
            processed_label,
            sync_interval,
            mail_fetch_limit,
            calendar_max_results,
            cors_origin,
        })
    }
}

fn env_var_non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn resolve_path(raw: String) -> Result<PathBuf, io::Error> {
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        Ok(path)
    } else {
        let cwd = env::current_dir()?;
        Ok(cwd.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    struct EnvGuard {
        key: String,
        previous: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let previous = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                previous,
            }
        }

        fn unset(key: &str) -> Self {
            let previous = env::var(key).ok();
            env::remove_var(key);
            Self {
                key: key.to_string(),
                previous,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.previous {
                Some(value) => env::set_var(&self.key, value),
                None => env::remove_var(&self.key),
            }
        }
    }

    fn required_guards() -> Vec<EnvGuard> {
        vec![
            EnvGuard::set("GEMINI_API_KEY", "test-api-key"),
            EnvGuard::set("GOOGLE_CLIENT_ID", "test-client-id"),
            EnvGuard::set("GOOGLE_CLIENT_SECRET", "test-client-secret"),
        ]
    }

    #[test]
    #[serial]
    fn defaults_apply_when_optional_vars_are_absent() {
        let _required = required_guards();
        let _unset = [
            EnvGuard::unset("RUNDOWN_HOST"),
            EnvGuard::unset("RUNDOWN_PORT"),
            EnvGuard::unset("GEMINI_MODEL"),
            EnvGuard::unset("PROCESSED_LABEL"),
            EnvGuard::unset("SYNC_INTERVAL_SECS"),
            EnvGuard::unset("MAIL_FETCH_LIMIT"),
            EnvGuard::unset("CALENDAR_MAX_RESULTS"),
            EnvGuard::unset("CORS_ORIGIN"),
        ];

        let config = ServiceConfig::from_env().expect("config");
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 5000);
        assert_eq!(config.gemini_model, "gemini-1.5-flash");
        assert_eq!(config.processed_label, "RunDownProcessed");
        assert_eq!(
            config.sync_interval,
            Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS)
        );
        assert_eq!(config.mail_fetch_limit, DEFAULT_MAIL_FETCH_LIMIT);
        assert_eq!(config.calendar_max_results, DEFAULT_CALENDAR_MAX_RESULTS);
        assert_eq!(config.cors_origin, None);
    }

    #[test]
    #[serial]
    fn env_overrides_take_effect() {
        let _required = required_guards();
        let _overrides = [
            EnvGuard::set("RUNDOWN_PORT", "8080"),
            EnvGuard::set("GEMINI_MODEL", "gemini-1.5-pro"),
            EnvGuard::set("SYNC_INTERVAL_SECS", "60"),
            EnvGuard::set("CORS_ORIGIN", "https://rundown.example.com"),
        ];

        let config = ServiceConfig::from_env().expect("config");
        assert_eq!(config.port, 8080);
        assert_eq!(config.gemini_model, "gemini-1.5-pro");
        assert_eq!(config.sync_interval, Duration::from_secs(60));
        assert_eq!(
            config.cors_origin.as_deref(),
            Some("https://rundown.example.com")
        );
    }

    #[test]
    #[serial]
    fn missing_api_key_is_an_error() {
        let _client_id = EnvGuard::set("GOOGLE_CLIENT_ID", "test-client-id");
        let _client_secret = EnvGuard::set("GOOGLE_CLIENT_SECRET", "test-client-secret");
        let _unset = EnvGuard::unset("GEMINI_API_KEY");
        assert!(ServiceConfig::from_env().is_err());
    }

    #[test]
    #[serial]
    fn invalid_port_falls_back_to_default() {
        let _required = required_guards();
        let _port = EnvGuard::set("RUNDOWN_PORT", "not-a-port");
        let config = ServiceConfig::from_env().expect("config");
        assert_eq!(config.port, 5000);
    }
}
