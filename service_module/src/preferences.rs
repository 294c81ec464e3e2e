//! Per-user interest preferences, one JSON file per user.
//!
//! Read fresh on every request; a missing or unreadable file means the
//! defaults (filtering enabled, no interests, so everything passes).

use std::fs;
use std::path::PathBuf;

use tracing::warn;

use pipeline_module::UserPreferences;

use crate::credentials::sanitize_user_id;

#[derive(Debug, Clone)]
pub struct PreferenceStore {
    dir: PathBuf,
}

impl PreferenceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn load(&self, user_id: &str) -> UserPreferences {
        let path = self
            .dir
            .join(format!("{}.json", sanitize_user_id(user_id)));
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return UserPreferences::default(),
        };
        match serde_json::from_str(&raw) {
            Ok(preferences) => preferences,
            Err(err) => {
                warn!("unreadable preferences for {}: {}", user_id, err);
                UserPreferences::default()
            }
        }
    }
}
