//! File-backed OAuth credential storage, one JSON file per user.
//!
//! Tokens are refreshed lazily: `ensure_fresh` hands back the cached
//! access token while it still has more than a minute of life, otherwise
//! exchanges the refresh token and persists the result. A user with no
//! stored file or no refresh token surfaces as `AuthRequired`, which the
//! callers translate into a re-authentication prompt.

use std::fs;
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const EXPIRY_BUFFER_SECS: i64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("no usable credentials for user {0}")]
    AuthRequired(String),
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
    client_id: String,
    client_secret: String,
    token_url: String,
    http: reqwest::Client,
}

impl CredentialStore {
    pub fn new(dir: impl Into<PathBuf>, client_id: String, client_secret: String) -> Self {
        Self {
            dir: dir.into(),
            client_id,
            client_secret,
            token_url: GOOGLE_TOKEN_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Point the refresh exchange at a different token endpoint.
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    pub fn load(&self, user_id: &str) -> Result<Option<StoredCredentials>, CredentialError> {
        let path = self.user_path(user_id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    pub fn save(
        &self,
        user_id: &str,
        credentials: &StoredCredentials,
    ) -> Result<(), CredentialError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.user_path(user_id);
        fs::write(&path, serde_json::to_string_pretty(credentials)?)?;
        Ok(())
    }

    /// Every user with a stored credential file, sorted for deterministic
    /// sync order.
    pub fn list_user_ids(&self) -> Result<Vec<String>, CredentialError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut user_ids = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                    user_ids.push(stem.to_string());
                }
            }
        }
        user_ids.sort();
        Ok(user_ids)
    }

    /// Return an access token with at least a minute of validity left,
    /// refreshing and persisting if the cached one is stale.
    pub async fn ensure_fresh(&self, user_id: &str) -> Result<String, CredentialError> {
        let credentials = self
            .load(user_id)?
            .ok_or_else(|| CredentialError::AuthRequired(user_id.to_string()))?;

        if let Some(expires_at) = credentials.expires_at {
            if expires_at > Utc::now() + Duration::seconds(EXPIRY_BUFFER_SECS) {
                return Ok(credentials.access_token);
            }
        }

        let refresh_token = credentials
            .refresh_token
            .clone()
            .ok_or_else(|| CredentialError::AuthRequired(user_id.to_string()))?;

        debug!("refreshing access token for user {}", user_id);
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|err| CredentialError::RefreshFailed(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("token refresh failed for {}: {} {}", user_id, status, body);
            // An invalid_grant means the refresh token was revoked; the
            // user has to re-authenticate.
            if body.contains("invalid_grant") {
                return Err(CredentialError::AuthRequired(user_id.to_string()));
            }
            return Err(CredentialError::RefreshFailed(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let token_response: OAuthTokenResponse = response
            .json()
            .await
            .map_err(|err| CredentialError::RefreshFailed(err.to_string()))?;

        let refreshed = StoredCredentials {
            access_token: token_response.access_token.clone(),
            refresh_token: Some(refresh_token),
            expires_at: Some(Utc::now() + Duration::seconds(token_response.expires_in)),
        };
        self.save(user_id, &refreshed)?;
        Ok(token_response.access_token)
    }

    fn user_path(&self, user_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_user_id(user_id)))
    }
}

/// User IDs are email addresses; map anything outside a conservative
/// filename alphabet to '_' so the ID doubles as a file stem.
pub(crate) fn sanitize_user_id(user_id: &str) -> String {
    user_id
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    expires_in: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;

    fn store(dir: &Path) -> CredentialStore {
        CredentialStore::new(dir, "client-id".to_string(), "client-secret".to_string())
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempdir().expect("tempdir");
        let store = store(dir.path());
        let credentials = StoredCredentials {
            access_token: "token-1".to_string(),
            refresh_token: Some("refresh-1".to_string()),
            expires_at: Some(Utc::now() + Duration::hours(1)),
        };
        store.save("alice@example.com", &credentials).expect("save");

        let loaded = store
            .load("alice@example.com")
            .expect("load")
            .expect("present");
        assert_eq!(loaded.access_token, "token-1");
        assert_eq!(loaded.refresh_token.as_deref(), Some("refresh-1"));
    }

    #[test]
    fn missing_user_loads_as_none() {
        let dir = tempdir().expect("tempdir");
        let store = store(dir.path());
        assert!(store.load("nobody@example.com").expect("load").is_none());
    }

    #[test]
    fn list_user_ids_is_sorted() {
        let dir = tempdir().expect("tempdir");
        let store = store(dir.path());
        let credentials = StoredCredentials {
            access_token: "t".to_string(),
            refresh_token: None,
            expires_at: None,
        };
        store.save("bob@example.com", &credentials).expect("save");
        store.save("alice@example.com", &credentials).expect("save");

        let ids = store.list_user_ids().expect("list");
        assert_eq!(ids, vec!["alice_example.com", "bob_example.com"]);
    }

    #[test]
    fn list_user_ids_with_no_directory_is_empty() {
        let dir = tempdir().expect("tempdir");
        let store = store(&dir.path().join("never-created"));
        assert!(store.list_user_ids().expect("list").is_empty());
    }

    #[test]
    fn sanitization_is_idempotent() {
        let once = sanitize_user_id("alice@example.com");
        assert_eq!(once, "alice_example.com");
        assert_eq!(sanitize_user_id(&once), once);
    }

    #[tokio::test]
    async fn fresh_token_is_returned_without_a_refresh_call() {
        let dir = tempdir().expect("tempdir");
        let store = store(dir.path()).with_token_url("http://127.0.0.1:1/unreachable");
        let credentials = StoredCredentials {
            access_token: "still-good".to_string(),
            refresh_token: Some("refresh-1".to_string()),
            expires_at: Some(Utc::now() + Duration::hours(1)),
        };
        store.save("alice@example.com", &credentials).expect("save");

        let token = store.ensure_fresh("alice@example.com").await.expect("token");
        assert_eq!(token, "still-good");
    }

    #[tokio::test]
    async fn stale_token_is_refreshed_and_persisted() {
        let mut server = mockito::Server::new_async().await;
        let refresh = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token": "fresh-token", "expires_in": 3600}"#)
            .create_async()
            .await;

        let dir = tempdir().expect("tempdir");
        let store = store(dir.path()).with_token_url(format!("{}/token", server.url()));
        let credentials = StoredCredentials {
            access_token: "stale".to_string(),
            refresh_token: Some("refresh-1".to_string()),
            expires_at: Some(Utc::now() - Duration::minutes(5)),
        };
        store.save("alice@example.com", &credentials).expect("save");

        let token = store.ensure_fresh("alice@example.com").await.expect("token");
        assert_eq!(token, "fresh-token");
        refresh.assert_async().await;

        let persisted = store
            .load("alice@example.com")
            .expect("load")
            .expect("present");
        assert_eq!(persisted.access_token, "fresh-token");
        assert!(persisted.expires_at.expect("expiry") > Utc::now());
    }

    #[tokio::test]
    async fn missing_refresh_token_means_reauth() {
        let dir = tempdir().expect("tempdir");
        let store = store(dir.path());
        let credentials = StoredCredentials {
            access_token: "stale".to_string(),
            refresh_token: None,
            expires_at: Some(Utc::now() - Duration::minutes(5)),
        };
        store.save("alice@example.com", &credentials).expect("save");

        let err = store
            .ensure_fresh("alice@example.com")
            .await
            .expect_err("should require reauth");
        assert!(matches!(err, CredentialError::AuthRequired(_)));
    }

    #[tokio::test]
    async fn revoked_refresh_token_means_reauth() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error": "invalid_grant"}"#)
            .create_async()
            .await;

        let dir = tempdir().expect("tempdir");
        let store = store(dir.path()).with_token_url(format!("{}/token", server.url()));
        let credentials = StoredCredentials {
            access_token: "stale".to_string(),
            refresh_token: Some("revoked".to_string()),
            expires_at: Some(Utc::now() - Duration::minutes(5)),
        };
        store.save("alice@example.com", &credentials).expect("save");

        let err = store
            .ensure_fresh("alice@example.com")
            .await
            .expect_err("should require reauth");
        assert!(matches!(err, CredentialError::AuthRequired(_)));
    }
}
