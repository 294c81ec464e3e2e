//! Gmail REST client implementing the [`Mailbox`] seam.
//!
//! Listing excludes anything carrying the processed label, so a message
//! disappears from the sync feed the moment `mark_processed` lands. The
//! label is created on first use.

use async_trait::async_trait;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{TimeZone, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::warn;

use pipeline_module::{InboundMessage, MailError, Mailbox};

const GMAIL_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

#[derive(Debug, Clone)]
pub struct GmailClient {
    http: reqwest::Client,
    access_token: String,
    processed_label: String,
    base_url: String,
    /// Restrict listing to messages newer than this many days.
    newer_than_days: Option<u32>,
}

impl GmailClient {
    pub fn new(access_token: String, processed_label: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            access_token,
            processed_label,
            base_url: GMAIL_BASE_URL.to_string(),
            newer_than_days: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn newer_than_days(mut self, days: Option<u32>) -> Self {
        self.newer_than_days = days;
        self
    }

    fn list_query(&self) -> String {
        let mut query = format!("-label:{}", self.processed_label);
        if let Some(days) = self.newer_than_days {
            query.push_str(&format!(" newer_than:{}d", days));
        }
        query
    }

    async fn processed_label_id(&self) -> Result<String, MailError> {
        let response = self
            .http
            .get(format!("{}/labels", self.base_url))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|err| MailError::Api(err.to_string()))?;
        let labels: LabelList = check_json(response).await?;
        if let Some(label) = labels
            .labels
            .iter()
            .find(|label| label.name == self.processed_label)
        {
            return Ok(label.id.clone());
        }

        let response = self
            .http
            .post(format!("{}/labels", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({
                "name": self.processed_label,
                "labelListVisibility": "labelHide",
                "messageListVisibility": "hide",
            }))
            .send()
            .await
            .map_err(|err| MailError::Api(err.to_string()))?;
        let created: Label = check_json(response).await?;
        Ok(created.id)
    }
}

#[async_trait]
impl Mailbox for GmailClient {
    async fn list_recent_messages(&self, limit: usize) -> Result<Vec<InboundMessage>, MailError> {
        let response = self
            .http
            .get(format!("{}/messages", self.base_url))
            .bearer_auth(&self.access_token)
            .query(&[
                ("maxResults", limit.to_string()),
                ("q", self.list_query()),
            ])
            .send()
            .await
            .map_err(|err| MailError::Api(err.to_string()))?;
        let listing: MessageList = check_json(response).await?;

        let mut messages = Vec::new();
        for reference in listing.messages.unwrap_or_default() {
            match self.get_message(&reference.id).await {
                Ok(message) => messages.push(message),
                Err(MailError::AuthRequired) => return Err(MailError::AuthRequired),
                Err(err) => warn!("skipping unreadable message {}: {}", reference.id, err),
            }
        }
        Ok(messages)
    }

    async fn get_message(&self, message_id: &str) -> Result<InboundMessage, MailError> {
        let response = self
            .http
            .get(format!("{}/messages/{}", self.base_url, message_id))
            .bearer_auth(&self.access_token)
            .query(&[("format", "full")])
            .send()
            .await
            .map_err(|err| MailError::Api(err.to_string()))?;
        let message: GmailMessage = check_json(response).await?;
        Ok(into_inbound(message))
    }

    async fn mark_processed(&self, message_id: &str) -> Result<(), MailError> {
        let label_id = self.processed_label_id().await?;
        let response = self
            .http
            .post(format!("{}/messages/{}/modify", self.base_url, message_id))
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({ "addLabelIds": [label_id] }))
            .send()
            .await
            .map_err(|err| MailError::Api(err.to_string()))?;
        check_status(&response)?;
        Ok(())
    }
}

fn into_inbound(message: GmailMessage) -> InboundMessage {
    let subject = header_value(&message, "Subject").unwrap_or_else(|| "(no subject)".to_string());
    let sender = header_value(&message, "From").unwrap_or_default();
    let received_at = message
        .internal_date
        .as_deref()
        .and_then(|millis| millis.parse::<i64>().ok())
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
        .unwrap_or_else(Utc::now);
    let body_text = message
        .payload
        .as_ref()
        .and_then(text_plain_body)
        .unwrap_or_default();

    InboundMessage {
        id: message.id,
        subject,
        sender,
        received_at,
        body_text,
    }
}

fn header_value(message: &GmailMessage, name: &str) -> Option<String> {
    message
        .payload
        .as_ref()?
        .headers
        .as_ref()?
        .iter()
        .find(|header| header.name.eq_ignore_ascii_case(name))
        .map(|header| header.value.clone())
}

/// Depth-first search for the first `text/plain` part with decodable body
/// data. A single-part message carries its data on the payload itself.
fn text_plain_body(part: &MessagePart) -> Option<String> {
    if part.mime_type.as_deref() == Some("text/plain") {
        if let Some(text) = part
            .body
            .as_ref()
            .and_then(|body| body.data.as_deref())
            .and_then(decode_body)
        {
            return Some(text);
        }
    }
    if let Some(parts) = &part.parts {
        for nested in parts {
            if let Some(text) = text_plain_body(nested) {
                return Some(text);
            }
        }
    }
    // Top-level fallback for messages with no multipart structure.
    if part.parts.is_none() && part.mime_type.is_none() {
        if let Some(text) = part
            .body
            .as_ref()
            .and_then(|body| body.data.as_deref())
            .and_then(decode_body)
        {
            return Some(text);
        }
    }
    None
}

/// Gmail emits URL-safe base64; padding presence varies by part.
fn decode_body(data: &str) -> Option<String> {
    let bytes = URL_SAFE
        .decode(data)
        .or_else(|_| URL_SAFE_NO_PAD.decode(data))
        .ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

fn check_status(response: &reqwest::Response) -> Result<(), MailError> {
    match response.status() {
        status if status.is_success() => Ok(()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(MailError::AuthRequired),
        status => Err(MailError::Api(format!("HTTP {}", status))),
    }
}

async fn check_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, MailError> {
    check_status(&response)?;
    response
        .json()
        .await
        .map_err(|err| MailError::Api(err.to_string()))
}

#[derive(Debug, Deserialize)]
struct MessageList {
    messages: Option<Vec<MessageRef>>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GmailMessage {
    id: String,
    #[serde(rename = "internalDate")]
    internal_date: Option<String>,
    payload: Option<MessagePart>,
}

#[derive(Debug, Deserialize)]
struct MessagePart {
    #[serde(rename = "mimeType")]
    mime_type: Option<String>,
    headers: Option<Vec<Header>>,
    body: Option<PartBody>,
    parts: Option<Vec<MessagePart>>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct PartBody {
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LabelList {
    #[serde(default)]
    labels: Vec<Label>,
}

#[derive(Debug, Deserialize)]
struct Label {
    id: String,
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE as B64;

    fn client(base_url: &str) -> GmailClient {
        GmailClient::new("test-token".to_string(), "RunDownProcessed".to_string())
            .with_base_url(base_url)
    }

    #[test]
    fn nested_multipart_body_is_found() {
        let encoded = B64.encode("Meeting at noon tomorrow.");
        let part: MessagePart = serde_json::from_value(serde_json::json!({
            "mimeType": "multipart/alternative",
            "parts": [
                {"mimeType": "text/html", "body": {"data": B64.encode("<p>hi</p>")}},
                {
                    "mimeType": "multipart/mixed",
                    "parts": [
                        {"mimeType": "text/plain", "body": {"data": encoded}}
                    ]
                }
            ]
        }))
        .expect("part");
        assert_eq!(
            text_plain_body(&part).as_deref(),
            Some("Meeting at noon tomorrow.")
        );
    }

    #[test]
    fn unpadded_base64_decodes() {
        // "hi!" URL-safe without padding.
        assert_eq!(decode_body("aGkh").as_deref(), Some("hi!"));
    }

    #[tokio::test]
    async fn listing_excludes_processed_label_and_decodes_bodies() {
        let mut server = mockito::Server::new_async().await;
        let encoded = B64.encode("Budget review Friday at 10am.");
        server
            .mock("GET", "/messages")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("maxResults".into(), "5".into()),
                mockito::Matcher::UrlEncoded("q".into(), "-label:RunDownProcessed".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"messages": [{"id": "m1"}]}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/messages/m1")
            .match_query(mockito::Matcher::UrlEncoded("format".into(), "full".into()))
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "id": "m1",
                    "internalDate": "1717200000000",
                    "payload": {
                        "mimeType": "text/plain",
                        "headers": [
                            {"name": "Subject", "value": "Budget review"},
                            {"name": "From", "value": "cfo@example.com"}
                        ],
                        "body": {"data": encoded}
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let messages = client(&server.url())
            .list_recent_messages(5)
            .await
            .expect("messages");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].subject, "Budget review");
        assert_eq!(messages[0].sender, "cfo@example.com");
        assert_eq!(messages[0].body_text, "Budget review Friday at 10am.");
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth_required() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/messages")
            .match_query(mockito::Matcher::Any)
            .with_status(401)
            .create_async()
            .await;

        let err = client(&server.url())
            .list_recent_messages(5)
            .await
            .expect_err("should fail");
        assert!(matches!(err, MailError::AuthRequired));
    }

    #[tokio::test]
    async fn mark_processed_creates_the_label_when_missing() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/labels")
            .with_status(200)
            .with_body(r#"{"labels": [{"id": "Label_1", "name": "Other"}]}"#)
            .create_async()
            .await;
        let create_label = server
            .mock("POST", "/labels")
            .with_status(200)
            .with_body(r#"{"id": "Label_9", "name": "RunDownProcessed"}"#)
            .create_async()
            .await;
        let modify = server
            .mock("POST", "/messages/m1/modify")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "addLabelIds": ["Label_9"]
            })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        client(&server.url())
            .mark_processed("m1")
            .await
            .expect("mark processed");
        create_label.assert_async().await;
        modify.assert_async().await;
    }
}
