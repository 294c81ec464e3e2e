//! HTTP surface: thin glue between axum and the pipeline.
//!
//! Every route except /health identifies the caller through the
//! `X-RunDown-User` header and exchanges the stored refresh token for an
//! access token up front. Anything credential-less answers 401 with
//! `{"error": "reauth_required"}` so the frontend can restart OAuth.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Datelike, Utc};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use pipeline_module::commands::{parse_command, run_command};
use pipeline_module::dates::{format_confirmation, parse_with_corrections, resolve_event_date};
use pipeline_module::events::{build_event_request, materialize, TASK_BANNER};
use pipeline_module::extract::parse_candidate;
use pipeline_module::prompts::{build_chat_prompt, build_extraction_prompt, PromptKind};
use pipeline_module::suggest::generate_suggestions;
use pipeline_module::{
    CalendarApi, CalendarError, EventProvenance, ExtractionCandidate, Mailbox, TextModel,
};

use crate::calendar::GoogleCalendar;
use crate::config::ServiceConfig;
use crate::credentials::CredentialStore;
use crate::gemini::GeminiClient;
use crate::gmail::GmailClient;
use crate::preferences::PreferenceStore;
use crate::sync::spawn_sync_loop;
use crate::BoxError;

const USER_HEADER: &str = "x-rundown-user";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub credentials: Arc<CredentialStore>,
    pub preferences: Arc<PreferenceStore>,
}

pub async fn run_server(
    config: ServiceConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), BoxError> {
    let config = Arc::new(config);
    let credentials = Arc::new(CredentialStore::new(
        config.tokens_dir.clone(),
        config.google_client_id.clone(),
        config.google_client_secret.clone(),
    ));
    let preferences = Arc::new(PreferenceStore::new(config.preferences_dir.clone()));

    let sync_handle = spawn_sync_loop(config.clone(), credentials.clone());

    let state = AppState {
        config: config.clone(),
        credentials,
        preferences,
    };

    let host: IpAddr = config
        .host
        .parse()
        .map_err(|_| format!("invalid host: {}", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    info!("RunDown service listening on {}", addr);

    let app = Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/addsuggestion", post(add_suggestion))
        .route("/addtask", post(add_task))
        .route("/calendar", get(calendar_events))
        .route("/gmail", get(gmail_messages))
        .with_state(state)
        .layer(cors_layer(&config));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;
    sync_handle.abort();
    serve_result?;
    Ok(())
}

fn cors_layer(config: &ServiceConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match config
        .cors_origin
        .as_deref()
        .and_then(|origin| origin.parse::<HeaderValue>().ok())
    {
        Some(origin) => layer.allow_origin(origin),
        None => layer.allow_origin(Any),
    }
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Resolve the caller to a fresh access token, or produce the 401 body.
async fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(String, String), Response> {
    let user_id = headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(reauth_response)?;
    let token = state.credentials.ensure_fresh(&user_id).await.map_err(|err| {
        warn!("authorization failed for {}: {}", user_id, err);
        reauth_response()
    })?;
    Ok((user_id, token))
}

fn reauth_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "reauth_required"})),
    )
        .into_response()
}

fn upstream_error(context: &str, err: impl std::fmt::Display) -> Response {
    error!("{}: {}", context, err);
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({"error": context})),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
}

async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Response {
    let (_, token) = match authorize(&state, &headers).await {
        Ok(authorized) => authorized,
        Err(response) => return response,
    };
    let model = GeminiClient::new(
        state.config.gemini_api_key.clone(),
        state.config.gemini_model.clone(),
    );
    let calendar = GoogleCalendar::new(token.clone());

    if let Some((command, content)) = parse_command(&request.message) {
        let reply = run_command(command, &content, &model, &calendar, Utc::now()).await;
        return Json(json!({
            "response": reply.text,
            "command_detected": true,
            "markdown": reply.markdown,
        }))
        .into_response();
    }

    // Free-form question: ground the model in mail when the user mentions
    // "@email", otherwise in the calendar.
    let context = if request.message.to_lowercase().contains("@email") {
        let mailbox = GmailClient::new(token, state.config.processed_label.clone());
        match mailbox
            .list_recent_messages(state.config.mail_fetch_limit)
            .await
        {
            Ok(messages) => messages
                .iter()
                .enumerate()
                .map(|(index, message)| {
                    format!(
                        "{}. From {}: {} - {}",
                        index + 1,
                        message.sender,
                        message.subject,
                        snippet(&message.body_text)
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Err(err) => return upstream_error("mail fetch failed", err),
        }
    } else {
        match calendar
            .list_upcoming_events(state.config.calendar_max_results)
            .await
        {
            Ok(events) => events
                .iter()
                .enumerate()
                .map(|(index, event)| {
                    format!(
                        "{}. {} - {}",
                        index + 1,
                        event.summary,
                        format_confirmation(event.start)
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Err(err) => return upstream_error("calendar fetch failed", err),
        }
    };

    let prompt = build_chat_prompt(&request.message, &context);
    match model.generate_text(&prompt).await {
        Ok(answer) => Json(json!({
            "response": answer,
            "command_detected": false,
            "markdown": false,
        }))
        .into_response(),
        Err(err) => upstream_error("model call failed", err),
    }
}

fn snippet(body: &str) -> String {
    let flattened = body.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut end = flattened.len().min(120);
    while !flattened.is_char_boundary(end) {
        end -= 1;
    }
    flattened[..end].to_string()
}

#[derive(Debug, Default, Deserialize)]
struct SuggestionRequest {
    /// Restrict scanned mail to the last N days.
    time_period: Option<u32>,
}

async fn add_suggestion(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<SuggestionRequest>>,
) -> Response {
    let (user_id, token) = match authorize(&state, &headers).await {
        Ok(authorized) => authorized,
        Err(response) => return response,
    };
    let request = body.map(|Json(request)| request).unwrap_or_default();

    let mailbox = GmailClient::new(token.clone(), state.config.processed_label.clone())
        .newer_than_days(request.time_period);
    let calendar = GoogleCalendar::new(token);
    let model = GeminiClient::new(
        state.config.gemini_api_key.clone(),
        state.config.gemini_model.clone(),
    );

    let messages = match mailbox
        .list_recent_messages(state.config.mail_fetch_limit)
        .await
    {
        Ok(messages) => messages,
        Err(err) => return upstream_error("mail fetch failed", err),
    };
    let events = match calendar
        .list_upcoming_events(state.config.calendar_max_results)
        .await
    {
        Ok(events) => events,
        Err(err) => return upstream_error("calendar fetch failed", err),
    };
    let preferences = state.preferences.load(&user_id);

    let suggestions =
        generate_suggestions(&messages, &events, &preferences, &model, Utc::now()).await;
    Json(json!({ "suggestions": suggestions })).into_response()
}

/// Accepted as JSON or as a bare text body carrying only the task.
#[derive(Debug, Deserialize)]
struct AddTaskRequest {
    task: String,
    event_date: Option<String>,
    location: Option<String>,
    email_id: Option<String>,
    email_subject: Option<String>,
}

fn parse_add_task_body(body: &str) -> Option<AddTaskRequest> {
    if let Ok(request) = serde_json::from_str::<AddTaskRequest>(body) {
        return Some(request);
    }
    let task = body.trim();
    if task.is_empty() || task.starts_with('{') {
        return None;
    }
    Some(AddTaskRequest {
        task: task.to_string(),
        event_date: None,
        location: None,
        email_id: None,
        email_subject: None,
    })
}

async fn add_task(State(state): State<AppState>, headers: HeaderMap, body: String) -> Response {
    let (_, token) = match authorize(&state, &headers).await {
        Ok(authorized) => authorized,
        Err(response) => return response,
    };
    let request = match parse_add_task_body(&body) {
        Some(request) => request,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "no task provided"})),
            )
                .into_response();
        }
    };
    let calendar = GoogleCalendar::new(token);
    let now = Utc::now();

    // A confirmed suggestion arrives with the date the pipeline already
    // extracted; reuse it and skip the model round-trip.
    if let Some(start) = request
        .event_date
        .as_deref()
        .and_then(|raw| parse_with_corrections(raw, now))
    {
        let candidate = ExtractionCandidate {
            task_text: request.task.clone(),
            raw_date_text: request.event_date.clone(),
            location: request.location.clone(),
            details: None,
            is_time_sensitive: false,
            source_message_id: request.email_id.clone(),
        };
        let provenance = EventProvenance {
            source_message_id: request.email_id.clone(),
            source_subject: request.email_subject.clone(),
        };
        let create =
            build_event_request(&candidate, start, None, &provenance, TASK_BANNER, true);
        return match materialize(&calendar, &create).await {
            Ok(created) => Json(json!({
                "response": format!(
                    "✅ Task added to calendar: {} on {}",
                    created.summary,
                    format_confirmation(created.start)
                ),
            }))
            .into_response(),
            Err(CalendarError::AuthRequired) => reauth_response(),
            Err(err) => upstream_error("event creation failed", err),
        };
    }

    // Otherwise extract the schedule from the task text.
    let model = GeminiClient::new(
        state.config.gemini_api_key.clone(),
        state.config.gemini_model.clone(),
    );
    let prompt =
        build_extraction_prompt(&PromptKind::ManualTask { text: &request.task }, now.year());
    let output = match model.generate_text(&prompt).await {
        Ok(output) => output,
        Err(err) => return upstream_error("model call failed", err),
    };
    match parse_candidate(&output) {
        Ok(mut candidate) => {
            candidate.source_message_id = request.email_id.clone();
            let start = resolve_event_date(candidate.raw_date_text.as_deref(), now);
            let provenance = EventProvenance {
                source_message_id: request.email_id.clone(),
                source_subject: request.email_subject.clone(),
            };
            let create =
                build_event_request(&candidate, start, None, &provenance, TASK_BANNER, true);
            match materialize(&calendar, &create).await {
                Ok(created) => Json(json!({
                    "response": format!(
                        "✅ Task added to calendar: {} on {}",
                        created.summary,
                        format_confirmation(created.start)
                    ),
                }))
                .into_response(),
                Err(CalendarError::AuthRequired) => reauth_response(),
                Err(err) => upstream_error("event creation failed", err),
            }
        }
        // No structure to act on; relay whatever the model said.
        Err(_) => Json(json!({ "response": output.trim() })).into_response(),
    }
}

async fn calendar_events(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (_, token) = match authorize(&state, &headers).await {
        Ok(authorized) => authorized,
        Err(response) => return response,
    };
    let calendar = GoogleCalendar::new(token);
    match calendar
        .list_upcoming_events(state.config.calendar_max_results)
        .await
    {
        Ok(events) => Json(json!({ "events": events })).into_response(),
        Err(CalendarError::AuthRequired) => reauth_response(),
        Err(err) => upstream_error("calendar fetch failed", err),
    }
}

async fn gmail_messages(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (_, token) = match authorize(&state, &headers).await {
        Ok(authorized) => authorized,
        Err(response) => return response,
    };
    let mailbox = GmailClient::new(token, state.config.processed_label.clone());
    match mailbox
        .list_recent_messages(state.config.mail_fetch_limit)
        .await
    {
        Ok(messages) => Json(json!({ "emails": messages })).into_response(),
        Err(pipeline_module::MailError::AuthRequired) => reauth_response(),
        Err(err) => upstream_error("mail fetch failed", err),
    }
}
