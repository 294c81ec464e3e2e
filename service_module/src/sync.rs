//! Background mail-to-calendar sync.
//!
//! One tokio interval task walks every stored user in turn. A user whose
//! token cannot be refreshed is skipped until they re-authenticate; any
//! other per-user failure is logged and the loop moves on. Messages and
//! events already recorded as provenance are filtered before any create
//! call, and each materialized message is labeled processed afterwards so
//! it drops out of the next listing.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use pipeline_module::dedupe::{is_duplicate, recorded_email_ids, recorded_subjects};
use pipeline_module::events::{build_event_request, materialize, SYNC_BANNER};
use pipeline_module::{CalendarApi, EventProvenance, ExtractionCandidate, Mailbox};

use crate::calendar::GoogleCalendar;
use crate::config::ServiceConfig;
use crate::credentials::{CredentialError, CredentialStore};
use crate::gmail::GmailClient;
use crate::BoxError;

pub fn spawn_sync_loop(
    config: Arc<ServiceConfig>,
    credentials: Arc<CredentialStore>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.sync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            run_sync_pass(&config, &credentials).await;
        }
    })
}

pub async fn run_sync_pass(config: &ServiceConfig, credentials: &CredentialStore) {
    let user_ids = match credentials.list_user_ids() {
        Ok(user_ids) => user_ids,
        Err(err) => {
            error!("cannot enumerate users for sync: {}", err);
            return;
        }
    };

    for user_id in user_ids {
        let token = match credentials.ensure_fresh(&user_id).await {
            Ok(token) => token,
            Err(CredentialError::AuthRequired(_)) => {
                debug!("skipping sync for {}: re-authentication required", user_id);
                continue;
            }
            Err(err) => {
                error!("token refresh failed for {}: {}", user_id, err);
                continue;
            }
        };

        let mailbox = GmailClient::new(token.clone(), config.processed_label.clone());
        let calendar = GoogleCalendar::new(token);
        match sync_mailbox(
            &mailbox,
            &calendar,
            config.mail_fetch_limit,
            config.calendar_max_results,
        )
        .await
        {
            Ok(0) => {}
            Ok(created) => info!("sync created {} events for {}", created, user_id),
            Err(err) => error!("sync failed for {}: {}", user_id, err),
        }
    }
}

/// One sync pass for one user. Returns the number of events created.
pub async fn sync_mailbox(
    mailbox: &dyn Mailbox,
    calendar: &dyn CalendarApi,
    fetch_limit: usize,
    max_results: usize,
) -> Result<usize, BoxError> {
    let messages = mailbox.list_recent_messages(fetch_limit).await?;
    if messages.is_empty() {
        return Ok(0);
    }
    let events = calendar.list_upcoming_events(max_results).await?;
    let known_subjects = recorded_subjects(&events);
    let known_ids = recorded_email_ids(&events);

    let mut created = 0;
    for message in messages {
        if known_ids.contains(&message.id.to_lowercase())
            || known_subjects.contains(&message.subject.trim().to_lowercase())
        {
            debug!("message {} already materialized, relabeling", message.id);
            mark_processed_logged(mailbox, &message.id).await;
            continue;
        }

        let candidate = ExtractionCandidate {
            task_text: format!("Email Event: {}", message.subject),
            raw_date_text: None,
            location: None,
            details: Some(format!("From: {}", message.sender)),
            is_time_sensitive: false,
            source_message_id: Some(message.id.clone()),
        };
        if is_duplicate(&candidate.task_text, Some(&message.subject), &events) {
            mark_processed_logged(mailbox, &message.id).await;
            continue;
        }

        let provenance = EventProvenance {
            source_message_id: Some(message.id.clone()),
            source_subject: Some(message.subject.clone()),
        };
        let start = if message.received_at > Utc::now() {
            Utc::now()
        } else {
            message.received_at
        };
        let request =
            build_event_request(&candidate, start, None, &provenance, SYNC_BANNER, false);
        match materialize(calendar, &request).await {
            Ok(_) => {
                created += 1;
                mark_processed_logged(mailbox, &message.id).await;
            }
            Err(err) => {
                // Leave the message unlabeled so the next pass retries it.
                error!("event creation failed for message {}: {}", message.id, err);
            }
        }
    }
    Ok(created)
}

async fn mark_processed_logged(mailbox: &dyn Mailbox, message_id: &str) {
    if let Err(err) = mailbox.mark_processed(message_id).await {
        error!("failed to label message {} processed: {}", message_id, err);
    }
}
