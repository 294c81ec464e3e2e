//! Google Calendar REST client implementing the [`CalendarApi`] seam.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::warn;

use pipeline_module::{CalendarApi, CalendarError, CalendarEvent, CreateEventRequest};

const CALENDAR_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

/// Reminder overrides attached when a create request asks for reminders:
/// email a day ahead, popup half an hour ahead.
const REMINDER_EMAIL_MINUTES: u32 = 24 * 60;
const REMINDER_POPUP_MINUTES: u32 = 30;

#[derive(Debug, Clone)]
pub struct GoogleCalendar {
    http: reqwest::Client,
    access_token: String,
    base_url: String,
}

impl GoogleCalendar {
    pub fn new(access_token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            access_token,
            base_url: CALENDAR_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn events_url(&self) -> String {
        format!("{}/calendars/primary/events", self.base_url)
    }
}

#[async_trait]
impl CalendarApi for GoogleCalendar {
    async fn list_upcoming_events(
        &self,
        max_results: usize,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let response = self
            .http
            .get(self.events_url())
            .bearer_auth(&self.access_token)
            .query(&[
                ("maxResults", max_results.to_string()),
                ("timeMin", Utc::now().to_rfc3339()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ])
            .send()
            .await
            .map_err(|err| CalendarError::Api(err.to_string()))?;
        let listing: EventListing = check_json(response).await?;

        let mut events = Vec::new();
        for resource in listing.items {
            match into_event(resource) {
                Some(event) => events.push(event),
                None => warn!("skipping calendar event with no usable start time"),
            }
        }
        Ok(events)
    }

    async fn create_event(
        &self,
        request: &CreateEventRequest,
    ) -> Result<CalendarEvent, CalendarError> {
        let reminders = if request.reminders {
            serde_json::json!({
                "useDefault": false,
                "overrides": [
                    {"method": "email", "minutes": REMINDER_EMAIL_MINUTES},
                    {"method": "popup", "minutes": REMINDER_POPUP_MINUTES},
                ],
            })
        } else {
            serde_json::json!({ "useDefault": true })
        };
        let mut body = serde_json::json!({
            "summary": request.summary,
            "description": request.description,
            "start": {"dateTime": request.start.to_rfc3339(), "timeZone": "UTC"},
            "end": {"dateTime": request.end.to_rfc3339(), "timeZone": "UTC"},
            "reminders": reminders,
        });
        if let Some(location) = &request.location {
            body["location"] = serde_json::Value::String(location.clone());
        }

        let response = self
            .http
            .post(self.events_url())
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|err| CalendarError::Api(err.to_string()))?;
        let created: EventResource = check_json(response).await?;
        into_event(created)
            .ok_or_else(|| CalendarError::Api("created event has no start time".to_string()))
    }

    async fn delete_event(&self, event_id: &str) -> Result<(), CalendarError> {
        let response = self
            .http
            .delete(format!("{}/{}", self.events_url(), event_id))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|err| CalendarError::Api(err.to_string()))?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                Err(CalendarError::NotFound(event_id.to_string()))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(CalendarError::AuthRequired),
            status => Err(CalendarError::Api(format!("HTTP {}", status))),
        }
    }
}

fn into_event(resource: EventResource) -> Option<CalendarEvent> {
    let start = event_time(&resource.start)?;
    let end = event_time(&resource.end).unwrap_or(start);
    Some(CalendarEvent {
        id: resource.id,
        summary: resource.summary.unwrap_or_default(),
        description: resource.description.unwrap_or_default(),
        start,
        end,
        html_link: resource.html_link,
    })
}

/// Timed events carry `dateTime`; all-day events carry a bare `date`,
/// which is read as midnight UTC.
fn event_time(time: &Option<EventTime>) -> Option<DateTime<Utc>> {
    let time = time.as_ref()?;
    if let Some(date_time) = &time.date_time {
        return DateTime::parse_from_rfc3339(date_time)
            .ok()
            .map(|value| value.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(time.date.as_deref()?, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

async fn check_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, CalendarError> {
    match response.status() {
        status if status.is_success() => {}
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            return Err(CalendarError::AuthRequired)
        }
        status => return Err(CalendarError::Api(format!("HTTP {}", status))),
    }
    response
        .json()
        .await
        .map_err(|err| CalendarError::Api(err.to_string()))
}

#[derive(Debug, Deserialize)]
struct EventListing {
    #[serde(default)]
    items: Vec<EventResource>,
}

#[derive(Debug, Deserialize)]
struct EventResource {
    id: String,
    summary: Option<String>,
    description: Option<String>,
    start: Option<EventTime>,
    end: Option<EventTime>,
    #[serde(rename = "htmlLink")]
    html_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventTime {
    #[serde(rename = "dateTime")]
    date_time: Option<String>,
    date: Option<String>,
}
