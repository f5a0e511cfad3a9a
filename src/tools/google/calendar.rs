//! Calendar tools

use async_trait::async_trait;
use chrono::{Duration, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{GoogleApi, SCOPE_CALENDAR};
use crate::auth::Credential;
use crate::error::{GoogleMcpError, Result};
use crate::tools::{parse_arguments, ToolDescriptor, ToolHandler, ToolRegistry};

pub(super) fn register(registry: &mut ToolRegistry, api: &GoogleApi) -> Result<()> {
    registry.register(ToolDescriptor::new(
        "list_calendar_events",
        "List upcoming events on the primary calendar.",
        json!({
            "type": "object",
            "properties": {
                "max_results": {"type": "integer", "minimum": 1, "description": "Maximum events (default 10)"},
                "days_back": {"type": "integer", "minimum": 0, "description": "Include events starting this many days ago (default 0)"}
            }
        }),
        [SCOPE_CALENDAR],
        Arc::new(ListEvents { api: api.clone() }),
    ))?;
    registry.register(ToolDescriptor::new(
        "create_calendar_event",
        "Create an event on the primary calendar. Times: YYYY-MM-DDTHH:MM or RFC 3339.",
        json!({
            "type": "object",
            "properties": {
                "summary": {"type": "string"},
                "start_time": {"type": "string"},
                "end_time": {"type": "string"},
                "description": {"type": "string"},
                "time_zone": {"type": "string", "description": "IANA time zone (default UTC)"}
            },
            "required": ["summary", "start_time", "end_time"]
        }),
        [SCOPE_CALENDAR],
        Arc::new(CreateEvent { api: api.clone() }),
    ))?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct ListEventsParams {
    #[serde(default = "default_max_results")]
    max_results: u32,
    #[serde(default)]
    days_back: u32,
}

fn default_max_results() -> u32 {
    10
}

struct ListEvents {
    api: GoogleApi,
}

#[async_trait]
impl ToolHandler for ListEvents {
    async fn invoke(&self, arguments: Value, credential: &Credential) -> Result<Value> {
        let params: ListEventsParams = parse_arguments(arguments)?;
        let time_min = (Utc::now() - Duration::days(i64::from(params.days_back)))
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        let max_results = params.max_results.clamp(1, 2500).to_string();

        let url = format!(
            "{}/calendars/primary/events",
            self.api.config().calendar_base
        );
        let response = self
            .api
            .get_with_query(
                &url,
                &[
                    ("timeMin", time_min.as_str()),
                    ("maxResults", max_results.as_str()),
                    ("singleEvents", "true"),
                    ("orderBy", "startTime"),
                ],
                credential,
            )
            .await?;

        let events: Vec<Value> = response
            .get("items")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .map(|event| {
                let start = event
                    .get("start")
                    .and_then(|s| s.get("dateTime").or_else(|| s.get("date")));
                json!({
                    "id": event.get("id"),
                    "summary": event.get("summary"),
                    "start": start,
                })
            })
            .collect();

        Ok(json!({ "events": events }))
    }
}

#[derive(Debug, Deserialize)]
struct CreateEventParams {
    summary: String,
    start_time: String,
    end_time: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_time_zone")]
    time_zone: String,
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

/// Accepts `YYYY-MM-DDTHH:MM` (seconds appended) or a full RFC 3339 value.
fn normalize_date_time(value: &str) -> Result<String> {
    if chrono::DateTime::parse_from_rfc3339(value).is_ok() {
        return Ok(value.to_string());
    }
    for (format, suffix) in [("%Y-%m-%dT%H:%M", ":00"), ("%Y-%m-%dT%H:%M:%S", "")] {
        if chrono::NaiveDateTime::parse_from_str(value, format).is_ok() {
            return Ok(format!("{value}{suffix}"));
        }
    }
    Err(GoogleMcpError::InvalidArguments(format!(
        "'{value}' is not a date-time (expected YYYY-MM-DDTHH:MM)"
    ))
    .into())
}

struct CreateEvent {
    api: GoogleApi,
}

#[async_trait]
impl ToolHandler for CreateEvent {
    async fn invoke(&self, arguments: Value, credential: &Credential) -> Result<Value> {
        let params: CreateEventParams = parse_arguments(arguments)?;
        let start = normalize_date_time(&params.start_time)?;
        let end = normalize_date_time(&params.end_time)?;

        let body = json!({
            "summary": params.summary,
            "description": params.description,
            "start": {"dateTime": start, "timeZone": params.time_zone},
            "end": {"dateTime": end, "timeZone": params.time_zone},
        });
        let url = format!(
            "{}/calendars/primary/events",
            self.api.config().calendar_base
        );
        let event = self.api.post(&url, &body, credential).await?;

        Ok(json!({"id": event.get("id"), "html_link": event.get("htmlLink")}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_short_form_appends_seconds() {
        assert_eq!(
            normalize_date_time("2025-03-01T09:30").unwrap(),
            "2025-03-01T09:30:00"
        );
    }

    #[test]
    fn test_normalize_keeps_full_forms() {
        assert_eq!(
            normalize_date_time("2025-03-01T09:30:15").unwrap(),
            "2025-03-01T09:30:15"
        );
        assert_eq!(
            normalize_date_time("2025-03-01T09:30:00+07:00").unwrap(),
            "2025-03-01T09:30:00+07:00"
        );
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(normalize_date_time("tomorrow at nine").is_err());
    }
}
