use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeZone};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use valet_integrations::CalendarBackend;
use valet_store::AssistantStore;

use crate::tool::{Tool, ToolCapability, ToolResult};

/// Calendar events live in the store; an optional external backend gets
/// a mirrored copy whose id is kept alongside the local row.
pub struct CalendarTool {
    store: Arc<AssistantStore>,
    backend: Option<Arc<dyn CalendarBackend>>,
    tz_offset: i32,
}

#[derive(Deserialize)]
struct CreateEventInput {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    start_time: Option<i64>,
    #[serde(default)]
    end_time: Option<i64>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Deserialize)]
struct EventStatusInput {
    event_id: String,
    #[serde(default)]
    status: Option<String>,
}

impl CalendarTool {
    pub fn new(
        store: Arc<AssistantStore>,
        backend: Option<Arc<dyn CalendarBackend>>,
        tz_offset: i32,
    ) -> Self {
        Self {
            store,
            backend,
            tz_offset,
        }
    }

    async fn handle_create(&self, params: &Map<String, Value>, chat_id: i64) -> ToolResult {
        let input: CreateEventInput = match serde_json::from_value(Value::Object(params.clone())) {
            Ok(input) => input,
            Err(e) => return ToolResult::failure("Invalid event parameters", e.to_string()),
        };

        let Some(title) = input.title.filter(|t| !t.trim().is_empty()) else {
            return ToolResult::failure("Cannot create an event without a title", "title is required");
        };
        let Some(start_time) = input.start_time else {
            return ToolResult::failure(
                "Cannot create an event without a start time",
                "start_time is required",
            );
        };

        // Mirror first so the external id lands on the local row
        let external_id = match &self.backend {
            Some(backend) if backend.is_authenticated().await => {
                let end = input.end_time.unwrap_or(start_time + 3600);
                match backend
                    .create_event(
                        &title,
                        &self.to_rfc3339(start_time),
                        &self.to_rfc3339(end),
                        input.description.as_deref(),
                        input.location.as_deref(),
                    )
                    .await
                {
                    Ok(id) => Some(id),
                    Err(e) => {
                        log!("[calendar] external mirror failed: {e}");
                        None
                    }
                }
            }
            _ => None,
        };

        let event = match self
            .store
            .create_event(
                chat_id,
                &title,
                start_time,
                input.end_time,
                input.description.as_deref(),
                input.location.as_deref(),
                external_id.as_deref(),
            )
            .await
        {
            Ok(e) => e,
            Err(e) => return ToolResult::failure("Could not save event", e.to_string()),
        };

        ToolResult::success(
            format!("Event created: {title} at {}", self.format_time(start_time)),
            json!({
                "event_id": event.id,
                "start_time": start_time,
                "external_id": external_id,
            }),
        )
    }

    async fn handle_list(&self, chat_id: i64) -> ToolResult {
        let events = match self
            .store
            .upcoming_events(chat_id, valet_core::types::now_unix())
            .await
        {
            Ok(e) => e,
            Err(e) => return ToolResult::failure("Could not list events", e.to_string()),
        };

        if events.is_empty() {
            return ToolResult::success("You have no upcoming events", json!([]));
        }

        let mut lines = Vec::new();
        let mut items = Vec::new();
        for (i, e) in events.iter().enumerate() {
            let mut line = format!("{}. {} at {}", i + 1, e.title, self.format_time(e.start_time));
            if let Some(loc) = &e.location {
                line.push_str(&format!(" ({loc})"));
            }
            lines.push(line);
            items.push(json!({
                "event_id": e.id,
                "title": e.title,
                "start_time": e.start_time,
                "end_time": e.end_time,
                "location": e.location,
            }));
        }

        ToolResult::success(
            format!("Your upcoming events:\n{}", lines.join("\n")),
            Value::Array(items),
        )
    }

    async fn handle_update(&self, params: &Map<String, Value>) -> ToolResult {
        let input: EventStatusInput = match serde_json::from_value(Value::Object(params.clone())) {
            Ok(input) => input,
            Err(e) => return ToolResult::failure("Invalid update parameters", e.to_string()),
        };

        let status = input.status.unwrap_or_else(|| "tentative".to_string());
        match self.store.update_event_status(&input.event_id, &status).await {
            Ok(()) => ToolResult::success(
                format!("Event marked {status}"),
                json!({ "event_id": input.event_id, "status": status }),
            ),
            Err(e) => ToolResult::failure("Could not update event", e.to_string()),
        }
    }

    async fn handle_delete(&self, params: &Map<String, Value>) -> ToolResult {
        let input: EventStatusInput = match serde_json::from_value(Value::Object(params.clone())) {
            Ok(input) => input,
            Err(e) => return ToolResult::failure("Invalid delete parameters", e.to_string()),
        };

        match self
            .store
            .update_event_status(&input.event_id, "cancelled")
            .await
        {
            Ok(()) => ToolResult::success(
                "Event cancelled",
                json!({ "event_id": input.event_id }),
            ),
            Err(e) => ToolResult::failure("Could not cancel event", e.to_string()),
        }
    }

    fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.tz_offset * 3600)
            .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap())
    }

    fn to_rfc3339(&self, unix: i64) -> String {
        match self.offset().timestamp_opt(unix, 0).single() {
            Some(dt) => dt.to_rfc3339(),
            None => DateTime::from_timestamp(unix, 0)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_else(|| unix.to_string()),
        }
    }

    fn format_time(&self, unix: i64) -> String {
        match self.offset().timestamp_opt(unix, 0).single() {
            Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
            None => unix.to_string(),
        }
    }
}

#[async_trait]
impl Tool for CalendarTool {
    fn name(&self) -> &str {
        "calendar"
    }

    fn description(&self) -> &str {
        "Create and query calendar events"
    }

    fn capabilities(&self) -> Vec<ToolCapability> {
        vec![
            ToolCapability {
                name: "create_event".to_string(),
                description: "Create a calendar event".to_string(),
                parameters: json!({
                    "title": "string",
                    "start_time": "unix seconds",
                    "end_time": "unix seconds (optional)",
                    "description": "string (optional)",
                    "location": "string (optional)"
                }),
                examples: vec!["schedule a team sync tomorrow at 2pm".to_string()],
            },
            ToolCapability {
                name: "list_events".to_string(),
                description: "List upcoming events, soonest first".to_string(),
                parameters: json!({}),
                examples: vec!["what's on my calendar".to_string()],
            },
            ToolCapability {
                name: "update_event".to_string(),
                description: "Change an event's status".to_string(),
                parameters: json!({ "event_id": "string", "status": "confirmed|tentative|cancelled" }),
                examples: vec![],
            },
            ToolCapability {
                name: "delete_event".to_string(),
                description: "Cancel an event".to_string(),
                parameters: json!({ "event_id": "string" }),
                examples: vec![],
            },
        ]
    }

    async fn execute(&self, params: &Map<String, Value>, chat_id: i64) -> ToolResult {
        let action = params
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or("create_event");

        match action {
            "create_event" => self.handle_create(params, chat_id).await,
            "list_events" => self.handle_list(chat_id).await,
            "update_event" => self.handle_update(params).await,
            "delete_event" => self.handle_delete(params).await,
            other => ToolResult::failure(
                format!("Unknown calendar action: {other}"),
                format!("unsupported action '{other}'"),
            ),
        }
    }
}
