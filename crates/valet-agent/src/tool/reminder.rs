use std::sync::Arc;

use async_trait::async_trait;
use chrono::{FixedOffset, TimeZone};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use valet_scheduler::Scheduler;
use valet_store::AssistantStore;

use crate::tool::{Tool, ToolCapability, ToolResult};

/// Reminder CRUD backed by the store, with delivery delegated to the
/// scheduler. Creating a reminder both persists it and registers its job;
/// cancelling tears down both.
pub struct ReminderTool {
    store: Arc<AssistantStore>,
    scheduler: Arc<Scheduler>,
    tz_offset: i32,
}

#[derive(Deserialize)]
struct CreateInput {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    remind_at: Option<i64>,
    #[serde(default)]
    recurrence_rule: Option<String>,
}

#[derive(Deserialize)]
struct CancelInput {
    reminder_id: String,
}

impl ReminderTool {
    pub fn new(store: Arc<AssistantStore>, scheduler: Arc<Scheduler>, tz_offset: i32) -> Self {
        Self {
            store,
            scheduler,
            tz_offset,
        }
    }

    async fn handle_create(&self, params: &Map<String, Value>, chat_id: i64) -> ToolResult {
        let input: CreateInput = match serde_json::from_value(Value::Object(params.clone())) {
            Ok(input) => input,
            Err(e) => return ToolResult::failure("Invalid reminder parameters", e.to_string()),
        };

        let title = input
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "Reminder".to_string());

        // Recurring reminders derive their fire times from the cron
        // expression during scheduling
        if let Some(cron) = &input.recurrence_rule {
            return self
                .create_recurring(chat_id, &title, input.description.as_deref(), cron)
                .await;
        }

        let Some(remind_at) = input.remind_at else {
            return ToolResult::failure(
                "Cannot create reminder without a time",
                "remind_at is required",
            );
        };

        let reminder = match self
            .store
            .create_reminder(
                chat_id,
                &title,
                input.description.as_deref(),
                remind_at,
                false,
                None,
            )
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolResult::failure("Could not save reminder", e.to_string()),
        };

        if let Err(e) = self
            .scheduler
            .schedule_reminder(
                &reminder.id,
                remind_at,
                chat_id,
                &title,
                reminder.description.as_deref(),
            )
            .await
        {
            return ToolResult::failure("Could not schedule reminder", e.to_string());
        }

        ToolResult::success(
            format!("Reminder set: {title} at {}", self.format_time(remind_at)),
            json!({ "reminder_id": reminder.id, "remind_at": remind_at }),
        )
    }

    async fn create_recurring(
        &self,
        chat_id: i64,
        title: &str,
        description: Option<&str>,
        cron: &str,
    ) -> ToolResult {
        let reminder = match self
            .store
            .create_reminder(chat_id, title, description, 0, true, Some(cron))
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolResult::failure("Could not save reminder", e.to_string()),
        };

        match self
            .scheduler
            .schedule_recurring_reminder(&reminder.id, cron, chat_id, title, description)
            .await
        {
            Ok(_) => ToolResult::success(
                format!("Recurring reminder set: {title} ({cron})"),
                json!({ "reminder_id": reminder.id }),
            ),
            Err(e) => ToolResult::failure("Could not schedule recurring reminder", e.to_string()),
        }
    }

    async fn handle_list(&self, chat_id: i64) -> ToolResult {
        let reminders = match self.store.active_reminders(chat_id).await {
            Ok(r) => r,
            Err(e) => return ToolResult::failure("Could not list reminders", e.to_string()),
        };

        if reminders.is_empty() {
            return ToolResult::success("You have no active reminders", json!([]));
        }

        let mut lines = Vec::new();
        let mut items = Vec::new();
        for (i, r) in reminders.iter().enumerate() {
            let when = if r.is_recurring {
                r.recurrence_rule.clone().unwrap_or_default()
            } else {
                self.format_time(r.remind_at)
            };
            lines.push(format!("{}. {} ({when})", i + 1, r.title));
            items.push(json!({
                "reminder_id": r.id,
                "title": r.title,
                "remind_at": r.remind_at,
                "is_recurring": r.is_recurring,
            }));
        }

        ToolResult::success(
            format!("Your reminders:\n{}", lines.join("\n")),
            Value::Array(items),
        )
    }

    async fn handle_cancel(&self, params: &Map<String, Value>) -> ToolResult {
        let input: CancelInput = match serde_json::from_value(Value::Object(params.clone())) {
            Ok(input) => input,
            Err(e) => return ToolResult::failure("Invalid cancel parameters", e.to_string()),
        };

        let cancelled = match self.store.cancel_reminder(&input.reminder_id).await {
            Ok(c) => c,
            Err(e) => return ToolResult::failure("Could not cancel reminder", e.to_string()),
        };

        if !cancelled {
            return ToolResult::failure(
                "No active reminder with that id",
                format!("reminder not found: {}", input.reminder_id),
            );
        }

        // Either job id shape may exist for this reminder
        let _ = self
            .scheduler
            .cancel_reminder(&format!("reminder_{}", input.reminder_id))
            .await;
        let _ = self
            .scheduler
            .cancel_reminder(&format!("reminder_recurring_{}", input.reminder_id))
            .await;

        ToolResult::success(
            "Reminder cancelled",
            json!({ "reminder_id": input.reminder_id }),
        )
    }

    fn format_time(&self, unix: i64) -> String {
        let offset = FixedOffset::east_opt(self.tz_offset * 3600)
            .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap());
        match offset.timestamp_opt(unix, 0).single() {
            Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
            None => unix.to_string(),
        }
    }
}

#[async_trait]
impl Tool for ReminderTool {
    fn name(&self) -> &str {
        "reminder"
    }

    fn description(&self) -> &str {
        "Create, list, and cancel reminders"
    }

    fn capabilities(&self) -> Vec<ToolCapability> {
        vec![
            ToolCapability {
                name: "create".to_string(),
                description: "Create a reminder at a specific time, optionally recurring".to_string(),
                parameters: json!({
                    "title": "string",
                    "description": "string (optional)",
                    "remind_at": "unix seconds",
                    "recurrence_rule": "5-field cron (optional)"
                }),
                examples: vec!["remind me in 2 minutes to call mom".to_string()],
            },
            ToolCapability {
                name: "list".to_string(),
                description: "List active reminders, soonest first".to_string(),
                parameters: json!({}),
                examples: vec!["show my reminders".to_string()],
            },
            ToolCapability {
                name: "cancel".to_string(),
                description: "Cancel a reminder by id".to_string(),
                parameters: json!({ "reminder_id": "string" }),
                examples: vec!["cancel that reminder".to_string()],
            },
        ]
    }

    async fn execute(&self, params: &Map<String, Value>, chat_id: i64) -> ToolResult {
        let action = params
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or("create");

        match action {
            "create" => self.handle_create(params, chat_id).await,
            "list" => self.handle_list(chat_id).await,
            "cancel" => self.handle_cancel(params).await,
            other => ToolResult::failure(
                format!("Unknown reminder action: {other}"),
                format!("unsupported action '{other}'"),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use valet_core::types::now_unix;

    async fn tool() -> (ReminderTool, Arc<AssistantStore>) {
        let store = Arc::new(
            AssistantStore::new(&crate::test_util::temp_db_path("reminder_store"))
                .await
                .unwrap(),
        );
        let db = libsql::Builder::new_local(crate::test_util::temp_db_path("reminder_jobs"))
            .build()
            .await
            .unwrap();
        let scheduler = Arc::new(Scheduler::new(db, store.clone(), 1, 0));
        scheduler.init().await.unwrap();
        (ReminderTool::new(store.clone(), scheduler, 0), store)
    }

    fn params(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_create_requires_remind_at() {
        let (tool, _) = tool().await;
        let result = tool
            .execute(&params(&[("action", json!("create")), ("title", json!("x"))]), 1)
            .await;
        assert!(!result.is_success());
        assert_eq!(result.error.as_deref(), Some("remind_at is required"));
    }

    #[tokio::test]
    async fn test_create_defaults_title_and_persists() {
        let (tool, store) = tool().await;
        let at = now_unix() + 120;
        let result = tool
            .execute(
                &params(&[("action", json!("create")), ("remind_at", json!(at))]),
                7,
            )
            .await;
        assert!(result.is_success());

        let reminders = store.active_reminders(7).await.unwrap();
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].title, "Reminder");
        assert_eq!(reminders[0].remind_at, at);
    }

    #[tokio::test]
    async fn test_cancel_round_trip() {
        let (tool, _) = tool().await;
        let at = now_unix() + 300;
        let created = tool
            .execute(
                &params(&[
                    ("action", json!("create")),
                    ("title", json!("call mom")),
                    ("remind_at", json!(at)),
                ]),
                1,
            )
            .await;
        let id = created.data["reminder_id"].as_str().unwrap().to_string();

        let cancelled = tool
            .execute(
                &params(&[("action", json!("cancel")), ("reminder_id", json!(id))]),
                1,
            )
            .await;
        assert!(cancelled.is_success());

        let listed = tool.execute(&params(&[("action", json!("list"))]), 1).await;
        assert_eq!(listed.message, "You have no active reminders");
    }

    #[tokio::test]
    async fn test_unknown_action_fails() {
        let (tool, _) = tool().await;
        let result = tool.execute(&params(&[("action", json!("frob"))]), 1).await;
        assert!(!result.is_success());
        assert!(result.message.contains("Unknown reminder action"));
    }
}
