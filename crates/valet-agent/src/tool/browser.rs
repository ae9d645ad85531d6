use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use valet_integrations::browserbase::BrowserbaseClient;

use crate::tool::{Tool, ToolCapability, ToolResult};

/// Remote browser automation. Sessions are created on the backend and
/// tracked locally with their action history; every session-scoped
/// result carries the session id in metadata so later steps can chain
/// onto it.
pub struct BrowserTool {
    client: Option<BrowserbaseClient>,
    sessions: Mutex<HashMap<String, Vec<String>>>,
}

#[derive(Deserialize)]
struct SessionInput {
    session_id: String,
}

#[derive(Deserialize)]
struct NavigateInput {
    session_id: String,
    url: String,
}

#[derive(Deserialize)]
struct InstructionInput {
    session_id: String,
    instruction: String,
    #[serde(default)]
    action_type: Option<String>,
}

impl BrowserTool {
    pub fn new(client: Option<BrowserbaseClient>) -> Self {
        Self {
            client,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn client(&self) -> Result<&BrowserbaseClient, ToolResult> {
        self.client.as_ref().ok_or_else(|| {
            ToolResult::failure(
                "Browser automation is not configured",
                "no browser api key available",
            )
        })
    }

    fn record(&self, session_id: &str, entry: String) {
        if let Some(history) = self.sessions.lock().unwrap().get_mut(session_id) {
            history.push(entry);
        }
    }

    async fn handle_create_session(&self) -> ToolResult {
        let client = match self.client() {
            Ok(c) => c,
            Err(r) => return r,
        };

        match client.create_session().await {
            Ok(session_id) => {
                self.sessions
                    .lock()
                    .unwrap()
                    .insert(session_id.clone(), Vec::new());
                ToolResult::success(
                    "Browser session started",
                    json!({ "session_id": session_id }),
                )
                .with_metadata("session_id", json!(session_id))
            }
            Err(e) => ToolResult::failure("Could not start browser session", e.to_string()),
        }
    }

    async fn handle_close_session(&self, params: &Map<String, Value>) -> ToolResult {
        let input: SessionInput = match serde_json::from_value(Value::Object(params.clone())) {
            Ok(input) => input,
            Err(e) => return ToolResult::failure("Invalid session parameters", e.to_string()),
        };
        let client = match self.client() {
            Ok(c) => c,
            Err(r) => return r,
        };

        match client.close_session(&input.session_id).await {
            Ok(()) => {
                self.sessions.lock().unwrap().remove(&input.session_id);
                ToolResult::success("Browser session closed", Value::Null)
            }
            Err(e) => ToolResult::failure("Could not close session", e.to_string()),
        }
    }

    async fn handle_navigate(&self, params: &Map<String, Value>) -> ToolResult {
        let input: NavigateInput = match serde_json::from_value(Value::Object(params.clone())) {
            Ok(input) => input,
            Err(e) => return ToolResult::failure("Invalid navigate parameters", e.to_string()),
        };
        let client = match self.client() {
            Ok(c) => c,
            Err(r) => return r,
        };

        match client.navigate(&input.session_id, &input.url).await {
            Ok(()) => {
                self.record(&input.session_id, format!("navigate {}", input.url));
                ToolResult::success(
                    format!("Opened {}", input.url),
                    json!({ "url": input.url }),
                )
                .with_metadata("session_id", json!(input.session_id))
            }
            Err(e) => ToolResult::failure(format!("Could not open {}", input.url), e.to_string()),
        }
    }

    async fn handle_screenshot(&self, params: &Map<String, Value>) -> ToolResult {
        let input: SessionInput = match serde_json::from_value(Value::Object(params.clone())) {
            Ok(input) => input,
            Err(e) => return ToolResult::failure("Invalid screenshot parameters", e.to_string()),
        };
        let client = match self.client() {
            Ok(c) => c,
            Err(r) => return r,
        };

        match client.screenshot(&input.session_id).await {
            Ok(bytes) => {
                self.record(&input.session_id, "screenshot".to_string());
                ToolResult::success(
                    format!("Screenshot captured ({} bytes)", bytes.len()),
                    json!({ "size": bytes.len() }),
                )
                .with_metadata("session_id", json!(input.session_id))
            }
            Err(e) => ToolResult::failure("Could not capture screenshot", e.to_string()),
        }
    }

    async fn handle_extract(&self, params: &Map<String, Value>) -> ToolResult {
        let input: InstructionInput = match serde_json::from_value(Value::Object(params.clone())) {
            Ok(input) => input,
            Err(e) => return ToolResult::failure("Invalid extract parameters", e.to_string()),
        };
        let client = match self.client() {
            Ok(c) => c,
            Err(r) => return r,
        };

        match client.extract(&input.session_id, &input.instruction).await {
            Ok(data) => {
                self.record(&input.session_id, format!("extract: {}", input.instruction));
                let summary = data
                    .as_str()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| data.to_string());
                ToolResult::success(summary, data)
                    .with_metadata("session_id", json!(input.session_id))
            }
            Err(e) => ToolResult::failure("Could not extract page content", e.to_string()),
        }
    }

    async fn handle_act(&self, params: &Map<String, Value>) -> ToolResult {
        let input: InstructionInput = match serde_json::from_value(Value::Object(params.clone())) {
            Ok(input) => input,
            Err(e) => return ToolResult::failure("Invalid act parameters", e.to_string()),
        };
        let client = match self.client() {
            Ok(c) => c,
            Err(r) => return r,
        };

        let action_type = input.action_type.as_deref().unwrap_or("click");
        match client.act(&input.session_id, &input.instruction).await {
            Ok(data) => {
                self.record(
                    &input.session_id,
                    format!("{action_type}: {}", input.instruction),
                );
                ToolResult::success(format!("Done: {}", input.instruction), data)
                    .with_metadata("session_id", json!(input.session_id))
            }
            Err(e) => ToolResult::failure("Browser action failed", e.to_string()),
        }
    }

    async fn handle_observe(&self, params: &Map<String, Value>) -> ToolResult {
        let input: InstructionInput = match serde_json::from_value(Value::Object(params.clone())) {
            Ok(input) => input,
            Err(e) => return ToolResult::failure("Invalid observe parameters", e.to_string()),
        };
        let client = match self.client() {
            Ok(c) => c,
            Err(r) => return r,
        };

        match client.observe(&input.session_id, &input.instruction).await {
            Ok(data) => ToolResult::success(data.to_string(), data)
                .with_metadata("session_id", json!(input.session_id)),
            Err(e) => ToolResult::failure("Could not observe page", e.to_string()),
        }
    }

    fn handle_list_sessions(&self) -> ToolResult {
        let sessions = self.sessions.lock().unwrap();
        if sessions.is_empty() {
            return ToolResult::success("No active browser sessions", json!([]));
        }

        let items: Vec<Value> = sessions
            .iter()
            .map(|(id, history)| json!({ "session_id": id, "actions": history }))
            .collect();
        ToolResult::success(
            format!("{} active session(s)", items.len()),
            Value::Array(items),
        )
    }
}

#[async_trait]
impl Tool for BrowserTool {
    fn name(&self) -> &str {
        "browser"
    }

    fn description(&self) -> &str {
        "Drive a remote browser: navigate, screenshot, extract, and interact"
    }

    fn capabilities(&self) -> Vec<ToolCapability> {
        vec![
            ToolCapability {
                name: "create_session".to_string(),
                description: "Start a browser session".to_string(),
                parameters: json!({}),
                examples: vec![],
            },
            ToolCapability {
                name: "navigate".to_string(),
                description: "Open a URL in a session".to_string(),
                parameters: json!({ "session_id": "string", "url": "string" }),
                examples: vec!["go to rust-lang.org".to_string()],
            },
            ToolCapability {
                name: "screenshot".to_string(),
                description: "Capture the current page".to_string(),
                parameters: json!({ "session_id": "string" }),
                examples: vec!["take a screenshot of example.com".to_string()],
            },
            ToolCapability {
                name: "extract".to_string(),
                description: "Extract content from the current page".to_string(),
                parameters: json!({ "session_id": "string", "instruction": "string" }),
                examples: vec!["extract the headlines".to_string()],
            },
            ToolCapability {
                name: "act".to_string(),
                description: "Click, type, or scroll on the current page".to_string(),
                parameters: json!({ "session_id": "string", "instruction": "string", "action_type": "click|type|scroll" }),
                examples: vec!["click the login button".to_string()],
            },
            ToolCapability {
                name: "observe".to_string(),
                description: "Describe actionable elements on the page".to_string(),
                parameters: json!({ "session_id": "string", "instruction": "string" }),
                examples: vec![],
            },
            ToolCapability {
                name: "close_session".to_string(),
                description: "End a browser session".to_string(),
                parameters: json!({ "session_id": "string" }),
                examples: vec![],
            },
        ]
    }

    async fn execute(&self, params: &Map<String, Value>, _chat_id: i64) -> ToolResult {
        let action = params
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or("create_session");

        match action {
            "create_session" => self.handle_create_session().await,
            "close_session" => self.handle_close_session(params).await,
            "navigate" => self.handle_navigate(params).await,
            "screenshot" => self.handle_screenshot(params).await,
            "extract" => self.handle_extract(params).await,
            "act" => self.handle_act(params).await,
            "observe" => self.handle_observe(params).await,
            "list_sessions" => self.handle_list_sessions(),
            other => ToolResult::failure(
                format!("Unknown browser action: {other}"),
                format!("unsupported action '{other}'"),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_browser_fails_cleanly() {
        let tool = BrowserTool::new(None);
        let mut params = Map::new();
        params.insert("action".to_string(), json!("create_session"));

        let result = tool.execute(&params, 1).await;
        assert!(!result.is_success());
        assert_eq!(result.message, "Browser automation is not configured");
    }

    #[tokio::test]
    async fn test_list_sessions_empty() {
        let tool = BrowserTool::new(None);
        let mut params = Map::new();
        params.insert("action".to_string(), json!("list_sessions"));

        let result = tool.execute(&params, 1).await;
        assert!(result.is_success());
        assert_eq!(result.message, "No active browser sessions");
    }

    #[test]
    fn test_session_history_recording() {
        let tool = BrowserTool::new(None);
        tool.sessions
            .lock()
            .unwrap()
            .insert("s1".to_string(), Vec::new());

        tool.record("s1", "navigate https://example.com".to_string());
        tool.record("unknown", "ignored".to_string());

        let sessions = tool.sessions.lock().unwrap();
        assert!(!sessions.contains_key("unknown"));
        assert_eq!(
            sessions.get("s1").unwrap().as_slice(),
            ["navigate https://example.com"]
        );
    }
}
