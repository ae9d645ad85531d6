use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::planner::{ParamValue, Plan, Step};
use crate::tool::ToolRegistry;

/// Aggregate outcome of running one plan. `success` means every step
/// succeeded; partial runs keep going and collect their errors here.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub success: bool,
    pub message: String,
    pub data: Value,
    pub errors: Vec<String>,
}

impl ExecutionResult {
    fn failure(message: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: Value::Null,
            errors,
        }
    }
}

/// Values produced by earlier steps, keyed by name for `Reference`
/// resolution in later ones.
type ExecutionContext = HashMap<String, Value>;

pub struct Executor {
    registry: Arc<ToolRegistry>,
    max_step_retries: u32,
}

impl Executor {
    pub fn new(registry: Arc<ToolRegistry>, max_step_retries: u32) -> Self {
        Self {
            registry,
            max_step_retries,
        }
    }

    /// Run a plan's steps in order. A failed step is recorded and
    /// skipped, never aborts the rest; the final result reports every
    /// error alongside whatever succeeded.
    pub async fn execute_plan(&self, plan: &Plan, chat_id: i64) -> ExecutionResult {
        if plan.requires_clarification {
            return ExecutionResult::failure(
                "I need more information to proceed",
                plan.clarifying_questions.clone(),
            );
        }

        let mut context = ExecutionContext::new();
        let mut messages: Vec<String> = Vec::new();
        let mut errors: Vec<String> = Vec::new();
        let mut data = Map::new();

        for step in &plan.steps {
            let params = match self.resolve_params(step, &context) {
                Ok(params) => params,
                Err(e) => {
                    log!("[executor] step {} skipped: {e}", step.step);
                    errors.push(e);
                    continue;
                }
            };

            let Some(tool) = self.registry.get(&step.tool) else {
                errors.push(format!("Tool not registered: {}", step.tool));
                continue;
            };

            let result = tool
                .execute_with_retry(&params, chat_id, self.max_step_retries)
                .await;

            if result.is_success() {
                merge_context(&mut context, &result.data, &result.metadata);
                messages.push(result.message);
                data.insert(format!("step_{}", step.step), result.data);
            } else {
                let reason = result.error.unwrap_or(result.message);
                errors.push(format!("{} {}: {reason}", step.tool, step.action));
            }
        }

        let success = errors.is_empty();
        ExecutionResult {
            success,
            message: summarize(&messages, &errors),
            data: Value::Object(data),
            errors,
        }
    }

    /// Run one action directly, outside any plan. Used for follow-ups
    /// that already know their tool and parameters.
    pub async fn execute_single_action(
        &self,
        tool_name: &str,
        action: &str,
        mut params: Map<String, Value>,
        chat_id: i64,
    ) -> ExecutionResult {
        let Some(tool) = self.registry.get(tool_name) else {
            return ExecutionResult::failure(
                format!("Tool not registered: {tool_name}"),
                vec![format!("Tool not registered: {tool_name}")],
            );
        };

        params.insert("action".to_string(), Value::String(action.to_string()));
        let result = tool
            .execute_with_retry(&params, chat_id, self.max_step_retries)
            .await;

        if result.is_success() {
            ExecutionResult {
                success: true,
                message: result.message,
                data: result.data,
                errors: Vec::new(),
            }
        } else {
            let reason = result.error.unwrap_or(result.message);
            ExecutionResult::failure(format!("{tool_name} {action} failed"), vec![reason])
        }
    }

    /// Bind a step's parameters: literals pass through, references pull
    /// from context. An unresolved reference fails the whole step. The
    /// step's action rides along under the "action" key.
    fn resolve_params(
        &self,
        step: &Step,
        context: &ExecutionContext,
    ) -> Result<Map<String, Value>, String> {
        let mut params = Map::new();
        params.insert("action".to_string(), Value::String(step.action.clone()));

        for (key, value) in &step.parameters {
            let resolved = match value {
                ParamValue::Literal(v) => v.clone(),
                ParamValue::Reference(name) => context.get(name).cloned().ok_or_else(|| {
                    format!(
                        "step {} ({} {}): unresolved reference '{name}'",
                        step.step, step.tool, step.action
                    )
                })?,
            };
            params.insert(key.clone(), resolved);
        }

        Ok(params)
    }
}

/// Fold a step's output into the reference context. Top-level scalar
/// keys and keys under a nested "data" object both become referenceable;
/// a session_id in metadata is merged last so it wins over any copy in
/// the data payload.
fn merge_context(context: &mut ExecutionContext, data: &Value, metadata: &Map<String, Value>) {
    if let Value::Object(obj) = data {
        for (key, value) in obj {
            if key == "data" {
                if let Value::Object(inner) = value {
                    for (k, v) in inner {
                        context.insert(k.clone(), v.clone());
                    }
                }
            } else {
                context.insert(key.clone(), value.clone());
            }
        }
    }

    if let Some(session) = metadata.get("session_id") {
        context.insert("session_id".to_string(), session.clone());
    }
}

fn summarize(messages: &[String], errors: &[String]) -> String {
    if errors.is_empty() {
        messages
            .iter()
            .map(|m| format!("✅ {m}"))
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        let mut out = String::from("❌ Completed with errors:");
        for e in errors {
            out.push_str("\n- ");
            out.push_str(e);
        }
        if !messages.is_empty() {
            out.push_str("\n\nCompleted steps:");
            for m in messages {
                out.push_str("\n✅ ");
                out.push_str(m);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::Plan;
    use crate::tool::{Tool, ToolCapability, ToolResult};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    struct EchoTool {
        name: &'static str,
        result: ToolResult,
        seen: Mutex<Vec<Map<String, Value>>>,
    }

    impl EchoTool {
        fn new(name: &'static str, result: ToolResult) -> Self {
            Self {
                name,
                result,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "test tool"
        }

        fn capabilities(&self) -> Vec<ToolCapability> {
            Vec::new()
        }

        async fn execute(&self, params: &Map<String, Value>, _chat_id: i64) -> ToolResult {
            self.seen.lock().unwrap().push(params.clone());
            self.result.clone()
        }
    }

    fn plan_step(
        n: u32,
        action: &str,
        tool: &str,
        parameters: BTreeMap<String, ParamValue>,
    ) -> Step {
        Step {
            step: n,
            action: action.to_string(),
            tool: tool.to_string(),
            parameters,
        }
    }

    #[tokio::test]
    async fn test_empty_registry_reports_tool_not_registered() {
        let executor = Executor::new(Arc::new(ToolRegistry::new()), 2);
        let plan = Plan::from_steps(vec![plan_step(1, "create", "reminder", BTreeMap::new())]);

        let result = executor.execute_plan(&plan, 1).await;
        assert!(!result.success);
        assert_eq!(result.errors, vec!["Tool not registered: reminder".to_string()]);
        assert!(result.message.contains("❌ Completed with errors:"));
    }

    #[tokio::test]
    async fn test_clarification_plan_returns_questions_as_errors() {
        let executor = Executor::new(Arc::new(ToolRegistry::new()), 2);
        let plan = Plan::clarification(vec!["When should this be?".to_string()]);

        let result = executor.execute_plan(&plan, 1).await;
        assert!(!result.success);
        assert_eq!(result.errors, vec!["When should this be?".to_string()]);
    }

    #[tokio::test]
    async fn test_action_injected_into_params() {
        let tool = Arc::new(EchoTool::new(
            "reminder",
            ToolResult::success("done", Value::Null),
        ));
        let mut registry = ToolRegistry::new();
        registry.register(tool.clone());
        let executor = Executor::new(Arc::new(registry), 2);

        let mut params = BTreeMap::new();
        params.insert("title".to_string(), ParamValue::text("call mom"));
        let plan = Plan::from_steps(vec![plan_step(1, "create", "reminder", params)]);

        let result = executor.execute_plan(&plan, 1).await;
        assert!(result.success);
        assert_eq!(result.message, "✅ done");

        let seen = tool.seen.lock().unwrap();
        assert_eq!(seen[0].get("action"), Some(&json!("create")));
        assert_eq!(seen[0].get("title"), Some(&json!("call mom")));
    }

    #[tokio::test]
    async fn test_reference_resolved_from_metadata_over_data() {
        let first = ToolResult::success(
            "session started",
            json!({"session_id": "from-data", "data": {"session_id": "nested"}}),
        )
        .with_metadata("session_id", json!("from-metadata"));

        let step_one = Arc::new(EchoTool::new("browser_start", first));
        let step_two = Arc::new(EchoTool::new(
            "browser",
            ToolResult::success("navigated", Value::Null),
        ));

        let mut registry = ToolRegistry::new();
        registry.register(step_one);
        registry.register(step_two.clone());
        let executor = Executor::new(Arc::new(registry), 2);

        let mut nav = BTreeMap::new();
        nav.insert(
            "session_id".to_string(),
            ParamValue::Reference("session_id".to_string()),
        );
        let plan = Plan::from_steps(vec![
            plan_step(1, "create_session", "browser_start", BTreeMap::new()),
            plan_step(2, "navigate", "browser", nav),
        ]);

        let result = executor.execute_plan(&plan, 1).await;
        assert!(result.success);

        let seen = step_two.seen.lock().unwrap();
        assert_eq!(seen[0].get("session_id"), Some(&json!("from-metadata")));
    }

    #[tokio::test]
    async fn test_unresolved_reference_skips_step_and_continues() {
        let tool = Arc::new(EchoTool::new(
            "reminder",
            ToolResult::success("done", Value::Null),
        ));
        let mut registry = ToolRegistry::new();
        registry.register(tool.clone());
        let executor = Executor::new(Arc::new(registry), 2);

        let mut broken = BTreeMap::new();
        broken.insert(
            "session_id".to_string(),
            ParamValue::Reference("session_id".to_string()),
        );
        let plan = Plan::from_steps(vec![
            plan_step(1, "navigate", "reminder", broken),
            plan_step(2, "create", "reminder", BTreeMap::new()),
        ]);

        let result = executor.execute_plan(&plan, 1).await;
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("unresolved reference 'session_id'"));
        // Step 2 still ran
        assert_eq!(tool.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_step_collected_not_fatal() {
        let failing = Arc::new(EchoTool::new(
            "calendar",
            ToolResult::failure("could not create event", "backend down"),
        ));
        let ok = Arc::new(EchoTool::new(
            "reminder",
            ToolResult::success("reminder set", Value::Null),
        ));

        let mut registry = ToolRegistry::new();
        registry.register(failing);
        registry.register(ok);
        let executor = Executor::new(Arc::new(registry), 1);

        let plan = Plan::from_steps(vec![
            plan_step(1, "create_event", "calendar", BTreeMap::new()),
            plan_step(2, "create", "reminder", BTreeMap::new()),
        ]);

        let result = executor.execute_plan(&plan, 1).await;
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert!(result.message.contains("❌ Completed with errors:"));
        assert!(result.message.contains("✅ reminder set"));
    }

    #[tokio::test]
    async fn test_execute_single_action() {
        let tool = Arc::new(EchoTool::new(
            "reminder",
            ToolResult::success("cancelled", Value::Null),
        ));
        let mut registry = ToolRegistry::new();
        registry.register(tool.clone());
        let executor = Executor::new(Arc::new(registry), 2);

        let result = executor
            .execute_single_action("reminder", "cancel", Map::new(), 1)
            .await;
        assert!(result.success);
        assert_eq!(result.message, "cancelled");
        assert_eq!(
            tool.seen.lock().unwrap()[0].get("action"),
            Some(&json!("cancel"))
        );
    }
}
