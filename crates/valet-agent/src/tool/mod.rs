pub mod browser;
pub mod calendar;
pub mod file;
pub mod reminder;
pub mod search;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};

/// Outcome class of one tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    Success,
    Failure,
    Partial,
}

/// Uniform result shape every tool returns, regardless of backend.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub status: ToolStatus,
    pub data: Value,
    pub message: String,
    pub error: Option<String>,
    pub metadata: Map<String, Value>,
}

impl ToolResult {
    pub fn success(message: impl Into<String>, data: Value) -> Self {
        Self {
            status: ToolStatus::Success,
            data,
            message: message.into(),
            error: None,
            metadata: Map::new(),
        }
    }

    pub fn failure(message: impl Into<String>, error: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status: ToolStatus::Failure,
            data: Value::Null,
            message,
            error: Some(error.into()),
            metadata: Map::new(),
        }
    }

    pub fn partial(message: impl Into<String>, data: Value, error: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Partial,
            data,
            message: message.into(),
            error: Some(error.into()),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }
}

/// Static description of one operation a tool offers. Queried for
/// prompt construction and discovery, never runtime state.
#[derive(Debug, Clone)]
pub struct ToolCapability {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub examples: Vec<String>,
}

/// A tool the executor can dispatch plan steps to. Each tool parses its
/// own typed input from the raw parameter map.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn capabilities(&self) -> Vec<ToolCapability>;

    async fn execute(&self, params: &Map<String, Value>, chat_id: i64) -> ToolResult;

    /// Retry wrapper every dispatch goes through. The first Success
    /// returns immediately; anything else is captured and retried up to
    /// the budget, then synthesized into one failure carrying the last
    /// error. No backoff.
    async fn execute_with_retry(
        &self,
        params: &Map<String, Value>,
        chat_id: i64,
        max_retries: u32,
    ) -> ToolResult {
        let mut last_error: Option<String> = None;

        for attempt in 1..=max_retries {
            let result = self.execute(params, chat_id).await;
            if result.is_success() {
                return result;
            }
            log!(
                "[tool] {} attempt {attempt}/{max_retries} failed: {}",
                self.name(),
                result.error.as_deref().unwrap_or(&result.message)
            );
            last_error = result.error.or(Some(result.message));
        }

        ToolResult::failure(
            format!("Failed after {max_retries} attempts"),
            last_error.unwrap_or_else(|| "unknown error".to_string()),
        )
    }
}

/// Name-keyed tool registry with an aggregate-capability cache. The
/// cache is rebuilt lazily and invalidated on every register/unregister.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    capability_cache: Mutex<Option<Vec<ToolCapability>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            capability_cache: Mutex::new(None),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
        self.invalidate_cache();
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        let removed = self.tools.remove(name).is_some();
        if removed {
            self.invalidate_cache();
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Aggregate capabilities across all registered tools.
    pub fn all_capabilities(&self) -> Vec<ToolCapability> {
        let mut cache = self.capability_cache.lock().unwrap();
        if let Some(cached) = cache.as_ref() {
            return cached.clone();
        }

        let mut capabilities: Vec<ToolCapability> = self
            .tools
            .values()
            .flat_map(|t| t.capabilities())
            .collect();
        capabilities.sort_by(|a, b| a.name.cmp(&b.name));

        *cache = Some(capabilities.clone());
        capabilities
    }

    /// One "name: description" line per tool, for prompt construction.
    pub fn descriptions(&self) -> String {
        let mut lines: Vec<String> = self
            .tools
            .values()
            .map(|t| format!("{}: {}", t.name(), t.description()))
            .collect();
        lines.sort();
        lines.join("\n")
    }

    fn invalidate_cache(&self) {
        *self.capability_cache.lock().unwrap() = None;
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
