use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use valet_integrations::brave::{BraveSearch, SearchKind, SearchResult};

use crate::tool::{Tool, ToolCapability, ToolResult};

/// Web search through the Brave Search API.
pub struct SearchTool {
    client: Option<BraveSearch>,
    max_results: u32,
}

#[derive(Deserialize)]
struct SearchInput {
    query: String,
    #[serde(default)]
    kind: Option<String>,
}

impl SearchTool {
    pub fn new(client: Option<BraveSearch>, max_results: u32) -> Self {
        Self {
            client,
            max_results,
        }
    }

    fn format_results(results: &[SearchResult]) -> String {
        let mut out = String::new();
        for (i, r) in results.iter().enumerate() {
            out.push_str(&format!("{}. {}\n   {}\n", i + 1, r.title, r.url));
            if !r.description.is_empty() {
                out.push_str(&format!("   {}\n", r.description));
            }
        }
        out.trim_end().to_string()
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search the web, news, images, videos, and local places"
    }

    fn capabilities(&self) -> Vec<ToolCapability> {
        vec![ToolCapability {
            name: "search".to_string(),
            description: "Run a search and return ranked results".to_string(),
            parameters: json!({
                "query": "string",
                "kind": "web|news|images|videos|local (optional, default web)"
            }),
            examples: vec!["search for rust async tutorials".to_string()],
        }]
    }

    async fn execute(&self, params: &Map<String, Value>, _chat_id: i64) -> ToolResult {
        let Some(client) = &self.client else {
            return ToolResult::failure(
                "Search is not configured",
                "no search api key available",
            );
        };

        let input: SearchInput = match serde_json::from_value(Value::Object(params.clone())) {
            Ok(input) => input,
            Err(e) => return ToolResult::failure("Invalid search parameters", e.to_string()),
        };

        let kind = SearchKind::from_str(input.kind.as_deref().unwrap_or("web"));
        let results = match client.search(kind, &input.query, self.max_results).await {
            Ok(r) => r,
            Err(e) => return ToolResult::failure("Search failed", e.to_string()),
        };

        if results.is_empty() {
            return ToolResult::success(
                format!("No results for '{}'", input.query),
                json!([]),
            );
        }

        let items: Vec<Value> = results
            .iter()
            .map(|r| json!({ "title": r.title, "url": r.url, "description": r.description }))
            .collect();

        ToolResult::success(Self::format_results(&results), Value::Array(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_search_fails_cleanly() {
        let tool = SearchTool::new(None, 5);
        let mut params = Map::new();
        params.insert("action".to_string(), json!("search"));
        params.insert("query".to_string(), json!("rust"));

        let result = tool.execute(&params, 1).await;
        assert!(!result.is_success());
        assert_eq!(result.message, "Search is not configured");
    }

    #[test]
    fn test_format_results_numbering() {
        let results = vec![
            SearchResult {
                title: "Rust".to_string(),
                url: "https://rust-lang.org".to_string(),
                description: "A language".to_string(),
            },
            SearchResult {
                title: "Crates".to_string(),
                url: "https://crates.io".to_string(),
                description: String::new(),
            },
        ];

        let text = SearchTool::format_results(&results);
        assert!(text.starts_with("1. Rust"));
        assert!(text.contains("2. Crates"));
        assert!(text.contains("A language"));
    }
}
