use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use valet_integrations::{FileBackend, RemoteFile};

use crate::tool::{Tool, ToolCapability, ToolResult};

/// File operations against a remote storage backend. Name-based actions
/// resolve the name to an id through a backend search first.
pub struct FileTool {
    backend: Option<Arc<dyn FileBackend>>,
}

#[derive(Deserialize)]
struct UploadInput {
    file_name: String,
    content: String,
    #[serde(default)]
    mime_type: Option<String>,
}

#[derive(Deserialize)]
struct NamedInput {
    #[serde(default)]
    file_id: Option<String>,
    #[serde(default)]
    file_name: Option<String>,
}

#[derive(Deserialize)]
struct ShareInput {
    #[serde(default)]
    file_id: Option<String>,
    #[serde(default)]
    file_name: Option<String>,
    share_with: String,
    #[serde(default)]
    access_level: Option<String>,
}

impl FileTool {
    pub fn new(backend: Option<Arc<dyn FileBackend>>) -> Self {
        Self { backend }
    }

    fn backend(&self) -> Result<&Arc<dyn FileBackend>, ToolResult> {
        self.backend.as_ref().ok_or_else(|| {
            ToolResult::failure(
                "File storage is not configured",
                "no file backend available",
            )
        })
    }

    /// Resolve an id-or-name pair to a concrete file. Name resolution
    /// takes the first search hit.
    async fn resolve(
        &self,
        file_id: Option<&str>,
        file_name: Option<&str>,
    ) -> Result<RemoteFile, ToolResult> {
        let backend = self.backend()?;

        if let Some(id) = file_id {
            return Ok(RemoteFile {
                id: id.to_string(),
                name: file_name.unwrap_or(id).to_string(),
                mime_type: String::new(),
                web_link: None,
            });
        }

        let Some(name) = file_name else {
            return Err(ToolResult::failure(
                "Which file do you mean?",
                "file_id or file_name is required",
            ));
        };

        let matches = backend
            .list(Some(name))
            .await
            .map_err(|e| ToolResult::failure("Could not search files", e.to_string()))?;

        matches.into_iter().next().ok_or_else(|| {
            ToolResult::failure(
                format!("No file found matching '{name}'"),
                format!("file not found: {name}"),
            )
        })
    }

    async fn handle_upload(&self, params: &Map<String, Value>) -> ToolResult {
        let backend = match self.backend() {
            Ok(b) => b,
            Err(r) => return r,
        };
        let input: UploadInput = match serde_json::from_value(Value::Object(params.clone())) {
            Ok(input) => input,
            Err(e) => return ToolResult::failure("Invalid upload parameters", e.to_string()),
        };

        let mime = input
            .mime_type
            .unwrap_or_else(|| "application/octet-stream".to_string());
        match backend
            .upload(&input.file_name, input.content.as_bytes(), &mime)
            .await
        {
            Ok(file) => ToolResult::success(
                format!("Uploaded {}", file.name),
                json!({ "file_id": file.id, "file_name": file.name, "web_link": file.web_link }),
            ),
            Err(e) => ToolResult::failure("Upload failed", e.to_string()),
        }
    }

    async fn handle_list(&self, params: &Map<String, Value>) -> ToolResult {
        let backend = match self.backend() {
            Ok(b) => b,
            Err(r) => return r,
        };
        let query = params.get("query").and_then(Value::as_str);

        let files = match backend.list(query).await {
            Ok(f) => f,
            Err(e) => return ToolResult::failure("Could not list files", e.to_string()),
        };

        if files.is_empty() {
            return ToolResult::success("No files found", json!([]));
        }

        let lines: Vec<String> = files
            .iter()
            .enumerate()
            .map(|(i, f)| format!("{}. {}", i + 1, f.name))
            .collect();
        let items: Vec<Value> = files
            .iter()
            .map(|f| json!({ "file_id": f.id, "file_name": f.name, "mime_type": f.mime_type }))
            .collect();

        ToolResult::success(
            format!("Your files:\n{}", lines.join("\n")),
            Value::Array(items),
        )
    }

    async fn handle_get_link(&self, params: &Map<String, Value>) -> ToolResult {
        let input: NamedInput = match serde_json::from_value(Value::Object(params.clone())) {
            Ok(input) => input,
            Err(e) => return ToolResult::failure("Invalid link parameters", e.to_string()),
        };
        let file = match self
            .resolve(input.file_id.as_deref(), input.file_name.as_deref())
            .await
        {
            Ok(f) => f,
            Err(r) => return r,
        };
        let backend = match self.backend() {
            Ok(b) => b,
            Err(r) => return r,
        };

        match backend.link(&file.id).await {
            Ok(link) => ToolResult::success(
                format!("Link for {}: {link}", file.name),
                json!({ "file_id": file.id, "link": link }),
            ),
            Err(e) => ToolResult::failure("Could not get link", e.to_string()),
        }
    }

    async fn handle_share(&self, params: &Map<String, Value>) -> ToolResult {
        let input: ShareInput = match serde_json::from_value(Value::Object(params.clone())) {
            Ok(input) => input,
            Err(e) => return ToolResult::failure("Invalid share parameters", e.to_string()),
        };
        let file = match self
            .resolve(input.file_id.as_deref(), input.file_name.as_deref())
            .await
        {
            Ok(f) => f,
            Err(r) => return r,
        };
        let backend = match self.backend() {
            Ok(b) => b,
            Err(r) => return r,
        };

        let role = input.access_level.unwrap_or_else(|| "reader".to_string());
        match backend.share(&file.id, &input.share_with, &role).await {
            Ok(()) => ToolResult::success(
                format!("Shared {} with {} as {role}", file.name, input.share_with),
                json!({ "file_id": file.id, "share_with": input.share_with, "role": role }),
            ),
            Err(e) => ToolResult::failure("Could not share file", e.to_string()),
        }
    }

    async fn handle_delete(&self, params: &Map<String, Value>) -> ToolResult {
        let input: NamedInput = match serde_json::from_value(Value::Object(params.clone())) {
            Ok(input) => input,
            Err(e) => return ToolResult::failure("Invalid delete parameters", e.to_string()),
        };
        let file = match self
            .resolve(input.file_id.as_deref(), input.file_name.as_deref())
            .await
        {
            Ok(f) => f,
            Err(r) => return r,
        };
        let backend = match self.backend() {
            Ok(b) => b,
            Err(r) => return r,
        };

        match backend.delete(&file.id).await {
            Ok(()) => ToolResult::success(
                format!("Deleted {}", file.name),
                json!({ "file_id": file.id }),
            ),
            Err(e) => ToolResult::failure("Could not delete file", e.to_string()),
        }
    }
}

#[async_trait]
impl Tool for FileTool {
    fn name(&self) -> &str {
        "file"
    }

    fn description(&self) -> &str {
        "Upload, list, link, share, and delete files in remote storage"
    }

    fn capabilities(&self) -> Vec<ToolCapability> {
        vec![
            ToolCapability {
                name: "upload".to_string(),
                description: "Upload a file".to_string(),
                parameters: json!({ "file_name": "string", "content": "string", "mime_type": "string (optional)" }),
                examples: vec!["upload this as notes.txt".to_string()],
            },
            ToolCapability {
                name: "list".to_string(),
                description: "List files, optionally filtered by name".to_string(),
                parameters: json!({ "query": "string (optional)" }),
                examples: vec!["show my files".to_string()],
            },
            ToolCapability {
                name: "get_link".to_string(),
                description: "Get a shareable link for a file".to_string(),
                parameters: json!({ "file_name": "string" }),
                examples: vec!["get the link for the quarterly report".to_string()],
            },
            ToolCapability {
                name: "share".to_string(),
                description: "Share a file with an email address".to_string(),
                parameters: json!({ "file_name": "string", "share_with": "email", "access_level": "reader|writer" }),
                examples: vec!["share the budget with alex@example.com".to_string()],
            },
            ToolCapability {
                name: "delete".to_string(),
                description: "Delete a file".to_string(),
                parameters: json!({ "file_name": "string" }),
                examples: vec![],
            },
        ]
    }

    async fn execute(&self, params: &Map<String, Value>, _chat_id: i64) -> ToolResult {
        let action = params
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or("list");

        match action {
            "upload" => self.handle_upload(params).await,
            "list" => self.handle_list(params).await,
            "get_link" => self.handle_get_link(params).await,
            "share" => self.handle_share(params).await,
            "delete" => self.handle_delete(params).await,
            other => ToolResult::failure(
                format!("Unknown file action: {other}"),
                format!("unsupported action '{other}'"),
            ),
        }
    }
}
