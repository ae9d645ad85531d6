use std::sync::Arc;

use async_trait::async_trait;
use valet_core::error::{Result, ValetError};

use super::GoogleAuth;
use crate::{FileBackend, RemoteFile};

const DRIVE_API: &str = "https://www.googleapis.com/drive/v3";
const DRIVE_UPLOAD: &str = "https://www.googleapis.com/upload/drive/v3/files";
const FILE_FIELDS: &str = "id,name,mimeType,webViewLink";

pub struct DriveClient {
    auth: Arc<GoogleAuth>,
    http: reqwest::Client,
}

impl DriveClient {
    pub fn new(auth: Arc<GoogleAuth>) -> Self {
        Self {
            auth,
            http: reqwest::Client::new(),
        }
    }

    async fn get(&self, url: &str) -> Result<serde_json::Value> {
        let token = self.auth.access_token().await?;
        let resp = self
            .http
            .get(url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| ValetError::Integration(format!("drive request failed: {e}")))?;

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| ValetError::Integration(format!("drive response read failed: {e}")))?;

        if status != 200 {
            return Err(ValetError::Http { status, body: text });
        }

        serde_json::from_str(&text)
            .map_err(|e| ValetError::Integration(format!("drive json parse failed: {e}")))
    }

    async fn post(&self, url: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        let token = self.auth.access_token().await?;
        let resp = self
            .http
            .post(url)
            .bearer_auth(&token)
            .json(body)
            .send()
            .await
            .map_err(|e| ValetError::Integration(format!("drive request failed: {e}")))?;

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| ValetError::Integration(format!("drive response read failed: {e}")))?;

        if !(200..300).contains(&status) {
            return Err(ValetError::Http { status, body: text });
        }

        serde_json::from_str(&text)
            .map_err(|e| ValetError::Integration(format!("drive json parse failed: {e}")))
    }
}

#[async_trait]
impl FileBackend for DriveClient {
    async fn upload(&self, name: &str, content: &[u8], mime_type: &str) -> Result<RemoteFile> {
        let token = self.auth.access_token().await?;
        let url = format!("{DRIVE_UPLOAD}?uploadType=multipart&fields={FILE_FIELDS}");

        // Drive wants multipart/related: JSON metadata part, then media part.
        let boundary = "valet_upload_boundary";
        let metadata = serde_json::json!({ "name": name, "mimeType": mime_type });

        let mut body: Vec<u8> = Vec::with_capacity(content.len() + 512);
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
        body.extend_from_slice(metadata.to_string().as_bytes());
        body.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
        body.extend_from_slice(format!("Content-Type: {mime_type}\r\n\r\n").as_bytes());
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .header(
                "content-type",
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| ValetError::Integration(format!("drive upload failed: {e}")))?;

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| ValetError::Integration(format!("drive upload read failed: {e}")))?;

        if status != 200 {
            return Err(ValetError::Http { status, body: text });
        }

        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| ValetError::Integration(format!("drive upload parse failed: {e}")))?;

        Ok(parse_file(&json))
    }

    async fn list(&self, query: Option<&str>) -> Result<Vec<RemoteFile>> {
        let mut url = format!("{DRIVE_API}/files?pageSize=25&fields=files({FILE_FIELDS})");
        if let Some(q) = query {
            let escaped = q.replace('\'', "\\'");
            url.push_str(&format!(
                "&q={}",
                urlencod(&format!("name contains '{escaped}'"))
            ));
        }

        let data = self.get(&url).await?;
        let files = data["files"].as_array().cloned().unwrap_or_default();
        Ok(files.iter().map(parse_file).collect())
    }

    async fn link(&self, file_id: &str) -> Result<String> {
        let url = format!("{DRIVE_API}/files/{file_id}?fields={FILE_FIELDS}");
        let data = self.get(&url).await?;
        data["webViewLink"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| ValetError::Integration("file has no shareable link".to_string()))
    }

    async fn share(&self, file_id: &str, email: &str, role: &str) -> Result<()> {
        let url = format!("{DRIVE_API}/files/{file_id}/permissions");
        let body = serde_json::json!({
            "type": "user",
            "role": role,
            "emailAddress": email,
        });
        self.post(&url, &body).await?;
        Ok(())
    }

    async fn delete(&self, file_id: &str) -> Result<()> {
        let token = self.auth.access_token().await?;
        let url = format!("{DRIVE_API}/files/{file_id}");
        let resp = self
            .http
            .delete(&url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| ValetError::Integration(format!("drive delete failed: {e}")))?;

        let status = resp.status().as_u16();
        if status != 204 && status != 200 {
            let text = resp.text().await.unwrap_or_default();
            return Err(ValetError::Http { status, body: text });
        }
        Ok(())
    }
}

fn parse_file(v: &serde_json::Value) -> RemoteFile {
    RemoteFile {
        id: v["id"].as_str().unwrap_or_default().to_string(),
        name: v["name"].as_str().unwrap_or_default().to_string(),
        mime_type: v["mimeType"].as_str().unwrap_or_default().to_string(),
        web_link: v["webViewLink"].as_str().map(|s| s.to_string()),
    }
}

/// Minimal URL encoding for query parameters.
fn urlencod(s: &str) -> String {
    s.replace('%', "%25")
        .replace(' ', "%20")
        .replace('&', "%26")
        .replace('=', "%3D")
        .replace('+', "%2B")
        .replace('\'', "%27")
        .replace(':', "%3A")
        .replace('?', "%3F")
        .replace('#', "%23")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file() {
        let v = serde_json::json!({
            "id": "f1",
            "name": "report.pdf",
            "mimeType": "application/pdf",
            "webViewLink": "https://drive.google.com/file/d/f1/view",
        });
        let file = parse_file(&v);
        assert_eq!(file.id, "f1");
        assert_eq!(file.name, "report.pdf");
        assert!(file.web_link.is_some());
    }

    #[test]
    fn test_urlencod_query() {
        let encoded = urlencod("name contains 'report'");
        assert!(!encoded.contains(' '));
        assert!(!encoded.contains('\''));
    }
}
