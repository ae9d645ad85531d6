use base64::Engine;
use valet_core::error::{Result, ValetError};

const STAGEHAND_API: &str = "https://api.stagehand.browserbase.com/v1";

/// Remote browser automation over Browserbase's session API.
/// One session is one cloud browser; page commands are posted against it.
pub struct BrowserbaseClient {
    api_key: String,
    project_id: String,
    base_url: String,
    http: reqwest::Client,
}

impl BrowserbaseClient {
    pub fn new(api_key: String, project_id: String) -> Self {
        Self {
            api_key,
            project_id,
            base_url: STAGEHAND_API.to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        let url = format!("{}/{path}", self.base_url);

        let resp = self
            .http
            .post(&url)
            .header("x-bb-api-key", &self.api_key)
            .header("x-bb-project-id", &self.project_id)
            .json(body)
            .send()
            .await
            .map_err(|e| ValetError::Integration(format!("browserbase request failed: {e}")))?;

        let status = resp.status().as_u16();
        let text = resp.text().await.map_err(|e| {
            ValetError::Integration(format!("browserbase response read failed: {e}"))
        })?;

        if !(200..300).contains(&status) {
            return Err(ValetError::Http { status, body: text });
        }

        serde_json::from_str(&text)
            .map_err(|e| ValetError::Integration(format!("browserbase json parse failed: {e}")))
    }

    /// Start a cloud browser session; returns the session id.
    pub async fn create_session(&self) -> Result<String> {
        let data = self.post("sessions/start", &serde_json::json!({})).await?;
        data["sessionId"]
            .as_str()
            .or_else(|| data["id"].as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| ValetError::Integration("missing session id in response".to_string()))
    }

    pub async fn close_session(&self, session_id: &str) -> Result<()> {
        self.post(&format!("sessions/{session_id}/end"), &serde_json::json!({}))
            .await?;
        Ok(())
    }

    pub async fn navigate(&self, session_id: &str, url: &str) -> Result<()> {
        self.post(
            &format!("sessions/{session_id}/navigate"),
            &serde_json::json!({ "url": url }),
        )
        .await?;
        Ok(())
    }

    /// Perform a page action described in natural language
    /// (e.g. "click the login button", "type hello into the search box").
    pub async fn act(&self, session_id: &str, action: &str) -> Result<serde_json::Value> {
        self.post(
            &format!("sessions/{session_id}/act"),
            &serde_json::json!({ "action": action }),
        )
        .await
    }

    /// Extract structured data from the current page per an instruction.
    pub async fn extract(&self, session_id: &str, instruction: &str) -> Result<serde_json::Value> {
        self.post(
            &format!("sessions/{session_id}/extract"),
            &serde_json::json!({ "instruction": instruction }),
        )
        .await
    }

    /// List candidate actions available on the current page.
    pub async fn observe(&self, session_id: &str, instruction: &str) -> Result<serde_json::Value> {
        self.post(
            &format!("sessions/{session_id}/observe"),
            &serde_json::json!({ "instruction": instruction }),
        )
        .await
    }

    /// Capture the current page; returns PNG bytes.
    pub async fn screenshot(&self, session_id: &str) -> Result<Vec<u8>> {
        let data = self
            .post(
                &format!("sessions/{session_id}/screenshot"),
                &serde_json::json!({}),
            )
            .await?;

        let encoded = data["data"]
            .as_str()
            .ok_or_else(|| ValetError::Integration("missing screenshot data".to_string()))?;

        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| ValetError::Integration(format!("screenshot decode failed: {e}")))
    }
}
