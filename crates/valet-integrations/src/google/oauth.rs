use tokio::sync::Mutex;
use valet_core::error::{Result, ValetError};
use valet_core::types::now_unix;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

struct CachedToken {
    access_token: String,
    expires_at: i64,
}

/// Google OAuth client working from a long-lived refresh token.
///
/// The refresh token comes from config (obtained once with an external
/// consent flow); this only handles the refresh-token -> access-token
/// exchange, caching the access token until shortly before expiry.
pub struct GoogleAuth {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl GoogleAuth {
    pub fn new(client_id: String, client_secret: String, refresh_token: String) -> Self {
        Self {
            client_id,
            client_secret,
            refresh_token,
            http: reqwest::Client::new(),
            cached: Mutex::new(None),
        }
    }

    /// True when a refresh token is configured at all.
    pub fn is_configured(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            // Refresh 60 seconds before actual expiry
            if now_unix() < token.expires_at - 60 {
                return Ok(token.access_token.clone());
            }
        }

        let fresh = self.refresh().await?;
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access_token)
    }

    async fn refresh(&self) -> Result<CachedToken> {
        if self.refresh_token.is_empty() {
            return Err(ValetError::Integration(
                "no Google refresh token configured".to_string(),
            ));
        }

        let params = [
            ("refresh_token", self.refresh_token.as_str()),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("grant_type", "refresh_token"),
        ];

        let resp = self
            .http
            .post(TOKEN_URL)
            .form(&params)
            .send()
            .await
            .map_err(|e| ValetError::Integration(format!("google refresh failed: {e}")))?;

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| ValetError::Integration(format!("google refresh read failed: {e}")))?;

        if status != 200 {
            return Err(ValetError::Http { status, body: text });
        }

        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| ValetError::Integration(format!("google refresh parse failed: {e}")))?;

        let access_token = json["access_token"]
            .as_str()
            .ok_or_else(|| ValetError::Integration("missing access_token in refresh".to_string()))?
            .to_string();

        let expires_in = json["expires_in"].as_i64().unwrap_or(3600);

        Ok(CachedToken {
            access_token,
            expires_at: now_unix() + expires_in,
        })
    }
}
