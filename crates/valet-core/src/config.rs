use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, ValetError};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub google: GoogleConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub allowed_user_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: String,
    /// Override for OpenAI-compatible providers (Groq).
    #[serde(default)]
    pub base_url: String,
}

fn default_llm_provider() -> String {
    "openai".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            api_key: String::new(),
            base_url: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    #[serde(default)]
    pub turso_url: String,
    #[serde(default)]
    pub turso_token: String,
}

fn default_db_path() -> String {
    "valet.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            turso_url: String::new(),
            turso_token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// How many prior conversation turns to feed the response generator.
    #[serde(default = "default_context_window")]
    pub context_window: usize,
    /// Ring-buffer capacity of the per-user short-term memory.
    #[serde(default = "default_short_term_size")]
    pub short_term_memory_size: usize,
    /// UTC offset in hours (e.g. 7 for WIB/UTC+7, -5 for EST/UTC-5).
    #[serde(default)]
    pub timezone_offset: i32,
    /// Ask for missing fields instead of failing; also gates the LLM
    /// entity-extraction pass.
    #[serde(default = "default_true")]
    pub clarifying_questions: bool,
    /// Retry budget handed to every tool invocation.
    #[serde(default = "default_step_retries")]
    pub max_step_retries: u32,
}

fn default_context_window() -> usize {
    5
}

fn default_short_term_size() -> usize {
    20
}

fn default_true() -> bool {
    true
}

fn default_step_retries() -> u32 {
    2
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            context_window: default_context_window(),
            short_term_memory_size: default_short_term_size(),
            timezone_offset: 0,
            clarifying_questions: default_true(),
            max_step_retries: default_step_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchConfig {
    #[serde(default)]
    pub brave_api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BrowserConfig {
    #[serde(default)]
    pub browserbase_api_key: String,
    #[serde(default)]
    pub project_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GoogleConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,
}

fn default_tick_seconds() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_seconds: default_tick_seconds(),
        }
    }
}

impl Config {
    /// Load config: defaults → valet.toml → env vars (env wins).
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| ValetError::Config(format!("failed to read config: {e}")))?;
            toml::from_str(&content)
                .map_err(|e| ValetError::Config(format!("failed to parse config: {e}")))?
        } else {
            Self::default()
        };

        if let Ok(v) = std::env::var("VALET_TELEGRAM_TOKEN") {
            config.telegram.token = v;
        }
        if let Ok(v) = std::env::var("VALET_LLM_API_KEY") {
            config.llm.api_key = v;
        }
        if let Ok(v) = std::env::var("VALET_TURSO_URL") {
            config.database.turso_url = v;
        }
        if let Ok(v) = std::env::var("VALET_TURSO_TOKEN") {
            config.database.turso_token = v;
        }
        if let Ok(v) = std::env::var("VALET_BRAVE_API_KEY") {
            config.search.brave_api_key = v;
        }
        if let Ok(v) = std::env::var("VALET_BROWSERBASE_API_KEY") {
            config.browser.browserbase_api_key = v;
        }
        if let Ok(v) = std::env::var("VALET_GOOGLE_CLIENT_ID") {
            config.google.client_id = v;
        }
        if let Ok(v) = std::env::var("VALET_GOOGLE_CLIENT_SECRET") {
            config.google.client_secret = v;
        }
        if let Ok(v) = std::env::var("VALET_GOOGLE_REFRESH_TOKEN") {
            config.google.refresh_token = v;
        }

        Ok(config)
    }
}
