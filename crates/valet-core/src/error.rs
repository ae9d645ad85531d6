use std::fmt;

#[derive(Debug)]
pub enum ValetError {
    Telegram(String),
    Llm { provider: String, message: String },
    Database(String),
    Config(String),
    Http { status: u16, body: String },
    Integration(String),
    Tool(String),
    Scheduler(String),
}

impl fmt::Display for ValetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Telegram(msg) => write!(f, "telegram error: {msg}"),
            Self::Llm { provider, message } => write!(f, "llm error ({provider}): {message}"),
            Self::Database(msg) => write!(f, "database error: {msg}"),
            Self::Config(msg) => write!(f, "config error: {msg}"),
            Self::Http { status, body } => write!(f, "http error ({status}): {body}"),
            Self::Integration(msg) => write!(f, "integration error: {msg}"),
            Self::Tool(msg) => write!(f, "tool error: {msg}"),
            Self::Scheduler(msg) => write!(f, "scheduler error: {msg}"),
        }
    }
}

impl std::error::Error for ValetError {}

pub type Result<T> = std::result::Result<T, ValetError>;
