pub mod anthropic;
pub mod dispatch;
pub mod openai;
pub mod provider;
