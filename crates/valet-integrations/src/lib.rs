pub mod brave;
pub mod browserbase;
pub mod google;

use async_trait::async_trait;
use valet_core::error::Result;

/// External calendar the calendar tool mirrors events into.
/// The store remains the source of truth; the backend gets a copy and
/// hands back an external id.
#[async_trait]
pub trait CalendarBackend: Send + Sync {
    /// Create an event remotely; returns the external event id.
    async fn create_event(
        &self,
        title: &str,
        start: &str,
        end: &str,
        description: Option<&str>,
        location: Option<&str>,
    ) -> Result<String>;

    async fn is_authenticated(&self) -> bool;
}

/// Remote file storage behind the file tool.
#[async_trait]
pub trait FileBackend: Send + Sync {
    async fn upload(&self, name: &str, content: &[u8], mime_type: &str) -> Result<RemoteFile>;
    async fn list(&self, query: Option<&str>) -> Result<Vec<RemoteFile>>;
    async fn link(&self, file_id: &str) -> Result<String>;
    async fn share(&self, file_id: &str, email: &str, role: &str) -> Result<()>;
    async fn delete(&self, file_id: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub web_link: Option<String>,
}
