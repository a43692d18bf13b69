pub mod http;

use async_trait::async_trait;

use crate::errors::ClientError;
use crate::models::{Conversation, Document, Message, UploadFile, UploadReceipt};

pub use http::HttpBackend;

/// The remote service as the session sees it. Row mapping happens behind this
/// trait, so every method hands back domain types.
#[async_trait]
pub trait ChatBackend: Send + Sync + 'static {
    /// Returns the HTTP status of a single uncached GET on `path`.
    async fn probe(&self, path: &str) -> Result<u16, ClientError>;

    async fn list_conversations(&self) -> Result<Vec<Conversation>, ClientError>;

    /// Returns the server-assigned conversation id.
    async fn create_conversation(&self, title: &str) -> Result<String, ClientError>;

    async fn rename_conversation(&self, conversation_id: &str, title: &str) -> Result<(), ClientError>;

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ClientError>;

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>, ClientError>;

    /// Returns the assistant's answer text.
    async fn send_message(&self, conversation_id: &str, content: &str) -> Result<String, ClientError>;

    async fn list_documents(&self, conversation_id: &str) -> Result<Vec<Document>, ClientError>;

    async fn upload_document(
        &self,
        conversation_id: &str,
        file: &UploadFile,
    ) -> Result<UploadReceipt, ClientError>;

    async fn delete_document(&self, conversation_id: &str, document_id: &str) -> Result<(), ClientError>;

    async fn set_document_inclusion(
        &self,
        conversation_id: &str,
        document_id: &str,
        include: bool,
    ) -> Result<(), ClientError>;

    async fn document_url(&self, conversation_id: &str, document_id: &str) -> Result<String, ClientError>;
}

/// Supplies the bearer credential for outgoing requests, when there is one.
#[async_trait]
pub trait SessionTokenProvider: Send + Sync + 'static {
    async fn bearer_token(&self) -> Option<String>;
}

/// A fixed token (or none), for CLIs and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(pub Option<String>);

#[async_trait]
impl SessionTokenProvider for StaticToken {
    async fn bearer_token(&self) -> Option<String> {
        self.0.clone()
    }
}
