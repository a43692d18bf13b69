//! Scripted in-memory backend for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::api::ChatBackend;
use crate::config::ClientConfig;
use crate::errors::ClientError;
use crate::models::{Conversation, Document, Message, MessageRole, UploadFile, UploadReceipt};
use crate::service::session::ChatSession;

#[derive(Default)]
struct FakeData {
    conversations: Vec<Conversation>,
    messages: HashMap<String, Vec<Message>>,
    documents: HashMap<String, Vec<Document>>,
    failing: HashSet<&'static str>,
    probe_status: HashMap<String, u16>,
    calls: HashMap<&'static str, usize>,
    held: HashMap<&'static str, Arc<Semaphore>>,
    next_id: usize,
}

/// Every call yields once before answering so concurrent callers interleave.
/// [`hold`](Self::hold) parks an operation until [`release`](Self::release).
#[derive(Default)]
pub struct FakeBackend {
    data: Mutex<FakeData>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_conversations(ids: &[&str]) -> Arc<Self> {
        let fake = Self::new();
        {
            let mut data = fake.data.lock();
            data.conversations = ids
                .iter()
                .map(|id| Conversation::new(id.to_string(), format!("Conversation {id}")))
                .collect();
        }
        fake
    }

    pub fn add_message(&self, conversation_id: &str, role: MessageRole, content: &str) {
        let mut data = self.data.lock();
        let list = data.messages.entry(conversation_id.to_string()).or_default();
        let mut msg = Message::assistant(conversation_id.to_string(), content.to_string());
        msg.id = format!("{conversation_id}-m{}", list.len());
        msg.role = role;
        list.push(msg);
    }

    pub fn add_document(&self, conversation_id: &str, id: &str, included: bool) {
        let mut data = self.data.lock();
        let file = UploadFile::new(format!("{id}.pdf"), vec![1, 2, 3]);
        let mut doc = Document::local_only(conversation_id.to_string(), &file);
        doc.id = id.to_string();
        doc.is_included = included;
        data.documents.entry(conversation_id.to_string()).or_default().push(doc);
    }

    pub fn set_probe_status(&self, path: &str, status: u16) {
        self.data.lock().probe_status.insert(path.to_string(), status);
    }

    pub fn fail(&self, operation: &'static str) {
        self.data.lock().failing.insert(operation);
    }

    pub fn recover(&self, operation: &'static str) {
        self.data.lock().failing.remove(operation);
    }

    pub fn calls(&self, operation: &'static str) -> usize {
        self.data.lock().calls.get(operation).copied().unwrap_or(0)
    }

    /// Calls to `operation` wait until it is released.
    pub fn hold(&self, operation: &'static str) {
        self.data.lock().held.insert(operation, Arc::new(Semaphore::new(0)));
    }

    /// Lets every parked and future call to `operation` through.
    pub fn release(&self, operation: &'static str) {
        if let Some(gate) = self.data.lock().held.remove(operation) {
            gate.close();
        }
    }

    async fn enter(&self, operation: &'static str) -> Result<(), ClientError> {
        tokio::task::yield_now().await;
        let gate = {
            let mut data = self.data.lock();
            *data.calls.entry(operation).or_default() += 1;
            data.held.get(operation).cloned()
        };
        if let Some(gate) = gate {
            // A closed gate errors out of `acquire`, which is the release signal.
            let _ = gate.acquire().await;
        }
        if self.data.lock().failing.contains(operation) {
            return Err(ClientError::Status { operation: operation.to_string(), status: 503 });
        }
        Ok(())
    }
}

#[async_trait]
impl ChatBackend for FakeBackend {
    async fn probe(&self, path: &str) -> Result<u16, ClientError> {
        self.enter("probe").await?;
        self.data
            .lock()
            .probe_status
            .get(path)
            .copied()
            .ok_or_else(|| ClientError::network(format!("health probe {path}"), "connection refused"))
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, ClientError> {
        self.enter("list_conversations").await?;
        Ok(self.data.lock().conversations.clone())
    }

    async fn create_conversation(&self, title: &str) -> Result<String, ClientError> {
        self.enter("create_conversation").await?;
        let mut data = self.data.lock();
        data.next_id += 1;
        let id = format!("new-{}", data.next_id);
        data.conversations.insert(0, Conversation::new(id.clone(), title.to_string()));
        Ok(id)
    }

    async fn rename_conversation(&self, conversation_id: &str, title: &str) -> Result<(), ClientError> {
        self.enter("rename_conversation").await?;
        let mut data = self.data.lock();
        if let Some(c) = data.conversations.iter_mut().find(|c| c.id == conversation_id) {
            c.title = title.to_string();
        }
        Ok(())
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ClientError> {
        self.enter("delete_conversation").await?;
        self.data.lock().conversations.retain(|c| c.id != conversation_id);
        Ok(())
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>, ClientError> {
        self.enter("list_messages").await?;
        Ok(self.data.lock().messages.get(conversation_id).cloned().unwrap_or_default())
    }

    async fn send_message(&self, _conversation_id: &str, content: &str) -> Result<String, ClientError> {
        self.enter("send_message").await?;
        Ok(format!("echo: {content}"))
    }

    async fn list_documents(&self, conversation_id: &str) -> Result<Vec<Document>, ClientError> {
        self.enter("list_documents").await?;
        Ok(self.data.lock().documents.get(conversation_id).cloned().unwrap_or_default())
    }

    async fn upload_document(
        &self,
        _conversation_id: &str,
        file: &UploadFile,
    ) -> Result<UploadReceipt, ClientError> {
        self.enter("upload_document").await?;
        Ok(UploadReceipt {
            status: Some("ok".to_string()),
            chunks: Some(1),
            path: Some(format!("uploads/{}", file.filename)),
            doc_id: format!("doc-{}", file.filename),
        })
    }

    async fn delete_document(&self, conversation_id: &str, document_id: &str) -> Result<(), ClientError> {
        self.enter("delete_document").await?;
        if let Some(docs) = self.data.lock().documents.get_mut(conversation_id) {
            docs.retain(|d| d.id != document_id);
        }
        Ok(())
    }

    async fn set_document_inclusion(
        &self,
        _conversation_id: &str,
        _document_id: &str,
        _include: bool,
    ) -> Result<(), ClientError> {
        self.enter("set_document_inclusion").await
    }

    async fn document_url(&self, _conversation_id: &str, document_id: &str) -> Result<String, ClientError> {
        self.enter("document_url").await?;
        Ok(format!("https://files.test/{document_id}"))
    }
}

pub fn test_config() -> ClientConfig {
    ClientConfig::new("http://fake.test", "tester")
        .with_health_paths(["health", "docs"])
        .with_readiness_interval(Duration::from_millis(5))
        .with_offline_reply_delay(Duration::from_millis(5))
}

/// A session whose backend already answered its readiness probe.
pub async fn ready_session(fake: &Arc<FakeBackend>) -> ChatSession {
    fake.set_probe_status("health", 200);
    let session = ChatSession::new(fake.clone(), test_config());
    assert!(session.retry_readiness().await.ready);
    session
}
