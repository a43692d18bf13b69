use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{ChatBackend, SessionTokenProvider, StaticToken};
use crate::config::ClientConfig;
use crate::errors::ClientError;
use crate::models::{
    Conversation, ConversationRow, CreateConversationResponse, Document, DocumentRow,
    InclusionRequest, Message, MessageRow, PreviewUrlResponse, SendMessageRequest,
    SendMessageResponse, TitleRequest, UploadFile, UploadReceipt,
};

/// [`ChatBackend`] over the REST API. Every request carries `user_id` as a query
/// parameter and a bearer token when the provider has one.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    user_id: String,
    tokens: Arc<dyn SessionTokenProvider>,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_id: user_id.into(),
            tokens: Arc::new(StaticToken::default()),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(&config.base_url, &config.user_id)
            .with_token_provider(StaticToken(config.api_token.clone()))
    }

    pub fn with_token_provider(mut self, provider: impl SessionTokenProvider) -> Self {
        self.tokens = Arc::new(provider);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.query(&[("user_id", self.user_id.as_str())]);
        match self.tokens.bearer_token().await {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn execute(&self, operation: &str, request: RequestBuilder) -> Result<Response, ClientError> {
        let resp = self
            .authorize(request)
            .await
            .send()
            .await
            .map_err(|e| ClientError::network(operation, e))?;

        if !resp.status().is_success() {
            return Err(ClientError::Status {
                operation: operation.to_string(),
                status: resp.status().as_u16(),
            });
        }
        Ok(resp)
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> Result<T, ClientError> {
        self.execute(operation, request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ClientError::decode(operation, e))
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn probe(&self, path: &str) -> Result<u16, ClientError> {
        let request = self
            .client
            .get(self.url(path))
            .header(CACHE_CONTROL, "no-cache, no-store")
            .header(PRAGMA, "no-cache");
        let resp = self
            .authorize(request)
            .await
            .send()
            .await
            .map_err(|e| ClientError::network(format!("health probe {path}"), e))?;
        debug!(path, status = %resp.status(), "Health probe answered");
        Ok(resp.status().as_u16())
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, ClientError> {
        let rows: Vec<ConversationRow> = self
            .fetch_json("list conversations", self.client.get(self.url("conversations")))
            .await?;
        Ok(rows.into_iter().map(Conversation::from).collect())
    }

    async fn create_conversation(&self, title: &str) -> Result<String, ClientError> {
        let request = self.client.post(self.url("conversations")).json(&TitleRequest { title });
        let created: CreateConversationResponse = self.fetch_json("create conversation", request).await?;
        Ok(created.conversation_id)
    }

    async fn rename_conversation(&self, conversation_id: &str, title: &str) -> Result<(), ClientError> {
        let request = self
            .client
            .patch(self.url(&format!("conversations/{conversation_id}")))
            .json(&TitleRequest { title });
        self.execute("rename conversation", request).await?;
        Ok(())
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ClientError> {
        let request = self.client.delete(self.url(&format!("conversations/{conversation_id}")));
        self.execute("delete conversation", request).await?;
        Ok(())
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>, ClientError> {
        let request = self.client.get(self.url(&format!("conversations/{conversation_id}/messages")));
        let rows: Vec<MessageRow> = self.fetch_json("list messages", request).await?;
        Ok(rows.into_iter().map(|r| r.into_message(conversation_id)).collect())
    }

    async fn send_message(&self, conversation_id: &str, content: &str) -> Result<String, ClientError> {
        let request = self
            .client
            .post(self.url(&format!("conversations/{conversation_id}/messages")))
            .json(&SendMessageRequest { content });
        let reply: SendMessageResponse = self.fetch_json("send message", request).await?;
        Ok(reply.answer)
    }

    async fn list_documents(&self, conversation_id: &str) -> Result<Vec<Document>, ClientError> {
        let request = self.client.get(self.url(&format!("conversations/{conversation_id}/documents")));
        let rows: Vec<DocumentRow> = self.fetch_json("list documents", request).await?;
        Ok(rows.into_iter().map(|r| r.into_document(conversation_id)).collect())
    }

    async fn upload_document(
        &self,
        conversation_id: &str,
        file: &UploadFile,
    ) -> Result<UploadReceipt, ClientError> {
        let mut part = Part::bytes(file.bytes.clone()).file_name(file.filename.clone());
        if let Some(mime) = &file.content_type {
            part = part.mime_str(mime).map_err(|e| ClientError::InvalidField {
                field_name: "content_type".to_string(),
                message: e.to_string(),
            })?;
        }
        let request = self
            .client
            .post(self.url(&format!("conversations/{conversation_id}/documents")))
            .multipart(Form::new().part("file", part));
        self.fetch_json("upload document", request).await
    }

    async fn delete_document(&self, conversation_id: &str, document_id: &str) -> Result<(), ClientError> {
        let request = self
            .client
            .delete(self.url(&format!("conversations/{conversation_id}/documents/{document_id}")));
        self.execute("delete document", request).await?;
        Ok(())
    }

    async fn set_document_inclusion(
        &self,
        conversation_id: &str,
        document_id: &str,
        include: bool,
    ) -> Result<(), ClientError> {
        let request = self
            .client
            .patch(self.url(&format!("conversations/{conversation_id}/documents/{document_id}")))
            .json(&InclusionRequest { include });
        self.execute("toggle document inclusion", request).await?;
        Ok(())
    }

    async fn document_url(&self, conversation_id: &str, document_id: &str) -> Result<String, ClientError> {
        let request = self
            .client
            .get(self.url(&format!("conversations/{conversation_id}/documents/{document_id}/url")));
        let preview: PreviewUrlResponse = self.fetch_json("document preview url", request).await?;
        Ok(preview.url)
    }
}
