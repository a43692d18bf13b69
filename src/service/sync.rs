//! Optimistic mutations and how each one reconciles with the backend.
//!
//! | Operation            | Optimistic step      | On failure                         |
//! |----------------------|----------------------|------------------------------------|
//! | send message         | append user message  | offline assistant reply (open)     |
//! | upload document      | none                 | local-only document (open)         |
//! | toggle inclusion     | none                 | untouched, notify (closed)         |
//! | delete document      | none                 | untouched, notify (closed)         |
//! | rename conversation  | none                 | untouched, notify, error returned  |
//! | delete conversation  | none                 | untouched, notify (closed)         |
//! | open preview         | none                 | untouched, notify (closed)         |
//!
//! The split between fail-open and fail-closed lives in [`SyncOp::failure_policy`].

use std::future::Future;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::errors::ClientError;
use crate::models::{Document, Message, UploadFile};
use crate::service::session::ChatSession;
use crate::state::{Preview, SessionState};

pub const OFFLINE_REPLY: &str = "[offline] The assistant could not be reached, so this reply was \
                                 generated locally. Your message is shown but was not delivered.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOp {
    SendMessage,
    UploadDocument,
    ToggleInclusion,
    DeleteDocument,
    RenameConversation,
    DeleteConversation,
    OpenPreview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Fabricate placeholder state so the user still sees a result.
    FailOpen,
    /// Leave state alone. `rethrow` hands the error back so the caller can keep
    /// its form open.
    FailClosed { rethrow: bool },
}

impl SyncOp {
    pub fn failure_policy(self) -> FailurePolicy {
        match self {
            SyncOp::SendMessage | SyncOp::UploadDocument => FailurePolicy::FailOpen,
            SyncOp::RenameConversation => FailurePolicy::FailClosed { rethrow: true },
            SyncOp::ToggleInclusion
            | SyncOp::DeleteDocument
            | SyncOp::DeleteConversation
            | SyncOp::OpenPreview => FailurePolicy::FailClosed { rethrow: false },
        }
    }

    /// Whether local state changes before the backend answers.
    pub fn is_optimistic(self) -> bool {
        matches!(self, SyncOp::SendMessage)
    }

    pub fn describe(self) -> &'static str {
        match self {
            SyncOp::SendMessage => "send message",
            SyncOp::UploadDocument => "upload document",
            SyncOp::ToggleInclusion => "update document",
            SyncOp::DeleteDocument => "delete document",
            SyncOp::RenameConversation => "rename conversation",
            SyncOp::DeleteConversation => "delete conversation",
            SyncOp::OpenPreview => "open document preview",
        }
    }
}

/// How local state ended up after a synchronized command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The backend confirmed and local state reflects it.
    Applied,
    /// The backend failed; placeholder state was shown instead.
    Fallback,
    /// The backend failed; local state was left as it was.
    Rejected,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendOutcome {
    pub reconciliation: Reconciliation,
    pub user_message: Message,
    /// The confirmed or offline reply, when it was appended.
    pub reply: Option<Message>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadOutcome {
    pub reconciliation: Reconciliation,
    pub document: Document,
}

impl ChatSession {
    /// Logs, notifies and maps a remote failure according to `op`'s policy.
    fn settle_failure(&self, op: SyncOp, err: ClientError) -> Result<Reconciliation, ClientError> {
        if err == ClientError::Cancelled {
            return Err(err);
        }
        error!(operation = op.describe(), error = %err, "Remote operation failed");
        self.notify_error(format!("Failed to {}: {err}", op.describe()));
        match op.failure_policy() {
            FailurePolicy::FailOpen => Ok(Reconciliation::Fallback),
            FailurePolicy::FailClosed { rethrow: true } => Err(err),
            FailurePolicy::FailClosed { rethrow: false } => Ok(Reconciliation::Rejected),
        }
    }

    /// Runs a non-optimistic remote call and applies `on_success` only once it
    /// is confirmed.
    async fn reconcile<T>(
        &self,
        op: SyncOp,
        call: impl Future<Output = Result<T, ClientError>>,
        on_success: impl FnOnce(&mut SessionState, T),
    ) -> Result<Reconciliation, ClientError> {
        match call.await {
            Ok(value) => {
                self.apply(|state| on_success(state, value))?;
                Ok(Reconciliation::Applied)
            }
            Err(e) => self.settle_failure(op, e),
        }
    }

    async fn active_conversation_for(
        &self,
        op: SyncOp,
        seed: Option<&str>,
    ) -> Result<String, ClientError> {
        match self.ensure_active_conversation(seed).await {
            Ok(active) => Ok(active.conversation_id),
            Err(e) => {
                if e != ClientError::Cancelled {
                    error!(operation = op.describe(), error = %e, "No conversation to act on");
                    self.notify_error(format!("Failed to {}: {e}", op.describe()));
                }
                Err(e)
            }
        }
    }

    fn selected_or_err(state: &SessionState) -> Result<String, ClientError> {
        state
            .conversations
            .selected()
            .map(str::to_owned)
            .ok_or(ClientError::NoActiveConversation)
    }

    // ── Messages ─────────────────────────────────────────────────────────────

    /// Shows the user's message at once, then appends the assistant's answer,
    /// or an offline placeholder if the backend could not be reached.
    pub async fn send_message(&self, text: &str) -> Result<SendOutcome, ClientError> {
        let content = text.trim();
        if content.is_empty() {
            return Err(ClientError::EmptyField { field_name: "message".to_string() });
        }
        self.require_ready()?;
        let op = SyncOp::SendMessage;
        let conversation_id = self.active_conversation_for(op, Some(content)).await?;

        let user_message = Message::pending_user(conversation_id.clone(), content.to_string());
        let appended = self.apply(|state| {
            if !state.conversations.is_selected(&conversation_id) {
                return false;
            }
            state.messages.push(user_message.clone());
            true
        })?;

        let (reconciliation, reply_text) = match self.backend().send_message(&conversation_id, content).await {
            Ok(answer) => (Reconciliation::Applied, answer),
            Err(e) => {
                let reconciliation = self.settle_failure(op, e)?;
                tokio::time::sleep(self.config().offline_reply_delay).await;
                (reconciliation, OFFLINE_REPLY.to_string())
            }
        };

        // Never an assistant reply without the user message before it.
        let reply = if appended {
            let reply = Message::assistant(conversation_id.clone(), reply_text);
            let shown = self.apply(|state| {
                if !state.conversations.is_selected(&conversation_id) {
                    return false;
                }
                state.messages.push(reply.clone());
                true
            })?;
            shown.then_some(reply)
        } else {
            warn!(conversation_id = %conversation_id, "Selection moved before the message was shown");
            None
        };

        Ok(SendOutcome { reconciliation, user_message, reply })
    }

    // ── Documents ────────────────────────────────────────────────────────────

    /// Uploads into the active conversation (creating one if needed). A failed
    /// upload still shows the file, marked local by its missing storage path.
    pub async fn upload_document(&self, file: UploadFile) -> Result<UploadOutcome, ClientError> {
        if file.filename.trim().is_empty() {
            return Err(ClientError::EmptyField { field_name: "filename".to_string() });
        }
        self.require_ready()?;
        let op = SyncOp::UploadDocument;
        let conversation_id = self.active_conversation_for(op, None).await?;

        let (reconciliation, document) = match self.backend().upload_document(&conversation_id, &file).await {
            Ok(receipt) => {
                info!(
                    conversation_id = %conversation_id,
                    doc_id = %receipt.doc_id,
                    chunks = receipt.chunks.unwrap_or_default(),
                    "Document uploaded"
                );
                let document = Document {
                    id: receipt.doc_id,
                    conversation_id: conversation_id.clone(),
                    filename: file.filename.clone(),
                    size: Some(file.size()),
                    uploaded_at: Utc::now(),
                    is_included: true,
                    path: receipt.path,
                };
                (Reconciliation::Applied, document)
            }
            Err(e) => {
                let reconciliation = self.settle_failure(op, e)?;
                (reconciliation, Document::local_only(conversation_id.clone(), &file))
            }
        };

        self.apply(|state| {
            if state.conversations.is_selected(&conversation_id) {
                state.documents.push(document.clone());
            }
        })?;
        Ok(UploadOutcome { reconciliation, document })
    }

    /// Flips whether a document is used as AI context.
    pub async fn toggle_document_inclusion(&self, document_id: &str) -> Result<Reconciliation, ClientError> {
        self.require_ready()?;
        let (conversation_id, include) = self.apply(|state| {
            let conversation_id = Self::selected_or_err(state)?;
            let doc = state
                .documents
                .iter()
                .find(|d| d.id == document_id)
                .ok_or_else(|| ClientError::DocumentNotFound { id: document_id.to_string() })?;
            Ok::<_, ClientError>((conversation_id, !doc.is_included))
        })??;

        self.reconcile(
            SyncOp::ToggleInclusion,
            self.backend().set_document_inclusion(&conversation_id, document_id, include),
            |state, ()| {
                if let Some(doc) = state.document_mut(document_id) {
                    doc.is_included = include;
                }
            },
        )
        .await
    }

    pub async fn delete_document(&self, document_id: &str) -> Result<Reconciliation, ClientError> {
        self.require_ready()?;
        let conversation_id = self.apply(|state| Self::selected_or_err(state))??;

        self.reconcile(
            SyncOp::DeleteDocument,
            self.backend().delete_document(&conversation_id, document_id),
            |state, ()| {
                state.documents.retain(|d| d.id != document_id);
                if state.preview.as_ref().is_some_and(|p| p.document_id == document_id) {
                    state.preview = None;
                }
            },
        )
        .await
    }

    pub async fn open_preview(&self, document_id: &str) -> Result<Reconciliation, ClientError> {
        self.require_ready()?;
        let conversation_id = self.apply(|state| Self::selected_or_err(state))??;

        self.reconcile(
            SyncOp::OpenPreview,
            self.backend().document_url(&conversation_id, document_id),
            |state, url| {
                if state.conversations.is_selected(&conversation_id) {
                    state.preview = Some(Preview { document_id: document_id.to_string(), url });
                }
            },
        )
        .await
    }

    pub fn close_preview(&self) {
        let _ = self.apply(|state| state.preview = None);
    }

    // ── Conversations ────────────────────────────────────────────────────────

    /// Renames a conversation. Errors come back to the caller so an edit form
    /// can stay open for another try.
    pub async fn rename_conversation(&self, conversation_id: &str, title: &str) -> Result<(), ClientError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ClientError::EmptyField { field_name: "title".to_string() });
        }
        self.require_ready()?;
        self.apply(|state| {
            if state.conversations.contains(conversation_id) {
                Ok(())
            } else {
                Err(ClientError::ConversationNotFound { id: conversation_id.to_string() })
            }
        })??;

        self.reconcile(
            SyncOp::RenameConversation,
            self.backend().rename_conversation(conversation_id, title),
            |state, ()| {
                state.conversations.rename(conversation_id, title, Utc::now());
            },
        )
        .await
        .map(|_| ())
    }

    /// Deletes a conversation. Deleting the selected one moves the selection to
    /// the first remaining conversation and reloads its lists.
    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<Reconciliation, ClientError> {
        self.require_ready()?;
        let mut next_selection = None;

        let reconciliation = self
            .reconcile(
                SyncOp::DeleteConversation,
                self.backend().delete_conversation(conversation_id),
                |state, ()| {
                    state.conversations.remove(conversation_id);
                    if !state.conversations.is_selected(conversation_id) {
                        return;
                    }
                    state.conversations.clear_selection();
                    state.clear_selection_scoped();
                    if let Some(first) = state.conversations.first_id().map(str::to_owned) {
                        state.conversations.select(&first);
                        next_selection = Some(first);
                    }
                },
            )
            .await?;

        if let Some(next) = next_selection {
            info!(deleted = %conversation_id, selected = %next, "Selection moved after delete");
            self.load_selection(&next).await;
        }
        Ok(reconciliation)
    }
}
