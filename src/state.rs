use crate::models::{Document, Message};
use crate::store::ConversationStore;

/// Everything the UI renders from, owned by one [`ChatSession`](crate::service::session::ChatSession).
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub conversations: ConversationStore,
    /// Always belongs to the selected conversation.
    pub messages: Vec<Message>,
    /// Always belongs to the selected conversation.
    pub documents: Vec<Document>,
    pub preview: Option<Preview>,

    pub conversations_load: ListLoad,
    pub messages_load: ListLoad,
    pub documents_load: ListLoad,

    /// Mobile-only conversation list overlay.
    pub conversation_list_open: bool,
    pub notifications: Vec<Notification>,
}

impl SessionState {
    /// Drops everything scoped to the previously selected conversation.
    pub fn clear_selection_scoped(&mut self) {
        self.messages.clear();
        self.documents.clear();
        self.preview = None;
    }

    pub fn notify(&mut self, level: NotificationLevel, message: impl Into<String>) {
        self.notifications.push(Notification { level, message: message.into() });
    }

    pub fn document_mut(&mut self, id: &str) -> Option<&mut Document> {
        self.documents.iter_mut().find(|d| d.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub document_id: String,
    pub url: String,
}

/// Tracks one kind of list fetch. Fetches show a blocking indicator until one
/// succeeds; refreshes after that happen silently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListLoad {
    pub loading: bool,
    pub loaded_once: bool,
}

impl ListLoad {
    pub fn begin(&mut self) {
        self.loading = !self.loaded_once;
    }

    pub fn finish(&mut self, succeeded: bool) {
        self.loading = false;
        self.loaded_once |= succeeded;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}
