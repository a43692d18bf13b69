use chrono::{DateTime, Utc};

use crate::models::Conversation;

/// Conversations in display order (most recent first) plus the selection pointer.
///
/// The selection is validated when it is set, never afterwards.
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    selected: Option<String>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn first_id(&self) -> Option<&str> {
        self.conversations.first().map(|c| c.id.as_str())
    }

    /// Replaces the whole list with a fresh server listing.
    pub fn replace_all(&mut self, conversations: Vec<Conversation>) {
        self.conversations = conversations;
    }

    pub fn prepend(&mut self, conversation: Conversation) {
        self.conversations.retain(|c| c.id != conversation.id);
        self.conversations.insert(0, conversation);
    }

    /// Returns false when no conversation has this id.
    pub fn rename(&mut self, id: &str, title: &str, at: DateTime<Utc>) -> bool {
        match self.conversations.iter_mut().find(|c| c.id == id) {
            Some(conv) => {
                conv.title = title.to_string();
                conv.updated_at = at;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Conversation> {
        let index = self.conversations.iter().position(|c| c.id == id)?;
        Some(self.conversations.remove(index))
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.as_deref() == Some(id)
    }

    /// Points the selection at `id` if it is present. Returns whether it moved.
    pub fn select(&mut self, id: &str) -> bool {
        if !self.contains(id) || self.is_selected(id) {
            return false;
        }
        self.selected = Some(id.to_string());
        true
    }

    pub fn clear_selection(&mut self) -> Option<String> {
        self.selected.take()
    }
}
