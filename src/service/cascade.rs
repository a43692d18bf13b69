//! Selection changes and the list loads they trigger.

use futures_util::future::join;
use tracing::{debug, error, info};

use crate::errors::ClientError;
use crate::service::session::ChatSession;
use crate::state::NotificationLevel;

impl ChatSession {
    /// Fetches the conversation list. The first successful population selects
    /// the first conversation when nothing is selected yet.
    pub async fn load_conversations(&self) -> Result<(), ClientError> {
        self.require_ready()?;
        self.apply(|state| state.conversations_load.begin())?;

        let result = self.backend().list_conversations().await;

        let auto_selected = self.apply(|state| {
            let first_population = !state.conversations_load.loaded_once;
            state.conversations_load.finish(result.is_ok());
            match result {
                Ok(conversations) => {
                    info!(count = conversations.len(), "Conversations loaded");
                    state.conversations.replace_all(conversations);
                    if !first_population || state.conversations.selected().is_some() {
                        return Ok(None);
                    }
                    let Some(first) = state.conversations.first_id().map(str::to_owned) else {
                        return Ok(None);
                    };
                    state.conversations.select(&first);
                    state.clear_selection_scoped();
                    Ok(Some(first))
                }
                Err(e) => {
                    error!(error = %e, "Failed to fetch conversations");
                    state.notify(
                        NotificationLevel::Error,
                        format!("Could not load conversations: {e}"),
                    );
                    Err(e)
                }
            }
        })??;

        if let Some(conversation_id) = auto_selected {
            self.load_selection(&conversation_id).await;
        }
        Ok(())
    }

    /// Points the selection at `conversation_id` and reloads what depends on it.
    /// Re-selecting the current conversation does nothing.
    pub async fn select_conversation(&self, conversation_id: &str) -> Result<(), ClientError> {
        self.require_ready()?;
        let changed = self.apply(|state| {
            if !state.conversations.contains(conversation_id) {
                return Err(ClientError::ConversationNotFound { id: conversation_id.to_string() });
            }
            let changed = state.conversations.select(conversation_id);
            if changed {
                state.clear_selection_scoped();
                state.conversation_list_open = false;
            }
            Ok(changed)
        })??;

        if changed {
            debug!(conversation_id, "Selection changed");
            self.load_selection(conversation_id).await;
        }
        Ok(())
    }

    /// Back to the empty "new chat" screen.
    pub fn clear_selection(&self) {
        let _ = self.apply(|state| {
            state.conversations.clear_selection();
            state.clear_selection_scoped();
        });
    }

    /// Loads messages and documents side by side; each handles its own failure.
    pub(crate) async fn load_selection(&self, conversation_id: &str) {
        let (messages, documents) =
            join(self.load_messages(conversation_id), self.load_documents(conversation_id)).await;
        if let (Err(ClientError::Cancelled), _) | (_, Err(ClientError::Cancelled)) = (&messages, &documents) {
            debug!(conversation_id, "Selection load abandoned after shutdown");
        }
    }

    /// Replaces the message list with the server's. Messages a send appended
    /// while the fetch was in flight stay after the fetched ones.
    pub async fn load_messages(&self, conversation_id: &str) -> Result<(), ClientError> {
        let base = self.apply(|state| {
            state.messages_load.begin();
            state.messages.len()
        })?;
        let result = self.backend().list_messages(conversation_id).await;

        self.apply(|state| {
            state.messages_load.finish(result.is_ok());
            if !state.conversations.is_selected(conversation_id) {
                debug!(conversation_id, "Dropping messages for a conversation no longer selected");
                return Ok(());
            }
            match result {
                Ok(messages) => {
                    merge_fetched(&mut state.messages, messages, base, |a, b| a.id == b.id);
                    Ok(())
                }
                Err(e) => {
                    error!(conversation_id, error = %e, "Failed to fetch messages");
                    state.notify(
                        NotificationLevel::Error,
                        format!("Could not load messages: {e}"),
                    );
                    Err(e)
                }
            }
        })?
    }

    /// Same as [`load_messages`](Self::load_messages) for documents. An upload
    /// the server already lists is not shown twice.
    pub async fn load_documents(&self, conversation_id: &str) -> Result<(), ClientError> {
        let base = self.apply(|state| {
            state.documents_load.begin();
            state.documents.len()
        })?;
        let result = self.backend().list_documents(conversation_id).await;

        self.apply(|state| {
            state.documents_load.finish(result.is_ok());
            if !state.conversations.is_selected(conversation_id) {
                debug!(conversation_id, "Dropping documents for a conversation no longer selected");
                return Ok(());
            }
            match result {
                Ok(documents) => {
                    merge_fetched(&mut state.documents, documents, base, |a, b| a.id == b.id);
                    Ok(())
                }
                Err(e) => {
                    error!(conversation_id, error = %e, "Failed to fetch documents");
                    state.notify(
                        NotificationLevel::Error,
                        format!("Could not load documents: {e}"),
                    );
                    Err(e)
                }
            }
        })?
    }
}

/// Swaps `current` for `fetched`, then re-appends whatever landed in `current`
/// past `base` while the fetch ran, skipping entries `fetched` already has.
fn merge_fetched<T>(current: &mut Vec<T>, fetched: Vec<T>, base: usize, same: impl Fn(&T, &T) -> bool) {
    let appended = current.split_off(base.min(current.len()));
    *current = fetched;
    for item in appended {
        if !current.iter().any(|existing| same(existing, &item)) {
            current.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::merge_fetched;
    use crate::errors::ClientError;
    use crate::models::MessageRole;
    use crate::service::session::ChatSession;
    use crate::state::NotificationLevel;
    use crate::testing::{ready_session, test_config, FakeBackend};

    #[tokio::test]
    async fn first_load_waits_for_readiness() {
        let fake = FakeBackend::with_conversations(&["c1"]);
        let session = ChatSession::new(fake.clone(), test_config());

        assert_eq!(session.load_conversations().await, Err(ClientError::NotReady));
        assert_eq!(fake.calls("list_conversations"), 0);

        fake.set_probe_status("health", 200);
        session.wait_until_ready().await.unwrap();
        assert_eq!(fake.calls("list_conversations"), 1);
        assert_eq!(session.selected_conversation_id().as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn initial_load_selects_first_and_loads_its_lists() {
        let fake = FakeBackend::with_conversations(&["c1", "c2"]);
        fake.add_message("c1", MessageRole::User, "hi");
        fake.add_message("c1", MessageRole::Assistant, "hello");
        fake.add_document("c1", "d1", true);
        let session = ready_session(&fake).await;

        session.load_conversations().await.unwrap();

        let state = session.snapshot();
        assert_eq!(state.conversations.selected(), Some("c1"));
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.documents.len(), 1);
        assert!(state.conversations_load.loaded_once && !state.conversations_load.loading);
        assert!(state.messages_load.loaded_once);
    }

    #[tokio::test]
    async fn refresh_does_not_reselect_after_clearing() {
        let fake = FakeBackend::with_conversations(&["c1"]);
        let session = ready_session(&fake).await;
        session.load_conversations().await.unwrap();

        session.clear_selection();
        session.load_conversations().await.unwrap();
        assert_eq!(session.selected_conversation_id(), None);
    }

    #[tokio::test]
    async fn switching_selection_replaces_scoped_lists() {
        let fake = FakeBackend::with_conversations(&["c1", "c2"]);
        fake.add_message("c1", MessageRole::User, "from c1");
        fake.add_document("c1", "d1", true);
        fake.add_message("c2", MessageRole::User, "from c2");
        let session = ready_session(&fake).await;
        session.load_conversations().await.unwrap();

        session.select_conversation("c2").await.unwrap();

        let state = session.snapshot();
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].content, "from c2");
        assert!(state.documents.is_empty());
        assert!(state.messages.iter().all(|m| m.conversation_id == "c2"));
    }

    #[tokio::test]
    async fn reselecting_current_conversation_is_a_no_op() {
        let fake = FakeBackend::with_conversations(&["c1"]);
        let session = ready_session(&fake).await;
        session.load_conversations().await.unwrap();
        let loads = fake.calls("list_messages");

        session.select_conversation("c1").await.unwrap();
        assert_eq!(fake.calls("list_messages"), loads);

        let err = session.select_conversation("missing").await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn one_failed_list_does_not_block_the_other() {
        let fake = FakeBackend::with_conversations(&["c1"]);
        fake.add_message("c1", MessageRole::User, "still here");
        fake.fail("list_documents");
        let session = ready_session(&fake).await;

        session.load_conversations().await.unwrap();

        let state = session.snapshot();
        assert_eq!(state.messages.len(), 1);
        assert!(state.documents.is_empty());
        assert!(!state.documents_load.loading);
        let notes = session.take_notifications();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, NotificationLevel::Error);
        assert!(notes[0].message.starts_with("Could not load documents"));
    }

    #[tokio::test]
    async fn failed_conversation_load_notifies() {
        let fake = FakeBackend::with_conversations(&["c1"]);
        fake.fail("list_conversations");
        let session = ready_session(&fake).await;

        assert!(session.load_conversations().await.unwrap_err().is_transient());
        assert!(session.snapshot().conversations.is_empty());
        assert_eq!(session.take_notifications().len(), 1);
    }

    #[tokio::test]
    async fn slow_load_for_old_selection_is_dropped() {
        let fake = FakeBackend::with_conversations(&["c1", "c2"]);
        fake.add_message("c1", MessageRole::User, "old");
        let session = ready_session(&fake).await;
        session.load_conversations().await.unwrap();
        session.select_conversation("c2").await.unwrap();

        // c1's load resolves after c2 became the selection.
        let (stale, _) = tokio::join!(session.load_messages("c1"), async {
            session.clear_selection();
            session.select_conversation("c2").await.unwrap();
        });
        stale.unwrap();
        assert!(session.snapshot().messages.is_empty());
    }

    #[tokio::test]
    async fn failed_first_load_still_auto_selects_on_retry() {
        let fake = FakeBackend::with_conversations(&["c1", "c2"]);
        fake.fail("list_conversations");
        let session = ready_session(&fake).await;

        assert!(session.load_conversations().await.is_err());
        let state = session.snapshot();
        assert!(!state.conversations_load.loaded_once);
        assert!(!state.conversations_load.loading);

        fake.recover("list_conversations");
        session.load_conversations().await.unwrap();
        assert_eq!(session.selected_conversation_id().as_deref(), Some("c1"));
        assert!(session.snapshot().conversations_load.loaded_once);
    }

    #[tokio::test]
    async fn switching_clears_old_lists_even_when_new_loads_fail() {
        let fake = FakeBackend::with_conversations(&["c1", "c2"]);
        fake.add_message("c1", MessageRole::User, "from c1");
        fake.add_document("c1", "d1", true);
        let session = ready_session(&fake).await;
        session.load_conversations().await.unwrap();
        session.open_preview("d1").await.unwrap();
        assert_eq!(session.snapshot().messages.len(), 1);

        fake.fail("list_messages");
        fake.fail("list_documents");
        session.select_conversation("c2").await.unwrap();

        let state = session.snapshot();
        assert_eq!(state.conversations.selected(), Some("c2"));
        assert!(state.messages.is_empty());
        assert!(state.documents.is_empty());
        assert!(state.preview.is_none());
        assert_eq!(session.take_notifications().len(), 2);
    }

    #[tokio::test]
    async fn reply_landing_after_selection_load_keeps_its_user_message() {
        let fake = FakeBackend::with_conversations(&["c1", "c2"]);
        fake.add_message("c2", MessageRole::User, "from c2");
        let session = ready_session(&fake).await;
        session.load_conversations().await.unwrap();
        fake.hold("send_message");

        let (selected, sent) = tokio::join!(
            async {
                let result = session.select_conversation("c2").await;
                fake.release("send_message");
                result
            },
            session.send_message("hello"),
        );
        selected.unwrap();
        let sent = sent.unwrap();
        assert!(sent.reply.is_some());

        let contents: Vec<String> = session.snapshot().messages.into_iter().map(|m| m.content).collect();
        assert_eq!(contents, ["from c2", "hello", "echo: hello"]);
    }

    #[tokio::test]
    async fn selection_load_landing_after_send_keeps_both_messages() {
        let fake = FakeBackend::with_conversations(&["c1", "c2"]);
        fake.add_message("c2", MessageRole::User, "from c2");
        let session = ready_session(&fake).await;
        session.load_conversations().await.unwrap();
        fake.hold("list_messages");

        let (selected, sent) = tokio::join!(session.select_conversation("c2"), async {
            let result = session.send_message("hello").await;
            fake.release("list_messages");
            result
        });
        selected.unwrap();
        assert_eq!(sent.unwrap().reconciliation, crate::service::sync::Reconciliation::Applied);

        let messages = session.snapshot().messages;
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["from c2", "hello", "echo: hello"]);
        assert!(messages.iter().all(|m| m.conversation_id == "c2"));
    }

    #[test]
    fn merge_keeps_local_appends_and_skips_known_entries() {
        let mut current = vec![1, 2, 3, 4];
        merge_fetched(&mut current, vec![10, 4], 2, |a, b| a == b);
        assert_eq!(current, vec![10, 4, 3]);

        let mut shrunk = vec![7];
        merge_fetched(&mut shrunk, vec![8], 5, |a, b| a == b);
        assert_eq!(shrunk, vec![8]);
    }
}
