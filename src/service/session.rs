use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::api::ChatBackend;
use crate::config::ClientConfig;
use crate::errors::ClientError;
use crate::models::Conversation;
use crate::service::readiness::{ReadinessMonitor, ReadinessState};
use crate::service::single_flight::SingleFlight;
use crate::state::{Notification, NotificationLevel, SessionState};

const MAX_TITLE_CHARS: usize = 60;
const TRUNCATED_TITLE_CHARS: usize = 57;

/// The conversation a command will act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveConversation {
    pub conversation_id: String,
    /// True when this call (or the call it joined) created the conversation.
    pub created: bool,
}

/// Operations that must never run twice at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum FlightKey {
    CreateConversation,
}

struct SessionInner {
    backend: Arc<dyn ChatBackend>,
    config: ClientConfig,
    state: Mutex<SessionState>,
    readiness: ReadinessMonitor,
    flights: SingleFlight<FlightKey, ActiveConversation, ClientError>,
    token: CancellationToken,
}

/// One user's live view of the chat backend. Cheap to clone; clones share state.
///
/// Commands live in `service::sync` (mutations) and `service::cascade`
/// (selection and list loads).
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<SessionInner>,
}

impl ChatSession {
    pub fn new(backend: Arc<dyn ChatBackend>, config: ClientConfig) -> Self {
        let token = CancellationToken::new();
        let readiness = ReadinessMonitor::new(
            Arc::clone(&backend),
            config.health_paths.clone(),
            config.readiness_interval,
            token.child_token(),
        );
        Self {
            inner: Arc::new(SessionInner {
                backend,
                config,
                state: Mutex::new(SessionState::default()),
                readiness,
                flights: SingleFlight::new(),
                token,
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub(crate) fn backend(&self) -> &dyn ChatBackend {
        self.inner.backend.as_ref()
    }

    pub fn snapshot(&self) -> SessionState {
        self.inner.state.lock().clone()
    }

    pub fn selected_conversation_id(&self) -> Option<String> {
        self.inner.state.lock().conversations.selected().map(str::to_owned)
    }

    pub fn take_notifications(&self) -> Vec<Notification> {
        std::mem::take(&mut self.inner.state.lock().notifications)
    }

    pub fn set_conversation_list_open(&self, open: bool) {
        self.inner.state.lock().conversation_list_open = open;
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Tears the session down. Results that arrive afterwards are discarded.
    pub fn shutdown(&self) {
        info!("Shutting down chat session");
        self.inner.token.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Applies `f` to the state unless the session has been torn down.
    pub(crate) fn apply<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> Result<R, ClientError> {
        if self.inner.token.is_cancelled() {
            debug!("Discarding async result after shutdown");
            return Err(ClientError::Cancelled);
        }
        let mut state = self.inner.state.lock();
        Ok(f(&mut state))
    }

    pub(crate) fn notify_error(&self, message: impl Into<String>) {
        // Shutdown means nobody is left to read it.
        let _ = self.apply(|state| state.notify(NotificationLevel::Error, message));
    }

    // ── Readiness ────────────────────────────────────────────────────────────

    pub fn readiness(&self) -> ReadinessState {
        self.inner.readiness.state()
    }

    /// Manual retry from the waiting screen.
    pub async fn retry_readiness(&self) -> ReadinessState {
        self.inner.readiness.check_now().await
    }

    /// Polls until the backend answers, then performs the first conversation load.
    pub async fn wait_until_ready(&self) -> Result<(), ClientError> {
        if !self.inner.readiness.run().await {
            return Err(ClientError::Cancelled);
        }
        self.load_conversations().await
    }

    pub(crate) fn require_ready(&self) -> Result<(), ClientError> {
        if self.inner.token.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        if !self.inner.readiness.is_ready() {
            return Err(ClientError::NotReady);
        }
        Ok(())
    }

    // ── Conversation creation ────────────────────────────────────────────────

    /// Returns the selected conversation, creating one if nothing is selected.
    /// Concurrent callers share a single creation.
    pub async fn ensure_active_conversation(
        &self,
        seed_title: Option<&str>,
    ) -> Result<ActiveConversation, ClientError> {
        if let Some(conversation_id) = self.selected_conversation_id() {
            return Ok(ActiveConversation { conversation_id, created: false });
        }
        self.create_conversation(seed_title).await
    }

    /// The explicit "new conversation" action. Shares the in-flight slot with
    /// [`ensure_active_conversation`](Self::ensure_active_conversation).
    pub async fn new_conversation(&self, title: Option<&str>) -> Result<ActiveConversation, ClientError> {
        self.create_conversation(title).await
    }

    pub fn is_creating_conversation(&self) -> bool {
        self.inner.flights.is_in_flight(&FlightKey::CreateConversation)
    }

    async fn create_conversation(&self, seed_title: Option<&str>) -> Result<ActiveConversation, ClientError> {
        self.require_ready()?;
        let session = self.clone();
        let seed = seed_title.map(str::to_owned);
        self.inner
            .flights
            .run(FlightKey::CreateConversation, move || async move {
                session.create_conversation_now(seed).await
            })
            .await
    }

    async fn create_conversation_now(&self, seed: Option<String>) -> Result<ActiveConversation, ClientError> {
        let title = {
            let state = self.inner.state.lock();
            derive_title(seed.as_deref(), state.conversations.len())
        };
        info!(title = %title, "Creating conversation");

        let conversation_id = self
            .inner
            .backend
            .create_conversation(&title)
            .await
            .inspect_err(|e| error!(error = %e, "Failed to create conversation"))?;

        self.apply(|state| {
            state.conversations.prepend(Conversation::new(conversation_id.clone(), title));
            state.conversations.select(&conversation_id);
            // Nothing to load for a brand new conversation.
            state.clear_selection_scoped();
            state.conversation_list_open = false;
        })?;
        info!(conversation_id = %conversation_id, "Conversation created and selected");

        Ok(ActiveConversation { conversation_id, created: true })
    }
}

/// Builds a conversation title from the user's first input, falling back to a
/// numbered default.
pub fn derive_title(seed: Option<&str>, existing_conversations: usize) -> String {
    let collapsed = seed
        .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();

    if collapsed.is_empty() {
        return format!("New Conversation {}", existing_conversations + 1);
    }
    if collapsed.chars().count() > MAX_TITLE_CHARS {
        let head: String = collapsed.chars().take(TRUNCATED_TITLE_CHARS).collect();
        return format!("{head}...");
    }
    collapsed
}
