//! Client-side session for a conversational document-chat backend: readiness
//! gating, single-flight conversation creation, optimistic message and
//! document updates, and selection-driven reloads.

pub mod api;
pub mod config;
pub mod errors;
pub mod models;
pub mod service;
pub mod state;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ChatBackend, HttpBackend, SessionTokenProvider, StaticToken};
pub use config::ClientConfig;
pub use errors::ClientError;
pub use service::session::{ActiveConversation, ChatSession};
pub use service::sync::{Reconciliation, SendOutcome, UploadOutcome};
