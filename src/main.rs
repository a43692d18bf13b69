use std::sync::Arc;

use chat_sync_client::{ChatSession, ClientConfig, HttpBackend};
use tracing::{info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_sync_client=debug".into()),
        )
        .init();

    // ── Session wiring ────────────────────────────────────────────────────────
    let config = ClientConfig::from_env()?;
    info!(base_url = %config.base_url, "Connecting to chat backend");
    let backend = HttpBackend::from_config(&config);
    let session = ChatSession::new(Arc::new(backend), config);

    // ── Wait for the backend, Ctrl-C gives up ────────────────────────────────
    tokio::select! {
        result = session.wait_until_ready() => result?,
        _ = tokio::signal::ctrl_c() => {
            session.shutdown();
            warn!(
                retries = session.readiness().retry_count,
                "Interrupted while waiting for the backend"
            );
            return Ok(());
        }
    }

    let state = session.snapshot();
    for conversation in state.conversations.list() {
        let marker = if state.conversations.is_selected(&conversation.id) { "*" } else { " " };
        println!("{marker} {}  {}", conversation.id, conversation.title);
    }

    // ── Optional one-shot message ────────────────────────────────────────────
    let text = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if !text.trim().is_empty() {
        let outcome = session.send_message(&text).await?;
        if let Some(reply) = outcome.reply {
            println!("{}", reply.content);
        }
    }

    for note in session.take_notifications() {
        warn!(level = ?note.level, "{}", note.message);
    }
    session.shutdown();
    Ok(())
}
