use std::time::Duration;

use tracing::warn;

use crate::errors::ClientError;

const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_HEALTH_PATHS: &[&str] = &["health", "docs"];
const DEFAULT_READINESS_INTERVAL_MS: u64 = 1000;
const DEFAULT_OFFLINE_REPLY_DELAY_MS: u64 = 1000;

/// Connection and timing settings for a [`ChatSession`](crate::service::session::ChatSession).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub user_id: String,
    pub api_token: Option<String>,
    /// Probed in order; the first reachable one wins.
    pub health_paths: Vec<String>,
    pub readiness_interval: Duration,
    pub offline_reply_delay: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            user_id: user_id.into(),
            api_token: None,
            health_paths: DEFAULT_HEALTH_PATHS.iter().map(|p| p.to_string()).collect(),
            readiness_interval: Duration::from_millis(DEFAULT_READINESS_INTERVAL_MS),
            offline_reply_delay: Duration::from_millis(DEFAULT_OFFLINE_REPLY_DELAY_MS),
        }
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn with_health_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.health_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_readiness_interval(mut self, interval: Duration) -> Self {
        self.readiness_interval = interval;
        self
    }

    pub fn with_offline_reply_delay(mut self, delay: Duration) -> Self {
        self.offline_reply_delay = delay;
        self
    }

    /// Reads `CHAT_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        let base_url = lookup("CHAT_API_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let user_id = lookup("CHAT_USER_ID")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ClientError::MissingConfig { key: "CHAT_USER_ID".to_string() })?;

        let mut config = Self::new(base_url, user_id);
        config.api_token = lookup("CHAT_API_TOKEN").filter(|t| !t.trim().is_empty());

        if let Some(raw) = lookup("CHAT_HEALTH_PATHS") {
            let paths: Vec<String> = raw
                .split(',')
                .map(|p| p.trim().trim_matches('/').to_string())
                .filter(|p| !p.is_empty())
                .collect();
            if paths.is_empty() {
                warn!("CHAT_HEALTH_PATHS is empty, keeping defaults");
            } else {
                config.health_paths = paths;
            }
        }

        config.readiness_interval =
            millis_or_default(&lookup, "CHAT_READINESS_INTERVAL_MS", DEFAULT_READINESS_INTERVAL_MS);
        config.offline_reply_delay =
            millis_or_default(&lookup, "CHAT_OFFLINE_REPLY_DELAY_MS", DEFAULT_OFFLINE_REPLY_DELAY_MS);

        Ok(config)
    }
}

fn millis_or_default(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Duration {
    let millis = match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Ignoring unparseable duration, using default");
            default
        }),
    };
    Duration::from_millis(millis)
}
