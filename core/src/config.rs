//! Per-call configuration: how a request is performed rather than what it
//! sends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::UsageError;

/// User agent sent when the configuration does not name one.
pub const DEFAULT_USER_AGENT: &str = concat!("http-request/", env!("CARGO_PKG_VERSION"));

/// Cooperative cancellation signal shared between the caller and a transport.
///
/// Clones observe the same flag, so one thread can run a request while
/// another calls [`CancelFlag::cancel`]. Transports poll the flag and abort
/// with a cancellation failure.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clear the flag so it can guard another call.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Which transport strategy the factory builds.
///
/// The wire transports honor the cancel flag at every blocking point under
/// either kind; custom factories may build different transports per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
    /// One exchange per call.
    #[default]
    Single,
    /// Exchanges driven for several callers at once.
    Multi,
}

/// Options that change how one request is performed.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    timeout: Option<Duration>,
    user_agent: Option<String>,
    handler: HandlerKind,
    cancel: CancelFlag,
}

impl Configuration {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_handler(mut self, handler: HandlerKind) -> Self {
        self.handler = handler;
        self
    }

    /// Observe `cancel` instead of a private, never-set flag.
    pub fn with_cancel_flag(mut self, cancel: &CancelFlag) -> Self {
        self.cancel = cancel.clone();
        self
    }

    /// Parse configuration from JSON, e.g.
    /// `{"timeout_ms": 5000, "user_agent": "agent/1.0", "handler": "multi"}`.
    /// A zero or absent timeout means no timeout.
    pub fn from_json(text: &str) -> Result<Self, UsageError> {
        let file: ConfigurationFile =
            serde_json::from_str(text).map_err(|e| UsageError::InvalidConfiguration(e.to_string()))?;
        Ok(file.into())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }

    pub fn handler(&self) -> HandlerKind {
        self.handler
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }
}

/// Serialized shape of a [`Configuration`].
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigurationFile {
    timeout_ms: Option<u64>,
    user_agent: Option<String>,
    handler: HandlerKind,
}

impl From<ConfigurationFile> for Configuration {
    fn from(file: ConfigurationFile) -> Self {
        Self {
            timeout: file.timeout_ms.filter(|ms| *ms > 0).map(Duration::from_millis),
            user_agent: file.user_agent.filter(|ua| !ua.is_empty()),
            handler: file.handler,
            cancel: CancelFlag::new(),
        }
    }
}
