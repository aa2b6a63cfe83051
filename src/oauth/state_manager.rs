//! OAuth state management for CSRF protection.
//!
//! Each authorization redirect carries a single-use state token that binds the
//! callback to the provider and local user that started the flow.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// A connect flow waiting for its provider callback.
#[derive(Clone, Debug)]
pub struct PendingConnect {
    pub provider_id: String,
    pub local_user_id: String,
    pub issued_at: DateTime<Utc>,
}

/// Why a callback's state was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateRejection {
    /// Never issued, or already consumed
    Unknown,
    Expired,
    /// Issued for a different provider than the callback it arrived on
    ProviderMismatch { issued_for: String },
}

impl fmt::Display for StateRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateRejection::Unknown => write!(f, "unknown OAuth state"),
            StateRejection::Expired => write!(f, "expired OAuth state"),
            StateRejection::ProviderMismatch { issued_for } => {
                write!(f, "OAuth state was issued for provider '{}'", issued_for)
            }
        }
    }
}

impl std::error::Error for StateRejection {}

/// Pending connect flows keyed by state token, with a fixed lifetime.
#[derive(Clone)]
pub struct StateManager {
    pending: Arc<Mutex<HashMap<String, PendingConnect>>>,
    ttl: Duration,
}

impl StateManager {
    /// # Arguments
    /// * `expiry_seconds` - How long an issued state stays valid
    pub fn new(expiry_seconds: i64) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            ttl: Duration::seconds(expiry_seconds),
        }
    }

    /// Start a connect flow for `local_user_id` and return its state token.
    pub fn create_state(&self, provider_id: &str, local_user_id: &str) -> String {
        let state = Uuid::new_v4().to_string();
        let pending = PendingConnect {
            provider_id: provider_id.to_string(),
            local_user_id: local_user_id.to_string(),
            issued_at: Utc::now(),
        };

        self.lock().insert(state.clone(), pending);
        state
    }

    /// Consume the state a callback for `provider_id` arrived with.
    ///
    /// The token is spent on every outcome, so a rejected state cannot be
    /// replayed on another callback.
    pub fn validate_and_consume(
        &self,
        state: &str,
        provider_id: &str,
    ) -> Result<PendingConnect, StateRejection> {
        let pending = self.lock().remove(state).ok_or(StateRejection::Unknown)?;

        if self.is_expired(&pending, Utc::now()) {
            return Err(StateRejection::Expired);
        }
        if pending.provider_id != provider_id {
            return Err(StateRejection::ProviderMismatch {
                issued_for: pending.provider_id,
            });
        }

        Ok(pending)
    }

    /// Drop expired states. Returns how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut pending = self.lock();
        let before = pending.len();
        pending.retain(|_, p| !self.is_expired(p, now));
        before - pending.len()
    }

    /// Number of flows still waiting for a callback.
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    fn is_expired(&self, pending: &PendingConnect, now: DateTime<Utc>) -> bool {
        now - pending.issued_at > self.ttl
    }

    // A panic while holding the map cannot leave it half-updated, so a
    // poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingConnect>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Periodically drop abandoned connect flows. Runs until the task is aborted.
pub async fn run_state_cleanup(manager: StateManager, interval_seconds: u64) {
    // tokio rejects a zero period
    let period = tokio::time::Duration::from_secs(interval_seconds.max(1));
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        interval.tick().await;
        let dropped = manager.cleanup_expired();
        if dropped > 0 {
            tracing::debug!(dropped, pending = manager.count(), "Dropped expired OAuth states");
        }
    }
}
