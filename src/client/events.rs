//! Session-wide notifications for the UI shell.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info};

/// Reauth events closer together than this collapse into one redirect
pub const REAUTH_COALESCE: Duration = Duration::from_secs(1);

pub const INACTIVITY_MESSAGE: &str = "Your credentials expired due to inactivity. Please log in again.";
pub const EXPIRED_MESSAGE: &str = "Your session has expired. Please log in again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReauthReason {
    SessionExpired,
    Inactivity,
    PasswordChanged,
}

impl ReauthReason {
    pub fn message(&self) -> &'static str {
        match self {
            ReauthReason::Inactivity => INACTIVITY_MESSAGE,
            ReauthReason::SessionExpired | ReauthReason::PasswordChanged => EXPIRED_MESSAGE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    ReauthRequired { reason: ReauthReason, message: String },
}

pub struct SessionEvents {
    tx: broadcast::Sender<SessionEvent>,
    last_reauth: Mutex<Option<Instant>>,
    generation: AtomicU64,
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            tx,
            last_reauth: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Bumped on every forced logout, coalesced or not
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Returns false when the event was folded into one sent less than a second ago
    pub fn reauth_required(&self, reason: ReauthReason) -> bool {
        self.generation.fetch_add(1, Ordering::SeqCst);

        let now = Instant::now();
        {
            let mut last = self.last_reauth.lock().unwrap_or_else(|p| p.into_inner());
            if last.is_some_and(|at| now.duration_since(at) < REAUTH_COALESCE) {
                debug!("Coalesced reauth event ({:?})", reason);
                return false;
            }
            *last = Some(now);
        }

        info!("Reauthentication required: {:?}", reason);
        // No subscribers is fine; the generation still records the logout
        let _ = self.tx.send(SessionEvent::ReauthRequired {
            reason,
            message: reason.message().to_string(),
        });
        true
    }
}
