//! Forced logout after a long gap between user interactions.
//!
//! `record` is fed by the shell on every interaction; `tick` is the heartbeat.
//! The heartbeat only keeps tokens fresh while the user was active within the
//! recency window, so an abandoned session is never refreshed in the
//! background.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::events::ReauthReason;
use super::http::ApiClient;
use crate::config::ClientConfig;

/// Bumps closer together than this are not recorded
pub const BUMP_COALESCE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Click,
    KeyPress,
    Touch,
    Scroll,
    Focus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityOutcome {
    Recorded,
    /// The gap was too long; the session has been logged out
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No recent activity; nothing checked
    Idle,
    /// Recent activity, token not due for refresh
    Fresh,
    Refreshed,
    RefreshFailed,
    Expired,
}

#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    pub timeout: Duration,
    pub recency: Duration,
    pub refresh_skew: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for MonitorSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            timeout: config.inactivity_timeout(),
            recency: config.activity_recency(),
            refresh_skew: config.refresh_skew(),
        }
    }
}

struct MonitorState {
    last_activity: Instant,
    expired: bool,
}

pub struct InactivityMonitor {
    client: ApiClient,
    settings: MonitorSettings,
    state: Mutex<MonitorState>,
}

impl InactivityMonitor {
    pub fn new(client: ApiClient, settings: MonitorSettings) -> Arc<Self> {
        Arc::new(Self {
            client,
            settings,
            state: Mutex::new(MonitorState {
                last_activity: Instant::now(),
                expired: false,
            }),
        })
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MonitorState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut state)
    }

    pub fn idle_for(&self) -> Duration {
        self.with_state(|s| Instant::now().duration_since(s.last_activity))
    }

    pub fn is_expired(&self) -> bool {
        self.with_state(|s| s.expired)
    }

    /// Start over after a fresh login
    pub fn reset(&self) {
        self.with_state(|s| {
            s.last_activity = Instant::now();
            s.expired = false;
        });
    }

    /// Marks the monitor expired; true only for the call that flipped it
    fn claim_expiry(&self, now: Instant) -> Option<bool> {
        self.with_state(|s| {
            if s.expired {
                return Some(false);
            }
            if now.duration_since(s.last_activity) >= self.settings.timeout {
                s.expired = true;
                return Some(true);
            }
            None
        })
    }

    async fn expire(&self) {
        info!("Session expired after {:?} without activity", self.idle_for());
        self.client.force_logout(ReauthReason::Inactivity).await;
    }

    pub async fn record(&self, kind: ActivityKind) -> ActivityOutcome {
        let now = Instant::now();
        match self.claim_expiry(now) {
            Some(true) => {
                self.expire().await;
                return ActivityOutcome::Expired;
            }
            Some(false) => return ActivityOutcome::Expired,
            None => {}
        }

        self.with_state(|s| {
            if now.duration_since(s.last_activity) >= BUMP_COALESCE {
                s.last_activity = now;
            }
        });
        debug!("Activity recorded: {:?}", kind);
        ActivityOutcome::Recorded
    }

    pub async fn tick(&self) -> TickOutcome {
        let now = Instant::now();
        match self.claim_expiry(now) {
            Some(true) => {
                self.expire().await;
                return TickOutcome::Expired;
            }
            Some(false) => return TickOutcome::Expired,
            None => {}
        }

        if self.idle_for() > self.settings.recency {
            return TickOutcome::Idle;
        }

        match self.client.ensure_fresh(self.settings.refresh_skew).await {
            Ok(true) => TickOutcome::Refreshed,
            Ok(false) => TickOutcome::Fresh,
            Err(e) => {
                debug!("Heartbeat refresh failed: {}", e);
                TickOutcome::RefreshFailed
            }
        }
    }

    /// Heartbeat task; stops when the monitor is dropped or the session ends
    pub fn spawn(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let monitor: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(monitor) = monitor.upgrade() else {
                    break;
                };
                match monitor.tick().await {
                    TickOutcome::Expired | TickOutcome::RefreshFailed => break,
                    outcome => debug!("Heartbeat: {:?}", outcome),
                }
            }
        })
    }
}
