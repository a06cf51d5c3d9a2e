//! Host capabilities the engine depends on: identity, connectivity and time.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use time::OffsetDateTime;

pub trait Platform: Send + Sync {
    /// Authenticated user, or `None` for anonymous/local-only play.
    fn current_user_id(&self) -> Option<String>;

    fn is_online(&self) -> bool;

    /// Wall-clock time in unix milliseconds.
    fn now_millis(&self) -> u64;
}

pub fn system_time_millis() -> u64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as u64
}

#[derive(Debug)]
enum Clock {
    System,
    Manual(AtomicU64),
}

/// Platform implementation driven by the host application.
///
/// The host updates identity and connectivity as they change. The clock is
/// the system clock unless constructed with [`HostPlatform::with_manual_clock`].
#[derive(Debug)]
pub struct HostPlatform {
    user_id: RwLock<Option<String>>,
    online: AtomicBool,
    clock: Clock,
}

impl HostPlatform {
    pub fn new(user_id: Option<String>, online: bool) -> Self {
        Self { user_id: RwLock::new(user_id), online: AtomicBool::new(online), clock: Clock::System }
    }

    /// Anonymous and offline.
    pub fn offline() -> Self {
        Self::new(None, false)
    }

    pub fn with_manual_clock(mut self, start_millis: u64) -> Self {
        self.clock = Clock::Manual(AtomicU64::new(start_millis));
        self
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        if let Ok(mut user) = self.user_id.write() {
            *user = Some(user_id.into());
        }
    }

    pub fn sign_out(&self) {
        if let Ok(mut user) = self.user_id.write() {
            *user = None;
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Advance a manual clock. No effect on the system clock.
    pub fn advance_millis(&self, delta: u64) {
        if let Clock::Manual(now) = &self.clock {
            now.fetch_add(delta, Ordering::SeqCst);
        }
    }

    pub fn set_time_millis(&self, millis: u64) {
        if let Clock::Manual(now) = &self.clock {
            now.store(millis, Ordering::SeqCst);
        }
    }
}

impl Default for HostPlatform {
    fn default() -> Self {
        Self::offline()
    }
}

impl Platform for HostPlatform {
    fn current_user_id(&self) -> Option<String> {
        self.user_id.read().ok().and_then(|user| user.clone())
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn now_millis(&self) -> u64 {
        match &self.clock {
            Clock::System => system_time_millis(),
            Clock::Manual(now) => now.load(Ordering::SeqCst),
        }
    }
}
