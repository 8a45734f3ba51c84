//! In-memory creation windows.
//!
//! A bare `/vote` opens a window for the sender; the next private text they
//! send within `create_timeout_secs` is taken as the channel reference. Each
//! window carries a generation number so a stale expiry timer cannot close a
//! window that was reopened in the meantime.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

/// Per-bot pending creation windows, keyed by user id.
pub struct PendingCreations {
    windows: HashMap<i64, PendingWindow>,
    ttl: Duration,
    next_generation: u64,
}

struct PendingWindow {
    generation: u64,
    expires_at: Instant,
}

/// Result of consuming a user's text as a channel reference.
#[derive(Debug, PartialEq, Eq)]
pub enum PendingTake {
    /// A live window existed and is now closed.
    Active,
    /// A window existed but ran out; it has been discarded.
    Expired,
    /// No window for this user.
    None,
}

impl PendingCreations {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            windows: HashMap::new(),
            ttl: Duration::from_secs(ttl_secs),
            next_generation: 0,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Open (or reopen) a window. Returns the generation to pass to
    /// [`PendingCreations::expire`].
    pub fn open(&mut self, user_id: i64) -> u64 {
        self.purge_expired();
        self.open_at(user_id, Instant::now())
    }

    fn open_at(&mut self, user_id: i64, now: Instant) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.windows.insert(user_id, PendingWindow {
            generation,
            expires_at: now + self.ttl,
        });
        generation
    }

    pub fn take(&mut self, user_id: i64) -> PendingTake {
        self.take_at(user_id, Instant::now())
    }

    fn take_at(&mut self, user_id: i64, now: Instant) -> PendingTake {
        match self.windows.remove(&user_id) {
            Some(window) if now < window.expires_at => PendingTake::Active,
            Some(_) => PendingTake::Expired,
            None => PendingTake::None,
        }
    }

    /// Close the window opened with `generation` if it is still waiting.
    /// Returns `true` when the window was closed by this call.
    pub fn expire(&mut self, user_id: i64, generation: u64) -> bool {
        match self.windows.get(&user_id) {
            Some(window) if window.generation == generation => {
                self.windows.remove(&user_id);
                true
            },
            _ => false,
        }
    }

    pub fn is_pending(&self, user_id: i64) -> bool {
        self.windows
            .get(&user_id)
            .is_some_and(|w| Instant::now() < w.expires_at)
    }

    /// Drop windows that ran out without a timer firing.
    fn purge_expired(&mut self) {
        let now = Instant::now();
        self.windows.retain(|_, w| now < w.expires_at);
    }
}
