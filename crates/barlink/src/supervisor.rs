// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reconnection supervisor.
//!
//! Decides when the session tears its transport down and rejoins. Triggers
//! are debounced so a burst collapses into one reconnect, and non-forced
//! triggers are rate-limited by a cooldown measured from the last reconnect.
//! Forced triggers (send failure, total peer loss, OS connectivity change)
//! skip the cooldown but are still debounced.
//!
//! A soft reconnect runs in three timed steps, each surfaced by
//! [`ReconnectSupervisor::next_step`]:
//!
//! ```text
//!  schedule ──debounce──► Teardown ──grace──► Rejoin ──settle──► Announce
//! ```

use crate::config::MeshConfig;
use crate::timer::Timer;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Step of a soft reconnect whose delay has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectStep {
    /// Debounce elapsed: stop beating and leave the room.
    Teardown,
    /// Grace elapsed: join the room again.
    Rejoin,
    /// Settle elapsed: tell peers about our new identity.
    Announce,
}

/// Debounced, rate-limited reconnect scheduling.
#[derive(Debug)]
pub struct ReconnectSupervisor {
    debounce_delay: Duration,
    cooldown: Duration,
    grace_delay: Duration,
    settle_delay: Duration,
    debounce: Timer,
    grace: Timer,
    settle: Timer,
    last_reconnect_at: Option<Instant>,
    reconnects: u64,
}

impl ReconnectSupervisor {
    pub fn new(config: &MeshConfig) -> Self {
        Self {
            debounce_delay: config.reconnect_debounce(),
            cooldown: config.reconnect_cooldown(),
            grace_delay: config.rejoin_grace(),
            settle_delay: config.announce_delay(),
            debounce: Timer::new(),
            grace: Timer::new(),
            settle: Timer::new(),
            last_reconnect_at: None,
            reconnects: 0,
        }
    }

    /// Request a reconnect. Returns whether the debounce timer was (re)armed.
    pub fn schedule(&mut self, force: bool, now: Instant) -> bool {
        if !force {
            if let Some(last) = self.last_reconnect_at {
                if now.saturating_duration_since(last) < self.cooldown {
                    debug!("Reconnect suppressed by cooldown");
                    return false;
                }
            }
        }
        if self.debounce.cancel() {
            debug!("Pending reconnect coalesced");
        }
        self.debounce.arm(self.debounce_delay);
        info!("Scheduling reconnect (force: {})", force);
        true
    }

    /// Teardown done; wait the grace delay before rejoining.
    pub fn begin_rejoin(&mut self) {
        self.settle.cancel();
        self.grace.arm(self.grace_delay);
    }

    /// Rejoined; wait for the mesh to settle before announcing.
    pub fn begin_settle(&mut self) {
        self.settle.arm(self.settle_delay);
    }

    /// Wait for the next step whose delay elapses. Cancel-safe.
    pub async fn next_step(&mut self) -> ReconnectStep {
        tokio::select! {
            _ = self.debounce.fired() => {
                self.last_reconnect_at = Some(Instant::now());
                self.reconnects += 1;
                ReconnectStep::Teardown
            }
            _ = self.grace.fired() => ReconnectStep::Rejoin,
            _ = self.settle.fired() => ReconnectStep::Announce,
        }
    }

    /// Drop every pending step.
    pub fn cancel_all(&mut self) {
        self.debounce.cancel();
        self.grace.cancel();
        self.settle.cancel();
    }

    pub fn is_pending(&self) -> bool {
        self.debounce.is_armed() || self.grace.is_armed() || self.settle.is_armed()
    }

    /// Soft reconnects started so far.
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    pub fn last_reconnect_at(&self) -> Option<Instant> {
        self.last_reconnect_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supervisor() -> ReconnectSupervisor {
        ReconnectSupervisor::new(&MeshConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_trigger_reaches_teardown_after_debounce() {
        let mut sup = supervisor();
        let start = Instant::now();
        assert!(sup.schedule(true, start));

        assert_eq!(sup.next_step().await, ReconnectStep::Teardown);
        assert_eq!(start.elapsed(), Duration::from_millis(1000));
        assert_eq!(sup.reconnects(), 1);
        assert_eq!(sup.last_reconnect_at(), Some(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_into_one_reconnect() {
        let mut sup = supervisor();
        let start = Instant::now();
        sup.schedule(true, Instant::now());
        tokio::time::sleep(Duration::from_millis(400)).await;
        sup.schedule(false, Instant::now());
        tokio::time::sleep(Duration::from_millis(400)).await;
        sup.schedule(true, Instant::now());

        assert_eq!(sup.next_step().await, ReconnectStep::Teardown);
        assert_eq!(start.elapsed(), Duration::from_millis(1800));
        assert_eq!(sup.reconnects(), 1);
        assert!(!sup.is_pending());

        let more = tokio::time::timeout(Duration::from_secs(10), sup.next_step()).await;
        assert!(more.is_err());
        assert_eq!(sup.reconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_suppresses_unforced() {
        let mut sup = supervisor();
        sup.schedule(false, Instant::now());
        sup.next_step().await;

        tokio::time::sleep(Duration::from_millis(2999)).await;
        assert!(!sup.schedule(false, Instant::now()));
        assert!(!sup.is_pending());

        assert!(sup.schedule(true, Instant::now()));
        assert_eq!(sup.next_step().await, ReconnectStep::Teardown);
        assert_eq!(sup.reconnects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unforced_allowed_after_cooldown() {
        let mut sup = supervisor();
        assert!(sup.schedule(false, Instant::now()));
        sup.next_step().await;

        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert!(sup.schedule(false, Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejoin_and_settle_delays() {
        let mut sup = supervisor();
        let start = Instant::now();
        sup.begin_rejoin();
        assert_eq!(sup.next_step().await, ReconnectStep::Rejoin);
        assert_eq!(start.elapsed(), Duration::from_millis(100));

        sup.begin_settle();
        assert_eq!(sup.next_step().await, ReconnectStep::Announce);
        assert_eq!(start.elapsed(), Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_teardown_cancels_pending_announce() {
        let mut sup = supervisor();
        sup.begin_settle();
        sup.begin_rejoin();
        assert_eq!(sup.next_step().await, ReconnectStep::Rejoin);
        let more = tokio::time::timeout(Duration::from_secs(5), sup.next_step()).await;
        assert!(more.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let mut sup = supervisor();
        sup.schedule(true, Instant::now());
        sup.begin_rejoin();
        sup.cancel_all();
        assert!(!sup.is_pending());
    }
}
