// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Peer presence tracking.
//!
//! The tracker is the only authoritative failure detector of a session: the
//! transport's own leave notifications are hints and a peer whose process is
//! killed simply falls silent. Every inbound frame refreshes its sender; a
//! sweep removes peers silent for longer than the timeout.
//!
//! Operations return the presence events they cause instead of emitting them,
//! so callers decide where they go and tests can assert on them directly.

use crate::protocol::PeerId;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Presence transition caused by a tracker operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    Join(PeerId),
    Leave(PeerId),
    /// Peer count after a membership change.
    Peers(usize),
}

/// Last-seen timestamps of every live peer.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    peers: HashMap<PeerId, Instant>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sighting of `peer`.
    ///
    /// A peer not yet tracked produces `Join` followed by `Peers`.
    pub fn touch(&mut self, peer: &PeerId, now: Instant) -> Vec<PresenceEvent> {
        match self.peers.insert(peer.clone(), now) {
            Some(_) => Vec::new(),
            None => vec![
                PresenceEvent::Join(peer.clone()),
                PresenceEvent::Peers(self.count()),
            ],
        }
    }

    /// Remove every peer silent for more than `timeout`.
    ///
    /// Emits one `Leave` per removed peer and a single trailing `Peers` when
    /// anything was removed.
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> Vec<PresenceEvent> {
        let mut expired: Vec<PeerId> = self
            .peers
            .iter()
            .filter(|(_, last_seen)| now.saturating_duration_since(**last_seen) > timeout)
            .map(|(peer, _)| peer.clone())
            .collect();
        if expired.is_empty() {
            return Vec::new();
        }
        expired.sort();

        let mut events = Vec::with_capacity(expired.len() + 1);
        for peer in expired {
            self.peers.remove(&peer);
            events.push(PresenceEvent::Leave(peer));
        }
        events.push(PresenceEvent::Peers(self.count()));
        events
    }

    /// Explicit departure reported by the transport.
    ///
    /// Recency does not matter; an unknown peer produces nothing.
    pub fn remove(&mut self, peer: &PeerId) -> Vec<PresenceEvent> {
        match self.peers.remove(peer) {
            Some(_) => vec![
                PresenceEvent::Leave(peer.clone()),
                PresenceEvent::Peers(self.count()),
            ],
            None => Vec::new(),
        }
    }

    /// Forget everybody. Emits a single `Peers(0)` if anyone was tracked.
    pub fn clear(&mut self) -> Vec<PresenceEvent> {
        if self.peers.is_empty() {
            return Vec::new();
        }
        self.peers.clear();
        vec![PresenceEvent::Peers(0)]
    }

    pub fn count(&self) -> usize {
        self.peers.len()
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.peers.contains_key(peer)
    }

    pub fn last_seen(&self, peer: &PeerId) -> Option<Instant> {
        self.peers.get(peer).copied()
    }

    /// Tracked peers in id order.
    pub fn peers(&self) -> Vec<PeerId> {
        let mut ids: Vec<PeerId> = self.peers.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(6000);

    fn peer(id: &str) -> PeerId {
        PeerId::from(id)
    }

    #[test]
    fn test_count_is_distinct_touches() {
        let mut tracker = PresenceTracker::new();
        let now = Instant::now();
        for id in ["a", "b", "a", "c", "b", "a"] {
            tracker.touch(&peer(id), now);
        }
        assert_eq!(tracker.count(), 3);
    }

    #[test]
    fn test_first_touch_is_join() {
        let mut tracker = PresenceTracker::new();
        let now = Instant::now();

        let events = tracker.touch(&peer("a"), now);
        assert_eq!(
            events,
            vec![PresenceEvent::Join(peer("a")), PresenceEvent::Peers(1)]
        );
        assert!(tracker.touch(&peer("a"), now).is_empty());
    }

    #[test]
    fn test_touch_refreshes_last_seen() {
        let mut tracker = PresenceTracker::new();
        let t0 = Instant::now();
        tracker.touch(&peer("a"), t0);
        tracker.touch(&peer("a"), t0 + Duration::from_secs(4));

        assert_eq!(tracker.last_seen(&peer("a")), Some(t0 + Duration::from_secs(4)));
        assert!(tracker
            .expire(t0 + Duration::from_secs(9), TIMEOUT)
            .is_empty());
    }

    #[test]
    fn test_expiry_boundary() {
        let mut tracker = PresenceTracker::new();
        let t0 = Instant::now();
        tracker.touch(&peer("a"), t0);

        assert!(tracker
            .expire(t0 + Duration::from_millis(5999), TIMEOUT)
            .is_empty());
        assert!(tracker.contains(&peer("a")));

        assert!(tracker
            .expire(t0 + Duration::from_millis(6000), TIMEOUT)
            .is_empty());

        let events = tracker.expire(t0 + Duration::from_millis(6001), TIMEOUT);
        assert_eq!(
            events,
            vec![PresenceEvent::Leave(peer("a")), PresenceEvent::Peers(0)]
        );
        assert!(!tracker.contains(&peer("a")));
    }

    #[test]
    fn test_simultaneous_expiry_single_peers_event() {
        let mut tracker = PresenceTracker::new();
        let t0 = Instant::now();
        tracker.touch(&peer("b"), t0);
        tracker.touch(&peer("a"), t0);
        tracker.touch(&peer("fresh"), t0 + Duration::from_secs(5));

        let events = tracker.expire(t0 + Duration::from_secs(7), TIMEOUT);
        assert_eq!(
            events,
            vec![
                PresenceEvent::Leave(peer("a")),
                PresenceEvent::Leave(peer("b")),
                PresenceEvent::Peers(1),
            ]
        );
        // Already gone: a second sweep emits nothing.
        assert!(tracker
            .expire(t0 + Duration::from_secs(7), TIMEOUT)
            .is_empty());
    }

    #[test]
    fn test_remove_ignores_recency() {
        let mut tracker = PresenceTracker::new();
        let now = Instant::now();
        tracker.touch(&peer("a"), now);

        assert_eq!(
            tracker.remove(&peer("a")),
            vec![PresenceEvent::Leave(peer("a")), PresenceEvent::Peers(0)]
        );
        assert!(tracker.remove(&peer("a")).is_empty());
    }

    #[test]
    fn test_clear() {
        let mut tracker = PresenceTracker::new();
        assert!(tracker.clear().is_empty());

        let now = Instant::now();
        tracker.touch(&peer("a"), now);
        tracker.touch(&peer("b"), now);
        assert_eq!(tracker.clear(), vec![PresenceEvent::Peers(0)]);
        assert_eq!(tracker.count(), 0);
        assert!(tracker.peers().is_empty());
    }
}
