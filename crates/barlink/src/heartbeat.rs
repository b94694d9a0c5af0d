// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Heartbeat emitter.
//!
//! Each beat broadcasts a liveness ping and sweeps the presence tracker. A
//! peer must miss `peer_timeout_beats` consecutive beats to be declared
//! dead. Two outcomes of a beat call for a forced reconnect: the ping could
//! not be sent, or the sweep took the peer count from nonzero to zero.

use crate::config::MeshConfig;
use crate::presence::{PresenceEvent, PresenceTracker};
use crate::protocol::{Heartbeat, PeerId};
use crate::timer::Ticker;
use crate::transport::{Link, TransportError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// What a single beat observed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BeatOutcome {
    /// Presence transitions produced by the sweep.
    pub events: Vec<PresenceEvent>,
    /// The ping broadcast failed.
    pub send_failed: bool,
    /// The sweep removed the last remaining peer(s).
    pub lost_all_peers: bool,
}

impl BeatOutcome {
    pub fn needs_reconnect(&self) -> bool {
        self.send_failed || self.lost_all_peers
    }
}

/// Periodic liveness ping plus presence sweep.
#[derive(Debug)]
pub struct HeartbeatEmitter {
    ticker: Ticker,
    interval: Duration,
    timeout: Duration,
}

impl HeartbeatEmitter {
    pub fn new(config: &MeshConfig) -> Self {
        Self {
            ticker: Ticker::new(),
            interval: config.heartbeat_interval(),
            timeout: config.peer_timeout(),
        }
    }

    /// Start beating; restarts the loop if one is already running.
    pub fn start(&mut self) {
        if self.ticker.is_running() {
            debug!("Heartbeat loop restarted");
        }
        self.ticker.start(self.interval);
    }

    pub fn stop(&mut self) {
        self.ticker.stop();
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_running()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait for the next beat. Never resolves while stopped.
    pub async fn tick(&mut self) -> Instant {
        self.ticker.tick().await
    }

    /// Run one beat: ping everybody, then expire silent peers.
    pub fn beat<L: Link>(
        &self,
        link: Option<&L>,
        presence: &mut PresenceTracker,
        now: Instant,
    ) -> BeatOutcome {
        let mut outcome = BeatOutcome::default();

        if let Some(link) = link {
            if let Err(e) = link.send(&Heartbeat::now().to_frame(), None) {
                warn!("Heartbeat send failed: {}", e);
                outcome.send_failed = true;
            }
        }

        let before = presence.count();
        outcome.events = presence.expire(now, self.timeout);
        for event in &outcome.events {
            if let PresenceEvent::Leave(peer) = event {
                warn!("Peer timeout: {}", peer);
            }
        }
        outcome.lost_all_peers = before > 0 && presence.count() == 0;
        outcome
    }

    /// Unicast one ping so a newly seen peer learns about us right away.
    pub fn echo<L: Link>(link: &L, peer: &PeerId) -> Result<(), TransportError> {
        link.send(&Heartbeat::now().to_frame(), Some(peer))
    }
}
