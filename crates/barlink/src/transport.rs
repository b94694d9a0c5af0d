// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport contract and an in-process reference mesh.
//!
//! The session core only needs four capabilities from the underlying peer
//! mesh: join a room, send (broadcast or unicast), learn about membership
//! changes, and receive frames. Membership notifications are hints; the
//! transport may miss a departure entirely, which is why presence is
//! confirmed independently by heartbeat timeout.
//!
//! [`MemoryMesh`] implements the contract inside one process. Each device
//! gets a [`MemoryTransport`]; every join hands out a fresh peer id, the way
//! a real mesh assigns a new identity per connection. Faults can be injected
//! per device:
//!
//! - **mute**: frames to and from the device vanish, no leave is signalled
//! - **failing sends**: every send from the device returns an error
//! - **failing joins**: the next joins fail, mesh-wide

use crate::code::RoomKey;
use crate::protocol::PeerId;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Transport error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("join failed: {0}")]
    Join(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("link closed")]
    Closed,
}

/// Notification delivered by a joined link.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The mesh saw a peer appear.
    PeerJoined(PeerId),
    /// The mesh saw a peer go away.
    PeerLeft(PeerId),
    /// A frame arrived from a peer.
    Frame { from: PeerId, payload: Value },
}

/// A joined room: the link to send through and its event stream.
pub struct Joined<L> {
    pub link: L,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Something that can join mesh rooms.
pub trait Transport: Send + 'static {
    type Link: Link;

    fn join(&mut self, room: &RoomKey) -> Result<Joined<Self::Link>, TransportError>;
}

/// Live membership in one room.
pub trait Link: Send + 'static {
    /// Identity other peers see for this link.
    fn local_id(&self) -> &PeerId;

    /// Broadcast when `target` is `None`, unicast otherwise.
    fn send(&self, payload: &Value, target: Option<&PeerId>) -> Result<(), TransportError>;

    /// Leave the room. Calling it twice is harmless.
    fn leave(&mut self) -> Result<(), TransportError>;
}

/// Delivery statistics of a [`MemoryMesh`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MeshStats {
    /// Frames handed to a receiving peer.
    pub frames_delivered: u64,
    /// Frames lost to a muted sender or receiver.
    pub frames_dropped: u64,
    /// Sends rejected with an error.
    pub send_failures: u64,
}

struct Member {
    device: String,
    tx: mpsc::UnboundedSender<TransportEvent>,
}

#[derive(Default)]
struct MeshState {
    rooms: HashMap<RoomKey, HashMap<PeerId, Member>>,
    muted: HashSet<String>,
    failing_senders: HashSet<String>,
    failing_joins: usize,
    stats: MeshStats,
}

impl MeshState {
    fn is_muted(&self, device: &str) -> bool {
        self.muted.contains(device)
    }
}

/// In-process mesh shared by every [`MemoryTransport`] created from it.
#[derive(Clone, Default)]
pub struct MemoryMesh {
    state: Arc<Mutex<MeshState>>,
}

impl MemoryMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport for one device. `device` names it for fault injection.
    pub fn endpoint(&self, device: impl Into<String>) -> MemoryTransport {
        MemoryTransport {
            mesh: self.clone(),
            device: device.into(),
        }
    }

    /// Silently cut a device off the mesh (or reconnect it).
    pub fn set_muted(&self, device: &str, muted: bool) {
        let mut state = self.state.lock();
        if muted {
            state.muted.insert(device.to_string());
        } else {
            state.muted.remove(device);
        }
        debug!("[mesh] device {} muted={}", device, muted);
    }

    /// Make every send from a device fail (or succeed again).
    pub fn set_send_failure(&self, device: &str, failing: bool) {
        let mut state = self.state.lock();
        if failing {
            state.failing_senders.insert(device.to_string());
        } else {
            state.failing_senders.remove(device);
        }
    }

    /// Fail the next `count` joins on this mesh.
    pub fn fail_next_joins(&self, count: usize) {
        self.state.lock().failing_joins = count;
    }

    /// Peer ids currently joined to a room.
    pub fn members(&self, room: &RoomKey) -> Vec<PeerId> {
        let state = self.state.lock();
        let mut ids: Vec<PeerId> = state
            .rooms
            .get(room)
            .map(|members| members.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Current peer id of a device in a room, if it is joined.
    pub fn peer_of(&self, room: &RoomKey, device: &str) -> Option<PeerId> {
        let state = self.state.lock();
        state.rooms.get(room).and_then(|members| {
            members
                .iter()
                .find(|(_, m)| m.device == device)
                .map(|(id, _)| id.clone())
        })
    }

    pub fn stats(&self) -> MeshStats {
        self.state.lock().stats.clone()
    }

    fn join(&self, room: &RoomKey, device: &str) -> Result<Joined<MemoryLink>, TransportError> {
        let mut state = self.state.lock();
        if state.failing_joins > 0 {
            state.failing_joins -= 1;
            return Err(TransportError::Join(format!(
                "room {} unreachable from {}",
                room, device
            )));
        }

        let local_id = PeerId::new(
            std::iter::repeat_with(fastrand::alphanumeric)
                .take(20)
                .collect::<String>(),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        let muted = state.is_muted(device);
        let muted_devices = state.muted.clone();
        let members = state.rooms.entry(room.clone()).or_default();

        if !muted {
            for (peer_id, member) in members.iter() {
                if muted_devices.contains(&member.device) {
                    continue;
                }
                let _ = member.tx.send(TransportEvent::PeerJoined(local_id.clone()));
                let _ = tx.send(TransportEvent::PeerJoined(peer_id.clone()));
            }
        }

        members.insert(
            local_id.clone(),
            Member {
                device: device.to_string(),
                tx,
            },
        );
        debug!("[mesh] {} joined {} as {}", device, room, local_id);

        Ok(Joined {
            link: MemoryLink {
                mesh: self.clone(),
                room: room.clone(),
                device: device.to_string(),
                local_id,
                left: false,
            },
            events: rx,
        })
    }

    fn send(
        &self,
        room: &RoomKey,
        device: &str,
        from: &PeerId,
        payload: &Value,
        target: Option<&PeerId>,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.failing_senders.contains(device) {
            state.stats.send_failures += 1;
            return Err(TransportError::Send(format!("{} cannot reach the mesh", device)));
        }

        let sender_muted = state.is_muted(device);
        let MeshState {
            rooms,
            muted,
            stats,
            ..
        } = &mut *state;
        let members = match rooms.get(room) {
            Some(members) if members.contains_key(from) => members,
            _ => {
                stats.send_failures += 1;
                return Err(TransportError::Closed);
            }
        };

        for (peer_id, member) in members.iter() {
            if peer_id == from || target.is_some_and(|t| t != peer_id) {
                continue;
            }
            if sender_muted || muted.contains(&member.device) {
                stats.frames_dropped += 1;
                continue;
            }
            let event = TransportEvent::Frame {
                from: from.clone(),
                payload: payload.clone(),
            };
            if member.tx.send(event).is_ok() {
                stats.frames_delivered += 1;
            }
        }
        trace!("[mesh] {} sent frame (target: {:?})", from, target);
        Ok(())
    }

    fn leave(&self, room: &RoomKey, device: &str, peer_id: &PeerId) {
        let mut state = self.state.lock();
        let muted = state.is_muted(device);
        let muted_devices = state.muted.clone();
        let Some(members) = state.rooms.get_mut(room) else {
            return;
        };
        if members.remove(peer_id).is_none() {
            return;
        }
        if !muted {
            for member in members.values() {
                if !muted_devices.contains(&member.device) {
                    let _ = member.tx.send(TransportEvent::PeerLeft(peer_id.clone()));
                }
            }
        }
        if members.is_empty() {
            state.rooms.remove(room);
        }
        debug!("[mesh] {} left {}", peer_id, room);
    }
}

/// One device's access to a [`MemoryMesh`].
pub struct MemoryTransport {
    mesh: MemoryMesh,
    device: String,
}

impl MemoryTransport {
    pub fn device(&self) -> &str {
        &self.device
    }
}

impl Transport for MemoryTransport {
    type Link = MemoryLink;

    fn join(&mut self, room: &RoomKey) -> Result<Joined<MemoryLink>, TransportError> {
        self.mesh.join(room, &self.device)
    }
}

/// Membership of one device in one [`MemoryMesh`] room.
pub struct MemoryLink {
    mesh: MemoryMesh,
    room: RoomKey,
    device: String,
    local_id: PeerId,
    left: bool,
}

impl Link for MemoryLink {
    fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    fn send(&self, payload: &Value, target: Option<&PeerId>) -> Result<(), TransportError> {
        if self.left {
            return Err(TransportError::Closed);
        }
        self.mesh
            .send(&self.room, &self.device, &self.local_id, payload, target)
    }

    fn leave(&mut self) -> Result<(), TransportError> {
        if !self.left {
            self.left = true;
            self.mesh.leave(&self.room, &self.device, &self.local_id);
        }
        Ok(())
    }
}

impl Drop for MemoryLink {
    fn drop(&mut self) {
        let _ = self.leave();
    }
}
