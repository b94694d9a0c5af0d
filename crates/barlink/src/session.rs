// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Mesh session actor.
//!
//! A session owns one transport, the presence tracker, the heartbeat loop and
//! the reconnect supervisor, all driven from a single spawned task. Nothing
//! in it is shared: callers talk to the task through a [`SessionHandle`] and
//! observe it by subscribing to [`SessionEvent`]s.
//!
//! ```text
//!   SessionHandle ──commands──►┌──────────────┐──events──► subscribers
//!                              │ session task │
//!   transport events ─────────►│  (select!)   │◄── heartbeat tick
//!                              └──────────────┘◄── reconnect steps
//! ```

use crate::code::RoomKey;
use crate::config::{ConfigError, MeshConfig};
use crate::heartbeat::HeartbeatEmitter;
use crate::presence::{PresenceEvent, PresenceTracker};
use crate::protocol::{epoch_ms, Message, NetworkUpdate, PeerId};
use crate::router::{classify, Inbound, Route};
use crate::supervisor::{ReconnectStep, ReconnectSupervisor};
use crate::transport::{Joined, Link, Transport, TransportError, TransportEvent};
use serde_json::Value;
use std::future::pending;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Session error types.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Not connected to the mesh")]
    NotConnected,

    #[error("Session stopped")]
    Stopped,
}

/// Connection status reported to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// The room was (re)joined under `local_id`.
    Connected { local_id: PeerId, peers: usize },
    Join { peer: PeerId },
    Leave { peer: PeerId },
    Peers { count: usize },
    /// A peer came back with a new transport identity.
    NetworkUpdate { peer: PeerId, at: Option<u64> },
    Error { cause: String },
}

/// Everything a session publishes.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Status(StatusEvent),
    Data(Inbound),
}

/// Connectivity hints from the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkSignal {
    Online,
    Offline,
    ConnectionChanged,
}

/// Point-in-time view of a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
    pub local_id: Option<PeerId>,
    pub peers: usize,
    pub reconnects: u64,
    pub heartbeat_running: bool,
}

enum Command {
    Send {
        payload: Value,
        target: Option<PeerId>,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Network(NetworkSignal),
    Reconnect,
    Stats {
        reply: oneshot::Sender<SessionStats>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
}

/// A session that has been created but not started yet.
pub struct MeshSession<T: Transport> {
    config: MeshConfig,
    transport: T,
    room: RoomKey,
    events: broadcast::Sender<SessionEvent>,
}

impl<T: Transport> MeshSession<T> {
    /// Create a session for `room` over `transport`.
    pub fn create(config: MeshConfig, transport: T, room: RoomKey) -> Result<Self, SessionError> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_capacity);
        Ok(Self {
            config,
            transport,
            room,
            events,
        })
    }

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    pub fn room(&self) -> &RoomKey {
        &self.room
    }

    /// Subscribe before [`start`](Self::start) to see the first `Connected`.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Join the room and spawn the session task.
    ///
    /// A failed join is reported as a `StatusEvent::Error`; the task still
    /// runs without a link until [`SessionHandle::reconnect`] or a network
    /// signal triggers another attempt. Must be called within a tokio runtime.
    pub fn start(self) -> SessionHandle {
        let (commands_tx, commands_rx) = mpsc::channel(self.config.command_capacity);
        let peer_count = Arc::new(AtomicUsize::new(0));

        let mut task = SessionTask {
            heartbeat: HeartbeatEmitter::new(&self.config),
            supervisor: ReconnectSupervisor::new(&self.config),
            presence: PresenceTracker::new(),
            transport: self.transport,
            room: self.room,
            link: None,
            link_events: None,
            commands: commands_rx,
            events: self.events.clone(),
            peer_count: peer_count.clone(),
        };
        task.connect();
        tokio::spawn(task.run());

        SessionHandle {
            commands: commands_tx,
            events: self.events,
            peer_count,
        }
    }
}

/// Cheap, cloneable access to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<SessionEvent>,
    peer_count: Arc<AtomicUsize>,
}

impl SessionHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Live peer count as last published.
    pub fn peer_count(&self) -> usize {
        self.peer_count.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    /// Send a raw frame; broadcast when `target` is `None`.
    ///
    /// A transport failure is returned and also schedules a forced
    /// reconnect. The payload is not retried.
    pub async fn send(&self, payload: Value, target: Option<PeerId>) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Send {
            payload,
            target,
            reply,
        })
        .await?;
        rx.await.map_err(|_| SessionError::Stopped)?
    }

    pub async fn broadcast(&self, message: &Message) -> Result<(), SessionError> {
        self.send(message.to_frame(), None).await
    }

    pub async fn send_to(&self, message: &Message, peer: PeerId) -> Result<(), SessionError> {
        self.send(message.to_frame(), Some(peer)).await
    }

    pub async fn notify_network(&self, signal: NetworkSignal) -> Result<(), SessionError> {
        self.request(Command::Network(signal)).await
    }

    /// Ask for a forced reconnect, e.g. after a failed join.
    pub async fn reconnect(&self) -> Result<(), SessionError> {
        self.request(Command::Reconnect).await
    }

    pub async fn stats(&self) -> Result<SessionStats, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Stats { reply }).await?;
        rx.await.map_err(|_| SessionError::Stopped)
    }

    /// Current transport identity, `None` while not joined.
    pub async fn local_id(&self) -> Result<Option<PeerId>, SessionError> {
        Ok(self.stats().await?.local_id)
    }

    /// Leave the room and end the session task.
    pub async fn stop(&self) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Stop { reply }).await?;
        rx.await.map_err(|_| SessionError::Stopped)
    }

    async fn request(&self, command: Command) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::Stopped)
    }
}

struct SessionTask<T: Transport> {
    transport: T,
    room: RoomKey,
    link: Option<T::Link>,
    link_events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    presence: PresenceTracker,
    heartbeat: HeartbeatEmitter,
    supervisor: ReconnectSupervisor,
    commands: mpsc::Receiver<Command>,
    events: broadcast::Sender<SessionEvent>,
    peer_count: Arc<AtomicUsize>,
}

impl<T: Transport> SessionTask<T> {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(Command::Stop { reply }) => {
                            self.shutdown();
                            let _ = reply.send(());
                            break;
                        }
                        Some(command) => self.on_command(command),
                        None => {
                            debug!("All session handles dropped");
                            self.shutdown();
                            break;
                        }
                    }
                }
                event = next_transport_event(&mut self.link_events) => {
                    match event {
                        Some(event) => self.on_transport_event(event),
                        None => {
                            debug!("Transport event stream closed");
                            self.link_events = None;
                        }
                    }
                }
                now = self.heartbeat.tick() => self.on_beat(now),
                step = self.supervisor.next_step() => self.on_step(step),
            }
        }
        info!("Session for {} stopped", self.room);
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Send {
                payload,
                target,
                reply,
            } => {
                let result = match self.link.as_ref() {
                    Some(link) => link.send(&payload, target.as_ref()),
                    None => {
                        let _ = reply.send(Err(SessionError::NotConnected));
                        return;
                    }
                };
                if let Err(e) = &result {
                    warn!("Send failed: {}", e);
                    self.supervisor.schedule(true, Instant::now());
                }
                let _ = reply.send(result.map_err(SessionError::from));
            }
            Command::Network(NetworkSignal::Offline) => {
                info!("Network offline, waiting for it to come back");
            }
            Command::Network(signal) => {
                info!("Network signal {:?}", signal);
                self.supervisor.schedule(true, Instant::now());
            }
            Command::Reconnect => {
                self.supervisor.schedule(true, Instant::now());
            }
            Command::Stats { reply } => {
                let _ = reply.send(SessionStats {
                    local_id: self.link.as_ref().map(|link| link.local_id().clone()),
                    peers: self.presence.count(),
                    reconnects: self.supervisor.reconnects(),
                    heartbeat_running: self.heartbeat.is_running(),
                });
            }
            Command::Stop { .. } => {}
        }
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::PeerJoined(peer) => {
                debug!("Transport reports join: {}", peer);
                let events = self.presence.touch(&peer, Instant::now());
                self.publish(events);
                self.echo(&peer);
            }
            TransportEvent::PeerLeft(peer) => {
                debug!("Transport reports leave: {}", peer);
                let events = self.presence.remove(&peer);
                self.publish(events);
            }
            TransportEvent::Frame { from, payload } => self.on_frame(from, payload),
        }
    }

    fn on_frame(&mut self, from: PeerId, payload: Value) {
        let events = self.presence.touch(&from, Instant::now());
        let first_sighting = !events.is_empty();
        self.publish(events);
        if first_sighting {
            self.echo(&from);
        }

        match classify(payload) {
            Route::Heartbeat => trace!("Heartbeat from {}", from),
            Route::NetworkUpdate { at } => {
                info!("Network update from {}", from);
                self.emit(StatusEvent::NetworkUpdate { peer: from, at });
            }
            Route::Data(payload) => {
                let _ = self.events.send(SessionEvent::Data(Inbound { from, payload }));
            }
        }
    }

    fn on_beat(&mut self, now: Instant) {
        let outcome = self
            .heartbeat
            .beat(self.link.as_ref(), &mut self.presence, now);
        let reconnect = outcome.needs_reconnect();
        if outcome.lost_all_peers {
            warn!("Lost every peer, assuming our own link is broken");
        }
        self.publish(outcome.events);
        if reconnect {
            self.supervisor.schedule(true, now);
        }
    }

    fn on_step(&mut self, step: ReconnectStep) {
        match step {
            ReconnectStep::Teardown => {
                info!("Reconnecting to {}", self.room);
                self.teardown();
                self.supervisor.begin_rejoin();
            }
            ReconnectStep::Rejoin => {
                if self.connect() {
                    self.supervisor.begin_settle();
                }
            }
            ReconnectStep::Announce => self.announce(),
        }
    }

    /// Join the room. Returns whether a link is up.
    fn connect(&mut self) -> bool {
        match self.transport.join(&self.room) {
            Ok(Joined { link, events }) => {
                let local_id = link.local_id().clone();
                info!("Joined {} as {}", self.room, local_id);
                self.link = Some(link);
                self.link_events = Some(events);
                self.heartbeat.start();
                self.emit(StatusEvent::Connected {
                    local_id,
                    peers: self.presence.count(),
                });
                true
            }
            Err(e) => {
                error!("Failed to join {}: {}", self.room, e);
                self.emit(StatusEvent::Error {
                    cause: e.to_string(),
                });
                false
            }
        }
    }

    fn teardown(&mut self) {
        self.heartbeat.stop();
        self.link_events = None;
        if let Some(mut link) = self.link.take() {
            if let Err(e) = link.leave() {
                debug!("Ignoring leave error: {}", e);
            }
        }
        let events = self.presence.clear();
        self.publish(events);
    }

    fn announce(&mut self) {
        let Some(link) = self.link.as_ref() else {
            return;
        };
        let update = Message::NetworkUpdate(NetworkUpdate {
            peer_id: link.local_id().clone(),
            at: epoch_ms(),
        });
        if let Err(e) = link.send(&update.to_frame(), None) {
            warn!("Network update broadcast failed: {}", e);
            self.supervisor.schedule(true, Instant::now());
        }
    }

    /// Unicast one heartbeat so `peer` learns about us before our next beat.
    fn echo(&mut self, peer: &PeerId) {
        let Some(link) = self.link.as_ref() else {
            return;
        };
        if let Err(e) = HeartbeatEmitter::echo(link, peer) {
            warn!("Heartbeat echo to {} failed: {}", peer, e);
            self.supervisor.schedule(true, Instant::now());
        }
    }

    fn shutdown(&mut self) {
        self.supervisor.cancel_all();
        self.teardown();
    }

    fn publish(&mut self, events: Vec<PresenceEvent>) {
        for event in events {
            let status = match event {
                PresenceEvent::Join(peer) => {
                    info!("Peer joined: {}", peer);
                    StatusEvent::Join { peer }
                }
                PresenceEvent::Leave(peer) => {
                    info!("Peer left: {}", peer);
                    StatusEvent::Leave { peer }
                }
                PresenceEvent::Peers(count) => {
                    self.peer_count.store(count, Ordering::Relaxed);
                    StatusEvent::Peers { count }
                }
            };
            self.emit(status);
        }
    }

    fn emit(&self, status: StatusEvent) {
        // No subscribers is fine.
        let _ = self.events.send(SessionEvent::Status(status));
    }
}

async fn next_transport_event(
    events: &mut Option<mpsc::UnboundedReceiver<TransportEvent>>,
) -> Option<TransportEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}
