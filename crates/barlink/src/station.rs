// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Waiter / bartender station.
//!
//! A station is the application layer on top of a [`MeshSession`]: it
//! announces the worker with hellos, keeps the peer directory, the shared
//! table order state and (for bartenders) the order queue, and turns user
//! actions into wire messages.
//!
//! In solo mode one device plays every role. There is nobody to echo an
//! order back, so sending an order also runs the local receive path.
//!
//! The board is fed from the session's event channel. A station that falls
//! more than `event_capacity` events behind loses the skipped ones; nothing
//! on the mesh replays them, so they are only counted (see
//! [`Station::skipped_events`]).

use crate::identity::SessionIdentity;
use crate::orders::{OrderQueue, TableOrders};
use crate::peers::{PeerDirectory, PeerInfo};
use crate::protocol::{
    epoch_ms, Hello, Message, OrderCompleted, OrderItem, OrderMessage, PeerId, Role, TableId,
};
use crate::router::Inbound;
use crate::session::{MeshSession, SessionError, SessionEvent, SessionHandle, StatusEvent};
use crate::timer::Timer;
use crate::transport::Transport;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Station error types.
#[derive(Debug, Error)]
pub enum StationError {
    #[error("Order for table {0} has no items")]
    EmptyOrder(TableId),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// Whether the station shares a mesh with other devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StationMode {
    #[default]
    Mesh,
    Solo,
}

#[derive(Debug, Default)]
struct Board {
    directory: PeerDirectory,
    tables: TableOrders,
    queue: OrderQueue,
    keeps_queue: bool,
    skipped: u64,
}

impl Board {
    fn apply_order(&mut self, order: OrderMessage) {
        self.tables.mark_pending(order.table_id);
        if self.keeps_queue && self.queue.push(order).is_some() {
            debug!("Replaced queued card");
        }
    }

    fn apply_completed(&mut self, table: TableId) {
        if !self.tables.mark_completed(table) {
            trace!("Table {} already clear", table);
        }
        self.queue.complete(table);
    }
}

/// A worker's device bound to a running session.
pub struct Station {
    handle: SessionHandle,
    identity: SessionIdentity,
    mode: StationMode,
    board: Arc<Mutex<Board>>,
    pump: JoinHandle<()>,
}

impl Station {
    /// Start `session` and attach a station to it.
    pub fn launch<T: Transport>(
        session: MeshSession<T>,
        identity: SessionIdentity,
        mode: StationMode,
    ) -> Self {
        let keeps_queue = mode == StationMode::Solo || identity.role == Some(Role::Bartender);
        let board = Arc::new(Mutex::new(Board {
            keeps_queue,
            ..Board::default()
        }));

        let announce_delay = session.config().announce_delay();
        let events = session.subscribe();
        let handle = session.start();

        let pump = Pump {
            handle: handle.clone(),
            board: board.clone(),
            hello: identity.hello(),
            announce_delay,
            announce: Timer::new(),
        };
        let pump = tokio::spawn(pump.run(events));

        info!(
            "Station {} ({:?}, role {:?}) launched",
            identity.worker_name, mode, identity.role
        );
        Self {
            handle,
            identity,
            mode,
            board,
            pump,
        }
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn mode(&self) -> StationMode {
        self.mode
    }

    /// Broadcast a new order for `table` and mark it pending.
    ///
    /// The table is pending as soon as the send is attempted; the mesh gives
    /// no delivery acknowledgement.
    pub async fn send_order(
        &self,
        table: TableId,
        items: Vec<OrderItem>,
    ) -> Result<OrderMessage, StationError> {
        if items.is_empty() {
            return Err(StationError::EmptyOrder(table));
        }
        let order = OrderMessage {
            table_id: table,
            items,
            timestamp: epoch_ms(),
            sender_id: self.handle.local_id().await?,
        };
        let sent = self
            .handle
            .broadcast(&Message::NewOrder(order.clone()))
            .await;

        {
            let mut board = self.board.lock();
            board.tables.mark_pending(table);
            if self.mode == StationMode::Solo {
                board.apply_order(order.clone());
            }
        }
        info!("Order for table {} sent ({} items)", table, order.items.len());

        sent?;
        Ok(order)
    }

    /// Mark `table` served here and tell everybody else.
    pub async fn complete_order(&self, table: TableId) -> Result<(), StationError> {
        self.board.lock().apply_completed(table);
        info!("Table {} completed", table);
        if self.mode == StationMode::Solo {
            return Ok(());
        }
        self.handle
            .broadcast(&Message::OrderCompleted(OrderCompleted { table_id: table }))
            .await?;
        Ok(())
    }

    pub fn is_pending(&self, table: TableId) -> bool {
        self.board.lock().tables.is_pending(table)
    }

    /// Pending tables in ascending order.
    pub fn pending_tables(&self) -> Vec<TableId> {
        self.board.lock().tables.pending().collect()
    }

    /// Queued cards, newest first. Empty unless the station keeps a queue.
    pub fn queue(&self) -> Vec<OrderMessage> {
        self.board.lock().queue.cards().cloned().collect()
    }

    pub fn peers(&self) -> Vec<(PeerId, PeerInfo)> {
        self.board
            .lock()
            .directory
            .iter()
            .map(|(peer, info)| (peer.clone(), info.clone()))
            .collect()
    }

    /// Peers that announced themselves as `role`.
    pub fn peers_with_role(&self, role: Role) -> Vec<PeerId> {
        self.board.lock().directory.with_role(role).cloned().collect()
    }

    /// Session events this station never saw because it lagged behind.
    ///
    /// Nonzero means orders or completions may be missing from the board.
    pub fn skipped_events(&self) -> u64 {
        self.board.lock().skipped
    }

    /// Stop the session and detach.
    pub async fn stop(self) -> Result<(), StationError> {
        self.pump.abort();
        self.handle.stop().await?;
        Ok(())
    }
}

impl Drop for Station {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

struct Pump {
    handle: SessionHandle,
    board: Arc<Mutex<Board>>,
    hello: Hello,
    announce_delay: Duration,
    announce: Timer,
}

impl Pump {
    async fn run(mut self, mut events: broadcast::Receiver<SessionEvent>) {
        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(SessionEvent::Status(status)) => self.on_status(status).await,
                    Ok(SessionEvent::Data(inbound)) => self.on_data(inbound),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Station lagged, {} session events skipped", skipped);
                        self.board.lock().skipped += skipped;
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = self.announce.fired() => {
                    let hello = Message::Hello(self.hello.clone());
                    if let Err(e) = self.handle.broadcast(&hello).await {
                        warn!("Hello broadcast failed: {}", e);
                    }
                }
            }
        }
        debug!("Station pump finished");
    }

    async fn on_status(&mut self, status: StatusEvent) {
        match status {
            StatusEvent::Connected { .. } => self.announce.arm(self.announce_delay),
            StatusEvent::Join { peer } | StatusEvent::NetworkUpdate { peer, .. } => {
                self.greet(peer).await;
            }
            StatusEvent::Leave { peer } => {
                self.board.lock().directory.remove(&peer);
            }
            StatusEvent::Peers { count: 0 } => {
                self.board.lock().directory.clear();
            }
            StatusEvent::Peers { .. } => {}
            StatusEvent::Error { cause } => warn!("Session error: {}", cause),
        }
    }

    async fn greet(&self, peer: PeerId) {
        let hello = Message::Hello(self.hello.clone());
        if let Err(e) = self.handle.send_to(&hello, peer.clone()).await {
            warn!("Hello to {} failed: {}", peer, e);
        }
    }

    fn on_data(&self, inbound: Inbound) {
        let Some(message) = Message::decode(&inbound.payload) else {
            trace!("Ignoring unknown frame from {}", inbound.from);
            return;
        };
        let mut board = self.board.lock();
        match message {
            Message::Hello(hello) => {
                if board.directory.upsert(inbound.from.clone(), &hello) {
                    info!("{} is {} ({:?})", inbound.from, hello.name, hello.role);
                }
            }
            Message::NewOrder(order) => {
                info!("Order for table {} from {}", order.table_id, inbound.from);
                board.apply_order(order);
            }
            Message::OrderCompleted(done) => board.apply_completed(done.table_id),
            Message::NetworkUpdate(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(table: TableId) -> OrderMessage {
        OrderMessage {
            table_id: table,
            items: vec![OrderItem::new("esp", "Espresso", 1, "")],
            timestamp: 0,
            sender_id: None,
        }
    }

    #[test]
    fn test_board_order_lifecycle() {
        let mut board = Board {
            keeps_queue: true,
            ..Board::default()
        };
        board.apply_order(order(4));
        board.apply_order(order(4));
        assert_eq!(board.tables.pending().collect::<Vec<_>>(), vec![4]);
        assert_eq!(board.queue.len(), 1);

        board.apply_completed(4);
        board.apply_completed(4);
        assert!(board.tables.is_empty());
        assert!(board.queue.is_empty());
    }

    #[test]
    fn test_waiter_board_keeps_no_queue() {
        let mut board = Board::default();
        board.apply_order(order(2));
        assert!(board.tables.is_pending(2));
        assert!(board.queue.is_empty());
    }
}
