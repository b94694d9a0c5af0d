// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Barlink mesh session core
//!
//! Peer presence and order synchronization for a handful of devices sharing
//! a serverless peer mesh.
//!
//! # Features
//!
//! - **Presence**: heartbeat-confirmed liveness, independent of the
//!   transport's own join/leave hints
//! - **Self-healing**: debounced, rate-limited teardown and rejoin when the
//!   local link looks broken
//! - **Wire protocol**: hello, new-order, order-completed and network-update
//!   JSON messages
//! - **Table state**: idempotent per-table pending set that converges across
//!   devices
//!
//! # Quick Start
//!
//! ```no_run
//! use barlink::{JoinCode, MemoryMesh, MeshConfig, MeshSession, SessionIdentity, Station, StationMode};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let mesh = MemoryMesh::new();
//! let identity = SessionIdentity::join(JoinCode::parse("HX4K9P")?, "Ana");
//! let session = MeshSession::create(MeshConfig::default(), mesh.endpoint("ana"), identity.room_id.clone())?;
//! let station = Station::launch(session, identity, StationMode::Mesh);
//! station.complete_order(4).await?;
//! # Ok(())
//! # }
//! ```

pub mod code;
pub mod config;
pub mod heartbeat;
pub mod identity;
pub mod orders;
pub mod peers;
pub mod presence;
pub mod protocol;
pub mod router;
pub mod session;
pub mod station;
pub mod supervisor;
pub mod timer;
pub mod transport;

pub use code::{CodeError, JoinCode, RoomKey};
pub use config::{ConfigError, MeshConfig};
pub use identity::{SessionIdentity, SessionStore, StoreError};
pub use orders::{OrderQueue, TableOrders};
pub use peers::{PeerDirectory, PeerInfo};
pub use presence::{PresenceEvent, PresenceTracker};
pub use protocol::{Message, OrderItem, OrderMessage, Payment, PeerId, Role, TableId};
pub use router::Inbound;
pub use session::{
    MeshSession, NetworkSignal, SessionError, SessionEvent, SessionHandle, SessionStats,
    StatusEvent,
};
pub use station::{Station, StationError, StationMode};
pub use transport::{Link, MemoryMesh, MemoryTransport, Transport, TransportError, TransportEvent};
