// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared helpers for the mesh integration tests.

#![allow(dead_code)]

use barlink::{
    JoinCode, MemoryMesh, MeshConfig, MeshSession, RoomKey, SessionEvent, SessionHandle,
    StatusEvent,
};
use std::time::Duration;
use tokio::sync::broadcast;

pub fn room() -> RoomKey {
    JoinCode::parse("AB12CD").unwrap().room_key()
}

/// Start a session for `device`, subscribed before the first join.
pub fn start(
    mesh: &MemoryMesh,
    device: &str,
) -> (SessionHandle, broadcast::Receiver<SessionEvent>) {
    let session =
        MeshSession::create(MeshConfig::default(), mesh.endpoint(device), room()).unwrap();
    let events = session.subscribe();
    (session.start(), events)
}

/// Everything published so far.
pub fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

/// Status events published so far.
pub fn statuses(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<StatusEvent> {
    drain(rx)
        .into_iter()
        .filter_map(|event| match event {
            SessionEvent::Status(status) => Some(status),
            SessionEvent::Data(_) => None,
        })
        .collect()
}

/// Let spawned tasks drain their queues without crossing a timer deadline.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

pub async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
