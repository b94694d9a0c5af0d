// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Inbound frame classification.
//!
//! Every frame counts as a liveness signal before it is classified; the
//! session touches the sender first and only then routes the frame.
//! Heartbeats stop here, network updates become a status event, and
//! everything else goes to the data stream untouched.

use crate::protocol::PeerId;
use serde_json::Value;

/// Where an inbound frame goes.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Liveness ping; consumed by presence only.
    Heartbeat,
    /// A peer rejoined with a new transport identity.
    NetworkUpdate { at: Option<u64> },
    /// Application data, forwarded verbatim.
    Data(Value),
}

/// Classify one inbound frame.
pub fn classify(frame: Value) -> Route {
    if is_heartbeat(&frame) {
        return Route::Heartbeat;
    }
    if frame.get("type").and_then(Value::as_str) == Some("NETWORK_UPDATE") {
        let at = frame.get("at").and_then(Value::as_u64);
        return Route::NetworkUpdate { at };
    }
    Route::Data(frame)
}

fn is_heartbeat(frame: &Value) -> bool {
    match frame.get("__hb") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// A data frame together with the peer that sent it.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub from: PeerId,
    pub payload: Value,
}
