// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Mesh wire protocol.
//!
//! Every frame is a small JSON object. Heartbeats are recognised by their
//! `__hb` marker; every other message carries a `type` tag:
//!
//! ```text
//! { "__hb": 1, "t": <epoch-ms> }
//! { "type": "hello", "name": ..., "role": "waiter"|"bartender"|null, "sessionCode": ... }
//! { "type": "new-order", "tableId": <int>, "items": [...], "timestamp": <epoch-ms>, "senderId"? }
//! { "type": "order-completed", "tableId": <int> }
//! { "type": "NETWORK_UPDATE", "peerId": ..., "at": <epoch-ms> }
//! ```
//!
//! Frames travel through the transport as [`serde_json::Value`] so that
//! message types unknown to this build still reach the data stream verbatim.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Table identifier as used on the wire.
pub type TableId = i64;

/// Highest quantity accepted for a single order line.
pub const MAX_QTY: u32 = 99;

/// Opaque transport-assigned peer identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Milliseconds since the Unix epoch, as stamped into wire messages.
pub fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Liveness ping. Never surfaced as application data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    #[serde(rename = "__hb")]
    pub marker: u8,
    pub t: u64,
}

impl Heartbeat {
    pub fn now() -> Self {
        Self {
            marker: 1,
            t: epoch_ms(),
        }
    }

    pub fn to_frame(self) -> Value {
        serde_json::json!({ "__hb": self.marker, "t": self.t })
    }
}

/// Staff role announced in a hello.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Waiter,
    Bartender,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiter => f.write_str("waiter"),
            Self::Bartender => f.write_str("bartender"),
        }
    }
}

/// How a line is going to be paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Payment {
    Cash,
    Card,
}

/// One line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: String,
    pub label: String,
    #[serde(deserialize_with = "deserialize_qty")]
    pub qty: u32,
    #[serde(default)]
    pub context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<[u8; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment: Option<Payment>,
}

impl OrderItem {
    /// Build a line; the quantity is clamped to `1..=MAX_QTY`.
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        qty: u32,
        context: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            qty: clamp_qty(qty),
            context: context.into(),
            color: None,
            payment: None,
        }
    }

    pub fn with_color(mut self, rgb: [u8; 3]) -> Self {
        self.color = Some(rgb);
        self
    }

    pub fn with_payment(mut self, payment: Payment) -> Self {
        self.payment = Some(payment);
        self
    }
}

pub fn clamp_qty(qty: u32) -> u32 {
    qty.clamp(1, MAX_QTY)
}

/// Quantities from the wire get the same bounds as locally built lines.
fn deserialize_qty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    u32::deserialize(deserializer).map(clamp_qty)
}

/// Identity announcement; last write wins on the receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    pub name: String,
    pub role: Option<Role>,
    pub session_code: String,
}

/// A table's order as broadcast by the waiter who took it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderMessage {
    pub table_id: TableId,
    pub items: Vec<OrderItem>,
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<PeerId>,
}

/// All pending items of a table have been served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCompleted {
    pub table_id: TableId,
}

/// Emitted after a supervised reconnect so peers re-announce themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkUpdate {
    pub peer_id: PeerId,
    pub at: u64,
}

/// Typed view of the tagged messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    #[serde(rename = "hello")]
    Hello(Hello),

    #[serde(rename = "new-order")]
    NewOrder(OrderMessage),

    #[serde(rename = "order-completed")]
    OrderCompleted(OrderCompleted),

    #[serde(rename = "NETWORK_UPDATE")]
    NetworkUpdate(NetworkUpdate),
}

impl Message {
    /// Decode a data frame. Unknown or malformed frames yield `None`.
    pub fn decode(frame: &Value) -> Option<Self> {
        Self::deserialize(frame).ok()
    }

    pub fn to_frame(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_heartbeat_shape() {
        let frame = Heartbeat { marker: 1, t: 42 }.to_frame();
        assert_eq!(frame, json!({ "__hb": 1, "t": 42 }));
    }

    #[test]
    fn test_hello_shape() {
        let msg = Message::Hello(Hello {
            name: "Ana".into(),
            role: None,
            session_code: "HX4K9P".into(),
        });
        assert_eq!(
            msg.to_frame(),
            json!({ "type": "hello", "name": "Ana", "role": null, "sessionCode": "HX4K9P" })
        );
    }

    #[test]
    fn test_new_order_decode_minimal_items() {
        let frame = json!({
            "type": "new-order",
            "tableId": 4,
            "items": [ { "id": "esp", "label": "Espresso", "qty": 2, "context": "Coffee" } ],
            "timestamp": 1700000000000u64
        });
        match Message::decode(&frame) {
            Some(Message::NewOrder(order)) => {
                assert_eq!(order.table_id, 4);
                assert_eq!(order.items[0].qty, 2);
                assert_eq!(order.items[0].color, None);
                assert_eq!(order.sender_id, None);
            }
            other => panic!("Wrong message: {:?}", other),
        }
    }

    #[test]
    fn test_new_order_optional_fields() {
        let order = Message::NewOrder(OrderMessage {
            table_id: 7,
            items: vec![OrderItem::new("coke", "Cola", 1, "Drinks")
                .with_color([200, 30, 30])
                .with_payment(Payment::Card)],
            timestamp: 1,
            sender_id: Some(PeerId::from("p1")),
        });
        let frame = order.to_frame();
        assert_eq!(frame["items"][0]["color"], json!([200, 30, 30]));
        assert_eq!(frame["items"][0]["payment"], json!("card"));
        assert_eq!(frame["senderId"], json!("p1"));
        assert_eq!(Message::decode(&frame), Some(order));
    }

    #[test]
    fn test_order_completed_and_network_update_tags() {
        let done = Message::OrderCompleted(OrderCompleted { table_id: 4 }).to_frame();
        assert_eq!(done, json!({ "type": "order-completed", "tableId": 4 }));

        let update = Message::NetworkUpdate(NetworkUpdate {
            peer_id: PeerId::from("abc"),
            at: 5,
        })
        .to_frame();
        assert_eq!(update, json!({ "type": "NETWORK_UPDATE", "peerId": "abc", "at": 5 }));
    }

    #[test]
    fn test_unknown_type_is_none() {
        assert_eq!(Message::decode(&json!({ "type": "menu-sync" })), None);
        assert_eq!(Message::decode(&json!("plain text")), None);
    }

    #[test]
    fn test_qty_clamped() {
        assert_eq!(OrderItem::new("a", "A", 0, "").qty, 1);
        assert_eq!(OrderItem::new("a", "A", 250, "").qty, MAX_QTY);
        assert_eq!(clamp_qty(12), 12);
    }

    #[test]
    fn test_inbound_qty_clamped() {
        let frame = json!({
            "type": "new-order",
            "tableId": 3,
            "items": [
                { "id": "a", "label": "A", "qty": 0 },
                { "id": "b", "label": "B", "qty": 400 }
            ],
            "timestamp": 0
        });
        let Some(Message::NewOrder(order)) = Message::decode(&frame) else {
            panic!("new-order expected");
        };
        assert_eq!(order.items[0].qty, 1);
        assert_eq!(order.items[1].qty, MAX_QTY);

        let negative = json!({
            "type": "new-order",
            "tableId": 3,
            "items": [{ "id": "a", "label": "A", "qty": -2 }],
            "timestamp": 0
        });
        assert_eq!(Message::decode(&negative), None);
    }
}
