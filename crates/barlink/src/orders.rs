// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Table order state and the bartender queue.
//!
//! [`TableOrders`] is the shared "which tables are waiting" view. Each table
//! is either clear or pending; new orders make it pending (again, harmlessly)
//! and a completion clears it. Both transitions are idempotent, which is what
//! lets the mesh deliver duplicates or reorder messages without corrupting
//! the view.
//!
//! [`OrderQueue`] holds the cards a bartender works through: one per table,
//! the newest order for a table replacing its older card.

use crate::protocol::{OrderMessage, TableId};
use std::collections::{BTreeSet, VecDeque};

/// Tables carrying at least one unacknowledged order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TableOrders {
    pending: BTreeSet<TableId>,
}

impl TableOrders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the table was clear before.
    pub fn mark_pending(&mut self, table: TableId) -> bool {
        self.pending.insert(table)
    }

    /// Returns `true` if the table was pending before.
    pub fn mark_completed(&mut self, table: TableId) -> bool {
        self.pending.remove(&table)
    }

    pub fn is_pending(&self, table: TableId) -> bool {
        self.pending.contains(&table)
    }

    /// Pending tables in ascending order.
    pub fn pending(&self) -> impl Iterator<Item = TableId> + '_ {
        self.pending.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Bartender feed: newest card first, one card per table.
#[derive(Debug, Default, Clone)]
pub struct OrderQueue {
    cards: VecDeque<OrderMessage>,
}

impl OrderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put an order on top, replacing the table's previous card.
    ///
    /// Returns the card it replaced.
    pub fn push(&mut self, order: OrderMessage) -> Option<OrderMessage> {
        let replaced = self.take(order.table_id);
        self.cards.push_front(order);
        replaced
    }

    /// Remove the table's card once it has been served.
    pub fn complete(&mut self, table: TableId) -> Option<OrderMessage> {
        self.take(table)
    }

    pub fn get(&self, table: TableId) -> Option<&OrderMessage> {
        self.cards.iter().find(|card| card.table_id == table)
    }

    /// Cards, newest first.
    pub fn cards(&self) -> impl Iterator<Item = &OrderMessage> {
        self.cards.iter()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    fn take(&mut self, table: TableId) -> Option<OrderMessage> {
        let pos = self.cards.iter().position(|card| card.table_id == table)?;
        self.cards.remove(pos)
    }
}
