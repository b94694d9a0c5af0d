// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Who is on the other end of each peer id, as learned from hellos.

use crate::protocol::{Hello, PeerId, Role};
use std::collections::BTreeMap;

/// Identity announced by a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub name: String,
    pub role: Option<Role>,
}

/// Hello cache. Last write wins.
#[derive(Debug, Default, Clone)]
pub struct PeerDirectory {
    peers: BTreeMap<PeerId, PeerInfo>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a hello. Returns `true` if the stored info changed.
    pub fn upsert(&mut self, peer: PeerId, hello: &Hello) -> bool {
        let info = PeerInfo {
            name: hello.name.clone(),
            role: hello.role,
        };
        self.peers.insert(peer, info.clone()).as_ref() != Some(&info)
    }

    pub fn remove(&mut self, peer: &PeerId) -> Option<PeerInfo> {
        self.peers.remove(peer)
    }

    pub fn clear(&mut self) {
        self.peers.clear();
    }

    pub fn get(&self, peer: &PeerId) -> Option<&PeerInfo> {
        self.peers.get(peer)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PeerId, &PeerInfo)> {
        self.peers.iter()
    }

    /// Peers that announced `role`.
    pub fn with_role(&self, role: Role) -> impl Iterator<Item = &PeerId> {
        self.peers
            .iter()
            .filter(move |(_, info)| info.role == Some(role))
            .map(|(peer, _)| peer)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hello(name: &str, role: Option<Role>) -> Hello {
        Hello {
            name: name.into(),
            role,
            session_code: "HX4K9P".into(),
        }
    }

    #[test]
    fn test_last_write_wins() {
        let mut dir = PeerDirectory::new();
        let peer = PeerId::from("p");
        assert!(dir.upsert(peer.clone(), &hello("Ana", None)));
        assert!(!dir.upsert(peer.clone(), &hello("Ana", None)));
        assert!(dir.upsert(peer.clone(), &hello("Ana", Some(Role::Bartender))));

        assert_eq!(dir.len(), 1);
        assert_eq!(dir.get(&peer).unwrap().role, Some(Role::Bartender));
    }

    #[test]
    fn test_with_role() {
        let mut dir = PeerDirectory::new();
        dir.upsert(PeerId::from("a"), &hello("Ana", Some(Role::Waiter)));
        dir.upsert(PeerId::from("b"), &hello("Ben", Some(Role::Bartender)));
        dir.upsert(PeerId::from("c"), &hello("Cia", Some(Role::Bartender)));

        let bartenders: Vec<_> = dir.with_role(Role::Bartender).cloned().collect();
        assert_eq!(bartenders, vec![PeerId::from("b"), PeerId::from("c")]);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut dir = PeerDirectory::new();
        dir.upsert(PeerId::from("a"), &hello("Ana", None));
        dir.upsert(PeerId::from("b"), &hello("Ben", None));

        assert!(dir.remove(&PeerId::from("a")).is_some());
        assert!(dir.remove(&PeerId::from("a")).is_none());
        dir.clear();
        assert!(dir.is_empty());
    }
}
