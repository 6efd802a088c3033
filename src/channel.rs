// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The joined-channel registry.
//!
//! Channels are server-managed broadcast groups; a client joins or leaves
//! one only because the server told it to (`CHANNEL_JOIN`/`CHANNEL_LEAVE`).
//! [`crate::session::Session`] owns this registry and mutates it as part of
//! dispatching those opcodes; `ChannelRegistry` itself is just the map plus
//! the send helpers that wrap [`crate::session::Session::channel_send`]'s
//! recipient-list conventions.

use crate::ids::CompactId;
use std::collections::BTreeMap;

/// A channel the session has joined.
///
/// `name` is informational only - routing and identity both go through
/// `id`. The channel does not own a reference back to its session; callers
/// go through `Session::channel_send` with the id instead, so this struct
/// can't outlive the session's own containment of it.
#[derive(Debug, Clone)]
pub struct Channel {
    id: CompactId,
    name: Vec<u8>,
}

impl Channel {
    pub fn id(&self) -> &CompactId {
        &self.id
    }

    pub fn name(&self) -> &[u8] {
        &self.name
    }
}

/// Channels currently joined, keyed by id.
///
/// A `BTreeMap` is used rather than a `HashMap`: `CompactId` already has a
/// total order (see [`crate::ids::CompactId`]), so this gives deterministic
/// iteration for `all()` without asking every id to also be a good hash key.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: BTreeMap<CompactId, Channel>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        ChannelRegistry { channels: BTreeMap::new() }
    }

    /// Register a channel by id with no name recorded yet. Used for
    /// `CHANNEL_JOIN` dispatch before the name is known to the caller; use
    /// [`ChannelRegistry::join_named`] when the name is already in hand.
    pub fn join(&mut self, id: CompactId) {
        self.join_named(id, Vec::new());
    }

    /// Register a channel by id with its server-supplied name.
    pub fn join_named(&mut self, id: CompactId, name: Vec<u8>) {
        self.channels.insert(id, Channel { id, name });
    }

    /// Remove a joined channel, returning it if it was present.
    pub fn leave(&mut self, id: &CompactId) -> Option<Channel> {
        self.channels.remove(id)
    }

    pub fn contains(&self, id: &CompactId) -> bool {
        self.channels.contains_key(id)
    }

    pub fn get(&self, id: &CompactId) -> Option<&Channel> {
        self.channels.get(id)
    }

    /// All currently joined channels, in ascending id order.
    pub fn all(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_then_leave_round_trips() {
        let mut reg = ChannelRegistry::new();
        let id = CompactId::from_bytes(&[0x01]).unwrap();
        reg.join_named(id, b"lobby".to_vec());
        assert!(reg.contains(&id));
        assert_eq!(reg.get(&id).unwrap().name(), b"lobby");
        let left = reg.leave(&id).unwrap();
        assert_eq!(left.id(), &id);
        assert!(!reg.contains(&id));
    }

    #[test]
    fn leave_of_unknown_channel_returns_none() {
        let mut reg = ChannelRegistry::new();
        let id = CompactId::from_bytes(&[0x02]).unwrap();
        assert!(reg.leave(&id).is_none());
    }

    #[test]
    fn all_iterates_in_ascending_id_order() {
        let mut reg = ChannelRegistry::new();
        reg.join(CompactId::from_bytes(&[0x05]).unwrap());
        reg.join(CompactId::from_bytes(&[0x01]).unwrap());
        reg.join(CompactId::from_bytes(&[0x03]).unwrap());
        let ids: Vec<_> = reg.all().map(|c| c.id().as_bytes()[0]).collect();
        assert_eq!(ids, vec![0x01, 0x03, 0x05]);
    }
}
