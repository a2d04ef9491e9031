//! Per-connection state tracking
//!
//! Every client connection moves `AwaitingHandshake -> Open -> Closed`.
//! Closed connections are dropped from the table, so a lookup miss reads
//! as `Closed`.

use std::collections::HashMap;
use std::fmt;

/// Opaque connection identifier supplied by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wrap a raw transport id
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw transport id
    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for ConnectionId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a client connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connected, upgrade request not yet complete
    AwaitingHandshake,
    /// Handshake done, exchanging frames
    Open,
    /// Not tracked (never opened, failed handshake, or closed)
    Closed,
}

impl ConnectionState {
    /// Check if frames may be exchanged
    #[inline]
    pub fn is_open(self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

/// Table of live client connections
#[derive(Debug, Default)]
pub struct ConnectionTable {
    states: HashMap<ConnectionId, ConnectionState>,
}

impl ConnectionTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a freshly accepted connection
    ///
    /// Returns the state the id had before; a reused id is reset.
    pub fn insert_pending(&mut self, id: ConnectionId) -> ConnectionState {
        self.states
            .insert(id, ConnectionState::AwaitingHandshake)
            .unwrap_or(ConnectionState::Closed)
    }

    /// Promote a pending connection to open
    ///
    /// Returns `false` if the connection was not awaiting a handshake.
    pub fn mark_open(&mut self, id: ConnectionId) -> bool {
        match self.states.get_mut(&id) {
            Some(state) if *state == ConnectionState::AwaitingHandshake => {
                *state = ConnectionState::Open;
                true
            }
            _ => false,
        }
    }

    /// Current state of a connection
    #[inline]
    pub fn state(&self, id: ConnectionId) -> ConnectionState {
        self.states
            .get(&id)
            .copied()
            .unwrap_or(ConnectionState::Closed)
    }

    /// Check if a connection is open
    #[inline]
    pub fn is_open(&self, id: ConnectionId) -> bool {
        self.state(id).is_open()
    }

    /// Stop tracking a connection, returning the state it was in
    pub fn remove(&mut self, id: ConnectionId) -> ConnectionState {
        self.states
            .remove(&id)
            .unwrap_or(ConnectionState::Closed)
    }

    /// Number of tracked connections
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Check if no connection is tracked
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Ids of all open connections, in no particular order
    pub fn open_ids(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.states
            .iter()
            .filter(|(_, state)| state.is_open())
            .map(|(id, _)| *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let mut table = ConnectionTable::new();
        let id = ConnectionId::new(1);

        assert_eq!(table.state(id), ConnectionState::Closed);
        assert_eq!(table.insert_pending(id), ConnectionState::Closed);
        assert_eq!(table.state(id), ConnectionState::AwaitingHandshake);
        assert!(!table.is_open(id));

        assert!(table.mark_open(id));
        assert_eq!(table.state(id), ConnectionState::Open);
        assert!(table.is_open(id));

        assert_eq!(table.remove(id), ConnectionState::Open);
        assert_eq!(table.state(id), ConnectionState::Closed);
        assert!(table.is_empty());
    }

    #[test]
    fn test_mark_open_requires_pending() {
        let mut table = ConnectionTable::new();
        let id = ConnectionId::new(5);

        assert!(!table.mark_open(id));
        assert_eq!(table.state(id), ConnectionState::Closed);

        table.insert_pending(id);
        assert!(table.mark_open(id));
        assert!(!table.mark_open(id));
    }

    #[test]
    fn test_reused_id_resets() {
        let mut table = ConnectionTable::new();
        let id = ConnectionId::new(9);

        table.insert_pending(id);
        table.mark_open(id);
        assert_eq!(table.insert_pending(id), ConnectionState::Open);
        assert_eq!(table.state(id), ConnectionState::AwaitingHandshake);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_open_ids() {
        let mut table = ConnectionTable::new();
        for raw in 1..=4 {
            table.insert_pending(ConnectionId::new(raw));
        }
        table.mark_open(ConnectionId::new(2));
        table.mark_open(ConnectionId::new(4));

        let mut open: Vec<_> = table.open_ids().collect();
        open.sort();
        assert_eq!(open, vec![ConnectionId::new(2), ConnectionId::new(4)]);
    }
}
