//! In-memory room membership and fan-out

use coedit_protocol::{RoomKey, ServerEvent};
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Identifies one transport connection for the lifetime of the process
pub type ConnectionId = u64;

type Members = HashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>;

/// Broadcast rooms keyed by `RoomKey`.
///
/// Each member is a per-connection delivery handle. Join and leave are
/// synchronous: once `leave` returns, no later broadcast can target that
/// connection through this room.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomKey, Members>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room, creating the room if needed
    pub fn join(&self, key: RoomKey, conn: ConnectionId, tx: mpsc::UnboundedSender<ServerEvent>) {
        self.rooms.write().entry(key).or_default().insert(conn, tx);
    }

    /// Remove a connection from a room. Empty rooms are dropped.
    /// Returns false if the connection was not a member.
    pub fn leave(&self, key: &RoomKey, conn: ConnectionId) -> bool {
        let mut rooms = self.rooms.write();
        let Some(members) = rooms.get_mut(key) else {
            return false;
        };

        let removed = members.remove(&conn).is_some();
        if members.is_empty() {
            rooms.remove(key);
        }
        removed
    }

    /// Remove a connection from every room it belongs to.
    /// Returns the keys it was removed from.
    pub fn leave_all(&self, conn: ConnectionId) -> Vec<RoomKey> {
        let mut rooms = self.rooms.write();
        let mut left = Vec::new();

        rooms.retain(|key, members| {
            if members.remove(&conn).is_some() {
                left.push(key.clone());
            }
            !members.is_empty()
        });

        left
    }

    /// Deliver an event to every member of a room.
    /// Returns the number of members reached.
    pub fn broadcast(&self, key: &RoomKey, event: &ServerEvent) -> usize {
        let rooms = self.rooms.read();
        let Some(members) = rooms.get(key) else {
            return 0;
        };

        let mut delivered = 0;
        for tx in members.values() {
            if tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Deliver an event to every member of a room except `sender`
    pub fn broadcast_except(
        &self,
        key: &RoomKey,
        sender: ConnectionId,
        event: &ServerEvent,
    ) -> usize {
        let rooms = self.rooms.read();
        let Some(members) = rooms.get(key) else {
            return 0;
        };

        let mut delivered = 0;
        for (conn, tx) in members {
            if *conn != sender && tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    pub fn member_count(&self, key: &RoomKey) -> usize {
        self.rooms.read().get(key).map_or(0, Members::len)
    }

    pub fn is_member(&self, key: &RoomKey, conn: ConnectionId) -> bool {
        self.rooms
            .read()
            .get(key)
            .is_some_and(|members| members.contains_key(&conn))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }
}
