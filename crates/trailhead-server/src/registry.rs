//! Connection registry for session subscription tracking.
//!
//! The registry maintains bidirectional mappings: session key → connections
//! (the broadcast group) and connection → session keys (for cleanup on
//! disconnect). Both directions are O(1) lookups.
//!
//! Connections subscribe explicitly on join. Unregistering a connection
//! removes all of its subscriptions; dropping a session removes its whole
//! group.

use std::collections::{HashMap, HashSet};

use trailhead_core::ConnectionId;

/// Information about a registered connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Whether the connection has completed the handshake
    pub authenticated: bool,
    /// Opaque caller context presented in Hello
    pub caller_context: Option<Vec<u8>>,
}

impl ConnectionInfo {
    /// Create a new unauthenticated connection info.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connection info after a completed handshake.
    pub fn authenticated(caller_context: Option<Vec<u8>>) -> Self {
        Self { authenticated: true, caller_context }
    }
}

/// Registry for tracking connections and their session subscriptions.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// Connection id → connection info
    connections: HashMap<ConnectionId, ConnectionInfo>,
    /// Session key → subscribed connection ids
    subscribers: HashMap<String, HashSet<ConnectionId>>,
    /// Connection id → subscribed session keys
    connection_sessions: HashMap<ConnectionId, HashSet<String>>,
}

impl ConnectionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection. Returns `false` if it already exists.
    pub fn register_connection(
        &mut self,
        connection_id: ConnectionId,
        info: ConnectionInfo,
    ) -> bool {
        if self.connections.contains_key(&connection_id) {
            return false;
        }

        self.connections.insert(connection_id, info);
        self.connection_sessions.insert(connection_id, HashSet::new());
        true
    }

    /// Unregister a connection and remove all its subscriptions.
    ///
    /// Returns the connection info if it existed, along with the session keys
    /// it was subscribed to.
    pub fn unregister_connection(
        &mut self,
        connection_id: ConnectionId,
    ) -> Option<(ConnectionInfo, HashSet<String>)> {
        let info = self.connections.remove(&connection_id)?;
        let keys = self.connection_sessions.remove(&connection_id).unwrap_or_default();

        for key in &keys {
            if let Some(group) = self.subscribers.get_mut(key) {
                group.remove(&connection_id);
                if group.is_empty() {
                    self.subscribers.remove(key);
                }
            }
        }

        Some((info, keys))
    }

    /// Connection metadata. `None` if the connection doesn't exist.
    pub fn connection(&self, connection_id: ConnectionId) -> Option<&ConnectionInfo> {
        self.connections.get(&connection_id)
    }

    /// Check if a connection is registered.
    pub fn has_connection(&self, connection_id: ConnectionId) -> bool {
        self.connections.contains_key(&connection_id)
    }

    /// Record a completed handshake. Returns `false` if the connection
    /// doesn't exist.
    pub fn mark_authenticated(
        &mut self,
        connection_id: ConnectionId,
        caller_context: Option<Vec<u8>>,
    ) -> bool {
        match self.connections.get_mut(&connection_id) {
            Some(info) => {
                *info = ConnectionInfo::authenticated(caller_context);
                true
            },
            None => false,
        }
    }

    /// Subscribe a connection to a session's broadcast group.
    ///
    /// Returns `false` if the connection is not registered.
    pub fn subscribe(&mut self, connection_id: ConnectionId, key: &str) -> bool {
        if !self.connections.contains_key(&connection_id) {
            return false;
        }

        self.subscribers.entry(key.to_string()).or_default().insert(connection_id);
        self.connection_sessions.entry(connection_id).or_default().insert(key.to_string());
        true
    }

    /// Unsubscribe a connection from a session.
    ///
    /// Returns `true` if the connection was subscribed and is now
    /// unsubscribed.
    pub fn unsubscribe(&mut self, connection_id: ConnectionId, key: &str) -> bool {
        let removed_from_group =
            self.subscribers.get_mut(key).is_some_and(|g| g.remove(&connection_id));

        let removed_from_connection =
            self.connection_sessions.get_mut(&connection_id).is_some_and(|k| k.remove(key));

        if self.subscribers.get(key).is_some_and(HashSet::is_empty) {
            self.subscribers.remove(key);
        }

        removed_from_group && removed_from_connection
    }

    /// Subscribers of a session, sorted for deterministic delivery order.
    pub fn subscribers(&self, key: &str) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> =
            self.subscribers.get(key).into_iter().flat_map(|g| g.iter().copied()).collect();
        ids.sort_unstable();
        ids
    }

    /// Session keys a connection is subscribed to, sorted.
    pub fn sessions_for_connection(&self, connection_id: ConnectionId) -> Vec<String> {
        let mut keys: Vec<String> = self
            .connection_sessions
            .get(&connection_id)
            .into_iter()
            .flat_map(|k| k.iter().cloned())
            .collect();
        keys.sort_unstable();
        keys
    }

    /// Drop a session's whole broadcast group.
    ///
    /// Returns the connections that were subscribed.
    pub fn drop_session(&mut self, key: &str) -> HashSet<ConnectionId> {
        let group = self.subscribers.remove(key).unwrap_or_default();
        for connection_id in &group {
            if let Some(keys) = self.connection_sessions.get_mut(connection_id) {
                keys.remove(key);
            }
        }
        group
    }
}
