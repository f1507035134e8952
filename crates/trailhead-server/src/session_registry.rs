//! Process-wide table of game sessions.
//!
//! Sessions are created lazily on the first join to an unseen key and
//! evicted as soon as their roster is empty.

use std::{collections::HashMap, ops::Sub, time::Duration};

use trailhead_core::{ConnectionId, Session, SessionConfig};

/// Sessions by key.
#[derive(Debug)]
pub struct SessionRegistry<I> {
    sessions: HashMap<String, Session<I>>,
    config: SessionConfig,
}

impl<I> SessionRegistry<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Empty registry. New sessions use `config`.
    pub fn new(config: SessionConfig) -> Self {
        Self { sessions: HashMap::new(), config }
    }

    /// Session under `key`, created empty if absent.
    pub fn get_or_create(&mut self, key: &str) -> &mut Session<I> {
        let config = self.config;
        self.sessions.entry(key.to_string()).or_insert_with(|| Session::new(key, config))
    }

    /// Session under `key`.
    pub fn get(&self, key: &str) -> Option<&Session<I>> {
        self.sessions.get(key)
    }

    /// Mutable session under `key`.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Session<I>> {
        self.sessions.get_mut(key)
    }

    /// Remove and return a session.
    pub fn remove(&mut self, key: &str) -> Option<Session<I>> {
        self.sessions.remove(key)
    }

    /// Drop the session if its roster is empty. Returns whether it was
    /// evicted.
    pub fn evict_if_empty(&mut self, key: &str) -> bool {
        if self.sessions.get(key).is_some_and(Session::is_empty) {
            return self.remove(key).is_some();
        }
        false
    }

    /// All session keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.sessions.keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is live.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Keys of sessions holding a roster entry for `connection_id`, sorted.
    ///
    /// Linear scan. The driver uses the connection registry's reverse index
    /// and only falls back to this for connections it no longer tracks.
    pub fn sessions_for_connection(&self, connection_id: ConnectionId) -> Vec<String> {
        let mut keys: Vec<String> = self
            .sessions
            .values()
            .filter(|s| s.has_connection(connection_id))
            .map(|s| s.key().to_string())
            .collect();
        keys.sort_unstable();
        keys
    }
}
