//! Ownership of all live connections, with secondary indexes for routing.
//!
//! One primary map `id -> Connection` plus two secondary indexes
//! `user_id -> set<id>` and `session_id -> set<id>`. All three live behind a
//! single `RwLock` so that add/remove stay atomic across the maps and every
//! snapshot (`list`, `list_stale`, `snapshot_stats`) observes a consistent
//! view. Invariant: an id is in the primary map iff it is in every secondary
//! index whose field is set on the connection; a secondary set that empties
//! is removed together with its key.

use crate::connection::{Connection, ConnectionId};
use crate::selector::Selector;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Default)]
struct RegistryInner {
    connections: HashMap<ConnectionId, Arc<Connection>>,
    user_index: HashMap<String, HashSet<ConnectionId>>,
    session_index: HashMap<String, HashSet<ConnectionId>>,
}

/// Registry-level portion of the hub statistics snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub total_connections: usize,
    pub authenticated_connections: usize,
    pub anonymous_connections: usize,
    pub connections_per_user: HashMap<String, usize>,
    pub connections_per_session: HashMap<String, usize>,
}

pub struct ConnectionRegistry {
    inner: RwLock<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Insert a connection and update both secondary indexes atomically.
    /// Returns false (and leaves the registry untouched) when the id is
    /// already present.
    pub fn add(&self, connection: Arc<Connection>) -> bool {
        let mut inner = self.write();
        if inner.connections.contains_key(&connection.id) {
            return false;
        }

        if let Some(user_id) = &connection.user_id {
            inner
                .user_index
                .entry(user_id.clone())
                .or_default()
                .insert(connection.id.clone());
        }
        if let Some(session_id) = &connection.session_id {
            inner
                .session_index
                .entry(session_id.clone())
                .or_default()
                .insert(connection.id.clone());
        }
        inner.connections.insert(connection.id.clone(), connection);
        true
    }

    /// Admission-checked insert: generates a connection id that is free in
    /// the primary map (re-rolling on the improbable collision), builds the
    /// connection and registers it, all under one write lock. Returns `None`
    /// when the registry already holds `max_connections`.
    pub fn insert_new<F>(&self, max_connections: usize, build: F) -> Option<Arc<Connection>>
    where
        F: FnOnce(ConnectionId) -> Arc<Connection>,
    {
        let mut inner = self.write();
        if inner.connections.len() >= max_connections {
            return None;
        }

        let mut id = ConnectionId::generate();
        while inner.connections.contains_key(&id) {
            id = ConnectionId::generate();
        }

        let connection = build(id.clone());
        if let Some(user_id) = &connection.user_id {
            inner
                .user_index
                .entry(user_id.clone())
                .or_default()
                .insert(id.clone());
        }
        if let Some(session_id) = &connection.session_id {
            inner
                .session_index
                .entry(session_id.clone())
                .or_default()
                .insert(id.clone());
        }
        inner.connections.insert(id, connection.clone());
        Some(connection)
    }

    /// Remove a connection and every index entry pointing at it.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        let mut inner = self.write();
        let connection = inner.connections.remove(id)?;

        if let Some(user_id) = &connection.user_id {
            prune_index_entry(&mut inner.user_index, user_id, id);
        }
        if let Some(session_id) = &connection.session_id {
            prune_index_entry(&mut inner.session_index, session_id, id);
        }
        Some(connection)
    }

    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.read().connections.get(id).cloned()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.read().connections.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.read().connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().connections.is_empty()
    }

    /// Resolve a selector to the matching connections.
    ///
    /// A connection id short-circuits everything else; user and session
    /// narrow via their indexes (intersecting when both are set); with
    /// neither, every connection matches. The metadata predicate is applied
    /// as an equality post-filter at the end.
    pub fn list(&self, selector: &Selector) -> Vec<Arc<Connection>> {
        let inner = self.read();

        if let Some(connection_id) = &selector.connection_id {
            let id = ConnectionId::from(connection_id.as_str());
            return inner
                .connections
                .get(&id)
                .filter(|conn| selector.metadata_matches(&conn.metadata))
                .cloned()
                .into_iter()
                .collect();
        }

        let mut id_set: Option<HashSet<ConnectionId>> = None;

        if let Some(user_id) = &selector.user_id {
            match inner.user_index.get(user_id) {
                Some(set) => id_set = Some(set.clone()),
                None => return Vec::new(),
            }
        }

        if let Some(session_id) = &selector.session_id {
            match inner.session_index.get(session_id) {
                Some(set) => {
                    id_set = Some(match id_set {
                        Some(restricted) => restricted.intersection(set).cloned().collect(),
                        None => set.clone(),
                    });
                }
                None => return Vec::new(),
            }
        }

        let candidates: Vec<Arc<Connection>> = match id_set {
            Some(ids) => ids
                .iter()
                .filter_map(|id| inner.connections.get(id).cloned())
                .collect(),
            None => inner.connections.values().cloned().collect(),
        };

        candidates
            .into_iter()
            .filter(|conn| selector.metadata_matches(&conn.metadata))
            .collect()
    }

    /// Connections whose `last_seen` predates `now_ms - timeout_ms`.
    pub fn list_stale(&self, timeout_ms: i64, now_ms: i64) -> Vec<Arc<Connection>> {
        let cutoff = now_ms - timeout_ms;
        self.read()
            .connections
            .values()
            .filter(|conn| conn.last_seen_ms() < cutoff)
            .cloned()
            .collect()
    }

    /// Refresh a connection's liveness timestamp.
    pub fn touch(&self, id: &ConnectionId, now_ms: i64) -> bool {
        match self.read().connections.get(id) {
            Some(conn) => {
                conn.touch(now_ms);
                true
            }
            None => false,
        }
    }

    /// One read-consistent statistics snapshot.
    pub fn snapshot_stats(&self) -> RegistryStats {
        let inner = self.read();
        let authenticated = inner
            .connections
            .values()
            .filter(|conn| conn.is_authenticated())
            .count();

        RegistryStats {
            total_connections: inner.connections.len(),
            authenticated_connections: authenticated,
            anonymous_connections: inner.connections.len() - authenticated,
            connections_per_user: inner
                .user_index
                .iter()
                .map(|(user_id, set)| (user_id.clone(), set.len()))
                .collect(),
            connections_per_session: inner
                .session_index
                .iter()
                .map(|(session_id, set)| (session_id.clone(), set.len()))
                .collect(),
        }
    }

    /// Drop everything, returning the removed connections so the caller can
    /// close their writers.
    pub fn clear(&self) -> Vec<Arc<Connection>> {
        let mut inner = self.write();
        inner.user_index.clear();
        inner.session_index.clear();
        inner.connections.drain().map(|(_, conn)| conn).collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop one id from a secondary index set, removing the key when the set
/// empties.
fn prune_index_entry(
    index: &mut HashMap<String, HashSet<ConnectionId>>,
    key: &str,
    id: &ConnectionId,
) {
    let now_empty = match index.get_mut(key) {
        Some(set) => {
            set.remove(id);
            set.is_empty()
        }
        None => false,
    };
    if now_empty {
        index.remove(key);
    }
}
