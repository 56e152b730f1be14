use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::realtime::RealtimeEvent;

/// Live connection to one user. The sender feeds the connection's push loop;
/// the id distinguishes this connection from any later one for the same user.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub connection_id: String,
    pub sender: UnboundedSender<RealtimeEvent>,
}

impl ConnectionHandle {
    pub fn new(sender: UnboundedSender<RealtimeEvent>) -> Self {
        Self {
            connection_id: Uuid::new_v4().to_string(),
            sender,
        }
    }
}

/// Process-wide map of online users. At most one connection per user;
/// registering again replaces the previous entry.
pub struct PresenceRegistry {
    connections: Mutex<HashMap<String, ConnectionHandle>>,
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Register a connection, replacing any existing one for the user.
    pub fn register(&self, user_id: &str, handle: ConnectionHandle) {
        let mut connections = self.connections.lock().unwrap();
        connections.insert(user_id.to_string(), handle);
    }

    /// Remove the user's entry only if it still belongs to this connection.
    /// A teardown racing a reconnect must not evict the newer connection.
    pub fn unregister(&self, user_id: &str, connection_id: &str) {
        let mut connections = self.connections.lock().unwrap();
        if let Some(handle) = connections.get(user_id) {
            if handle.connection_id == connection_id {
                connections.remove(user_id);
            }
        }
    }

    pub fn lookup(&self, user_id: &str) -> Option<ConnectionHandle> {
        let connections = self.connections.lock().unwrap();
        connections.get(user_id).cloned()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        let connections = self.connections.lock().unwrap();
        connections.contains_key(user_id)
    }

    pub fn online_user_ids(&self) -> Vec<String> {
        let connections = self.connections.lock().unwrap();
        connections.keys().cloned().collect()
    }
}
