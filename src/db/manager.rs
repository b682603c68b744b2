//! Named connection registry.
//!
//! Connections are registered under a name and shared as `Arc<Connection>`.
//! The registry is an explicit object; callers that need one process-wide
//! registry share it through an `Arc`.

use crate::db::connection::Connection;
use crate::db::factory::DatabaseFactory;
use crate::error::DbalResult;
use crate::models::Configuration;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct ConnectionManager {
    connections: RwLock<HashMap<String, Arc<Connection>>>,
}

impl ConnectionManager {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the connection registered as `name`, opening and registering
    /// one from `config` if there is none. An existing entry wins over
    /// `config`.
    pub async fn create(&self, config: &Configuration, name: &str) -> DbalResult<Arc<Connection>> {
        // Early check for existing connection
        if let Some(existing) = self.get(name).await {
            debug!(name = %name, "Reusing registered connection");
            return Ok(existing);
        }

        info!(name = %name, dsn = %config.dsn(), "Creating connection");
        let connection = Arc::new(DatabaseFactory::connect(config).await?);

        // Re-check after async work to prevent TOCTOU race.
        // If another caller registered first, close ours outside the lock.
        let (registered, loser) = {
            let mut connections = self.connections.write().await;
            match connections.get(name) {
                Some(existing) => (Arc::clone(existing), Some(connection)),
                None => {
                    connections.insert(name.to_string(), Arc::clone(&connection));
                    (connection, None)
                }
            }
        }; // Lock released here

        if let Some(loser) = loser {
            debug!(name = %name, "Concurrent create detected, discarding duplicate connection");
            close_if_unshared(name, loser).await;
        }

        Ok(registered)
    }

    /// Look up a connection by name.
    pub async fn get(&self, name: &str) -> Option<Arc<Connection>> {
        let connections = self.connections.read().await;
        connections.get(name).cloned()
    }

    /// Register an externally opened connection. Returns `false` and leaves
    /// the registry untouched if `name` is already taken.
    pub async fn add(&self, connection: Arc<Connection>, name: &str) -> bool {
        let mut connections = self.connections.write().await;
        if connections.contains_key(name) {
            warn!(name = %name, "Connection name already registered");
            return false;
        }
        info!(name = %name, db_type = %connection.db_type(), "Registered connection");
        connections.insert(name.to_string(), connection);
        true
    }

    /// Remove a connection from the registry.
    ///
    /// Non-persistent connections are closed once nothing else holds them;
    /// persistent ones are only detached.
    pub async fn drop(&self, name: &str) -> bool {
        let removed = {
            let mut connections = self.connections.write().await;
            connections.remove(name)
        };

        let Some(connection) = removed else {
            return false;
        };

        if connection.is_persistent() {
            info!(name = %name, "Detached persistent connection");
        } else {
            close_if_unshared(name, connection).await;
        }
        true
    }

    /// Check if a connection exists.
    pub async fn exists(&self, name: &str) -> bool {
        let connections = self.connections.read().await;
        connections.contains_key(name)
    }

    /// List all registered connection names.
    pub async fn names(&self) -> Vec<String> {
        let connections = self.connections.read().await;
        let mut names: Vec<String> = connections.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get the number of registered connections.
    pub async fn len(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every registered connection.
    pub async fn close_all(&self) {
        let drained: Vec<(String, Arc<Connection>)> = {
            let mut connections = self.connections.write().await;
            connections.drain().collect()
        };
        for (name, connection) in drained {
            if connection.is_persistent() {
                info!(name = %name, "Detached persistent connection");
            } else {
                close_if_unshared(&name, connection).await;
            }
        }
        info!("All connections closed");
    }
}

/// Close `connection` if this was the last handle to it.
async fn close_if_unshared(name: &str, connection: Arc<Connection>) {
    match Arc::try_unwrap(connection) {
        Ok(connection) => match connection.close().await {
            Ok(true) => info!(name = %name, "Closed connection"),
            Ok(false) => debug!(name = %name, "Connection busy, released by its last holder"),
            Err(e) => warn!(name = %name, error = %e, "Failed to close connection"),
        },
        Err(_) => debug!(name = %name, "Connection still shared, released by its last holder"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connection_manager_creation() {
        let manager = ConnectionManager::new();
        assert!(manager.is_empty().await);
        assert!(manager.names().await.is_empty());
    }

    #[tokio::test]
    async fn test_get_missing() {
        let manager = ConnectionManager::new();
        assert!(manager.get("nonexistent").await.is_none());
        assert!(!manager.drop("nonexistent").await);
    }

    #[tokio::test]
    async fn test_add_first_writer_wins() {
        let manager = ConnectionManager::new();
        let first = Arc::new(Connection::open("sqlite::memory:").await.unwrap());
        let second = Arc::new(Connection::open("sqlite::memory:").await.unwrap());

        assert!(manager.add(Arc::clone(&first), "main").await);
        assert!(!manager.add(second, "main").await);

        let registered = manager.get("main").await.unwrap();
        assert!(Arc::ptr_eq(&registered, &first));
        assert_eq!(manager.len().await, 1);
    }
}
