//! Lifecycle management for background tile server instances.
//!
//! A registry owns zero or more HTTP listeners, each bound to its own port
//! and all serving the same routing table over one shared [`AppState`].
//! Instances are launched on demand, reused when their key is already live,
//! and torn down explicitly. The `Default` key is shared by embedders that
//! did not ask for a dedicated port; an unforced shutdown never removes it.

use crate::build_router;
use crate::state::AppState;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Registry key for a server instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerKey {
    /// The shared instance, protected from unforced shutdown.
    Default,
    /// An instance on an explicit port. Zero requests an ephemeral port and
    /// resolves to the assigned one.
    Port(u16),
}

impl fmt::Display for ServerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerKey::Default => write!(f, "default"),
            ServerKey::Port(port) => write!(f, "{}", port),
        }
    }
}

/// Lookup failure for a key with no live server behind it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Tile server for this source has been shutdown.")]
pub struct ServerDownError;

impl From<ServerDownError> for tile_common::TileError {
    fn from(err: ServerDownError) -> Self {
        tile_common::TileError::InternalError(err.to_string())
    }
}

/// Snapshot of a live instance.
///
/// The instance may be shut down by another task after this snapshot is
/// taken; callers that then fail to connect should re-`get` or treat the
/// server as unavailable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInstance {
    pub key: ServerKey,
    pub host: String,
    pub port: u16,
}

impl ServerInstance {
    pub fn is_default(&self) -> bool {
        matches!(self.key, ServerKey::Default)
    }

    /// Address the listener is reachable at from this machine.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

struct Entry {
    instance: ServerInstance,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

/// Registry of live server instances keyed by [`ServerKey`].
///
/// All mutation goes through one mutex held across the bind, so two
/// concurrent launches of the same key cannot both create a listener.
pub struct ServerRegistry {
    state: Arc<AppState>,
    servers: Mutex<HashMap<ServerKey, Entry>>,
}

impl ServerRegistry {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            servers: Mutex::new(HashMap::new()),
        }
    }

    /// State shared by every instance this registry launches.
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Launch a server for `key`, or reuse the live one already registered.
    ///
    /// Returns the key the instance is registered under: `Default` stays
    /// `Default` (on an ephemeral port), `Port(0)` resolves to the assigned
    /// port, and a nonzero port registers as itself. Use the returned key
    /// for all later `get`/`shutdown` calls.
    pub async fn launch(&self, key: ServerKey, host: &str) -> io::Result<ServerKey> {
        let mut servers = self.servers.lock().await;

        if let Some(entry) = servers.get(&key) {
            if !entry.handle.is_finished() {
                return Ok(key);
            }
            // The listener task died; replace it.
            servers.remove(&key);
        }

        let request_port = match key {
            ServerKey::Default => 0,
            ServerKey::Port(port) => port,
        };
        let listener = TcpListener::bind((host, request_port)).await?;
        let port = listener.local_addr()?.port();
        let resolved = match key {
            ServerKey::Default => ServerKey::Default,
            ServerKey::Port(_) => ServerKey::Port(port),
        };

        let token = CancellationToken::new();
        let child = token.clone();
        let router = build_router(self.state.clone());
        let handle = tokio::spawn(async move {
            let wait = async move { child.cancelled().await };
            if let Err(err) = axum::serve(listener, router)
                .with_graceful_shutdown(wait)
                .await
            {
                error!(error = %err, "tile server instance exited with an error");
            }
        });

        info!(key = %resolved, host, port, "launched tile server instance");
        servers.insert(
            resolved,
            Entry {
                instance: ServerInstance {
                    key: resolved,
                    host: host.to_string(),
                    port,
                },
                shutdown: token,
                handle,
            },
        );
        Ok(resolved)
    }

    /// Whether a live listener is registered under `key`.
    pub async fn is_live(&self, key: ServerKey) -> bool {
        let servers = self.servers.lock().await;
        servers
            .get(&key)
            .map(|entry| !entry.handle.is_finished())
            .unwrap_or(false)
    }

    /// Look up the instance registered under `key`.
    pub async fn get(&self, key: ServerKey) -> Result<ServerInstance, ServerDownError> {
        let servers = self.servers.lock().await;
        servers
            .get(&key)
            .map(|entry| entry.instance.clone())
            .ok_or(ServerDownError)
    }

    /// Stop the instance registered under `key`.
    ///
    /// `Default` is only removed when `force` is set. The entry leaves the
    /// map before the listener stops, so a concurrent `get` fails fast
    /// instead of returning a half-dead instance. Returns once the listener
    /// task has exited and its port is free again.
    pub async fn shutdown(&self, key: ServerKey, force: bool) {
        if key == ServerKey::Default && !force {
            return;
        }
        let entry = {
            let mut servers = self.servers.lock().await;
            servers.remove(&key)
        };
        match entry {
            Some(entry) => {
                entry.shutdown.cancel();
                if entry.handle.await.is_err() {
                    error!(key = %key, "tile server instance panicked during shutdown");
                }
                info!(key = %key, "tile server instance stopped");
            }
            None => debug!(key = %key, "no live server registered for shutdown key"),
        }
    }

    /// Number of registered instances.
    pub async fn count(&self) -> usize {
        self.servers.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;

    fn registry() -> ServerRegistry {
        ServerRegistry::new(Arc::new(AppState::new(ServiceConfig::default())))
    }

    #[tokio::test]
    async fn test_launch_reuses_live_instance_per_key() {
        let registry = registry();
        let first = registry.launch(ServerKey::Default, "127.0.0.1").await.unwrap();
        let second = registry.launch(ServerKey::Default, "127.0.0.1").await.unwrap();
        assert_eq!(first, ServerKey::Default);
        assert_eq!(second, ServerKey::Default);
        assert_eq!(registry.count().await, 1);
        registry.shutdown(ServerKey::Default, true).await;
    }

    #[tokio::test]
    async fn test_ephemeral_request_registers_under_resolved_port() {
        let registry = registry();
        let key = registry.launch(ServerKey::Port(0), "127.0.0.1").await.unwrap();
        let port = match key {
            ServerKey::Port(port) => port,
            ServerKey::Default => panic!("ephemeral launch kept the sentinel key"),
        };
        assert_ne!(port, 0);
        let instance = registry.get(key).await.unwrap();
        assert_eq!(instance.port, port);
        assert!(!instance.is_default());

        // Each explicit port-0 request is a fresh instance.
        let other = registry.launch(ServerKey::Port(0), "127.0.0.1").await.unwrap();
        assert_ne!(other, key);
        assert_eq!(registry.count().await, 2);

        registry.shutdown(key, false).await;
        registry.shutdown(other, false).await;
    }

    #[tokio::test]
    async fn test_default_instance_survives_unforced_shutdown() {
        let registry = registry();
        registry.launch(ServerKey::Default, "127.0.0.1").await.unwrap();

        registry.shutdown(ServerKey::Default, false).await;
        assert!(registry.get(ServerKey::Default).await.is_ok());
        assert_eq!(registry.count().await, 1);

        registry.shutdown(ServerKey::Default, true).await;
        assert_eq!(
            registry.get(ServerKey::Default).await,
            Err(ServerDownError)
        );
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_lookup_after_shutdown_reports_server_down() {
        let registry = registry();
        let key = registry.launch(ServerKey::Port(0), "127.0.0.1").await.unwrap();
        registry.shutdown(key, false).await;

        let err = registry.get(key).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Tile server for this source has been shutdown."
        );
        // Shutting down an already-removed key is a logged no-op.
        registry.shutdown(key, false).await;
    }

    #[tokio::test]
    async fn test_shutdown_releases_port_for_rebind() {
        let registry = registry();
        let key = registry.launch(ServerKey::Port(0), "127.0.0.1").await.unwrap();
        let port = match key {
            ServerKey::Port(port) => port,
            ServerKey::Default => unreachable!(),
        };
        registry.shutdown(key, false).await;

        let again = registry.launch(ServerKey::Port(port), "127.0.0.1").await.unwrap();
        assert_eq!(again, ServerKey::Port(port));
        registry.shutdown(again, false).await;
    }
}
