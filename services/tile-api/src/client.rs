//! In-process client for a registry-launched tile server.
//!
//! A `TileClient` launches (or reuses) a background server for one raster
//! and builds the URLs a tile viewer needs. Client-facing URLs can differ
//! from the bind address when running behind a proxy or port forward; the
//! `LOCALTILESERVER_CLIENT_*` overrides and their explicit counterparts
//! control that mapping.

use crate::config::{self, ClientOverrides};
use crate::registry::{ServerDownError, ServerInstance, ServerKey, ServerRegistry};
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::sync::Arc;
use tile_common::{TileError, TileResult};

/// Characters percent-encoded in query values. Covers the RFC 3986 reserved
/// set that would change how the query string parses, plus `%` itself.
const QUERY_VALUE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'=')
    .add(b'?');

/// Launch options for [`TileClient::new`].
#[derive(Debug, Clone)]
pub struct TileClientOptions {
    /// Registry key to launch under. The default shares the process-wide
    /// "default" server.
    pub port: ServerKey,
    /// Bind host for a newly launched server.
    pub host: String,
    /// Explicit client URL overrides; unset fields fall back to the
    /// `LOCALTILESERVER_CLIENT_*` environment.
    pub overrides: ClientOverrides,
}

impl Default for TileClientOptions {
    fn default() -> Self {
        TileClientOptions {
            port: ServerKey::Default,
            host: config::DEFAULT_HOST.to_string(),
            overrides: ClientOverrides::default(),
        }
    }
}

/// Handle to a background tile server scoped to one source raster.
pub struct TileClient {
    registry: Arc<ServerRegistry>,
    key: ServerKey,
    filename: String,
    overrides: ClientOverrides,
    http: reqwest::Client,
}

impl TileClient {
    /// Launch (or reuse) a server and wrap it for `filename`.
    pub async fn new(
        registry: Arc<ServerRegistry>,
        filename: impl Into<String>,
        options: TileClientOptions,
    ) -> TileResult<Self> {
        let key = registry.launch(options.port, &options.host).await?;
        Ok(TileClient {
            registry,
            key,
            filename: filename.into(),
            overrides: options.overrides.or_env(),
            http: reqwest::Client::new(),
        })
    }

    /// Launch and verify: fetches metadata once and tears the server back
    /// down if the source cannot actually be served.
    pub async fn connect(
        registry: Arc<ServerRegistry>,
        filename: impl Into<String>,
        options: TileClientOptions,
    ) -> TileResult<Self> {
        let client = TileClient::new(registry, filename, options).await?;
        if let Err(err) = client.metadata().await {
            client.shutdown(false).await;
            return Err(err);
        }
        Ok(client)
    }

    pub fn key(&self) -> ServerKey {
        self.key
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// The live instance behind this client.
    pub async fn server(&self) -> Result<ServerInstance, ServerDownError> {
        self.registry.get(self.key).await
    }

    /// Address of the server as reachable from this process.
    pub async fn server_base_url(&self) -> Result<String, ServerDownError> {
        Ok(self.server().await?.base_url())
    }

    /// Address of the server as reachable from the viewer.
    ///
    /// With no overrides this is relative ("/"), letting pages served by the
    /// same process address it without knowing their own origin.
    pub async fn client_base_url(&self) -> Result<String, ServerDownError> {
        let instance = self.server().await?;
        Ok(self.client_base_url_for(&instance))
    }

    /// Server-side URL for an endpoint path, with the filename attached.
    pub async fn create_url(&self, path: &str) -> Result<String, ServerDownError> {
        let base = self.server_base_url().await?;
        Ok(self.append_filename(join_url(&base, path)))
    }

    /// Client-facing URL for an endpoint path.
    ///
    /// Falls back to the server-side URL when no override is configured.
    pub async fn create_client_url(&self, path: &str) -> Result<String, ServerDownError> {
        if self.overrides.is_empty() {
            return self.create_url(path).await;
        }
        let instance = self.server().await?;
        let base = self.client_base_url_for(&instance);
        Ok(self.append_filename(join_url(&base, path)))
    }

    /// Slippy-map URL template with literal `{z}/{x}/{y}` placeholders.
    pub async fn tile_url_template(&self) -> Result<String, ServerDownError> {
        self.create_client_url("api/tiles/{z}/{x}/{y}.png").await
    }

    /// Fetch and decode the source metadata.
    pub async fn metadata(&self) -> TileResult<serde_json::Value> {
        let url = self.create_url("api/metadata").await?;
        let response = check_status(self.http.get(&url).send().await.map_err(request_error)?)?;
        response.json().await.map_err(request_error)
    }

    /// Fetch one encoded PNG tile.
    pub async fn get_tile(&self, z: u8, x: u32, y: u32) -> TileResult<Bytes> {
        self.fetch_bytes(&format!("api/tiles/{}/{}/{}.png", z, x, y))
            .await
    }

    /// Fetch an endpoint as raw bytes. `path` may carry its own query
    /// parameters; the filename is appended either way.
    pub async fn fetch_bytes(&self, path: &str) -> TileResult<Bytes> {
        let url = self.create_url(path).await?;
        let response = check_status(self.http.get(&url).send().await.map_err(request_error)?)?;
        response.bytes().await.map_err(request_error)
    }

    /// Shut this client's server down. Unforced shutdown of the shared
    /// default instance is ignored, mirroring the registry's protection.
    pub async fn shutdown(&self, force: bool) {
        self.registry.shutdown(self.key, force).await;
    }

    fn append_filename(&self, base: String) -> String {
        let sep = if base.contains('?') { '&' } else { '?' };
        format!(
            "{}{}filename={}",
            base,
            sep,
            utf8_percent_encode(&self.filename, QUERY_VALUE)
        )
    }

    fn resolved_prefix(&self, server_port: u16) -> Option<String> {
        self.overrides
            .prefix
            .as_ref()
            .map(|prefix| prefix.replace("{port}", &server_port.to_string()))
    }

    fn client_base_url_for(&self, instance: &ServerInstance) -> String {
        let scheme = match self.overrides.host.as_deref() {
            Some(host) if !host.starts_with("http") => "http://",
            _ => "",
        };
        let mut base = match (self.overrides.host.as_deref(), self.overrides.port) {
            (Some(host), Some(port)) => format!("{}{}:{}", scheme, host, port),
            (Some(host), None) => format!("{}{}", scheme, host),
            (None, Some(port)) => format!("http://{}:{}", instance.host, port),
            (None, None) => "/".to_string(),
        };
        if let Some(prefix) = self.resolved_prefix(instance.port) {
            base.push_str(&prefix);
        }
        if base.starts_with('/') {
            base = format!("/{}", base.trim_start_matches('/'));
        }
        base
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn request_error(err: reqwest::Error) -> TileError {
    TileError::InternalError(format!("request failed: {}", err))
}

fn check_status(response: reqwest::Response) -> TileResult<reqwest::Response> {
    response.error_for_status().map_err(request_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::state::AppState;

    fn client_with(overrides: ClientOverrides) -> TileClient {
        let state = Arc::new(AppState::new(ServiceConfig::default()));
        TileClient {
            registry: Arc::new(ServerRegistry::new(state)),
            key: ServerKey::Default,
            filename: "demo file.tif".to_string(),
            overrides,
            http: reqwest::Client::new(),
        }
    }

    fn instance(host: &str, port: u16) -> ServerInstance {
        ServerInstance {
            key: ServerKey::Default,
            host: host.to_string(),
            port,
        }
    }

    #[test]
    fn test_client_base_url_override_combinations() {
        let srv = instance("127.0.0.1", 9000);

        let both = client_with(ClientOverrides {
            host: Some("example.com".to_string()),
            port: Some(8888),
            prefix: None,
        });
        assert_eq!(both.client_base_url_for(&srv), "http://example.com:8888");

        let host_only = client_with(ClientOverrides {
            host: Some("https://tiles.example.com".to_string()),
            port: None,
            prefix: None,
        });
        // A host that already carries a scheme is used verbatim.
        assert_eq!(
            host_only.client_base_url_for(&srv),
            "https://tiles.example.com"
        );

        let port_only = client_with(ClientOverrides {
            host: None,
            port: Some(8888),
            prefix: None,
        });
        assert_eq!(port_only.client_base_url_for(&srv), "http://127.0.0.1:8888");

        let neither = client_with(ClientOverrides::default());
        assert_eq!(neither.client_base_url_for(&srv), "/");
    }

    #[test]
    fn test_prefix_substitutes_server_port() {
        let srv = instance("127.0.0.1", 9000);
        let client = client_with(ClientOverrides {
            host: None,
            port: None,
            prefix: Some("/proxy/{port}".to_string()),
        });
        // Relative base plus prefix collapses to a single leading slash.
        assert_eq!(client.client_base_url_for(&srv), "/proxy/9000");
    }

    #[test]
    fn test_filename_is_percent_encoded() {
        let client = client_with(ClientOverrides::default());
        let url = client.append_filename("http://127.0.0.1:9000/api/metadata".to_string());
        assert_eq!(
            url,
            "http://127.0.0.1:9000/api/metadata?filename=demo%20file.tif"
        );
        let with_query = client.append_filename("x?grid=true".to_string());
        assert_eq!(with_query, "x?grid=true&filename=demo%20file.tif");
    }
}
