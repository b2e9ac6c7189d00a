//! Process configuration from CLI flags and environment.
//!
//! The `LOCALTILESERVER_*` variables are honored only when set to a
//! non-empty value, so exporting an empty string behaves the same as
//! leaving the variable unset.

/// Host that launched server instances bind by default.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Options shared by every request handler.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    /// Source served when a request omits `filename`.
    pub default_filename: Option<String>,
    /// Verbose per-request logging.
    pub debug: bool,
    /// Allow cross-origin requests on every endpoint.
    pub cors: bool,
}

/// Client-facing URL overrides for proxied or containerized deployments
/// where the address a browser reaches differs from the bind address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// URL path prefix; may contain a `{port}` placeholder that is
    /// substituted with the bound server port.
    pub prefix: Option<String>,
}

impl ClientOverrides {
    /// Read the `LOCALTILESERVER_CLIENT_*` overrides from the environment.
    pub fn from_env() -> Self {
        Self {
            host: env_nonempty("LOCALTILESERVER_CLIENT_HOST"),
            port: env_nonempty("LOCALTILESERVER_CLIENT_PORT").and_then(|v| v.parse().ok()),
            prefix: env_nonempty("LOCALTILESERVER_CLIENT_PREFIX"),
        }
    }

    /// Fill unset fields from the environment, keeping explicit values.
    pub fn or_env(self) -> Self {
        let env = Self::from_env();
        Self {
            host: self.host.or(env.host),
            port: self.port.or(env.port),
            prefix: self.prefix.or(env.prefix),
        }
    }

    /// Whether no override is set at all.
    pub fn is_empty(&self) -> bool {
        self.host.is_none() && self.port.is_none() && self.prefix.is_none()
    }
}

/// Read an environment variable, treating empty values as unset.
pub fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Default port for launched server instances.
///
/// Zero asks the OS for an ephemeral port.
pub fn default_port() -> u16 {
    env_nonempty("LOCALTILESERVER_PORT")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Default listen address for the standalone binary.
pub fn default_listen() -> String {
    let host = env_nonempty("LOCALTILESERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
    let port = match default_port() {
        0 => 8080,
        p => p,
    };
    format!("{}:{}", host, port)
}

/// Whether verbose logging was requested through the environment.
pub fn debug_enabled() -> bool {
    env_nonempty("LOCALTILESERVER_DEBUG")
        .as_deref()
        .and_then(parse_bool)
        .unwrap_or(false)
}

/// Parse the boolean spellings accepted in query strings and env vars.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "y" | "yes" | "t" | "true" | "on" | "1" => Some(true),
        "n" | "no" | "f" | "false" | "off" | "0" => Some(false),
        _ => None,
    }
}
