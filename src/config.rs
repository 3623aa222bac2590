use crate::proxy::types::{
    ClientBufferChunks, ProxyConfig, StorageRoot, DEFAULT_ARCHIVE_ROOT, DEFAULT_BIND,
    DEFAULT_CLIENT_BUFFER_CHUNKS, DEFAULT_CLIENT_ROOT, DEFAULT_REQUEST_TIMEOUT_SECS,
};
use crate::storage::StorageLayout;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::time::Duration;

pub use config::ConfigError;

/// Prefix of environment variables that override settings
pub const ENV_PREFIX: &str = "TAPWIRE";

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub proxy: ProxySettings,
    pub hooks: HookSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    pub archive_root: StorageRoot,
    pub client_root: StorageRoot,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProxySettings {
    pub request_timeout_secs: u64,
    pub client_buffer_chunks: ClientBufferChunks,
}

/// Which built-in hooks are registered
#[derive(Debug, Deserialize, Clone)]
pub struct HookSettings {
    pub archive_bodies: bool,
    pub archive_heads: bool,
    pub capture_clients: bool,
    pub access_log: bool,
    pub strip_response_headers: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Settings {
    /// Defaults, then `config/default`, `config/{ENVIRONMENT}`, `config/local`,
    /// then `TAPWIRE__*` environment variables.
    pub fn new() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        Self::defaults_builder()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{environment}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(environment_source(None))
            .build()?
            .try_deserialize()
    }

    /// Built-in defaults only
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::defaults_builder()?.build()?.try_deserialize()
    }

    /// Defaults overridden by the given variables instead of the process environment
    pub fn from_env_map(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::defaults_builder()?
            .add_source(environment_source(Some(vars)))
            .build()?
            .try_deserialize()
    }

    fn defaults_builder() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.bind", DEFAULT_BIND)?
            .set_default("storage.archive_root", DEFAULT_ARCHIVE_ROOT)?
            .set_default("storage.client_root", DEFAULT_CLIENT_ROOT)?
            .set_default("proxy.request_timeout_secs", DEFAULT_REQUEST_TIMEOUT_SECS)?
            .set_default("proxy.client_buffer_chunks", DEFAULT_CLIENT_BUFFER_CHUNKS as u64)?
            .set_default("hooks.archive_bodies", true)?
            .set_default("hooks.archive_heads", true)?
            .set_default("hooks.capture_clients", true)?
            .set_default("hooks.access_log", true)?
            .set_default("hooks.strip_response_headers", Vec::<String>::new())?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")
    }

    pub fn proxy_config(&self) -> ProxyConfig {
        ProxyConfig {
            request_timeout: Duration::from_secs(self.proxy.request_timeout_secs),
            client_buffer_chunks: self.proxy.client_buffer_chunks,
        }
    }

    pub fn storage_layout(&self) -> StorageLayout {
        StorageLayout::new(&self.storage.archive_root, &self.storage.client_root)
    }
}

fn environment_source(vars: Option<HashMap<String, String>>) -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("hooks.strip_response_headers")
        .source(vars)
}
