use super::CONFIG_PATH;
use super::defaults::DEFAULT_MAX_TURNS;
use super::error::ConfigError;
use super::provider::{ModelProviderConfig, RawProviderConfig};
use super::server::{RawMcpServerFile, RawServer, ServerConfig};
use super::tooling::{RawToolingConfig, ToolingConfig};
use crate::constants::ENV_PATH;
use dotenvy::from_filename;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tracing::debug;

static ENV_LOADER: Once = Once::new();

/// Raw configuration structure for deserialization from TOML
#[derive(Debug, Deserialize, Default)]
pub(super) struct RawConfig {
    pub model: Option<String>,
    pub default_provider: Option<String>,
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub stream: bool,
    pub max_turns: Option<usize>,
    pub result_hook: Option<String>,
    #[serde(default)]
    pub providers: Vec<RawProviderConfig>,
    #[serde(default)]
    pub servers: Vec<RawServer>,
    pub mcp_config: Option<String>,
    #[serde(default)]
    pub tooling: RawToolingConfig,
}

/// Ensures environment variables are loaded from config/.env
pub fn ensure_env_loaded() {
    ENV_LOADER.call_once(|| {
        let _ = from_filename(ENV_PATH);
    });
}

/// Load and validate configuration from a file path
pub fn load_config(path: Option<&Path>) -> Result<super::AppConfig, ConfigError> {
    ensure_env_loaded();
    let config_path = path.unwrap_or_else(|| Path::new(CONFIG_PATH));
    read_config(config_path)
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

fn read_config(path: &Path) -> Result<super::AppConfig, ConfigError> {
    debug!(path = %path.display(), "Reading client configuration file");

    let content = read_file(path)?;
    let mut parsed: RawConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    if let Some(extra) = parsed.mcp_config.take() {
        let extra_path = resolve_relative(path, &extra);
        parsed.servers.extend(read_mcp_server_file(&extra_path)?);
    }

    validate_and_build(parsed)
}

/// Relative paths inside a config file are resolved against its directory.
fn resolve_relative(config_path: &Path, value: &str) -> PathBuf {
    let candidate = PathBuf::from(value);
    if candidate.is_absolute() {
        return candidate;
    }
    config_path
        .parent()
        .map(|dir| dir.join(&candidate))
        .unwrap_or(candidate)
}

fn read_mcp_server_file(path: &Path) -> Result<Vec<RawServer>, ConfigError> {
    debug!(path = %path.display(), "Reading MCP server definitions");
    let content = read_file(path)?;
    let parsed: RawMcpServerFile =
        serde_json::from_str(&content).map_err(|source| ConfigError::ParseJson {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(parsed.into_servers())
}

fn validate_and_build(parsed: RawConfig) -> Result<super::AppConfig, ConfigError> {
    let model = parsed.model.ok_or(ConfigError::MissingModel)?;
    let default_provider = parsed
        .default_provider
        .ok_or(ConfigError::MissingDefaultProvider)?;

    if parsed.providers.is_empty() {
        return Err(ConfigError::NoProvidersConfigured);
    }

    let mut providers: Vec<ModelProviderConfig> = Vec::new();
    for raw_provider in parsed.providers {
        if raw_provider.endpoint.is_none() {
            return Err(ConfigError::MissingEndpoint {
                provider: raw_provider.id.clone(),
            });
        }
        providers.push(ModelProviderConfig::from(raw_provider));
    }
    if !providers.iter().any(|p| p.id == default_provider) {
        return Err(ConfigError::ProviderNotFound {
            provider: default_provider,
        });
    }
    if let Some(provider) = providers.iter_mut().find(|p| p.id == default_provider) {
        provider.ensure_model(&model);
    }

    let mut seen = HashSet::new();
    let mut servers = Vec::with_capacity(parsed.servers.len());
    for raw_server in parsed.servers {
        let server = ServerConfig::try_from(raw_server)?;
        if !seen.insert(server.name.clone()) {
            return Err(ConfigError::DuplicateServer {
                server: server.name,
            });
        }
        servers.push(server);
    }

    Ok(super::AppConfig {
        default_provider,
        model,
        system_prompt: parsed.system_prompt,
        stream: parsed.stream,
        max_turns: parsed.max_turns.unwrap_or(DEFAULT_MAX_TURNS).max(1),
        result_hook: parsed
            .result_hook
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty()),
        providers,
        servers,
        tooling: ToolingConfig::from(parsed.tooling),
    })
}
