//! Tool provider (MCP server) configuration.
//!
//! A server is reached either through a spawned subprocess speaking
//! newline-delimited JSON-RPC on its stdio pipes, or through a persistent
//! SSE stream at a URL.
//!
//! ```toml
//! [[servers]]
//! name = "cost"
//! command = "uv"
//! args = ["run", "cost_estimation_tools.py"]
//! env = { PYTHONUNBUFFERED = "1" }
//!
//! [[servers]]
//! name = "archi"
//! url = "http://127.0.0.1:8000/sse"
//! ```

use super::error::ConfigError;
use crate::constants::TOOL_NAME_DELIMITER;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;

/// Connection mechanism to a tool provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Pipe,
    Stream,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Pipe => "stdio",
            TransportKind::Stream => "sse",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stdio" | "pipe" => Some(TransportKind::Pipe),
            "sse" | "stream" => Some(TransportKind::Stream),
            _ => None,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    Pipe {
        command: PathBuf,
        args: Vec<String>,
        env: HashMap<String, String>,
        workdir: Option<PathBuf>,
    },
    Stream {
        url: String,
    },
}

impl TransportConfig {
    pub fn kind(&self) -> TransportKind {
        match self {
            TransportConfig::Pipe { .. } => TransportKind::Pipe,
            TransportConfig::Stream { .. } => TransportKind::Stream,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub name: String,
    pub transport: TransportConfig,
}

impl ServerConfig {
    pub fn pipe(name: impl Into<String>, command: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportConfig::Pipe {
                command: command.into(),
                args,
                env: HashMap::new(),
                workdir: None,
            },
        }
    }

    pub fn stream(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportConfig::Stream { url: url.into() },
        }
    }

    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RawServer {
    #[serde(default)]
    name: String,
    #[serde(default)]
    transport: Option<String>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    #[serde(default)]
    workdir: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// `{"mcpServers": {"name": {...}}}` file layout.
#[derive(Debug, Deserialize)]
pub(crate) struct RawMcpServerFile {
    #[serde(rename = "mcpServers", default)]
    servers: BTreeMap<String, RawServer>,
}

impl RawMcpServerFile {
    pub(crate) fn into_servers(self) -> Vec<RawServer> {
        self.servers
            .into_iter()
            .map(|(name, mut raw)| {
                raw.name = name;
                raw
            })
            .collect()
    }
}

impl TryFrom<RawServer> for ServerConfig {
    type Error = ConfigError;

    fn try_from(raw: RawServer) -> Result<Self, Self::Error> {
        if raw.name.trim().is_empty() {
            return Err(ConfigError::MissingServerName);
        }
        if raw.name.contains(TOOL_NAME_DELIMITER) {
            return Err(ConfigError::ReservedDelimiter {
                server: raw.name,
                delimiter: TOOL_NAME_DELIMITER,
            });
        }

        let expand = |s: &str| -> String {
            shellexpand::full(s)
                .map(|cow| cow.into_owned())
                .unwrap_or_else(|_| s.to_string())
        };

        let transport = match (raw.command, raw.url) {
            (Some(command), None) => TransportConfig::Pipe {
                command: PathBuf::from(expand(&command)),
                args: raw.args.iter().map(|arg| expand(arg)).collect(),
                env: raw.env,
                workdir: raw.workdir.map(|d| PathBuf::from(expand(&d))),
            },
            (None, Some(url)) => TransportConfig::Stream { url: expand(&url) },
            _ => return Err(ConfigError::AmbiguousTransport { server: raw.name }),
        };

        if let Some(declared) = raw.transport.as_deref() {
            if TransportKind::parse(declared) != Some(transport.kind()) {
                return Err(ConfigError::TransportMismatch {
                    server: raw.name,
                    declared: declared.to_string(),
                    actual: transport.kind().to_string(),
                });
            }
        }

        Ok(Self {
            name: raw.name,
            transport,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn expands_env_vars_in_command_and_args() {
        unsafe {
            env::set_var("TEST_MCP_ROOT", "/path/to/mcp");
            env::set_var("TEST_ARG", "example-arg");
        }

        let raw = RawServer {
            name: "planning".to_string(),
            command: Some("${TEST_MCP_ROOT}/server".to_string()),
            args: vec!["--flag".to_string(), "${TEST_ARG}".to_string()],
            workdir: Some("${TEST_MCP_ROOT}/work".to_string()),
            ..RawServer::default()
        };

        let config = ServerConfig::try_from(raw).expect("valid server");
        let TransportConfig::Pipe {
            command,
            args,
            workdir,
            ..
        } = config.transport
        else {
            panic!("expected pipe transport");
        };

        let cmd = command.to_str().expect("valid utf8");
        assert!(cmd.contains("/path/to/mcp/server") || cmd.contains("\\path\\to\\mcp\\server"));
        assert!(args.contains(&"example-arg".to_string()));
        let workdir = workdir.expect("workdir exists");
        assert!(workdir.to_string_lossy().contains("mcp"));

        unsafe {
            env::remove_var("TEST_MCP_ROOT");
            env::remove_var("TEST_ARG");
        }
    }

    #[test]
    fn url_selects_stream_transport() {
        let raw = RawServer {
            name: "archi".into(),
            url: Some("http://127.0.0.1:8000/sse".into()),
            transport: Some("SSE".into()),
            ..RawServer::default()
        };
        let config = ServerConfig::try_from(raw).expect("valid server");
        assert_eq!(config.kind(), TransportKind::Stream);
    }

    #[test]
    fn rejects_both_command_and_url() {
        let raw = RawServer {
            name: "archi".into(),
            command: Some("python".into()),
            url: Some("http://127.0.0.1:8000/sse".into()),
            ..RawServer::default()
        };
        assert!(matches!(
            ServerConfig::try_from(raw),
            Err(ConfigError::AmbiguousTransport { .. })
        ));
    }

    #[test]
    fn rejects_declared_transport_that_disagrees() {
        let raw = RawServer {
            name: "archi".into(),
            command: Some("python".into()),
            transport: Some("sse".into()),
            ..RawServer::default()
        };
        assert!(matches!(
            ServerConfig::try_from(raw),
            Err(ConfigError::TransportMismatch { .. })
        ));
    }

    #[test]
    fn rejects_delimiter_in_server_name() {
        let raw = RawServer {
            name: "cost_tools".into(),
            command: Some("python".into()),
            ..RawServer::default()
        };
        assert!(matches!(
            ServerConfig::try_from(raw),
            Err(ConfigError::ReservedDelimiter { .. })
        ));
    }

    #[test]
    fn rejects_blank_server_name() {
        for name in ["", "  "] {
            let raw = RawServer {
                name: name.into(),
                url: Some("http://localhost:8000/sse".into()),
                ..RawServer::default()
            };
            assert!(matches!(
                ServerConfig::try_from(raw),
                Err(ConfigError::MissingServerName)
            ));
        }
    }

    #[test]
    fn mcp_server_file_names_entries_by_key() {
        let parsed: RawMcpServerFile = serde_json::from_str(
            r#"{"mcpServers": {
                "planning": {"command": "uv", "args": ["run", "planning_tools.py"]},
                "archi": {"url": "http://127.0.0.1:8000/sse"}
            }}"#,
        )
        .expect("parse");
        let servers: Vec<ServerConfig> = parsed
            .into_servers()
            .into_iter()
            .map(ServerConfig::try_from)
            .collect::<Result<_, _>>()
            .expect("valid servers");
        assert_eq!(servers[0].name, "archi");
        assert_eq!(servers[0].kind(), TransportKind::Stream);
        assert_eq!(servers[1].name, "planning");
        assert_eq!(servers[1].kind(), TransportKind::Pipe);
    }
}
