// Config loading tests - AppConfig::load parsing, merging and validation

use agent_mcp_client::config::{AppConfig, ConfigError, TransportConfig, TransportKind};
use agent_mcp_client::model::factory::resolve_api_key;
use serial_test::serial;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::tempdir;

const PROVIDERS: &str = r#"
[[providers]]
id = "ollama"
endpoint = "http://127.0.0.1:11434"
models = ["llama3"]
"#;

fn write_config(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("client.toml");
    fs::write(&path, content).expect("Failed to write config");
    path
}

#[test]
fn returns_error_when_file_not_found() {
    let result = AppConfig::load(Some(Path::new("/nonexistent/path/client.toml")));
    assert!(matches!(result, Err(ConfigError::NotFound { .. })));
}

#[test]
fn returns_error_when_model_missing() {
    let dir = tempdir().expect("tempdir");
    let path = write_config(
        dir.path(),
        &format!("default_provider = \"ollama\"\n{PROVIDERS}"),
    );
    assert!(matches!(AppConfig::load(Some(&path)), Err(ConfigError::MissingModel)));
}

#[test]
fn returns_error_when_default_provider_unknown() {
    let dir = tempdir().expect("tempdir");
    let path = write_config(
        dir.path(),
        &format!("model = \"llama3\"\ndefault_provider = \"openai\"\n{PROVIDERS}"),
    );
    assert!(matches!(
        AppConfig::load(Some(&path)),
        Err(ConfigError::ProviderNotFound { provider }) if provider == "openai"
    ));
}

#[test]
fn loads_pipe_and_stream_servers_with_tooling_policy() {
    let dir = tempdir().expect("tempdir");
    let path = write_config(
        dir.path(),
        &format!(
            r#"
model = "llama3"
default_provider = "ollama"
stream = true
max_turns = 0
result_hook = " json "

[tooling]
attempts = 3
delay_ms = 250

[[servers]]
name = "cost"
command = "cost-server"
args = ["--stdio"]

[[servers]]
name = "archi"
url = "http://127.0.0.1:8931/sse"
{PROVIDERS}"#
        ),
    );

    let config = AppConfig::load(Some(&path)).expect("valid config");
    assert!(config.stream);
    assert_eq!(config.max_turns, 1);
    assert_eq!(config.result_hook.as_deref(), Some("json"));
    assert_eq!(config.tooling.attempts, 3);
    assert_eq!(config.tooling.delay, Duration::from_millis(250));
    assert_eq!(config.tooling.call_timeout, Duration::from_secs(6));

    let kinds: Vec<_> = config.servers.iter().map(|s| (s.name.as_str(), s.kind())).collect();
    assert_eq!(
        kinds,
        vec![("cost", TransportKind::Pipe), ("archi", TransportKind::Stream)]
    );
    match &config.servers[0].transport {
        TransportConfig::Pipe { args, .. } => assert_eq!(args, &vec!["--stdio".to_string()]),
        other => panic!("unexpected transport {other:?}"),
    }
}

#[test]
fn merges_mcp_server_file_relative_to_config() {
    let dir = tempdir().expect("tempdir");
    fs::write(
        dir.path().join("servers.json"),
        r#"{"mcpServers": {"archi": {"url": "http://127.0.0.1:8931/sse"}}}"#,
    )
    .expect("write servers file");
    let path = write_config(
        dir.path(),
        &format!(
            "model = \"llama3\"\ndefault_provider = \"ollama\"\nmcp_config = \"servers.json\"\n{PROVIDERS}"
        ),
    );

    let config = AppConfig::load(Some(&path)).expect("valid config");
    assert_eq!(config.servers.len(), 1);
    assert_eq!(config.servers[0].name, "archi");
    assert_eq!(config.servers[0].kind(), TransportKind::Stream);
}

#[test]
fn rejects_duplicate_server_names_across_files() {
    let dir = tempdir().expect("tempdir");
    fs::write(
        dir.path().join("servers.json"),
        r#"{"mcpServers": {"cost": {"command": "other-cost"}}}"#,
    )
    .expect("write servers file");
    let path = write_config(
        dir.path(),
        &format!(
            r#"
model = "llama3"
default_provider = "ollama"
mcp_config = "servers.json"

[[servers]]
name = "cost"
command = "cost-server"
{PROVIDERS}"#
        ),
    );

    assert!(matches!(
        AppConfig::load(Some(&path)),
        Err(ConfigError::DuplicateServer { server }) if server == "cost"
    ));
}

#[test]
fn rejects_server_names_with_delimiter() {
    let dir = tempdir().expect("tempdir");
    let path = write_config(
        dir.path(),
        &format!(
            r#"
model = "llama3"
default_provider = "ollama"

[[servers]]
name = "cost_v2"
command = "cost-server"
{PROVIDERS}"#
        ),
    );

    assert!(matches!(
        AppConfig::load(Some(&path)),
        Err(ConfigError::ReservedDelimiter { .. })
    ));
}

#[test]
fn rejects_server_without_name() {
    let dir = tempdir().expect("tempdir");
    let path = write_config(
        dir.path(),
        &format!(
            r#"
model = "llama3"
default_provider = "ollama"

[[servers]]
url = "http://127.0.0.1:8931/sse"
{PROVIDERS}"#
        ),
    );

    assert!(matches!(
        AppConfig::load(Some(&path)),
        Err(ConfigError::MissingServerName)
    ));
}

#[test]
#[serial]
fn api_key_is_read_from_the_named_environment_variable() {
    // SAFETY: serialized with every other environment-mutating test
    unsafe { std::env::set_var("AGENT_MCP_TEST_KEY", "sk-test") };
    assert_eq!(
        resolve_api_key("openai", Some("AGENT_MCP_TEST_KEY")).as_deref(),
        Some("sk-test")
    );
    unsafe { std::env::remove_var("AGENT_MCP_TEST_KEY") };
    assert_eq!(resolve_api_key("openai", Some("AGENT_MCP_TEST_KEY")), None);
}
