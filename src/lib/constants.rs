//! Application constants
//!
//! Single source of truth for paths and other constants.

/// Default configuration file path
pub const CONFIG_PATH: &str = "config/client.toml";

/// Default environment file path
pub const ENV_PATH: &str = "config/.env";

/// Separator between provider and tool in compound function names.
/// Provider and tool names must not contain it.
pub const TOOL_NAME_DELIMITER: char = '_';

/// MCP protocol revision announced during the initialize handshake.
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Default Anthropic messages API path
pub const DEFAULT_ANTHROPIC_API_PATH: &str = "/v1/messages";

/// Default OpenAI-compatible chat completions path
pub const DEFAULT_OPENAI_API_PATH: &str = "/v1/chat/completions";
