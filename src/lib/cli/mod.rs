use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "agent-mcp",
    version,
    about = "Tool-calling agent over MCP servers and configurable model providers"
)]
pub struct Cli {
    /// Path to client.toml (defaults to config/client.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Provider id overriding `default_provider`
    #[arg(long)]
    pub provider: Option<String>,
    /// Model overriding `model`
    #[arg(long)]
    pub model: Option<String>,
    /// System prompt overriding `system_prompt`
    #[arg(long)]
    pub system: Option<String>,
    /// Print the answer as it is generated
    #[arg(long)]
    pub stream: bool,
    /// Append the plain-text tool listing to the system prompt
    #[arg(long)]
    pub describe_tools: bool,
    /// Prompt words; read from stdin when empty
    pub prompt: Vec<String>,
}
