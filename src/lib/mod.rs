pub mod application;
pub mod cli;
pub mod config;
pub mod constants;
pub mod domain;
pub mod infrastructure;

pub use application::{agent, tooling};
pub use cli::Cli;
pub use config::{AppConfig, ModelProviderConfig};
pub use domain::types;
pub use infrastructure::model;

use agent::{Agent, AgentOptions};
use model::{GenerationDispatcher, ModelConfig};
use std::error::Error;
use std::io::{self, IsTerminal, Read, Write};
use std::sync::Arc;
use tooling::{RetryPolicy, SessionRegistry, ToolCallRouter, ToolInvoker};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

pub async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    init_tracing();
    info!("Starting agent-mcp");
    debug!(
        config = ?cli.config,
        provider = ?cli.provider,
        model = ?cli.model,
        stream = cli.stream,
        "CLI arguments parsed"
    );

    let prompt = load_prompt(&cli)?;
    let file_config = AppConfig::load(cli.config.as_deref())?;
    match &cli.config {
        Some(path) => info!(path = %path.display(), "Loaded configuration from file"),
        None => info!("Loaded configuration from default path"),
    }

    let hook = match file_config.result_hook.as_deref() {
        Some(name) => match tooling::builtin_hook(name) {
            Some(hook) => {
                info!(hook = name, "Tool result hook enabled");
                Some(hook)
            }
            None => {
                error!(hook = name, known = ?tooling::BUILTIN_HOOKS, "Unknown tool result hook");
                return Err(format!("unknown result_hook '{name}'").into());
            }
        },
        None => None,
    };

    let dispatcher = Arc::new(GenerationDispatcher::from_configs(&file_config.providers));
    let registry = Arc::new(SessionRegistry::from_config(
        &file_config.servers,
        file_config.tooling,
    ));
    for (server, err) in registry.start_all().await {
        warn!(server = %server, %err, "tool server unavailable; it will be retried on first use");
    }

    let mut router = ToolCallRouter::new(
        registry.clone(),
        ToolInvoker::new(RetryPolicy::from(&file_config.tooling)),
    );
    if let Some(hook) = hook {
        router = router.with_hook(hook);
    }
    let mut agent = Agent::new(
        dispatcher,
        Arc::new(router),
        ModelConfig::new(file_config.default_provider.clone(), file_config.model.clone()),
    );
    let stream = cli.stream || file_config.stream;
    if stream {
        agent = agent.with_text_observer(Arc::new(|text: &str| {
            let mut stdout = io::stdout().lock();
            let _ = stdout.write_all(text.as_bytes());
            let _ = stdout.flush();
        }));
    }

    let options = AgentOptions {
        provider: cli.provider.clone(),
        model: cli.model.clone(),
        system_prompt: cli.system.clone().or(file_config.system_prompt.clone()),
        stream,
        describe_tools: cli.describe_tools,
        max_turns: file_config.max_turns,
    };
    let result = agent.run(prompt, options).await;
    registry.shutdown().await;

    match result {
        Ok(outcome) => {
            if stream {
                println!();
            } else {
                println!("{}", outcome.response);
            }
            info!(
                turns = outcome.turns,
                tool_calls = outcome.steps.len(),
                "Client execution finished"
            );
            Ok(())
        }
        Err(err) => {
            error!(%err, "Agent run failed");
            eprintln!("{}", err.user_message());
            Err(err.into())
        }
    }
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .with_target(false)
            .with_level(true)
            .init();
    });
}

fn load_prompt(cli: &Cli) -> Result<String, Box<dyn Error>> {
    if !cli.prompt.is_empty() {
        return Ok(cli.prompt.join(" ").trim().to_string());
    }
    if !io::stdin().is_terminal() {
        info!("Reading prompt from standard input");
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        let prompt = buffer.trim().to_string();
        if !prompt.is_empty() {
            return Ok(prompt);
        }
    }
    Err("prompt required via arguments or stdin".into())
}
