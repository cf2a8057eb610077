use clap::Parser;
use serde_json::json;
use std::error::Error;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use toolrelay_core::AppConfig;
use toolrelay_core::agent::{CycleOutcome, Orchestrator};
use toolrelay_core::config::ensure_env_loaded;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(
    name = "toolrelay",
    version,
    about = "Answer one query with a chat model and the tools of an MCP stdio server"
)]
struct Cli {
    /// Peer entry point; `.py` scripts are launched with `python`.
    #[arg(long)]
    server: Option<PathBuf>,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the configured model name.
    #[arg(long)]
    model: Option<String>,
    prompt: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn Error>> {
    init_tracing();
    let cli = Cli::parse();
    debug!(server = ?cli.server, config = ?cli.config, model = ?cli.model, "CLI arguments parsed");

    ensure_env_loaded();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    match &cli.config {
        Some(path) => info!(path = %path.display(), "Loaded configuration from file"),
        None => info!("Loaded configuration using default path or defaults"),
    }
    apply_cli_overrides(&cli, &mut config);

    let query = load_prompt(&cli)?;
    let orchestrator = Orchestrator::from_config(&config)?;

    match orchestrator.run(&query).await {
        Ok(outcome) => {
            println!("{}", serde_json::to_string_pretty(&render(&outcome))?);
            info!("Client execution finished");
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("{}", err.user_message());
            Ok(ExitCode::FAILURE)
        }
    }
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_level(true)
            .with_writer(io::stderr)
            .init();
    });
}

fn apply_cli_overrides(cli: &Cli, config: &mut AppConfig) {
    if let Some(path) = &cli.server {
        info!(path = %path.display(), "Overriding server entry point based on CLI flag");
        config.server = config.server.clone().with_entry_point(path);
    }
    if let Some(model) = &cli.model {
        info!(model = model.as_str(), "Overriding model based on CLI flag");
        config.model.name = model.clone();
    }
}

fn load_prompt(cli: &Cli) -> Result<String, Box<dyn Error>> {
    if !cli.prompt.is_empty() {
        info!("Using prompt provided through CLI arguments");
        return Ok(normalize_prompt(cli.prompt.join(" ")));
    }

    if !io::stdin().is_terminal() {
        info!("Reading prompt from standard input");
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        let prompt = normalize_prompt(buffer);
        if !prompt.is_empty() {
            return Ok(prompt);
        }
    }

    warn!("Prompt not provided via arguments or stdin");
    Err("prompt required via arguments or stdin".into())
}

fn normalize_prompt(prompt: String) -> String {
    prompt.trim().to_string()
}

fn render(outcome: &CycleOutcome) -> serde_json::Value {
    json!({
        "answer": outcome.answer(),
        "used_tools": outcome.used_tools(),
        "tool_results": outcome.tool_results(),
    })
}
