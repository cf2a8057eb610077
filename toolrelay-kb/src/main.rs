use clap::Parser;
use std::error::Error;
use std::io;
use std::path::PathBuf;
use toolrelay_kb::{McpServer, default_registry};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_KB_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/data/kb.json");

#[derive(Parser, Debug)]
#[command(
    name = "toolrelay-kb",
    version,
    about = "MCP stdio server exposing knowledge-base and welcome-message tools"
)]
struct Cli {
    /// JSON document with question/answer entries.
    #[arg(long, default_value = DEFAULT_KB_PATH)]
    kb: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let cli = Cli::parse();
    info!(kb = %cli.kb.display(), "Starting knowledge base server");

    let server = McpServer::new("Knowledge Base", default_registry(cli.kb)).with_instructions(
        "Use get_knowledge_base for company policy questions and \
         generate_welcome_message to greet users.",
    );
    server.serve(tokio::io::stdin(), tokio::io::stdout()).await?;
    Ok(())
}

// stdout carries the protocol, so logs go to stderr.
fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_level(true)
            .with_ansi(false)
            .with_writer(io::stderr)
            .init();
    });
}
