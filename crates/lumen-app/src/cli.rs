use clap::Parser;
use std::path::PathBuf;

/// Lumen: a privilege-separated AI assistant core with a terminal panel.
#[derive(Parser, Debug)]
#[command(name = "lumen", version, about)]
pub struct Cli {
    /// Workspace directory the host serves file operations from
    #[arg(short, long, default_value = ".")]
    pub workdir: PathBuf,

    /// Provider to start with (anthropic, openai, local)
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Model to start with
    #[arg(short, long)]
    pub model: Option<String>,

    /// Initial mode (ask, agent, plan, explain, refactor, generate)
    #[arg(long, default_value = "ask")]
    pub mode: String,

    /// Maximum tool turns per agent run
    #[arg(long)]
    pub max_turns: Option<u32>,

    /// Disable streaming; wait for complete responses
    #[arg(long)]
    pub no_stream: bool,

    /// Path to a config file (default: ~/.lumen/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print request/stream diagnostics
    #[arg(short, long)]
    pub verbose: bool,
}
