//! CLI module for DS-Router
//!
//! - `inspect`: show guard and routing decisions for a prompt
//! - `budget`: today's spend against the daily caps
//! - `config`: print the effective configuration

use clap::{Parser, Subcommand};

pub mod budget;
pub mod config;
pub mod inspect;

/// DS-Router operator CLI
#[derive(Parser, Debug)]
#[command(name = "dsrouter")]
#[command(about = "Confidence-based LLM routing pipeline")]
#[command(version)]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pre-guard and routing decision for a prompt (no provider calls)
    Inspect {
        /// User prompt
        prompt: String,
        /// Optional system prompt
        #[arg(long)]
        system: Option<String>,
        /// Knowledge-support score in [0, 1]
        #[arg(long, default_value_t = 1.0)]
        rag_score: f32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show today's budget usage
    Budget {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration as TOML
    Config,
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Inspect {
            prompt,
            system,
            rag_score,
            json,
        }) => inspect::run(&prompt, system.as_deref(), rag_score, json),
        Some(Commands::Budget { json }) => budget::run(json).await,
        Some(Commands::Config) => config::run(),
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}
