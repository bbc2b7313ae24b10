//! CLI argument model for the `letta-relay` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::types::ToolResult;

/// Letta relay CLI
#[derive(Parser, Debug)]
#[command(name = "letta-relay", version, about = "Stream a Letta agent turn as chat events")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send one turn and print its events as JSON lines
    Chat(ChatArgs),
}

/// Arguments for the `chat` subcommand.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Context source, repeatable (format: ID=CONTENT)
    #[arg(short, long = "source", value_parser = parse_source)]
    pub sources: Vec<ToolResult>,

    /// Instruction appended after the context block
    #[arg(short, long)]
    pub instruction: Option<String>,

    /// Config file (defaults to the user config dir, then the environment)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Agent id, overriding the configured one
    #[arg(short, long)]
    pub agent: Option<String>,

    /// Conversation id (a fresh one is generated if omitted)
    #[arg(long)]
    pub conversation_id: Option<String>,

    /// Emit chat_start once the turn is accepted
    #[arg(long)]
    pub announce_start: bool,

    /// User prompt (positional)
    pub prompt: String,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

fn parse_source(raw: &str) -> Result<ToolResult, String> {
    match raw.split_once('=') {
        Some((id, content)) if !id.is_empty() => Ok(ToolResult::new(id, content)),
        _ => Err(format!("expected ID=CONTENT, got '{raw}'")),
    }
}
