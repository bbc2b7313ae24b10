//! letta-relay CLI binary entry point.

use std::io::Write;
use std::sync::Arc;

use futures::StreamExt;
use letta_relay::cli::{ChatArgs, Cli, Commands};
use letta_relay::config::RelayConfig;
use letta_relay::context::TurnInvocation;
use letta_relay::relay::StreamRelay;
use letta_relay::transport::HttpAgentTransport;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse_args();

    let result = match cli.command {
        Commands::Chat(chat_args) => handle_chat(chat_args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    // Logs go to stderr; stdout carries only events.
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("letta_relay=warn"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .ok();
}

fn load_config(args: &ChatArgs) -> Result<RelayConfig, Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let file = args
        .config
        .clone()
        .or_else(|| RelayConfig::default_path().filter(|p| p.exists()));
    let base = match file {
        Some(path) => RelayConfig::load(&path)?,
        None => RelayConfig::default(),
    };
    let mut config = base.merge_env(|key| std::env::var(key).ok())?;
    if let Some(agent) = &args.agent {
        config.agent_id = agent.clone();
    }
    if args.announce_start {
        config.announce_start = true;
    }
    config.validate()?;
    Ok(config)
}

async fn handle_chat(args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(load_config(&args)?);
    let transport = Arc::new(HttpAgentTransport::new(Arc::clone(&config)));
    let relay = StreamRelay::new(transport, config);

    let mut invocation = TurnInvocation::new(args.prompt);
    invocation.sources = args.sources;
    invocation.instruction = args.instruction;
    invocation.conversation_id = args.conversation_id;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let mut events = relay.relay_invocation(invocation, cancel.clone());
    let mut stdout = std::io::stdout();
    let mut failed = false;
    while let Some(event) = events.next().await {
        failed = event.event_type == letta_relay::types::EventType::ChatError;
        writeln!(stdout, "{}", serde_json::to_string(&event)?)?;
        stdout.flush()?;
    }

    if cancel.is_cancelled() {
        eprintln!("Cancelled");
    }
    if failed {
        std::process::exit(2);
    }
    Ok(())
}
