// onionnet: run and drive a local three-hop onion routing network
//
// One binary plays every role: the node registry, relays, and users.

mod activity;
mod api;
mod config;
mod server;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use config::Config;
use onionnet_core::{Directory, NodeId};
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "onionnet")]
#[command(about = "OnionNet: three-hop onion routing over local HTTP", long_about = None)]
#[command(version)]
struct Cli {
    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the node registry
    Registry,
    /// Run relay `id` and register it
    Relay { id: NodeId },
    /// Run user node `id`
    User { id: u32 },
    /// Run a registry, relays and users in one process
    Launch {
        #[arg(short, long, default_value = "4")]
        relays: u32,
        #[arg(short, long, default_value = "2")]
        users: u32,
    },
    /// Ask user `from` to onion-route a message to user `to`
    Send { from: u32, to: u32, message: String },
    /// List the relays known to the registry
    Nodes,
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Set { key: String, value: String },
    Get { key: String },
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let _log_guard = init_tracing(&config)?;

    match cli.command {
        Commands::Registry => cmd_registry(config).await,
        Commands::Relay { id } => cmd_relay(config, id).await,
        Commands::User { id } => cmd_user(config, id).await,
        Commands::Launch { relays, users } => cmd_launch(config, relays, users).await,
        Commands::Send { from, to, message } => cmd_send(config, from, to, message).await,
        Commands::Nodes => cmd_nodes(config).await,
        Commands::Config { action } => cmd_config(config, action),
    }
}

/// stderr always; a daily-rotated file as well when `log_dir` is set
fn init_tracing(config: &Config) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .context("Invalid log filter")?;
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "onionnet.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            Ok(None)
        }
    }
}

/// Block until Ctrl-C, or fail if any server task exits first
async fn run_until_shutdown(handles: Vec<JoinHandle<()>>) -> Result<()> {
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            println!();
            println!("{} Shutting down", "✓".green());
            Ok(())
        }
        (result, index, _) = futures::future::select_all(handles) => {
            result.context("Server task panicked")?;
            anyhow::bail!("Server {} stopped unexpectedly", index)
        }
    }
}

async fn cmd_registry(config: Config) -> Result<()> {
    let handle = server::start_registry(&config).await?;
    println!(
        "{} Registry listening on {}",
        "✓".green(),
        config.registry_url().bright_cyan()
    );
    run_until_shutdown(vec![handle]).await
}

async fn cmd_relay(config: Config, id: NodeId) -> Result<()> {
    let (ctx, handle) = server::start_relay(&config, id).await?;
    println!(
        "{} Relay {} listening on {}",
        "✓".green(),
        id,
        config.url_for_port(config.relay_port(id)?).bright_cyan()
    );
    println!(
        "  Public Key: {}",
        hex::encode(ctx.relay.keys().public_key_bytes()).bright_yellow()
    );
    run_until_shutdown(vec![handle]).await
}

async fn cmd_user(config: Config, id: u32) -> Result<()> {
    let (_ctx, handle) = server::start_user(&config, id).await?;
    println!(
        "{} User {} listening on {}",
        "✓".green(),
        id,
        config.url_for_port(config.user_port(id)?).bright_cyan()
    );
    run_until_shutdown(vec![handle]).await
}

async fn cmd_launch(config: Config, relays: u32, users: u32) -> Result<()> {
    println!("{}", "Launching OnionNet...".bold());
    println!();

    let mut handles = vec![server::start_registry(&config).await?];
    println!("  {} Registry  {}", "✓".green(), config.registry_url());

    let started_relays =
        futures::future::try_join_all((1..=relays).map(|id| server::start_relay(&config, id)))
            .await?;
    for (ctx, handle) in started_relays {
        println!(
            "  {} Relay {:<4} {}",
            "✓".green(),
            ctx.relay.node_id(),
            config.url_for_port(config.relay_port(ctx.relay.node_id())?)
        );
        handles.push(handle);
    }

    let started_users =
        futures::future::try_join_all((0..users).map(|id| server::start_user(&config, id)))
            .await?;
    for (ctx, handle) in started_users {
        println!(
            "  {} User {:<5} {}",
            "✓".green(),
            ctx.user_id,
            config.url_for_port(config.user_port(ctx.user_id)?)
        );
        handles.push(handle);
    }

    println!();
    if users >= 2 {
        println!(
            "Try: {}",
            "onionnet send 0 1 \"hello\"".bright_green()
        );
    }
    println!("Press Ctrl-C to stop.");

    run_until_shutdown(handles).await
}

async fn cmd_send(config: Config, from: u32, to: u32, message: String) -> Result<()> {
    let user_url = config.url_for_port(config.user_port(from)?);
    api::send_message_via_user(&user_url, to, &message).await?;
    println!(
        "{} User {} sent {} bytes to user {}",
        "✓".green(),
        from,
        message.len(),
        to
    );
    Ok(())
}

async fn cmd_nodes(config: Config) -> Result<()> {
    let nodes = api::RegistryClient::new(config.registry_url())
        .list_nodes()
        .await
        .context("Failed to fetch node registry")?;

    println!("{}", "Registered Relays".bold());
    println!();
    if nodes.is_empty() {
        println!("  {}", "(none registered)".dimmed());
    }
    for node in &nodes {
        println!(
            "  {:<6} {:<8} {}",
            node.node_id.to_string().bright_cyan(),
            node.address,
            hex::encode(node.public_key).bright_yellow()
        );
    }
    Ok(())
}

fn cmd_config(mut config: Config, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            println!("{} Set {} = {}", "✓".green(), key.bright_cyan(), value);
        }

        ConfigAction::Get { key } => {
            if let Some(value) = config.get(&key) {
                println!("{} = {}", key.bright_cyan(), value);
            } else {
                anyhow::bail!("Unknown config key: {}", key);
            }
        }

        ConfigAction::List => {
            println!("{}", "Configuration".bold());
            println!();
            for (key, value) in config.list() {
                println!("  {:<20} {}", key.bright_cyan(), value);
            }
        }
    }

    Ok(())
}
