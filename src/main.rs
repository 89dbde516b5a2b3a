#![allow(missing_docs)]

//! smsrelay — SMS dispatch daemon and one-shot CLI.
//!
//! `start` runs the periodic dispatch scheduler; the remaining subcommands
//! are thin one-shot wrappers over the library API.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use smsrelay::config::Config;
use smsrelay::credentials;
use smsrelay::engine::Dispatcher;
use smsrelay::logging;
use smsrelay::providers::registry::ProviderRegistry;
use smsrelay::scheduler;
use smsrelay::store::{contacts, MessageStore};

#[derive(Parser)]
#[command(name = "smsrelay", version, about = "SMS dispatch with pluggable providers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the dispatch daemon (periodic drain of due messages).
    Start,
    /// Send a message immediately.
    Send {
        /// Provider name (e.g. twilio, plivo).
        #[arg(long)]
        provider: String,
        /// Recipient address.
        #[arg(long)]
        to: String,
        /// Message body text.
        #[arg(long)]
        body: String,
    },
    /// Schedule a message for deferred delivery.
    Schedule {
        /// Provider name (e.g. twilio, plivo).
        #[arg(long)]
        provider: String,
        /// Recipient address.
        #[arg(long)]
        to: String,
        /// Message body text.
        #[arg(long)]
        body: String,
        /// Delivery time, RFC 3339 (e.g. 2026-09-01T10:00:00Z).
        #[arg(long)]
        at: String,
    },
    /// Query a provider's account balance.
    Balance {
        /// Provider name.
        #[arg(long)]
        provider: String,
    },
    /// Query delivery status for a sent message.
    Status {
        /// Provider name.
        #[arg(long)]
        provider: String,
        /// Provider-assigned message identifier.
        #[arg(long)]
        message_id: String,
    },
    /// Contact directory operations.
    Contact {
        #[command(subcommand)]
        command: ContactCommand,
    },
}

#[derive(Subcommand)]
enum ContactCommand {
    /// Add a contact.
    Add {
        /// Display name.
        #[arg(long)]
        name: String,
        /// Phone number (unique).
        #[arg(long)]
        phone: String,
        /// Optional email address.
        #[arg(long)]
        email: Option<String>,
        /// Optional group label.
        #[arg(long)]
        group: Option<String>,
    },
    /// List contacts.
    List {
        /// Only contacts in this group.
        #[arg(long)]
        group: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Start => run_daemon().await,
        command => {
            logging::init_cli();
            run_command(command).await
        }
    }
}

/// Load config with precedence: process env > `.env` credentials > file > defaults.
fn load_config() -> Result<Config> {
    let creds = credentials::load_credentials(Path::new(".env")).ok();
    Config::load_with(|key| {
        std::env::var(key).ok().or_else(|| {
            creds
                .as_ref()
                .and_then(|c| c.get(key))
                .map(str::to_owned)
        })
    })
}

async fn build_dispatcher(config: &Config) -> Result<Dispatcher> {
    let registry = Arc::new(ProviderRegistry::from_config(&config.providers));
    let store = MessageStore::open(Path::new(&config.database.path))
        .await
        .context("failed to open message store")?;
    Ok(Dispatcher::new(registry, store))
}

async fn run_daemon() -> Result<()> {
    let config = load_config().context("failed to load configuration")?;
    let _logging_guard = logging::init_daemon(Path::new(&config.logs_dir))?;

    info!("smsrelay starting");

    let dispatcher = build_dispatcher(&config).await?;
    if dispatcher.registry().is_empty() {
        anyhow::bail!("no providers configured; add [providers.*] to config.toml or set SMSRELAY_* env vars");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_handle = tokio::spawn(scheduler::run_scheduler(
        dispatcher,
        config.scheduler.interval_secs,
        shutdown_rx,
    ));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    let _ = shutdown_tx.send(true);
    scheduler_handle.await.context("scheduler task panicked")?;

    info!("smsrelay stopped");
    Ok(())
}

async fn run_command(command: Command) -> Result<()> {
    let config = load_config().context("failed to load configuration")?;
    let dispatcher = build_dispatcher(&config).await?;

    match command {
        Command::Start => unreachable!("handled in main"),
        Command::Send { provider, to, body } => {
            let receipt = dispatcher.send_now(&provider, &to, &body).await?;
            println!("sent: {}", receipt.provider_message_id);
        }
        Command::Schedule {
            provider,
            to,
            body,
            at,
        } => {
            let when: DateTime<Utc> = DateTime::parse_from_rfc3339(&at)
                .with_context(|| format!("invalid --at timestamp {at:?}, expected RFC 3339"))?
                .with_timezone(&Utc);
            let id = dispatcher.schedule_for(&provider, &to, &body, when).await?;
            println!("scheduled: message {id} at {at}");
        }
        Command::Balance { provider } => {
            let balance = dispatcher.balance(&provider).await?;
            println!("{provider} balance: {balance}");
        }
        Command::Status {
            provider,
            message_id,
        } => {
            let status = dispatcher.delivery_status(&provider, &message_id).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Contact { command } => match command {
            ContactCommand::Add {
                name,
                phone,
                email,
                group,
            } => {
                let id = contacts::add_contact(
                    dispatcher.store().pool(),
                    &name,
                    &phone,
                    email.as_deref(),
                    group.as_deref(),
                )
                .await?;
                println!("contact added: {id}");
            }
            ContactCommand::List { group } => {
                let list = contacts::contacts(dispatcher.store().pool(), group.as_deref()).await?;
                for contact in list {
                    let group = contact.group.as_deref().unwrap_or("-");
                    println!("{}\t{}\t{}\t{}", contact.id, contact.name, contact.phone, group);
                }
            }
        },
    }

    Ok(())
}
