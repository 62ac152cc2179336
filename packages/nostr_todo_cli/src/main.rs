//! nostr-todo: a task list stored on Nostr relays

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio_util::sync::CancellationToken;

use nostr_todo::config::{self, Config};
use nostr_todo::relay::WebSocketConnector;
use nostr_todo::sync::{Applied, SyncSession};
use nostr_todo::{Mutation, NamespaceKey, Task};

/// Manage a todo list kept on Nostr relays
#[derive(Parser)]
#[command(name = "nostr-todo")]
#[command(about = "Manage a todo list kept on Nostr relays", long_about = None)]
#[command(version)]
struct Cli {
    /// Config profile; `?` lists the available profiles
    #[arg(short = 'a', long = "profile", default_value = "")]
    profile: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List open todos
    List {
        /// Include finished todos
        #[arg(short = 'a', long = "all")]
        all: bool,

        /// List name
        #[arg(short, long, default_value = "")]
        name: String,
    },

    /// Add a todo
    New {
        #[arg(long)]
        content: String,

        #[arg(short, long, default_value = "")]
        name: String,
    },

    /// Mark todos as done
    Done {
        #[arg(required = true)]
        ids: Vec<String>,

        #[arg(short, long, default_value = "")]
        name: String,
    },

    /// Mark todos as not done
    Undone {
        #[arg(required = true)]
        ids: Vec<String>,

        #[arg(short, long, default_value = "")]
        name: String,
    },

    /// Replace the content of a todo
    Edit {
        id: String,

        #[arg(long)]
        content: String,

        #[arg(short, long, default_value = "")]
        name: String,
    },

    /// Delete todos
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,

        #[arg(short, long, default_value = "")]
        name: String,
    },

    /// Show version
    Version,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    if let Commands::Version = cli.command {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let dir = config::config_dir()?;
    if cli.profile == "?" {
        for name in config::list_profiles(&dir)? {
            println!("{}", name);
        }
        return Ok(());
    }

    let path = config::profile_path(&dir, &cli.profile);
    let config = Config::load(&path).with_context(|| format!("cannot load {}", path.display()))?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupted, cancelling");
            interrupt.cancel();
        }
    });

    let session = open_session(&config, cancel)?;

    match cli.command {
        Commands::List { all, name } => {
            let list = session.load(&NamespaceKey::for_list(&name)).await?;
            for task in list.iter().filter(|t| all || !t.done) {
                println!("{}", format_task(task));
            }
        }
        Commands::New { content, name } => {
            let applied = apply(&session, &name, Mutation::Add { content }).await?;
            if let Some(id) = applied.outcome.added {
                println!("{}", id.green());
            }
        }
        Commands::Done { ids, name } => {
            apply(&session, &name, Mutation::MarkDone { ids }).await?;
        }
        Commands::Undone { ids, name } => {
            apply(&session, &name, Mutation::MarkUndone { ids }).await?;
        }
        Commands::Edit { id, content, name } => {
            apply(&session, &name, Mutation::Edit { id, content }).await?;
        }
        Commands::Delete { ids, name } => {
            apply(&session, &name, Mutation::Delete { ids }).await?;
        }
        Commands::Version => {}
    }

    Ok(())
}

fn open_session(config: &Config, cancel: CancellationToken) -> Result<SyncSession> {
    let relays = config.relay_urls()?;
    let credential = config.credential().context("invalid private key")?;
    log::debug!("Using {} relays as {}", relays.len(), credential.public_key_hex());

    let session = SyncSession::new(Arc::new(WebSocketConnector::default()), relays, credential)
        .with_policy(config.acceptance_policy())
        .with_cancellation(cancel);
    Ok(session)
}

async fn apply(session: &SyncSession, name: &str, mutation: Mutation) -> Result<Applied> {
    let applied = session.apply(&NamespaceKey::for_list(name), &mutation).await?;
    for id in &applied.outcome.unmatched {
        eprintln!("{} no todo with id {}", "warning:".yellow(), id);
    }
    if applied.report.accepted() == 0 {
        eprintln!("{} no relay accepted the update", "warning:".yellow());
    }
    Ok(applied)
}

fn format_task(task: &Task) -> String {
    let created = Local
        .timestamp_opt(task.created_at, 0)
        .single()
        .map(|t| t.format("%Y-%m-%dT%H-%M-%S").to_string())
        .unwrap_or_else(|| task.created_at.to_string());
    let mark = if task.done { "✅" } else { "\u{3000}" };
    format!("{} ({}): {} {}", task.id.green(), created.blue(), mark, task.content)
}
