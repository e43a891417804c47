mod config;
mod server;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cape_store::Store;
use clap::{Parser, Subcommand};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "cape", about = "Label-based access-control policy store")]
struct Cli {
    /// Override the database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Bind address
        #[arg(long)]
        host: Option<String>,

        /// Bind port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Manage security groups
    Group {
        #[command(subcommand)]
        command: GroupCommands,
    },

    /// Manage labeled objects
    Object {
        #[command(subcommand)]
        command: ObjectCommands,
    },

    /// Show row counts per relation
    Stats,
}

#[derive(Subcommand)]
enum GroupCommands {
    /// Create or update a group (idempotent)
    Add {
        name: String,
        tokens: Vec<String>,
    },

    /// Print a group's tokens
    Show {
        name: String,

        /// Emit the group as JSON
        #[arg(long)]
        json: bool,
    },

    /// List group names
    Ls {
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        offset: Option<u32>,
    },

    /// Delete a group (no-op when missing)
    Rm { name: String },
}

#[derive(Subcommand)]
enum ObjectCommands {
    /// Create an object from tokens and group names; prints its uuid
    Add {
        /// Individually assigned token values
        #[arg(long = "token")]
        tokens: Vec<String>,

        /// Referenced group names
        #[arg(long = "group")]
        groups: Vec<String>,

        /// Requested identifier (generated when omitted)
        #[arg(long)]
        uuid: Option<String>,
    },

    /// Print an object's effective label
    Show {
        uuid: String,

        /// Emit the object as JSON
        #[arg(long)]
        json: bool,
    },

    /// List object uuids
    Ls {
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        offset: Option<u32>,
    },

    /// Delete an object (no-op when missing)
    Rm { uuid: String },
}

fn open_store(cli: &Cli, config: &Config) -> Result<Store> {
    let path = config.db_path(cli.db.as_deref());
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Store::open(&path).with_context(|| format!("failed to open database {}", path.display()))
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = Config::load()?;

    match &cli.command {
        Commands::Serve { host, port } => {
            cmd_serve(&cli, &config, host.as_deref(), *port).await
        }
        Commands::Group { command } => cmd_group(&cli, &config, command),
        Commands::Object { command } => cmd_object(&cli, &config, command),
        Commands::Stats => cmd_stats(&cli, &config),
    }
}

async fn cmd_serve(cli: &Cli, config: &Config, host: Option<&str>, port: Option<u16>) -> Result<()> {
    let store = open_store(cli, config)?;
    let state = Arc::new(server::ServerState::new(store));
    let app = server::router(state);

    let addr = format!("{}:{}", config.host(host), config.port(port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("cape listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutting down");
}

fn cmd_group(cli: &Cli, config: &Config, command: &GroupCommands) -> Result<()> {
    let store = open_store(cli, config)?;

    match command {
        GroupCommands::Add { name, tokens } => {
            let members = store.intern_tokens(tokens.iter().map(String::as_str))?;
            let group = store.create_or_update_group(name, &members)?;
            let values = store.group_values(group)?;
            println!("{name}: {}", join(&values));
        }
        GroupCommands::Show { name, json } => {
            let group = store.group_by_name(name)?;
            let values = store.group_values(group.id)?;
            if *json {
                let resource = cape_core::GroupResource {
                    name: group.name,
                    tokens: values.into_iter().collect(),
                };
                println!("{}", serde_json::to_string_pretty(&resource)?);
            } else {
                println!("{}: {}", group.name, join(&values));
            }
        }
        GroupCommands::Ls { limit, offset } => {
            for name in store.list_group_names(*limit, *offset)? {
                println!("{name}");
            }
        }
        GroupCommands::Rm { name } => match store.group_by_name(name) {
            Ok(group) => {
                store.delete_group(group.id)?;
                println!("deleted {name}");
            }
            Err(cape_store::StoreError::NotFound(..)) => {
                println!("no such group: {name}");
            }
            Err(e) => return Err(e.into()),
        },
    }
    Ok(())
}

fn cmd_object(cli: &Cli, config: &Config, command: &ObjectCommands) -> Result<()> {
    let store = open_store(cli, config)?;

    match command {
        ObjectCommands::Add {
            tokens,
            groups,
            uuid,
        } => {
            let mut group_ids = BTreeSet::new();
            for name in groups {
                group_ids.insert(store.group_by_name(name)?.id);
            }
            let members = store.intern_tokens(tokens.iter().map(String::as_str))?;
            let set = store.get_or_create_token_set(&members)?;
            let level = store.get_or_create_level(set, &group_ids)?;
            let object = store.create_object(level, uuid.as_deref())?;
            println!("{}", object.uuid);
        }
        ObjectCommands::Show { uuid, json } => {
            let object = store.object_by_uuid(uuid)?;
            let values = store.level_values(object.level)?;
            let groups = store.level_group_names(object.level)?;
            if *json {
                let resource = cape_core::ObjectResource {
                    uuid: object.uuid,
                    level: cape_core::LevelResource {
                        tokens: values.into_iter().collect(),
                        groups,
                    },
                };
                println!("{}", serde_json::to_string_pretty(&resource)?);
            } else {
                println!("uuid:   {}", object.uuid);
                println!("tokens: {}", join(&values));
                println!("groups: {}", groups.join(", "));
            }
        }
        ObjectCommands::Ls { limit, offset } => {
            for uuid in store.list_object_uuids(*limit, *offset)? {
                println!("{uuid}");
            }
        }
        ObjectCommands::Rm { uuid } => match store.object_by_uuid(uuid) {
            Ok(object) => {
                store.delete_object(object.id)?;
                println!("deleted {uuid}");
            }
            Err(cape_store::StoreError::NotFound(..)) => {
                println!("no such object: {uuid}");
            }
            Err(e) => return Err(e.into()),
        },
    }
    Ok(())
}

fn cmd_stats(cli: &Cli, config: &Config) -> Result<()> {
    let store = open_store(cli, config)?;
    let counts = store.counts()?;

    println!("tokens:     {}", counts.tokens);
    println!("token sets: {}", counts.token_sets);
    println!("groups:     {}", counts.groups);
    println!("levels:     {}", counts.levels);
    println!("objects:    {}", counts.objects);
    Ok(())
}

fn join(values: &BTreeSet<String>) -> String {
    values.iter().cloned().collect::<Vec<_>>().join(", ")
}
