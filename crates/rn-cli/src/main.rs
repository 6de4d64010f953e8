mod http;
mod mcp;

use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rmcp::{ServiceExt, transport::stdio};
use rn_core::{NewCommercial, NewUser};
use rn_store::{Store, open_data_dir, resolve_data_dir};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "rn", about = "Referral network placement CLI, HTTP and MCP server")]
struct Cli {
    /// Data directory holding network.db and config.toml
    #[arg(long, global = true, env = "RN_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage users
    #[command(subcommand)]
    User(UserCommand),

    /// Manage commercials
    #[command(subcommand)]
    Commercial(CommercialCommand),

    /// Create and inspect networks
    #[command(subcommand)]
    Network(NetworkCommand),

    /// Place a user under the sponsor owning a referral code
    Assign {
        user_id: String,
        referral_code: String,
    },

    /// Next free generation and position in a network under a plan
    Position {
        network_id: String,
        /// Plan descriptor "X:Y"
        plan_type: String,
    },

    /// Print the referral tree below a user as JSON
    Tree { user_id: String },

    /// Serve the network operations over HTTP
    Serve {
        /// Address to listen on
        #[arg(long, env = "RN_BIND", default_value = "127.0.0.1:8000")]
        bind: SocketAddr,
    },

    /// Start MCP server on stdio transport
    Mcp,
}

#[derive(Subcommand)]
enum UserCommand {
    /// Create a user
    Add {
        #[arg(long)]
        username: String,
        /// Explicit id (a UUID is generated otherwise)
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        /// Code recruits use to join under this user
        #[arg(long)]
        referral_code: Option<String>,
    },

    /// Delete a user, its commercial and that commercial's networks
    Delete { user_id: String },
}

#[derive(Subcommand)]
enum CommercialCommand {
    /// Make a user a commercial
    Add {
        #[arg(long)]
        user: String,
        #[arg(long)]
        reference: String,
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        country: Option<String>,
    },
}

#[derive(Subcommand)]
enum NetworkCommand {
    /// Create a commercial's network and seat it as root
    Create { commercial_id: String },
    /// Show one network
    Show { network_id: String },
    /// List all networks
    List,
}

fn open_store(cli: &Cli) -> Result<Store> {
    let dir = resolve_data_dir(cli.data_dir.as_deref());
    open_data_dir(&dir).with_context(|| format!("failed to open store in {}", dir.display()))
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

fn print_json(value: &impl Serialize) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to serialize output")?
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::User(cmd) => cmd_user(&cli, cmd),
        Commands::Commercial(cmd) => cmd_commercial(&cli, cmd),
        Commands::Network(cmd) => cmd_network(&cli, cmd),
        Commands::Assign {
            user_id,
            referral_code,
        } => cmd_assign(&cli, user_id, referral_code),
        Commands::Position {
            network_id,
            plan_type,
        } => cmd_position(&cli, network_id, plan_type),
        Commands::Tree { user_id } => cmd_tree(&cli, user_id),
        Commands::Serve { bind } => cmd_serve(&cli, *bind).await,
        Commands::Mcp => cmd_mcp(&cli).await,
    }
}

fn cmd_user(cli: &Cli, cmd: &UserCommand) -> Result<()> {
    let store = open_store(cli)?;
    match cmd {
        UserCommand::Add {
            username,
            id,
            name,
            email,
            referral_code,
        } => {
            let user = store
                .create_user(NewUser {
                    id: id.clone(),
                    username: username.clone(),
                    name: name.clone(),
                    email: email.clone(),
                    referral_code: referral_code.clone(),
                })
                .context("failed to create user")?;
            print_json(&user)
        }
        UserCommand::Delete { user_id } => {
            let deleted = store
                .delete_user(user_id)
                .with_context(|| format!("failed to delete user {user_id}"))?;
            print_json(&deleted)
        }
    }
}

fn cmd_commercial(cli: &Cli, cmd: &CommercialCommand) -> Result<()> {
    let store = open_store(cli)?;
    match cmd {
        CommercialCommand::Add {
            user,
            reference,
            id,
            country,
        } => {
            let commercial = store
                .create_commercial(NewCommercial {
                    id: id.clone(),
                    user_id: user.clone(),
                    reference: reference.clone(),
                    country_operation: country.clone(),
                })
                .context("failed to create commercial")?;
            print_json(&commercial)
        }
    }
}

fn cmd_network(cli: &Cli, cmd: &NetworkCommand) -> Result<()> {
    let store = open_store(cli)?;
    match cmd {
        NetworkCommand::Create { commercial_id } => {
            let network = store
                .create_commercial_network(commercial_id)
                .with_context(|| format!("failed to create network for {commercial_id}"))?;
            print_json(&network)
        }
        NetworkCommand::Show { network_id } => {
            let network = store
                .get_network(network_id)
                .context("failed to load network")?
                .with_context(|| format!("network {network_id} not found"))?;
            print_json(&network)
        }
        NetworkCommand::List => {
            let networks = store.list_networks().context("failed to list networks")?;
            for n in &networks {
                println!(
                    "{}  plan={}  members={}/{}{}",
                    n.id,
                    n.plan_type,
                    n.total_members,
                    n.max_members,
                    n.overflow_of
                        .as_deref()
                        .map(|o| format!("  overflow_of={o}"))
                        .unwrap_or_default()
                );
            }
            Ok(())
        }
    }
}

fn cmd_assign(cli: &Cli, user_id: &str, referral_code: &str) -> Result<()> {
    let store = open_store(cli)?;
    let placement = store
        .assign_user(user_id, referral_code)
        .with_context(|| format!("failed to assign user {user_id}"))?;
    print_json(&placement)
}

fn cmd_position(cli: &Cli, network_id: &str, plan_type: &str) -> Result<()> {
    let store = open_store(cli)?;
    let slot = store
        .calculate_position(network_id, plan_type)
        .context("failed to calculate position")?;
    print_json(&slot)
}

fn cmd_tree(cli: &Cli, user_id: &str) -> Result<()> {
    let store = open_store(cli)?;
    let Some(tree) = store
        .network_tree(user_id)
        .context("failed to build tree")?
    else {
        return print_json(&serde_json::json!({}));
    };
    let mut out = std::io::stdout().lock();
    tree.write_json(&mut out)
        .context("failed to serialize output")?;
    writeln!(out).context("failed to write output")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

async fn cmd_serve(cli: &Cli, bind: SocketAddr) -> Result<()> {
    let store = open_store(cli)?;
    let app = http::build_router(Arc::new(tokio::sync::Mutex::new(store)));

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;
    Ok(())
}

async fn cmd_mcp(cli: &Cli) -> Result<()> {
    let store = open_store(cli)?;
    tracing::info!("starting MCP server");

    let service = match mcp::RnServer::new(store).serve(stdio()).await {
        Ok(service) => service,
        Err(rmcp::service::ServerInitializeError::ConnectionClosed(reason)) => {
            tracing::info!("client closed stdio before initializing: {reason}");
            return Ok(());
        }
        Err(e) => return Err(e).context("failed to start MCP server"),
    };
    service.waiting().await?;
    Ok(())
}
