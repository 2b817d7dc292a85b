//! Vitrine kernel
//!
//! Command-line entry point for plugin management and tagging.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use vitrine_kernel::config::Config;
use vitrine_kernel::hook::UserContext;
use vitrine_kernel::plugin::{PluginOptions, cli};
use vitrine_kernel::state::Kernel;
use vitrine_kernel::tagging::{RecordKind, RecordRef};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage plugins.
    #[command(subcommand)]
    Plugin(PluginCommand),

    /// Inspect and change record tags.
    #[command(subcommand)]
    Tag(TagCommand),

    /// Create the database schema.
    DbInit,
}

#[derive(Subcommand, Debug)]
enum PluginCommand {
    /// List all plugins grouped by status.
    List,
    Install { name: String },
    Activate { name: String },
    Deactivate { name: String },
    Upgrade { name: String },
    Uninstall {
        name: String,
        /// Confirm the uninstall; without it only the warning is shown.
        #[arg(long)]
        confirm: bool,
    },
    /// Submit configuration values, e.g. `--set per_page=10`.
    Configure {
        name: String,
        #[arg(long = "set", value_parser = parse_key_value)]
        values: Vec<(String, String)>,
    },
    /// Show a plugin's configuration form.
    ConfigForm { name: String },
}

#[derive(Subcommand, Debug)]
enum TagCommand {
    /// Make a record's tags match a tag string.
    Apply {
        #[arg(long)]
        kind: RecordKind,
        #[arg(long)]
        id: i64,
        /// Acting user.
        #[arg(long)]
        user: Uuid,
        /// Compare against and remove every user's tags, not just your own.
        #[arg(long)]
        all_owners: bool,
        tags: String,
    },
    /// Print a record's tags.
    Show {
        #[arg(long)]
        kind: RecordKind,
        #[arg(long)]
        id: i64,
        /// Only tags applied by this user.
        #[arg(long)]
        user: Option<Uuid>,
    },
    /// Remove every tag from a record.
    Clear {
        #[arg(long)]
        kind: RecordKind,
        #[arg(long)]
        id: i64,
    },
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    let args = Args::parse();

    let config = Config::from_env().context("failed to load configuration")?;
    info!(plugins_dir = %config.plugins_dir.display(), "configuration loaded");

    let kernel = Kernel::connect(&config)
        .await
        .context("failed to initialize kernel")?;

    match args.command {
        Command::DbInit => {
            println!("Database schema is ready.");
            Ok(ExitCode::SUCCESS)
        }
        Command::Plugin(cmd) => {
            kernel.start().await?;
            run_plugin_command(&kernel, cmd).await
        }
        Command::Tag(cmd) => {
            kernel.start().await?;
            run_tag_command(&kernel, cmd).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_plugin_command(kernel: &Kernel, cmd: PluginCommand) -> Result<ExitCode> {
    let manager = kernel.plugins();
    let notice = match cmd {
        PluginCommand::List => {
            cli::cmd_plugin_list(kernel.loader()).await?;
            return Ok(ExitCode::SUCCESS);
        }
        PluginCommand::ConfigForm { name } => {
            match manager.config_form(&name).await? {
                Some(form) => println!("{form}"),
                None => println!("The {name} plugin has no configuration form."),
            }
            return Ok(ExitCode::SUCCESS);
        }
        PluginCommand::Install { name } => cli::cmd_plugin_install(manager, &name).await,
        PluginCommand::Activate { name } => cli::cmd_plugin_activate(manager, &name).await,
        PluginCommand::Deactivate { name } => cli::cmd_plugin_deactivate(manager, &name).await,
        PluginCommand::Upgrade { name } => cli::cmd_plugin_upgrade(manager, &name).await,
        PluginCommand::Uninstall { name, confirm } => {
            cli::cmd_plugin_uninstall(manager, &name, confirm).await
        }
        PluginCommand::Configure { name, values } => {
            let submission: PluginOptions = values.into_iter().collect();
            cli::cmd_plugin_configure(manager, &name, &submission).await
        }
    };

    println!("{notice}");
    Ok(if notice.is_error() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn run_tag_command(kernel: &Kernel, cmd: TagCommand) -> Result<()> {
    let tagging = kernel.tagging();
    match cmd {
        TagCommand::Apply {
            kind,
            id,
            user,
            all_owners,
            tags,
        } => {
            let record = RecordRef::new(kind, id);
            let user = UserContext::authenticated(user, Vec::new());
            let diff = tagging
                .apply_tag_string(&record, &tags, &user, all_owners)
                .await?;
            println!("added:   {}", diff.added.join(", "));
            println!("removed: {}", diff.removed.join(", "));
        }
        TagCommand::Show { kind, id, user } => {
            let record = RecordRef::new(kind, id);
            let tags = match user {
                Some(user) => {
                    tagging
                        .user_tags(&record, &UserContext::authenticated(user, Vec::new()))
                        .await?
                }
                None => tagging.tags(&record).await?,
            };
            for tag in tags {
                println!("{}", tag.name);
            }
        }
        TagCommand::Clear { kind, id } => {
            let deleted = tagging.delete_all_tags(&RecordRef::new(kind, id)).await?;
            println!("Removed {deleted} tagging(s) from {kind}:{id}.");
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
