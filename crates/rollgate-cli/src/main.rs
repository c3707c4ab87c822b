//! rollgate — manage rollout blocks and gate releases on them.
//!
//! # Usage
//!
//! ```text
//! rollgate block create shop/sale-freeze --message "black friday"
//! rollgate release create shop/checkout-7 --application checkout --chart checkout --version 7.0.0
//! rollgate override add shop/checkout-7 shop/sale-freeze
//! rollgate check shop/checkout-7
//! rollgate run --interval 30
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rollgate_core::RollgateConfig;

mod commands;

use commands::Context;

#[derive(Parser)]
#[command(
    name = "rollgate",
    about = "rollgate — rollout-block admission gate",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to rollgate.toml (defaults are used when absent).
    #[arg(short, long, default_value = "rollgate.toml", global = true)]
    config: PathBuf,

    /// Override [store].data_dir from the config file.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage rollout blocks
    Block {
        #[command(subcommand)]
        action: BlockAction,
    },
    /// Manage releases
    Release {
        #[command(subcommand)]
        action: ReleaseAction,
    },
    /// Edit a release's rollout block overrides
    Override {
        #[command(subcommand)]
        action: OverrideAction,
    },
    /// Run one admission pass for a release.
    ///
    /// Exits with status 2 when the release is blocked.
    Check {
        /// Release as namespace/name
        release: String,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Show events recorded for a release
    Events {
        /// Release as namespace/name
        release: String,
    },
    /// Reconcile all releases periodically until interrupted
    Run {
        /// Seconds between passes (default: [reconcile].interval_secs)
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Subcommand)]
enum BlockAction {
    /// Create a rollout block
    Create {
        /// Block as namespace/name
        block: String,
        /// Why rollouts are blocked
        #[arg(short, long)]
        message: String,
        /// Who created the block
        #[arg(short, long, default_value = "unknown")]
        author: String,
        /// Author type: user, team, automation, ...
        #[arg(long, default_value = "user")]
        author_type: String,
    },
    /// Delete a rollout block
    Delete {
        /// Block as namespace/name
        block: String,
    },
    /// List rollout blocks
    List {
        /// Only this namespace
        #[arg(short, long)]
        namespace: Option<String>,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand)]
enum ReleaseAction {
    /// Create a release
    Create {
        /// Release as namespace/name
        release: String,
        #[arg(long)]
        application: String,
        #[arg(long)]
        chart: String,
        #[arg(long)]
        version: String,
        #[arg(long, default_value = "0")]
        target_step: u32,
    },
    /// Show a release
    Show {
        /// Release as namespace/name
        release: String,
    },
    /// List releases
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand)]
enum OverrideAction {
    /// Acknowledge a rollout block for a release
    Add {
        /// Release as namespace/name
        release: String,
        /// Block as namespace/name
        block: String,
    },
    /// Withdraw an acknowledgment
    Remove {
        /// Release as namespace/name
        release: String,
        /// Block as namespace/name
        block: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = RollgateConfig::load_or_default(&cli.config)?;
    if let Some(data_dir) = cli.data_dir {
        config.store.data_dir = data_dir;
    }

    let default_filter = config.log_filter.as_deref().unwrap_or("rollgate=info");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(default_filter))?,
        )
        .with_writer(std::io::stderr)
        .init();

    let ctx = Context::new(config);

    match cli.command {
        Commands::Block { action } => match action {
            BlockAction::Create {
                block,
                message,
                author,
                author_type,
            } => commands::block::create(&ctx, &block, &message, &author, &author_type),
            BlockAction::Delete { block } => commands::block::delete(&ctx, &block),
            BlockAction::List { namespace, format } => {
                commands::block::list(&ctx, namespace.as_deref(), &format)
            }
        },
        Commands::Release { action } => match action {
            ReleaseAction::Create {
                release,
                application,
                chart,
                version,
                target_step,
            } => commands::release::create(
                &ctx,
                &release,
                &application,
                &chart,
                &version,
                target_step,
            ),
            ReleaseAction::Show { release } => commands::release::show(&ctx, &release),
            ReleaseAction::List { format } => commands::release::list(&ctx, &format),
        },
        Commands::Override { action } => match action {
            OverrideAction::Add { release, block } => {
                commands::release::add_override(&ctx, &release, &block)
            }
            OverrideAction::Remove { release, block } => {
                commands::release::remove_override(&ctx, &release, &block)
            }
        },
        Commands::Check { release, format } => {
            let blocked = commands::check::check(&ctx, &release, &format)?;
            if blocked {
                std::process::exit(2);
            }
            Ok(())
        }
        Commands::Events { release } => commands::check::events(&ctx, &release),
        Commands::Run { interval } => commands::run::run(&ctx, interval).await,
        Commands::Config => {
            print!("{}", ctx.config.to_toml_string()?);
            Ok(())
        }
    }
}
