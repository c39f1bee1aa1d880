use std::collections::BTreeSet;

use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{error, info};

use credtrack::config::Config;
use credtrack::db::Storage;
use credtrack::domain::validation::UserInput;
use credtrack::server::{AppState, app_router};
use credtrack::service::notify::NotifyOptions;
use credtrack::service::{UserService, backup, metrics, notify, today};
use credtrack::{CredtrackError, logging};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Personnel security credential registry.
#[derive(Parser, Debug)]
#[command(name = "credtrack", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve,

    /// Dump the database to a timestamped SQL file and rotate old dumps
    #[command(name = "db:backup")]
    DbBackup {
        /// Number of dumps to keep (defaults to backup.keep)
        #[arg(long)]
        keep: Option<usize>,
    },

    /// Write a JSON snapshot of registry counts
    #[command(name = "metrics:collect")]
    MetricsCollect,

    /// Notify holders of credentials expiring soon
    #[command(name = "credentials:notify-expiring")]
    NotifyExpiring {
        /// Look-ahead window in days (defaults to notify.default_days)
        #[arg(long)]
        days: Option<u32>,

        /// List what would be sent without recording or delivering
        #[arg(long)]
        dry_run: bool,
    },

    /// Create a user and print their API token
    #[command(name = "user:create")]
    UserCreate {
        #[arg(long)]
        name: String,

        #[arg(long)]
        full_name: String,

        #[arg(long)]
        email: String,

        /// Role to assign; repeatable
        #[arg(long = "role")]
        roles: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let cfg = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(2);
        }
    };
    if let Err(e) = logging::init(&cfg) {
        eprintln!("logging setup failed: {e}");
        std::process::exit(2);
    }

    if let Err(e) = run(cli, cfg).await {
        error!(error = %e, "command failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, cfg: Config) -> Result<(), CredtrackError> {
    match cli.command {
        Command::Serve => serve(&cfg).await,
        Command::DbBackup { keep } => {
            let report = backup::run_backup(&cfg, keep.unwrap_or(cfg.backup.keep)).await?;
            print_json(&report)
        }
        Command::MetricsCollect => {
            let storage = Storage::connect(&cfg.basic.database_url).await?;
            let report = metrics::run_collect(&storage, &cfg, today()).await?;
            print_json(&report)
        }
        Command::NotifyExpiring { days, dry_run } => {
            let storage = Storage::connect(&cfg.basic.database_url).await?;
            let opts = NotifyOptions {
                days: days.unwrap_or(cfg.notify.default_days),
                dry_run,
            };
            let report = notify::notify_expiring(&storage, &cfg, today(), opts).await?;
            print_json(&report)
        }
        Command::UserCreate {
            name,
            full_name,
            email,
            roles,
        } => {
            let storage = Storage::connect(&cfg.basic.database_url).await?;
            let input = UserInput {
                name: Some(name),
                full_name: Some(full_name),
                email: Some(email),
                rank_id: None,
                office_id: None,
            };
            let roles: BTreeSet<String> = roles.into_iter().collect();
            let created = UserService::new(storage).create(input, &roles).await?;
            println!("user {} created", created.user.id);
            println!("token: {}", created.token);
            Ok(())
        }
    }
}

async fn serve(cfg: &Config) -> Result<(), CredtrackError> {
    let storage = Storage::connect(&cfg.basic.database_url).await?;
    info!(
        listen_addr = %cfg.basic.listen_addr,
        database_url = %cfg.basic.database_url,
        loglevel = %cfg.basic.loglevel,
    );

    let app = app_router(AppState::new(storage));
    let listener = TcpListener::bind(&cfg.basic.listen_addr).await?;
    info!("HTTP server listening on {}", cfg.basic.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown signal received");
        })
        .await?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CredtrackError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
