//! Operator CLI for the coupon claim protocol.
//!
//! # Responsibility
//! - Provision and inspect resources in a SQLite claim database.
//! - Drive claims from the shell, including a threaded contention run.
//! - Expose the reconcile and unblock maintenance paths.

use std::collections::BTreeMap;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Barrier};
use std::thread;

use clap::{Parser, Subcommand};
use coupon_core::db::open_db_with_options;
use coupon_core::{
    core_version, init_logging, ClaimCoordinator, ClaimOutcome, CoreConfig, ResourceService,
    SqliteClaimLedger, SqliteResourceStore, StatusService, UnblockOutcome,
};
use log::{info, warn};
use rusqlite::Connection;

type CliResult<T> = Result<T, Box<dyn Error>>;

#[derive(Parser)]
#[command(name = "coupon")]
#[command(about = "Claim finite coupons without overselling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// SQLite database file (overrides COUPON_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new resource with `total` units
    Create {
        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        total: u32,

        /// Expiry as unix epoch milliseconds (informational)
        #[arg(long)]
        expires_at_ms: Option<i64>,
    },

    /// Claim one unit of a resource for an actor
    Claim {
        #[arg(short, long)]
        actor: String,

        #[arg(short, long)]
        name: String,
    },

    /// Print a resource snapshot as JSON
    Status {
        #[arg(short, long)]
        name: String,
    },

    /// Mark a resource inactive
    Deactivate {
        #[arg(short, long)]
        name: String,
    },

    /// Remove the claim row blocking an actor on a resource
    Unblock {
        #[arg(short, long)]
        actor: String,

        #[arg(short, long)]
        name: String,
    },

    /// Retry releases that compensation could not finish
    Reconcile,

    /// Race distinct actors against one resource, one connection per thread
    Stress {
        #[arg(short, long)]
        name: String,

        #[arg(long, default_value = "50")]
        actors: u32,
    },

    /// Print the core version
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<()> {
    if let Commands::Version = cli.command {
        println!("coupon_core version={}", core_version());
        return Ok(());
    }

    let mut config = CoreConfig::from_env()?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    if let Some(log_dir) = &config.log_dir {
        init_logging(config.log_level, log_dir)?;
    }
    info!(
        "event=cli_start module=cli status=ok db_path={}",
        config.db_path.display()
    );

    match cli.command {
        Commands::Create {
            name,
            total,
            expires_at_ms,
        } => {
            let conn = open(&config)?;
            let resource = ResourceService::new(SqliteResourceStore::try_new(&conn)?)
                .create_resource(&name, total, expires_at_ms)?;
            println!(
                "created resource={} id={} total={}",
                resource.name, resource.id, resource.total
            );
        }
        Commands::Claim { actor, name } => {
            let conn = open(&config)?;
            let outcome = coordinator(&conn, &config)?.claim_resource(&actor, &name)?;
            println!("{outcome}");
            if !outcome.is_claimed() {
                return Err(format!("claim not granted: {outcome}").into());
            }
        }
        Commands::Status { name } => {
            let conn = open(&config)?;
            let status = StatusService::new(
                SqliteResourceStore::try_new(&conn)?,
                SqliteClaimLedger::try_new(&conn)?,
            )
            .get_status(&name)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Deactivate { name } => {
            let conn = open(&config)?;
            let resource = ResourceService::new(SqliteResourceStore::try_new(&conn)?)
                .deactivate_resource(&name)?;
            println!("deactivated resource={}", resource.name);
        }
        Commands::Unblock { actor, name } => {
            let conn = open(&config)?;
            match coordinator(&conn, &config)?.unblock_actor(&actor, &name)? {
                UnblockOutcome::Released(claim) => {
                    println!("released claim_id={} actor={}", claim.claim_id, claim.actor_id);
                }
                UnblockOutcome::NoClaim => println!("no claim for actor={actor}"),
                UnblockOutcome::ResourceNotFound => {
                    return Err(format!("resource not found: `{name}`").into());
                }
            }
        }
        Commands::Reconcile => {
            let conn = open(&config)?;
            let report = coordinator(&conn, &config)?.reconcile_pending_releases()?;
            println!("released={} failed={}", report.released, report.failed);
            if report.failed > 0 {
                return Err(format!("{} releases still pending", report.failed).into());
            }
        }
        Commands::Stress { name, actors } => stress(&config, &name, actors)?,
        Commands::Version => {}
    }

    Ok(())
}

fn open(config: &CoreConfig) -> CliResult<Connection> {
    Ok(open_db_with_options(&config.db_path, &config.db_options())?)
}

fn coordinator<'conn>(
    conn: &'conn Connection,
    config: &CoreConfig,
) -> CliResult<ClaimCoordinator<SqliteResourceStore<'conn>, SqliteClaimLedger<'conn>>> {
    Ok(ClaimCoordinator::new(
        SqliteResourceStore::try_new(conn)?,
        SqliteClaimLedger::try_new(conn)?,
    )
    .with_policy(config.compensation))
}

fn stress(config: &CoreConfig, name: &str, actors: u32) -> CliResult<()> {
    // Migrate once up front so workers only contend on claims.
    drop(open(config)?);

    let barrier = Arc::new(Barrier::new(actors as usize));
    let handles = (0..actors)
        .map(|index| {
            let barrier = Arc::clone(&barrier);
            let config = config.clone();
            let name = name.to_string();
            thread::spawn(move || -> Result<ClaimOutcome, String> {
                let conn = open(&config).map_err(|err| err.to_string());
                barrier.wait();
                let conn = conn?;
                let actor = format!("stress-actor-{index:04}");
                coordinator(&conn, &config)
                    .map_err(|err| err.to_string())?
                    .claim_resource(&actor, &name)
                    .map_err(|err| err.to_string())
            })
        })
        .collect::<Vec<_>>();

    let mut tallies: BTreeMap<String, u32> = BTreeMap::new();
    for handle in handles {
        let key = match handle.join() {
            Ok(Ok(outcome)) => outcome.as_str().to_string(),
            Ok(Err(message)) => {
                warn!("event=stress_claim module=cli status=error error={message}");
                "error".to_string()
            }
            Err(_) => "panicked".to_string(),
        };
        *tallies.entry(key).or_default() += 1;
    }

    for (outcome, count) in &tallies {
        println!("{outcome}={count}");
    }

    let conn = open(config)?;
    let status = StatusService::new(
        SqliteResourceStore::try_new(&conn)?,
        SqliteClaimLedger::try_new(&conn)?,
    )
    .get_status(name)?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
