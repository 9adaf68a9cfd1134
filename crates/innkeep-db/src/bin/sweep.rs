//! # Daily Billing Sweep
//!
//! Recalculates every bill attached to an ACTIVE stay, once. Intended to be
//! run by an external scheduler (cron or similar) around the billing-day
//! rollover so long stays accrue blocks even when nobody touches them.
//!
//! ## Usage
//! ```bash
//! # Against the default database path
//! cargo run -p innkeep-db --bin sweep
//!
//! # Specify database path
//! cargo run -p innkeep-db --bin sweep -- --db ./data/innkeep.db
//! ```
//!
//! One failing bill is logged and skipped; the exit code is non-zero only
//! when at least one bill failed, so the scheduler can alert without ever
//! blocking the rest of the batch.

use std::env;
use std::process::ExitCode;

use innkeep_db::{BillingService, Database, DbConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./innkeep.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Innkeep Daily Billing Sweep");
                println!();
                println!("Usage: sweep [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./innkeep.db)");
                println!("  -h, --help         Show this help message");
                return ExitCode::SUCCESS;
            }
            _ => {}
        }
        i += 1;
    }

    let db = match Database::new(DbConfig::new(&db_path)).await {
        Ok(db) => db,
        Err(err) => {
            eprintln!("Failed to open database {db_path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let billing = BillingService::new(db);
    let summary = billing.run_daily_sweep().await;

    println!(
        "Sweep finished: {} examined, {} recalculated, {} failed",
        summary.examined, summary.recalculated, summary.failed
    );

    if summary.failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
