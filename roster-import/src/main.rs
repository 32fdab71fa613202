//! Bulk roster importer
//!
//! Reads an Excel workbook of users, groups, memberships and events and
//! pushes them into the roster directory service. Run with `RUST_LOG=info`
//! for per-row progress.

mod api;
mod import;
mod validate;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use api::RestDirectoryClient;
use import::{ImportContext, ImportOptions, import_workbook, sheet::read_workbook};
use validate::DnsDomainCheck;

#[derive(Parser)]
#[command(name = "roster-import", version, about = "Bulk-import roster spreadsheets into the directory service")]
struct Cli {
    /// Excel workbook to import
    file: PathBuf,

    /// Directory service base URL
    #[arg(long, env = "ROSTER_API_URL")]
    base_url: String,

    /// Worker pool size for the concurrent sheets
    #[arg(short, long)]
    threads: Option<usize>,

    /// Only process rows whose run_character column matches
    #[arg(short, long)]
    run_character: Option<String>,

    /// Data rows to skip at the start of each sheet (resume)
    #[arg(short, long, default_value_t = 0)]
    skip_rows: usize,

    /// Suppress welcome and notification emails for imported accounts
    #[arg(long)]
    skip_notifications: bool,

    /// Group map file recording imported groups for resumed runs
    #[arg(long, default_value = "imported_groups.csv")]
    group_map: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let token = std::env::var("ROSTER_API_TOKEN").ok();
    if token.is_none() {
        info!("ROSTER_API_TOKEN not set, connecting unauthenticated");
    }

    let client = RestDirectoryClient::new(&cli.base_url, token)
        .with_notification_bypass(cli.skip_notifications);
    let options = ImportOptions {
        worker_count: cli.threads,
        run_character: cli.run_character,
        skip_rows: cli.skip_rows,
        group_map_path: Some(cli.group_map),
        ..ImportOptions::default()
    };
    let ctx = Arc::new(ImportContext::new(
        Arc::new(client),
        Arc::new(DnsDomainCheck),
        options,
    )?);

    let sheets = read_workbook(&cli.file)
        .with_context(|| format!("failed to read workbook {}", cli.file.display()))?;
    info!("workbook {} has {} sheets", cli.file.display(), sheets.len());

    import_workbook(&ctx, &sheets).await;
    Ok(())
}
