//! Reversion Pension CLI
//!
//! Command-line interface for listing approved beneficiary groups, previewing
//! distributions and running the notification for one pension number

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use reversion_pension::distribution::DistributionSummary;
use reversion_pension::rules::loader::RELATIONSHIP_KINDS_FILE;
use reversion_pension::rules::DEFAULT_DATA_PATH;
use reversion_pension::{
    AdminError, AdminService, Caller, Database, DisbursementOrchestrator, DistributionCalculator,
    DistributionResult, MemoryStore, OrchestratorConfig, RelationshipTable, TransactionalNotifier,
};

#[derive(Debug, Parser)]
#[command(name = "reversion-pension", version, about = "Reversion pension distribution")]
struct Cli {
    /// Directory holding declarations.csv, users.csv, relationships.csv
    #[arg(long, default_value = DEFAULT_DATA_PATH)]
    data_dir: PathBuf,

    /// Administrator user id recorded on notifications
    #[arg(long, default_value_t = 1)]
    admin_id: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List approved beneficiary groups with their preview shares
    Groups {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show the distribution for one pension number without notifying
    Preview { pension_number: String },
    /// Calculate, notify and mark the beneficiaries of one pension number
    Process { pension_number: String },
}

fn load_rules(data_dir: &Path) -> Result<RelationshipTable> {
    if data_dir.join(RELATIONSHIP_KINDS_FILE).exists() {
        RelationshipTable::from_csv_path(data_dir)
            .with_context(|| format!("loading {}", RELATIONSHIP_KINDS_FILE))
    } else {
        info!("{} not found, using legacy relationship table", RELATIONSHIP_KINDS_FILE);
        Ok(RelationshipTable::legacy())
    }
}

fn admin_failure(err: AdminError) -> anyhow::Error {
    anyhow!("[{}] {}", err.status_code(), err)
}

fn print_results(results: &[DistributionResult]) {
    println!("{:>11} {:>9} {:>10} {:>10} {:>12}", "Declaration", "Applicant", "Kind", "Share %", "Declared");
    println!("{}", "-".repeat(56));
    for r in results {
        println!(
            "{:>11} {:>9} {:>10} {:>10.4} {:>12}",
            r.declaration_id,
            r.applicant_user_id,
            r.kind.as_str(),
            r.percentage,
            r.declaration_date
        );
    }
    let summary = DistributionSummary::from_results(results);
    println!(
        "Total allotted: {:.4}% (unallocated {:.4}%)",
        summary.total_percentage, summary.unallocated_percentage
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    let db = Arc::new(
        Database::load_from(&cli.data_dir)
            .with_context(|| format!("loading data from {}", cli.data_dir.display()))?,
    );
    let table = load_rules(&cli.data_dir)?;

    let orchestrator = DisbursementOrchestrator::new(
        Arc::new(MemoryStore::new(Arc::clone(&db))),
        Arc::new(TransactionalNotifier),
        DistributionCalculator::new(table),
        OrchestratorConfig::default(),
    );
    let service = AdminService::new(Arc::new(orchestrator));
    let caller = Caller::admin(cli.admin_id);

    match cli.command {
        Command::Groups { json } => {
            let groups = service.approved_groups(&caller).await.map_err(admin_failure)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&groups)?);
                return Ok(());
            }
            for group in &groups {
                println!(
                    "\nPension N° {} ({} beneficiaries{})",
                    group.pension_number,
                    group.beneficiaries.len(),
                    if group.notified { ", already notified" } else { "" }
                );
                match &group.preview_error {
                    Some(err) => println!("  cannot calculate: {}", err),
                    None => print_results(&group.preview),
                }
            }
        }
        Command::Preview { pension_number } => {
            let results = service
                .preview(&caller, &pension_number)
                .await
                .map_err(admin_failure)?;
            println!("Pension N° {}", pension_number.trim());
            print_results(&results);
        }
        Command::Process { pension_number } => {
            let response = service
                .calculate_and_notify(&caller, &pension_number)
                .await
                .map_err(admin_failure)?;
            db.save_to(&cli.data_dir)
                .await
                .with_context(|| format!("saving data to {}", cli.data_dir.display()))?;

            println!("{}", response.message);
            print_results(&response.report.results);
        }
    }

    Ok(())
}
