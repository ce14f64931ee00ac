use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use medicore_core::models::parse_date;
use medicore_core::{CoreConfig, EntityKind, HospitalCore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "medicore")]
#[command(about = "Medicore hospital records administration")]
struct Cli {
    /// Database file (overrides MEDICORE_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and apply the schema
    Init,
    /// Print patient, doctor, appointment and billing statistics as JSON
    Stats {
        /// First appointment or bill date to include (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,
        /// Last appointment or bill date to include (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,
    },
    /// Export bills as JSON (default) or CSV
    ExportBills {
        /// First bill date to include (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,
        /// Last bill date to include (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,
        /// Emit CSV, one row per bill item
        #[arg(long)]
        csv: bool,
        /// Write to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Check the audit hash chain
    VerifyAudit,
    /// Show the audit history of one record
    AuditHistory {
        /// patient, doctor, appointment or bill
        entity: String,
        /// Record id, e.g. P0001
        id: String,
    },
    /// List pending and partially paid bills
    Outstanding,
    /// Delete a patient with all appointments and bills
    PurgePatient {
        /// Patient id, e.g. P0001
        id: String,
        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = CoreConfig::from_env().context("invalid configuration")?;
    if let Some(db) = cli.db {
        config = CoreConfig::with_db_path(db)
            .set_page_size(config.page_size(), config.max_page_size())?
            .set_busy_timeout(config.busy_timeout());
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_directive()));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let core = HospitalCore::open(config).context("failed to open database")?;

    match cli.command {
        Commands::Init => {
            println!("Database ready at {}", core.config().db_path().display());
        }
        Commands::Stats { start, end } => {
            let today = chrono::Utc::now().date_naive();
            let (start, end) = (date_arg(start)?, date_arg(end)?);
            let stats = serde_json::json!({
                "patients": core.patient_statistics(today)?,
                "doctors": core.doctor_statistics()?,
                "appointments": core.appointment_statistics(start, end, today)?,
                "billing": core.billing_statistics(start, end)?,
            });
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::ExportBills {
            start,
            end,
            csv,
            output,
        } => {
            let export = core.export_bills(date_arg(start)?, date_arg(end)?)?;
            let rendered = if csv { export.to_csv() } else { export.to_json()? };
            match output {
                Some(path) => {
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    eprintln!(
                        "Exported {} bill(s) to {}",
                        export.metadata.bill_count,
                        path.display()
                    );
                }
                None => print!("{rendered}"),
            }
        }
        Commands::VerifyAudit => {
            let report = core.verify_audit_chain()?;
            match report.broken_at {
                None => println!("Audit chain intact ({} entries)", report.entries),
                Some(id) => bail!(
                    "audit chain broken at entry {id} ({} entries checked)",
                    report.entries
                ),
            }
        }
        Commands::AuditHistory { entity, id } => {
            let entity: EntityKind = entity.parse()?;
            let history = core.audit_history(entity, &id)?;
            if history.is_empty() {
                println!("No audit entries for {entity} {id}.");
            }
            for entry in history {
                println!(
                    "#{} {} {} {}",
                    entry.id, entry.entry.timestamp, entry.entry.action, entry.entry_hash
                );
            }
        }
        Commands::Outstanding => {
            let bills = core.outstanding_bills()?;
            if bills.is_empty() {
                println!("No outstanding bills.");
            }
            for bill in bills {
                println!(
                    "{}  {}  {:>10}  {}  {}",
                    bill.id,
                    bill.patient_id,
                    bill.total_amount.to_string(),
                    bill.status,
                    bill.date
                );
            }
        }
        Commands::PurgePatient { id, yes } => {
            if !yes {
                bail!("purging {id} deletes all of its appointments and bills; pass --yes to confirm");
            }
            core.purge_patient(&id)?;
            println!("Purged patient {id}");
        }
    }

    Ok(())
}

fn date_arg(value: Option<String>) -> anyhow::Result<Option<NaiveDate>> {
    value
        .map(|v| parse_date(&v).with_context(|| format!("invalid date {v:?}")))
        .transpose()
}
