//! Policy ledger administration binary
//!
//! Runs one ledger operation per invocation against a local sled database.
//! The process acts as the transaction host: it supplies the transaction
//! time (wall clock unless `--at` is given) and commits or discards the
//! operation's writes as a unit.
//!
//! # Environment Variables
//!
//! * `POLICY_LEDGER_DB_PATH` - sled database directory (default: policy-ledger.db)
//! * `POLICY_LEDGER_LOG_LEVEL` - trace, debug, info, warn, error (default: info)
//! * `POLICY_LEDGER_DEFAULT_PROFIT_RATE` - seed for the stored default rate (default: 13)
//! * `POLICY_LEDGER_POLICY_TERM_SECS` - effective to expiration (default: 300)
//! * `POLICY_LEDGER_MIN_PAYMENT_INTERVAL_SECS` - between payments (default: 10)

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use policy_ledger::{
    config::Settings,
    ledger::Ledger,
    policy::{PolicyRequest, PolicyType, TimeStamp},
    service::{PolicyService, PolicyUpdate},
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(author, version, about = "Insurance policy ledger administration")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Ledger database directory, overrides POLICY_LEDGER_DB_PATH
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Transaction time (RFC 3339), defaults to now
    #[arg(long, global = true)]
    at: Option<DateTime<Utc>>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the policy counter and seed the default profit rate (once per ledger)
    Init,
    /// Create a policy, either from a named package or from premium and installments
    Create {
        #[arg(long)]
        holder: String,
        #[arg(long)]
        age: u32,
        #[arg(long, default_value = "")]
        location: String,
        #[arg(long, default_value = "")]
        company: String,
        #[arg(long = "type", default_value = "Health")]
        policy_type: PolicyType,
        /// Silver, Gold or Platinum
        #[arg(long, default_value = "")]
        package: String,
        #[arg(long, default_value = "0")]
        premium: Decimal,
        #[arg(long, default_value_t = 0)]
        installments: u32,
        /// Percent per period; 0 uses the ledger default
        #[arg(long, default_value = "0")]
        profit_rate: Decimal,
    },
    /// Pay one premium installment
    Pay { id: u64, amount: Decimal },
    /// Claim the coverage of a fully paid policy
    Claim { id: u64 },
    /// Cancel a partially paid policy and refund what was paid
    Cancel { id: u64 },
    /// Close a policy whose term has ended
    Expire { id: u64 },
    /// Overwrite policy terms without any status check
    Update {
        id: u64,
        #[arg(long)]
        holder: String,
        #[arg(long = "type")]
        policy_type: PolicyType,
        #[arg(long)]
        premium: Decimal,
        #[arg(long)]
        coverage: Decimal,
        #[arg(long)]
        installments: u32,
        #[arg(long)]
        total_premium: Decimal,
    },
    /// Remove a policy record
    Delete { id: u64 },
    /// Show one policy
    Get { id: u64 },
    /// Show every policy
    List,
    /// Show the highest policy id allocated so far
    Count,
    /// Show the total premium paid on a policy
    TotalPaid { id: u64 },
    /// Show the target installment count of a policy
    Installments { id: u64 },
    /// Change the target installment count of a policy
    SetInstallments { id: u64, installments: u32 },
    /// Show the default profit rate used when none is given
    ProfitRate,
    /// Change the default profit rate for future policies
    SetProfitRate { rate: Decimal },
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = Settings::from_env().context("failed to load settings")?;
    init_tracing(&settings.log_level);

    let db_path = cli.db.clone().unwrap_or_else(|| settings.db_path.clone());
    let ledger = Ledger::open(&db_path)
        .with_context(|| format!("failed to open ledger at {}", db_path.display()))?;
    let service = PolicyService::new(settings.engine());
    let at = cli.at.map(TimeStamp::from).unwrap_or_else(TimeStamp::now);

    tracing::debug!(db = %db_path.display(), %at, "ledger opened");

    match cli.command {
        Commands::Init => {
            ledger.submit(at, |tx| service.init_ledger(tx))?;
            println!("Ledger initialised");
        }
        Commands::Create {
            holder,
            age,
            location,
            company,
            policy_type,
            package,
            premium,
            installments,
            profit_rate,
        } => {
            let request = PolicyRequest::new(policy_type)
                .set_holder_name(&holder)
                .set_age(age)
                .set_location(&location)
                .set_company_name(&company)
                .set_package(&package)
                .set_premium(premium)
                .set_installment_no(installments)
                .set_profit_rate(profit_rate);
            let id = ledger.submit(at, |tx| service.create_policy(tx, request))?;
            println!("Created policy {id}");
        }
        Commands::Pay { id, amount } => {
            let policy = ledger.submit(at, |tx| service.pay_premium(tx, id, amount))?;
            print_json(&policy)?;
        }
        Commands::Claim { id } => {
            let policy = ledger.submit(at, |tx| service.claim_coverage(tx, id))?;
            print_json(&policy)?;
        }
        Commands::Cancel { id } => {
            let policy = ledger.submit(at, |tx| service.cancel_policy(tx, id))?;
            print_json(&policy)?;
        }
        Commands::Expire { id } => {
            let policy = ledger.submit(at, |tx| service.expire_policy(tx, id))?;
            print_json(&policy)?;
        }
        Commands::Update {
            id,
            holder,
            policy_type,
            premium,
            coverage,
            installments,
            total_premium,
        } => {
            let update = PolicyUpdate {
                holder_name: holder,
                policy_type,
                premium,
                coverage,
                installment_no: installments,
                total_premium_to_pay: total_premium,
            };
            let policy = ledger.submit(at, |tx| service.update_policy(tx, id, update))?;
            print_json(&policy)?;
        }
        Commands::Delete { id } => {
            ledger.submit(at, |tx| service.delete_policy(tx, id))?;
            println!("Deleted policy {id}");
        }
        Commands::Get { id } => {
            let policy = ledger.evaluate(at, |tx| service.get_policy(tx, id))?;
            print_json(&policy)?;
        }
        Commands::List => {
            let policies = ledger.evaluate(at, |tx| service.list_policies(tx))?;
            print_json(&policies)?;
        }
        Commands::Count => {
            let count = ledger.evaluate(at, |tx| service.policy_count(tx))?;
            println!("{count}");
        }
        Commands::TotalPaid { id } => {
            let paid = ledger.evaluate(at, |tx| service.total_paid(tx, id))?;
            println!("{paid}");
        }
        Commands::Installments { id } => {
            let installments = ledger.evaluate(at, |tx| service.installment_no(tx, id))?;
            println!("{installments}");
        }
        Commands::SetInstallments { id, installments } => {
            ledger.submit(at, |tx| service.set_installment_no(tx, id, installments))?;
            println!("Installment number for policy {id} set to {installments}");
        }
        Commands::ProfitRate => {
            let rate = ledger.evaluate(at, |tx| service.default_profit_rate(tx))?;
            println!("{rate}");
        }
        Commands::SetProfitRate { rate } => {
            ledger.submit(at, |tx| service.set_default_profit_rate(tx, rate))?;
            println!("Default profit rate set to {rate}");
        }
    }

    Ok(())
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries command output, logs go to stderr
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
