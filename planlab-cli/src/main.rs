//! PlanLab CLI — validate, simulate, rebalance, recommend and advise over a
//! TOML plan catalog.
//!
//! Commands:
//! - `validate` — run the allocation validator over the catalog (or one plan)
//! - `simulate` — Monte Carlo summary for a plan, amount and horizon
//! - `rebalance` — drift check for one plan, or a full scheduled cycle
//! - `recommend` — ranked plans for a risk profile and amount
//! - `advise` — deviations from the model allocation and risk notes
//!
//! Results are printed as JSON on stdout; logs go to stderr (`RUST_LOG`).

mod catalog;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use planlab_core::{EngineConfig, PlanId, RiskLevel};
use planlab_runner::{export, PlanService, RebalanceDecision, RebalanceStatus};

use crate::catalog::Catalog;

#[derive(Parser)]
#[command(
    name = "planlab",
    about = "PlanLab CLI — investment plan validation, simulation and rebalancing"
)]
struct Cli {
    /// Plan catalog (TOML: [[plans]] plus optional [market.<plan_id>] weights).
    #[arg(long, global = true, default_value = "catalog.toml")]
    catalog: PathBuf,

    /// Engine config (TOML). Defaults apply to anything omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate every plan in the catalog, or a single plan.
    Validate {
        #[arg(long)]
        plan: Option<String>,
    },
    /// Simulate a plan's final-value distribution.
    Simulate {
        #[arg(long)]
        plan: String,

        #[arg(long)]
        amount: f64,

        /// Years to simulate. Defaults to the plan's recommended horizon.
        #[arg(long)]
        horizon: Option<u32>,

        /// Path count. Defaults to `simulation.default_paths`.
        #[arg(long)]
        paths: Option<usize>,

        /// Also write the summary as CSV.
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Check drift and rebalance. Without --plan, runs a full cycle over
    /// every due plan.
    Rebalance {
        #[arg(long)]
        plan: Option<String>,
    },
    /// Rank plans for a risk profile (low, medium, high) and amount.
    Recommend {
        #[arg(long)]
        risk: RiskLevel,

        #[arg(long)]
        amount: f64,

        /// Also write the ranking as CSV.
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Compare a plan with the model allocation for its risk level.
    Advise {
        #[arg(long)]
        plan: String,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("failed to load engine config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let catalog = Catalog::from_file(&cli.catalog)?;
    tracing::info!(
        catalog = %cli.catalog.display(),
        plans = catalog.plans.len(),
        market_snapshots = catalog.market.len(),
        "catalog loaded"
    );
    let (store, market) = catalog.into_collaborators();
    let service = PlanService::new(config, Arc::new(store), Arc::new(market))?;

    match cli.command {
        Commands::Validate { plan } => run_validate(&service, plan),
        Commands::Simulate {
            plan,
            amount,
            horizon,
            paths,
            csv,
        } => run_simulate(&service, plan, amount, horizon, paths, csv),
        Commands::Rebalance { plan } => run_rebalance(&service, plan),
        Commands::Recommend { risk, amount, csv } => run_recommend(&service, risk, amount, csv),
        Commands::Advise { plan } => {
            let advice = service.advise(&PlanId::new(plan))?;
            print_json(&advice)
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("planlab=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{json}");
    Ok(())
}

#[derive(Serialize)]
struct ValidationReport {
    plan_id: PlanId,
    valid: bool,
    errors: Vec<String>,
}

fn run_validate(service: &PlanService, plan: Option<String>) -> Result<()> {
    let plans = match plan {
        Some(id) => vec![service.load_plan(&PlanId::new(id))?],
        None => service.list_plans()?,
    };

    let reports: Vec<ValidationReport> = plans
        .iter()
        .map(|plan| {
            let errors = match service.validate_plan(plan) {
                Ok(_) => Vec::new(),
                Err(errors) => errors.iter().map(ToString::to_string).collect(),
            };
            ValidationReport {
                plan_id: plan.id.clone(),
                valid: errors.is_empty(),
                errors,
            }
        })
        .collect();

    print_json(&reports)?;
    if reports.iter().any(|r| !r.valid) {
        std::process::exit(1);
    }
    Ok(())
}

fn run_simulate(
    service: &PlanService,
    plan: String,
    amount: f64,
    horizon: Option<u32>,
    paths: Option<usize>,
    csv: Option<PathBuf>,
) -> Result<()> {
    let plan_id = PlanId::new(plan);
    let horizon = match horizon {
        Some(h) => h,
        None => service.load_plan(&plan_id)?.horizon_years,
    };
    let paths = paths.unwrap_or(service.config().simulation.default_paths);

    let result = service.simulate(&plan_id, amount, horizon, paths)?;
    if let Some(path) = csv {
        let file = std::fs::File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        export::write_simulation_csv(file, std::slice::from_ref(&result))?;
    }
    print_json(&result)
}

#[derive(Serialize)]
struct CycleReport {
    plan_id: PlanId,
    status: RebalanceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    decision: Option<RebalanceDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn run_rebalance(service: &PlanService, plan: Option<String>) -> Result<()> {
    if let Some(id) = plan {
        let decision = service.check_and_rebalance(&PlanId::new(id))?;
        return print_json(&decision);
    }

    let outcomes = service.run_cycle(chrono::Utc::now())?;
    let reports: Vec<CycleReport> = outcomes
        .into_iter()
        .map(|outcome| {
            let status = outcome.status();
            let (decision, error) = match outcome.result {
                Ok(decision) => (Some(decision), None),
                Err(e) => (None, Some(e.to_string())),
            };
            CycleReport {
                plan_id: outcome.plan_id,
                status,
                decision,
                error,
            }
        })
        .collect();
    print_json(&reports)
}

fn run_recommend(
    service: &PlanService,
    risk: RiskLevel,
    amount: f64,
    csv: Option<PathBuf>,
) -> Result<()> {
    let recommendations = service.recommend(risk, amount)?;
    if let Some(path) = csv {
        let file = std::fs::File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        export::write_recommendations_csv(file, &recommendations)?;
    }
    print_json(&recommendations)
}
