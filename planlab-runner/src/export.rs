//! CSV export of recommendations and simulation summaries.

use std::io::Write;

use anyhow::{Context, Result};
use planlab_core::SimulationResult;

use crate::recommend::Recommendation;

const SIMULATION_COLUMNS: [&str; 15] = [
    "plan_id",
    "investment_amount",
    "horizon_years",
    "num_paths",
    "seed",
    "mean_final_value",
    "median_final_value",
    "min_final_value",
    "max_final_value",
    "success_probability",
    "value_at_risk_95",
    "p5",
    "p25",
    "p75",
    "p95",
];

fn simulation_fields(r: &SimulationResult) -> [String; 15] {
    [
        r.plan_id.to_string(),
        format!("{:.2}", r.investment_amount),
        r.horizon_years.to_string(),
        r.num_paths.to_string(),
        r.seed.to_string(),
        format!("{:.2}", r.mean_final_value),
        format!("{:.2}", r.median_final_value),
        format!("{:.2}", r.min_final_value),
        format!("{:.2}", r.max_final_value),
        format!("{:.4}", r.success_probability),
        format!("{:.2}", r.value_at_risk_95),
        format!("{:.2}", r.percentiles.p5),
        format!("{:.2}", r.percentiles.p25),
        format!("{:.2}", r.percentiles.p75),
        format!("{:.2}", r.percentiles.p95),
    ]
}

// ─── CSV export ─────────────────────────────────────────────────────

/// One row per simulation summary.
pub fn write_simulation_csv<W: Write>(writer: W, results: &[SimulationResult]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(SIMULATION_COLUMNS)
        .context("failed to write simulation CSV header")?;
    for r in results {
        wtr.write_record(simulation_fields(r))
            .with_context(|| format!("failed to write simulation row for {}", r.plan_id))?;
    }
    wtr.flush().context("failed to flush simulation CSV")?;
    Ok(())
}

/// Ranked recommendations: rank, plan metadata, score, then the simulation
/// columns.
pub fn write_recommendations_csv<W: Write>(
    writer: W,
    recommendations: &[Recommendation],
) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header = vec!["rank", "name", "risk_level", "volatility", "score"];
    header.extend(SIMULATION_COLUMNS);
    wtr.write_record(&header)
        .context("failed to write recommendation CSV header")?;

    for (i, rec) in recommendations.iter().enumerate() {
        let mut row = vec![
            (i + 1).to_string(),
            rec.plan.name.clone(),
            rec.plan.risk_level.to_string(),
            format!("{:.4}", rec.plan.volatility),
            format!("{:.6}", rec.score),
        ];
        row.extend(simulation_fields(&rec.simulation));
        wtr.write_record(&row)
            .with_context(|| format!("failed to write recommendation row for {}", rec.plan.id))?;
    }
    wtr.flush().context("failed to flush recommendation CSV")?;
    Ok(())
}
