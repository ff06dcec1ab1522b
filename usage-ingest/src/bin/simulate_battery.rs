use anyhow::{bail, Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::env;
use usage_client::{db, simulation::{self, SimulationParameters}};
use usage_ingest::{
    config::AppConfig,
    observability,
    transform::timestamp::{local_day_range, parse_date},
};

fn arg_f64(args: &[String], idx: usize, name: &str, default: f64) -> Result<f64> {
    match args.get(idx) {
        Some(raw) => raw.parse().with_context(|| format!("invalid {name} '{raw}'")),
        None => Ok(default),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        bail!("usage: simulate_battery <start YYYY-MM-DD> <end YYYY-MM-DD> [solar_kw] [battery_kwh] [efficiency]");
    }

    let cfg = AppConfig::load()?;
    let zone = cfg.zone()?;
    let (start, end) = local_day_range(parse_date(&args[1])?, parse_date(&args[2])?, zone)?;

    // Config supplies the defaults; positional args override them.
    let defaults = cfg.parameters()?;
    let params = SimulationParameters::new(
        arg_f64(&args, 3, "solar_kw", defaults.solar_capacity_kw())?,
        arg_f64(&args, 4, "battery_kwh", defaults.battery_capacity_kwh())?,
        arg_f64(&args, 5, "efficiency", defaults.battery_round_trip_efficiency())?,
    )?
    .with_zone(zone);

    let pool = PgPoolOptions::new()
        .max_connections(cfg.store.max_connections)
        .connect(cfg.store.uri()?)
        .await?;

    let intervals = db::load_intervals(&pool, zone, start, end).await?;
    if intervals.is_empty() {
        bail!("no intervals stored between {start} and {end}");
    }

    let result = simulation::simulate(&intervals, &params)?;
    tracing::info!(
        intervals = result.intervals.len(),
        baseline_total = result.baseline_total,
        scenario_total = result.scenario_total,
        delta = result.delta,
        "simulation complete"
    );

    let out = serde_json::json!({
        "parameters": params,
        "intervals": result.intervals.len(),
        "baseline_total": result.baseline_total,
        "scenario_total": result.scenario_total,
        "delta": result.delta,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);

    Ok(())
}
