use anyhow::{Context, Result};
use ev_profile_synth::{allocation, config, generator, loader, output, telemetry};
use config::Config;
use generator::Generator;
use output::DualSink;
use std::sync::Arc;
use telemetry::init_tracing;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cfg = Config::load()?;

    let reference = loader::load_reference_data(
        &cfg.data.segments,
        &cfg.data.charging,
        &cfg.data.temperature,
        cfg.data.delimiter_byte(),
    )
    .context("loading reference tables")?;
    let policies = cfg.policy_book()?;
    let bounds = cfg.temperature.resolve(reference.temperature_bounds())?;

    let counts = allocation::allocate(cfg.run.total_profiles, &reference.class_shares())
        .context("allocating profiles to vehicle classes")?;
    for (class, count) in &counts {
        info!(%class, count, "profiles allocated");
    }

    let seed = generator::resolve_seed(cfg.run.seed);
    let generator = Arc::new(Generator::new(
        Arc::new(reference),
        Arc::new(policies),
        Arc::new(cfg.charging.clone()),
        bounds,
        cfg.run.max_attempts,
    ));

    let report = generator::generate_batch(
        generator,
        generator::plan(&counts),
        seed,
        cfg.run.workers,
        telemetry::shutdown_signal(),
    )
    .await?;

    let mut sink = DualSink::open(&cfg.output)?;
    for profile in &report.profiles {
        sink.emit(profile)?;
    }
    let emitted = sink.finish()?;

    info!(
        seed,
        emitted,
        failed = report.failures.len(),
        skipped_days = report.skipped_days(),
        path = %cfg.output.path.display(),
        "profiles written"
    );
    if report.cancelled {
        warn!(requested = report.requested, emitted, "run was cancelled before completion");
    }
    if report.is_total_failure() {
        anyhow::bail!("no vehicle profile could be generated");
    }
    Ok(())
}
