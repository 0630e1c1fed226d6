#![cfg(test)]
//! Load Testing Suite
//!
//! Large batches over the shipped tables:
//! - Thousands of vehicles across all worker counts
//! - Rejection sampler effort per accepted schedule
//!
//! Key Performance Requirements:
//! - 5000 vehicles finish well within a minute in release builds
//! - Output is identical for any worker count
//! - Default policies accept a schedule within a few hundred candidates on average

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ev_profile_synth::allocation::allocate;
use ev_profile_synth::generator::{generate_batch, plan, Generator};
use ev_profile_synth::loader::load_reference_data;
use ev_profile_synth::simulation::{ChargingPolicy, PolicyBook};

fn build_generator() -> Arc<Generator> {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data");
    let reference = load_reference_data(
        &dir.join("segments.csv"),
        &dir.join("charging.csv"),
        &dir.join("temperature.csv"),
        b',',
    )
    .expect("shipped tables load");
    let bounds = reference.temperature_bounds();

    Arc::new(Generator::new(
        Arc::new(reference),
        Arc::new(PolicyBook::default()),
        Arc::new(ChargingPolicy::default()),
        bounds,
        100_000,
    ))
}

/// Test: Large batch throughput
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Ignore by default as this is a slow test
async fn test_large_batch_throughput() {
    let generator = build_generator();
    let counts = allocate(5000, &generator.reference().class_shares()).unwrap();

    let start = Instant::now();
    let report = generate_batch(generator, plan(&counts), 1, 8, std::future::pending())
        .await
        .unwrap();
    let elapsed = start.elapsed();

    println!("5000 vehicles in {:?}", elapsed);
    println!("  skipped days: {}", report.skipped_days());

    assert_eq!(report.profiles.len(), 5000);
    assert!(report.failures.is_empty());
    assert_eq!(report.skipped_days(), 0);
    assert!(
        elapsed < Duration::from_secs(60),
        "batch took {:?}",
        elapsed
    );
}

/// Test: Worker count does not change results
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_worker_count_does_not_change_output() {
    let generator = build_generator();
    let counts = allocate(500, &generator.reference().class_shares()).unwrap();
    let plan = plan(&counts);

    let mut reference = None;
    for workers in [1, 2, 7, 16] {
        let report = generate_batch(generator.clone(), plan.clone(), 77, workers, std::future::pending())
            .await
            .unwrap();
        match &reference {
            None => reference = Some(report.profiles),
            Some(expected) => assert_eq!(&report.profiles, expected, "workers = {workers}"),
        }
    }
}

/// Test: Rejection effort per accepted schedule
#[tokio::test]
#[ignore]
async fn test_rejection_effort_stays_bounded() {
    let generator = build_generator();
    let counts = allocate(1000, &generator.reference().class_shares()).unwrap();
    let report = generate_batch(generator, plan(&counts), 3, 4, std::future::pending())
        .await
        .unwrap();

    let attempts: Vec<u64> = report
        .profiles
        .iter()
        .flat_map(|p| p.days.iter().map(|d| d.schedule.attempts))
        .collect();
    let mean = attempts.iter().sum::<u64>() as f64 / attempts.len() as f64;
    let max = attempts.iter().max().copied().unwrap_or(0);

    println!("Rejection effort over {} schedules:", attempts.len());
    println!("  mean attempts: {:.1}", mean);
    println!("  max attempts:  {}", max);

    assert!(mean < 500.0, "mean attempts {mean}");
}
