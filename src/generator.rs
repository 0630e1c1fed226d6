//! # Profile Generator
//!
//! Runs the per-vehicle pipeline (segment, purpose, temperature, vehicle,
//! then schedule and energy for each day type) and fans a batch of vehicles
//! out over blocking worker tasks.
//!
//! Every vehicle gets its own seed drawn in index order from the master
//! seed, so a batch is reproducible regardless of the worker count or task
//! scheduling. Results are re-sequenced by vehicle index.

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use strum::IntoEnumIterator;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::domain::{DayType, Span, VehicleClass};
use crate::error::{GenerationError, ScheduleError};
use crate::profile::{DayProfile, SkippedDay, VehicleProfile};
use crate::reference::ReferenceData;
use crate::simulation::{
    calculate_energy, sample_temperature, sample_vehicle, ChargingPolicy, PolicyBook,
    ScheduleSampler,
};

/// Shared, read-only inputs of a generation run
#[derive(Debug, Clone)]
pub struct Generator {
    reference: Arc<ReferenceData>,
    policies: Arc<PolicyBook>,
    charging: Arc<ChargingPolicy>,
    temperature_bounds: Span,
    max_attempts: u64,
}

impl Generator {
    pub fn new(
        reference: Arc<ReferenceData>,
        policies: Arc<PolicyBook>,
        charging: Arc<ChargingPolicy>,
        temperature_bounds: Span,
        max_attempts: u64,
    ) -> Self {
        Self {
            reference,
            policies,
            charging,
            temperature_bounds,
            max_attempts,
        }
    }

    pub fn reference(&self) -> &ReferenceData {
        &self.reference
    }

    /// Generate one vehicle and both of its day profiles.
    ///
    /// A day whose schedule cannot be sampled is recorded as skipped; lookup
    /// failures abort the vehicle.
    pub fn generate_vehicle(
        &self,
        index: usize,
        class: VehicleClass,
        seed: u64,
    ) -> Result<VehicleProfile, GenerationError> {
        let mut rng = StdRng::seed_from_u64(seed);

        let spec = self.reference.pick_segment(class, &mut rng)?;
        let purpose = self.policies.pick_purpose(class, &mut rng);
        let temperature = sample_temperature(&self.reference, self.temperature_bounds, &mut rng)?;
        let chargers = self.reference.compatible_chargers(class)?;
        let vehicle = sample_vehicle(spec, temperature, chargers, &self.charging, &mut rng)?;

        let mut days = Vec::with_capacity(2);
        let mut skipped = Vec::new();
        for day in DayType::iter() {
            let policy = self.policies.day_policy(purpose, day);
            let sampler = ScheduleSampler::new(policy, spec, self.max_attempts)?;

            match sampler.sample(&mut rng) {
                Ok(schedule) => {
                    let energy =
                        calculate_energy(&vehicle, schedule.total_distance_km, &self.charging, &mut rng);
                    days.push(DayProfile::build(day, purpose, &vehicle, schedule, energy));
                }
                Err(ScheduleError::Unsatisfiable { attempts }) => {
                    let err = GenerationError::ConstraintUnsatisfiable {
                        purpose,
                        day,
                        attempts,
                    };
                    warn!(index, %class, error = %err, "day profile skipped");
                    skipped.push(SkippedDay { day, attempts });
                }
            }
        }

        debug!(index, %class, segment = %spec.segment, %purpose, "vehicle generated");
        Ok(VehicleProfile {
            index,
            purpose,
            vehicle,
            days,
            skipped,
        })
    }
}

/// Vehicle class for every batch index, classes in allocation order
pub fn plan(counts: &BTreeMap<VehicleClass, usize>) -> Vec<VehicleClass> {
    counts
        .iter()
        .flat_map(|(&class, &n)| std::iter::repeat(class).take(n))
        .collect()
}

/// Per-vehicle seeds, drawn in index order from the master seed
pub fn vehicle_seeds(master_seed: u64, count: usize) -> Vec<u64> {
    let mut rng = StdRng::seed_from_u64(master_seed);
    (0..count).map(|_| rng.gen()).collect()
}

/// Configured seed, or a fresh one from entropy
pub fn resolve_seed(seed: Option<u64>) -> u64 {
    seed.unwrap_or_else(|| StdRng::from_entropy().gen())
}

#[derive(Debug, Clone)]
pub struct VehicleFailure {
    pub index: usize,
    pub class: VehicleClass,
    pub error: GenerationError,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub requested: usize,
    /// Completed vehicles, ordered by index
    pub profiles: Vec<VehicleProfile>,
    pub failures: Vec<VehicleFailure>,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn skipped_days(&self) -> usize {
        self.profiles.iter().map(|p| p.skipped.len()).sum()
    }

    /// Nothing usable came out of a non-empty batch
    pub fn is_total_failure(&self) -> bool {
        self.requested > 0 && self.profiles.is_empty()
    }
}

type Outcome = (usize, VehicleClass, Result<VehicleProfile, GenerationError>);

/// Generate `plan` in parallel over `workers` blocking tasks.
///
/// Resolving `shutdown` stops workers before their next vehicle; the report
/// then holds whatever finished.
pub async fn generate_batch<S>(
    generator: Arc<Generator>,
    plan: Vec<VehicleClass>,
    master_seed: u64,
    workers: usize,
    shutdown: S,
) -> Result<BatchReport>
where
    S: Future<Output = ()>,
{
    let requested = plan.len();
    let jobs: Vec<(usize, VehicleClass, u64)> = plan
        .into_iter()
        .zip(vehicle_seeds(master_seed, requested))
        .enumerate()
        .map(|(index, (class, seed))| (index, class, seed))
        .collect();
    let chunk_size = requested.div_ceil(workers.max(1)).max(1);
    let cancel = Arc::new(AtomicBool::new(false));

    info!(vehicles = requested, workers, master_seed, "generation started");

    let mut set = JoinSet::new();
    for chunk in jobs.chunks(chunk_size) {
        let chunk = chunk.to_vec();
        let generator = Arc::clone(&generator);
        let cancel = Arc::clone(&cancel);
        set.spawn_blocking(move || {
            chunk
                .into_iter()
                .map_while(|(index, class, seed)| {
                    if cancel.load(Ordering::Relaxed) {
                        return None;
                    }
                    Some((index, class, generator.generate_vehicle(index, class, seed)))
                })
                .collect::<Vec<Outcome>>()
        });
    }

    tokio::pin!(shutdown);
    let mut outcomes: Vec<Outcome> = Vec::with_capacity(requested);
    let mut cancelled = false;
    loop {
        tokio::select! {
            joined = set.join_next() => match joined {
                Some(result) => outcomes.extend(result.context("generation worker failed")?),
                None => break,
            },
            _ = &mut shutdown, if !cancelled => {
                warn!("shutdown requested, stopping generation");
                cancelled = true;
                cancel.store(true, Ordering::Relaxed);
            }
        }
    }
    outcomes.sort_by_key(|(index, ..)| *index);

    let mut report = BatchReport {
        requested,
        cancelled,
        ..Default::default()
    };
    for (index, class, outcome) in outcomes {
        match outcome {
            Ok(profile) => report.profiles.push(profile),
            Err(error) => {
                error!(index, %class, error = %error, "vehicle generation failed");
                report.failures.push(VehicleFailure { index, class, error });
            }
        }
    }

    info!(
        requested,
        generated = report.profiles.len(),
        failed = report.failures.len(),
        skipped_days = report.skipped_days(),
        cancelled,
        "generation finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::allocate;
    use crate::domain::Purpose;
    use crate::error::DataIntegrityError;
    use crate::reference::fixtures::{band, chargers, reference_data, segment};
    use crate::simulation::{DistanceBin, ScheduleConstraint};

    fn generator_with(reference: ReferenceData, policies: PolicyBook, max_attempts: u64) -> Arc<Generator> {
        let bounds = reference.temperature_bounds();
        Arc::new(Generator::new(
            Arc::new(reference),
            Arc::new(policies),
            Arc::new(ChargingPolicy::default()),
            bounds,
            max_attempts,
        ))
    }

    fn generator() -> Arc<Generator> {
        generator_with(reference_data(), PolicyBook::default(), 100_000)
    }

    #[test]
    fn test_vehicle_is_reproducible_from_its_seed() {
        let generator = generator();
        for class in VehicleClass::iter() {
            let a = generator.generate_vehicle(0, class, 99).unwrap();
            let b = generator.generate_vehicle(0, class, 99).unwrap();
            assert_eq!(a, b);
            assert_eq!(a.class(), class);
            assert_eq!(a.days.len(), 2);
            assert!(class.purposes().contains(&a.purpose));
            assert_eq!(a.days[0].day, DayType::Workday);
            assert_eq!(a.days[1].day, DayType::Weekend);
        }
    }

    #[test]
    fn test_vehicle_days_share_identity() {
        let generator = generator();
        let profile = generator.generate_vehicle(3, VehicleClass::Car, 1234).unwrap();
        let workday = profile.day(DayType::Workday).unwrap();
        let weekend = profile.day(DayType::Weekend).unwrap();

        assert_eq!(workday.field("Temperature"), weekend.field("Temperature"));
        assert_eq!(workday.field("ChargingType"), weekend.field("ChargingType"));
        assert_eq!(workday.purpose, weekend.purpose);
    }

    #[test]
    fn test_plan_and_seeds() {
        let counts = BTreeMap::from([(VehicleClass::Car, 2), (VehicleClass::Bus, 1)]);
        assert_eq!(
            plan(&counts),
            vec![VehicleClass::Car, VehicleClass::Car, VehicleClass::Bus]
        );
        assert_eq!(vehicle_seeds(5, 4), vehicle_seeds(5, 4));
        assert_eq!(vehicle_seeds(5, 4)[..2], vehicle_seeds(5, 2)[..]);
        assert_ne!(vehicle_seeds(5, 2), vehicle_seeds(6, 2));
    }

    #[tokio::test]
    async fn test_batch_is_independent_of_worker_count() {
        let generator = generator();
        let counts = allocate(20, &generator.reference().class_shares()).unwrap();
        let plan = plan(&counts);

        let single = generate_batch(generator.clone(), plan.clone(), 42, 1, std::future::pending())
            .await
            .unwrap();
        let parallel = generate_batch(generator, plan, 42, 4, std::future::pending())
            .await
            .unwrap();

        assert_eq!(single.profiles.len(), 20);
        assert!(!single.cancelled);
        assert_eq!(single.profiles, parallel.profiles);
        for (i, profile) in parallel.profiles.iter().enumerate() {
            assert_eq!(profile.index, i);
        }
    }

    #[tokio::test]
    async fn test_missing_compatibility_fails_only_that_vehicle() {
        let reference = ReferenceData::new(
            vec![
                segment(VehicleClass::Car, "Kompaktklasse", 90.0, (40.0, 60.0), (300.0, 400.0)),
                segment(VehicleClass::Bus, "Solobus", 10.0, (250.0, 400.0), (250.0, 350.0)),
            ],
            vec![chargers(VehicleClass::Car, &["AC_11kW"])],
            vec![band(-10.0, 35.0, (80.0, 100.0), (75.0, 100.0))],
        )
        .unwrap();
        let generator = generator_with(reference, PolicyBook::default(), 100_000);
        let plan = vec![VehicleClass::Car, VehicleClass::Bus, VehicleClass::Car];

        let report = generate_batch(generator, plan, 7, 2, std::future::pending())
            .await
            .unwrap();

        assert_eq!(report.profiles.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 1);
        assert_eq!(
            report.failures[0].error,
            GenerationError::DataIntegrity(DataIntegrityError::MissingCompatibility(VehicleClass::Bus))
        );
        assert!(!report.is_total_failure());
    }

    #[test]
    fn test_unsatisfiable_day_is_skipped() {
        let mut policies = PolicyBook::default();
        policies.car_purpose_weights.job_education = 0.0;
        policies.car_purpose_weights.service = 0.0;
        policies.private.workday.constraints.push(ScheduleConstraint::DistanceRange {
            min_km: 5_000.0,
            max_km: 6_000.0,
        });
        // weekend accepts its first candidate
        policies.private.weekend.distance_bins = vec![DistanceBin::UNBOUNDED];
        policies.private.weekend.constraints.clear();
        let generator = generator_with(reference_data(), policies, 25);

        let profile = generator.generate_vehicle(0, VehicleClass::Car, 11).unwrap();
        assert_eq!(profile.purpose, Purpose::Private);
        assert_eq!(
            profile.skipped,
            vec![SkippedDay {
                day: DayType::Workday,
                attempts: 25
            }]
        );
        assert_eq!(profile.days.len(), 1);
        assert_eq!(profile.days[0].day, DayType::Weekend);
        assert_eq!(profile.days[0].schedule.attempts, 1);
        assert!(!profile.is_complete());
    }

    #[tokio::test]
    async fn test_shutdown_keeps_finished_vehicles_in_order() {
        let generator = generator();
        let plan = vec![VehicleClass::Car; 200];

        let report = generate_batch(generator, plan, 3, 2, std::future::ready(()))
            .await
            .unwrap();

        assert!(report.profiles.len() + report.failures.len() <= 200);
        assert!(report
            .profiles
            .windows(2)
            .all(|w| w[0].index < w[1].index));
    }
}
