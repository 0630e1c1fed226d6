//! # Schedule Policies
//!
//! Everything that differs between trip purposes lives here as data: the
//! trip-chain model and its time windows, the distance-bin odds, the road
//! mix, where speeds come from and which acceptance predicates apply. One
//! [`DayPolicy`] per purpose and day type; the sampler itself is generic.
//!
//! The built-in book can be replaced by a TOML file with the same shape
//! (see [`PolicyBook::from_toml_file`]).

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::{CountSpan, DayType, Purpose, Span, VehicleClass};
use crate::error::DataIntegrityError;

/// Half-open distance interval `[min_km, max_km)` with its selection weight
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceBin {
    pub min_km: f64,
    pub max_km: Option<f64>,
    pub weight: f64,
}

impl DistanceBin {
    pub const UNBOUNDED: DistanceBin = DistanceBin {
        min_km: 0.0,
        max_km: None,
        weight: 1.0,
    };

    pub fn contains(&self, distance_km: f64) -> bool {
        distance_km >= self.min_km && self.max_km.map_or(true, |max| distance_km < max)
    }
}

/// Share of running time per road type; urban takes the remainder
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoadMix {
    pub highway_percent: Span,
    pub rural_percent: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SpeedSource {
    /// Class-wide nominal speeds, each jittered by ±`jitter_kmh`
    Nominal {
        urban_kmh: f64,
        rural_kmh: f64,
        highway_kmh: f64,
        jitter_kmh: f64,
    },
    /// Speeds from the segment table row
    Segment { jitter_kmh: f64 },
}

/// Trips chained back to back: start, drive, stop, drive, ...
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainedModel {
    pub trip_count: CountSpan,
    pub first_start_h: Span,
    pub first_duration_h: Span,
    pub first_stop_h: Span,
    pub other_duration_h: Span,
    pub other_stop_h: Span,
    /// Clock times wrap past midnight instead of running over 24h
    #[serde(default)]
    pub wrap_midnight: bool,
}

/// Line service: an even number of equal-length runs with one shared layover
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShuttleModel {
    pub trip_pairs: CountSpan,
    pub trip_length_km: Span,
    pub first_start_h: Span,
    pub stop_h: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleModel {
    Chained(ChainedModel),
    Shuttle(ShuttleModel),
}

/// Acceptance predicate; a candidate schedule must satisfy every entry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleConstraint {
    /// Last trip ends by 24h
    EndsBeforeMidnight,
    /// First trip at most `tolerance_h` longer than all other trips together
    BalancedFirstTrip { tolerance_h: f64 },
    /// Total distance inside the day's pre-drawn bin
    DistanceInBin,
    TotalStopTime { min_h: f64, max_h: f64 },
    /// First start to last end
    ShiftWindow { min_h: f64, max_h: f64 },
    RunningTime { min_h: f64, max_h: f64 },
    DistanceRange { min_km: f64, max_km: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayPolicy {
    pub model: ScheduleModel,
    pub distance_bins: Vec<DistanceBin>,
    pub road_mix: RoadMix,
    pub speeds: SpeedSource,
    pub constraints: Vec<ScheduleConstraint>,
}

impl DayPolicy {
    /// Pre-select the day's distance bin by weight
    pub fn pick_distance_bin<R: Rng + ?Sized>(&self, rng: &mut R) -> DistanceBin {
        self.distance_bins
            .choose_weighted(rng, |b| b.weight)
            .copied()
            .unwrap_or(DistanceBin::UNBOUNDED)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurposePolicy {
    pub workday: DayPolicy,
    pub weekend: DayPolicy,
}

impl PurposePolicy {
    pub fn get(&self, day: DayType) -> &DayPolicy {
        match day {
            DayType::Workday => &self.workday,
            DayType::Weekend => &self.weekend,
        }
    }
}

/// How car owners split across purposes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CarPurposeWeights {
    pub job_education: f64,
    pub private: f64,
    pub service: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyBook {
    pub car_purpose_weights: CarPurposeWeights,
    pub job_education: PurposePolicy,
    pub private: PurposePolicy,
    pub service: PurposePolicy,
    pub van: PurposePolicy,
    pub truck: PurposePolicy,
    pub bus: PurposePolicy,
}

impl PolicyBook {
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading policy book {}", path.display()))?;
        let book: PolicyBook = toml::from_str(&text)
            .with_context(|| format!("parsing policy book {}", path.display()))?;
        book.validate()?;
        Ok(book)
    }

    pub fn purpose(&self, purpose: Purpose) -> &PurposePolicy {
        match purpose {
            Purpose::JobEducation => &self.job_education,
            Purpose::Private => &self.private,
            Purpose::Service => &self.service,
            Purpose::Van => &self.van,
            Purpose::Truck => &self.truck,
            Purpose::Bus => &self.bus,
        }
    }

    pub fn day_policy(&self, purpose: Purpose, day: DayType) -> &DayPolicy {
        self.purpose(purpose).get(day)
    }

    /// Draw the purpose a vehicle drives for; fixed for everything but cars
    pub fn pick_purpose<R: Rng + ?Sized>(&self, class: VehicleClass, rng: &mut R) -> Purpose {
        match class {
            VehicleClass::Car => {
                let w = self.car_purpose_weights;
                let options = [
                    (Purpose::JobEducation, w.job_education),
                    (Purpose::Private, w.private),
                    (Purpose::Service, w.service),
                ];
                options
                    .choose_weighted(rng, |(_, weight)| *weight)
                    .map(|(purpose, _)| *purpose)
                    .unwrap_or(Purpose::Private)
            }
            VehicleClass::Van => Purpose::Van,
            VehicleClass::Truck => Purpose::Truck,
            VehicleClass::Bus => Purpose::Bus,
        }
    }

    /// Reject ranges the samplers cannot draw from
    pub fn validate(&self) -> Result<(), DataIntegrityError> {
        use strum::IntoEnumIterator;

        let w = self.car_purpose_weights;
        let weights = [w.job_education, w.private, w.service];
        let total: f64 = weights.iter().sum();
        if weights.iter().any(|weight| *weight < 0.0 || !weight.is_finite()) || total <= 0.0 {
            return Err(invalid("car_purpose_weights", "purpose_weight", 0.0, total));
        }

        for purpose in Purpose::iter() {
            for day in DayType::iter() {
                let key = format!("{purpose}/{day}");
                validate_day(&key, self.day_policy(purpose, day))?;
            }
        }
        Ok(())
    }
}

fn invalid(key: &str, field: &'static str, min: f64, max: f64) -> DataIntegrityError {
    DataIntegrityError::InvalidRange {
        table: "policies",
        key: key.to_string(),
        field,
        min,
        max,
    }
}

fn check(key: &str, field: &'static str, span: Span) -> Result<(), DataIntegrityError> {
    if span.is_valid() {
        Ok(())
    } else {
        Err(invalid(key, field, span.min, span.max))
    }
}

fn check_count(key: &str, field: &'static str, span: CountSpan) -> Result<(), DataIntegrityError> {
    if span.is_valid() && span.min >= 1 {
        Ok(())
    } else {
        Err(invalid(key, field, f64::from(span.min), f64::from(span.max)))
    }
}

fn validate_day(key: &str, policy: &DayPolicy) -> Result<(), DataIntegrityError> {
    match &policy.model {
        ScheduleModel::Chained(m) => {
            check_count(key, "trip_count", m.trip_count)?;
            check(key, "first_start_h", m.first_start_h)?;
            check(key, "first_duration_h", m.first_duration_h)?;
            check(key, "first_stop_h", m.first_stop_h)?;
            check(key, "other_duration_h", m.other_duration_h)?;
            check(key, "other_stop_h", m.other_stop_h)?;
        }
        ScheduleModel::Shuttle(m) => {
            check_count(key, "trip_pairs", m.trip_pairs)?;
            check(key, "trip_length_km", m.trip_length_km)?;
            check(key, "first_start_h", m.first_start_h)?;
            check(key, "stop_h", m.stop_h)?;
        }
    }

    for bin in &policy.distance_bins {
        if let Some(max) = bin.max_km {
            check(key, "distance_bin", Span::new(bin.min_km, max))?;
        }
        if bin.weight < 0.0 || !bin.weight.is_finite() {
            return Err(invalid(key, "distance_bin_weight", 0.0, bin.weight));
        }
    }
    let bin_weight: f64 = policy.distance_bins.iter().map(|b| b.weight).sum();
    if bin_weight <= 0.0 {
        return Err(invalid(key, "distance_bin_weight", 0.0, bin_weight));
    }

    check(key, "highway_percent", policy.road_mix.highway_percent)?;
    check(key, "rural_percent", policy.road_mix.rural_percent)?;
    let road_total = policy.road_mix.highway_percent.max + policy.road_mix.rural_percent.max;
    if road_total > 100.0 {
        return Err(invalid(key, "road_mix", 0.0, road_total));
    }

    for constraint in &policy.constraints {
        match *constraint {
            ScheduleConstraint::TotalStopTime { min_h, max_h }
            | ScheduleConstraint::ShiftWindow { min_h, max_h }
            | ScheduleConstraint::RunningTime { min_h, max_h } => {
                check(key, "constraint_hours", Span::new(min_h, max_h))?
            }
            ScheduleConstraint::DistanceRange { min_km, max_km } => {
                check(key, "constraint_km", Span::new(min_km, max_km))?
            }
            ScheduleConstraint::EndsBeforeMidnight
            | ScheduleConstraint::BalancedFirstTrip { .. }
            | ScheduleConstraint::DistanceInBin => {}
        }
    }
    Ok(())
}

// ============================================================================
// Built-in Policy Book
// ============================================================================

const FIRST_TRIP_TOLERANCE_H: f64 = 10.0 / 60.0;

fn bins(spec: &[(f64, Option<f64>, f64)]) -> Vec<DistanceBin> {
    spec.iter()
        .map(|&(min_km, max_km, weight)| DistanceBin {
            min_km,
            max_km,
            weight,
        })
        .collect()
}

/// Short / medium / long with the given odds
fn car_bins(short: f64, medium: f64, long: f64) -> Vec<DistanceBin> {
    bins(&[
        (0.0, Some(100.0), short),
        (100.0, Some(300.0), medium),
        (300.0, None, long),
    ])
}

fn chained_constraints() -> Vec<ScheduleConstraint> {
    vec![
        ScheduleConstraint::EndsBeforeMidnight,
        ScheduleConstraint::BalancedFirstTrip {
            tolerance_h: FIRST_TRIP_TOLERANCE_H,
        },
        ScheduleConstraint::DistanceInBin,
    ]
}

fn car_roads() -> (RoadMix, SpeedSource) {
    (
        RoadMix {
            highway_percent: Span::fixed(33.0),
            rural_percent: Span::fixed(41.0),
        },
        SpeedSource::Nominal {
            urban_kmh: 30.0,
            rural_kmh: 65.0,
            highway_kmh: 110.0,
            jitter_kmh: 5.0,
        },
    )
}

#[allow(clippy::too_many_arguments)]
fn chained(
    trips: (u32, u32),
    start: (f64, f64),
    first_duration: (f64, f64),
    first_stop: (f64, f64),
    other_duration: (f64, f64),
    other_stop: (f64, f64),
    wrap_midnight: bool,
) -> ScheduleModel {
    ScheduleModel::Chained(ChainedModel {
        trip_count: trips.into(),
        first_start_h: start.into(),
        first_duration_h: first_duration.into(),
        first_stop_h: first_stop.into(),
        other_duration_h: other_duration.into(),
        other_stop_h: other_stop.into(),
        wrap_midnight,
    })
}

fn car_day(model: ScheduleModel, distance_bins: Vec<DistanceBin>, extra: &[ScheduleConstraint]) -> DayPolicy {
    let (road_mix, speeds) = car_roads();
    let mut constraints = chained_constraints();
    constraints.extend_from_slice(extra);
    DayPolicy {
        model,
        distance_bins,
        road_mix,
        speeds,
        constraints,
    }
}

fn service_constraints() -> [ScheduleConstraint; 2] {
    [
        ScheduleConstraint::TotalStopTime { min_h: 1.0, max_h: 3.0 },
        ScheduleConstraint::ShiftWindow { min_h: 4.0, max_h: 10.0 },
    ]
}

fn van_day(model: ScheduleModel, distance_bins: Vec<DistanceBin>) -> DayPolicy {
    DayPolicy {
        model,
        distance_bins,
        road_mix: RoadMix {
            highway_percent: Span::fixed(30.0),
            rural_percent: Span::fixed(40.0),
        },
        speeds: SpeedSource::Segment { jitter_kmh: 0.0 },
        constraints: chained_constraints(),
    }
}

fn truck_day(model: ScheduleModel, distance_bins: Vec<DistanceBin>) -> DayPolicy {
    DayPolicy {
        model,
        distance_bins,
        // 61 % highway / 25 % rural, each ±5
        road_mix: RoadMix {
            highway_percent: Span::new(56.0, 66.0),
            rural_percent: Span::new(20.0, 30.0),
        },
        speeds: SpeedSource::Segment { jitter_kmh: 0.0 },
        constraints: vec![
            ScheduleConstraint::BalancedFirstTrip {
                tolerance_h: FIRST_TRIP_TOLERANCE_H,
            },
            ScheduleConstraint::DistanceInBin,
            ScheduleConstraint::RunningTime { min_h: 3.0, max_h: 7.0 },
            ScheduleConstraint::ShiftWindow { min_h: 4.0, max_h: 10.0 },
        ],
    }
}

/// Shuttle day of 3 to 7 trip pairs within 80–180 km and 5–7 h running
fn bus_day(start: (f64, f64)) -> DayPolicy {
    DayPolicy {
        model: ScheduleModel::Shuttle(ShuttleModel {
            trip_pairs: CountSpan::new(3, 7),
            trip_length_km: Span::new(5.0, 25.0),
            first_start_h: start.into(),
            stop_h: Span::new(0.1, 0.5),
        }),
        distance_bins: vec![DistanceBin::UNBOUNDED],
        road_mix: RoadMix {
            highway_percent: Span::fixed(5.0),
            rural_percent: Span::fixed(25.0),
        },
        speeds: SpeedSource::Nominal {
            urban_kmh: 18.0,
            rural_kmh: 40.0,
            highway_kmh: 60.0,
            jitter_kmh: 5.0,
        },
        constraints: vec![
            ScheduleConstraint::EndsBeforeMidnight,
            ScheduleConstraint::DistanceRange {
                min_km: 80.0,
                max_km: 180.0,
            },
            ScheduleConstraint::RunningTime { min_h: 5.0, max_h: 7.0 },
        ],
    }
}

impl Default for PolicyBook {
    fn default() -> Self {
        Self {
            car_purpose_weights: CarPurposeWeights {
                job_education: 45.0,
                private: 40.0,
                service: 15.0,
            },
            job_education: PurposePolicy {
                workday: car_day(
                    chained((2, 4), (6.0, 9.0), (0.25, 1.5), (4.0, 9.0), (0.25, 1.5), (0.25, 2.0), false),
                    car_bins(70.0, 25.0, 5.0),
                    &[],
                ),
                weekend: car_day(
                    chained((2, 3), (8.0, 12.0), (0.25, 2.0), (1.0, 6.0), (0.25, 2.0), (0.5, 3.0), false),
                    car_bins(75.0, 20.0, 5.0),
                    &[],
                ),
            },
            private: PurposePolicy {
                workday: car_day(
                    chained((2, 4), (7.0, 17.0), (0.2, 2.5), (0.5, 4.0), (0.2, 2.5), (0.25, 3.0), false),
                    car_bins(60.0, 30.0, 10.0),
                    &[],
                ),
                weekend: car_day(
                    chained((2, 4), (8.0, 16.0), (0.2, 3.0), (0.5, 5.0), (0.2, 3.0), (0.25, 3.0), false),
                    car_bins(50.0, 35.0, 15.0),
                    &[],
                ),
            },
            service: PurposePolicy {
                workday: car_day(
                    chained((2, 4), (6.0, 10.0), (0.25, 2.0), (0.5, 3.0), (0.25, 2.0), (0.25, 1.5), false),
                    car_bins(20.0, 60.0, 20.0),
                    &service_constraints(),
                ),
                weekend: car_day(
                    chained((2, 3), (7.0, 11.0), (0.25, 2.0), (0.5, 3.0), (0.25, 2.0), (0.25, 1.5), false),
                    car_bins(40.0, 50.0, 10.0),
                    &service_constraints(),
                ),
            },
            van: PurposePolicy {
                workday: van_day(
                    chained((2, 4), (6.0, 9.0), (0.2, 2.0), (0.5, 3.0), (0.2, 2.0), (0.25, 2.0), false),
                    bins(&[(0.0, Some(80.0), 50.0), (80.0, Some(200.0), 40.0), (200.0, None, 10.0)]),
                ),
                weekend: van_day(
                    chained((2, 3), (8.0, 11.0), (0.2, 1.5), (0.5, 3.0), (0.2, 1.5), (0.5, 3.0), false),
                    bins(&[(0.0, Some(80.0), 70.0), (80.0, Some(200.0), 25.0), (200.0, None, 5.0)]),
                ),
            },
            truck: PurposePolicy {
                workday: truck_day(
                    chained((2, 4), (3.0, 22.0), (1.0, 3.0), (0.5, 2.0), (0.75, 2.5), (0.5, 1.5), true),
                    bins(&[(0.0, Some(250.0), 30.0), (250.0, Some(400.0), 50.0), (400.0, None, 20.0)]),
                ),
                weekend: truck_day(
                    chained((2, 3), (4.0, 20.0), (1.0, 3.0), (0.5, 2.0), (0.75, 2.5), (0.5, 1.5), true),
                    bins(&[(0.0, Some(250.0), 50.0), (250.0, Some(400.0), 40.0), (400.0, None, 10.0)]),
                ),
            },
            bus: PurposePolicy {
                workday: bus_day((5.0, 7.0)),
                weekend: bus_day((6.0, 9.0)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_default_book_is_valid() {
        PolicyBook::default().validate().unwrap();
    }

    #[test]
    fn test_distance_bin_is_half_open() {
        let bin = DistanceBin {
            min_km: 100.0,
            max_km: Some(300.0),
            weight: 1.0,
        };
        assert!(bin.contains(100.0));
        assert!(bin.contains(299.9));
        assert!(!bin.contains(300.0));
        assert!(!bin.contains(99.9));
        assert!(DistanceBin::UNBOUNDED.contains(5000.0));
    }

    #[test]
    fn test_private_bin_odds() {
        let book = PolicyBook::default();
        let policy = book.day_policy(Purpose::Private, DayType::Workday);
        let mut rng = StdRng::seed_from_u64(17);

        let mut counts = [0usize; 3];
        for _ in 0..10_000 {
            let bin = policy.pick_distance_bin(&mut rng);
            let idx = policy
                .distance_bins
                .iter()
                .position(|b| *b == bin)
                .unwrap();
            counts[idx] += 1;
        }
        // 60 / 30 / 10
        assert!((5700..6300).contains(&counts[0]), "{counts:?}");
        assert!((2700..3300).contains(&counts[1]), "{counts:?}");
        assert!((800..1200).contains(&counts[2]), "{counts:?}");
    }

    #[test]
    fn test_pick_purpose() {
        let book = PolicyBook::default();
        let mut rng = StdRng::seed_from_u64(2);
        assert_eq!(book.pick_purpose(VehicleClass::Bus, &mut rng), Purpose::Bus);
        assert_eq!(book.pick_purpose(VehicleClass::Truck, &mut rng), Purpose::Truck);
        for _ in 0..100 {
            let p = book.pick_purpose(VehicleClass::Car, &mut rng);
            assert!(VehicleClass::Car.purposes().contains(&p));
        }
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let mut book = PolicyBook::default();
        if let ScheduleModel::Chained(m) = &mut book.private.weekend.model {
            m.first_stop_h = Span::new(5.0, 1.0);
        }
        let err = book.validate().unwrap_err();
        assert!(matches!(
            err,
            DataIntegrityError::InvalidRange { field: "first_stop_h", .. }
        ));
    }

    #[test]
    fn test_zero_bin_weights_rejected() {
        let mut book = PolicyBook::default();
        for bin in &mut book.service.weekend.distance_bins {
            bin.weight = 0.0;
        }
        let err = book.validate().unwrap_err();
        assert!(matches!(
            err,
            DataIntegrityError::InvalidRange { field: "distance_bin_weight", ref key, .. } if key == "Service/Weekend"
        ));

        book.service.weekend.distance_bins.clear();
        assert!(book.validate().is_err());
    }

    #[test]
    fn test_zero_purpose_weights_rejected() {
        let mut book = PolicyBook::default();
        book.car_purpose_weights = CarPurposeWeights {
            job_education: 0.0,
            private: 0.0,
            service: 0.0,
        };
        let err = book.validate().unwrap_err();
        assert!(matches!(
            err,
            DataIntegrityError::InvalidRange { field: "purpose_weight", .. }
        ));

        book.car_purpose_weights.private = 1.0;
        book.validate().unwrap();
    }

    #[test]
    fn test_policy_book_toml_round_trip() {
        let book = PolicyBook::default();
        let text = toml::to_string(&book).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policies.toml");
        std::fs::write(&path, text).unwrap();

        let loaded = PolicyBook::from_toml_file(&path).unwrap();
        assert_eq!(loaded, book);
    }
}
