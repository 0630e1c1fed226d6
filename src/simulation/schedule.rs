//! # Trip Schedule Sampler
//!
//! Rejection sampler for one day of driving. The day's distance bin is drawn
//! once, then whole candidate schedules are drawn from the purpose's
//! [`ScheduleModel`] until one satisfies every [`ScheduleConstraint`] of the
//! policy, or the attempt budget runs out.
//!
//! ## Candidate models
//!
//! - **Chained**: N trips, each starting when the previous stop ends. First
//!   trip and stop use their own ranges, later ones the "other" ranges.
//!   Trucks wrap clock times past midnight.
//! - **Shuttle**: an even number of equal-length runs separated by one shared
//!   layover; the run time follows from the drawn average speed.
//!
//! Distance is running time times the road-mix weighted average speed.

use itertools::Itertools;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::policy::{
    ChainedModel, DayPolicy, DistanceBin, ScheduleConstraint, ScheduleModel, ShuttleModel,
    SpeedSource,
};
use crate::domain::{wrap_clock, Span};
use crate::error::{DataIntegrityError, ScheduleError};
use crate::reference::{RoadSpeeds, SegmentSpec};

const EPS: f64 = 1e-9;

/// One trip; clock times in hours of day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub start_h: f64,
    pub duration_h: f64,
    pub end_h: f64,
    /// Stop before the next trip; `None` for the last trip of the day
    pub stop_after_h: Option<f64>,
}

/// Road split and speeds used for one candidate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoadProfile {
    pub urban_share: f64,
    pub rural_share: f64,
    pub highway_share: f64,
    pub speeds: RoadSpeeds,
}

impl RoadProfile {
    pub fn average_speed_kmh(&self) -> f64 {
        self.urban_share * self.speeds.urban_kmh
            + self.rural_share * self.speeds.rural_kmh
            + self.highway_share * self.speeds.highway_kmh
    }
}

/// An accepted day schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripSchedule {
    pub trips: Vec<Trip>,
    pub distance_bin: DistanceBin,
    pub road: RoadProfile,
    pub total_distance_km: f64,
    pub running_time_h: f64,
    pub total_stop_h: f64,
    /// First start to last end, unwrapped
    pub elapsed_h: f64,
    pub avg_speed_kmh: f64,
    /// Candidates drawn until this one was accepted
    pub attempts: u64,
}

impl TripSchedule {
    fn from_trips(trips: Vec<Trip>, distance_bin: DistanceBin, road: RoadProfile, total_distance_km: f64) -> Self {
        let running_time_h: f64 = trips.iter().map(|t| t.duration_h).sum();
        let total_stop_h: f64 = trips.iter().filter_map(|t| t.stop_after_h).sum();
        let avg_speed_kmh = if running_time_h > 0.0 {
            total_distance_km / running_time_h
        } else {
            0.0
        };

        Self {
            trips,
            distance_bin,
            road,
            total_distance_km,
            running_time_h,
            total_stop_h,
            elapsed_h: running_time_h + total_stop_h,
            avg_speed_kmh,
            attempts: 0,
        }
    }

    pub fn trip_count(&self) -> usize {
        self.trips.len()
    }

    pub fn stops(&self) -> impl Iterator<Item = f64> + '_ {
        self.trips.iter().filter_map(|t| t.stop_after_h)
    }

    /// Clock gap between consecutive trips, modulo 24h
    pub fn gaps(&self) -> impl Iterator<Item = f64> + '_ {
        self.trips
            .iter()
            .tuple_windows()
            .map(|(a, b)| wrap_clock(b.start_h - a.end_h))
    }

    pub fn satisfies(&self, constraint: &ScheduleConstraint) -> bool {
        let within = |value: f64, min: f64, max: f64| value >= min - EPS && value <= max + EPS;

        match *constraint {
            ScheduleConstraint::EndsBeforeMidnight => {
                self.trips.last().map_or(true, |t| t.end_h <= 24.0 + EPS)
            }
            ScheduleConstraint::BalancedFirstTrip { tolerance_h } => match self.trips.split_first() {
                Some((first, rest)) if !rest.is_empty() => {
                    let others: f64 = rest.iter().map(|t| t.duration_h).sum();
                    first.duration_h <= others + tolerance_h
                }
                _ => true,
            },
            ScheduleConstraint::DistanceInBin => self.distance_bin.contains(self.total_distance_km),
            ScheduleConstraint::TotalStopTime { min_h, max_h } => within(self.total_stop_h, min_h, max_h),
            ScheduleConstraint::ShiftWindow { min_h, max_h } => within(self.elapsed_h, min_h, max_h),
            ScheduleConstraint::RunningTime { min_h, max_h } => within(self.running_time_h, min_h, max_h),
            ScheduleConstraint::DistanceRange { min_km, max_km } => {
                within(self.total_distance_km, min_km, max_km)
            }
        }
    }
}

pub struct ScheduleSampler<'a> {
    policy: &'a DayPolicy,
    base_speeds: RoadSpeeds,
    jitter_kmh: f64,
    max_attempts: u64,
}

impl<'a> ScheduleSampler<'a> {
    /// Resolve the policy's speed source against the vehicle's segment
    pub fn new(
        policy: &'a DayPolicy,
        segment: &SegmentSpec,
        max_attempts: u64,
    ) -> Result<Self, DataIntegrityError> {
        let (base_speeds, jitter_kmh) = match policy.speeds {
            SpeedSource::Nominal {
                urban_kmh,
                rural_kmh,
                highway_kmh,
                jitter_kmh,
            } => (
                RoadSpeeds {
                    urban_kmh,
                    rural_kmh,
                    highway_kmh,
                },
                jitter_kmh,
            ),
            SpeedSource::Segment { jitter_kmh } => {
                let speeds = segment.speeds.ok_or_else(|| DataIntegrityError::MissingSegmentSpeeds {
                    class: segment.class,
                    segment: segment.segment.clone(),
                })?;
                (speeds, jitter_kmh)
            }
        };

        Ok(Self {
            policy,
            base_speeds,
            jitter_kmh,
            max_attempts: max_attempts.max(1),
        })
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<TripSchedule, ScheduleError> {
        let bin = self.policy.pick_distance_bin(rng);

        for attempt in 1..=self.max_attempts {
            let mut candidate = self.draw_candidate(bin, rng);
            if self.policy.constraints.iter().all(|c| candidate.satisfies(c)) {
                candidate.attempts = attempt;
                debug!(
                    attempts = attempt,
                    trips = candidate.trip_count(),
                    distance_km = candidate.total_distance_km,
                    "schedule accepted"
                );
                return Ok(candidate);
            }
        }

        warn!(
            attempts = self.max_attempts,
            bin_min_km = bin.min_km,
            bin_max_km = bin.max_km,
            "schedule rejection budget exhausted"
        );
        Err(ScheduleError::Unsatisfiable {
            attempts: self.max_attempts,
        })
    }

    fn draw_candidate<R: Rng + ?Sized>(&self, bin: DistanceBin, rng: &mut R) -> TripSchedule {
        match &self.policy.model {
            ScheduleModel::Chained(model) => self.draw_chained(model, bin, rng),
            ScheduleModel::Shuttle(model) => self.draw_shuttle(model, bin, rng),
        }
    }

    fn draw_road<R: Rng + ?Sized>(&self, rng: &mut R) -> RoadProfile {
        let highway_share = self.policy.road_mix.highway_percent.sample(rng) / 100.0;
        let rural_share = self.policy.road_mix.rural_percent.sample(rng) / 100.0;
        let urban_share = (1.0 - highway_share - rural_share).max(0.0);

        let jitter = Span::new(-self.jitter_kmh, self.jitter_kmh);
        let mut speed = |base: f64| (base + jitter.sample(rng)).max(1.0);

        RoadProfile {
            urban_share,
            rural_share,
            highway_share,
            speeds: RoadSpeeds {
                urban_kmh: speed(self.base_speeds.urban_kmh),
                rural_kmh: speed(self.base_speeds.rural_kmh),
                highway_kmh: speed(self.base_speeds.highway_kmh),
            },
        }
    }

    fn draw_chained<R: Rng + ?Sized>(&self, model: &ChainedModel, bin: DistanceBin, rng: &mut R) -> TripSchedule {
        let count = model.trip_count.sample(rng) as usize;
        let clock = |h: f64| if model.wrap_midnight { wrap_clock(h) } else { h };

        let mut trips = Vec::with_capacity(count);
        let mut t = model.first_start_h.sample(rng);
        for i in 0..count {
            let (duration_span, stop_span) = if i == 0 {
                (model.first_duration_h, model.first_stop_h)
            } else {
                (model.other_duration_h, model.other_stop_h)
            };
            let duration_h = duration_span.sample(rng);
            let stop_after_h = (i + 1 < count).then(|| stop_span.sample(rng));

            trips.push(Trip {
                start_h: clock(t),
                duration_h,
                end_h: clock(t + duration_h),
                stop_after_h,
            });
            t += duration_h + stop_after_h.unwrap_or(0.0);
        }

        let road = self.draw_road(rng);
        let running_h: f64 = trips.iter().map(|t| t.duration_h).sum();
        let distance_km = running_h * road.average_speed_kmh();
        TripSchedule::from_trips(trips, bin, road, distance_km)
    }

    fn draw_shuttle<R: Rng + ?Sized>(&self, model: &ShuttleModel, bin: DistanceBin, rng: &mut R) -> TripSchedule {
        let count = 2 * model.trip_pairs.sample(rng) as usize;
        let length_km = model.trip_length_km.sample(rng);
        let stop_h = model.stop_h.sample(rng);
        let road = self.draw_road(rng);
        let duration_h = length_km / road.average_speed_kmh();

        let mut trips = Vec::with_capacity(count);
        let mut t = model.first_start_h.sample(rng);
        for i in 0..count {
            let stop_after_h = (i + 1 < count).then_some(stop_h);
            trips.push(Trip {
                start_h: t,
                duration_h,
                end_h: t + duration_h,
                stop_after_h,
            });
            t += duration_h + stop_h;
        }

        TripSchedule::from_trips(trips, bin, road, count as f64 * length_km)
    }
}
