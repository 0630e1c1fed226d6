//! # Profile Simulation Engine
//!
//! Stochastic pipeline that turns reference data into one vehicle's day
//! profiles.
//!
//! ## Components
//!
//! - **Temperature**: ambient temperature draw and its derating band
//! - **Vehicle**: one concrete vehicle drawn from a segment row
//! - **Policy**: per purpose and day type schedule policy book
//! - **Schedule**: bounded rejection sampler for a day's trips
//! - **Charging**: energy balance, on-road and depot charging demand
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ev_profile_synth::simulation::{PolicyBook, ScheduleSampler};
//!
//! let book = PolicyBook::default();
//! let policy = book.day_policy(Purpose::Private, DayType::Workday);
//! let sampler = ScheduleSampler::new(policy, &segment, 100_000)?;
//! let schedule = sampler.sample(&mut rng)?;
//! ```

pub mod charging;
pub mod policy;
pub mod schedule;
pub mod temperature;
pub mod vehicle;

pub use charging::{calculate_energy, ChargingPolicy, EnergyOutcome};
pub use policy::{DayPolicy, DistanceBin, PolicyBook, ScheduleConstraint, ScheduleModel};
pub use schedule::{RoadProfile, ScheduleSampler, Trip, TripSchedule};
pub use temperature::{sample_temperature, TemperatureDraw};
pub use vehicle::{sample_vehicle, VehicleInstance};
