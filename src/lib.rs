//! Synthetic daily mobility and charging profiles for electric cars, vans,
//! trucks and buses.
//!
//! The pipeline per vehicle: pick a segment and purpose, draw an ambient
//! temperature and its derating, instantiate a vehicle, then for the workday
//! and the weekend sample a trip schedule under the purpose's policy and
//! derive its energy and charging demand.

pub mod allocation;
pub mod config;
pub mod domain;
pub mod error;
pub mod generator;
pub mod loader;
pub mod output;
pub mod profile;
pub mod reference;
pub mod simulation;
pub mod telemetry;
