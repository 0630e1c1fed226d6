//! Display rendering of day profiles.
//!
//! Clock times render as `7h 05min`, durations as `1h 5min`. Distances,
//! powers, capacities and temperatures are whole numbers, percentages carry
//! one decimal.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use super::VehicleProfile;
use crate::domain::{DayType, Hours, Purpose};
use crate::simulation::{EnergyOutcome, TripSchedule, VehicleInstance};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: String,
}

impl Field {
    fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

pub fn integer(value: f64) -> String {
    format!("{}", value.round() as i64)
}

pub fn percent(value: f64) -> String {
    format!("{:.1}", (value * 10.0).round() / 10.0)
}

pub fn render_day(
    day: DayType,
    purpose: Purpose,
    vehicle: &VehicleInstance,
    schedule: &TripSchedule,
    energy: &EnergyOutcome,
) -> Vec<Field> {
    let mut fields = vec![
        Field::new("Purpose", purpose.to_string()),
        Field::new("Day", day.to_string()),
        Field::new("Temperature", integer(vehicle.temperature.temperature_c)),
        Field::new("Consumption", integer(vehicle.consumption_wh_per_km)),
        Field::new("FullCapacity", integer(vehicle.full_capacity_kwh)),
        Field::new("CapacityWithTemperature", integer(vehicle.derated_capacity_kwh())),
        Field::new("OperatingCapacity", percent(vehicle.temperature.capacity_derate_percent)),
        Field::new("FullRange", integer(vehicle.full_range_km)),
        Field::new("RangeWithTemperature", integer(vehicle.derated_range_km())),
        Field::new("OperatingRange", percent(vehicle.temperature.range_derate_percent)),
        Field::new("Distance", integer(schedule.total_distance_km)),
        Field::new("AvgSpeed", integer(schedule.avg_speed_kmh)),
        Field::new("ChargingLocation", vehicle.charging_location.to_string()),
        Field::new("ChargingType", vehicle.charger.label.clone()),
        Field::new(
            "TargetSoC",
            energy.target_soc_percent.map(percent).unwrap_or_default(),
        ),
        Field::new("ChargingLoss", percent(energy.charging_loss_percent)),
        Field::new("TripNumber", schedule.trip_count().to_string()),
    ];

    for (i, trip) in schedule.trips.iter().enumerate() {
        fields.push(Field::new(format!("Start_{}", i + 1), Hours(trip.start_h).clock()));
        fields.push(Field::new(format!("End_{}", i + 1), Hours(trip.end_h).clock()));
    }
    fields.push(Field::new("RunTime", Hours(schedule.running_time_h).duration()));
    for (i, stop) in schedule.stops().enumerate() {
        fields.push(Field::new(format!("Stop_{}", i + 1), Hours(stop).duration()));
    }

    let on_road = match &energy.on_road_charger {
        Some(charger) => format!("Yes_{}", charger.label),
        None => "No".to_string(),
    };
    fields.extend([
        Field::new("ChargeOnRoad", on_road),
        Field::new("BatteryPerc", percent(energy.remaining_percent)),
        Field::new("ChargingTimeOnRoad", Hours(energy.on_road_time_h).duration()),
        Field::new("TotalTimeToCharge", Hours(energy.total_charge_time_h).duration()),
    ]);
    fields
}

/// Plain-text block for one vehicle
pub fn render_text(profile: &VehicleProfile) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "=== Vehicle {} | {} | {} ===",
        profile.index + 1,
        profile.class(),
        profile.segment()
    );
    for day in &profile.days {
        let _ = writeln!(out, "--- {} ---", day.day);
        for field in &day.fields {
            let _ = writeln!(out, "{}: {}", field.name, field.value);
        }
    }
    for skipped in &profile.skipped {
        let _ = writeln!(
            out,
            "--- {} --- skipped, no valid schedule after {} attempts",
            skipped.day, skipped.attempts
        );
    }
    out
}
