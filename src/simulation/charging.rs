//! # Energy & Charging Calculator
//!
//! Derives a day's energy balance from the vehicle instance and the accepted
//! schedule distance:
//!
//! - **Depot day**: the distance fits in the derated range minus a safety
//!   buffer. The vehicle charges at its own charger afterwards, and only if
//!   the remaining state of charge is below the depot threshold.
//! - **On-road day**: the distance exceeds the buffered range. The excess
//!   energy is charged en route at a class-specific public power, and the
//!   vehicle is topped up at its own charger afterwards.
//!
//! All values stay at full precision; rounding happens in the formatter.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::vehicle::VehicleInstance;
use crate::domain::{ChargerKind, ChargerType, ChargingLocation, PerClass, Span};

/// Charging behaviour shared by all vehicles of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ChargingPolicy {
    /// Margin kept below the derated range before charging on the road (km)
    #[validate(range(min = 0.0))]
    pub safety_buffer_km: f64,

    /// Depot charging starts below this state of charge (%)
    #[validate(range(min = 0.0, max = 100.0))]
    pub depot_threshold_percent: f64,

    /// Target state of charge for DC chargers (%)
    #[validate(range(min = 0.0, max = 100.0))]
    pub dc_target_soc_percent: f64,

    /// Target state of charge for AC and unrecognised chargers (%)
    #[validate(range(min = 0.0, max = 100.0))]
    pub ac_target_soc_percent: f64,

    /// Charging loss range for DC chargers (%)
    #[validate(custom(function = "valid_percent_span"))]
    pub dc_loss_percent: Span,

    /// Charging loss range for AC and unrecognised chargers (%)
    #[validate(custom(function = "valid_percent_span"))]
    pub ac_loss_percent: Span,

    /// AC rating that is re-rolled into `ac_reroll_options_kw` (kW)
    pub ac_reroll_from_kw: f64,

    #[validate(custom(function = "valid_powers"))]
    pub ac_reroll_options_kw: Vec<f64>,

    /// Public charging powers available en route, per class (kW)
    pub on_road_power_kw: PerClass<Vec<f64>>,

    /// Locations an AC charging vehicle is assigned to, per class
    pub ac_locations: PerClass<Vec<ChargingLocation>>,
}

impl Default for ChargingPolicy {
    fn default() -> Self {
        let both = vec![ChargingLocation::Public, ChargingLocation::Private];
        Self {
            safety_buffer_km: 20.0,
            depot_threshold_percent: 80.0,
            dc_target_soc_percent: 80.0,
            ac_target_soc_percent: 100.0,
            dc_loss_percent: Span::new(6.0, 8.0),
            ac_loss_percent: Span::new(5.0, 10.0),
            ac_reroll_from_kw: 7.4,
            ac_reroll_options_kw: vec![7.4, 11.0],
            on_road_power_kw: PerClass {
                car: vec![22.0, 50.0, 75.0, 150.0],
                van: vec![22.0, 50.0, 75.0, 150.0],
                truck: vec![50.0, 75.0, 150.0, 300.0],
                bus: vec![150.0],
            },
            ac_locations: PerClass {
                car: both.clone(),
                van: both.clone(),
                truck: both.clone(),
                bus: both,
            },
        }
    }
}

impl ChargingPolicy {
    pub fn loss_span(&self, kind: ChargerKind) -> Span {
        match kind {
            ChargerKind::Dc => self.dc_loss_percent,
            ChargerKind::Ac | ChargerKind::Other => self.ac_loss_percent,
        }
    }

    /// Checks the per-class tables the derive cannot express
    pub fn validate_tables(&self) -> Result<(), ValidationError> {
        for powers in [
            &self.on_road_power_kw.car,
            &self.on_road_power_kw.van,
            &self.on_road_power_kw.truck,
            &self.on_road_power_kw.bus,
        ] {
            valid_powers(powers)?;
        }
        for locations in [
            &self.ac_locations.car,
            &self.ac_locations.van,
            &self.ac_locations.truck,
            &self.ac_locations.bus,
        ] {
            if locations.is_empty() {
                return Err(ValidationError::new("empty_location_set"));
            }
        }
        Ok(())
    }
}

fn valid_percent_span(span: &Span) -> Result<(), ValidationError> {
    if span.is_valid() && span.min >= 0.0 && span.max <= 100.0 {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_percent_span"))
    }
}

#[allow(clippy::ptr_arg)]
fn valid_powers(powers: &Vec<f64>) -> Result<(), ValidationError> {
    if !powers.is_empty() && powers.iter().all(|p| p.is_finite() && *p > 0.0) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_power_set"))
    }
}

/// Public charger used en route at `power_kw`
pub fn on_road_charger(power_kw: f64) -> ChargerType {
    let (prefix, kind) = if power_kw <= 22.0 {
        ("AC", ChargerKind::Ac)
    } else {
        ("DC", ChargerKind::Dc)
    };
    ChargerType {
        label: format!("{prefix}_{power_kw}kW"),
        kind,
        power_kw,
    }
}

/// Energy balance and charging demand of one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyOutcome {
    pub used_energy_kwh: f64,
    /// State of charge at the end of the day, after any en-route charging (%)
    pub remaining_percent: f64,
    /// `None` when the day needs no charging
    pub target_soc_percent: Option<f64>,
    /// Zero when the day needs no charging
    pub charging_loss_percent: f64,
    pub on_road_charger: Option<ChargerType>,
    pub on_road_time_h: f64,
    pub total_charge_time_h: f64,
}

impl EnergyOutcome {
    pub fn needs_charging(&self) -> bool {
        self.target_soc_percent.is_some()
    }
}

pub fn calculate_energy<R: Rng + ?Sized>(
    vehicle: &VehicleInstance,
    distance_km: f64,
    policy: &ChargingPolicy,
    rng: &mut R,
) -> EnergyOutcome {
    let full_kwh = vehicle.full_capacity_kwh;
    let used_energy_kwh = vehicle.consumption_wh_per_km * distance_km / 1000.0;
    let usable_kwh = vehicle.derated_capacity_kwh();
    let to_percent = |kwh: f64| (kwh / full_kwh * 100.0).clamp(0.0, 100.0);
    let target = vehicle.target_soc_percent;

    let depot_time_h = |remaining_percent: f64, loss_percent: f64| {
        let missing_kwh = ((target - remaining_percent) / 100.0 * full_kwh).max(0.0);
        missing_kwh * (1.0 + loss_percent / 100.0) / vehicle.charger.power_kw
    };

    if distance_km < vehicle.derated_range_km() - policy.safety_buffer_km {
        let remaining_percent = to_percent(usable_kwh - used_energy_kwh);
        if remaining_percent >= policy.depot_threshold_percent {
            return EnergyOutcome {
                used_energy_kwh,
                remaining_percent,
                target_soc_percent: None,
                charging_loss_percent: 0.0,
                on_road_charger: None,
                on_road_time_h: 0.0,
                total_charge_time_h: 0.0,
            };
        }

        let loss = policy.loss_span(vehicle.charger.kind).sample(rng);
        return EnergyOutcome {
            used_energy_kwh,
            remaining_percent,
            target_soc_percent: Some(target),
            charging_loss_percent: loss,
            on_road_charger: None,
            on_road_time_h: 0.0,
            total_charge_time_h: depot_time_h(remaining_percent, loss),
        };
    }

    let power_kw = policy
        .on_road_power_kw
        .get(vehicle.class)
        .choose(rng)
        .copied()
        .unwrap_or(vehicle.charger.power_kw);
    let loss = policy.loss_span(vehicle.charger.kind).sample(rng);

    let over_distance_km = (distance_km - vehicle.derated_range_km()).abs();
    let over_kwh = vehicle.consumption_wh_per_km * over_distance_km / 1000.0;
    let on_road_time_h = over_kwh * (1.0 + loss / 100.0) / power_kw;
    let remaining_percent = to_percent(usable_kwh - used_energy_kwh + over_kwh);

    EnergyOutcome {
        used_energy_kwh,
        remaining_percent,
        target_soc_percent: Some(target),
        charging_loss_percent: loss,
        on_road_charger: Some(on_road_charger(power_kw)),
        on_road_time_h,
        total_charge_time_h: on_road_time_h + depot_time_h(remaining_percent, loss),
    }
}
