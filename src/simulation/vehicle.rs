//! # Vehicle Instance Sampler
//!
//! Turns a segment row into one concrete vehicle: rated capacity and range,
//! consumption, the charger it uses and where/how far it charges. The
//! instance is shared by the vehicle's workday and weekend profiles.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::charging::ChargingPolicy;
use super::temperature::TemperatureDraw;
use crate::domain::{ChargerKind, ChargerType, ChargingLocation, VehicleClass};
use crate::error::DataIntegrityError;
use crate::reference::SegmentSpec;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleInstance {
    pub class: VehicleClass,
    pub segment: String,
    pub temperature: TemperatureDraw,
    pub full_capacity_kwh: f64,
    pub full_range_km: f64,
    /// Rated consumption (Wh/km)
    pub consumption_wh_per_km: f64,
    pub charger: ChargerType,
    pub charging_location: ChargingLocation,
    pub target_soc_percent: f64,
}

impl VehicleInstance {
    /// Usable capacity at the ambient temperature (kWh)
    pub fn derated_capacity_kwh(&self) -> f64 {
        self.full_capacity_kwh * self.temperature.capacity_derate_percent / 100.0
    }

    /// Usable range at the ambient temperature (km)
    pub fn derated_range_km(&self) -> f64 {
        self.full_range_km * self.temperature.range_derate_percent / 100.0
    }
}

pub fn sample_vehicle<R: Rng + ?Sized>(
    spec: &SegmentSpec,
    temperature: TemperatureDraw,
    chargers: &[ChargerType],
    policy: &ChargingPolicy,
    rng: &mut R,
) -> Result<VehicleInstance, DataIntegrityError> {
    let full_capacity_kwh = spec.capacity_kwh.sample(rng);
    let full_range_km = spec.range_km.sample(rng);
    let consumption_wh_per_km = full_capacity_kwh * 1000.0 / full_range_km;

    let mut charger = chargers
        .choose(rng)
        .cloned()
        .ok_or(DataIntegrityError::MissingCompatibility(spec.class))?;

    // mixed AC wallbox stock: the nominal 7.4 kW rating is often 11 kW in practice
    if charger.kind == ChargerKind::Ac && (charger.power_kw - policy.ac_reroll_from_kw).abs() < 1e-9 {
        if let Some(&power_kw) = policy.ac_reroll_options_kw.choose(rng) {
            charger = charger.with_power(power_kw);
        }
    }

    let (charging_location, target_soc_percent) = match charger.kind {
        ChargerKind::Dc => (ChargingLocation::Public, policy.dc_target_soc_percent),
        ChargerKind::Ac => {
            let location = policy
                .ac_locations
                .get(spec.class)
                .choose(rng)
                .copied()
                .unwrap_or(ChargingLocation::Private);
            (location, policy.ac_target_soc_percent)
        }
        ChargerKind::Other => (ChargingLocation::Private, policy.ac_target_soc_percent),
    };

    Ok(VehicleInstance {
        class: spec.class,
        segment: spec.segment.clone(),
        temperature,
        full_capacity_kwh,
        full_range_km,
        consumption_wh_per_km,
        charger,
        charging_location,
        target_soc_percent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::fixtures::segment;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rstest::rstest;

    fn mild() -> TemperatureDraw {
        TemperatureDraw {
            temperature_c: 20.0,
            capacity_derate_percent: 90.0,
            range_derate_percent: 80.0,
        }
    }

    fn chargers(labels: &[&str]) -> Vec<ChargerType> {
        labels.iter().map(|l| l.parse().unwrap()).collect()
    }

    #[test]
    fn test_vehicle_draw_within_segment() {
        let spec = segment(VehicleClass::Car, "Kompaktklasse", 40.0, (40.0, 60.0), (300.0, 400.0));
        let policy = ChargingPolicy::default();
        let mut rng = StdRng::seed_from_u64(11);

        for _ in 0..500 {
            let v = sample_vehicle(&spec, mild(), &chargers(&["AC_11kW"]), &policy, &mut rng).unwrap();
            assert!(spec.capacity_kwh.contains(v.full_capacity_kwh));
            assert!(spec.range_km.contains(v.full_range_km));
            let expected = v.full_capacity_kwh * 1000.0 / v.full_range_km;
            assert!((v.consumption_wh_per_km - expected).abs() < 1e-9);
            assert!((v.derated_capacity_kwh() - v.full_capacity_kwh * 0.9).abs() < 1e-9);
            assert!((v.derated_range_km() - v.full_range_km * 0.8).abs() < 1e-9);
        }
    }

    #[rstest]
    #[case("DC_150kW", 80.0)]
    #[case("AC_22kW", 100.0)]
    #[case("Pantograph_300kW", 100.0)]
    fn test_target_soc_by_charger_kind(#[case] label: &str, #[case] target: f64) {
        let spec = segment(VehicleClass::Bus, "Solobus", 5.0, (250.0, 400.0), (250.0, 350.0));
        let mut rng = StdRng::seed_from_u64(5);
        let v = sample_vehicle(&spec, mild(), &chargers(&[label]), &ChargingPolicy::default(), &mut rng)
            .unwrap();
        assert_eq!(v.target_soc_percent, target);
    }

    #[test]
    fn test_charging_location_policy() {
        let spec = segment(VehicleClass::Car, "Kleinwagen", 30.0, (30.0, 45.0), (250.0, 320.0));
        let policy = ChargingPolicy::default();
        let mut rng = StdRng::seed_from_u64(9);

        let dc = sample_vehicle(&spec, mild(), &chargers(&["DC_50kW"]), &policy, &mut rng).unwrap();
        assert_eq!(dc.charging_location, ChargingLocation::Public);

        let other = sample_vehicle(&spec, mild(), &chargers(&["HPC_400kW"]), &policy, &mut rng).unwrap();
        assert_eq!(other.charging_location, ChargingLocation::Private);

        let mut public = 0;
        for _ in 0..400 {
            let ac = sample_vehicle(&spec, mild(), &chargers(&["AC_11kW"]), &policy, &mut rng).unwrap();
            if ac.charging_location == ChargingLocation::Public {
                public += 1;
            }
        }
        assert!((140..260).contains(&public), "public AC picks: {public}");
    }

    #[test]
    fn test_ac_7_4_kw_rerolls_to_11_kw() {
        let spec = segment(VehicleClass::Car, "Kleinwagen", 30.0, (30.0, 45.0), (250.0, 320.0));
        let policy = ChargingPolicy::default();
        let mut rng = StdRng::seed_from_u64(21);

        let mut seen_74 = false;
        let mut seen_11 = false;
        for _ in 0..200 {
            let v = sample_vehicle(&spec, mild(), &chargers(&["AC_7.4kW"]), &policy, &mut rng).unwrap();
            match v.charger.label.as_str() {
                "AC_7.4kW" => {
                    seen_74 = true;
                    assert_eq!(v.charger.power_kw, 7.4);
                }
                "AC_11kW" => {
                    seen_11 = true;
                    assert_eq!(v.charger.power_kw, 11.0);
                }
                other => panic!("unexpected charger {other}"),
            }
        }
        assert!(seen_74 && seen_11);
    }

    #[test]
    fn test_no_chargers_is_an_error() {
        let spec = segment(VehicleClass::Van, "Transporter", 15.0, (60.0, 90.0), (200.0, 300.0));
        let mut rng = StdRng::seed_from_u64(1);
        let err = sample_vehicle(&spec, mild(), &[], &ChargingPolicy::default(), &mut rng).unwrap_err();
        assert_eq!(err, DataIntegrityError::MissingCompatibility(VehicleClass::Van));
    }
}
