//! # Reference Data Provider
//!
//! Immutable lookup tables loaded once per run: vehicle segment specs,
//! charger compatibility per class and the temperature derating curve.
//! Every lookup is pure; a miss is a [`DataIntegrityError`] and must not be
//! papered over with a default by the caller.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::error;

use crate::domain::{ChargerType, Span, VehicleClass};
use crate::error::DataIntegrityError;

/// Average speeds per road type (km/h)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoadSpeeds {
    pub urban_kmh: f64,
    pub rural_kmh: f64,
    pub highway_kmh: f64,
}

/// One class/size bucket row of the segment table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentSpec {
    pub class: VehicleClass,
    pub segment: String,
    /// Share of the total fleet (%)
    pub share_percent: f64,
    pub capacity_kwh: Span,
    pub range_km: Span,
    pub speeds: Option<RoadSpeeds>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingCompatibility {
    pub class: VehicleClass,
    pub chargers: Vec<ChargerType>,
}

/// Temperature interval with the usable capacity/range percentages it allows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureDeratingRow {
    pub temp_from_c: f64,
    pub temp_to_c: f64,
    pub capacity_percent: Span,
    pub range_percent: Span,
}

#[derive(Debug, Clone)]
pub struct ReferenceData {
    segments: Vec<SegmentSpec>,
    compatibility: HashMap<VehicleClass, Vec<ChargerType>>,
    temperature: Vec<TemperatureDeratingRow>,
}

impl ReferenceData {
    /// Build and validate the reference tables.
    ///
    /// Malformed ranges and temperature gaps are rejected here so that the
    /// samplers never see them.
    pub fn new(
        segments: Vec<SegmentSpec>,
        compatibility: Vec<ChargingCompatibility>,
        temperature: Vec<TemperatureDeratingRow>,
    ) -> Result<Self, DataIntegrityError> {
        if segments.is_empty() {
            return Err(DataIntegrityError::EmptyTable("segments"));
        }
        if compatibility.is_empty() {
            return Err(DataIntegrityError::EmptyTable("charging"));
        }
        if temperature.is_empty() {
            return Err(DataIntegrityError::EmptyTable("temperature"));
        }

        for spec in &segments {
            let key = format!("{}/{}", spec.class, spec.segment);
            check_positive("segments", &key, "capacity", spec.capacity_kwh)?;
            check_positive("segments", &key, "range", spec.range_km)?;
            if spec.share_percent < 0.0 || !spec.share_percent.is_finite() {
                return Err(DataIntegrityError::InvalidRange {
                    table: "segments",
                    key,
                    field: "share",
                    min: 0.0,
                    max: spec.share_percent,
                });
            }
        }

        for row in &temperature {
            let key = format!("{}..{}", row.temp_from_c, row.temp_to_c);
            check_span("temperature", &key, "temp", Span::new(row.temp_from_c, row.temp_to_c))?;
            check_percent("temperature", &key, "capacity", row.capacity_percent)?;
            check_percent("temperature", &key, "range", row.range_percent)?;
        }
        check_temperature_coverage(&temperature)?;

        let mut by_class: HashMap<VehicleClass, Vec<ChargerType>> = HashMap::new();
        for row in compatibility {
            by_class.entry(row.class).or_default().extend(row.chargers);
        }

        Ok(Self {
            segments,
            compatibility: by_class,
            temperature,
        })
    }

    pub fn segments(&self) -> &[SegmentSpec] {
        &self.segments
    }

    pub fn segments_of(&self, class: VehicleClass) -> impl Iterator<Item = &SegmentSpec> {
        self.segments.iter().filter(move |s| s.class == class)
    }

    pub fn segment_spec(
        &self,
        class: VehicleClass,
        segment: &str,
    ) -> Result<&SegmentSpec, DataIntegrityError> {
        self.segments_of(class)
            .find(|s| s.segment.eq_ignore_ascii_case(segment))
            .ok_or_else(|| {
                error!(%class, segment, "segment lookup failed");
                DataIntegrityError::MissingSegment {
                    class,
                    segment: segment.to_string(),
                }
            })
    }

    /// Draw a size bucket for `class`, weighted by fleet share
    pub fn pick_segment<R: Rng + ?Sized>(
        &self,
        class: VehicleClass,
        rng: &mut R,
    ) -> Result<&SegmentSpec, DataIntegrityError> {
        let candidates: Vec<&SegmentSpec> = self.segments_of(class).collect();
        let picked = match candidates.choose_weighted(rng, |s| s.share_percent) {
            Ok(spec) => Some(*spec),
            // every share is zero: fall back to a uniform pick
            Err(_) => candidates.choose(rng).copied(),
        };
        picked.ok_or_else(|| {
            error!(%class, "no segments for class");
            DataIntegrityError::NoSegments(class)
        })
    }

    pub fn compatible_chargers(
        &self,
        class: VehicleClass,
    ) -> Result<&[ChargerType], DataIntegrityError> {
        match self.compatibility.get(&class) {
            Some(chargers) if !chargers.is_empty() => Ok(chargers),
            _ => {
                error!(%class, "charger compatibility lookup failed");
                Err(DataIntegrityError::MissingCompatibility(class))
            }
        }
    }

    /// First band with `from <= t < to`; the topmost bound is inclusive
    pub fn temperature_band(
        &self,
        temperature_c: f64,
    ) -> Result<&TemperatureDeratingRow, DataIntegrityError> {
        self.temperature
            .iter()
            .find(|r| r.temp_from_c <= temperature_c && temperature_c < r.temp_to_c)
            .or_else(|| self.temperature.iter().find(|r| r.temp_to_c == temperature_c))
            .ok_or_else(|| {
                error!(temperature_c, "temperature band lookup failed");
                DataIntegrityError::NoTemperatureBand(temperature_c)
            })
    }

    /// Overall temperature interval covered by the derating table
    pub fn temperature_bounds(&self) -> Span {
        let min = self
            .temperature
            .iter()
            .map(|r| r.temp_from_c)
            .fold(f64::INFINITY, f64::min);
        let max = self
            .temperature
            .iter()
            .map(|r| r.temp_to_c)
            .fold(f64::NEG_INFINITY, f64::max);
        Span::new(min, max)
    }

    /// Fleet share per class (%), summed over its segments
    pub fn class_shares(&self) -> BTreeMap<VehicleClass, f64> {
        let mut shares = BTreeMap::new();
        for spec in &self.segments {
            *shares.entry(spec.class).or_insert(0.0) += spec.share_percent;
        }
        shares
    }
}

fn check_span(
    table: &'static str,
    key: &str,
    field: &'static str,
    span: Span,
) -> Result<(), DataIntegrityError> {
    if span.is_valid() {
        Ok(())
    } else {
        Err(DataIntegrityError::InvalidRange {
            table,
            key: key.to_string(),
            field,
            min: span.min,
            max: span.max,
        })
    }
}

/// Valid span with a strictly positive lower bound
fn check_positive(
    table: &'static str,
    key: &str,
    field: &'static str,
    span: Span,
) -> Result<(), DataIntegrityError> {
    check_span(table, key, field, span)?;
    if span.min > 0.0 {
        Ok(())
    } else {
        Err(DataIntegrityError::InvalidRange {
            table,
            key: key.to_string(),
            field,
            min: span.min,
            max: span.max,
        })
    }
}

/// Derate percentages must lie in (0, 100]
fn check_percent(
    table: &'static str,
    key: &str,
    field: &'static str,
    span: Span,
) -> Result<(), DataIntegrityError> {
    check_positive(table, key, field, span)?;
    if span.max <= 100.0 {
        Ok(())
    } else {
        Err(DataIntegrityError::InvalidRange {
            table,
            key: key.to_string(),
            field,
            min: span.min,
            max: span.max,
        })
    }
}

fn check_temperature_coverage(rows: &[TemperatureDeratingRow]) -> Result<(), DataIntegrityError> {
    let mut sorted: Vec<&TemperatureDeratingRow> = rows.iter().collect();
    sorted.sort_by(|a, b| a.temp_from_c.total_cmp(&b.temp_from_c));

    let mut covered_to = sorted[0].temp_to_c;
    for row in &sorted[1..] {
        if row.temp_from_c > covered_to {
            return Err(DataIntegrityError::TemperatureGap {
                from: covered_to,
                to: row.temp_from_c,
            });
        }
        covered_to = covered_to.max(row.temp_to_c);
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn segment(class: VehicleClass, name: &str, share: f64, cap: (f64, f64), range: (f64, f64)) -> SegmentSpec {
        SegmentSpec {
            class,
            segment: name.to_string(),
            share_percent: share,
            capacity_kwh: cap.into(),
            range_km: range.into(),
            speeds: None,
        }
    }

    pub fn with_speeds(mut spec: SegmentSpec, urban: f64, rural: f64, highway: f64) -> SegmentSpec {
        spec.speeds = Some(RoadSpeeds {
            urban_kmh: urban,
            rural_kmh: rural,
            highway_kmh: highway,
        });
        spec
    }

    pub fn chargers(class: VehicleClass, labels: &[&str]) -> ChargingCompatibility {
        ChargingCompatibility {
            class,
            chargers: labels.iter().map(|l| l.parse().unwrap()).collect(),
        }
    }

    pub fn band(from: f64, to: f64, cap: (f64, f64), range: (f64, f64)) -> TemperatureDeratingRow {
        TemperatureDeratingRow {
            temp_from_c: from,
            temp_to_c: to,
            capacity_percent: cap.into(),
            range_percent: range.into(),
        }
    }

    /// Small but complete fleet covering all four classes
    pub fn reference_data() -> ReferenceData {
        ReferenceData::new(
            vec![
                segment(VehicleClass::Car, "Kleinwagen", 30.0, (30.0, 45.0), (250.0, 320.0)),
                segment(VehicleClass::Car, "Kompaktklasse", 40.0, (40.0, 60.0), (300.0, 400.0)),
                with_speeds(
                    segment(VehicleClass::Van, "Transporter", 15.0, (60.0, 90.0), (200.0, 300.0)),
                    30.0,
                    60.0,
                    90.0,
                ),
                with_speeds(
                    segment(VehicleClass::Truck, "Sattelzug", 10.0, (400.0, 600.0), (450.0, 600.0)),
                    30.0,
                    60.0,
                    80.0,
                ),
                segment(VehicleClass::Bus, "Solobus", 5.0, (250.0, 400.0), (250.0, 350.0)),
            ],
            vec![
                chargers(VehicleClass::Car, &["AC_11kW", "DC_50kW"]),
                chargers(VehicleClass::Van, &["AC_22kW", "DC_150kW"]),
                chargers(VehicleClass::Truck, &["DC_350kW"]),
                chargers(VehicleClass::Bus, &["DC_150kW"]),
            ],
            vec![
                band(-10.0, 0.0, (70.0, 80.0), (60.0, 75.0)),
                band(0.0, 15.0, (80.0, 95.0), (75.0, 90.0)),
                band(15.0, 35.0, (95.0, 100.0), (90.0, 100.0)),
            ],
        )
        .unwrap()
    }
}
