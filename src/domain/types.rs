use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString};

use crate::error::DataIntegrityError;

// ============================================================================
// Fleet Taxonomy
// ============================================================================

/// Vehicle class, labelled the way the input tables label them
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
    EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum VehicleClass {
    #[serde(alias = "pkw")]
    #[strum(to_string = "PKW", serialize = "Car")]
    Car,
    #[strum(to_string = "Van", serialize = "Transporter")]
    Van,
    #[serde(alias = "lkw")]
    #[strum(to_string = "LKW", serialize = "Truck")]
    Truck,
    #[strum(to_string = "Bus")]
    Bus,
}

impl VehicleClass {
    /// Purposes a vehicle of this class can be assigned
    pub fn purposes(&self) -> &'static [Purpose] {
        match self {
            VehicleClass::Car => &[Purpose::JobEducation, Purpose::Private, Purpose::Service],
            VehicleClass::Van => &[Purpose::Van],
            VehicleClass::Truck => &[Purpose::Truck],
            VehicleClass::Bus => &[Purpose::Bus],
        }
    }
}

/// Trip purpose; selects the schedule policy
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
    EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    #[strum(to_string = "Job&Education")]
    JobEducation,
    Private,
    Service,
    Van,
    #[strum(to_string = "LKW")]
    Truck,
    Bus,
}

/// One value per vehicle class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerClass<T> {
    pub car: T,
    pub van: T,
    pub truck: T,
    pub bus: T,
}

impl<T> PerClass<T> {
    pub fn get(&self, class: VehicleClass) -> &T {
        match class {
            VehicleClass::Car => &self.car,
            VehicleClass::Van => &self.van,
            VehicleClass::Truck => &self.truck,
            VehicleClass::Bus => &self.bus,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
    EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum DayType {
    Workday,
    Weekend,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
pub enum ChargingLocation {
    Public,
    Private,
}

// ============================================================================
// Charger Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargerKind {
    Ac,
    Dc,
    /// Prefix is neither AC nor DC
    Other,
}

/// A charger label such as `AC_11kW` with its parsed current kind and rating
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargerType {
    pub label: String,
    pub kind: ChargerKind,
    pub power_kw: f64,
}

impl ChargerType {
    fn prefix(&self) -> &str {
        self.label.split('_').next().unwrap_or_default()
    }

    /// Same charger family at a different rating, relabelled to match
    pub fn with_power(&self, power_kw: f64) -> Self {
        Self {
            label: format!("{}_{}kW", self.prefix(), power_kw),
            kind: self.kind,
            power_kw,
        }
    }
}

impl FromStr for ChargerType {
    type Err = DataIntegrityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim();
        let malformed = || DataIntegrityError::MalformedChargerLabel(label.to_string());

        let (prefix, rating) = label.split_once('_').ok_or_else(malformed)?;
        let number = rating
            .strip_suffix("kW")
            .or_else(|| rating.strip_suffix("kw"))
            .or_else(|| rating.strip_suffix("KW"))
            .ok_or_else(malformed)?;
        let power_kw: f64 = number.replace(',', ".").parse().map_err(|_| malformed())?;
        if !power_kw.is_finite() || power_kw <= 0.0 {
            return Err(malformed());
        }

        let kind = match prefix.to_ascii_uppercase().as_str() {
            "AC" => ChargerKind::Ac,
            "DC" => ChargerKind::Dc,
            _ => ChargerKind::Other,
        };

        Ok(Self {
            label: label.to_string(),
            kind,
            power_kw,
        })
    }
}

impl fmt::Display for ChargerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

// ============================================================================
// Sampling Ranges
// ============================================================================

/// Closed real interval `[min, max]`, sampled uniformly.
/// Serialized as a two-element array so policy files stay compact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct Span {
    pub min: f64,
    pub max: f64,
}

impl Span {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub const fn fixed(value: f64) -> Self {
        Self::new(value, value)
    }

    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if self.min >= self.max {
            return self.min;
        }
        Uniform::new_inclusive(self.min, self.max).sample(rng)
    }
}

impl From<(f64, f64)> for Span {
    fn from((min, max): (f64, f64)) -> Self {
        Self::new(min, max)
    }
}

impl From<Span> for (f64, f64) {
    fn from(span: Span) -> Self {
        (span.min, span.max)
    }
}

/// Closed integer interval used for trip counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u32, u32)", into = "(u32, u32)")]
pub struct CountSpan {
    pub min: u32,
    pub max: u32,
}

impl CountSpan {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub fn is_valid(&self) -> bool {
        self.min <= self.max
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        if self.min >= self.max {
            return self.min;
        }
        rng.gen_range(self.min..=self.max)
    }
}

impl From<(u32, u32)> for CountSpan {
    fn from((min, max): (u32, u32)) -> Self {
        Self::new(min, max)
    }
}

impl From<CountSpan> for (u32, u32) {
    fn from(span: CountSpan) -> Self {
        (span.min, span.max)
    }
}

// ============================================================================
// Time Helper Types
// ============================================================================

/// Hours as a real number, either a time of day or a duration
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Hours(pub f64);

impl Hours {
    fn whole_minutes(&self) -> chrono::Duration {
        chrono::Duration::minutes((self.0 * 60.0).round() as i64)
    }

    /// Time of day, e.g. `7h 05min`
    pub fn clock(&self) -> String {
        let d = self.whole_minutes();
        format!("{}h {:02}min", d.num_hours(), d.num_minutes() % 60)
    }

    /// Duration, e.g. `1h 5min`
    pub fn duration(&self) -> String {
        let d = self.whole_minutes();
        format!("{}h {}min", d.num_hours(), d.num_minutes() % 60)
    }
}

impl fmt::Display for Hours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.duration())
    }
}

/// Wrap an hour value onto the 24h clock
pub fn wrap_clock(hours: f64) -> f64 {
    hours.rem_euclid(24.0)
}

// ============================================================================
// Unit Tests
// ============================================================================
