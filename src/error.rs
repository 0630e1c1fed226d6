use thiserror::Error;

use crate::domain::{DayType, Purpose, VehicleClass};

/// Reference data does not support a lookup, or violates a load-time invariant.
/// Always fatal for the vehicle being generated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataIntegrityError {
    #[error("No segment row for class {class}, segment '{segment}'")]
    MissingSegment { class: VehicleClass, segment: String },

    #[error("No segment rows for class {0}")]
    NoSegments(VehicleClass),

    #[error("Segment {class}/'{segment}' has no road speeds")]
    MissingSegmentSpeeds { class: VehicleClass, segment: String },

    #[error("No compatible chargers for class {0}")]
    MissingCompatibility(VehicleClass),

    #[error("No temperature band covers {0:.2} °C")]
    NoTemperatureBand(f64),

    #[error("Malformed charger label '{0}' (expected PREFIX_<number>kW)")]
    MalformedChargerLabel(String),

    #[error("Invalid range in {table} ({key}): {field} min {min} > max {max}")]
    InvalidRange {
        table: &'static str,
        key: String,
        field: &'static str,
        min: f64,
        max: f64,
    },

    #[error("Temperature bands leave a gap between {from:.1} °C and {to:.1} °C")]
    TemperatureGap { from: f64, to: f64 },

    #[error("Table '{0}' is empty")]
    EmptyTable(&'static str),
}

/// Rejection sampling gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("No schedule satisfied the constraints after {attempts} attempts")]
    Unsatisfiable { attempts: u64 },
}

/// Errors raised while generating a single vehicle profile
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    #[error(transparent)]
    DataIntegrity(#[from] DataIntegrityError),

    #[error("{purpose} {day}: constraints unsatisfiable after {attempts} attempts")]
    ConstraintUnsatisfiable {
        purpose: Purpose,
        day: DayType,
        attempts: u64,
    },
}

/// Table ingestion errors
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Invalid number in row {row}, column {column}: '{value}'")]
    InvalidNumber {
        row: usize,
        column: String,
        value: String,
    },

    #[error("Unknown vehicle class in row {row}: '{value}'")]
    UnknownClass { row: usize, value: String },

    #[error(transparent)]
    DataIntegrity(#[from] DataIntegrityError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AllocationError {
    #[error("Class shares sum to {0:.2}%, expected 100%")]
    SharesNotNormalized(f64),

    #[error("Cannot give {classes} classes at least one profile each out of {total}")]
    TooFewProfiles { total: usize, classes: usize },

    #[error("Negative share for class {0}")]
    NegativeShare(VehicleClass),
}
