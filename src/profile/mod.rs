//! Output records: one [`VehicleProfile`] per simulated vehicle holding its
//! [`DayProfile`]s. A day record is assembled in one pass, numbers first and
//! then display fields, and is never mutated afterwards.

pub mod format;

use serde::{Deserialize, Serialize};

use crate::domain::{DayType, Purpose, VehicleClass};
use crate::simulation::{EnergyOutcome, TripSchedule, VehicleInstance};

pub use format::Field;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayProfile {
    pub day: DayType,
    pub purpose: Purpose,
    pub schedule: TripSchedule,
    pub energy: EnergyOutcome,
    /// Display fields in emission order
    pub fields: Vec<Field>,
}

impl DayProfile {
    pub fn build(
        day: DayType,
        purpose: Purpose,
        vehicle: &VehicleInstance,
        schedule: TripSchedule,
        energy: EnergyOutcome,
    ) -> Self {
        let fields = format::render_day(day, purpose, vehicle, &schedule, &energy);
        Self {
            day,
            purpose,
            schedule,
            energy,
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

/// A day whose schedule could not be sampled within the attempt budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedDay {
    pub day: DayType,
    pub attempts: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleProfile {
    /// Position in the batch, starting at 0
    pub index: usize,
    pub purpose: Purpose,
    pub vehicle: VehicleInstance,
    pub days: Vec<DayProfile>,
    pub skipped: Vec<SkippedDay>,
}

impl VehicleProfile {
    pub fn class(&self) -> VehicleClass {
        self.vehicle.class
    }

    pub fn segment(&self) -> &str {
        &self.vehicle.segment
    }

    pub fn day(&self, day: DayType) -> Option<&DayProfile> {
        self.days.iter().find(|d| d.day == day)
    }

    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}
