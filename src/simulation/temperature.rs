//! Ambient temperature draw and its derating factors.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::Span;
use crate::error::DataIntegrityError;
use crate::reference::ReferenceData;

/// One vehicle's ambient temperature and the derating drawn from its band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureDraw {
    pub temperature_c: f64,
    /// Usable share of the rated capacity (%)
    pub capacity_derate_percent: f64,
    /// Usable share of the rated range (%)
    pub range_derate_percent: f64,
}

/// Draw a temperature uniformly in `bounds` and resolve its derating band.
///
/// An uncovered temperature means the derating table is broken; it is
/// reported, never retried.
pub fn sample_temperature<R: Rng + ?Sized>(
    reference: &ReferenceData,
    bounds: Span,
    rng: &mut R,
) -> Result<TemperatureDraw, DataIntegrityError> {
    let temperature_c = bounds.sample(rng);
    let band = reference.temperature_band(temperature_c)?;

    Ok(TemperatureDraw {
        temperature_c,
        capacity_derate_percent: band.capacity_percent.sample(rng),
        range_derate_percent: band.range_percent.sample(rng),
    })
}
