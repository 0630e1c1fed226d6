//! Split a total profile count across vehicle classes by fleet share.

use itertools::Itertools;
use std::collections::BTreeMap;
use tracing::debug;

use crate::domain::VehicleClass;
use crate::error::AllocationError;

const SHARE_TOLERANCE: f64 = 0.5;

/// Per-class profile counts.
///
/// Each class gets `floor(total * share / 100)`, at least one if its share is
/// nonzero. The rounding remainder is settled on the largest-share classes so
/// the counts always sum to `total`.
pub fn allocate(
    total: usize,
    shares: &BTreeMap<VehicleClass, f64>,
) -> Result<BTreeMap<VehicleClass, usize>, AllocationError> {
    if let Some((&class, _)) = shares.iter().find(|&(_, &s)| s < 0.0 || !s.is_finite()) {
        return Err(AllocationError::NegativeShare(class));
    }

    let sum: f64 = shares.values().sum();
    if (sum - 100.0).abs() > SHARE_TOLERANCE {
        return Err(AllocationError::SharesNotNormalized(sum));
    }

    let nonzero = shares.values().filter(|&&s| s > 0.0).count();
    if total < nonzero {
        return Err(AllocationError::TooFewProfiles {
            total,
            classes: nonzero,
        });
    }

    let mut counts: BTreeMap<VehicleClass, usize> = shares
        .iter()
        .map(|(&class, &share)| {
            let count = if share > 0.0 {
                ((total as f64 * share / 100.0).floor() as usize).max(1)
            } else {
                0
            };
            (class, count)
        })
        .collect();

    let by_share_desc: Vec<VehicleClass> = shares
        .iter()
        .filter(|&(_, &s)| s > 0.0)
        .sorted_by(|a, b| b.1.total_cmp(a.1))
        .map(|(&class, _)| class)
        .collect();

    let assigned: usize = counts.values().sum();
    if assigned < total {
        if let Some(largest) = by_share_desc.first() {
            *counts.entry(*largest).or_default() += total - assigned;
        }
    } else {
        let mut excess = assigned - total;
        for class in &by_share_desc {
            if excess == 0 {
                break;
            }
            if let Some(count) = counts.get_mut(class) {
                let take = (*count - 1).min(excess);
                *count -= take;
                excess -= take;
            }
        }
    }

    debug!(total, ?counts, "profiles allocated");
    Ok(counts)
}
