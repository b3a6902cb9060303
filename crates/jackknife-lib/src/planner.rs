//! Partition planning: how much weight and how many regions each RA strip gets
//!
//! When `N` is not a multiple of `M`, the first `M - 1` strips each owe `floor(N / M)`
//! regions and the last strip owes the remainder `N - (M - 1) * floor(N / M)`. Every strip's
//! weight threshold is its owed count times the ideal region weight `W / N`, so the uniform
//! case falls out of the same rule.

use crate::{DataError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A partition request
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PartitionSpec {
    /// Target number of jackknife regions (`N`)
    pub regions: usize,
    /// Number of strips cut along RA before the DEC pass (`M`, `1 <= M <= N`)
    pub ra_strips: usize,
    /// RA rotation in degrees applied before cutting, to move the 0/360 seam
    pub ra_rotation: f64,
}

impl Default for PartitionSpec {
    fn default() -> Self {
        Self {
            regions: 20,
            ra_strips: 5,
            ra_rotation: 0.0,
        }
    }
}

/// Plan for one RA strip
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StripPlan {
    /// Weight at which the strip is closed during the RA pass
    pub weight_threshold: f64,
    /// Number of DEC regions the strip is cut into
    pub owed_regions: usize,
}

/// Per-strip thresholds and region counts for a partition request
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PartitionPlan {
    pub total_weight: f64,
    pub regions: usize,
    pub strips: Vec<StripPlan>,
}

impl PartitionPlan {
    /// Ideal weight of one region (`W / N`)
    #[inline]
    pub fn region_weight(&self) -> f64 {
        self.total_weight / self.regions as f64
    }

    /// Whether the RA pass can be skipped (a single strip owing every region)
    #[inline]
    pub fn is_single_strip(&self) -> bool {
        self.strips.len() == 1
    }
}

/// Compute the strip thresholds and owed region counts
///
/// # Errors
/// `InvalidPartitionSpec` if `regions < 1`, `ra_strips < 1` or `ra_strips > regions`;
/// `ZeroTotalWeight` if `total_weight` is not strictly positive.
pub fn plan_partition(
    total_weight: f64,
    regions: usize,
    ra_strips: usize,
) -> Result<PartitionPlan> {
    if regions < 1 {
        return Err(DataError::InvalidPartitionSpec(
            "region count must be at least 1".to_string(),
        ));
    }
    if ra_strips < 1 {
        return Err(DataError::InvalidPartitionSpec(
            "RA strip count must be at least 1".to_string(),
        ));
    }
    if ra_strips > regions {
        return Err(DataError::InvalidPartitionSpec(format!(
            "RA strip count ({ra_strips}) exceeds region count ({regions})"
        )));
    }
    if !(total_weight.is_finite() && total_weight > 0.0) {
        return Err(DataError::ZeroTotalWeight(total_weight));
    }

    let region_weight = total_weight / regions as f64;
    let per_strip = regions / ra_strips;
    let last = regions - (ra_strips - 1) * per_strip;

    let strips = (0..ra_strips)
        .map(|i| {
            let owed_regions = if i + 1 == ra_strips { last } else { per_strip };
            StripPlan {
                weight_threshold: owed_regions as f64 * region_weight,
                owed_regions,
            }
        })
        .collect();

    Ok(PartitionPlan {
        total_weight,
        regions,
        strips,
    })
}
