//! Per-region weight balance of a labeled point set

use crate::{DataError, Label, Result, WeightedPoint};
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Weight carried by one region
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RegionBalance {
    pub region: usize,
    pub count: usize,
    pub weight: f64,
    /// `100 · (weight − ideal) / ideal`
    pub deviation_percent: f64,
}

/// Balance of all observed regions, in id order
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BalanceReport {
    pub total_weight: f64,
    pub ideal_weight: f64,
    pub regions: Vec<RegionBalance>,
}

impl BalanceReport {
    /// Largest `|deviation_percent|` over all regions
    pub fn max_abs_deviation(&self) -> f64 {
        self.regions
            .iter()
            .map(|r| r.deviation_percent.abs())
            .fold(0.0, f64::max)
    }

    /// Region with the given id, if it was observed
    pub fn region(&self, id: usize) -> Option<&RegionBalance> {
        self.regions
            .binary_search_by_key(&id, |r| r.region)
            .ok()
            .map(|i| &self.regions[i])
    }
}

/// Compare the weight of every labeled region to the ideal share
///
/// The ideal is the labeled total weight divided by `expected_regions`, or by the number of
/// distinct region ids seen when not given. Lost labels are skipped.
pub fn analyze_balance(
    points: &[WeightedPoint],
    labels: &[Label],
    expected_regions: Option<usize>,
) -> Result<BalanceReport> {
    let mut per_region: BTreeMap<usize, (usize, f64)> = BTreeMap::new();
    for label in labels {
        let Some(region) = label.region else {
            continue;
        };
        let point = points.get(label.index).ok_or(DataError::PointSetMismatch {
            expected: label.index + 1,
            found: points.len(),
        })?;
        let entry = per_region.entry(region).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += point.weight();
    }
    if per_region.is_empty() {
        return Err(DataError::EmptyPointSet);
    }

    let region_count = expected_regions.unwrap_or(per_region.len());
    if region_count == 0 {
        return Err(DataError::InvalidPartitionSpec(
            "expected region count must be positive".to_string(),
        ));
    }
    let total_weight: f64 = per_region.values().map(|(_, w)| w).sum();
    let ideal_weight = total_weight / region_count as f64;

    let regions = per_region
        .into_iter()
        .map(|(region, (count, weight))| RegionBalance {
            region,
            count,
            weight,
            deviation_percent: if ideal_weight > 0.0 {
                100.0 * (weight - ideal_weight) / ideal_weight
            } else {
                0.0
            },
        })
        .collect();

    let report = BalanceReport {
        total_weight,
        ideal_weight,
        regions,
    };
    tracing::info!(
        "Balance: {} regions, ideal weight {:.6}, max deviation {:.3} %",
        report.regions.len(),
        report.ideal_weight,
        report.max_abs_deviation()
    );
    Ok(report)
}
