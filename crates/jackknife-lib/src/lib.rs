//! Jackknife Library - Equal-weight sky partitioning for resampling error estimates
//!
//! This library splits a weighted set of sky positions (typically a random catalog of a
//! survey) into `N` contiguous regions of roughly equal total weight, and then assigns any
//! other catalog to those regions so that jackknife resampling can be run on it.
//!
//! # Architecture
//!
//! - **[`plan_partition`]**: Per-strip weight thresholds and region counts
//! - **[`partition`]**: Greedy RA strip cut followed by a DEC cut inside every strip
//! - **[`BoundingBox`] / [`BoundsTable`]**: RA×DEC extents of each region, with wraparound
//! - **[`SphericalGrid`]**: HEALPix raster of the regions for constant-time lookups
//! - **[`label`]**: Region lookup for external points, by bounds or by grid
//! - **[`analyze_balance`]**: Per-region weight deviation from the ideal
//! - **[`SkyMask`]**: Mask-driven partitioning and leave-one-out masks
//!
//! # Performance Characteristics
//!
//! - **Partition**: O(P log P) for the global RA sort, DEC passes run in parallel per strip
//! - **Bounds labeling**: O(Q × N) worst case, parallel over query points
//! - **Grid labeling**: O(Q), parallel over query points

mod balance;
mod bounds;
pub mod catalog;
mod grid;
pub mod healpix;
mod knife;
mod label;
mod mask;
mod planner;
mod point;

// Public API exports
pub use balance::{BalanceReport, RegionBalance, analyze_balance};
pub use bounds::{BoundingBox, BoundsTable};
pub use grid::{SphericalGrid, UNASSIGNED, build_grid};
pub use knife::{Partition, Region, partition};
pub use label::{
    Label, LabelDiagnostics, LabelMethod, LabelOptions, LabelResult, RegionLookup, label,
};
pub use mask::{SkyMask, UNSEEN, jackknife_masks, partition_mask};
pub use planner::{PartitionPlan, PartitionSpec, StripPlan, plan_partition};
pub use point::WeightedPoint;

/// Error types for the jackknife library
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("Invalid partition spec: {0}")]
    InvalidPartitionSpec(String),

    #[error("Invalid partition spec: total weight must be positive, got {0}")]
    ZeroTotalWeight(f64),

    #[error("Not enough points ({points}) to build {regions} regions")]
    InsufficientPoints { points: usize, regions: usize },

    #[error("Malformed bounds file (line {line}): {reason}")]
    MalformedBoundsFile { line: usize, reason: String },

    #[error("Malformed catalog (line {line}): {reason}")]
    MalformedCatalog { line: usize, reason: String },

    #[error("Unknown labeling method: {0:?} (expected \"bounds\" or \"grid\")")]
    UnknownLabelingMethod(String),

    #[error("All {total} points fell outside the jackknife regions")]
    AllPointsLost { total: usize },

    #[error("Invalid point: {0}")]
    InvalidPoint(String),

    #[error("Invalid grid resolution: {0}")]
    InvalidResolution(String),

    #[error("Point set has {found} points, the partition was built from {expected}")]
    PointSetMismatch { expected: usize, found: usize },

    #[error("Empty point set")]
    EmptyPointSet,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "serde")]
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DataError {
    /// Whether this error rejects the partition request itself (as opposed to I/O or labeling)
    pub fn is_invalid_spec(&self) -> bool {
        matches!(
            self,
            DataError::InvalidPartitionSpec(_)
                | DataError::ZeroTotalWeight(_)
                | DataError::InsufficientPoints { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DataError>;
