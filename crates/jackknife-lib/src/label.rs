//! Assigning external points to frozen jackknife regions
//!
//! A partition can be looked up either through its bounding boxes or through its HEALPix
//! raster. Both are approximations of the real regions, so some points are expected to
//! fall outside every region; those are reported as lost rather than treated as errors.

use crate::{BoundsTable, DataError, Partition, Result, SphericalGrid, WeightedPoint};
use rayon::prelude::*;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How points are matched to regions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LabelMethod {
    /// RA×DEC bounding boxes, first match in id order
    Bounds,
    /// HEALPix raster cell lookup
    Grid,
}

impl FromStr for LabelMethod {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bounds" => Ok(LabelMethod::Bounds),
            // "map" is what older bounds/map tooling called the raster
            "grid" | "map" => Ok(LabelMethod::Grid),
            _ => Err(DataError::UnknownLabelingMethod(s.to_string())),
        }
    }
}

impl fmt::Display for LabelMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelMethod::Bounds => write!(f, "bounds"),
            LabelMethod::Grid => write!(f, "grid"),
        }
    }
}

/// A frozen representation of a partition used for lookups
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RegionLookup {
    Bounds(BoundsTable),
    Grid(SphericalGrid),
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl RegionLookup {
    /// Derive the lookup for `method` from a partition and the points it was built from
    ///
    /// `nside` is only used by [`LabelMethod::Grid`].
    pub fn from_partition(
        partition: &Partition,
        points: &[WeightedPoint],
        method: LabelMethod,
        nside: u32,
    ) -> Result<Self> {
        match method {
            LabelMethod::Bounds => Ok(RegionLookup::Bounds(partition.bounds())),
            LabelMethod::Grid => Ok(RegionLookup::Grid(SphericalGrid::rasterize(
                partition, points, nside,
            )?)),
        }
    }

    pub fn method(&self) -> LabelMethod {
        match self {
            RegionLookup::Bounds(_) => LabelMethod::Bounds,
            RegionLookup::Grid(_) => LabelMethod::Grid,
        }
    }

    /// 0-based region id at an equatorial position
    #[inline]
    pub fn locate(&self, ra: f64, dec: f64) -> Option<usize> {
        match self {
            RegionLookup::Bounds(table) => table.find(ra, dec),
            RegionLookup::Grid(grid) => grid.region_at(ra, dec),
        }
    }
}

/// Labeling options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LabelOptions {
    /// Added to every emitted region id (labels become `id_offset..id_offset + N`)
    pub id_offset: usize,
    /// Leave lost points out of the result
    pub drop_lost: bool,
}

impl Default for LabelOptions {
    fn default() -> Self {
        Self {
            id_offset: 0,
            drop_lost: true,
        }
    }
}

/// Region label of one input point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Label {
    /// Index of the point in the labeled point set
    pub index: usize,
    /// Region id (offset applied), `None` if the point is lost
    pub region: Option<usize>,
}

/// Coverage summary of a labeling run
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LabelDiagnostics {
    pub method: LabelMethod,
    pub total: usize,
    pub lost: usize,
    pub lost_percent: f64,
}

impl LabelDiagnostics {
    fn new(method: LabelMethod, total: usize, lost: usize) -> Self {
        let lost_percent = if total == 0 {
            0.0
        } else {
            100.0 * lost as f64 / total as f64
        };
        Self {
            method,
            total,
            lost,
            lost_percent,
        }
    }

    /// Every point of a non-empty set was lost
    ///
    /// Usually a coordinate frame or bounds file mismatch rather than sparse coverage.
    #[inline]
    pub fn all_lost(&self) -> bool {
        self.total > 0 && self.lost == self.total
    }

    /// Turn [`all_lost`](Self::all_lost) into an error
    pub fn ensure_coverage(&self) -> Result<()> {
        if self.all_lost() {
            return Err(DataError::AllPointsLost { total: self.total });
        }
        Ok(())
    }
}

/// Labels of a point set plus coverage diagnostics
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LabelResult {
    labels: Vec<Label>,
    diagnostics: LabelDiagnostics,
}

impl LabelResult {
    /// Labels in input order (lost points omitted if `drop_lost` was set)
    #[inline]
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    #[inline]
    pub fn diagnostics(&self) -> &LabelDiagnostics {
        &self.diagnostics
    }

    pub fn into_parts(self) -> (Vec<Label>, LabelDiagnostics) {
        (self.labels, self.diagnostics)
    }

    /// Labeled points, paired with the point set that was labeled
    pub fn iter_points<'a>(
        &'a self,
        points: &'a [WeightedPoint],
    ) -> impl Iterator<Item = (&'a WeightedPoint, Option<usize>)> + 'a {
        self.labels.iter().map(move |l| (&points[l.index], l.region))
    }
}

/// Label every point with the region containing it
///
/// Lookups run in parallel; the lookup structure is only read.
pub fn label(
    points: &[WeightedPoint],
    lookup: &RegionLookup,
    options: LabelOptions,
) -> LabelResult {
    #[cfg(feature = "profiling")]
    profiling::scope!("label::label");

    let method = lookup.method();
    let all: Vec<Label> = points
        .par_iter()
        .enumerate()
        .map(|(index, p)| Label {
            index,
            region: lookup
                .locate(p.ra(), p.dec())
                .map(|id| id + options.id_offset),
        })
        .collect();

    let lost = all.iter().filter(|l| l.region.is_none()).count();
    let diagnostics = LabelDiagnostics::new(method, points.len(), lost);

    tracing::info!(
        "Label info, method: {} - total points: {}, not covered: {} ({:.6} %)",
        method,
        diagnostics.total,
        diagnostics.lost,
        diagnostics.lost_percent
    );
    if diagnostics.all_lost() {
        tracing::warn!(
            "All {} points are outside the jackknife regions, check the coordinate frame and bounds",
            diagnostics.total
        );
    }

    let labels = if options.drop_lost && lost > 0 {
        tracing::info!("Removing points not covered in jackknife regions");
        all.into_iter().filter(|l| l.region.is_some()).collect()
    } else {
        all
    };

    LabelResult {
        labels,
        diagnostics,
    }
}
