//! HEALPix raster of jackknife regions
//!
//! Every pixel that contains at least one member point of a region gets that region's id.
//! Pixels shared by several regions keep the highest id (regions are written in id order),
//! pixels never touched stay [`UNASSIGNED`].

use crate::healpix::{self, ang2pix_ring, equatorial_to_galactic, nside2npix};
use crate::{DataError, Partition, Result, WeightedPoint};
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Cell value of pixels that belong to no region
pub const UNASSIGNED: i64 = i64::MIN;

/// Equal-area (HEALPix RING, Galactic frame) grid of region ids
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SphericalGrid {
    nside: u32,
    /// 0-based region id per pixel, or `UNASSIGNED`
    cells: Vec<i64>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl SphericalGrid {
    /// Create a grid with every cell unassigned
    pub fn new(nside: u32) -> Result<Self> {
        Ok(Self {
            nside,
            cells: healpix::pixel_buffer(nside, UNASSIGNED)?,
        })
    }

    /// Rebuild a grid from raw cells (e.g. after deserialization)
    pub fn from_cells(nside: u32, cells: Vec<i64>) -> Result<Self> {
        healpix::validate_nside(nside)?;
        if cells.len() as u64 != nside2npix(nside) {
            return Err(DataError::InvalidResolution(format!(
                "nside {nside} needs {} cells, got {}",
                nside2npix(nside),
                cells.len()
            )));
        }
        if let Some(bad) = cells.iter().find(|&&c| c < 0 && c != UNASSIGNED) {
            return Err(DataError::InvalidResolution(format!("invalid cell value {bad}")));
        }
        Ok(Self { nside, cells })
    }

    /// Rasterize the regions of a partition
    ///
    /// `points` must be the point set the partition was built from.
    pub fn rasterize(partition: &Partition, points: &[WeightedPoint], nside: u32) -> Result<Self> {
        #[cfg(feature = "profiling")]
        profiling::scope!("grid::rasterize");

        if partition.point_count() != points.len() {
            return Err(DataError::PointSetMismatch {
                expected: partition.point_count(),
                found: points.len(),
            });
        }
        let mut grid = Self::new(nside)?;
        tracing::info!(
            "Making HEALPix map for jackknife regions (nside {}, {} pixels)",
            nside,
            grid.npix()
        );

        // Pixel lookups are independent; writes must stay in id order
        let region_pixels: Vec<Vec<u64>> = partition
            .regions()
            .par_iter()
            .map(|region| {
                let mut pixels: Vec<u64> = region
                    .members()
                    .iter()
                    .map(|&i| grid.pixel_of(points[i].ra(), points[i].dec()))
                    .collect();
                pixels.sort_unstable();
                pixels.dedup();
                pixels
            })
            .collect();

        let mut overwritten = 0usize;
        for (region, pixels) in partition.regions().iter().zip(region_pixels) {
            for pix in pixels {
                let cell = &mut grid.cells[pix as usize];
                if *cell != UNASSIGNED {
                    overwritten += 1;
                }
                *cell = region.id() as i64;
            }
        }
        if overwritten > 0 {
            tracing::debug!("{overwritten} pixels shared by several regions (highest id kept)");
        }

        Ok(grid)
    }

    #[inline]
    pub fn nside(&self) -> u32 {
        self.nside
    }

    #[inline]
    pub fn npix(&self) -> u64 {
        self.cells.len() as u64
    }

    #[inline]
    pub fn cells(&self) -> &[i64] {
        &self.cells
    }

    /// Number of cells holding a region id
    pub fn assigned_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c != UNASSIGNED).count()
    }

    /// Pixel containing an equatorial position
    #[inline]
    pub fn pixel_of(&self, ra: f64, dec: f64) -> u64 {
        let (theta, phi) = equatorial_to_galactic(ra, dec);
        ang2pix_ring(self.nside, theta, phi)
    }

    /// Region id stored in a pixel
    #[inline]
    pub fn cell(&self, pixel: u64) -> Option<usize> {
        match self.cells.get(pixel as usize) {
            Some(&c) if c != UNASSIGNED => Some(c as usize),
            _ => None,
        }
    }

    /// Region id at an equatorial position
    #[inline]
    pub fn region_at(&self, ra: f64, dec: f64) -> Option<usize> {
        self.cell(self.pixel_of(ra, dec))
    }

    #[cfg(feature = "serde")]
    pub fn save_json<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path.as_ref())?;
        serde_json::to_writer(std::io::BufWriter::new(file), self)?;
        tracing::info!("Jackknife map saved to file: {}", path.as_ref().display());
        Ok(())
    }

    #[cfg(feature = "serde")]
    pub fn load_json<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        tracing::info!("Loading jackknife map: {}", path.as_ref().display());
        let file = std::fs::File::open(path.as_ref())?;
        let raw: Self = serde_json::from_reader(std::io::BufReader::new(file))?;
        Self::from_cells(raw.nside, raw.cells)
    }
}

/// Rasterize a partition at the given nside
pub fn build_grid(
    partition: &Partition,
    points: &[WeightedPoint],
    nside: u32,
) -> Result<SphericalGrid> {
    SphericalGrid::rasterize(partition, points, nside)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PartitionSpec, partition};

    fn band_points() -> Vec<WeightedPoint> {
        // A dense patch of sky, 0.5 degree spacing
        let mut points = Vec::new();
        for i in 0..80 {
            for j in 0..40 {
                let ra = 100.0 + i as f64 * 0.5;
                let dec = -10.0 + j as f64 * 0.5;
                points.push(WeightedPoint::new(ra, dec, 1.0).unwrap());
            }
        }
        points
    }

    #[test]
    fn test_new_grid_is_unassigned() {
        let grid = SphericalGrid::new(4).unwrap();
        assert_eq!(grid.npix(), 192);
        assert_eq!(grid.assigned_count(), 0);
        assert_eq!(grid.region_at(10.0, 10.0), None);
        assert!(SphericalGrid::new(3).is_err());
    }

    #[test]
    fn test_oversized_grid_is_an_error() {
        for nside in [healpix::MAX_NSIDE * 2, 1 << 29, 1 << 31] {
            assert!(matches!(
                SphericalGrid::new(nside),
                Err(DataError::InvalidResolution(_))
            ));
        }
    }

    #[test]
    fn test_members_land_on_their_region() {
        let points = band_points();
        let spec = PartitionSpec {
            regions: 4,
            ra_strips: 2,
            ra_rotation: 0.0,
        };
        let partition = partition(&points, &spec).unwrap();
        let grid = SphericalGrid::rasterize(&partition, &points, 64).unwrap();

        assert!(grid.assigned_count() > 0);
        let ids: std::collections::BTreeSet<usize> =
            grid.cells().iter().filter_map(|&c| (c >= 0).then_some(c as usize)).collect();
        assert_eq!(ids.len(), 4);

        // Every member point hits an assigned pixel; most hit their own region
        let mut own = 0;
        for region in partition.regions() {
            for &m in region.members() {
                let found = grid.region_at(points[m].ra(), points[m].dec());
                assert!(found.is_some());
                if found == Some(region.id()) {
                    own += 1;
                }
            }
        }
        assert!(own as f64 >= 0.9 * points.len() as f64);

        // Far away from the patch nothing is assigned
        assert_eq!(grid.region_at(300.0, 60.0), None);
    }

    #[test]
    fn test_last_writer_wins() {
        // Two regions whose points fall in the same coarse pixel
        let points: Vec<WeightedPoint> = (0..4)
            .map(|i| WeightedPoint::new(50.0 + i as f64 * 0.01, 20.0, 1.0).unwrap())
            .collect();
        let spec = PartitionSpec {
            regions: 2,
            ra_strips: 2,
            ra_rotation: 0.0,
        };
        let partition = partition(&points, &spec).unwrap();
        let grid = SphericalGrid::rasterize(&partition, &points, 1).unwrap();
        assert_eq!(grid.assigned_count(), 1);
        assert_eq!(grid.region_at(50.0, 20.0), Some(1));
    }

    #[test]
    fn test_rejects_mismatched_points() {
        let points = band_points();
        let partition = partition(&points, &PartitionSpec::default()).unwrap();
        assert!(matches!(
            SphericalGrid::rasterize(&partition, &points[..10], 16),
            Err(DataError::PointSetMismatch { .. })
        ));
    }

    #[test]
    fn test_from_cells_validation() {
        assert!(SphericalGrid::from_cells(1, vec![UNASSIGNED; 12]).is_ok());
        assert!(SphericalGrid::from_cells(1, vec![0; 11]).is_err());
        assert!(SphericalGrid::from_cells(1, vec![-1; 12]).is_err());
    }

    #[test]
    fn test_deterministic_raster() {
        let points = band_points();
        let partition = partition(&points, &PartitionSpec::default()).unwrap();
        let a = SphericalGrid::rasterize(&partition, &points, 32).unwrap();
        let b = build_grid(&partition, &points, 32).unwrap();
        assert_eq!(a, b);
    }
}
