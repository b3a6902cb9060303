//! Survey masks as HEALPix maps
//!
//! A mask is a RING-ordered Galactic map whose values are the survey completeness of each
//! pixel. Pixels with value 0 or [`UNSEEN`] are outside the footprint. The covered pixels can
//! be partitioned directly (each pixel centre becomes a point weighted by its value) and a
//! bounds table can be turned back into leave-one-out masks.

use crate::healpix::{self, galactic_to_equatorial, nside2npix, pix2ang_ring};
use crate::{
    BoundsTable, DataError, Partition, PartitionSpec, Result, SphericalGrid, WeightedPoint,
    partition,
};
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Value of pixels without data
pub const UNSEEN: f64 = -1.6375e30;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SkyMask {
    nside: u32,
    values: Vec<f64>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl SkyMask {
    pub fn new(nside: u32, values: Vec<f64>) -> Result<Self> {
        healpix::validate_nside(nside)?;
        if values.len() as u64 != nside2npix(nside) {
            return Err(DataError::InvalidResolution(format!(
                "nside {nside} needs {} mask values, got {}",
                nside2npix(nside),
                values.len()
            )));
        }
        Ok(Self { nside, values })
    }

    /// Mask with every pixel set to `value`
    pub fn filled(nside: u32, value: f64) -> Result<Self> {
        Ok(Self {
            nside,
            values: healpix::pixel_buffer(nside, value)?,
        })
    }

    #[inline]
    pub fn nside(&self) -> u32 {
        self.nside
    }

    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[inline]
    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Whether a pixel is part of the footprint
    #[inline]
    fn is_covered(value: f64) -> bool {
        value != 0.0 && value != UNSEEN
    }

    /// Number of pixels in the footprint
    pub fn covered_count(&self) -> usize {
        self.values.iter().filter(|&&v| Self::is_covered(v)).count()
    }

    /// Equatorial RA/DEC of a pixel centre
    #[inline]
    pub fn pixel_center(&self, pixel: u64) -> (f64, f64) {
        let (theta, phi) = pix2ang_ring(self.nside, pixel);
        galactic_to_equatorial(theta, phi)
    }

    /// One point per covered pixel, at the pixel centre and weighted by the pixel value
    ///
    /// Fails with `InvalidPoint` if a covered pixel holds a negative value.
    pub fn weighted_points(&self) -> Result<Vec<WeightedPoint>> {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, v)| Self::is_covered(**v))
            .map(|(pix, &v)| {
                let (ra, dec) = self.pixel_center(pix as u64);
                WeightedPoint::new(ra, dec, v)
            })
            .collect()
    }

    #[cfg(feature = "serde")]
    pub fn save_json<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path.as_ref())?;
        serde_json::to_writer(std::io::BufWriter::new(file), self)?;
        tracing::info!("Mask saved to file: {}", path.as_ref().display());
        Ok(())
    }

    #[cfg(feature = "serde")]
    pub fn load_json<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        tracing::info!("Loading mask: {}", path.as_ref().display());
        let file = std::fs::File::open(path.as_ref())?;
        let raw: Self = serde_json::from_reader(std::io::BufReader::new(file))?;
        Self::new(raw.nside, raw.values)
    }
}

/// Partition the footprint of a mask
///
/// Returns the partition, its raster at the mask's own nside and the pixel-centre points it
/// was built from (needed to relate region members back to positions).
pub fn partition_mask(
    mask: &SkyMask,
    spec: &PartitionSpec,
) -> Result<(Partition, SphericalGrid, Vec<WeightedPoint>)> {
    #[cfg(feature = "profiling")]
    profiling::scope!("mask::partition_mask");

    let points = mask.weighted_points()?;
    tracing::info!(
        "Partitioning mask footprint: {} of {} pixels covered",
        points.len(),
        mask.values.len()
    );
    let partition = partition(&points, spec)?;
    let grid = SphericalGrid::rasterize(&partition, &points, mask.nside)?;
    Ok((partition, grid, points))
}

/// Leave-one-out masks: for every region, a copy of `mask` with the covered pixels whose
/// centre lies in that region's bounding box set to 0
pub fn jackknife_masks(mask: &SkyMask, bounds: &BoundsTable) -> Vec<SkyMask> {
    #[cfg(feature = "profiling")]
    profiling::scope!("mask::jackknife_masks");

    let covered: Vec<(usize, f64, f64)> = mask
        .values
        .par_iter()
        .enumerate()
        .filter(|(_, v)| **v > 0.0)
        .map(|(pix, _)| {
            let (ra, dec) = mask.pixel_center(pix as u64);
            (pix, ra, dec)
        })
        .collect();

    bounds
        .boxes()
        .par_iter()
        .enumerate()
        .map(|(region, bbox)| {
            let mut jk = mask.clone();
            let mut removed = 0usize;
            for &(pix, ra, dec) in &covered {
                if bbox.contains(ra, dec) {
                    jk.values[pix] = 0.0;
                    removed += 1;
                }
            }
            tracing::debug!("jk mask {region}: {removed} pixels removed");
            jk
        })
        .collect()
}
