//! Weighted sky positions
//!
//! A [`WeightedPoint`] is one catalog entry: an equatorial position in degrees, a statistical
//! weight and the raw catalog row it came from (kept so labeled output can reproduce it).

use crate::{DataError, Result};
use geo::Point;

/// One weighted position on the sky
///
/// The position is stored as a `geo::Point` with `x = RA` and `y = DEC`, both in degrees.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WeightedPoint {
    position: Point<f64>,
    weight: f64,
    /// Raw catalog row (opaque to the partitioning code, may be empty)
    payload: Vec<f64>,
}

impl WeightedPoint {
    /// Create a new point, validating RA in `[0, 360)`, DEC in `[-90, 90]` and `weight >= 0`
    pub fn new(ra: f64, dec: f64, weight: f64) -> Result<Self> {
        Self::with_payload(ra, dec, weight, Vec::new())
    }

    /// Create a new point carrying its raw catalog row
    pub fn with_payload(ra: f64, dec: f64, weight: f64, payload: Vec<f64>) -> Result<Self> {
        if !(0.0..360.0).contains(&ra) {
            return Err(DataError::InvalidPoint(format!("RA {ra} outside [0, 360)")));
        }
        if !(-90.0..=90.0).contains(&dec) {
            return Err(DataError::InvalidPoint(format!("DEC {dec} outside [-90, 90]")));
        }
        if !weight.is_finite() || weight < 0.0 {
            return Err(DataError::InvalidPoint(format!(
                "weight {weight} must be finite and non-negative"
            )));
        }
        Ok(Self {
            position: Point::new(ra, dec),
            weight,
            payload,
        })
    }

    /// Right ascension in degrees
    #[inline]
    pub fn ra(&self) -> f64 {
        self.position.x()
    }

    /// Declination in degrees
    #[inline]
    pub fn dec(&self) -> f64 {
        self.position.y()
    }

    #[inline]
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Position as a `geo::Point` (x = RA, y = DEC)
    #[inline]
    pub fn position(&self) -> Point<f64> {
        self.position
    }

    /// The raw catalog row this point was read from
    #[inline]
    pub fn payload(&self) -> &[f64] {
        &self.payload
    }
}

/// Sum of weights of a point set
pub(crate) fn total_weight(points: &[WeightedPoint]) -> f64 {
    points.iter().map(WeightedPoint::weight).sum()
}
