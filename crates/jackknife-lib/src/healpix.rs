//! HEALPix RING-scheme pixel math and the equatorial/Galactic frame rotation
//!
//! The jackknife grid lives in Galactic coordinates (like survey masks usually do), so every
//! equatorial position goes through [`equatorial_to_galactic`] before [`ang2pix_ring`].
//! Angles follow the HEALPix convention: `theta` is the colatitude in `[0, π]`, `phi` the
//! longitude in `[0, 2π)`.

use crate::{DataError, Result};
use std::f64::consts::{FRAC_PI_2, PI, TAU};

/// Largest supported nside; grids and masks store every pixel
pub const MAX_NSIDE: u32 = 1 << 13;

/// Rotation matrix from equatorial (J2000) to Galactic Cartesian coordinates
const EQ_TO_GAL: [[f64; 3]; 3] = [
    [-0.054_875_560_416_215_4, -0.873_437_090_234_885, -0.483_835_015_548_713_2],
    [0.494_109_427_875_583_7, -0.444_829_629_960_011_2, 0.746_982_244_497_218_9],
    [-0.867_666_149_019_004_7, -0.198_076_373_431_201_5, 0.455_983_776_175_066_9],
];

/// Check that `nside` is a power of two in `1..=MAX_NSIDE`
pub fn validate_nside(nside: u32) -> Result<()> {
    if nside == 0 || !nside.is_power_of_two() || nside > MAX_NSIDE {
        return Err(DataError::InvalidResolution(format!(
            "nside must be a power of two in [1, {MAX_NSIDE}], got {nside}"
        )));
    }
    Ok(())
}

/// Number of pixels of a grid (`12 nside²`)
#[inline]
pub fn nside2npix(nside: u32) -> u64 {
    12 * nside as u64 * nside as u64
}

/// Dense per-pixel buffer filled with `value`
///
/// Allocation failure is reported as `InvalidResolution` instead of aborting.
pub(crate) fn pixel_buffer<T: Clone>(nside: u32, value: T) -> Result<Vec<T>> {
    validate_nside(nside)?;
    let npix = nside2npix(nside);
    let unallocatable = || {
        DataError::InvalidResolution(format!("cannot allocate {npix} pixels for nside {nside}"))
    };
    let len = usize::try_from(npix).map_err(|_| unallocatable())?;
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(len).map_err(|_| unallocatable())?;
    buffer.resize(len, value);
    Ok(buffer)
}

/// Inverse of [`nside2npix`], if `npix` is a valid pixel count
pub fn npix2nside(npix: u64) -> Option<u32> {
    if npix % 12 != 0 {
        return None;
    }
    let n2 = npix / 12;
    let nside = n2.isqrt();
    (nside * nside == n2 && nside <= MAX_NSIDE as u64).then_some(nside as u32)
}

#[inline]
fn to_unit_vector(theta: f64, phi: f64) -> [f64; 3] {
    let (st, ct) = theta.sin_cos();
    let (sp, cp) = phi.sin_cos();
    [st * cp, st * sp, ct]
}

#[inline]
fn from_unit_vector(v: [f64; 3]) -> (f64, f64) {
    let theta = v[2].clamp(-1.0, 1.0).acos();
    let phi = v[1].atan2(v[0]).rem_euclid(TAU);
    (theta, phi)
}

/// RA/DEC in degrees to HEALPix angles in the same frame
#[inline]
pub fn radec_to_angles(ra: f64, dec: f64) -> (f64, f64) {
    ((90.0 - dec).to_radians(), ra.to_radians().rem_euclid(TAU))
}

/// Wrap an angle in degrees into `[0, 360)`
#[inline]
pub fn wrap_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// HEALPix angles back to RA/DEC in degrees, RA wrapped into `[0, 360)`
#[inline]
pub fn angles_to_radec(theta: f64, phi: f64) -> (f64, f64) {
    (wrap_degrees(phi.to_degrees()), 90.0 - theta.to_degrees())
}

/// Equatorial RA/DEC (degrees) to Galactic HEALPix angles
pub fn equatorial_to_galactic(ra: f64, dec: f64) -> (f64, f64) {
    let (theta, phi) = radec_to_angles(ra, dec);
    let v = to_unit_vector(theta, phi);
    let g = EQ_TO_GAL.map(|row| row[0] * v[0] + row[1] * v[1] + row[2] * v[2]);
    from_unit_vector(g)
}

/// Galactic HEALPix angles to equatorial RA/DEC (degrees)
pub fn galactic_to_equatorial(theta: f64, phi: f64) -> (f64, f64) {
    let g = to_unit_vector(theta, phi);
    // The inverse of a rotation is its transpose
    let v = [0, 1, 2]
        .map(|c| EQ_TO_GAL[0][c] * g[0] + EQ_TO_GAL[1][c] * g[1] + EQ_TO_GAL[2][c] * g[2]);
    let (theta, phi) = from_unit_vector(v);
    angles_to_radec(theta, phi)
}

/// Pixel (RING scheme) containing the direction `(theta, phi)`
pub fn ang2pix_ring(nside: u32, theta: f64, phi: f64) -> u64 {
    let nside = nside as i64;
    let npix = 12 * nside * nside;
    let ncap = 2 * nside * (nside - 1);

    let z = theta.cos();
    let za = z.abs();
    let tt = (phi / FRAC_PI_2).rem_euclid(4.0);

    let pix = if za <= 2.0 / 3.0 {
        let nl4 = 4 * nside;
        let temp1 = nside as f64 * (0.5 + tt);
        let temp2 = nside as f64 * z * 0.75;
        // Indices of the ascending and descending edge lines
        let jp = (temp1 - temp2) as i64;
        let jm = (temp1 + temp2) as i64;
        // Ring number counted from z = 2/3, in 1..=2 nside + 1
        let ir = nside + 1 + jp - jm;
        let kshift = 1 - (ir & 1);
        let t1 = jp + jm - nside + kshift + 1 + 2 * nl4;
        let ip = (t1 / 2) % nl4;
        ncap + (ir - 1) * nl4 + ip
    } else {
        let tp = tt - tt.floor();
        let tmp = nside as f64 * (3.0 * (1.0 - za)).sqrt();
        let jp = (tp * tmp) as i64;
        let jm = ((1.0 - tp) * tmp) as i64;
        // Ring number counted from the closest pole
        let ir = jp + jm + 1;
        let ip = ((tt * ir as f64) as i64).min(4 * ir - 1);
        if z > 0.0 {
            2 * ir * (ir - 1) + ip
        } else {
            npix - 2 * ir * (ir + 1) + ip
        }
    };

    pix.clamp(0, npix - 1) as u64
}

/// Centre `(theta, phi)` of a RING-scheme pixel
pub fn pix2ang_ring(nside: u32, pix: u64) -> (f64, f64) {
    let nside = nside as i64;
    let npix = 12 * nside * nside;
    let ncap = 2 * nside * (nside - 1);
    let pix = pix as i64;
    let fact2 = 4.0 / npix as f64;

    let (z, phi) = if pix < ncap {
        // North polar cap
        let iring = (1 + (1 + 2 * pix as u64).isqrt() as i64) >> 1;
        let iphi = (pix + 1) - 2 * iring * (iring - 1);
        let z = 1.0 - (iring * iring) as f64 * fact2;
        (z, (iphi as f64 - 0.5) * FRAC_PI_2 / iring as f64)
    } else if pix < npix - ncap {
        // Equatorial belt
        let nl4 = 4 * nside;
        let ip = pix - ncap;
        let tmp = ip / nl4;
        let iring = tmp + nside;
        let iphi = ip - nl4 * tmp + 1;
        let fodd = if (iring + nside) & 1 == 1 { 1.0 } else { 0.5 };
        let z = (2 * nside - iring) as f64 * 2.0 / (3.0 * nside as f64);
        (z, (iphi as f64 - fodd) * PI / (2.0 * nside as f64))
    } else {
        // South polar cap
        let ip = npix - pix;
        let iring = (1 + (2 * ip as u64 - 1).isqrt() as i64) >> 1;
        let iphi = 4 * iring + 1 - (ip - 2 * iring * (iring - 1));
        let z = (iring * iring) as f64 * fact2 - 1.0;
        (z, (iphi as f64 - 0.5) * FRAC_PI_2 / iring as f64)
    };

    (z.clamp(-1.0, 1.0).acos(), phi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_nside() {
        assert!(validate_nside(1).is_ok());
        assert!(validate_nside(256).is_ok());
        assert!(validate_nside(0).is_err());
        assert!(validate_nside(48).is_err());
        assert!(validate_nside(MAX_NSIDE).is_ok());
        assert!(validate_nside(MAX_NSIDE * 2).is_err());
        assert!(validate_nside(1 << 29).is_err());
    }

    #[test]
    fn test_pixel_buffer() {
        let buffer = pixel_buffer(2, -1i64).unwrap();
        assert_eq!(buffer, vec![-1; 48]);
        assert!(matches!(pixel_buffer(1 << 29, 0u8), Err(DataError::InvalidResolution(_))));
        assert!(pixel_buffer(6, 0u8).is_err());
    }

    #[test]
    fn test_wrap_degrees() {
        assert_eq!(wrap_degrees(-1e-20), 0.0);
        assert_eq!(wrap_degrees(360.0), 0.0);
        assert_eq!(wrap_degrees(-90.0), 270.0);
        assert_eq!(wrap_degrees(725.0), 5.0);
        assert_eq!(wrap_degrees(12.5), 12.5);
    }

    #[test]
    fn test_npix() {
        assert_eq!(nside2npix(1), 12);
        assert_eq!(nside2npix(256), 786_432);
        assert_eq!(npix2nside(786_432), Some(256));
        assert_eq!(npix2nside(13), None);
        assert_eq!(npix2nside(24), None);
    }

    #[test]
    fn test_nside1_known_pixels() {
        // North pole cap pixels 0..4, equator 4..8, south 8..12
        assert_eq!(ang2pix_ring(1, 0.01, 0.1), 0);
        assert_eq!(ang2pix_ring(1, 0.01, PI), 2);
        assert_eq!(ang2pix_ring(1, FRAC_PI_2, 0.0), 4);
        assert_eq!(ang2pix_ring(1, PI - 0.01, 0.1), 8);
    }

    #[test]
    fn test_pixel_centres_map_back_to_their_pixel() {
        for nside in [1, 2, 4, 16, 64] {
            for pix in 0..nside2npix(nside) {
                let (theta, phi) = pix2ang_ring(nside, pix);
                assert!((0.0..=PI).contains(&theta));
                assert!((0.0..TAU).contains(&phi), "phi {phi} for pix {pix}");
                assert_eq!(ang2pix_ring(nside, theta, phi), pix, "nside {nside} pix {pix}");
            }
        }
    }

    #[test]
    fn test_equal_area_counts() {
        // Uniform points on the sphere spread evenly across nside=1 pixels
        let nside = 1;
        let mut counts = vec![0usize; 12];
        let n = 120_000;
        for i in 0..n {
            let z = 1.0 - 2.0 * (i as f64 + 0.5) / n as f64;
            let phi = (i as f64 * 2.399_963_229_728_653).rem_euclid(TAU);
            counts[ang2pix_ring(nside, z.acos(), phi) as usize] += 1;
        }
        for c in counts {
            assert!((c as f64 - 10_000.0).abs() < 200.0, "count {c}");
        }
    }

    #[test]
    fn test_galactic_poles() {
        // North Galactic pole is at RA 192.859, DEC 27.128
        let (theta, _) = equatorial_to_galactic(192.859_48, 27.128_25);
        assert!(theta < 1e-4);
        // Galactic centre is at RA 266.405, DEC -28.936
        let (theta, phi) = equatorial_to_galactic(266.404_99, -28.936_17);
        assert!((theta - FRAC_PI_2).abs() < 1e-4);
        assert!(phi < 1e-4 || (TAU - phi) < 1e-4);
    }

    #[test]
    fn test_frame_roundtrip() {
        for (ra, dec) in [(0.0, 0.0), (123.4, -56.7), (359.5, 89.0), (200.0, -89.5)] {
            let (theta, phi) = equatorial_to_galactic(ra, dec);
            let (ra2, dec2) = galactic_to_equatorial(theta, phi);
            let dra = (ra2 - ra).abs().min(360.0 - (ra2 - ra).abs());
            assert!(dra < 1e-6, "ra {ra} -> {ra2}");
            assert!((dec2 - dec).abs() < 1e-6);
        }
    }
}
