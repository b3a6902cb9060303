//! RA×DEC bounding boxes of jackknife regions and their text table format
//!
//! A box is the extent of the points assigned to a region, not the exact cut line, so boxes
//! of neighbouring regions may overlap slightly or leave gaps. RA wraparound is encoded by
//! `ra_min > ra_max`, in which case the RA test is an OR instead of an AND.

use crate::catalog::format_scientific;
use crate::{DataError, Result, WeightedPoint};
use std::io::{BufRead, Write};
use std::path::Path;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const COUNT_HEADER: &str = "Number of jackknife regions:";
const COLUMN_HEADER: &str = "RA_min   RA_max   DEC_min   DEC_max";

/// Rotate an RA value by `offset` degrees, wrapping into `[0, 360)`
#[inline]
pub(crate) fn rotate_ra(ra: f64, offset: f64) -> f64 {
    if offset == 0.0 {
        ra
    } else {
        crate::healpix::wrap_degrees(ra + offset)
    }
}

/// Rectangular RA×DEC extent of a region, in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BoundingBox {
    pub ra_min: f64,
    pub ra_max: f64,
    pub dec_min: f64,
    pub dec_max: f64,
}

impl BoundingBox {
    pub fn new(ra_min: f64, ra_max: f64, dec_min: f64, dec_max: f64) -> Self {
        Self {
            ra_min,
            ra_max,
            dec_min,
            dec_max,
        }
    }

    /// Build the box of a region from its member points
    ///
    /// DEC limits are the plain extremes. RA limits are the *original* RA of the members with
    /// the smallest and largest *rotated* RA, so a region cut across the seam of the rotated
    /// frame comes out with `ra_min > ra_max`. Returns `None` for an empty member list.
    pub fn from_members(
        points: &[WeightedPoint],
        members: &[usize],
        ra_rotation: f64,
    ) -> Option<Self> {
        let (&first, rest) = members.split_first()?;
        let first_rot = rotate_ra(points[first].ra(), ra_rotation);

        let mut min_rot = (first_rot, first);
        let mut max_rot = (first_rot, first);
        let mut dec_min = points[first].dec();
        let mut dec_max = dec_min;

        for &idx in rest {
            let p = &points[idx];
            let rot = rotate_ra(p.ra(), ra_rotation);
            // Strict comparisons keep the first member on ties
            if rot < min_rot.0 {
                min_rot = (rot, idx);
            }
            if rot > max_rot.0 {
                max_rot = (rot, idx);
            }
            dec_min = dec_min.min(p.dec());
            dec_max = dec_max.max(p.dec());
        }

        Some(Self {
            ra_min: points[min_rot.1].ra(),
            ra_max: points[max_rot.1].ra(),
            dec_min,
            dec_max,
        })
    }

    /// Whether the box crosses RA = 0/360
    #[inline]
    pub fn wraps(&self) -> bool {
        self.ra_min > self.ra_max
    }

    /// Closed-interval containment test with wraparound handling
    #[inline]
    pub fn contains(&self, ra: f64, dec: f64) -> bool {
        if dec < self.dec_min || dec > self.dec_max {
            return false;
        }
        if self.wraps() {
            ra >= self.ra_min || ra <= self.ra_max
        } else {
            ra >= self.ra_min && ra <= self.ra_max
        }
    }
}

/// Ordered list of region boxes (index = 0-based region id)
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BoundsTable {
    boxes: Vec<BoundingBox>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl BoundsTable {
    pub fn new(boxes: Vec<BoundingBox>) -> Self {
        Self { boxes }
    }

    #[inline]
    pub fn boxes(&self) -> &[BoundingBox] {
        &self.boxes
    }

    #[inline]
    pub fn get(&self, region: usize) -> Option<&BoundingBox> {
        self.boxes.get(region)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// First region (in id order) whose box contains the position
    ///
    /// Boxes are not guaranteed disjoint; the lowest id wins.
    pub fn find(&self, ra: f64, dec: f64) -> Option<usize> {
        self.boxes.iter().position(|b| b.contains(ra, dec))
    }

    /// Concatenate several tables in order
    pub fn concat<I: IntoIterator<Item = BoundsTable>>(tables: I) -> Self {
        Self {
            boxes: tables.into_iter().flat_map(|t| t.boxes).collect(),
        }
    }

    /// Write the table: two `#` header lines, then one `%.18e` row per region
    pub fn write<W: Write>(&self, mut writer: W) -> Result<()> {
        writeln!(writer, "# {} {}", COUNT_HEADER, self.boxes.len())?;
        writeln!(writer, "# {}", COLUMN_HEADER)?;
        for b in &self.boxes {
            writeln!(
                writer,
                "{} {} {} {}",
                format_scientific(b.ra_min, 18, false),
                format_scientific(b.ra_max, 18, false),
                format_scientific(b.dec_min, 18, false),
                format_scientific(b.dec_max, 18, false),
            )?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Read a table written by [`BoundsTable::write`] (or any whitespace table with 4 columns)
    ///
    /// If a region-count header is present, the number of rows must match it.
    pub fn read<R: BufRead>(reader: R) -> Result<Self> {
        let mut declared: Option<(usize, usize)> = None;
        let mut boxes = Vec::new();

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line_no = i + 1;
            let trimmed = line.trim();

            if let Some(comment) = trimmed.strip_prefix('#') {
                if let Some(count) = comment.trim().strip_prefix(COUNT_HEADER) {
                    let count = count.trim().parse::<usize>().map_err(|_| {
                        DataError::MalformedBoundsFile {
                            line: line_no,
                            reason: format!("invalid region count {:?}", count.trim()),
                        }
                    })?;
                    declared = Some((count, line_no));
                }
                continue;
            }
            if trimmed.is_empty() {
                continue;
            }

            let fields = trimmed
                .split_whitespace()
                .take(4)
                .map(|f| {
                    f.parse::<f64>().map_err(|_| DataError::MalformedBoundsFile {
                        line: line_no,
                        reason: format!("non-numeric field {f:?}"),
                    })
                })
                .collect::<Result<Vec<f64>>>()?;
            if fields.len() < 4 {
                return Err(DataError::MalformedBoundsFile {
                    line: line_no,
                    reason: format!("expected 4 fields, found {}", fields.len()),
                });
            }
            boxes.push(BoundingBox::new(fields[0], fields[1], fields[2], fields[3]));
        }

        if let Some((count, line)) = declared {
            if count != boxes.len() {
                return Err(DataError::MalformedBoundsFile {
                    line,
                    reason: format!("header declares {count} regions, found {} rows", boxes.len()),
                });
            }
        }

        Ok(Self { boxes })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path.as_ref())?;
        self.write(std::io::BufWriter::new(file))?;
        tracing::info!(
            "Jackknife bounds saved to file: {}",
            path.as_ref().display()
        );
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        tracing::info!("Loading bounds file: {}", path.as_ref().display());
        let file = std::fs::File::open(path.as_ref())?;
        Self::read(std::io::BufReader::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(ra: f64, dec: f64) -> WeightedPoint {
        WeightedPoint::new(ra, dec, 1.0).unwrap()
    }

    #[test]
    fn test_wraparound_contains() {
        let b = BoundingBox::new(350.0, 10.0, -5.0, 5.0);
        assert!(b.wraps());
        assert!(b.contains(355.0, 0.0));
        assert!(b.contains(5.0, 0.0));
        assert!(!b.contains(180.0, 0.0));
        assert!(!b.contains(355.0, 6.0));
    }

    #[test]
    fn test_plain_contains_is_closed() {
        let b = BoundingBox::new(10.0, 20.0, -5.0, 5.0);
        assert!(!b.wraps());
        assert!(b.contains(10.0, -5.0));
        assert!(b.contains(20.0, 5.0));
        assert!(!b.contains(20.000001, 0.0));
    }

    #[test]
    fn test_degenerate_ra_is_not_wraparound() {
        let b = BoundingBox::new(42.0, 42.0, 0.0, 1.0);
        assert!(b.contains(42.0, 0.5));
        assert!(!b.contains(43.0, 0.5));
    }

    #[test]
    fn test_rotate_ra_stays_below_360() {
        assert_eq!(rotate_ra(10.0, 0.0), 10.0);
        assert_eq!(rotate_ra(350.0, 20.0), 10.0);
        assert_eq!(rotate_ra(10.0, -10.0 - 1e-14), 0.0);
        assert!(rotate_ra(1e-20, -1e-20 * 2.0) < 360.0);
    }

    #[test]
    fn test_from_members_without_rotation() {
        let points = vec![pt(10.0, 1.0), pt(30.0, -2.0), pt(20.0, 4.0), pt(99.0, 0.0)];
        let b = BoundingBox::from_members(&points, &[0, 1, 2], 0.0).unwrap();
        assert_eq!(b, BoundingBox::new(10.0, 30.0, -2.0, 4.0));
    }

    #[test]
    fn test_from_members_with_rotation_wraps() {
        // Rotated by 20: 350 -> 10, 355 -> 15, 5 -> 25
        let points = vec![pt(5.0, 0.0), pt(350.0, 1.0), pt(355.0, -1.0)];
        let b = BoundingBox::from_members(&points, &[0, 1, 2], 20.0).unwrap();
        assert_eq!(b.ra_min, 350.0);
        assert_eq!(b.ra_max, 5.0);
        assert!(b.wraps());
        assert!(b.contains(0.0, 0.0));
    }

    #[test]
    fn test_from_members_empty() {
        assert!(BoundingBox::from_members(&[], &[], 0.0).is_none());
    }

    #[test]
    fn test_find_first_match_wins() {
        let table = BoundsTable::new(vec![
            BoundingBox::new(0.0, 10.0, 0.0, 10.0),
            BoundingBox::new(5.0, 15.0, 0.0, 10.0),
        ]);
        assert_eq!(table.find(7.0, 5.0), Some(0));
        assert_eq!(table.find(12.0, 5.0), Some(1));
        assert_eq!(table.find(50.0, 5.0), None);
    }

    #[test]
    fn test_write_format() {
        let table = BoundsTable::new(vec![BoundingBox::new(350.0, 10.0, -5.0, 0.125)]);
        let mut buf = Vec::new();
        table.write(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "# Number of jackknife regions: 1");
        assert_eq!(lines[1], "# RA_min   RA_max   DEC_min   DEC_max");
        assert_eq!(
            lines[2],
            "3.500000000000000000e+02 1.000000000000000000e+01 -5.000000000000000000e+00 1.250000000000000000e-01"
        );
    }

    #[test]
    fn test_write_read_is_exact() {
        let table = BoundsTable::new(vec![
            BoundingBox::new(0.1, 1.0 / 3.0, -89.999999, 12.345678901234567),
            BoundingBox::new(359.9999999, 0.0000001, -0.0, 2.0f64.sqrt()),
        ]);
        let mut buf = Vec::new();
        table.write(&mut buf).unwrap();
        let back = BoundsTable::read(buf.as_slice()).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn test_read_rejects_count_mismatch() {
        let text = "# Number of jackknife regions: 2\n# RA_min RA_max DEC_min DEC_max\n1 2 3 4\n";
        assert!(matches!(
            BoundsTable::read(text.as_bytes()),
            Err(DataError::MalformedBoundsFile { line: 1, .. })
        ));
    }

    #[test]
    fn test_read_rejects_short_row() {
        let text = "1 2 3 4\n5 6 7\n";
        assert!(matches!(
            BoundsTable::read(text.as_bytes()),
            Err(DataError::MalformedBoundsFile { line: 2, .. })
        ));
    }

    #[test]
    fn test_read_rejects_non_numeric() {
        let text = "1 2 x 4\n";
        assert!(matches!(
            BoundsTable::read(text.as_bytes()),
            Err(DataError::MalformedBoundsFile { line: 1, .. })
        ));
    }

    #[test]
    fn test_read_without_header() {
        let text = "\n1 2 3 4\n  5 6 7 8 9\n";
        let table = BoundsTable::read(text.as_bytes()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1), Some(&BoundingBox::new(5.0, 6.0, 7.0, 8.0)));
    }

    #[test]
    fn test_concat() {
        let a = BoundsTable::new(vec![BoundingBox::new(0.0, 1.0, 0.0, 1.0)]);
        let b = BoundsTable::new(vec![
            BoundingBox::new(1.0, 2.0, 0.0, 1.0),
            BoundingBox::new(2.0, 3.0, 0.0, 1.0),
        ]);
        let all = BoundsTable::concat([a, b]);
        assert_eq!(all.len(), 3);
        assert_eq!(all.boxes()[2].ra_min, 2.0);
    }
}
