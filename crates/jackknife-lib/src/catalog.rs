//! Whitespace-separated catalog tables
//!
//! Catalogs are plain numeric text tables with `#` comments, one object per row. The
//! partitioning code only needs RA, DEC and weight, selected with a [`ColumnLayout`]; the
//! full row is kept as the point payload so that labeled output reproduces it verbatim with
//! the region label appended as a last column.

use crate::{DataError, Label, Result, WeightedPoint};
use std::io::{BufRead, Write};
use std::path::Path;

/// Header of labeled catalogs (RA, DEC, redshift, weight + label)
pub const LABELED_HEADER: &str = "RA   DEC   redshift   weight   jackknife";

/// Label value written for points that fell outside every region
pub const LOST_LABEL: i64 = -1;

const FIELD_SEPARATOR: &str = "   ";

/// Which columns of a catalog hold the position and weight (0-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColumnLayout {
    pub ra: usize,
    pub dec: usize,
    /// Weight column; `None` gives every point unit weight
    pub weight: Option<usize>,
}

impl Default for ColumnLayout {
    /// RA, DEC, redshift, weight
    fn default() -> Self {
        Self {
            ra: 0,
            dec: 1,
            weight: Some(3),
        }
    }
}

impl ColumnLayout {
    fn min_columns(&self) -> usize {
        self.ra.max(self.dec).max(self.weight.unwrap_or(0)) + 1
    }
}

/// Format a float like C's `%.{precision}e`, optionally with the `' '` sign flag
///
/// Rust prints exponents as `e2`; numpy tables use `e+02`.
pub(crate) fn format_scientific(value: f64, precision: usize, space_sign: bool) -> String {
    if !value.is_finite() {
        return if value.is_nan() {
            "nan".to_string()
        } else if value > 0.0 {
            "inf".to_string()
        } else {
            "-inf".to_string()
        };
    }
    let raw = format!("{:.*e}", precision, value);
    let (mantissa, exponent) = raw.split_once('e').unwrap_or((raw.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let exp_sign = if exponent < 0 { '-' } else { '+' };
    let lead = if space_sign && !mantissa.starts_with('-') {
        " "
    } else {
        ""
    };
    format!("{lead}{mantissa}e{exp_sign}{:02}", exponent.abs())
}

fn parse_row(line: &str, line_no: usize) -> Result<Vec<f64>> {
    line.split_whitespace()
        .map(|f| {
            f.parse::<f64>().map_err(|_| DataError::MalformedCatalog {
                line: line_no,
                reason: format!("non-numeric field {f:?}"),
            })
        })
        .collect()
}

/// Iterate the numeric rows of a table, skipping comments and blank lines
fn rows<R: BufRead>(reader: R) -> impl Iterator<Item = Result<(usize, Vec<f64>)>> {
    reader.lines().enumerate().filter_map(|(i, line)| {
        let line_no = i + 1;
        match line {
            Err(e) => Some(Err(e.into())),
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    None
                } else {
                    Some(parse_row(trimmed, line_no).map(|row| (line_no, row)))
                }
            }
        }
    })
}

fn point_from_row(row: Vec<f64>, layout: &ColumnLayout, line_no: usize) -> Result<WeightedPoint> {
    if row.len() < layout.min_columns() {
        return Err(DataError::MalformedCatalog {
            line: line_no,
            reason: format!(
                "expected at least {} columns, found {}",
                layout.min_columns(),
                row.len()
            ),
        });
    }
    // Catalogs occasionally carry RA = 360 or small negative RA values
    let ra = crate::healpix::wrap_degrees(row[layout.ra]);
    let dec = row[layout.dec];
    let weight = layout.weight.map_or(1.0, |c| row[c]);
    WeightedPoint::with_payload(ra, dec, weight, row).map_err(|e| DataError::MalformedCatalog {
        line: line_no,
        reason: e.to_string(),
    })
}

/// Read a catalog into weighted points
pub fn read_points<R: BufRead>(reader: R, layout: &ColumnLayout) -> Result<Vec<WeightedPoint>> {
    rows(reader)
        .map(|row| {
            let (line_no, row) = row?;
            point_from_row(row, layout, line_no)
        })
        .collect()
}

/// Read a labeled catalog: the last column is the region label, `-1` meaning lost
pub fn read_labeled<R: BufRead>(
    reader: R,
    layout: &ColumnLayout,
) -> Result<(Vec<WeightedPoint>, Vec<Label>)> {
    let mut points = Vec::new();
    let mut labels = Vec::new();

    for row in rows(reader) {
        let (line_no, mut row) = row?;
        let label = row.pop().ok_or(DataError::MalformedCatalog {
            line: line_no,
            reason: "missing label column".to_string(),
        })?;
        if label.fract() != 0.0 || label < LOST_LABEL as f64 {
            return Err(DataError::MalformedCatalog {
                line: line_no,
                reason: format!("invalid region label {label}"),
            });
        }
        let region = (label >= 0.0).then_some(label as usize);
        labels.push(Label {
            index: points.len(),
            region,
        });
        points.push(point_from_row(row, layout, line_no)?);
    }

    Ok((points, labels))
}

/// Write labeled points, one row per label
///
/// Each row is the point payload (or `RA DEC weight` for points built without one) in
/// `% .15e` followed by the label in `%8d`; lost points are written as `-1`.
pub fn write_labeled<W: Write>(
    mut writer: W,
    points: &[WeightedPoint],
    labels: &[Label],
) -> Result<()> {
    writeln!(writer, "# {}", LABELED_HEADER)?;
    for label in labels {
        let point = &points[label.index];
        let fields: Vec<String> = if point.payload().is_empty() {
            [point.ra(), point.dec(), point.weight()]
                .iter()
                .map(|&v| format_scientific(v, 15, true))
                .collect()
        } else {
            point
                .payload()
                .iter()
                .map(|&v| format_scientific(v, 15, true))
                .collect()
        };
        let value = label.region.map_or(LOST_LABEL, |r| r as i64);
        writeln!(
            writer,
            "{}{}{:8}",
            fields.join(FIELD_SEPARATOR),
            FIELD_SEPARATOR,
            value
        )?;
    }
    writer.flush()?;
    Ok(())
}

pub fn load_points<P: AsRef<Path>>(path: P, layout: &ColumnLayout) -> Result<Vec<WeightedPoint>> {
    tracing::info!("Loading data: {}", path.as_ref().display());
    let file = std::fs::File::open(path.as_ref())?;
    read_points(std::io::BufReader::new(file), layout)
}

pub fn load_labeled<P: AsRef<Path>>(
    path: P,
    layout: &ColumnLayout,
) -> Result<(Vec<WeightedPoint>, Vec<Label>)> {
    tracing::info!("Loading labeled data: {}", path.as_ref().display());
    let file = std::fs::File::open(path.as_ref())?;
    read_labeled(std::io::BufReader::new(file), layout)
}

pub fn save_labeled<P: AsRef<Path>>(
    path: P,
    points: &[WeightedPoint],
    labels: &[Label],
) -> Result<()> {
    let file = std::fs::File::create(path.as_ref())?;
    write_labeled(std::io::BufWriter::new(file), points, labels)?;
    tracing::info!("Data written to file: {}", path.as_ref().display());
    Ok(())
}
