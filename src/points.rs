//! Sparse point sets and the text formats they are read from.
//!
//! All coordinates are stored in canonical (Z, X, Y) order; readers for
//! formats that use another order reorder on the way in.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PointsError {
    #[error("File not found: {path:?}")]
    FileNotFound { path: PathBuf },

    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("{path:?} already exists")]
    AlreadyExists { path: PathBuf },

    #[error("Expected {expected} coordinates, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ordered (Z, X, Y) markers with an optional category per point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointSet {
    points: Vec<[f64; 3]>,
    categories: Option<Vec<u32>>,
}

/// Coordinate system declared by an elastix point file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointSpace {
    Index,
    Point,
}

impl PointSet {
    pub fn new(points: Vec<[f64; 3]>) -> Self {
        Self {
            points,
            categories: None,
        }
    }

    pub fn with_categories(points: Vec<[f64; 3]>, categories: Vec<u32>) -> Result<Self, PointsError> {
        if categories.len() != points.len() {
            return Err(PointsError::LengthMismatch {
                expected: points.len(),
                actual: categories.len(),
            });
        }
        Ok(Self {
            points,
            categories: Some(categories),
        })
    }

    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    pub fn categories(&self) -> Option<&[u32]> {
        self.categories.as_deref()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn push(&mut self, point: [f64; 3]) {
        self.points.push(point);
        if let Some(categories) = &mut self.categories {
            categories.push(0);
        }
    }
}

fn read_to_string(path: &Path) -> Result<String, PointsError> {
    if !path.is_file() {
        return Err(PointsError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    Ok(fs::read_to_string(path)?)
}

fn parse_numbers(line: &str, separator: Option<char>, line_no: usize) -> Result<Vec<f64>, PointsError> {
    let tokens: Vec<&str> = match separator {
        Some(sep) => line.split(sep).map(str::trim).collect(),
        None => line.split_whitespace().collect(),
    };
    tokens
        .into_iter()
        .map(|token| {
            token.parse::<f64>().map_err(|_| PointsError::Parse {
                line: line_no,
                message: format!("'{token}' is not a number"),
            })
        })
        .collect()
}

/// Load a point file, picking the reader from extension and first line.
pub fn load(path: impl AsRef<Path>) -> Result<PointSet, PointsError> {
    let path = path.as_ref();
    let contents = read_to_string(path)?;
    let first = contents.lines().next().unwrap_or("").trim().to_ascii_lowercase();
    if first == "index" || first == "point" {
        return parse_elastix_pts(&contents).map(|(points, _)| points);
    }
    if first.starts_with("landmarks1") {
        return parse_vv_landmarks(&contents);
    }
    if first.starts_with("point") && first.contains(';') {
        let records = parse_transformix_output(&contents)?;
        return Ok(transformix_points(&records, TRANSFORMIX_INDEX_FIELD));
    }
    parse_csv_points(&contents)
}

/// Read comma-separated `z,x,y[,category]` rows.
pub fn read_csv_points(path: impl AsRef<Path>) -> Result<PointSet, PointsError> {
    parse_csv_points(&read_to_string(path.as_ref())?)
}

fn parse_csv_points(contents: &str) -> Result<PointSet, PointsError> {
    let mut points = Vec::new();
    let mut categories = Vec::new();
    for (i, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let numbers = parse_numbers(line, Some(','), i + 1)?;
        match numbers.as_slice() {
            &[z, x, y] => points.push([z, x, y]),
            &[z, x, y, category] => {
                points.push([z, x, y]);
                categories.push(category as u32);
            }
            other => {
                return Err(PointsError::Parse {
                    line: i + 1,
                    message: format!("expected 3 or 4 columns, found {}", other.len()),
                });
            }
        }
    }
    if categories.is_empty() {
        return Ok(PointSet::new(points));
    }
    PointSet::with_categories(points, categories).map_err(|_| PointsError::Parse {
        line: 0,
        message: "category column present on only some rows".into(),
    })
}

/// Write comma-separated `z,x,y` rows, with the category when present.
pub fn write_csv_points(path: impl AsRef<Path>, points: &PointSet) -> Result<(), PointsError> {
    let mut out = String::new();
    for (i, [z, x, y]) in points.points().iter().enumerate() {
        let _ = match points.categories() {
            Some(categories) => writeln!(out, "{z},{x},{y},{}", categories[i]),
            None => writeln!(out, "{z},{x},{y}"),
        };
    }
    fs::write(path, out)?;
    Ok(())
}

/// Read an elastix point file: a space line, a count, then `x y z` rows.
pub fn read_elastix_pts(path: impl AsRef<Path>) -> Result<(PointSet, PointSpace), PointsError> {
    parse_elastix_pts(&read_to_string(path.as_ref())?)
}

fn parse_elastix_pts(contents: &str) -> Result<(PointSet, PointSpace), PointsError> {
    let mut lines = contents.lines();
    let space = match lines.next().map(|l| l.trim().to_ascii_lowercase()).as_deref() {
        Some("index") => PointSpace::Index,
        Some("point") => PointSpace::Point,
        other => {
            return Err(PointsError::Parse {
                line: 1,
                message: format!("expected 'index' or 'point', found {other:?}"),
            });
        }
    };
    let declared = lines
        .next()
        .and_then(|l| l.trim().parse::<usize>().ok())
        .ok_or_else(|| PointsError::Parse {
            line: 2,
            message: "missing point count".into(),
        })?;

    let mut points = Vec::with_capacity(declared);
    for (i, line) in lines.enumerate() {
        if line.trim().is_empty() {
            break;
        }
        let coords = parse_numbers(line, None, i + 3)?;
        let &[x, y, z] = coords.as_slice() else {
            return Err(PointsError::Parse {
                line: i + 3,
                message: format!("expected 3 coordinates, found {}", coords.len()),
            });
        };
        points.push([z, x, y]);
    }
    if points.len() != declared {
        log::warn!(
            "Found {} points but file says there are {declared}",
            points.len()
        );
    }
    Ok((PointSet::new(points), space))
}

/// Write an elastix point file from canonical points. Refuses to replace an
/// existing file unless `force` is set.
pub fn write_elastix_pts(
    path: impl AsRef<Path>,
    points: &PointSet,
    space: PointSpace,
    force: bool,
) -> Result<(), PointsError> {
    let path = path.as_ref();
    if path.exists() && !force {
        return Err(PointsError::AlreadyExists {
            path: path.to_path_buf(),
        });
    }
    let mut out = String::new();
    let space = match space {
        PointSpace::Index => "index",
        PointSpace::Point => "point",
    };
    let _ = writeln!(out, "{space}");
    let _ = writeln!(out, "{}", points.len());
    for [z, x, y] in points.points() {
        let _ = writeln!(out, "{x} {y} {z}");
    }
    out.push('\n');
    fs::write(path, out)?;
    Ok(())
}

/// Read a VV landmark file (`LANDMARKS1` header, six fields per row).
pub fn read_vv_landmarks(path: impl AsRef<Path>) -> Result<PointSet, PointsError> {
    parse_vv_landmarks(&read_to_string(path.as_ref())?)
}

fn parse_vv_landmarks(contents: &str) -> Result<PointSet, PointsError> {
    let mut lines = contents.lines();
    if let Some(header) = lines.next() {
        if !header.trim().to_ascii_lowercase().starts_with("landmarks1") {
            log::warn!("Unexpected first line {header:?}; is this really a VV landmark file?");
        }
    }
    let mut points = Vec::new();
    for (i, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields = parse_numbers(line, None, i + 2)?;
        if fields.len() != 6 {
            return Err(PointsError::Parse {
                line: i + 2,
                message: format!("expected 6 fields, found {}", fields.len()),
            });
        }
        points.push([fields[2], fields[0], fields[1]]);
    }
    Ok(PointSet::new(points))
}

/// Field of a transformix record holding the transformed voxel index.
pub const TRANSFORMIX_INDEX_FIELD: &str = "OutputIndexFixed";

/// One row of a transformix `outputpoints.txt`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformixPoint {
    pub index: usize,
    /// `InputIndex`, `OutputPoint`, ... each as written, in (x, y, z) order.
    pub fields: BTreeMap<String, Vec<f64>>,
}

/// Read transformix output: `Point\t<n>` followed by `; Key = [ x y z ]`
/// parts on every row.
pub fn read_transformix_output(path: impl AsRef<Path>) -> Result<Vec<TransformixPoint>, PointsError> {
    parse_transformix_output(&read_to_string(path.as_ref())?)
}

fn parse_transformix_output(contents: &str) -> Result<Vec<TransformixPoint>, PointsError> {
    let mut records = Vec::new();
    for (i, line) in contents.lines().enumerate() {
        let line_no = i + 1;
        if line.trim().is_empty() {
            continue;
        }
        let parse_error = |message: String| PointsError::Parse {
            line: line_no,
            message,
        };
        let mut parts = line.split(';').map(str::trim);
        let head = parts.next().unwrap_or_default();
        let index = head
            .split_whitespace()
            .nth(1)
            .and_then(|n| n.parse::<usize>().ok())
            .ok_or_else(|| parse_error(format!("expected 'Point <n>', found '{head}'")))?;

        let mut fields = BTreeMap::new();
        for part in parts.filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| parse_error(format!("no '=' in '{part}'")))?;
            let value = value.trim();
            let inner = value
                .strip_prefix('[')
                .and_then(|v| v.strip_suffix(']'))
                .ok_or_else(|| parse_error(format!("expected a [..] list, found '{value}'")))?;
            fields.insert(key.trim().to_string(), parse_numbers(inner, None, line_no)?);
        }
        records.push(TransformixPoint { index, fields });
    }
    Ok(records)
}

/// Canonical points from one (x, y, z) field of transformix records.
/// Records lacking the field are skipped.
pub fn transformix_points(records: &[TransformixPoint], field: &str) -> PointSet {
    let points = records
        .iter()
        .filter_map(|record| match record.fields.get(field)?.as_slice() {
            &[x, y, z] => Some([z, x, y]),
            _ => None,
        })
        .collect::<Vec<_>>();
    if points.len() != records.len() {
        log::warn!(
            "{} of {} transformix records have no usable {field}",
            records.len() - points.len(),
            records.len()
        );
    }
    PointSet::new(points)
}

/// Read line series rows `series,z,x,y`. The series number becomes the
/// point's category so each tree segment can be told apart.
pub fn read_line_series(path: impl AsRef<Path>) -> Result<PointSet, PointsError> {
    parse_line_series(&read_to_string(path.as_ref())?)
}

fn parse_line_series(contents: &str) -> Result<PointSet, PointsError> {
    let mut points = Vec::new();
    let mut series = Vec::new();
    for (i, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let numbers = parse_numbers(line, Some(','), i + 1)?;
        let &[id, z, x, y] = numbers.as_slice() else {
            return Err(PointsError::Parse {
                line: i + 1,
                message: format!("expected 4 columns, found {}", numbers.len()),
            });
        };
        if id < 0.0 || id.fract() != 0.0 {
            return Err(PointsError::Parse {
                line: i + 1,
                message: format!("bad line series number {id}"),
            });
        }
        points.push([z, x, y]);
        series.push(id as u32);
    }
    PointSet::with_categories(points, series)
}
