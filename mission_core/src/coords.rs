//! # Coordinate Loader
//!
//! Loads planned hole positions from a tabular (CSV) source of ENU offsets and infers
//! headings where none is given, grounded on
//! `amiga_platform/navigation/coordinate_transforms.py`'s `load_waypoints_from_csv` and
//! `_infer_yaw_from_path`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use crate::pose::{enu_to_nwu, Pose};
use nalgebra::UnitQuaternion;
use csv::ReaderBuilder;
use nalgebra::Vector3;
use std::collections::BTreeMap;
use std::io::Read;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CoordsError {
    #[error("could not read waypoint table: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse waypoint table: {0}")]
    Csv(#[from] csv::Error),

    #[error("waypoint table is missing required column {0:?}")]
    MissingColumn(&'static str),

    #[error("waypoint table is empty")]
    EmptyTable,

    #[error("could not parse numeric value {value:?} in column {column:?}: {source}")]
    BadNumber {
        column: &'static str,
        value: String,
        source: std::num::ParseFloatError,
    },
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Load hole poses from a CSV `dx`/`dy` (and optional `yaw_deg`) table, keyed by
/// 0-based row index. Headers are matched case-insensitively and trimmed.
///
/// `last_row_index` is the 0-based index of the last waypoint of the first row, used
/// only to pick a backward-difference heading at that one waypoint when `yaw_deg` is
/// absent (the approach heading into the row end).
pub fn load_waypoints_csv<R: Read>(
    reader: R,
    last_row_index: usize,
) -> Result<BTreeMap<usize, Pose>, CoordsError> {
    let mut rdr = ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let dx_col = headers
        .iter()
        .position(|h| h == "dx")
        .ok_or(CoordsError::MissingColumn("dx"))?;
    let dy_col = headers
        .iter()
        .position(|h| h == "dy")
        .ok_or(CoordsError::MissingColumn("dy"))?;
    let yaw_col = headers.iter().position(|h| h == "yaw_deg");

    let mut north = Vec::new();
    let mut west = Vec::new();
    let mut yaw_deg: Vec<Option<f64>> = Vec::new();

    for record in rdr.records() {
        let record = record?;

        let dx = parse_field(&record, dx_col, "dx")?;
        let dy = parse_field(&record, dy_col, "dy")?;

        let nwu = enu_to_nwu(Vector3::new(dx, dy, 0.0));
        north.push(nwu.x);
        west.push(nwu.y);

        yaw_deg.push(match yaw_col {
            Some(col) => Some(parse_field(&record, col, "yaw_deg")?),
            None => None,
        });
    }

    if north.is_empty() {
        return Err(CoordsError::EmptyTable);
    }

    let yaw_rad = resolve_headings(&north, &west, &yaw_deg, last_row_index);

    let mut poses = BTreeMap::new();
    for (i, ((n, w), th)) in north.iter().zip(west.iter()).zip(yaw_rad.iter()).enumerate() {
        poses.insert(
            i,
            Pose::new(
                Vector3::new(*n, *w, 0.0),
                UnitQuaternion::from_euler_angles(0.0, 0.0, *th),
                "world",
                "hole",
            ),
        );
    }

    Ok(poses)
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn parse_field(record: &csv::StringRecord, col: usize, name: &'static str) -> Result<f64, CoordsError> {
    let value = record.get(col).unwrap_or("");
    value
        .parse::<f64>()
        .map_err(|source| CoordsError::BadNumber {
            column: name,
            value: value.to_string(),
            source,
        })
}

/// Compute per-waypoint heading in radians: explicit `yaw_deg` where given, otherwise
/// forward difference to the next point, backward difference for the last point, and
/// backward difference (approach heading) at `last_row_index`.
fn resolve_headings(
    north: &[f64],
    west: &[f64],
    yaw_deg: &[Option<f64>],
    last_row_index: usize,
) -> Vec<f64> {
    let n = north.len();
    let mut yaw = vec![0.0; n];

    for i in 0..n {
        if let Some(deg) = yaw_deg[i] {
            yaw[i] = deg.to_radians();
        }
    }

    if yaw_deg.iter().all(Option::is_some) {
        return yaw;
    }

    if n > 1 {
        for i in 0..n - 1 {
            if yaw_deg[i].is_none() {
                yaw[i] = (west[i + 1] - west[i]).atan2(north[i + 1] - north[i]);
            }
        }

        if yaw_deg[n - 1].is_none() {
            yaw[n - 1] = (west[n - 1] - west[n - 2]).atan2(north[n - 1] - north[n - 2]);
        }

        if last_row_index > 0 && last_row_index < n && yaw_deg[last_row_index].is_none() {
            yaw[last_row_index] =
                (west[last_row_index] - west[last_row_index - 1])
                    .atan2(north[last_row_index] - north[last_row_index - 1]);
        }
    }

    yaw
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn loads_minimal_table_with_inferred_heading() {
        let csv = "dx,dy\n0,0\n0,1\n0,2\n";
        let poses = load_waypoints_csv(csv.as_bytes(), 0).unwrap();

        assert_eq!(poses.len(), 3);
        assert!(poses.contains_key(&0));
        assert!(poses.contains_key(&2));
    }

    #[test]
    fn case_insensitive_and_trimmed_headers() {
        let csv = " DX , DY \n1,2\n3,4\n";
        let poses = load_waypoints_csv(csv.as_bytes(), 0).unwrap();
        assert_eq!(poses.len(), 2);
    }

    #[test]
    fn explicit_yaw_deg_is_used_directly() {
        let csv = "dx,dy,yaw_deg\n0,0,90\n1,1,0\n";
        let poses = load_waypoints_csv(csv.as_bytes(), 0).unwrap();
        let p0 = poses.get(&0).unwrap();
        assert!((p0.heading() - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn missing_column_is_bad_input() {
        let csv = "dx\n0\n1\n";
        let err = load_waypoints_csv(csv.as_bytes(), 0).unwrap_err();
        assert!(matches!(err, CoordsError::MissingColumn("dy")));
    }

    #[test]
    fn empty_table_is_bad_input() {
        let csv = "dx,dy\n";
        let err = load_waypoints_csv(csv.as_bytes(), 0).unwrap_err();
        assert!(matches!(err, CoordsError::EmptyTable));
    }
}
