//! Conditioning-data tables: delimited records of world coordinates and
//! property values, scattered onto a simulation grid as hard data.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::grid::{Coord, Dim, GridStructure};
use crate::property::Property;

/// Read a conditioning table and place its `column` values onto `grid`.
///
/// The first line names the columns; `x` and `y` are required (`z` too in
/// 3D). Records whose coordinates fall outside the grid are discarded, and
/// property fields equal to `sentinel` are treated as missing. Coordinates
/// snap to the nearest cell center; later records win on collisions.
pub fn read_cond_table(
    path: &Path,
    grid: &GridStructure,
    column: &str,
    sentinel: f32,
    delimiter: Option<char>,
) -> Result<Property> {
    let text = fs::read_to_string(path)?;
    parse_cond_table(&text, grid, column, sentinel, delimiter)
}

fn parse_cond_table(
    text: &str,
    grid: &GridStructure,
    column: &str,
    sentinel: f32,
    delimiter: Option<char>,
) -> Result<Property> {
    let mut lines = text.lines();
    let header = lines
        .next()
        .ok_or_else(|| Error::Format("empty conditioning table".into()))?;
    let names = split_fields(header, delimiter);

    let col = |name: &str| -> Result<usize> {
        names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::Format(format!("conditioning table has no '{name}' column")))
    };
    let cx = col("x")?;
    let cy = col("y")?;
    let cz = match grid.dim() {
        Dim::Two => None,
        Dim::Three => Some(col("z")?),
    };
    let cv = col(column)?;

    let mut out = Property::new(grid.clone());
    for (row, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_fields(line, delimiter);
        let field = |c: usize| -> Result<f64> {
            let f = fields.get(c).ok_or_else(|| {
                Error::Format(format!("record {} is missing column {}", row + 2, c + 1))
            })?;
            f.parse()
                .map_err(|_| Error::Format(format!("invalid field '{f}' in record {}", row + 2)))
        };
        let coord = Coord::new(
            field(cx)?,
            field(cy)?,
            match cz {
                Some(c) => field(c)?,
                None => 0.0,
            },
        );
        let value = field(cv)? as f32;
        if value == sentinel {
            continue;
        }
        let Some(si) = grid.coord_to_spatial_index(coord) else {
            continue;
        };
        out.set(si, value)?;
    }
    Ok(out)
}

fn split_fields(line: &str, delimiter: Option<char>) -> Vec<&str> {
    match delimiter {
        None => line.split_whitespace().collect(),
        Some(d) => line
            .split(d)
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::SpatialIndex;

    fn grid4() -> GridStructure {
        GridStructure::new_2d(4, 4, 1.0, 1.0, 0.0, 0.0).unwrap()
    }

    #[test]
    fn scatters_records_onto_the_grid() {
        let text = "x y facies\n0.1 0.0 1\n2.0 3.2 0\n";
        let p = parse_cond_table(text, &grid4(), "facies", -99.0, None).unwrap();
        assert_eq!(p.informed_count(), 2);
        assert_eq!(p.get(SpatialIndex::new_2d(0, 0)), Some(1.0));
        assert_eq!(p.get(SpatialIndex::new_2d(2, 3)), Some(0.0));
    }

    #[test]
    fn discards_out_of_grid_and_sentinel_records() {
        let text = "x y facies\n9.0 0.0 1\n1.0 1.0 -99\n1.0 2.0 1\n";
        let p = parse_cond_table(text, &grid4(), "facies", -99.0, None).unwrap();
        assert_eq!(p.informed_count(), 1);
        assert_eq!(p.get(SpatialIndex::new_2d(1, 2)), Some(1.0));
    }

    #[test]
    fn picks_the_requested_column_case_insensitively() {
        let text = "X Y other Facies\n1.0 1.0 5 2\n";
        let p = parse_cond_table(text, &grid4(), "facies", -99.0, None).unwrap();
        assert_eq!(p.get(SpatialIndex::new_2d(1, 1)), Some(2.0));
    }

    #[test]
    fn requires_coordinate_and_property_columns() {
        let g = grid4();
        assert!(parse_cond_table("x facies\n", &g, "facies", -99.0, None).is_err());
        assert!(parse_cond_table("x y\n", &g, "facies", -99.0, None).is_err());
        let g3 = GridStructure::new_3d(2, 2, 2, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0).unwrap();
        assert!(parse_cond_table("x y facies\n", &g3, "facies", -99.0, None).is_err());
    }

    #[test]
    fn rejects_short_or_malformed_records() {
        let g = grid4();
        assert!(parse_cond_table("x y facies\n1.0 2.0\n", &g, "facies", -99.0, None).is_err());
        assert!(parse_cond_table("x y facies\n1.0 abc 1\n", &g, "facies", -99.0, None).is_err());
    }
}
