//! GSLIB grid file reading and writing.
//!
//! Layout: a free-form header line (the grid name is its prefix up to the
//! first `{` or `(`), the property count, one property name per line, then
//! one whitespace- or delimiter-separated numeric record per cell, `ix`
//! fastest. A caller-chosen sentinel value marks missing entries.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::grid::GridStructure;
use crate::property::Property;

/// A parsed GSLIB file: grid name plus one property per declared column.
#[derive(Debug)]
pub struct GslibGrid {
    pub name: String,
    pub columns: Vec<String>,
    pub properties: Vec<Property>,
}

/// Read a GSLIB file onto `grid`.
///
/// `delimiter` of `None` splits records on any whitespace. Fields equal to
/// `sentinel` become missing values.
pub fn read_gslib(
    path: &Path,
    grid: &GridStructure,
    sentinel: f32,
    delimiter: Option<char>,
) -> Result<GslibGrid> {
    let text = fs::read_to_string(path)?;
    parse_gslib(&text, grid, sentinel, delimiter)
}

fn parse_gslib(
    text: &str,
    grid: &GridStructure,
    sentinel: f32,
    delimiter: Option<char>,
) -> Result<GslibGrid> {
    let mut lines = text.lines();

    let header = lines
        .next()
        .ok_or_else(|| Error::Format("empty GSLIB file".into()))?;
    let name = header
        .split(['{', '('])
        .next()
        .unwrap_or(header)
        .trim()
        .to_string();

    let count_line = lines
        .next()
        .ok_or_else(|| Error::Format("missing property count line".into()))?;
    let n_props: usize = count_line
        .trim()
        .parse()
        .map_err(|_| Error::Format(format!("invalid property count '{}'", count_line.trim())))?;
    if n_props == 0 {
        return Err(Error::Format("GSLIB file declares zero properties".into()));
    }

    let mut columns = Vec::with_capacity(n_props);
    for _ in 0..n_props {
        let line = lines
            .next()
            .ok_or_else(|| Error::Format("missing property name line".into()))?;
        columns.push(line.trim().to_string());
    }

    let mut properties: Vec<Property> = (0..n_props)
        .map(|_| Property::new(grid.clone()))
        .collect();
    let n_cells = grid.cell_count();
    let mut cell = 0usize;
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        if cell >= n_cells {
            return Err(Error::Format(format!(
                "more records than the {n_cells} grid cells"
            )));
        }
        let fields = split_fields(line, delimiter);
        if fields.len() < n_props {
            return Err(Error::Format(format!(
                "record {} has {} fields, fewer than the {} declared properties",
                cell + 1,
                fields.len(),
                n_props
            )));
        }
        for (p, field) in fields.iter().take(n_props).enumerate() {
            let v: f32 = field
                .parse()
                .map_err(|_| Error::Format(format!("invalid field '{field}' in record {}", cell + 1)))?;
            if v != sentinel {
                properties[p].set_at(cell, v)?;
            }
        }
        cell += 1;
    }
    if cell != n_cells {
        return Err(Error::Format(format!(
            "found {cell} records for a grid of {n_cells} cells"
        )));
    }

    Ok(GslibGrid {
        name,
        columns,
        properties,
    })
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

/// Write properties as a GSLIB file, one column per property.
///
/// Missing entries are written as `sentinel`. The whole file is rendered
/// before anything touches the filesystem, so a failed run never leaves a
/// partial output file behind.
pub fn write_gslib(
    path: &Path,
    name: &str,
    columns: &[(&str, &Property)],
    sentinel: f32,
) -> Result<()> {
    if columns.is_empty() {
        return Err(Error::Precondition("nothing to write".into()));
    }
    let n_cells = columns[0].1.len();
    for &(_, prop) in columns {
        if prop.len() != n_cells {
            return Err(Error::Precondition(
                "all written properties must share one grid".into(),
            ));
        }
    }

    let mut out = String::new();
    out.push_str(name);
    out.push('\n');
    out.push_str(&columns.len().to_string());
    out.push('\n');
    for &(col, _) in columns {
        out.push_str(col);
        out.push('\n');
    }
    for cell in 0..n_cells {
        for (p, &(_, prop)) in columns.iter().enumerate() {
            if p > 0 {
                out.push(' ');
            }
            let v = prop.get_at(cell).unwrap_or(sentinel);
            out.push_str(&v.to_string());
        }
        out.push('\n');
    }
    fs::write(path, out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::SpatialIndex;

    fn grid2x2() -> GridStructure {
        GridStructure::new_2d(2, 2, 1.0, 1.0, 0.0, 0.0).unwrap()
    }

    #[test]
    fn parses_name_count_and_records() {
        let text = "channels (100x100) training\n2\nfacies\nporosity\n\
                    1 0.3\n0 0.1\n-99 0.2\n1 -99\n";
        let g = parse_gslib(text, &grid2x2(), -99.0, None).unwrap();
        assert_eq!(g.name, "channels");
        assert_eq!(g.columns, vec!["facies", "porosity"]);
        assert_eq!(g.properties.len(), 2);
        assert_eq!(g.properties[0].get_at(0), Some(1.0));
        assert_eq!(g.properties[0].get_at(2), None);
        assert_eq!(g.properties[1].get_at(3), None);
        assert_eq!(g.properties[0].missing_count(), 1);
    }

    #[test]
    fn name_stops_at_brace_too() {
        let text = "mygrid {16x16}\n1\nv\n1\n1\n1\n1\n";
        let g = parse_gslib(text, &grid2x2(), -99.0, None).unwrap();
        assert_eq!(g.name, "mygrid");
    }

    #[test]
    fn semicolon_delimited_records() {
        let text = "g\n1\nv\n1\n2; \n3\n4\n";
        let g = parse_gslib(text, &grid2x2(), -99.0, Some(';')).unwrap();
        assert_eq!(g.properties[0].get_at(1), Some(2.0));
        assert_eq!(g.properties[0].get_at(3), Some(4.0));
    }

    #[test]
    fn rejects_malformed_input() {
        let g = grid2x2();
        assert!(matches!(
            parse_gslib("", &g, -99.0, None),
            Err(Error::Format(_))
        ));
        assert!(matches!(
            parse_gslib("name\nnot-a-number\n", &g, -99.0, None),
            Err(Error::Format(_))
        ));
        // Fewer fields than declared properties.
        assert!(matches!(
            parse_gslib("name\n2\na\nb\n1\n", &g, -99.0, None),
            Err(Error::Format(_))
        ));
        // Record count must match the grid.
        assert!(matches!(
            parse_gslib("name\n1\na\n1\n2\n3\n", &g, -99.0, None),
            Err(Error::Format(_))
        ));
        assert!(matches!(
            parse_gslib("name\n1\na\n1\n2\n3\n4\n5\n", &g, -99.0, None),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn round_trips_through_a_file() {
        let grid = grid2x2();
        let mut p = Property::new(grid.clone());
        p.set(SpatialIndex::new_2d(0, 0), 1.0).unwrap();
        p.set(SpatialIndex::new_2d(1, 0), 0.0).unwrap();
        p.set(SpatialIndex::new_2d(0, 1), 2.0).unwrap();
        p.set(SpatialIndex::new_2d(1, 1), 1.0).unwrap();

        let dir = std::env::temp_dir().join("snesim-gslib-roundtrip");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("out.gslib");
        write_gslib(&path, "sim", &[("facies", &p)], -99.0).unwrap();
        let back = read_gslib(&path, &grid, -99.0, None).unwrap();
        assert_eq!(back.name, "sim");
        assert_eq!(back.properties[0], p);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_cells_round_trip_through_the_sentinel() {
        let grid = grid2x2();
        let mut p = Property::new(grid.clone());
        p.set(SpatialIndex::new_2d(1, 1), 3.0).unwrap();

        let dir = std::env::temp_dir().join("snesim-gslib-missing");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("out.gslib");
        write_gslib(&path, "sim", &[("facies", &p)], -99.0).unwrap();
        let back = read_gslib(&path, &grid, -99.0, None).unwrap();
        assert_eq!(back.properties[0].missing_count(), 3);
        assert_eq!(back.properties[0], p);
        fs::remove_file(&path).unwrap();
    }
}
