//! Input/output functionality around external docking runs

use nalgebra::Vector3;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

use crate::screen::ScreenResult;

/// Errors that can occur during file I/O operations
#[derive(Error, Debug)]
pub enum IoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
}

/// Read a newline-delimited list of SMILES strings, skipping blank lines
pub fn read_smiles<P: AsRef<Path>>(path: P) -> Result<Vec<String>, IoError> {
    let reader = BufReader::new(File::open(path.as_ref())?);

    let mut smis = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let smi = line.trim();
        if !smi.is_empty() {
            smis.push(smi.to_string());
        }
    }

    Ok(smis)
}

/// Parse atom coordinates from a PDB or PDBQT file
pub fn parse_coordinates<P: AsRef<Path>>(path: P) -> Result<Vec<Vector3<f64>>, IoError> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if extension != "pdb" && extension != "pdbqt" {
        return Err(IoError::UnsupportedFormat(path.display().to_string()));
    }

    let reader = BufReader::new(File::open(path)?);
    let mut coordinates = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_number = idx + 1;

        if line.starts_with("ENDMDL") {
            // Only the first model is used
            break;
        }
        if !(line.starts_with("ATOM") || line.starts_with("HETATM")) {
            continue;
        }
        if line.len() < 54 {
            return Err(IoError::Parse {
                line: line_number,
                message: format!("Line too short for atom record: {}", line),
            });
        }

        let coordinate = |range: std::ops::Range<usize>, axis: &str| {
            let field = line.get(range).ok_or_else(|| IoError::Parse {
                line: line_number,
                message: format!("Malformed {} coordinate column: {}", axis, line),
            })?;
            field.trim().parse::<f64>().map_err(|_| IoError::Parse {
                line: line_number,
                message: format!("Invalid {} coordinate: {}", axis, field),
            })
        };

        coordinates.push(Vector3::new(
            coordinate(30..38, "x")?,
            coordinate(38..46, "y")?,
            coordinate(46..54, "z")?,
        ));
    }

    if coordinates.is_empty() {
        return Err(IoError::InvalidFormat(format!(
            "no atom records in {}",
            path.display()
        )));
    }

    Ok(coordinates)
}

/// Compute a docking box around a set of coordinates.
///
/// The center is the midpoint of the bounding box and each side is the
/// extent of the coordinates along that axis plus `buffer`.
pub fn autobox(coordinates: &[Vector3<f64>], buffer: f64) -> Option<(Vector3<f64>, Vector3<f64>)> {
    let first = coordinates.first()?;
    let mut min = *first;
    let mut max = *first;

    for c in coordinates {
        min = min.inf(c);
        max = max.sup(c);
    }

    let center = (min + max) / 2.0;
    let size = (max - min).add_scalar(buffer);

    Some((center, size))
}

/// Parse the pose scores from a docking output file.
///
/// Vina, QVina and PSOVina write `REMARK VINA RESULT:` lines; smina writes
/// `REMARK minimizedAffinity`. Scores are returned in file order.
pub fn parse_pose_scores<P: AsRef<Path>>(path: P) -> Result<Vec<f64>, IoError> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    let mut scores = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let value = if let Some(rest) = line.strip_prefix("REMARK VINA RESULT:") {
            rest.split_whitespace().next()
        } else if let Some(rest) = line.strip_prefix("REMARK minimizedAffinity") {
            rest.split_whitespace().next()
        } else {
            continue;
        };

        let value = value.ok_or_else(|| IoError::Parse {
            line: idx + 1,
            message: format!("Missing score: {}", line),
        })?;
        let score = value.parse::<f64>().map_err(|_| IoError::Parse {
            line: idx + 1,
            message: format!("Invalid score: {}", value),
        })?;
        scores.push(score);
    }

    Ok(scores)
}

/// Write result records as a flat CSV file.
///
/// The header is always written, so an empty result list produces a
/// header-only file.
pub fn write_extended_csv<P: AsRef<Path>>(results: &[ScreenResult], path: P) -> Result<(), IoError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path.as_ref())?;

    writer.write_record(ScreenResult::FIELDS)?;
    for result in results {
        writer.serialize(result)?;
    }
    writer.flush()?;

    Ok(())
}

/// Recursively copy the contents of `src` into `dst`
pub fn copy_tree<P: AsRef<Path>, Q: AsRef<Path>>(src: P, dst: Q) -> Result<(), IoError> {
    let dst = dst.as_ref();
    fs::create_dir_all(dst)?;

    for entry in fs::read_dir(src.as_ref())? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_read_smiles_skips_blank_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("smis.txt");
        std::fs::write(&path, "CCO\n\n  c1ccccc1  \nCCN\n").unwrap();

        let smis = read_smiles(&path).unwrap();
        assert_eq!(smis, vec!["CCO", "c1ccccc1", "CCN"]);
    }

    #[test]
    fn test_parse_pose_scores() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.pdbqt");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "MODEL 1").unwrap();
        writeln!(file, "REMARK VINA RESULT:    -7.200      0.000      0.000").unwrap();
        writeln!(file, "ENDMDL").unwrap();
        writeln!(file, "MODEL 2").unwrap();
        writeln!(file, "REMARK VINA RESULT:    -6.500      1.523      2.101").unwrap();
        writeln!(file, "ENDMDL").unwrap();
        writeln!(file, "REMARK minimizedAffinity -5.25").unwrap();
        drop(file);

        let scores = parse_pose_scores(&path).unwrap();
        assert_eq!(scores.len(), 3);
        assert_approx_eq!(scores[0], -7.2);
        assert_approx_eq!(scores[1], -6.5);
        assert_approx_eq!(scores[2], -5.25);
    }

    #[test]
    fn test_parse_pose_scores_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.pdbqt");
        std::fs::write(&path, "REMARK VINA RESULT:    abc\n").unwrap();

        assert!(matches!(
            parse_pose_scores(&path),
            Err(IoError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn test_autobox() {
        let coords = vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(2.0, 4.0, -2.0),
            Vector3::new(1.0, 1.0, 1.0),
        ];

        let (center, size) = autobox(&coords, 10.0).unwrap();
        assert_approx_eq!(center.x, 1.0);
        assert_approx_eq!(center.y, 2.0);
        assert_approx_eq!(center.z, -0.5);
        assert_approx_eq!(size.x, 12.0);
        assert_approx_eq!(size.y, 14.0);
        assert_approx_eq!(size.z, 13.0);

        assert!(autobox(&[], 10.0).is_none());
    }

    #[test]
    fn test_parse_coordinates_unsupported_extension() {
        assert!(matches!(
            parse_coordinates("ligand.sdf"),
            Err(IoError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_parse_coordinates_non_ascii_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("xtal.pdb");
        // 'é' occupies bytes 29..31, straddling the start of the x column
        let line = format!(
            "{:<29}é     0.000   0.000  1.00  0.00           C",
            "HETATM    1  C1  LIG A   1"
        );
        std::fs::write(&path, format!("{}\n", line)).unwrap();

        assert!(matches!(
            parse_coordinates(&path),
            Err(IoError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn test_extended_csv_header_matches_record_fields() {
        let mut writer = csv::Writer::from_writer(vec![]);
        writer
            .serialize(ScreenResult {
                smiles: "CCO".to_string(),
                compound_id: "ZINC1".to_string(),
                score: -8.0,
            })
            .unwrap();
        let data = String::from_utf8(writer.into_inner().unwrap()).unwrap();

        let header = data.lines().next().unwrap();
        assert_eq!(header, ScreenResult::FIELDS.join(","));
    }

    #[test]
    fn test_write_extended_csv_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("extended.csv");

        write_extended_csv(&[], &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "smiles,compound_id,score\n");
    }

    #[test]
    fn test_copy_tree() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("outputs")).unwrap();
        std::fs::write(src.path().join("outputs/a.pdbqt"), "A").unwrap();
        std::fs::write(src.path().join("b.txt"), "B").unwrap();

        copy_tree(src.path(), dst.path()).unwrap();

        assert_eq!(
            std::fs::read_to_string(dst.path().join("outputs/a.pdbqt")).unwrap(),
            "A"
        );
        assert_eq!(std::fs::read_to_string(dst.path().join("b.txt")).unwrap(), "B");
    }
}
