//! Driver for the legacy DOCK3.8 cluster docking pipeline
//!
//! Molecules are looked up in a compound library that maps each SMILES
//! string to one or more library ids. The ids of a batch are handed to the
//! pipeline's `run_pipeline.sh`, which docks them and writes one
//! `<id> <score>` line per docked compound to `scores.txt`. Because a SMILES
//! may expand to several ids and the pipeline may drop compounds, scores are
//! matched back to inputs through the result records.

use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use crate::args::Dock3Params;
use crate::io::{copy_tree, IoError};
use crate::screen::{run_command, ScoreAlignment, ScreenError, ScreenResult, VirtualScreen};

/// Name of the pipeline entry point inside the pipeline scripts directory
pub const PIPELINE_SCRIPT: &str = "run_pipeline.sh";

/// File the pipeline writes its scores to, inside the batch directory
pub const SCORES_FILE: &str = "scores.txt";

/// Compound library: SMILES to ids and back
#[derive(Debug, Default)]
struct Library {
    ids: HashMap<String, Vec<String>>,
    smiles: HashMap<String, String>,
}

impl Library {
    fn load(path: &Path) -> Result<Self, IoError> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();

        let column = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.contains(&h.trim().to_ascii_lowercase().as_str()))
        };
        let smiles_col = column(&["smiles", "smi"]).ok_or_else(|| {
            IoError::InvalidFormat(format!("no smiles column in {}", path.display()))
        })?;
        let id_col = column(&["zinc_id", "zincid", "compound_id", "id"]).ok_or_else(|| {
            IoError::InvalidFormat(format!("no compound id column in {}", path.display()))
        })?;

        let mut library = Library::default();
        for record in reader.records() {
            let record = record?;
            let (Some(smi), Some(id)) = (record.get(smiles_col), record.get(id_col)) else {
                continue;
            };
            let (smi, id) = (smi.trim(), id.trim());
            if smi.is_empty() || id.is_empty() {
                continue;
            }

            let ids = library.ids.entry(smi.to_string()).or_default();
            if !ids.iter().any(|existing| existing == id) {
                ids.push(id.to_string());
            }
            library
                .smiles
                .entry(id.to_string())
                .or_insert_with(|| smi.to_string());
        }

        Ok(library)
    }
}

/// Virtual screen backed by the DOCK3.8 pipeline
pub struct Dock3Screen {
    screen_type: String,
    output_dir: PathBuf,
    dockfiles: PathBuf,
    pipeline: PathBuf,
    ncpu: usize,
    library: Library,
    scratch: TempDir,
    num_batches: usize,
    results: Vec<ScreenResult>,
    verbose: u8,
}

impl Dock3Screen {
    /// Create a screen, loading the compound library
    pub fn new(params: Dock3Params, verbose: u8) -> Result<Self, ScreenError> {
        if !params.dockfiles.is_dir() {
            return Err(ScreenError::InvalidSetup(format!(
                "dockfiles directory not found: {}",
                params.dockfiles.display()
            )));
        }

        let pipeline = params.pipeline_scripts.join(PIPELINE_SCRIPT);
        if !pipeline.is_file() {
            return Err(ScreenError::InvalidSetup(format!(
                "pipeline script not found: {}",
                pipeline.display()
            )));
        }

        // The pipeline runs inside the batch directory
        let dockfiles = fs::canonicalize(&params.dockfiles)?;
        let pipeline = fs::canonicalize(&pipeline)?;

        let library = Library::load(&params.library_file)?;
        info!(
            "Loaded {} library compounds from {}",
            library.smiles.len(),
            params.library_file.display()
        );

        fs::create_dir_all(&params.output_dir)?;
        let scratch = tempfile::Builder::new().prefix("dock3-").tempdir()?;

        Ok(Self {
            screen_type: params.screen_type,
            output_dir: params.output_dir,
            dockfiles,
            pipeline,
            ncpu: params.ncpu,
            library,
            scratch,
            num_batches: 0,
            results: Vec::new(),
            verbose,
        })
    }

    /// Run the pipeline on one batch directory and parse its scores
    fn run_pipeline(&self, ids_file: &Path, batch_dir: &Path) -> Result<Vec<(String, f64)>, ScreenError> {
        let output = run_command(
            Command::new("sh")
                .arg(&self.pipeline)
                .arg(&self.dockfiles)
                .arg(ids_file)
                .arg(batch_dir)
                .arg(self.ncpu.to_string())
                .current_dir(batch_dir),
        )?;

        if self.verbose > 0 {
            info!("{}", String::from_utf8_lossy(&output.stdout).trim());
        }

        Ok(parse_pipeline_scores(batch_dir.join(SCORES_FILE))?)
    }
}

impl VirtualScreen for Dock3Screen {
    fn name(&self) -> &str {
        &self.screen_type
    }

    fn alignment(&self) -> ScoreAlignment {
        ScoreAlignment::ByIdentifier
    }

    fn screen(&mut self, smis: &[String]) -> Result<Vec<f64>, ScreenError> {
        let batch_dir = self
            .scratch
            .path()
            .join(format!("batch_{:04}", self.num_batches));
        self.num_batches += 1;
        fs::create_dir_all(&batch_dir)?;

        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for smi in smis {
            match self.library.ids.get(smi) {
                Some(compound_ids) => {
                    for id in compound_ids {
                        if seen.insert(id.as_str()) {
                            ids.push(id.as_str());
                        }
                    }
                }
                None => warn!("SMILES not found in library: {}", smi),
            }
        }

        if ids.is_empty() {
            warn!("No library compounds to dock in this batch");
            return Ok(vec![f64::NAN; smis.len()]);
        }

        let ids_file = batch_dir.join("zinc_ids.txt");
        let mut file = File::create(&ids_file)?;
        for id in &ids {
            writeln!(file, "{}", id)?;
        }
        drop(file);

        info!(
            "Docking {} compounds for {} molecules in {}",
            ids.len(),
            smis.len(),
            batch_dir.display()
        );
        let scored = self.run_pipeline(&ids_file, &batch_dir)?;

        let records: Vec<ScreenResult> = scored
            .into_iter()
            .filter_map(|(id, score)| match self.library.smiles.get(&id) {
                Some(smi) => Some(ScreenResult {
                    smiles: smi.clone(),
                    compound_id: id,
                    score,
                }),
                None => {
                    warn!("Pipeline returned unknown compound id: {}", id);
                    None
                }
            })
            .collect();
        debug!("Pipeline scored {} of {} compounds", records.len(), ids.len());

        // Best score per SMILES over this batch
        let mut best: HashMap<&str, f64> = HashMap::new();
        for record in records.iter().filter(|r| !r.score.is_nan()) {
            best.entry(record.smiles.as_str())
                .and_modify(|s| *s = s.min(record.score))
                .or_insert(record.score);
        }
        let scores = smis
            .iter()
            .map(|smi| best.get(smi.as_str()).copied().unwrap_or(f64::NAN))
            .collect();

        self.results.extend(records);

        Ok(scores)
    }

    fn results(&self) -> &[ScreenResult] {
        &self.results
    }

    fn collect_files(&mut self) -> Result<(), ScreenError> {
        info!(
            "Collecting DOCK3 outputs into {}",
            self.output_dir.display()
        );
        copy_tree(self.scratch.path(), &self.output_dir)?;
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.output_dir
    }
}

/// Parse `<id> <score>` lines written by the pipeline.
///
/// Fields may be separated by whitespace or a comma; blank lines and lines
/// starting with `#` are skipped.
pub fn parse_pipeline_scores<P: AsRef<Path>>(path: P) -> Result<Vec<(String, f64)>, IoError> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    let mut scores = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|f| !f.is_empty());
        let (Some(id), Some(score)) = (fields.next(), fields.next()) else {
            return Err(IoError::Parse {
                line: idx + 1,
                message: format!("Expected `<id> <score>`: {}", line),
            });
        };
        let score = score.parse::<f64>().map_err(|_| IoError::Parse {
            line: idx + 1,
            message: format!("Invalid score: {}", score),
        })?;

        scores.push((id.to_string(), score));
    }

    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_pipeline_scores() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SCORES_FILE);
        fs::write(&path, "# id score\nZINC1 -8.0\n\nZINC2,-9.5\nZINC3 nan\n").unwrap();

        let scores = parse_pipeline_scores(&path).unwrap();
        assert_eq!(scores.len(), 3);
        assert_eq!(scores[0], ("ZINC1".to_string(), -8.0));
        assert_eq!(scores[1], ("ZINC2".to_string(), -9.5));
        assert!(scores[2].1.is_nan());
    }

    #[test]
    fn test_parse_pipeline_scores_missing_score() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SCORES_FILE);
        fs::write(&path, "ZINC1\n").unwrap();

        assert!(matches!(
            parse_pipeline_scores(&path),
            Err(IoError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn test_library_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("library.csv");
        fs::write(
            &path,
            "SMILES,ZINC_ID,score\nCCO,ZINC1,-8\nCCO,ZINC2,-9\nCCN,ZINC3,-5\nCCO,ZINC1,-8\n",
        )
        .unwrap();

        let library = Library::load(&path).unwrap();
        assert_eq!(library.ids["CCO"], vec!["ZINC1", "ZINC2"]);
        assert_eq!(library.ids["CCN"], vec!["ZINC3"]);
        assert_eq!(library.smiles["ZINC2"], "CCO");
    }

    #[test]
    fn test_library_without_id_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("library.csv");
        fs::write(&path, "smiles,score\nCCO,-8\n").unwrap();

        assert!(matches!(
            Library::load(&path),
            Err(IoError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_new_requires_dockfiles() {
        let dir = tempdir().unwrap();
        let params = Dock3Params {
            output_dir: dir.path().join("out"),
            screen_type: "dock3".to_string(),
            dockfiles: dir.path().join("missing"),
            pipeline_scripts: dir.path().to_path_buf(),
            ncpu: 1,
            library_file: dir.path().join("library.csv"),
        };

        assert!(matches!(
            Dock3Screen::new(params, 0),
            Err(ScreenError::InvalidSetup(_))
        ));
    }
}
