//! Docking objective: scores molecules through a virtual screen
//!
//! The objective owns its screen for its whole lifetime. Cleanup (collecting
//! the screen's files and writing `extended.csv`) runs exactly once, either
//! through [`DockingObjective::finish`] or when the objective is dropped.

use log::{debug, error, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use thiserror::Error;

use crate::args::{ConfigError, ScreenArgs};
use crate::io::{write_extended_csv, IoError};
use crate::screen::{build_screen, ScoreAlignment, ScreenError, VirtualScreen};

/// Name of the result file written at cleanup
pub const EXTENDED_CSV: &str = "extended.csv";

/// Scores keyed by SMILES string; `None` marks a molecule without a score
pub type Scores = HashMap<String, Option<f64>>;

/// Errors that can occur while building or using an objective
#[derive(Error, Debug)]
pub enum ObjectiveError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Screen error: {0}")]
    Screen(#[from] ScreenError),

    #[error("Output error: {0}")]
    Output(#[from] IoError),
}

/// Trait for objective functions of an active-learning loop
pub trait Objective {
    /// Whether lower scores are better for the caller
    fn minimize(&self) -> bool;

    /// Score a collection of molecules
    fn forward(&mut self, smis: &[String]) -> Result<Scores, ObjectiveError>;
}

/// Options for building a [`DockingObjective`]
#[derive(Debug, Clone)]
pub struct ObjectiveOptions {
    /// Screen config file
    pub objective_config: PathBuf,

    /// Directory under which docking inputs and outputs are collected
    pub path: PathBuf,

    /// Verbosity of the screen
    pub verbose: u8,

    /// Whether the objective is minimized
    pub minimize: bool,

    /// Options meant for other objectives; ignored
    pub extra: BTreeMap<String, String>,
}

impl ObjectiveOptions {
    pub fn new<P: Into<PathBuf>>(objective_config: P) -> Self {
        Self {
            objective_config: objective_config.into(),
            path: PathBuf::from("."),
            verbose: 0,
            minimize: true,
            extra: BTreeMap::new(),
        }
    }
}

/// Objective that scores molecules by their docking score
pub struct DockingObjective {
    screen: Box<dyn VirtualScreen>,
    minimize: bool,
    c: f64,
    cleaned_up: bool,
}

impl DockingObjective {
    /// Build the objective from a screen config file
    pub fn new(options: ObjectiveOptions) -> Result<Self, ObjectiveError> {
        for key in options.extra.keys() {
            debug!("Ignoring objective option: {}", key);
        }

        let args = ScreenArgs::from_file(&options.objective_config)?;
        let config = args.resolve(&options.path)?;
        let screen = build_screen(config, options.verbose)?;
        args.log_options();

        Ok(Self::with_screen(screen, options.minimize))
    }

    /// Wrap an already constructed screen
    pub fn with_screen(screen: Box<dyn VirtualScreen>, minimize: bool) -> Self {
        Self {
            screen,
            minimize,
            c: if minimize { 1.0 } else { -1.0 },
            cleaned_up: false,
        }
    }

    /// Sign applied to every raw docking score
    pub fn sign(&self) -> f64 {
        self.c
    }

    /// The underlying screen
    pub fn screen(&self) -> &dyn VirtualScreen {
        self.screen.as_ref()
    }

    /// Clean up and return the path of the written `extended.csv`
    pub fn finish(mut self) -> Result<PathBuf, ObjectiveError> {
        self.cleanup()
    }

    fn scale(&self, score: f64) -> Option<f64> {
        let score = self.c * score;
        if score.is_nan() {
            None
        } else {
            Some(score)
        }
    }

    fn cleanup(&mut self) -> Result<PathBuf, ObjectiveError> {
        self.cleaned_up = true;

        let results = self.screen.results().to_vec();
        self.screen.collect_files()?;

        let path = self.screen.path().join(EXTENDED_CSV);
        if results.is_empty() {
            warn!("No docking results to write; {} has only a header", path.display());
        }
        write_extended_csv(&results, &path)?;
        info!("Wrote {} results to {}", results.len(), path.display());

        Ok(path)
    }
}

impl Objective for DockingObjective {
    fn minimize(&self) -> bool {
        self.minimize
    }

    fn forward(&mut self, smis: &[String]) -> Result<Scores, ObjectiveError> {
        let raw = self.screen.screen(smis)?;
        let scores: Vec<Option<f64>> = raw.iter().map(|&s| self.scale(s)).collect();

        match self.screen.alignment() {
            ScoreAlignment::ByIdentifier => {
                let mut table: HashMap<&str, Option<f64>> = HashMap::new();
                for result in self.screen.results() {
                    table.insert(result.smiles.as_str(), self.scale(result.score));
                }

                Ok(smis
                    .iter()
                    .map(|smi| (smi.clone(), table.get(smi.as_str()).copied().flatten()))
                    .collect())
            }
            ScoreAlignment::Positional => {
                if scores.len() != smis.len() {
                    warn!(
                        "{} returned {} scores for {} molecules",
                        self.screen.name(),
                        scores.len(),
                        smis.len()
                    );
                }

                Ok(smis.iter().cloned().zip(scores).collect())
            }
        }
    }
}

impl Drop for DockingObjective {
    fn drop(&mut self) {
        if self.cleaned_up {
            return;
        }
        if let Err(e) = self.cleanup() {
            error!("Failed to clean up {} screen: {}", self.screen.name(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screen::ScreenResult;
    use std::path::Path;

    struct FixedScreen {
        scores: Vec<f64>,
        results: Vec<ScreenResult>,
        path: PathBuf,
    }

    impl VirtualScreen for FixedScreen {
        fn name(&self) -> &str {
            "fixed"
        }

        fn screen(&mut self, _smis: &[String]) -> Result<Vec<f64>, ScreenError> {
            Ok(self.scores.clone())
        }

        fn results(&self) -> &[ScreenResult] {
            &self.results
        }

        fn collect_files(&mut self) -> Result<(), ScreenError> {
            Ok(())
        }

        fn path(&self) -> &Path {
            &self.path
        }
    }

    #[test]
    fn test_sign_from_minimize() {
        let dir = tempfile::tempdir().unwrap();
        let screen = |path: &Path| {
            Box::new(FixedScreen {
                scores: Vec::new(),
                results: Vec::new(),
                path: path.to_path_buf(),
            })
        };

        let objective = DockingObjective::with_screen(screen(dir.path()), true);
        assert_eq!(objective.sign(), 1.0);
        assert!(objective.minimize());
        drop(objective);

        let objective = DockingObjective::with_screen(screen(dir.path()), false);
        assert_eq!(objective.sign(), -1.0);
        assert!(!objective.minimize());
    }

    #[test]
    fn test_positional_length_mismatch_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let screen = FixedScreen {
            scores: vec![-5.0],
            results: Vec::new(),
            path: dir.path().to_path_buf(),
        };
        let mut objective = DockingObjective::with_screen(Box::new(screen), true);

        let smis = vec!["CCO".to_string(), "CCN".to_string()];
        let scores = objective.forward(&smis).unwrap();

        assert_eq!(scores.len(), 1);
        assert_eq!(scores["CCO"], Some(-5.0));

        let path = objective.finish().unwrap();
        assert_eq!(path, dir.path().join(EXTENDED_CSV));
    }
}
