//! Virtual screens: drivers for external docking engines

pub mod dock3;
pub mod metadata;
pub mod reduction;
pub mod vina;

use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use thiserror::Error;

use crate::args::ScreenConfig;
use crate::io::IoError;

pub use dock3::Dock3Screen;
pub use vina::VinaScreen;

/// Errors that can occur while building or running a screen
#[derive(Error, Debug)]
pub enum ScreenError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    File(#[from] IoError),

    #[error("Executable not found: {0}")]
    MissingExecutable(PathBuf),

    #[error("{program} exited with {status}: {stderr}")]
    Process {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("Invalid setup: {0}")]
    InvalidSetup(String),

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// A single scored compound
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenResult {
    /// SMILES string of the input molecule
    pub smiles: String,

    /// Backend compound identifier
    pub compound_id: String,

    /// Raw docking score, NaN when docking failed
    pub score: f64,
}

impl ScreenResult {
    /// Field names in declaration order
    pub const FIELDS: [&'static str; 3] = ["smiles", "compound_id", "score"];
}

/// How the scores returned by [`VirtualScreen::screen`] line up with its input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreAlignment {
    /// One score per input, in input order
    Positional,

    /// Scores must be matched to inputs through the result records, since the
    /// backend may reorder, drop or expand its inputs
    ByIdentifier,
}

/// Trait for virtual screens that dock batches of molecules
pub trait VirtualScreen: Send {
    /// Screen type tag
    fn name(&self) -> &str;

    /// How screened scores correspond to the input molecules
    fn alignment(&self) -> ScoreAlignment {
        ScoreAlignment::Positional
    }

    /// Dock every SMILES string, returning one raw score per input (NaN for
    /// failures)
    fn screen(&mut self, smis: &[String]) -> Result<Vec<f64>, ScreenError>;

    /// Every result record accumulated so far
    fn results(&self) -> &[ScreenResult];

    /// Copy working files into [`VirtualScreen::path`]
    fn collect_files(&mut self) -> Result<(), ScreenError>;

    /// Directory under which inputs and outputs are collected
    fn path(&self) -> &Path;
}

/// Build the screen named by a configuration
pub fn build_screen(config: ScreenConfig, verbose: u8) -> Result<Box<dyn VirtualScreen>, ScreenError> {
    let screen: Box<dyn VirtualScreen> = match config {
        ScreenConfig::Dock3(params) => Box::new(Dock3Screen::new(params, verbose)?),
        ScreenConfig::Generic(params) => Box::new(VinaScreen::new(params, verbose)?),
    };
    Ok(screen)
}

/// Run an external program to completion, failing on a non-zero exit
pub(crate) fn run_command(command: &mut Command) -> Result<Output, ScreenError> {
    let program = command.get_program().to_string_lossy().into_owned();
    debug!("Running {:?}", command);

    let output = command.output().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ScreenError::MissingExecutable(PathBuf::from(&program)),
        _ => ScreenError::Io(e),
    })?;

    if !output.status.success() {
        return Err(ScreenError::Process {
            program,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output)
}
