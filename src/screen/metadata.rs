//! Software-specific docking metadata

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Docking programs of the AutoDock Vina family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VinaSoftware {
    Vina,
    Qvina,
    Smina,
    Psovina,
}

impl VinaSoftware {
    /// Executable name looked up on `PATH` when the template gives none
    pub fn default_executable(self) -> &'static str {
        match self {
            VinaSoftware::Vina => "vina",
            VinaSoftware::Qvina => "qvina2.1",
            VinaSoftware::Smina => "smina",
            VinaSoftware::Psovina => "psovina",
        }
    }
}

impl FromStr for VinaSoftware {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vina" => Ok(VinaSoftware::Vina),
            "qvina" | "qvina2" => Ok(VinaSoftware::Qvina),
            "smina" => Ok(VinaSoftware::Smina),
            "psovina" => Ok(VinaSoftware::Psovina),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for VinaSoftware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VinaSoftware::Vina => write!(f, "vina"),
            VinaSoftware::Qvina => write!(f, "qvina"),
            VinaSoftware::Smina => write!(f, "smina"),
            VinaSoftware::Psovina => write!(f, "psovina"),
        }
    }
}

/// Options accepted in a metadata template
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct MetadataTemplate {
    exhaustiveness: usize,
    num_modes: usize,
    energy_range: f64,
    executable: Option<PathBuf>,
    obabel: PathBuf,
    extra: Vec<String>,
}

impl Default for MetadataTemplate {
    fn default() -> Self {
        Self {
            exhaustiveness: 8,
            num_modes: 9,
            energy_range: 3.0,
            executable: None,
            obabel: PathBuf::from("obabel"),
            extra: Vec::new(),
        }
    }
}

/// Parameters shared by every docking run of a screen
#[derive(Debug, Clone, Serialize)]
pub struct Metadata {
    /// Docking program
    pub software: VinaSoftware,

    /// Search exhaustiveness
    pub exhaustiveness: usize,

    /// Maximum number of poses per run
    pub num_modes: usize,

    /// Maximum energy difference between the best and worst pose (kcal/mol)
    pub energy_range: f64,

    /// Docking executable
    pub executable: PathBuf,

    /// Open Babel executable used for ligand and receptor preparation
    pub obabel: PathBuf,

    /// Additional arguments appended to every docking command
    pub extra_args: Vec<String>,
}

impl Metadata {
    /// Build the metadata for `software` from a template mapping.
    ///
    /// Keys missing from the template fall back to the program defaults;
    /// unknown keys are rejected.
    pub fn build(software: VinaSoftware, template: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        let template: MetadataTemplate = serde_json::from_value(Value::Object(template.clone()))?;

        Ok(Self {
            software,
            exhaustiveness: template.exhaustiveness,
            num_modes: template.num_modes,
            energy_range: template.energy_range,
            executable: template
                .executable
                .unwrap_or_else(|| PathBuf::from(software.default_executable())),
            obabel: template.obabel,
            extra_args: template.extra,
        })
    }
}
