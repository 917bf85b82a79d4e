//! Screen configuration
//!
//! A config file is first read into a flat option set ([`ScreenArgs`]) and
//! then resolved, once, into a typed [`ScreenConfig`] that names exactly one
//! backend and the parameters it needs.

use log::{info, warn};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::screen::metadata::{Metadata, VinaSoftware};
use crate::screen::reduction::{ReceptorReduction, Reduction};

/// Errors that can occur while loading or resolving a configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Config file {0} must contain a mapping of option names to values")]
    NotAMapping(PathBuf),

    #[error("Missing required option: {0}")]
    MissingOption(&'static str),

    #[error("Unknown screen type: {0} (expected dock3, dock3.8, vina, qvina, smina or psovina)")]
    UnknownScreenType(String),

    #[error("Invalid value for {option}: {message}")]
    InvalidValue {
        option: &'static str,
        message: String,
    },

    #[error("Invalid metadata template: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Flat option set read from a config file.
///
/// Option names may be written with `-` or `_`. Options that no backend
/// understands are kept in `ignored` so they can be reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenArgs {
    pub screen_type: Option<String>,
    pub metadata_template: Option<Value>,
    pub receptors: Vec<PathBuf>,
    pub pdbids: Vec<String>,
    pub center: Option<Vec<f64>>,
    pub size: Vec<f64>,
    pub docked_ligand_file: Option<PathBuf>,
    pub buffer: f64,
    pub ncpu: usize,
    pub base_name: String,
    pub reduction: Reduction,
    pub receptor_reduction: ReceptorReduction,
    pub k: usize,
    pub docking_output_dir: Option<PathBuf>,
    pub dockfiles: Option<PathBuf>,
    pub pipeline_scripts: Option<PathBuf>,
    pub library: Option<PathBuf>,

    #[serde(flatten)]
    pub ignored: BTreeMap<String, Value>,
}

impl Default for ScreenArgs {
    fn default() -> Self {
        Self {
            screen_type: None,
            metadata_template: None,
            receptors: Vec::new(),
            pdbids: Vec::new(),
            center: None,
            size: vec![10.0, 10.0, 10.0],
            docked_ligand_file: None,
            buffer: 10.0,
            ncpu: 1,
            base_name: "ligand".to_string(),
            reduction: Reduction::default(),
            receptor_reduction: ReceptorReduction::default(),
            k: 1,
            docking_output_dir: None,
            dockfiles: None,
            pipeline_scripts: None,
            library: None,
            ignored: BTreeMap::new(),
        }
    }
}

/// Parameters of the legacy DOCK3.8 cluster pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dock3Params {
    /// Directory that collects the pipeline outputs
    pub output_dir: PathBuf,

    /// Screen type tag as written in the config (`dock3` or `dock3.8`)
    pub screen_type: String,

    /// Directory of prepared receptor dockfiles
    pub dockfiles: PathBuf,

    /// Directory containing `run_pipeline.sh`
    pub pipeline_scripts: PathBuf,

    /// Number of worker processes handed to the pipeline
    pub ncpu: usize,

    /// CSV file mapping SMILES to library compound ids
    pub library_file: PathBuf,
}

/// Parameters of a generic virtual screen
#[derive(Debug, Clone, Serialize)]
pub struct GenericParams {
    pub receptors: Vec<PathBuf>,
    pub center: Option<Vector3<f64>>,
    pub size: Vector3<f64>,
    pub metadata: Metadata,
    pub pdbids: Vec<String>,
    pub docked_ligand_file: Option<PathBuf>,
    pub buffer: f64,
    pub ncpu: usize,
    pub base_name: String,
    pub path: PathBuf,
    pub reduction: Reduction,
    pub receptor_reduction: ReceptorReduction,
    pub k: usize,
    pub dockfiles: Option<PathBuf>,
    pub pipeline_scripts: Option<PathBuf>,
}

/// Backend selected by a configuration
#[derive(Debug, Clone, Serialize)]
pub enum ScreenConfig {
    Dock3(Dock3Params),
    Generic(GenericParams),
}

impl ScreenArgs {
    /// Read an option set from a YAML config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_yaml_str(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            ConfigError::NotAMapping(_) => ConfigError::NotAMapping(path.to_path_buf()),
            other => other,
        })
    }

    /// Parse an option set from YAML text
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let parse_error = |source: serde_yaml::Error| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        };

        let value: serde_yaml::Value = serde_yaml::from_str(content).map_err(parse_error)?;
        let mapping = match value {
            serde_yaml::Value::Mapping(mapping) => mapping,
            serde_yaml::Value::Null => serde_yaml::Mapping::new(),
            _ => return Err(ConfigError::NotAMapping(PathBuf::new())),
        };

        // Normalize `screen-type` style keys to `screen_type`
        let normalized: serde_yaml::Mapping = mapping
            .into_iter()
            .map(|(key, value)| match key {
                serde_yaml::Value::String(key) => {
                    (serde_yaml::Value::String(key.replace('-', "_")), value)
                }
                other => (other, value),
            })
            .collect();

        serde_yaml::from_value(serde_yaml::Value::Mapping(normalized)).map_err(parse_error)
    }

    /// Every known option as a `(name, value)` pair, in name order.
    ///
    /// Unknown keys are left out; they are reported separately by
    /// [`ScreenArgs::log_options`].
    pub fn options(&self) -> Vec<(String, String)> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map
                .into_iter()
                .filter(|(key, _)| !self.ignored.contains_key(key))
                .map(|(key, value)| (key, value.to_string()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Log every option for diagnostics
    pub fn log_options(&self) {
        info!("=== Screen options ===");
        for (key, value) in self.options() {
            info!("{}: {}", key, value);
        }
        info!("======================");

        for key in self.ignored.keys() {
            warn!("Ignoring unknown option: {}", key);
        }
    }

    /// Resolve the option set into a backend configuration.
    ///
    /// `path` is the directory under which the screen's inputs and outputs
    /// are collected.
    pub fn resolve<P: AsRef<Path>>(&self, path: P) -> Result<ScreenConfig, ConfigError> {
        let path = path.as_ref();
        let screen_type = self
            .screen_type
            .as_deref()
            .ok_or(ConfigError::MissingOption("screen_type"))?;

        if self.ncpu == 0 {
            return Err(ConfigError::InvalidValue {
                option: "ncpu",
                message: "must be at least 1".to_string(),
            });
        }

        match screen_type {
            "dock3" | "dock3.8" => self.resolve_dock3(screen_type, path),
            other => {
                let software = other
                    .parse::<VinaSoftware>()
                    .map_err(ConfigError::UnknownScreenType)?;
                self.resolve_generic(software, path)
            }
        }
    }

    fn resolve_dock3(&self, screen_type: &str, path: &Path) -> Result<ScreenConfig, ConfigError> {
        let dockfiles = self
            .dockfiles
            .clone()
            .ok_or(ConfigError::MissingOption("dockfiles"))?;
        let library_file = self
            .library
            .clone()
            .ok_or(ConfigError::MissingOption("library"))?;

        // Pipeline scripts ship next to the dockfiles unless given explicitly
        let pipeline_scripts = match &self.pipeline_scripts {
            Some(scripts) => scripts.clone(),
            None => dockfiles
                .parent()
                .map(Path::to_path_buf)
                .ok_or(ConfigError::MissingOption("pipeline_scripts"))?,
        };

        Ok(ScreenConfig::Dock3(Dock3Params {
            output_dir: self
                .docking_output_dir
                .clone()
                .unwrap_or_else(|| path.to_path_buf()),
            screen_type: screen_type.to_string(),
            dockfiles,
            pipeline_scripts,
            ncpu: self.ncpu,
            library_file,
        }))
    }

    fn resolve_generic(&self, software: VinaSoftware, path: &Path) -> Result<ScreenConfig, ConfigError> {
        let template = match &self.metadata_template {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(Value::String(json)) => match serde_json::from_str(json)? {
                Value::Object(map) => map,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        option: "metadata_template",
                        message: "must be a mapping".to_string(),
                    })
                }
            },
            Some(_) => {
                return Err(ConfigError::InvalidValue {
                    option: "metadata_template",
                    message: "must be a mapping".to_string(),
                })
            }
        };
        let metadata = Metadata::build(software, &template)?;

        if self.receptors.is_empty() && self.pdbids.is_empty() {
            return Err(ConfigError::MissingOption("receptors"));
        }
        if self.center.is_none() && self.docked_ligand_file.is_none() {
            return Err(ConfigError::MissingOption("center"));
        }

        let center = self
            .center
            .as_deref()
            .map(|c| to_vector("center", c))
            .transpose()?;
        let size = to_vector("size", &self.size)?;

        Ok(ScreenConfig::Generic(GenericParams {
            receptors: self.receptors.clone(),
            center,
            size,
            metadata,
            pdbids: self.pdbids.clone(),
            docked_ligand_file: self.docked_ligand_file.clone(),
            buffer: self.buffer,
            ncpu: self.ncpu,
            base_name: self.base_name.clone(),
            path: path.to_path_buf(),
            reduction: self.reduction,
            receptor_reduction: self.receptor_reduction,
            k: self.k,
            dockfiles: self.dockfiles.clone(),
            pipeline_scripts: self.pipeline_scripts.clone(),
        }))
    }
}

fn to_vector(option: &'static str, values: &[f64]) -> Result<Vector3<f64>, ConfigError> {
    match values {
        [x, y, z] => Ok(Vector3::new(*x, *y, *z)),
        _ => Err(ConfigError::InvalidValue {
            option,
            message: format!("expected 3 values, got {}", values.len()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_dock3_resolution() {
        let args = ScreenArgs::from_yaml_str(
            "screen-type: dock3.8\n\
             dockfiles: /data/running_scripts/dockfiles\n\
             library: /data/library.csv\n\
             ncpu: 4\n",
        )
        .unwrap();

        let config = args.resolve("/tmp/molpal").unwrap();
        let ScreenConfig::Dock3(params) = config else {
            panic!("expected a DOCK3 configuration");
        };

        assert_eq!(params.screen_type, "dock3.8");
        assert_eq!(params.ncpu, 4);
        assert_eq!(params.output_dir, PathBuf::from("/tmp/molpal"));
        assert_eq!(params.pipeline_scripts, PathBuf::from("/data/running_scripts"));
        assert_eq!(params.library_file, PathBuf::from("/data/library.csv"));
    }

    #[test]
    fn test_both_dock3_spellings() {
        for tag in ["dock3", "dock3.8"] {
            let args = ScreenArgs {
                screen_type: Some(tag.to_string()),
                dockfiles: Some(PathBuf::from("dockfiles")),
                pipeline_scripts: Some(PathBuf::from("scripts")),
                library: Some(PathBuf::from("lib.csv")),
                docking_output_dir: Some(PathBuf::from("out")),
                ..ScreenArgs::default()
            };
            assert!(matches!(args.resolve("."), Ok(ScreenConfig::Dock3(_))));
        }
    }

    #[test]
    fn test_generic_resolution() {
        let args = ScreenArgs::from_yaml_str(
            "screen_type: vina\n\
             receptors: [5WIU.pdbqt]\n\
             center: [-18.2, 14.4, -16.75]\n\
             size: [15.4, 13.9, 14.5]\n\
             metadata_template: '{\"exhaustiveness\": 16}'\n\
             reduction: boltzmann\n\
             receptor-reduction: avg\n\
             k: 3\n",
        )
        .unwrap();

        let ScreenConfig::Generic(params) = args.resolve("out").unwrap() else {
            panic!("expected a generic configuration");
        };

        let center = params.center.unwrap();
        assert_approx_eq!(center.x, -18.2);
        assert_approx_eq!(params.size.y, 13.9);
        assert_eq!(params.metadata.software, VinaSoftware::Vina);
        assert_eq!(params.metadata.exhaustiveness, 16);
        assert_eq!(params.reduction, Reduction::Boltzmann);
        assert_eq!(params.receptor_reduction, ReceptorReduction::Avg);
        assert_eq!(params.k, 3);
        assert_eq!(params.base_name, "ligand");
        assert_eq!(params.path, PathBuf::from("out"));
    }

    #[test]
    fn test_missing_and_invalid_options() {
        let args = ScreenArgs::default();
        assert!(matches!(
            args.resolve("."),
            Err(ConfigError::MissingOption("screen_type"))
        ));

        let args = ScreenArgs {
            screen_type: Some("dock6".to_string()),
            ..ScreenArgs::default()
        };
        assert!(matches!(
            args.resolve("."),
            Err(ConfigError::UnknownScreenType(_))
        ));

        let args = ScreenArgs {
            screen_type: Some("vina".to_string()),
            receptors: vec![PathBuf::from("r.pdbqt")],
            center: Some(vec![1.0, 2.0]),
            ..ScreenArgs::default()
        };
        assert!(matches!(
            args.resolve("."),
            Err(ConfigError::InvalidValue { option: "center", .. })
        ));

        let args = ScreenArgs {
            screen_type: Some("dock3".to_string()),
            library: Some(PathBuf::from("lib.csv")),
            ..ScreenArgs::default()
        };
        assert!(matches!(
            args.resolve("."),
            Err(ConfigError::MissingOption("dockfiles"))
        ));
    }

    #[test]
    fn test_unknown_options_are_kept() {
        let args = ScreenArgs::from_yaml_str("screen_type: vina\nfoo_bar: 3\n").unwrap();
        assert!(args.ignored.contains_key("foo_bar"));

        let options = args.options();
        assert!(options.iter().any(|(k, v)| k == "screen_type" && v == "\"vina\""));
        assert!(options.iter().all(|(k, _)| k != "foo_bar"));
    }

    #[test]
    fn test_non_mapping_config() {
        assert!(matches!(
            ScreenArgs::from_yaml_str("- vina\n- dock3\n"),
            Err(ConfigError::NotAMapping(_))
        ));
    }
}
