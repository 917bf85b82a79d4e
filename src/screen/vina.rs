//! Generic virtual screen over the AutoDock Vina family of docking programs

use log::{debug, info, warn};
use nalgebra::Vector3;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use crate::args::GenericParams;
use crate::io::{autobox, copy_tree, parse_coordinates, parse_pose_scores};
use crate::screen::metadata::Metadata;
use crate::screen::reduction::{ReceptorReduction, Reduction};
use crate::screen::{run_command, ScreenError, ScreenResult, VirtualScreen};

/// Virtual screen docking every ligand against one or more receptors
pub struct VinaScreen {
    screen_type: String,
    metadata: Metadata,
    receptors: Vec<PathBuf>,
    center: Vector3<f64>,
    size: Vector3<f64>,
    base_name: String,
    path: PathBuf,
    reduction: Reduction,
    receptor_reduction: ReceptorReduction,
    k: usize,
    pool: ThreadPool,
    scratch: TempDir,
    num_ligands: usize,
    results: Vec<ScreenResult>,
    verbose: u8,
}

impl VinaScreen {
    /// Create a screen, preparing receptors and the docking box
    pub fn new(params: GenericParams, verbose: u8) -> Result<Self, ScreenError> {
        fs::create_dir_all(&params.path)?;
        let scratch = tempfile::Builder::new().prefix("vina-").tempdir()?;
        fs::create_dir_all(scratch.path().join("inputs"))?;
        fs::create_dir_all(scratch.path().join("outputs"))?;

        let mut sources = params.receptors.clone();
        for pdbid in &params.pdbids {
            let pdb = params.path.join(format!("{}.pdb", pdbid));
            if !pdb.is_file() {
                return Err(ScreenError::InvalidSetup(format!(
                    "structure for PDB id {} must be placed at {}",
                    pdbid,
                    pdb.display()
                )));
            }
            sources.push(pdb);
        }

        let receptors = sources
            .iter()
            .enumerate()
            .map(|(i, source)| prepare_receptor(i, source, &params.metadata.obabel, scratch.path()))
            .collect::<Result<Vec<_>, _>>()?;

        let (center, size) = match (&params.docked_ligand_file, params.center) {
            (Some(ligand), _) => {
                let coordinates = parse_coordinates(ligand)?;
                autobox(&coordinates, params.buffer).ok_or_else(|| {
                    ScreenError::InvalidSetup(format!("no atoms in {}", ligand.display()))
                })?
            }
            (None, Some(center)) => (center, params.size),
            (None, None) => {
                return Err(ScreenError::InvalidSetup(
                    "either a box center or a docked ligand file is required".to_string(),
                ))
            }
        };

        let pool = ThreadPoolBuilder::new().num_threads(params.ncpu).build()?;

        info!(
            "{} screen with {} receptor(s), box center ({:.3}, {:.3}, {:.3}), size ({:.3}, {:.3}, {:.3})",
            params.metadata.software,
            receptors.len(),
            center.x,
            center.y,
            center.z,
            size.x,
            size.y,
            size.z
        );

        Ok(Self {
            screen_type: params.metadata.software.to_string(),
            metadata: params.metadata,
            receptors,
            center,
            size,
            base_name: params.base_name,
            path: params.path,
            reduction: params.reduction,
            receptor_reduction: params.receptor_reduction,
            k: params.k,
            pool,
            scratch,
            num_ligands: 0,
            results: Vec::new(),
            verbose,
        })
    }

    /// Prepared receptor files
    pub fn receptors(&self) -> &[PathBuf] {
        &self.receptors
    }

    /// Docking box center and size
    pub fn docking_box(&self) -> (Vector3<f64>, Vector3<f64>) {
        (self.center, self.size)
    }

    fn dock_ligand(&self, smi: &str, name: &str) -> f64 {
        match self.try_dock_ligand(smi, name) {
            Ok(score) => score,
            Err(e) => {
                warn!("Failed to dock {} ({}): {}", name, smi, e);
                f64::NAN
            }
        }
    }

    fn try_dock_ligand(&self, smi: &str, name: &str) -> Result<f64, ScreenError> {
        let ligand = self
            .scratch
            .path()
            .join("inputs")
            .join(format!("{}.pdbqt", name));
        run_command(
            Command::new(&self.metadata.obabel)
                .arg(format!("-:{}", smi))
                .arg("--gen3d")
                .arg("-opdbqt")
                .arg("-O")
                .arg(&ligand),
        )?;

        let mut receptor_scores = Vec::with_capacity(self.receptors.len());
        for (i, receptor) in self.receptors.iter().enumerate() {
            let score = match self.dock_pose(&ligand, i, receptor, name) {
                Ok(poses) => self.reduction.reduce(&poses, self.k),
                Err(e) => {
                    warn!(
                        "Docking {} against {} failed: {}",
                        name,
                        receptor.display(),
                        e
                    );
                    f64::NAN
                }
            };
            receptor_scores.push(score);
        }

        Ok(self.receptor_reduction.reduce(&receptor_scores, self.k))
    }

    /// Dock one prepared ligand against the `index`-th receptor, returning its pose scores
    fn dock_pose(
        &self,
        ligand: &Path,
        index: usize,
        receptor: &Path,
        name: &str,
    ) -> Result<Vec<f64>, ScreenError> {
        let out = self
            .scratch
            .path()
            .join("outputs")
            .join(format!("{}_receptor_{}.pdbqt", name, index));

        let mut command = Command::new(&self.metadata.executable);
        command
            .arg("--receptor")
            .arg(receptor)
            .arg("--ligand")
            .arg(ligand)
            .arg("--center_x")
            .arg(self.center.x.to_string())
            .arg("--center_y")
            .arg(self.center.y.to_string())
            .arg("--center_z")
            .arg(self.center.z.to_string())
            .arg("--size_x")
            .arg(self.size.x.to_string())
            .arg("--size_y")
            .arg(self.size.y.to_string())
            .arg("--size_z")
            .arg(self.size.z.to_string())
            .arg("--exhaustiveness")
            .arg(self.metadata.exhaustiveness.to_string())
            .arg("--num_modes")
            .arg(self.metadata.num_modes.to_string())
            .arg("--energy_range")
            .arg(self.metadata.energy_range.to_string())
            .arg("--cpu")
            .arg("1")
            .arg("--out")
            .arg(&out)
            .args(&self.metadata.extra_args);

        let output = run_command(&mut command)?;
        if self.verbose > 1 {
            debug!("{}", String::from_utf8_lossy(&output.stdout));
        }

        let poses = parse_pose_scores(&out)?;
        if poses.is_empty() {
            return Err(ScreenError::InvalidSetup(format!(
                "no poses in {}",
                out.display()
            )));
        }

        Ok(poses)
    }
}

impl VirtualScreen for VinaScreen {
    fn name(&self) -> &str {
        &self.screen_type
    }

    fn screen(&mut self, smis: &[String]) -> Result<Vec<f64>, ScreenError> {
        let offset = self.num_ligands;
        let names: Vec<String> = (0..smis.len())
            .map(|i| format!("{}_{}", self.base_name, offset + i))
            .collect();

        if self.verbose > 0 {
            info!("Docking {} ligands", smis.len());
        }

        let this = &*self;
        let scores: Vec<f64> = this.pool.install(|| {
            smis.par_iter()
                .zip(names.par_iter())
                .map(|(smi, name)| this.dock_ligand(smi, name))
                .collect()
        });

        self.num_ligands += smis.len();
        self.results.extend(
            smis.iter()
                .zip(names)
                .zip(&scores)
                .map(|((smi, name), score)| ScreenResult {
                    smiles: smi.clone(),
                    compound_id: name,
                    score: *score,
                }),
        );

        Ok(scores)
    }

    fn results(&self) -> &[ScreenResult] {
        &self.results
    }

    fn collect_files(&mut self) -> Result<(), ScreenError> {
        info!("Collecting docking files into {}", self.path.display());
        copy_tree(self.scratch.path(), &self.path)?;
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// Convert a receptor to PDBQT unless it already is one.
///
/// Converted files are prefixed with the receptor's index so that receptors
/// sharing a file name stay distinct.
fn prepare_receptor(
    index: usize,
    source: &Path,
    obabel: &Path,
    scratch: &Path,
) -> Result<PathBuf, ScreenError> {
    if !source.is_file() {
        return Err(ScreenError::InvalidSetup(format!(
            "receptor not found: {}",
            source.display()
        )));
    }

    let is_pdbqt = source
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdbqt"));
    if is_pdbqt {
        return Ok(source.to_path_buf());
    }

    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("receptor");
    let prepared = scratch
        .join("inputs")
        .join(format!("receptor_{}_{}.pdbqt", index, stem));
    info!(
        "Preparing receptor {} -> {}",
        source.display(),
        prepared.display()
    );
    run_command(
        Command::new(obabel)
            .arg(source)
            .arg("-xr")
            .arg("-opdbqt")
            .arg("-O")
            .arg(&prepared),
    )?;

    Ok(prepared)
}
