//! Main executable for dockobj

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use log::info;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use dockobj::io::read_smiles;
use dockobj::{DockingObjective, Objective, ObjectiveOptions, ScreenArgs};

/// Command-line arguments for the application
#[derive(Parser, Debug)]
#[clap(
    name = "dockobj",
    version = dockobj::VERSION,
    about = "Score molecules by docking them with an external virtual-screening engine"
)]
struct Cli {
    /// Increase logging verbosity (repeatable)
    #[clap(long, short, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Score a file of SMILES strings
    Score {
        /// Screen config file
        #[clap(long, short, value_parser)]
        config: PathBuf,

        /// Newline-delimited file of SMILES strings
        #[clap(long, value_parser)]
        smiles: PathBuf,

        /// Directory under which docking inputs and outputs are collected
        #[clap(long, value_parser, default_value = ".")]
        path: PathBuf,

        /// Maximize the objective instead of minimizing it
        #[clap(long)]
        maximize: bool,

        /// Output CSV file for the scores (stdout if omitted)
        #[clap(long, short, value_parser)]
        out: Option<PathBuf>,

        /// Extra objective options (key=value), accepted and ignored
        #[clap(long = "objective-option", value_parser = parse_key_value)]
        objective_options: Vec<(String, String)>,
    },

    /// Print the options parsed from a config file
    Options {
        /// Screen config file
        #[clap(long, short, value_parser)]
        config: PathBuf,

        /// Directory the resolved screen would collect its files under
        #[clap(long, value_parser, default_value = ".")]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger; RUST_LOG still takes precedence
    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match cli.command {
        Commands::Score {
            config,
            smiles,
            path,
            maximize,
            out,
            objective_options,
        } => {
            let smis = read_smiles(&smiles)
                .with_context(|| format!("Failed to read SMILES file: {}", smiles.display()))?;
            info!("Loaded {} SMILES from {}", smis.len(), smiles.display());

            let options = ObjectiveOptions {
                objective_config: config.clone(),
                path,
                verbose: cli.verbose,
                minimize: !maximize,
                extra: objective_options.into_iter().collect::<BTreeMap<_, _>>(),
            };
            let mut objective = DockingObjective::new(options).with_context(|| {
                format!("Failed to build docking objective from {}", config.display())
            })?;

            let scores = objective.forward(&smis).context("Docking failed")?;

            let mut writer: Box<dyn Write> = match &out {
                Some(out_path) => Box::new(File::create(out_path).with_context(|| {
                    format!("Failed to create output file: {}", out_path.display())
                })?),
                None => Box::new(std::io::stdout().lock()),
            };
            writeln!(writer, "smiles,score")?;
            // Input order, one row per unique SMILES
            let mut written = std::collections::HashSet::new();
            for smi in &smis {
                if !written.insert(smi.as_str()) {
                    continue;
                }
                match scores.get(smi).copied().flatten() {
                    Some(score) => writeln!(writer, "{},{}", smi, score)?,
                    None => writeln!(writer, "{},", smi)?,
                }
            }
            writer.flush()?;

            let extended = objective.finish().context("Failed to collect docking results")?;
            info!("Detailed results written to {}", extended.display());
        }

        Commands::Options { config, path } => {
            let args = ScreenArgs::from_file(&config)
                .with_context(|| format!("Failed to read config file: {}", config.display()))?;

            for (key, value) in args.options() {
                println!("{}: {}", key, value);
            }

            let resolved = args
                .resolve(&path)
                .with_context(|| format!("Invalid screen configuration in {}", config.display()))?;
            println!("{}", serde_json::to_string_pretty(&resolved)?);
        }
    }

    Ok(())
}

/// Parse a `key=value` pair
fn parse_key_value(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| format!("expected key=value, got `{}`", s))
}
