//! dockobj: docking scores as an objective function for molecular active learning
//!
//! This library wraps external virtual-screening engines (the DOCK3.8 cluster
//! pipeline and the AutoDock Vina family) behind a single scoring call that
//! maps SMILES strings to signed docking scores.

pub mod args;
pub mod io;
pub mod objective;
pub mod screen;

// Re-export commonly used types and functions
pub use args::{ScreenArgs, ScreenConfig};
pub use objective::{DockingObjective, Objective, ObjectiveError, ObjectiveOptions, Scores};
pub use screen::{ScreenResult, VirtualScreen};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type for operations that can fail
pub type Result<T> = std::result::Result<T, ObjectiveError>;
