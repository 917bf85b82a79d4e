//! Reductions of multiple docking scores down to a single score

use serde::{Deserialize, Serialize};
use std::fmt;

/// How the poses of a single docking run are reduced to one score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Reduction {
    /// Best (lowest) pose score
    #[default]
    Best,

    /// Mean of the `k` best pose scores
    #[serde(alias = "mean")]
    Avg,

    /// Boltzmann-weighted average of the `k` best pose scores
    Boltzmann,
}

/// How the scores of one ligand against several receptors are reduced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReceptorReduction {
    /// Lowest score over all receptors
    #[default]
    #[serde(alias = "best")]
    Min,

    /// Mean of the `k` lowest receptor scores
    #[serde(alias = "mean")]
    Avg,

    /// Boltzmann-weighted average of the `k` lowest receptor scores
    Boltzmann,
}

impl Reduction {
    /// Reduce pose scores to a single value; NaN when no finite score remains
    pub fn reduce(self, scores: &[f64], k: usize) -> f64 {
        match self {
            Reduction::Best => best(scores),
            Reduction::Avg => average(&top_k(scores, k)),
            Reduction::Boltzmann => boltzmann(&top_k(scores, k)),
        }
    }
}

impl ReceptorReduction {
    /// Reduce per-receptor scores to a single value; NaN when no finite score remains
    pub fn reduce(self, scores: &[f64], k: usize) -> f64 {
        match self {
            ReceptorReduction::Min => best(scores),
            ReceptorReduction::Avg => average(&top_k(scores, k)),
            ReceptorReduction::Boltzmann => boltzmann(&top_k(scores, k)),
        }
    }
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reduction::Best => write!(f, "best"),
            Reduction::Avg => write!(f, "avg"),
            Reduction::Boltzmann => write!(f, "boltzmann"),
        }
    }
}

impl fmt::Display for ReceptorReduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReceptorReduction::Min => write!(f, "min"),
            ReceptorReduction::Avg => write!(f, "avg"),
            ReceptorReduction::Boltzmann => write!(f, "boltzmann"),
        }
    }
}

/// The `k` lowest non-NaN scores in ascending order (at least one when any exist)
fn top_k(scores: &[f64], k: usize) -> Vec<f64> {
    let mut finite: Vec<f64> = scores.iter().copied().filter(|s| !s.is_nan()).collect();
    finite.sort_by(|a, b| a.total_cmp(b));
    finite.truncate(k.max(1));
    finite
}

fn best(scores: &[f64]) -> f64 {
    scores
        .iter()
        .copied()
        .filter(|s| !s.is_nan())
        .min_by(|a, b| a.total_cmp(b))
        .unwrap_or(f64::NAN)
}

fn average(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return f64::NAN;
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}

fn boltzmann(scores: &[f64]) -> f64 {
    let Some(&min) = scores.iter().min_by(|a, b| a.total_cmp(b)) else {
        return f64::NAN;
    };

    // Shifted by the minimum so the weights cannot overflow
    let weights: Vec<f64> = scores.iter().map(|s| (-(s - min)).exp()).collect();
    let total: f64 = weights.iter().sum();

    scores
        .iter()
        .zip(&weights)
        .map(|(s, w)| s * w)
        .sum::<f64>()
        / total
}
