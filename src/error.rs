use std::path::PathBuf;

use thiserror::Error;

use crate::forecaster::ModelId;
use crate::team::TeamId;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("insufficient training data: {usable} matches with known goals")]
    InsufficientData { usable: usize },

    #[error("team {team} not found in {model} model parameters")]
    TeamNotFound { model: ModelId, team: TeamId },

    #[error("no trained ratings artifact in {}", .dir.display())]
    ModelNotTrained { dir: PathBuf },

    #[error("optimizer did not converge after {iterations} iterations (gradient norm {grad_norm:.3e})")]
    NotConverged { iterations: usize, grad_norm: f64 },

    #[error("objective is not finite at the starting point")]
    NonFiniteObjective,
}

impl ModelError {
    pub fn is_team_not_found(&self) -> bool {
        matches!(self, ModelError::TeamNotFound { .. })
    }
}
