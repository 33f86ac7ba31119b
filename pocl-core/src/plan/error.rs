use thiserror::Error;

use crate::landmarks::LandmarkError;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("landmark_layer flaw selection needs a landmark graph")]
    MissingLandmarks,
    #[error("landmark graph error: {0}")]
    Landmarks(#[from] LandmarkError),
}

pub type PlanResult<T> = std::result::Result<T, PlanError>;
