//! Engine Module
//!
//! The request orchestrator and the upstream collaborators it drives.

mod blend;
mod collaborators;
mod computation;

pub use blend::{blend_confidence, ml_weight, MIN_ML_WEIGHT};
pub use collaborators::{
    BaselineCompute, Collaborators, Compute, DataFetch, EntityData, HttpCompute, HttpDataFetch,
    PredictionContext, UnavailableDataFetch, COMPUTE, DATA_SOURCE, PREDICTION_SOURCE,
};
pub use computation::{
    entity_key, game_key, EngineSettings, PropComputationEngine, ENTITY_KEY_PREFIX,
    GAME_KEY_PREFIX,
};
