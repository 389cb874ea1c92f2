//! Orchestrator module for running user interactions
//! Combines sessions, the model registry, feature assembly and the history log

pub mod predict;
pub mod session;

// Re-export main orchestrator types
pub use predict::{BulkPrediction, BulkRow, PredictionOrchestrator, SinglePrediction};
pub use session::{Session, LOGIN_REQUIRED};
