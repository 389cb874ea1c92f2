// Churnwatch - Customer Churn Prediction Service
// Serves pre-trained churn classifiers over a CLI and a JSON API, keeping an
// append-only log of every single-customer prediction.

#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
pub mod dashboard;
pub mod data;
pub mod history;
pub mod ml;
pub mod orchestrator;
pub mod server;

// Re-export commonly used items
pub use config::Config;
pub use data::{ChurnError, ChurnResult, CustomerRecord, FeatureRow};
pub use history::{HistoryEntry, HistoryLog};
pub use ml::{ModelKind, ModelRegistry, PredictionResult};
pub use orchestrator::{PredictionOrchestrator, Session};
