//! Data layer: the feature schema, customer records, uploads, the churn
//! dataset, and the error taxonomy shared by the whole pipeline

pub mod assemble;
pub mod dataset;
pub mod errors;
pub mod record;
pub mod schema;
pub mod upload;

// Re-export commonly used types
pub use assemble::{assemble_bulk, assemble_single, BulkTable};
pub use dataset::{ChurnDataset, DatasetRow};
pub use errors::{ChurnError, ChurnResult, ErrorCategory};
pub use record::{
    Contract, CustomerRecord, FeatureRow, FeatureValue, Gender, InternetService, PaymentMethod,
    YesNo,
};
pub use schema::{ColumnKind, ColumnSelection, FeatureColumn, FEATURE_COLUMNS};
pub use upload::{RawTable, UploadFormat};
