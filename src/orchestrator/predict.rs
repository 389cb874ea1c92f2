//! Prediction orchestrator
//! Runs one interaction end to end: assemble → infer → log

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use serde::Serialize;
use tracing::{info, warn};

use super::session::Session;
use crate::config::Config;
use crate::data::schema::{CUSTOMER_ID_COLUMN, FEATURE_COLUMNS};
use crate::data::{
    assemble_bulk, assemble_single, ChurnDataset, ChurnError, ChurnResult, CustomerRecord,
    FeatureRow, RawTable,
};
use crate::history::{HistoryEntry, HistoryLog, HistorySummary};
use crate::ml::{predict_batch, predict_one, ModelKind, ModelRegistry, PredictionResult};

/// Outcome of a single-record prediction
#[derive(Debug, Clone, Serialize)]
pub struct SinglePrediction {
    pub model: ModelKind,
    pub result: PredictionResult,
    pub entry: HistoryEntry,
}

/// One scored row of a bulk upload
#[derive(Debug, Clone, Serialize)]
pub struct BulkRow {
    pub customer_id: Option<String>,
    pub features: FeatureRow,
    #[serde(rename = "Churn")]
    pub churn: String,
    pub probability: f64,
}

/// Outcome of a bulk upload
#[derive(Debug, Clone, Serialize)]
pub struct BulkPrediction {
    pub model: ModelKind,
    pub rows: Vec<BulkRow>,
    pub coerced_cells: usize,
    pub ignored_columns: Vec<String>,
}

impl BulkPrediction {
    pub fn churn_count(&self) -> usize {
        self.rows.iter().filter(|r| r.churn == "Yes").count()
    }

    /// Write the scored rows: customer id when present, features, Churn, probability
    pub fn write_csv(&self, path: &Path) -> ChurnResult<()> {
        let with_ids = self.rows.iter().any(|r| r.customer_id.is_some());
        let mut writer = csv::Writer::from_path(path)?;

        let mut header: Vec<&str> = Vec::new();
        if with_ids {
            header.push(CUSTOMER_ID_COLUMN);
        }
        header.extend(FEATURE_COLUMNS.iter().map(|c| c.name));
        header.extend(["Churn", "probability"]);
        writer.write_record(&header)?;

        for row in &self.rows {
            let mut record: Vec<String> = Vec::with_capacity(header.len());
            if with_ids {
                record.push(row.customer_id.clone().unwrap_or_default());
            }
            record.extend(row.features.values().iter().map(|v| v.to_string()));
            record.push(row.churn.clone());
            record.push(format!("{:.2}", row.probability));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Coordinates the registry, the history log and the dataset for sessions
pub struct PredictionOrchestrator {
    registry: Arc<ModelRegistry>,
    history: HistoryLog,
    dataset_path: PathBuf,
    default_model: ModelKind,
}

impl PredictionOrchestrator {
    pub fn new(
        registry: Arc<ModelRegistry>,
        history: HistoryLog,
        dataset_path: impl Into<PathBuf>,
        default_model: ModelKind,
    ) -> Self {
        Self {
            registry,
            history,
            dataset_path: dataset_path.into(),
            default_model,
        }
    }

    pub fn from_config(config: &Config, registry: Arc<ModelRegistry>) -> ChurnResult<Self> {
        let default_model = config.models.default_model.parse()?;
        Ok(Self::new(
            registry,
            HistoryLog::new(config.paths.history.clone()),
            config.paths.dataset.clone(),
            default_model,
        ))
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn default_model(&self) -> ModelKind {
        self.default_model
    }

    /// Fresh authenticated session on the default model
    pub fn session_for(&self, username: impl Into<String>) -> Session {
        Session::authenticated(username, self.default_model)
    }

    /// Predict from raw form fields keyed by column name
    pub fn predict_single(
        &self,
        session: &mut Session,
        raw_fields: &HashMap<String, String>,
    ) -> ChurnResult<SinglePrediction> {
        session.require_authenticated()?;
        let record = assemble_single(raw_fields)?;
        self.predict_record(session, record)
    }

    /// Predict an already typed record
    pub fn predict_record(
        &self,
        session: &mut Session,
        record: CustomerRecord,
    ) -> ChurnResult<SinglePrediction> {
        self.predict_record_on(session, record, Local::now().date_naive())
    }

    /// Predict and log with an explicit prediction date
    pub fn predict_record_on(
        &self,
        session: &mut Session,
        record: CustomerRecord,
        date: NaiveDate,
    ) -> ChurnResult<SinglePrediction> {
        let user = session.require_authenticated()?.to_string();
        let model = session.selected_model;
        record.validate()?;

        let encoder = self.registry.get_label_encoder()?;
        let pipeline = self.registry.get_pipeline(model)?;
        let result = predict_one(pipeline.as_ref(), &encoder, &record)?;

        let entry = HistoryEntry::new(record, &result, model.display_name(), date);
        self.history.append(&entry)?;

        info!(
            user = %user,
            model = %model,
            prediction = %result.label,
            probability = %result.probability_display(),
            "Single prediction logged"
        );
        session.last_prediction = Some(result.clone());

        Ok(SinglePrediction {
            model,
            result,
            entry,
        })
    }

    /// Score an uploaded CSV or spreadsheet. Bulk results are not logged.
    pub fn predict_bulk(&self, session: &Session, upload: &Path) -> ChurnResult<BulkPrediction> {
        session.require_authenticated()?;
        let table = RawTable::from_path(upload)?;
        self.predict_bulk_table(session, &table)
    }

    pub fn predict_bulk_table(
        &self,
        session: &Session,
        table: &RawTable,
    ) -> ChurnResult<BulkPrediction> {
        let user = session.require_authenticated()?;
        let model = session.selected_model;
        let bulk = assemble_bulk(table)?;

        let encoder = self.registry.get_label_encoder()?;
        let pipeline = self.registry.get_pipeline(model)?;
        let results = predict_batch(pipeline.as_ref(), &encoder, &bulk.rows)?;

        let ids = bulk.customer_ids.clone();
        let rows: Vec<BulkRow> = bulk
            .rows
            .into_iter()
            .zip(results)
            .enumerate()
            .map(|(i, (features, result))| BulkRow {
                customer_id: ids.as_ref().and_then(|ids| ids.get(i).cloned()),
                features,
                churn: result.label,
                probability: result.probability,
            })
            .collect();

        if bulk.coerced_cells > 0 {
            warn!(
                coerced_cells = bulk.coerced_cells,
                "Bulk upload scored with missing numeric values"
            );
        }
        info!(user = %user, model = %model, rows = rows.len(), "Bulk prediction completed");

        Ok(BulkPrediction {
            model,
            rows,
            coerced_cells: bulk.coerced_cells,
            ignored_columns: bulk.ignored_columns,
        })
    }

    pub fn load_dataset(&self, session: &Session) -> ChurnResult<ChurnDataset> {
        session.require_authenticated()?;
        ChurnDataset::load(&self.dataset_path)
    }

    pub fn read_history(&self, session: &Session) -> ChurnResult<Vec<HistoryEntry>> {
        session.require_authenticated()?;
        self.history.read_all()
    }

    pub fn history_summary(&self, session: &Session) -> ChurnResult<HistorySummary> {
        session.require_authenticated()?;
        self.history.summary()
    }

    /// Resolve a model name for this session, keeping the current one when absent
    pub fn select_model(&self, session: &mut Session, name: Option<&str>) -> ChurnResult<ModelKind> {
        if let Some(name) = name {
            let kind: ModelKind = name.parse()?;
            session.select_model(kind);
        }
        if !self.registry.available_models().contains(&session.selected_model) {
            return Err(ChurnError::missing_resource(
                format!("{} artifact", session.selected_model),
                self.registry
                    .artifact_path(session.selected_model)
                    .unwrap_or_else(|| Path::new("")),
            ));
        }
        Ok(session.selected_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::record::tests::sample_record;
    use crate::ml::pipeline::tests::logistic_pipeline;
    use tempfile::{tempdir, TempDir};

    fn orchestrator() -> (TempDir, PredictionOrchestrator) {
        let dir = tempdir().unwrap();
        let gb = dir.path().join("gb.json");
        logistic_pipeline().save(&gb).unwrap();
        let registry = ModelRegistry::new(
            HashMap::from([(ModelKind::GradientBoosting, gb)]),
            dir.path().join("label_encoder.json"),
            true,
        );
        let orchestrator = PredictionOrchestrator::new(
            Arc::new(registry),
            HistoryLog::new(dir.path().join("history.csv")),
            dir.path().join("churn.csv"),
            ModelKind::GradientBoosting,
        );
        (dir, orchestrator)
    }

    #[test]
    fn test_single_prediction_is_logged() {
        let (_dir, orchestrator) = orchestrator();
        let mut session = orchestrator.session_for("ada");
        let outcome = orchestrator.predict_record(&mut session, sample_record()).unwrap();

        assert_eq!(outcome.entry.model_used, "Gradient Boosting");
        assert_eq!(session.last_prediction.as_ref(), Some(&outcome.result));
        let history = orchestrator.read_history(&session).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].prediction, outcome.result.label);
    }

    #[test]
    fn test_unauthenticated_session_is_refused() {
        let (_dir, orchestrator) = orchestrator();
        let mut session = Session::anonymous(ModelKind::GradientBoosting);
        let err = orchestrator
            .predict_record(&mut session, sample_record())
            .unwrap_err();
        assert!(matches!(err, ChurnError::Unauthenticated(_)));
        assert!(!orchestrator.history().path().exists());
    }

    #[test]
    fn test_invalid_record_is_not_logged() {
        let (_dir, orchestrator) = orchestrator();
        let mut session = orchestrator.session_for("ada");
        let mut record = sample_record();
        record.total_charges = -1.0;

        let err = orchestrator.predict_record(&mut session, record).unwrap_err();
        assert!(matches!(err, ChurnError::InvalidValue { .. }));
        assert!(session.last_prediction.is_none());
        assert!(!orchestrator.history().path().exists());
    }

    #[test]
    fn test_unconfigured_model_is_missing() {
        let (_dir, orchestrator) = orchestrator();
        let mut session = orchestrator.session_for("ada");
        assert!(orchestrator
            .select_model(&mut session, Some("Random Forest"))
            .is_err());
        assert!(matches!(
            orchestrator.select_model(&mut session, Some("Deep Net")),
            Err(ChurnError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_bulk_prediction_keeps_ids_and_skips_history() {
        let (dir, orchestrator) = orchestrator();
        let session = orchestrator.session_for("ada");
        let record = sample_record();
        let values = record.field_values().join(",");
        let header = FEATURE_COLUMNS
            .iter()
            .map(|c| c.name.to_lowercase())
            .collect::<Vec<_>>()
            .join(",");
        let csv = format!(
            "CustomerID,{}\nA-1,{}\nA-2,{}\n",
            header,
            values,
            values.replace(",70.35,70.35", ",70.35, ")
        );
        let table = RawTable::from_csv_reader(csv.as_bytes()).unwrap();

        let bulk = orchestrator.predict_bulk_table(&session, &table).unwrap();
        assert_eq!(bulk.rows.len(), 2);
        assert_eq!(bulk.coerced_cells, 1);
        assert_eq!(bulk.rows[1].customer_id.as_deref(), Some("A-2"));
        assert!(!orchestrator.history().path().exists());

        let out = dir.path().join("scored.csv");
        bulk.write_csv(&out).unwrap();
        let written = std::fs::read_to_string(out).unwrap();
        assert!(written.starts_with("customerID,gender"));
        assert_eq!(written.lines().count(), 3);
    }
}
