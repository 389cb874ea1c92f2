//! Append-only prediction history stored as CSV
//!
//! Each single-record prediction becomes one row: the feature columns in
//! mapping-table order followed by the prediction columns. The file is
//! opened, appended and closed per write with no locking; concurrent
//! writers can interleave rows.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::data::assemble::assemble_single;
use crate::data::errors::open_existing;
use crate::data::schema::{history_header, HISTORY_EXTRA_COLUMNS};
use crate::data::{ChurnError, ChurnResult, CustomerRecord};
use crate::ml::PredictionResult;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// One logged prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub record: CustomerRecord,
    pub prediction: String,
    pub probability: f64,
    pub time_of_prediction: NaiveDate,
    pub model_used: String,
}

impl HistoryEntry {
    pub fn new(
        record: CustomerRecord,
        result: &PredictionResult,
        model_used: impl Into<String>,
        time_of_prediction: NaiveDate,
    ) -> Self {
        Self {
            record,
            prediction: result.label.clone(),
            probability: result.probability,
            time_of_prediction,
            model_used: model_used.into(),
        }
    }

    fn to_csv_record(&self) -> Vec<String> {
        self.record
            .field_values()
            .into_iter()
            .chain([
                self.prediction.clone(),
                self.probability.to_string(),
                self.time_of_prediction.format(DATE_FORMAT).to_string(),
                self.model_used.clone(),
            ])
            .collect()
    }

    fn from_fields(fields: &HashMap<String, String>) -> ChurnResult<Self> {
        let [prediction_col, probability_col, date_col, model_col] = HISTORY_EXTRA_COLUMNS;
        let get = |name: &str| {
            fields
                .get(name)
                .map(|v| v.trim())
                .ok_or_else(|| ChurnError::MissingField(name.to_string()))
        };

        let probability_raw = get(probability_col)?;
        let date_raw = get(date_col)?;
        Ok(Self {
            record: assemble_single(fields)?,
            prediction: get(prediction_col)?.to_string(),
            probability: probability_raw
                .parse()
                .map_err(|_| ChurnError::invalid_value(probability_col, probability_raw))?,
            time_of_prediction: NaiveDate::parse_from_str(date_raw, DATE_FORMAT)
                .map_err(|_| ChurnError::invalid_value(date_col, date_raw))?,
            model_used: get(model_col)?.to_string(),
        })
    }
}

/// Usage of one model across the history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelUsage {
    pub model: String,
    pub predictions: usize,
    pub churn_predictions: usize,
    pub mean_probability: f64,
}

/// Aggregate view of the history file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistorySummary {
    pub total: usize,
    pub churn_predictions: usize,
    pub first_prediction: Option<NaiveDate>,
    pub last_prediction: Option<NaiveDate>,
    pub by_model: Vec<ModelUsage>,
}

impl HistorySummary {
    pub fn from_entries(entries: &[HistoryEntry]) -> Self {
        let mut per_model: BTreeMap<&str, (usize, usize, f64)> = BTreeMap::new();
        for entry in entries {
            let slot = per_model.entry(entry.model_used.as_str()).or_default();
            slot.0 += 1;
            if entry.prediction == "Yes" {
                slot.1 += 1;
            }
            slot.2 += entry.probability;
        }

        Self {
            total: entries.len(),
            churn_predictions: entries.iter().filter(|e| e.prediction == "Yes").count(),
            first_prediction: entries.iter().map(|e| e.time_of_prediction).min(),
            last_prediction: entries.iter().map(|e| e.time_of_prediction).max(),
            by_model: per_model
                .into_iter()
                .map(|(model, (count, churn, sum))| ModelUsage {
                    model: model.to_string(),
                    predictions: count,
                    churn_predictions: churn,
                    mean_probability: sum / count as f64,
                })
                .collect(),
        }
    }
}

/// History log backed by a single CSV file
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry, writing the header first when the file is new or empty
    pub fn append(&self, entry: &HistoryEntry) -> ChurnResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let needs_header = fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = csv::Writer::from_writer(file);
        if needs_header {
            writer.write_record(history_header())?;
            info!(path = %self.path.display(), "Created history file");
        }
        writer.write_record(entry.to_csv_record())?;
        writer.flush()?;

        debug!(
            model = %entry.model_used,
            prediction = %entry.prediction,
            "Appended history entry"
        );
        Ok(())
    }

    /// Every entry in append order
    pub fn read_all(&self) -> ChurnResult<Vec<HistoryEntry>> {
        let file = open_existing(&self.path, "history file")?;
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .from_reader(file);
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

        let mut entries = Vec::new();
        for record in reader.records() {
            let record = record?;
            let fields: HashMap<String, String> = headers
                .iter()
                .cloned()
                .zip(record.iter().map(str::to_string))
                .collect();
            entries.push(HistoryEntry::from_fields(&fields)?);
        }
        Ok(entries)
    }

    /// Most recent `limit` entries, oldest first
    pub fn read_recent(&self, limit: usize) -> ChurnResult<Vec<HistoryEntry>> {
        let mut entries = self.read_all()?;
        let skip = entries.len().saturating_sub(limit);
        Ok(entries.split_off(skip))
    }

    pub fn summary(&self) -> ChurnResult<HistorySummary> {
        Ok(HistorySummary::from_entries(&self.read_all()?))
    }
}
