//! Read-only churn dataset used for exploration and the dashboard

use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use super::errors::{ChurnError, ChurnResult};
use super::record::{FeatureRow, FeatureValue};
use super::schema::{
    column_index_normalized, normalize_column_name, ColumnSelection, CHURN_COLUMN,
    CUSTOMER_ID_COLUMN, FEATURE_COLUMNS, FEATURE_COUNT,
};
use super::upload::RawTable;

/// One customer of the historical dataset
#[derive(Debug, Clone, Serialize)]
pub struct DatasetRow {
    pub customer_id: Option<String>,
    pub features: FeatureRow,
    /// Churn outcome ("Yes"/"No") when the dataset carries it
    pub churn: Option<String>,
}

impl DatasetRow {
    pub fn churned(&self) -> bool {
        self.churn
            .as_deref()
            .map(|c| c.eq_ignore_ascii_case("yes"))
            .unwrap_or(false)
    }
}

/// Churn dataset loaded in full
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChurnDataset {
    pub rows: Vec<DatasetRow>,
}

impl ChurnDataset {
    /// Load the dataset CSV; a missing file is reported, not created
    pub fn load(path: &Path) -> ChurnResult<Self> {
        if !path.exists() {
            return Err(ChurnError::missing_resource("dataset", path));
        }
        let table = RawTable::from_csv_path(path)?;
        let dataset = Self::from_table(&table)?;
        info!(path = %path.display(), rows = dataset.len(), "Loaded churn dataset");
        Ok(dataset)
    }

    /// Build from a raw table. The pandas index column (`Unnamed: 0` or an
    /// empty header) is dropped; identifier and target are kept aside.
    pub fn from_table(table: &RawTable) -> ChurnResult<Self> {
        let normalized: Vec<String> = table
            .headers
            .iter()
            .map(|h| normalize_column_name(h))
            .collect();

        let find = |name: &str| {
            let key = normalize_column_name(name);
            normalized.iter().position(|h| *h == key)
        };
        let id_position = find(CUSTOMER_ID_COLUMN);
        let churn_position = find(CHURN_COLUMN);

        let mut positions: [Option<usize>; FEATURE_COUNT] = [None; FEATURE_COUNT];
        for (pos, header) in normalized.iter().enumerate() {
            if header.is_empty() || header.starts_with("unnamed") {
                continue;
            }
            if let Some(idx) = column_index_normalized(header) {
                if positions[idx].is_none() {
                    positions[idx] = Some(pos);
                }
            }
        }

        let missing: Vec<&str> = FEATURE_COLUMNS
            .iter()
            .zip(positions.iter())
            .filter(|(_, pos)| pos.is_none())
            .map(|(c, _)| c.name)
            .collect();
        if !missing.is_empty() {
            return Err(ChurnError::SchemaMismatch(format!(
                "dataset is missing columns: {}",
                missing.join(", ")
            )));
        }

        let mut rows = Vec::with_capacity(table.rows.len());
        let mut unparsable = 0usize;
        for raw in &table.rows {
            let cell = |pos: usize| raw.get(pos).map(|v| v.trim()).unwrap_or("");
            let mut values = Vec::with_capacity(FEATURE_COUNT);
            for (column, pos) in FEATURE_COLUMNS.iter().zip(positions.iter()) {
                let value = pos.map(cell).unwrap_or("");
                if column.kind.is_numeric() {
                    let parsed = value.parse::<f64>().ok().filter(|v| v.is_finite());
                    if parsed.is_none() {
                        unparsable += 1;
                    }
                    values.push(FeatureValue::Number(parsed));
                } else {
                    values.push(FeatureValue::Category(value.to_string()));
                }
            }
            rows.push(DatasetRow {
                customer_id: id_position.map(|p| cell(p).to_string()),
                features: FeatureRow::from_values(values)?,
                churn: churn_position
                    .map(|p| cell(p).to_string())
                    .filter(|c| !c.is_empty()),
            });
        }

        if unparsable > 0 {
            warn!(unparsable, "Dataset contains non-numeric values in numeric columns");
        }

        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Header and stringified cells for the selected columns
    pub fn select(&self, selection: ColumnSelection) -> (Vec<&'static str>, Vec<Vec<String>>) {
        let columns = selection.columns();
        let indices: Vec<usize> = columns
            .iter()
            .filter_map(|c| column_index_normalized(c))
            .collect();
        let cells = self
            .rows
            .iter()
            .map(|row| {
                indices
                    .iter()
                    .map(|&idx| row.features.values()[idx].to_string())
                    .collect()
            })
            .collect();
        (columns, cells)
    }

    /// Distinct values of a categorical column, in first-seen order
    pub fn unique_values(&self, column: &str) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for row in &self.rows {
            if let Some(value) = row.features.category(column) {
                if !seen.iter().any(|s| s == value) {
                    seen.push(value.to_string());
                }
            }
        }
        seen
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE_DATASET: &str = "\
,customerID,gender,SeniorCitizen,Partner,Dependents,tenure,PhoneService,MultipleLines,InternetService,OnlineSecurity,OnlineBackup,DeviceProtection,TechSupport,StreamingTV,StreamingMovies,Contract,PaperlessBilling,PaymentMethod,MonthlyCharges,TotalCharges,Churn
0,7590-VHVEG,Female,No,Yes,No,1,No,No,DSL,No,Yes,No,No,No,No,Month-to-month,Yes,Electronic check,29.85,29.85,No
1,5575-GNVDE,Male,No,No,No,34,Yes,No,DSL,Yes,No,Yes,No,No,No,One year,No,Mailed check,56.95,1889.5,No
2,3668-QPYBK,Male,No,No,No,2,Yes,No,DSL,Yes,Yes,No,No,No,No,Month-to-month,Yes,Mailed check,53.85,108.15,Yes
3,7795-CFOCW,Male,No,No,No,45,No,No,DSL,Yes,No,Yes,Yes,No,No,One year,No,Bank transfer (automatic),42.3,1840.75,No
4,9237-HQITU,Female,No,No,No,2,Yes,No,Fiber optic,No,No,No,No,No,No,Month-to-month,Yes,Electronic check,70.7,151.65,Yes
5,4190-MFLUW,Female,No,Yes,Yes,0,Yes,No,DSL,No,No,Yes,Yes,No,No,Two year,No,Credit card (automatic),56.05,,No
";

    pub(crate) fn sample_dataset() -> ChurnDataset {
        let table = RawTable::from_csv_reader(SAMPLE_DATASET.as_bytes()).unwrap();
        ChurnDataset::from_table(&table).unwrap()
    }

    #[test]
    fn test_loads_and_keeps_target_aside() {
        let dataset = sample_dataset();
        assert_eq!(dataset.len(), 6);
        assert_eq!(dataset.rows[2].customer_id.as_deref(), Some("3668-QPYBK"));
        assert!(dataset.rows[2].churned());
        assert!(!dataset.rows[0].churned());
        assert_eq!(dataset.rows[5].features.number("TotalCharges"), None);
    }

    #[test]
    fn test_non_finite_numbers_are_missing() {
        let data = SAMPLE_DATASET
            .replace(",29.85,29.85,No", ",NaN,inf,No")
            .replace(",70.7,151.65,Yes", ",70.7,-inf,Yes");
        let table = RawTable::from_csv_reader(data.as_bytes()).unwrap();
        let dataset = ChurnDataset::from_table(&table).unwrap();

        assert_eq!(dataset.rows[0].features.number("MonthlyCharges"), None);
        assert_eq!(dataset.rows[0].features.number("TotalCharges"), None);
        assert_eq!(dataset.rows[4].features.number("TotalCharges"), None);
        assert_eq!(dataset.rows[4].features.number("MonthlyCharges"), Some(70.7));
    }

    #[test]
    fn test_select_numeric_columns() {
        let dataset = sample_dataset();
        let (columns, cells) = dataset.select(ColumnSelection::Numeric);
        assert_eq!(columns, vec!["tenure", "MonthlyCharges", "TotalCharges"]);
        assert_eq!(cells[1], vec!["34", "56.95", "1889.5"]);
        assert_eq!(cells[5][2], "");
    }

    #[test]
    fn test_unique_values() {
        let dataset = sample_dataset();
        assert_eq!(dataset.unique_values("gender"), vec!["Female", "Male"]);
        assert_eq!(dataset.unique_values("Contract").len(), 3);
    }

    #[test]
    fn test_missing_dataset_is_reported() {
        let err = ChurnDataset::load(Path::new("/no/such/churn.csv")).unwrap_err();
        assert!(matches!(err, ChurnError::MissingResource { .. }));
    }
}
