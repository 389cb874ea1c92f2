//! Feature assembly
//!
//! Converts raw form fields or an uploaded table into the exact column layout
//! the model pipelines were fit on. All column lookups go through the mapping
//! table in `schema`.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use super::errors::{ChurnError, ChurnResult};
use super::record::{CustomerRecord, FeatureRow, FeatureValue};
use super::schema::{
    column_index_normalized, normalize_column_name, FEATURE_COLUMNS, FEATURE_COUNT,
    CUSTOMER_ID_COLUMN,
};
use super::upload::RawTable;

/// Build a `CustomerRecord` from raw form fields keyed by exact column name.
///
/// Every field is required; a missing key is a contract violation rather
/// than a recoverable user error.
pub fn assemble_single(raw_fields: &HashMap<String, String>) -> ChurnResult<CustomerRecord> {
    let field = |name: &str| required(raw_fields, name);

    let tenure_raw = field("tenure")?;
    let tenure = tenure_raw
        .trim()
        .parse::<u32>()
        .map_err(|_| ChurnError::invalid_value("tenure", tenure_raw))?;

    let record = CustomerRecord {
        gender: field("gender")?.parse()?,
        senior_citizen: field("SeniorCitizen")?.parse()?,
        partner: field("Partner")?.parse()?,
        dependents: field("Dependents")?.parse()?,
        tenure,
        phone_service: field("PhoneService")?.parse()?,
        multiple_lines: field("MultipleLines")?.parse()?,
        internet_service: field("InternetService")?.parse()?,
        online_security: field("OnlineSecurity")?.parse()?,
        online_backup: field("OnlineBackup")?.parse()?,
        device_protection: field("DeviceProtection")?.parse()?,
        tech_support: field("TechSupport")?.parse()?,
        streaming_tv: field("StreamingTV")?.parse()?,
        streaming_movies: field("StreamingMovies")?.parse()?,
        contract: field("Contract")?.parse()?,
        paperless_billing: field("PaperlessBilling")?.parse()?,
        payment_method: field("PaymentMethod")?.parse()?,
        monthly_charges: parse_charge("MonthlyCharges", field("MonthlyCharges")?)?,
        total_charges: parse_charge("TotalCharges", field("TotalCharges")?)?,
    };
    record.validate()?;

    Ok(record)
}

fn required<'a>(raw_fields: &'a HashMap<String, String>, name: &str) -> ChurnResult<&'a str> {
    raw_fields
        .get(name)
        .map(|v| v.as_str())
        .ok_or_else(|| ChurnError::MissingField(name.to_string()))
}

fn parse_charge(name: &str, raw: &str) -> ChurnResult<f64> {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(value),
        _ => Err(ChurnError::invalid_value(name, raw)),
    }
}

/// Rows assembled from an uploaded table
#[derive(Debug, Clone, Serialize)]
pub struct BulkTable {
    /// Customer identifiers, kept aside from the features for display
    pub customer_ids: Option<Vec<String>>,
    pub rows: Vec<FeatureRow>,
    /// Numeric cells coerced to the missing marker
    pub coerced_cells: usize,
    /// Upload columns that are not part of the feature schema
    pub ignored_columns: Vec<String>,
}

impl BulkTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Assemble an uploaded table into feature rows.
///
/// The identifier column is dropped from the features, column names are
/// normalized to lowercase and matched against the schema, and unparsable
/// numeric cells become the missing marker without dropping the row. Any
/// expected column absent from the upload fails the whole upload.
pub fn assemble_bulk(table: &RawTable) -> ChurnResult<BulkTable> {
    let normalized: Vec<String> = table
        .headers
        .iter()
        .map(|h| normalize_column_name(h))
        .collect();

    let id_key = normalize_column_name(CUSTOMER_ID_COLUMN);
    let id_position = normalized.iter().position(|h| *h == id_key);

    // Upload position for every schema column
    let mut positions: [Option<usize>; FEATURE_COUNT] = [None; FEATURE_COUNT];
    let mut ignored_columns = Vec::new();
    for (pos, header) in normalized.iter().enumerate() {
        if Some(pos) == id_position {
            continue;
        }
        match column_index_normalized(header) {
            Some(idx) if positions[idx].is_none() => positions[idx] = Some(pos),
            Some(_) => {
                return Err(ChurnError::SchemaMismatch(format!(
                    "column '{}' appears more than once",
                    table.headers[pos]
                )))
            }
            None => ignored_columns.push(table.headers[pos].clone()),
        }
    }

    let missing: Vec<&str> = FEATURE_COLUMNS
        .iter()
        .zip(positions.iter())
        .filter(|(_, pos)| pos.is_none())
        .map(|(column, _)| column.name)
        .collect();
    if !missing.is_empty() {
        return Err(ChurnError::SchemaMismatch(format!(
            "upload is missing expected columns: {}",
            missing.join(", ")
        )));
    }

    if !ignored_columns.is_empty() {
        debug!(columns = ?ignored_columns, "Ignoring columns outside the feature schema");
    }

    let mut rows = Vec::with_capacity(table.rows.len());
    let mut customer_ids = id_position.map(|_| Vec::with_capacity(table.rows.len()));
    let mut coerced_cells = 0;

    for (line, raw_row) in table.rows.iter().enumerate() {
        let cell = |pos: usize| raw_row.get(pos).map(|v| v.trim()).unwrap_or("");

        let mut values = Vec::with_capacity(FEATURE_COUNT);
        for (column, pos) in FEATURE_COLUMNS.iter().zip(positions.iter()) {
            let raw = pos.map(cell).unwrap_or("");
            if column.kind.is_numeric() {
                let parsed = raw.parse::<f64>().ok().filter(|v| v.is_finite());
                if parsed.is_none() {
                    coerced_cells += 1;
                    debug!(row = line, column = column.name, value = raw, "Coerced to missing");
                }
                values.push(FeatureValue::Number(parsed));
            } else {
                values.push(FeatureValue::Category(raw.to_string()));
            }
        }
        rows.push(FeatureRow::from_values(values)?);

        if let (Some(ids), Some(pos)) = (customer_ids.as_mut(), id_position) {
            ids.push(cell(pos).to_string());
        }
    }

    if coerced_cells > 0 {
        warn!(
            coerced_cells,
            rows = rows.len(),
            "Unparsable numeric values coerced to missing"
        );
    }

    Ok(BulkTable {
        customer_ids,
        rows,
        coerced_cells,
        ignored_columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::record::tests::sample_record;
    use crate::data::record::{Contract, Gender};

    fn raw_fields() -> HashMap<String, String> {
        let record = sample_record();
        FEATURE_COLUMNS
            .iter()
            .zip(record.field_values())
            .map(|(c, v)| (c.name.to_string(), v))
            .collect()
    }

    fn upload_csv(total_charges: &str) -> RawTable {
        let mut text = String::from(
            "customerID,gender,SeniorCitizen,Partner,Dependents,tenure,PhoneService,MultipleLines,\
InternetService,OnlineSecurity,OnlineBackup,DeviceProtection,TechSupport,StreamingTV,\
StreamingMovies,Contract,PaperlessBilling,PaymentMethod,MonthlyCharges,TotalCharges,Churn\n",
        );
        text.push_str(&format!(
            "7590-VHVEG,Female,No,Yes,No,1,No,No phone service,DSL,No,Yes,No,No,No,No,\
Month-to-month,Yes,Electronic check,29.85,{},No\n",
            total_charges
        ));
        text.push_str(
            "5575-GNVDE,Male,No,No,No,34,Yes,No,DSL,Yes,No,Yes,No,No,No,One year,No,\
Mailed check,56.95,1889.5,No\n",
        );
        RawTable::from_csv_reader(text.as_bytes()).unwrap()
    }

    #[test]
    fn test_assemble_single() {
        let record = assemble_single(&raw_fields()).unwrap();
        assert_eq!(record, sample_record());
        assert_eq!(record.gender, Gender::Female);
        assert_eq!(record.contract, Contract::MonthToMonth);
    }

    #[test]
    fn test_assemble_single_missing_key_is_contract_violation() {
        let mut fields = raw_fields();
        fields.remove("TechSupport");
        let err = assemble_single(&fields).unwrap_err();
        assert!(matches!(err, ChurnError::MissingField(ref f) if f == "TechSupport"));
    }

    #[test]
    fn test_assemble_single_rejects_bad_values() {
        let mut fields = raw_fields();
        fields.insert("MonthlyCharges".into(), "-3".into());
        assert!(assemble_single(&fields).is_err());

        let mut fields = raw_fields();
        fields.insert("Contract".into(), "Weekly".into());
        assert!(matches!(
            assemble_single(&fields).unwrap_err(),
            ChurnError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_assemble_bulk_coerces_total_charges() {
        let bulk = assemble_bulk(&upload_csv(" ")).unwrap();
        assert_eq!(bulk.len(), 2);
        assert_eq!(bulk.coerced_cells, 1);
        assert_eq!(bulk.rows[0].get("TotalCharges"), Some(&FeatureValue::Number(None)));
        assert_eq!(bulk.rows[1].number("TotalCharges"), Some(1889.5));
        assert_eq!(bulk.customer_ids.as_ref().unwrap()[0], "7590-VHVEG");
        assert_eq!(bulk.ignored_columns, vec!["Churn".to_string()]);
    }

    #[test]
    fn test_assemble_bulk_keeps_unlisted_categories() {
        let bulk = assemble_bulk(&upload_csv("29.85")).unwrap();
        assert_eq!(bulk.coerced_cells, 0);
        assert_eq!(bulk.rows[0].category("MultipleLines"), Some("No phone service"));
    }

    #[test]
    fn test_assemble_bulk_headers_are_case_insensitive() {
        let mut table = upload_csv("29.85");
        for header in table.headers.iter_mut() {
            *header = header.to_uppercase();
        }
        let bulk = assemble_bulk(&table).unwrap();
        assert_eq!(bulk.rows[1].number("tenure"), Some(34.0));
    }

    #[test]
    fn test_assemble_bulk_missing_column_is_schema_mismatch() {
        let mut table = upload_csv("29.85");
        let idx = table.headers.iter().position(|h| h == "Contract").unwrap();
        table.headers.remove(idx);
        for row in table.rows.iter_mut() {
            row.remove(idx);
        }
        let err = assemble_bulk(&table).unwrap_err();
        assert!(matches!(err, ChurnError::SchemaMismatch(ref m) if m.contains("Contract")));
    }
}
