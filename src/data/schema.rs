//! Feature column mapping table
//!
//! The single place where the column names, kinds and category spellings that
//! the model artifacts were fit on are defined. Every assembler, the history
//! log and the artifact schema check go through this table.

use serde::{Deserialize, Serialize};

const YES_NO: &[&str] = &["Yes", "No"];

/// Kind of a feature column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Categorical column with the spellings accepted by the single-record form
    Categorical(&'static [&'static str]),
    Numeric,
}

impl ColumnKind {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnKind::Numeric)
    }

    /// Kind tag used in artifact schema descriptors
    pub fn tag(&self) -> ColumnTag {
        match self {
            ColumnKind::Categorical(_) => ColumnTag::Categorical,
            ColumnKind::Numeric => ColumnTag::Numeric,
        }
    }
}

/// Serializable column kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnTag {
    Categorical,
    Numeric,
}

/// One feature column of the churn schema
#[derive(Debug, Clone, Copy)]
pub struct FeatureColumn {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub description: &'static str,
}

/// Number of feature columns
pub const FEATURE_COUNT: usize = 19;

/// Feature columns, in the order the model pipelines expect
pub const FEATURE_COLUMNS: [FeatureColumn; FEATURE_COUNT] = [
    FeatureColumn {
        name: "gender",
        kind: ColumnKind::Categorical(&["Male", "Female"]),
        description: "Whether the customer is a male or a female",
    },
    FeatureColumn {
        name: "SeniorCitizen",
        kind: ColumnKind::Categorical(YES_NO),
        description: "Whether a customer is a senior citizen or not",
    },
    FeatureColumn {
        name: "Partner",
        kind: ColumnKind::Categorical(YES_NO),
        description: "Whether the customer has a partner or not (Yes, No)",
    },
    FeatureColumn {
        name: "Dependents",
        kind: ColumnKind::Categorical(YES_NO),
        description: "Whether the customer has dependents or not (Yes, No)",
    },
    FeatureColumn {
        name: "tenure",
        kind: ColumnKind::Numeric,
        description: "Number of months the customer has stayed with the company",
    },
    FeatureColumn {
        name: "PhoneService",
        kind: ColumnKind::Categorical(YES_NO),
        description: "Whether the customer has a phone service or not (Yes, No)",
    },
    FeatureColumn {
        name: "MultipleLines",
        kind: ColumnKind::Categorical(YES_NO),
        description: "Whether the customer has multiple lines or not",
    },
    FeatureColumn {
        name: "InternetService",
        kind: ColumnKind::Categorical(&["DSL", "Fiber optic", "No"]),
        description: "Customer's internet service provider (DSL, Fiber Optic, No)",
    },
    FeatureColumn {
        name: "OnlineSecurity",
        kind: ColumnKind::Categorical(YES_NO),
        description: "Whether the customer has online security or not (Yes, No, No Internet)",
    },
    FeatureColumn {
        name: "OnlineBackup",
        kind: ColumnKind::Categorical(YES_NO),
        description: "Whether the customer has online backup or not (Yes, No, No Internet)",
    },
    FeatureColumn {
        name: "DeviceProtection",
        kind: ColumnKind::Categorical(YES_NO),
        description: "Whether the customer has device protection or not (Yes, No, No Internet)",
    },
    FeatureColumn {
        name: "TechSupport",
        kind: ColumnKind::Categorical(YES_NO),
        description: "Whether the customer has tech support or not (Yes, No, No Internet)",
    },
    FeatureColumn {
        name: "StreamingTV",
        kind: ColumnKind::Categorical(YES_NO),
        description: "Whether the customer has streaming TV or not (Yes, No, No Internet)",
    },
    FeatureColumn {
        name: "StreamingMovies",
        kind: ColumnKind::Categorical(YES_NO),
        description: "Whether the customer has streaming movies or not (Yes, No, No Internet)",
    },
    FeatureColumn {
        name: "Contract",
        kind: ColumnKind::Categorical(&["Month-to-month", "One year", "Two year"]),
        description: "The contract term of the customer (Month-to-Month, One year, Two year)",
    },
    FeatureColumn {
        name: "PaperlessBilling",
        kind: ColumnKind::Categorical(YES_NO),
        description: "Whether the customer has paperless billing or not (Yes, No)",
    },
    FeatureColumn {
        name: "PaymentMethod",
        kind: ColumnKind::Categorical(&[
            "Electronic check",
            "Mailed check",
            "Bank transfer (automatic)",
            "Credit card (automatic)",
        ]),
        description: "The customer's payment method (Electronic check, mailed check, Bank transfer(automatic), Credit card(automatic))",
    },
    FeatureColumn {
        name: "MonthlyCharges",
        kind: ColumnKind::Numeric,
        description: "The amount charged to the customer monthly",
    },
    FeatureColumn {
        name: "TotalCharges",
        kind: ColumnKind::Numeric,
        description: "The total amount charged to the customer",
    },
];

/// Identifier column dropped from uploads before scoring
pub const CUSTOMER_ID_COLUMN: &str = "customerID";

/// Target column of the churn dataset
pub const CHURN_COLUMN: &str = "Churn";

pub const CHURN_DESCRIPTION: &str = "Whether the customer churned or not (Yes or No)";

/// Columns appended to every history row after the feature columns
pub const HISTORY_EXTRA_COLUMNS: [&str; 4] =
    ["prediction", "probability", "time_of_prediction", "model_used"];

/// Normalize a column name to the single internal case convention
pub fn normalize_column_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Index of a feature column by exact name
pub fn column_index(name: &str) -> Option<usize> {
    FEATURE_COLUMNS.iter().position(|c| c.name == name)
}

/// Index of a feature column by case-insensitive name
pub fn column_index_normalized(name: &str) -> Option<usize> {
    let normalized = normalize_column_name(name);
    FEATURE_COLUMNS
        .iter()
        .position(|c| normalize_column_name(c.name) == normalized)
}

/// Numeric feature column names
pub fn numeric_columns() -> Vec<&'static str> {
    FEATURE_COLUMNS
        .iter()
        .filter(|c| c.kind.is_numeric())
        .map(|c| c.name)
        .collect()
}

/// Categorical feature column names
pub fn categorical_columns() -> Vec<&'static str> {
    FEATURE_COLUMNS
        .iter()
        .filter(|c| !c.kind.is_numeric())
        .map(|c| c.name)
        .collect()
}

/// Description for a feature column or the churn target (case-insensitive)
pub fn describe_column(name: &str) -> Option<&'static str> {
    if normalize_column_name(name) == normalize_column_name(CHURN_COLUMN) {
        return Some(CHURN_DESCRIPTION);
    }
    column_index_normalized(name).map(|idx| FEATURE_COLUMNS[idx].description)
}

/// Header of the history file
pub fn history_header() -> Vec<&'static str> {
    FEATURE_COLUMNS
        .iter()
        .map(|c| c.name)
        .chain(HISTORY_EXTRA_COLUMNS)
        .collect()
}

/// Which columns to show when exploring the dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnSelection {
    #[default]
    All,
    Numeric,
    Categorical,
}

impl ColumnSelection {
    /// Feature column names matching this selection
    pub fn columns(&self) -> Vec<&'static str> {
        match self {
            ColumnSelection::All => FEATURE_COLUMNS.iter().map(|c| c.name).collect(),
            ColumnSelection::Numeric => numeric_columns(),
            ColumnSelection::Categorical => categorical_columns(),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match normalize_column_name(s).as_str() {
            "all" => Some(ColumnSelection::All),
            "numeric" | "numeric columns" => Some(ColumnSelection::Numeric),
            "categorical" | "categorical columns" => Some(ColumnSelection::Categorical),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_has_three_numeric_columns() {
        assert_eq!(numeric_columns(), vec!["tenure", "MonthlyCharges", "TotalCharges"]);
        assert_eq!(categorical_columns().len(), FEATURE_COUNT - 3);
    }

    #[test]
    fn test_case_insensitive_lookup() {
        assert_eq!(column_index_normalized("totalcharges"), column_index("TotalCharges"));
        assert_eq!(column_index_normalized(" PAYMENTMETHOD "), Some(16));
        assert_eq!(column_index_normalized("customerid"), None);
    }

    #[test]
    fn test_history_header_layout() {
        let header = history_header();
        assert_eq!(header.len(), FEATURE_COUNT + 4);
        assert_eq!(header[0], "gender");
        assert_eq!(header[FEATURE_COUNT], "prediction");
        assert_eq!(header.last(), Some(&"model_used"));
    }

    #[test]
    fn test_describe_column() {
        assert!(describe_column("churn").is_some());
        assert!(describe_column("Contract").unwrap().contains("contract term"));
        assert!(describe_column("nope").is_none());
    }

    #[test]
    fn test_column_selection_parse() {
        assert_eq!(ColumnSelection::parse("Numeric Columns"), Some(ColumnSelection::Numeric));
        assert_eq!(ColumnSelection::parse("all"), Some(ColumnSelection::All));
        assert_eq!(ColumnSelection::parse("other"), None);
    }
}
