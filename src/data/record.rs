//! Customer records and the column-ordered feature rows fed to model pipelines

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::{ChurnError, ChurnResult};
use super::schema::{column_index, FEATURE_COLUMNS, FEATURE_COUNT};

/// Declares a categorical field type whose spellings match the mapping table
macro_rules! categorical {
    ($(#[$meta:meta])* $name:ident, $field:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            /// Exact spelling used by the model artifacts
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            /// All accepted values
            pub fn all() -> Vec<$name> {
                vec![$($name::$variant),+]
            }
        }

        impl FromStr for $name {
            type Err = ChurnError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($text => Ok($name::$variant),)+
                    other => Err(ChurnError::invalid_value($field, other)),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }
    };
}

categorical!(
    /// Customer gender
    Gender, "gender" { Male => "Male", Female => "Female" }
);

categorical!(
    /// Yes/No flag shared by most service columns
    YesNo, "Yes/No" { Yes => "Yes", No => "No" }
);

categorical!(
    /// Internet service provider
    InternetService, "InternetService" {
        Dsl => "DSL",
        FiberOptic => "Fiber optic",
        No => "No",
    }
);

categorical!(
    /// Contract term
    Contract, "Contract" {
        MonthToMonth => "Month-to-month",
        OneYear => "One year",
        TwoYear => "Two year",
    }
);

categorical!(
    /// Payment method
    PaymentMethod, "PaymentMethod" {
        ElectronicCheck => "Electronic check",
        MailedCheck => "Mailed check",
        BankTransfer => "Bank transfer (automatic)",
        CreditCard => "Credit card (automatic)",
    }
);

/// One customer's feature vector as collected by the single-record form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub gender: Gender,
    #[serde(rename = "SeniorCitizen")]
    pub senior_citizen: YesNo,
    #[serde(rename = "Partner")]
    pub partner: YesNo,
    #[serde(rename = "Dependents")]
    pub dependents: YesNo,
    pub tenure: u32,
    #[serde(rename = "PhoneService")]
    pub phone_service: YesNo,
    #[serde(rename = "MultipleLines")]
    pub multiple_lines: YesNo,
    #[serde(rename = "InternetService")]
    pub internet_service: InternetService,
    #[serde(rename = "OnlineSecurity")]
    pub online_security: YesNo,
    #[serde(rename = "OnlineBackup")]
    pub online_backup: YesNo,
    #[serde(rename = "DeviceProtection")]
    pub device_protection: YesNo,
    #[serde(rename = "TechSupport")]
    pub tech_support: YesNo,
    #[serde(rename = "StreamingTV")]
    pub streaming_tv: YesNo,
    #[serde(rename = "StreamingMovies")]
    pub streaming_movies: YesNo,
    #[serde(rename = "Contract")]
    pub contract: Contract,
    #[serde(rename = "PaperlessBilling")]
    pub paperless_billing: YesNo,
    #[serde(rename = "PaymentMethod")]
    pub payment_method: PaymentMethod,
    #[serde(rename = "MonthlyCharges")]
    pub monthly_charges: f64,
    #[serde(rename = "TotalCharges")]
    pub total_charges: f64,
}

impl CustomerRecord {
    /// Reject charges the typed fields cannot rule out: negative or non-finite
    pub fn validate(&self) -> ChurnResult<()> {
        for (name, value) in [
            ("MonthlyCharges", self.monthly_charges),
            ("TotalCharges", self.total_charges),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ChurnError::invalid_value(name, value.to_string()));
            }
        }
        Ok(())
    }

    /// Cell values as strings, in mapping-table order
    pub fn field_values(&self) -> [String; FEATURE_COUNT] {
        [
            self.gender.to_string(),
            self.senior_citizen.to_string(),
            self.partner.to_string(),
            self.dependents.to_string(),
            self.tenure.to_string(),
            self.phone_service.to_string(),
            self.multiple_lines.to_string(),
            self.internet_service.to_string(),
            self.online_security.to_string(),
            self.online_backup.to_string(),
            self.device_protection.to_string(),
            self.tech_support.to_string(),
            self.streaming_tv.to_string(),
            self.streaming_movies.to_string(),
            self.contract.to_string(),
            self.paperless_billing.to_string(),
            self.payment_method.to_string(),
            self.monthly_charges.to_string(),
            self.total_charges.to_string(),
        ]
    }

    /// Convert into the column-ordered row the pipelines consume
    pub fn to_feature_row(&self) -> FeatureRow {
        let values = self
            .field_values()
            .into_iter()
            .zip(FEATURE_COLUMNS.iter())
            .map(|(value, column)| {
                if column.kind.is_numeric() {
                    FeatureValue::Number(value.parse::<f64>().ok())
                } else {
                    FeatureValue::Category(value)
                }
            })
            .collect();
        FeatureRow { values }
    }
}

/// One cell of a feature row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Category(String),
    /// `None` is the missing-value marker left by bulk coercion
    Number(Option<f64>),
}

impl FeatureValue {
    pub fn as_category(&self) -> Option<&str> {
        match self {
            FeatureValue::Category(s) => Some(s.as_str()),
            FeatureValue::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FeatureValue::Number(n) => *n,
            FeatureValue::Category(_) => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, FeatureValue::Number(None))
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Category(s) => write!(f, "{}", s),
            FeatureValue::Number(Some(n)) => write!(f, "{}", n),
            FeatureValue::Number(None) => Ok(()),
        }
    }
}

/// Column-ordered feature values, aligned with `FEATURE_COLUMNS`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    values: Vec<FeatureValue>,
}

impl FeatureRow {
    /// Build a row from values already in mapping-table order
    pub fn from_values(values: Vec<FeatureValue>) -> ChurnResult<Self> {
        if values.len() != FEATURE_COUNT {
            return Err(ChurnError::SchemaMismatch(format!(
                "expected {} feature values, got {}",
                FEATURE_COUNT,
                values.len()
            )));
        }
        Ok(Self { values })
    }

    pub fn values(&self) -> &[FeatureValue] {
        &self.values
    }

    /// Value of a column by exact name
    pub fn get(&self, column: &str) -> Option<&FeatureValue> {
        column_index(column).and_then(|idx| self.values.get(idx))
    }

    pub fn category(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(FeatureValue::as_category)
    }

    pub fn number(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(FeatureValue::as_number)
    }

    /// Count of numeric cells holding the missing marker
    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_missing()).count()
    }
}
