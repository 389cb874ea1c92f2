//! Inference engine: class prediction plus the probability of that class

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::encoder::LabelEncoder;
use super::Classifier;
use crate::data::{ChurnError, ChurnResult, CustomerRecord, FeatureRow};

/// Decoded prediction for one customer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// "Yes" or "No"
    pub label: String,
    /// Probability of the predicted class, in percent
    pub probability: f64,
}

impl PredictionResult {
    pub fn will_churn(&self) -> bool {
        self.label == "Yes"
    }

    /// Probability with two decimals, e.g. `"87.21%"`
    pub fn probability_display(&self) -> String {
        format!("{:.2}%", self.probability)
    }

    pub fn message(&self) -> String {
        if self.will_churn() {
            format!(
                "The customer is likely to churn ({} probability)",
                self.probability_display()
            )
        } else {
            format!(
                "The customer is unlikely to churn ({} probability)",
                self.probability_display()
            )
        }
    }
}

/// Predict a single record
pub fn predict_one<C>(
    model: &C,
    encoder: &LabelEncoder,
    record: &CustomerRecord,
) -> ChurnResult<PredictionResult>
where
    C: Classifier + ?Sized,
{
    let mut results = predict_batch(model, encoder, &[record.to_feature_row()])?;
    results
        .pop()
        .ok_or_else(|| ChurnError::malformed("model returned no prediction"))
}

/// Predict a batch in one vectorized call; output is aligned with `rows`
pub fn predict_batch<C>(
    model: &C,
    encoder: &LabelEncoder,
    rows: &[FeatureRow],
) -> ChurnResult<Vec<PredictionResult>>
where
    C: Classifier + ?Sized,
{
    if !encoder.is_fitted() {
        return Err(ChurnError::UnfittedEncoder(
            "the label encoder has no classes".to_string(),
        ));
    }
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let classes = model.predict(rows)?;
    let proba = model.predict_proba(rows)?;
    if classes.len() != rows.len() || proba.nrows() != rows.len() {
        return Err(ChurnError::malformed(format!(
            "{} returned {} predictions and {} probability rows for {} inputs",
            model.name(),
            classes.len(),
            proba.nrows(),
            rows.len()
        )));
    }

    let results = classes
        .iter()
        .zip(proba.outer_iter())
        .map(|(&class, p)| {
            let label = encoder.decode(class)?.to_string();
            let mass = p.get(class).copied().ok_or_else(|| {
                ChurnError::malformed(format!("no probability for class {}", class))
            })?;
            Ok(PredictionResult {
                label,
                probability: (mass * 100.0).clamp(0.0, 100.0),
            })
        })
        .collect::<ChurnResult<Vec<_>>>()?;

    debug!(model = model.name(), rows = results.len(), "Batch scored");
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::record::tests::sample_record;
    use crate::ml::pipeline::tests::logistic_pipeline;
    use ndarray::{array, Array2};

    /// Always predicts the first class with fixed probabilities
    struct Constant;

    impl Classifier for Constant {
        fn name(&self) -> &str {
            "constant"
        }

        fn predict(&self, rows: &[FeatureRow]) -> ChurnResult<Vec<usize>> {
            Ok(vec![0; rows.len()])
        }

        fn predict_proba(&self, rows: &[FeatureRow]) -> ChurnResult<Array2<f64>> {
            let mut proba = Array2::zeros((rows.len(), 2));
            for mut row in proba.outer_iter_mut() {
                row.assign(&array![0.8765, 0.1235]);
            }
            Ok(proba)
        }
    }

    #[test]
    fn test_probability_of_predicted_class() {
        let encoder = LabelEncoder::fitted(["No", "Yes"]);
        let result = predict_one(&Constant, &encoder, &sample_record()).unwrap();
        assert_eq!(result.label, "No");
        assert!(!result.will_churn());
        assert_eq!(result.probability_display(), "87.65%");
    }

    #[test]
    fn test_unfitted_encoder_stops_inference() {
        let result = predict_one(&Constant, &LabelEncoder::new(), &sample_record());
        assert!(matches!(result, Err(ChurnError::UnfittedEncoder(_))));
    }

    #[test]
    fn test_empty_batch() {
        let encoder = LabelEncoder::fitted(["No", "Yes"]);
        assert!(predict_batch(&Constant, &encoder, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_batch_matches_single_predictions() {
        let pipeline = logistic_pipeline();
        let encoder = LabelEncoder::fitted(["No", "Yes"]);
        let mut long_tenure = sample_record();
        long_tenure.tenure = 70;
        let records = [sample_record(), long_tenure];
        let rows: Vec<FeatureRow> = records.iter().map(|r| r.to_feature_row()).collect();

        let batch = predict_batch(&pipeline, &encoder, &rows).unwrap();
        assert_eq!(batch.len(), 2);
        for (record, result) in records.iter().zip(batch.iter()) {
            assert_eq!(&predict_one(&pipeline, &encoder, record).unwrap(), result);
            assert!(result.probability >= 50.0 && result.probability <= 100.0);
        }
        assert_eq!(batch[0].label, "Yes");
        assert_eq!(batch[1].label, "No");
    }
}
