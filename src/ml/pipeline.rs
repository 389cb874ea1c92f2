//! Serialized classification pipelines: per-column preprocessing followed by
//! a logistic, gradient boosting or random forest estimator

use std::fs;
use std::path::Path;

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::Classifier;
use crate::data::schema::{column_index, ColumnKind, ColumnTag, FEATURE_COLUMNS};
use crate::data::{ChurnError, ChurnResult, FeatureRow, FeatureValue};

/// Columns an artifact was fit on, shipped alongside it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub columns: Vec<SchemaColumn>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaColumn {
    pub name: String,
    pub kind: ColumnTag,
}

impl SchemaDescriptor {
    /// Descriptor matching the built-in feature table
    pub fn from_feature_table() -> Self {
        Self {
            columns: FEATURE_COLUMNS
                .iter()
                .map(|c| SchemaColumn {
                    name: c.name.to_string(),
                    kind: c.kind.tag(),
                })
                .collect(),
        }
    }
}

/// One preprocessing step, bound to a single input column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "encoding", rename_all = "snake_case")]
pub enum PreprocessStep {
    /// One indicator per category; unknown categories encode as all zeros
    OneHot { column: String, categories: Vec<String> },
    /// `(x - mean) / scale`, with missing values replaced by `fill` first
    Standard {
        column: String,
        mean: f64,
        scale: f64,
        fill: f64,
    },
}

impl PreprocessStep {
    pub fn column(&self) -> &str {
        match self {
            PreprocessStep::OneHot { column, .. } | PreprocessStep::Standard { column, .. } => column,
        }
    }

    /// Number of output features
    pub fn width(&self) -> usize {
        match self {
            PreprocessStep::OneHot { categories, .. } => categories.len(),
            PreprocessStep::Standard { .. } => 1,
        }
    }

    fn write(&self, value: &FeatureValue, out: &mut [f64]) {
        match self {
            PreprocessStep::OneHot { categories, .. } => {
                let text = value.to_string();
                if let Some(pos) = categories.iter().position(|c| *c == text) {
                    out[pos] = 1.0;
                }
            }
            PreprocessStep::Standard {
                mean, scale, fill, ..
            } => {
                let raw = match value {
                    FeatureValue::Number(n) => n.unwrap_or(*fill),
                    FeatureValue::Category(s) => s.trim().parse::<f64>().unwrap_or(*fill),
                };
                out[0] = (raw - mean) / scale;
            }
        }
    }
}

/// Flat binary decision tree; `split` goes left when value <= threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

impl DecisionTree {
    fn evaluate(&self, x: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if x[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Children must point forward so evaluation always terminates
    fn validate(&self, width: usize, leaf_range: Option<(f64, f64)>) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= width {
                        return Err(format!(
                            "node {} splits on feature {} but the pipeline produces {}",
                            idx, feature, width
                        ));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {} has a non-finite threshold", idx));
                    }
                    for child in [*left, *right] {
                        if child <= idx || child >= self.nodes.len() {
                            return Err(format!("node {} has invalid child {}", idx, child));
                        }
                    }
                }
                TreeNode::Leaf { value } => {
                    if !value.is_finite() {
                        return Err(format!("leaf {} is not finite", idx));
                    }
                    if let Some((lo, hi)) = leaf_range {
                        if *value < lo || *value > hi {
                            return Err(format!("leaf {} value {} outside [{}, {}]", idx, value, lo, hi));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Final estimator of a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Estimator {
    Logistic {
        coefficients: Vec<f64>,
        intercept: f64,
    },
    /// Sigmoid of `init_score + learning_rate * sum(tree outputs)`
    GradientBoosting {
        learning_rate: f64,
        init_score: f64,
        trees: Vec<DecisionTree>,
    },
    /// Mean of per-tree positive-class probabilities
    RandomForest { trees: Vec<DecisionTree> },
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl Estimator {
    fn validate(&self, width: usize) -> Result<(), String> {
        match self {
            Estimator::Logistic { coefficients, intercept } => {
                if coefficients.len() != width {
                    return Err(format!(
                        "logistic model has {} coefficients for {} features",
                        coefficients.len(),
                        width
                    ));
                }
                if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
                    return Err("logistic parameters must be finite".to_string());
                }
                Ok(())
            }
            Estimator::GradientBoosting {
                learning_rate,
                init_score,
                trees,
            } => {
                if !(learning_rate.is_finite() && *learning_rate > 0.0) || !init_score.is_finite() {
                    return Err("gradient boosting parameters must be finite and positive".to_string());
                }
                if trees.is_empty() {
                    return Err("gradient boosting model has no trees".to_string());
                }
                trees.iter().try_for_each(|t| t.validate(width, None))
            }
            Estimator::RandomForest { trees } => {
                if trees.is_empty() {
                    return Err("random forest has no trees".to_string());
                }
                trees.iter().try_for_each(|t| t.validate(width, Some((0.0, 1.0))))
            }
        }
    }

    /// Positive-class probability for every row of the design matrix
    fn positive_probability(&self, x: &Array2<f64>) -> Array1<f64> {
        match self {
            Estimator::Logistic { coefficients, intercept } => {
                let coef = Array1::from(coefficients.clone());
                (x.dot(&coef) + *intercept).mapv(sigmoid)
            }
            Estimator::GradientBoosting {
                learning_rate,
                init_score,
                trees,
            } => x
                .outer_iter()
                .map(|row| {
                    let raw: f64 = trees.iter().map(|t| t.evaluate(row)).sum();
                    sigmoid(init_score + learning_rate * raw)
                })
                .collect(),
            Estimator::RandomForest { trees } => x
                .outer_iter()
                .map(|row| {
                    trees.iter().map(|t| t.evaluate(row)).sum::<f64>() / trees.len() as f64
                })
                .collect(),
        }
    }
}

/// A fitted pipeline loaded from a JSON artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPipeline {
    pub name: String,
    pub schema: SchemaDescriptor,
    pub preprocessor: Vec<PreprocessStep>,
    pub estimator: Estimator,
    /// Feature-table index of every preprocessing step's column
    #[serde(skip)]
    bindings: Vec<usize>,
}

impl ModelPipeline {
    /// Build and validate a pipeline in memory
    pub fn new(
        name: impl Into<String>,
        schema: SchemaDescriptor,
        preprocessor: Vec<PreprocessStep>,
        estimator: Estimator,
    ) -> ChurnResult<Self> {
        let mut pipeline = Self {
            name: name.into(),
            schema,
            preprocessor,
            estimator,
            bindings: Vec::new(),
        };
        pipeline.prepare(Path::new("<memory>"), true)?;
        Ok(pipeline)
    }

    /// Load an artifact; a missing file is a missing resource
    pub fn load(path: &Path, validate_schema: bool) -> ChurnResult<Self> {
        if !path.exists() {
            return Err(ChurnError::missing_resource("model artifact", path));
        }
        let contents = fs::read_to_string(path)?;
        let mut pipeline: ModelPipeline = serde_json::from_str(&contents)
            .map_err(|e| ChurnError::artifact(path, format!("unreadable artifact: {}", e)))?;
        pipeline.prepare(path, validate_schema)?;
        debug!(
            name = %pipeline.name,
            features = pipeline.n_features(),
            "Model pipeline validated"
        );
        Ok(pipeline)
    }

    /// Write the artifact as pretty JSON
    pub fn save(&self, path: &Path) -> ChurnResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn prepare(&mut self, origin: &Path, validate_schema: bool) -> ChurnResult<()> {
        if self.preprocessor.is_empty() {
            return Err(ChurnError::artifact(origin, "pipeline has no preprocessing steps"));
        }

        let mut bindings = Vec::with_capacity(self.preprocessor.len());
        for step in &self.preprocessor {
            let idx = column_index(step.column()).ok_or_else(|| {
                ChurnError::SchemaMismatch(format!(
                    "{} uses column '{}' which is not in the feature table",
                    self.name,
                    step.column()
                ))
            })?;
            if let PreprocessStep::Standard { scale, mean, fill, .. } = step {
                if !(scale.is_finite() && *scale > 0.0) || !mean.is_finite() || !fill.is_finite() {
                    return Err(ChurnError::artifact(
                        origin,
                        format!("invalid scaling parameters for '{}'", step.column()),
                    ));
                }
            }
            bindings.push(idx);
        }
        self.bindings = bindings;

        if validate_schema {
            self.validate_schema()?;
        }

        self.estimator
            .validate(self.n_features())
            .map_err(|message| ChurnError::artifact(origin, message))
    }

    /// Check the shipped descriptor and the steps against the feature table
    pub fn validate_schema(&self) -> ChurnResult<()> {
        for column in &self.schema.columns {
            let idx = column_index(&column.name).ok_or_else(|| {
                ChurnError::SchemaMismatch(format!(
                    "{} was fit on unknown column '{}'",
                    self.name, column.name
                ))
            })?;
            let expected = FEATURE_COLUMNS[idx].kind.tag();
            if expected != column.kind {
                return Err(ChurnError::SchemaMismatch(format!(
                    "{} declares '{}' as {:?}, expected {:?}",
                    self.name, column.name, column.kind, expected
                )));
            }
        }

        for (step, &idx) in self.preprocessor.iter().zip(self.bindings.iter()) {
            if !self.schema.columns.iter().any(|c| c.name == step.column()) {
                return Err(ChurnError::SchemaMismatch(format!(
                    "{} preprocesses '{}' which its schema does not declare",
                    self.name,
                    step.column()
                )));
            }
            match (step, FEATURE_COLUMNS[idx].kind) {
                (PreprocessStep::OneHot { categories, .. }, ColumnKind::Categorical(known)) => {
                    for category in categories.iter().filter(|c| !known.contains(&c.as_str())) {
                        // Bulk uploads may carry these spellings; the form never does
                        debug!(column = step.column(), category = %category, "Category outside form options");
                    }
                }
                (PreprocessStep::Standard { .. }, ColumnKind::Numeric) => {}
                _ => {
                    return Err(ChurnError::SchemaMismatch(format!(
                        "{} applies the wrong encoding to '{}'",
                        self.name,
                        step.column()
                    )))
                }
            }
        }

        let unused: Vec<&str> = self
            .schema
            .columns
            .iter()
            .filter(|c| !self.preprocessor.iter().any(|s| s.column() == c.name))
            .map(|c| c.name.as_str())
            .collect();
        if !unused.is_empty() {
            warn!(model = %self.name, columns = ?unused, "Schema columns without a preprocessing step");
        }
        Ok(())
    }

    /// Width of the transformed feature vector
    pub fn n_features(&self) -> usize {
        self.preprocessor.iter().map(PreprocessStep::width).sum()
    }

    /// Design matrix for a batch of rows
    pub fn transform(&self, rows: &[FeatureRow]) -> ChurnResult<Array2<f64>> {
        let width = self.n_features();
        let mut matrix = Array2::<f64>::zeros((rows.len(), width));
        let mut buffer = vec![0.0; width];

        for (i, row) in rows.iter().enumerate() {
            buffer.iter_mut().for_each(|v| *v = 0.0);
            let mut offset = 0;
            for (step, &idx) in self.preprocessor.iter().zip(self.bindings.iter()) {
                let value = row.values().get(idx).ok_or_else(|| {
                    ChurnError::SchemaMismatch(format!("row is missing column '{}'", step.column()))
                })?;
                let w = step.width();
                step.write(value, &mut buffer[offset..offset + w]);
                offset += w;
            }
            matrix
                .row_mut(i)
                .iter_mut()
                .zip(buffer.iter())
                .for_each(|(dst, src)| *dst = *src);
        }

        Ok(matrix)
    }
}

impl Classifier for ModelPipeline {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, rows: &[FeatureRow]) -> ChurnResult<Vec<usize>> {
        let proba = self.predict_proba(rows)?;
        Ok(proba
            .outer_iter()
            .map(|p| if p[1] > p[0] { 1 } else { 0 })
            .collect())
    }

    fn predict_proba(&self, rows: &[FeatureRow]) -> ChurnResult<Array2<f64>> {
        let x = self.transform(rows)?;
        let positive = self.estimator.positive_probability(&x);
        let mut proba = Array2::<f64>::zeros((rows.len(), 2));
        for (i, p) in positive.iter().enumerate() {
            let p = p.clamp(0.0, 1.0);
            proba[[i, 0]] = 1.0 - p;
            proba[[i, 1]] = p;
        }
        Ok(proba)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::record::tests::sample_record;
    use crate::data::FEATURE_COLUMNS;

    /// Logistic pipeline driven by contract, tenure and missing-safe charges
    pub(crate) fn logistic_pipeline() -> ModelPipeline {
        let preprocessor: Vec<PreprocessStep> = FEATURE_COLUMNS
            .iter()
            .map(|c| match c.kind {
                ColumnKind::Categorical(options) => PreprocessStep::OneHot {
                    column: c.name.to_string(),
                    categories: options.iter().map(|o| o.to_string()).collect(),
                },
                ColumnKind::Numeric => PreprocessStep::Standard {
                    column: c.name.to_string(),
                    mean: 30.0,
                    scale: 20.0,
                    fill: 30.0,
                },
            })
            .collect();
        let width: usize = preprocessor.iter().map(PreprocessStep::width).sum();
        let mut coefficients = vec![0.0; width];
        // tenure sits after four two-way flags; Month-to-month after twelve more flags
        coefficients[8] = -1.5;
        let contract_offset = 8 + 1 + 2 + 2 + 3 + 2 * 6;
        coefficients[contract_offset] = 1.2;
        ModelPipeline::new(
            "Logistic",
            SchemaDescriptor::from_feature_table(),
            preprocessor,
            Estimator::Logistic {
                coefficients,
                intercept: -0.5,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_transform_one_hot_and_scaling() {
        let pipeline = logistic_pipeline();
        let x = pipeline.transform(&[sample_record().to_feature_row()]).unwrap();
        assert_eq!(x.shape(), &[1, pipeline.n_features()]);
        // Female is the second gender category
        assert_eq!(x[[0, 0]], 0.0);
        assert_eq!(x[[0, 1]], 1.0);
        assert!((x[[0, 8]] - (1.0 - 30.0) / 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let pipeline = logistic_pipeline();
        let proba = pipeline
            .predict_proba(&[sample_record().to_feature_row()])
            .unwrap();
        assert!((proba[[0, 0]] + proba[[0, 1]] - 1.0).abs() < 1e-12);
        // Short tenure on a monthly contract leans towards churn
        assert_eq!(pipeline.predict(&[sample_record().to_feature_row()]).unwrap(), vec![1]);
    }

    #[test]
    fn test_missing_numeric_uses_fill_value() {
        let pipeline = logistic_pipeline();
        let mut values = sample_record().to_feature_row().values().to_vec();
        values[18] = FeatureValue::Number(None);
        let row = FeatureRow::from_values(values).unwrap();
        let x = pipeline.transform(&[row]).unwrap();
        assert_eq!(x[[0, pipeline.n_features() - 1]], 0.0);
    }

    #[test]
    fn test_tree_children_must_point_forward() {
        let tree = DecisionTree {
            nodes: vec![
                TreeNode::Split {
                    feature: 0,
                    threshold: 0.5,
                    left: 0,
                    right: 1,
                },
                TreeNode::Leaf { value: 0.2 },
            ],
        };
        assert!(tree.validate(4, None).is_err());
    }

    #[test]
    fn test_forest_leaf_range_is_checked() {
        let tree = DecisionTree {
            nodes: vec![TreeNode::Leaf { value: 1.7 }],
        };
        assert!(tree.validate(1, Some((0.0, 1.0))).is_err());
        assert!(tree.validate(1, None).is_ok());
    }

    #[test]
    fn test_schema_kind_mismatch_is_rejected() {
        let mut schema = SchemaDescriptor::from_feature_table();
        schema.columns[4].kind = ColumnTag::Categorical;
        let result = ModelPipeline::new(
            "Broken",
            schema,
            logistic_pipeline().preprocessor,
            logistic_pipeline().estimator,
        );
        assert!(matches!(result, Err(ChurnError::SchemaMismatch(_))));
    }

    #[test]
    fn test_coefficient_count_is_checked() {
        let result = ModelPipeline::new(
            "Short",
            SchemaDescriptor::from_feature_table(),
            logistic_pipeline().preprocessor,
            Estimator::Logistic {
                coefficients: vec![0.1; 3],
                intercept: 0.0,
            },
        );
        assert!(matches!(result, Err(ChurnError::Artifact { .. })));
    }
}
