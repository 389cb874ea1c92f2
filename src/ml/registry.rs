//! Model registry: resolves model names to cached pipelines and owns the
//! shared label encoder

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::encoder::{load_or_fit, EncoderOrigin, LabelEncoder, DEFAULT_LABELS};
use super::pipeline::ModelPipeline;
use crate::config::Config;
use crate::data::{ChurnError, ChurnResult};

/// Models the registry knows how to serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    #[serde(rename = "Gradient Boosting")]
    GradientBoosting,
    #[serde(rename = "Random Forest")]
    RandomForest,
}

impl ModelKind {
    pub fn all() -> [ModelKind; 2] {
        [ModelKind::GradientBoosting, ModelKind::RandomForest]
    }

    /// Name shown to users and recorded in the history log
    pub fn display_name(&self) -> &'static str {
        match self {
            ModelKind::GradientBoosting => "Gradient Boosting",
            ModelKind::RandomForest => "Random Forest",
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            ModelKind::GradientBoosting => "gradient_boosting",
            ModelKind::RandomForest => "random_forest",
        }
    }
}

impl FromStr for ModelKind {
    type Err = ChurnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ModelKind::all()
            .into_iter()
            .find(|k| {
                k.display_name().eq_ignore_ascii_case(wanted) || k.slug().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| ChurnError::UnknownModel(wanted.to_string()))
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Loads artifacts on first use and hands out shared handles afterwards
pub struct ModelRegistry {
    artifacts: HashMap<ModelKind, PathBuf>,
    encoder_path: PathBuf,
    validate_schema: bool,
    pipelines: RwLock<HashMap<ModelKind, Arc<ModelPipeline>>>,
    encoder: Mutex<Option<Arc<LabelEncoder>>>,
}

impl ModelRegistry {
    pub fn new(
        artifacts: HashMap<ModelKind, PathBuf>,
        encoder_path: impl Into<PathBuf>,
        validate_schema: bool,
    ) -> Self {
        Self {
            artifacts,
            encoder_path: encoder_path.into(),
            validate_schema,
            pipelines: RwLock::new(HashMap::new()),
            encoder: Mutex::new(None),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let artifacts = HashMap::from([
            (
                ModelKind::GradientBoosting,
                config.artifact_path(&config.models.gradient_boosting_artifact),
            ),
            (
                ModelKind::RandomForest,
                config.artifact_path(&config.models.random_forest_artifact),
            ),
        ]);
        Self::new(
            artifacts,
            config.paths.label_encoder.clone(),
            config.models.validate_schema,
        )
    }

    pub fn encoder_path(&self) -> &Path {
        &self.encoder_path
    }

    pub fn artifact_path(&self, kind: ModelKind) -> Option<&Path> {
        self.artifacts.get(&kind).map(PathBuf::as_path)
    }

    /// Shared pipeline for `kind`, loading the artifact on first request
    pub fn get_pipeline(&self, kind: ModelKind) -> ChurnResult<Arc<ModelPipeline>> {
        if let Some(pipeline) = self.pipelines.read().get(&kind) {
            return Ok(Arc::clone(pipeline));
        }

        let path = self
            .artifacts
            .get(&kind)
            .ok_or_else(|| ChurnError::UnknownModel(kind.display_name().to_string()))?;

        let mut pipelines = self.pipelines.write();
        // Another caller may have loaded it while we waited for the lock
        if let Some(pipeline) = pipelines.get(&kind) {
            return Ok(Arc::clone(pipeline));
        }
        let pipeline = Arc::new(ModelPipeline::load(path, self.validate_schema)?);
        info!(model = %kind, path = %path.display(), "Loaded model pipeline");
        pipelines.insert(kind, Arc::clone(&pipeline));
        Ok(pipeline)
    }

    /// Resolve a user-supplied model name, then load it
    pub fn get_pipeline_by_name(&self, name: &str) -> ChurnResult<(ModelKind, Arc<ModelPipeline>)> {
        let kind: ModelKind = name.parse()?;
        Ok((kind, self.get_pipeline(kind)?))
    }

    /// Shared label encoder, created or fitted on first use when needed
    pub fn get_label_encoder(&self) -> ChurnResult<Arc<LabelEncoder>> {
        let mut slot = self.encoder.lock();
        if let Some(encoder) = slot.as_ref() {
            return Ok(Arc::clone(encoder));
        }
        let (encoder, origin) = load_or_fit(&self.encoder_path, &DEFAULT_LABELS)?;
        match origin {
            EncoderOrigin::Loaded => info!(path = %self.encoder_path.display(), "Loaded label encoder"),
            EncoderOrigin::FittedAndPersisted | EncoderOrigin::Created => warn!(
                path = %self.encoder_path.display(),
                origin = ?origin,
                "Label encoder was fitted on the default classes"
            ),
        }
        let encoder = Arc::new(encoder);
        *slot = Some(Arc::clone(&encoder));
        Ok(encoder)
    }

    /// Load every configured model and the encoder up front
    pub fn preload(&self) -> ChurnResult<()> {
        for kind in ModelKind::all() {
            if self.artifacts.contains_key(&kind) {
                self.get_pipeline(kind)?;
            }
        }
        self.get_label_encoder()?;
        Ok(())
    }

    pub fn is_cached(&self, kind: ModelKind) -> bool {
        self.pipelines.read().contains_key(&kind)
    }

    /// Configured models whose artifact file is present on disk
    pub fn available_models(&self) -> Vec<ModelKind> {
        ModelKind::all()
            .into_iter()
            .filter(|k| self.artifacts.get(k).map(|p| p.exists()).unwrap_or(false))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::pipeline::tests::logistic_pipeline;
    use tempfile::tempdir;

    fn registry_in(dir: &Path) -> ModelRegistry {
        let artifacts = HashMap::from([
            (ModelKind::GradientBoosting, dir.join("gradient_boosting.json")),
            (ModelKind::RandomForest, dir.join("random_forest.json")),
        ]);
        ModelRegistry::new(artifacts, dir.join("label_encoder.json"), true)
    }

    #[test]
    fn test_model_names_parse() {
        assert_eq!("Gradient Boosting".parse::<ModelKind>().unwrap(), ModelKind::GradientBoosting);
        assert_eq!("random_forest".parse::<ModelKind>().unwrap(), ModelKind::RandomForest);
        assert_eq!(" random forest ".parse::<ModelKind>().unwrap(), ModelKind::RandomForest);
        assert!(matches!(
            "Neural Net".parse::<ModelKind>(),
            Err(ChurnError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_pipeline_is_cached() {
        let dir = tempdir().unwrap();
        logistic_pipeline()
            .save(&dir.path().join("gradient_boosting.json"))
            .unwrap();
        let registry = registry_in(dir.path());

        assert!(!registry.is_cached(ModelKind::GradientBoosting));
        let first = registry.get_pipeline(ModelKind::GradientBoosting).unwrap();
        let second = registry.get_pipeline(ModelKind::GradientBoosting).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(registry.is_cached(ModelKind::GradientBoosting));
    }

    #[test]
    fn test_missing_artifact_is_reported() {
        let dir = tempdir().unwrap();
        let registry = registry_in(dir.path());
        assert!(matches!(
            registry.get_pipeline(ModelKind::RandomForest),
            Err(ChurnError::MissingResource { .. })
        ));
        assert!(registry.available_models().is_empty());
    }

    #[test]
    fn test_encoder_is_created_once() {
        let dir = tempdir().unwrap();
        let registry = registry_in(dir.path());
        let first = registry.get_label_encoder().unwrap();
        let second = registry.get_label_encoder().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(dir.path().join("label_encoder.json").exists());
    }
}
