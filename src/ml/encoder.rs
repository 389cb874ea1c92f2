//! Label encoder mapping class indices to churn labels

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::data::{ChurnError, ChurnResult};

/// Class set every churn model is fit on
pub const DEFAULT_LABELS: [&str; 2] = ["No", "Yes"];

/// Maps class labels to indices and back; classes are kept sorted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    #[serde(default)]
    classes: Option<Vec<String>>,
}

/// How a label encoder came to be available
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderOrigin {
    /// Read from an already fitted artifact
    Loaded,
    /// Artifact existed without classes; fitted and written back
    FittedAndPersisted,
    /// No artifact existed; created, fitted and written
    Created,
}

impl LabelEncoder {
    /// Unfitted encoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Encoder fitted on `labels`
    pub fn fitted<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut encoder = Self::new();
        encoder.fit(labels);
        encoder
    }

    /// Fit on the distinct labels, sorted alphabetically
    pub fn fit<I, S>(&mut self, labels: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut classes: Vec<String> = labels.into_iter().map(Into::into).collect();
        classes.sort();
        classes.dedup();
        self.classes = Some(classes);
    }

    pub fn is_fitted(&self) -> bool {
        self.classes.as_ref().map(|c| !c.is_empty()).unwrap_or(false)
    }

    pub fn classes(&self) -> Option<&[String]> {
        self.classes.as_deref()
    }

    fn fitted_classes(&self) -> ChurnResult<&[String]> {
        match self.classes.as_deref() {
            Some(classes) if !classes.is_empty() => Ok(classes),
            _ => Err(ChurnError::UnfittedEncoder(
                "fit the encoder with the churn classes before predicting".to_string(),
            )),
        }
    }

    /// Index of `label`
    pub fn encode(&self, label: &str) -> ChurnResult<usize> {
        self.fitted_classes()?
            .iter()
            .position(|c| c == label)
            .ok_or_else(|| ChurnError::invalid_value("label", label))
    }

    /// Label of class `index`
    pub fn decode(&self, index: usize) -> ChurnResult<&str> {
        self.fitted_classes()?
            .get(index)
            .map(|c| c.as_str())
            .ok_or_else(|| ChurnError::invalid_value("class index", index.to_string()))
    }

    /// Read an encoder artifact
    pub fn load(path: &Path) -> ChurnResult<Self> {
        if !path.exists() {
            return Err(ChurnError::missing_resource("label encoder", path));
        }
        let contents = fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| ChurnError::artifact(path, format!("unreadable label encoder: {}", e)))
    }

    /// Write the encoder artifact, creating parent directories
    pub fn save(&self, path: &Path) -> ChurnResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Load the encoder at `path`, fitting it on `labels` and persisting it when
/// the artifact is absent or unfitted. A corrupt artifact is an error and is
/// left untouched.
pub fn load_or_fit(path: &Path, labels: &[&str]) -> ChurnResult<(LabelEncoder, EncoderOrigin)> {
    if !path.exists() {
        let encoder = LabelEncoder::fitted(labels.iter().copied());
        encoder.save(path)?;
        info!(path = %path.display(), classes = ?encoder.classes(), "Created label encoder");
        return Ok((encoder, EncoderOrigin::Created));
    }

    let mut encoder = LabelEncoder::load(path)?;
    if encoder.is_fitted() {
        return Ok((encoder, EncoderOrigin::Loaded));
    }

    warn!(path = %path.display(), "Label encoder artifact is not fitted, fitting default classes");
    encoder.fit(labels.iter().copied());
    encoder.save(path)?;
    Ok((encoder, EncoderOrigin::FittedAndPersisted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_fit_is_alphabetical() {
        let encoder = LabelEncoder::fitted(["Yes", "No", "Yes"]);
        assert_eq!(encoder.encode("No").unwrap(), 0);
        assert_eq!(encoder.encode("Yes").unwrap(), 1);
        assert_eq!(encoder.decode(1).unwrap(), "Yes");
        assert!(encoder.decode(2).is_err());
    }

    #[test]
    fn test_unfitted_encoder_refuses() {
        let encoder = LabelEncoder::new();
        assert!(!encoder.is_fitted());
        assert!(matches!(encoder.decode(0), Err(ChurnError::UnfittedEncoder(_))));
    }

    #[test]
    fn test_load_or_fit_creates_then_loads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("models").join("label_encoder.json");

        let (first, origin) = load_or_fit(&path, &DEFAULT_LABELS).unwrap();
        assert_eq!(origin, EncoderOrigin::Created);
        assert_eq!(first.classes().unwrap(), &["No".to_string(), "Yes".to_string()]);

        let (second, origin) = load_or_fit(&path, &DEFAULT_LABELS).unwrap();
        assert_eq!(origin, EncoderOrigin::Loaded);
        assert_eq!(first, second);
    }

    #[test]
    fn test_load_or_fit_heals_unfitted_artifact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("label_encoder.json");
        fs::write(&path, r#"{"classes": null}"#).unwrap();

        let (encoder, origin) = load_or_fit(&path, &DEFAULT_LABELS).unwrap();
        assert_eq!(origin, EncoderOrigin::FittedAndPersisted);
        assert!(encoder.is_fitted());
        assert!(LabelEncoder::load(&path).unwrap().is_fitted());
    }

    #[test]
    fn test_corrupt_artifact_is_not_overwritten() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("label_encoder.json");
        fs::write(&path, "not json").unwrap();

        assert!(matches!(
            load_or_fit(&path, &DEFAULT_LABELS),
            Err(ChurnError::Artifact { .. })
        ));
        assert_eq!(fs::read_to_string(&path).unwrap(), "not json");
    }
}
