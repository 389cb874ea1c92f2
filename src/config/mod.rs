use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub paths: PathsConfig,
    pub models: ModelsConfig,
    pub server: ServerConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub dataset: PathBuf,
    pub history: PathBuf,
    pub models_dir: PathBuf,
    pub label_encoder: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Artifact file names, relative to `paths.models_dir` unless absolute
    pub gradient_boosting_artifact: PathBuf,
    pub random_forest_artifact: PathBuf,
    pub default_model: String,
    pub validate_schema: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Username used by the CLI when `--user` is not given
    pub default_user: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file - this sets env vars that aren't already set
        dotenv::dotenv().ok();

        let models_dir =
            PathBuf::from(env::var("CHURN_MODELS_DIR").unwrap_or_else(|_| "models".to_string()));
        let label_encoder = env::var("CHURN_LABEL_ENCODER_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| models_dir.join("label_encoder.json"));

        let config = Config {
            paths: PathsConfig {
                dataset: env::var("CHURN_DATASET_PATH")
                    .unwrap_or_else(|_| "data/churn_data.csv".to_string())
                    .into(),
                history: env::var("CHURN_HISTORY_PATH")
                    .unwrap_or_else(|_| "data/history.csv".to_string())
                    .into(),
                models_dir,
                label_encoder,
            },
            models: ModelsConfig {
                gradient_boosting_artifact: env::var("CHURN_GRADIENT_BOOSTING_ARTIFACT")
                    .unwrap_or_else(|_| "gradient_boosting.json".to_string())
                    .into(),
                random_forest_artifact: env::var("CHURN_RANDOM_FOREST_ARTIFACT")
                    .unwrap_or_else(|_| "random_forest.json".to_string())
                    .into(),
                default_model: env::var("CHURN_DEFAULT_MODEL")
                    .unwrap_or_else(|_| "Gradient Boosting".to_string()),
                validate_schema: env::var("CHURN_VALIDATE_SCHEMA")
                    .unwrap_or_else(|_| "true".to_string())
                    .parse()
                    .context("Invalid CHURN_VALIDATE_SCHEMA value (use true/false)")?,
            },
            server: ServerConfig {
                host: env::var("CHURN_SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: env::var("CHURN_SERVER_PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .context("Invalid CHURN_SERVER_PORT value")?,
            },
            session: SessionConfig {
                default_user: env::var("CHURN_USER").ok().filter(|u| !u.trim().is_empty()),
            },
        };

        Ok(config)
    }

    /// Resolve an artifact file name against the models directory
    pub fn artifact_path(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.paths.models_dir.join(file)
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        let models_dir = PathBuf::from("models");
        Self {
            paths: PathsConfig {
                dataset: PathBuf::from("data/churn_data.csv"),
                history: PathBuf::from("data/history.csv"),
                label_encoder: models_dir.join("label_encoder.json"),
                models_dir,
            },
            models: ModelsConfig {
                gradient_boosting_artifact: PathBuf::from("gradient_boosting.json"),
                random_forest_artifact: PathBuf::from("random_forest.json"),
                default_model: "Gradient Boosting".to_string(),
                validate_schema: true,
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            session: SessionConfig { default_user: None },
        }
    }
}
