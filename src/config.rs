//! Configuration for tallyscan.
//!
//! A `Config` is loaded once from a TOML or JSON file (every field has a
//! default), adjusted by command-line flags, and then passed by reference to
//! whatever needs it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Isolation;
use crate::ocr::RecognizerConfig;
use crate::preprocess::PreprocessOptions;
use crate::raster::RasterConfig;
use crate::services::extraction::RetryConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub raster: RasterConfig,
    pub preprocess: PreprocessOptions,
    pub recognizer: RecognizerConfig,
    pub verification: VerificationConfig,
    pub retry: RetryConfig,
}

/// Run-level settings for the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub dpi: u32,
    /// Worker count; unset means one less than the available cores.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    pub recognition: bool,
    pub isolation: Isolation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_timeout_secs: Option<u64>,
    pub output_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dpi: 200,
            workers: None,
            recognition: true,
            isolation: Isolation::Process,
            task_timeout_secs: None,
            output_dir: PathBuf::from("ocr_results"),
        }
    }
}

/// Settings for the quality report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Names whose presence is tracked on every page.
    pub tracked_entities: Vec<String>,
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit path must exist. Otherwise prefer discovers a `tallyscan`
    /// config file in the standard locations, falling back to defaults.
    /// Returns the path that was loaded, if any.
    pub async fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => discover().await,
        };

        let Some(path) = path else {
            tracing::debug!("No config file found, using defaults");
            return Ok((Self::default(), None));
        };

        let config = Self::load_from_path(&path).await?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok((config, Some(path)))
    }

    /// Load configuration from a specific file, parsed by its extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
        match ext {
            "json" => {
                let config: Config =
                    serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
                        path: path.to_path_buf(),
                        source,
                    })?;
                config.validate()?;
                Ok(config)
            }
            _ => Self::from_toml_str(&contents).map_err(|e| match e {
                ConfigError::Parse { source, .. } => ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                },
                other => other,
            }),
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject settings no run could use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.dpi == 0 {
            return Err(ConfigError::Invalid("pipeline.dpi must be positive".into()));
        }
        if self.pipeline.workers == Some(0) {
            return Err(ConfigError::Invalid(
                "pipeline.workers must be at least 1".into(),
            ));
        }
        if self.raster.image_set_dpi == 0 {
            return Err(ConfigError::Invalid(
                "raster.image_set_dpi must be positive".into(),
            ));
        }
        if self.preprocess.clahe_grid == 0 {
            return Err(ConfigError::Invalid(
                "preprocess.clahe_grid must be positive".into(),
            ));
        }
        let clip = self.preprocess.clahe_clip_limit;
        if clip.is_nan() || clip <= 0.0 {
            return Err(ConfigError::Invalid(
                "preprocess.clahe_clip_limit must be positive".into(),
            ));
        }
        if self.retry.max_attempts > 0 && self.retry.max_dpi < self.pipeline.dpi {
            return Err(ConfigError::Invalid(format!(
                "retry.max_dpi ({}) is below pipeline.dpi ({})",
                self.retry.max_dpi, self.pipeline.dpi
            )));
        }
        Ok(())
    }
}

/// Use prefer for file discovery; parsing stays with serde.
async fn discover() -> Option<PathBuf> {
    match prefer::load("tallyscan").await {
        Ok(found) => found.source_path().map(|p| p.to_path_buf()),
        Err(_) => None,
    }
}
