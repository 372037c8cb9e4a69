//! Search configuration
//!
//! Supports loading configuration from vdjseg.toml files, with builder-style
//! overrides for programmatic use.

use crate::types::Algorithm;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Decoding algorithm passed through to the engine
    #[serde(default)]
    pub algorithm: Algorithm,

    /// Directory holding the per-gene HMM model files
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Only look at the first n gene versions per region (0 = all)
    #[serde(default)]
    pub n_max_versions: usize,

    /// Worker threads for the sweep
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Evaluate cut points one at a time, in order
    #[serde(default)]
    pub deterministic: bool,
}

fn default_model_dir() -> PathBuf { PathBuf::from("hmms") }
fn default_threads() -> usize { num_cpus::get() }

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            model_dir: default_model_dir(),
            n_max_versions: 0,
            threads: default_threads(),
            deterministic: false,
        }
    }
}

impl SearchConfig {
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_model_dir(mut self, model_dir: impl Into<PathBuf>) -> Self {
        self.model_dir = model_dir.into();
        self
    }

    pub fn with_n_max_versions(mut self, n_max_versions: usize) -> Self {
        self.n_max_versions = n_max_versions;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }

    /// Whether the sweep should fan out over a worker pool
    pub fn is_parallel(&self) -> bool {
        self.threads > 1 && !self.deterministic
    }

    /// Load configuration from file or use defaults
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(path)?
            }
            None => {
                let default_path = PathBuf::from("vdjseg.toml");
                if default_path.exists() {
                    log::info!("Loading configuration from: vdjseg.toml");
                    Self::load_from_file(&default_path)?
                } else {
                    log::info!("Using default configuration");
                    Self::default()
                }
            }
        };

        Ok(config)
    }

    /// Load configuration from a specific TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;

        let config: SearchConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse configuration file: {}", path.display()))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write configuration file: {}", path.display()))?;

        Ok(())
    }

    /// Generate example configuration file content
    pub fn example_toml() -> Result<String> {
        toml::to_string_pretty(&Self::default()).context("Failed to serialize default configuration")
    }
}
