use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::consensus::{ALL_DETECTORS, ConsensusMatcher, ThresholdPolicy};
use crate::detectors::DirectoryDetector;

pub const CONFIG_ENV_VAR: &str = "PICKSENSE_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PickConfig {
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub detectors: Vec<DetectorConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MatchingConfig {
    pub radius: f64,
    pub vote_threshold: i32,
    pub threshold_policy: ThresholdPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: Option<PathBuf>,
    /// Also write coordinate files for images with no consensus point.
    pub write_empty: bool,
    pub with_votes: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectorConfig {
    pub name: String,
    pub sampling_rate: f64,
    pub dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<String>>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            radius: 10.0,
            vote_threshold: ALL_DETECTORS,
            threshold_policy: ThresholdPolicy::Relaxed,
        }
    }
}

impl DetectorConfig {
    /// Relative directories resolve against `base` (the config file's directory).
    pub fn build(&self, base: Option<&Path>) -> DirectoryDetector {
        let dir = match base {
            Some(base) if self.dir.is_relative() => base.join(&self.dir),
            _ => self.dir.clone(),
        };
        let detector = DirectoryDetector::new(self.name.clone(), self.sampling_rate, dir);
        match &self.extensions {
            Some(exts) => detector.with_extensions(exts.iter().cloned()),
            None => detector,
        }
    }
}

impl PickConfig {
    /// Configuration named by `explicit`, else by `PICKSENSE_CONFIG`, else the
    /// user config file. A named file must exist and parse. Also returns the
    /// directory that relative paths in a named file resolve against.
    pub fn resolve(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        if let Some(path) = explicit.map(Path::to_path_buf).or_else(Self::env_config_path) {
            let config = Self::from_path(&path)?;
            return Ok((config, path.parent().map(Path::to_path_buf)));
        }
        Ok((Self::load(), None))
    }

    /// The user config file, or defaults when it is missing or invalid.
    pub fn load() -> Self {
        if let Some(config_path) = Self::user_config_path()
            && let Ok(content) = std::fs::read_to_string(config_path)
            && let Ok(config) = toml::from_str(&content)
        {
            return config;
        }
        Self::default()
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn matcher(&self) -> ConsensusMatcher {
        ConsensusMatcher::new(self.matching.radius, self.matching.vote_threshold)
            .with_policy(self.matching.threshold_policy)
    }

    pub fn env_config_path() -> Option<PathBuf> {
        std::env::var_os(CONFIG_ENV_VAR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    }

    /// `<config dir>/picksense/config.toml`.
    pub fn user_config_path() -> Option<PathBuf> {
        Self::config_dir().map(|mut path| {
            path.push("config.toml");
            path
        })
    }

    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|mut path| {
            path.push("picksense");
            path
        })
    }
}
