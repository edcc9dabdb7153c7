//! Configuration management for scanbox using the prefer crate.
//!
//! A config file (TOML, YAML or JSON) is optional. Values are layered as
//! file, then `SCANBOX_*` environment variables, then command-line flags, and
//! resolved once into [`Settings`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::extraction::{ResultShape, VisionConfig, VisionProvider};
use crate::layout::DirectoryLayout;

/// Name used for config file discovery.
pub const CONFIG_NAME: &str = "scanbox";

/// Default HTTP timeout for one extraction request.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {format} config {path}: {message}")]
    Parse {
        path: PathBuf,
        format: &'static str,
        message: String,
    },
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error(
        "No API key for {provider}. Set SCANBOX_API_KEY or {env_var}, or api_key in the config file"
    )]
    MissingCredential {
        provider: VisionProvider,
        env_var: &'static str,
    },
}

/// File-level configuration. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory the stage directories live under.
    pub root: Option<String>,
    pub inbox: Option<String>,
    pub processing: Option<String>,
    pub processed: Option<String>,
    pub failed: Option<String>,
    pub output: Option<String>,
    /// `openai` or `gemini`.
    pub provider: Option<String>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    /// `segmented` or `flat`.
    pub shape: Option<String>,
    pub request_timeout_secs: Option<u64>,
    /// Path of the file this config was loaded from.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration: an explicit path if given, otherwise whatever
    /// prefer discovers in the standard locations, otherwise defaults.
    pub async fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from_path(path).await;
        }

        match prefer::load(CONFIG_NAME).await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    debug!("Discovered config file {}", path.display());
                    return Self::load_from_path(path).await;
                }
                Ok(Self::default())
            }
            Err(_) => {
                debug!("No {} config file found, using defaults", CONFIG_NAME);
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific file path.
    /// The format is chosen by extension; anything unknown is read as JSON.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parse_error = |format: &'static str, message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            format,
            message,
        };

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents).map_err(|e| parse_error("TOML", e.to_string()))?,
            "yaml" | "yml" => {
                serde_yaml::from_str(&contents).map_err(|e| parse_error("YAML", e.to_string()))?
            }
            _ => serde_json::from_str(&contents).map_err(|e| parse_error("JSON", e.to_string()))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Apply `SCANBOX_*` overrides. `SCANBOX_ROOT` is handled by the CLI.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |slot: &mut Option<String>, key: &str| {
            if let Some(value) = lookup(key) {
                *slot = Some(value);
            }
        };
        set(&mut self.provider, "SCANBOX_PROVIDER");
        set(&mut self.model, "SCANBOX_MODEL");
        set(&mut self.endpoint, "SCANBOX_ENDPOINT");
        set(&mut self.shape, "SCANBOX_SHAPE");
        set(&mut self.api_key, "SCANBOX_API_KEY");
        self
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// Paths starting with ~ are expanded; absolute paths are returned as-is.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Build the directory layout. `root_override` (from the command line)
    /// beats the configured root; both fall back to `cwd`.
    pub fn layout(&self, root_override: Option<&Path>, cwd: &Path) -> DirectoryLayout {
        let base_dir = self.base_dir().unwrap_or_else(|| cwd.to_path_buf());

        let root = match (root_override, self.root.as_deref()) {
            (Some(root), _) => self.resolve_path(&root.to_string_lossy(), cwd),
            (None, Some(root)) => self.resolve_path(root, &base_dir),
            (None, None) => cwd.to_path_buf(),
        };

        let mut layout = DirectoryLayout::under(&root);
        let overrides = [
            (&self.inbox, &mut layout.inbox),
            (&self.processing, &mut layout.processing),
            (&self.processed, &mut layout.processed),
            (&self.failed, &mut layout.failed),
            (&self.output, &mut layout.output),
        ];
        for (configured, slot) in overrides {
            if let Some(path) = configured {
                *slot = self.resolve_path(path, &base_dir);
            }
        }
        layout
    }

    /// Build the extraction settings. Fails if no API key can be found.
    pub fn vision<F>(&self, lookup: F) -> Result<VisionConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let provider = match self.provider.as_deref() {
            Some(name) => {
                VisionProvider::from_str(name).ok_or_else(|| ConfigError::InvalidValue {
                    key: "provider",
                    value: name.to_string(),
                })?
            }
            None => VisionProvider::default(),
        };

        let shape = match self.shape.as_deref() {
            Some(name) => ResultShape::from_str(name).ok_or_else(|| ConfigError::InvalidValue {
                key: "shape",
                value: name.to_string(),
            })?,
            None => ResultShape::default(),
        };

        let timeout_secs = self
            .request_timeout_secs
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "request_timeout_secs",
                value: "0".to_string(),
            });
        }

        let api_key = self
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| lookup(provider.api_key_env()))
            .ok_or(ConfigError::MissingCredential {
                provider,
                env_var: provider.api_key_env(),
            })?;

        let mut vision = VisionConfig::new(provider, api_key);
        if let Some(model) = &self.model {
            vision.model = model.clone();
        }
        if let Some(endpoint) = &self.endpoint {
            vision.endpoint = endpoint.clone();
        }
        vision.shape = shape;
        vision.request_timeout = Duration::from_secs(timeout_secs);
        Ok(vision)
    }
}

/// Where to look for configuration, from the command line.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub root: Option<PathBuf>,
}

/// Resolved settings passed to every component of a run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub layout: DirectoryLayout,
    pub vision: VisionConfig,
}

impl Settings {
    /// Resolve settings. The credential is checked before anything else so a
    /// bad setup never touches the filesystem.
    pub fn resolve<F>(
        config: &Config,
        root_override: Option<&Path>,
        cwd: &Path,
        lookup: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vision = config.vision(lookup)?;
        let layout = config.layout(root_override, cwd);
        Ok(Self { layout, vision })
    }
}

/// Read a non-empty environment variable.
pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Load the config file (if any) and apply environment overrides.
pub async fn load_config(options: &LoadOptions) -> Result<Config, ConfigError> {
    let config = Config::load(options.config_path.as_deref()).await?;
    Ok(config.with_env_overrides(env_lookup))
}
