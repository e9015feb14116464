//! Layered configuration loading.
//!
//! Sources are merged in this order, later ones winning:
//!
//! 1. [`SpindleConfig::default`]
//! 2. `spindle.toml` / `spindle.yaml` from the first search path that has one
//! 3. `spindle.<profile>.toml` / `spindle.<profile>.yaml` next to it
//! 4. `SPINDLE_*` environment variables, `__` separating nested keys
//! 5. Values set on the [`ConfigLoader`]
//!
//! Which file formats are recognized depends on the `toml-config` (default)
//! and `yaml-config` features.
//!
//! ```text
//! SPINDLE_PROFILE=production
//! SPINDLE_LOGGING__LEVEL=debug        # logging.level
//! SPINDLE_ROUTING__STRATEGY=cached    # routing.strategy
//! SPINDLE_DEFAULT_SCHEDULER=io        # default_scheduler
//! ```
//!
//! ```rust,ignore
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .file("./deploy/spindle.toml")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Serialized};
#[cfg(any(feature = "toml-config", feature = "yaml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::SpindleConfig;
use super::validation::validate_config;

const FILE_STEM: &str = "spindle";
const ENV_PREFIX: &str = "SPINDLE_";

/// A file format the loader was compiled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    #[cfg(feature = "toml-config")]
    Toml,
    #[cfg(feature = "yaml-config")]
    Yaml,
}

impl FileFormat {
    const ENABLED: &'static [FileFormat] = &[
        #[cfg(feature = "toml-config")]
        FileFormat::Toml,
        #[cfg(feature = "yaml-config")]
        FileFormat::Yaml,
    ];

    fn extensions(self) -> &'static [&'static str] {
        match self {
            #[cfg(feature = "toml-config")]
            Self::Toml => &["toml"],
            #[cfg(feature = "yaml-config")]
            Self::Yaml => &["yaml", "yml"],
        }
    }

    fn for_path(path: &Path) -> ConfigResult<Self> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        Self::ENABLED
            .iter()
            .copied()
            .find(|format| format.extensions().contains(&ext))
            .ok_or_else(|| ConfigError::UnsupportedFormat(ext.to_string()))
    }

    #[allow(unused_variables)]
    fn merge_into(self, figment: Figment, path: &Path) -> Figment {
        match self {
            #[cfg(feature = "toml-config")]
            Self::Toml => figment.merge(Toml::file(path)),
            #[cfg(feature = "yaml-config")]
            Self::Yaml => figment.merge(Yaml::file(path)),
        }
    }
}

/// Selects the `spindle.<profile>.*` file merged over the base file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    /// The default.
    #[default]
    Development,
    Production,
    /// Any other name, lowercased.
    Custom(String),
}

impl Profile {
    /// The name used in file names.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Parses a profile name; `prod` and `dev` are accepted as short forms.
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads `SPINDLE_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var("SPINDLE_PROFILE")
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds a [`SpindleConfig`] from files, the environment and code.
pub struct ConfigLoader {
    overrides: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a loader reading the profile from `SPINDLE_PROFILE`.
    pub fn new() -> Self {
        Self {
            overrides: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Adds a directory to search. Without any, the working directory and
    /// `<config_dir>/spindle` are searched.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Loads exactly this file; its extension picks the format.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Merges `SPINDLE_*` environment variables (the default).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Ignores the environment.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges configuration programmatically, above every other source.
    pub fn merge(mut self, config: SpindleConfig) -> Self {
        self.overrides = self.overrides.merge(Serialized::defaults(config));
        self
    }

    /// Merges a single key programmatically, e.g. `("logging.level", "debug")`.
    pub fn set<V: serde::Serialize>(mut self, key: &str, value: V) -> Self {
        self.overrides = self.overrides.merge(Serialized::default(key, value));
        self
    }

    /// Loads and validates the configuration.
    pub fn load(self) -> ConfigResult<SpindleConfig> {
        let profile = self.profile.clone();
        let config: SpindleConfig = self.build_figment()?.extract()?;
        validate_config(&config)?;

        debug!(
            profile = %profile,
            logging_level = %config.logging.level,
            schedulers = config.schedulers.len(),
            "Configuration loaded successfully"
        );
        Ok(config)
    }

    fn build_figment(self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(SpindleConfig::default()));

        match &self.config_file {
            Some(path) if !path.exists() => return Err(ConfigError::FileNotFound(path.clone())),
            Some(path) => {
                let format = FileFormat::for_path(path)?;
                info!(path = %path.display(), "Loading configuration file");
                figment = format.merge_into(figment, path);
            }
            None => {
                for (format, path) in self.discover_files() {
                    info!(path = %path.display(), "Loading configuration file");
                    figment = format.merge_into(figment, &path);
                }
            }
        }

        if self.load_env {
            trace!(prefix = ENV_PREFIX, "Merging environment overrides");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        Ok(figment.merge(self.overrides))
    }

    fn search_dirs(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        std::env::current_dir()
            .ok()
            .into_iter()
            .chain(dirs::config_dir().map(|dir| dir.join(FILE_STEM)))
            .collect()
    }

    /// Files of the first search directory holding a base or profile file,
    /// base files first so the profile file overrides them.
    fn discover_files(&self) -> Vec<(FileFormat, PathBuf)> {
        let dirs = self.search_dirs();
        let profile = self.profile.as_str();

        for dir in &dirs {
            let mut base = Vec::new();
            let mut profiled = Vec::new();
            for &format in FileFormat::ENABLED {
                for ext in format.extensions() {
                    let path = dir.join(format!("{FILE_STEM}.{ext}"));
                    if path.is_file() {
                        base.push((format, path));
                    }
                    let path = dir.join(format!("{FILE_STEM}.{profile}.{ext}"));
                    if path.is_file() {
                        debug!(path = %path.display(), %profile, "Found profile configuration");
                        profiled.push((format, path));
                    }
                }
            }
            if !base.is_empty() || !profiled.is_empty() {
                base.extend(profiled);
                return base;
            }
        }

        warn!(paths = ?dirs, "No configuration file found, using defaults");
        Vec::new()
    }
}

/// Loads the configuration from the default locations.
pub fn load_config() -> ConfigResult<SpindleConfig> {
    ConfigLoader::new().load()
}

/// Loads the configuration from a specific file, with environment overrides.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<SpindleConfig> {
    ConfigLoader::new().file(path).load()
}
