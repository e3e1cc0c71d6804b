//! Configuration loading and root folder resolution
//!
//! Two layers:
//! 1. **TOML bootstrap** ([`TomlConfig`]): optional file, every key has a built-in default
//! 2. **Resolved configuration** ([`ServiceConfig`]): built once at startup from the TOML
//!    values plus the resolved root folder, then handed to each component
//!
//! Root folder priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable consulted for the root folder
pub const ROOT_FOLDER_ENV: &str = "STEMDECK_ROOT_FOLDER";

/// Separation model used when an upload does not name one
pub const DEFAULT_MODEL: &str = "htdemucs_6s";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TomlConfig {
    /// Root folder holding uploads, separated stems and the catalog database
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub separation: SeparationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted request body for uploads, in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// External separation tool settings
///
/// The tool is launched as `<program> <args...> -n <model> -o <output_dir> <input>`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SeparationConfig {
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments placed before the model/output/input arguments
    #[serde(default = "default_program_args")]
    pub args: Vec<String>,

    #[serde(default = "default_model")]
    pub default_model: String,

    /// Upper bound on separations running at the same time
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Remove the raw upload and any partial tool output when a job fails
    #[serde(default)]
    pub purge_failed_jobs: bool,
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_program_args(),
            default_model: default_model(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            purge_failed_jobs: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_upload_bytes() -> usize {
    2 * 1024 * 1024 * 1024
}

fn default_program() -> String {
    "python3".to_string()
}

fn default_program_args() -> Vec<String> {
    vec!["-m".to_string(), "demucs".to_string()]
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_concurrent_jobs() -> usize {
    2
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Read and parse a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Read TOML failed ({}): {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }
}

/// Load bootstrap configuration
///
/// An explicitly requested file must exist. Without one, the platform config locations are
/// searched and built-in defaults are used when nothing is found.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    if let Some(path) = explicit {
        return TomlConfig::load(path);
    }

    match find_config_file() {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path.display());
            TomlConfig::load(&path)
        }
        None => {
            tracing::debug!("No configuration file found, using built-in defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Locate the configuration file for the platform
///
/// Tries `<config_dir>/stemdeck/config.toml`, then `/etc/stemdeck/config.toml` on Linux.
fn find_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("stemdeck").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/stemdeck/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Resolve the root folder following the documented priority order
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_config: &TomlConfig,
) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("stemdeck"))
        .unwrap_or_else(|| PathBuf::from("./stemdeck_data"))
}

/// Fully resolved service configuration
///
/// Constructed once at startup; components receive it (or the pieces they need) explicitly.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub root_folder: PathBuf,
    /// Raw uploads: `<root>/uploads`
    pub upload_dir: PathBuf,
    /// Separated stems: `<root>/separated`
    pub output_dir: PathBuf,
    /// Catalog database: `<root>/library.db`
    pub database_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    pub separation: SeparationConfig,
    pub log_level: String,
}

impl ServiceConfig {
    /// Derive the service configuration from a root folder and bootstrap values
    pub fn new(root_folder: PathBuf, toml_config: &TomlConfig) -> Self {
        Self {
            upload_dir: root_folder.join("uploads"),
            output_dir: root_folder.join("separated"),
            database_path: root_folder.join("library.db"),
            root_folder,
            host: toml_config.server.host.clone(),
            port: toml_config.server.port,
            max_upload_bytes: toml_config.server.max_upload_bytes,
            separation: toml_config.separation.clone(),
            log_level: toml_config.logging.level.clone(),
        }
    }

    /// Configuration with built-in defaults rooted at `root_folder`
    pub fn with_root_folder(root_folder: impl Into<PathBuf>) -> Self {
        Self::new(root_folder.into(), &TomlConfig::default())
    }

    /// Validate values that would otherwise fail later at runtime
    pub fn validate(&self) -> Result<()> {
        if self.separation.program.trim().is_empty() {
            return Err(Error::Config("separation.program must not be empty".to_string()));
        }
        if self.separation.max_concurrent_jobs == 0 {
            return Err(Error::Config(
                "separation.max_concurrent_jobs must be at least 1".to_string(),
            ));
        }
        if self.separation.default_model.trim().is_empty() {
            return Err(Error::Config("separation.default_model must not be empty".to_string()));
        }
        Ok(())
    }

    /// `host:port` for the HTTP listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
