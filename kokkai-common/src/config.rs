//! Configuration loading, secret resolution and database location
//!
//! Secrets follow the container convention: a file under `/run/secrets/<name>`
//! wins over the upper-cased environment variable of the same name.
//!
//! Database location priority:
//! 1. Command-line argument (highest priority)
//! 2. `database_url` secret (file, then `DATABASE_URL`)
//! 3. TOML config file value
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Directory mounted by the container runtime for secrets
pub const SECRETS_DIR: &str = "/run/secrets";

/// Application directory name under the platform config/data dirs
const APP_DIR: &str = "kokkai";

/// Resolve a secret from `/run/secrets/<name>`, falling back to the
/// `NAME` environment variable.
pub fn resolve_secret(name: &str) -> Option<String> {
    resolve_secret_in(Path::new(SECRETS_DIR), name)
}

/// Same as [`resolve_secret`] with an explicit secrets directory.
pub fn resolve_secret_in(secrets_dir: &Path, name: &str) -> Option<String> {
    let secret_path = secrets_dir.join(name);
    if let Ok(content) = std::fs::read_to_string(&secret_path) {
        let value = content.trim();
        if !value.is_empty() {
            debug!(secret = name, "Secret loaded from {}", secret_path.display());
            return Some(value.to_string());
        }
    }

    let env_name = name.to_uppercase();
    match std::env::var(&env_name) {
        Ok(value) if !value.trim().is_empty() => {
            debug!(secret = name, "Secret loaded from environment variable {}", env_name);
            Some(value.trim().to_string())
        }
        _ => None,
    }
}

/// Default config file path: `~/.config/kokkai/<file_name>`
pub fn default_config_path(file_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join(file_name))
}

/// Get OS-dependent default data folder
pub fn default_data_dir() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/kokkai (or /var/lib/kokkai for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("/var/lib/kokkai"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/kokkai"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\kokkai"))
    } else {
        PathBuf::from("./kokkai_data")
    }
}

/// SQLite URL of the default database file
pub fn default_database_url() -> String {
    format!("sqlite://{}", default_data_dir().join("kokkai.db").display())
}

/// Resolve the database URL following the documented priority order
pub fn resolve_database_url(cli_arg: Option<&str>, toml_value: Option<&str>) -> String {
    if let Some(url) = cli_arg {
        return url.to_string();
    }

    if let Some(url) = resolve_secret("database_url") {
        return url;
    }

    if let Some(url) = toml_value {
        return url.to_string();
    }

    default_database_url()
}

/// Load a TOML config file into `T`.
///
/// An explicitly requested file must exist. When falling back to the
/// default location a missing file is not an error: defaults are used and a
/// warning is logged.
pub fn load_toml_config<T>(explicit: Option<&Path>, default_file_name: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            path.to_path_buf()
        }
        None => match default_config_path(default_file_name) {
            Some(path) if path.exists() => path,
            _ => {
                warn!("No config file found, using compiled defaults");
                return Ok(T::default());
            }
        },
    };

    let content = std::fs::read_to_string(&path)?;
    let config = toml::from_str(&content)?;
    info!("Loaded config from {}", path.display());
    Ok(config)
}
