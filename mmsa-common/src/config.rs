//! Configuration file resolution and atomic TOML write-back

use crate::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming the fusion policy file
pub const CONFIG_ENV_VAR: &str = "MMSA_FUSION_CONFIG";

/// Environment variable naming the active deployment environment
pub const ENVIRONMENT_ENV_VAR: &str = "MMSA_ENV";

/// File name used for every discovered location
pub const CONFIG_FILE_NAME: &str = "fusion.toml";

/// Where a resolved configuration path came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOrigin {
    CommandLine,
    Environment,
    UserConfigDir,
    SystemConfigDir,
    CompiledDefault,
}

impl std::fmt::Display for ConfigOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigOrigin::CommandLine => write!(f, "command line"),
            ConfigOrigin::Environment => write!(f, "environment"),
            ConfigOrigin::UserConfigDir => write!(f, "user config dir"),
            ConfigOrigin::SystemConfigDir => write!(f, "system config dir"),
            ConfigOrigin::CompiledDefault => write!(f, "compiled default"),
        }
    }
}

/// Policy file resolution in priority order:
/// 1. Command-line argument (highest priority)
/// 2. `MMSA_FUSION_CONFIG` environment variable
/// 3. `<user config dir>/mmsa/fusion.toml` if it exists
/// 4. `/etc/mmsa/fusion.toml` if it exists (Linux only)
/// 5. `./fusion.toml` (fallback)
#[derive(Debug, Clone, Default)]
pub struct ConfigPathResolver {
    cli_arg: Option<PathBuf>,
}

impl ConfigPathResolver {
    pub fn new(cli_arg: Option<PathBuf>) -> Self {
        Self { cli_arg }
    }

    /// Resolve the policy file path. Never fails: the compiled default is
    /// returned when nothing else is configured, and a missing file is
    /// reported later by the loader.
    pub fn resolve(&self) -> (PathBuf, ConfigOrigin) {
        if let Some(path) = &self.cli_arg {
            return (path.clone(), ConfigOrigin::CommandLine);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return (PathBuf::from(path), ConfigOrigin::Environment);
            }
        }

        if let Some(path) = user_config_path() {
            if path.exists() {
                return (path, ConfigOrigin::UserConfigDir);
            }
        }

        if cfg!(target_os = "linux") {
            let system = PathBuf::from("/etc/mmsa").join(CONFIG_FILE_NAME);
            if system.exists() {
                return (system, ConfigOrigin::SystemConfigDir);
            }
        }

        debug!("No policy file configured, falling back to ./{}", CONFIG_FILE_NAME);
        (PathBuf::from(CONFIG_FILE_NAME), ConfigOrigin::CompiledDefault)
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mmsa").join(CONFIG_FILE_NAME))
}

/// Resolve the active deployment environment name.
///
/// The explicit argument wins over `MMSA_ENV`; blank values count as unset.
pub fn resolve_environment(cli_arg: Option<&str>) -> Option<String> {
    cli_arg
        .map(str::to_string)
        .or_else(|| std::env::var(ENVIRONMENT_ENV_VAR).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Serialize `value` as TOML and write it to `path` atomically.
///
/// Writes to `<path>.tmp` first and renames over the target, so a concurrent
/// reader sees either the old file or the new one, never a partial write.
pub fn write_toml_config<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(value)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, content)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        warn!("Rename {} -> {} failed: {}", tmp.display(), path.display(), e);
        let _ = std::fs::remove_file(&tmp);
        return Err(Error::Io(e));
    }

    debug!("Wrote TOML config: {}", path.display());
    Ok(())
}
