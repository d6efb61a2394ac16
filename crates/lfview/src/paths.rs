use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use directories_next::ProjectDirs;
use lfconfig::ViewerConfig;

pub const ENV_CONFIG_DIR: &str = "LFVIEW_CONFIG_DIR";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "lfview";
const APPLICATION: &str = "lfview";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone)]
pub struct AppPaths {
    config_dir: PathBuf,
}

impl AppPaths {
    pub fn discover() -> Result<Self> {
        if let Some(dir) = env_override(ENV_CONFIG_DIR) {
            return Ok(Self { config_dir: dir });
        }
        let project_dirs = ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
            .ok_or_else(|| anyhow!("failed to determine user directories"))?;
        Ok(Self {
            config_dir: project_dirs.config_dir().to_path_buf(),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    Explicit(PathBuf),
    Discovered(PathBuf),
    Defaults,
}

/// Reads `explicit` when given (it must exist), else the discovered config
/// file when present, else the built-in defaults.
pub fn load_config(
    explicit: Option<&Path>,
    paths: &AppPaths,
) -> Result<(ViewerConfig, ConfigOrigin)> {
    if let Some(path) = explicit {
        let config = read_config(path)?;
        return Ok((config, ConfigOrigin::Explicit(path.to_path_buf())));
    }
    let discovered = paths.config_file();
    if discovered.is_file() {
        let config = read_config(&discovered)?;
        return Ok((config, ConfigOrigin::Discovered(discovered)));
    }
    Ok((ViewerConfig::current(), ConfigOrigin::Defaults))
}

fn read_config(path: &Path) -> Result<ViewerConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config at {}", path.display()))?;
    ViewerConfig::from_toml_str(&text)
        .with_context(|| format!("failed to load config at {}", path.display()))
}

fn env_override(name: &str) -> Option<PathBuf> {
    match env::var_os(name) {
        Some(value) if !value.is_empty() => Some(PathBuf::from(value)),
        _ => None,
    }
}
