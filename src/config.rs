//! Startup configuration: where templates live and how the prompt looks.
//!
//! The search path is seeded, in order, from `--path` arguments, the `MICO_PATH`
//! variable, the `path` list of `mico.toml` and finally the per-user template
//! directory. `mico.toml` is read from `MICO_CONFIG` when set, otherwise from the
//! per-user configuration directory; a missing file is not an error.

use crate::resolver::SearchPath;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use log::debug;
use serde::Deserialize;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "mico.toml";
pub const DEFAULT_PROMPT: &str = "mico> ";

/// Contents of `mico.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Template directories, probed after `MICO_PATH`.
    #[serde(default)]
    pub path: Vec<PathBuf>,
    pub prompt: Option<String>,
}

impl FileConfig {
    pub fn read(file: &Path) -> Result<Self> {
        let text = fs::read_to_string(file)
            .with_context(|| format!("can't read {}", file.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid config {}", file.display()))
    }
}

/// Resolved startup settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub search_path: SearchPath,
    pub prompt: String,
}

impl Config {
    /// Load the configuration from the process environment and the user's directories.
    pub fn load(extra: &[PathBuf]) -> Result<Self> {
        let dirs = ProjectDirs::from("", "", "mico");
        let file = match std::env::var_os("MICO_CONFIG") {
            Some(path) => Some(PathBuf::from(path)),
            None => dirs.as_ref().map(|d| d.config_dir().join(CONFIG_FILE)),
        };
        let file_config = match file {
            Some(file) if file.is_file() => {
                debug!("reading {}", file.display());
                FileConfig::read(&file)?
            }
            _ => FileConfig::default(),
        };
        let mico_path = std::env::var_os("MICO_PATH");
        let user_templates = dirs.map(|d| d.data_dir().join("templates"));
        Ok(Self::assemble(
            extra,
            mico_path.as_deref(),
            file_config,
            user_templates,
        ))
    }

    /// Combine the configuration sources in precedence order.
    pub fn assemble(
        extra: &[PathBuf],
        mico_path: Option<&OsStr>,
        file_config: FileConfig,
        user_templates: Option<PathBuf>,
    ) -> Self {
        let mut search_path = SearchPath::new(extra.iter().cloned());
        if let Some(paths) = mico_path {
            for dir in std::env::split_paths(paths) {
                if !dir.as_os_str().is_empty() {
                    search_path.push(dir);
                }
            }
        }
        for dir in file_config.path {
            search_path.push(dir);
        }
        if let Some(dir) = user_templates {
            search_path.push(dir);
        }
        Self {
            search_path,
            prompt: file_config
                .prompt
                .unwrap_or_else(|| DEFAULT_PROMPT.to_string()),
        }
    }
}
