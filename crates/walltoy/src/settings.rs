use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::parse_surface_size;

pub const DEFAULT_PROXY_URL: &str = "http://127.0.0.1:7700/proxy/";

/// User settings stored as `settings.toml` in the config directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub proxy_url: String,
    pub data_dir: Option<PathBuf>,
    /// `WIDTHxHEIGHT`, as accepted by `--size`.
    pub surface_size: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            proxy_url: DEFAULT_PROXY_URL.to_string(),
            data_dir: None,
            surface_size: None,
        }
    }
}

impl Settings {
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("failed to read settings file at {}", path.display()))?;
            let settings: Self = toml::from_str(&contents)
                .with_context(|| format!("failed to parse settings file at {}", path.display()))?;
            Ok(settings)
        } else {
            Ok(Self::default())
        }
    }

    /// Writes the defaults on first use so there is a file to edit.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load_or_default(path);
        }
        let settings = Self::default();
        settings.persist(path)?;
        Ok(settings)
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| anyhow!("settings path has no parent: {}", path.display()))?;
        fs::create_dir_all(dir).with_context(|| {
            format!(
                "failed to prepare directory for settings file at {}",
                dir.display()
            )
        })?;
        let serialized = toml::to_string_pretty(self)
            .with_context(|| "failed to serialize settings to TOML".to_string())?;
        fs::write(path, serialized)
            .with_context(|| format!("failed to write settings file to {}", path.display()))?;
        Ok(())
    }

    pub fn surface_size(&self) -> Result<Option<(u32, u32)>> {
        self.surface_size
            .as_deref()
            .map(|spec| parse_surface_size(spec).map_err(|err| anyhow!("settings: {err}")))
            .transpose()
    }
}
