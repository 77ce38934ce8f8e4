// Configuration management for the fastcon CLI
//
// Controller settings stored as JSON in:
// - macOS: ~/Library/Application Support/fastcon/config.json
// - Linux: ~/.config/fastcon/config.json
// - Windows: %APPDATA%\fastcon\config.json
//
// Any command accepts --config to point somewhere else.

use anyhow::{Context, Result};
use fastcon_core::{ControllerConfig, MeshKey, PairingQueuePolicy};
use std::path::{Path, PathBuf};

pub const KEYS: &[&str] = &[
    "mesh_key",
    "adv_interval_min",
    "adv_interval_max",
    "adv_duration_ms",
    "adv_gap_ms",
    "max_queue_size",
    "debounce.settle_ms",
    "debounce.min_interval_ms",
    "pairing_queue_policy",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub controller: ControllerConfig,
    path: PathBuf,
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        Ok(dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("fastcon"))
    }

    /// Explicit path if given, otherwise the platform default
    pub fn resolve(path: Option<PathBuf>) -> Result<PathBuf> {
        match path {
            Some(path) => Ok(path),
            None => Ok(Self::config_dir()?.join("config.json")),
        }
    }

    /// Write a fresh config holding `mesh_key` and defaults for the rest
    pub fn init(path: PathBuf, mesh_key: MeshKey, force: bool) -> Result<Self> {
        if path.exists() && !force {
            anyhow::bail!(
                "Config file already exists: {} (use --force to overwrite)",
                path.display()
            );
        }

        let config = Self {
            controller: ControllerConfig::new(mesh_key),
            path,
        };
        config.save()?;
        Ok(config)
    }

    pub fn load(path: PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read config file {} (create one with `fastcon config init <mesh-key>`)",
                path.display()
            )
        })?;
        let controller =
            ControllerConfig::from_json(&contents).context("Failed to parse config file")?;
        Ok(Self { controller, path })
    }

    /// Load the file if present. A mesh key override alone is enough to
    /// run with defaults.
    pub fn load_or_override(path: PathBuf, mesh_key: Option<MeshKey>) -> Result<ControllerConfig> {
        match (path.exists(), mesh_key) {
            (false, Some(key)) => Ok(ControllerConfig::new(key)),
            (_, key) => {
                let mut controller = Self::load(path)?.controller;
                if let Some(key) = key {
                    controller.mesh_key = key;
                }
                Ok(controller)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).context("Failed to create config directory")?;
        }
        let contents = self
            .controller
            .to_json_pretty()
            .context("Failed to serialize config")?;
        std::fs::write(&self.path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Set a config value, validate the result and save it
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut updated = self.controller.clone();
        match key {
            "mesh_key" => {
                updated.mesh_key = MeshKey::from_hex(value).context("Invalid mesh key")?;
            }
            "adv_interval_min" => {
                updated.adv_interval_min = parse_u16(value).context("Invalid interval")?;
            }
            "adv_interval_max" => {
                updated.adv_interval_max = parse_u16(value).context("Invalid interval")?;
            }
            "adv_duration_ms" => {
                updated.adv_duration_ms = value.parse().context("Invalid number")?;
            }
            "adv_gap_ms" => {
                updated.adv_gap_ms = value.parse().context("Invalid number")?;
            }
            "max_queue_size" => {
                updated.max_queue_size = value.parse().context("Invalid number")?;
            }
            "debounce.settle_ms" => {
                updated.debounce.settle_ms = value.parse().context("Invalid number")?;
            }
            "debounce.min_interval_ms" => {
                updated.debounce.min_interval_ms = value.parse().context("Invalid number")?;
            }
            "pairing_queue_policy" => {
                updated.pairing_queue_policy = match value {
                    "retain" => PairingQueuePolicy::Retain,
                    "clear" => PairingQueuePolicy::Clear,
                    other => anyhow::bail!("Invalid policy '{}' (expected retain or clear)", other),
                };
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }

        updated.validate()?;
        self.controller = updated;
        self.save()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let c = &self.controller;
        match key {
            "mesh_key" => Some(c.mesh_key.to_hex()),
            "adv_interval_min" => Some(format!("0x{:02x}", c.adv_interval_min)),
            "adv_interval_max" => Some(format!("0x{:02x}", c.adv_interval_max)),
            "adv_duration_ms" => Some(c.adv_duration_ms.to_string()),
            "adv_gap_ms" => Some(c.adv_gap_ms.to_string()),
            "max_queue_size" => Some(c.max_queue_size.to_string()),
            "debounce.settle_ms" => Some(c.debounce.settle_ms.to_string()),
            "debounce.min_interval_ms" => Some(c.debounce.min_interval_ms.to_string()),
            "pairing_queue_policy" => Some(
                match c.pairing_queue_policy {
                    PairingQueuePolicy::Retain => "retain",
                    PairingQueuePolicy::Clear => "clear",
                }
                .to_string(),
            ),
            _ => None,
        }
    }

    pub fn list(&self) -> Vec<(String, String)> {
        KEYS.iter()
            .filter_map(|key| self.get(key).map(|value| (key.to_string(), value)))
            .collect()
    }
}

/// Decimal or `0x`-prefixed hex
pub fn parse_u16(value: &str) -> Result<u16> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16)?,
        None => value.parse()?,
    };
    Ok(parsed)
}
