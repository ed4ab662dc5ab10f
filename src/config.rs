// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::backends::camera::{CaptureBackendType, Resolution};
use crate::constants::{
    DEFAULT_DEVICE_PATH, DEFAULT_EDGE_HIGH_THRESHOLD, DEFAULT_EDGE_LOW_THRESHOLD,
    DEFAULT_RENDER_FPS, DEFAULT_RESOLUTION, DEFAULT_SYNTHETIC_FPS,
};
use crate::engine::EdgeParams;
use crate::errors::{AppError, AppResult};

/// Directory name under the user config directory
const CONFIG_DIR_NAME: &str = "edge-viewer";
const CONFIG_FILE_NAME: &str = "config.json";

/// How camera permission is decided at launch
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum PermissionPolicy {
    /// Prompt the user on the terminal
    #[default]
    Ask,
    /// Treat permission as already granted
    Granted,
    /// Treat permission as refused
    Denied,
}

impl std::str::FromStr for PermissionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ask" => Ok(PermissionPolicy::Ask),
            "granted" | "grant" | "yes" => Ok(PermissionPolicy::Granted),
            "denied" | "deny" | "no" => Ok(PermissionPolicy::Denied),
            other => Err(format!("unknown permission policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Capture driver to use (V4L2 or synthetic)
    pub backend: CaptureBackendType,
    /// V4L2 device node
    pub device_path: String,
    /// Requested capture width
    pub width: u32,
    /// Requested capture height
    pub height: u32,
    /// Render loop cadence
    pub render_fps: u32,
    /// Frame rate of the synthetic source
    pub synthetic_fps: u32,
    /// Edge detector hysteresis thresholds
    pub edge_low_threshold: u16,
    pub edge_high_threshold: u16,
    /// Camera permission at launch
    pub permission: PermissionPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: CaptureBackendType::default(),
            device_path: DEFAULT_DEVICE_PATH.to_string(),
            width: DEFAULT_RESOLUTION.width,
            height: DEFAULT_RESOLUTION.height,
            render_fps: DEFAULT_RENDER_FPS,
            synthetic_fps: DEFAULT_SYNTHETIC_FPS,
            edge_low_threshold: DEFAULT_EDGE_LOW_THRESHOLD,
            edge_high_threshold: DEFAULT_EDGE_HIGH_THRESHOLD,
            permission: PermissionPolicy::default(),
        }
    }
}

impl Config {
    /// Default location of the config file
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            debug!("No config directory, using defaults");
            return Self::default();
        };
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable config");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&contents)?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        debug!(path = %path.display(), "Saved config");
        Ok(())
    }

    /// Save to the default location
    pub fn save(&self) -> AppResult<()> {
        let path = Self::config_path()
            .ok_or_else(|| AppError::Config("no config directory".to_string()))?;
        self.save_to(&path)
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    pub fn edge_params(&self) -> EdgeParams {
        EdgeParams {
            low: self.edge_low_threshold,
            high: self.edge_high_threshold,
        }
    }
}
