//! Persistent monitor settings, loaded from an optional JSON file.
//!
//! Command-line flags override whatever the file says.

use crate::types::{RenderMode, ViewportRange, DEFAULT_BLOCK_SIZE, DEFAULT_SAMPLE_RATE};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub sample_rate: u32,
    pub block_size: usize,
    /// Console redraw rate.
    pub display_hz: u32,
    pub viewport_min: f32,
    pub viewport_max: f32,
    pub mode: RenderMode,
    /// Preferred input device name.
    pub device: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        let v = ViewportRange::default();
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
            display_hz: 20,
            viewport_min: v.min,
            viewport_max: v.max,
            mode: RenderMode::Standard,
            device: None,
        }
    }
}

impl MonitorConfig {
    /// Load from a JSON file. Returns None if file is absent or malformed.
    pub fn load(path: &Path) -> Option<Self> {
        let data = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str::<Self>(&data) {
            Ok(c) => match c.validate() {
                Ok(()) => {
                    info!("Loaded config from {:?}", path);
                    Some(c)
                }
                Err(e) => {
                    warn!("Ignoring config file {:?}: {}", path, e);
                    None
                }
            },
            Err(e) => {
                warn!("Failed to parse config file {:?}: {}", path, e);
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        std::fs::write(path, json)?;
        info!("Config saved to {:?}", path);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample_rate must be positive".into());
        }
        if self.block_size == 0 {
            return Err("block_size must be positive".into());
        }
        if self.display_hz == 0 {
            return Err("display_hz must be positive".into());
        }
        if !(self.viewport_min < self.viewport_max) {
            return Err(format!(
                "viewport_min ({}) must be below viewport_max ({})",
                self.viewport_min, self.viewport_max
            ));
        }
        Ok(())
    }

    pub fn viewport(&self) -> ViewportRange {
        ViewportRange {
            min: self.viewport_min,
            max: self.viewport_max,
        }
    }
}
