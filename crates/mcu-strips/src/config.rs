//! Surface configuration
//!
//! YAML-based configuration describing the unit chain (centre unit plus
//! extensions and their MIDI ports), startup behaviour, and the per-device
//! parameter bank layouts used when controlling plugin parameters.
//!
//! ```yaml
//! port_match: "MCU Pro"
//! right_extensions:
//!   - port_match: "MCU XT"
//! initial_mode: volume_pan
//! follow_selection: true
//! ```

use crate::addressing::{Chain, UnitSpec};
use crate::state::ModeKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Parameter bank layout: device class name -> banks -> parameter names
pub type DeviceBanks = BTreeMap<String, Vec<Vec<String>>>;

/// Root surface configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    /// Case-insensitive substring of the centre unit's MIDI port name
    pub port_match: String,

    /// Strips on the centre unit
    pub strips: usize,

    /// Display rows on the centre unit (2, or 4 with a second display)
    pub display_rows: usize,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub left_extensions: Vec<UnitConfig>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub right_extensions: Vec<UnitConfig>,

    /// Assignment mode on startup
    pub initial_mode: ModeKind,

    /// Move the bank so the host's selected track lands on the first strip
    pub follow_selection: bool,

    /// Parameter ordering per device class; empty means the built-in table
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub device_banks: DeviceBanks,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            port_match: "MCU".to_string(),
            strips: 8,
            display_rows: 2,
            left_extensions: Vec::new(),
            right_extensions: Vec::new(),
            initial_mode: ModeKind::VolumePan,
            follow_selection: true,
            device_banks: DeviceBanks::new(),
        }
    }
}

/// One extension unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitConfig {
    pub port_match: String,

    #[serde(default = "default_unit_strips")]
    pub strips: usize,

    #[serde(default = "default_display_rows")]
    pub display_rows: usize,
}

fn default_unit_strips() -> usize {
    8
}

fn default_display_rows() -> usize {
    2
}

impl UnitConfig {
    fn spec(&self) -> UnitSpec {
        UnitSpec {
            strips: self.strips,
            display_rows: self.display_rows,
        }
    }
}

impl SurfaceConfig {
    /// Build the unit chain this configuration describes
    pub fn chain(&self) -> Chain {
        let left: Vec<_> = self.left_extensions.iter().map(UnitConfig::spec).collect();
        let right: Vec<_> = self.right_extensions.iter().map(UnitConfig::spec).collect();
        Chain::new(
            &left,
            UnitSpec {
                strips: self.strips,
                display_rows: self.display_rows,
            },
            &right,
        )
    }

    /// Port patterns in chain order (left extensions, centre, right extensions)
    pub fn port_patterns(&self) -> Vec<&str> {
        self.left_extensions
            .iter()
            .map(|u| u.port_match.as_str())
            .chain(std::iter::once(self.port_match.as_str()))
            .chain(self.right_extensions.iter().map(|u| u.port_match.as_str()))
            .collect()
    }

    /// Bank table in effect (configured, or the built-in one)
    pub fn effective_device_banks(&self) -> DeviceBanks {
        if self.device_banks.is_empty() {
            default_device_banks()
        } else {
            self.device_banks.clone()
        }
    }
}

/// Built-in parameter bank layouts for common devices
pub fn default_device_banks() -> DeviceBanks {
    fn banks(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|bank| bank.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    let mut table = DeviceBanks::new();
    table.insert(
        "Compressor2".to_string(),
        banks(&[&[
            "Threshold",
            "Ratio",
            "Attack",
            "Release",
            "Output Gain",
            "Knee",
            "Dry/Wet",
            "Model",
        ]]),
    );
    table.insert(
        "AutoFilter".to_string(),
        banks(&[
            &[
                "Filter Type",
                "Frequency",
                "Resonance",
                "Env. Modulation",
                "Env. Attack",
                "Env. Release",
                "LFO Amount",
                "LFO Frequency",
            ],
            &["LFO Waveform", "LFO Phase", "LFO Offset", "Dry/Wet"],
        ]),
    );
    table.insert(
        "Reverb".to_string(),
        banks(&[&[
            "Predelay",
            "Decay Time",
            "Room Size",
            "Diffusion",
            "Stereo Image",
            "Freeze On",
            "Reflect Level",
            "Dry/Wet",
        ]]),
    );
    table
}

/// Default config file location
pub fn default_surface_config_path() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mcu-strips")
        .join("surface.yaml")
}

/// Load the surface configuration from a YAML file
///
/// Falls back to defaults when the file is missing or unreadable.
pub fn load_surface_config(path: &Path) -> SurfaceConfig {
    log::info!("load_surface_config: Loading from {:?}", path);

    if !path.exists() {
        log::info!("load_surface_config: Config file doesn't exist, using defaults");
        return SurfaceConfig::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<SurfaceConfig>(&contents) {
            Ok(config) => {
                log::info!(
                    "load_surface_config: centre '{}', {} left / {} right extension(s)",
                    config.port_match,
                    config.left_extensions.len(),
                    config.right_extensions.len()
                );
                config
            }
            Err(e) => {
                log::warn!("load_surface_config: Failed to parse config: {}", e);
                SurfaceConfig::default()
            }
        },
        Err(e) => {
            log::warn!("load_surface_config: Failed to read config file: {}", e);
            SurfaceConfig::default()
        }
    }
}

/// Save the surface configuration to a YAML file
pub fn save_surface_config(config: &SurfaceConfig, path: &Path) -> anyhow::Result<()> {
    use anyhow::Context;

    log::info!("save_surface_config: Saving to {:?}", path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml =
        serde_yaml::to_string(config).context("Failed to serialize surface config to YAML")?;

    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write surface config file: {:?}", path))?;

    Ok(())
}

/// Strip OS-specific decorations from a MIDI port name
///
/// ALSA reports names like `"MCU Pro Port 1 [hw:2,0,0]"` or
/// `"MCU Pro:MCU Pro MIDI 1 24:0"`; the bracketed hardware id and the trailing
/// `client:port` pair change between sessions and are removed before matching.
pub fn normalize_port_name(name: &str) -> String {
    let mut result = name.trim();

    if let Some(bracket_pos) = result.rfind('[') {
        result = result[..bracket_pos].trim();
    }

    if let Some(last_space) = result.rfind(' ') {
        let suffix = &result[last_space + 1..];
        if let Some((client, port)) = suffix.split_once(':') {
            let numeric = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
            if numeric(client) && numeric(port) {
                result = result[..last_space].trim();
            }
        }
    }

    result.to_string()
}

/// Case-insensitive substring match of a port name against a pattern
pub fn port_matches(actual_port: &str, pattern: &str) -> bool {
    normalize_port_name(actual_port)
        .to_lowercase()
        .contains(&pattern.to_lowercase())
}
