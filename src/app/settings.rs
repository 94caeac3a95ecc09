//! Configuration management for soundfield.
//!
//! Handles loading, saving and accessing the rendering settings
//! snapshot consumed by the engine.

use crate::error::Error;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Rendering settings snapshot.
///
/// The engine consumes these through atomic replacement; it never reads
/// the configuration file itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Overall output level in [0, 1].
    pub master_volume: f32,

    /// Sources weaker than this (dBm-like scale) are excluded.
    pub signal_strength_threshold: i32,

    /// Upper bound on concurrently sonified sources, at least 1.
    pub max_active_sources: usize,

    /// Exponent in [1, 4] applied to normalized signal strength;
    /// values above 1 push weak signals toward silence.
    pub volume_curve_exponent: f32,

    /// Gain multiplier in [0, 1] for sources behind the listener.
    pub behind_attenuation: f32,

    /// Exponential smoothing time constant; 0 disables smoothing.
    pub smoothing_time_constant_ms: f32,

    /// Debug: give every source this frequency instead of the
    /// per-source tone mapping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_frequency: Option<f32>,

    /// Debug: ignore device-list updates once a non-empty list has
    /// been seen, keeping the source set repeatable.
    pub freeze_sources: bool,

    /// Debug: use this value directly as every source's relative
    /// angle, bypassing the heading/position math.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulated_azimuth: Option<f32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            master_volume: 0.8,
            signal_strength_threshold: -90,
            max_active_sources: 8,
            volume_curve_exponent: 2.0,
            behind_attenuation: 0.4,
            smoothing_time_constant_ms: 150.0,
            fixed_frequency: None,
            freeze_sources: false,
            simulated_azimuth: None,
        }
    }
}

impl Settings {
    /// Copy of the settings with every field forced into its valid
    /// range. Applied once per render block so a hand-edited config
    /// file cannot push gains outside [0, 1].
    pub fn clamped(&self) -> Settings {
        Settings {
            master_volume: self.master_volume.clamp(0.0, 1.0),
            signal_strength_threshold: self.signal_strength_threshold,
            max_active_sources: self.max_active_sources.max(1),
            volume_curve_exponent: self.volume_curve_exponent.clamp(1.0, 4.0),
            behind_attenuation: self.behind_attenuation.clamp(0.0, 1.0),
            smoothing_time_constant_ms: self.smoothing_time_constant_ms.max(0.0),
            fixed_frequency: self.fixed_frequency,
            freeze_sources: self.freeze_sources,
            simulated_azimuth: self.simulated_azimuth,
        }
    }
}

/// TOML-backed settings manager.
pub struct SettingsManager {
    settings: Settings,
    config_file: PathBuf,
}

impl SettingsManager {
    /// Create a manager backed by the user's config directory.
    pub fn new() -> Result<Self, Error> {
        let mut config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Failed to determine config directory".to_string()))?;
        config_dir.push("soundfield");

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .map_err(|e| Error::Config(format!("Failed to create config directory: {}", e)))?;
        }

        Self::with_file(config_dir.join("settings.toml"))
    }

    /// Create a manager with a custom file path (mainly for testing).
    pub fn with_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let config_file = path.as_ref().to_path_buf();
        let settings = if config_file.exists() {
            Self::load_from_file(&config_file)?
        } else {
            debug!("Settings file not found, using defaults");
            Settings::default()
        };

        Ok(Self {
            settings,
            config_file,
        })
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Settings, Error> {
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read settings file: {}", e)))?;

        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse settings file: {}", e)))
    }

    /// Save settings to the config file.
    pub fn save(&self) -> Result<(), Error> {
        let toml = toml::to_string_pretty(&self.settings)
            .map_err(|e| Error::Config(format!("Failed to serialize settings: {}", e)))?;

        if let Some(parent) = self.config_file.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    Error::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        fs::write(&self.config_file, toml)
            .map_err(|e| Error::Config(format!("Failed to write settings file: {}", e)))?;

        debug!("Saved settings to {:?}", self.config_file);
        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn update_settings(&mut self, new_settings: Settings) {
        self.settings = new_settings;
    }
}
