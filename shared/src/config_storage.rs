//! Configuration storage for guider settings and calibration data.
//!
//! Everything lives in one directory, ~/.guider_config/ by default.

use crate::axis::MountAxis;
use crate::calibration_record::CalibrationRecord;
use crate::config::GuiderConfig;
use crate::hot_pixels::HotPixelMap;
use std::path::{Path, PathBuf};

/// Configuration storage manager.
///
/// Getters return `None` when nothing has been saved yet and `Some(Err)` when
/// a file exists but cannot be read.
#[derive(Debug, Clone)]
pub struct ConfigStorage {
    /// Root directory for all configuration (e.g., ~/.guider_config)
    root_path: PathBuf,
}

impl ConfigStorage {
    /// Create a new config storage with default path (~/.guider_config)
    pub fn new() -> std::io::Result<Self> {
        let home = std::env::var("HOME")
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::NotFound, "HOME not set"))?;
        let root_path = PathBuf::from(home).join(".guider_config");
        Ok(Self { root_path })
    }

    /// Create a new config storage with custom root path
    pub fn with_path(root_path: PathBuf) -> Self {
        Self { root_path }
    }

    /// Get the root configuration path
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    fn remove_if_exists(path: PathBuf) -> std::io::Result<bool> {
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(path)?;
        Ok(true)
    }

    // =========================================================================
    // Settings
    // =========================================================================

    fn settings_path(&self) -> PathBuf {
        self.root_path.join("settings.json")
    }

    pub fn get_settings(&self) -> Option<Result<GuiderConfig, std::io::Error>> {
        let path = self.settings_path();

        if !path.exists() {
            return None;
        }

        Some(GuiderConfig::load_from_file(&path))
    }

    /// Save settings, creating the config directory if needed.
    pub fn save_settings(&self, config: &GuiderConfig) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.root_path)?;

        let path = self.settings_path();
        config.save_to_file(&path)?;
        Ok(path)
    }

    /// Load saved settings, falling back to defaults when missing or unreadable.
    pub fn load_settings_or_default(&self) -> GuiderConfig {
        match self.get_settings() {
            Some(Ok(config)) => config,
            Some(Err(e)) => {
                log::warn!("ignoring unreadable settings file: {e}");
                GuiderConfig::default()
            }
            None => GuiderConfig::default(),
        }
    }

    // =========================================================================
    // Axis calibration
    // =========================================================================

    fn calibration_path(&self, axis: MountAxis) -> PathBuf {
        let name = match axis {
            MountAxis::Ra => "calib_ra.json",
            MountAxis::Dec => "calib_dec.json",
        };
        self.root_path.join(name)
    }

    pub fn get_calibration(
        &self,
        axis: MountAxis,
    ) -> Option<Result<CalibrationRecord, std::io::Error>> {
        let path = self.calibration_path(axis);

        if !path.exists() {
            return None;
        }

        Some(CalibrationRecord::load_from_file(&path))
    }

    pub fn save_calibration(
        &self,
        axis: MountAxis,
        record: &CalibrationRecord,
    ) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.root_path)?;

        let path = self.calibration_path(axis);
        record.save_to_file(&path)?;
        Ok(path)
    }

    /// Returns Ok(true) if the file was deleted, Ok(false) if it didn't exist.
    pub fn delete_calibration(&self, axis: MountAxis) -> std::io::Result<bool> {
        Self::remove_if_exists(self.calibration_path(axis))
    }

    // =========================================================================
    // Hot pixels
    // =========================================================================

    fn hot_pixels_path(&self) -> PathBuf {
        self.root_path.join("hotpixels.txt")
    }

    pub fn get_hot_pixels(&self) -> Option<Result<HotPixelMap, std::io::Error>> {
        let path = self.hot_pixels_path();

        if !path.exists() {
            return None;
        }

        Some(HotPixelMap::load_from_file(&path))
    }

    pub fn save_hot_pixels(&self, map: &HotPixelMap) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.root_path)?;

        let path = self.hot_pixels_path();
        map.save_to_file(&path)?;
        Ok(path)
    }

    pub fn delete_hot_pixels(&self) -> std::io::Result<bool> {
        Self::remove_if_exists(self.hot_pixels_path())
    }
}

impl Default for ConfigStorage {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self::with_path(PathBuf::from(".guider_config")))
    }
}
