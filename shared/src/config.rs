//! Guider configuration.
//!
//! A typed replacement for the flat settings dictionary the operator UI edits.
//! Every key keeps its external name so that `apply_setting` can accept the
//! same key/value pairs the UI sends, and the JSON file stays compatible with
//! hand edits.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Pulses shorter than this cannot be produced reliably by the pulse driver.
pub const MIN_PULSE_FLOOR_MS: i64 = 5;

/// The intervalometer never leaves less than this between exposures.
pub const MIN_GAP_TIME_MS: i64 = 1000;

/// Minimum number of accepted samples for a usable axis calibration.
pub const MIN_CALIBRATION_POINTS: usize = 5;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("unknown setting key: {0}")]
    UnknownKey(String),
    #[error("cannot parse value {value:?} for {key}")]
    Parse { key: String, value: String },
    #[error("setting {key} expects a {expected} value")]
    TypeMismatch { key: String, expected: &'static str },
    #[error("setting {key} = {value} is out of range: {reason}")]
    OutOfRange {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// A loosely typed setting value as received from the operator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl SettingValue {
    /// Parse a raw setting string.
    ///
    /// `true`/`false` become booleans, anything containing a `.` is a float,
    /// everything else must be an integer.
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim();
        match s.to_ascii_lowercase().as_str() {
            "true" => return Some(SettingValue::Bool(true)),
            "false" => return Some(SettingValue::Bool(false)),
            _ => {}
        }
        if s.contains('.') {
            s.parse::<f64>().ok().map(SettingValue::Float)
        } else {
            s.parse::<i64>().ok().map(SettingValue::Int)
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match *self {
            SettingValue::Int(i) => Some(i as f64),
            SettingValue::Float(f) => Some(f),
            SettingValue::Bool(_) => None,
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match *self {
            SettingValue::Int(i) => Some(i),
            SettingValue::Float(f) if f.is_finite() => Some(f.round() as i64),
            _ => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match *self {
            SettingValue::Bool(b) => Some(b),
            SettingValue::Int(i) => Some(i != 0),
            SettingValue::Float(_) => None,
        }
    }
}

/// All tunables of the guidance loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuiderConfig {
    /// Shortest pulse the loop will issue (ms)
    pub min_pulse_wid: i64,
    /// Longest pulse the loop will issue (ms)
    pub max_pulse_wid: i64,
    /// Guide camera exposure time (ms)
    pub shutter: i64,
    /// Samples collected per axis calibration
    pub calib_points_cnt: usize,
    /// Calibration test pulse (ms), zero or negative selects automatic
    pub calibration_pulse: i64,
    /// Extra settle time added after every move (ms)
    pub move_grace: i64,
    /// Maximum dither offset from the origin (px)
    pub dither_amount: f64,
    /// A dither frame counts as calm when its pulse is at or below this (ms)
    pub dither_calmness: i64,
    /// Consecutive calm frames that end a dither
    pub dither_calm_cnt: u32,
    /// Frames after which a dither ends regardless of calmness
    pub dither_frames_cnt: u32,
    /// Consecutive bad exposures tolerated before panicking
    pub panicthresh_expoerr: u32,
    /// Correlation score above which the loop panics
    pub panicthresh_movescore: f64,
    pub backlash_hyster: i64,
    pub backlash_limit: i64,
    pub backlash_reduc: f64,
    pub backlash_lock: bool,
    /// Correlation match tolerance (px)
    pub starmove_tolerance: f64,
    /// Use early-exit correlation
    pub fast_mode: bool,
    /// Maximum distance between a click and the star it selects (px)
    pub select_tolerance: f64,
    /// Main camera exposure length (s)
    pub intervalometer_bulb_time: f64,
    /// Pause between main camera exposures (ms)
    pub intervalometer_gap_time: i64,
    /// Declination the scope points at (deg)
    pub declination: f64,
}

impl Default for GuiderConfig {
    fn default() -> Self {
        Self {
            min_pulse_wid: 50,
            max_pulse_wid: 900,
            shutter: 1000,
            calib_points_cnt: 10,
            calibration_pulse: 500,
            move_grace: 100,
            dither_amount: 5.0,
            dither_calmness: 100,
            dither_calm_cnt: 3,
            dither_frames_cnt: 10,
            panicthresh_expoerr: 5,
            panicthresh_movescore: 50.0,
            backlash_hyster: 0,
            backlash_limit: 0,
            backlash_reduc: 0.0,
            backlash_lock: false,
            starmove_tolerance: 100.0,
            fast_mode: false,
            select_tolerance: 100.0,
            intervalometer_bulb_time: 60.0,
            intervalometer_gap_time: 1000,
            declination: 0.0,
        }
    }
}

fn out_of_range<T: ToString>(key: &'static str, value: T, reason: &'static str) -> ConfigError {
    ConfigError::OutOfRange {
        key,
        value: value.to_string(),
        reason,
    }
}

impl GuiderConfig {
    /// Check every field against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shutter <= 0 {
            return Err(out_of_range("shutter", self.shutter, "must be positive"));
        }
        if self.calib_points_cnt < MIN_CALIBRATION_POINTS {
            return Err(out_of_range(
                "calib_points_cnt",
                self.calib_points_cnt,
                "must be at least 5",
            ));
        }
        if self.move_grace < 0 {
            return Err(out_of_range("move_grace", self.move_grace, "must not be negative"));
        }
        if !(self.dither_amount.is_finite() && self.dither_amount >= 0.0) {
            return Err(out_of_range(
                "dither_amount",
                self.dither_amount,
                "must be a non-negative number",
            ));
        }
        if self.dither_calmness < 0 {
            return Err(out_of_range(
                "dither_calmness",
                self.dither_calmness,
                "must not be negative",
            ));
        }
        if self.dither_calm_cnt == 0 {
            return Err(out_of_range("dither_calm_cnt", 0, "must be at least 1"));
        }
        if self.dither_frames_cnt == 0 {
            return Err(out_of_range("dither_frames_cnt", 0, "must be at least 1"));
        }
        if !(self.panicthresh_movescore.is_finite() && self.panicthresh_movescore > 0.0) {
            return Err(out_of_range(
                "panicthresh_movescore",
                self.panicthresh_movescore,
                "must be positive",
            ));
        }
        if self.backlash_hyster < 0 {
            return Err(out_of_range(
                "backlash_hyster",
                self.backlash_hyster,
                "must not be negative",
            ));
        }
        if self.backlash_limit < 0 {
            return Err(out_of_range(
                "backlash_limit",
                self.backlash_limit,
                "must not be negative",
            ));
        }
        if !(0.0..=1.0).contains(&self.backlash_reduc) {
            return Err(out_of_range(
                "backlash_reduc",
                self.backlash_reduc,
                "must be within [0, 1]",
            ));
        }
        if !(self.starmove_tolerance.is_finite() && self.starmove_tolerance > 0.0) {
            return Err(out_of_range(
                "starmove_tolerance",
                self.starmove_tolerance,
                "must be positive",
            ));
        }
        if !(self.select_tolerance.is_finite() && self.select_tolerance > 0.0) {
            return Err(out_of_range(
                "select_tolerance",
                self.select_tolerance,
                "must be positive",
            ));
        }
        if !(self.intervalometer_bulb_time.is_finite() && self.intervalometer_bulb_time > 0.0) {
            return Err(out_of_range(
                "intervalometer_bulb_time",
                self.intervalometer_bulb_time,
                "must be positive",
            ));
        }
        if !(self.declination > -90.0 && self.declination < 90.0) {
            return Err(out_of_range(
                "declination",
                self.declination,
                "must be within (-90, 90)",
            ));
        }
        Ok(())
    }

    /// Update one key from its string form.
    ///
    /// The change is only committed if the resulting configuration validates.
    pub fn apply_setting(&mut self, key: &str, raw: &str) -> Result<(), ConfigError> {
        let value = SettingValue::parse(raw).ok_or_else(|| ConfigError::Parse {
            key: key.to_string(),
            value: raw.to_string(),
        })?;

        let mut next = self.clone();
        next.set_value(key, value)?;
        next.validate()?;
        *self = next;
        log::debug!("setting {key} => {raw}");
        Ok(())
    }

    fn set_value(&mut self, key: &str, value: SettingValue) -> Result<(), ConfigError> {
        let int = || {
            value.as_i64().ok_or_else(|| ConfigError::TypeMismatch {
                key: key.to_string(),
                expected: "integer",
            })
        };
        let float = || {
            value.as_f64().ok_or_else(|| ConfigError::TypeMismatch {
                key: key.to_string(),
                expected: "numeric",
            })
        };
        let boolean = || {
            value.as_bool().ok_or_else(|| ConfigError::TypeMismatch {
                key: key.to_string(),
                expected: "boolean",
            })
        };
        let count = || {
            int().and_then(|v| {
                u32::try_from(v).map_err(|_| ConfigError::TypeMismatch {
                    key: key.to_string(),
                    expected: "non-negative integer",
                })
            })
        };

        match key {
            "min_pulse_wid" => self.min_pulse_wid = int()?,
            "max_pulse_wid" => self.max_pulse_wid = int()?,
            "shutter" => self.shutter = int()?,
            "calib_points_cnt" => self.calib_points_cnt = count()? as usize,
            "calibration_pulse" => self.calibration_pulse = int()?,
            "move_grace" => self.move_grace = int()?,
            "dither_amount" => self.dither_amount = float()?,
            "dither_calmness" => self.dither_calmness = int()?,
            "dither_calm_cnt" => self.dither_calm_cnt = count()?,
            "dither_frames_cnt" => self.dither_frames_cnt = count()?,
            "panicthresh_expoerr" => self.panicthresh_expoerr = count()?,
            "panicthresh_movescore" => self.panicthresh_movescore = float()?,
            "backlash_hyster" => self.backlash_hyster = int()?,
            "backlash_limit" => self.backlash_limit = int()?,
            "backlash_reduc" => self.backlash_reduc = float()?,
            "backlash_lock" => self.backlash_lock = boolean()?,
            "starmove_tolerance" => self.starmove_tolerance = float()?,
            "fast_mode" => self.fast_mode = boolean()?,
            "select_tolerance" => self.select_tolerance = float()?,
            "intervalometer_bulb_time" => self.intervalometer_bulb_time = float()?,
            "intervalometer_gap_time" => self.intervalometer_gap_time = int()?,
            "declination" => self.declination = float()?,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    /// Minimum pulse width after applying the hardware floor.
    pub fn effective_min_pulse(&self) -> i64 {
        self.min_pulse_wid.max(MIN_PULSE_FLOOR_MS)
    }

    /// Maximum pulse width; nonsensical values fall back to 90% of the exposure.
    pub fn effective_max_pulse(&self) -> i64 {
        if self.max_pulse_wid < MIN_PULSE_FLOOR_MS {
            (self.shutter as f64 * 0.9).round() as i64
        } else {
            self.max_pulse_wid
        }
    }

    /// Calibration test pulse, resolving automatic mode.
    pub fn effective_calibration_pulse(&self) -> i64 {
        if self.calibration_pulse <= 0 {
            (self.shutter as f64 * 0.9).round() as i64
        } else {
            self.calibration_pulse
        }
    }

    /// Gap between main camera exposures with the floor applied.
    pub fn effective_gap_time(&self) -> i64 {
        self.intervalometer_gap_time.max(MIN_GAP_TIME_MS)
    }

    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), std::io::Error> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Load from JSON file, rejecting values that do not validate
    pub fn load_from_file(path: &Path) -> Result<Self, std::io::Error> {
        let json = std::fs::read_to_string(path)?;
        let config: GuiderConfig = serde_json::from_str(&json)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        config
            .validate()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        GuiderConfig::default().validate().unwrap();
    }

    #[test]
    fn test_setting_value_parsing() {
        assert_eq!(SettingValue::parse("true"), Some(SettingValue::Bool(true)));
        assert_eq!(SettingValue::parse("False"), Some(SettingValue::Bool(false)));
        assert_eq!(SettingValue::parse("12"), Some(SettingValue::Int(12)));
        assert_eq!(SettingValue::parse("-3"), Some(SettingValue::Int(-3)));
        assert_eq!(SettingValue::parse("0.25"), Some(SettingValue::Float(0.25)));
        assert_eq!(SettingValue::parse("abc"), None);
    }

    #[test]
    fn test_apply_setting_updates_field() {
        let mut cfg = GuiderConfig::default();
        cfg.apply_setting("min_pulse_wid", "80").unwrap();
        cfg.apply_setting("backlash_reduc", "0.5").unwrap();
        cfg.apply_setting("fast_mode", "true").unwrap();
        cfg.apply_setting("dither_amount", "3").unwrap();
        assert_eq!(cfg.min_pulse_wid, 80);
        assert_eq!(cfg.backlash_reduc, 0.5);
        assert!(cfg.fast_mode);
        assert_eq!(cfg.dither_amount, 3.0);
    }

    #[test]
    fn test_apply_setting_rejects_unknown_key() {
        let mut cfg = GuiderConfig::default();
        assert_eq!(
            cfg.apply_setting("gain", "10"),
            Err(ConfigError::UnknownKey("gain".to_string()))
        );
    }

    #[test]
    fn test_apply_setting_rolls_back_invalid() {
        let mut cfg = GuiderConfig::default();
        let err = cfg.apply_setting("backlash_reduc", "1.5").unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { key: "backlash_reduc", .. }));
        assert_eq!(cfg.backlash_reduc, 0.0);

        assert!(matches!(
            cfg.apply_setting("calib_points_cnt", "-1"),
            Err(ConfigError::TypeMismatch { .. })
        ));
        assert!(matches!(
            cfg.apply_setting("fast_mode", "0.5"),
            Err(ConfigError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_effective_values() {
        let mut cfg = GuiderConfig {
            min_pulse_wid: 2,
            max_pulse_wid: 0,
            shutter: 2000,
            calibration_pulse: 0,
            intervalometer_gap_time: 200,
            ..Default::default()
        };
        assert_eq!(cfg.effective_min_pulse(), 5);
        assert_eq!(cfg.effective_max_pulse(), 1800);
        assert_eq!(cfg.effective_calibration_pulse(), 1800);
        assert_eq!(cfg.effective_gap_time(), 1000);

        cfg.calibration_pulse = 300;
        assert_eq!(cfg.effective_calibration_pulse(), 300);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: GuiderConfig = serde_json::from_str(r#"{"shutter": 2500}"#).unwrap();
        assert_eq!(cfg.shutter, 2500);
        assert_eq!(cfg.max_pulse_wid, 900);
    }

    #[test]
    fn test_declination_range() {
        let cfg = GuiderConfig {
            declination: 90.0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
