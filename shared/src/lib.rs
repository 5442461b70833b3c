//! Types shared between the guider, the pole finder and the simulation harness.

pub mod axis;
pub mod calibration_record;
pub mod config;
pub mod config_storage;
pub mod hot_pixels;
pub mod star;
pub mod timestamp;

pub use axis::MountAxis;
pub use calibration_record::CalibrationRecord;
pub use config::{ConfigError, GuiderConfig, SettingValue};
pub use config_storage::ConfigStorage;
pub use hot_pixels::{HotPixelMap, HotPixelParseError};
pub use star::{Detection, DetectedStar, ExposureCode};
pub use timestamp::Timestamp;
