use serde::{Deserialize, Serialize};
use std::fmt;

/// The two mechanical axes of an equatorial mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MountAxis {
    /// Right ascension
    Ra,
    /// Declination
    Dec,
}

impl MountAxis {
    pub const ALL: [MountAxis; 2] = [MountAxis::Ra, MountAxis::Dec];

    /// Short operator-facing name.
    pub fn label(&self) -> &'static str {
        match self {
            MountAxis::Ra => "RA",
            MountAxis::Dec => "DEC",
        }
    }
}

impl fmt::Display for MountAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
