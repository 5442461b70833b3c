//! Reference stars around Polaris.
//!
//! Offsets are in image coordinates (y down, positive angles clockwise) at
//! the reference focal length, measured from Polaris, sorted nearest first.

/// One reference star's offset from the pole star.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CatalogEntry {
    pub name: &'static str,
    pub distance_px: f64,
    pub angle_deg: f64,
}

const fn entry(name: &'static str, distance_px: f64, angle_deg: f64) -> CatalogEntry {
    CatalogEntry {
        name,
        distance_px,
        angle_deg,
    }
}

pub const STARS_NEAR_POLARIS: [CatalogEntry; 15] = [
    entry("HD 5914", 98.867180, -10.647256),
    entry("* lam UMi", 479.008301, -118.529852),
    entry("HD 66368", 524.994808, 164.780381),
    entry("HD 213126", 534.725064, -51.636087),
    entry("HD 6319", 654.323145, 12.759174),
    entry("HD 22701", 820.441622, 68.948647),
    // 2.9063 degrees from Polaris, used for the scale constant
    entry("V* OV Cep", 875.677409, 129.407251),
    entry("V* UY UMi", 884.833301, -168.092577),
    entry("HD 203836", 896.804216, -59.867339),
    entry("HD 114282", 914.532044, -160.757620),
    entry("HD 42855", 927.519046, 115.447469),
    entry("HD 135294", 1060.463568, -140.366796),
    entry("* 24 UMi", 1082.153394, -105.587018),
    entry("* del UMi", 1195.457555, -104.488215),
    entry("HD 107113", 1264.471354, -170.201903),
];

/// Nominal image scale at the reference focal length.
pub const PIXELS_PER_DEGREE: f64 = 875.677409 / 2.9063;

/// Length of a sidereal day in seconds.
pub const SIDEREAL_DAY_SECONDS: f64 = 86164.09054;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_sorted_nearest_first() {
        assert!(STARS_NEAR_POLARIS
            .windows(2)
            .all(|w| w[0].distance_px < w[1].distance_px));
    }

    #[test]
    fn test_angles_normalized() {
        assert!(STARS_NEAR_POLARIS
            .iter()
            .all(|e| e.angle_deg > -180.0 && e.angle_deg <= 180.0));
    }
}
