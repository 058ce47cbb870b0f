use std::fmt;

pub type Degrees = f64;

const AZIMUTH_MAX: Degrees = 360.0;
const ELEVATION_MAX: Degrees = 90.0;

/// A validated azimuth/elevation pair.
///
/// Can only be built through [`PositionReading::new`], so every value in
/// circulation satisfies `0 <= azimuth <= 360` and `0 <= elevation <= 90`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionReading {
    /// Azimuth, in degrees.
    azimuth: Degrees,
    /// Elevation, in degrees.
    elevation: Degrees,
}

/// Returned when a coordinate pair falls outside the accepted range.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("invalid position: azimuth {azimuth}°, elevation {elevation}°")]
pub struct InvalidPosition {
    pub azimuth: Degrees,
    pub elevation: Degrees,
}

impl PositionReading {
    /// Where the dish is assumed to point before the first completed move.
    pub const ORIGIN: Self = Self {
        azimuth: 0.0,
        elevation: 0.0,
    };

    pub fn new(azimuth: Degrees, elevation: Degrees) -> Result<Self, InvalidPosition> {
        // Written as range checks so NaN is rejected too.
        if (0.0..=AZIMUTH_MAX).contains(&azimuth) && (0.0..=ELEVATION_MAX).contains(&elevation) {
            Ok(Self { azimuth, elevation })
        } else {
            Err(InvalidPosition { azimuth, elevation })
        }
    }

    pub fn azimuth(&self) -> Degrees {
        self.azimuth
    }

    pub fn elevation(&self) -> Degrees {
        self.elevation
    }
}

impl Default for PositionReading {
    fn default() -> Self {
        Self::ORIGIN
    }
}

impl fmt::Display for PositionReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Az={:.1}°, El={:.1}°", self.azimuth, self.elevation)
    }
}

/// Formats degrees the way the Carryout firmware and rotctld clients expect:
/// plain decimal, always with a fractional part (`180.0`, `45.25`).
pub fn format_degrees(value: Degrees) -> String {
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

/// Software pointing window, independent of the dish's own limit switches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftLimits {
    min: PositionReading,
    max: PositionReading,
}

impl SoftLimits {
    /// The whole hardware range.
    pub const FULL_RANGE: Self = Self {
        min: PositionReading::ORIGIN,
        max: PositionReading {
            azimuth: AZIMUTH_MAX,
            elevation: ELEVATION_MAX,
        },
    };

    /// Returns `None` if `min` is above `max` on either axis.
    pub fn new(min: PositionReading, max: PositionReading) -> Option<Self> {
        if min.azimuth > max.azimuth || min.elevation > max.elevation {
            return None;
        }

        Some(Self { min, max })
    }

    pub fn contains(&self, position: &PositionReading) -> bool {
        (self.min.azimuth..=self.max.azimuth).contains(&position.azimuth)
            && (self.min.elevation..=self.max.elevation).contains(&position.elevation)
    }

    pub fn min(&self) -> PositionReading {
        self.min
    }

    pub fn max(&self) -> PositionReading {
        self.max
    }
}

impl Default for SoftLimits {
    fn default() -> Self {
        Self::FULL_RANGE
    }
}
