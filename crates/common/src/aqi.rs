//! AQI classification.
//!
//! Maps a severity index onto the six US EPA bands. Breakpoints are
//! inclusive upper bounds: 50, 100, 150, 200, 300; anything above 300 is
//! Hazardous.

use serde::{Deserialize, Serialize};

/// Severity category for an AQI value, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AqiCategory {
    Good,
    Moderate,
    UnhealthySensitive,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl AqiCategory {
    pub const ALL: [AqiCategory; 6] = [
        AqiCategory::Good,
        AqiCategory::Moderate,
        AqiCategory::UnhealthySensitive,
        AqiCategory::Unhealthy,
        AqiCategory::VeryUnhealthy,
        AqiCategory::Hazardous,
    ];

    /// Ordinal band, 0 (Good) through 5 (Hazardous).
    pub fn band(self) -> u8 {
        match self {
            AqiCategory::Good => 0,
            AqiCategory::Moderate => 1,
            AqiCategory::UnhealthySensitive => 2,
            AqiCategory::Unhealthy => 3,
            AqiCategory::VeryUnhealthy => 4,
            AqiCategory::Hazardous => 5,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AqiCategory::Good => "Good",
            AqiCategory::Moderate => "Moderate",
            AqiCategory::UnhealthySensitive => "Unhealthy for Sensitive Groups",
            AqiCategory::Unhealthy => "Unhealthy",
            AqiCategory::VeryUnhealthy => "Very Unhealthy",
            AqiCategory::Hazardous => "Hazardous",
        }
    }

    /// Marker fill color.
    pub fn color_hex(self) -> &'static str {
        match self {
            AqiCategory::Good => "#10B981",
            AqiCategory::Moderate => "#F59E0B",
            AqiCategory::UnhealthySensitive => "#F97316",
            AqiCategory::Unhealthy => "#EF4444",
            AqiCategory::VeryUnhealthy => "#8B5CF6",
            AqiCategory::Hazardous => "#7F1D1D",
        }
    }

    /// Background utility class used by list views.
    pub fn color_class(self) -> &'static str {
        match self {
            AqiCategory::Good => "bg-green-500",
            AqiCategory::Moderate => "bg-yellow-500",
            AqiCategory::UnhealthySensitive => "bg-orange-500",
            AqiCategory::Unhealthy => "bg-red-500",
            AqiCategory::VeryUnhealthy => "bg-purple-500",
            AqiCategory::Hazardous => "bg-red-900",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            AqiCategory::Good => "Air quality is satisfactory",
            AqiCategory::Moderate => "Air quality is acceptable",
            AqiCategory::UnhealthySensitive => {
                "Members of sensitive groups may experience health effects"
            }
            AqiCategory::Unhealthy => "Everyone may begin to experience health effects",
            AqiCategory::VeryUnhealthy => {
                "Health alert: everyone may experience more serious health effects"
            }
            AqiCategory::Hazardous => "Health warning of emergency conditions",
        }
    }
}

/// Classify a severity index.
///
/// Total over `f64`: negative and NaN inputs land in `Good`, so callers that
/// forgot to clamp still get a category rather than a panic.
pub fn classify(value: f64) -> AqiCategory {
    if value.is_nan() || value <= 50.0 {
        AqiCategory::Good
    } else if value <= 100.0 {
        AqiCategory::Moderate
    } else if value <= 150.0 {
        AqiCategory::UnhealthySensitive
    } else if value <= 200.0 {
        AqiCategory::Unhealthy
    } else if value <= 300.0 {
        AqiCategory::VeryUnhealthy
    } else {
        AqiCategory::Hazardous
    }
}

/// Map marker diameter in pixels; worse air gets a bigger marker.
pub fn marker_size_px(aqi: u32) -> u32 {
    match aqi {
        a if a > 200 => 32,
        a if a > 150 => 28,
        a if a > 100 => 24,
        _ => 20,
    }
}
