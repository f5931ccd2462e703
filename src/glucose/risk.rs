use std::fmt;

use serde::{Deserialize, Serialize};

use super::{GlucoseError, ReadingType};

/// Hypoglycemia cut-off, applies to every reading type.
pub const HYPO_THRESHOLD: f64 = 70.0;
/// Extreme hyperglycemia cut-off, applies to every reading type.
pub const HYPER_THRESHOLD: f64 = 300.0;

/// Severity of a single value, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Normal,
    High,
    Critical,
}

impl RiskLevel {
    pub fn label(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Normal => "normal",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Band edges: below `low` is low, up to `normal` inclusive is normal,
/// up to `high` inclusive is high, anything above is critical.
struct Band {
    low: f64,
    normal: f64,
    high: f64,
}

const FASTING: Band = Band { low: 80.0, normal: 100.0, high: 125.0 };
const AFTER_MEAL: Band = Band { low: 80.0, normal: 140.0, high: 180.0 };
const DEFAULT: Band = Band { low: 80.0, normal: 120.0, high: 160.0 };

fn band_for(kind: &ReadingType) -> &'static Band {
    match kind {
        ReadingType::Fasting => &FASTING,
        ReadingType::AfterMeal => &AFTER_MEAL,
        ReadingType::BeforeMeal
        | ReadingType::Bedtime
        | ReadingType::Random
        | ReadingType::Other(_) => &DEFAULT,
    }
}

/// Classify a value (mg/dL) taken in the given context.
///
/// The global hypo/hyper thresholds win over the type band. Non-finite values
/// are rejected rather than falling through the comparisons.
pub fn classify(value: f64, kind: &ReadingType) -> Result<RiskLevel, GlucoseError> {
    if !value.is_finite() {
        return Err(GlucoseError::InvalidReading(format!(
            "cannot classify non-finite value {value}"
        )));
    }
    if value < HYPO_THRESHOLD || value > HYPER_THRESHOLD {
        return Ok(RiskLevel::Critical);
    }

    let band = band_for(kind);
    let level = if value < band.low {
        RiskLevel::Low
    } else if value <= band.normal {
        RiskLevel::Normal
    } else if value <= band.high {
        RiskLevel::High
    } else {
        RiskLevel::Critical
    };
    Ok(level)
}
