use std::{convert::Infallible, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum GlucoseError {
    #[error("invalid reading: {0}")]
    InvalidReading(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("time format error: {0}")]
    Format(#[from] time::error::Format),

    #[error("export failed: {0}")]
    Export(String),
}

/// Context a reading was taken in.
///
/// Unrecognised wire values are kept as `Other` instead of failing to parse,
/// so they still classify through the default band.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ReadingType {
    Fasting,
    BeforeMeal,
    AfterMeal,
    Bedtime,
    Random,
    Other(String),
}

impl ReadingType {
    pub const KNOWN: [ReadingType; 5] = [
        ReadingType::Fasting,
        ReadingType::BeforeMeal,
        ReadingType::AfterMeal,
        ReadingType::Bedtime,
        ReadingType::Random,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            ReadingType::Fasting => "fasting",
            ReadingType::BeforeMeal => "before-meal",
            ReadingType::AfterMeal => "after-meal",
            ReadingType::Bedtime => "bedtime",
            ReadingType::Random => "random",
            ReadingType::Other(raw) => raw,
        }
    }

    pub fn is_known(&self) -> bool {
        Self::KNOWN.contains(self)
    }

    /// Human form used in insight text ("after meal").
    pub fn describe(&self) -> String {
        self.as_str().replace('-', " ")
    }
}

impl FromStr for ReadingType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "fasting" => ReadingType::Fasting,
            "before-meal" => ReadingType::BeforeMeal,
            "after-meal" => ReadingType::AfterMeal,
            "bedtime" => ReadingType::Bedtime,
            "random" => ReadingType::Random,
            other => ReadingType::Other(other.to_string()),
        })
    }
}

impl From<String> for ReadingType {
    fn from(s: String) -> Self {
        match s.parse::<ReadingType>() {
            Ok(kind) => kind,
            Err(never) => match never {},
        }
    }
}

impl From<ReadingType> for String {
    fn from(kind: ReadingType) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ReadingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored glucose measurement in mg/dL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: Uuid,
    pub value: f64,
    #[serde(rename = "type")]
    pub kind: ReadingType,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub notes: Option<String>,
    pub meal: Option<String>,
    pub medication: Option<String>,
}

/// Largest value accepted at ingestion, in mg/dL. Meters report "HI" well below this.
pub const MAX_READING_VALUE: f64 = 1000.0;

/// Insert payload for a reading; the id is assigned by the repository.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub value: f64,
    pub kind: ReadingType,
    pub timestamp: OffsetDateTime,
    pub notes: Option<String>,
    pub meal: Option<String>,
    pub medication: Option<String>,
}

impl NewReading {
    /// Rejects values that cannot be classified or are outside `(0, MAX_READING_VALUE]`,
    /// and types outside the known set.
    /// Blank optional text is normalised to `None`.
    pub fn validate(mut self) -> Result<Self, GlucoseError> {
        if !self.value.is_finite() {
            return Err(GlucoseError::InvalidReading(format!(
                "value must be a finite number, got {}",
                self.value
            )));
        }
        if self.value <= 0.0 {
            return Err(GlucoseError::InvalidReading(format!(
                "value must be positive, got {}",
                self.value
            )));
        }
        if self.value > MAX_READING_VALUE {
            return Err(GlucoseError::InvalidReading(format!(
                "value must be at most {MAX_READING_VALUE} mg/dL, got {}",
                self.value
            )));
        }
        if !self.kind.is_known() {
            return Err(GlucoseError::InvalidReading(format!(
                "unknown reading type '{}'",
                self.kind
            )));
        }
        self.notes = non_blank(self.notes);
        self.meal = non_blank(self.meal);
        self.medication = non_blank(self.medication);
        Ok(self)
    }
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn new_reading(value: f64, kind: ReadingType) -> NewReading {
        NewReading {
            value,
            kind,
            timestamp: datetime!(2026-10-01 08:00 UTC),
            notes: Some("  ".into()),
            meal: Some(" oatmeal ".into()),
            medication: None,
        }
    }

    #[test]
    fn parses_known_and_unknown_types() {
        assert_eq!("after-meal".parse::<ReadingType>().unwrap(), ReadingType::AfterMeal);
        assert_eq!("bedtime".parse::<ReadingType>().unwrap(), ReadingType::Bedtime);
        assert_eq!(
            "post-workout".parse::<ReadingType>().unwrap(),
            ReadingType::Other("post-workout".into())
        );
    }

    #[test]
    fn reading_type_serializes_as_wire_string() {
        let json = serde_json::to_string(&ReadingType::BeforeMeal).unwrap();
        assert_eq!(json, "\"before-meal\"");
        let back: ReadingType = serde_json::from_str("\"snack\"").unwrap();
        assert_eq!(back, ReadingType::Other("snack".into()));
    }

    #[test]
    fn reading_serializes_type_field() {
        let r = Reading {
            id: Uuid::nil(),
            value: 112.0,
            kind: ReadingType::Fasting,
            timestamp: datetime!(2026-10-01 08:00 UTC),
            notes: None,
            meal: None,
            medication: None,
        };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["type"], "fasting");
        assert_eq!(json["timestamp"], "2026-10-01T08:00:00Z");
    }

    #[test]
    fn validate_normalises_blank_text() {
        let r = new_reading(110.0, ReadingType::Random).validate().unwrap();
        assert_eq!(r.notes, None);
        assert_eq!(r.meal.as_deref(), Some("oatmeal"));
    }

    #[test]
    fn validate_accepts_upper_bound() {
        let r = new_reading(MAX_READING_VALUE, ReadingType::Random).validate().unwrap();
        assert_eq!(r.value, 1000.0);
    }

    #[test]
    fn validate_rejects_bad_values_and_unknown_types() {
        for v in [f64::NAN, f64::INFINITY, 0.0, -5.0, 1000.5, 1e308] {
            let err = new_reading(v, ReadingType::Random).validate().unwrap_err();
            assert!(matches!(err, GlucoseError::InvalidReading(_)));
        }
        let err = new_reading(100.0, ReadingType::Other("snack".into()))
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("snack"));
    }
}
