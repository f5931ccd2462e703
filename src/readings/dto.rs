use serde::{Deserialize, Serialize};
use time::{macros::format_description, Date, OffsetDateTime, UtcOffset};

use crate::glucose::{risk::RiskLevel, stats::ChartView, NewReading, Reading, ReadingType};

#[derive(Debug, Deserialize)]
pub struct CreateReadingRequest {
    pub value: f64,
    #[serde(rename = "type")]
    pub kind: ReadingType,
    /// Defaults to the time of the request.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
    pub notes: Option<String>,
    pub meal: Option<String>,
    pub medication: Option<String>,
}

impl CreateReadingRequest {
    pub fn into_new_reading(self, now: OffsetDateTime) -> NewReading {
        NewReading {
            value: self.value,
            kind: self.kind,
            timestamp: self.timestamp.unwrap_or(now),
            notes: self.notes,
            meal: self.meal,
            medication: self.medication,
        }
    }
}

/// A reading together with its derived risk band.
#[derive(Debug, Serialize)]
pub struct ReadingItem {
    #[serde(flatten)]
    pub reading: Reading,
    pub risk: RiskLevel,
}

#[derive(Debug, Serialize)]
pub struct CreatedReadingResponse {
    pub reading: ReadingItem,
    /// Set when the value is in the critical band.
    pub emergency: bool,
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}
fn default_limit() -> i64 {
    20
}

impl Pagination {
    pub fn clamped(&self) -> (i64, i64) {
        (self.limit.clamp(1, 100), self.offset.max(0))
    }
}

/// Client's UTC offset in minutes, used for calendar windows and export columns.
#[derive(Debug, Default, Deserialize)]
pub struct LocalQuery {
    pub offset_minutes: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct ChartQuery {
    #[serde(default = "default_view")]
    pub view: ChartView,
    pub offset_minutes: Option<i32>,
}
fn default_view() -> ChartView {
    ChartView::Daily
}

#[derive(Debug, Deserialize)]
pub struct DayQuery {
    /// `YYYY-MM-DD`
    pub date: String,
    pub offset_minutes: Option<i32>,
}

pub fn parse_offset(minutes: Option<i32>) -> Result<UtcOffset, String> {
    let minutes = minutes.unwrap_or(0);
    UtcOffset::from_whole_seconds(minutes.saturating_mul(60))
        .map_err(|_| format!("offset_minutes out of range: {minutes}"))
}

pub fn parse_date(raw: &str) -> Result<Date, String> {
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .map_err(|_| format!("invalid date '{raw}', expected YYYY-MM-DD"))
}
