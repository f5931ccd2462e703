//! Aggregation helpers behind the dashboard: window filters, averages and
//! the per-type quick stats.

use serde::{Deserialize, Serialize};
use time::{macros::format_description, Date, Duration, OffsetDateTime, UtcOffset};

use super::{GlucoseError, Reading, ReadingType};

/// Target range used for the "in range" percentage (mg/dL, inclusive).
pub const TARGET_LOW: f64 = 80.0;
pub const TARGET_HIGH: f64 = 140.0;

/// Number of days covered by the quick stats.
pub const QUICK_STATS_DAYS: i64 = 7;

/// Relative time range. Calendar windows are evaluated in the offset of the
/// `now` passed alongside them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindow {
    Today,
    /// Calendar week starting on Sunday.
    ThisWeek,
    ThisMonth,
    /// Strictly newer than `now - n days`.
    LastDays(i64),
}

impl TimeWindow {
    pub fn contains(self, timestamp: OffsetDateTime, now: OffsetDateTime) -> bool {
        let today = now.date();
        let date = timestamp.to_offset(now.offset()).date();
        match self {
            TimeWindow::Today => date == today,
            TimeWindow::ThisWeek => {
                let start = today - Duration::days(today.weekday().number_days_from_sunday() as i64);
                date >= start && date < start + Duration::days(7)
            }
            TimeWindow::ThisMonth => date.year() == today.year() && date.month() == today.month(),
            TimeWindow::LastDays(n) => timestamp > now - Duration::days(n),
        }
    }
}

pub fn filter_by_window(readings: &[Reading], window: TimeWindow, now: OffsetDateTime) -> Vec<&Reading> {
    readings
        .iter()
        .filter(|r| window.contains(r.timestamp, now))
        .collect()
}

/// Percentage (0..=100) of readings with `low <= value <= high`,
/// `None` when there is nothing to measure.
pub fn average_in_range<'a, I>(readings: I, low: f64, high: f64) -> Option<f64>
where
    I: IntoIterator<Item = &'a Reading>,
{
    let (total, in_range) = readings.into_iter().fold((0usize, 0usize), |(t, n), r| {
        let hit = r.value >= low && r.value <= high;
        (t + 1, n + usize::from(hit))
    });
    if total == 0 {
        return None;
    }
    Some(in_range as f64 / total as f64 * 100.0)
}

pub fn mean<'a, I>(readings: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a Reading>,
{
    let (count, sum) = readings
        .into_iter()
        .fold((0usize, 0.0f64), |(c, s), r| (c + 1, s + r.value));
    (count > 0).then(|| sum / count as f64)
}

pub fn average_by_type<'a, I>(readings: I, kind: &ReadingType) -> Option<f64>
where
    I: IntoIterator<Item = &'a Reading>,
{
    mean(readings.into_iter().filter(|r| &r.kind == kind))
}

/// Rounded per-type averages over the quick stats window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeAverages {
    pub fasting: Option<i64>,
    pub before_meal: Option<i64>,
    pub after_meal: Option<i64>,
    pub bedtime: Option<i64>,
    pub random: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickStats {
    pub window_days: i64,
    pub readings_in_window: usize,
    pub average: Option<i64>,
    pub in_range_percentage: Option<i64>,
    pub by_type: TypeAverages,
    pub total_readings: usize,
}

impl QuickStats {
    pub fn compute(readings: &[Reading], now: OffsetDateTime) -> Self {
        let window = filter_by_window(readings, TimeWindow::LastDays(QUICK_STATS_DAYS), now);
        let avg = |kind: ReadingType| {
            average_by_type(window.iter().copied(), &kind).map(round)
        };

        Self {
            window_days: QUICK_STATS_DAYS,
            readings_in_window: window.len(),
            average: mean(window.iter().copied()).map(round),
            in_range_percentage: average_in_range(window.iter().copied(), TARGET_LOW, TARGET_HIGH)
                .map(round),
            by_type: TypeAverages {
                fasting: avg(ReadingType::Fasting),
                before_meal: avg(ReadingType::BeforeMeal),
                after_meal: avg(ReadingType::AfterMeal),
                bedtime: avg(ReadingType::Bedtime),
                random: avg(ReadingType::Random),
            },
            total_readings: readings.len(),
        }
    }
}

fn round(v: f64) -> i64 {
    v.round() as i64
}

/// The `n` newest readings, newest first.
pub fn recent(readings: &[Reading], n: usize) -> Vec<&Reading> {
    let mut sorted = newest_first(readings.iter());
    sorted.truncate(n);
    sorted
}

/// Readings whose local calendar date is `date`, newest first.
pub fn readings_on_day(readings: &[Reading], date: Date, offset: UtcOffset) -> Vec<&Reading> {
    newest_first(
        readings
            .iter()
            .filter(|r| r.timestamp.to_offset(offset).date() == date),
    )
}

/// Distinct local calendar dates that have at least one reading, ascending.
pub fn dates_with_readings(readings: &[Reading], offset: UtcOffset) -> Vec<Date> {
    let mut dates: Vec<Date> = readings
        .iter()
        .map(|r| r.timestamp.to_offset(offset).date())
        .collect();
    dates.sort_unstable();
    dates.dedup();
    dates
}

fn newest_first<'a>(readings: impl Iterator<Item = &'a Reading>) -> Vec<&'a Reading> {
    let mut out: Vec<&Reading> = readings.collect();
    out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartView {
    Daily,
    Weekly,
    Monthly,
}

impl ChartView {
    pub fn window(self) -> TimeWindow {
        match self {
            ChartView::Daily => TimeWindow::Today,
            ChartView::Weekly => TimeWindow::ThisWeek,
            ChartView::Monthly => TimeWindow::ThisMonth,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub label: String,
    pub value: f64,
    #[serde(rename = "type")]
    pub kind: ReadingType,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Readings inside the view's window, oldest first, labelled with local
/// `HH:mm` for the daily view and `MM/dd` otherwise.
pub fn chart_points(
    readings: &[Reading],
    view: ChartView,
    now: OffsetDateTime,
) -> Result<Vec<ChartPoint>, GlucoseError> {
    let label_format = match view {
        ChartView::Daily => format_description!("[hour]:[minute]"),
        ChartView::Weekly | ChartView::Monthly => format_description!("[month]/[day]"),
    };

    let mut window = filter_by_window(readings, view.window(), now);
    window.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    window
        .into_iter()
        .map(|r| -> Result<ChartPoint, GlucoseError> {
            Ok(ChartPoint {
                label: r.timestamp.to_offset(now.offset()).format(label_format)?,
                value: r.value,
                kind: r.kind.clone(),
                timestamp: r.timestamp,
            })
        })
        .collect()
}
