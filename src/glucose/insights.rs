use serde::{Deserialize, Serialize};

use super::risk::{classify, RiskLevel};
use super::{GlucoseError, Reading, ReadingType};

/// Minimum history length before a trend is reported.
pub const TREND_MIN_READINGS: usize = 6;
/// Difference between half means (mg/dL) that counts as a trend.
pub const TREND_DELTA: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightLevel {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub title: String,
    pub description: String,
    pub level: InsightLevel,
}

impl Insight {
    fn new(title: impl Into<String>, description: impl Into<String>, level: InsightLevel) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            level,
        }
    }
}

/// Observations over a reading history, always in the order
/// average, most recent, trend (if any).
pub fn generate_insights(readings: &[Reading]) -> Result<Vec<Insight>, GlucoseError> {
    if readings.is_empty() {
        return Ok(vec![Insight::new(
            "No readings yet",
            "Log your first blood sugar reading to start seeing personalized insights.",
            InsightLevel::Info,
        )]);
    }

    // sort_by is stable: equal timestamps keep their input order
    let mut sorted: Vec<&Reading> = readings.iter().collect();
    sorted.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    let values: Vec<f64> = sorted.iter().map(|r| r.value).collect();

    let mut insights = Vec::with_capacity(3);

    let avg = mean(&values);
    let avg_risk = classify(avg, &ReadingType::Random)?;
    insights.push(Insight::new(
        "Average glucose",
        format!(
            "Your average across {} reading{} is {} mg/dL, which is {}.",
            values.len(),
            if values.len() == 1 { "" } else { "s" },
            avg.round(),
            avg_risk
        ),
        if avg_risk == RiskLevel::Normal {
            InsightLevel::Info
        } else {
            InsightLevel::Warning
        },
    ));

    // non-empty, checked above
    let latest = sorted[sorted.len() - 1];
    let latest_risk = classify(latest.value, &latest.kind)?;
    insights.push(Insight::new(
        "Latest reading",
        format!(
            "Your most recent {} reading was {} mg/dL, which is {}.",
            latest.kind.describe(),
            latest.value,
            latest_risk
        ),
        if latest_risk == RiskLevel::Critical {
            InsightLevel::Critical
        } else {
            InsightLevel::Info
        },
    ));

    if let Some(trend) = trend_insight(&values) {
        insights.push(trend);
    }

    Ok(insights)
}

fn trend_insight(values: &[f64]) -> Option<Insight> {
    if values.len() < TREND_MIN_READINGS {
        return None;
    }
    let (first, second) = values.split_at(values.len() / 2);
    let (before, after) = (mean(first), mean(second));
    let delta = after - before;
    if delta.abs() <= TREND_DELTA {
        return None;
    }

    let insight = if delta > 0.0 {
        Insight::new(
            "Trending upward",
            format!(
                "Your recent readings average {} mg/dL, up from {} mg/dL earlier.",
                after.round(),
                before.round()
            ),
            InsightLevel::Warning,
        )
    } else {
        Insight::new(
            "Trending downward",
            format!(
                "Your recent readings average {} mg/dL, down from {} mg/dL earlier.",
                after.round(),
                before.round()
            ),
            InsightLevel::Info,
        )
    };
    Some(insight)
}

// running mean; a plain sum overflows on extreme inputs
fn mean(values: &[f64]) -> f64 {
    values
        .iter()
        .enumerate()
        .fold(0.0, |m, (i, v)| m + (v - m) / (i + 1) as f64)
}
