use anyhow::Context;
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use super::dto::{CreateReadingRequest, CreatedReadingResponse, ReadingItem};
use crate::glucose::{
    risk::{classify, RiskLevel},
    GlucoseError, Reading,
};
use crate::state::AppState;

/// Number of readings on the dashboard's "recent" card.
pub const RECENT_LIMIT: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error(transparent)]
    Invalid(#[from] GlucoseError),
    #[error(transparent)]
    Repo(#[from] anyhow::Error),
}

pub fn to_item(reading: Reading) -> Result<ReadingItem, GlucoseError> {
    let risk = classify(reading.value, &reading.kind)?;
    Ok(ReadingItem { reading, risk })
}

pub fn to_items<'a, I>(readings: I) -> Result<Vec<ReadingItem>, GlucoseError>
where
    I: IntoIterator<Item = &'a Reading>,
{
    readings.into_iter().cloned().map(to_item).collect()
}

/// Validate and store a reading, flagging critical values.
pub async fn record_reading(
    state: &AppState,
    user_id: Uuid,
    req: CreateReadingRequest,
) -> Result<CreatedReadingResponse, RecordError> {
    let new = req.into_new_reading(OffsetDateTime::now_utc()).validate()?;
    // classify before storing so an unclassifiable value never lands in the table
    let risk = classify(new.value, &new.kind)?;

    let reading = state
        .repo
        .insert_reading(user_id, new)
        .await
        .context("insert reading")?;

    let emergency = risk == RiskLevel::Critical;
    if emergency {
        warn!(%user_id, reading_id = %reading.id, value = reading.value, kind = %reading.kind, "critical reading recorded");
    }

    Ok(CreatedReadingResponse {
        reading: ReadingItem { reading, risk },
        emergency,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glucose::ReadingType;

    fn request(value: f64, kind: ReadingType) -> CreateReadingRequest {
        CreateReadingRequest {
            value,
            kind,
            timestamp: None,
            notes: Some("".into()),
            meal: None,
            medication: Some("insulin".into()),
        }
    }

    #[tokio::test]
    async fn record_reading_stores_and_classifies() {
        let state = AppState::fake();
        let user = Uuid::new_v4();

        let created = record_reading(&state, user, request(112.0, ReadingType::Fasting))
            .await
            .unwrap();
        assert_eq!(created.reading.risk, RiskLevel::High);
        assert!(!created.emergency);
        assert_eq!(created.reading.reading.notes, None);

        let stored = state.repo.list_readings(user).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].medication.as_deref(), Some("insulin"));
    }

    #[tokio::test]
    async fn record_reading_flags_emergencies() {
        let state = AppState::fake();
        let created = record_reading(&state, Uuid::new_v4(), request(55.0, ReadingType::Random))
            .await
            .unwrap();
        assert!(created.emergency);
        assert_eq!(created.reading.risk, RiskLevel::Critical);
    }

    #[tokio::test]
    async fn record_reading_rejects_invalid_input_without_storing() {
        let state = AppState::fake();
        let user = Uuid::new_v4();
        let err = record_reading(&state, user, request(-1.0, ReadingType::Random))
            .await
            .unwrap_err();
        assert!(matches!(err, RecordError::Invalid(_)));

        let err = record_reading(&state, user, request(100.0, ReadingType::Other("snack".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, RecordError::Invalid(_)));
        assert!(state.repo.list_readings(user).await.unwrap().is_empty());
    }
}
