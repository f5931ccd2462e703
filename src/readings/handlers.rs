use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    routing::get,
    Json, Router,
};
use time::{macros::format_description, OffsetDateTime, UtcOffset};
use tracing::{error, info, instrument};

use super::dto::{
    parse_date, parse_offset, ChartQuery, CreateReadingRequest, CreatedReadingResponse, DayQuery,
    LocalQuery, Pagination, ReadingItem,
};
use super::services::{record_reading, to_items, RecordError, RECENT_LIMIT};
use crate::{
    auth::AuthUser,
    glucose::{
        export::{export_csv, export_filename},
        insights::{generate_insights, Insight},
        stats::{chart_points, dates_with_readings, readings_on_day, recent, ChartPoint, QuickStats},
        GlucoseError, Reading,
    },
    state::AppState,
};

type ApiResult<T> = Result<T, (StatusCode, String)>;

pub fn readings_routes() -> Router<AppState> {
    Router::new()
        .route("/readings", get(list_readings).post(create_reading))
        .route("/readings/recent", get(recent_readings))
        .route("/readings/insights", get(insights))
        .route("/readings/stats", get(quick_stats))
        .route("/readings/chart", get(chart))
        .route("/readings/day", get(day))
        .route("/readings/dates", get(dates))
        .route("/readings/export.csv", get(export))
}

#[instrument(skip(state))]
pub async fn list_readings(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(p): Query<Pagination>,
) -> ApiResult<Json<Vec<ReadingItem>>> {
    let (limit, offset) = p.clamped();
    let readings = state
        .repo
        .list_readings_page(auth.user_id, limit, offset)
        .await
        .map_err(internal)?;
    Ok(Json(to_items(&readings).map_err(glucose_error)?))
}

#[instrument(skip(state, body))]
pub async fn create_reading(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateReadingRequest>,
) -> ApiResult<(StatusCode, Json<CreatedReadingResponse>)> {
    match record_reading(&state, auth.user_id, body).await {
        Ok(created) => {
            info!(user_id = %auth.user_id, reading_id = %created.reading.reading.id, "reading recorded");
            Ok((StatusCode::CREATED, Json(created)))
        }
        Err(RecordError::Invalid(e)) => Err(glucose_error(e)),
        Err(RecordError::Repo(e)) => {
            error!(error = %e, user_id = %auth.user_id, "record_reading failed");
            Err(internal(e))
        }
    }
}

#[instrument(skip(state))]
pub async fn recent_readings(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<ReadingItem>>> {
    let readings = load_all(&state, &auth).await?;
    let newest = recent(&readings, RECENT_LIMIT);
    Ok(Json(to_items(newest).map_err(glucose_error)?))
}

#[instrument(skip(state))]
pub async fn insights(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<Insight>>> {
    let readings = load_all(&state, &auth).await?;
    Ok(Json(generate_insights(&readings).map_err(glucose_error)?))
}

#[instrument(skip(state))]
pub async fn quick_stats(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(q): Query<LocalQuery>,
) -> ApiResult<Json<QuickStats>> {
    let now = local_now(q.offset_minutes)?;
    let readings = load_all(&state, &auth).await?;
    Ok(Json(QuickStats::compute(&readings, now)))
}

#[instrument(skip(state))]
pub async fn chart(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(q): Query<ChartQuery>,
) -> ApiResult<Json<Vec<ChartPoint>>> {
    let now = local_now(q.offset_minutes)?;
    let readings = load_all(&state, &auth).await?;
    Ok(Json(chart_points(&readings, q.view, now).map_err(glucose_error)?))
}

#[instrument(skip(state))]
pub async fn day(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(q): Query<DayQuery>,
) -> ApiResult<Json<Vec<ReadingItem>>> {
    let offset = parse_offset(q.offset_minutes).map_err(bad_request)?;
    let date = parse_date(&q.date).map_err(bad_request)?;
    let readings = load_all(&state, &auth).await?;
    let on_day = readings_on_day(&readings, date, offset);
    Ok(Json(to_items(on_day).map_err(glucose_error)?))
}

/// Local dates (`YYYY-MM-DD`) that have readings, for the date picker.
#[instrument(skip(state))]
pub async fn dates(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(q): Query<LocalQuery>,
) -> ApiResult<Json<Vec<String>>> {
    let offset = parse_offset(q.offset_minutes).map_err(bad_request)?;
    let readings = load_all(&state, &auth).await?;
    let dates = dates_with_readings(&readings, offset)
        .into_iter()
        .map(|d| d.format(format_description!("[year]-[month]-[day]")))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| glucose_error(e.into()))?;
    Ok(Json(dates))
}

#[instrument(skip(state))]
pub async fn export(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(q): Query<LocalQuery>,
) -> ApiResult<([(header::HeaderName, String); 2], String)> {
    let now = local_now(q.offset_minutes)?;
    let readings = load_all(&state, &auth).await?;
    if readings.is_empty() {
        return Err((StatusCode::NOT_FOUND, "No data to export".into()));
    }

    let body = export_csv(&readings, now.offset()).map_err(glucose_error)?;
    let filename = export_filename(now).map_err(glucose_error)?;
    info!(user_id = %auth.user_id, rows = readings.len(), "readings exported");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    ))
}

async fn load_all(state: &AppState, auth: &AuthUser) -> ApiResult<Vec<Reading>> {
    state.repo.list_readings(auth.user_id).await.map_err(|e| {
        error!(error = %e, user_id = %auth.user_id, "list_readings failed");
        internal(e)
    })
}

fn local_now(offset_minutes: Option<i32>) -> ApiResult<OffsetDateTime> {
    let offset: UtcOffset = parse_offset(offset_minutes).map_err(bad_request)?;
    Ok(OffsetDateTime::now_utc().to_offset(offset))
}

fn glucose_error(e: GlucoseError) -> (StatusCode, String) {
    match e {
        GlucoseError::InvalidReading(_) => (StatusCode::BAD_REQUEST, e.to_string()),
        other => {
            error!(error = %other, "glucose computation failed");
            internal(other)
        }
    }
}

fn bad_request(msg: String) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, msg)
}

fn internal<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
