//! Reports, CSV exports and imports, and the audit trail.

use super::{
    ApiState,
    auth::{AuthUser, StaffUser},
    error::{Id, Params},
};
use crate::{
    core::{
        audit::{self, AuditFilter},
        export,
        import::{self, ImportReport},
        report::{self, CanteenReport, DailyTotal, MonthlyReport, WeeklyTotal},
    },
    entities::audit_log,
    errors::{Error, Result},
};
use axum::{
    Json,
    extract::State,
    http::{
        StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    response::IntoResponse,
};
use chrono::NaiveDate;
use serde::Deserialize;

/// Parses `YYYY-MM` (or a full `YYYY-MM-DD`) into a day of that month.
pub fn parse_month(value: &str) -> Result<NaiveDate> {
    let value = value.trim();
    let full = if value.len() == 7 {
        format!("{value}-01")
    } else {
        value.to_string()
    };
    NaiveDate::parse_from_str(&full, "%Y-%m-%d")
        .map_err(|_| Error::validation(format!("Invalid month '{value}', expected YYYY-MM")))
}

/// `?month=YYYY-MM`
#[derive(Debug, Deserialize)]
pub struct MonthQuery {
    month: String,
}

/// `?date_from=..&date_to=..`, both required
#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    date_from: NaiveDate,
    date_to: NaiveDate,
}

/// `GET /api/reports/monthly`
pub async fn monthly(
    State(state): State<ApiState>,
    _user: AuthUser,
    Params(query): Params<MonthQuery>,
) -> Result<Json<MonthlyReport>> {
    let month = parse_month(&query.month)?;
    report::monthly_report(&state.db, month).await.map(Json)
}

/// `GET /api/reports/daily-totals`
pub async fn daily_totals(
    State(state): State<ApiState>,
    _user: AuthUser,
    Params(range): Params<RangeQuery>,
) -> Result<Json<Vec<DailyTotal>>> {
    report::daily_totals(&state.db, range.date_from, range.date_to)
        .await
        .map(Json)
}

/// `GET /api/reports/weekly-totals`
pub async fn weekly_totals(
    State(state): State<ApiState>,
    _user: AuthUser,
    Params(range): Params<RangeQuery>,
) -> Result<Json<Vec<WeeklyTotal>>> {
    report::weekly_totals(&state.db, range.date_from, range.date_to)
        .await
        .map(Json)
}

/// `GET /api/reports/orders`
pub async fn orders(
    State(state): State<ApiState>,
    _user: AuthUser,
    Params(query): Params<MonthQuery>,
) -> Result<Json<CanteenReport>> {
    let month = parse_month(&query.month)?;
    report::canteen_report(&state.db, month).await.map(Json)
}

fn csv_response(filename: &str, body: String) -> impl IntoResponse {
    (
        [
            (CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
}

/// Query of `GET /api/exports/operations.csv`
#[derive(Debug, Default, Deserialize)]
pub struct OperationExport {
    date_from: Option<NaiveDate>,
    date_to: Option<NaiveDate>,
    category_id: Option<i64>,
}

/// `GET /api/exports/operations.csv`
pub async fn export_operations(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    Params(query): Params<OperationExport>,
) -> Result<impl IntoResponse> {
    let body = export::operations_csv(
        &state.db,
        query.date_from,
        query.date_to,
        query.category_id,
        Some(user.id),
    )
    .await?;
    Ok(csv_response("operations.csv", body))
}

/// Query of `GET /api/exports/forecasts.csv`
#[derive(Debug, Default, Deserialize)]
pub struct ForecastExport {
    month: Option<String>,
}

/// `GET /api/exports/forecasts.csv`
pub async fn export_forecasts(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    Params(query): Params<ForecastExport>,
) -> Result<impl IntoResponse> {
    let month = query.month.as_deref().map(parse_month).transpose()?;
    let body = export::forecasts_csv(&state.db, month, Some(user.id)).await?;
    Ok(csv_response("forecasts.csv", body))
}

/// 201 when at least one row made it in, 400 otherwise; the report lists
/// the rejected lines either way.
fn import_response(report: ImportReport) -> (StatusCode, Json<ImportReport>) {
    let status = if report.imported > 0 {
        StatusCode::CREATED
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(report))
}

/// `POST /api/imports/operations.csv`; the body is the CSV file
pub async fn import_operations(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    body: String,
) -> Result<(StatusCode, Json<ImportReport>)> {
    let report = import::import_operations(&state.db, &body, Some(user.id)).await?;
    Ok(import_response(report))
}

/// `POST /api/imports/forecasts.csv`; the body is the CSV file
pub async fn import_forecasts(
    State(state): State<ApiState>,
    AuthUser(user): AuthUser,
    body: String,
) -> Result<(StatusCode, Json<ImportReport>)> {
    let report = import::import_forecasts(&state.db, &body, Some(user.id)).await?;
    Ok(import_response(report))
}

/// `GET /api/audit`
pub async fn list_audit(
    State(state): State<ApiState>,
    _staff: StaffUser,
    Params(filter): Params<AuditFilter>,
) -> Result<Json<Vec<audit_log::Model>>> {
    audit::list_audit_logs(&state.db, &filter).await.map(Json)
}

/// `GET /api/audit/:id`
pub async fn get_audit(
    State(state): State<ApiState>,
    _staff: StaffUser,
    Id(id): Id<i64>,
) -> Result<Json<audit_log::Model>> {
    audit::get_audit_log(&state.db, id).await.map(Json)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_parse_month() {
        let expected = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        assert_eq!(parse_month("2026-01").unwrap(), expected);
        assert_eq!(
            parse_month("2026-01-15").unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 15).unwrap()
        );
        assert!(matches!(parse_month("janvier"), Err(Error::Validation { .. })));
        assert!(parse_month("2026-13").is_err());
    }
}
