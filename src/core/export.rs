//! CSV exports of operations and forecasts.
//!
//! Files use `;` as separator and CRLF line endings, and start with a UTF-8
//! byte order mark so that spreadsheet software picks the right encoding.
//! Every export is audited.

use crate::{
    core::{
        audit::{self, AuditEntry},
        forecast::{ForecastFilter, list_forecasts},
        operation::{OperationFilter, list_operations},
    },
    entities::{AuditAction, Category, ForecastStatus, Subcategory, User},
    errors::{Error, Result},
};
use chrono::NaiveDate;
use csv::{Terminator, Writer, WriterBuilder};
use sea_orm::prelude::*;
use serde_json::json;
use std::{collections::HashMap, io};
use tracing::info;

/// UTF-8 byte order mark, also skipped by the importer
pub const BOM: &str = "\u{feff}";

const OPERATION_HEADER: [&str; 13] = [
    "ID",
    "Date Opération",
    "Jour",
    "Semaine ISO",
    "Catégorie",
    "Code Catégorie",
    "Sous-Catégorie",
    "Unités",
    "Prix Unitaire",
    "Montant Dépensé",
    "Description",
    "Créé par",
    "Créé le",
];

const FORECAST_HEADER: [&str; 11] = [
    "ID",
    "Mois",
    "Catégorie",
    "Code Catégorie",
    "Sous-Catégorie",
    "Montant Prévu",
    "Statut",
    "Montant Imputé",
    "Solde Restant",
    "Créé par",
    "Créé le",
];

fn csv_writer() -> Writer<Vec<u8>> {
    WriterBuilder::new()
        .delimiter(b';')
        .terminator(Terminator::CRLF)
        .from_writer(BOM.as_bytes().to_vec())
}

fn finish(writer: Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
    String::from_utf8(bytes)
        .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
}

const fn status_label(status: ForecastStatus) -> &'static str {
    match status {
        ForecastStatus::Draft => "Brouillon",
        ForecastStatus::Validated => "Validée",
        ForecastStatus::Closed => "Clôturée",
    }
}

/// Names of categories, subcategories and users, loaded once per export
struct Labels {
    categories: HashMap<i64, (String, String)>,
    subcategories: HashMap<i64, String>,
    users: HashMap<i64, String>,
}

impl Labels {
    async fn load(db: &DatabaseConnection) -> Result<Self> {
        let categories = Category::find()
            .all(db)
            .await?
            .into_iter()
            .map(|c| (c.id, (c.name, c.code)))
            .collect();
        let subcategories = Subcategory::find()
            .all(db)
            .await?
            .into_iter()
            .map(|s| (s.id, s.name))
            .collect();
        let users = User::find()
            .all(db)
            .await?
            .into_iter()
            .map(|u| (u.id, u.username))
            .collect();
        Ok(Self {
            categories,
            subcategories,
            users,
        })
    }

    fn category(&self, id: i64) -> (String, String) {
        self.categories.get(&id).cloned().unwrap_or_default()
    }

    fn subcategory(&self, id: Option<i64>) -> String {
        id.and_then(|id| self.subcategories.get(&id).cloned())
            .unwrap_or_default()
    }

    fn user(&self, id: Option<i64>) -> String {
        id.and_then(|id| self.users.get(&id).cloned())
            .unwrap_or_default()
    }
}

/// Exports operations between two optional days, optionally of one category.
pub async fn operations_csv(
    db: &DatabaseConnection,
    date_from: Option<NaiveDate>,
    date_to: Option<NaiveDate>,
    category_id: Option<i64>,
    actor: Option<i64>,
) -> Result<String> {
    let operations = list_operations(
        db,
        &OperationFilter {
            date_from,
            date_to,
            category_id,
            subcategory_id: None,
        },
    )
    .await?;
    let labels = Labels::load(db).await?;

    let mut writer = csv_writer();
    writer.write_record(OPERATION_HEADER)?;
    for op in &operations {
        let (category_name, category_code) = labels.category(op.category_id);
        writer.write_record([
            op.id.to_string(),
            op.operation_date.to_string(),
            op.day_of_month.to_string(),
            op.iso_week.to_string(),
            category_name,
            category_code,
            labels.subcategory(op.subcategory_id),
            op.units.to_string(),
            op.unit_price.to_string(),
            op.amount.to_string(),
            op.description.clone(),
            labels.user(op.created_by),
            op.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ])?;
    }
    let out = finish(writer)?;

    audit::record(
        db,
        AuditEntry::about_model(AuditAction::Export, "Operation", "operations.csv")
            .by(actor)
            .metadata(json!({ "type": "operations_csv", "rows": operations.len() })),
    )
    .await?;
    info!("Exported {} operation(s)", operations.len());
    Ok(out)
}

/// Exports the forecasts of one month, or all of them.
pub async fn forecasts_csv(
    db: &DatabaseConnection,
    month: Option<NaiveDate>,
    actor: Option<i64>,
) -> Result<String> {
    let forecasts = list_forecasts(
        db,
        &ForecastFilter {
            month,
            ..Default::default()
        },
    )
    .await?;
    let labels = Labels::load(db).await?;

    let mut writer = csv_writer();
    writer.write_record(FORECAST_HEADER)?;
    for view in &forecasts {
        let f = &view.forecast;
        let (category_name, category_code) = labels.category(f.category_id);
        writer.write_record([
            f.id.to_string(),
            f.month.format("%Y-%m").to_string(),
            category_name,
            category_code,
            labels.subcategory(f.subcategory_id),
            f.planned_amount.to_string(),
            status_label(f.status).to_string(),
            view.imputed_amount.to_string(),
            view.remaining_balance.to_string(),
            labels.user(f.created_by),
            f.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ])?;
    }
    let out = finish(writer)?;

    audit::record(
        db,
        AuditEntry::about_model(AuditAction::Export, "Forecast", "forecasts.csv")
            .by(actor)
            .metadata(json!({ "type": "forecasts_csv", "rows": forecasts.len() })),
    )
    .await?;
    info!("Exported {} forecast(s)", forecasts.len());
    Ok(out)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::{
        audit::{AuditFilter, list_audit_logs},
        operation::{OperationInput, create_operation},
    };
    use crate::test_utils::{
        create_test_category, create_test_forecast, create_test_operation, date, dec,
        setup_test_db,
    };

    #[test]
    fn test_writer_quotes_and_terminates_rows() {
        let mut writer = csv_writer();
        writer
            .write_record(["plain", "a;b", "say \"hi\"", "two\nlines"])
            .unwrap();
        writer.write_record(["", "end"]).unwrap();
        assert_eq!(
            finish(writer).unwrap(),
            "\u{feff}plain;\"a;b\";\"say \"\"hi\"\"\";\"two\nlines\"\r\n;end\r\n"
        );
    }

    #[tokio::test]
    async fn test_operations_csv() -> Result<()> {
        let db = setup_test_db().await?;
        let food = create_test_category(&db, "FOOD").await?;
        let fuel = create_test_category(&db, "FUEL").await?;
        create_operation(
            &db,
            OperationInput {
                operation_date: date("2026-01-05"),
                category_id: food.id,
                subcategory_id: None,
                units: dec(10),
                unit_price: dec(5_000),
                description: "Riz; huile".to_string(),
            },
            None,
        )
        .await?;
        create_test_operation(&db, fuel.id, "2026-01-06", 1, 1_000).await?;

        let csv = operations_csv(&db, None, None, Some(food.id), None).await?;
        assert!(csv.starts_with('\u{feff}'));
        let lines: Vec<&str> = csv.trim_start_matches('\u{feff}').lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("ID;Date Opération;Jour;Semaine ISO"));
        assert!(lines[1].contains(";2026-01-05;5;2;"));
        assert!(lines[1].contains(";FOOD;"));
        assert!(lines[1].contains("\"Riz; huile\""));

        let exports = list_audit_logs(
            &db,
            &AuditFilter {
                action: Some(AuditAction::Export),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(exports.len(), 1);
        assert_eq!(exports[0].model_name, "Operation");
        Ok(())
    }

    #[tokio::test]
    async fn test_forecasts_csv_by_month() -> Result<()> {
        let db = setup_test_db().await?;
        let food = create_test_category(&db, "FOOD").await?;
        create_test_forecast(&db, food.id, "2026-01-01", 1_000_000).await?;
        create_test_forecast(&db, food.id, "2026-02-01", 800_000).await?;
        create_test_operation(&db, food.id, "2026-01-05", 10, 5_000).await?;

        let csv = forecasts_csv(&db, Some(date("2026-01-15")), None).await?;
        let lines: Vec<&str> = csv.trim_start_matches('\u{feff}').lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains(";2026-01;"));
        assert!(lines[1].contains(";Brouillon;"));
        let fields: Vec<&str> = lines[1].split(';').collect();
        assert_eq!(fields[7].parse::<rust_decimal::Decimal>().unwrap(), dec(50_000));
        assert_eq!(fields[8].parse::<rust_decimal::Decimal>().unwrap(), dec(950_000));
        Ok(())
    }
}
