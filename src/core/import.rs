//! CSV imports of forecasts and operations.
//!
//! The importer reads the files the exports write: `;` separated, optional
//! byte order mark, French column titles. Unknown columns (ids, derived
//! amounts) are ignored. Rows are imported one by one; a bad row is reported
//! with its line number and does not stop the others. Missing categories and
//! subcategories are created on the fly.

use crate::{
    core::{
        audit::{self, AuditEntry},
        category::{
            CategoryInput, SubcategoryInput, create_category, create_subcategory,
            get_category_by_code,
        },
        export::BOM,
        forecast::{ForecastInput, create_forecast, find_matching_forecast, update_forecast},
        money::checked_product,
        operation::{OperationInput, create_operation},
    },
    entities::{AuditAction, Category, Subcategory, category, subcategory},
    errors::{Error, Result},
};
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use rust_decimal::Decimal;
use sea_orm::prelude::*;
use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument, warn};

const MONTH: &str = "Mois";
const OPERATION_DATE: &str = "Date Opération";
const CATEGORY: &str = "Catégorie";
const CATEGORY_CODE: &str = "Code Catégorie";
const SUBCATEGORY: &str = "Sous-Catégorie";
const PLANNED_AMOUNT: &str = "Montant Prévu";
const UNITS: &str = "Unités";
const UNIT_PRICE: &str = "Prix Unitaire";
const AMOUNT: &str = "Montant Dépensé";
const DESCRIPTION: &str = "Description";

/// Row errors returned to the caller; the rest are only counted
const REPORTED_ERRORS: usize = 10;

/// Outcome of an import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Rows imported
    pub imported: usize,
    /// First row errors, as `Line <n>: <message>`
    pub errors: Vec<String>,
    /// Number of rejected rows
    pub total_errors: usize,
}

impl ImportReport {
    fn reject(&mut self, line: u64, error: &Error) {
        warn!("Import line {line} rejected: {error}");
        self.total_errors += 1;
        if self.errors.len() < REPORTED_ERRORS {
            self.errors.push(format!("Line {line}: {error}"));
        }
    }
}

/// One data row, looked up by column title
struct Row<'a> {
    headers: &'a StringRecord,
    record: StringRecord,
}

impl Row<'_> {
    fn get(&self, column: &str) -> Option<&str> {
        let index = self.headers.iter().position(|h| h == column)?;
        self.record.get(index).filter(|value| !value.is_empty())
    }

    fn required(&self, column: &str) -> Result<&str> {
        self.get(column)
            .ok_or_else(|| Error::validation(format!("Column {column} is empty")))
    }

    fn decimal(&self, column: &str) -> Result<Decimal> {
        let value = self.required(column)?;
        value
            .replace([' ', '\u{a0}'], "")
            .replace(',', ".")
            .parse()
            .map_err(|_| Error::validation(format!("{column}: {value} is not a number")))
    }

    fn date(&self, column: &str) -> Result<NaiveDate> {
        let value = self.required(column)?;
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(value, "%d/%m/%Y"))
            .map_err(|_| Error::validation(format!("{column}: {value} is not a date")))
    }

    fn month(&self, column: &str) -> Result<NaiveDate> {
        let value = self.required(column)?;
        NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
            .map_err(|_| Error::validation(format!("{column}: {value} is not a month")))
    }
}

/// Parsed file: header row and data rows with their line numbers
struct Table {
    headers: StringRecord,
    rows: Vec<(u64, std::result::Result<StringRecord, csv::Error>)>,
}

fn read_table(data: &str, required: &[&str]) -> Result<Table> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .trim(Trim::All)
        .from_reader(data.trim_start_matches(BOM).as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| Error::validation(format!("Unreadable header row: {e}")))?
        .clone();

    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|column| !headers.iter().any(|h| h == *column))
        .collect();
    if !missing.is_empty() {
        return Err(Error::validation(format!(
            "Missing columns: {}",
            missing.join(", ")
        )));
    }

    let mut rows = Vec::new();
    let mut line = 1;
    for record in reader.records() {
        line = match &record {
            Ok(record) => record.position().map_or(line + 1, |p| p.line()),
            Err(_) => line + 1,
        };
        rows.push((line, record));
    }
    Ok(Table { headers, rows })
}

/// Derives a category code from its name: `Frais de port` becomes `FRAIS_DE_PORT`.
fn code_from_name(name: &str) -> String {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
        .to_uppercase()
}

async fn resolve_category(db: &DatabaseConnection, row: &Row<'_>) -> Result<category::Model> {
    let name = row.required(CATEGORY)?;
    let code = row
        .get(CATEGORY_CODE)
        .map_or_else(|| code_from_name(name), str::to_uppercase);

    if let Some(existing) = get_category_by_code(db, &code).await? {
        return Ok(existing);
    }
    if let Some(existing) = Category::find()
        .filter(category::Column::Name.eq(name))
        .one(db)
        .await?
    {
        return Ok(existing);
    }
    let created = create_category(
        db,
        CategoryInput {
            name: name.to_string(),
            code,
            description: String::new(),
        },
    )
    .await?;
    info!("Import created category {}", created.code);
    Ok(created)
}

async fn resolve_subcategory(
    db: &DatabaseConnection,
    category_id: i64,
    row: &Row<'_>,
) -> Result<Option<i64>> {
    let Some(name) = row.get(SUBCATEGORY) else {
        return Ok(None);
    };
    if let Some(existing) = Subcategory::find()
        .filter(subcategory::Column::CategoryId.eq(category_id))
        .filter(subcategory::Column::Name.eq(name))
        .one(db)
        .await?
    {
        return Ok(Some(existing.id));
    }
    let created = create_subcategory(
        db,
        SubcategoryInput {
            category_id,
            name: name.to_string(),
            description: String::new(),
        },
    )
    .await?;
    Ok(Some(created.id))
}

async fn audit_row(
    db: &DatabaseConnection,
    model_name: &'static str,
    id: i64,
    repr: String,
    actor: Option<i64>,
    line: u64,
) -> Result<()> {
    audit::record(
        db,
        AuditEntry::new(AuditAction::Import, model_name, id, repr)
            .by(actor)
            .metadata(json!({ "source": "csv", "line": line })),
    )
    .await?;
    Ok(())
}

async fn import_forecast_row(
    db: &DatabaseConnection,
    row: &Row<'_>,
    actor: Option<i64>,
    line: u64,
) -> Result<()> {
    let month = row.month(MONTH)?;
    let planned_amount = row.decimal(PLANNED_AMOUNT)?;
    let category = resolve_category(db, row).await?;
    let subcategory_id = resolve_subcategory(db, category.id, row).await?;

    let input = ForecastInput {
        month,
        category_id: category.id,
        subcategory_id,
        planned_amount,
        status: None,
    };
    let forecast = match find_matching_forecast(db, month, category.id, subcategory_id).await? {
        Some(existing) => update_forecast(db, existing.id, input, actor).await?,
        None => create_forecast(db, input, actor).await?,
    };
    audit_row(
        db,
        "Forecast",
        forecast.id,
        format!("Forecast {} #{}", forecast.month.format("%Y-%m"), forecast.id),
        actor,
        line,
    )
    .await
}

async fn import_operation_row(
    db: &DatabaseConnection,
    row: &Row<'_>,
    actor: Option<i64>,
    line: u64,
) -> Result<()> {
    let operation_date = row.date(OPERATION_DATE)?;
    let units = row.decimal(UNITS)?;
    let unit_price = row.decimal(UNIT_PRICE)?;
    if row.get(AMOUNT).is_some() {
        let stated = row.decimal(AMOUNT)?;
        let computed = checked_product(units, unit_price)?;
        if stated != computed {
            return Err(Error::validation(format!(
                "{AMOUNT} {stated} differs from {UNITS} x {UNIT_PRICE} = {computed}"
            )));
        }
    }
    let category = resolve_category(db, row).await?;
    let subcategory_id = resolve_subcategory(db, category.id, row).await?;

    let created = create_operation(
        db,
        OperationInput {
            operation_date,
            category_id: category.id,
            subcategory_id,
            units,
            unit_price,
            description: row.get(DESCRIPTION).unwrap_or_default().to_string(),
        },
        actor,
    )
    .await?;
    audit_row(
        db,
        "Operation",
        created.id,
        format!("Operation #{} on {}", created.id, created.operation_date),
        actor,
        line,
    )
    .await
}

/// Imports forecasts; a forecast that already exists for the same month and
/// classification gets the new planned amount.
#[instrument(skip(db, data))]
pub async fn import_forecasts(
    db: &DatabaseConnection,
    data: &str,
    actor: Option<i64>,
) -> Result<ImportReport> {
    let table = read_table(data, &[MONTH, CATEGORY, PLANNED_AMOUNT])?;
    let mut report = ImportReport::default();
    for (line, record) in table.rows {
        let outcome = match record {
            Ok(record) => {
                let row = Row {
                    headers: &table.headers,
                    record,
                };
                import_forecast_row(db, &row, actor, line).await
            }
            Err(e) => Err(e.into()),
        };
        match outcome {
            Ok(()) => report.imported += 1,
            Err(e) => report.reject(line, &e),
        }
    }
    info!(
        "Imported {} forecast(s), {} row(s) rejected",
        report.imported, report.total_errors
    );
    Ok(report)
}

/// Imports operations; each one is reconciled like an operation entered by hand.
#[instrument(skip(db, data))]
pub async fn import_operations(
    db: &DatabaseConnection,
    data: &str,
    actor: Option<i64>,
) -> Result<ImportReport> {
    let table = read_table(data, &[OPERATION_DATE, CATEGORY, UNITS, UNIT_PRICE])?;
    let mut report = ImportReport::default();
    for (line, record) in table.rows {
        let outcome = match record {
            Ok(record) => {
                let row = Row {
                    headers: &table.headers,
                    record,
                };
                import_operation_row(db, &row, actor, line).await
            }
            Err(e) => Err(e.into()),
        };
        match outcome {
            Ok(()) => report.imported += 1,
            Err(e) => report.reject(line, &e),
        }
    }
    info!(
        "Imported {} operation(s), {} row(s) rejected",
        report.imported, report.total_errors
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{
        core::{
            audit::{AuditFilter, list_audit_logs},
            export::operations_csv,
            forecast::forecast_balance,
        },
        entities::{Forecast, Operation},
        test_utils::{create_test_category, create_test_forecast, date, dec, setup_test_db},
    };

    #[test]
    fn test_code_from_name() {
        assert_eq!(code_from_name("Frais de port"), "FRAIS_DE_PORT");
        assert_eq!(code_from_name(" Eau / Électricité "), "EAU_ÉLECTRICITÉ");
    }

    #[test]
    fn test_missing_columns() {
        let data = "Mois;Catégorie\r\n2026-01;FOOD\r\n";
        let err = read_table(data, &[MONTH, CATEGORY, PLANNED_AMOUNT])
            .err()
            .unwrap();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(err.to_string().contains("Montant Prévu"));
    }

    #[tokio::test]
    async fn test_import_forecasts_upserts() -> Result<()> {
        let db = setup_test_db().await?;
        let food = create_test_category(&db, "FOOD").await?;
        let existing = create_test_forecast(&db, food.id, "2026-01-01", 100_000).await?;

        let data = "\u{feff}Mois;Catégorie;Code Catégorie;Sous-Catégorie;Montant Prévu\r\n\
                    2026-01;Category FOOD;FOOD;;250 000\r\n\
                    2026-01;Transport;;Carburant;80000,50\r\n\
                    2026-13;Transport;;;1000\r\n\
                    2026-02;Transport;;;-5\r\n";
        let report = import_forecasts(&db, data, Some(1)).await?;
        assert_eq!(report.imported, 2);
        assert_eq!(report.total_errors, 2);
        assert!(report.errors[0].starts_with("Line 4: Mois"));
        assert!(report.errors[1].starts_with("Line 5: "));

        assert_eq!(
            forecast_balance(&db, existing.id).await?.planned_amount,
            dec(250_000)
        );
        let transport = get_category_by_code(&db, "TRANSPORT").await?.unwrap();
        let fuel = Forecast::find()
            .filter(crate::entities::forecast::Column::CategoryId.eq(transport.id))
            .one(&db)
            .await?
            .unwrap();
        assert!(fuel.subcategory_id.is_some());
        assert_eq!(fuel.planned_amount, "80000.50".parse::<Decimal>().unwrap());

        let imports = list_audit_logs(
            &db,
            &AuditFilter {
                action: Some(AuditAction::Import),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(imports.len(), 2);
        assert_eq!(imports[0].metadata["source"], "csv");
        Ok(())
    }

    #[tokio::test]
    async fn test_import_operations_reads_exports() -> Result<()> {
        let source = setup_test_db().await?;
        let food = create_test_category(&source, "FOOD").await?;
        create_operation(
            &source,
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
        let exported = operations_csv(&source, None, None, None, None).await?;

        let db = setup_test_db().await?;
        let target = create_test_category(&db, "FOOD").await?;
        let forecast = create_test_forecast(&db, target.id, "2026-01-01", 100_000).await?;
        let report = import_operations(&db, &exported, Some(1)).await?;
        assert_eq!(
            report,
            ImportReport {
                imported: 1,
                errors: Vec::new(),
                total_errors: 0,
            }
        );

        let imported = Operation::find().one(&db).await?.unwrap();
        assert_eq!(imported.category_id, target.id);
        assert_eq!(imported.amount, dec(50_000));
        assert_eq!(imported.description, "Riz; huile");
        // Auto-imputed like any other operation
        assert_eq!(
            forecast_balance(&db, forecast.id).await?.remaining_balance,
            dec(50_000)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_import_operations_row_errors() -> Result<()> {
        let db = setup_test_db().await?;
        let data = "Date Opération;Catégorie;Unités;Prix Unitaire;Montant Dépensé\n\
                    05/01/2026;Fournitures;2;1500;3000\n\
                    2026-01-06;Fournitures;2;1500;2999\n\
                    2026-01-07;Fournitures;abc;1500;\n\
                    2026-01-08;;1;1500;\n";
        let report = import_operations(&db, data, None).await?;
        assert_eq!(report.imported, 1);
        assert_eq!(report.total_errors, 3);
        assert!(report.errors[0].starts_with("Line 3: Montant Dépensé"));
        assert!(report.errors[1].starts_with("Line 4: Unités"));
        assert!(report.errors[2].starts_with("Line 5: Column Catégorie"));

        let op = Operation::find().one(&db).await?.unwrap();
        assert_eq!(op.operation_date, date("2026-01-05"));
        assert!(get_category_by_code(&db, "FOURNITURES").await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_error_list_is_capped() -> Result<()> {
        let db = setup_test_db().await?;
        let mut data = String::from("Date Opération;Catégorie;Unités;Prix Unitaire\n");
        for _ in 0..12 {
            data.push_str("not a date;Divers;1;100\n");
        }
        let report = import_operations(&db, &data, None).await?;
        assert_eq!(report.imported, 0);
        assert_eq!(report.total_errors, 12);
        assert_eq!(report.errors.len(), REPORTED_ERRORS);
        Ok(())
    }
}
