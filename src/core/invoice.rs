//! Daily invoice aggregation.
//!
//! The invoice of a day is a pure function of that day's validated orders,
//! delivered ones included since delivery follows validation. Regenerating
//! it any number of times yields the same totals. The rendered document is a
//! side product written after the totals are committed; a failure to write it
//! never undoes the totals.

use crate::{
    entities::{Invoice, Order, OrderState, User, invoice, order},
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// `FACT-YYYYMMDD`
pub fn invoice_number(date: NaiveDate) -> String {
    format!("FACT-{}", date.format("%Y%m%d"))
}

/// States counted on an invoice; delivery does not take an order off it
pub const INVOICED_STATES: [OrderState; 2] = [OrderState::Validated, OrderState::Delivered];

async fn invoiced_orders<C: ConnectionTrait>(
    db: &C,
    date: NaiveDate,
) -> Result<Vec<order::Model>> {
    Order::find()
        .filter(order::Column::OrderDate.eq(date))
        .filter(order::Column::State.is_in(INVOICED_STATES))
        .order_by_asc(order::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Recomputes the totals of `date` and upserts its invoice row.
pub async fn refresh_totals<C: ConnectionTrait>(db: &C, date: NaiveDate) -> Result<invoice::Model> {
    let orders = invoiced_orders(db, date).await?;
    let sum = |field: fn(&order::Model) -> Decimal| orders.iter().map(field).sum::<Decimal>();
    let order_count = i32::try_from(orders.len()).map_err(|_| Error::validation("Too many orders"))?;
    let now = Utc::now();

    let existing = Invoice::find()
        .filter(invoice::Column::InvoiceDate.eq(date))
        .one(db)
        .await?;
    let totals = |mut active: invoice::ActiveModel| {
        active.order_count = Set(order_count);
        active.total_gross = Set(sum(|o| o.gross_amount));
        active.total_subsidy = Set(sum(|o| o.subsidy_amount));
        active.total_net = Set(sum(|o| o.net_amount));
        active.total_supplement = Set(sum(|o| o.supplement_amount));
        active.updated_at = Set(now);
        active
    };

    let saved = match existing {
        Some(existing) => totals(existing.into()).update(db).await?,
        None => {
            totals(invoice::ActiveModel {
                invoice_date: Set(date),
                number: Set(invoice_number(date)),
                document_path: Set(None),
                generated_at: Set(now),
                ..Default::default()
            })
            .insert(db)
            .await?
        }
    };
    Ok(saved)
}

/// Renders the invoice document of `date` into `dir` and records its path.
pub async fn render_document<C: ConnectionTrait>(
    db: &C,
    dir: &Path,
    date: NaiveDate,
) -> Result<PathBuf> {
    let invoice = get_invoice_by_date(db, date).await?;
    let orders = invoiced_orders(db, date).await?;

    let mut text = String::new();
    let _ = writeln!(text, "FACTURE {}", invoice.number);
    let _ = writeln!(text, "Date : {}", date.format("%d/%m/%Y"));
    let _ = writeln!(text);
    let _ = writeln!(
        text,
        "{:<8} {:<24} {:>12} {:>12} {:>12} {:>12}",
        "Cmd", "Client", "Brut", "Subvention", "Net", "Supplément"
    );
    for order in &orders {
        let client = User::find_by_id(order.user_id)
            .one(db)
            .await?
            .map_or_else(|| format!("#{}", order.user_id), |user| user.username);
        let _ = writeln!(
            text,
            "{:<8} {:<24} {:>12} {:>12} {:>12} {:>12}",
            order.id,
            client,
            order.gross_amount,
            order.subsidy_amount,
            order.net_amount,
            order.supplement_amount
        );
    }
    let _ = writeln!(text);
    let _ = writeln!(text, "Commandes : {}", invoice.order_count);
    let _ = writeln!(text, "Total brut : {} GNF", invoice.total_gross);
    let _ = writeln!(text, "Total subvention : {} GNF", invoice.total_subsidy);
    let _ = writeln!(text, "Total net : {} GNF", invoice.total_net);
    let _ = writeln!(text, "Total suppléments : {} GNF", invoice.total_supplement);

    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}.txt", invoice.number));
    tokio::fs::write(&path, text).await?;

    let mut active: invoice::ActiveModel = invoice.into();
    active.document_path = Set(Some(path.to_string_lossy().into_owned()));
    active.update(db).await?;
    Ok(path)
}

/// Renders the document, logging instead of failing.
pub async fn render_document_best_effort<C: ConnectionTrait>(
    db: &C,
    dir: &Path,
    date: NaiveDate,
) -> Option<PathBuf> {
    render_document(db, dir, date)
        .await
        .inspect_err(|e| warn!("Failed to render invoice document for {date}: {e}"))
        .ok()
}

/// Regenerates the invoice of `date`: totals first, then the document.
#[instrument(skip(db, dir))]
pub async fn generate_invoice(
    db: &DatabaseConnection,
    dir: &Path,
    date: NaiveDate,
) -> Result<invoice::Model> {
    let txn = db.begin().await?;
    let refreshed = refresh_totals(&txn, date).await?;
    txn.commit().await?;
    info!(
        "Invoice {} covers {} order(s)",
        refreshed.number, refreshed.order_count
    );

    if render_document_best_effort(db, dir, date).await.is_some() {
        return get_invoice_by_date(db, date).await;
    }
    Ok(refreshed)
}

/// Fetches the invoice of a day.
pub async fn get_invoice_by_date<C: ConnectionTrait>(
    db: &C,
    date: NaiveDate,
) -> Result<invoice::Model> {
    Invoice::find()
        .filter(invoice::Column::InvoiceDate.eq(date))
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Invoice", date))
}

/// Lists invoices between two days (inclusive), newest first.
pub async fn list_invoices(
    db: &DatabaseConnection,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Vec<invoice::Model>> {
    let mut query = Invoice::find();
    if let Some(from) = from {
        query = query.filter(invoice::Column::InvoiceDate.gte(from));
    }
    if let Some(to) = to {
        query = query.filter(invoice::Column::InvoiceDate.lte(to));
    }
    query
        .order_by_desc(invoice::Column::InvoiceDate)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Returns the text of the invoice document, rendering it when missing.
pub async fn document_contents(
    db: &DatabaseConnection,
    dir: &Path,
    date: NaiveDate,
) -> Result<String> {
    let invoice = get_invoice_by_date(db, date).await?;
    if let Some(path) = invoice.document_path {
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => return Ok(text),
            Err(e) => warn!("Invoice document {path} unreadable, rendering again: {e}"),
        }
    }
    let path = render_document(db, dir, date).await?;
    Ok(tokio::fs::read_to_string(path).await?)
}
