//! Invoice entity - Daily aggregate of validated canteen orders.
//!
//! There is at most one invoice per day; regenerating it overwrites the totals.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Invoice database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "invoices")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Day covered
    #[sea_orm(unique)]
    pub invoice_date: Date,
    /// `FACT-YYYYMMDD`
    #[sea_orm(unique)]
    pub number: String,
    /// Number of validated orders
    pub order_count: i32,
    /// Sum of gross amounts
    pub total_gross: Decimal,
    /// Sum of subsidies
    pub total_subsidy: Decimal,
    /// Sum of net amounts
    pub total_net: Decimal,
    /// Sum of supplements
    pub total_supplement: Decimal,
    /// Rendered document, once written
    pub document_path: Option<String>,
    /// When the invoice was first generated
    pub generated_at: DateTimeUtc,
    /// When the totals were last refreshed
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
