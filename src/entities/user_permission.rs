//! User permission entity - Per-feature grants on top of the staff/superuser flags.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Feature name granting the right to validate canteen orders (with `can_update`).
pub const VALIDATE_ORDERS_FEATURE: &str = "canteen_validate_orders";

/// User permission database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_permissions")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Grantee
    pub user_id: i64,
    /// Feature key (e.g. `"forecasts"`, `"canteen_validate_orders"`)
    pub feature: String,
    /// May see the feature
    pub can_view: bool,
    /// May create records
    pub can_create: bool,
    /// May modify records
    pub can_update: bool,
    /// May delete records
    pub can_delete: bool,
    /// When the grant was created
    pub created_at: DateTimeUtc,
    /// When the grant was last modified
    pub updated_at: DateTimeUtc,
}

/// Each permission belongs to one user
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Grantee
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
