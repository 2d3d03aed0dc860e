//! AuditLog entity - Append-only trail of business writes.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// What happened to the audited object
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Object created
    #[sea_orm(string_value = "create")]
    Create,
    /// Object modified
    #[sea_orm(string_value = "update")]
    Update,
    /// Object deleted
    #[sea_orm(string_value = "delete")]
    Delete,
    /// Object validated (orders)
    #[sea_orm(string_value = "validate")]
    Validate,
    /// Data exported
    #[sea_orm(string_value = "export")]
    Export,
    /// Data imported
    #[sea_orm(string_value = "import")]
    Import,
}

/// AuditLog database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "audit_logs")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Action performed
    pub action: AuditAction,
    /// Acting user, `None` for system or anonymous actions
    pub user_id: Option<i64>,
    /// Kind of object, e.g. `Operation`
    pub model_name: String,
    /// Identifier of the object
    pub object_id: Option<String>,
    /// Human-readable label of the object
    pub object_repr: String,
    /// Field changes
    pub changes: Json,
    /// Extra context (filters of an export, ...)
    pub metadata: Json,
    /// When it happened
    pub timestamp: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Acting user
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "SetNull"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
