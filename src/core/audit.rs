//! Audit trail of business writes.
//!
//! Services call [`record`] explicitly after each write, on the same
//! connection or transaction as the write, so an entry exists exactly when
//! the change was committed. Entries are never updated or deleted.

use crate::{
    entities::{AuditAction, AuditLog, audit_log},
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use sea_orm::{QueryOrder, Set, prelude::*};
use serde::Deserialize;
use serde_json::{Value, json};

/// An entry waiting to be written
#[derive(Debug, Clone)]
pub struct AuditEntry {
    action: AuditAction,
    user_id: Option<i64>,
    model_name: &'static str,
    object_id: Option<String>,
    object_repr: String,
    changes: Value,
    metadata: Value,
}

impl AuditEntry {
    /// Starts an entry about one object.
    pub fn new(
        action: AuditAction,
        model_name: &'static str,
        object_id: impl ToString,
        object_repr: impl Into<String>,
    ) -> Self {
        Self {
            action,
            user_id: None,
            model_name,
            object_id: Some(object_id.to_string()),
            object_repr: object_repr.into(),
            changes: json!({}),
            metadata: json!({}),
        }
    }

    /// Starts an entry not tied to a single object (exports).
    pub fn about_model(action: AuditAction, model_name: &'static str, repr: impl Into<String>) -> Self {
        Self {
            object_id: None,
            ..Self::new(action, model_name, "", repr)
        }
    }

    /// Sets the acting user.
    #[must_use]
    pub const fn by(mut self, user_id: Option<i64>) -> Self {
        self.user_id = user_id;
        self
    }

    /// Attaches field changes.
    #[must_use]
    pub fn changes(mut self, changes: Value) -> Self {
        self.changes = changes;
        self
    }

    /// Attaches extra context.
    #[must_use]
    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Writes an entry.
pub async fn record<C: ConnectionTrait>(db: &C, entry: AuditEntry) -> Result<audit_log::Model> {
    audit_log::ActiveModel {
        action: Set(entry.action),
        user_id: Set(entry.user_id),
        model_name: Set(entry.model_name.to_string()),
        object_id: Set(entry.object_id),
        object_repr: Set(entry.object_repr),
        changes: Set(entry.changes),
        metadata: Set(entry.metadata),
        timestamp: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Filters for [`list_audit_logs`]; date bounds are inclusive days
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditFilter {
    /// Only this action
    pub action: Option<AuditAction>,
    /// Only this kind of object
    pub model_name: Option<String>,
    /// Only this user's actions
    pub user_id: Option<i64>,
    /// From this day on
    pub date_from: Option<NaiveDate>,
    /// Up to this day
    pub date_to: Option<NaiveDate>,
}

/// Lists entries, newest first.
pub async fn list_audit_logs(
    db: &DatabaseConnection,
    filter: &AuditFilter,
) -> Result<Vec<audit_log::Model>> {
    let mut query = AuditLog::find();
    if let Some(action) = filter.action {
        query = query.filter(audit_log::Column::Action.eq(action));
    }
    if let Some(model_name) = &filter.model_name {
        query = query.filter(audit_log::Column::ModelName.eq(model_name.as_str()));
    }
    if let Some(user_id) = filter.user_id {
        query = query.filter(audit_log::Column::UserId.eq(user_id));
    }
    if let Some(from) = filter.date_from {
        let start = from.and_time(chrono::NaiveTime::MIN).and_utc();
        query = query.filter(audit_log::Column::Timestamp.gte(start));
    }
    if let Some(to) = filter.date_to {
        if let Some(next_day) = to.succ_opt() {
            let end = next_day.and_time(chrono::NaiveTime::MIN).and_utc();
            query = query.filter(audit_log::Column::Timestamp.lt(end));
        }
    }

    query
        .order_by_desc(audit_log::Column::Timestamp)
        .order_by_desc(audit_log::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Fetches one entry.
pub async fn get_audit_log(db: &DatabaseConnection, id: i64) -> Result<audit_log::Model> {
    AuditLog::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("AuditLog", id))
}
