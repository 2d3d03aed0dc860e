//! Canteen order lifecycle.
//!
//! ```text
//! draft --validate--> validated --deliver--> delivered
//!   |                    |
//!   +------cancel--------+--> cancelled --(resubmit)--> draft
//! ```
//!
//! Validation books the order as an expense: it records an operation in the
//! `RESTAURATION` category (which auto-imputes like any other operation) and
//! refreshes the invoice of the day, all in one transaction. The invoice
//! document and the confirmation mail follow after commit and may fail
//! without consequence.

use crate::{
    config::Settings,
    core::{
        audit::{self, AuditEntry},
        auth::{self, NewUser},
        category::ensure_category,
        dish::get_dish,
        invoice::{refresh_totals, render_document_best_effort},
        menu::{get_menu, get_menu_dish, published_menu_for_token, remaining_stock},
        notify::{Notifier, order_confirmation},
        operation::{OperationInput, insert_operation, remove_operation},
        order_window::{check_ordering, resolve_cutoff},
        pricing::{self, OrderAmounts, PricedLine},
        subsidy::active_rule,
    },
    entities::{
        AuditAction, MenuDish, Order, OrderLine, OrderState, dish, menu_dish, order, order_line,
        user,
    },
    errors::{Error, Result},
};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};

/// Category every validated order is booked under
pub const CANTEEN_CATEGORY_CODE: &str = "RESTAURATION";

/// One requested line
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct OrderLineInput {
    /// Menu entry to order
    pub menu_dish_id: i64,
    /// Portions; must be 1
    #[serde(default = "one")]
    pub quantity: i32,
}

const fn one() -> i32 {
    1
}

/// Order submitted by an authenticated user
#[derive(Debug, Clone, Deserialize)]
pub struct OrderInput {
    /// Day the meal is for
    pub order_date: NaiveDate,
    /// Exactly one line
    pub lines: Vec<OrderLineInput>,
}

/// Order submitted from the public page
#[derive(Debug, Clone, Deserialize)]
pub struct PublicOrderInput {
    /// Name of the guest
    pub name: String,
    /// Optional contact address
    #[serde(default)]
    pub email: Option<String>,
    /// Exactly one line
    pub lines: Vec<OrderLineInput>,
}

/// Filters for [`list_orders`]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    /// From this day
    pub date_from: Option<NaiveDate>,
    /// Up to this day
    pub date_to: Option<NaiveDate>,
    /// Only this state
    pub state: Option<OrderState>,
    /// Only this user's orders (privileged callers)
    pub user_id: Option<i64>,
}

/// A line with its priced amounts
#[derive(Debug, Clone, Serialize)]
pub struct OrderLineView {
    /// Stored line
    #[serde(flatten)]
    pub line: order_line::Model,
    /// Name of the ordered dish
    pub dish_name: String,
    /// Unit price counted towards the order
    pub effective_price: Decimal,
    /// `quantity * effective_price`
    pub line_amount: Decimal,
    /// Excess above the ceiling for this line
    pub supplement: Decimal,
}

/// An order with its lines
#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
    /// Stored order
    #[serde(flatten)]
    pub order: order::Model,
    /// Ordered lines
    pub lines: Vec<OrderLineView>,
}

/// What the public page gets back
#[derive(Debug, Clone, Serialize)]
pub struct PublicOrderReceipt {
    /// The draft order
    pub order: OrderView,
    /// Account created for the guest
    pub guest_username: String,
    /// To be paid in cash on collection
    pub supplement_to_pay: Decimal,
    /// Always true: a staff member still has to validate
    pub pending_validation: bool,
}

struct ResolvedLine {
    entry: menu_dish::Model,
    dish: dish::Model,
    quantity: i32,
}

fn single_line(lines: &[OrderLineInput]) -> Result<OrderLineInput> {
    match lines {
        [line] if line.quantity == 1 => Ok(*line),
        [_] => Err(Error::validation("Only one portion may be ordered")),
        _ => Err(Error::validation("An order holds exactly one dish")),
    }
}

async fn resolve_line<C: ConnectionTrait>(
    db: &C,
    line: OrderLineInput,
    order_date: NaiveDate,
) -> Result<ResolvedLine> {
    let entry = get_menu_dish(db, line.menu_dish_id).await?;
    let menu = get_menu(db, entry.menu_id).await?;
    if menu.menu_date != order_date {
        return Err(Error::validation(format!(
            "This dish is on the menu of {}, not {order_date}",
            menu.menu_date
        )));
    }
    let dish = get_dish(db, entry.dish_id).await?;
    Ok(ResolvedLine {
        entry,
        dish,
        quantity: line.quantity,
    })
}

/// Creates or replaces the draft order of `user_id` for `order_date`.
async fn place_order<C: ConnectionTrait>(
    db: &C,
    settings: &Settings,
    user_id: i64,
    order_date: NaiveDate,
    line: &ResolvedLine,
    actor: Option<i64>,
) -> Result<order::Model> {
    let existing = Order::find()
        .filter(order::Column::UserId.eq(user_id))
        .filter(order::Column::OrderDate.eq(order_date))
        .one(db)
        .await?;
    if let Some(existing) = &existing {
        if matches!(existing.state, OrderState::Validated | OrderState::Delivered) {
            return Err(Error::conflict(format!(
                "An order for {order_date} is already validated"
            )));
        }
    }

    let replaced = existing.as_ref().map(|order| order.id);
    if let Some(remaining) = remaining_stock(db, &line.entry, replaced).await? {
        if remaining < line.quantity {
            return Err(Error::InsufficientStock {
                dish: line.dish.name.clone(),
                remaining,
            });
        }
    }

    let rule = active_rule(db, order_date).await?;
    let amounts = pricing::price_order(
        &[PricedLine {
            quantity: line.quantity,
            unit_price: line.entry.day_price,
        }],
        rule.as_ref(),
        settings.subsidy_price_ceiling,
    );

    let now = Utc::now();
    let (saved, action) = match existing {
        Some(existing) => {
            OrderLine::delete_many()
                .filter(order_line::Column::OrderId.eq(existing.id))
                .exec(db)
                .await?;
            let mut active: order::ActiveModel = existing.into();
            apply_amounts(&mut active, &amounts);
            active.state = Set(OrderState::Draft);
            active.operation_id = Set(None);
            active.updated_at = Set(now);
            (active.update(db).await?, AuditAction::Update)
        }
        None => {
            let mut active = order::ActiveModel {
                user_id: Set(user_id),
                order_date: Set(order_date),
                state: Set(OrderState::Draft),
                operation_id: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            apply_amounts(&mut active, &amounts);
            (active.insert(db).await?, AuditAction::Create)
        }
    };

    order_line::ActiveModel {
        order_id: Set(saved.id),
        menu_dish_id: Set(line.entry.id),
        quantity: Set(line.quantity),
        unit_price: Set(line.entry.day_price),
        ..Default::default()
    }
    .insert(db)
    .await?;

    audit::record(
        db,
        AuditEntry::new(action, "Order", saved.id, describe(&saved))
            .by(actor)
            .changes(json!({ "after": saved })),
    )
    .await?;
    Ok(saved)
}

fn apply_amounts(active: &mut order::ActiveModel, amounts: &OrderAmounts) {
    active.gross_amount = Set(amounts.gross);
    active.subsidy_amount = Set(amounts.subsidy);
    active.net_amount = Set(amounts.net);
    active.supplement_amount = Set(amounts.supplement);
}

fn describe(order: &order::Model) -> String {
    format!("Commande #{} du {}", order.id, order.order_date)
}

/// Loads the lines of an order with their dish names and priced amounts.
pub async fn order_view<C: ConnectionTrait>(
    db: &C,
    order: order::Model,
    ceiling: Decimal,
) -> Result<OrderView> {
    let rows = OrderLine::find()
        .filter(order_line::Column::OrderId.eq(order.id))
        .find_also_related(MenuDish)
        .order_by_asc(order_line::Column::Id)
        .all(db)
        .await?;

    let mut lines = Vec::with_capacity(rows.len());
    for (line, entry) in rows {
        let dish_name = match entry {
            Some(entry) => get_dish(db, entry.dish_id).await?.name,
            None => String::new(),
        };
        let priced = PricedLine {
            quantity: line.quantity,
            unit_price: line.unit_price,
        };
        lines.push(OrderLineView {
            dish_name,
            effective_price: pricing::effective_price(line.unit_price, ceiling),
            line_amount: pricing::line_amount(priced, ceiling),
            supplement: pricing::line_supplement(priced, ceiling),
            line,
        });
    }
    Ok(OrderView { order, lines })
}

async fn priced_lines<C: ConnectionTrait>(db: &C, order_id: i64) -> Result<Vec<PricedLine>> {
    let lines = OrderLine::find()
        .filter(order_line::Column::OrderId.eq(order_id))
        .all(db)
        .await?;
    Ok(lines
        .iter()
        .map(|line| PricedLine {
            quantity: line.quantity,
            unit_price: line.unit_price,
        })
        .collect())
}

async fn find_order<C: ConnectionTrait>(db: &C, id: i64) -> Result<order::Model> {
    Order::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Order", id))
}

/// Orders of other users look missing to unprivileged callers.
async fn find_visible_order<C: ConnectionTrait>(
    db: &C,
    viewer: &user::Model,
    privileged: bool,
    id: i64,
) -> Result<order::Model> {
    let order = find_order(db, id).await?;
    if !privileged && order.user_id != viewer.id {
        return Err(Error::not_found("Order", id));
    }
    Ok(order)
}

/// Submits (or resubmits) the caller's order for a day.
#[instrument(skip_all, fields(user = %user.username, date = %input.order_date))]
pub async fn submit_order(
    db: &DatabaseConnection,
    settings: &Settings,
    now: NaiveDateTime,
    user: &user::Model,
    input: OrderInput,
) -> Result<OrderView> {
    let line = single_line(&input.lines)?;

    let txn = db.begin().await?;
    let resolved = resolve_line(&txn, line, input.order_date).await?;
    let privileged = auth::is_privileged(&txn, user).await?;
    let cutoff = resolve_cutoff(
        &txn,
        resolved.dish.meal_category,
        settings.default_order_cutoff,
    )
    .await?;
    check_ordering(now, input.order_date, cutoff, privileged)?;

    let order = place_order(
        &txn,
        settings,
        user.id,
        input.order_date,
        &resolved,
        Some(user.id),
    )
    .await?;
    let view = order_view(&txn, order, settings.subsidy_price_ceiling).await?;
    txn.commit().await?;

    info!("Order {} submitted", view.order.id);
    Ok(view)
}

/// Places a guest order from the public page of a published menu.
#[instrument(skip_all, fields(token = %token))]
pub async fn submit_public_order(
    db: &DatabaseConnection,
    settings: &Settings,
    now: NaiveDateTime,
    token: &str,
    input: PublicOrderInput,
) -> Result<PublicOrderReceipt> {
    let name = input.name.trim().to_string();
    if name.is_empty() {
        return Err(Error::validation("Name is required"));
    }
    let line = single_line(&input.lines)?;

    let txn = db.begin().await?;
    let menu = published_menu_for_token(&txn, token, now.date()).await?;
    check_ordering(now, menu.menu_date, settings.public_order_cutoff, false)?;
    let resolved = resolve_line(&txn, line, menu.menu_date).await?;

    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let guest = auth::create_user(
        &txn,
        NewUser {
            username: format!("guest_{}_{}", menu.menu_date.format("%Y%m%d"), &suffix[..8]),
            password: None,
            email: input.email,
            first_name: name,
            is_staff: false,
            is_superuser: false,
        },
    )
    .await?;

    let order = place_order(&txn, settings, guest.id, menu.menu_date, &resolved, None).await?;
    let view = order_view(&txn, order, settings.subsidy_price_ceiling).await?;
    txn.commit().await?;

    info!("Public order {} placed by {}", view.order.id, guest.username);
    Ok(PublicOrderReceipt {
        supplement_to_pay: view.order.supplement_amount,
        order: view,
        guest_username: guest.username,
        pending_validation: true,
    })
}

/// Validates a draft order and books it as an expense.
#[instrument(skip(db, settings, notifier, actor), fields(actor = %actor.username))]
pub async fn validate_order(
    db: &DatabaseConnection,
    settings: &Settings,
    notifier: &dyn Notifier,
    actor: &user::Model,
    id: i64,
) -> Result<OrderView> {
    if !auth::is_privileged(db, actor).await? {
        return Err(Error::forbidden("Validating orders requires the validation permission"));
    }

    let txn = db.begin().await?;
    let existing = find_order(&txn, id).await?;
    if existing.state != OrderState::Draft {
        return Err(Error::invalid_state(format!(
            "Only draft orders can be validated (order {id} is {:?})",
            existing.state
        )));
    }

    let lines = priced_lines(&txn, id).await?;
    let rule = active_rule(&txn, existing.order_date).await?;
    let amounts = pricing::price_order(&lines, rule.as_ref(), settings.subsidy_price_ceiling);
    if amounts.dish_count <= 0 {
        return Err(Error::invalid_state(format!("Order {id} has no dish")));
    }

    let owner = auth::get_user(&txn, existing.user_id).await?;
    let category = ensure_category(&txn, CANTEEN_CATEGORY_CODE, "Restauration").await?;
    let op = insert_operation(
        &txn,
        OperationInput {
            operation_date: existing.order_date,
            category_id: category.id,
            subcategory_id: None,
            units: Decimal::from(amounts.dish_count),
            unit_price: pricing::operation_unit_price(&amounts),
            description: format!("Commande cantine #{id} - {}", owner.username),
        },
        Some(actor.id),
    )
    .await?;

    let mut active: order::ActiveModel = existing.into();
    apply_amounts(&mut active, &amounts);
    active.state = Set(OrderState::Validated);
    active.operation_id = Set(Some(op.id));
    active.updated_at = Set(Utc::now());
    let validated = active.update(&txn).await?;

    refresh_totals(&txn, validated.order_date).await?;
    audit::record(
        &txn,
        AuditEntry::new(AuditAction::Validate, "Order", id, describe(&validated))
            .by(Some(actor.id))
            .changes(json!({ "state": "validated", "operation_id": op.id })),
    )
    .await?;

    let view = order_view(&txn, validated, settings.subsidy_price_ceiling).await?;
    txn.commit().await?;
    info!("Order {id} validated, operation {} recorded", op.id);

    render_document_best_effort(db, &settings.invoice_dir, view.order.order_date).await;
    if let Some(mail) = order_confirmation(&settings.mail_from, &owner, &view.order) {
        if let Err(e) = notifier.send(mail).await {
            warn!("Confirmation for order {id} not sent: {e}");
        }
    }
    Ok(view)
}

/// Cancels an order.
///
/// Cancelling a validated order is reserved to privileged callers; it removes
/// the booked operation and refreshes the invoice of the day.
pub async fn cancel_order(
    db: &DatabaseConnection,
    settings: &Settings,
    actor: &user::Model,
    id: i64,
) -> Result<OrderView> {
    let privileged = auth::is_privileged(db, actor).await?;

    let txn = db.begin().await?;
    let existing = find_visible_order(&txn, actor, privileged, id).await?;
    let was_validated = match existing.state {
        OrderState::Delivered => {
            return Err(Error::invalid_state("A delivered order cannot be cancelled"));
        }
        OrderState::Cancelled => {
            return Err(Error::invalid_state(format!("Order {id} is already cancelled")));
        }
        OrderState::Validated if !privileged => {
            return Err(Error::forbidden(
                "Only staff can cancel a validated order",
            ));
        }
        OrderState::Validated => true,
        OrderState::Draft => false,
    };

    let operation_id = existing.operation_id;
    let mut active: order::ActiveModel = existing.into();
    active.state = Set(OrderState::Cancelled);
    active.operation_id = Set(None);
    active.updated_at = Set(Utc::now());
    let cancelled = active.update(&txn).await?;

    if let Some(operation_id) = operation_id {
        remove_operation(&txn, operation_id, Some(actor.id)).await?;
    }
    if was_validated {
        refresh_totals(&txn, cancelled.order_date).await?;
    }

    audit::record(
        &txn,
        AuditEntry::new(AuditAction::Update, "Order", id, describe(&cancelled))
            .by(Some(actor.id))
            .metadata(json!({ "action": "cancel" })),
    )
    .await?;

    let view = order_view(&txn, cancelled, settings.subsidy_price_ceiling).await?;
    txn.commit().await?;

    if was_validated {
        render_document_best_effort(db, &settings.invoice_dir, view.order.order_date).await;
    }
    Ok(view)
}

/// Marks a validated order as served.
pub async fn deliver_order(
    db: &DatabaseConnection,
    settings: &Settings,
    actor: &user::Model,
    id: i64,
) -> Result<OrderView> {
    if !auth::is_privileged(db, actor).await? {
        return Err(Error::forbidden("Delivering orders requires the validation permission"));
    }

    let txn = db.begin().await?;
    let existing = find_order(&txn, id).await?;
    if existing.state != OrderState::Validated {
        return Err(Error::invalid_state(format!(
            "Only validated orders can be delivered (order {id} is {:?})",
            existing.state
        )));
    }

    let mut active: order::ActiveModel = existing.into();
    active.state = Set(OrderState::Delivered);
    active.updated_at = Set(Utc::now());
    let delivered = active.update(&txn).await?;

    audit::record(
        &txn,
        AuditEntry::new(AuditAction::Update, "Order", id, describe(&delivered))
            .by(Some(actor.id))
            .metadata(json!({ "action": "deliver" })),
    )
    .await?;

    let view = order_view(&txn, delivered, settings.subsidy_price_ceiling).await?;
    txn.commit().await?;
    Ok(view)
}

/// Deletes a draft or cancelled order.
pub async fn delete_order(db: &DatabaseConnection, actor: &user::Model, id: i64) -> Result<()> {
    let privileged = auth::is_privileged(db, actor).await?;

    let txn = db.begin().await?;
    let existing = find_visible_order(&txn, actor, privileged, id).await?;
    if matches!(existing.state, OrderState::Validated | OrderState::Delivered) {
        return Err(Error::invalid_state(
            "Validated orders must be cancelled before deletion",
        ));
    }

    OrderLine::delete_many()
        .filter(order_line::Column::OrderId.eq(id))
        .exec(&txn)
        .await?;
    Order::delete_by_id(id).exec(&txn).await?;
    audit::record(
        &txn,
        AuditEntry::new(AuditAction::Delete, "Order", id, describe(&existing))
            .by(Some(actor.id))
            .changes(json!({ "before": existing })),
    )
    .await?;
    txn.commit().await?;
    Ok(())
}

/// Fetches an order visible to `viewer`.
pub async fn get_order(
    db: &DatabaseConnection,
    settings: &Settings,
    viewer: &user::Model,
    id: i64,
) -> Result<OrderView> {
    let privileged = auth::is_privileged(db, viewer).await?;
    let order = find_visible_order(db, viewer, privileged, id).await?;
    order_view(db, order, settings.subsidy_price_ceiling).await
}

/// Lists the orders visible to `viewer`, newest day first.
pub async fn list_orders(
    db: &DatabaseConnection,
    settings: &Settings,
    viewer: &user::Model,
    filter: &OrderFilter,
) -> Result<Vec<OrderView>> {
    let privileged = auth::is_privileged(db, viewer).await?;

    let mut query = Order::find();
    if privileged {
        if let Some(user_id) = filter.user_id {
            query = query.filter(order::Column::UserId.eq(user_id));
        }
    } else {
        query = query.filter(order::Column::UserId.eq(viewer.id));
    }
    if let Some(from) = filter.date_from {
        query = query.filter(order::Column::OrderDate.gte(from));
    }
    if let Some(to) = filter.date_to {
        query = query.filter(order::Column::OrderDate.lte(to));
    }
    if let Some(state) = filter.state {
        query = query.filter(order::Column::State.eq(state));
    }

    let orders = query
        .order_by_desc(order::Column::OrderDate)
        .order_by_asc(order::Column::Id)
        .all(db)
        .await?;
    let mut views = Vec::with_capacity(orders.len());
    for order in orders {
        views.push(order_view(db, order, settings.subsidy_price_ceiling).await?);
    }
    Ok(views)
}

/// Lists order lines visible to `viewer`, optionally of one order.
pub async fn list_order_lines(
    db: &DatabaseConnection,
    viewer: &user::Model,
    order_id: Option<i64>,
) -> Result<Vec<order_line::Model>> {
    let privileged = auth::is_privileged(db, viewer).await?;
    let mut query = OrderLine::find();
    if let Some(order_id) = order_id {
        find_visible_order(db, viewer, privileged, order_id).await?;
        query = query.filter(order_line::Column::OrderId.eq(order_id));
    } else if !privileged {
        let own: Vec<i64> = Order::find()
            .filter(order::Column::UserId.eq(viewer.id))
            .all(db)
            .await?
            .into_iter()
            .map(|order| order.id)
            .collect();
        query = query.filter(order_line::Column::OrderId.is_in(own));
    }
    query
        .order_by_asc(order_line::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Fetches an order line visible to `viewer`.
pub async fn get_order_line(
    db: &DatabaseConnection,
    viewer: &user::Model,
    id: i64,
) -> Result<order_line::Model> {
    let line = OrderLine::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("OrderLine", id))?;
    let privileged = auth::is_privileged(db, viewer).await?;
    find_visible_order(db, viewer, privileged, line.order_id)
        .await
        .map_err(|_| Error::not_found("OrderLine", id))?;
    Ok(line)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::{
        forecast::forecast_balance,
        imputation::imputed_for_operation,
        invoice::get_invoice_by_date,
        menu::{MenuDishInput, add_dish_to_menu, create_menu},
        notify::{LogNotifier, Mail},
        operation::get_operation,
    };
    use crate::entities::{Operation, SubsidyKind};
    use crate::test_utils::{
        create_test_dish, create_test_forecast, create_test_subsidy_rule, create_test_user,
        date, dec, setup_test_db, test_settings_in,
    };
    use async_trait::async_trait;
    use chrono::NaiveTime;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<Mail>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, mail: Mail) -> Result<()> {
            self.sent.lock().unwrap().push(mail);
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send(&self, _mail: Mail) -> Result<()> {
            Err(Error::Notification {
                message: "smtp down".to_string(),
            })
        }
    }

    fn at(day: &str, hour: u32, minute: u32) -> NaiveDateTime {
        date(day).and_time(NaiveTime::from_hms_opt(hour, minute, 0).unwrap())
    }

    fn one_line(menu_dish_id: i64) -> Vec<OrderLineInput> {
        vec![OrderLineInput {
            menu_dish_id,
            quantity: 1,
        }]
    }

    /// Menu of 2026-01-05 with a 45 000 dish
    async fn menu_with_dish(db: &DatabaseConnection) -> Result<menu_dish::Model> {
        create_test_dish(db, "Poulet braisé", 45_000).await?;
        let detail = create_menu(db, date("2026-01-05"), None).await?;
        Ok(detail.dishes[0].menu_dish.clone())
    }

    #[tokio::test]
    async fn test_subsidy_scenario() -> Result<()> {
        let db = setup_test_db().await?;
        let dir = tempfile::tempdir()?;
        let settings = test_settings_in(dir.path());
        let entry = menu_with_dish(&db).await?;
        create_test_subsidy_rule(&db, SubsidyKind::Fixed, 30_000, Some(1)).await?;
        let member = create_test_user(&db, "membre", false).await?;

        let view = submit_order(
            &db,
            &settings,
            at("2026-01-05", 9, 0),
            &member,
            OrderInput {
                order_date: date("2026-01-05"),
                lines: one_line(entry.id),
            },
        )
        .await?;

        assert_eq!(view.order.state, OrderState::Draft);
        assert_eq!(view.order.gross_amount, dec(30_000));
        assert_eq!(view.order.subsidy_amount, dec(30_000));
        assert_eq!(view.order.net_amount, Decimal::ZERO);
        assert_eq!(view.order.supplement_amount, dec(15_000));
        assert_eq!(view.lines[0].effective_price, dec(30_000));
        assert_eq!(view.lines[0].dish_name, "Poulet braisé");
        Ok(())
    }

    #[tokio::test]
    async fn test_cutoff_applies_only_to_unprivileged() -> Result<()> {
        let db = setup_test_db().await?;
        let settings = test_settings_in(std::path::Path::new("unused"));
        let entry = menu_with_dish(&db).await?;
        let member = create_test_user(&db, "membre", false).await?;
        let staff = create_test_user(&db, "chef", true).await?;
        let late = at("2026-01-05", 14, 0);

        let input = OrderInput {
            order_date: date("2026-01-05"),
            lines: one_line(entry.id),
        };
        let rejected = submit_order(&db, &settings, late, &member, input.clone()).await;
        assert!(matches!(rejected, Err(Error::OrderWindowClosed { .. })));

        submit_order(&db, &settings, late, &staff, input.clone()).await?;

        // Past dates are refused even to staff
        let next_day = at("2026-01-06", 8, 0);
        assert!(matches!(
            submit_order(&db, &settings, next_day, &staff, input).await,
            Err(Error::Validation { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_order_shape_and_menu_date_checks() -> Result<()> {
        let db = setup_test_db().await?;
        let settings = test_settings_in(std::path::Path::new("unused"));
        let entry = menu_with_dish(&db).await?;
        let member = create_test_user(&db, "membre", false).await?;
        let now = at("2026-01-04", 9, 0);

        let two_portions = OrderInput {
            order_date: date("2026-01-05"),
            lines: vec![OrderLineInput {
                menu_dish_id: entry.id,
                quantity: 2,
            }],
        };
        assert!(matches!(
            submit_order(&db, &settings, now, &member, two_portions).await,
            Err(Error::Validation { .. })
        ));

        let no_line = OrderInput {
            order_date: date("2026-01-05"),
            lines: vec![],
        };
        assert!(matches!(
            submit_order(&db, &settings, now, &member, no_line).await,
            Err(Error::Validation { .. })
        ));

        let wrong_day = OrderInput {
            order_date: date("2026-01-06"),
            lines: one_line(entry.id),
        };
        assert!(matches!(
            submit_order(&db, &settings, now, &member, wrong_day).await,
            Err(Error::Validation { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_resubmission_replaces_draft_and_stock_is_enforced() -> Result<()> {
        let db = setup_test_db().await?;
        let settings = test_settings_in(std::path::Path::new("unused"));
        let entry = menu_with_dish(&db).await?;
        let entry = add_dish_to_menu(
            &db,
            entry.menu_id,
            MenuDishInput {
                dish_id: entry.dish_id,
                day_price: None,
                stock_cap: Some(1),
                position: None,
            },
        )
        .await?;
        let first = create_test_user(&db, "premier", false).await?;
        let second = create_test_user(&db, "second", false).await?;
        let now = at("2026-01-04", 9, 0);
        let input = OrderInput {
            order_date: date("2026-01-05"),
            lines: one_line(entry.id),
        };

        let original = submit_order(&db, &settings, now, &first, input.clone()).await?;
        // Resubmitting does not count the order's own portion against the cap
        let replaced = submit_order(&db, &settings, now, &first, input.clone()).await?;
        assert_eq!(original.order.id, replaced.order.id);
        assert_eq!(replaced.lines.len(), 1);

        assert!(matches!(
            submit_order(&db, &settings, now, &second, input.clone()).await,
            Err(Error::InsufficientStock { remaining: 0, .. })
        ));

        // Cancelling gives the portion back
        cancel_order(&db, &settings, &first, original.order.id).await?;
        submit_order(&db, &settings, now, &second, input).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_validation_books_operation_and_invoice() -> Result<()> {
        let db = setup_test_db().await?;
        let dir = tempfile::tempdir()?;
        let settings = test_settings_in(dir.path());
        let entry = menu_with_dish(&db).await?;
        create_test_subsidy_rule(&db, SubsidyKind::Fixed, 20_000, Some(1)).await?;
        let restauration = ensure_category(&db, CANTEEN_CATEGORY_CODE, "Restauration").await?;
        let forecast = create_test_forecast(&db, restauration.id, "2026-01-01", 500_000).await?;
        let member = create_test_user(&db, "membre", false).await?;
        let staff = create_test_user(&db, "chef", true).await?;
        let notifier = RecordingNotifier::default();

        let draft = submit_order(
            &db,
            &settings,
            at("2026-01-05", 9, 0),
            &member,
            OrderInput {
                order_date: date("2026-01-05"),
                lines: one_line(entry.id),
            },
        )
        .await?;

        assert!(matches!(
            validate_order(&db, &settings, &notifier, &member, draft.order.id).await,
            Err(Error::Forbidden { .. })
        ));

        let validated = validate_order(&db, &settings, &notifier, &staff, draft.order.id).await?;
        assert_eq!(validated.order.state, OrderState::Validated);
        assert_eq!(validated.order.net_amount, dec(10_000));

        let op = get_operation(&db, validated.order.operation_id.unwrap()).await?;
        assert_eq!(op.category_id, restauration.id);
        assert_eq!(op.units, dec(1));
        assert_eq!(op.amount, dec(10_000));
        assert_eq!(imputed_for_operation(&db, op.id, None).await?, dec(10_000));
        assert_eq!(
            forecast_balance(&db, forecast.id).await?.remaining_balance,
            dec(490_000)
        );

        let invoice = get_invoice_by_date(&db, date("2026-01-05")).await?;
        assert_eq!(invoice.order_count, 1);
        assert_eq!(invoice.total_supplement, dec(15_000));
        assert!(invoice.document_path.is_some());

        // The member has an email address from test_utils
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);

        assert!(matches!(
            validate_order(&db, &settings, &notifier, &staff, draft.order.id).await,
            Err(Error::InvalidState { .. })
        ));
        assert!(matches!(
            submit_order(
                &db,
                &settings,
                at("2026-01-05", 9, 0),
                &member,
                OrderInput {
                    order_date: date("2026-01-05"),
                    lines: one_line(entry.id),
                },
            )
            .await,
            Err(Error::Conflict { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_validation() -> Result<()> {
        let db = setup_test_db().await?;
        let dir = tempfile::tempdir()?;
        let settings = test_settings_in(dir.path());
        let entry = menu_with_dish(&db).await?;
        let member = create_test_user(&db, "membre", false).await?;
        let staff = create_test_user(&db, "chef", true).await?;

        let draft = submit_order(
            &db,
            &settings,
            at("2026-01-05", 9, 0),
            &member,
            OrderInput {
                order_date: date("2026-01-05"),
                lines: one_line(entry.id),
            },
        )
        .await?;
        let validated =
            validate_order(&db, &settings, &FailingNotifier, &staff, draft.order.id).await?;
        assert_eq!(validated.order.state, OrderState::Validated);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_validated_order_unbooks_it() -> Result<()> {
        let db = setup_test_db().await?;
        let dir = tempfile::tempdir()?;
        let settings = test_settings_in(dir.path());
        let entry = menu_with_dish(&db).await?;
        let member = create_test_user(&db, "membre", false).await?;
        let staff = create_test_user(&db, "chef", true).await?;

        let draft = submit_order(
            &db,
            &settings,
            at("2026-01-05", 9, 0),
            &member,
            OrderInput {
                order_date: date("2026-01-05"),
                lines: one_line(entry.id),
            },
        )
        .await?;
        let validated =
            validate_order(&db, &settings, &LogNotifier, &staff, draft.order.id).await?;
        let operation_id = validated.order.operation_id.unwrap();

        assert!(matches!(
            cancel_order(&db, &settings, &member, draft.order.id).await,
            Err(Error::Forbidden { .. })
        ));
        let cancelled = cancel_order(&db, &settings, &staff, draft.order.id).await?;
        assert_eq!(cancelled.order.state, OrderState::Cancelled);
        assert!(cancelled.order.operation_id.is_none());
        assert!(Operation::find_by_id(operation_id).one(&db).await?.is_none());

        let invoice = get_invoice_by_date(&db, date("2026-01-05")).await?;
        assert_eq!(invoice.order_count, 0);
        assert_eq!(invoice.total_gross, Decimal::ZERO);
        Ok(())
    }

    #[tokio::test]
    async fn test_delivery_is_terminal() -> Result<()> {
        let db = setup_test_db().await?;
        let dir = tempfile::tempdir()?;
        let settings = test_settings_in(dir.path());
        let entry = menu_with_dish(&db).await?;
        let member = create_test_user(&db, "membre", false).await?;
        let staff = create_test_user(&db, "chef", true).await?;

        let draft = submit_order(
            &db,
            &settings,
            at("2026-01-05", 9, 0),
            &member,
            OrderInput {
                order_date: date("2026-01-05"),
                lines: one_line(entry.id),
            },
        )
        .await?;
        assert!(matches!(
            deliver_order(&db, &settings, &staff, draft.order.id).await,
            Err(Error::InvalidState { .. })
        ));
        validate_order(&db, &settings, &LogNotifier, &staff, draft.order.id).await?;
        let delivered = deliver_order(&db, &settings, &staff, draft.order.id).await?;
        assert_eq!(delivered.order.state, OrderState::Delivered);

        assert!(matches!(
            cancel_order(&db, &settings, &staff, draft.order.id).await,
            Err(Error::InvalidState { .. })
        ));
        assert!(matches!(
            delete_order(&db, &staff, draft.order.id).await,
            Err(Error::InvalidState { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_visibility() -> Result<()> {
        let db = setup_test_db().await?;
        let settings = test_settings_in(std::path::Path::new("unused"));
        let entry = menu_with_dish(&db).await?;
        let awa = create_test_user(&db, "awa", false).await?;
        let binta = create_test_user(&db, "binta", false).await?;
        let staff = create_test_user(&db, "chef", true).await?;
        let now = at("2026-01-04", 9, 0);
        let input = OrderInput {
            order_date: date("2026-01-05"),
            lines: one_line(entry.id),
        };

        let awa_order = submit_order(&db, &settings, now, &awa, input.clone()).await?;
        submit_order(&db, &settings, now, &binta, input).await?;

        let filter = OrderFilter::default();
        assert_eq!(list_orders(&db, &settings, &awa, &filter).await?.len(), 1);
        assert_eq!(list_orders(&db, &settings, &staff, &filter).await?.len(), 2);
        assert!(matches!(
            get_order(&db, &settings, &binta, awa_order.order.id).await,
            Err(Error::NotFound { .. })
        ));
        assert_eq!(list_order_lines(&db, &binta, None).await?.len(), 1);
        let line_id = awa_order.lines[0].line.id;
        assert!(get_order_line(&db, &binta, line_id).await.is_err());
        assert!(get_order_line(&db, &awa, line_id).await.is_ok());

        delete_order(&db, &awa, awa_order.order.id).await?;
        assert_eq!(list_orders(&db, &settings, &staff, &filter).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_public_order_creates_guest_draft() -> Result<()> {
        let db = setup_test_db().await?;
        let settings = test_settings_in(std::path::Path::new("unused"));
        let entry = menu_with_dish(&db).await?;
        create_test_subsidy_rule(&db, SubsidyKind::Fixed, 30_000, Some(1)).await?;
        let published = crate::core::menu::publish_menu(&db, entry.menu_id, None).await?;
        let token = published.menu.public_token.unwrap();

        let input = || PublicOrderInput {
            name: "Visiteur".to_string(),
            email: None,
            lines: one_line(entry.id),
        };

        let receipt =
            submit_public_order(&db, &settings, at("2026-01-05", 12, 0), &token, input()).await?;
        assert!(receipt.pending_validation);
        assert_eq!(receipt.supplement_to_pay, dec(15_000));
        assert_eq!(receipt.order.order.state, OrderState::Draft);
        assert!(receipt.guest_username.starts_with("guest_20260105_"));

        // Public cutoff (12:30) is earlier than the member default (13:00)
        assert!(matches!(
            submit_public_order(&db, &settings, at("2026-01-05", 12, 45), "today", input()).await,
            Err(Error::OrderWindowClosed { .. })
        ));
        assert!(matches!(
            submit_public_order(&db, &settings, at("2026-01-05", 9, 0), "nope", input()).await,
            Err(Error::NotFound { .. })
        ));
        Ok(())
    }
}
