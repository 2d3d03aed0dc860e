//! OrderLine entity - One dish within an order, priced at order time.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// OrderLine database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_lines")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning order
    pub order_id: i64,
    /// Ordered menu entry
    pub menu_dish_id: i64,
    /// Number of portions
    pub quantity: i32,
    /// Day price of the dish when ordered (uncapped)
    pub unit_price: Decimal,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Owning order
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id",
        on_delete = "Cascade"
    )]
    Order,
    /// Ordered menu entry
    #[sea_orm(
        belongs_to = "super::menu_dish::Entity",
        from = "Column::MenuDishId",
        to = "super::menu_dish::Column::Id",
        on_delete = "Restrict"
    )]
    MenuDish,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl Related<super::menu_dish::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MenuDish.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
