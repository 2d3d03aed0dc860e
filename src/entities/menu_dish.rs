//! MenuDish entity - A dish offered on a menu, with its price of the day.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// MenuDish database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "menu_dishes")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning menu
    pub menu_id: i64,
    /// Offered dish
    pub dish_id: i64,
    /// Price charged on that day (GNF)
    pub day_price: Decimal,
    /// Maximum number of portions, `None` for unlimited
    pub stock_cap: Option<i32>,
    /// Display order within the menu
    pub position: i32,
}

/// A menu entry goes away with its menu; dishes in use cannot be deleted
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Owning menu
    #[sea_orm(
        belongs_to = "super::menu::Entity",
        from = "Column::MenuId",
        to = "super::menu::Column::Id",
        on_delete = "Cascade"
    )]
    Menu,
    /// Offered dish
    #[sea_orm(
        belongs_to = "super::dish::Entity",
        from = "Column::DishId",
        to = "super::dish::Column::Id",
        on_delete = "Restrict"
    )]
    Dish,
}

impl Related<super::menu::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Menu.def()
    }
}

impl Related<super::dish::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Dish.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
