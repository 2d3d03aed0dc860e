//! Entity module - Contains all SeaORM entity definitions for the database.
//! The budget side (categories, forecasts, operations, imputations) and the
//! canteen side (dishes, menus, orders, invoices) share one schema; canteen
//! orders reach the budget side through the operation they create.

pub mod audit_log;
pub mod category;
pub mod dish;
pub mod extra;
pub mod forecast;
pub mod imputation;
pub mod invoice;
pub mod menu;
pub mod menu_dish;
pub mod operation;
pub mod order;
pub mod order_line;
pub mod order_window;
pub mod subcategory;
pub mod subsidy_rule;
pub mod user;
pub mod user_permission;

// Re-export specific types to avoid conflicts
pub use audit_log::{AuditAction, Entity as AuditLog, Model as AuditLogModel};
pub use category::{Entity as Category, Model as CategoryModel};
pub use dish::{Entity as Dish, MealCategory, Model as DishModel};
pub use extra::{Entity as Extra, ExtraKind, Model as ExtraModel};
pub use forecast::{Entity as Forecast, ForecastStatus, Model as ForecastModel};
pub use imputation::{Entity as Imputation, Model as ImputationModel};
pub use invoice::{Entity as Invoice, Model as InvoiceModel};
pub use menu::{Entity as Menu, Model as MenuModel};
pub use menu_dish::{Entity as MenuDish, Model as MenuDishModel};
pub use operation::{Entity as Operation, Model as OperationModel};
pub use order::{Entity as Order, Model as OrderModel, OrderState};
pub use order_line::{Entity as OrderLine, Model as OrderLineModel};
pub use order_window::{Entity as OrderWindow, Model as OrderWindowModel};
pub use subcategory::{Entity as Subcategory, Model as SubcategoryModel};
pub use subsidy_rule::{Entity as SubsidyRule, Model as SubsidyRuleModel, SubsidyKind};
pub use user::{Entity as User, Model as UserModel};
pub use user_permission::{Entity as UserPermission, Model as UserPermissionModel};
