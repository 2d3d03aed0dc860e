//! HTTP interface.
//!
//! All routes live under `/api`. Handlers are thin: they extract the caller
//! and the payload, call into [`crate::core`] and serialize the result.
//! Errors are rendered by [`error`].

pub mod auth;
pub mod budget;
pub mod canteen;
pub mod error;
pub mod orders;
pub mod public;
pub mod reports;
pub mod users;

use crate::{
    config::Settings,
    core::{clock::Clock, notify::Notifier},
    errors::{Error, Result},
};
use axum::{
    Router,
    http::{
        HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct ApiState {
    /// Connection pool
    pub db: DatabaseConnection,
    /// Settings loaded at startup
    pub settings: Arc<Settings>,
    /// Source of "now" for order windows
    pub clock: Arc<dyn Clock>,
    /// Delivery of order confirmations
    pub notifier: Arc<dyn Notifier>,
}

fn cors_layer(settings: &Settings) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    if settings.cors_allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = settings
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| {
            origin
                .parse()
                .inspect_err(|_| warn!("Ignoring invalid CORS origin {origin}"))
                .ok()
        })
        .collect();
    layer.allow_origin(origins)
}

/// Builds the application router.
pub fn router(state: ApiState) -> Router {
    let budget = Router::new()
        .route(
            "/categories",
            get(budget::list_categories).post(budget::create_category),
        )
        .route(
            "/categories/:id",
            get(budget::get_category)
                .put(budget::update_category)
                .delete(budget::delete_category),
        )
        .route(
            "/subcategories",
            get(budget::list_subcategories).post(budget::create_subcategory),
        )
        .route(
            "/subcategories/:id",
            get(budget::get_subcategory)
                .put(budget::update_subcategory)
                .delete(budget::delete_subcategory),
        )
        .route(
            "/forecasts",
            get(budget::list_forecasts).post(budget::create_forecast),
        )
        .route(
            "/forecasts/:id",
            get(budget::get_forecast)
                .put(budget::update_forecast)
                .delete(budget::delete_forecast),
        )
        .route("/forecasts/:id/balance", get(budget::forecast_balance))
        .route(
            "/operations",
            get(budget::list_operations).post(budget::create_operation),
        )
        .route(
            "/operations/:id",
            get(budget::get_operation)
                .put(budget::update_operation)
                .delete(budget::delete_operation),
        )
        .route(
            "/imputations",
            get(budget::list_imputations).post(budget::create_imputation),
        )
        .route(
            "/imputations/:id",
            get(budget::get_imputation)
                .put(budget::update_imputation)
                .delete(budget::delete_imputation),
        )
        .route("/multi-imputations", post(budget::multi_impute));

    let canteen = Router::new()
        .route(
            "/dishes",
            get(canteen::list_dishes).post(canteen::create_dish),
        )
        .route(
            "/dishes/:id",
            get(canteen::get_dish)
                .put(canteen::update_dish)
                .delete(canteen::delete_dish),
        )
        .route(
            "/menus",
            get(canteen::list_menus).post(canteen::create_menu),
        )
        .route(
            "/menus/:id",
            get(canteen::get_menu).delete(canteen::delete_menu),
        )
        .route("/menus/:id/publish", post(canteen::publish_menu))
        .route("/menus/:id/dishes", post(canteen::add_menu_dish))
        .route(
            "/menus/:id/dishes/:menu_dish_id",
            axum::routing::delete(canteen::remove_menu_dish),
        )
        .route("/menu-dishes", get(canteen::list_menu_dishes))
        .route(
            "/menu-dishes/:id",
            get(canteen::get_menu_dish)
                .put(canteen::update_menu_dish)
                .delete(canteen::delete_menu_dish),
        )
        .route(
            "/order-windows",
            get(canteen::list_order_windows).post(canteen::create_order_window),
        )
        .route(
            "/order-windows/:id",
            get(canteen::get_order_window)
                .put(canteen::update_order_window)
                .delete(canteen::delete_order_window),
        )
        .route(
            "/subsidy-rules",
            get(canteen::list_subsidy_rules).post(canteen::create_subsidy_rule),
        )
        .route(
            "/subsidy-rules/:id",
            get(canteen::get_subsidy_rule)
                .put(canteen::update_subsidy_rule)
                .delete(canteen::delete_subsidy_rule),
        )
        .route("/active-subsidy-rule", get(canteen::active_subsidy_rule))
        .route("/orders", get(orders::list).post(orders::submit))
        .route("/orders/:id", get(orders::get).delete(orders::delete))
        .route("/orders/:id/validate", post(orders::validate))
        .route("/orders/:id/cancel", post(orders::cancel))
        .route("/orders/:id/deliver", post(orders::deliver))
        .route("/order-lines", get(orders::list_lines))
        .route("/order-lines/:id", get(orders::get_line))
        .route("/invoices", get(canteen::list_invoices))
        .route(
            "/invoices/:date",
            get(canteen::get_invoice).post(canteen::generate_invoice),
        )
        .route("/invoices/:date/document", get(canteen::invoice_document))
        .route(
            "/extras",
            get(canteen::list_extras).post(canteen::create_extra),
        )
        .route(
            "/extras/:id",
            get(canteen::get_extra)
                .put(canteen::update_extra)
                .delete(canteen::delete_extra),
        );

    let api = Router::new()
        .route("/health", get(users::health))
        .route("/auth/token", post(auth::issue_token))
        .route("/auth/token/refresh", post(auth::refresh_token))
        .route("/me", get(auth::me))
        .route("/users", get(users::list).post(users::create))
        .route(
            "/users/:id",
            get(users::get).put(users::update).delete(users::delete),
        )
        .route(
            "/users/:id/permissions",
            get(users::permissions).put(users::set_permissions),
        )
        .route("/reports/monthly", get(reports::monthly))
        .route("/reports/daily-totals", get(reports::daily_totals))
        .route("/reports/weekly-totals", get(reports::weekly_totals))
        .route("/reports/orders", get(reports::orders))
        .route("/exports/operations.csv", get(reports::export_operations))
        .route("/exports/forecasts.csv", get(reports::export_forecasts))
        .route("/imports/operations.csv", post(reports::import_operations))
        .route("/imports/forecasts.csv", post(reports::import_forecasts))
        .route("/audit", get(reports::list_audit))
        .route("/audit/:id", get(reports::get_audit))
        .route("/public/menus/:token", get(public::menu))
        .route("/public/menus/:token/orders", post(public::place_order))
        .merge(budget)
        .nest("/canteen", canteen);

    let cors = cors_layer(&state.settings);
    Router::new()
        .nest("/api", api)
        .layer(CatchPanicLayer::custom(error::panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Binds the configured address and serves until Ctrl+C or SIGTERM.
pub async fn serve(state: ApiState) -> Result<()> {
    let address = state.settings.bind_addr.clone();
    let app = router(state);

    info!("Binding to {address}");
    let listener = TcpListener::bind(&address).await.map_err(|e| Error::Config {
        message: format!("Cannot bind {address}: {e}"),
    })?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
