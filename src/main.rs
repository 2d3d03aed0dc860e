use budget_canteen::{
    api::{self, ApiState},
    config::{self, Settings},
    core::{clock::SystemClock, notify::LogNotifier},
    errors::Result,
};
use dotenvy::dotenv;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Settings
    let settings = Settings::from_env()
        .inspect_err(|e| error!("Critical error loading settings: {e}"))?;

    // 4. Database and schema
    let db = config::database::create_connection(&settings.database_url)
        .await
        .inspect_err(|e| error!("Failed to connect to database: {e}"))?;
    config::database::create_tables(&db)
        .await
        .inspect(|()| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to create tables: {e}"))?;

    // 5. Reference data and bootstrap admin
    let seed = config::seed::load_seed_config(&settings.seed_config)?;
    config::seed::seed_reference_data(&db, &seed)
        .await
        .inspect_err(|e| error!("Failed to seed reference data: {e}"))?;
    config::seed::seed_admin(
        &db,
        settings.admin_username.as_deref(),
        settings.admin_password.as_deref(),
    )
    .await?;

    // 6. Serve
    let state = ApiState {
        db,
        settings: Arc::new(settings),
        clock: Arc::new(SystemClock),
        notifier: Arc::new(LogNotifier),
    };
    api::serve(state).await
}
