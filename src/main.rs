use demeter::{
    app, apply_migrations, builtin_config, ensure_database_exists, load_from_path, resolve, AppState,
    CrudService, MemoryStore, PgStore, Settings, StorageKind, Store,
};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("demeter=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    let config = match &settings.schema_path {
        Some(path) => load_from_path(path).await?,
        None => builtin_config()?,
    };
    let model = Arc::new(resolve(&config)?);

    let store: Arc<dyn Store> = match settings.storage {
        StorageKind::Postgres => {
            ensure_database_exists(&settings.database_url).await?;
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(settings.max_connections)
                .connect(&settings.database_url)
                .await?;
            apply_migrations(&pool, &config).await?;
            Arc::new(PgStore::new(pool))
        }
        StorageKind::Memory => {
            tracing::warn!("using in-memory storage; data is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let crud = CrudService::new(store, model).with_reference_checks(settings.enforce_references);
    let state = AppState::new(crud);

    let listener = TcpListener::bind(settings.bind).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        storage = ?settings.storage,
        resources = state.model().entities.len(),
        "demeter listening"
    );
    axum::serve(listener, app(state)).await?;
    Ok(())
}
