use axum::http::{header, HeaderValue, Method};
use expense_auth::{
    create_routes, mailer, store, AppState, AuthConfig, AuthError, CredentialStore, MailConfig,
    MemoryStore, PgStore, ServerConfig, StoreKind,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let auth_config = AuthConfig::from_env()?;
    auth_config.validate()?;
    let server = ServerConfig::from_env()?;
    let mail = MailConfig::from_env();

    let credentials: Arc<dyn CredentialStore> = match server.store {
        StoreKind::Postgres => {
            let url = server
                .database_url
                .as_deref()
                .ok_or_else(|| AuthError::Config("DATABASE_URL environment variable must be set".into()))?;
            let db = PgPoolOptions::new().max_connections(10).connect(url).await?;
            store::run_migrations(&db).await?;
            Arc::new(PgStore::new(db))
        }
        StoreKind::Memory => {
            tracing::warn!("Using in-memory store; all data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let mailer: Arc<dyn mailer::Mailer> = Arc::from(mailer::from_config(&mail)?);
    let state = AppState::new(credentials, mailer, auth_config);

    let mut app = create_routes(state).layer(TraceLayer::new_for_http());

    if let Some(origin) = &server.frontend_url {
        let cors = CorsLayer::new()
            .allow_origin(origin.parse::<HeaderValue>()?)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE])
            .allow_credentials(true);
        app = app.layer(cors);
    }

    let listener = tokio::net::TcpListener::bind(&server.bind_address).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
