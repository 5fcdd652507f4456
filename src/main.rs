use chat_backend::ai_client::HttpAiResponder;
use chat_backend::config::{AppConfig, StoreBackend};
use chat_backend::services::analytics::PlaceholderTagger;
use chat_backend::services::chat_service::ChatService;
use chat_backend::services::rate_limiter::InMemoryRateLimiter;
use chat_backend::store::{MemoryStore, PgStore, Stores};
use chat_backend::{db, handlers, AppState};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_logging()?;

    let config = AppConfig::from_env()?;

    let (db_pool, stores) = match (config.store_backend, config.database_url.as_deref()) {
        (StoreBackend::Postgres, Some(database_url)) => {
            let pool = db::create_pool(database_url, &config).await?;
            tracing::info!("Using PostgreSQL store");
            let stores = Stores::from_backend(Arc::new(PgStore::new(pool.clone())));
            (Some(pool), stores)
        }
        (StoreBackend::Postgres, None) => {
            return Err("DATABASE_URL must be set for the postgres backend".into());
        }
        (StoreBackend::Memory, _) => {
            tracing::warn!("Using in-memory store. Data is lost on restart.");
            (None, Stores::from_backend(Arc::new(MemoryStore::new())))
        }
    };

    let responder = HttpAiResponder::new(
        config.ai_api_url.clone(),
        config.ai_api_key.clone(),
        Duration::from_secs(config.ai_timeout_secs),
    )?;
    tracing::info!(url = %config.ai_api_url, timeout_secs = config.ai_timeout_secs, "AI model client ready");

    let rate_limiter = Arc::new(InMemoryRateLimiter::new(
        config.rate_limit_max,
        config.rate_limit_window_secs,
    ));
    tracing::info!(
        max = config.rate_limit_max,
        window_secs = config.rate_limit_window_secs,
        "Message rate limiting enabled"
    );

    let chat = Arc::new(ChatService::new(
        &stores,
        rate_limiter.clone(),
        Arc::new(responder),
        Arc::new(PlaceholderTagger),
    ));

    let bind_addr = config.bind_addr.clone();
    let shared_state = Arc::new(AppState {
        config,
        db_pool,
        stores,
        chat,
        rate_limiter,
    });

    let app = handlers::app_router(shared_state);

    // Serve with ConnectInfo so the logging middleware can record peer addresses
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug,chat_backend=trace,sqlx=info,reqwest=info,hyper=info,tower=info".to_string()
        } else {
            "info,chat_backend=info,sqlx=warn,reqwest=warn,hyper=warn,tower=warn".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    tracing::info!("Chat backend starting up...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Build mode: {}",
        if cfg!(debug_assertions) { "development" } else { "production" }
    );
    tracing::info!("Log level: {}", log_level);

    Ok(())
}
