use axum::http::{HeaderValue, Method, header};
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use murmur_server::rate_limit::{CounterStore, RedbCounterStore, RedisCounterStore};
use murmur_server::{AppState, Config, build_router, open_database};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "murmur_server=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Murmur Server...");

    // Load configuration
    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    tracing::info!(
        "Environment: {}, Server: {}",
        config.environment,
        config.server_address()
    );

    let db = open_database(&config.database_path)?;

    // Durable rate limit counters: Redis when configured, else the embedded database.
    // An unreachable Redis is retried by the housekeeping task below.
    let durable: Arc<dyn CounterStore> = match &config.redis_url {
        Some(url) => {
            let timeout = Duration::from_millis(config.backend_timeout_ms);
            match RedisCounterStore::new(url, timeout) {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    tracing::warn!("{}, counting rate limits in redb", e);
                    Arc::new(RedbCounterStore::new(db.clone()))
                }
            }
        }
        None => Arc::new(RedbCounterStore::new(db.clone())),
    };

    let state = AppState::new(db, config.clone(), Some(durable)).await;

    // Periodic limiter housekeeping: re-probe backends, drop expired windows
    let limiters = state.limiters.clone();
    let post_limiter = state.post_limiter.clone();
    let reprobe = Duration::from_secs(config.rate_limit_reprobe_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(reprobe);
        interval.tick().await;
        loop {
            interval.tick().await;
            let now = Utc::now().timestamp();
            limiters.maintain(now).await;
            let pruned = post_limiter.prune_all(now);
            if pruned > 0 {
                tracing::debug!("Dropped {} idle users from the post log", pruned);
            }
        }
    });

    // Configure CORS
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let app = build_router(state);
    let app = if config.log_requests {
        tracing::info!("Request logging enabled");
        app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
    } else {
        app.layer(cors)
    };

    // Start server
    let addr: SocketAddr = config.server_address().parse()?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
