use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Result, anyhow};
use axum::http::header::STRICT_TRANSPORT_SECURITY;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use campus_api::{
    AppState, Config,
    cache::{EntityCache, RedisCache},
    handlers, middleware_rate_limit,
    store::{self, PgStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,campus_api=debug,sqlx=warn".into()),
        )
        .json()
        .init();

    info!("Starting campus API v{}", env!("CARGO_PKG_VERSION"));

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    let db = store::connect_pool(&config)
        .await
        .map_err(|e| anyhow!("Failed to connect to PostgreSQL: {e}"))?;

    info!("Applying database schema...");
    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .map_err(|e| anyhow!("Migration failed: {e}"))?;

    let cache = connect_cache(&config).await;
    let state = Arc::new(AppState::new(
        Arc::new(PgStore::new(db)),
        cache,
        config.clone(),
    ));
    let _pruner =
        middleware_rate_limit::spawn_pruner(&state.rate_limiter, config.rate_limit_prune_interval());

    let routes = Router::new()
        .route("/students", post(handlers::create_student))
        .route(
            "/students/{id}",
            get(handlers::get_student)
                .put(handlers::update_student)
                .delete(handlers::delete_student),
        )
        .route("/lecturers", post(handlers::create_lecturer))
        .route(
            "/lecturers/{id}",
            get(handlers::get_lecturer)
                .put(handlers::update_lecturer)
                .delete(handlers::delete_lecturer),
        )
        .route(
            "/books",
            get(handlers::list_books).post(handlers::create_book),
        )
        .route("/books/{id}", get(handlers::get_book))
        .route("/books/{id}/borrows", get(handlers::borrow_history))
        .route("/borrow", post(handlers::borrow_book))
        .route("/return", post(handlers::return_book))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middleware_rate_limit::rate_limit,
        ));

    let hsts_value: HeaderValue =
        HeaderValue::from_static("max-age=63072000; includeSubDomains; preload");

    let app = Router::new()
        .route("/health", get(handlers::health_check))
        .merge(routes)
        .with_state(state.clone())
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            tower_http::set_header::SetResponseHeaderLayer::if_not_present(
                STRICT_TRANSPORT_SECURITY,
                hsts_value,
            ),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| anyhow!("Server error: {e}"))?;

    info!("Server shut down gracefully");
    Ok(())
}

/// Connect to Redis when configured. The cache is optional, so any failure
/// here only disables it.
async fn connect_cache(config: &Config) -> EntityCache {
    let Some(url) = &config.redis_url else {
        info!("REDIS_URL not set, running without cache");
        return EntityCache::disabled();
    };

    match RedisCache::connect(url, config.cache_timeout().max(Duration::from_secs(2))).await {
        Ok(redis) => {
            info!("Connected to Redis");
            let redis = redis.with_timeout(config.cache_timeout());
            EntityCache::new(
                Arc::new(redis),
                config.cache_read_ttl(),
                config.cache_write_ttl(),
            )
        }
        Err(e) => {
            warn!("Redis unavailable ({e}), running without cache");
            EntityCache::disabled()
        }
    }
}

/// Resolve on Ctrl+C, or on SIGTERM where the platform has it. A signal
/// that cannot be installed is logged and never fires.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        "SIGINT"
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
        "SIGTERM"
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&str>();

    let received = tokio::select! {
        name = interrupt => name,
        name = terminate => name,
    };
    info!(signal = received, "draining connections before shutdown");
}
