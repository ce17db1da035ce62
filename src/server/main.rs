use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use argus::config::init_config;
use argus::engine::{EngineContext, EngineOptions};
use argus::geo::Geolocator;
use argus::server::database::Database;
use argus::server::handlers::AppState;
use argus::server::routes::build_router;

#[tokio::main]
async fn main() {
    let config = init_config().expect("configuration is invalid");

    if config.logging.enabled {
        let level = match config.logging.level.to_lowercase().as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "warn" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        };
        tracing_subscriber::fmt().with_max_level(level).init();
    }

    let db = Database::new().await.expect("database connection failed");
    db.migrate().await.expect("database migration failed");

    let geo = Geolocator::from_config(&config.geo).expect("geolocation setup failed");

    let engine = Arc::new(EngineContext {
        db: Arc::clone(&db),
        geo,
        options: EngineOptions {
            lookup_secret: config.crypto.lookup_secret.as_bytes().to_vec(),
            release_matching: config.engine.release_matching,
        },
    });

    let state = AppState { db, engine };
    let app = build_router(state, &config.rate_limit);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .expect("invalid server address");

    info!("Listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");

    // connect_info is required for peer-IP fallback in both the rate
    // limiter and the handler's client IP resolution.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("server failed");
}
