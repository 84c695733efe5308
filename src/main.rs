use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::{serve, Extension};
use dotenvy::dotenv;
use shift_portal::{
    api,
    infrastructure::{
        cache::{MemoryCache, NoopCache, SummaryCache},
        config::Config,
        db,
        source::{PgRateSource, PgRowSource},
        state::AppState,
    },
    telemetry,
};
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    telemetry::init();
    let config = Arc::new(Config::from_env()?);
    let pool = db::connect(&config.database).await?;
    info!("database pool established");

    let rows = Arc::new(PgRowSource::new(pool.clone()));
    let rates = Arc::new(PgRateSource::new(pool));
    let cache: Arc<dyn SummaryCache> = if config.cache.enabled {
        Arc::new(MemoryCache::new())
    } else {
        Arc::new(NoopCache)
    };
    let state = Arc::new(AppState::new(Arc::clone(&config), rows, rates, cache));

    let router = api::build_router()
        .layer(cors_layer(&config))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::clone(&state)))
        .fallback(api::not_found);

    let addr: SocketAddr = config.bind_address().parse()?;
    info!(%addr, "starting shift portal api");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server = serve(listener, router.into_make_service());

    tokio::select! {
        res = server => {
            if let Err(err) = res {
                warn!(error = ?err, "server exited with error");
            }
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.app.cors_origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let origins: Vec<HeaderValue> = config
        .app
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
