use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::eta::RouteCatalog;
use crate::fleet::Fleet;
use crate::store::Sweeper;

use super::api::locations as location_handlers;
use super::api::routes as route_handlers;
use super::api::stats as stats_handlers;
use super::api_doc::ApiDoc;
use super::auth::AppState;
use super::config::Config;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Vehicle locations
        .route(
            "/locations",
            get(location_handlers::get_locations).post(location_handlers::post_location),
        )
        .route("/locations/stream", get(location_handlers::stream_locations))
        // Route reference data
        .route("/routes", get(route_handlers::list_routes))
        .route("/routes/{id}", get(route_handlers::get_route))
        .route("/stops/{id}/arrivals", get(route_handlers::stop_arrivals))
        .route("/stats", get(stats_handlers::stats))
        // OpenAPI / Swagger
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        // Middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(config: Config) -> std::io::Result<()> {
    let bind_addr = config.web.bind.clone();

    let catalog = RouteCatalog::from_file(&config.routes.path).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{}: {}", config.routes.path.display(), e),
        )
    })?;
    log::info!(
        "Loaded {} route(s) from {}",
        catalog.len(),
        config.routes.path.display()
    );
    if !config.auth_enabled() {
        log::warn!("No API keys configured, the API is open to anyone");
    }

    let fleet = Fleet::start(catalog, config.fleet_settings());
    let mut sweeper = Sweeper::start(fleet.store.clone(), config.tracking.sweep_interval);

    let state = AppState {
        config: Arc::new(config),
        fleet,
    };
    let app = build_router(state);

    log::info!("Starting server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    sweeper.stop().await;
    log::info!("Server stopped");
    result
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown requested");
}
