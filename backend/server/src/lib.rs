//! Documentation of a personal restaurant and happy hour tracker.
//!
//!
//!
//! # General Infrastructure
//! - Single binary serving a JSON API under `/api`
//! - One SQLite file holds restaurants, lookups and the scratchpad
//! - The frontend (list, map, timeline) is served separately and only talks to this API
//! - One connection shared behind an async mutex, requests never interleave their statements
//! - Storage work runs on the blocking pool through `State::run`
//!
//!
//!
//! # Endpoints
//!
//! | Method | Path | Notes |
//! | --- | --- | --- |
//! | GET | `/api/restaurants` | `search`, `cuisines`, `types`, `neighborhoods`, `tags`, `boroughs`, `status`, `liked`, `limit`, `offset` |
//! | GET | `/api/restaurants/{id}` | 404 when unknown |
//! | POST | `/api/restaurants` | `name` required, returns `{id, message}` |
//! | PUT | `/api/restaurants/{id}` | partial, association lists replace the category |
//! | DELETE | `/api/restaurants/{id}` | removes links first |
//! | GET | `/api/cuisines`, `/api/types`, `/api/tags` | full rows ordered by name |
//! | POST | `/api/tags` | create a tag or change its color |
//! | GET | `/api/neighborhoods`, `/api/boroughs` | names only |
//! | GET | `/api/stats`, `/api/health` | counts and liveness |
//! | GET/POST | `/api/scratchpad` | the single free-text note |
//!
//!
//!
//! # Notes
//!
//! ## Search semantics
//! Category filters intersect across categories and union within one. Search is ORed on top of
//! them rather than ANDed, so typing a term can widen a filtered list. Kept as is on purpose until
//! we decide whether that is what the list view should do.
//!
//! ## Errors
//! Storage errors are returned verbatim in the 500 body. Fine for a tool with one user on
//! localhost, not for anything exposed.
//!
//!
//!
//! # Setup
//!
//! Run the server.
//! ```sh
//! RUST_LOG=info DATABASE_PATH=restaurants.db cargo run -p happyhour
//! `````
//!
//! Run the server after migrating legacy fields.
//! ```sh
//! cargo run -p happyhour --features migrate
//! `````
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! `````
use std::{any::Any, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    http::{Method, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::get,
};

use serde_json::json;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tokio::{net::TcpListener, signal::ctrl_c};
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod associations;
pub mod config;
pub mod database;
pub mod error;
pub mod lookups;
pub mod models;
pub mod query;
pub mod routes;
pub mod state;
pub mod utils;

use error::AppError;
use routes::{
    boroughs_handler, create_restaurant_handler, cuisines_handler, delete_restaurant_handler,
    get_restaurant_handler, get_scratchpad_handler, health_handler, list_restaurants_handler,
    neighborhoods_handler, not_found_handler, save_scratchpad_handler, stats_handler,
    tags_handler, types_handler, update_restaurant_handler, upsert_tag_handler,
};
use state::State;

pub async fn start_server() -> Result<(), AppError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    info!("Initializing state...");
    let state = State::new()?;

    info!("Starting server...");
    let app = router(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down...");
    state.close()
}

pub fn router(state: Arc<State>) -> Router {
    with_layers(api_routes()).with_state(state)
}

fn api_routes() -> Router<Arc<State>> {
    Router::new()
        .route(
            "/api/restaurants",
            get(list_restaurants_handler).post(create_restaurant_handler),
        )
        .route(
            "/api/restaurants/{id}",
            get(get_restaurant_handler)
                .put(update_restaurant_handler)
                .delete(delete_restaurant_handler),
        )
        .route("/api/cuisines", get(cuisines_handler))
        .route("/api/types", get(types_handler))
        .route("/api/neighborhoods", get(neighborhoods_handler))
        .route("/api/tags", get(tags_handler).post(upsert_tag_handler))
        .route("/api/boroughs", get(boroughs_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/health", get(health_handler))
        .route(
            "/api/scratchpad",
            get(get_scratchpad_handler).post(save_scratchpad_handler),
        )
}

/// JSON 404 fallback, panic catcher, request tracing and CORS around `routes`.
pub(crate) fn with_layers(routes: Router<Arc<State>>) -> Router<Arc<State>> {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    routes
        .fallback(not_found_handler)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn handle_panic(_: Box<dyn Any + Send + 'static>) -> Response {
    error!("Handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal server error" })),
    )
        .into_response()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
