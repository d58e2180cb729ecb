use std::sync::Arc;

use axum::extract::State;
use axum::http::{self, header};
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use yaniv_server::room::manager::RoomManager;
use yaniv_server::session::AppState;
use yaniv_server::{config, protocol, telemetry, ws};

async fn healthz() -> &'static str {
    "ok"
}

async fn list_rooms(State(state): State<AppState>) -> Json<Vec<protocol::RoomSummary>> {
    Json(state.rooms.available_rooms())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    let rooms = Arc::new(RoomManager::new());
    rooms.seed_defaults();
    let state = AppState { rooms };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/rooms", get(list_rooms))
        .route("/ws", get(ws::ws_handler))
        .layer(
            CorsLayer::new()
                .allow_methods([http::Method::GET, http::Method::POST])
                .allow_headers([header::CONTENT_TYPE])
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config::server_addr();
    info!(%addr, "listening");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
