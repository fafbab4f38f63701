//! RPC HTTP Server
//!
//! Axum-based HTTP server that handles JSON-RPC requests. Registry calls hit
//! the store synchronously, so each request runs on the blocking pool.

use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, Method, StatusCode},
    routing::post,
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::rpc::methods::{handle_request, JsonRpcRequest, JsonRpcResponse, RpcState, INTERNAL_ERROR};

/// Build the JSON-RPC router
pub fn router(state: Arc<RpcState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/", post(handle_rpc))
        .layer(cors)
        .with_state(state)
}

/// Start the RPC server on `bind:port`; runs until the listener fails
pub async fn start_rpc_server(state: Arc<RpcState>, bind: &str, port: u16) -> std::io::Result<()> {
    let addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("RPC server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state)).await
}

/// Handle incoming JSON-RPC requests
async fn handle_rpc(
    State(state): State<Arc<RpcState>>,
    Json(request): Json<JsonRpcRequest>,
) -> (StatusCode, Json<JsonRpcResponse>) {
    let id = request.id.clone();
    let method = request.method.clone();

    let response = match tokio::task::spawn_blocking(move || handle_request(&state, request)).await {
        Ok(response) => response,
        Err(e) => {
            error!(%method, "RPC handler failed: {}", e);
            JsonRpcResponse::error(id, INTERNAL_ERROR, format!("Internal error in {}", method))
        }
    };
    (StatusCode::OK, Json(response))
}
