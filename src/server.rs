// Copyright 2026 The OpenEBS Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Plugin RPC surface: one `POST /csi.v1.<Service>/<Method>` route per call,
//! JSON bodies, served on a unix socket or a TCP address.

pub mod error;
mod handlers;
pub mod routes;
pub mod state;

use crate::config::Endpoint;
use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use state::AppState;
use tokio::net::{TcpListener, UnixListener};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .merge(routes::identity_routes())
        .merge(routes::controller_routes())
        .merge(routes::node_routes())
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

/// Serves until `shutdown` fires, then drains in-flight calls.
pub async fn serve(
    endpoint: &Endpoint,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let app = router(state);
    let stopped = async move { shutdown.cancelled().await };

    match endpoint {
        Endpoint::Unix(path) => {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            // a socket left behind by a previous process blocks the bind
            match tokio::fs::remove_file(path).await {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e),
                _ => {}
            }
            let listener = UnixListener::bind(path)?;
            info!(%endpoint, "plugin listening");
            axum::serve(listener, app)
                .with_graceful_shutdown(stopped)
                .await
        }
        Endpoint::Tcp(address) => {
            let listener = TcpListener::bind(address).await?;
            info!(%endpoint, "plugin listening");
            axum::serve(listener, app)
                .with_graceful_shutdown(stopped)
                .await
        }
    }
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
