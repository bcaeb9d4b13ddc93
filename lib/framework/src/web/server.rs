use std::net::SocketAddr;

use axum::Router;
use axum::extract::ConnectInfo;
use axum::extract::MatchedPath;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::http::header;
use axum::middleware;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::debug;
use tracing::info;

use crate::exception::CoreRsResult;
use crate::log;

pub const HEALTH_CHECK_PATH: &str = "/health-check";

#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    pub bind_address: String,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        HttpServerConfig {
            bind_address: "0.0.0.0:8080".to_owned(),
        }
    }
}

pub async fn start_http_server(
    router: Router,
    mut shutdown_signal: broadcast::Receiver<()>,
    config: HttpServerConfig,
) -> CoreRsResult<()> {
    let app = router.layer(middleware::from_fn(http_server_layer));
    let app = app.into_make_service_with_connect_info::<SocketAddr>();
    let listener = TcpListener::bind(&config.bind_address).await.map_err(|err| {
        exception!(
            message = format!("failed to bind http server, bind={}", config.bind_address),
            source = err
        )
    })?;
    info!("http server started, bind={}", config.bind_address);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            // a closed channel means no one can send shutdown any more, stop as well
            let _ = shutdown_signal.recv().await;
        })
        .await?;
    info!("http server stopped");

    Ok(())
}

async fn http_server_layer(request: Request, next: Next) -> Response {
    if request.uri().path() == HEALTH_CHECK_PATH {
        return StatusCode::OK.into_response();
    }

    let mut response = None;
    log::start_action("http", None, async {
        let method = request.method().clone();
        let uri = request.uri().clone();
        debug!(method = ?method, uri = ?uri, "[request]");
        for (name, value) in request.headers() {
            if name != header::COOKIE && name != header::AUTHORIZATION {
                debug!("[header] {name}={value:?}");
            }
        }
        debug!(uri = ?uri, method = ?method, "context");

        if let Some(ConnectInfo(remote)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
            debug!(client_ip = %remote.ip(), "context");
        }
        if let Some(matched_path) = request.extensions().get::<MatchedPath>() {
            debug!(matched_path = matched_path.as_str(), "context");
        }

        let http_response = next.run(request).await;

        let status = http_response.status().as_u16();
        debug!(status, "[response]");
        debug!(response_status = status, "context");
        response = Some(http_response);
        Ok(())
    })
    .await;
    response.unwrap_or_else(|| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
