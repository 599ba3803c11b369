//! HTTP Servers
//!
//! Accept loops for the transaction API and the ops endpoints (health and
//! metrics). Both stop accepting when the shutdown token is cancelled and
//! let in-flight connections finish.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use super::health::{HealthCheck, HealthCheckResult};
use super::routes::{self, json_response};
use crate::error::{Error, Result};
use crate::metrics;
use crate::store::TransactionStore;

/// Pause before accepting again after an accept error
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Bind a listener, mapping failures to a readable error
pub async fn bind(addr: &str, what: &str) -> Result<TcpListener> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Config(format!("Invalid {} address '{}': {}", what, addr, e)))?;

    TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind {} server on {}: {}", what, addr, e)))
}

/// Serve the transaction API until `shutdown` is cancelled
pub async fn run_api_server(
    listener: TcpListener,
    store: Arc<TransactionStore>,
    shutdown: CancellationToken,
) -> Result<()> {
    info!("API server listening on {}", listener.local_addr()?);

    serve(listener, shutdown, move |req| {
        let store = Arc::clone(&store);
        async move { Ok::<_, Infallible>(routes::handle(store, req).await) }
    })
    .await
}

/// Serve `/healthz`, `/livez`, `/readyz` and `/metrics` until `shutdown` is
/// cancelled
pub async fn run_ops_server(
    listener: TcpListener,
    store: Arc<TransactionStore>,
    health: Arc<HealthCheck>,
    shutdown: CancellationToken,
) -> Result<()> {
    info!("Ops server listening on {}", listener.local_addr()?);

    serve(listener, shutdown, move |req| {
        let response = ops_handler(&store, &health, &req);
        async move { Ok::<_, Infallible>(response) }
    })
    .await
}

/// Route one ops request
pub fn ops_handler<B>(
    store: &TransactionStore,
    health: &HealthCheck,
    req: &Request<B>,
) -> Response<Full<Bytes>> {
    match req.uri().path() {
        "/healthz" => {
            let report = health.check_all(&store.admission().stats());
            let status = if report.status.is_operational() {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            json_response(status, &report)
        }
        "/livez" => probe_response(&health.liveness_check()),
        "/readyz" => probe_response(&health.readiness_check()),
        "/metrics" => match metrics::gather_text() {
            Ok((body, content_type)) => {
                let mut response = Response::new(Full::new(Bytes::from(body)));
                if let Ok(value) = HeaderValue::from_str(&content_type) {
                    response.headers_mut().insert(CONTENT_TYPE, value);
                }
                response
            }
            Err(e) => routes::error_response(&e),
        },
        _ => {
            let mut response = Response::new(Full::new(Bytes::from_static(b"not found")));
            *response.status_mut() = StatusCode::NOT_FOUND;
            response
        }
    }
}

fn probe_response(result: &HealthCheckResult) -> Response<Full<Bytes>> {
    let code = if result.status.is_operational() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    json_response(code, result)
}

async fn serve<F, Fut>(listener: TcpListener, shutdown: CancellationToken, handler: F) -> Result<()>
where
    F: Fn(Request<Incoming>) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = std::result::Result<Response<Full<Bytes>>, Infallible>> + Send + 'static,
{
    let connections = TaskTracker::new();

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    // Transient (e.g. EMFILE); keep accepting
                    error!("Accept error: {}", e);
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    continue;
                }
            },
        };

        let io = TokioIo::new(stream);
        let handler = handler.clone();
        let shutdown = shutdown.clone();

        connections.spawn(async move {
            let conn = http1::Builder::new().serve_connection(io, service_fn(handler));
            tokio::pin!(conn);

            let result = tokio::select! {
                result = conn.as_mut() => result,
                _ = shutdown.cancelled() => {
                    conn.as_mut().graceful_shutdown();
                    conn.as_mut().await
                }
            };

            if let Err(e) = result {
                debug!(%peer, "Connection error: {}", e);
            }
        });
    }

    drop(listener);
    connections.close();
    info!(
        open = connections.len(),
        "Server stopped accepting connections, draining"
    );
    connections.wait().await;

    info!("All connections closed");
    Ok(())
}
