//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Request bodies are
//! collected here and handed to the routes as `Request<Bytes>`.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::Args;
use crate::lifecycle::{LoanService, ReferenceGenerator};
use crate::routes::{self, FullBody};
use crate::store::ApplicationStore;
use crate::types::LoanDeskError;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Largest accepted request body
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub service: LoanService,
    pub started_at: Instant,
}

impl AppState {
    /// Wire the lifecycle service over an already opened store
    pub fn new(args: Args, store: Arc<dyn ApplicationStore>) -> Self {
        let references = ReferenceGenerator::new(args.reference_prefix.trim());
        let service = LoanService::new(store, references).with_max_page_size(args.max_page_size);

        Self {
            args,
            service,
            started_at: Instant::now(),
        }
    }
}

/// Accept connections until `shutdown` resolves
pub async fn run<F>(state: Arc<AppState>, shutdown: F) -> Result<(), LoanDeskError>
where
    F: Future<Output = ()>,
{
    let listener = TcpListener::bind(state.args.listen).await?;
    info!("Loan Desk listening on {}", state.args.listen);

    if state.args.dev_mode {
        warn!("Running in DEVELOPMENT mode");
    }
    if state.args.admin_key().is_none() {
        warn!("ADMIN_API_KEY not set, admin endpoints are unauthenticated");
    }

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested, no longer accepting connections");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);

                        let service = service_fn(move |req| {
                            let state = Arc::clone(&state);
                            async move { handle_request(state, addr, req).await }
                        });

                        if let Err(err) = http1::Builder::new()
                            .serve_connection(io, service)
                            .await
                        {
                            error!("Error serving connection from {}: {:?}", addr, err);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {:?}", e);
                }
            }
        }
    }
}

async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    info!("[{}] {} {}", addr, req.method(), req.uri().path());

    let (parts, body) = req.into_parts();
    let body = match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("[{}] Rejected request body: {}", addr, e);
            return Ok(to_boxed(routes::error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large or unreadable",
                Some("INVALID_BODY"),
            )));
        }
    };

    let response = dispatch(state, Request::from_parts(parts, body)).await;
    Ok(to_boxed(response))
}

/// Route a request with a collected body
pub async fn dispatch(state: Arc<AppState>, req: Request<Bytes>) -> Response<FullBody> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    if method == Method::OPTIONS {
        return preflight_response();
    }

    match path.as_str() {
        "/api/health" | "/health" if method == Method::GET => routes::health_check(&state),
        p if p == "/api/loans" || p.starts_with("/api/loans/") => {
            routes::handle_loans_request(req, state, &path).await
        }
        p if p == "/api/admin" || p.starts_with("/api/admin/") => {
            routes::handle_admin_request(req, state, &path).await
        }
        _ => not_found_response(&path),
    }
}

fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Headers", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, OPTIONS")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

/// Not found response
pub(crate) fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "success": false,
        "error": "Not Found",
        "path": path,
    });

    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}
