//! Loopback HTTP listener exposing the cost estimator to the optimizer
//! process.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use ob_types::{BridgeError, CancellationToken};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::api::{Endpoint, ErrorResponse, EstimateCostRequest, RegisterReportRequest};
use crate::estimator::CostEstimator;

/// HTTP status for a failed bridge call.
pub fn status_code(err: &BridgeError) -> StatusCode {
    match err {
        BridgeError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
        BridgeError::MalformedRequest { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

struct BridgeState {
    estimator: Arc<CostEstimator>,
    /// Parent of every per-request token; cancelled on shutdown.
    cancel: CancellationToken,
    /// Most recent handling failure, overwritten on every new one.
    last_error: Mutex<Option<BridgeError>>,
}

impl BridgeState {
    /// Uniform request pipeline: method check, decode, dispatch, encode.
    /// Failures become an error response and are kept as the last error.
    async fn handle<Req, Resp, F>(
        self: Arc<Self>,
        endpoint: Endpoint,
        method: Method,
        body: Bytes,
        dispatch: F,
    ) -> Response
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: FnOnce(&CostEstimator, Req, &CancellationToken) -> Result<Resp, BridgeError>
            + Send
            + 'static,
    {
        debug!("request handling started");
        match self.process(endpoint, &method, body, dispatch).await {
            Ok(encoded) => {
                debug!("request handling finished");
                (
                    StatusCode::OK,
                    [(header::CONTENT_TYPE, "application/json")],
                    encoded,
                )
                    .into_response()
            }
            Err(err) => {
                let status = status_code(&err);
                error!(error = %err, status = status.as_u16(), "request handling failed");
                let body = Json(ErrorResponse {
                    error: err.to_string(),
                });
                *self.last_error.lock() = Some(err);
                (status, body).into_response()
            }
        }
    }

    async fn process<Req, Resp, F>(
        &self,
        endpoint: Endpoint,
        method: &Method,
        body: Bytes,
        dispatch: F,
    ) -> Result<Vec<u8>, BridgeError>
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: FnOnce(&CostEstimator, Req, &CancellationToken) -> Result<Resp, BridgeError>
            + Send
            + 'static,
    {
        if method.as_str() != endpoint.method() {
            return Err(BridgeError::MethodNotAllowed {
                expected: endpoint.method().to_string(),
                actual: method.to_string(),
            });
        }

        let request: Req =
            serde_json::from_slice(&body).map_err(|e| BridgeError::MalformedRequest {
                message: e.to_string(),
            })?;

        // the cost function may block for a long time; if this future is
        // dropped the guard cancels the evaluation's token
        let cancel = self.cancel.child_token();
        let _guard = cancel.clone().drop_guard();
        let estimator = Arc::clone(&self.estimator);
        let response = tokio::task::spawn_blocking(move || dispatch(&estimator, request, &cancel))
            .await
            .map_err(|e| BridgeError::Internal {
                message: format!("estimator task: {e}"),
            })??;

        serde_json::to_vec(&response).map_err(|e| BridgeError::Encoding {
            message: e.to_string(),
        })
    }
}

async fn estimate_cost(
    State(state): State<Arc<BridgeState>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let span = info_span!("bridge_request", method = %method, path = %uri.path());
    state
        .handle(
            Endpoint::EstimateCost,
            method,
            body,
            |estimator, request: EstimateCostRequest, cancel| {
                estimator.estimate_cost(&request, cancel)
            },
        )
        .instrument(span)
        .await
}

async fn register_report(
    State(state): State<Arc<BridgeState>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let span = info_span!("bridge_request", method = %method, path = %uri.path());
    state
        .handle(
            Endpoint::RegisterReport,
            method,
            body,
            |estimator, request: RegisterReportRequest, _| estimator.register_report(request),
        )
        .instrument(span)
        .await
}

/// Running bridge. Dropping it signals the server to stop; call
/// [`BridgeServer::shutdown`] to also wait for in-flight requests.
pub struct BridgeServer {
    local_addr: SocketAddr,
    state: Arc<BridgeState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl BridgeServer {
    /// Bind `endpoint` and start serving in the background.
    pub async fn start(endpoint: &str, estimator: Arc<CostEstimator>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(endpoint).await?;
        let local_addr = listener.local_addr()?;

        let state = Arc::new(BridgeState {
            estimator,
            cancel: CancellationToken::new(),
            last_error: Mutex::new(None),
        });
        let router = Router::new()
            .route(Endpoint::EstimateCost.path(), any(estimate_cost))
            .route(Endpoint::RegisterReport.path(), any(register_report))
            .with_state(Arc::clone(&state));

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, router).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                error!("bridge server: {}", e);
            }
        });

        info!(%local_addr, "bridge server listening");
        Ok(Self {
            local_addr,
            state,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// Address actually bound, with the ephemeral port resolved.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn estimator(&self) -> &Arc<CostEstimator> {
        &self.state.estimator
    }

    /// Message of the most recent failed call, if any.
    pub fn last_error_message(&self) -> Option<String> {
        self.state.last_error.lock().as_ref().map(|e| e.to_string())
    }

    /// Take the most recent failed call's error, leaving the slot empty.
    pub fn take_last_error(&self) -> Option<BridgeError> {
        self.state.last_error.lock().take()
    }

    /// Stop accepting connections, cancel and drain in-flight requests and
    /// release the socket. Calling it again is a no-op.
    pub async fn shutdown(&mut self) {
        self.state.cancel.cancel();
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("bridge server task: {}", e);
            }
            info!(local_addr = %self.local_addr, "bridge server stopped");
        }
    }
}

impl Drop for BridgeServer {
    fn drop(&mut self) {
        self.state.cancel.cancel();
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
