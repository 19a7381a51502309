//! HTTP ingress.
//!
//! Endpoints:
//! - `POST /` - accept one flat event for delivery
//! - `GET /health` - liveness check
//!
//! The acknowledgment on `/` means "accepted for processing" only. Delivery
//! happens later on a worker and its outcome never reaches the caller.

use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::config::RelayConfig;
use crate::delivery::DeliveryClient;
use crate::dispatcher::Dispatcher;
use crate::error::{DispatchError, IngressError, ServerError};
use crate::types::InboundEvent;
use crate::worker::metric_inc;

pub const ACK_BODY: &str = "Request received successfully";

/// Application context built once at startup and shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}

/// Build the ingress router.
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", post(ingest_handler).fallback(method_not_allowed))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `app` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, "ingress listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

/// Wire up client, dispatcher and ingress from `config` and run until
/// `shutdown` resolves. Queued events are drained before returning.
pub async fn run<F>(config: RelayConfig, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let client = DeliveryClient::new(config.collector.clone())?;
    let dispatcher = Arc::new(Dispatcher::new(config.dispatcher.clone(), client));

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: config.listen_addr,
            source,
        })?;

    let app = router(AppState::new(dispatcher.clone()), config.max_body_bytes);
    let served = serve(listener, app, shutdown).await;

    info!(
        pending = dispatcher.queue_depth(),
        "ingress stopped, draining dispatch queue"
    );
    dispatcher.shutdown().await;

    served
}

async fn health_handler() -> StatusCode {
    StatusCode::OK
}

/// Any method other than POST on `/`. Takes no body extractor, so the body
/// limit never applies here.
async fn method_not_allowed() -> Response {
    IngressError::MethodNotAllowed.into_response()
}

async fn ingest_handler(State(state): State<AppState>, body: Bytes) -> Response {
    match ingest(&state, &body) {
        Ok(()) => {
            metric_inc("relay.ingress.accepted");
            (StatusCode::OK, ACK_BODY).into_response()
        }
        Err(err) => err.into_response(),
    }
}

fn ingest(state: &AppState, body: &[u8]) -> Result<(), IngressError> {
    let event = InboundEvent::from_body(body).map_err(IngressError::Parse)?;
    state.dispatcher.dispatch(event)?;
    Ok(())
}

impl IntoResponse for IngressError {
    fn into_response(self) -> Response {
        match self {
            IngressError::MethodNotAllowed => {
                metric_inc("relay.ingress.rejected.method");
                (StatusCode::METHOD_NOT_ALLOWED, self.to_string()).into_response()
            }
            IngressError::Parse(ref err) => {
                metric_inc("relay.ingress.rejected.parse");
                debug!(error = %err, "rejecting unparseable event");
                (StatusCode::BAD_REQUEST, self.to_string()).into_response()
            }
            IngressError::Dispatch(DispatchError::Backpressure) => (
                StatusCode::SERVICE_UNAVAILABLE,
                [(header::RETRY_AFTER, "1")],
                "Server busy, retry later",
            )
                .into_response(),
            IngressError::Dispatch(DispatchError::Shutdown) => {
                (StatusCode::SERVICE_UNAVAILABLE, "Server shutting down").into_response()
            }
        }
    }
}
