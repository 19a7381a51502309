#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::pending;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    routing::post,
    Router,
};
use event_relay::{router, serve, AppState, Collector, DeliveryClient, Dispatcher, DispatcherConfig};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

/// A request as seen by the mock collector.
#[derive(Debug, Clone)]
pub struct Received {
    pub content_type: Option<String>,
    pub body: serde_json::Value,
}

struct CollectorState {
    hits: AtomicUsize,
    received: Mutex<Vec<Received>>,
    scripted: Mutex<VecDeque<u16>>,
    default_status: u16,
    delay: Duration,
    gate: Option<Arc<Semaphore>>,
}

/// In-process stand-in for the downstream collector.
pub struct MockCollector {
    pub url: String,
    state: Arc<CollectorState>,
    gate: Option<Arc<Semaphore>>,
}

pub struct MockCollectorBuilder {
    default_status: u16,
    scripted: Vec<u16>,
    delay: Duration,
    gated: bool,
}

impl MockCollectorBuilder {
    /// Status returned once the scripted responses are used up.
    pub fn status(mut self, status: u16) -> Self {
        self.default_status = status;
        self
    }

    /// Statuses returned for the first requests, in order.
    pub fn script(mut self, statuses: &[u16]) -> Self {
        self.scripted = statuses.to_vec();
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Hold every request until [`MockCollector::open_gate`] is called.
    pub fn gated(mut self) -> Self {
        self.gated = true;
        self
    }

    pub async fn start(self) -> MockCollector {
        let gate = self.gated.then(|| Arc::new(Semaphore::new(0)));
        let state = Arc::new(CollectorState {
            hits: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
            scripted: Mutex::new(self.scripted.into()),
            default_status: self.default_status,
            delay: self.delay,
            gate: gate.clone(),
        });

        let app = Router::new()
            .route("/collect", post(collect))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        MockCollector {
            url: format!("http://{addr}/collect"),
            state,
            gate,
        }
    }
}

impl MockCollector {
    pub fn builder() -> MockCollectorBuilder {
        MockCollectorBuilder {
            default_status: 200,
            scripted: Vec::new(),
            delay: Duration::ZERO,
            gated: false,
        }
    }

    pub async fn start() -> Self {
        Self::builder().start().await
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<Received> {
        self.state.received.lock().unwrap().clone()
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub fn collector(&self) -> Collector {
        Collector::new(self.url.clone())
    }
}

async fn collect(
    State(state): State<Arc<CollectorState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    state.hits.fetch_add(1, Ordering::SeqCst);
    state.received.lock().unwrap().push(Received {
        content_type: headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
        body: serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null),
    });

    if let Some(gate) = &state.gate {
        let _permit = gate.acquire().await.unwrap();
    }
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }

    let status = state
        .scripted
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or(state.default_status);
    StatusCode::from_u16(status).unwrap()
}

/// Dispatcher config with fast retries for tests.
pub fn test_dispatcher_config(worker_count: usize, queue_capacity: usize) -> DispatcherConfig {
    DispatcherConfig {
        worker_count,
        queue_capacity,
        retry_base_ms: 10,
        retry_max_ms: 20,
        retry_jitter_ms: 0,
        dlq_capacity: 100,
    }
}

pub fn start_dispatcher(collector: Collector, config: DispatcherConfig) -> Arc<Dispatcher> {
    let client = DeliveryClient::new(collector).unwrap();
    Arc::new(Dispatcher::new(config, client))
}

/// A running relay ingress bound to an ephemeral port.
pub struct RelayHandle {
    pub url: String,
    pub dispatcher: Arc<Dispatcher>,
}

pub async fn start_relay(collector: Collector, config: DispatcherConfig) -> RelayHandle {
    start_relay_with_limit(collector, config, event_relay::DEFAULT_MAX_BODY_BYTES).await
}

pub async fn start_relay_with_limit(
    collector: Collector,
    config: DispatcherConfig,
    max_body_bytes: usize,
) -> RelayHandle {
    let dispatcher = start_dispatcher(collector, config);
    let app = router(AppState::new(dispatcher.clone()), max_body_bytes);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        serve(listener, app, pending()).await.unwrap();
    });

    RelayHandle {
        url: format!("http://{addr}/"),
        dispatcher,
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
