//! Health server for Kubernetes probes and Prometheus metrics.
//!
//! - `/healthz`: liveness, 200 while the process serves requests
//! - `/readyz`: 200 once the clone controller stream is running
//! - `/metrics`: Prometheus text format

use crate::error::ControllerError;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::{
    exponential_buckets, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

/// Clone controller metrics
pub struct Metrics {
    reconciliations_total: IntCounterVec,
    phase_transitions_total: IntCounterVec,
    reconcile_duration_seconds: Histogram,
    registry: Registry,
}

impl Metrics {
    pub fn new() -> Result<Self, ControllerError> {
        let registry = Registry::new();

        let reconciliations_total = IntCounterVec::new(
            Opts::new("vm_clone_reconciliations_total", "Reconciliations by result"),
            &["result"],
        )?;
        registry.register(Box::new(reconciliations_total.clone()))?;

        let phase_transitions_total = IntCounterVec::new(
            Opts::new(
                "vm_clone_phase_transitions_total",
                "Clone phase transitions by destination phase",
            ),
            &["phase"],
        )?;
        registry.register(Box::new(phase_transitions_total.clone()))?;

        let reconcile_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "vm_clone_reconcile_duration_seconds",
                "Duration of a clone reconcile in seconds",
            )
            .buckets(exponential_buckets(0.005, 2.0, 12)?),
        )?;
        registry.register(Box::new(reconcile_duration_seconds.clone()))?;

        Ok(Self {
            reconciliations_total,
            phase_transitions_total,
            reconcile_duration_seconds,
            registry,
        })
    }

    /// Record one reconcile; `result` is `success` or `error`
    pub fn record_reconcile(&self, result: &str, duration_secs: f64) {
        self.reconciliations_total.with_label_values(&[result]).inc();
        self.reconcile_duration_seconds.observe(duration_secs);
    }

    pub fn record_transition(&self, phase: &str) {
        self.phase_transitions_total.with_label_values(&[phase]).inc();
    }

    /// Encode all metrics in Prometheus text format
    pub fn encode(&self) -> String {
        match TextEncoder::new().encode_to_string(&self.registry.gather()) {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to encode metrics: {}", e);
                "# Error encoding metrics\n".to_string()
            }
        }
    }
}

/// Shared state for the health server
pub struct HealthState {
    ready: AtomicBool,
    pub metrics: Arc<Metrics>,
}

impl HealthState {
    /// Starts out not ready
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            ready: AtomicBool::new(false),
            metrics,
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready() {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.encode(),
    )
}

pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Serves the health endpoints until the listener fails
pub async fn serve(addr: SocketAddr, state: Arc<HealthState>) -> Result<(), ControllerError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Health server listening on {}", addr);
    axum::serve(listener, create_router(state)).await?;
    Ok(())
}
