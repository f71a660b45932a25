//! Prometheus metrics for conversation flows.
//!
//! Exposes:
//! - `weather_jester_flow_duration_seconds` (histogram per flow)
//! - `weather_jester_flow_outcomes_total` (counter per flow and outcome)
//! - `weather_jester_flow_inflight` (gauge per flow)
//! - `weather_jester_pending_prompts` (gauge of chats awaiting a location)
//! - process metrics via `process` collector

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Instant;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use once_cell::sync::Lazy;
use prometheus::process_collector::ProcessCollector;
use prometheus::{
    default_registry, register_histogram_vec, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Encoder, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec,
    TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// How a conversation flow ended, as seen by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowOutcome {
    /// The intended reply was delivered.
    Ok,
    /// The geocoder had no usable match for the query.
    LocationNotFound,
    /// The weather provider failed or returned nothing usable.
    ForecastUnavailable,
    /// The command was missing its argument; a usage hint was sent.
    Usage,
    /// A reply could not be delivered.
    TransportError,
}

impl FlowOutcome {
    pub fn label(self) -> &'static str {
        match self {
            FlowOutcome::Ok => "ok",
            FlowOutcome::LocationNotFound => "location_not_found",
            FlowOutcome::ForecastUnavailable => "forecast_unavailable",
            FlowOutcome::Usage => "usage",
            FlowOutcome::TransportError => "transport_error",
        }
    }
}

static PROCESS_COLLECTOR: Lazy<()> = Lazy::new(|| {
    if let Err(err) = default_registry().register(Box::new(ProcessCollector::for_self())) {
        warn!("Failed to register process collector: {}", err);
    }
});

static FLOW_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    // 10ms .. ~80s; the weather flow waits on two HTTP providers.
    let buckets =
        prometheus::exponential_buckets(0.01, 2.0, 14).expect("failed to create histogram buckets");
    register_histogram_vec!(
        "weather_jester_flow_duration_seconds",
        "Time from inbound message to last reply, per flow",
        &["flow"],
        buckets
    )
    .expect("failed to register flow duration histogram")
});

static FLOW_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "weather_jester_flow_outcomes_total",
        "Handled messages by flow and outcome",
        &["flow", "outcome"]
    )
    .expect("failed to register flow outcome counter")
});

static FLOW_INFLIGHT: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "weather_jester_flow_inflight",
        "Messages currently being handled, per flow",
        &["flow"]
    )
    .expect("failed to register inflight gauge")
});

static PENDING_PROMPTS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "weather_jester_pending_prompts",
        "Conversations waiting for a location reply"
    )
    .expect("failed to register pending prompts gauge")
});

fn init_collectors() {
    Lazy::force(&PROCESS_COLLECTOR);
    Lazy::force(&FLOW_DURATION);
    Lazy::force(&FLOW_OUTCOMES);
    Lazy::force(&FLOW_INFLIGHT);
    Lazy::force(&PENDING_PROMPTS);
}

/// Tracks one flow from start to outcome.
///
/// Dropping the timer without [`FlowTimer::finish`] still releases the
/// in-flight slot but records no outcome.
#[must_use = "call finish() to record the outcome"]
pub struct FlowTimer {
    flow: &'static str,
    started: Instant,
    finished: bool,
}

impl FlowTimer {
    pub fn start(flow: &'static str) -> Self {
        init_collectors();
        FLOW_INFLIGHT.with_label_values(&[flow]).inc();
        Self {
            flow,
            started: Instant::now(),
            finished: false,
        }
    }

    pub fn finish(mut self, outcome: FlowOutcome) {
        self.finished = true;
        FLOW_INFLIGHT.with_label_values(&[self.flow]).dec();
        FLOW_DURATION
            .with_label_values(&[self.flow])
            .observe(self.started.elapsed().as_secs_f64());
        FLOW_OUTCOMES
            .with_label_values(&[self.flow, outcome.label()])
            .inc();
    }
}

impl Drop for FlowTimer {
    fn drop(&mut self) {
        if !self.finished {
            FLOW_INFLIGHT.with_label_values(&[self.flow]).dec();
        }
    }
}

/// Publish the number of live location prompts.
pub fn set_pending_prompts(count: usize) {
    init_collectors();
    PENDING_PROMPTS.set(i64::try_from(count).unwrap_or(i64::MAX));
}

fn response(status: StatusCode, body: Full<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}

fn render() -> Response<Full<Bytes>> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", err);
        return response(StatusCode::INTERNAL_SERVER_ERROR, Full::from("encode error"));
    }

    let mut ok = response(StatusCode::OK, Full::from(buffer));
    if let Ok(content_type) = HeaderValue::from_str(encoder.format_type()) {
        ok.headers_mut().insert(CONTENT_TYPE, content_type);
    }
    ok
}

/// Only `GET /metrics` is served.
fn route_status(method: &Method, path: &str) -> StatusCode {
    match (method, path) {
        (&Method::GET, "/metrics") => StatusCode::OK,
        (_, "/metrics") => StatusCode::METHOD_NOT_ALLOWED,
        _ => StatusCode::NOT_FOUND,
    }
}

async fn handle_request(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    Ok(match route_status(req.method(), req.uri().path()) {
        StatusCode::OK => render(),
        status => response(status, Full::new(Bytes::new())),
    })
}

async fn serve(listener: TcpListener) -> anyhow::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            if let Err(err) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_request))
                .await
            {
                warn!(?peer, "Metrics connection error: {}", err);
            }
        });
    }
}

/// Spawn the metrics HTTP endpoint on the given address.
pub fn spawn_metrics_server(addr: SocketAddr) {
    init_collectors();
    tokio::spawn(async move {
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(err) => {
                error!(%addr, "Failed to bind metrics endpoint: {}", err);
                return;
            }
        };
        info!(%addr, "Prometheus metrics endpoint started");
        if let Err(err) = serve(listener).await {
            error!(%addr, "Metrics server failed: {}", err);
        }
    });
}
