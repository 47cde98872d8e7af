//! Prometheus metrics for the inspection line.
//!
//! This module provides counters for classified items, gauges for the
//! conveyor drive, and the HTTP endpoint that exposes them.

use inspect_core::{tags, ConveyorStatus, QualityVerdict, RampStep};
use prometheus::{Encoder, Gauge, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::sync::LazyLock;
use std::thread;
use tiny_http::{Response, Server};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Inspection Metrics
// ============================================================================

/// Measurement records that produced a verdict
pub static RECORDS_PROCESSED: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        tags::RECORDS_PROCESSED.metric,
        "Measurement records classified",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

pub static ITEMS_PASSED: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(tags::ITEMS_PASSED.metric, "Items that passed inspection").unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

pub static ITEMS_FAILED: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(tags::ITEMS_FAILED.metric, "Items rejected by inspection").unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Malformed measurement lines skipped
pub static PARSE_ERRORS: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        tags::PARSE_ERRORS.metric,
        "Malformed measurement lines skipped",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Defect score distribution
pub static DEFECT_SCORE: LazyLock<Histogram> = LazyLock::new(|| {
    let histogram = Histogram::with_opts(
        HistogramOpts::new(tags::DEFECT_SCORE.metric, "Defect score distribution").buckets(vec![
            -1_000_000.0,
            -10_000.0,
            -100.0,
            0.0,
            100.0,
            10_000.0,
            1_000_000.0,
            100_000_000.0,
        ]),
    )
    .unwrap();
    REGISTRY.register(Box::new(histogram.clone())).unwrap();
    histogram
});

pub static LAST_SCORE: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(tags::LAST_SCORE.metric, "Score of the most recent item").unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Conveyor Metrics
// ============================================================================

pub static RAMPS_RUN: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(tags::RAMPS_RUN.metric, "Conveyor soft-start ramps run").unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Last commanded PWM duty cycle
pub static DUTY_CYCLE_PCT: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        tags::DUTY_CYCLE_PCT.metric,
        "Last commanded conveyor duty cycle in percent",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Motor current sampled after the last completed ramp
pub static MOTOR_CURRENT: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        tags::MOTOR_CURRENT.metric,
        "Conveyor motor current sampled after soft start",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

pub fn record_verdict(verdict: &QualityVerdict) {
    RECORDS_PROCESSED.inc();
    if verdict.passed {
        ITEMS_PASSED.inc();
    } else {
        ITEMS_FAILED.inc();
    }
    DEFECT_SCORE.observe(verdict.score as f64);
    LAST_SCORE.set(verdict.score as f64);
}

pub fn record_parse_error() {
    PARSE_ERRORS.inc();
}

pub fn record_ramp_step(step: &RampStep) {
    DUTY_CYCLE_PCT.set(step.duty_cycle_pct);
}

pub fn record_conveyor(status: &ConveyorStatus) {
    RAMPS_RUN.inc();
    if status.ramp.completed() {
        DUTY_CYCLE_PCT.set(100.0);
    }
    if let Some(current) = status.motor_current {
        MOTOR_CURRENT.set(current);
    }
}

// ============================================================================
// Metrics HTTP Server
// ============================================================================

/// Encode the registry in the Prometheus text format.
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Start the metrics HTTP server on the given address.
/// Returns a join handle for the server thread.
pub fn serve_metrics(bind_addr: String) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let server = match Server::http(&bind_addr) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to start metrics server on {}: {}", bind_addr, e);
                return;
            }
        };

        tracing::info!("Metrics server listening on http://{}/metrics", bind_addr);

        for request in server.incoming_requests() {
            match request.url() {
                "/metrics" => {
                    let body = match render_metrics() {
                        Ok(body) => body,
                        Err(e) => {
                            tracing::warn!("Failed to encode metrics: {}", e);
                            let _ = request.respond(
                                Response::from_string("Internal Server Error")
                                    .with_status_code(500),
                            );
                            continue;
                        }
                    };

                    let mut response = Response::from_string(body);
                    if let Ok(header) = tiny_http::Header::from_bytes(
                        &b"Content-Type"[..],
                        &b"text/plain; version=0.0.4"[..],
                    ) {
                        response = response.with_header(header);
                    }
                    let _ = request.respond(response);
                }
                "/health" => {
                    let _ = request.respond(Response::from_string("OK"));
                }
                "/ready" => {
                    // Ready once the line has classified an item
                    if RECORDS_PROCESSED.get() > 0 {
                        let _ = request.respond(Response::from_string("Ready"));
                    } else {
                        let _ = request
                            .respond(Response::from_string("Not Ready").with_status_code(503));
                    }
                }
                _ => {
                    let _ =
                        request.respond(Response::from_string("Not Found").with_status_code(404));
                }
            }
        }
    })
}

/// Initialize all metrics (forces lazy initialization)
pub fn init_metrics() {
    let _ = RECORDS_PROCESSED.get();
    let _ = ITEMS_PASSED.get();
    let _ = ITEMS_FAILED.get();
    let _ = PARSE_ERRORS.get();
    let _ = DEFECT_SCORE.get_sample_count();
    let _ = LAST_SCORE.get();
    let _ = RAMPS_RUN.get();
    let _ = DUTY_CYCLE_PCT.get();
    let _ = MOTOR_CURRENT.get();
}
