//! Metric instruments.
//!
//! Built on demand from the global `"fizzq"` meter; without an installed
//! `MeterProvider` they are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("fizzq")
}

/// Counter: submissions. Labels: `result` ("ok" | "error").
pub fn work_dispatched() -> Counter<u64> {
    meter()
        .u64_counter("fizzq.work.dispatched")
        .with_description("Number of work items submitted")
        .build()
}

/// Counter: work items whose result and status were written.
pub fn work_processed() -> Counter<u64> {
    meter()
        .u64_counter("fizzq.work.processed")
        .with_description("Number of work items processed")
        .build()
}

/// Counter: transient consume errors absorbed by the worker loop.
pub fn consume_errors() -> Counter<u64> {
    meter()
        .u64_counter("fizzq.consume.errors")
        .with_description("Transient consume errors")
        .build()
}

/// Counter: rebalance notices handled. Labels: `kind` ("assigned" | "revoked" | "lost").
pub fn partitions_rebalanced() -> Counter<u64> {
    meter()
        .u64_counter("fizzq.partitions.rebalanced")
        .with_description("Partition rebalance notices handled by workers")
        .build()
}

/// Counter: status polls. Labels: `status`.
pub fn status_reads() -> Counter<u64> {
    meter()
        .u64_counter("fizzq.status.reads")
        .with_description("Status reads by resulting status")
        .build()
}

/// Histogram: operation duration in milliseconds. Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("fizzq.operation.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
