//! Spans for work flowing through the worker.

use crate::model::{Status, WorkId};
use tracing::Span;

/// Span covering one record from decode to offset store.
///
/// `work.status` starts empty and is filled by [`record_status_transition`].
pub fn start_process_span(work_id: &WorkId, partition: i32, offset: i64) -> Span {
    tracing::info_span!(
        "work.process",
        "work.id" = %work_id,
        "work.partition" = partition,
        "work.offset" = offset,
        "work.status" = tracing::field::Empty,
    )
}

/// Record a status change on `span` and emit it as an event inside it.
pub fn record_status_transition(span: &Span, from: Status, to: Status) {
    span.record("work.status", tracing::field::display(to));
    span.in_scope(|| {
        tracing::info!(from = %from, to = %to, "status_transition");
    });
}
