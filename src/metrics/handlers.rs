use axum::{
    Json,
    extract::Extension,
    http::{StatusCode, header},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;

use super::collector::{MetricsCollector, MetricsSnapshot};

pub async fn handle_metrics(
    Extension(metrics): Extension<Arc<MetricsCollector>>,
) -> (StatusCode, [(header::HeaderName, &'static str); 1], String) {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics.render_prometheus(),
    )
}

pub async fn handle_metrics_snapshot(
    Extension(metrics): Extension<Arc<MetricsCollector>>,
) -> (StatusCode, Json<MetricsSnapshot>) {
    (StatusCode::OK, Json(metrics.snapshot()))
}

/// Server-sent events: the current snapshot, then one per completed query.
pub async fn handle_metrics_stream(
    Extension(metrics): Extension<Arc<MetricsCollector>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let current = metrics.snapshot();
    let receiver = metrics.subscribe();

    let initial = stream::once(async move { Ok::<_, Infallible>(snapshot_event(&current)) });
    let updates = stream::unfold(receiver, |mut receiver| async move {
        if receiver.changed().await.is_err() {
            return None;
        }
        let snapshot = receiver.borrow_and_update().clone();
        Some((Ok::<_, Infallible>(snapshot_event(&snapshot)), receiver))
    });

    Sse::new(initial.chain(updates)).keep_alive(KeepAlive::default())
}

fn snapshot_event(snapshot: &MetricsSnapshot) -> Event {
    Event::default()
        .event("metrics")
        .json_data(snapshot)
        .unwrap_or_else(|e| {
            tracing::error!("Failed to serialize metrics snapshot: {}", e);
            Event::default().comment("metrics unavailable")
        })
}
