//! Shared SSE plumbing (spec §6 "SSE wire format"): `event: <name>\ndata:
//! <json>\n\n`, terminal `final`, never an HTTP error code mid-stream.
//!
//! Grounded on the teacher's `run_agent_task` (`serve/src/run/stream.rs` in
//! the original): a spawned task drives the long-running work and forwards
//! step events into an `mpsc` channel that the handler turns into the wire
//! protocol; here the step source is [`gasable_core::retriever::StepReporter`]
//! rather than a `LangGraph`-style event enum.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use gasable_core::retriever::ChannelReporter;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt as _;

const STEP_QUEUE_CAPACITY: usize = 128;

/// Runs `work` to completion in a spawned task, streaming every
/// [`StepReporter::emit`] call it makes as its own SSE event, then emits a
/// single terminal `final` event carrying whatever JSON `work` returns
/// (success body or `{error}` body alike — the wire format doesn't
/// distinguish them via status code).
pub fn sse_response<F, Fut>(work: F) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    F: FnOnce(Arc<ChannelReporter>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Value> + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<Value>(STEP_QUEUE_CAPACITY);
    let reporter_tx = tx.clone();
    let reporter = Arc::new(ChannelReporter::new(Arc::new(move |envelope: Value| {
        reporter_tx.try_send(envelope).is_ok()
    })));

    tokio::spawn(async move {
        let final_body = work(reporter).await;
        let _ = tx.send(json!({ "step": "final", "data": final_body })).await;
    });

    let stream = ReceiverStream::new(rx).map(|envelope| {
        let step = envelope.get("step").and_then(Value::as_str).unwrap_or("step").to_string();
        let data = envelope.get("data").cloned().unwrap_or(Value::Null);
        let event = Event::default().event(step).json_data(data).unwrap_or_else(|_| {
            Event::default().event("final").data(r#"{"error":"event serialization failed"}"#)
        });
        Ok(event)
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
