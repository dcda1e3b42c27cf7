//! Live SSE stream — `GET /v1/runs/:id/stream?lastSeq=N`.
//!
//! Subscribe-then-replay: the broadcast receiver is opened before the log
//! is read, so no append can fall between replay and tail; overlap is
//! deduplicated by `seq`. One frame per activity, flushed as emitted; a
//! heartbeat frame goes out after 15 seconds of silence; a subscriber
//! that lags past its bounded buffer gets one `stream.degraded` frame and
//! is closed (the log remains the source of truth — reconnect with
//! `lastSeq`). The connection closes after the terminal activity.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::stream::Stream;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;
use uuid::Uuid;

use ds_domain::activity::Activity;
use ds_engine::store::RunStore;

use super::runs::{activity_frame, owned_run};
use crate::auth::Caller;
use crate::state::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(default, alias = "lastSeq")]
    pub last_seq: Option<u64>,
}

pub async fn stream_run(
    State(state): State<AppState>,
    caller: Caller,
    Path(run_id): Path<Uuid>,
    Query(q): Query<StreamQuery>,
) -> Response {
    if let Err(resp) = owned_run(&state, &caller, run_id) {
        return resp;
    }

    let store = state.engine.store.clone();
    // Subscribe before reading the replay window.
    let rx = store.subscribe(run_id);
    let stream = activity_stream(store, run_id, q.last_seq.unwrap_or(0), rx);

    Sse::new(stream).into_response()
}

fn activity_stream(
    store: Arc<RunStore>,
    run_id: Uuid,
    from_seq: u64,
    mut rx: broadcast::Receiver<Activity>,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        let mut last_sent = from_seq;

        // Replay everything already in the log.
        for activity in store.list_activities_since(run_id, from_seq, usize::MAX) {
            last_sent = activity.seq;
            let terminal = activity.kind.is_terminal();
            yield Ok(frame(&activity));
            if terminal {
                return;
            }
        }

        // Tail live appends, heartbeating through silence.
        loop {
            match tokio::time::timeout(HEARTBEAT_INTERVAL, rx.recv()).await {
                Err(_) => {
                    yield Ok(heartbeat(last_sent));
                }
                Ok(Ok(activity)) => {
                    if activity.seq <= last_sent {
                        continue; // already sent during replay
                    }
                    last_sent = activity.seq;
                    let terminal = activity.kind.is_terminal();
                    yield Ok(frame(&activity));
                    if terminal {
                        return;
                    }
                }
                Ok(Err(broadcast::error::RecvError::Lagged(missed))) => {
                    tracing::warn!(run_id = %run_id, missed, "dropping slow stream subscriber");
                    yield Ok(degraded(last_sent, missed));
                    return;
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    // Channel cleaned up after terminal; drain the rest
                    // from the log so the terminal frame is never lost.
                    for activity in store.list_activities_since(run_id, last_sent, usize::MAX) {
                        last_sent = activity.seq;
                        let terminal = activity.kind.is_terminal();
                        yield Ok(frame(&activity));
                        if terminal {
                            return;
                        }
                    }
                    return;
                }
            }
        }
    }
}

fn frame(activity: &Activity) -> Event {
    Event::default()
        .event(activity.kind.as_str())
        .data(activity_frame(activity).to_string())
}

fn heartbeat(last_seq: u64) -> Event {
    Event::default().event("heartbeat").data(
        json!({
            "seq": last_seq,
            "kind": "heartbeat",
            "data": { "serverTime": chrono::Utc::now() },
            "timestamp": chrono::Utc::now(),
        })
        .to_string(),
    )
}

fn degraded(last_seq: u64, missed: u64) -> Event {
    Event::default().event("stream.degraded").data(
        json!({
            "seq": last_seq,
            "kind": "stream.degraded",
            "data": { "missed": missed, "resumeWith": last_seq },
            "timestamp": chrono::Utc::now(),
        })
        .to_string(),
    )
}
