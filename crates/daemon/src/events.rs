//! Events broadcast to `/events` WebSocket subscribers: one per image
//! mutation, one per IPC transition, plus structured log lines.

use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonEvent {
    /// A mutating image operation completed (or failed).
    ImageMutated {
        op: String,
        path: String,
        ok: bool,
        ts: i64,
    },
    /// A FORK/EXEC/EXIT/WAIT request was serviced on a worker's slot.
    IpcTransition {
        worker_id: u32,
        opcode: String,
        result: i64,
        ts: i64,
    },
    /// A structured log line, republished from the tracing subscriber.
    LogLine {
        level: String,
        msg: String,
        ts: i64,
        request_id: Option<String>,
    },
}
