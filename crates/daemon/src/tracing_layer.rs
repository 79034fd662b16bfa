//! Republishes `tracing` events as `DaemonEvent::LogLine` WebSocket
//! broadcasts, so `/events` subscribers see the same structured logs
//! `tracing-subscriber`'s `fmt` layer writes to stdout.

use std::sync::Arc;

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::events::DaemonEvent;
use crate::supervisor::FastpathSupervisor;

pub struct WebSocketLayer {
    supervisor: Arc<FastpathSupervisor>,
}

impl WebSocketLayer {
    pub fn new(supervisor: Arc<FastpathSupervisor>) -> Self {
        Self { supervisor }
    }
}

impl<S> Layer<S> for WebSocketLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = match *event.metadata().level() {
            Level::ERROR => "error",
            Level::WARN => "warn",
            Level::INFO => "info",
            Level::DEBUG => "debug",
            Level::TRACE => "debug",
        };

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        if let Some(msg) = visitor.message {
            self.supervisor.broadcast_event(DaemonEvent::LogLine {
                level: level.to_string(),
                msg,
                ts: chrono::Utc::now().timestamp_millis(),
                request_id: None,
            });
        }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        }
    }
}
