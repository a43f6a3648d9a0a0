//! Captures the log lines a reconciliation emits so they can be shown to an
//! operator.

use parking_lot::Mutex;
use std::{fmt, future::Future, sync::Arc};
use tracing::{
    field::{Field, Visit},
    instrument::WithSubscriber,
    Event, Subscriber,
};
use tracing_subscriber::{
    layer::{Context, SubscriberExt},
    Layer,
};

/// Runs `future`, recording the message of every event it emits.
///
/// The future runs under its own subscriber, so captured events are not
/// also written to the process log.
pub async fn capture<F: Future>(future: F) -> (F::Output, Vec<String>) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::registry().with(Capture(lines.clone()));
    let output = future.with_subscriber(subscriber).await;
    let lines = std::mem::take(&mut *lines.lock());
    (output, lines)
}

struct Capture(Arc<Mutex<Vec<String>>>);

#[derive(Default)]
struct Message(Option<String>);

// === impl Capture ===

impl<S: Subscriber> Layer<S> for Capture {
    fn on_event(&self, event: &Event<'_>, _: Context<'_, S>) {
        let mut message = Message::default();
        event.record(&mut message);
        if let Some(line) = message.0 {
            self.0.lock().push(line);
        }
    }
}

// === impl Message ===

impl Visit for Message {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.0 = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = Some(format!("{value:?}"));
        }
    }
}
