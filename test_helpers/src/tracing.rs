//! Capture of `tracing` events for assertions in tests
use std::{fmt, sync::Arc};

use ::tracing::{
    self, Event, Level, Metadata,
    field::{Field, Visit},
    span::{Attributes, Id, Record},
    subscriber::{DefaultGuard, Subscriber},
};
use parking_lot::Mutex;

/// One recorded event: its level, target and fields in the order they were
/// recorded. The format string of the event is the `message` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedEvent {
    pub level: Level,
    pub target: String,
    pub fields: Vec<(&'static str, String)>,
}

impl CapturedEvent {
    /// The value of field `name`. `&str` values are kept as-is, everything
    /// else is rendered with `Debug` (which is `Display` for `%` fields).
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn message(&self) -> Option<&str> {
        self.field("message")
    }
}

impl fmt::Display for CapturedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "level = {}; ", self.level)?;
        for (name, value) in &self.fields {
            write!(f, "{name} = {value}; ")?;
        }
        Ok(())
    }
}

/// Records every `tracing` event emitted on the current thread while it is
/// alive.
///
/// Upon creation it registers itself as the default subscriber for the
/// current thread, and upon drop the previous default is restored.
#[derive(Debug)]
pub struct TracingCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
    #[allow(dead_code)]
    guard: DefaultGuard,
}

impl TracingCapture {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));

        let subscriber = CaptureSubscriber {
            events: Arc::clone(&events),
        };
        // uninstalled when the guard is dropped
        let guard = tracing::subscriber::set_default(subscriber);

        Self { events, guard }
    }

    /// All events captured so far, oldest first.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().clone()
    }

    /// Captured events at exactly `level`.
    pub fn events_at(&self, level: Level) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.level == level)
            .cloned()
            .collect()
    }
}

impl fmt::Display for TracingCapture {
    /// One line per captured event
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let events = self.events.lock();
        let lines: Vec<_> = events.iter().map(ToString::to_string).collect();
        write!(f, "{}", lines.join("\n"))
    }
}

struct CaptureSubscriber {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl Subscriber for CaptureSubscriber {
    fn new_span(&self, _span: &Attributes<'_>) -> Id {
        Id::from_u64(1)
    }

    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn record(&self, _span: &Id, _values: &Record<'_>) {}

    fn record_follows_from(&self, _span: &Id, _follows: &Id) {}

    fn event(&self, event: &Event<'_>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let metadata = event.metadata();
        self.events.lock().push(CapturedEvent {
            level: *metadata.level(),
            target: metadata.target().to_string(),
            fields: visitor.fields,
        });
    }

    fn enter(&self, _span: &Id) {}
    fn exit(&self, _span: &Id) {}
}

#[derive(Default)]
struct FieldVisitor {
    fields: Vec<(&'static str, String)>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.push((field.name(), value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.fields.push((field.name(), format!("{value:?}")));
    }
}
