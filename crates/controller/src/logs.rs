//! Per-worker log routing
//!
//! Routes events produced inside a worker's `sut`-tagged span to that
//! worker's own channel, so an external presentation layer can consume
//! each SUT's output without cross-talk. Routing is keyed by an explicit
//! span field rather than the producing thread's identity, which also
//! captures library code logging through the shared tracing path while a
//! worker is running.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::span;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// A formatted log line delivered to one worker's channel
#[derive(Debug, Clone)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub target: String,
    pub message: String,
}

struct Sink {
    id: u64,
    tx: mpsc::UnboundedSender<LogLine>,
}

/// Registry of per-SUT log channels plus the tracing layer that feeds them
#[derive(Clone)]
pub struct LogRouter {
    sinks: Arc<RwLock<HashMap<String, Sink>>>,
    next_id: Arc<AtomicU64>,
}

impl LogRouter {
    pub fn new() -> Self {
        Self {
            sinks: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Register a channel for `name`, replacing any stale registration
    /// under the same name.
    pub fn subscribe(&self, name: &str) -> LogSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sinks.write().insert(name.to_string(), Sink { id, tx });
        LogSubscription {
            name: name.to_string(),
            id,
            rx,
            router: self.clone(),
        }
    }

    /// The tracing layer to install next to the normal fmt layer
    pub fn layer(&self) -> LogRouterLayer {
        LogRouterLayer {
            router: self.clone(),
        }
    }

    fn unregister(&self, name: &str, id: u64) {
        let mut sinks = self.sinks.write();
        // A replacement under the same name must survive the old guard
        if sinks.get(name).map_or(false, |s| s.id == id) {
            sinks.remove(name);
        }
    }

    fn deliver(&self, name: &str, line: LogLine) {
        if let Some(sink) = self.sinks.read().get(name) {
            let _ = sink.tx.send(line);
        }
    }

    #[cfg(test)]
    fn is_registered(&self, name: &str) -> bool {
        self.sinks.read().contains_key(name)
    }
}

impl Default for LogRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end of one worker's log channel. Dropping it deregisters the
/// sink, so repeated start/stop cycles never leak registrations no matter
/// how the consumer exits.
pub struct LogSubscription {
    name: String,
    id: u64,
    rx: mpsc::UnboundedReceiver<LogLine>,
    router: LogRouter,
}

impl LogSubscription {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn recv(&mut self) -> Option<LogLine> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<LogLine> {
        self.rx.try_recv().ok()
    }
}

impl Drop for LogSubscription {
    fn drop(&mut self) {
        self.router.unregister(&self.name, self.id);
    }
}

/// Marker stored in span extensions for spans carrying a `sut` field
struct SutTag(String);

#[derive(Default)]
struct SutVisitor {
    sut: Option<String>,
}

impl Visit for SutVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "sut" {
            self.sut = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "sut" {
            self.sut = Some(format!("{:?}", value).trim_matches('"').to_string());
        }
    }
}

/// Visitor that extracts the message field from a tracing event
struct MessageVisitor {
    message: String,
}

impl MessageVisitor {
    fn new() -> Self {
        Self {
            message: String::new(),
        }
    }
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            write!(&mut self.message, "{:?}", value).ok();
        } else if self.message.is_empty() {
            // Fallback: use the first field as message
            write!(&mut self.message, "{:?}", value).ok();
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else if self.message.is_empty() {
            self.message = value.to_string();
        }
    }
}

/// Tracing layer that forwards events from `sut`-tagged spans to the
/// matching channel. Events outside any tagged span are left alone.
pub struct LogRouterLayer {
    router: LogRouter,
}

impl<S> Layer<S> for LogRouterLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let mut visitor = SutVisitor::default();
        attrs.record(&mut visitor);
        if let Some(sut) = visitor.sut {
            if let Some(span) = ctx.span(id) {
                span.extensions_mut().insert(SutTag(sut));
            }
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(scope) = ctx.event_scope(event) else {
            return;
        };

        // Innermost tagged span wins
        let mut sut = None;
        for span in scope.from_root() {
            if let Some(tag) = span.extensions().get::<SutTag>() {
                sut = Some(tag.0.clone());
            }
        }
        let Some(sut) = sut else {
            return;
        };

        let mut visitor = MessageVisitor::new();
        event.record(&mut visitor);

        self.router.deliver(
            &sut,
            LogLine {
                timestamp: Utc::now(),
                level: *event.metadata().level(),
                target: event.metadata().target().to_string(),
                message: visitor.message,
            },
        );
    }
}
