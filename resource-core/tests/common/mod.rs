//! Shared fixtures for resource-core integration tests
//!
//! Includes an in-memory tracing layer so tests can assert on the
//! diagnostics an operation emits.

#![allow(dead_code)]

use resource_core::{FixedClock, StorageConfig, StorageContext};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{Layer, Registry};

pub const FIXED_UNIX_TIME: i64 = 1_700_000_000;

/// Context writing real files under `dir` with a fixed clock
pub fn local_context(dir: &Path) -> StorageContext {
    StorageContext::from_config(StorageConfig::local_with_base_directory(dir))
        .unwrap()
        .with_clock(FixedClock::at_unix(FIXED_UNIX_TIME))
}

/// A captured log event
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    pub level: Level,
    pub message: Option<String>,
    pub fields: HashMap<String, String>,
}

struct FieldVisitor {
    fields: HashMap<String, String>,
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.fields
            .insert(field.name().to_string(), format!("{:?}", value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields
            .insert(field.name().to_string(), value.to_string());
    }
}

struct CaptureLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor {
            fields: HashMap::new(),
        };
        event.record(&mut visitor);

        let captured = CapturedEvent {
            level: *event.metadata().level(),
            message: visitor.fields.get("message").cloned(),
            fields: visitor.fields,
        };
        self.events
            .lock()
            .map(|mut events| events.push(captured))
            .ok();
    }
}

/// Events recorded while a closure ran
pub struct LogCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl LogCapture {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Events at INFO or more severe
    pub fn notable(&self) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.level <= Level::INFO)
            .collect()
    }
}

/// Run `f` with a capturing subscriber installed for the current thread
pub fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, LogCapture) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let subscriber = Registry::default().with(CaptureLayer {
        events: events.clone(),
    });

    let result = tracing::subscriber::with_default(subscriber, f);
    (result, LogCapture { events })
}
