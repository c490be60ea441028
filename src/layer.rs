use crate::level::Level;
use crate::logger::Logger;
use crate::value::FieldValue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// `tracing_subscriber` layer that feeds `tracing` events into a
/// [`Logger`].
///
/// The event's `message` becomes the record message, its target is
/// recorded as a `target` field, and every other field follows in the
/// order `tracing` visits them. Events from this crate's own diagnostics
/// are skipped so the writer never logs into itself.
///
/// The layer keeps its logger alive; call [`Logger::close`] explicitly
/// before exit when the layer is installed globally.
pub struct RapidlogLayer {
    logger: Logger,
    /// Events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Events handed to the logger.
    pub forwarded_events: Arc<AtomicU64>,
}

impl RapidlogLayer {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            total_events: Arc::new(AtomicU64::new(0)),
            forwarded_events: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }
}

/// `TRACE` has no counterpart and is folded into `Debug`.
pub fn map_level(level: &tracing::Level) -> Level {
    match *level {
        tracing::Level::TRACE | tracing::Level::DEBUG => Level::Debug,
        tracing::Level::INFO => Level::Info,
        tracing::Level::WARN => Level::Warning,
        tracing::Level::ERROR => Level::Error,
    }
}

fn is_own_target(target: &str) -> bool {
    target == "rapidlog" || target.starts_with("rapidlog::")
}

impl<S> Layer<S> for RapidlogLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        let meta = event.metadata();
        if is_own_target(meta.target()) {
            return;
        }
        let level = map_level(meta.level());
        if !self.logger.is_enabled_for(level) {
            return;
        }

        let mut fields = vec![("target".to_string(), FieldValue::from(meta.target()))];
        let mut message: Option<String> = None;
        let mut visitor = FieldVisitor {
            fields: &mut fields,
            message: &mut message,
        };
        event.record(&mut visitor);

        self.logger.log(level, message.unwrap_or_default(), fields);
        self.forwarded_events.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct FieldVisitor<'a> {
    pub fields: &'a mut Vec<(String, FieldValue)>,
    pub message: &'a mut Option<String>,
}

impl<'a> FieldVisitor<'a> {
    fn push(&mut self, field: &Field, value: FieldValue) {
        self.fields.push((field.name().to_string(), value));
    }
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.push(field, FieldValue::from(value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, FieldValue::Int(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, FieldValue::UInt(value));
    }

    fn record_i128(&mut self, field: &Field, value: i128) {
        let value = i64::try_from(value).map_or_else(|_| FieldValue::Str(value.to_string()), FieldValue::Int);
        self.push(field, value);
    }

    fn record_u128(&mut self, field: &Field, value: u128) {
        let value = u64::try_from(value).map_or_else(|_| FieldValue::Str(value.to_string()), FieldValue::UInt);
        self.push(field, value);
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, FieldValue::Float(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, FieldValue::Bool(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.push(field, FieldValue::Str(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.push(field, FieldValue::Str(format!("{:?}", value)));
        }
    }
}
