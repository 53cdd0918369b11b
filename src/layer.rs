use crate::handler::PersonHandler;
use crate::record::LogRecord;
use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Events from this crate's own modules never reach the handler.
const SELF_TARGET: &str = "tracing_person_context";

/// `tracing_subscriber` layer that turns events into [`LogRecord`]s and
/// writes them through a [`PersonHandler`].
///
/// Only events at `min_level` or more severe are captured (`ERROR` by
/// default). A field holding a JSON object string, e.g.
/// `person = %json!({"id": 1})`, is carried as a structured value so it can
/// feed the person descriptor.
pub struct PersonContextLayer {
    handler: Arc<PersonHandler>,
    min_level: Level,
}

impl PersonContextLayer {
    pub fn new(handler: Arc<PersonHandler>) -> Self {
        PersonContextLayer {
            handler,
            min_level: Level::ERROR,
        }
    }

    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    pub fn handler(&self) -> &Arc<PersonHandler> {
        &self.handler
    }
}

impl<S> Layer<S> for PersonContextLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() > self.min_level || meta.target().starts_with(SELF_TARGET) {
            return;
        }

        let mut context = Map::new();
        let mut message: Option<String> = None;

        let mut visitor = FieldVisitor { fields: &mut context, message: &mut message };
        event.record(&mut visitor);

        let mut extra = Map::new();
        if let Some(module_path) = meta.module_path() {
            extra.insert("module_path".to_string(), Value::from(module_path));
        }
        if let Some(file) = meta.file() {
            extra.insert("file".to_string(), Value::from(file));
        }
        if let Some(line) = meta.line() {
            extra.insert("line".to_string(), Value::from(line));
        }

        let record = LogRecord {
            timestamp: Utc::now(),
            channel: meta.target().to_string(),
            level: meta.level().to_string(),
            message: message.unwrap_or_default(),
            context,
            extra,
            formatted: None,
        };

        self.handler.write(record);
    }
}

pub struct FieldVisitor<'a> {
    pub fields: &'a mut Map<String, Value>,
    pub message: &'a mut Option<String>,
}

impl<'a> FieldVisitor<'a> {
    fn insert_text(&mut self, field: &Field, text: String) {
        if field.name() == "message" {
            *self.message = Some(text);
            return;
        }
        let value = match serde_json::from_str::<Value>(&text) {
            Ok(object @ Value::Object(_)) => object,
            _ => Value::String(text),
        };
        self.fields.insert(field.name().to_string(), value);
    }
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert_text(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.insert_text(field, format!("{:?}", value));
    }
}
