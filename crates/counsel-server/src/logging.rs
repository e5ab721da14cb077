use std::{collections::VecDeque, sync::Arc};

use tokio::sync::broadcast;

pub(crate) const RING_CAPACITY: usize = 500;

/// Mirrors every log event as a JSON line onto a broadcast channel and a
/// bounded ring buffer, for `/logs` and `/logs/stream`.
pub(crate) struct BroadcastLayer {
    pub tx: broadcast::Sender<String>,
    pub ring: Arc<std::sync::Mutex<VecDeque<String>>>,
}

struct MessageVisitor<'a> {
    message: &'a mut String,
    section: &'a mut Option<String>,
}

impl tracing::field::Visit for MessageVisitor<'_> {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        match field.name() {
            "message" => *self.message = value.to_string(),
            "section" => *self.section = Some(value.to_string()),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        let mut rendered = format!("{value:?}");
        // Strip surrounding quotes added by Debug on &str
        if rendered.len() >= 2 && rendered.starts_with('"') && rendered.ends_with('"') {
            rendered = rendered[1..rendered.len() - 1].to_string();
        }
        match field.name() {
            "message" => *self.message = rendered,
            "section" => *self.section = Some(rendered),
            _ => {}
        }
    }
}

/// Dashboard category for an event target.
pub(crate) fn category(target: &str) -> &'static str {
    if target.contains("observer") || target.contains("validator") {
        "quality"
    } else if target.contains("pipeline") || target.contains("client") {
        "pipeline"
    } else if target.contains("agent") {
        "agent"
    } else {
        "system"
    }
}

/// Section id recorded on a span, so events inside it can be tagged.
struct SpanSection(String);

impl<S> tracing_subscriber::Layer<S> for BroadcastLayer
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut message = String::new();
        let mut section = None;
        attrs.record(&mut MessageVisitor {
            message: &mut message,
            section: &mut section,
        });
        if let (Some(section), Some(span)) = (section, ctx.span(id)) {
            span.extensions_mut().insert(SpanSection(section));
        }
    }

    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let level = match *event.metadata().level() {
            tracing::Level::ERROR => "err",
            tracing::Level::WARN => "warn",
            tracing::Level::INFO => "info",
            tracing::Level::DEBUG => "debug",
            tracing::Level::TRACE => return,
        };

        let mut message = String::new();
        let mut section = None;
        event.record(&mut MessageVisitor {
            message: &mut message,
            section: &mut section,
        });

        if section.is_none() {
            section = ctx.event_scope(event).and_then(|scope| {
                scope.from_root().fold(None, |found, span| {
                    span.extensions().get::<SpanSection>().map(|s| s.0.clone()).or(found)
                })
            });
        }

        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let mut line = serde_json::json!({
            "ts": ts,
            "level": level,
            "message": message,
            "category": category(event.metadata().target()),
        });
        if let Some(section) = section {
            line["section"] = serde_json::Value::String(section);
        }
        let json = line.to_string();

        let _ = self.tx.send(json.clone());
        if let Ok(mut ring) = self.ring.lock() {
            ring.push_back(json);
            if ring.len() > RING_CAPACITY {
                ring.pop_front();
            }
        }
    }
}
