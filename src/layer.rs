//! `tracing` interception: forwards events from the host process into a shipper

use crate::entry::{Context, LogLevel, LogSource};
use crate::shipper::LogShipper;
use serde_json::Value;
use std::fmt;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context as LayerContext, Layer};

/// Targets whose events would loop back through the shipper's own push path.
const DEFAULT_IGNORED_TARGETS: &[&str] = &[
    env!("CARGO_CRATE_NAME"),
    "hyper",
    "hyper_util",
    "reqwest",
    "h2",
    "rustls",
];

/// Layer turning every `tracing` event into an `engine` log entry.
pub struct ShipperLayer {
    shipper: LogShipper,
    ignored_targets: Vec<String>,
}

impl ShipperLayer {
    pub fn new(shipper: LogShipper) -> Self {
        Self {
            shipper,
            ignored_targets: DEFAULT_IGNORED_TARGETS
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }

    /// Also drop events from `target` and its submodules
    pub fn ignore_target(mut self, target: impl Into<String>) -> Self {
        self.ignored_targets.push(target.into());
        self
    }

    fn is_ignored(&self, target: &str) -> bool {
        self.ignored_targets.iter().any(|ignored| {
            target
                .strip_prefix(ignored.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
        })
    }
}

fn to_log_level(level: Level) -> LogLevel {
    match level {
        Level::ERROR => LogLevel::Error,
        Level::WARN => LogLevel::Warn,
        Level::INFO => LogLevel::Info,
        _ => LogLevel::Debug,
    }
}

impl<S: Subscriber> Layer<S> for ShipperLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: LayerContext<'_, S>) {
        let metadata = event.metadata();
        if self.is_ignored(metadata.target()) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut context = visitor.context;
        context.insert("target".to_string(), Value::from(metadata.target()));
        if let Some(file) = metadata.file() {
            context.insert("file".to_string(), Value::from(file));
        }
        if let Some(line) = metadata.line() {
            context.insert("line".to_string(), Value::from(line));
        }

        self.shipper.log(
            to_log_level(*metadata.level()),
            LogSource::Engine,
            visitor.message.unwrap_or_default(),
            context,
        );
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    context: Context,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                Value::String(s) => s,
                other => other.to_string(),
            });
        } else {
            self.context.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, Value::from(format!("{:?}", value)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::errors::Result;
    use crate::stream::PushRequest;
    use crate::transport::Transport;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tokio::runtime::Handle;
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Default)]
    struct RecordingTransport {
        requests: Mutex<Vec<PushRequest>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, request: PushRequest) -> Result<()> {
            self.requests.lock().unwrap().push(request);
            Ok(())
        }
    }

    fn shipper() -> (LogShipper, Arc<RecordingTransport>) {
        let shipper = LogShipper::new(Config {
            batch_size: 100,
            ..Config::default()
        })
        .unwrap();
        let transport = Arc::new(RecordingTransport::default());
        shipper
            .setup_with_transport(Handle::current(), transport.clone())
            .unwrap();
        (shipper, transport)
    }

    #[test]
    fn test_target_matching() {
        let layer = ShipperLayer::new(LogShipper::new(Config::default()).unwrap())
            .ignore_target("noisy");

        assert!(layer.is_ignored("loki_shipper"));
        assert!(layer.is_ignored("loki_shipper::transport"));
        assert!(layer.is_ignored("hyper_util::client::legacy"));
        assert!(layer.is_ignored("noisy::inner"));
        assert!(!layer.is_ignored("hyperion"));
        assert!(!layer.is_ignored("game::physics"));
    }

    #[tokio::test]
    async fn test_events_become_engine_entries() {
        let (shipper, transport) = shipper();
        let subscriber = tracing_subscriber::registry().with(ShipperLayer::new(shipper.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "game::physics", body = 3, sleeping = false, "Collision skipped");
            tracing::trace!(target: "game::ai", "Path recomputed");
        });

        assert_eq!(shipper.buffered_len(), 2);
        shipper.shutdown().await;

        let requests = transport.requests.lock().unwrap();
        let streams = &requests[0].streams;
        assert_eq!(streams[0].stream.level, LogLevel::Warn);
        assert_eq!(streams[1].stream.level, LogLevel::Debug);

        let line: Value = serde_json::from_str(&streams[0].values[0].1).unwrap();
        assert_eq!(line["message"], "Collision skipped");
        assert_eq!(line["source"], "engine");
        assert_eq!(line["target"], "game::physics");
        assert_eq!(line["body"], 3);
        assert_eq!(line["sleeping"], false);
        assert!(line.get("line").is_some());
    }

    #[tokio::test]
    async fn test_own_and_http_events_are_ignored() {
        let (shipper, _transport) = shipper();
        let subscriber = tracing_subscriber::registry().with(ShipperLayer::new(shipper.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::error!(target: "loki_shipper::shipper", "Failed to push batch");
            tracing::debug!(target: "reqwest::connect", "starting new connection");
            tracing::info!(target: "hyper::proto", "flushed 512 bytes");
        });

        assert_eq!(shipper.buffered_len(), 0);
    }
}
