//! Batching log shipper: ingestion API, flush policy and lifecycle hooks

use crate::buffer::{DrainReason, LogBuffer};
use crate::config::Config;
use crate::console;
use crate::entry::{Context, LogEntry, LogLevel, LogSource};
use crate::errors::{Result, ShipperError};
use crate::session::SessionId;
use crate::stream::{LabelSet, PushRequest};
use crate::transport::{HttpTransport, Transport};

use serde_json::Value;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Host lifecycle transitions a collaborator reports to the shipper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    CloseRequested,
    Backgrounded,
    Paused,
    FocusLost,
    FocusGained,
    Resumed,
}

impl LifecycleEvent {
    /// Transitions after which buffered entries may never get another chance
    pub fn requires_flush(&self) -> bool {
        matches!(
            self,
            LifecycleEvent::CloseRequested
                | LifecycleEvent::Backgrounded
                | LifecycleEvent::Paused
                | LifecycleEvent::FocusLost
        )
    }
}

/// Accepts log entries from any thread and ships them to Loki in batches.
///
/// Cloning is cheap and every clone feeds the same buffer. Until
/// [`setup`](Self::setup) has wired a runtime and transport, flushes discard
/// the buffer instead of letting it grow.
#[derive(Clone)]
pub struct LogShipper {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    labels: LabelSet,
    buffer: LogBuffer,
    runtime: OnceLock<ShipperRuntime>,
    in_flight: TaskTracker,
    counters: Arc<Counters>,
}

struct ShipperRuntime {
    handle: Handle,
    transport: Arc<dyn Transport>,
    timer: JoinHandle<()>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.get() {
            runtime.timer.abort();
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    flushes_dispatched: AtomicU64,
    entries_dispatched: AtomicU64,
    entries_dropped: AtomicU64,
    transport_successes: AtomicU64,
    transport_failures: AtomicU64,
}

/// Shipper statistics
#[derive(Debug, Clone, PartialEq)]
pub struct ShipperStats {
    pub session_id: String,
    pub buffered_entries: usize,
    pub flushes_dispatched: u64,
    pub entries_dispatched: u64,
    pub entries_dropped: u64,
    pub transport_successes: u64,
    pub transport_failures: u64,
}

impl LogShipper {
    /// Create a new shipper. Nothing leaves the process until `setup`.
    pub fn new(config: Config) -> Result<Self> {
        config.validate().map_err(ShipperError::Config)?;

        let labels = LabelSet {
            app: config.app_label.clone(),
            session_id: SessionId::generate(),
            debug: config.debug,
        };

        Ok(Self {
            inner: Arc::new(Inner {
                buffer: LogBuffer::new(config.batch_size),
                config,
                labels,
                runtime: OnceLock::new(),
                in_flight: TaskTracker::new(),
                counters: Arc::new(Counters::default()),
            }),
        })
    }

    /// Wire the HTTP transport and the flush timer into a host runtime
    pub fn setup(&self, handle: Handle) -> Result<()> {
        let transport = HttpTransport::from_config(&self.inner.config)?;
        self.setup_with_transport(handle, Arc::new(transport))
    }

    /// Wire an arbitrary transport and the flush timer into a host runtime
    pub fn setup_with_transport(&self, handle: Handle, transport: Arc<dyn Transport>) -> Result<()> {
        if self.inner.runtime.get().is_some() {
            return Err(ShipperError::AlreadySetUp);
        }

        let timer = spawn_flush_timer(
            &handle,
            Arc::downgrade(&self.inner),
            self.inner.config.flush_interval,
        );

        if let Err(runtime) = self.inner.runtime.set(ShipperRuntime {
            handle,
            transport,
            timer,
        }) {
            runtime.timer.abort();
            return Err(ShipperError::AlreadySetUp);
        }

        info!(
            "Log shipper ready for app {} session {} (batch size {}, flush every {:?})",
            self.inner.labels.app,
            self.inner.labels.session_id,
            self.inner.config.batch_size,
            self.inner.config.flush_interval
        );
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.inner.runtime.get().is_some()
    }

    pub fn session_id(&self) -> &SessionId {
        &self.inner.labels.session_id
    }

    pub fn buffered_len(&self) -> usize {
        self.inner.buffer.len()
    }

    pub fn debug(&self, message: impl Into<String>, context: Context) {
        self.log(LogLevel::Debug, LogSource::App, message, context);
    }

    pub fn info(&self, message: impl Into<String>, context: Context) {
        self.log(LogLevel::Info, LogSource::App, message, context);
    }

    pub fn warn(&self, message: impl Into<String>, context: Context) {
        self.log(LogLevel::Warn, LogSource::App, message, context);
    }

    pub fn error(&self, message: impl Into<String>, context: Context) {
        self.log(LogLevel::Error, LogSource::App, message, context);
    }

    /// Log and flush immediately, whatever the buffer size
    pub fn critical(&self, message: impl Into<String>, context: Context) {
        self.log(LogLevel::Critical, LogSource::App, message, context);
    }

    /// Intercepted plain console output
    pub fn print(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, LogSource::Print, message, Context::new());
    }

    /// Enqueue one entry. Never fails and never waits on the network.
    pub fn log(
        &self,
        level: LogLevel,
        source: LogSource,
        message: impl Into<String>,
        context: Context,
    ) {
        let mut entry = LogEntry::new(level, source, message).with_context(context);

        attach_backtrace(&mut entry, capture_backtrace);

        if self.inner.config.console_echo {
            console::echo(&entry);
        }

        let force = level == LogLevel::Critical;
        if let Some((reason, request)) = self.inner.buffer.push(entry, force, &self.inner.labels) {
            if reason == DrainReason::Forced {
                debug!("Critical entry forced a flush");
            }
            self.dispatch(request);
        }
    }

    /// Drain the buffer and push it without waiting for the response
    pub fn flush(&self) {
        if !self.is_ready() {
            let discarded = self.inner.buffer.clear();
            if discarded > 0 {
                self.inner
                    .counters
                    .entries_dropped
                    .fetch_add(discarded as u64, Ordering::Relaxed);
                debug!("Shipper not set up, discarded {} entries", discarded);
            }
            return;
        }

        if let Some(request) = self.inner.buffer.drain(&self.inner.labels) {
            self.dispatch(request);
        }
    }

    /// Flush on transitions that may end the process
    pub fn handle_lifecycle_event(&self, event: LifecycleEvent) {
        if event.requires_flush() {
            debug!("Flushing on lifecycle event {:?}", event);
            self.flush();
        }
    }

    /// Stop the timer, flush, and wait until every push started so far,
    /// including the final one, has completed
    pub async fn shutdown(&self) {
        if let Some(runtime) = self.inner.runtime.get() {
            runtime.timer.abort();
        }

        if let Some(request) = self.inner.buffer.drain(&self.inner.labels) {
            if let Some(runtime) = self.claim(&request) {
                let transport = Arc::clone(&runtime.transport);
                send_and_report(transport, Arc::clone(&self.inner.counters), request).await;
            }
        }

        self.inner.in_flight.close();
        self.inner.in_flight.wait().await;

        info!("Log shipper for session {} shut down", self.inner.labels.session_id);
    }

    fn dispatch(&self, request: PushRequest) {
        if let Some(runtime) = self.claim(&request) {
            let transport = Arc::clone(&runtime.transport);
            let counters = Arc::clone(&self.inner.counters);
            self.inner
                .in_flight
                .spawn_on(send_and_report(transport, counters, request), &runtime.handle);
        }
    }

    /// Account for a drained request; `None` means it was discarded
    fn claim(&self, request: &PushRequest) -> Option<&ShipperRuntime> {
        let counters = &self.inner.counters;
        let lines = request.len() as u64;

        match self.inner.runtime.get() {
            Some(runtime) => {
                counters.flushes_dispatched.fetch_add(1, Ordering::Relaxed);
                counters.entries_dispatched.fetch_add(lines, Ordering::Relaxed);
                Some(runtime)
            }
            None => {
                counters.entries_dropped.fetch_add(lines, Ordering::Relaxed);
                None
            }
        }
    }

    /// Get shipper statistics
    pub fn stats(&self) -> ShipperStats {
        let counters = &self.inner.counters;
        ShipperStats {
            session_id: self.inner.labels.session_id.to_string(),
            buffered_entries: self.inner.buffer.len(),
            flushes_dispatched: counters.flushes_dispatched.load(Ordering::Relaxed),
            entries_dispatched: counters.entries_dispatched.load(Ordering::Relaxed),
            entries_dropped: counters.entries_dropped.load(Ordering::Relaxed),
            transport_successes: counters.transport_successes.load(Ordering::Relaxed),
            transport_failures: counters.transport_failures.load(Ordering::Relaxed),
        }
    }
}

/// `RUST_BACKTRACE` decides whether anything is captured
fn capture_backtrace() -> Option<String> {
    let backtrace = Backtrace::capture();
    (backtrace.status() == BacktraceStatus::Captured).then(|| backtrace.to_string())
}

/// Add a backtrace to error and critical entries that don't carry one yet
fn attach_backtrace<F>(entry: &mut LogEntry, capture: F)
where
    F: FnOnce() -> Option<String>,
{
    if !entry.level.captures_backtrace() || entry.context.contains_key("backtrace") {
        return;
    }

    if let Some(backtrace) = capture() {
        entry
            .context
            .insert("backtrace".to_string(), Value::from(backtrace));
    }
}

async fn send_and_report(transport: Arc<dyn Transport>, counters: Arc<Counters>, request: PushRequest) {
    let batch_id = Uuid::new_v4();
    let lines = request.len();
    let streams = request.streams.len();

    match transport.send(request).await {
        Ok(()) => {
            counters.transport_successes.fetch_add(1, Ordering::Relaxed);
            debug!(
                "Pushed batch {} ({} lines in {} streams)",
                batch_id, lines, streams
            );
        }
        Err(e) => {
            counters.transport_failures.fetch_add(1, Ordering::Relaxed);
            error!("Failed to push batch {} ({} lines): {}", batch_id, lines, e);
        }
    }
}

fn spawn_flush_timer(handle: &Handle, inner: Weak<Inner>, period: Duration) -> JoinHandle<()> {
    handle.spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let Some(inner) = inner.upgrade() else {
                break;
            };
            LogShipper { inner }.flush();
        }
    })
}
