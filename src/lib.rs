//! Batching Loki log shipper
//!
//! Collects structured log entries from any number of producers, buffers them
//! in memory and pushes them to a Loki-compatible endpoint as label-grouped
//! JSON streams, either when a batch fills up, on a timer, or on demand.

pub mod buffer;
pub mod config;
pub mod console;
pub mod entry;
pub mod errors;
pub mod layer;
pub mod session;
pub mod shipper;
pub mod stream;
pub mod transport;

pub use config::{BasicAuth, Config};
pub use entry::{Context, LogEntry, LogLevel, LogSource};
pub use errors::{Result, ShipperError};
pub use layer::ShipperLayer;
pub use session::SessionId;
pub use shipper::{LifecycleEvent, LogShipper, ShipperStats};
pub use stream::{PushRequest, Stream, StreamLabels};
pub use transport::{HttpTransport, Transport};
