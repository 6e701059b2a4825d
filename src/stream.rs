//! Grouping of buffered entries into Loki push streams

use crate::entry::{LogEntry, LogLevel};
use crate::session::SessionId;
use serde::{Deserialize, Serialize};

/// Body of a Loki push request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PushRequest {
    pub streams: Vec<Stream>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Stream {
    pub stream: StreamLabels,
    /// `[unix-nanos-as-string, json-line]` pairs in enqueue order
    pub values: Vec<(String, String)>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StreamLabels {
    pub app: String,
    pub session_id: String,
    pub debug: String,
    pub level: LogLevel,
}

/// Labels shared by every stream of a shipper.
#[derive(Clone, Debug)]
pub struct LabelSet {
    pub app: String,
    pub session_id: SessionId,
    pub debug: bool,
}

impl LabelSet {
    fn for_level(&self, level: LogLevel) -> StreamLabels {
        StreamLabels {
            app: self.app.clone(),
            session_id: self.session_id.to_string(),
            debug: self.debug.to_string(),
            level,
        }
    }
}

impl PushRequest {
    /// Group entries by level, one stream per distinct level.
    ///
    /// Streams are ordered by the first appearance of their level and keep
    /// the relative order of their entries.
    pub fn from_entries(entries: Vec<LogEntry>, labels: &LabelSet) -> Self {
        let mut streams: Vec<Stream> = Vec::new();

        for entry in entries {
            let value = (entry.timestamp_nanos().to_string(), entry.to_line());
            match streams.iter_mut().find(|s| s.stream.level == entry.level) {
                Some(stream) => stream.values.push(value),
                None => streams.push(Stream {
                    stream: labels.for_level(entry.level),
                    values: vec![value],
                }),
            }
        }

        Self { streams }
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Number of log lines across all streams
    pub fn len(&self) -> usize {
        self.streams.iter().map(|s| s.values.len()).sum()
    }
}
