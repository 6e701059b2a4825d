//! Log entry data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Caller-supplied fields merged into an entry.
pub type Context = serde_json::Map<String, Value>;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }

    /// Whether entries at this level carry a backtrace.
    pub fn captures_backtrace(&self) -> bool {
        *self >= LogLevel::Error
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" | "ERR" => Ok(LogLevel::Error),
            "CRITICAL" | "FATAL" => Ok(LogLevel::Critical),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

/// Where an entry came from.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    /// Leveled calls made by application code
    App,
    /// Plain console prints
    Print,
    /// The host environment's own logging
    Engine,
}

impl LogSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogSource::App => "app",
            LogSource::Print => "print",
            LogSource::Engine => "engine",
        }
    }
}

impl std::fmt::Display for LogSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub source: LogSource,
    pub context: Context,
}

impl LogEntry {
    /// Create an entry stamped with the current time
    pub fn new(level: LogLevel, source: LogSource, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            source,
            context: Context::new(),
        }
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context.extend(context);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Nanoseconds since the Unix epoch, as Loki expects them.
    pub fn timestamp_nanos(&self) -> i64 {
        self.timestamp.timestamp_nanos_opt().unwrap_or_default()
    }

    /// The JSON object shipped as the log line.
    ///
    /// Context keys become siblings of `level`, `message` and `source`; those
    /// three always win over context keys of the same name. The timestamp
    /// travels next to the line instead of inside it.
    pub fn to_line_object(&self) -> serde_json::Map<String, Value> {
        let mut object = self.context.clone();
        object.insert("level".to_string(), Value::from(self.level.as_str()));
        object.insert("message".to_string(), Value::from(self.message.clone()));
        object.insert("source".to_string(), Value::from(self.source.as_str()));
        object
    }

    pub fn to_line(&self) -> String {
        Value::Object(self.to_line_object()).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Warn < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Critical);
        assert!(LogLevel::Critical.captures_backtrace());
        assert!(!LogLevel::Warn.captures_backtrace());
    }

    #[test]
    fn test_level_from_str() {
        assert_eq!("info".parse::<LogLevel>(), Ok(LogLevel::Info));
        assert_eq!("Warning".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!("FATAL".parse::<LogLevel>(), Ok(LogLevel::Critical));
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_line_object_merges_context() {
        let entry = LogEntry::new(LogLevel::Warn, LogSource::Engine, "Texture missing")
            .with_field("path", "res://missing.png")
            .with_field("line", 42);

        let line: Value = serde_json::from_str(&entry.to_line()).unwrap();
        assert_eq!(
            line,
            json!({
                "level": "WARN",
                "message": "Texture missing",
                "source": "engine",
                "path": "res://missing.png",
                "line": 42,
            })
        );
        assert!(line.get("timestamp").is_none());
    }

    #[test]
    fn test_reserved_keys_win_over_context() {
        let mut context = Context::new();
        context.insert("level".to_string(), json!("spoofed"));
        context.insert("code".to_string(), json!(7));

        let entry = LogEntry::new(LogLevel::Info, LogSource::App, "hello").with_context(context);
        let object = entry.to_line_object();
        assert_eq!(object["level"], json!("INFO"));
        assert_eq!(object["code"], json!(7));
    }

    #[test]
    fn test_timestamp_nanos() {
        let entry = LogEntry::new(LogLevel::Debug, LogSource::Print, "tick");
        let nanos = entry.timestamp_nanos();
        assert!(nanos > 1_600_000_000_000_000_000);
    }
}
