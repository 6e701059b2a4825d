//! Error types for the log shipper

use std::fmt;

pub type Result<T> = std::result::Result<T, ShipperError>;

#[derive(Debug)]
pub enum ShipperError {
    /// IO operation failed
    Io(std::io::Error),

    /// HTTP request failed
    Http(reqwest::Error),

    /// JSON serialization failed
    Json(serde_json::Error),

    /// Configuration error
    Config(String),

    /// Push endpoint rejected the payload or could not be reached
    Transport(String),

    /// `setup` was called on a shipper that already has a transport
    AlreadySetUp,
}

impl fmt::Display for ShipperError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShipperError::Io(err) => write!(f, "IO error: {}", err),
            ShipperError::Http(err) => write!(f, "HTTP error: {}", err),
            ShipperError::Json(err) => write!(f, "JSON error: {}", err),
            ShipperError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ShipperError::Transport(msg) => write!(f, "Transport error: {}", msg),
            ShipperError::AlreadySetUp => write!(f, "Shipper is already set up"),
        }
    }
}

impl std::error::Error for ShipperError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ShipperError::Io(err) => Some(err),
            ShipperError::Http(err) => Some(err),
            ShipperError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ShipperError {
    fn from(err: std::io::Error) -> Self {
        ShipperError::Io(err)
    }
}

impl From<reqwest::Error> for ShipperError {
    fn from(err: reqwest::Error) -> Self {
        ShipperError::Http(err)
    }
}

impl From<serde_json::Error> for ShipperError {
    fn from(err: serde_json::Error) -> Self {
        ShipperError::Json(err)
    }
}
