// ================================================================
// File: armlink-common/src/error.rs
// ================================================================

use thiserror::Error;
use crate::models::connection::ConnectionState;

#[derive(Debug, Error)]
pub enum Error {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Timeout error: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Transport-level failure to establish the command connection.
    #[error("Connection error: {0}")]
    Connect(String),

    /// `send` was called while the command connection was not open.
    #[error("Command connection is not open (state={0})")]
    NotOpen(ConnectionState),

    #[error("Frame fetch error: {0}")]
    Fetch(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Input error: {0}")]
    Input(String),
}
