//! Firmware start-up and serving errors
//!
//! None of these stop the measurement task. They are logged by the task that
//! hit them, which then retries or parks.

use core::fmt::{Debug, Write};

use tester_core::{ConfigError, report::ReportError};
use thiserror_no_std::Error;

pub type Message = heapless::String<64>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("WiFi connection failed: {0}")]
    Wifi(Message),
    #[error("Network error: {0}")]
    Network(Message),
    #[error("Peer timed out")]
    Timeout,
    #[error("Serial link error: {0}")]
    Serial(Message),
    #[error("Report encoding failed: {0}")]
    Report(ReportError),
    #[error("Invalid configuration: {0}")]
    Config(ConfigError),
}

impl From<ReportError> for AppError {
    fn from(e: ReportError) -> Self {
        Self::Report(e)
    }
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Debug text of a driver error, truncated to fit a [`Message`].
pub fn describe(e: impl Debug) -> Message {
    let mut message = Message::new();
    // Truncation is the intended outcome when the text is too long.
    let _ = write!(message, "{:?}", e);
    message
}
