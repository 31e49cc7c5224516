use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Points in the match-page protocol at which a closed page is detected.
///
/// A page that dies right after navigation means the host is out of memory;
/// one that dies after any later waypoint loaded fine at least once and is
/// worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waypoint {
    Navigation,
    ArticleLoaded,
    StatsClicked,
    StatsFrameLoaded,
}

impl fmt::Display for Waypoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Waypoint::Navigation => "immediately after navigation",
            Waypoint::ArticleLoaded => "while waiting for article",
            Waypoint::StatsClicked => "after clicking stats",
            Waypoint::StatsFrameLoaded => "while waiting for stats frame",
        };
        f.write_str(label)
    }
}

/// Why a transient failure happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransientCause {
    Timeout { operation: String, after: Duration },
    ClosedAt(Waypoint),
}

impl fmt::Display for TransientCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransientCause::Timeout { operation, after } => {
                write!(f, "timeout while {} after {}ms", operation, after.as_millis())
            }
            TransientCause::ClosedAt(waypoint) => write!(f, "page was closed {}", waypoint),
        }
    }
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unexpected page layout: {0}")]
    UnexpectedLayout(String),

    #[error("transient failure: {0}")]
    Transient(TransientCause),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Whether an attempt that failed with a given error may be repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    Fatal,
}

impl ScrapeError {
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        ScrapeError::Transient(TransientCause::Timeout {
            operation: operation.into(),
            after,
        })
    }

    /// A page found closed at `waypoint`. Closure right after navigation is
    /// resource exhaustion, anything later is transient.
    pub fn closed_at(waypoint: Waypoint) -> Self {
        match waypoint {
            Waypoint::Navigation => {
                ScrapeError::ResourceExhausted(format!("page closed {}", waypoint))
            }
            other => ScrapeError::Transient(TransientCause::ClosedAt(other)),
        }
    }

    pub fn retry_decision(&self) -> RetryDecision {
        match self {
            ScrapeError::Transient(_) => RetryDecision::Retry,
            _ => RetryDecision::Fatal,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ScrapeError::Transient(TransientCause::Timeout { .. }))
    }

    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, ScrapeError::ResourceExhausted(_))
    }
}

/// Classify a raw driver message. Chromium reports memory pressure through
/// net error codes embedded in otherwise generic failures.
pub fn classify_driver_message(message: &str) -> ScrapeError {
    if message.contains("ERR_INSUFFICIENT_RESOURCES") || message.contains("ERR_OUT_OF_MEMORY") {
        return ScrapeError::ResourceExhausted(message.to_string());
    }
    ScrapeError::Browser(message.to_string())
}

pub type ScrapeResult<T> = Result<T, ScrapeError>;
