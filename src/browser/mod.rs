//! Browser automation capability.
//!
//! The scrapers only talk to the [`PageSession`] trait; [`chromium`] provides
//! the production implementation on top of chromiumoxide.

pub mod chromium;
pub mod scripts;

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::LaunchProfile;
use crate::errors::ScrapeResult;

/// Lifecycle event a navigation waits for before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    DomContentLoaded,
    Load,
}

/// Condition an element must meet for a selector wait to succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    Attached,
    Visible,
}

/// URL fragments that must all appear in a response URL for it to be captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSignature {
    fragments: Vec<String>,
}

impl ResponseSignature {
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, url: &str) -> bool {
        self.fragments.iter().all(|f| url.contains(f.as_str()))
    }
}

/// A single open page inside a launched browser.
///
/// Every suspension point takes an explicit timeout; expiry surfaces as a
/// transient error.
#[async_trait]
pub trait PageSession: Send + Sync {
    /// Navigate and wait for the given lifecycle event.
    async fn navigate(&self, url: &str, wait_until: WaitUntil, timeout: Duration)
        -> ScrapeResult<()>;
    /// Wait until no request has been in flight for a short interval.
    async fn wait_for_network_idle(&self, timeout: Duration) -> ScrapeResult<()>;
    /// Forward the JSON body of every response matching `signature` into `sink`
    /// for as long as the page lives or the receiver is held.
    async fn capture_json(
        &self,
        signature: ResponseSignature,
        sink: mpsc::UnboundedSender<Value>,
    ) -> ScrapeResult<()>;
    async fn current_url(&self) -> ScrapeResult<String>;
    /// Serialized markup of the current document.
    async fn content(&self) -> ScrapeResult<String>;
    async fn title(&self) -> ScrapeResult<String>;
    /// Evaluate an expression in the page and return its JSON value.
    async fn evaluate(&self, expression: &str) -> ScrapeResult<Value>;
    async fn wait_for_selector(
        &self,
        selector: &str,
        state: ElementState,
        timeout: Duration,
    ) -> ScrapeResult<()>;
    /// Poll a boolean expression until it holds.
    async fn wait_for_function(&self, predicate: &str, timeout: Duration) -> ScrapeResult<()>;
    /// Dispatch a click on the first element matching `selector`, even if covered.
    async fn click(&self, selector: &str) -> ScrapeResult<()>;
    async fn is_closed(&self) -> bool;
    /// Tear the page and its browser down. Safe to call more than once.
    async fn close(&self) -> ScrapeResult<()>;
}

/// Something that can launch a browser and open one page in it.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn launch(&self, profile: &LaunchProfile) -> ScrapeResult<Box<dyn PageSession>>;
}
