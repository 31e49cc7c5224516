//! Scripted in-memory browser for tests.

use crate::browser::{BrowserDriver, ElementState, PageSession, ResponseSignature, WaitUntil};
use crate::config::LaunchProfile;
use crate::errors::{ScrapeError, ScrapeResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

const FAKE_WAIT: Duration = Duration::from_millis(1);

/// A page whose answers are fixed up front.
///
/// `evaluate` answers with the value of the first rule whose needle occurs in
/// the expression; waits succeed unless their selector or predicate is listed
/// as missing.
#[derive(Default)]
pub struct FakePage {
    html: String,
    title: String,
    evaluations: Vec<(String, Value)>,
    missing: Vec<String>,
    captures: Vec<(String, Value)>,
    navigate_error: Option<fn() -> ScrapeError>,
    closes_on_navigation: bool,
    fail_close: bool,
    url: Mutex<String>,
    closed: AtomicBool,
    navigations: Arc<Mutex<Vec<String>>>,
    close_count: Arc<AtomicUsize>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_html(mut self, html: &str) -> Self {
        self.html = html.to_string();
        self
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn with_evaluation(mut self, needle: &str, value: Value) -> Self {
        self.evaluations.push((needle.to_string(), value));
        self
    }

    /// Waits and clicks whose selector or predicate contains `needle` time out.
    pub fn missing(mut self, needle: &str) -> Self {
        self.missing.push(needle.to_string());
        self
    }

    /// A response body delivered to captures whose signature matches `url`.
    pub fn with_capture(mut self, url: &str, body: Value) -> Self {
        self.captures.push((url.to_string(), body));
        self
    }

    pub fn failing_navigation(mut self, error: fn() -> ScrapeError) -> Self {
        self.navigate_error = Some(error);
        self
    }

    /// The page dies as soon as a navigation completes.
    pub fn closing_on_navigation(mut self) -> Self {
        self.closes_on_navigation = true;
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    fn is_missing(&self, text: &str) -> bool {
        self.missing.iter().any(|needle| text.contains(needle.as_str()))
    }
}

#[async_trait]
impl PageSession for FakePage {
    async fn navigate(&self, url: &str, _wait_until: WaitUntil, _timeout: Duration) -> ScrapeResult<()> {
        if let Ok(mut navigations) = self.navigations.lock() {
            navigations.push(url.to_string());
        }
        if let Some(error) = self.navigate_error {
            return Err(error());
        }
        if let Ok(mut current) = self.url.lock() {
            *current = url.to_string();
        }
        if self.closes_on_navigation {
            self.closed.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn wait_for_network_idle(&self, _timeout: Duration) -> ScrapeResult<()> {
        Ok(())
    }

    async fn capture_json(
        &self,
        signature: ResponseSignature,
        sink: mpsc::UnboundedSender<Value>,
    ) -> ScrapeResult<()> {
        for (url, body) in &self.captures {
            if signature.matches(url) {
                let _ = sink.send(body.clone());
            }
        }
        Ok(())
    }

    async fn current_url(&self) -> ScrapeResult<String> {
        Ok(self.url.lock().map(|u| u.clone()).unwrap_or_default())
    }

    async fn content(&self) -> ScrapeResult<String> {
        Ok(self.html.clone())
    }

    async fn title(&self) -> ScrapeResult<String> {
        Ok(self.title.clone())
    }

    async fn evaluate(&self, expression: &str) -> ScrapeResult<Value> {
        Ok(self
            .evaluations
            .iter()
            .find(|(needle, _)| expression.contains(needle.as_str()))
            .map(|(_, value)| value.clone())
            .unwrap_or(Value::Null))
    }

    async fn wait_for_selector(&self, selector: &str, _state: ElementState, _timeout: Duration) -> ScrapeResult<()> {
        if self.is_missing(selector) {
            return Err(ScrapeError::timeout(format!("waiting for {}", selector), FAKE_WAIT));
        }
        Ok(())
    }

    async fn wait_for_function(&self, predicate: &str, _timeout: Duration) -> ScrapeResult<()> {
        if self.is_missing(predicate) {
            return Err(ScrapeError::timeout("waiting for page condition", FAKE_WAIT));
        }
        Ok(())
    }

    async fn click(&self, selector: &str) -> ScrapeResult<()> {
        if self.is_missing(selector) {
            return Err(ScrapeError::Browser(format!("no element to click for {}", selector)));
        }
        Ok(())
    }

    async fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> ScrapeResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.close_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(ScrapeError::Browser("target crashed during close".to_string()));
        }
        Ok(())
    }
}

/// Hands out scripted pages in order, one per launch.
pub struct FakeDriver {
    pages: Mutex<VecDeque<FakePage>>,
    launches: AtomicUsize,
    closes: Arc<AtomicUsize>,
    navigations: Arc<Mutex<Vec<String>>>,
}

impl FakeDriver {
    pub fn new(pages: Vec<FakePage>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            launches: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
            navigations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().map(|n| n.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn launch(&self, _profile: &LaunchProfile) -> ScrapeResult<Box<dyn PageSession>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let mut page = self
            .pages
            .lock()
            .ok()
            .and_then(|mut pages| pages.pop_front())
            .ok_or_else(|| ScrapeError::Browser("no scripted page left".to_string()))?;
        page.close_count = Arc::clone(&self.closes);
        page.navigations = Arc::clone(&self.navigations);
        Ok(Box::new(page))
    }
}
