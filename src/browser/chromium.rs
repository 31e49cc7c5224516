//! Chromium-backed browser capability using chromiumoxide.

use super::{BrowserDriver, ElementState, PageSession, ResponseSignature, WaitUntil, scripts};
use crate::config::{BlockingRules, LaunchProfile};
use crate::errors::{ScrapeError, ScrapeResult, Waypoint, classify_driver_message};
use async_trait::async_trait;
use base64::Engine as _;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    self, ContinueRequestParams, EventRequestPaused, FailRequestParams, RequestPattern,
    RequestStage,
};
use chromiumoxide::cdp::browser_protocol::inspector::{self, EventTargetCrashed};
use chromiumoxide::cdp::browser_protocol::network::{
    self, ErrorReason, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
    EventResponseReceived, GetResponseBodyParams, Headers, SetExtraHttpHeadersParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    EventDomContentEventFired, EventLoadEventFired, NavigateParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use log::{debug, warn};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const IDLE_WINDOW: Duration = Duration::from_millis(500);
const LIVENESS_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

/// Find a Chromium binary on `PATH`.
pub fn find_chromium() -> Option<PathBuf> {
    ["google-chrome", "chromium", "chromium-browser", "google-chrome-stable"]
        .iter()
        .find_map(|name| which::which(name).ok())
}

/// Launches one headless Chromium per session.
#[derive(Debug, Default, Clone)]
pub struct ChromiumDriver;

impl ChromiumDriver {
    pub fn new() -> Self {
        Self
    }

    fn build_config(profile: &LaunchProfile) -> ScrapeResult<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .args(profile.args.clone())
            .window_size(profile.viewport.width, profile.viewport.height)
            .viewport(Viewport {
                width: profile.viewport.width,
                height: profile.viewport.height,
                ..Viewport::default()
            })
            .request_timeout(profile.launch_timeout);

        if let Some(path) = profile.executable.clone().or_else(find_chromium) {
            builder = builder.chrome_executable(path);
        }

        builder
            .build()
            .map_err(|e| ScrapeError::Browser(format!("failed to build browser config: {e}")))
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn launch(&self, profile: &LaunchProfile) -> ScrapeResult<Box<dyn PageSession>> {
        let config = Self::build_config(profile)?;

        let (browser, mut handler) = tokio::time::timeout(profile.launch_timeout, Browser::launch(config))
            .await
            .map_err(|_| ScrapeError::timeout("launching Chromium", profile.launch_timeout))?
            .map_err(map_cdp)?;

        let closed = Arc::new(AtomicBool::new(false));
        let closed_flag = Arc::clone(&closed);
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {}", e);
                }
            }
            closed_flag.store(true, Ordering::SeqCst);
        });

        let session = ChromiumSession {
            page: None,
            browser: tokio::sync::Mutex::new(Some(browser)),
            closed,
            network: Arc::new(NetworkActivity::default()),
            tasks: Mutex::new(vec![handler_task]),
        };

        match session.open_page(profile).await {
            Ok(page) => Ok(Box::new(ChromiumSession {
                page: Some(page),
                ..session
            })),
            Err(e) => {
                let _ = session.close().await;
                Err(e)
            }
        }
    }
}

/// In-flight request bookkeeping for the quiescence heuristic.
#[derive(Default)]
struct NetworkActivity {
    state: Mutex<NetworkState>,
}

struct NetworkState {
    in_flight: HashSet<String>,
    /// Requests whose completion was seen before their start.
    settled: HashSet<String>,
    last_activity: Instant,
}

impl Default for NetworkState {
    fn default() -> Self {
        Self {
            in_flight: HashSet::new(),
            settled: HashSet::new(),
            last_activity: Instant::now(),
        }
    }
}

impl NetworkActivity {
    fn started(&self, id: &str) {
        if let Ok(mut state) = self.state.lock() {
            if !state.settled.remove(id) {
                state.in_flight.insert(id.to_string());
            }
            state.last_activity = Instant::now();
        }
    }

    fn finished(&self, id: &str) {
        if let Ok(mut state) = self.state.lock() {
            if !state.in_flight.remove(id) {
                state.settled.insert(id.to_string());
            }
            state.last_activity = Instant::now();
        }
    }

    fn is_idle(&self) -> bool {
        self.state
            .lock()
            .map(|s| s.in_flight.is_empty() && s.last_activity.elapsed() >= IDLE_WINDOW)
            .unwrap_or(true)
    }
}

/// Pairs matching responses with their load completion, whichever event
/// arrives first.
#[derive(Default)]
struct CaptureLedger {
    pending: HashMap<String, String>,
    finished_early: HashSet<String>,
}

impl CaptureLedger {
    /// Returns the url to read when the body is already complete.
    fn response(&mut self, id: &str, url: &str, wanted: bool) -> Option<String> {
        let complete = self.finished_early.remove(id);
        if !wanted {
            return None;
        }
        if complete {
            return Some(url.to_string());
        }
        self.pending.insert(id.to_string(), url.to_string());
        None
    }

    /// Returns the url to read when the response was already seen.
    fn finished(&mut self, id: &str) -> Option<String> {
        let url = self.pending.remove(id);
        if url.is_none() {
            self.finished_early.insert(id.to_string());
        }
        url
    }
}

/// One Chromium process with a single page.
pub struct ChromiumSession {
    page: Option<Page>,
    browser: tokio::sync::Mutex<Option<Browser>>,
    closed: Arc<AtomicBool>,
    network: Arc<NetworkActivity>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ChromiumSession {
    async fn open_page(&self, profile: &LaunchProfile) -> ScrapeResult<Page> {
        let page = {
            let guard = self.browser.lock().await;
            let browser = guard
                .as_ref()
                .ok_or_else(|| ScrapeError::Browser("browser already closed".to_string()))?;
            browser.new_page("about:blank").await.map_err(map_cdp)?
        };

        page.set_user_agent(profile.user_agent).await.map_err(map_cdp)?;

        if !profile.extra_headers.is_empty() {
            let headers: serde_json::Map<String, Value> = profile
                .extra_headers
                .iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                .collect();
            page.execute(SetExtraHttpHeadersParams::new(Headers::new(Value::Object(headers))))
                .await
                .map_err(map_cdp)?;
        }

        page.execute(network::EnableParams::default())
            .await
            .map_err(map_cdp)?;
        self.track_network(&page).await?;
        self.watch_crash(&page).await?;

        if !profile.blocking.is_empty() {
            self.install_blocking(&page, profile.blocking.clone()).await?;
        }

        Ok(page)
    }

    fn page(&self) -> ScrapeResult<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| ScrapeError::Browser("page not open".to_string()))
    }

    fn spawn(&self, task: JoinHandle<()>) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(task);
        }
    }

    async fn track_network(&self, page: &Page) -> ScrapeResult<()> {
        let mut sent = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(map_cdp)?;
        let mut finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(map_cdp)?;
        let mut failed = page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(map_cdp)?;

        let network = Arc::clone(&self.network);
        self.spawn(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    Some(event) = sent.next() => network.started(event.request_id.inner()),
                    Some(event) = finished.next() => network.finished(event.request_id.inner()),
                    Some(event) = failed.next() => network.finished(event.request_id.inner()),
                    else => break,
                }
            }
        }));
        Ok(())
    }

    async fn watch_crash(&self, page: &Page) -> ScrapeResult<()> {
        let mut crashed = page
            .event_listener::<EventTargetCrashed>()
            .await
            .map_err(map_cdp)?;
        page.execute(inspector::EnableParams::default())
            .await
            .map_err(map_cdp)?;

        let closed = Arc::clone(&self.closed);
        self.spawn(tokio::spawn(async move {
            if crashed.next().await.is_some() {
                warn!("Page renderer crashed");
                closed.store(true, Ordering::SeqCst);
            }
        }));
        Ok(())
    }

    async fn install_blocking(&self, page: &Page, rules: BlockingRules) -> ScrapeResult<()> {
        let mut paused = page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(map_cdp)?;

        let interceptor = page.clone();
        self.spawn(tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let resource_type: &str = event.resource_type.as_ref();
                let outcome = if rules.allows(resource_type, &event.request.url) {
                    interceptor
                        .execute(ContinueRequestParams::new(event.request_id.clone()))
                        .await
                        .map(|_| ())
                } else {
                    interceptor
                        .execute(FailRequestParams::new(
                            event.request_id.clone(),
                            ErrorReason::BlockedByClient,
                        ))
                        .await
                        .map(|_| ())
                };
                if let Err(e) = outcome {
                    debug!("Request interception failed for {}: {}", event.request.url, e);
                }
            }
        }));

        page.execute(fetch::EnableParams {
            patterns: Some(vec![RequestPattern {
                url_pattern: Some("*".to_string()),
                resource_type: None,
                request_stage: Some(RequestStage::Request),
            }]),
            handle_auth_requests: None,
        })
        .await
        .map_err(map_cdp)?;
        Ok(())
    }

    async fn poll_until(&self, expression: &str, timeout: Duration, operation: &str) -> ScrapeResult<()> {
        let poll = async {
            loop {
                match self.evaluate(expression).await {
                    Ok(Value::Bool(true)) => return Ok(()),
                    Ok(_) => {}
                    Err(e @ ScrapeError::ResourceExhausted(_)) => return Err(e),
                    Err(e) => debug!("Predicate evaluation failed while {}: {}", operation, e),
                }
                if self.closed.load(Ordering::SeqCst) {
                    return Err(ScrapeError::Browser(format!("browser exited while {}", operation)));
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };

        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| ScrapeError::timeout(operation, timeout))?
    }
}

#[async_trait]
impl PageSession for ChromiumSession {
    async fn navigate(&self, url: &str, wait_until: WaitUntil, timeout: Duration) -> ScrapeResult<()> {
        let page = self.page()?;
        let mut dom_ready = page
            .event_listener::<EventDomContentEventFired>()
            .await
            .map_err(map_cdp)?;
        let mut loaded = page
            .event_listener::<EventLoadEventFired>()
            .await
            .map_err(map_cdp)?;

        let navigation = async {
            let response = page
                .execute(NavigateParams::new(url))
                .await
                .map_err(map_cdp)?;
            if let Some(error_text) = response.result.error_text.as_ref() {
                return Err(classify_driver_message(&format!("{} at {}", error_text, url)));
            }
            match wait_until {
                WaitUntil::DomContentLoaded => dom_ready.next().await.map(|_| ()),
                WaitUntil::Load => loaded.next().await.map(|_| ()),
            }
            .ok_or_else(|| ScrapeError::closed_at(Waypoint::Navigation))
        };

        let outcome = tokio::time::timeout(timeout, navigation)
            .await
            .map_err(|_| ScrapeError::timeout(format!("navigating to {}", url), timeout))
            .and_then(|r| r);

        match outcome {
            Err(e @ (ScrapeError::Browser(_) | ScrapeError::Transient(_))) => {
                let closed = self.is_closed().await;
                Err(navigation_failure(e, closed))
            }
            other => other,
        }
    }

    async fn wait_for_network_idle(&self, timeout: Duration) -> ScrapeResult<()> {
        let idle = async {
            while !self.network.is_idle() {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(timeout, idle)
            .await
            .map_err(|_| ScrapeError::timeout("waiting for network idle", timeout))
    }

    async fn capture_json(
        &self,
        signature: ResponseSignature,
        sink: mpsc::UnboundedSender<Value>,
    ) -> ScrapeResult<()> {
        let page = self.page()?;
        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(map_cdp)?;
        let mut finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(map_cdp)?;

        let reader = page.clone();
        self.spawn(tokio::spawn(async move {
            let mut ledger = CaptureLedger::default();
            loop {
                let ready = tokio::select! {
                    biased;
                    Some(event) = responses.next() => {
                        let url = &event.response.url;
                        ledger
                            .response(event.request_id.inner(), url, signature.matches(url))
                            .map(|url| (event.request_id.clone(), url))
                    }
                    Some(event) = finished.next() => ledger
                        .finished(event.request_id.inner())
                        .map(|url| (event.request_id.clone(), url)),
                    else => break,
                };
                let Some((request_id, url)) = ready else { continue };
                match read_json_body(&reader, request_id).await {
                    Ok(value) => {
                        if sink.send(value).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Failed to parse captured response from {}: {}", url, e),
                }
            }
        }));
        Ok(())
    }

    async fn current_url(&self) -> ScrapeResult<String> {
        Ok(self
            .page()?
            .url()
            .await
            .map_err(map_cdp)?
            .unwrap_or_default())
    }

    async fn content(&self) -> ScrapeResult<String> {
        self.page()?.content().await.map_err(map_cdp)
    }

    async fn title(&self) -> ScrapeResult<String> {
        Ok(self
            .page()?
            .get_title()
            .await
            .map_err(map_cdp)?
            .unwrap_or_default())
    }

    async fn evaluate(&self, expression: &str) -> ScrapeResult<Value> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(ScrapeError::Browser)?;

        let result = self
            .page()?
            .evaluate_expression(params)
            .await
            .map_err(map_cdp)?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn wait_for_selector(&self, selector: &str, state: ElementState, timeout: Duration) -> ScrapeResult<()> {
        let expression = scripts::selector_present(selector, state == ElementState::Visible);
        self.poll_until(&expression, timeout, &format!("waiting for {}", selector))
            .await
    }

    async fn wait_for_function(&self, predicate: &str, timeout: Duration) -> ScrapeResult<()> {
        self.poll_until(predicate, timeout, "waiting for page condition")
            .await
    }

    async fn click(&self, selector: &str) -> ScrapeResult<()> {
        match self.evaluate(&scripts::click(selector)).await? {
            Value::Bool(true) => Ok(()),
            _ => Err(ScrapeError::Browser(format!("no element to click for {}", selector))),
        }
    }

    async fn is_closed(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) || self.page.is_none() {
            return true;
        }
        let Some(page) = self.page.as_ref() else { return true };
        match tokio::time::timeout(LIVENESS_CHECK_TIMEOUT, page.evaluate_expression("1")).await {
            Ok(Ok(_)) => false,
            // A slow answer is a busy page, not a dead one.
            Err(_) => false,
            Ok(Err(e)) => target_gone(&e),
        }
    }

    async fn close(&self) -> ScrapeResult<()> {
        let browser = self.browser.lock().await.take();
        let Some(mut browser) = browser else {
            return Ok(());
        };

        let outcome = match browser.close().await {
            Ok(_) => browser.wait().await.map(|_| ()).map_err(|e| ScrapeError::Browser(e.to_string())),
            Err(e) => Err(map_cdp(e)),
        };

        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        self.closed.store(true, Ordering::SeqCst);
        outcome
    }
}

async fn read_json_body(page: &Page, request_id: network::RequestId) -> ScrapeResult<Value> {
    let response = page
        .execute(GetResponseBodyParams::new(request_id))
        .await
        .map_err(map_cdp)?;

    let body = if response.result.base64_encoded {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(response.result.body.as_bytes())
            .map_err(|e| ScrapeError::Browser(format!("invalid base64 body: {e}")))?;
        String::from_utf8_lossy(&bytes).into_owned()
    } else {
        response.result.body.clone()
    };

    Ok(serde_json::from_str(body.trim_start_matches('\u{feff}'))?)
}

/// A navigation failure on a page that is gone is exhaustion, never a retry.
fn navigation_failure(err: ScrapeError, page_closed: bool) -> ScrapeError {
    if page_closed {
        ScrapeError::ResourceExhausted(format!("page closed during navigation: {}", err))
    } else {
        err
    }
}

/// Whether a failed liveness evaluation means the target no longer exists.
fn target_gone(err: &CdpError) -> bool {
    match err {
        CdpError::Timeout => false,
        CdpError::NoResponse | CdpError::ChannelSendError(_) => true,
        other => closed_target_message(&other.to_string()),
    }
}

fn closed_target_message(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    ["target closed", "session closed", "no target with given id", "connection closed", "crashed"]
        .iter()
        .any(|marker| message.contains(marker))
}

fn map_cdp(err: CdpError) -> ScrapeError {
    match err {
        CdpError::Timeout => ScrapeError::timeout("waiting for a browser response", Duration::from_secs(30)),
        other => classify_driver_message(&other.to_string()),
    }
}
