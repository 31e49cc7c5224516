//! Completion-date resolution for tournaments.
//!
//! Each source of a date is an independent [`DateStrategy`]; the
//! [`DateResolver`] tries them in priority order and stops at the first hit.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use log::{debug, info, warn};
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::{Arc, LazyLock};
use tokio::sync::Mutex;

use crate::api::HistoryClient;
use crate::browser::{PageSession, WaitUntil, scripts};
use crate::config::ScraperSettings;
use crate::errors::ScrapeResult;

static SLASH_STAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{2})/(\d{2})/(\d{4})\s+\d{2}:\d{2}:\d{2}").expect("valid slash stamp regex")
});
static DOT_STAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{2})\.(\d{2})\.(\d{4})\s+\d{2}:\d{2}:\d{2}").expect("valid dot stamp regex")
});
static LOOSE_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2})[./](\d{1,2})[./](\d{4})").expect("valid loose date regex")
});
static TITLE_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})\.(\d{1,2})\.(\d{4})").expect("valid title date regex"));

const MATCH_TITLE_SELECTORS: &[&str] = &[".match_list_title_td", ".m_match_title"];
const GENERIC_CONTAINERS: &str = "div, span, td";
const WINDOW_DAYS: i64 = 365;

// --- Date Helpers ---

/// `oneYearAgo <= date < now`
pub fn within_window(date: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    let one_year_ago = now - TimeDelta::days(WINDOW_DAYS);
    one_year_ago <= date && date < now
}

fn midnight(day: u32, month: u32, year: i32) -> Option<DateTime<Utc>> {
    Some(
        NaiveDate::from_ymd_opt(year, month, day)?
            .and_hms_opt(0, 0, 0)?
            .and_utc(),
    )
}

/// Day, month and year from the first three capture groups of `regex` in `text`.
fn first_date(regex: &Regex, text: &str) -> Option<DateTime<Utc>> {
    regex.captures_iter(text).find_map(|caps| {
        let day = caps.get(1)?.as_str().parse().ok()?;
        let month = caps.get(2)?.as_str().parse().ok()?;
        let year = caps.get(3)?.as_str().parse().ok()?;
        midnight(day, month, year)
    })
}

/// First `DD/MM/YYYY HH:MM:SS` stamp in raw markup, else the dotted variant.
pub fn date_from_markup(html: &str) -> Option<DateTime<Utc>> {
    first_date(&SLASH_STAMP, html).or_else(|| first_date(&DOT_STAMP, html))
}

/// Date from the first match-title element, falling back to any generic
/// container whose text carries a timestamp.
pub fn date_from_match_titles(html: &str) -> Option<DateTime<Utc>> {
    let document = Html::parse_document(html);

    let titled = MATCH_TITLE_SELECTORS.iter().find_map(|raw| {
        let selector = Selector::parse(raw).ok()?;
        let text = document
            .select(&selector)
            .next()?
            .text()
            .collect::<String>();
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    });

    let text = titled.or_else(|| {
        let selector = Selector::parse(GENERIC_CONTAINERS).ok()?;
        document
            .select(&selector)
            .map(|el| el.text().collect::<String>())
            .find(|text| has_stamp(text.trim()))
    })?;

    first_date(&LOOSE_DATE, &text)
}

fn has_stamp(text: &str) -> bool {
    SLASH_STAMP.is_match(text) || DOT_STAMP.is_match(text)
}

pub fn date_from_title(title: &str) -> Option<DateTime<Utc>> {
    first_date(&TITLE_DATE, title)
}

/// Navigate to the tournament's results view unless the page is already there.
async fn ensure_results_view(
    page: &dyn PageSession,
    settings: &ScraperSettings,
    tournament_id: &str,
) -> ScrapeResult<()> {
    let url = settings.results_view_url(tournament_id);
    if page.current_url().await? == url {
        return Ok(());
    }

    debug!("Opening results view {}", url);
    page.navigate(&url, WaitUntil::DomContentLoaded, settings.search_navigation_timeout)
        .await?;
    if let Err(e) = page.wait_for_network_idle(settings.quiescence_ceiling).await {
        debug!("Results view never went quiet: {}", e);
    }
    Ok(())
}

// --- Strategies ---

#[async_trait]
pub trait DateStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` means this source has no date for the tournament.
    async fn resolve(
        &self,
        tournament_id: &str,
        page: &dyn PageSession,
    ) -> ScrapeResult<Option<DateTime<Utc>>>;
}

/// Tier 1: the history endpoint, queried directly.
pub struct HistoryQuery {
    client: Mutex<HistoryClient>,
}

impl HistoryQuery {
    pub fn new(client: HistoryClient) -> Self {
        Self {
            client: Mutex::new(client),
        }
    }
}

#[async_trait]
impl DateStrategy for HistoryQuery {
    fn name(&self) -> &'static str {
        "history query"
    }

    async fn resolve(&self, tournament_id: &str, _page: &dyn PageSession) -> ScrapeResult<Option<DateTime<Utc>>> {
        self.client.lock().await.completion_date(tournament_id).await
    }
}

/// Tier 2: timestamp in the results view's raw markup.
pub struct MarkupScan {
    settings: Arc<ScraperSettings>,
}

impl MarkupScan {
    pub fn new(settings: Arc<ScraperSettings>) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl DateStrategy for MarkupScan {
    fn name(&self) -> &'static str {
        "results markup"
    }

    async fn resolve(&self, tournament_id: &str, page: &dyn PageSession) -> ScrapeResult<Option<DateTime<Utc>>> {
        ensure_results_view(page, &self.settings, tournament_id).await?;
        let html = page.content().await?;
        Ok(date_from_markup(&html))
    }
}

/// Tier 3: wait for the results list to render, then read the first match title.
pub struct DynamicContent {
    settings: Arc<ScraperSettings>,
}

impl DynamicContent {
    pub fn new(settings: Arc<ScraperSettings>) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl DateStrategy for DynamicContent {
    fn name(&self) -> &'static str {
        "rendered match list"
    }

    async fn resolve(&self, tournament_id: &str, page: &dyn PageSession) -> ScrapeResult<Option<DateTime<Utc>>> {
        ensure_results_view(page, &self.settings, tournament_id).await?;

        match page
            .wait_for_function(scripts::DATE_STAMP_PRESENT, self.settings.dynamic_content_timeout)
            .await
        {
            Ok(()) => debug!("Match list populated for {}", tournament_id),
            Err(e) if e.is_timeout() => {
                debug!("Match list for {} never populated, reading what is there", tournament_id)
            }
            Err(e) => return Err(e),
        }

        let html = page.content().await?;
        Ok(date_from_match_titles(&html))
    }
}

/// Tier 4: a `DD.MM.YYYY` date in the page title.
pub struct TitleScan {
    settings: Arc<ScraperSettings>,
}

impl TitleScan {
    pub fn new(settings: Arc<ScraperSettings>) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl DateStrategy for TitleScan {
    fn name(&self) -> &'static str {
        "page title"
    }

    async fn resolve(&self, tournament_id: &str, page: &dyn PageSession) -> ScrapeResult<Option<DateTime<Utc>>> {
        ensure_results_view(page, &self.settings, tournament_id).await?;
        let title = page.title().await?;
        Ok(date_from_title(&title))
    }
}

// --- Resolver ---

pub struct DateResolver {
    strategies: Vec<Box<dyn DateStrategy>>,
}

impl DateResolver {
    pub fn new(strategies: Vec<Box<dyn DateStrategy>>) -> Self {
        Self { strategies }
    }

    /// The four production tiers in priority order.
    pub fn standard(settings: Arc<ScraperSettings>, history: HistoryClient) -> Self {
        Self::new(vec![
            Box::new(HistoryQuery::new(history)),
            Box::new(MarkupScan::new(Arc::clone(&settings))),
            Box::new(DynamicContent::new(Arc::clone(&settings))),
            Box::new(TitleScan::new(settings)),
        ])
    }

    /// Try each strategy in order. Failures of a single strategy are logged
    /// and treated as "no date", except resource exhaustion which aborts.
    pub async fn resolve(
        &self,
        tournament_id: &str,
        page: &dyn PageSession,
    ) -> ScrapeResult<Option<DateTime<Utc>>> {
        for strategy in &self.strategies {
            match strategy.resolve(tournament_id, page).await {
                Ok(Some(date)) => {
                    info!(
                        "Resolved date {} for {} from {}",
                        date.date_naive(),
                        tournament_id,
                        strategy.name()
                    );
                    return Ok(Some(date));
                }
                Ok(None) => debug!("No date for {} from {}", tournament_id, strategy.name()),
                Err(e) if e.is_resource_exhausted() => return Err(e),
                Err(e) => warn!(
                    "Date source '{}' failed for {}: {}",
                    strategy.name(),
                    tournament_id,
                    e
                ),
            }
        }

        warn!("Could not determine a date for tournament {}", tournament_id);
        Ok(None)
    }
}
