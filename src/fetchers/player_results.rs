use log::{debug, info};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::browser::{ElementState, PageSession, WaitUntil, scripts};
use crate::config::ScraperSettings;
use crate::domain::identifiers::MatchIdentifier;
use crate::domain::models::PlayerMatchResult;
use crate::domain::stats::{SLOT_FIELDS, StatsSheet};
use crate::errors::{ScrapeError, ScrapeResult, Waypoint};

const ARTICLE: &str = "article";
const STATS_MENU: &str = "#menu_stats";
const STATS_FRAME: &str = "#stats_frame";
const STATS_TABLE: &str = ".stats_table";
const READY_FIELD: &str = "#p1_legs";
const PLAYER_NAMES: &str = ".name_text";
const INTERSTITIAL_MARKERS: &[&str] = &["Just a moment", "Cloudflare"];

/// Reads the statistics view of a single match page
pub struct PlayerResultExtractor {
    settings: Arc<ScraperSettings>,
}

impl PlayerResultExtractor {
    pub fn new(settings: Arc<ScraperSettings>) -> Self {
        Self { settings }
    }

    pub async fn extract(
        &self,
        page: &dyn PageSession,
        match_href: &str,
        identifier: &MatchIdentifier,
    ) -> ScrapeResult<[PlayerMatchResult; 2]> {
        self.open_match_page(page, match_href).await?;
        self.open_stats_view(page).await?;

        let names = self.read_player_names(page).await?;
        debug!("Players of {}: {} vs {}", identifier, names[0], names[1]);

        let sheet = self.read_stats_sheet(page).await?;
        let results = sheet.player_results(identifier);
        info!("Extracted results for match {}", identifier);
        Ok(results)
    }

    // --- Page Protocol ---

    async fn open_match_page(&self, page: &dyn PageSession, match_href: &str) -> ScrapeResult<()> {
        info!("Loading match page {}", match_href);
        page.navigate(match_href, WaitUntil::DomContentLoaded, self.settings.results_navigation_timeout)
            .await?;
        ensure_open(page, Waypoint::Navigation).await?;

        tokio::time::sleep(self.settings.dom_settle).await;
        self.pass_interstitial(page).await?;

        self.wait_visible(page, ARTICLE, self.settings.element_timeout)
            .await?;
        ensure_open(page, Waypoint::ArticleLoaded).await
    }

    /// Give an anti-bot challenge page time to hand over to the real content.
    async fn pass_interstitial(&self, page: &dyn PageSession) -> ScrapeResult<()> {
        let title = page.title().await?;
        if !INTERSTITIAL_MARKERS.iter().any(|m| title.contains(m)) {
            return Ok(());
        }

        info!("Interstitial detected ('{}'), waiting for content", title);
        match self
            .wait_visible(page, ARTICLE, self.settings.interstitial_timeout)
            .await
        {
            Err(e) if e.is_timeout() => {
                debug!("Interstitial wait timed out, continuing");
                Ok(())
            }
            other => other,
        }
    }

    async fn open_stats_view(&self, page: &dyn PageSession) -> ScrapeResult<()> {
        self.wait_visible(page, STATS_MENU, self.settings.element_timeout)
            .await?;
        page.click(STATS_MENU).await?;
        tokio::time::sleep(self.settings.click_settle).await;
        ensure_open(page, Waypoint::StatsClicked).await?;

        page.wait_for_selector(STATS_FRAME, ElementState::Attached, self.settings.element_timeout)
            .await?;
        page.wait_for_function(
            &scripts::frame_selector_present(STATS_FRAME, STATS_TABLE),
            self.settings.element_timeout,
        )
        .await?;
        page.wait_for_function(
            &scripts::frame_text_populated(STATS_FRAME, READY_FIELD),
            self.settings.element_timeout,
        )
        .await?;
        ensure_open(page, Waypoint::StatsFrameLoaded).await
    }

    async fn wait_visible(&self, page: &dyn PageSession, selector: &str, timeout: Duration) -> ScrapeResult<()> {
        page.wait_for_selector(selector, ElementState::Visible, timeout)
            .await
    }

    // --- Frame Reading ---

    async fn read_player_names(&self, page: &dyn PageSession) -> ScrapeResult<[String; 2]> {
        let value = page
            .evaluate(&scripts::frame_texts(STATS_FRAME, PLAYER_NAMES))
            .await?;
        player_names(&value)
    }

    async fn read_stats_sheet(&self, page: &dyn PageSession) -> ScrapeResult<StatsSheet> {
        let value = page
            .evaluate(&scripts::frame_field_texts(STATS_FRAME, &stats_field_selectors()))
            .await?;
        Ok(StatsSheet::new(field_texts(&value)))
    }
}

async fn ensure_open(page: &dyn PageSession, waypoint: Waypoint) -> ScrapeResult<()> {
    if page.is_closed().await {
        return Err(ScrapeError::closed_at(waypoint));
    }
    Ok(())
}

/// Field key to selector, for both player slots.
fn stats_field_selectors() -> Vec<(String, String)> {
    let mut fields = Vec::new();
    for slot in 1..=2 {
        for field in SLOT_FIELDS {
            let key = format!("p{}_{}", slot, field);
            fields.push((key.clone(), format!("#{}", key)));
        }
    }
    fields.push(("p1_checkout".to_string(), ".detail.checkout .left".to_string()));
    fields.push(("p2_checkout".to_string(), ".detail.checkout .right".to_string()));
    fields
}

fn player_names(value: &Value) -> ScrapeResult<[String; 2]> {
    let names: Vec<String> = value
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|v| v.as_str().unwrap_or_default().to_string())
                .collect()
        })
        .unwrap_or_default();

    match <[String; 2]>::try_from(names) {
        Ok(pair) => Ok(pair),
        Err(names) => Err(ScrapeError::UnexpectedLayout(format!(
            "expected 2 player names, found {}",
            names.len()
        ))),
    }
}

fn field_texts(value: &Value) -> HashMap<String, String> {
    value
        .as_object()
        .map(|fields| {
            fields
                .iter()
                .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
                .collect()
        })
        .unwrap_or_default()
}
