use log::{debug, info};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use crate::browser::{PageSession, WaitUntil};
use crate::config::ScraperSettings;
use crate::domain::identifiers::{MatchIdentifier, StageTag};
use crate::domain::models::MatchRecord;
use crate::errors::{ScrapeError, ScrapeResult};

static TOURNAMENT_ID_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]id=([^&#]+)").expect("valid id param regex"));

const UNKNOWN_PLAYER: &str = "Unknown";

/// Page structure of one tournament stage.
struct StageLayout {
    stage: StageTag,
    container: &'static str,
    items: &'static str,
    ttype: &'static str,
    /// Sub-element whose presence marks a pairing as played.
    played_marker: Option<&'static str>,
    /// The item carries the display name of its `tpid` side.
    names_own_side: bool,
}

const GROUP_STAGE: StageLayout = StageLayout {
    stage: StageTag::RoundRobin,
    container: "#rr_container",
    items: ".rr_result.view_button",
    ttype: "rr",
    played_marker: Some(".r_avg"),
    names_own_side: false,
};

const KNOCKOUT_STAGE: StageLayout = StageLayout {
    stage: StageTag::Knockout,
    container: "#bracket_container",
    items: r#".t_item.view_button[ttype="t"]"#,
    ttype: "t",
    played_marker: None,
    names_own_side: true,
};

/// Tournament code from the `id` query parameter of a tournament href.
pub fn tournament_id_from_href(href: &str) -> ScrapeResult<String> {
    TOURNAMENT_ID_PARAM
        .captures(href)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| {
            ScrapeError::InvalidInput(format!("could not extract tournament id from '{}'", href))
        })
}

/// Played matches of a tournament, group stage first
pub struct MatchDiscovery {
    settings: Arc<ScraperSettings>,
}

impl MatchDiscovery {
    pub fn new(settings: Arc<ScraperSettings>) -> Self {
        Self { settings }
    }

    pub async fn discover(
        &self,
        page: &dyn PageSession,
        tournament_href: &str,
        tournament_id: &str,
    ) -> ScrapeResult<Vec<MatchRecord>> {
        info!("Loading tournament page {}", tournament_href);
        page.navigate(
            tournament_href,
            WaitUntil::DomContentLoaded,
            self.settings.match_navigation_timeout,
        )
        .await?;
        if let Err(e) = page.wait_for_network_idle(self.settings.quiescence_ceiling).await {
            debug!("Tournament page still busy: {}", e);
        }

        let (group, knockout) = tokio::join!(
            self.scan(page, &GROUP_STAGE, tournament_id),
            self.scan(page, &KNOCKOUT_STAGE, tournament_id)
        );

        let mut matches = group?;
        matches.extend(knockout?);
        info!("Found {} matches for tournament {}", matches.len(), tournament_id);
        Ok(matches)
    }

    async fn scan(&self, page: &dyn PageSession, layout: &StageLayout, tournament_id: &str) -> ScrapeResult<Vec<MatchRecord>> {
        let html = page.content().await?;
        let matches = parse_stage(&html, layout, tournament_id, &self.settings);
        info!("{} stage: {} matches", layout.stage, matches.len());
        Ok(matches)
    }
}

// --- Markup Parsing ---

fn parse_stage(html: &str, layout: &StageLayout, tournament_id: &str, settings: &ScraperSettings) -> Vec<MatchRecord> {
    let document = Html::parse_document(html);

    let (Ok(container), Ok(items)) = (Selector::parse(layout.container), Selector::parse(layout.items)) else {
        return Vec::new();
    };
    if document.select(&container).next().is_none() {
        debug!("No {} on page, skipping {} stage", layout.container, layout.stage);
        return Vec::new();
    }

    let played_marker = layout.played_marker.and_then(|m| Selector::parse(m).ok());
    let mut seen = HashSet::new();
    let mut matches = Vec::new();

    for item in document.select(&items) {
        let attr = |name: &str| item.value().attr(name).map(str::trim).filter(|v| !v.is_empty());

        if attr("ttype") != Some(layout.ttype) {
            continue;
        }
        let (Some(tpid), Some(vstpid)) = (attr("tpid"), attr("vstpid")) else {
            continue;
        };
        if tpid == vstpid {
            continue;
        }
        if let Some(marker) = &played_marker {
            if item.select(marker).next().is_none() {
                continue;
            }
        }

        let round = attr("round").unwrap_or("0");
        let identifier = MatchIdentifier::synthesize(tournament_id, layout.stage, round, tpid, vstpid);
        let match_identifier = identifier.to_string();
        if !seen.insert(match_identifier.clone()) {
            continue;
        }

        let own_name = if layout.names_own_side {
            entry_name(item)
        } else {
            None
        };
        let name_of = |code: &str| {
            if code == tpid {
                own_name.clone().unwrap_or_else(|| player_name(&document, code))
            } else {
                player_name(&document, code)
            }
        };

        matches.push(MatchRecord {
            first_player_name: name_of(&identifier.first_player_code),
            second_player_name: name_of(&identifier.second_player_code),
            match_type: layout.stage.match_type(attr("subtitle")),
            source_href: settings.match_url(&match_identifier),
            first_player_code: identifier.first_player_code.clone(),
            second_player_code: identifier.second_player_code.clone(),
            match_identifier,
        });
    }

    matches
}

fn entry_name(element: ElementRef<'_>) -> Option<String> {
    let selector = Selector::parse(".entry_name").ok()?;
    let text = element.select(&selector).next()?.text().collect::<String>();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Display name of the entrant with `code`, or the placeholder.
fn player_name(document: &Html, code: &str) -> String {
    if code.contains(['"', '\\']) {
        return UNKNOWN_PLAYER.to_string();
    }
    Selector::parse(&format!(r#"[tpid="{}"] .entry_name"#, code))
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .find_map(|el| {
                    let text = el.text().collect::<String>();
                    let text = text.trim();
                    (!text.is_empty()).then(|| text.to_string())
                })
        })
        .unwrap_or_else(|| UNKNOWN_PLAYER.to_string())
}
