use chrono::{DateTime, Utc};
use log::{debug, info};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::api::parsers;
use crate::browser::{PageSession, ResponseSignature, WaitUntil};
use crate::config::ScraperSettings;
use crate::domain::models::{TournamentCandidate, TournamentRecord, TournamentStatus};
use crate::errors::ScrapeResult;
use crate::fetchers::dates::{DateResolver, within_window};

const LISTING_SIGNATURE: [&str; 2] = ["n01_tournament.php", "cmd=get_list"];

/// Keyword search over the site's tournament listing
pub struct TournamentDiscovery {
    settings: Arc<ScraperSettings>,
    resolver: DateResolver,
}

impl TournamentDiscovery {
    pub fn new(settings: Arc<ScraperSettings>, resolver: DateResolver) -> Self {
        Self { settings, resolver }
    }

    /// Completed tournaments matching `keyword` whose date falls in the
    /// trailing one-year window.
    pub async fn discover(&self, page: &dyn PageSession, keyword: &str) -> ScrapeResult<Vec<TournamentRecord>> {
        self.discover_at(page, keyword, Utc::now()).await
    }

    pub async fn discover_at(
        &self,
        page: &dyn PageSession,
        keyword: &str,
        now: DateTime<Utc>,
    ) -> ScrapeResult<Vec<TournamentRecord>> {
        let candidates = self.collect_candidates(page, keyword).await?;
        if candidates.is_empty() {
            info!("No tournaments intercepted for '{}'", keyword);
            return Ok(Vec::new());
        }

        let completed: Vec<TournamentCandidate> = candidates
            .into_iter()
            .filter(|c| c.is_completed(self.settings.completed_status))
            .collect();
        info!("{} completed candidates for '{}'", completed.len(), keyword);

        let mut records = Vec::new();
        for candidate in completed {
            if let Some(record) = self.build_record(page, &candidate, now).await? {
                records.push(record);
            }
        }

        info!("Found {} tournaments for '{}'", records.len(), keyword);
        Ok(records)
    }

    // --- Candidate Collection ---

    async fn collect_candidates(&self, page: &dyn PageSession, keyword: &str) -> ScrapeResult<Vec<TournamentCandidate>> {
        let (sink, mut buffer) = mpsc::unbounded_channel::<Value>();
        page.capture_json(ResponseSignature::new(LISTING_SIGNATURE), sink)
            .await?;

        let url = self.settings.search_url(keyword);
        info!("Searching tournaments: {}", url);
        page.navigate(&url, WaitUntil::DomContentLoaded, self.settings.search_navigation_timeout)
            .await?;

        if let Err(e) = page.wait_for_network_idle(self.settings.quiescence_ceiling).await {
            if !e.is_timeout() {
                return Err(e);
            }
            debug!("Search page still busy after {:?}, using what was captured", self.settings.quiescence_ceiling);
        }

        let mut payloads = Vec::new();
        while let Ok(payload) = buffer.try_recv() {
            payloads.push(payload);
        }
        let candidates = union_candidates(&payloads);
        info!(
            "Intercepted {} candidates from {} listing responses",
            candidates.len(),
            payloads.len()
        );
        Ok(candidates)
    }

    // --- Record Construction ---

    async fn build_record(
        &self,
        page: &dyn PageSession,
        candidate: &TournamentCandidate,
        now: DateTime<Utc>,
    ) -> ScrapeResult<Option<TournamentRecord>> {
        debug!(
            "Candidate {} (t_date={:?}, createTime={:?})",
            candidate.tdid, candidate.t_date, candidate.create_time
        );

        let Some(date) = self.resolver.resolve(&candidate.tdid, page).await? else {
            return Ok(None);
        };

        if !within_window(date, now) {
            debug!(
                "Skipping {}: date {} outside the trailing year",
                candidate.tdid,
                date.date_naive()
            );
            return Ok(None);
        }

        Ok(Some(TournamentRecord {
            identifier: candidate.tdid.clone(),
            name: candidate.display_name(),
            source_href: self.settings.tournament_url(&candidate.tdid),
            completion_date: date,
            status: TournamentStatus::Completed,
        }))
    }
}

/// Union of every observed payload, first observation of a `tdid` wins.
fn union_candidates(payloads: &[Value]) -> Vec<TournamentCandidate> {
    let mut seen = HashSet::new();
    payloads
        .iter()
        .flat_map(parsers::parse_candidates)
        .filter(|c| seen.insert(c.tdid.clone()))
        .collect()
}
