use log::info;
use std::sync::Arc;

use crate::api::HistoryClient;
use crate::browser::BrowserDriver;
use crate::browser::chromium::ChromiumDriver;
use crate::config::{AppConfig, Operation, ScraperSettings};
use crate::domain::identifiers::MatchIdentifier;
use crate::domain::models::{MatchRecord, PlayerMatchResult, TournamentRecord};
use crate::errors::{ScrapeError, ScrapeResult};
use crate::fetchers::{
    DateResolver, MatchDiscovery, PlayerResultExtractor, TournamentDiscovery,
    tournament_id_from_href,
};
use crate::retry::RetryPolicy;
use crate::session::SessionManager;

/// The three produced operations. Every attempt runs in a fresh browser
/// session that is released before the attempt's outcome is inspected.
pub struct ExtractionService {
    config: AppConfig,
    sessions: SessionManager,
    tournaments: TournamentDiscovery,
    matches: MatchDiscovery,
    results: PlayerResultExtractor,
}

impl ExtractionService {
    pub fn new(config: AppConfig, driver: Arc<dyn BrowserDriver>) -> ScrapeResult<Self> {
        let settings = Arc::new(config.scraper.clone());
        let history = HistoryClient::new(config.scraper.clone())?;

        Ok(Self {
            sessions: SessionManager::new(driver),
            tournaments: TournamentDiscovery::new(
                Arc::clone(&settings),
                DateResolver::standard(Arc::clone(&settings), history),
            ),
            matches: MatchDiscovery::new(Arc::clone(&settings)),
            results: PlayerResultExtractor::new(settings),
            config,
        })
    }

    pub fn with_chromium(config: AppConfig) -> ScrapeResult<Self> {
        Self::new(config, Arc::new(ChromiumDriver::new()))
    }

    fn settings(&self) -> &ScraperSettings {
        &self.config.scraper
    }

    // --- Produced Operations ---

    pub async fn search_tournaments(&self, keyword: &str) -> ScrapeResult<Vec<TournamentRecord>> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(ScrapeError::InvalidInput("search keyword is empty".to_string()));
        }

        let policy = RetryPolicy::from(self.settings().search_retry);
        policy
            .run("tournament search", |_| self.search_attempt(keyword))
            .await
    }

    pub async fn list_matches(&self, tournament_href: &str) -> ScrapeResult<Vec<MatchRecord>> {
        let tournament_id = tournament_id_from_href(tournament_href)?;

        let policy = RetryPolicy::from(self.settings().matches_retry);
        let tournament_id = tournament_id.as_str();
        policy
            .run("match listing", |_| self.matches_attempt(tournament_href, tournament_id))
            .await
    }

    /// `max_attempts` overrides the configured ceiling for this call.
    pub async fn extract_player_results(
        &self,
        match_href: &str,
        match_identifier: &str,
        max_attempts: Option<u32>,
    ) -> ScrapeResult<[PlayerMatchResult; 2]> {
        let identifier = MatchIdentifier::parse(match_identifier)?;

        let mut policy = RetryPolicy::from(self.settings().results_retry);
        if let Some(max_attempts) = max_attempts {
            policy = policy.with_max_attempts(max_attempts);
        }
        let identifier = &identifier;
        policy
            .run("player results", |attempt| {
                info!("Extracting {} (attempt {}/{})", identifier, attempt, policy.max_attempts);
                self.results_attempt(match_href, identifier)
            })
            .await
    }

    // --- Single Attempts ---

    async fn search_attempt(&self, keyword: &str) -> ScrapeResult<Vec<TournamentRecord>> {
        let profile = self.config.profile_for(Operation::TournamentSearch);
        let mut session = self.sessions.acquire(&profile).await?;
        let outcome = match session.page() {
            Ok(page) => self.tournaments.discover(page, keyword).await,
            Err(e) => Err(e),
        };
        self.sessions.release(&mut session).await;
        outcome
    }

    async fn matches_attempt(&self, tournament_href: &str, tournament_id: &str) -> ScrapeResult<Vec<MatchRecord>> {
        let profile = self.config.profile_for(Operation::MatchListing);
        let mut session = self.sessions.acquire(&profile).await?;
        let outcome = match session.page() {
            Ok(page) => self.matches.discover(page, tournament_href, tournament_id).await,
            Err(e) => Err(e),
        };
        self.sessions.release(&mut session).await;
        outcome
    }

    async fn results_attempt(
        &self,
        match_href: &str,
        identifier: &MatchIdentifier,
    ) -> ScrapeResult<[PlayerMatchResult; 2]> {
        let profile = self.config.profile_for(Operation::PlayerResults);
        let mut session = self.sessions.acquire(&profile).await?;
        let outcome = match session.page() {
            Ok(page) => self.results.extract(page, match_href, identifier).await,
            Err(e) => Err(e),
        };
        self.sessions.release(&mut session).await;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDriver, FakePage};
    use chrono::{TimeDelta, Utc};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MATCH_HREF: &str = "https://n01darts.com/n01/tournament/n01_view.html?tmid=t_agawa_1_rr_2_PA_PB";
    const MATCH_ID: &str = "t_agawa_1_rr_2_PA_PB";

    fn config() -> AppConfig {
        let mut config = AppConfig::new();
        config.scraper.dom_settle = Duration::ZERO;
        config.scraper.click_settle = Duration::ZERO;
        config.scraper.history_rate_limit_ms = 0;
        for retry in [
            &mut config.scraper.search_retry,
            &mut config.scraper.matches_retry,
            &mut config.scraper.results_retry,
        ] {
            retry.base_delay = Duration::from_millis(1);
        }
        config
    }

    fn service(config: AppConfig, pages: Vec<FakePage>) -> (ExtractionService, Arc<FakeDriver>) {
        let driver = Arc::new(FakeDriver::new(pages));
        let service = ExtractionService::new(config, driver.clone()).unwrap();
        (service, driver)
    }

    fn stats_page(names: serde_json::Value) -> FakePage {
        FakePage::new()
            .with_evaluation(".name_text", names)
            .with_evaluation("const read", json!({"p1_legs": "3", "p2_legs": "1"}))
    }

    #[tokio::test]
    async fn test_malformed_identifier_never_launches_a_browser() {
        let (service, driver) = service(config(), vec![stats_page(json!(["A", "B"]))]);

        let err = service
            .extract_player_results(MATCH_HREF, "TID_rr_PA", None)
            .await
            .unwrap_err();

        assert!(matches!(err, ScrapeError::InvalidInput(_)));
        assert_eq!(driver.launch_count(), 0);
    }

    #[tokio::test]
    async fn test_wrong_name_count_is_fatal_and_tears_down() {
        for names in [json!(["Only One"]), json!(["A", "B", "C"])] {
            let pages = vec![stats_page(names.clone()), stats_page(json!(["A", "B"]))];
            let (service, driver) = service(config(), pages);

            let err = service
                .extract_player_results(MATCH_HREF, MATCH_ID, None)
                .await
                .unwrap_err();

            assert!(matches!(err, ScrapeError::UnexpectedLayout(_)), "{names}");
            assert_eq!(driver.launch_count(), 1);
            assert_eq!(driver.close_count(), 1);
        }
    }

    #[tokio::test]
    async fn test_timeouts_exhaust_the_ceiling_before_a_later_success() {
        let pages = vec![
            stats_page(json!(["A", "B"])).missing("#menu_stats"),
            stats_page(json!(["A", "B"])).missing("#menu_stats"),
            stats_page(json!(["A", "B"])).missing("#menu_stats"),
            stats_page(json!(["A", "B"])),
        ];
        let (service, driver) = service(config(), pages);

        let err = service
            .extract_player_results(MATCH_HREF, MATCH_ID, Some(3))
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(driver.launch_count(), 3);
        assert_eq!(driver.close_count(), 3);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_in_a_fresh_session() {
        let pages = vec![
            stats_page(json!(["A", "B"])).missing(".stats_table"),
            stats_page(json!(["Alice", "Bob"])),
        ];
        let (service, driver) = service(config(), pages);

        let [first, second] = service
            .extract_player_results(MATCH_HREF, MATCH_ID, None)
            .await
            .unwrap();

        assert_eq!(first.player_match_identifier, "t_agawa_1_rr_2_PA");
        assert_eq!((second.legs_won, second.legs_lost), (1, 3));
        assert_eq!(driver.launch_count(), 2);
        assert_eq!(driver.close_count(), 2);
        assert_eq!(driver.navigations(), vec![MATCH_HREF, MATCH_HREF]);
    }

    #[tokio::test]
    async fn test_closed_right_after_navigation_is_not_retried() {
        let pages = vec![
            stats_page(json!(["A", "B"])).closing_on_navigation(),
            stats_page(json!(["A", "B"])),
        ];
        let (service, driver) = service(config(), pages);

        let err = service
            .extract_player_results(MATCH_HREF, MATCH_ID, None)
            .await
            .unwrap_err();

        assert!(err.is_resource_exhausted());
        assert_eq!(driver.launch_count(), 1);
        assert_eq!(driver.close_count(), 1);
    }

    #[tokio::test]
    async fn test_memory_errors_during_navigation_are_not_retried() {
        let pages = vec![
            FakePage::new().failing_navigation(|| {
                crate::errors::classify_driver_message("net::ERR_INSUFFICIENT_RESOURCES")
            }),
            FakePage::new(),
        ];
        let (service, driver) = service(config(), pages);

        let err = service
            .list_matches("https://n01darts.com/n01/tournament/comp.php?id=t_agawa_1")
            .await
            .unwrap_err();

        assert!(err.is_resource_exhausted());
        assert_eq!(driver.launch_count(), 1);
    }

    #[tokio::test]
    async fn test_list_matches_requires_an_id_param() {
        let (service, driver) = service(config(), vec![FakePage::new()]);
        let err = service
            .list_matches("https://n01darts.com/n01/tournament/comp.php")
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidInput(_)));
        assert_eq!(driver.launch_count(), 0);
    }

    #[tokio::test]
    async fn test_list_matches_reads_group_stage() {
        let html = r#"
<div class="entry" tpid="PA"><span class="entry_name">Alice</span></div>
<div class="entry" tpid="PB"><span class="entry_name">Bob</span></div>
<div id="rr_container">
  <div class="rr_result view_button" ttype="rr" round="1" tpid="PB" vstpid="PA"><span class="r_avg">50.1</span></div>
</div>"#;
        let (service, driver) = service(config(), vec![FakePage::new().with_html(html)]);

        let matches = service
            .list_matches("https://n01darts.com/n01/tournament/comp.php?id=t_agawa_1")
            .await
            .unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].match_identifier, "t_agawa_1_rr_1_PA_PB");
        assert_eq!(matches[0].first_player_name, "Alice");
        assert_eq!(driver.close_count(), 1);
    }

    #[tokio::test]
    async fn test_agawa_search_end_to_end() {
        let server = MockServer::start().await;
        let recent = (Utc::now() - TimeDelta::days(20)).timestamp();
        let old = (Utc::now() - TimeDelta::days(500)).timestamp();
        for (tdid, start) in [("t_agawa_1", recent), ("t_agawa_2", recent), ("t_agawa_old", old)] {
            Mock::given(method("GET"))
                .and(path("/n01_history.php"))
                .and(query_param("tdid", tdid))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_string(format!(r#"{{"list":[{{"startTime":{}}}]}}"#, start)),
                )
                .mount(&server)
                .await;
        }

        let mut config = config();
        config.scraper.history_api_url = server.uri();
        let page = FakePage::new().with_capture(
            "https://n01darts.com/n01/tournament/n01_tournament.php?cmd=get_list&keyword=agawa",
            json!([
                {"tdid": "t_agawa_1", "title": "Agawa Cup", "status": 40},
                {"tdid": "t_agawa_2", "title": "Agawa Open", "status": 40},
                {"tdid": "t_agawa_3", "title": "Agawa Live", "status": 20}
            ]),
        );
        let (service, driver) = service(config, vec![page]);

        let records = service.search_tournaments("agawa").await.unwrap();

        let ids: Vec<&str> = records.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(ids, vec!["t_agawa_1", "t_agawa_2"]);
        assert_eq!(driver.launch_count(), 1);
        assert_eq!(driver.close_count(), 1);
        assert_eq!(
            driver.navigations(),
            vec!["https://n01darts.com/n01/tournament/?keyword=agawa"]
        );
    }

    #[tokio::test]
    async fn test_blank_keyword_is_invalid() {
        let (service, driver) = service(config(), vec![]);
        assert!(matches!(
            service.search_tournaments("   ").await,
            Err(ScrapeError::InvalidInput(_))
        ));
        assert_eq!(driver.launch_count(), 0);
    }
}
