use crate::api::parsers;
use crate::config::ScraperSettings;
use crate::domain::models::HistoryResponse;
use crate::errors::ScrapeResult;
use crate::http::RateLimitedClient;
use chrono::{DateTime, Utc};
use log::{debug, info};

/// Client for the per-tournament match history endpoint
pub struct HistoryClient {
    client: RateLimitedClient,
    settings: ScraperSettings,
}

impl HistoryClient {
    pub fn new(settings: ScraperSettings) -> ScrapeResult<Self> {
        let client = RateLimitedClient::new(
            settings.user_agent,
            settings.history_timeout_secs,
            settings.history_rate_limit_ms,
        )?;
        Ok(Self { client, settings })
    }

    /// Fetch the recorded match history of a tournament
    pub async fn fetch_history(&mut self, tournament_id: &str) -> ScrapeResult<HistoryResponse> {
        let url = self.settings.history_url(tournament_id);
        debug!("Fetching match history for {} from {}", tournament_id, url);

        let history: HistoryResponse = self.client.get_json(&url).await?;
        debug!(
            "History for {} has {} entries",
            tournament_id,
            history.list.len()
        );
        Ok(history)
    }

    /// Completion date derived from the first timed history entry
    pub async fn completion_date(&mut self, tournament_id: &str) -> ScrapeResult<Option<DateTime<Utc>>> {
        let history = self.fetch_history(tournament_id).await?;
        let date = parsers::first_start_date(&history);
        if date.is_none() && !history.list.is_empty() {
            info!(
                "History for {} has {} entries but none with a start time",
                tournament_id,
                history.list.len()
            );
        }
        Ok(date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ScrapeError;
    use chrono::TimeZone;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> HistoryClient {
        let settings = ScraperSettings {
            history_api_url: server.uri(),
            history_rate_limit_ms: 0,
            ..ScraperSettings::default()
        };
        HistoryClient::new(settings).unwrap()
    }

    #[tokio::test]
    async fn test_completion_date_from_history_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/n01_history.php"))
            .and(query_param("cmd", "get_t_list"))
            .and(query_param("tdid", "t_agawa_1"))
            .and(query_param("count", "30"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"list":[{"startTime":0},{"startTime":1742061600}]}"#,
            ))
            .mount(&server)
            .await;

        let mut client = client_for(&server);
        let date = client.completion_date("t_agawa_1").await.unwrap();
        assert_eq!(date, Some(Utc.with_ymd_and_hms(2025, 3, 15, 0, 0, 0).unwrap()));
    }

    #[tokio::test]
    async fn test_missing_list_means_no_date() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"result":0}"#))
            .mount(&server)
            .await;

        let mut client = client_for(&server);
        assert_eq!(client.completion_date("t_x").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_non_json_body_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let mut client = client_for(&server);
        let err = client.completion_date("t_x").await.unwrap_err();
        assert!(matches!(err, ScrapeError::Json(_)));
    }
}
