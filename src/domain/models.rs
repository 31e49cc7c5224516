use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Lifecycle state of a discovered tournament. Only completed ones are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TournamentStatus {
    Completed,
}

/// Completed tournament found by keyword search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentRecord {
    pub identifier: String,
    pub name: String,
    pub source_href: String,
    pub completion_date: DateTime<Utc>,
    pub status: TournamentStatus,
}

/// A played pairing from the group stage or the knockout bracket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    pub match_identifier: String,
    pub match_type: String,
    pub first_player_name: String,
    pub first_player_code: String,
    pub second_player_name: String,
    pub second_player_code: String,
    pub source_href: String,
}

/// Aggregate statistics of one player in one match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerMatchResult {
    pub player_match_identifier: String,
    pub average_score: Option<f64>,
    pub first_nine_average: Option<f64>,
    pub checkout_percentage: Option<f64>,
    pub score_band60_count: i64,
    pub score_band100_count: i64,
    pub score_band140_count: i64,
    pub score_band180_count: i64,
    pub high_finish: i64,
    pub best_leg: i64,
    pub worst_leg: i64,
    pub legs_won: i64,
    pub legs_lost: i64,
}

// --- Site Payload Structures ---

/// One entry of the intercepted tournament listing payload
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TournamentCandidate {
    #[serde(default, deserialize_with = "lenient_string")]
    pub tdid: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub status: Option<i64>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub t_date: Option<i64>,
    #[serde(rename = "createTime", default, deserialize_with = "lenient_int")]
    pub create_time: Option<i64>,
}

impl TournamentCandidate {
    pub fn is_completed(&self, completed_status: i64) -> bool {
        !self.tdid.is_empty() && self.status == Some(completed_status)
    }

    pub fn display_name(&self) -> String {
        self.title
            .as_ref()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| "Unknown Tournament".to_string())
    }
}

/// Response of the per-tournament history query
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub list: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "startTime", default, deserialize_with = "lenient_int")]
    pub start_time: Option<i64>,
}

// The site's PHP endpoints are loose about numbers vs. numeric strings.
fn lenient_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    })
}
