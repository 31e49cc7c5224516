use std::fmt;

use crate::errors::ScrapeError;

/// Stage of a tournament a match belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageTag {
    RoundRobin,
    Knockout,
}

impl StageTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageTag::RoundRobin => "rr",
            StageTag::Knockout => "t",
        }
    }

    /// Sub-classification stored in `MatchRecord::match_type`.
    pub fn match_type(&self, subtitle: Option<&str>) -> String {
        match self {
            StageTag::RoundRobin => "rr".to_string(),
            StageTag::Knockout => {
                let slug = subtitle
                    .map(|s| s.split_whitespace().collect::<Vec<_>>().join("_").to_lowercase())
                    .unwrap_or_default();
                if slug.is_empty() {
                    "t_unknown".to_string()
                } else {
                    format!("t_{}", slug)
                }
            }
        }
    }
}

impl fmt::Display for StageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A match identifier in its decomposed form:
/// `{tournament}_{stage}_{round}_{lowerCode}_{higherCode}`.
///
/// The tournament part may itself contain underscores, so decomposition
/// anchors on the four trailing components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchIdentifier {
    pub tournament_id: String,
    pub stage: String,
    pub round: String,
    pub first_player_code: String,
    pub second_player_code: String,
}

impl MatchIdentifier {
    /// Build an identifier for a pairing. The two codes are ordered
    /// lexicographically so either side of the pairing yields the same id.
    pub fn synthesize(tournament_id: &str, stage: StageTag, round: &str, a: &str, b: &str) -> Self {
        let (lower, higher) = if a <= b { (a, b) } else { (b, a) };
        Self {
            tournament_id: tournament_id.to_string(),
            stage: stage.as_str().to_string(),
            round: round.to_string(),
            first_player_code: lower.to_string(),
            second_player_code: higher.to_string(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ScrapeError> {
        let parts: Vec<&str> = raw.split('_').collect();
        if parts.len() < 5 {
            return Err(ScrapeError::InvalidInput(format!(
                "match identifier '{}' has {} underscore-delimited parts, expected at least 5",
                raw,
                parts.len()
            )));
        }

        let n = parts.len();
        let tournament_id = parts[..n - 4].join("_");
        if tournament_id.is_empty() || parts[n - 2].is_empty() || parts[n - 1].is_empty() {
            return Err(ScrapeError::InvalidInput(format!(
                "match identifier '{}' has empty components",
                raw
            )));
        }

        Ok(Self {
            tournament_id,
            stage: parts[n - 4].to_string(),
            round: parts[n - 3].to_string(),
            first_player_code: parts[n - 2].to_string(),
            second_player_code: parts[n - 1].to_string(),
        })
    }

    /// `{tournament}_{stage}_{round}_{playerCode}` for one side of the match.
    pub fn player_identifier(&self, player_code: &str) -> String {
        format!(
            "{}_{}_{}_{}",
            self.tournament_id, self.stage, self.round, player_code
        )
    }

    pub fn player_codes(&self) -> [&str; 2] {
        [&self.first_player_code, &self.second_player_code]
    }
}

impl fmt::Display for MatchIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}_{}",
            self.tournament_id,
            self.stage,
            self.round,
            self.first_player_code,
            self.second_player_code
        )
    }
}
