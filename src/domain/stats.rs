use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::domain::identifiers::MatchIdentifier;
use crate::domain::models::PlayerMatchResult;

static LEADING_FLOAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)").expect("valid float regex"));
static LEADING_INT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?\d+").expect("valid int regex"));
static CHECKOUT_PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([\d.]+)%").expect("valid checkout regex"));

/// Raw per-slot field names read from the statistics frame.
pub const SLOT_FIELDS: &[&str] = &[
    "legs", "score", "first9", "60", "80", "ton00", "ton20", "ton40", "ton70", "ton80",
    "highout", "best", "worst",
];

/// Parse a continuous metric from its leading numeric literal.
/// Decimal commas are accepted.
pub fn parse_decimal(text: &str) -> Option<f64> {
    let cleaned = text.trim().replace(',', ".");
    LEADING_FLOAT
        .find(&cleaned)
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Parse a count from its leading integer literal, 0 when absent.
pub fn parse_count(text: &str) -> i64 {
    LEADING_INT
        .find(text.trim())
        .and_then(|m| m.as_str().parse::<i64>().ok())
        .unwrap_or(0)
}

/// Checkout percentage from a mixed field such as `"42.86% (3/7)"`.
pub fn parse_checkout(text: &str) -> Option<f64> {
    let captures = CHECKOUT_PERCENT.captures(text.trim())?;
    captures.get(1)?.as_str().parse::<f64>().ok()
}

/// Text of the statistics frame, keyed by field id (`p1_legs`, `p2_ton80`, ...)
/// plus `p1_checkout` / `p2_checkout`.
#[derive(Debug, Clone, Default)]
pub struct StatsSheet {
    fields: HashMap<String, String>,
}

impl StatsSheet {
    pub fn new(fields: HashMap<String, String>) -> Self {
        Self { fields }
    }

    fn get(&self, slot: usize, field: &str) -> &str {
        self.fields
            .get(&format!("p{}_{}", slot, field))
            .map(String::as_str)
            .unwrap_or("")
    }

    fn count(&self, slot: usize, field: &str) -> i64 {
        parse_count(self.get(slot, field))
    }

    /// Derive the aggregate result for `slot` (1 or 2).
    pub fn player_result(&self, slot: usize, identifier: &MatchIdentifier) -> PlayerMatchResult {
        let opponent = if slot == 1 { 2 } else { 1 };
        let player_code = identifier.player_codes()[slot - 1];

        PlayerMatchResult {
            player_match_identifier: identifier.player_identifier(player_code),
            average_score: parse_decimal(self.get(slot, "score")),
            first_nine_average: parse_decimal(self.get(slot, "first9")),
            checkout_percentage: parse_checkout(self.get(slot, "checkout")),
            score_band60_count: self.count(slot, "60").saturating_add(self.count(slot, "80")),
            score_band100_count: self.count(slot, "ton00").saturating_add(self.count(slot, "ton20")),
            score_band140_count: self.count(slot, "ton40").saturating_add(self.count(slot, "ton70")),
            score_band180_count: self.count(slot, "ton80"),
            high_finish: self.count(slot, "highout"),
            best_leg: self.count(slot, "best"),
            worst_leg: self.count(slot, "worst"),
            legs_won: self.count(slot, "legs"),
            legs_lost: self.count(opponent, "legs"),
        }
    }

    pub fn player_results(&self, identifier: &MatchIdentifier) -> [PlayerMatchResult; 2] {
        [self.player_result(1, identifier), self.player_result(2, identifier)]
    }
}
