use log::debug;
use serde_json::Value;

use crate::domain::models::TournamentCandidate;

/// Candidates from one intercepted listing payload.
///
/// The payload is normally a bare array; a `{ "list": [...] }` wrapper is
/// accepted too. Entries that don't deserialize are skipped.
pub fn parse_candidates(payload: &Value) -> Vec<TournamentCandidate> {
    let Some(entries) = extract_entries(payload) else {
        debug!("Listing payload is not an array, ignoring");
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| match serde_json::from_value::<TournamentCandidate>(entry.clone()) {
            Ok(candidate) if !candidate.tdid.is_empty() => Some(candidate),
            Ok(_) => None,
            Err(e) => {
                debug!("Skipping malformed listing entry: {}", e);
                None
            }
        })
        .collect()
}

fn extract_entries(payload: &Value) -> Option<&Vec<Value>> {
    payload
        .as_array()
        .or_else(|| payload.get("list")?.as_array())
}
