use chrono::{DateTime, Duration, Utc};

use crate::domain::models::HistoryResponse;

/// Finals are often logged after midnight; shifting back keeps them on the
/// tournament's calendar day.
const LATE_FINISH_OFFSET_HOURS: i64 = 4;

/// Completion date from the first history entry carrying a start time.
///
/// `startTime` is in Unix seconds. The result is truncated to UTC midnight.
pub fn first_start_date(history: &HistoryResponse) -> Option<DateTime<Utc>> {
    history
        .list
        .iter()
        .filter_map(|entry| entry.start_time)
        .find(|&start| start > 0)
        .and_then(start_time_to_date)
}

fn start_time_to_date(start: i64) -> Option<DateTime<Utc>> {
    let started = DateTime::from_timestamp(start, 0)?;
    let shifted = started - Duration::hours(LATE_FINISH_OFFSET_HOURS);
    Some(shifted.date_naive().and_hms_opt(0, 0, 0)?.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn history(json: serde_json::Value) -> HistoryResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_skips_entries_without_start_time() {
        // 2025-03-15T18:00:00Z
        let h = history(serde_json::json!({"list": [
            {"startTime": 0},
            {"name": "no time"},
            {"startTime": 1742061600},
            {"startTime": 1700000000}
        ]}));
        assert_eq!(
            first_start_date(&h),
            Some(Utc.with_ymd_and_hms(2025, 3, 15, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_after_midnight_finish_counts_for_previous_day() {
        // 2025-03-16T02:30:00Z
        let h = history(serde_json::json!({"list": [{"startTime": "1742092200"}]}));
        assert_eq!(
            first_start_date(&h),
            Some(Utc.with_ymd_and_hms(2025, 3, 15, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_empty_history_has_no_date() {
        assert_eq!(first_start_date(&HistoryResponse::default()), None);
    }
}
