//! The persisted progress record.

use chrono::NaiveDate;
use indexmap::IndexSet;
use serde::{Deserialize, Deserializer, Serialize};

/// Date format written to storage.
const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

/// Older records stored the browser's `Date.toDateString()` form.
const LEGACY_DATE_FORMAT: &str = "%a %b %d %Y";

/// Everything the tracker persists between sessions.
///
/// Missing or unknown fields fall back to their defaults when loading,
/// so older and newer records both merge cleanly over a fresh state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProgressState {
    /// Demo types that have been completed.
    pub completed_demos: IndexSet<String>,
    /// Achievement ids that have been unlocked.
    pub achievements: IndexSet<String>,
    /// Minutes spent in finished sessions.
    pub time_spent: u64,
    /// Points from exercises, achievements and demo bonuses.
    pub skill_points: u32,
    /// Consecutive calendar days with at least one session.
    pub streak_days: u32,
    /// Calendar day of the most recent session start.
    #[serde(deserialize_with = "deserialize_access_date")]
    pub last_access_date: Option<NaiveDate>,
    /// Exercises marked as completed.
    pub exercises_completed: u32,
    /// Counted simulator runs.
    pub code_executions: u32,
    /// Exercises completed with errors.
    pub mistakes_made: u32,
    /// Hints requested.
    pub hints_used: u32,
}

impl ProgressState {
    /// Creates an empty progress record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `demo_type` has been completed.
    #[must_use]
    pub fn has_completed(&self, demo_type: &str) -> bool {
        self.completed_demos.contains(demo_type)
    }

    /// Returns `true` if achievement `id` has been unlocked.
    #[must_use]
    pub fn has_achievement(&self, id: &str) -> bool {
        self.achievements.contains(id)
    }
}

/// Accepts ISO dates and the legacy `Mon Oct 19 2026` form.
///
/// Anything else (including `null`) loads as "no prior date" rather than
/// failing the whole record.
fn deserialize_access_date<'de, D>(deserializer: D) -> std::result::Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .and_then(parse_access_date))
}

/// Parses a stored access date in either supported format.
#[must_use]
pub fn parse_access_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, ISO_DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(raw, LEGACY_DATE_FORMAT))
        .ok()
}

/// Computes the streak after a session starts on `today`.
///
/// - same day (or a clock that moved backwards): unchanged
/// - exactly one day later: incremented
/// - longer gap or no prior date: reset to 1
#[must_use]
pub fn next_streak(last_access: Option<NaiveDate>, today: NaiveDate, streak_days: u32) -> u32 {
    let Some(last) = last_access else {
        return 1;
    };
    match (today - last).num_days() {
        days if days <= 0 => streak_days,
        1 => streak_days.saturating_add(1),
        _ => 1,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // ------------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------------

    #[test]
    fn test_serialized_field_names_are_camel_case() {
        let mut state = ProgressState::new();
        state.completed_demos.insert("variables".to_string());
        state.last_access_date = Some(date(2026, 10, 19));

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["completedDemos"], serde_json::json!(["variables"]));
        assert_eq!(json["lastAccessDate"], "2026-10-19");
        assert_eq!(json["skillPoints"], 0);
        assert!(json.get("hintsUsed").is_some());
    }

    #[test]
    fn test_round_trip_preserves_all_fields() {
        let state = ProgressState {
            completed_demos: ["variables", "git"].iter().map(ToString::to_string).collect(),
            achievements: ["first-step"].iter().map(ToString::to_string).collect(),
            time_spent: 42,
            skill_points: 25,
            streak_days: 3,
            last_access_date: Some(date(2026, 2, 28)),
            exercises_completed: 4,
            code_executions: 12,
            mistakes_made: 1,
            hints_used: 2,
        };

        let json = serde_json::to_string(&state).unwrap();
        let restored: ProgressState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn test_partial_record_merges_over_defaults() {
        let restored: ProgressState =
            serde_json::from_str(r#"{"skillPoints": 40, "futureField": true}"#).unwrap();
        assert_eq!(restored.skill_points, 40);
        assert!(restored.completed_demos.is_empty());
        assert_eq!(restored.streak_days, 0);
    }

    #[test]
    fn test_duplicate_demo_entries_collapse() {
        let restored: ProgressState =
            serde_json::from_str(r#"{"completedDemos": ["git", "git", "variables"]}"#).unwrap();
        assert_eq!(restored.completed_demos.len(), 2);
    }

    #[test]
    fn test_legacy_and_invalid_access_dates() {
        let legacy: ProgressState =
            serde_json::from_str(r#"{"lastAccessDate": "Mon Oct 19 2026"}"#).unwrap();
        assert_eq!(legacy.last_access_date, Some(date(2026, 10, 19)));

        let garbage: ProgressState =
            serde_json::from_str(r#"{"lastAccessDate": "yesterday-ish"}"#).unwrap();
        assert_eq!(garbage.last_access_date, None);

        let null: ProgressState = serde_json::from_str(r#"{"lastAccessDate": null}"#).unwrap();
        assert_eq!(null.last_access_date, None);
    }

    // ------------------------------------------------------------------------
    // Streaks
    // ------------------------------------------------------------------------

    #[test]
    fn test_streak_first_session() {
        assert_eq!(next_streak(None, date(2026, 1, 1), 0), 1);
    }

    #[test]
    fn test_streak_same_day_unchanged() {
        assert_eq!(next_streak(Some(date(2026, 1, 1)), date(2026, 1, 1), 4), 4);
    }

    #[test]
    fn test_streak_next_day_increments() {
        assert_eq!(next_streak(Some(date(2026, 1, 31)), date(2026, 2, 1), 4), 5);
    }

    #[test]
    fn test_streak_gap_resets() {
        assert_eq!(next_streak(Some(date(2026, 1, 1)), date(2026, 1, 3), 9), 1);
    }

    #[test]
    fn test_streak_clock_skew_unchanged() {
        assert_eq!(next_streak(Some(date(2026, 1, 5)), date(2026, 1, 3), 2), 2);
    }
}
