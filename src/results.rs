use crate::config::normalize_team_key;
use crate::store;
use crate::types::AppConfig;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

// ── Raw record coercion ────────────────────────────────────────────────

pub fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(num) => num.as_i64(),
        Value::String(raw) => raw.trim().parse::<i64>().ok(),
        _ => None,
    }
}

pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(raw) => Some(raw.clone()),
        Value::Number(num) => Some(num.to_string()),
        _ => None,
    }
}

/// Single normalization point for team names. Source records nest the
/// name under varying shapes: a bare string, `{name}`, `{team}`,
/// `{teamName}`, `{team: {name}}`, or an `{abbreviation}`.
pub fn team_name_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Object(map) => {
            for key in ["team", "name", "teamName", "displayName", "abbreviation"] {
                if let Some(inner) = map.get(key) {
                    if let Some(name) = team_name_from_value(inner) {
                        return Some(name);
                    }
                }
            }
            None
        }
        _ => None,
    }
}

// ── Game status normalization ──────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameStatus {
    Scheduled,
    InProgress,
    Final,
}

/// Collapses the feed's status spellings into one closed set. Live
/// indicators are checked before final ones: a live game must never be
/// counted as final.
pub fn map_game_status(value: Option<&Value>) -> GameStatus {
    let Some(raw) = value else {
        return GameStatus::Scheduled;
    };
    if let Some(text) = raw.as_str() {
        let lower = text.trim().to_lowercase();
        if lower.is_empty() {
            return GameStatus::Scheduled;
        }
        if lower.contains("progress")
            || lower.contains("live")
            || lower.contains("half")
            || lower.contains("playing")
            || lower.starts_with('q')
        {
            return GameStatus::InProgress;
        }
        if lower == "f"
            || lower == "ft"
            || lower == "closed"
            || lower == "post"
            || lower.contains("final")
            || lower.contains("complete")
        {
            return GameStatus::Final;
        }
        return GameStatus::Scheduled;
    }
    if let Some(num) = value_to_i64(raw) {
        return match num {
            2 => GameStatus::InProgress,
            3 => GameStatus::Final,
            _ => GameStatus::Scheduled,
        };
    }
    GameStatus::Scheduled
}

// ── Week aggregation ───────────────────────────────────────────────────

/// Aggregated results for one week. Team sets hold normalized keys and
/// are disjoint by construction.
#[derive(Clone, Debug, Default)]
pub struct WeekResults {
    pub week: u32,
    pub winning_teams: HashSet<String>,
    pub losing_teams: HashSet<String>,
    pub final_game_count: usize,
    pub total_game_count: usize,
}

impl WeekResults {
    /// A week is evaluable if it has any final game, or is the current
    /// week (partial-week inclusion: early final games drive eliminations
    /// while the rest of the slate is still playing).
    pub fn available(&self, current_week: u32) -> bool {
        self.final_game_count > 0 || self.week == current_week
    }
}

fn game_team(record: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| record.get(*key).and_then(team_name_from_value))
}

fn game_winner(record: &Map<String, Value>, home: Option<&String>, away: Option<&String>) -> Option<String> {
    if let Some(declared) = record.get("winner").and_then(team_name_from_value) {
        return Some(declared);
    }
    let home_score = record.get("homeScore").and_then(value_to_i64);
    let away_score = record.get("awayScore").and_then(value_to_i64);
    match (home_score, away_score, home, away) {
        (Some(h), Some(a), Some(home), Some(away)) if h != a => {
            Some(if h > a { home.clone() } else { away.clone() })
        }
        _ => None,
    }
}

/// Partitions one week's raw game records into winners and losers.
/// Records lacking both team fields and a status field are store metadata
/// and are skipped entirely.
pub fn aggregate_week(week: u32, records: &Map<String, Value>) -> WeekResults {
    let mut out = WeekResults {
        week,
        ..WeekResults::default()
    };

    for record in records.values() {
        let Some(game) = record.as_object() else {
            continue;
        };
        let home = game_team(game, &["homeTeam", "home"]);
        let away = game_team(game, &["awayTeam", "away"]);
        let status_value = game.get("status").or_else(|| game.get("gameStatus"));
        if home.is_none() && away.is_none() && status_value.is_none() {
            continue;
        }
        out.total_game_count += 1;

        if map_game_status(status_value) != GameStatus::Final {
            continue;
        }
        out.final_game_count += 1;

        let Some(winner) = game_winner(game, home.as_ref(), away.as_ref()) else {
            continue;
        };
        let winner_key = normalize_team_key(&winner);
        let loser_key = match (&home, &away) {
            (Some(h), Some(a)) if normalize_team_key(h) == winner_key => Some(normalize_team_key(a)),
            (Some(h), Some(a)) if normalize_team_key(a) == winner_key => Some(normalize_team_key(h)),
            _ => None,
        };
        if !out.losing_teams.contains(&winner_key) {
            out.winning_teams.insert(winner_key);
        }
        if let Some(loser_key) = loser_key {
            if !out.winning_teams.contains(&loser_key) {
                out.losing_teams.insert(loser_key);
            }
        }
    }

    out
}

/// Evaluable weeks in ascending order. Weeks with zero final games that
/// are not the current week are omitted entirely, never zero-filled.
pub fn collect_week_results(
    config: &AppConfig,
    current_week: u32,
) -> Result<BTreeMap<u32, WeekResults>, String> {
    let mut out = BTreeMap::new();
    for week in store::stored_result_weeks(config) {
        let Some(records) = store::load_week_records(config, week)? else {
            continue;
        };
        let aggregated = aggregate_week(week, &records);
        if aggregated.available(current_week) {
            out.insert(week, aggregated);
        }
    }
    Ok(out)
}
