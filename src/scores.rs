use crate::calendar::load_season_calendar;
use crate::config::*;
use crate::results::value_to_string;
use crate::store;
use crate::types::*;
use chrono::Local;
use serde_json::{Map, Value};
use std::{
  thread::sleep,
  time::Duration,
};
use tracing::{info, warn};

pub fn score_feed_week_url(config: &AppConfig, week: u32) -> Result<String, String> {
  let base = config.score_feed_url.trim();
  if base.is_empty() {
    return Err("Score feed URL is not set (Settings or SCORE_FEED_URL).".to_string());
  }
  if base.contains("{week}") {
    return Ok(base.replace("{week}", &week.to_string()));
  }
  if base.contains('?') {
    Ok(format!("{base}&week={week}"))
  } else {
    Ok(format!("{base}?week={week}"))
  }
}

pub fn fetch_week_scores(config: &AppConfig, week: u32) -> Result<Value, String> {
  let url = score_feed_week_url(config, week)?;
  let token = config.score_feed_token.trim();
  let client = reqwest::blocking::Client::new();
  append_feed_log(
    "Score feed request",
    &format!("url: {url}\nAuthorization: Bearer [redacted]\nUser-Agent: survivor-pool-tool"),
  );
  let mut last_send_err = String::new();
  let mut resp = None;
  for attempt in 0..SCORE_FEED_ATTEMPTS {
    if attempt > 0 {
      sleep(Duration::from_millis(500 * u64::from(attempt)));
    }
    let mut request = client.get(&url).header("User-Agent", "survivor-pool-tool");
    if !token.is_empty() {
      request = request.header("Authorization", format!("Bearer {token}"));
    }
    match request.send() {
      Ok(r) => {
        resp = Some(r);
        break;
      }
      Err(e) => {
        last_send_err = format!("Score feed request failed (attempt {}): {e}", attempt + 1);
        append_feed_log("Score feed error", &last_send_err);
      }
    }
  }
  let resp = resp.ok_or_else(|| last_send_err.clone())?;
  let status = resp.status();
  let body = resp.text().map_err(|e| {
    append_feed_log("Score feed error", &format!("read failed: {e}"));
    format!("Score feed read failed: {e}")
  })?;
  append_feed_log("Score feed response", &format!("status: {status}\nbody:\n{body}"));
  if !status.is_success() {
    return Err(format!("Score feed error {status}: {body}"));
  }
  serde_json::from_str(&body).map_err(|e| {
    append_feed_log("Score feed error", &format!("parse failed: {e}"));
    format!("Score feed parse failed: {e}")
  })
}

/// The feed serves either an object keyed by game id, or `{"games": [...]}`
/// with per-game ids inside each element. Both normalize into the stored
/// keyed shape.
pub fn week_records_from_feed(payload: &Value) -> Result<Map<String, Value>, String> {
  let Some(root) = payload.as_object() else {
    return Err("Score feed payload must be a JSON object.".to_string());
  };
  if let Some(games) = root.get("games").and_then(|v| v.as_array()) {
    let mut out = Map::new();
    for (idx, game) in games.iter().enumerate() {
      let id = game
        .get("id")
        .and_then(value_to_string)
        .unwrap_or_else(|| format!("game-{}", idx + 1));
      out.insert(id, game.clone());
    }
    return Ok(out);
  }
  Ok(root.clone())
}

pub fn sync_week_results(config: &AppConfig, week: u32) -> Result<usize, String> {
  let payload = fetch_week_scores(config, week)?;
  let records = week_records_from_feed(&payload)?;
  let count = records.len();
  store::write_week_records(config, week, &Value::Object(records))?;
  Ok(count)
}

pub fn spawn_score_polling() {
  std::thread::spawn(move || loop {
    let config = load_config_inner().unwrap_or_else(|_| AppConfig::default());
    if !config.score_polling || config.score_feed_url.trim().is_empty() {
      sleep(Duration::from_millis(SCORE_POLL_INTERVAL_MS));
      continue;
    }
    let season = match load_season_calendar(&config) {
      Ok(season) => season,
      Err(e) => {
        warn!("score polling skipped: {e}");
        sleep(Duration::from_millis(SCORE_POLL_INTERVAL_MS));
        continue;
      }
    };
    let week = season.resolve_current_week(Local::now().date_naive());
    match sync_week_results(&config, week) {
      Ok(count) => info!("synced {count} result records for week {week}"),
      Err(e) => warn!("score feed sync failed for week {week}: {e}"),
    }
    sleep(Duration::from_millis(SCORE_POLL_INTERVAL_MS));
  });
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_week_url_substitution() {
    let mut config = AppConfig::default();
    config.score_feed_url = "https://feed.example/scores/{week}".to_string();
    assert_eq!(
      score_feed_week_url(&config, 3).unwrap(),
      "https://feed.example/scores/3"
    );

    config.score_feed_url = "https://feed.example/scores".to_string();
    assert_eq!(
      score_feed_week_url(&config, 3).unwrap(),
      "https://feed.example/scores?week=3"
    );

    config.score_feed_url = "https://feed.example/scores?season=2025".to_string();
    assert_eq!(
      score_feed_week_url(&config, 3).unwrap(),
      "https://feed.example/scores?season=2025&week=3"
    );

    config.score_feed_url = String::new();
    assert!(score_feed_week_url(&config, 3).is_err());
  }

  #[test]
  fn test_feed_games_array_normalizes_to_keyed_map() {
    let payload = json!({
      "games": [
        {"id": "401", "homeTeam": "Cowboys", "awayTeam": "Giants", "status": "final"},
        {"homeTeam": "Bears", "awayTeam": "Lions", "status": "live"}
      ]
    });
    let records = week_records_from_feed(&payload).unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.contains_key("401"));
    assert!(records.contains_key("game-2"));
  }

  #[test]
  fn test_feed_keyed_object_passes_through() {
    let payload = json!({
      "g1": {"homeTeam": "Jets", "awayTeam": "Bills", "status": "final"}
    });
    let records = week_records_from_feed(&payload).unwrap();
    assert_eq!(records.len(), 1);
    assert!(records.contains_key("g1"));
  }

  #[test]
  fn test_feed_non_object_payload_is_rejected() {
    assert!(week_records_from_feed(&json!([1, 2, 3])).is_err());
  }
}
