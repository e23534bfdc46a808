use crate::types::*;
use chrono::Local;
use std::{
  env,
  fs,
  io::Write,
  path::PathBuf,
  time::{SystemTime, UNIX_EPOCH},
};

pub fn repo_root() -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

pub fn resolve_repo_path(raw: &str) -> PathBuf {
  let path = PathBuf::from(raw);
  if path.is_absolute() {
    path
  } else {
    repo_root().join(path)
  }
}

pub fn config_path() -> PathBuf {
  repo_root().join("config.json")
}

pub fn env_default(key: &str) -> Option<String> {
  env::var(key)
    .ok()
    .map(|value| value.trim().to_string())
    .filter(|value| !value.is_empty())
}

pub fn apply_env_defaults(mut config: AppConfig) -> AppConfig {
  if config.score_feed_url.trim().is_empty() {
    if let Some(value) = env_default("SCORE_FEED_URL") {
      config.score_feed_url = value;
    }
  }
  if config.score_feed_token.trim().is_empty() {
    if let Some(value) = env_default("SCORE_FEED_TOKEN") {
      config.score_feed_token = value;
    }
  }
  if config.signal_participant_id.trim().is_empty() {
    if let Some(value) = env_default("SIGNAL_PARTICIPANT_ID") {
      config.signal_participant_id = value;
    }
  }
  config
}

pub fn load_config_inner() -> Result<AppConfig, String> {
  let path = config_path();
  if !path.is_file() {
    return Ok(apply_env_defaults(AppConfig::default()));
  }
  let data = fs::read_to_string(&path).map_err(|e| format!("read config {}: {e}", path.display()))?;
  let config =
    serde_json::from_str::<AppConfig>(&data).map_err(|e| format!("parse config {}: {e}", path.display()))?;
  Ok(apply_env_defaults(config))
}

pub fn load_env_file() {
  let env_path = repo_root().join(".env");
  if !env_path.is_file() {
    return;
  }
  let contents = match fs::read_to_string(&env_path) {
    Ok(data) => data,
    Err(_) => return,
  };
  for line in contents.lines() {
    if let Some((key, value)) = parse_env_line(line) {
      if env::var_os(&key).is_none() {
        env::set_var(key, value);
      }
    }
  }
}

pub fn parse_env_line(line: &str) -> Option<(String, String)> {
  let trimmed = line.trim();
  if trimmed.is_empty() || trimmed.starts_with('#') {
    return None;
  }
  let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
  let (key, raw_value) = trimmed.split_once('=')?;
  let key = key.trim();
  if key.is_empty() {
    return None;
  }
  let mut value = raw_value.trim();
  if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
    value = &value[1..value.len() - 1];
  } else if value.starts_with('\'') && value.ends_with('\'') && value.len() >= 2 {
    value = &value[1..value.len() - 1];
  } else if let Some(idx) = value.find('#') {
    value = value[..idx].trim_end();
  }
  Some((key.to_string(), value.to_string()))
}

pub fn now_ms() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_millis() as u64
}

pub fn feed_log_path() -> PathBuf {
  repo_root().join("logs").join("score_feed.log")
}

pub fn append_feed_log(label: &str, payload: &str) {
  let dir = repo_root().join("logs");
  if fs::create_dir_all(&dir).is_err() {
    return;
  }
  let path = feed_log_path();
  let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
  let entry = format!("[{timestamp}] {label}\n{payload}\n\n");
  if let Ok(mut file) = fs::OpenOptions::new().create(true).append(true).open(&path) {
    let _ = file.write_all(entry.as_bytes());
  }
}

/// Canonical comparison key for a team name. Source records spell teams
/// with inconsistent casing and spacing; every set-membership test goes
/// through this one function.
pub fn normalize_team_key(raw: &str) -> String {
  raw
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase()
}

pub fn log_env_warnings() {
  let config = load_config_inner().unwrap_or_else(|_| AppConfig::default());
  let mut warnings = Vec::new();

  if config.score_polling && config.score_feed_url.trim().is_empty() {
    warnings.push("scorePolling is enabled but no score feed URL is set (Settings or SCORE_FEED_URL) — result sync will fail".to_string());
  }
  if config.signal_participant_id.trim().is_empty() {
    warnings.push("signalParticipantId not set (Settings or SIGNAL_PARTICIPANT_ID) — audit requests will fail".to_string());
  }
  let roster = resolve_repo_path(&config.data_dir).join("roster.json");
  if !roster.is_file() {
    warnings.push(format!(
      "pool roster not found at {} — snapshot requests will fail",
      roster.display()
    ));
  }

  for msg in warnings {
    tracing::warn!("{}", msg);
  }
}
