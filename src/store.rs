use crate::config::resolve_repo_path;
use crate::results::team_name_from_value;
use crate::types::{AppConfig, PersistedStatus, PoolRoster};
use serde_json::{Map, Value};
use std::{
    collections::BTreeMap,
    fs,
    path::PathBuf,
};

pub fn data_dir(config: &AppConfig) -> PathBuf {
    resolve_repo_path(&config.data_dir)
}

pub fn roster_path(config: &AppConfig) -> PathBuf {
    data_dir(config).join("roster.json")
}

pub fn picks_path(config: &AppConfig) -> PathBuf {
    data_dir(config).join("picks.json")
}

pub fn status_path(config: &AppConfig) -> PathBuf {
    data_dir(config).join("status.json")
}

pub fn results_dir(config: &AppConfig) -> PathBuf {
    data_dir(config).join("results")
}

pub fn week_results_path(config: &AppConfig, week: u32) -> PathBuf {
    results_dir(config).join(format!("week_{week}.json"))
}

/// A missing roster document is fatal for the operation, as is a roster
/// that names a different pool than the one configured.
pub fn load_roster(config: &AppConfig) -> Result<PoolRoster, String> {
    let path = roster_path(config);
    if !path.is_file() {
        return Err(format!("Pool roster not found at {}.", path.display()));
    }
    let data = fs::read_to_string(&path).map_err(|e| format!("read roster {}: {e}", path.display()))?;
    let roster = serde_json::from_str::<PoolRoster>(&data)
        .map_err(|e| format!("parse roster {}: {e}", path.display()))?;
    if !roster.pool_id.is_empty() && roster.pool_id != config.pool_id {
        return Err(format!(
            "Roster {} belongs to pool {} but pool {} is configured.",
            path.display(),
            roster.pool_id,
            config.pool_id
        ));
    }
    Ok(roster)
}

// ── Weekly pick store ──────────────────────────────────────────────────

/// Raw pick document: participant id → (week → pick record). Pick records
/// vary in shape, so per-participant extraction stays lazy and reports its
/// own errors instead of failing the whole document.
pub struct PickStore {
    raw: Map<String, Value>,
}

impl PickStore {
    pub fn from_value(value: Value) -> Result<PickStore, String> {
        match value {
            Value::Object(raw) => Ok(PickStore { raw }),
            _ => Err("Pick store must be a JSON object keyed by participant id.".to_string()),
        }
    }

    /// Ordered week → team picks for one participant. Absent participant
    /// means zero picks; a malformed entry is a per-participant error.
    pub fn picks_for(&self, participant_id: &str) -> Result<BTreeMap<u32, String>, String> {
        let entry = match self.raw.get(participant_id) {
            None => return Ok(BTreeMap::new()),
            Some(entry) => entry,
        };
        let weeks = entry
            .as_object()
            .ok_or_else(|| format!("picks for {participant_id} are not an object"))?;
        let mut out = BTreeMap::new();
        for (raw_week, pick) in weeks {
            let Ok(week) = raw_week.trim().parse::<u32>() else {
                continue;
            };
            if week == 0 {
                continue;
            }
            if let Some(team) = team_name_from_value(pick) {
                out.insert(week, team);
            }
        }
        Ok(out)
    }
}

/// A missing picks document is an empty store, not an error.
pub fn load_pick_store(config: &AppConfig) -> Result<PickStore, String> {
    let path = picks_path(config);
    if !path.is_file() {
        return Ok(PickStore { raw: Map::new() });
    }
    let data = fs::read_to_string(&path).map_err(|e| format!("read picks {}: {e}", path.display()))?;
    let value: Value =
        serde_json::from_str(&data).map_err(|e| format!("parse picks {}: {e}", path.display()))?;
    PickStore::from_value(value)
}

// ── Persisted status store ─────────────────────────────────────────────

pub struct StatusStore {
    raw: Map<String, Value>,
}

impl StatusStore {
    pub fn from_value(value: Value) -> Result<StatusStore, String> {
        match value {
            Value::Object(raw) => Ok(StatusStore { raw }),
            _ => Err("Status store must be a JSON object keyed by participant id.".to_string()),
        }
    }

    /// Absent participant means a default (alive) record.
    pub fn status_for(&self, participant_id: &str) -> Result<PersistedStatus, String> {
        match self.raw.get(participant_id) {
            None => Ok(PersistedStatus::default()),
            Some(entry) => serde_json::from_value::<PersistedStatus>(entry.clone())
                .map_err(|e| format!("parse status for {participant_id}: {e}")),
        }
    }
}

pub fn load_status_store(config: &AppConfig) -> Result<StatusStore, String> {
    let path = status_path(config);
    if !path.is_file() {
        return Ok(StatusStore { raw: Map::new() });
    }
    let data = fs::read_to_string(&path).map_err(|e| format!("read status {}: {e}", path.display()))?;
    let value: Value =
        serde_json::from_str(&data).map_err(|e| format!("parse status {}: {e}", path.display()))?;
    StatusStore::from_value(value)
}

/// Read-modify-write of one participant's status entry.
pub fn write_status(config: &AppConfig, participant_id: &str, status: &PersistedStatus) -> Result<(), String> {
    let path = status_path(config);
    let mut root: Map<String, Value> = if path.is_file() {
        let data = fs::read_to_string(&path).map_err(|e| format!("read status {}: {e}", path.display()))?;
        let value: Value =
            serde_json::from_str(&data).map_err(|e| format!("parse status {}: {e}", path.display()))?;
        match value {
            Value::Object(map) => map,
            _ => return Err(format!("Status store {} must be a JSON object.", path.display())),
        }
    } else {
        Map::new()
    };
    let entry = serde_json::to_value(status).map_err(|e| e.to_string())?;
    root.insert(participant_id.to_string(), entry);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("create status dir {}: {e}", parent.display()))?;
    }
    let payload = serde_json::to_string_pretty(&Value::Object(root)).map_err(|e| e.to_string())?;
    fs::write(&path, payload).map_err(|e| format!("write status {}: {e}", path.display()))?;
    Ok(())
}

// ── Weekly result store ────────────────────────────────────────────────

/// Missing week file means the store holds nothing for that week.
pub fn load_week_records(config: &AppConfig, week: u32) -> Result<Option<Map<String, Value>>, String> {
    let path = week_results_path(config, week);
    if !path.is_file() {
        return Ok(None);
    }
    let data = fs::read_to_string(&path)
        .map_err(|e| format!("read week {week} results {}: {e}", path.display()))?;
    let value: Value = serde_json::from_str(&data)
        .map_err(|e| format!("parse week {week} results {}: {e}", path.display()))?;
    match value {
        Value::Object(map) => Ok(Some(map)),
        _ => Err(format!(
            "Week {week} results {} must be a JSON object keyed by game id.",
            path.display()
        )),
    }
}

pub fn write_week_records(config: &AppConfig, week: u32, records: &Value) -> Result<(), String> {
    let path = week_results_path(config, week);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("create results dir {}: {e}", parent.display()))?;
    }
    let payload = serde_json::to_string_pretty(records).map_err(|e| e.to_string())?;
    fs::write(&path, payload).map_err(|e| format!("write week {week} results {}: {e}", path.display()))?;
    Ok(())
}

/// Weeks that have a stored result document, ascending.
pub fn stored_result_weeks(config: &AppConfig) -> Vec<u32> {
    let dir = results_dir(config);
    if !dir.is_dir() {
        return Vec::new();
    }
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };
    let mut out = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Some(raw_week) = stem.strip_prefix("week_") {
            if let Ok(week) = raw_week.parse::<u32>() {
                out.push(week);
            }
        }
    }
    out.sort();
    out.dedup();
    out
}
