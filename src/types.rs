use serde::{Deserialize, Serialize};
use std::{
    sync::{Arc, Mutex},
    time::SystemTime,
};

// ── Constants ──────────────────────────────────────────────────────────

pub const SEASON_WEEK_COUNT: u32 = 18;
pub const DEFAULT_CACHE_TTL_MS: u64 = 60_000;
pub const SCORE_POLL_INTERVAL_MS: u64 = 60_000;
pub const SCORE_FEED_ATTEMPTS: u32 = 3;
pub const DEFAULT_FIX_DELAY_MS: u64 = 250;
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:17990";
pub const STATUS_UPDATED_BY: &str = "reconciliation-engine";

// ── Shared state type aliases ──────────────────────────────────────────

pub type SharedPoolCache = Arc<Mutex<PoolCacheState>>;

// ── Roster types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RosterEntry {
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub enrolled: bool,
    pub active: Option<bool>,
}

impl RosterEntry {
    /// Display label: name, then email, then an id-derived placeholder.
    pub fn label(&self) -> String {
        if let Some(name) = self.display_name.as_ref().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        if let Some(email) = self.email.as_ref().map(|e| e.trim()).filter(|e| !e.is_empty()) {
            return email.to_string();
        }
        let short: String = self.id.chars().take(8).collect();
        format!("Participant {short}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolRoster {
    #[serde(default)]
    pub pool_id: String,
    pub participants: Vec<RosterEntry>,
}

// ── Survivor record types ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SurvivorStatus {
    Alive,
    Eliminated,
    NotParticipating,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WinningPick {
    pub week: u32,
    pub team: String,
}

/// Derived state for one participant. Always recomputed from picks and
/// aggregated results, never mutated incrementally.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurvivorRecord {
    pub status: SurvivorStatus,
    pub eliminated_week: Option<u32>,
    pub eliminated_by: Option<String>,
    pub winning_picks: Vec<WinningPick>,
}

// ── Persisted status (external, audited against) ───────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedStatus {
    pub eliminated: bool,
    pub eliminated_week: Option<u32>,
    pub elimination_reason: Option<String>,
    pub status_updated_by: Option<String>,
    pub status_updated_at: Option<String>,
    pub status_update_reason: Option<String>,
}

// ── Pool snapshot types ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSnapshot {
    pub id: String,
    pub display_name: String,
    pub status: SurvivorStatus,
    pub eliminated_week: Option<u32>,
    pub eliminated_by: Option<String>,
    pub winning_picks: Vec<WinningPick>,
    pub should_update_status: bool,
    pub status_update_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantError {
    pub id: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotCounts {
    pub alive: usize,
    pub eliminated: usize,
    pub not_participating: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSnapshot {
    pub pool_id: String,
    pub current_week: u32,
    pub alive: Vec<ParticipantSnapshot>,
    pub eliminated: Vec<ParticipantSnapshot>,
    pub not_participating: Vec<ParticipantSnapshot>,
    pub errors: Vec<ParticipantError>,
    pub counts: SnapshotCounts,
    pub generated_at: u64,
}

#[derive(Default)]
pub struct PoolCacheState {
    pub snapshot: Option<PoolSnapshot>,
    pub last_refresh: Option<SystemTime>,
    pub last_error: Option<String>,
    pub refresh_in_flight: bool,
}

// ── Config types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub pool_id: String,
    pub data_dir: String,
    pub season_calendar_path: String,
    pub cache_ttl_ms: u64,
    pub bind_addr: String,
    pub score_feed_url: String,
    pub score_feed_token: String,
    pub score_polling: bool,
    pub signal_participant_id: String,
    pub fix_delay_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pool_id: "main-pool".to_string(),
            data_dir: "pool_data".to_string(),
            season_calendar_path: "season_calendar.json".to_string(),
            cache_ttl_ms: DEFAULT_CACHE_TTL_MS,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            score_feed_url: String::new(),
            score_feed_token: String::new(),
            score_polling: false,
            signal_participant_id: String::new(),
            fix_delay_ms: DEFAULT_FIX_DELAY_MS,
        }
    }
}
