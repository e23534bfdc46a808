use crate::calendar;
use crate::config::now_ms;
use crate::elimination::compute_survivor_record;
use crate::results::{self, WeekResults};
use crate::store::{self, PickStore};
use crate::types::*;
use chrono::Local;
use std::{collections::BTreeMap, time::SystemTime};
use tracing::{info, warn};

/// Suggested participation-flag update when the roster flag disagrees
/// with the computed record. Informational only; the flag itself is never
/// mutated here.
fn status_flag_suggestion(entry: &RosterEntry, record: &SurvivorRecord) -> (bool, Option<String>) {
    match (entry.active, record.status) {
        (Some(true), SurvivorStatus::Eliminated) => {
            let week = record.eliminated_week.unwrap_or(0);
            (
                true,
                Some(format!(
                    "Computed eliminated in week {week} but participation flag is still active."
                )),
            )
        }
        (Some(false), SurvivorStatus::Alive) => (
            true,
            Some("Computed alive but participation flag is inactive.".to_string()),
        ),
        _ => (false, None),
    }
}

/// Assembles a whole-pool snapshot from already-loaded stores. Enrolled
/// participants with zero recorded picks never entered the pool and are
/// absent from every list.
pub fn assemble_snapshot(
    pool_id: &str,
    current_week: u32,
    roster: &PoolRoster,
    picks: &PickStore,
    results: &BTreeMap<u32, WeekResults>,
) -> PoolSnapshot {
    let mut alive = Vec::new();
    let mut eliminated = Vec::new();
    let mut not_participating = Vec::new();
    let mut errors = Vec::new();

    for entry in roster.participants.iter().filter(|p| p.enrolled) {
        let participant_picks = match picks.picks_for(&entry.id) {
            Ok(participant_picks) => participant_picks,
            Err(error) => {
                errors.push(ParticipantError {
                    id: entry.id.clone(),
                    error,
                });
                continue;
            }
        };
        if participant_picks.is_empty() {
            continue;
        }

        let record = compute_survivor_record(&participant_picks, results);
        let (should_update_status, status_update_reason) = status_flag_suggestion(entry, &record);
        let snapshot = ParticipantSnapshot {
            id: entry.id.clone(),
            display_name: entry.label(),
            status: record.status,
            eliminated_week: record.eliminated_week,
            eliminated_by: record.eliminated_by,
            winning_picks: record.winning_picks,
            should_update_status,
            status_update_reason,
        };
        match snapshot.status {
            SurvivorStatus::Alive => alive.push(snapshot),
            SurvivorStatus::Eliminated => eliminated.push(snapshot),
            SurvivorStatus::NotParticipating => not_participating.push(snapshot),
        }
    }

    alive.sort_by(|a, b| a.id.cmp(&b.id));
    eliminated.sort_by(|a, b| (a.eliminated_week, &a.id).cmp(&(b.eliminated_week, &b.id)));
    not_participating.sort_by(|a, b| a.id.cmp(&b.id));

    let counts = SnapshotCounts {
        alive: alive.len(),
        eliminated: eliminated.len(),
        not_participating: not_participating.len(),
        total: alive.len() + eliminated.len() + not_participating.len(),
    };

    PoolSnapshot {
        pool_id: pool_id.to_string(),
        current_week,
        alive,
        eliminated,
        not_participating,
        errors,
        counts,
        generated_at: now_ms(),
    }
}

/// Full recompute from the stores. Roster and calendar problems are fatal
/// for the refresh; per-participant problems land in the snapshot's error
/// list instead.
pub fn build_pool_snapshot(config: &AppConfig) -> Result<PoolSnapshot, String> {
    let roster = store::load_roster(config)?;
    let season = calendar::load_season_calendar(config)?;
    let current_week = season.resolve_current_week(Local::now().date_naive());
    let picks = store::load_pick_store(config)?;
    let week_results = results::collect_week_results(config, current_week)?;
    Ok(assemble_snapshot(
        &config.pool_id,
        current_week,
        &roster,
        &picks,
        &week_results,
    ))
}

/// Serves the cached snapshot while it is younger than the configured TTL
/// and recomputes otherwise. A refresh already in flight, or a failed
/// recompute, falls back to the previous snapshot with its original
/// `generatedAt` intact so callers can detect staleness.
pub fn maybe_refresh_pool_snapshot(
    config: &AppConfig,
    cache: &SharedPoolCache,
    force: bool,
) -> Option<PoolSnapshot> {
    let (cached_snapshot, last_refresh, refresh_in_flight) = {
        let guard = cache.lock().unwrap_or_else(|e| e.into_inner());
        (guard.snapshot.clone(), guard.last_refresh, guard.refresh_in_flight)
    };

    let mut needs_refresh = force || cached_snapshot.is_none();
    match last_refresh {
        Some(last) => {
            let age_ms = last.elapsed().map(|age| age.as_millis() as u64).unwrap_or(u64::MAX);
            if age_ms > config.cache_ttl_ms {
                needs_refresh = true;
            }
        }
        None => needs_refresh = true,
    }

    if !needs_refresh || refresh_in_flight {
        return cached_snapshot;
    }

    {
        let mut guard = cache.lock().unwrap_or_else(|e| e.into_inner());
        guard.refresh_in_flight = true;
    }

    let built = build_pool_snapshot(config);
    let mut guard = cache.lock().unwrap_or_else(|e| e.into_inner());
    guard.refresh_in_flight = false;
    match built {
        Ok(snapshot) => {
            info!(
                "pool snapshot refreshed: {} alive, {} eliminated, week {}",
                snapshot.counts.alive, snapshot.counts.eliminated, snapshot.current_week
            );
            guard.last_refresh = Some(SystemTime::now());
            guard.last_error = None;
            guard.snapshot = Some(snapshot.clone());
            Some(snapshot)
        }
        Err(err) => {
            warn!("pool snapshot refresh failed, serving previous snapshot: {err}");
            guard.last_error = Some(err);
            cached_snapshot
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::WeekResults;
    use serde_json::json;

    fn make_roster() -> PoolRoster {
        PoolRoster {
            pool_id: "test-pool".to_string(),
            participants: vec![
                RosterEntry {
                    id: "alice".to_string(),
                    display_name: Some("Alice".to_string()),
                    enrolled: true,
                    active: Some(true),
                    ..RosterEntry::default()
                },
                RosterEntry {
                    id: "bob".to_string(),
                    display_name: Some("Bob".to_string()),
                    enrolled: true,
                    active: Some(true),
                    ..RosterEntry::default()
                },
                RosterEntry {
                    id: "carol".to_string(),
                    enrolled: true,
                    ..RosterEntry::default()
                },
                RosterEntry {
                    id: "dropout".to_string(),
                    enrolled: false,
                    ..RosterEntry::default()
                },
            ],
        }
    }

    fn make_picks() -> PickStore {
        PickStore::from_value(json!({
            "alice": {"1": "Cowboys", "2": "Giants"},
            "bob": {"1": "Bears", "2": "Packers"},
            "dropout": {"1": "Jets"}
        }))
        .unwrap()
    }

    fn make_results() -> BTreeMap<u32, WeekResults> {
        let mut out = BTreeMap::new();
        out.insert(
            1,
            WeekResults {
                week: 1,
                winning_teams: ["cowboys", "bears"].iter().map(|t| t.to_string()).collect(),
                losing_teams: ["giants", "lions"].iter().map(|t| t.to_string()).collect(),
                final_game_count: 2,
                total_game_count: 2,
            },
        );
        out.insert(
            2,
            WeekResults {
                week: 2,
                winning_teams: ["packers"].iter().map(|t| t.to_string()).collect(),
                losing_teams: ["giants"].iter().map(|t| t.to_string()).collect(),
                final_game_count: 1,
                total_game_count: 2,
            },
        );
        out
    }

    #[test]
    fn test_snapshot_partitions_participants() {
        let snapshot = assemble_snapshot("test-pool", 2, &make_roster(), &make_picks(), &make_results());

        assert_eq!(snapshot.counts.alive, 1);
        assert_eq!(snapshot.counts.eliminated, 1);
        assert_eq!(snapshot.counts.not_participating, 0);
        assert_eq!(snapshot.alive[0].id, "bob");
        assert_eq!(snapshot.eliminated[0].id, "alice");
        assert_eq!(snapshot.eliminated[0].eliminated_week, Some(2));
        assert_eq!(snapshot.eliminated[0].eliminated_by.as_deref(), Some("Giants"));
    }

    #[test]
    fn test_zero_pick_participants_are_absent() {
        let snapshot = assemble_snapshot("test-pool", 2, &make_roster(), &make_picks(), &make_results());

        // Carol has no picks at all: not alive, not eliminated, simply absent.
        let ids: Vec<&str> = snapshot
            .alive
            .iter()
            .chain(&snapshot.eliminated)
            .chain(&snapshot.not_participating)
            .map(|p| p.id.as_str())
            .collect();
        assert!(!ids.contains(&"carol"));
        assert_eq!(snapshot.counts.total, 2);
    }

    #[test]
    fn test_unenrolled_participants_are_excluded() {
        let snapshot = assemble_snapshot("test-pool", 2, &make_roster(), &make_picks(), &make_results());
        assert!(snapshot.alive.iter().all(|p| p.id != "dropout"));
        assert!(snapshot.eliminated.iter().all(|p| p.id != "dropout"));
    }

    #[test]
    fn test_eliminated_with_active_flag_gets_suggestion() {
        let snapshot = assemble_snapshot("test-pool", 2, &make_roster(), &make_picks(), &make_results());

        let alice = &snapshot.eliminated[0];
        assert!(alice.should_update_status);
        assert!(alice.status_update_reason.as_deref().unwrap().contains("week 2"));

        let bob = &snapshot.alive[0];
        assert!(!bob.should_update_status);
        assert!(bob.status_update_reason.is_none());
    }

    #[test]
    fn test_malformed_picks_become_error_entries() {
        let picks = PickStore::from_value(json!({
            "alice": "not-an-object",
            "bob": {"1": "Bears"}
        }))
        .unwrap();
        let snapshot = assemble_snapshot("test-pool", 1, &make_roster(), &picks, &make_results());

        assert_eq!(snapshot.errors.len(), 1);
        assert_eq!(snapshot.errors[0].id, "alice");
        assert_eq!(snapshot.counts.alive, 1);
    }
}
