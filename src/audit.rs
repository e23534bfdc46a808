use crate::calendar;
use crate::elimination::compute_survivor_record;
use crate::results::{self, WeekResults};
use crate::store::{self, PickStore, StatusStore};
use crate::types::*;
use chrono::Local;
use serde::Serialize;
use std::{
    collections::{BTreeMap, HashSet},
    thread::sleep,
    time::Duration,
};
use tracing::{info, warn};

// ── Bug patterns ───────────────────────────────────────────────────────

/// Known ways a persisted status record drifts from recomputed truth.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BugPattern {
    /// Persisted-eliminated, but the computed record shows a win in the
    /// persisted elimination week.
    #[serde(rename_all = "camelCase")]
    IncorrectEliminationWeek { recorded_week: u32, winning_team: String },
    /// Persisted-eliminated, but an earlier week already contains a loss.
    #[serde(rename_all = "camelCase")]
    DelayedElimination {
        recorded_week: u32,
        actual_week: u32,
        losing_team: String,
    },
    /// Persisted-alive, but the computed walk finds a final loss.
    #[serde(rename_all = "camelCase")]
    MissingElimination { week: u32, losing_team: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BugPatternKind {
    IncorrectEliminationWeek,
    DelayedElimination,
    MissingElimination,
}

impl BugPattern {
    pub fn kind(&self) -> BugPatternKind {
        match self {
            BugPattern::IncorrectEliminationWeek { .. } => BugPatternKind::IncorrectEliminationWeek,
            BugPattern::DelayedElimination { .. } => BugPatternKind::DelayedElimination,
            BugPattern::MissingElimination { .. } => BugPatternKind::MissingElimination,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            BugPattern::IncorrectEliminationWeek {
                recorded_week,
                winning_team,
            } => format!("recorded eliminated in week {recorded_week} despite winning pick {winning_team}"),
            BugPattern::DelayedElimination {
                recorded_week,
                actual_week,
                losing_team,
            } => format!(
                "recorded eliminated in week {recorded_week} but {losing_team} already lost in week {actual_week}"
            ),
            BugPattern::MissingElimination { week, losing_team } => {
                format!("recorded alive despite {losing_team} losing a final game in week {week}")
            }
        }
    }
}

/// Compares a freshly computed record against the persisted status and
/// classifies any divergence. The pattern pairs are mutually exclusive:
/// an eliminated record cannot both win its recorded week and lose an
/// earlier one, because the walk stops at the first loss.
pub fn detect_patterns(record: &SurvivorRecord, persisted: &PersistedStatus) -> Vec<BugPattern> {
    let mut out = Vec::new();
    if persisted.eliminated {
        if let Some(recorded_week) = persisted.eliminated_week {
            if let Some(pick) = record.winning_picks.iter().find(|p| p.week == recorded_week) {
                out.push(BugPattern::IncorrectEliminationWeek {
                    recorded_week,
                    winning_team: pick.team.clone(),
                });
            }
            if let (SurvivorStatus::Eliminated, Some(actual_week)) = (record.status, record.eliminated_week) {
                if actual_week < recorded_week {
                    out.push(BugPattern::DelayedElimination {
                        recorded_week,
                        actual_week,
                        losing_team: record.eliminated_by.clone().unwrap_or_default(),
                    });
                }
            }
        }
    } else if let (SurvivorStatus::Eliminated, Some(week)) = (record.status, record.eliminated_week) {
        out.push(BugPattern::MissingElimination {
            week,
            losing_team: record.eliminated_by.clone().unwrap_or_default(),
        });
    }
    out
}

/// Corrective status for a verified pattern, or None for report-only
/// kinds. Applying the same correction twice is a no-op: the corrected
/// record matches computed truth, so the pattern no longer detects.
pub fn corrected_status(pattern: &BugPattern, timestamp: &str) -> Option<(PersistedStatus, String, String)> {
    match pattern {
        BugPattern::IncorrectEliminationWeek {
            recorded_week,
            winning_team,
        } => {
            let reason = format!(
                "Recorded elimination in week {recorded_week} but the week {recorded_week} pick {winning_team} won; restored to alive."
            );
            let next = PersistedStatus {
                eliminated: false,
                eliminated_week: None,
                elimination_reason: None,
                status_updated_by: Some(STATUS_UPDATED_BY.to_string()),
                status_updated_at: Some(timestamp.to_string()),
                status_update_reason: Some(reason.clone()),
            };
            Some((next, "restore_alive".to_string(), reason))
        }
        BugPattern::MissingElimination { week, losing_team } => {
            let reason = format!(
                "Pick {losing_team} lost a final game in week {week} but no elimination was recorded."
            );
            let next = PersistedStatus {
                eliminated: true,
                eliminated_week: Some(*week),
                elimination_reason: Some(format!("Lost with {losing_team} in week {week}")),
                status_updated_by: Some(STATUS_UPDATED_BY.to_string()),
                status_updated_at: Some(timestamp.to_string()),
                status_update_reason: Some(reason.clone()),
            };
            Some((next, "set_eliminated".to_string(), reason))
        }
        BugPattern::DelayedElimination { .. } => None,
    }
}

// ── Report types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedParticipant {
    pub id: String,
    pub display_name: String,
    pub patterns: Vec<BugPattern>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditError {
    pub id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResults {
    pub verified: Vec<AffectedParticipant>,
    pub failed: Vec<AuditError>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionEntry {
    pub id: String,
    pub action: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub pool_id: String,
    pub signal_participant: String,
    pub bug_patterns: Vec<BugPattern>,
    pub affected_users: Vec<AffectedParticipant>,
    pub verification_results: VerificationResults,
    pub corrections: Vec<CorrectionEntry>,
    pub errors: Vec<AuditError>,
    pub recommendations: Vec<String>,
    pub generated_at: String,
}

// ── Engine ─────────────────────────────────────────────────────────────

fn participant_patterns(
    participant_id: &str,
    picks: &PickStore,
    statuses: &StatusStore,
    week_results: &BTreeMap<u32, WeekResults>,
    kinds: &HashSet<BugPatternKind>,
) -> Result<Vec<BugPattern>, String> {
    let participant_picks = picks.picks_for(participant_id)?;
    if participant_picks.is_empty() {
        return Ok(Vec::new());
    }
    let persisted = statuses.status_for(participant_id)?;
    let record = compute_survivor_record(&participant_picks, week_results);
    Ok(detect_patterns(&record, &persisted)
        .into_iter()
        .filter(|p| kinds.contains(&p.kind()))
        .collect())
}

/// Runs the full audit: pattern discovery on the signal participant,
/// propagation across the roster, a verification pass against freshly
/// re-read stores, and (when `apply_fixes` is set) the batch correction
/// step. Per-participant read failures become error entries; the audit
/// never aborts on one participant.
pub fn run_audit(config: &AppConfig, apply_fixes: bool) -> Result<AuditReport, String> {
    let roster = store::load_roster(config)?;
    let season = calendar::load_season_calendar(config)?;
    let current_week = season.resolve_current_week(Local::now().date_naive());

    let signal_id = config.signal_participant_id.trim().to_string();
    if signal_id.is_empty() {
        return Err("signalParticipantId is not set (Settings or SIGNAL_PARTICIPANT_ID).".to_string());
    }
    if !roster.participants.iter().any(|p| p.enrolled && p.id == signal_id) {
        return Err(format!("Signal participant {signal_id} is not in the pool roster."));
    }

    let picks = store::load_pick_store(config)?;
    let statuses = store::load_status_store(config)?;
    let week_results = results::collect_week_results(config, current_week)?;

    // Step 1: pattern discovery on the signal participant.
    let signal_picks = picks
        .picks_for(&signal_id)
        .map_err(|e| format!("read signal participant picks: {e}"))?;
    let signal_status = statuses
        .status_for(&signal_id)
        .map_err(|e| format!("read signal participant status: {e}"))?;
    let signal_record = compute_survivor_record(&signal_picks, &week_results);
    let bug_patterns = detect_patterns(&signal_record, &signal_status);
    let kinds: HashSet<BugPatternKind> = bug_patterns.iter().map(BugPattern::kind).collect();
    for pattern in &bug_patterns {
        info!("signal participant {signal_id}: {}", pattern.describe());
    }

    // Step 2: a discovered bug class is assumed systemic, so every other
    // enrolled participant is tested against the same kinds.
    let mut affected_users = Vec::new();
    let mut errors = Vec::new();
    if !kinds.is_empty() {
        for entry in roster.participants.iter().filter(|p| p.enrolled) {
            match participant_patterns(&entry.id, &picks, &statuses, &week_results, &kinds) {
                Ok(patterns) if !patterns.is_empty() => {
                    affected_users.push(AffectedParticipant {
                        id: entry.id.clone(),
                        display_name: entry.label(),
                        patterns,
                    });
                }
                Ok(_) => {}
                Err(error) => {
                    warn!("audit skipping participant {}: {error}", entry.id);
                    errors.push(AuditError {
                        id: entry.id.clone(),
                        error,
                    });
                }
            }
        }
    }

    // Step 3: verification against freshly re-read stores, immediately
    // before any fix.
    let mut verification_results = VerificationResults::default();
    if !affected_users.is_empty() {
        let fresh_picks = store::load_pick_store(config)?;
        let fresh_statuses = store::load_status_store(config)?;
        let fresh_results = results::collect_week_results(config, current_week)?;
        for candidate in &affected_users {
            match participant_patterns(&candidate.id, &fresh_picks, &fresh_statuses, &fresh_results, &kinds) {
                Ok(patterns) if !patterns.is_empty() => {
                    verification_results.verified.push(AffectedParticipant {
                        id: candidate.id.clone(),
                        display_name: candidate.display_name.clone(),
                        patterns,
                    });
                }
                Ok(_) => {
                    verification_results.failed.push(AuditError {
                        id: candidate.id.clone(),
                        error: "pattern did not reproduce on verification".to_string(),
                    });
                }
                Err(error) => {
                    verification_results.failed.push(AuditError {
                        id: candidate.id.clone(),
                        error,
                    });
                }
            }
        }
    }

    // Step 4: batch correction for the verified matches only.
    let mut corrections = Vec::new();
    if apply_fixes {
        let timestamp = Local::now().to_rfc3339();
        for participant in &verification_results.verified {
            for pattern in &participant.patterns {
                let Some((next, action, reason)) = corrected_status(pattern, &timestamp) else {
                    continue;
                };
                if let Err(error) = store::write_status(config, &participant.id, &next) {
                    warn!("correction write failed for {}: {error}", participant.id);
                    errors.push(AuditError {
                        id: participant.id.clone(),
                        error,
                    });
                    continue;
                }
                info!("corrected {}: {action} ({reason})", participant.id);
                corrections.push(CorrectionEntry {
                    id: participant.id.clone(),
                    action,
                    reason,
                });
                sleep(Duration::from_millis(config.fix_delay_ms));
            }
        }
    }

    let recommendations = build_recommendations(
        &signal_id,
        &bug_patterns,
        &verification_results,
        &corrections,
        &errors,
        apply_fixes,
    );

    Ok(AuditReport {
        pool_id: config.pool_id.clone(),
        signal_participant: signal_id,
        bug_patterns,
        affected_users,
        verification_results,
        corrections,
        errors,
        recommendations,
        generated_at: Local::now().to_rfc3339(),
    })
}

fn build_recommendations(
    signal_id: &str,
    bug_patterns: &[BugPattern],
    verification: &VerificationResults,
    corrections: &[CorrectionEntry],
    errors: &[AuditError],
    apply_fixes: bool,
) -> Vec<String> {
    let mut out = Vec::new();
    if bug_patterns.is_empty() {
        out.push(format!(
            "No drift detected for signal participant {signal_id}; re-run with a different signal participant to probe other bug classes."
        ));
        return out;
    }
    let delayed = verification
        .verified
        .iter()
        .flat_map(|p| &p.patterns)
        .filter(|p| p.kind() == BugPatternKind::DelayedElimination)
        .count();
    if delayed > 0 {
        out.push(format!(
            "{delayed} delayed elimination(s) are report-only; review the recorded weeks manually before changing them."
        ));
    }
    if !apply_fixes && !verification.verified.is_empty() {
        out.push(format!(
            "{} verified participant(s) await correction; re-run the audit with fixes enabled.",
            verification.verified.len()
        ));
    }
    if !corrections.is_empty() {
        out.push(format!(
            "{} correction(s) applied; re-run the audit to confirm the store has settled.",
            corrections.len()
        ));
    }
    if !errors.is_empty() {
        out.push(format!(
            "{} participant(s) could not be processed; inspect their store entries before trusting the totals.",
            errors.len()
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_record(status: SurvivorStatus, week: Option<u32>, by: Option<&str>, wins: &[(u32, &str)]) -> SurvivorRecord {
        SurvivorRecord {
            status,
            eliminated_week: week,
            eliminated_by: by.map(|t| t.to_string()),
            winning_picks: wins
                .iter()
                .map(|&(week, team)| WinningPick {
                    week,
                    team: team.to_string(),
                })
                .collect(),
        }
    }

    fn persisted_eliminated(week: u32) -> PersistedStatus {
        PersistedStatus {
            eliminated: true,
            eliminated_week: Some(week),
            elimination_reason: Some(format!("Lost in week {week}")),
            ..PersistedStatus::default()
        }
    }

    #[test]
    fn test_incorrect_elimination_week_detected() {
        // Persisted says eliminated week 4, computed shows the week 4 pick won.
        let record = make_record(SurvivorStatus::Alive, None, None, &[(1, "TeamA"), (4, "TeamZ")]);
        let patterns = detect_patterns(&record, &persisted_eliminated(4));

        assert_eq!(patterns.len(), 1);
        assert_eq!(
            patterns[0],
            BugPattern::IncorrectEliminationWeek {
                recorded_week: 4,
                winning_team: "TeamZ".to_string()
            }
        );
    }

    #[test]
    fn test_delayed_elimination_detected() {
        let record = make_record(SurvivorStatus::Eliminated, Some(2), Some("TeamB"), &[(1, "TeamA")]);
        let patterns = detect_patterns(&record, &persisted_eliminated(5));

        assert_eq!(patterns.len(), 1);
        assert_eq!(
            patterns[0],
            BugPattern::DelayedElimination {
                recorded_week: 5,
                actual_week: 2,
                losing_team: "TeamB".to_string()
            }
        );
    }

    #[test]
    fn test_missing_elimination_detected() {
        // Persisted says alive, computed shows a final loss in week 2.
        let record = make_record(SurvivorStatus::Eliminated, Some(2), Some("TeamB"), &[(1, "TeamA")]);
        let patterns = detect_patterns(&record, &PersistedStatus::default());

        assert_eq!(patterns.len(), 1);
        assert_eq!(
            patterns[0],
            BugPattern::MissingElimination {
                week: 2,
                losing_team: "TeamB".to_string()
            }
        );
    }

    #[test]
    fn test_matching_records_detect_nothing() {
        let alive = make_record(SurvivorStatus::Alive, None, None, &[(1, "TeamA")]);
        assert!(detect_patterns(&alive, &PersistedStatus::default()).is_empty());

        let eliminated = make_record(SurvivorStatus::Eliminated, Some(3), Some("TeamC"), &[(1, "TeamA")]);
        assert!(detect_patterns(&eliminated, &persisted_eliminated(3)).is_empty());
    }

    #[test]
    fn test_restore_alive_correction_is_idempotent() {
        let record = make_record(SurvivorStatus::Alive, None, None, &[(4, "TeamZ")]);
        let pattern = &detect_patterns(&record, &persisted_eliminated(4))[0];

        let (corrected, action, _) = corrected_status(pattern, "2025-10-07T09:00:00-05:00").unwrap();
        assert_eq!(action, "restore_alive");
        assert!(!corrected.eliminated);
        assert_eq!(corrected.eliminated_week, None);
        assert_eq!(corrected.elimination_reason, None);
        assert_eq!(corrected.status_updated_by.as_deref(), Some(STATUS_UPDATED_BY));

        // Second pass over the corrected store finds nothing to change.
        assert!(detect_patterns(&record, &corrected).is_empty());
    }

    #[test]
    fn test_set_eliminated_correction_is_idempotent() {
        let record = make_record(SurvivorStatus::Eliminated, Some(2), Some("TeamB"), &[(1, "TeamA")]);
        let pattern = &detect_patterns(&record, &PersistedStatus::default())[0];

        let (corrected, action, _) = corrected_status(pattern, "2025-10-07T09:00:00-05:00").unwrap();
        assert_eq!(action, "set_eliminated");
        assert!(corrected.eliminated);
        assert_eq!(corrected.eliminated_week, Some(2));
        assert!(corrected.elimination_reason.as_deref().unwrap().contains("TeamB"));

        assert!(detect_patterns(&record, &corrected).is_empty());
    }

    #[test]
    fn test_delayed_elimination_is_report_only() {
        let pattern = BugPattern::DelayedElimination {
            recorded_week: 5,
            actual_week: 2,
            losing_team: "TeamB".to_string(),
        };
        assert!(corrected_status(&pattern, "2025-10-07T09:00:00-05:00").is_none());
    }
}
