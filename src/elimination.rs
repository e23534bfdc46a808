use crate::config::normalize_team_key;
use crate::results::WeekResults;
use crate::types::{SurvivorRecord, SurvivorStatus, WinningPick};
use std::collections::BTreeMap;

/// Derives one participant's survivor state from their picks and the
/// aggregated results, walking available weeks in strictly ascending
/// order.
///
/// A participant with no week-1 pick never entered the pool (there is no
/// entry point after week 1). A missing pick for a later week is skipped
/// rather than eliminating. A pick in neither team set is an undecided
/// game and must never eliminate.
pub fn compute_survivor_record(
    picks: &BTreeMap<u32, String>,
    results: &BTreeMap<u32, WeekResults>,
) -> SurvivorRecord {
    if !picks.contains_key(&1) {
        return SurvivorRecord {
            status: SurvivorStatus::NotParticipating,
            eliminated_week: None,
            eliminated_by: None,
            winning_picks: Vec::new(),
        };
    }

    let mut winning_picks = Vec::new();
    for (&week, week_results) in results {
        let Some(team) = picks.get(&week) else {
            continue;
        };
        let key = normalize_team_key(team);
        if week_results.losing_teams.contains(&key) {
            return SurvivorRecord {
                status: SurvivorStatus::Eliminated,
                eliminated_week: Some(week),
                eliminated_by: Some(team.clone()),
                winning_picks,
            };
        }
        if week_results.winning_teams.contains(&key) {
            winning_picks.push(WinningPick {
                week,
                team: team.clone(),
            });
        }
    }

    SurvivorRecord {
        status: SurvivorStatus::Alive,
        eliminated_week: None,
        eliminated_by: None,
        winning_picks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_picks(entries: &[(u32, &str)]) -> BTreeMap<u32, String> {
        entries.iter().map(|&(week, team)| (week, team.to_string())).collect()
    }

    fn make_week(week: u32, winners: &[&str], losers: &[&str]) -> WeekResults {
        WeekResults {
            week,
            winning_teams: winners.iter().map(|t| t.to_string()).collect(),
            losing_teams: losers.iter().map(|t| t.to_string()).collect(),
            final_game_count: winners.len() + losers.len(),
            total_game_count: winners.len() + losers.len(),
        }
    }

    fn make_results(weeks: Vec<WeekResults>) -> BTreeMap<u32, WeekResults> {
        weeks.into_iter().map(|w| (w.week, w)).collect()
    }

    #[test]
    fn test_win_then_final_loss_eliminates() {
        let picks = make_picks(&[(1, "TeamX"), (2, "TeamY")]);
        let results = make_results(vec![
            make_week(1, &["teamx"], &["teamz"]),
            make_week(2, &["teamz"], &["teamy"]),
        ]);

        let record = compute_survivor_record(&picks, &results);

        assert_eq!(record.status, SurvivorStatus::Eliminated);
        assert_eq!(record.eliminated_week, Some(2));
        assert_eq!(record.eliminated_by.as_deref(), Some("TeamY"));
        assert_eq!(record.winning_picks.len(), 1);
        assert_eq!(record.winning_picks[0].week, 1);
        assert_eq!(record.winning_picks[0].team, "TeamX");
    }

    #[test]
    fn test_undecided_game_never_eliminates() {
        let picks = make_picks(&[(1, "TeamA"), (3, "TeamZ")]);
        // Week 3 is present (current week) but TeamZ's game is not final.
        let results = make_results(vec![
            make_week(1, &["teama"], &["teamb"]),
            make_week(3, &[], &[]),
        ]);

        let record = compute_survivor_record(&picks, &results);

        assert_eq!(record.status, SurvivorStatus::Alive);
        assert_eq!(record.eliminated_week, None);
        assert_eq!(record.winning_picks.len(), 1);
    }

    #[test]
    fn test_no_week_one_pick_is_not_participating() {
        let picks = make_picks(&[(2, "TeamA"), (3, "TeamB")]);
        let results = make_results(vec![make_week(2, &["teama"], &[])]);

        let record = compute_survivor_record(&picks, &results);

        assert_eq!(record.status, SurvivorStatus::NotParticipating);
        assert!(record.winning_picks.is_empty());
    }

    #[test]
    fn test_no_winning_picks_accumulate_after_elimination() {
        let picks = make_picks(&[(1, "TeamA"), (2, "TeamB"), (3, "TeamC")]);
        let results = make_results(vec![
            make_week(1, &[], &["teama"]),
            make_week(2, &["teamb"], &[]),
            make_week(3, &["teamc"], &[]),
        ]);

        let record = compute_survivor_record(&picks, &results);

        assert_eq!(record.status, SurvivorStatus::Eliminated);
        assert_eq!(record.eliminated_week, Some(1));
        assert!(record.winning_picks.is_empty());
    }

    #[test]
    fn test_missing_pick_skips_week_without_eliminating() {
        let picks = make_picks(&[(1, "TeamA"), (3, "TeamC")]);
        let results = make_results(vec![
            make_week(1, &["teama"], &[]),
            make_week(2, &["teamx"], &["teamy"]),
            make_week(3, &["teamc"], &[]),
        ]);

        let record = compute_survivor_record(&picks, &results);

        assert_eq!(record.status, SurvivorStatus::Alive);
        assert_eq!(record.winning_picks.len(), 2);
    }

    #[test]
    fn test_absent_week_differs_from_present_empty_week() {
        let picks = make_picks(&[(1, "TeamA"), (2, "TeamB")]);
        // Week 2 absent from results entirely: pick is not evaluated.
        let absent = compute_survivor_record(&picks, &make_results(vec![make_week(1, &["teama"], &[])]));
        assert_eq!(absent.winning_picks.len(), 1);

        // Week 2 present with empty sets: pick is evaluated as undecided.
        let present = compute_survivor_record(
            &picks,
            &make_results(vec![make_week(1, &["teama"], &[]), make_week(2, &[], &[])]),
        );
        assert_eq!(present.status, SurvivorStatus::Alive);
        assert_eq!(present.winning_picks.len(), 1);
    }

    #[test]
    fn test_team_key_normalization_applies_to_picks() {
        let picks = make_picks(&[(1, "  Green  Bay ")]);
        let results = make_results(vec![make_week(1, &["green bay"], &[])]);

        let record = compute_survivor_record(&picks, &results);

        assert_eq!(record.status, SurvivorStatus::Alive);
        assert_eq!(record.winning_picks.len(), 1);
        assert_eq!(record.winning_picks[0].team, "  Green  Bay ");
    }

    #[test]
    fn test_determinism_on_repeated_invocation() {
        let picks = make_picks(&[(1, "TeamA"), (2, "TeamB"), (4, "TeamD")]);
        let results = make_results(vec![
            make_week(1, &["teama"], &[]),
            make_week(2, &[], &["teamb"]),
            make_week(4, &["teamd"], &[]),
        ]);

        let first = compute_survivor_record(&picks, &results);
        let second = compute_survivor_record(&picks, &results);
        assert_eq!(first, second);
    }
}
