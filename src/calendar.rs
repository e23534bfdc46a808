use crate::config::resolve_repo_path;
use crate::types::{AppConfig, SEASON_WEEK_COUNT};
use chrono::{Duration, NaiveDate};
use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WeekStartConfig {
    week: u32,
    start: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeasonCalendarConfig {
    weeks: Vec<WeekStartConfig>,
}

/// Ordered table of (week, start date) pairs covering the season.
/// Week N runs from its start date up to (excluding) week N+1's start.
#[derive(Debug, Clone)]
pub struct SeasonCalendar {
    weeks: Vec<(u32, NaiveDate)>,
}

impl SeasonCalendar {
    /// Table must be non-empty, contiguous from week 1, and date-sorted.
    pub fn new(weeks: Vec<(u32, NaiveDate)>) -> Result<SeasonCalendar, String> {
        if weeks.is_empty() {
            return Err("Season calendar has no weeks.".to_string());
        }
        for (idx, &(week, start)) in weeks.iter().enumerate() {
            let expected = (idx + 1) as u32;
            if week != expected {
                return Err(format!(
                    "Season calendar weeks must be contiguous from 1; found week {week} at position {expected}."
                ));
            }
            if idx > 0 && start <= weeks[idx - 1].1 {
                return Err(format!(
                    "Season calendar start dates must be strictly increasing; week {week} starts {start}."
                ));
            }
        }
        Ok(SeasonCalendar { weeks })
    }

    pub fn default_season() -> SeasonCalendar {
        let opening = NaiveDate::from_ymd_opt(2025, 9, 2).unwrap_or(NaiveDate::MIN);
        let weeks = (1..=SEASON_WEEK_COUNT)
            .map(|week| (week, opening + Duration::days(((week - 1) * 7) as i64)))
            .collect();
        SeasonCalendar { weeks }
    }

    pub fn final_week(&self) -> u32 {
        self.weeks.last().map(|&(week, _)| week).unwrap_or(1)
    }

    /// Maps a date to the week whose interval contains it. Dates before the
    /// first start resolve to week 1; dates after the last start resolve to
    /// the final week.
    pub fn resolve_current_week(&self, today: NaiveDate) -> u32 {
        let mut current = 1;
        for &(week, start) in &self.weeks {
            if today >= start {
                current = week;
            } else {
                break;
            }
        }
        current
    }
}

fn parse_week_start(entry: &WeekStartConfig) -> Result<(u32, NaiveDate), String> {
    let start = NaiveDate::parse_from_str(entry.start.trim(), "%Y-%m-%d")
        .map_err(|e| format!("parse start date {:?} for week {}: {e}", entry.start, entry.week))?;
    Ok((entry.week, start))
}

/// Loads the calendar named in config, or the built-in default season when
/// the file is absent. A malformed table is a configuration error.
pub fn load_season_calendar(config: &AppConfig) -> Result<SeasonCalendar, String> {
    let path = resolve_repo_path(&config.season_calendar_path);
    if !path.is_file() {
        return Ok(SeasonCalendar::default_season());
    }
    let data = fs::read_to_string(&path)
        .map_err(|e| format!("read season calendar {}: {e}", path.display()))?;
    let parsed = serde_json::from_str::<SeasonCalendarConfig>(&data)
        .map_err(|e| format!("parse season calendar {}: {e}", path.display()))?;
    let weeks = parsed
        .weeks
        .iter()
        .map(parse_week_start)
        .collect::<Result<Vec<_>, String>>()?;
    SeasonCalendar::new(weeks)
}
