//! Replication mode and the schedule-drift / run-gap resolver (C8, §4.7).

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Frequency {
    Weekly,
    Daily,
    Sixhourly,
    Hourly,
}

impl Frequency {
    /// The deliberate overlap buffer subtracted from `end` to compute
    /// `start` (§4.7): wide enough to absorb clock skew or worker lag
    /// without leaving a gap between consecutive runs.
    fn overlap(&self) -> Duration {
        match self {
            Frequency::Weekly => Duration::days(7) + Duration::hours(12),
            Frequency::Daily => Duration::days(1) + Duration::hours(3),
            Frequency::Sixhourly => Duration::hours(6) + Duration::minutes(30),
            Frequency::Hourly => Duration::hours(1) + Duration::minutes(15),
        }
    }

    /// Drift tolerance: if `now` has wandered further than this from the
    /// schedule's intended instant, a drift warning is emitted.
    fn tolerance(&self) -> Duration {
        match self {
            Frequency::Weekly | Frequency::Daily => Duration::hours(3),
            Frequency::Sixhourly => Duration::hours(1),
            Frequency::Hourly => Duration::minutes(15),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModeType {
    FullRefresh,
    Incremental,
}

/// A cron-projecting schedule attached to a Transfer (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub frequency: Frequency,
    #[serde(rename = "type")]
    pub mode_type: ModeType,
    /// Sunday-indexed (0-6), only meaningful for `Frequency::Weekly`.
    #[serde(default)]
    pub day: Option<u32>,
    #[serde(default)]
    pub hour: Option<u32>,
    #[serde(default)]
    pub minute: Option<u32>,
}

impl Schedule {
    /// Projects this schedule to a cron expression. `frequency=WEEKLY` with a
    /// numeric `day` (0-6) is Sunday-indexed; a scheduler backend using a
    /// different convention must renormalise at its own adapter boundary
    /// (§9 "Cron semantics").
    pub fn to_cron(&self) -> String {
        let minute = self.minute.unwrap_or(0);
        let hour = self.hour.unwrap_or(0);
        match self.frequency {
            Frequency::Hourly => format!("{minute} * * * *"),
            Frequency::Sixhourly => format!("{minute} */6 * * *"),
            Frequency::Daily => format!("{minute} {hour} * * *"),
            Frequency::Weekly => {
                let day = self.day.unwrap_or(0);
                format!("{minute} {hour} * * {day}")
            }
        }
    }
}

/// A drift or gap warning surfaced by the resolver; logged, never fatal on
/// its own (only `RunGapDetected`, computed separately, fails the run).
#[derive(Debug, Clone, PartialEq)]
pub enum ModeWarning {
    ScheduleDrift { expected: DateTime<Utc>, now: DateTime<Utc> },
    WeeklyDayMismatch { expected_day: u32, actual_day: u32 },
}

/// The resolved replication modality for one run (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mode {
    #[serde(rename = "type")]
    pub mode_type: ModeType,
    pub period: Option<Frequency>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl Mode {
    pub fn full_refresh() -> Self {
        Mode {
            mode_type: ModeType::FullRefresh,
            period: None,
            start: None,
            end: None,
        }
    }

    pub fn is_full_refresh(&self) -> bool {
        self.mode_type == ModeType::FullRefresh
    }
}

/// Resolves a Schedule + the current instant into a Mode, plus any drift
/// warnings to log (§4.7). `FULL_REFRESH` schedules skip drift checks
/// entirely.
pub fn resolve_mode(schedule: &Schedule, now: DateTime<Utc>) -> (Mode, Vec<ModeWarning>) {
    if schedule.mode_type == ModeType::FullRefresh {
        return (Mode::full_refresh(), Vec::new());
    }

    let end = now
        .with_hour(schedule.hour.unwrap_or(0))
        .and_then(|t| t.with_minute(schedule.minute.unwrap_or(0)))
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    let start = end - schedule.frequency.overlap();

    let mut warnings = Vec::new();
    let drift = (end - now).num_seconds().abs();
    if drift > schedule.frequency.tolerance().num_seconds() {
        warnings.push(ModeWarning::ScheduleDrift { expected: end, now });
    }
    if schedule.frequency == Frequency::Weekly {
        if let Some(expected_day) = schedule.day {
            let actual_day = now.weekday().num_days_from_sunday();
            if actual_day != expected_day {
                warnings.push(ModeWarning::WeeklyDayMismatch {
                    expected_day,
                    actual_day,
                });
            }
        }
    }

    let mode = Mode {
        mode_type: ModeType::Incremental,
        period: Some(schedule.frequency),
        start: Some(start),
        end: Some(end),
    };
    (mode, warnings)
}

/// Run-gap detection (§4.7, §8): a gap exists iff the current mode is
/// INCREMENTAL, the run is not an override (explicit mode/model list), and
/// the prior successful run predates the current window's start.
pub fn detect_run_gap(
    mode: &Mode,
    last_success_at: Option<DateTime<Utc>>,
    is_override: bool,
) -> bool {
    if is_override || mode.mode_type != ModeType::Incremental {
        return false;
    }
    match (last_success_at, mode.start) {
        (Some(last), Some(start)) => last < start,
        // No prior successful run: nothing to compare against, not a gap.
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn full_refresh_skips_drift_checks() {
        let schedule = Schedule {
            frequency: Frequency::Daily,
            mode_type: ModeType::FullRefresh,
            day: None,
            hour: None,
            minute: None,
        };
        let (mode, warnings) = resolve_mode(&schedule, Utc::now());
        assert!(mode.is_full_refresh());
        assert!(warnings.is_empty());
    }

    #[test]
    fn daily_window_is_one_day_three_hours() {
        let schedule = Schedule {
            frequency: Frequency::Daily,
            mode_type: ModeType::Incremental,
            day: None,
            hour: Some(12),
            minute: Some(0),
        };
        let now = Utc.with_ymd_and_hms(2025, 1, 3, 12, 0, 0).unwrap();
        let (mode, _) = resolve_mode(&schedule, now);
        let end = mode.end.unwrap();
        let start = mode.start.unwrap();
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 1, 3, 12, 0, 0).unwrap());
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 1, 2, 9, 0, 0).unwrap());
    }

    #[test]
    fn run_gap_detected_when_last_success_precedes_start() {
        let mode = Mode {
            mode_type: ModeType::Incremental,
            period: Some(Frequency::Daily),
            start: Some(Utc.with_ymd_and_hms(2025, 1, 2, 21, 0, 0).unwrap()),
            end: Some(Utc.with_ymd_and_hms(2025, 1, 3, 12, 0, 0).unwrap()),
        };
        let last_success = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert!(detect_run_gap(&mode, Some(last_success), false));
    }

    #[test]
    fn run_gap_not_flagged_on_override() {
        let mode = Mode {
            mode_type: ModeType::Incremental,
            period: Some(Frequency::Daily),
            start: Some(Utc.with_ymd_and_hms(2025, 1, 2, 21, 0, 0).unwrap()),
            end: Some(Utc.with_ymd_and_hms(2025, 1, 3, 12, 0, 0).unwrap()),
        };
        let last_success = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert!(!detect_run_gap(&mode, Some(last_success), true));
    }

    #[test]
    fn to_cron_is_sunday_indexed_for_weekly() {
        let schedule = Schedule {
            frequency: Frequency::Weekly,
            mode_type: ModeType::Incremental,
            day: Some(0),
            hour: Some(3),
            minute: Some(30),
        };
        assert_eq!(schedule.to_cron(), "30 3 * * 0");
    }
}
