//! Merge of a day's schedules with the day's executed doses.
//!
//! Matching is first-fit in executed-list order. No global assignment is
//! attempted, so two schedules close in time on the same pump can pair with
//! log entries in a way an optimal matcher would not.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::config::TimelineCfg;
use crate::device::DeviceConfig;
use crate::logs::LogEntry;
use crate::util::minutes_of_day;

/// Origin label of schedule-derived events.
pub const SCHEDULED_ORIGIN: &str = "Scheduled";

/// Float slack on the dose window so that 2.05 vs 2.00 counts as inside 0.05.
const DOSE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEvent {
    pub hour: u32,
    pub minute: u32,
    pub pump_id: u8,
    pub dose_ml: f64,
    pub origin: String,
    pub scheduled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_executed: Option<bool>,
    /// `HH:MM` of the schedule this executed dose was reconciled against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_scheduled_time: Option<String>,
}

impl TimelineEvent {
    /// Fractional hour for plotting, e.g. 08:30 -> 8.5.
    pub fn plot_hour(&self) -> f64 {
        f64::from(self.hour) + f64::from(self.minute) / 60.0
    }

    const fn minutes(&self) -> u32 {
        self.hour.saturating_mul(60).saturating_add(self.minute)
    }

    pub const fn is_unmatched_schedule(&self) -> bool {
        self.scheduled
    }
}

/// Reconcile `today`'s log entries against the schedules active on `today`.
///
/// Output is every unmatched scheduled event followed by every executed event.
pub fn reconcile(
    logs: &[LogEntry],
    config: &DeviceConfig,
    today: NaiveDate,
    cfg: &TimelineCfg,
) -> Vec<TimelineEvent> {
    let mut executed: Vec<TimelineEvent> = logs
        .iter()
        .filter(|e| e.timestamp.date() == today && !cfg.is_manual(&e.origin))
        .map(|e| {
            let m = minutes_of_day(e.timestamp);
            TimelineEvent {
                hour: m / 60,
                minute: m % 60,
                pump_id: e.pump_id,
                dose_ml: e.dose_ml,
                origin: e.origin.clone(),
                scheduled: false,
                is_executed: Some(true),
                matched_scheduled_time: None,
            }
        })
        .collect();

    let scheduled = config
        .schedules_on(today.weekday())
        .filter(|(_, s)| s.hour <= 23 && s.minute <= 59)
        .map(|(pump_id, s)| TimelineEvent {
            hour: s.hour,
            minute: s.minute,
            pump_id,
            dose_ml: s.dose_ml,
            origin: SCHEDULED_ORIGIN.to_string(),
            scheduled: true,
            is_executed: None,
            matched_scheduled_time: None,
        });

    let mut consumed = vec![false; executed.len()];
    let mut out = Vec::with_capacity(executed.len());
    for sched in scheduled {
        let hit = executed.iter().enumerate().position(|(i, ex)| {
            !consumed[i]
                && ex.pump_id == sched.pump_id
                && (ex.dose_ml - sched.dose_ml).abs() <= cfg.dose_tolerance_ml + DOSE_EPSILON
                && ex.minutes().abs_diff(sched.minutes()) <= cfg.match_window_min
        });
        match hit {
            Some(i) => {
                consumed[i] = true;
                executed[i].matched_scheduled_time =
                    Some(format!("{:02}:{:02}", sched.hour, sched.minute));
            }
            None => out.push(sched),
        }
    }
    tracing::debug!(
        missed = out.len(),
        executed = executed.len(),
        matched = consumed.iter().filter(|c| **c).count(),
        "timeline reconciled"
    );
    out.extend(executed);
    out
}
