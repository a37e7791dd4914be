//! Work-schedule gate: decides whether presence should drive the light
//! right now or whether the light stays off.

use std::fmt;

use chrono::{Datelike, Local, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::config::Configuration;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct WorkSchedule {
    #[serde(with = "hhmm")]
    pub work_start: NaiveTime,
    #[serde(with = "hhmm")]
    pub work_end: NaiveTime,
    pub workdays: Vec<Weekday>,
}

impl Default for WorkSchedule {
    fn default() -> Self {
        Self {
            work_start: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
            work_end: NaiveTime::from_hms_opt(19, 0, 0).unwrap_or_default(),
            workdays: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
        }
    }
}

impl WorkSchedule {
    pub fn is_workday(&self, day: Weekday) -> bool {
        self.workdays.contains(&day)
    }

    /// Both ends are inclusive. A window whose start is not before its end
    /// crosses midnight.
    pub fn is_work_time(&self, time: NaiveTime) -> bool {
        if self.work_start < self.work_end {
            time >= self.work_start && time <= self.work_end
        } else {
            time >= self.work_start || time <= self.work_end
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    Weekend,
    AfterHours,
}

impl fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuppressReason::Weekend => f.write_str("weekend"),
            SuppressReason::AfterHours => f.write_str("after hours"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleDecision {
    Active,
    Suppressed(SuppressReason),
}

pub fn evaluate(now: NaiveDateTime, config: &Configuration) -> ScheduleDecision {
    if !config.include_weekends && !config.schedule.is_workday(now.weekday()) {
        return ScheduleDecision::Suppressed(SuppressReason::Weekend);
    }
    if !config.after_work && !config.schedule.is_work_time(now.time()) {
        return ScheduleDecision::Suppressed(SuppressReason::AfterHours);
    }
    ScheduleDecision::Active
}

/// Wall-clock source for the gate.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(|err| serde::de::Error::custom(format!("invalid time '{raw}': {err}")))
    }
}
