//! Trigger types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, TimeZone as _, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::SchedulerError;

/// Minimum number of seconds between "now" and a trigger's fire time.
pub const MIN_LEAD_SECS: i64 = 30;

/// Local wall-clock format used inside `at(...)` expressions.
const LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Time zones a trigger may be scheduled in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeZone {
    /// America/New_York.
    #[default]
    #[serde(rename = "America/New_York")]
    Eastern,
    /// America/Los_Angeles.
    #[serde(rename = "America/Los_Angeles")]
    Pacific,
}

impl TimeZone {
    /// IANA name of the zone.
    pub fn name(&self) -> &'static str {
        match self {
            TimeZone::Eastern => "America/New_York",
            TimeZone::Pacific => "America/Los_Angeles",
        }
    }

    /// The zone's tz database entry.
    pub fn tz(&self) -> Tz {
        match self {
            TimeZone::Eastern => chrono_tz::America::New_York,
            TimeZone::Pacific => chrono_tz::America::Los_Angeles,
        }
    }
}

impl FromStr for TimeZone {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "America/New_York" => Ok(TimeZone::Eastern),
            "America/Los_Angeles" => Ok(TimeZone::Pacific),
            other => Err(SchedulerError::InvalidTimeZone(other.to_string())),
        }
    }
}

impl fmt::Display for TimeZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A one-shot `at(YYYY-MM-DDTHH:MM:SS)` expression in a trigger's local zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleExpression(String);

impl ScheduleExpression {
    /// Build the expression for an instant, rendered as wall-clock time in `zone`.
    pub fn at(fire_at: DateTime<Utc>, zone: TimeZone) -> Self {
        let local = fire_at.with_timezone(&zone.tz());
        Self(format!("at({})", local.format(LOCAL_FORMAT)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve the expression back to an instant, reading it as wall-clock time in `zone`.
    ///
    /// Local times repeated by a DST fall-back resolve to the earlier instant.
    /// Local times skipped by a spring-forward are rejected.
    pub fn fire_time(&self, zone: TimeZone) -> Result<DateTime<Utc>, SchedulerError> {
        let inner = self.inner();
        let naive = NaiveDateTime::parse_from_str(inner, LOCAL_FORMAT)
            .map_err(|e| SchedulerError::InvalidExpression(format!("{}: {}", self.0, e)))?;

        match zone.tz().from_local_datetime(&naive) {
            LocalResult::Single(t) => Ok(t.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
            LocalResult::None => Err(SchedulerError::InvalidExpression(format!(
                "{} does not exist in {}",
                self.0, zone
            ))),
        }
    }

    fn inner(&self) -> &str {
        // Shape is checked on construction.
        &self.0[3..self.0.len() - 1]
    }
}

impl FromStr for ScheduleExpression {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s
            .strip_prefix("at(")
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| SchedulerError::InvalidExpression(s.to_string()))?;

        NaiveDateTime::parse_from_str(inner, LOCAL_FORMAT)
            .map_err(|e| SchedulerError::InvalidExpression(format!("{}: {}", s, e)))?;

        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for ScheduleExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a trigger invokes when it fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Identity of the invoked handler.
    pub id: String,
    /// Role or credential the invocation runs with.
    pub role: String,
}

/// A named one-shot trigger.
///
/// Triggers fire once at `fire_at`, are deleted after firing and are never
/// retried when the target invocation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    /// Unique trigger name.
    pub name: String,
    /// Invocation target.
    pub target: Target,
    /// Zone the schedule expression is evaluated in.
    pub time_zone: TimeZone,
    /// Serialized payload handed to the target.
    pub payload: String,
    /// When the trigger fires.
    pub fire_at: DateTime<Utc>,
}

impl Trigger {
    /// Create a new trigger.
    pub fn new(
        name: impl Into<String>,
        target_id: impl Into<String>,
        role: impl Into<String>,
        time_zone: TimeZone,
        payload: impl Into<String>,
        fire_at: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            target: Target {
                id: target_id.into(),
                role: role.into(),
            },
            time_zone,
            payload: payload.into(),
            fire_at,
        }
    }

    /// The `at(...)` expression for this trigger's fire time.
    pub fn expression(&self) -> ScheduleExpression {
        ScheduleExpression::at(self.fire_at, self.time_zone)
    }
}

/// Check that `fire_at` is at least `MIN_LEAD_SECS` after `now`.
pub fn check_lead_time(fire_at: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), SchedulerError> {
    if fire_at < now + Duration::seconds(MIN_LEAD_SECS) {
        return Err(SchedulerError::InvalidDate {
            fire_at,
            now,
            min_lead_secs: MIN_LEAD_SECS,
        });
    }
    Ok(())
}
