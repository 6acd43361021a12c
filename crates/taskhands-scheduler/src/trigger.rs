//! Cron triggers: parse expressions, compute fire times, and drive a timer
//! loop that hands each fire time to a callback.
//!
//! Expressions use the 6-field form (seconds first) with an optional 7th
//! year field:
//! `second minute hour day_of_month month day_of_week [year]`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Errors building a trigger.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TriggerError {
    #[error("cron expression is empty")]
    Empty,

    #[error("{0}")]
    Parse(String),

    #[error("expression never fires")]
    NeverFires,
}

/// Time zone cron expressions are evaluated in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleTimezone {
    #[default]
    #[serde(alias = "UTC")]
    Utc,
    #[serde(alias = "Local")]
    Local,
}

impl fmt::Display for ScheduleTimezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleTimezone::Utc => write!(f, "utc"),
            ScheduleTimezone::Local => write!(f, "local"),
        }
    }
}

impl FromStr for ScheduleTimezone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utc" => Ok(ScheduleTimezone::Utc),
            "local" => Ok(ScheduleTimezone::Local),
            other => Err(format!("unknown timezone '{}', expected 'utc' or 'local'", other)),
        }
    }
}

/// A parsed cron expression bound to a time zone.
#[derive(Debug, Clone)]
pub struct CronTrigger {
    schedule: Schedule,
    expression: String,
    timezone: ScheduleTimezone,
}

impl CronTrigger {
    /// Parse a cron expression.
    ///
    /// Examples:
    /// - `"*/1 * * * * *"` - every second
    /// - `"0 */5 * * * *"` - every 5 minutes
    /// - `"0 0 9 * * MON-FRI"` - 9 AM on weekdays
    ///
    /// Expressions that parse but have no future fire time are rejected.
    pub fn parse(expression: &str, timezone: ScheduleTimezone) -> Result<Self, TriggerError> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Err(TriggerError::Empty);
        }

        let schedule =
            Schedule::from_str(expression).map_err(|e| TriggerError::Parse(e.to_string()))?;

        let trigger = Self {
            schedule,
            expression: expression.to_string(),
            timezone,
        };

        if trigger.next_after(Utc::now()).is_none() {
            return Err(TriggerError::NeverFires);
        }

        Ok(trigger)
    }

    /// The expression as written.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The evaluation time zone.
    pub fn timezone(&self) -> ScheduleTimezone {
        self.timezone
    }

    /// First fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.timezone {
            ScheduleTimezone::Utc => self.schedule.after(&after).next(),
            ScheduleTimezone::Local => self
                .schedule
                .after(&after.with_timezone(&Local))
                .next()
                .map(|t| t.with_timezone(&Utc)),
        }
    }

    /// Up to `count` fire times strictly after `after`.
    pub fn upcoming(&self, after: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        let mut times = Vec::with_capacity(count);
        let mut cursor = after;
        while times.len() < count {
            match self.next_after(cursor) {
                Some(next) => {
                    times.push(next);
                    cursor = next;
                }
                None => break,
            }
        }
        times
    }
}

/// Wall clock anchored to the tokio clock.
///
/// Fire times are computed on the wall clock, sleeps happen on the tokio
/// clock. Anchoring both at trigger start keeps them consistent, including
/// when tokio time is paused.
#[derive(Debug, Clone, Copy)]
pub struct TriggerClock {
    wall: DateTime<Utc>,
    instant: Instant,
}

impl TriggerClock {
    /// Anchor at the current moment.
    pub fn start() -> Self {
        Self {
            wall: Utc::now(),
            instant: Instant::now(),
        }
    }

    /// Current wall time as seen by this clock.
    pub fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.instant.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall + elapsed
    }

    /// Tokio instant corresponding to wall time `at`. Times in the past map
    /// to the anchor.
    pub fn deadline(&self, at: DateTime<Utc>) -> Instant {
        let offset = (at - self.wall).to_std().unwrap_or(Duration::ZERO);
        self.instant + offset
    }
}

/// A running timer loop for one task.
///
/// Dropping the registration does not stop the loop; call
/// [`TriggerRegistration::cancel`].
pub struct TriggerRegistration {
    expression: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl TriggerRegistration {
    /// Spawn a timer loop that calls `on_fire` with each scheduled fire
    /// time. The loop also ends when `parent` is cancelled.
    ///
    /// `on_fire` runs on the timer task and must not block.
    pub fn spawn<F>(
        key: impl Into<String>,
        trigger: CronTrigger,
        parent: &CancellationToken,
        mut on_fire: F,
    ) -> Self
    where
        F: FnMut(DateTime<Utc>) + Send + 'static,
    {
        let key = key.into();
        let expression = trigger.expression().to_string();
        let cancel = parent.child_token();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let clock = TriggerClock::start();
            loop {
                let Some(next) = trigger.next_after(clock.now()) else {
                    debug!(task = %key, "Schedule has no upcoming fire time");
                    break;
                };
                trace!(task = %key, next = %next.to_rfc3339(), "Next fire scheduled");

                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep_until(clock.deadline(next)) => {}
                }

                on_fire(next);
            }
            trace!(task = %key, "Timer loop exited");
        });

        Self {
            expression,
            cancel,
            handle,
        }
    }

    /// The expression this loop runs on.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Whether the loop is still scheduling fires.
    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }

    /// Stop the loop and wait for it to exit. No fire is delivered after
    /// this returns.
    pub async fn cancel(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                warn!(cron = %self.expression, "Timer loop panicked: {}", e);
            }
        }
    }
}

/// Common cron schedule presets.
pub mod schedules {
    /// Every second.
    pub const EVERY_SECOND: &str = "* * * * * *";

    /// Every minute.
    pub const EVERY_MINUTE: &str = "0 * * * * *";

    /// Every 5 minutes.
    pub const EVERY_5_MINUTES: &str = "0 */5 * * * *";

    /// Every 15 minutes.
    pub const EVERY_15_MINUTES: &str = "0 */15 * * * *";

    /// Every hour.
    pub const EVERY_HOUR: &str = "0 0 * * * *";

    /// Every day at midnight.
    pub const DAILY_MIDNIGHT: &str = "0 0 0 * * *";

    /// Every Monday at 9 AM.
    pub const WEEKLY_MONDAY_9AM: &str = "0 0 9 * * MON";

    /// First day of each month at midnight.
    pub const MONTHLY_FIRST: &str = "0 0 0 1 * *";

    /// Expression firing every N seconds.
    pub fn every_seconds(seconds: u32) -> String {
        format!("*/{} * * * * *", seconds)
    }

    /// Expression firing every N minutes.
    pub fn every_minutes(minutes: u32) -> String {
        format!("0 */{} * * * *", minutes)
    }

    /// Expression firing every N hours.
    pub fn every_hours(hours: u32) -> String {
        format!("0 0 */{} * * *", hours)
    }

    /// Expression firing daily at `hour:minute`.
    pub fn daily_at(hour: u32, minute: u32) -> String {
        format!("0 {} {} * * *", minute, hour)
    }
}

#[cfg(test)]
#[path = "trigger_tests.rs"]
mod tests;
