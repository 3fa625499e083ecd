//! Advisory polling decisions for monitored entities.
//!
//! The scheduler never performs I/O: it is handed the last successful poll
//! time for each entity and reports whether a poll is due and when the next
//! aligned poll should happen.

use crate::boundary::next_boundary;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollSchedule {
    pub interval_minutes: u32,
    #[serde(default)]
    pub tolerance_seconds: u32,
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl PollSchedule {
    pub fn new(interval_minutes: u32, tolerance_seconds: u32, utc_offset_minutes: i32) -> Self {
        Self {
            interval_minutes,
            tolerance_seconds,
            utc_offset_minutes,
        }
    }

    /// Minimum age of the last poll before the next one is due.
    fn due_after(&self) -> Duration {
        Duration::milliseconds(
            self.interval_minutes as i64 * 60_000 - self.tolerance_seconds as i64 * 1000,
        )
    }

    pub fn should_poll(&self, last_poll: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last_poll {
            None => true,
            Some(last) => now - last >= self.due_after(),
        }
    }

    pub fn next_poll(&self, now: DateTime<Utc>) -> DateTime<FixedOffset> {
        next_boundary(now, self.interval_minutes, self.utc_offset_minutes)
    }

    pub fn decide(
        &self,
        last_poll: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        trigger: PollTrigger,
    ) -> PollDecision {
        let next_poll = self.next_poll(now);
        let (should_poll, reason) = match (trigger, last_poll) {
            (PollTrigger::User, _) => (true, "user requested".to_string()),
            (PollTrigger::Background, None) => (true, "never polled".to_string()),
            (PollTrigger::Background, Some(last)) => {
                let elapsed = (now - last).num_seconds();
                if self.should_poll(last_poll, now) {
                    (
                        true,
                        format!("interval elapsed ({}s since last poll)", elapsed),
                    )
                } else {
                    let remaining = (self.due_after() - (now - last)).num_seconds();
                    (
                        false,
                        format!(
                            "not due (polled {}s ago, due in {}s)",
                            elapsed, remaining
                        ),
                    )
                }
            }
        };

        PollDecision {
            should_poll,
            reason,
            next_poll,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTrigger {
    Background,
    /// Bypasses the due check; the reported next poll is unchanged.
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollDecision {
    pub should_poll: bool,
    pub reason: String,
    pub next_poll: DateTime<FixedOffset>,
}

/// Schedules for every monitored entity, built explicitly by the caller.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    schedules: HashMap<String, PollSchedule>,
}

impl Scheduler {
    pub fn new(schedules: HashMap<String, PollSchedule>) -> Self {
        Self { schedules }
    }

    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.schedules.keys().map(String::as_str)
    }

    pub fn schedule(&self, entity: &str) -> Option<&PollSchedule> {
        self.schedules.get(entity)
    }

    /// `None` when the entity has no declared schedule.
    pub fn evaluate(
        &self,
        entity: &str,
        last_poll: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        trigger: PollTrigger,
    ) -> Option<PollDecision> {
        self.schedules
            .get(entity)
            .map(|schedule| schedule.decide(last_poll, now, trigger))
    }

    /// Background decisions for all entities, ordered by entity name.
    pub fn evaluate_all(
        &self,
        last_polls: &HashMap<String, DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> BTreeMap<String, PollDecision> {
        self.schedules
            .iter()
            .map(|(entity, schedule)| {
                let last = last_polls.get(entity).copied();
                (
                    entity.clone(),
                    schedule.decide(last, now, PollTrigger::Background),
                )
            })
            .collect()
    }
}
