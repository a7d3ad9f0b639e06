//! Keyed one-shot jobs on top of `tokio-cron-scheduler`.
//!
//! The scheduler itself only knows job uuids. `JobRegistry` adds the
//! deterministic keys (`reminder_<id>`, `habit_reminder_<user_id>`, ...) and
//! keeps at most one outstanding job per key: registering a key that is
//! already taken removes the old job first. Fired jobs carry no behaviour of
//! their own; they are handed to the dispatcher over a channel and run on the
//! process runtime.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::utils::datetime::to_db_timestamp;
use crate::utils::logging::{log_job_error, log_job_event};

/// Deterministic identity of a scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKey {
    /// One-off reminder, by reminder id
    Reminder(i64),
    /// Daily habit check-in, by user id
    HabitReminder(i64),
    /// Sunday summary, by user id
    WeeklySummary(i64),
    /// Daily deadline sweep, by user id
    TaskDeadline(i64),
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKey::Reminder(id) => write!(f, "reminder_{id}"),
            JobKey::HabitReminder(user_id) => write!(f, "habit_reminder_{user_id}"),
            JobKey::WeeklySummary(user_id) => write!(f, "weekly_summary_{user_id}"),
            JobKey::TaskDeadline(user_id) => write!(f, "task_deadline_{user_id}"),
        }
    }
}

impl FromStr for JobKey {
    type Err = ScheduleError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || ScheduleError::InvalidKey(raw.to_string());
        let (prefix, id) = raw.rsplit_once('_').ok_or_else(invalid)?;
        let id: i64 = id.parse().map_err(|_| invalid())?;

        match prefix {
            "reminder" => Ok(JobKey::Reminder(id)),
            "habit_reminder" => Ok(JobKey::HabitReminder(id)),
            "weekly_summary" => Ok(JobKey::WeeklySummary(id)),
            "task_deadline" => Ok(JobKey::TaskDeadline(id)),
            _ => Err(invalid()),
        }
    }
}

/// A job that reached its fire time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiredJob {
    pub key: JobKey,
    pub job_id: Uuid,
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("scheduler backend error: {0}")]
    Backend(String),
    #[error("unknown job key '{0}'")]
    InvalidKey(String),
}

fn backend(error: impl fmt::Display) -> ScheduleError {
    ScheduleError::Backend(error.to_string())
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    job_id: Uuid,
    fire_at: DateTime<Utc>,
}

pub struct JobRegistry {
    scheduler: JobScheduler,
    jobs: Mutex<HashMap<JobKey, Entry>>,
    fired_tx: mpsc::UnboundedSender<FiredJob>,
}

impl JobRegistry {
    /// Creates the registry and the receiving end for fired jobs.
    pub async fn new() -> Result<(Self, mpsc::UnboundedReceiver<FiredJob>), ScheduleError> {
        let scheduler = JobScheduler::new().await.map_err(backend)?;
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();

        let registry = Self {
            scheduler,
            jobs: Mutex::new(HashMap::new()),
            fired_tx,
        };
        Ok((registry, fired_rx))
    }

    pub async fn start(&self) -> Result<(), ScheduleError> {
        self.scheduler.start().await.map_err(backend)
    }

    /// Registers `key` to fire once at `fire_at`, replacing any job under it.
    ///
    /// Times already in the past fire on the next scheduler tick.
    pub async fn schedule_at(&self, key: JobKey, fire_at: DateTime<Utc>) -> Result<Uuid, ScheduleError> {
        let delay = (fire_at - Utc::now()).to_std().unwrap_or(StdDuration::ZERO);
        let fired_tx = self.fired_tx.clone();

        let job = Job::new_one_shot_async(delay, move |job_id, _scheduler| {
            let fired_tx = fired_tx.clone();
            Box::pin(async move {
                if fired_tx.send(FiredJob { key, job_id }).is_err() {
                    tracing::warn!("Dispatcher is gone, dropping fired job {}", key);
                }
            })
        })
        .map_err(backend)?;

        // Held across remove + add so two registrations for one key cannot interleave.
        let mut jobs = self.jobs.lock().await;

        let replaced = jobs.remove(&key);
        if let Some(previous) = replaced {
            if let Err(e) = self.scheduler.remove(&previous.job_id).await {
                log_job_error("remove", &key.to_string(), &e.to_string());
            }
        }

        let job_id = self.scheduler.add(job).await.map_err(backend)?;
        jobs.insert(key, Entry { job_id, fire_at });

        let event = if replaced.is_some() { "replaced" } else { "registered" };
        log_job_event(event, &key.to_string(), Some(&format!("fires at {}", to_db_timestamp(&fire_at))));

        Ok(job_id)
    }

    /// Removes the job under `key`; `false` when nothing was registered.
    pub async fn cancel(&self, key: JobKey) -> Result<bool, ScheduleError> {
        let mut jobs = self.jobs.lock().await;

        let Some(entry) = jobs.remove(&key) else {
            return Ok(false);
        };
        self.scheduler.remove(&entry.job_id).await.map_err(backend)?;
        log_job_event("cancelled", &key.to_string(), None);
        Ok(true)
    }

    /// Forgets a fired job's entry.
    ///
    /// Returns `false` when the key has since been re-registered or
    /// cancelled, which makes the fired job stale.
    pub async fn complete(&self, fired: &FiredJob) -> bool {
        let mut jobs = self.jobs.lock().await;

        match jobs.get(&fired.key) {
            Some(entry) if entry.job_id == fired.job_id => {
                jobs.remove(&fired.key);
                true
            }
            _ => false,
        }
    }

    pub async fn is_scheduled(&self, key: JobKey) -> bool {
        self.jobs.lock().await.contains_key(&key)
    }

    pub async fn scheduled_at(&self, key: JobKey) -> Option<DateTime<Utc>> {
        self.jobs.lock().await.get(&key).map(|entry| entry.fire_at)
    }

    pub async fn job_id(&self, key: JobKey) -> Option<Uuid> {
        self.jobs.lock().await.get(&key).map(|entry| entry.job_id)
    }

    /// Number of outstanding jobs.
    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }

    pub async fn shutdown(&self) -> Result<(), ScheduleError> {
        self.jobs.lock().await.clear();
        let mut scheduler = self.scheduler.clone();
        scheduler.shutdown().await.map_err(backend)
    }
}
