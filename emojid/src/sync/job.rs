use std::fmt;
use std::sync::Mutex;

use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upload,
    Download,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upload => write!(f, "upload"),
            Direction::Download => write!(f, "download"),
        }
    }
}

#[derive(Debug, Error)]
#[error("{0} sync is already running")]
pub struct AlreadyRunning(pub Direction);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running {
        started_at: OffsetDateTime,
    },
    Completed {
        success: bool,
        started_at: OffsetDateTime,
        finished_at: OffsetDateTime,
    },
}

/// Non-blocking job status as surfaced to pollers. An idle slot reports
/// completed with no outcome; a terminal state keeps its outcome until the
/// next job of the same direction starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobPoll {
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

/// One direction's job slot. At most one job may be running; starting a
/// second is rejected, never queued.
#[derive(Debug)]
pub struct JobSlot {
    state: Mutex<JobState>,
}

impl Default for JobSlot {
    fn default() -> Self {
        Self {
            state: Mutex::new(JobState::Idle),
        }
    }
}

impl JobSlot {
    fn with_state<T>(&self, f: impl FnOnce(&mut JobState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| {
            // A panic while holding the lock cannot corrupt a plain enum.
            poisoned.into_inner()
        });
        f(&mut state)
    }

    pub fn try_start(&self, direction: Direction) -> Result<(), AlreadyRunning> {
        self.with_state(|state| {
            if matches!(state, JobState::Running { .. }) {
                return Err(AlreadyRunning(direction));
            }
            *state = JobState::Running {
                started_at: OffsetDateTime::now_utc(),
            };
            Ok(())
        })
    }

    pub fn finish(&self, success: bool) {
        self.with_state(|state| {
            let started_at = match *state {
                JobState::Running { started_at } => started_at,
                // finish() without a running job is a caller bug; record the
                // outcome anyway rather than losing it.
                _ => OffsetDateTime::now_utc(),
            };
            *state = JobState::Completed {
                success,
                started_at,
                finished_at: OffsetDateTime::now_utc(),
            };
        });
    }

    pub fn poll(&self) -> JobPoll {
        self.with_state(|state| match *state {
            JobState::Idle => JobPoll {
                completed: true,
                success: None,
            },
            JobState::Running { .. } => JobPoll {
                completed: false,
                success: None,
            },
            JobState::Completed { success, .. } => JobPoll {
                completed: true,
                success: Some(success),
            },
        })
    }

    pub fn snapshot(&self) -> JobState {
        self.with_state(|state| state.clone())
    }
}

/// Both directions' slots; upload and download may run concurrently.
#[derive(Debug, Default)]
pub struct JobTracker {
    upload: JobSlot,
    download: JobSlot,
}

impl JobTracker {
    pub fn slot(&self, direction: Direction) -> &JobSlot {
        match direction {
            Direction::Upload => &self.upload,
            Direction::Download => &self.download,
        }
    }
}
