// FILE: src/state.rs

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use serde::Serialize;
use crate::storage::FileRegistry;

/// Shared registry handle. One per process, cloned into every consumer.
pub type SharedRegistry = Arc<FileRegistry>;

/// What the background lane is busy with, for status displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Activity {
    Idle,
    Hashing,
    Archiving,
}

impl Activity {
    pub fn as_u8(self) -> u8 {
        match self {
            Activity::Idle => 0,
            Activity::Hashing => 1,
            Activity::Archiving => 2,
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Activity::Hashing,
            2 => Activity::Archiving,
            _ => Activity::Idle,
        }
    }
}

/// Activity shared between the keeper and its workers. Passes may
/// overlap, so each kind keeps a count of running passes.
#[derive(Debug, Clone, Default)]
pub struct ActivityState(Arc<ActivityCounters>);

#[derive(Debug, Default)]
struct ActivityCounters {
    hashing: AtomicUsize,
    archiving: AtomicUsize,
    latest: AtomicU8,
}

impl ActivityCounters {
    fn counter(&self, activity: Activity) -> Option<&AtomicUsize> {
        match activity {
            Activity::Idle => None,
            Activity::Hashing => Some(&self.hashing),
            Activity::Archiving => Some(&self.archiving),
        }
    }

    fn running(&self, activity: Activity) -> bool {
        self.counter(activity).map_or(false, |c| c.load(Ordering::Acquire) > 0)
    }
}

impl ActivityState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently started pass that is still running, else any
    /// running pass, else idle.
    pub fn get(&self) -> Activity {
        let latest = Activity::from_u8(self.0.latest.load(Ordering::Acquire));
        if self.0.running(latest) {
            return latest;
        }
        [Activity::Hashing, Activity::Archiving]
            .into_iter()
            .find(|a| self.0.running(*a))
            .unwrap_or(Activity::Idle)
    }

    /// Marks `activity` as running until the returned guard drops,
    /// whatever the outcome.
    pub fn enter(&self, activity: Activity) -> ActivityGuard {
        if let Some(counter) = self.0.counter(activity) {
            counter.fetch_add(1, Ordering::AcqRel);
        }
        self.0.latest.store(activity.as_u8(), Ordering::Release);
        ActivityGuard { state: self.clone(), activity }
    }
}

pub struct ActivityGuard {
    state: ActivityState,
    activity: Activity,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        if let Some(counter) = self.state.0.counter(self.activity) {
            counter.fetch_sub(1, Ordering::AcqRel);
        }
    }
}
