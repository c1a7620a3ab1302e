use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use chrono::{DateTime, Utc};
use derive_more::Display;
use log::error;
use serde::Serialize;
use crate::geo::Region;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
  #[display(fmt = "ok")]
  Ok,
  #[display(fmt = "syncing")]
  Syncing,
  #[display(fmt = "error")]
  Error
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaStatus {
  pub region: Region,
  pub state: SyncState,
  pub last_synced: Option<DateTime<Utc>>
}

struct ReplicaState {
  region: Region,
  // Last write or delete that had to be propagated.
  last_event: Option<Instant>,
  // Last time something made it into the replica.
  last_synced: Option<DateTime<Utc>>,
  failing: bool
}

/**
 * Keeps track of what happened to every replica so the
 * status endpoint has something to say. Indexes are the
 * replica positions in the Replicator.
 *
 * A replica is "syncing" for `window` after any write,
 * then "error" if the last attempt to reach it failed,
 * "ok" otherwise.
 */
pub struct ReplicationTracker {
  window: Duration,
  replicas: Mutex<Vec<ReplicaState>>
}

impl ReplicationTracker {

  pub fn new(regions: &[Region], window: Duration) -> Self {
    Self {
      window,
      replicas: Mutex::new(
        regions.iter()
          .map(|region| ReplicaState {
            region: *region,
            last_event: None,
            last_synced: None,
            failing: false
          })
          .collect()
      )
    }
  }

  // Nobody panics while holding this lock, but if it ever
  // happens the data is still usable.
  fn states(&self) -> MutexGuard<'_, Vec<ReplicaState>> {
    match self.replicas.lock() {
      Ok(guard) => guard,
      Err(poisoned) => {
        error!("Replication tracker lock was poisoned - SHOULD NEVER HAPPEN");
        poisoned.into_inner()
      }
    }
  }

  pub fn mark_syncing(&self) {
    self.mark_syncing_at(Instant::now());
  }

  pub fn mark_syncing_at(&self, now: Instant) {
    for state in self.states().iter_mut() {
      state.last_event = Some(now);
    }
  }

  pub fn record_success(&self, index: usize, at: DateTime<Utc>) {
    if let Some(state) = self.states().get_mut(index) {
      state.failing = false;
      state.last_synced = Some(at);
    }
  }

  pub fn record_failure(&self, index: usize) {
    if let Some(state) = self.states().get_mut(index) {
      state.failing = true;
    }
  }

  pub fn statuses(&self) -> Vec<ReplicaStatus> {
    self.statuses_at(Instant::now())
  }

  pub fn statuses_at(&self, now: Instant) -> Vec<ReplicaStatus> {
    self.states().iter()
      .map(|state| {
        let recent_event = state.last_event
          .map(|at| now.saturating_duration_since(at) < self.window)
          .unwrap_or(false);
        let sync_state = if recent_event {
          SyncState::Syncing
        } else if state.failing {
          SyncState::Error
        } else {
          SyncState::Ok
        };
        ReplicaStatus {
          region: state.region,
          state: sync_state,
          last_synced: state.last_synced
        }
      })
      .collect()
  }

}
