/*
 * Application level replication: every write goes to the
 * master, then gets copied into each regional replica after
 * a delay. A periodic full sync repairs whatever the
 * per-article copies missed.
 */

use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use color_eyre::Result;
use derive_more::Display;
use eyre::{eyre, WrapErr};
use futures::future::join_all;
use log::{debug, error, info};
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use crate::db::{self, Pool};
use crate::db::entities::SyncReport;
use crate::geo::Region;
pub mod tracker;
use tracker::{ReplicaStatus, ReplicationTracker};

#[derive(Clone)]
pub struct ReplicaNode {
  pub region: Region,
  pub pool: Pool
}

// Which database ended up serving a read. Only used for
// logging.
#[derive(Debug, Display, Clone, Copy, PartialEq)]
pub enum ReadSource {
  #[display(fmt = "master")]
  Master,
  #[display(fmt = "replica-{}", _0)]
  Replica(Region)
}

// Cheap to clone, everything heavy is behind an Arc (the r2d2
// pools already are).
// Every operation on a replica holds that replica's lock
// from the moment it reads the master until it's done
// writing, so an older master read can never land after a
// newer one.
#[derive(Clone)]
pub struct Replicator {
  master: Pool,
  replicas: Arc<Vec<ReplicaNode>>,
  locks: Arc<Vec<Mutex<()>>>,
  tracker: Arc<ReplicationTracker>,
  delay: Duration
}

// spawn_blocking wraps our Result into its own.
fn flatten<T>(result: std::result::Result<Result<T>, JoinError>) -> Result<T> {
  result.map_err(|e| eyre!("Replication task failed to complete - {}", e))?
}

impl Replicator {

  pub fn new(
    master: Pool,
    replicas: Vec<ReplicaNode>,
    delay: Duration,
    syncing_window: Duration
  ) -> Self {
    let regions: Vec<Region> = replicas.iter().map(|r| r.region).collect();
    Self {
      master,
      locks: Arc::new(replicas.iter().map(|_| Mutex::new(())).collect()),
      replicas: Arc::new(replicas),
      tracker: Arc::new(ReplicationTracker::new(&regions, syncing_window)),
      delay
    }
  }

  pub fn master(&self) -> &Pool {
    &self.master
  }

  #[cfg(test)]
  pub fn replicas(&self) -> &[ReplicaNode] {
    &self.replicas
  }

  // The master region reads from the master, obviously. A
  // region without a replica does too.
  pub fn pool_for_region(&self, region: Region) -> (Pool, ReadSource) {
    if !region.is_master() {
      if let Some(node) = self.replicas.iter().find(|n| n.region == region) {
        return (node.pool.clone(), ReadSource::Replica(region));
      }
    }
    (self.master.clone(), ReadSource::Master)
  }

  pub fn statuses(&self) -> Vec<ReplicaStatus> {
    self.tracker.statuses()
  }

  fn record(&self, index: usize, region: Region, what: &str, result: Result<()>) {
    match result {
      Ok(_) => {
        info!("{} -> replica {}", what, region);
        self.tracker.record_success(index, Utc::now());
      },
      Err(e) => {
        error!("Replication error ({} -> replica {}) - {:?}", what, region, e);
        self.tracker.record_failure(index);
      }
    }
  }

  // Fire and forget. Each replica gets its own task that
  // waits for the replication delay, then copies whatever
  // the master holds for that id at that point. If the
  // article was deleted in the meantime the replica copy is
  // removed instead, so a late copy can't resurrect it.
  pub fn schedule(&self, article_id: i64) {
    self.tracker.mark_syncing();
    for (index, node) in self.replicas.iter().enumerate() {
      let replicator = self.clone();
      let region = node.region;
      let pool = node.pool.clone();
      tokio::spawn(async move {
        tokio::time::sleep(replicator.delay).await;
        let _guard = replicator.locks[index].lock().await;
        let master = replicator.master.clone();
        let result = flatten(
          tokio::task::spawn_blocking(move || -> Result<()> {
            match db::article_by_id(&master, article_id)? {
              Some(current) => db::upsert_article(&pool, &current).map(|_| ()),
              None => db::delete_article(&pool, article_id).map(|_| ())
            }
          }).await
        );
        replicator.record(
          index,
          region,
          &format!("Article {} copied", article_id),
          result
        );
      });
    }
  }

  // Deletes are pushed right away to every replica. Errors
  // are logged and show up in the status, the next full sync
  // will prune whatever is left.
  pub async fn propagate_delete(&self, article_id: i64) {
    self.tracker.mark_syncing();
    let tasks = self.replicas.iter().enumerate().map(|(index, node)| {
      let pool = node.pool.clone();
      async move {
        let _guard = self.locks[index].lock().await;
        flatten(
          tokio::task::spawn_blocking(move || {
            db::delete_article(&pool, article_id).map(|_| ())
          }).await
        )
      }
    });
    let results = join_all(tasks).await;
    for (index, (node, result)) in self.replicas.iter().zip(results).enumerate() {
      self.record(
        index,
        node.region,
        &format!("Article {} deleted", article_id),
        result
      );
    }
  }

  // Mirrors the master into every replica concurrently.
  // The master is read under each replica's lock, a snapshot
  // taken before a delete would put the article back.
  // Only fails when the master itself can't be read, replica
  // failures end up in the tracker.
  pub async fn full_sync(&self) -> Result<Vec<(Region, Result<SyncReport>)>> {
    let tasks = self.replicas.iter().enumerate().map(|(index, node)| {
      let master = self.master.clone();
      let pool = node.pool.clone();
      async move {
        let _guard = self.locks[index].lock().await;
        // Outer error: the master, inner error: the replica.
        tokio::task::spawn_blocking(move || -> Result<Result<(usize, SyncReport)>> {
          let articles = db::list_articles(&master)
            .context("Reading master articles for full sync")?;
          Ok(db::mirror_articles(&pool, &articles).map(|r| (articles.len(), r)))
        }).await
      }
    });
    let results = join_all(tasks).await;
    let mut reports = Vec::with_capacity(self.replicas.len());
    let mut master_error = None;
    for (index, (node, result)) in self.replicas.iter().zip(results).enumerate() {
      let result = match flatten(result) {
        Ok(result) => result,
        Err(e) => {
          master_error.get_or_insert(e);
          continue;
        }
      };
      match result {
        Ok((count, report)) => {
          if report == SyncReport::default() {
            debug!("Full sync: replica {} already up to date ({} articles)",
              node.region, count);
          } else {
            info!("Full sync: replica {} updated ({} upserted, {} pruned)",
              node.region, report.upserted, report.pruned);
          }
          self.tracker.record_success(index, Utc::now());
          reports.push((node.region, Ok(report)));
        },
        Err(e) => {
          error!("Full sync failed for replica {} - {:?}", node.region, e);
          self.tracker.record_failure(index);
          reports.push((node.region, Err(e)));
        }
      }
    }
    match master_error {
      Some(e) => Err(e),
      None => Ok(reports)
    }
  }

  // Holds a replica lock from a test, to line operations up
  // in a chosen order.
  #[cfg(test)]
  pub async fn lock_replica(&self, index: usize) -> tokio::sync::MutexGuard<'_, ()> {
    self.locks[index].lock().await
  }

}

// Background full sync. The first tick of a tokio interval
// fires immediately and the initial sync already happened
// at startup, so we skip it.
pub fn spawn_full_sync_task(replicator: Replicator, period: Duration) -> JoinHandle<()> {
  info!("Full sync scheduled every {:?}", period);
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;
    loop {
      ticker.tick().await;
      if let Err(e) = replicator.full_sync().await {
        error!("Periodic full sync failed - {:?}", e);
      }
    }
  })
}
