// Adding the context method to errors:
use eyre::{WrapErr, eyre};
use color_eyre::Result;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use crate::geo::Region;

#[derive(Debug, Deserialize)]
pub struct Config {
  pub bind_address: String,
  pub master_db_path: String,
  // Comma separated, one SQLite file per replica.
  pub replica_db_paths: String,
  // Comma separated too, same order as the paths.
  pub replica_regions: String,
  // Empty string disables the GeoIP lookups.
  pub iploc_path: String,
  pub replication_delay_ms: u64,
  pub full_sync_interval_secs: u64,
  pub syncing_window_secs: u64,
  pub connect_attempts: u32,
  pub connect_retry_secs: u64
}

// One replica as described by the configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaSpec {
  pub region: Region,
  pub db_path: String
}

impl Config {

  pub fn from_env() -> Result<Config> {
    // RUST_LOG is already set in main.rs if it
    // was absent.
    // You have to use lowercase when compared to what's
    // in the .env file.
    // MASTER_DB_PATH and REPLICA_DB_PATHS have no default
    // on purpose, deserialization fails without them.
    let c = config::Config::builder()
      .set_default("bind_address", "0.0.0.0:8080")?
      .set_default("replica_regions", "us,asia,sa,tr,africa")?
      .set_default("iploc_path", "")?
      .set_default("replication_delay_ms", 2000)?
      .set_default("full_sync_interval_secs", 10)?
      .set_default("syncing_window_secs", 3)?
      .set_default("connect_attempts", 10)?
      .set_default("connect_retry_secs", 2)?
      .add_source(config::Environment::default())
      .build()
      .context("Reading configuration sources")?;
    // The error has to be given a context for
    // color_eyre to work here:
    c.try_deserialize()
      .context("Loading configuration from env")
  }

  pub fn replica_specs(&self) -> Result<Vec<ReplicaSpec>> {
    let paths = split_list(&self.replica_db_paths);
    let regions = split_list(&self.replica_regions);
    if paths.is_empty() {
      return Err(eyre!("REPLICA_DB_PATHS doesn't contain any path"));
    }
    if paths.len() != regions.len() {
      return Err(eyre!(
        "Got {} replica paths but {} replica regions",
        paths.len(),
        regions.len()
      ));
    }
    let mut seen = HashSet::new();
    let mut specs = Vec::with_capacity(paths.len());
    for (path, region_str) in paths.into_iter().zip(regions) {
      let region: Region = region_str.parse()
        .context("Parsing REPLICA_REGIONS")?;
      if region.is_master() {
        return Err(eyre!("{} is the master region and can't have a replica", region));
      }
      if !seen.insert(region) {
        return Err(eyre!("Region {} has more than one replica", region));
      }
      specs.push(ReplicaSpec {
        region,
        db_path: path.to_string()
      });
    }
    Ok(specs)
  }

  pub fn iploc_path(&self) -> Option<&str> {
    let path = self.iploc_path.trim();
    if path.is_empty() { None } else { Some(path) }
  }

  pub fn replication_delay(&self) -> Duration {
    Duration::from_millis(self.replication_delay_ms)
  }

  pub fn full_sync_interval(&self) -> Duration {
    Duration::from_secs(self.full_sync_interval_secs)
  }

  pub fn syncing_window(&self) -> Duration {
    Duration::from_secs(self.syncing_window_secs)
  }

  pub fn connect_retry(&self) -> Duration {
    Duration::from_secs(self.connect_retry_secs)
  }

}

fn split_list(value: &str) -> Vec<&str> {
  value.split(',')
    .map(|v| v.trim())
    .filter(|v| !v.is_empty())
    .collect()
}
