#![allow(dead_code)]
mod config;
mod db;
mod geo;
mod utils;

use std::env;
use color_eyre::Result;
use eyre::{eyre, WrapErr};
use dotenv::dotenv;
use log::{error, info};
use getopts::Options;
use crate::config::Config;
use crate::db::Pool;
use crate::db::entities::SyncReport;
use crate::geo::{Region, MASTER_REGION};

// Copy pasted this from getopts doc.
fn print_usage(program: &str, opts: Options) {
  let brief = format!("Usage: {} [options]", program);
  print!("{}", opts.usage(&brief));
}

// No retries here, if a database isn't reachable the
// person running this wants to know right away.
fn open_nodes(config: &Config) -> Result<(Pool, Vec<(Region, Pool)>)> {
  let master = db::open_pool(&config.master_db_path)?;
  db::ensure_schema(&master)?;
  let mut replicas = Vec::new();
  for spec in config.replica_specs()? {
    let pool = db::open_pool(&spec.db_path)?;
    db::ensure_schema(&pool)
      .with_context(|| format!("Preparing replica {}", spec.region))?;
    replicas.push((spec.region, pool));
  }
  Ok((master, replicas))
}

// Same thing the server does periodically, minus the
// tracker: one pass, one replica at a time.
fn sync_replicas(
  master: &Pool,
  replicas: &[(Region, Pool)]
) -> Result<Vec<(Region, Result<SyncReport>)>> {
  let articles = db::list_articles(master)
    .context("Reading master articles")?;
  info!("Master holds {} articles", articles.len());
  Ok(
    replicas.iter()
      .map(|(region, pool)| (*region, db::mirror_articles(pool, &articles)))
      .collect()
  )
}

fn status_lines(master: &Pool, replicas: &[(Region, Pool)]) -> Result<Vec<String>> {
  let master_count = db::article_count(master)?;
  let mut lines = vec![
    format!("{} (master): {} articles", MASTER_REGION.label(), master_count)
  ];
  for (region, pool) in replicas {
    let line = match db::article_count(pool) {
      Ok(count) if count == master_count => format!("{}: {} articles", region.label(), count),
      Ok(count) => format!(
        "{}: {} articles (master has {})",
        region.label(),
        count,
        master_count
      ),
      Err(e) => format!("{}: unreadable - {}", region.label(), e)
    };
    lines.push(line);
  }
  Ok(lines)
}

/**
 * Binary meant to inspect and repair the replicas without
 * starting the web server.
 */
fn main() -> Result<()> {
  dotenv().ok();
  env_logger::init();

  let args: Vec<String> = env::args().collect();
  let program = args[0].clone();
  let mut opts = Options::new();
  opts.optflag("f", "full-sync", "Mirror the master database into every replica");
  opts.optflag("s", "status", "Print the article count of every node");
  opts.optflag("h", "help", "Program usage");
  let opt_matches = opts.parse(&args[1..])?;
  if opt_matches.opt_present("h")
    || !(opt_matches.opt_present("f") || opt_matches.opt_present("s")) {
    print_usage(&program, opts);
    return Ok(());
  }

  let config = Config::from_env()?;
  let (master, replicas) = open_nodes(&config)?;

  if opt_matches.opt_present("f") {
    let mut failures = 0;
    for (region, result) in sync_replicas(&master, &replicas)? {
      match result {
        Ok(report) => println!(
          "{}: {} upserted, {} pruned",
          region.label(),
          report.upserted,
          report.pruned
        ),
        Err(e) => {
          error!("Full sync failed for replica {} - {:?}", region, e);
          println!("{}: FAILED - {}", region.label(), e);
          failures += 1;
        }
      }
    }
    if failures > 0 {
      return Err(eyre!("{} replica(s) could not be synced", failures));
    }
  }

  if opt_matches.opt_present("s") {
    for line in status_lines(&master, &replicas)? {
      println!("{}", line);
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::tests::{new_article, temp_pool};
  use tempfile::TempDir;

  #[test]
  fn sync_then_status() {
    let dir = TempDir::new().unwrap();
    let master = temp_pool(&dir, "master.db");
    db::seed_default_articles(&master, "eu", 1000).unwrap();
    let replicas = vec![
      (Region::Us, temp_pool(&dir, "us.db")),
      (Region::Tr, temp_pool(&dir, "tr.db"))
    ];
    db::insert_article(&replicas[1].1, &new_article("only on tr", 10)).unwrap();

    let lines = status_lines(&master, &replicas).unwrap();
    assert_eq!("EU (master): 5 articles", lines[0]);
    assert_eq!("US: 0 articles (master has 5)", lines[1]);

    let reports = sync_replicas(&master, &replicas).unwrap();
    assert_eq!(Region::Us, reports[0].0);
    assert_eq!(5, reports[0].1.as_ref().unwrap().upserted);
    assert!(reports[1].1.is_ok());

    let lines = status_lines(&master, &replicas).unwrap();
    assert_eq!("US: 5 articles", lines[1]);
    assert_eq!("TR: 5 articles", lines[2]);
  }
}
