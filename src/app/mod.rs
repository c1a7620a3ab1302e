use actix_web::{middleware, web, App, HttpServer};
use actix_cors::Cors;
use color_eyre::Result;
use eyre::WrapErr;
use log::{debug, error, info, warn};
use std::time::Duration;
// I think we have to add crate here because
// of the other crate named "config" that we
// use as a dependency.
use crate::config::Config;
use crate::db::{self, Pool};
use crate::geo::{CountryLocator, MASTER_REGION};
use crate::geo::ip_location::IpLocator;
use crate::replication::{self, ReplicaNode, Replicator};
use crate::utils::time_utils;
use error::Error;
mod handlers;
mod dtos;
mod error;
mod helpers;
mod extractors;
mod guards;

// IP addresses allowed to make special calls (like the
// admin full sync one).
pub const ALLOWED_IP_ADDRESSES: [&'static str; 2] =
  ["127.0.0.1", "::1"];

// Declare app state struct:
pub struct AppState {
  pub replicator: Replicator,
  // None when no GeoIP database could be loaded, everybody
  // is then sent to the master region.
  pub locator: Option<Box<dyn CountryLocator>>
}

// The databases may live on a volume that isn't there yet
// when the container starts, so we insist a little.
async fn connect_with_retries(
  name: &str,
  path: &str,
  attempts: u32,
  retry_delay: Duration
) -> Result<Pool> {
  let mut attempt = 1;
  loop {
    let result = db::open_pool(path)
      .and_then(|pool| db::ensure_schema(&pool).map(|_| pool));
    match result {
      Ok(pool) => {
        info!("Connected to {} database at {}", name, path);
        return Ok(pool);
      },
      Err(e) if attempt < attempts => {
        warn!("Could not open {} database at {} (attempt {}/{}) - {}",
          name, path, attempt, attempts, e);
        tokio::time::sleep(retry_delay).await;
        attempt += 1;
      },
      Err(e) => {
        return Err(e).with_context(
          || format!("Giving up on {} database after {} attempts", name, attempts)
        );
      }
    }
  }
}

fn open_locator(config: &Config) -> Option<Box<dyn CountryLocator>> {
  let path = match config.iploc_path() {
    Some(p) => p,
    None => {
      info!("IPLOC_PATH is empty, every client will be served by {}", MASTER_REGION);
      return None;
    }
  };
  match IpLocator::open(path) {
    Ok(locator) => Some(Box::new(locator)),
    // Not fatal, the demo still works with everyone in
    // the master region and the region query parameter.
    Err(e) => {
      warn!("GeoIP database unavailable, falling back to {} - {:?}",
        MASTER_REGION, e);
      None
    }
  }
}

// Function to start the server.
// Has to be async because there should be a .await at the end.
pub async fn run() -> Result<()> {
  let config = Config::from_env()?;
  debug!("Current config: {:?}", config);
  let specs = config.replica_specs()?;
  let attempts = config.connect_attempts.max(1);

  let master = connect_with_retries(
    "master",
    &config.master_db_path,
    attempts,
    config.connect_retry()
  ).await?;
  let mut replicas = Vec::with_capacity(specs.len());
  for spec in specs {
    let pool = connect_with_retries(
      &format!("replica {}", spec.region),
      &spec.db_path,
      attempts,
      config.connect_retry()
    ).await?;
    replicas.push(ReplicaNode { region: spec.region, pool });
  }

  let seeded = db::seed_default_articles(
    &master,
    MASTER_REGION.as_str(),
    time_utils::current_timestamp()
  )?;
  if seeded > 0 {
    info!("Seeded {} default articles in the master database", seeded);
  }

  let replicator = Replicator::new(
    master,
    replicas,
    config.replication_delay(),
    config.syncing_window()
  );
  // Replicas start out in whatever state they were left in,
  // bring them up to date before serving anything.
  if let Err(e) = replicator.full_sync().await {
    error!("Initial full sync failed - {:?}", e);
  }
  if config.full_sync_interval_secs > 0 {
    replication::spawn_full_sync_task(replicator.clone(), config.full_sync_interval());
  } else {
    warn!("FULL_SYNC_INTERVAL_SECS is 0, periodic full sync disabled");
  }

  let app_state = web::Data::new(
    AppState {
      replicator,
      locator: open_locator(&config)
    }
  );

  info!("Listening on {}", config.bind_address);

  HttpServer::new(move|| {
    App::new()
      .app_data(app_state.clone())
      // The client is served from another origin.
      .wrap(Cors::permissive())
      .wrap(middleware::Logger::default())
      .service(web::scope("/api").configure(api_config))
      .default_service(web::route().to(handlers::not_found))
  })
  .bind(&config.bind_address)?
  .run()
  .await
  .context("Start Actix web server")

}

// Route configuration, everything lives under /api.
pub fn api_config(cfg: &mut web::ServiceConfig) {
  // Create the guard that cause protected endpoints to respond with a 404
  // when the client IP address isn't allowed.
  let ip_guard = guards::IPRestrictedGuard::new(&ALLOWED_IP_ADDRESSES);

  // Extractor failures would otherwise answer in plain
  // text, the client expects the JSON error format.
  cfg.app_data(web::PathConfig::default().error_handler(|err, _| {
      Error::BadRequest(format!("Invalid path arguments - {}", err)).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _| {
      Error::BadRequest(format!("Invalid query string arguments - {}", err)).into()
    }))
    .app_data(web::JsonConfig::default().error_handler(|err, _| {
      Error::BadRequest(format!("Invalid JSON body - {}", err)).into()
    }));

  cfg.route("/health", web::get().to(handlers::health))
    .route("/region", web::get().to(handlers::region))
    .route("/articles", web::get().to(handlers::articles))
    .route("/articles", web::post().to(handlers::create_article))
    .route("/articles/{id}", web::delete().to(handlers::delete_article))
    .route("/replication-status", web::get().to(handlers::replication_status))
    .route("/latency", web::get().to(handlers::latency))
    .route("/login", web::post().to(handlers::login))
    .route("/admin/full-sync", web::post().guard(ip_guard).to(handlers::admin_full_sync));
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use std::time::Instant;
  use tempfile::TempDir;

  #[tokio::test]
  async fn gives_up_after_configured_attempts() {
    let dir = TempDir::new().unwrap();
    // A file where the database directory should be, no
    // amount of retrying fixes that.
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "not a directory").unwrap();
    let path = blocker.join("master.db");
    let started = Instant::now();
    let result = connect_with_retries(
      "master",
      path.to_str().unwrap(),
      3,
      Duration::from_millis(20)
    ).await;
    let err = result.err().unwrap();
    assert_eq!("Giving up on master database after 3 attempts", err.to_string());
    // Two waits between three attempts:
    assert!(started.elapsed() >= Duration::from_millis(40));
  }

  #[tokio::test]
  async fn connects_on_first_attempt() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("replicas/us.db");
    let started = Instant::now();
    let pool = connect_with_retries(
      "replica us",
      path.to_str().unwrap(),
      3,
      Duration::from_secs(5)
    ).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    // Schema is there:
    assert_eq!(0, db::article_count(&pool).unwrap());
  }
}
