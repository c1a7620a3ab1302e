mod config;
mod db;
mod geo;
mod replication;
mod utils;
mod app;
use color_eyre::Result;
use dotenv::dotenv;
use std::env;

#[actix_web::main]
async fn main() -> Result<()> {
  // Load .env file if present. Done before anything else so
  // that RUST_LOG can come from there too.
  dotenv().ok();
  // Set default log level to info if not set:
  if env::var("RUST_LOG").is_err() {
    env::set_var("RUST_LOG", "info");
  }
  env_logger::init();
  color_eyre::install()?;

  app::run().await
}
