use serde::{Deserialize, Serialize};

// Same row shape on the master and on every replica.
// Dates are UNIX timestamps, the DTOs deal with
// formatting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
  pub id: i64,
  pub title: String,
  pub summary: String,
  pub content_long: String,
  pub author: String,
  pub region: String,
  pub created_at: i64
}

// What we need to insert an article on the master, the
// id comes from SQLite.
#[derive(Debug, Clone)]
pub struct NewArticle {
  pub title: String,
  pub summary: String,
  pub content_long: String,
  pub author: String,
  pub region: String,
  pub created_at: i64
}

// Outcome of mirroring the master into one replica.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct SyncReport {
  pub upserted: usize,
  pub pruned: usize
}
