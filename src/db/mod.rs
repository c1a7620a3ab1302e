use rusqlite::{params, OptionalExtension, Params, Row, TransactionBehavior};
use r2d2_sqlite::SqliteConnectionManager;
use eyre::WrapErr;
use color_eyre::Result;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;
pub mod entities;
mod mappers;
use entities::*;
use mappers::map_article;

// Type alias to make function signatures much clearer:
pub type Pool = r2d2::Pool<SqliteConnectionManager>;

/**
 * All of the DB stuff is blocking. Callers running on
 * an async runtime go through web::block or spawn_blocking.
 *
 * The master and the replicas share the exact same schema,
 * replicas just never get their ids from AUTOINCREMENT.
 * AUTOINCREMENT (and not just INTEGER PRIMARY KEY) matters:
 * a deleted id must never come back on the master or an old
 * replica copy could be mistaken for the new article.
 */
const SCHEMA: &str = "
  CREATE TABLE IF NOT EXISTS articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    summary TEXT NOT NULL,
    content_long TEXT NOT NULL,
    author TEXT NOT NULL,
    region TEXT NOT NULL,
    created_at INTEGER NOT NULL
  );
  CREATE INDEX IF NOT EXISTS idx_articles_created_at
    ON articles (created_at);
";

const ARTICLE_FIELDS: &str =
  "id, title, summary, content_long, author, region, created_at";

// The WHERE on the update part makes unchanged rows report
// 0 affected rows, which is how the full sync knows what it
// actually did.
const UPSERT_ARTICLE: &str = "
  INSERT INTO articles (id, title, summary, content_long, author, region, created_at)
  VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
  ON CONFLICT(id) DO UPDATE SET
    title = excluded.title,
    summary = excluded.summary,
    content_long = excluded.content_long,
    author = excluded.author,
    region = excluded.region,
    created_at = excluded.created_at
  WHERE title IS NOT excluded.title
    OR summary IS NOT excluded.summary
    OR content_long IS NOT excluded.content_long
    OR author IS NOT excluded.author
    OR region IS NOT excluded.region
    OR created_at IS NOT excluded.created_at
";

// Demo content, only ever inserted on the master. The
// replicas get it through the initial full sync.
const DEFAULT_ARTICLES: [(&str, &str, &str); 5] = [
  (
    "Next Generation Replication System",
    "Data is now copied all around the world in near real time.",
    "Admin"
  ),
  (
    "Global Data Synchronization",
    "Data in the Asia and US regions gets updated within seconds.",
    "System"
  ),
  (
    "Distributed Systems with Rust and SQLite",
    "This demo shows application level replication from one master to regional replicas.",
    "DemoUser"
  ),
  (
    "Data Consistency Test",
    "The eventual consistency mechanism works as expected.",
    "Tester"
  ),
  (
    "First Article for the TR Region",
    "The Turkish replica synchronizes with a two second delay.",
    "Umut"
  )
];

// Creates the parent directory if needed since SQLite
// won't do it for us.
pub fn open_pool(path: &str) -> Result<Pool> {
  if let Some(parent) = Path::new(path).parent() {
    if !parent.as_os_str().is_empty() {
      fs::create_dir_all(parent)
        .with_context(|| format!("Creating database directory for {}", path))?;
    }
  }
  // Replication tasks and HTTP workers write to the same
  // files, wait a bit instead of failing with SQLITE_BUSY.
  // WAL keeps readers going while a replica is being written.
  // journal_mode answers with a row, hence the _and_check.
  let manager = SqliteConnectionManager::file(path)
    .with_init(|conn| {
      conn.busy_timeout(Duration::from_secs(5))?;
      conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
      Ok(())
    });
  Pool::builder()
    .max_size(8)
    .build(manager)
    .with_context(|| format!("Opening database {}", path))
}

pub fn ensure_schema(pool: &Pool) -> Result<()> {
  let conn = pool.get()?;
  conn.execute_batch(SCHEMA)
    .context("Creating articles schema")
}

// Stole most of the signature from the rusqlite doc.
fn select_many<T, P, F>(
  pool: &Pool,
  query: &str,
  params: P,
  mapper: F
) -> Result<Vec<T>>
  where
    P: Params,
    F: FnMut(&Row<'_>) -> Result<T, rusqlite::Error>,
{
  let conn = pool.get()?;
  let mut stmt = conn.prepare(query)?;
  let rows = stmt.query_map(params, mapper)
    .and_then(Iterator::collect)
    .context("Generic select_many query");
  rows
}

// Returns how many articles were actually inserted, running
// it on an already seeded database is a no-op.
pub fn seed_default_articles(
  pool: &Pool,
  region: &str,
  now: i64
) -> Result<usize> {
  let conn = pool.get()?;
  let mut stmt = conn.prepare(
    "INSERT INTO articles (title, summary, content_long, author, region, created_at)
    SELECT ?1, ?2, ?2, ?3, ?4, ?5
    WHERE NOT EXISTS (SELECT 1 FROM articles WHERE title = ?1)"
  )?;
  let mut inserted = 0;
  for (title, summary, author) in DEFAULT_ARTICLES.iter() {
    inserted += stmt.execute(params![title, summary, author, region, now])
      .with_context(|| format!("Seeding article {}", title))?;
  }
  Ok(inserted)
}

pub fn insert_article(
  pool: &Pool,
  article: &NewArticle
) -> Result<Article> {
  let conn = pool.get()?;
  conn.execute(
    "INSERT INTO articles (title, summary, content_long, author, region, created_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    params![
      article.title,
      article.summary,
      article.content_long,
      article.author,
      article.region,
      article.created_at
    ]
  ).context("Inserting article on master")?;
  Ok(Article {
    id: conn.last_insert_rowid(),
    title: article.title.clone(),
    summary: article.summary.clone(),
    content_long: article.content_long.clone(),
    author: article.author.clone(),
    region: article.region.clone(),
    created_at: article.created_at
  })
}

// Returns the amount of rows that changed, 0 if the replica
// already had an identical copy.
pub fn upsert_article(
  pool: &Pool,
  article: &Article
) -> Result<usize> {
  let conn = pool.get()?;
  conn.execute(
    UPSERT_ARTICLE,
    params![
      article.id,
      article.title,
      article.summary,
      article.content_long,
      article.author,
      article.region,
      article.created_at
    ]
  ).with_context(|| format!("Upserting article {}", article.id))
}

pub fn delete_article(
  pool: &Pool,
  article_id: i64
) -> Result<usize> {
  let conn = pool.get()?;
  conn.execute(
    "DELETE FROM articles WHERE id = ?1",
    params![article_id]
  ).with_context(|| format!("Deleting article {}", article_id))
}

pub fn list_articles(pool: &Pool) -> Result<Vec<Article>> {
  select_many(
    pool,
    &format!(
      "SELECT {} FROM articles ORDER BY created_at DESC, id DESC",
      ARTICLE_FIELDS
    ),
    [],
    map_article
  )
}

pub fn article_by_id(
  pool: &Pool,
  article_id: i64
) -> Result<Option<Article>> {
  let conn = pool.get()?;
  conn.query_row(
    &format!("SELECT {} FROM articles WHERE id = ?1", ARTICLE_FIELDS),
    params![article_id],
    map_article
  )
    .optional()
    .with_context(|| format!("Fetching article {}", article_id))
}

pub fn article_count(pool: &Pool) -> Result<i64> {
  let conn = pool.get()?;
  let count: i64 = conn.query_row(
    "SELECT count(*) FROM articles",
    [],
    |row| row.get(0)
  )?;
  Ok(count)
}

// Makes the replica hold exactly the given article set, in
// a single transaction so readers never see half a sync.
pub fn mirror_articles(
  pool: &Pool,
  articles: &[Article]
) -> Result<SyncReport> {
  let mut conn = pool.get()?;
  // IMMEDIATE takes the write lock upfront. A deferred one
  // would read first and then fail to upgrade (SQLITE_BUSY,
  // busy_timeout doesn't apply) whenever a copy or a delete
  // hits the same replica.
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let mut report = SyncReport::default();
  let existing_ids: Vec<i64> = {
    let mut stmt = tx.prepare("SELECT id FROM articles")?;
    let ids = stmt.query_map([], |row| row.get(0))?
      .collect::<Result<Vec<i64>, rusqlite::Error>>()?;
    ids
  };
  {
    let mut upsert = tx.prepare(UPSERT_ARTICLE)?;
    for a in articles {
      report.upserted += upsert.execute(params![
        a.id, a.title, a.summary, a.content_long, a.author, a.region, a.created_at
      ])?;
    }
  }
  let wanted: HashSet<i64> = articles.iter().map(|a| a.id).collect();
  {
    let mut delete = tx.prepare("DELETE FROM articles WHERE id = ?1")?;
    for id in existing_ids.iter().filter(|id| !wanted.contains(id)) {
      report.pruned += delete.execute(params![id])?;
    }
  }
  tx.commit().context("Committing replica sync")?;
  Ok(report)
}
