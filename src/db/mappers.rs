use super::entities::*;
use rusqlite::{Row, Error};

// Column order is ARTICLE_FIELDS in db/mod.rs.
pub fn map_article(row: &Row) -> Result<Article, Error> {
  Ok(Article {
    id: row.get(0)?,
    title: row.get(1)?,
    summary: row.get(2)?,
    content_long: row.get(3)?,
    author: row.get(4)?,
    region: row.get(5)?,
    created_at: row.get(6)?
  })
}
