use serde::{Deserialize, Serialize};
use derive_more::Display;
use sha1::{Digest, Sha1};
use std::str::FromStr;
use crate::db::entities::*;
use crate::geo::Region;
use crate::replication::tracker::{ReplicaStatus, SyncState};
use crate::utils::{text_utils, time_utils};

// Limits applied to incoming articles, in chars.
const MAX_TITLE_LENGTH: usize = 200;
const MAX_AUTHOR_LENGTH: usize = 70;
const MAX_SUMMARY_LENGTH: usize = 2000;
const MAX_CONTENT_LONG_LENGTH: usize = 20000;
const MAX_USERNAME_LENGTH: usize = 70;

// I'm using the From trait to convert entities to DTOs,
// I only ever need it entity -> DTO.

#[derive(Debug, Serialize, Deserialize)]
pub struct ArticleDto {
  pub id: i64,
  pub title: String,
  pub summary: String,
  // The client cards only know about "content", which
  // is the summary.
  pub content: String,
  pub content_long: String,
  pub author: String,
  pub region: String,
  pub created_at: String
}

impl From<Article> for ArticleDto {
  fn from(article: Article) -> Self {
    Self {
      id: article.id,
      title: article.title,
      content: article.summary.clone(),
      summary: article.summary,
      content_long: article.content_long,
      author: article.author,
      region: article.region,
      created_at: time_utils::timestamp_to_rfc3339(article.created_at)
    }
  }
}

// The writer page only sends "content", newer clients send
// summary + content_long. Missing fields deserialize as
// empty strings so that validation can give a proper
// message instead of a serde error.
#[derive(Debug, Deserialize)]
pub struct ArticleForm {
  #[serde(default)]
  pub title: String,
  #[serde(default, alias = "content")]
  pub summary: String,
  #[serde(default)]
  pub content_long: Option<String>,
  #[serde(default)]
  pub author: String
}

impl ArticleForm {
  // The region is the one of the node that takes the write,
  // meaning the master.
  pub fn into_new_article(self, region: Region, now: i64) -> Result<NewArticle, String> {
    let title = text_utils::clean_field(&self.title, MAX_TITLE_LENGTH);
    let summary = text_utils::clean_field(&self.summary, MAX_SUMMARY_LENGTH);
    let author = text_utils::clean_field(&self.author, MAX_AUTHOR_LENGTH);
    let content_long = self.content_long
      .map(|c| text_utils::clean_field(&c, MAX_CONTENT_LONG_LENGTH))
      .filter(|c| !c.is_empty())
      .unwrap_or_else(|| summary.clone());
    if title.is_empty() || summary.is_empty() || author.is_empty() {
      return Err(String::from("title, summary (or content) and author are required"));
    }
    Ok(NewArticle {
      title,
      summary,
      content_long,
      author,
      region: region.to_string(),
      created_at: now
    })
  }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  #[display(fmt = "reader")]
  Reader,
  #[display(fmt = "writer")]
  Writer
}

impl FromStr for Role {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "reader" => Ok(Role::Reader),
      "writer" => Ok(Role::Writer),
      other => Err(format!("unknown role: {}", other))
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
  #[serde(default)]
  pub username: String,
  #[serde(default)]
  pub role: String,
  #[serde(default)]
  pub region: String
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionDto {
  pub username: String,
  pub role: Role,
  pub region: Region,
  pub token: String
}

impl LoginForm {
  // There is no user database, login just validates and
  // echoes what it got along with a token.
  pub fn into_session(self, issued_at: i64) -> Result<SessionDto, String> {
    let username = text_utils::clean_field(&self.username, MAX_USERNAME_LENGTH);
    let role = self.role.trim().to_lowercase();
    let region = self.region.trim().to_lowercase();
    if username.is_empty() || role.is_empty() || region.is_empty() {
      return Err(String::from("username, role, region required"));
    }
    let role: Role = role.parse()?;
    let region: Region = region.parse().map_err(|e: crate::geo::region::UnknownRegion| e.to_string())?;
    let token = session_token(&username, role, region, issued_at);
    Ok(SessionDto {
      username,
      role,
      region,
      token
    })
  }
}

// Opaque, nobody ever checks it.
fn session_token(username: &str, role: Role, region: Region, issued_at: i64) -> String {
  let mut hasher = Sha1::new();
  hasher.update(format!("{}:{}:{}:{}", username, role, region, issued_at).as_bytes());
  format!("{:x}", hasher.finalize())
}

#[derive(Debug, Deserialize)]
pub struct RegionQuery {
  pub region: Option<String>
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegionDto {
  pub region: Region,
  pub ip: String
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LatencyDto {
  pub region: String,
  // Ready to display sentence.
  pub latency: String,
  pub measured: String
}

#[derive(Debug, Serialize)]
pub struct ReplicationStatusDto {
  pub replica: String,
  pub status: SyncState,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub last_at: Option<String>
}

impl From<ReplicaStatus> for ReplicationStatusDto {
  fn from(status: ReplicaStatus) -> Self {
    Self {
      replica: status.region.label(),
      status: status.state,
      last_at: status.last_synced.as_ref().map(time_utils::datetime_to_rfc3339)
    }
  }
}

// One line per replica in the admin full sync response.
#[derive(Debug, Serialize)]
pub struct SyncResultDto {
  pub replica: String,
  #[serde(flatten)]
  pub report: Option<SyncReport>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>
}

impl SyncResultDto {
  pub fn new(region: Region, result: color_eyre::Result<SyncReport>) -> Self {
    match result {
      Ok(report) => Self {
        replica: region.label(),
        report: Some(report),
        error: None
      },
      Err(e) => Self {
        replica: region.label(),
        report: None,
        error: Some(e.to_string())
      }
    }
  }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct JsonStatus {
  pub status: String,
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub id: Option<i64>
}

#[derive(Debug, Display)]
pub enum JsonStatusType {
  #[display(fmt = "ok")]
  Ok,
  #[display(fmt = "deleted")]
  Deleted
}

impl JsonStatus {
  pub fn new(status: JsonStatusType, message: &str) -> Self {
    Self {
      status: status.to_string(),
      message: String::from(message),
      id: None
    }
  }

  pub fn new_with_id(
    status: JsonStatusType,
    message: &str,
    id: i64
  ) -> Self {
    Self {
      status: status.to_string(),
      message: String::from(message),
      id: Some(id)
    }
  }
}
