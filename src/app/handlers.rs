use actix_web::{
  web,
  HttpResponse,
  Result
};
use log::{info, warn};
use crate::db;
use crate::geo::{latency, Region, MASTER_REGION};
use crate::utils::time_utils;
use super::dtos::*;
use super::error::{Error, map_db_error, map_blocking_error};
use super::extractors::ClientRegion;
use super::AppState;

// Module with all the API handler functions.

// Default response when no route matched the request:
pub async fn not_found() -> Result<HttpResponse, Error> {
  Err(Error::NotFound(String::from("Endpoint doesn't exist")))
}

pub async fn health() -> HttpResponse {
  HttpResponse::Ok().json(JsonStatus::new(JsonStatusType::Ok, "Up and running"))
}

pub async fn region(client: ClientRegion) -> Result<HttpResponse, Error> {
  Ok(HttpResponse::Ok().json(RegionDto {
    region: client.region,
    ip: client.ip_display()
  }))
}

// Reads go to whatever node serves the client region, which
// is the whole point of the demo: a fresh article takes a
// while to show up for non EU readers.
pub async fn articles(
  app_state: web::Data<AppState>,
  client: ClientRegion
) -> Result<HttpResponse, Error> {
  let (pool, source) = app_state.replicator.pool_for_region(client.region);
  // SQLite calls are blocking, gotta move them off the
  // async workers.
  let articles = web::block(move || db::list_articles(&pool))
    .await
    .map_err(map_blocking_error)?
    .map_err(map_db_error)?;
  info!("Serving {} articles to region {} from {}",
    articles.len(), client.region, source);
  Ok(HttpResponse::Ok().json(
    articles.into_iter().map(ArticleDto::from).collect::<Vec<ArticleDto>>()
  ))
}

// Writes always hit the master, whatever region the client
// thinks it's in.
pub async fn create_article(
  app_state: web::Data<AppState>,
  form: web::Json<ArticleForm>
) -> Result<HttpResponse, Error> {
  let new_article = form.into_inner()
    .into_new_article(MASTER_REGION, time_utils::current_timestamp())
    .map_err(Error::BadRequest)?;
  let master = app_state.replicator.master().clone();
  let article = web::block(move || db::insert_article(&master, &new_article))
    .await
    .map_err(map_blocking_error)?
    .map_err(map_db_error)?;
  info!("Article {} written to master, replicating", article.id);
  app_state.replicator.schedule(article.id);
  Ok(HttpResponse::Created().json(ArticleDto::from(article)))
}

// Path variables have to be in a tuple. A non numeric id
// gets rejected by the PathConfig error handler.
pub async fn delete_article(
  app_state: web::Data<AppState>,
  path: web::Path<(i64,)>
) -> Result<HttpResponse, Error> {
  let id = path.into_inner().0;
  let master = app_state.replicator.master().clone();
  let deleted = web::block(move || db::delete_article(&master, id))
    .await
    .map_err(map_blocking_error)?
    .map_err(map_db_error)?;
  if deleted == 0 {
    return Err(Error::NotFound(format!("Article {} does not exist", id)));
  }
  app_state.replicator.propagate_delete(id).await;
  Ok(HttpResponse::Ok().json(
    JsonStatus::new_with_id(JsonStatusType::Deleted, "Article deleted", id)
  ))
}

pub async fn replication_status(
  app_state: web::Data<AppState>
) -> Result<HttpResponse, Error> {
  let statuses: Vec<ReplicationStatusDto> = app_state.replicator.statuses()
    .into_iter()
    .map(ReplicationStatusDto::from)
    .collect();
  Ok(HttpResponse::Ok().json(statuses))
}

// Unknown regions still get numbers, only a missing one is
// an error.
pub async fn latency(
  query: web::Query<RegionQuery>
) -> Result<HttpResponse, Error> {
  let requested = query.into_inner().region
    .map(|r| r.trim().to_lowercase())
    .filter(|r| !r.is_empty())
    .ok_or_else(|| Error::BadRequest(String::from("region parameter is required")))?;
  let region = requested.parse::<Region>().ok();
  if region.is_none() {
    warn!("Latency requested for unknown region {}", requested);
  }
  let sample = latency::sample_latency(region, &mut rand::thread_rng());
  Ok(HttpResponse::Ok().json(LatencyDto {
    latency: latency::latency_report(&requested, &sample),
    region: requested,
    measured: time_utils::current_datetime_rfc3339()
  }))
}

pub async fn login(
  form: web::Json<LoginForm>
) -> Result<HttpResponse, Error> {
  let session = form.into_inner()
    .into_session(time_utils::current_timestamp())
    .map_err(Error::BadRequest)?;
  info!("Login: {} as {} from {}", session.username, session.role, session.region);
  Ok(HttpResponse::Ok().json(session))
}

// Doesn't wait for the next periodic sync, useful after
// messing with a replica file by hand.
pub async fn admin_full_sync(
  app_state: web::Data<AppState>
) -> Result<HttpResponse, Error> {
  let results = app_state.replicator.full_sync()
    .await
    .map_err(map_db_error)?;
  let results: Vec<SyncResultDto> = results.into_iter()
    .map(|(region, result)| SyncResultDto::new(region, result))
    .collect();
  Ok(HttpResponse::Ok().json(results))
}

#[cfg(test)]
mod tests {
  use super::*;
  use actix_web::{test, App, http::StatusCode};
  use serde_json::{json, Value};
  use std::time::Duration;
  use tempfile::TempDir;
  use crate::db::tests::temp_pool;
  use crate::geo::tests::StaticLocator;
  use crate::replication::{ReplicaNode, Replicator};
  use super::super::api_config;

  fn app_state(dir: &TempDir) -> web::Data<AppState> {
    let master = temp_pool(dir, "master.db");
    db::seed_default_articles(&master, "eu", 1000).unwrap();
    let replicas = vec![
      ReplicaNode { region: Region::Us, pool: temp_pool(dir, "us.db") },
      ReplicaNode { region: Region::Asia, pool: temp_pool(dir, "asia.db") }
    ];
    web::Data::new(AppState {
      replicator: Replicator::new(
        master,
        replicas,
        Duration::from_millis(0),
        Duration::from_millis(500)
      ),
      locator: Some(Box::new(StaticLocator::new(&[("203.0.113.5", "JP")])))
    })
  }

  // The service type returned by init_service is a pain to
  // spell out, a macro dodges the problem.
  macro_rules! app {
    ($state:expr) => {
      test::init_service(
        App::new()
          .app_data($state)
          .service(web::scope("/api").configure(api_config))
          .default_service(web::route().to(not_found))
      ).await
    };
  }

  async fn wait_for_count(pool: &db::Pool, expected: i64) -> bool {
    for _ in 0..100 {
      if db::article_count(pool).unwrap() == expected {
        return true;
      }
      tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
  }

  #[actix_web::test]
  async fn region_comes_from_query_or_ip() {
    let dir = TempDir::new().unwrap();
    let app = app!(app_state(&dir));
    let req = test::TestRequest::get().uri("/api/region?region=tr").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(json!({"region": "tr", "ip": "override"}), body);

    let req = test::TestRequest::get()
      .uri("/api/region")
      .insert_header(("X-Forwarded-For", "203.0.113.5"))
      .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(json!({"region": "asia", "ip": "203.0.113.5"}), body);

    let req = test::TestRequest::get().uri("/api/region").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(json!({"region": "eu", "ip": "unknown"}), body);
  }

  #[actix_web::test]
  async fn replica_reads_lag_until_synced() {
    let dir = TempDir::new().unwrap();
    let state = app_state(&dir);
    let app = app!(state.clone());
    let req = test::TestRequest::get().uri("/api/articles?region=us").to_request();
    let body: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    assert!(body.is_empty());
    // TR has no replica in this setup, reads the master:
    let req = test::TestRequest::get().uri("/api/articles?region=tr").to_request();
    let body: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(5, body.len());

    state.replicator.full_sync().await.unwrap();
    let req = test::TestRequest::get().uri("/api/articles?region=us").to_request();
    let body: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(5, body.len());
    assert_eq!(body[0]["summary"], body[0]["content"]);
    assert_eq!("eu", body[0]["region"]);
  }

  #[actix_web::test]
  async fn created_article_goes_to_master_then_replicas() {
    let dir = TempDir::new().unwrap();
    let state = app_state(&dir);
    let app = app!(state.clone());
    let req = test::TestRequest::post()
      .uri("/api/articles?region=asia")
      .set_json(json!({
        "title": "  Hello from the writer ",
        "content": "Short text",
        "author": "Umut"
      }))
      .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(StatusCode::CREATED, resp.status());
    let body: Value = test::read_body_json(resp).await;
    assert_eq!("Hello from the writer", body["title"]);
    assert_eq!("Short text", body["content_long"]);
    assert_eq!("eu", body["region"]);
    assert_eq!(6, db::article_count(state.replicator.master()).unwrap());
    let id = body["id"].as_i64().unwrap();
    for node in state.replicator.replicas() {
      assert!(wait_for_count(&node.pool, 1).await);
      assert!(db::article_by_id(&node.pool, id).unwrap().is_some());
    }
  }

  #[actix_web::test]
  async fn invalid_article_is_rejected() {
    let dir = TempDir::new().unwrap();
    let state = app_state(&dir);
    let app = app!(state.clone());
    let req = test::TestRequest::post()
      .uri("/api/articles")
      .set_json(json!({"title": "No author", "content": "text", "author": "  "}))
      .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(StatusCode::BAD_REQUEST, resp.status());
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("required"));
    // Not even JSON:
    let req = test::TestRequest::post()
      .uri("/api/articles")
      .insert_header(("content-type", "application/json"))
      .set_payload("{nope")
      .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(StatusCode::BAD_REQUEST, resp.status());
    assert_eq!(5, db::article_count(state.replicator.master()).unwrap());
  }

  #[actix_web::test]
  async fn delete_article_everywhere() {
    let dir = TempDir::new().unwrap();
    let state = app_state(&dir);
    state.replicator.full_sync().await.unwrap();
    let app = app!(state.clone());

    let req = test::TestRequest::delete().uri("/api/articles/1").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(StatusCode::OK, resp.status());
    let body: Value = test::read_body_json(resp).await;
    assert_eq!("deleted", body["status"]);
    assert_eq!(1, body["id"]);
    assert_eq!(None, db::article_by_id(state.replicator.master(), 1).unwrap());
    for node in state.replicator.replicas() {
      assert_eq!(None, db::article_by_id(&node.pool, 1).unwrap());
      assert_eq!(4, db::article_count(&node.pool).unwrap());
    }

    let req = test::TestRequest::delete().uri("/api/articles/1").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(StatusCode::NOT_FOUND, resp.status());

    let req = test::TestRequest::delete().uri("/api/articles/abc").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(StatusCode::BAD_REQUEST, resp.status());
  }

  #[actix_web::test]
  async fn status_lists_replicas_only() {
    let dir = TempDir::new().unwrap();
    let state = app_state(&dir);
    let app = app!(state.clone());
    let req = test::TestRequest::get().uri("/api/replication-status").to_request();
    let body: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(2, body.len());
    assert_eq!(json!({"replica": "US", "status": "ok"}), body[0]);

    state.replicator.full_sync().await.unwrap();
    let req = test::TestRequest::get().uri("/api/replication-status").to_request();
    let body: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    assert_eq!("ASIA", body[1]["replica"]);
    assert!(body[1]["last_at"].is_string());
  }

  #[actix_web::test]
  async fn latency_needs_a_region() {
    let dir = TempDir::new().unwrap();
    let app = app!(app_state(&dir));
    let req = test::TestRequest::get().uri("/api/latency?region=%20").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(StatusCode::BAD_REQUEST, resp.status());
    let req = test::TestRequest::get().uri("/api/latency").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(StatusCode::BAD_REQUEST, resp.status());

    let req = test::TestRequest::get().uri("/api/latency?region=TR").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!("tr", body["region"]);
    let line = body["latency"].as_str().unwrap();
    assert!(line.starts_with("Latency gain compared to master: "));
    assert!(line.contains("TR="));
    assert!(body["measured"].as_str().unwrap().ends_with('Z'));
  }

  #[actix_web::test]
  async fn login_echoes_session() {
    let dir = TempDir::new().unwrap();
    let app = app!(app_state(&dir));
    let req = test::TestRequest::post()
      .uri("/api/login")
      .set_json(json!({"username": "umut", "role": "Writer", "region": "SA"}))
      .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!("writer", body["role"]);
    assert_eq!("sa", body["region"]);
    assert_eq!(40, body["token"].as_str().unwrap().len());

    let req = test::TestRequest::post()
      .uri("/api/login")
      .set_json(json!({"username": "umut", "role": "admin", "region": "sa"}))
      .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(StatusCode::BAD_REQUEST, resp.status());
  }

  #[actix_web::test]
  async fn admin_sync_is_loopback_only() {
    let dir = TempDir::new().unwrap();
    let state = app_state(&dir);
    let app = app!(state.clone());
    let req = test::TestRequest::post()
      .uri("/api/admin/full-sync")
      .peer_addr("203.0.113.5:4000".parse().unwrap())
      .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(StatusCode::NOT_FOUND, resp.status());

    let req = test::TestRequest::post()
      .uri("/api/admin/full-sync")
      .peer_addr("127.0.0.1:4000".parse().unwrap())
      .to_request();
    let body: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(json!({"replica": "US", "upserted": 5, "pruned": 0}), body[0]);
    assert_eq!(5, db::article_count(&state.replicator.replicas()[1].pool).unwrap());
  }

  #[actix_web::test]
  async fn unknown_route_is_json_404() {
    let dir = TempDir::new().unwrap();
    let app = app!(app_state(&dir));
    let req = test::TestRequest::get().uri("/nothing/here").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(StatusCode::NOT_FOUND, resp.status());
    let body: Value = test::read_body_json(resp).await;
    assert_eq!("Not Found: Endpoint doesn't exist", body["error"]);
  }
}
