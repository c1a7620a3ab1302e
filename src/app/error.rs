use actix_web::{
  error::ResponseError,
  http::StatusCode,
  HttpResponse
};
use derive_more::Display;
use log::error;
use serde::Serialize;

// The inner String of the server side variants is for the
// logs only, browsers get the generic message. Client errors
// show their message since it's what the client has to fix.
#[derive(Debug, Display)]
pub enum Error {
  #[display(fmt = "Internal Server Error")]
  InternalServerError(String),
  #[display(fmt = "Database Error")]
  DatabaseError(String),
  #[display(fmt = "Not Found: {}", _0)]
  NotFound(String),
  #[display(fmt = "Bad Request: {}", _0)]
  BadRequest(String)
}

// The client reads the "error" key of every failed response.
#[derive(Serialize)]
struct ErrorBody {
  error: String
}

impl ResponseError for Error {
  fn status_code(&self) -> StatusCode {
    match self {
      Error::InternalServerError(_) | Error::DatabaseError(_) =>
        StatusCode::INTERNAL_SERVER_ERROR,
      Error::NotFound(_) => StatusCode::NOT_FOUND,
      Error::BadRequest(_) => StatusCode::BAD_REQUEST
    }
  }

  fn error_response(&self) -> HttpResponse {
    HttpResponse::build(self.status_code())
      .json(ErrorBody { error: self.to_string() })
  }
}

// Used with map_err on everything coming out of the db
// module.
pub fn map_db_error(e: eyre::Report) -> Error {
  error!("Database error - {:?}", e);
  Error::DatabaseError(e.to_string())
}

// web::block only fails when the thread pool is gone.
pub fn map_blocking_error(e: actix_web::error::BlockingError) -> Error {
  error!("Blocking task failed - {}", e);
  Error::InternalServerError(e.to_string())
}
