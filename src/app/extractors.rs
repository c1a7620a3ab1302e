use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use futures::future::{ready, Ready};
use std::net::IpAddr;
use log::debug;
use crate::geo::{self, Region};
use super::dtos::RegionQuery;
use super::error::Error;
use super::helpers;
use super::AppState;

// Where a request is considered to come from. Handlers just
// take it as an argument, same as web::Json or web::Query.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientRegion {
  pub region: Region,
  pub client_ip: Option<IpAddr>,
  // True when the "region" query parameter picked the region.
  pub overridden: bool
}

impl ClientRegion {

  pub fn resolve(req: &HttpRequest) -> Self {
    let client_ip = helpers::client_ip_addr(req);
    // A garbage query string or an unknown region name is
    // not an error, we just fall back on the IP address.
    let requested = web::Query::<RegionQuery>::from_query(req.query_string())
      .ok()
      .and_then(|q| q.into_inner().region)
      .and_then(|r| r.parse::<Region>().ok());
    if let Some(region) = requested {
      return Self {
        region,
        client_ip,
        overridden: true
      };
    }
    let locator = req.app_data::<web::Data<AppState>>()
      .and_then(|state| state.locator.as_deref());
    let region = geo::region_for_ip(locator, client_ip);
    debug!("Resolved region {} for client {:?}", region, client_ip);
    Self {
      region,
      client_ip,
      overridden: false
    }
  }

  // What /region shows the client in the "ip" field.
  pub fn ip_display(&self) -> String {
    if self.overridden {
      return String::from("override");
    }
    self.client_ip
      .map(|ip| ip.to_string())
      .unwrap_or_else(|| String::from("unknown"))
  }

}

// Resolving never fails, the worst case is the master region.
impl FromRequest for ClientRegion {
  type Error = Error;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
    ready(Ok(ClientRegion::resolve(req)))
  }
}
