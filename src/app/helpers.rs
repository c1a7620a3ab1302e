use actix_web::HttpRequest;
use std::net::IpAddr;
use crate::utils::ip_utils::{first_forwarded_ip, parse_ip};

// Extracting Actix header values is kinda convoluted.
// They check for an error in the header value not
// being convertable to string because of uh...
// invalid characters or something.
pub fn header_value<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
  req.headers().get(name)
    .and_then(|h| h.to_str().ok())
    .map(|v| v.trim())
    .filter(|v| !v.is_empty())
}

// The app is meant to sit behind a reverse proxy, so the
// proxy headers win over the connection address. Note that
// nothing checks the proxy is actually ours, which is fine
// for a demo where the worst you can do is lie about your
// region (and there's a query param for that anyway).
pub fn client_ip_addr(req: &HttpRequest) -> Option<IpAddr> {
  if let Some(ip) = header_value(req, "x-forwarded-for").and_then(first_forwarded_ip) {
    return Some(ip);
  }
  if let Some(ip) = header_value(req, "x-real-ip").and_then(parse_ip) {
    return Some(ip);
  }
  req.peer_addr().map(|addr| addr.ip())
}
