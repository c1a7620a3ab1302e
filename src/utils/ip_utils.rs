use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use regex::Regex;
use lazy_static::lazy_static;

lazy_static! {
  // Removes a trailing port from whatever we got from a
  // header or from the connection info. Only used once
  // the plain parsers gave up.
  static ref PORT_REGEX: Regex = Regex::new(
    r"^\[?([^\]]+?)\]?:\d+$"
  ).unwrap();
}

// Accepts "1.2.3.4", "1.2.3.4:5678", "::1", "[::1]:8080"
// and returns None for anything else.
pub fn parse_ip(raw: &str) -> Option<IpAddr> {
  let raw = raw.trim();
  if let Ok(ip) = IpAddr::from_str(raw) {
    return Some(ip);
  }
  if let Ok(sock) = SocketAddr::from_str(raw) {
    return Some(sock.ip());
  }
  PORT_REGEX.captures(raw)
    .and_then(|caps| caps.get(1))
    .and_then(|m| IpAddr::from_str(m.as_str()).ok())
}

// X-Forwarded-For can hold a whole proxy chain, the
// client is the first entry.
pub fn first_forwarded_ip(header: &str) -> Option<IpAddr> {
  header.split(',')
    .next()
    .and_then(parse_ip)
}

// Loopback, private and link-local addresses never make
// it to the GeoIP database. Ipv6Addr doesn't have stable
// helpers for all of these so we check the prefixes.
pub fn is_local_address(ip: &IpAddr) -> bool {
  match ip {
    IpAddr::V4(v4) => v4.is_loopback() || v4.is_private()
      || v4.is_link_local() || v4.is_unspecified(),
    IpAddr::V6(v6) => {
      if let Some(v4) = v6.to_ipv4_mapped() {
        return is_local_address(&IpAddr::V4(v4));
      }
      let first = v6.segments()[0];
      v6.is_loopback() || v6.is_unspecified()
        // fc00::/7, unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10, link local
        || (first & 0xffc0) == 0xfe80
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_plain_and_port_suffixed_addresses() {
    assert_eq!(parse_ip("111.12.22.254"), Some("111.12.22.254".parse().unwrap()));
    assert_eq!(parse_ip("111.12.22.254:443"), Some("111.12.22.254".parse().unwrap()));
    assert_eq!(parse_ip("::1"), Some("::1".parse().unwrap()));
    assert_eq!(parse_ip("[2001:db8::7]:8080"), Some("2001:db8::7".parse().unwrap()));
  }

  #[test]
  fn invalid_address_gives_none() {
    assert_eq!(parse_ip("not an address"), None);
    assert_eq!(parse_ip("222.82"), None);
    assert_eq!(parse_ip(""), None);
  }

  #[test]
  fn forwarded_header_takes_first_entry() {
    let sut = "203.0.113.9, 10.0.0.2, 10.0.0.3";
    assert_eq!(first_forwarded_ip(sut), Some("203.0.113.9".parse().unwrap()));
  }

  #[test]
  fn detects_local_addresses() {
    for local in &["127.0.0.1", "10.1.2.3", "192.168.0.10", "172.16.4.4",
      "169.254.1.1", "::1", "fd00::1", "fe80::9656:d028:8652:66b6", "::ffff:192.168.1.1"] {
      let ip: IpAddr = local.parse().unwrap();
      assert!(is_local_address(&ip), "{} should be local", local);
    }
    for public in &["8.8.8.8", "85.105.1.1", "2001:4860:4860::8888"] {
      let ip: IpAddr = public.parse().unwrap();
      assert!(!is_local_address(&ip), "{} should be public", public);
    }
  }
}
