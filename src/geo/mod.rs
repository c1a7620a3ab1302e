/*
 * Everything related to figuring out where a client
 * is: IP to country to region, plus the simulated
 * latency numbers shown to readers.
 */

use color_eyre::Result;
use log::{debug, warn};
use std::net::IpAddr;
use crate::utils::ip_utils::is_local_address;
pub mod region;
pub mod ip_location;
pub mod latency;
pub use region::{Region, MASTER_REGION};

// Anything able to turn an IP address into an ISO country
// code. The real thing is ip_location::IpLocator, tests use
// a hardcoded table.
pub trait CountryLocator: Send + Sync {
  fn country_code(&self, ip: IpAddr) -> Result<Option<String>>;
}

// Never fails: every dead end sends the client to the
// master region.
pub fn region_for_ip(
  locator: Option<&dyn CountryLocator>,
  ip: Option<IpAddr>
) -> Region {
  let ip = match ip {
    Some(ip) => ip,
    None => return MASTER_REGION
  };
  // Docker networks, localhost and friends. Not worth a
  // lookup, and not worth a log line either.
  if is_local_address(&ip) {
    return MASTER_REGION;
  }
  let locator = match locator {
    Some(l) => l,
    None => {
      debug!("No GeoIP database loaded, using {} for {}", MASTER_REGION, ip);
      return MASTER_REGION;
    }
  };
  match locator.country_code(ip) {
    Ok(Some(country)) => {
      let region = Region::from_country_code(&country);
      debug!("Client IP {} -> country {} -> region {}", ip, country, region);
      region
    },
    Ok(None) => {
      warn!("No country found for IP {}", ip);
      MASTER_REGION
    },
    Err(e) => {
      warn!("GeoIP lookup failed - {}", e);
      MASTER_REGION
    }
  }
}

#[cfg(test)]
pub mod tests {
  use super::*;
  use eyre::eyre;
  use std::collections::HashMap;

  // Fixed IP -> country table.
  pub struct StaticLocator(pub HashMap<IpAddr, String>);

  impl StaticLocator {
    pub fn new(entries: &[(&str, &str)]) -> Self {
      StaticLocator(
        entries.iter()
          .map(|(ip, cc)| (ip.parse().unwrap(), cc.to_string()))
          .collect()
      )
    }
  }

  impl CountryLocator for StaticLocator {
    fn country_code(&self, ip: IpAddr) -> Result<Option<String>> {
      if ip.to_string() == "198.51.100.66" {
        return Err(eyre!("lookup exploded"));
      }
      Ok(self.0.get(&ip).cloned())
    }
  }

  #[test]
  fn public_ip_is_located() {
    let locator = StaticLocator::new(&[("203.0.113.5", "JP"), ("85.105.1.1", "TR")]);
    assert_eq!(Region::Asia, region_for_ip(Some(&locator), "203.0.113.5".parse().ok()));
    assert_eq!(Region::Tr, region_for_ip(Some(&locator), "85.105.1.1".parse().ok()));
  }

  #[test]
  fn every_failure_falls_back_to_master() {
    let locator = StaticLocator::new(&[("10.0.0.5", "US")]);
    // Private address is not even looked up:
    assert_eq!(Region::Eu, region_for_ip(Some(&locator), "10.0.0.5".parse().ok()));
    // Unknown address:
    assert_eq!(Region::Eu, region_for_ip(Some(&locator), "8.8.4.4".parse().ok()));
    // Lookup error:
    assert_eq!(Region::Eu, region_for_ip(Some(&locator), "198.51.100.66".parse().ok()));
    // No locator, no IP:
    assert_eq!(Region::Eu, region_for_ip(None, "8.8.4.4".parse().ok()));
    assert_eq!(Region::Eu, region_for_ip(Some(&locator), None));
  }
}
