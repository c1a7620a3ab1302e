// IP Location module using ip2Location.
use color_eyre::Result;
use eyre::eyre;
use ip2location::{Record, DB};
use std::net::IpAddr;
use super::CountryLocator;

// The database file is memory mapped and lookups only need
// a shared reference, so every actix worker can use it at
// the same time.
pub struct IpLocator {
  db: DB,
}

impl IpLocator {
  pub fn open(filename: &str) -> Result<IpLocator> {
    match DB::from_file(filename) {
      Ok(db) => Ok(Self { db }),
      Err(e) => Err(eyre!("Error opening ip2location DB {} - {:?}", filename, e)),
    }
  }
}

impl CountryLocator for IpLocator {
  fn country_code(&self, ip: IpAddr) -> Result<Option<String>> {
    match self.db.ip_lookup(ip) {
      Ok(Record::LocationDb(record)) => Ok(
        record.country
          .map(|country| remove_dash(country.short_name.to_string()))
          .filter(|code| !code.is_empty())
      ),
      // A proxy database doesn't tell us anything useful.
      Ok(_) => Ok(None),
      Err(e) => Err(eyre!("Error with IP location for {} - {:?}", ip, e)),
    }
  }
}

// For some reasons, ip2location uses a dash for unknown
// values (private ranges and such).
fn remove_dash(value: String) -> String {
  if value == "-" {
    String::new()
  } else {
    value
  }
}
