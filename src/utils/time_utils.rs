use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

// Everything is stored as a UNIX timestamp in the databases
// and only turned into RFC 3339 strings when building DTOs.
// The client feeds these straight into `new Date()`.

pub fn current_timestamp() -> i64 {
  Utc::now().timestamp()
}

pub fn datetime_to_rfc3339(d: &DateTime<Utc>) -> String {
  d.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn timestamp_to_rfc3339(timestamp: i64) -> String {
  // timestamp_opt only fails for out of range values,
  // which can't come out of our own databases.
  match Utc.timestamp_opt(timestamp, 0).single() {
    Some(d) => datetime_to_rfc3339(&d),
    None => String::new()
  }
}

pub fn current_datetime_rfc3339() -> String {
  datetime_to_rfc3339(&Utc::now())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn timestamp_formats_as_utc_rfc3339() {
    let timestamp: i64 = 1615150740;
    assert_eq!("2021-03-07T20:59:00Z", timestamp_to_rfc3339(timestamp));
  }

  #[test]
  fn out_of_range_timestamp_gives_empty_string() {
    assert_eq!("", timestamp_to_rfc3339(i64::MAX));
  }
}
