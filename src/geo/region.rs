use std::fmt;
use std::str::FromStr;
use derive_more::Display;
use serde::{Deserialize, Serialize};

// The regions the portal knows about. EU hosts the master
// database, every other region may or may not have a replica
// depending on the configuration.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
  #[display(fmt = "eu")]
  Eu,
  #[display(fmt = "us")]
  Us,
  #[display(fmt = "asia")]
  Asia,
  #[display(fmt = "sa")]
  Sa,
  #[display(fmt = "tr")]
  Tr,
  #[display(fmt = "africa")]
  Africa
}

pub const MASTER_REGION: Region = Region::Eu;

#[derive(Debug, Clone, PartialEq)]
pub struct UnknownRegion(pub String);

impl fmt::Display for UnknownRegion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "unknown region: {}", self.0)
  }
}

impl std::error::Error for UnknownRegion {}

impl FromStr for Region {
  type Err = UnknownRegion;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "eu" => Ok(Region::Eu),
      "us" => Ok(Region::Us),
      "asia" => Ok(Region::Asia),
      "sa" => Ok(Region::Sa),
      "tr" => Ok(Region::Tr),
      "africa" => Ok(Region::Africa),
      _ => Err(UnknownRegion(s.to_string()))
    }
  }
}

impl Region {

  pub fn as_str(&self) -> &'static str {
    match self {
      Region::Eu => "eu",
      Region::Us => "us",
      Region::Asia => "asia",
      Region::Sa => "sa",
      Region::Tr => "tr",
      Region::Africa => "africa"
    }
  }

  // Replica names in the status endpoint are the upper
  // case region codes ("US", "ASIA"...).
  pub fn label(&self) -> String {
    self.as_str().to_uppercase()
  }

  pub fn is_master(&self) -> bool {
    *self == MASTER_REGION
  }

  // ISO 3166 alpha-2 country code to the region serving it.
  // Anything we don't know about goes to the master.
  pub fn from_country_code(code: &str) -> Region {
    match code.trim().to_uppercase().as_str() {
      "US" | "CA" | "MX" => Region::Us,

      "CN" | "JP" | "KR" | "IN" | "ID" | "SG" | "PH" | "TH" | "VN" | "MY"
      | "TW" | "HK" => Region::Asia,

      "TR" => Region::Tr,

      "DE" | "FR" | "IT" | "ES" | "GB" | "NL" | "PL" | "SE" | "NO" | "FI"
      | "DK" | "BE" | "AT" | "CH" | "PT" | "GR" | "CZ" | "HU" | "RO" | "BG"
      | "HR" | "SK" | "SI" | "IE" | "IS" | "LU" | "EE" | "LV" | "LT" | "MT"
      | "CY" | "RS" | "BA" | "MK" | "AL" | "ME" | "XK" | "MD" | "UA" | "BY"
      | "RU" | "GE" | "AM" | "AZ" | "KZ" | "UZ" | "KG" | "TJ" | "TM" | "AE"
      | "SA" | "IL" | "QA" | "KW" | "BH" | "OM" | "YE" | "JO" | "LB" | "IQ"
      | "IR" | "PS" | "SY" => Region::Eu,

      "BR" | "AR" | "CL" | "CO" | "PE" | "VE" | "EC" | "BO" | "PY" | "UY"
      | "GY" | "SR" => Region::Sa,

      "ZA" | "NG" | "EG" | "KE" | "ET" | "GH" | "TZ" | "UG" | "DZ" | "MA"
      | "TN" | "LY" | "SD" | "SS" | "CM" | "CI" | "SN" | "BF" | "ML" | "NE"
      | "TD" | "MR" | "DJ" | "SO" | "ER" | "RW" | "BI" | "MW" | "ZM" | "ZW"
      | "BW" | "NA" | "LS" | "SZ" | "MG" | "MU" | "SC" | "KM" | "AO" | "MZ"
      | "CD" | "CF" | "CG" | "GA" | "GQ" | "ST" | "CV" | "GW" | "GN" | "SL"
      | "LR" | "TG" | "BJ" => Region::Africa,

      _ => MASTER_REGION
    }
  }

}
