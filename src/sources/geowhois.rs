//! GeoWhois country adapter (country fallback source). Carries a single
//! field but covers address space the city databases miss.

use std::net::IpAddr;
use std::path::Path;

use serde::Deserialize;

use super::MmdbSource;
use crate::error::Result;

/// Record from the GeoWhois country database
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeoWhoisRecord {
    /// ISO 3166-1 country code
    #[serde(default)]
    pub country_code: String,
}

impl GeoWhoisRecord {
    /// True when the record carries a country code
    pub fn has_country(&self) -> bool {
        !self.country_code.is_empty()
    }
}

/// The GeoWhois country database
pub struct GeoWhoisSource {
    db: MmdbSource,
}

impl GeoWhoisSource {
    /// Open the database
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            db: MmdbSource::open(path)?,
        })
    }

    /// Point lookup
    pub fn lookup(&self, addr: IpAddr) -> Option<GeoWhoisRecord> {
        self.db.lookup(addr).map(|(record, _)| record)
    }
}
