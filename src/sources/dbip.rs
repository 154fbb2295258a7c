//! DB-IP City adapter (supplementary geographic source). Ships as two MMDB
//! files, one per address family, with a flat schema unlike GeoLite's nested
//! one.

use std::net::IpAddr;
use std::path::Path;

use ipnetwork::IpNetwork;
use serde::Deserialize;

use super::MmdbSource;
use crate::error::Result;

/// Record from the DB-IP City databases
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DbipRecord {
    /// City name (English)
    #[serde(default)]
    pub city: String,
    /// ISO 3166-1 country code
    #[serde(default)]
    pub country_code: String,
    /// Latitude in degrees
    #[serde(default)]
    pub latitude: f32,
    /// Longitude in degrees
    #[serde(default)]
    pub longitude: f32,
    /// Postal code
    #[serde(default)]
    pub postcode: String,
    /// Primary subdivision (state / province)
    #[serde(default)]
    pub state1: String,
    /// Secondary subdivision
    #[serde(default)]
    pub state2: String,
    /// IANA timezone name
    #[serde(default)]
    pub timezone: String,
}

impl DbipRecord {
    /// True when the record identifies at least a country or a city
    pub fn has_geo_data(&self) -> bool {
        !self.country_code.is_empty() || !self.city.is_empty()
    }

    /// True when the record carries usable location data; a bare (0, 0)
    /// with no timezone is treated as unset
    pub fn has_location_data(&self) -> bool {
        self.latitude != 0.0 || self.longitude != 0.0 || !self.timezone.is_empty()
    }
}

/// The DB-IP City databases (IPv4 and IPv6 files)
pub struct DbipSource {
    v4: MmdbSource,
    v6: MmdbSource,
}

impl DbipSource {
    /// Open both per-family databases
    pub fn open(v4_path: &Path, v6_path: &Path) -> Result<Self> {
        Ok(Self {
            v4: MmdbSource::open(v4_path)?,
            v6: MmdbSource::open(v6_path)?,
        })
    }

    /// Stream every IPv4 network
    pub fn networks_v4(
        &self,
    ) -> Result<impl Iterator<Item = Result<(IpNetwork, DbipRecord)>> + '_> {
        self.v4.networks()
    }

    /// Stream every IPv6 network
    pub fn networks_v6(
        &self,
    ) -> Result<impl Iterator<Item = Result<(IpNetwork, DbipRecord)>> + '_> {
        self.v6.networks()
    }

    /// Point lookup dispatched to the matching family
    pub fn lookup(&self, addr: IpAddr) -> Option<DbipRecord> {
        let db = match addr {
            IpAddr::V4(_) => &self.v4,
            IpAddr::V6(_) => &self.v6,
        };
        db.lookup(addr).map(|(record, _)| record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_and_location_predicates() {
        let mut record = DbipRecord::default();
        assert!(!record.has_geo_data());
        assert!(!record.has_location_data());

        record.city = "Berlin".to_owned();
        assert!(record.has_geo_data());

        record.latitude = 52.52;
        record.longitude = 13.40;
        assert!(record.has_location_data());
    }
}
