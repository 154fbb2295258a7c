//! GeoLite2 adapters: the City database (primary geographic source) and the
//! ASN database (secondary ASN source).

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;

use ipnetwork::IpNetwork;
use serde::Deserialize;

use super::{AsnDbRecord, MmdbSource};
use crate::error::Result;

/// City-level entity with localized names
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeoCityCity {
    /// GeoNames identifier
    #[serde(default)]
    pub geoname_id: u32,
    /// Localized names keyed by language tag
    #[serde(default)]
    pub names: HashMap<String, String>,
}

/// Continent entity
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeoCityContinent {
    /// Two-letter continent code
    #[serde(default)]
    pub code: String,
    /// GeoNames identifier
    #[serde(default)]
    pub geoname_id: u32,
    /// Localized names keyed by language tag
    #[serde(default)]
    pub names: HashMap<String, String>,
}

/// Country-shaped entity (also used for registered_country)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeoCityCountry {
    /// GeoNames identifier
    #[serde(default)]
    pub geoname_id: u32,
    /// ISO 3166-1 code
    #[serde(default)]
    pub iso_code: String,
    /// Localized names keyed by language tag
    #[serde(default)]
    pub names: HashMap<String, String>,
}

/// Coordinates, accuracy, and timezone
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeoCityLocation {
    /// Accuracy radius in kilometers
    #[serde(default)]
    pub accuracy_radius: u16,
    /// Latitude in degrees
    #[serde(default)]
    pub latitude: f64,
    /// Longitude in degrees
    #[serde(default)]
    pub longitude: f64,
    /// US metro code
    #[serde(default)]
    pub metro_code: u16,
    /// IANA timezone name
    #[serde(default)]
    pub time_zone: String,
}

/// Postal code
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeoCityPostal {
    /// Postal code string
    #[serde(default)]
    pub code: String,
}

/// Subdivision (state / province) entity
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeoCitySubdivision {
    /// GeoNames identifier
    #[serde(default)]
    pub geoname_id: u32,
    /// ISO 3166-2 code
    #[serde(default)]
    pub iso_code: String,
    /// Localized names keyed by language tag
    #[serde(default)]
    pub names: HashMap<String, String>,
}

/// Full record from the GeoLite2-City database
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeoCityRecord {
    /// City entity
    #[serde(default)]
    pub city: GeoCityCity,
    /// Continent entity
    #[serde(default)]
    pub continent: GeoCityContinent,
    /// Country entity
    #[serde(default)]
    pub country: GeoCityCountry,
    /// Location data
    #[serde(default)]
    pub location: GeoCityLocation,
    /// Postal code
    #[serde(default)]
    pub postal: GeoCityPostal,
    /// Country of registration
    #[serde(default)]
    pub registered_country: GeoCityCountry,
    /// Subdivisions, most to least significant
    #[serde(default)]
    pub subdivisions: Vec<GeoCitySubdivision>,
}

impl GeoCityRecord {
    /// True when the record identifies at least a country or a city
    pub fn has_geo_data(&self) -> bool {
        !self.country.iso_code.is_empty() || self.city.geoname_id != 0
    }

    /// True when the record carries usable location data.
    ///
    /// (0, 0) without any other location field is treated as unset; a real
    /// equator/prime-meridian fix always comes with an accuracy radius or
    /// timezone.
    pub fn has_location_data(&self) -> bool {
        self.location.accuracy_radius != 0
            || self.location.latitude != 0.0
            || self.location.longitude != 0.0
            || !self.location.time_zone.is_empty()
    }
}

/// The GeoLite2-City database (primary geographic source)
pub struct GeoCitySource {
    db: MmdbSource,
}

impl GeoCitySource {
    /// Open the database
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            db: MmdbSource::open(path)?,
        })
    }

    /// Stream every network in the database
    pub fn networks(
        &self,
    ) -> Result<impl Iterator<Item = Result<(IpNetwork, GeoCityRecord)>> + '_> {
        self.db.networks()
    }

    /// Point lookup
    pub fn lookup(&self, addr: IpAddr) -> Option<GeoCityRecord> {
        self.db.lookup(addr).map(|(record, _)| record)
    }
}

/// The GeoLite2-ASN database (secondary ASN source)
pub struct GeoliteAsnSource {
    db: MmdbSource,
}

impl GeoliteAsnSource {
    /// Open the database
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            db: MmdbSource::open(path)?,
        })
    }

    /// Point lookup returning the record and its covering network
    pub fn lookup(&self, addr: IpAddr) -> Option<(AsnDbRecord, IpNetwork)> {
        self.db.lookup(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_geo_data() {
        let mut record = GeoCityRecord::default();
        assert!(!record.has_geo_data());
        record.country.iso_code = "US".to_owned();
        assert!(record.has_geo_data());

        let mut record = GeoCityRecord::default();
        record.city.geoname_id = 5375480;
        assert!(record.has_geo_data());
    }

    #[test]
    fn test_zero_coordinates_alone_are_unset() {
        let record = GeoCityRecord::default();
        assert!(!record.has_location_data());

        let mut record = GeoCityRecord::default();
        record.location.time_zone = "Atlantic/St_Helena".to_owned();
        assert!(record.has_location_data());

        // A true (0, 0) fix still carries an accuracy radius
        let mut record = GeoCityRecord::default();
        record.location.accuracy_radius = 50;
        assert!(record.has_location_data());
    }
}
