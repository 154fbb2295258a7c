//! IPinfo Lite adapter (primary ASN source, the only one carrying
//! `as_domain`).

use std::net::IpAddr;
use std::path::Path;

use ipnetwork::IpNetwork;
use serde::Deserialize;

use super::MmdbSource;
use crate::error::Result;

/// Record from the IPinfo Lite database
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IpinfoRecord {
    /// Registered domain of the AS operator
    #[serde(default)]
    pub as_domain: String,
    /// AS operator name
    #[serde(default)]
    pub as_name: String,
    /// ASN in "AS12345" form
    #[serde(default)]
    pub asn: String,
    /// Continent name
    #[serde(default)]
    pub continent: String,
    /// Two-letter continent code
    #[serde(default)]
    pub continent_code: String,
    /// Country name
    #[serde(default)]
    pub country: String,
    /// ISO 3166-1 country code
    #[serde(default)]
    pub country_code: String,
}

impl IpinfoRecord {
    /// True when the record carries ASN data
    pub fn has_asn(&self) -> bool {
        !self.asn.is_empty()
    }

    /// Numeric ASN parsed from the "AS12345" form, 0 when malformed
    pub fn as_number(&self) -> u32 {
        self.asn
            .strip_prefix("AS")
            .unwrap_or(&self.asn)
            .parse()
            .unwrap_or(0)
    }
}

/// The IPinfo Lite database
pub struct IpinfoSource {
    db: MmdbSource,
}

impl IpinfoSource {
    /// Open the database
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            db: MmdbSource::open(path)?,
        })
    }

    /// Point lookup returning the record and its covering network
    pub fn lookup(&self, addr: IpAddr) -> Option<(IpinfoRecord, IpNetwork)> {
        self.db.lookup(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_number_parsing() {
        let record = IpinfoRecord {
            asn: "AS15169".to_owned(),
            ..Default::default()
        };
        assert_eq!(record.as_number(), 15169);

        let empty = IpinfoRecord::default();
        assert_eq!(empty.as_number(), 0);
        assert!(!empty.has_asn());

        let malformed = IpinfoRecord {
            asn: "ASabc".to_owned(),
            ..Default::default()
        };
        assert_eq!(malformed.as_number(), 0);
    }
}
