//! Source file locations and output metadata.
//!
//! Downloading the source databases is handled outside this crate; the merge
//! engine only needs to know where the files land on disk. `verify_files`
//! is the handshake with whatever fetches them.

use std::path::{Path, PathBuf};

use crate::error::{MergeError, Result};

/// Default output file path
pub const OUTPUT_FILE: &str = "Merged-IP.mmdb";

/// Database type written into the output metadata
pub const DATABASE_TYPE: &str = "Merged-IP-City-ASN";

/// English description written into the output metadata
pub const DATABASE_DESCRIPTION: &str =
    "Merged IP geolocation database combining GeoLite2, IPinfo Lite, and DB-IP data";

/// Languages carried by the multi-language name maps
pub const SUPPORTED_LANGUAGES: [&str; 8] =
    ["de", "en", "es", "fr", "ja", "pt-BR", "ru", "zh-CN"];

/// Record size in bits for the output search tree
pub const RECORD_SIZE: u16 = 28;

/// Locations of all source database files.
///
/// The defaults match the layout produced by the external download step:
/// everything under a `download/` directory next to the working directory.
#[derive(Debug, Clone)]
pub struct SourcePaths {
    /// GeoLite2-City MMDB (primary geographic source)
    pub geolite_city: PathBuf,
    /// GeoLite2-ASN MMDB (secondary ASN source)
    pub geolite_asn: PathBuf,
    /// IPinfo Lite MMDB (primary ASN source)
    pub ipinfo_lite: PathBuf,
    /// DB-IP City IPv4 MMDB (supplementary geographic source)
    pub dbip_city_v4: PathBuf,
    /// DB-IP City IPv6 MMDB (supplementary geographic source)
    pub dbip_city_v6: PathBuf,
    /// RouteViews ASN MMDB (tertiary ASN source)
    pub routeviews_asn: PathBuf,
    /// GeoWhois country MMDB (country fallback source)
    pub geowhois_country: PathBuf,
    /// QQWry IPDB file (Chinese localization source)
    pub qqwry: PathBuf,
    /// OpenProxyDB CSV (proxy classification source)
    pub proxydb: PathBuf,
}

impl Default for SourcePaths {
    fn default() -> Self {
        let dl = Path::new("download");
        Self {
            geolite_city: dl.join("GeoLite2-City.mmdb"),
            geolite_asn: dl.join("GeoLite2-ASN.mmdb"),
            ipinfo_lite: dl.join("ipinfo_lite.mmdb"),
            dbip_city_v4: dl.join("dbip-city-ipv4.mmdb"),
            dbip_city_v6: dl.join("dbip-city-ipv6.mmdb"),
            routeviews_asn: dl.join("routeviews-asn.mmdb"),
            geowhois_country: dl.join("geolite2-geo-whois-asn-country.mmdb"),
            qqwry: dl.join("qqwry.ipdb"),
            proxydb: dl.join("proxy_blocks.csv"),
        }
    }
}

impl SourcePaths {
    fn all(&self) -> [(&'static str, &Path); 9] {
        [
            ("GeoLite2-City", &self.geolite_city),
            ("GeoLite2-ASN", &self.geolite_asn),
            ("IPinfo-Lite", &self.ipinfo_lite),
            ("DB-IP-IPv4", &self.dbip_city_v4),
            ("DB-IP-IPv6", &self.dbip_city_v6),
            ("RouteViews-ASN", &self.routeviews_asn),
            ("GeoWhois-Country", &self.geowhois_country),
            ("QQWry-Chunzhen", &self.qqwry),
            ("OpenProxyDB", &self.proxydb),
        ]
    }

    /// Check that every source file exists before the merge starts.
    pub fn verify_files(&self) -> Result<()> {
        let missing: Vec<String> = self
            .all()
            .iter()
            .filter(|(_, path)| !path.is_file())
            .map(|(name, path)| format!("{} ({})", name, path.display()))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(MergeError::ResourceOpen(format!(
                "missing source files: {}",
                missing.join(", ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths_under_download() {
        let paths = SourcePaths::default();
        assert!(paths.geolite_city.starts_with("download"));
        assert!(paths.proxydb.ends_with("proxy_blocks.csv"));
    }

    #[test]
    fn test_verify_files_reports_missing() {
        let paths = SourcePaths::default();
        let err = paths.verify_files().unwrap_err();
        match err {
            MergeError::ResourceOpen(msg) => assert!(msg.contains("GeoLite2-City")),
            other => panic!("expected ResourceOpen, got {:?}", other),
        }
    }
}
