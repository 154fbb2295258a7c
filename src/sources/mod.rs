//! Source database adapters.
//!
//! One adapter per input dataset. MMDB-backed adapters wrap the external
//! `maxminddb` reader and expose typed iteration plus longest-prefix-match
//! point lookups; the QQWry and proxy-list adapters carry their own file
//! formats.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use ipnetwork::IpNetwork;
use maxminddb::{Mmap, Reader, WithinOptions};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{MergeError, Result};

pub mod dbip;
pub mod geolite;
pub mod geowhois;
pub mod ipinfo;
pub mod proxydb;
pub mod qqwry;
pub mod routeviews;

pub use dbip::{DbipRecord, DbipSource};
pub use geolite::{GeoCityRecord, GeoCitySource, GeoliteAsnSource};
pub use geowhois::{GeoWhoisRecord, GeoWhoisSource};
pub use ipinfo::{IpinfoRecord, IpinfoSource};
pub use proxydb::{ProxyFlags, ProxySource};
pub use qqwry::{QqwryRecord, QqwrySource};
pub use routeviews::RouteViewsSource;

/// ASN record shape shared by the GeoLite2-ASN and RouteViews databases
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AsnDbRecord {
    /// Autonomous system number
    #[serde(default)]
    pub autonomous_system_number: u32,
    /// Autonomous system organization name
    #[serde(default)]
    pub autonomous_system_organization: String,
}

impl AsnDbRecord {
    /// True when the record carries ASN data
    pub fn has_asn(&self) -> bool {
        self.autonomous_system_number != 0
    }
}

/// A memory-mapped MMDB source database.
///
/// Shared read-only across worker threads; the underlying reader is `Sync`.
pub struct MmdbSource {
    reader: Reader<Mmap>,
    path: PathBuf,
}

impl MmdbSource {
    /// Open a source database. Failure here is fatal for the whole merge.
    pub fn open(path: &Path) -> Result<Self> {
        let reader = unsafe { Reader::open_mmap(path) }.map_err(|e| {
            MergeError::ResourceOpen(format!("{}: {}", path.display(), e))
        })?;
        Ok(Self {
            reader,
            path: path.to_owned(),
        })
    }

    /// Path of the underlying file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Iterate every leaf network in the source, decoded as `T`.
    ///
    /// Aliased IPv4-in-IPv6 subtrees and data-less nodes are skipped, so
    /// each IPv4 network is visited exactly once. Individual items carry
    /// decode failures so callers can log, count, and keep going.
    pub fn networks<T>(
        &self,
    ) -> Result<impl Iterator<Item = Result<(IpNetwork, T)>> + '_>
    where
        T: DeserializeOwned,
    {
        let iter = self
            .reader
            .networks(WithinOptions::default())
            .map_err(|e| {
                MergeError::ResourceOpen(format!("{}: {}", self.path.display(), e))
            })?;

        Ok(iter.map(|item| {
            let lookup = item.map_err(|e| MergeError::Decode(e.to_string()))?;
            let network = lookup
                .network()
                .map_err(|e| MergeError::Decode(e.to_string()))?;
            let record: T = lookup
                .decode()
                .map_err(|e| MergeError::Decode(format!("{}: {}", network, e)))?
                .ok_or_else(|| {
                    MergeError::Decode(format!("{}: record vanished during iteration", network))
                })?;
            Ok((network, record))
        }))
    }

    /// Longest-prefix-match point lookup.
    ///
    /// Returns the decoded record together with its covering network so
    /// callers can cache by prefix. Lookup errors degrade to `None`; a
    /// failing auxiliary source must not abort the merge.
    pub fn lookup<T>(&self, addr: IpAddr) -> Option<(T, IpNetwork)>
    where
        T: DeserializeOwned,
    {
        let result = self.reader.lookup(addr).ok()?;
        if !result.has_data() {
            return None;
        }
        let network = result.network().ok()?;
        let record = result.decode::<T>().ok()??;
        Some((record, network))
    }
}
