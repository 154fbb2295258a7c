//! RouteViews ASN adapter (tertiary ASN source).

use std::net::IpAddr;
use std::path::Path;

use ipnetwork::IpNetwork;

use super::{AsnDbRecord, MmdbSource};
use crate::error::Result;

/// The RouteViews-derived ASN database
pub struct RouteViewsSource {
    db: MmdbSource,
}

impl RouteViewsSource {
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
