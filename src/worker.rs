//! Worker-side merge machinery: the per-worker enrichment context, the
//! priority-ordered field fusion, and the worker loop consuming the primary
//! pass's work channel.
//!
//! Source readers are shared read-only across workers; everything mutable
//! (the in-construction record, the single-entry ASN cache, counters) is
//! strictly per-worker.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::{Arc, Mutex};

use ipnetwork::IpNetwork;

use crate::interner::intern;
use crate::merger::MergeStats;
use crate::mmdb::Value;
use crate::record::{
    intern_names, AsnRecord, CityRecord, ContinentRecord, CountryRecord, LocationRecord,
    MergedRecord, PostalRecord, SubdivisionRecord,
};
use crate::sources::{
    DbipRecord, GeoCityRecord, GeoWhoisSource, GeoliteAsnSource, IpinfoSource, ProxySource,
    QqwrySource, RouteViewsSource,
};

/// Cooperative cancellation token for a running merge.
///
/// Cloned into every worker; each loop iteration checks it and drains
/// cleanly when set.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a fresh, unset token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// True once cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// One unit of primary-pass work: a decoded Geo-City network
pub(crate) struct WorkItem {
    pub network: IpNetwork,
    pub geo: GeoCityRecord,
}

/// A fused record ready for insertion by the serializer thread
pub(crate) struct ResultItem {
    pub network: IpNetwork,
    pub value: Value,
}

/// Per-worker enrichment state over the shared auxiliary sources.
pub(crate) struct EnrichmentContext<'a> {
    ipinfo: &'a IpinfoSource,
    geolite_asn: &'a GeoliteAsnSource,
    routeviews: &'a RouteViewsSource,
    geowhois: &'a GeoWhoisSource,
    qqwry: &'a QqwrySource,
    proxydb: &'a ProxySource,

    /// ASN prefixes are much larger than geo prefixes, so consecutive work
    /// items usually share one. A single cached (prefix, record) pair
    /// short-circuits the three-source lookup chain.
    cached_asn: Option<(IpNetwork, AsnRecord)>,

    pub stats: MergeStats,
}

impl<'a> EnrichmentContext<'a> {
    pub fn new(
        ipinfo: &'a IpinfoSource,
        geolite_asn: &'a GeoliteAsnSource,
        routeviews: &'a RouteViewsSource,
        geowhois: &'a GeoWhoisSource,
        qqwry: &'a QqwrySource,
        proxydb: &'a ProxySource,
    ) -> Self {
        Self {
            ipinfo,
            geolite_asn,
            routeviews,
            geowhois,
            qqwry,
            proxydb,
            cached_asn: None,
            stats: MergeStats::default(),
        }
    }

    /// Fuse a primary-pass record: Geo-City fields first, then enrichment.
    pub fn build_primary_record(
        &mut self,
        network: &IpNetwork,
        geo: &GeoCityRecord,
        record: &mut MergedRecord,
    ) {
        record.reset();

        if geo.has_geo_data() {
            self.stats.geolite_city_hits += 1;

            record.city = CityRecord {
                geoname_id: geo.city.geoname_id,
                names: intern_names(&geo.city.names),
            };
            record.continent = ContinentRecord {
                code: intern(&geo.continent.code),
                geoname_id: geo.continent.geoname_id,
                names: intern_names(&geo.continent.names),
            };
            record.country = CountryRecord {
                geoname_id: geo.country.geoname_id,
                iso_code: intern(&geo.country.iso_code),
                names: intern_names(&geo.country.names),
            };
            record.location = LocationRecord {
                accuracy_radius: geo.location.accuracy_radius,
                latitude: geo.location.latitude,
                longitude: geo.location.longitude,
                metro_code: geo.location.metro_code,
                time_zone: intern(&geo.location.time_zone),
                has_coordinates: geo.has_location_data(),
            };
            record.postal = PostalRecord {
                code: intern(&geo.postal.code),
            };
            record.registered_country = CountryRecord {
                geoname_id: geo.registered_country.geoname_id,
                iso_code: intern(&geo.registered_country.iso_code),
                names: intern_names(&geo.registered_country.names),
            };
            record.subdivisions = geo
                .subdivisions
                .iter()
                .map(|sub| SubdivisionRecord {
                    geoname_id: sub.geoname_id,
                    iso_code: intern(&sub.iso_code),
                    names: intern_names(&sub.names),
                })
                .collect();
        }

        let ip = network.ip();
        self.enrich_asn(ip, record);
        self.enrich_country_fallback(ip, record);
        self.enrich_chinese_names(ip, record);
        self.enrich_proxy(ip, record);
    }

    /// Fuse a supplementary-pass record: DB-IP fields first, then the same
    /// enrichment chain.
    pub fn build_supplementary_record(
        &mut self,
        network: &IpNetwork,
        supp: &DbipRecord,
        record: &mut MergedRecord,
    ) {
        record.reset();

        if supp.has_geo_data() {
            if !supp.city.is_empty() {
                record.city.names.insert("en", intern(&supp.city));
            }
            record.country.iso_code = intern(&supp.country_code);

            if supp.has_location_data() {
                record.location = LocationRecord {
                    latitude: f64::from(supp.latitude),
                    longitude: f64::from(supp.longitude),
                    time_zone: intern(&supp.timezone),
                    has_coordinates: true,
                    ..Default::default()
                };
            }
            if !supp.postcode.is_empty() {
                record.postal = PostalRecord {
                    code: intern(&supp.postcode),
                };
            }
            if !supp.state1.is_empty() {
                let mut names = crate::record::NameMap::default();
                names.insert("en", intern(&supp.state1));
                record.subdivisions = vec![SubdivisionRecord {
                    names,
                    ..Default::default()
                }];
            }
        }

        let ip = network.ip();
        self.enrich_asn(ip, record);
        self.enrich_country_fallback(ip, record);
        self.enrich_chinese_names(ip, record);
        self.enrich_proxy(ip, record);
    }

    /// ASN priority chain: IPinfo Lite, then GeoLite2-ASN, then RouteViews.
    /// The first source with a nonzero answer wins outright; sources are
    /// never mixed within one ASN sub-record.
    fn enrich_asn(&mut self, ip: IpAddr, record: &mut MergedRecord) {
        if let Some((prefix, asn)) = &self.cached_asn {
            if prefix.contains(ip) {
                self.stats.asn_cache_hits += 1;
                if asn.number != 0 {
                    record.asn = *asn;
                }
                return;
            }
        }

        if let Some((found, prefix)) = self.ipinfo.lookup(ip) {
            if found.has_asn() {
                self.stats.ipinfo_hits += 1;
                let asn = AsnRecord {
                    number: found.as_number(),
                    organization: intern(&found.as_name),
                    domain: intern(&found.as_domain),
                };
                record.asn = asn;
                self.cached_asn = Some((prefix, asn));
                return;
            }
        }

        if let Some((found, prefix)) = self.geolite_asn.lookup(ip) {
            if found.has_asn() {
                self.stats.geolite_asn_hits += 1;
                let asn = AsnRecord {
                    number: found.autonomous_system_number,
                    organization: intern(&found.autonomous_system_organization),
                    domain: "",
                };
                record.asn = asn;
                self.cached_asn = Some((prefix, asn));
                return;
            }
        }

        if let Some((found, prefix)) = self.routeviews.lookup(ip) {
            if found.has_asn() {
                self.stats.routeviews_hits += 1;
                let asn = AsnRecord {
                    number: found.autonomous_system_number,
                    organization: intern(&found.autonomous_system_organization),
                    domain: "",
                };
                record.asn = asn;
                self.cached_asn = Some((prefix, asn));
                return;
            }
        }

        self.cached_asn = None;
    }

    /// Country fallback: fills `iso_code` only, and only when the primary
    /// result left it empty.
    fn enrich_country_fallback(&mut self, ip: IpAddr, record: &mut MergedRecord) {
        if !record.country.iso_code.is_empty() {
            return;
        }
        if let Some(found) = self.geowhois.lookup(ip) {
            if found.has_country() {
                self.stats.geowhois_hits += 1;
                record.country.iso_code = intern(&found.country_code);
            }
        }
    }

    /// Chinese enrichment: additive zh-CN names for IPs both the merged
    /// record and the QQWry database agree are in China. Existing zh-CN
    /// values are never replaced.
    fn enrich_chinese_names(&mut self, ip: IpAddr, record: &mut MergedRecord) {
        if record.country.iso_code != "CN" {
            return;
        }

        let Some(found) = self.qqwry.lookup(ip) else {
            return;
        };
        if !found.has_geo_data() || !found.is_china() {
            return;
        }

        self.stats.qqwry_hits += 1;

        if found.has_city_data() && !record.city.names.contains_key("zh-CN") {
            record.city.names.insert("zh-CN", intern(&found.city_name));
        }

        if found.has_region_data() {
            if record.subdivisions.is_empty() {
                let mut names = crate::record::NameMap::default();
                names.insert("zh-CN", intern(&found.region_name));
                record.subdivisions.push(SubdivisionRecord {
                    names,
                    ..Default::default()
                });
            } else if !record.subdivisions[0].names.contains_key("zh-CN") {
                record.subdivisions[0]
                    .names
                    .insert("zh-CN", intern(&found.region_name));
            }
        }

        if !found.country_name.is_empty() && !record.country.names.contains_key("zh-CN") {
            record
                .country
                .names
                .insert("zh-CN", intern(&found.country_name));
        }
    }

    /// Proxy flags apply unconditionally; they never depend on other fields.
    fn enrich_proxy(&mut self, ip: IpAddr, record: &mut MergedRecord) {
        if let Some(flags) = self.proxydb.lookup(ip) {
            self.stats.proxydb_hits += 1;
            record.proxy = flags;
        }
    }

    /// Process one primary-pass item into an insertable value.
    fn process(&mut self, item: &WorkItem, record: &mut MergedRecord) -> Option<Value> {
        self.build_primary_record(&item.network, &item.geo, record);

        if record.is_empty() {
            self.stats.empty_records += 1;
            return None;
        }

        self.stats.processed_networks += 1;
        record.to_data_value()
    }
}

/// Worker loop: consume work items until the channel closes or the merge is
/// cancelled, emitting fused records on the result channel.
pub(crate) fn worker_loop(
    work_rx: Arc<Mutex<Receiver<WorkItem>>>,
    result_tx: SyncSender<ResultItem>,
    mut ctx: EnrichmentContext<'_>,
    cancel: CancelToken,
) -> MergeStats {
    let mut record = MergedRecord::default();

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let item = {
            let rx = work_rx.lock().unwrap();
            rx.recv()
        };
        let Ok(item) = item else {
            break;
        };

        if let Some(value) = ctx.process(&item, &mut record) {
            let result = ResultItem {
                network: item.network,
                value,
            };
            if result_tx.send(result).is_err() {
                break;
            }
        }
    }

    ctx.stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
