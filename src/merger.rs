//! The merge driver: opens every source, runs the primary and supplementary
//! passes, and owns the output trie plus aggregate counters.
//!
//! Pass 1 streams Geo-City prefixes through a worker pool (source iteration
//! and trie insertion are each single-threaded, so a producer thread feeds
//! workers over a bounded channel and a serializer thread drains their
//! results). Pass 2 runs sequentially after Pass 1 completes: it only
//! touches prefixes the primary source left uncovered, and its inserts must
//! observe Pass 1's deposits.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use ipnetwork::IpNetwork;

use crate::config::SourcePaths;
use crate::error::{MergeError, Result};
use crate::interner;
use crate::mmdb::{OutputTree, RecordSize, Value};
use crate::record::MergedRecord;
use crate::sources::{
    DbipRecord, DbipSource, GeoCitySource, GeoWhoisSource, GeoliteAsnSource, IpinfoSource,
    ProxySource, QqwrySource, RouteViewsSource,
};
use crate::worker::{worker_loop, CancelToken, EnrichmentContext, ResultItem, WorkItem};

/// Aggregate merge counters, reported once the merge finishes.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeStats {
    /// Networks read from the driving sources
    pub total_networks: u64,
    /// Records where Geo-City contributed geographic data
    pub geolite_city_hits: u64,
    /// ASN sub-records taken from GeoLite2-ASN
    pub geolite_asn_hits: u64,
    /// ASN sub-records taken from IPinfo Lite
    pub ipinfo_hits: u64,
    /// ASN sub-records taken from RouteViews
    pub routeviews_hits: u64,
    /// Country codes filled by the GeoWhois fallback
    pub geowhois_hits: u64,
    /// Records enriched with Chinese localized names
    pub qqwry_hits: u64,
    /// Records enriched with proxy flags
    pub proxydb_hits: u64,
    /// Supplementary records inserted by Pass 2
    pub dbip_hits: u64,
    /// ASN lookups answered from the per-worker cache
    pub asn_cache_hits: u64,
    /// Empty records skipped before insertion
    pub empty_records: u64,
    /// Per-prefix decode failures (logged and skipped)
    pub decode_errors: u64,
    /// Output trie insert failures (logged and skipped)
    pub insert_errors: u64,
    /// Records actually inserted into the output trie
    pub processed_networks: u64,
}

impl MergeStats {
    fn absorb(&mut self, other: &MergeStats) {
        self.total_networks += other.total_networks;
        self.geolite_city_hits += other.geolite_city_hits;
        self.geolite_asn_hits += other.geolite_asn_hits;
        self.ipinfo_hits += other.ipinfo_hits;
        self.routeviews_hits += other.routeviews_hits;
        self.geowhois_hits += other.geowhois_hits;
        self.qqwry_hits += other.qqwry_hits;
        self.proxydb_hits += other.proxydb_hits;
        self.dbip_hits += other.dbip_hits;
        self.asn_cache_hits += other.asn_cache_hits;
        self.empty_records += other.empty_records;
        self.decode_errors += other.decode_errors;
        self.insert_errors += other.insert_errors;
        self.processed_networks += other.processed_networks;
    }
}

/// Merge two top-level record maps; keys already present in `existing` win,
/// `new` only fills gaps. Pass 1 deposits higher-priority data, so this is
/// how Pass 2 defers to it on collision.
pub(crate) fn merge_keep_existing(existing: &Value, new: &Value) -> Value {
    let (Value::Map(old), Value::Map(add)) = (existing, new) else {
        return new.clone();
    };
    let mut merged = old.clone();
    for (key, value) in add {
        if !merged.iter().any(|(existing_key, _)| existing_key == key) {
            merged.push((*key, value.clone()));
        }
    }
    Value::Map(merged)
}

/// Drives the merge of all source databases into one output trie.
pub struct Merger {
    geolite_city: GeoCitySource,
    geolite_asn: GeoliteAsnSource,
    ipinfo: IpinfoSource,
    dbip: DbipSource,
    routeviews: RouteViewsSource,
    geowhois: GeoWhoisSource,
    qqwry: QqwrySource,
    proxydb: ProxySource,

    tree: OutputTree,
    stats: MergeStats,
    workers: usize,
    cancel: CancelToken,
}

impl Merger {
    /// Open every source database. Any failure here aborts the merge.
    pub fn open(paths: &SourcePaths) -> Result<Self> {
        interner::init();

        Ok(Self {
            geolite_city: GeoCitySource::open(&paths.geolite_city)?,
            geolite_asn: GeoliteAsnSource::open(&paths.geolite_asn)?,
            ipinfo: IpinfoSource::open(&paths.ipinfo_lite)?,
            dbip: DbipSource::open(&paths.dbip_city_v4, &paths.dbip_city_v6)?,
            routeviews: RouteViewsSource::open(&paths.routeviews_asn)?,
            geowhois: GeoWhoisSource::open(&paths.geowhois_country)?,
            qqwry: QqwrySource::open(&paths.qqwry)?,
            proxydb: ProxySource::open(&paths.proxydb)?,
            tree: OutputTree::new(RecordSize::Bits28),
            stats: MergeStats::default(),
            workers: 0,
            cancel: CancelToken::new(),
        })
    }

    /// Override the worker count (0 selects hardware parallelism)
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Token that cancels this merge when triggered
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Aggregate counters collected so far
    pub fn stats(&self) -> &MergeStats {
        &self.stats
    }

    /// Consume the merger and hand the populated trie to the writer
    pub fn into_tree(self) -> OutputTree {
        self.tree
    }

    /// Run both merge passes.
    pub fn merge(&mut self) -> Result<()> {
        let start = Instant::now();

        println!("Processing GeoLite2-City networks (primary pass)...");
        self.primary_pass()?;

        println!("Processing DB-IP networks (supplementary pass)...");
        self.supplementary_pass()?;

        println!("Merge completed in {:.1?}", start.elapsed());
        self.print_stats();
        println!("[interner] {}", interner::stats());

        Ok(())
    }

    fn worker_count(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            thread::available_parallelism().map_or(1, |n| n.get())
        }
    }

    /// Pass 1: stream Geo-City prefixes through the worker pool.
    fn primary_pass(&mut self) -> Result<()> {
        let workers = self.worker_count();

        // Work channel is deep enough to keep workers saturated while the
        // producer decodes; the result channel stays small so the serializer
        // bounds memory.
        let (work_tx, work_rx) = mpsc::sync_channel::<WorkItem>(workers * 1000);
        let (result_tx, result_rx) = mpsc::sync_channel::<ResultItem>(workers * 100);
        let work_rx = Arc::new(Mutex::new(work_rx));

        let tree = &mut self.tree;
        let city = &self.geolite_city;
        let ipinfo = &self.ipinfo;
        let geolite_asn = &self.geolite_asn;
        let routeviews = &self.routeviews;
        let geowhois = &self.geowhois;
        let qqwry = &self.qqwry;
        let proxydb = &self.proxydb;
        let cancel = &self.cancel;

        let (worker_stats, inserted, insert_errors, produced) = thread::scope(|s| {
            let mut handles = Vec::with_capacity(workers);
            for _ in 0..workers {
                let work_rx = Arc::clone(&work_rx);
                let result_tx = result_tx.clone();
                let cancel = cancel.clone();
                let ctx = EnrichmentContext::new(
                    ipinfo, geolite_asn, routeviews, geowhois, qqwry, proxydb,
                );
                handles.push(s.spawn(move || worker_loop(work_rx, result_tx, ctx, cancel)));
            }
            // Workers hold the only remaining senders; dropping ours lets
            // the serializer observe completion.
            drop(result_tx);

            let serializer = s.spawn(move || {
                let mut inserted = 0u64;
                let mut errors = 0u64;
                while let Ok(item) = result_rx.recv() {
                    match tree.insert(item.network, item.value) {
                        Ok(()) => {
                            inserted += 1;
                            if inserted % 100_000 == 0 {
                                println!("  Inserted {} networks...", inserted);
                            }
                        }
                        Err(e) => {
                            eprintln!(
                                "Warning: failed to insert network {}: {}",
                                item.network, e
                            );
                            errors += 1;
                        }
                    }
                }
                (inserted, errors)
            });

            // Producer runs on the scope's own thread: source decoders are
            // not reentrant for iteration.
            let produced: Result<(u64, u64)> = (|| {
                let mut total = 0u64;
                let mut decode_errors = 0u64;
                for item in city.networks()? {
                    if cancel.is_cancelled() {
                        break;
                    }
                    match item {
                        Ok((network, geo)) => {
                            total += 1;
                            if work_tx.send(WorkItem { network, geo }).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            eprintln!("Warning: failed to read network: {}", e);
                            decode_errors += 1;
                        }
                    }
                }
                Ok((total, decode_errors))
            })();
            drop(work_tx);

            let mut aggregate = MergeStats::default();
            for handle in handles {
                aggregate.absorb(&handle.join().expect("worker thread panicked"));
            }
            let (inserted, errors) = serializer.join().expect("serializer thread panicked");
            (aggregate, inserted, errors, produced)
        });

        let (total, decode_errors) = produced?;
        self.stats.absorb(&worker_stats);
        self.stats.total_networks += total;
        self.stats.decode_errors += decode_errors;
        self.stats.insert_errors += insert_errors;
        // The serializer's count is authoritative: a worker counts a record
        // when it fuses it, but the insert can still fail downstream.
        self.stats.processed_networks =
            self.stats.processed_networks - worker_stats.processed_networks + inserted;

        if self.cancel.is_cancelled() {
            return Err(MergeError::Cancelled);
        }
        Ok(())
    }

    /// Pass 2: insert DB-IP prefixes wherever the primary source had no
    /// geographic answer, merging around anything Pass 1 already wrote.
    fn supplementary_pass(&mut self) -> Result<()> {
        let tree = &mut self.tree;
        let city = &self.geolite_city;
        let cancel = &self.cancel;
        let mut ctx = EnrichmentContext::new(
            &self.ipinfo,
            &self.geolite_asn,
            &self.routeviews,
            &self.geowhois,
            &self.qqwry,
            &self.proxydb,
        );

        supplementary_stream(self.dbip.networks_v4()?, &mut ctx, city, tree, cancel)?;
        supplementary_stream(self.dbip.networks_v6()?, &mut ctx, city, tree, cancel)?;

        self.stats.absorb(&ctx.stats);
        Ok(())
    }

    fn print_stats(&self) {
        let s = &self.stats;
        println!("Merge statistics:");
        println!("  Total networks processed: {}", s.total_networks);
        println!("  GeoLite2-City hits: {}", s.geolite_city_hits);
        println!("  IPinfo Lite ASN hits: {}", s.ipinfo_hits);
        println!("  GeoLite2-ASN hits: {}", s.geolite_asn_hits);
        println!("  RouteViews ASN hits: {}", s.routeviews_hits);
        println!("  GeoWhois country fallback hits: {}", s.geowhois_hits);
        println!("  QQWry China enrichment hits: {}", s.qqwry_hits);
        println!("  OpenProxyDB hits: {}", s.proxydb_hits);
        println!("  DB-IP supplementary records: {}", s.dbip_hits);
        println!("  ASN cache hits: {}", s.asn_cache_hits);
        println!("  Empty records skipped: {}", s.empty_records);
        println!("  Decode errors: {}", s.decode_errors);
        println!("  Insert errors: {}", s.insert_errors);
        println!("  Final network count: {}", s.processed_networks);
    }
}

/// Process one supplementary stream (a single address family).
fn supplementary_stream<I>(
    networks: I,
    ctx: &mut EnrichmentContext<'_>,
    city: &GeoCitySource,
    tree: &mut OutputTree,
    cancel: &CancelToken,
) -> Result<()>
where
    I: Iterator<Item = Result<(IpNetwork, DbipRecord)>>,
{
    let mut record = MergedRecord::default();

    for item in networks {
        if cancel.is_cancelled() {
            return Err(MergeError::Cancelled);
        }

        let (network, supp) = match item {
            Ok(pair) => pair,
            Err(e) => {
                eprintln!("Warning: failed to read DB-IP network: {}", e);
                ctx.stats.decode_errors += 1;
                continue;
            }
        };

        if !supp.has_geo_data() {
            continue;
        }

        // Pass 1 already handled regions the primary source covers.
        if let Some(geo) = city.lookup(network.ip()) {
            if geo.has_geo_data() {
                continue;
            }
        }

        ctx.stats.total_networks += 1;
        ctx.build_supplementary_record(&network, &supp, &mut record);

        if record.is_empty() {
            ctx.stats.empty_records += 1;
            continue;
        }
        let Some(value) = record.to_data_value() else {
            ctx.stats.empty_records += 1;
            continue;
        };

        match tree.insert_or_merge(network, value, merge_keep_existing) {
            Ok(()) => {
                ctx.stats.dbip_hits += 1;
                ctx.stats.processed_networks += 1;
            }
            Err(e) => {
                eprintln!("Warning: failed to insert DB-IP network {}: {}", network, e);
                ctx.stats.insert_errors += 1;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keep_existing_prefers_old_keys() {
        let existing = Value::Map(vec![
            ("country", Value::Str("existing")),
            ("asn", Value::Str("kept")),
        ]);
        let new = Value::Map(vec![
            ("country", Value::Str("new")),
            ("city", Value::Str("added")),
        ]);
        let merged = merge_keep_existing(&existing, &new);
        assert_eq!(
            merged,
            Value::Map(vec![
                ("country", Value::Str("existing")),
                ("asn", Value::Str("kept")),
                ("city", Value::Str("added")),
            ])
        );
    }

    #[test]
    fn test_merge_keep_existing_non_map_replaced() {
        let merged = merge_keep_existing(&Value::Bool(true), &Value::Str("replacement"));
        assert_eq!(merged, Value::Str("replacement"));
    }

    #[test]
    fn test_stats_absorb() {
        let mut a = MergeStats {
            ipinfo_hits: 2,
            processed_networks: 5,
            ..Default::default()
        };
        let b = MergeStats {
            ipinfo_hits: 3,
            empty_records: 1,
            ..Default::default()
        };
        a.absorb(&b);
        assert_eq!(a.ipinfo_hits, 5);
        assert_eq!(a.processed_networks, 5);
        assert_eq!(a.empty_records, 1);
    }
}
