//! OpenProxyDB adapter: proxy / anonymity classification from a CSV feed.
//!
//! Rows carry either a bare address or a CIDR. Single addresses go into a
//! hash map for O(1) lookups; CIDR rows are kept sorted by (start address,
//! prefix length descending) behind a coalesced-interval index, so a point
//! lookup is a hash probe plus at most two binary searches on the common
//! path.

use std::io::Read;
use std::net::IpAddr;
use std::path::Path;

use ipnetwork::IpNetwork;
use rustc_hash::FxHashMap;

use crate::error::{MergeError, Result};

/// Proxy / anonymity flags for one address or range
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProxyFlags {
    /// anonblock OR proxy OR rangeblock
    pub is_proxy: bool,
    /// VPN exit
    pub is_vpn: bool,
    /// Tor exit node
    pub is_tor: bool,
    /// Hosting / webhost range
    pub is_hosting: bool,
    /// CDN range
    pub is_cdn: bool,
    /// School network block
    pub is_school: bool,
    /// is_proxy OR is_vpn OR is_tor
    pub is_anonymous: bool,
}

impl ProxyFlags {
    /// True when any source flag is set
    pub fn has_data(&self) -> bool {
        self.is_proxy
            || self.is_vpn
            || self.is_tor
            || self.is_hosting
            || self.is_cdn
            || self.is_school
    }
}

/// Columns that must be present in the CSV header
const REQUIRED_COLUMNS: [&str; 9] = [
    "ip",
    "anonblock",
    "proxy",
    "vpn",
    "cdn",
    "rangeblock",
    "school-block",
    "tor",
    "webhost",
];

#[derive(Debug, Clone, Copy)]
struct CidrEntry {
    start: u128,
    end: u128,
    bits: u8,
    flags: ProxyFlags,
}

/// Sorted CIDR entries for one address family plus a coalesced interval set
/// answering "covered at all?" in O(log n).
#[derive(Default, Debug)]
struct RangeIndex {
    entries: Vec<CidrEntry>,
    intervals: Vec<(u128, u128)>,
}

impl RangeIndex {
    fn build(mut entries: Vec<CidrEntry>) -> Self {
        entries.sort_by(|a, b| a.start.cmp(&b.start).then(b.bits.cmp(&a.bits)));

        let mut spans: Vec<(u128, u128)> = entries.iter().map(|e| (e.start, e.end)).collect();
        spans.sort_unstable();
        let mut intervals: Vec<(u128, u128)> = Vec::with_capacity(spans.len());
        for (start, end) in spans {
            match intervals.last_mut() {
                Some(last) if start <= last.1.saturating_add(1) => {
                    last.1 = last.1.max(end);
                }
                _ => intervals.push((start, end)),
            }
        }

        Self { entries, intervals }
    }

    fn covered(&self, key: u128) -> bool {
        let idx = self.intervals.partition_point(|&(start, _)| start <= key);
        idx > 0 && self.intervals[idx - 1].1 >= key
    }

    /// Most-specific containing range; ties cannot occur because equal
    /// (start, bits) pairs describe the same prefix.
    fn lookup(&self, key: u128) -> Option<ProxyFlags> {
        if self.entries.is_empty() || !self.covered(key) {
            return None;
        }

        let idx = self.entries.partition_point(|e| e.start <= key);
        let mut best: Option<&CidrEntry> = None;
        for entry in self.entries[..idx].iter().rev() {
            if entry.start <= key && key <= entry.end {
                if best.map_or(true, |b| entry.bits > b.bits) {
                    best = Some(entry);
                }
            }
            // Once a match exists, entries ending before the key cannot be
            // improved upon by anything further left.
            if best.is_some() && entry.end < key {
                break;
            }
        }
        best.map(|e| e.flags)
    }
}

/// The OpenProxyDB database, fully loaded into memory.
#[derive(Debug)]
pub struct ProxySource {
    singles: FxHashMap<IpAddr, ProxyFlags>,
    v4: RangeIndex,
    v6: RangeIndex,
    rows_skipped: u64,
}

impl ProxySource {
    /// Open and parse the CSV file. A missing required column is fatal;
    /// malformed rows are skipped.
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            MergeError::ResourceOpen(format!("{}: {}", path.display(), e))
        })?;
        Self::from_reader(file)
            .map_err(|e| match e {
                MergeError::ResourceOpen(msg) => {
                    MergeError::ResourceOpen(format!("{}: {}", path.display(), msg))
                }
                other => other,
            })
    }

    fn from_reader<R: Read>(input: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(input);

        let headers = reader
            .headers()
            .map_err(|e| MergeError::ResourceOpen(format!("bad CSV header: {}", e)))?;

        let column = |name: &str| -> Result<usize> {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| {
                    MergeError::ResourceOpen(format!("missing required column: {}", name))
                })
        };
        let ip_idx = column("ip")?;
        let anonblock_idx = column("anonblock")?;
        let proxy_idx = column("proxy")?;
        let vpn_idx = column("vpn")?;
        let cdn_idx = column("cdn")?;
        let rangeblock_idx = column("rangeblock")?;
        let school_idx = column("school-block")?;
        let tor_idx = column("tor")?;
        let webhost_idx = column("webhost")?;

        let mut singles = FxHashMap::default();
        let mut v4_entries = Vec::new();
        let mut v6_entries = Vec::new();
        let mut rows_skipped = 0u64;

        for row in reader.records() {
            let row = match row {
                Ok(row) => row,
                Err(_) => {
                    rows_skipped += 1;
                    continue;
                }
            };

            let ip_str = row.get(ip_idx).unwrap_or("").trim();
            if ip_str.is_empty() {
                continue;
            }

            let field = |idx: usize| parse_bool(row.get(idx).unwrap_or(""));
            let anonblock = field(anonblock_idx);
            let proxy = field(proxy_idx);
            let vpn = field(vpn_idx);
            let cdn = field(cdn_idx);
            let rangeblock = field(rangeblock_idx);
            let school = field(school_idx);
            let tor = field(tor_idx);
            let webhost = field(webhost_idx);

            let is_proxy = anonblock || proxy || rangeblock;
            let flags = ProxyFlags {
                is_proxy,
                is_vpn: vpn,
                is_tor: tor,
                is_hosting: webhost,
                is_cdn: cdn,
                is_school: school,
                is_anonymous: is_proxy || vpn || tor,
            };

            if !flags.has_data() {
                continue;
            }

            if ip_str.contains('/') {
                let Ok(network) = ip_str.parse::<IpNetwork>() else {
                    rows_skipped += 1;
                    continue;
                };
                match network {
                    IpNetwork::V4(net) => {
                        let start = u128::from(u32::from(net.network()));
                        let span = host_span(32, net.prefix());
                        v4_entries.push(CidrEntry {
                            start,
                            end: start + span,
                            bits: net.prefix(),
                            flags,
                        });
                    }
                    IpNetwork::V6(net) => {
                        let start = u128::from(net.network());
                        let span = host_span(128, net.prefix());
                        v6_entries.push(CidrEntry {
                            start,
                            end: start + span,
                            bits: net.prefix(),
                            flags,
                        });
                    }
                }
            } else {
                let Ok(addr) = ip_str.parse::<IpAddr>() else {
                    rows_skipped += 1;
                    continue;
                };
                singles.insert(canonical(addr), flags);
            }
        }

        Ok(Self {
            singles,
            v4: RangeIndex::build(v4_entries),
            v6: RangeIndex::build(v6_entries),
            rows_skipped,
        })
    }

    /// Point lookup. An exact single-IP entry beats any containing CIDR,
    /// regardless of prefix length.
    pub fn lookup(&self, addr: IpAddr) -> Option<ProxyFlags> {
        let addr = canonical(addr);
        if let Some(&flags) = self.singles.get(&addr) {
            return Some(flags);
        }
        match addr {
            IpAddr::V4(v4) => self.v4.lookup(u128::from(u32::from(v4))),
            IpAddr::V6(v6) => self.v6.lookup(u128::from(v6)),
        }
    }

    /// Counts of (single addresses, CIDR ranges, rows skipped)
    pub fn stats(&self) -> (usize, usize, u64) {
        (
            self.singles.len(),
            self.v4.entries.len() + self.v6.entries.len(),
            self.rows_skipped,
        )
    }
}

/// Number of host addresses above the network address
fn host_span(total_bits: u8, prefix: u8) -> u128 {
    let host_bits = total_bits - prefix;
    if host_bits == 0 {
        0
    } else {
        (1u128 << host_bits) - 1
    }
}

fn parse_bool(s: &str) -> bool {
    let s = s.trim();
    s.eq_ignore_ascii_case("true") || s == "1"
}

/// Unmap IPv4-mapped IPv6 addresses so both spellings hit the same entries.
fn canonical(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map_or(IpAddr::V6(v6), IpAddr::V4),
        v4 => v4,
    }
}
