//! Process-wide string interner.
//!
//! The merged record stream repeats a small set of strings millions of times:
//! language tags, ISO codes, continent codes, timezone names, organization
//! strings, localized place names. Interning replaces each copy with one
//! canonical `&'static str`, which also lets the record types borrow
//! statically instead of owning. Canonical copies are leaked and live until
//! process exit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{OnceLock, RwLock};

use rustc_hash::FxHashSet;

/// Strings pre-interned at startup: values guaranteed to recur on almost
/// every record.
const COMMON_STRINGS: &[&str] = &[
    // Language tags (the closed set used by name maps)
    "de", "en", "es", "fr", "ja", "pt-BR", "ru", "zh-CN",
    // Continent codes
    "AF", "AN", "AS", "EU", "NA", "OC", "SA",
    // Common country codes (top 50 by IP allocation)
    "US", "CN", "JP", "DE", "GB", "FR", "KR", "BR", "CA", "IT",
    "RU", "AU", "IN", "NL", "ES", "MX", "ID", "PL", "SE", "CH",
    "TW", "BE", "AR", "NO", "AT", "ZA", "DK", "FI", "IE", "NZ",
    "SG", "HK", "CZ", "PT", "IL", "TH", "MY", "RO", "UA", "CL",
    "PH", "VN", "CO", "GR", "HU", "AE", "PK", "EG", "SA", "NG",
    // Output map keys
    "city", "continent", "country", "location", "postal",
    "registered_country", "subdivisions", "asn", "proxy",
    "geoname_id", "names", "code", "iso_code",
    "accuracy_radius", "latitude", "longitude", "metro_code", "time_zone",
    "autonomous_system_number", "autonomous_system_organization", "as_domain",
    "is_proxy", "is_vpn", "is_tor", "is_hosting", "is_cdn", "is_school",
    "is_anonymous",
];

struct Interner {
    pool: RwLock<FxHashSet<&'static str>>,
    hits: AtomicU64,
    misses: AtomicU64,
    saved: AtomicU64,
}

static GLOBAL: OnceLock<Interner> = OnceLock::new();

fn global() -> &'static Interner {
    GLOBAL.get_or_init(|| {
        let mut pool = FxHashSet::default();
        for s in COMMON_STRINGS {
            pool.insert(*s);
        }
        Interner {
            pool: RwLock::new(pool),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            saved: AtomicU64::new(0),
        }
    })
}

/// Pre-populate the interner with common strings. Idempotent; called once at
/// merge startup so the hot path never pays the initialization check.
pub fn init() {
    let _ = global();
}

/// Return the canonical copy of `s`, interning it on first sight.
///
/// The empty string is returned without touching the pool. Safe for
/// concurrent use; concurrent first-insertions of the same string resolve to
/// a single canonical copy.
pub fn intern(s: &str) -> &'static str {
    if s.is_empty() {
        return "";
    }

    let interner = global();
    if let Some(&canonical) = interner.pool.read().unwrap().get(s) {
        interner.hits.fetch_add(1, Ordering::Relaxed);
        return canonical;
    }

    let mut pool = interner.pool.write().unwrap();
    // Double-check under the write lock: another thread may have inserted
    // between our read and write acquisition.
    if let Some(&canonical) = pool.get(s) {
        interner.hits.fetch_add(1, Ordering::Relaxed);
        return canonical;
    }
    let canonical: &'static str = Box::leak(s.to_owned().into_boxed_str());
    pool.insert(canonical);
    interner.misses.fetch_add(1, Ordering::Relaxed);
    interner.saved.fetch_add(s.len() as u64, Ordering::Relaxed);
    canonical
}

/// Intern an owned string, reusing its allocation when it is the first copy.
pub fn intern_owned(s: String) -> &'static str {
    if s.is_empty() {
        return "";
    }

    let interner = global();
    if let Some(&canonical) = interner.pool.read().unwrap().get(s.as_str()) {
        interner.hits.fetch_add(1, Ordering::Relaxed);
        return canonical;
    }

    let mut pool = interner.pool.write().unwrap();
    if let Some(&canonical) = pool.get(s.as_str()) {
        interner.hits.fetch_add(1, Ordering::Relaxed);
        return canonical;
    }
    let len = s.len() as u64;
    let canonical: &'static str = Box::leak(s.into_boxed_str());
    pool.insert(canonical);
    interner.misses.fetch_add(1, Ordering::Relaxed);
    interner.saved.fetch_add(len, Ordering::Relaxed);
    canonical
}

/// Interner counters.
#[derive(Debug, Clone, Copy)]
pub struct InternerStats {
    /// Distinct strings in the pool
    pub entries: usize,
    /// Lookups that found an existing canonical copy
    pub hits: u64,
    /// Lookups that inserted a new canonical copy
    pub misses: u64,
    /// Estimated bytes saved by deduplication
    pub saved_bytes: u64,
}

impl std::fmt::Display for InternerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let total = self.hits + self.misses;
        let hit_rate = if total > 0 {
            self.hits as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        write!(
            f,
            "pool_size={}, hits={}, misses={}, hit_rate={:.1}%, potential_savings={} bytes",
            self.entries, self.hits, self.misses, hit_rate, self.saved_bytes
        )
    }
}

/// Snapshot the interner counters.
pub fn stats() -> InternerStats {
    let interner = global();
    InternerStats {
        entries: interner.pool.read().unwrap().len(),
        hits: interner.hits.load(Ordering::Relaxed),
        misses: interner.misses.load(Ordering::Relaxed),
        saved_bytes: interner.saved.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_returns_same_pointer() {
        let a = intern("Mountain View");
        let b = intern("Mountain View");
        assert!(std::ptr::eq(a, b));
        assert_eq!(a, "Mountain View");
    }

    #[test]
    fn test_intern_empty_is_free() {
        assert_eq!(intern(""), "");
        assert_eq!(intern_owned(String::new()), "");
    }

    #[test]
    fn test_preseeded_strings_hit() {
        let before = stats();
        let tag = intern("zh-CN");
        assert_eq!(tag, "zh-CN");
        let after = stats();
        assert!(after.hits > before.hits);
    }

    #[test]
    fn test_intern_owned_matches_intern() {
        let a = intern("org-string-owned-test");
        let b = intern_owned("org-string-owned-test".to_owned());
        assert!(std::ptr::eq(a, b));
    }

    #[test]
    fn test_concurrent_interning_is_consistent() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| intern("concurrent-intern-probe")))
            .collect();
        let results: Vec<&'static str> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        for w in results.windows(2) {
            assert!(std::ptr::eq(w[0], w[1]));
        }
    }
}
