//! QQWry (Chunzhen) adapter: Chinese-localized place names for IPs in China.
//!
//! The database ships in the IPDB container format: a 4-byte big-endian
//! metadata length, a JSON metadata object, a binary search trie of
//! fixed-size nodes (two big-endian u32 records each), and a data section of
//! length-prefixed tab-separated field rows. IPv4 space sits under the
//! IPv4-mapped prefix, reached by walking 80 zero bits and 16 one bits.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;

use serde::Deserialize;

use crate::error::{MergeError, Result};

/// IPDB metadata header
#[derive(Debug, Deserialize)]
struct IpdbMeta {
    /// Bit flags: 0x01 = IPv4, 0x02 = IPv6
    ip_version: u16,
    /// Language tag to field-group offset
    languages: HashMap<String, usize>,
    node_count: u32,
    /// Size of the trie plus data section in bytes
    total_size: usize,
    /// Field names, in row order
    fields: Vec<String>,
}

const IPV4_FLAG: u16 = 0x01;
const IPV6_FLAG: u16 = 0x02;

/// A localized record from the QQWry database. All names are zh-CN script.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QqwryRecord {
    /// Country name
    pub country_name: String,
    /// Province / region name
    pub region_name: String,
    /// City name
    pub city_name: String,
    /// District name, when available
    pub district_name: String,
    /// ISP / organization name
    pub isp_domain: String,
    /// ISO 3166-1 country code
    pub country_code: String,
    /// Two-letter continent code
    pub continent_code: String,
}

impl QqwryRecord {
    /// True when the record carries any geographic name
    pub fn has_geo_data(&self) -> bool {
        !self.country_name.is_empty()
            || !self.region_name.is_empty()
            || !self.city_name.is_empty()
    }

    /// True when the record carries a city name
    pub fn has_city_data(&self) -> bool {
        !self.city_name.is_empty()
    }

    /// True when the record carries a region / province name
    pub fn has_region_data(&self) -> bool {
        !self.region_name.is_empty()
    }

    /// True when the record belongs to a Chinese IP
    pub fn is_china(&self) -> bool {
        self.country_code == "CN" || self.country_name == "中国"
    }
}

/// Index of each consumed field within a record row, relative to the
/// selected language's field group
#[derive(Debug, Clone, Copy, Default)]
struct FieldIndexes {
    country_name: Option<usize>,
    region_name: Option<usize>,
    city_name: Option<usize>,
    district_name: Option<usize>,
    isp_domain: Option<usize>,
    country_code: Option<usize>,
    continent_code: Option<usize>,
}

/// The QQWry IPDB database, fully loaded into memory.
#[derive(Debug)]
pub struct QqwrySource {
    /// Trie nodes followed by the data section
    data: Vec<u8>,
    node_count: u32,
    /// Root of the IPv4-mapped subtree
    v4_offset: u32,
    ip_version: u16,
    /// Offset of the selected language's field group within a row
    language_offset: usize,
    field_count: usize,
    indexes: FieldIndexes,
}

impl QqwrySource {
    /// Open and parse the database file. Any structural defect is fatal.
    pub fn open(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path).map_err(|e| {
            MergeError::ResourceOpen(format!("{}: {}", path.display(), e))
        })?;
        Self::from_bytes(raw)
            .map_err(|e| MergeError::ResourceOpen(format!("{}: {}", path.display(), e)))
    }

    fn from_bytes(raw: Vec<u8>) -> Result<Self> {
        if raw.len() < 4 {
            return Err(MergeError::ResourceOpen("file too short".into()));
        }
        let meta_len = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
        if raw.len() < 4 + meta_len {
            return Err(MergeError::ResourceOpen("truncated metadata".into()));
        }

        let meta: IpdbMeta = serde_json::from_slice(&raw[4..4 + meta_len])
            .map_err(|e| MergeError::ResourceOpen(format!("bad metadata: {}", e)))?;

        let data = raw[4 + meta_len..].to_vec();
        if data.len() != meta.total_size {
            return Err(MergeError::ResourceOpen(format!(
                "section size {} does not match metadata total_size {}",
                data.len(),
                meta.total_size
            )));
        }
        let node_area = meta.node_count as usize * 8;
        if data.len() < node_area {
            return Err(MergeError::ResourceOpen(
                "node area extends past end of file".into(),
            ));
        }
        if meta.fields.is_empty() {
            return Err(MergeError::ResourceOpen("no fields declared".into()));
        }

        // Records group fields per language; prefer the zh-CN ("CN") group.
        let language_offset = meta
            .languages
            .get("CN")
            .or_else(|| meta.languages.values().min())
            .copied()
            .ok_or_else(|| MergeError::ResourceOpen("no languages declared".into()))?;

        let mut indexes = FieldIndexes::default();
        for (i, name) in meta.fields.iter().enumerate() {
            match name.as_str() {
                "country_name" => indexes.country_name = Some(i),
                "region_name" => indexes.region_name = Some(i),
                "city_name" => indexes.city_name = Some(i),
                "district_name" => indexes.district_name = Some(i),
                "isp_domain" => indexes.isp_domain = Some(i),
                "country_code" => indexes.country_code = Some(i),
                "continent_code" => indexes.continent_code = Some(i),
                _ => {}
            }
        }

        let mut source = Self {
            data,
            node_count: meta.node_count,
            v4_offset: 0,
            ip_version: meta.ip_version,
            language_offset,
            field_count: meta.fields.len(),
            indexes,
        };
        source.v4_offset = source.find_v4_offset();
        Ok(source)
    }

    /// True when the database covers IPv4 space
    pub fn supports_v4(&self) -> bool {
        self.ip_version & IPV4_FLAG != 0
    }

    /// True when the database covers IPv6 space
    pub fn supports_v6(&self) -> bool {
        self.ip_version & IPV6_FLAG != 0
    }

    /// Longest-prefix-match point lookup. Unparseable rows and uncovered
    /// addresses return `None`.
    pub fn lookup(&self, addr: IpAddr) -> Option<QqwryRecord> {
        let node = match addr {
            IpAddr::V4(v4) => {
                if !self.supports_v4() {
                    return None;
                }
                self.search(&v4.octets(), 32)?
            }
            IpAddr::V6(v6) => {
                if let Some(v4) = v6.to_ipv4_mapped() {
                    if !self.supports_v4() {
                        return None;
                    }
                    self.search(&v4.octets(), 32)?
                } else {
                    if !self.supports_v6() {
                        return None;
                    }
                    self.search(&v6.octets(), 128)?
                }
            }
        };
        self.resolve(node)
    }

    /// Walk the trie to the IPv4-mapped subtree: 80 zero bits, 16 one bits.
    fn find_v4_offset(&self) -> u32 {
        let mut node = 0u32;
        for i in 0..96 {
            if node >= self.node_count {
                break;
            }
            let bit = u8::from(i >= 80);
            match self.read_node(node, bit) {
                Some(next) => node = next,
                None => break,
            }
        }
        node
    }

    fn read_node(&self, node: u32, bit: u8) -> Option<u32> {
        if node >= self.node_count {
            return None;
        }
        let off = node as usize * 8 + bit as usize * 4;
        let bytes = self.data.get(off..off + 4)?;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Descend by address bits; a value above `node_count` is a data pointer.
    fn search(&self, octets: &[u8], bit_count: usize) -> Option<u32> {
        let mut node = if bit_count == 32 { self.v4_offset } else { 0 };

        for i in 0..bit_count {
            if node > self.node_count {
                break;
            }
            let bit = (octets[i >> 3] >> (7 - (i & 7))) & 1;
            node = self.read_node(node, bit)?;
        }

        (node > self.node_count).then_some(node)
    }

    /// Decode the record row behind a data pointer.
    fn resolve(&self, node: u32) -> Option<QqwryRecord> {
        let offset = (node - self.node_count) as usize + self.node_count as usize * 8;
        let len_bytes = self.data.get(offset..offset + 2)?;
        let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
        let body = self.data.get(offset + 2..offset + 2 + len)?;
        let body = std::str::from_utf8(body).ok()?;

        let parts: Vec<&str> = body.split('\t').collect();
        if parts.len() < self.language_offset + self.field_count {
            return None;
        }
        let group = &parts[self.language_offset..self.language_offset + self.field_count];

        let pick = |idx: Option<usize>| -> String {
            idx.and_then(|i| group.get(i)).map_or_else(String::new, |s| (*s).to_owned())
        };

        Some(QqwryRecord {
            country_name: pick(self.indexes.country_name),
            region_name: pick(self.indexes.region_name),
            city_name: pick(self.indexes.city_name),
            district_name: pick(self.indexes.district_name),
            isp_domain: pick(self.indexes.isp_domain),
            country_code: pick(self.indexes.country_code),
            continent_code: pick(self.indexes.continent_code),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal IPDB trie builder for fabricating test databases.
    struct TrieBuilder {
        nodes: Vec<[u32; 2]>,
    }

    impl TrieBuilder {
        fn new() -> Self {
            Self { nodes: vec![[0, 0]] }
        }

        /// Route `bits` (MSB-first over `key`) to `target`, allocating
        /// interior nodes along the way. `target` is patched relative to the
        /// final node count when the image is assembled.
        fn add_path(&mut self, key: u128, depth: usize, data_offset: u32) {
            let mut node = 0usize;
            for level in 0..depth {
                let bit = ((key >> (127 - level)) & 1) as usize;
                if level + 1 == depth {
                    self.nodes[node][bit] = u32::MAX - data_offset;
                    return;
                }
                let next = self.nodes[node][bit];
                if next == 0 {
                    let id = self.nodes.len() as u32;
                    self.nodes.push([0, 0]);
                    self.nodes[node][bit] = id;
                    node = id as usize;
                } else {
                    node = next as usize;
                }
            }
        }

        fn assemble(self, rows: &[&str], meta_fields: &[&str]) -> Vec<u8> {
            let node_count = self.nodes.len() as u32;

            // Leading dummy row keeps every real data pointer strictly above
            // node_count, matching the found-iff-greater search condition.
            let mut data_section = vec![0u8, 0u8];
            let mut row_offsets = Vec::new();
            for row in rows {
                row_offsets.push(data_section.len() as u32);
                data_section.extend_from_slice(&(row.len() as u16).to_be_bytes());
                data_section.extend_from_slice(row.as_bytes());
            }

            let mut section = Vec::new();
            for node in &self.nodes {
                for &record in node {
                    let value = if record > u32::MAX - 1024 {
                        // Data pointer marker: resolve to node_count + offset
                        node_count + row_offsets[(u32::MAX - record) as usize]
                    } else if record == 0 {
                        node_count // no data
                    } else {
                        record
                    };
                    section.extend_from_slice(&value.to_be_bytes());
                }
            }
            section.extend_from_slice(&data_section);

            let meta = serde_json::json!({
                "build": 1_700_000_000u64,
                "ip_version": 1,
                "languages": {"CN": 0},
                "node_count": node_count,
                "total_size": section.len(),
                "fields": meta_fields,
            });
            let meta_bytes = serde_json::to_vec(&meta).unwrap();

            let mut file = Vec::new();
            file.extend_from_slice(&(meta_bytes.len() as u32).to_be_bytes());
            file.extend_from_slice(&meta_bytes);
            file.extend_from_slice(&section);
            file
        }
    }

    const FIELDS: [&str; 7] = [
        "country_name",
        "region_name",
        "city_name",
        "district_name",
        "isp_domain",
        "country_code",
        "continent_code",
    ];

    fn v4_key(addr: &str, bits: u8) -> (u128, usize) {
        let v4: std::net::Ipv4Addr = addr.parse().unwrap();
        // IPv4-mapped position: 80 zero bits, 16 one bits, then the address
        let key = 0x0000_0000_0000_0000_0000_ffff_0000_0000u128
            | u128::from(u32::from(v4));
        (key, 96 + bits as usize)
    }

    fn sample_db() -> QqwrySource {
        let mut builder = TrieBuilder::new();
        let (key, depth) = v4_key("114.114.0.0", 16);
        builder.add_path(key, depth, 0);
        let bytes = builder.assemble(
            &["中国\t江苏省\t南京市\t\t电信\tCN\tAP"],
            &FIELDS,
        );
        QqwrySource::from_bytes(bytes).unwrap()
    }

    #[test]
    fn test_lookup_hit() {
        let db = sample_db();
        assert!(db.supports_v4());

        let record = db.lookup("114.114.114.114".parse().unwrap()).unwrap();
        assert_eq!(record.country_name, "中国");
        assert_eq!(record.region_name, "江苏省");
        assert_eq!(record.city_name, "南京市");
        assert_eq!(record.country_code, "CN");
        assert!(record.is_china());
        assert!(record.has_city_data());
        assert!(record.has_region_data());
    }

    #[test]
    fn test_lookup_miss() {
        let db = sample_db();
        assert_eq!(db.lookup("8.8.8.8".parse().unwrap()), None);
    }

    #[test]
    fn test_ipv4_mapped_ipv6_query() {
        let db = sample_db();
        let record = db.lookup("::ffff:114.114.0.1".parse().unwrap()).unwrap();
        assert_eq!(record.city_name, "南京市");
    }

    #[test]
    fn test_plain_ipv6_unsupported() {
        let db = sample_db();
        assert_eq!(db.lookup("2001:db8::1".parse().unwrap()), None);
    }

    #[test]
    fn test_rejects_truncated_file() {
        let err = QqwrySource::from_bytes(vec![0, 0]).unwrap_err();
        assert!(matches!(err, MergeError::ResourceOpen(_)));
    }

    #[test]
    fn test_rejects_size_mismatch() {
        let meta = serde_json::json!({
            "ip_version": 1,
            "languages": {"CN": 0},
            "node_count": 1,
            "total_size": 999,
            "fields": ["country_name"],
        });
        let meta_bytes = serde_json::to_vec(&meta).unwrap();
        let mut file = Vec::new();
        file.extend_from_slice(&(meta_bytes.len() as u32).to_be_bytes());
        file.extend_from_slice(&meta_bytes);
        file.extend_from_slice(&[0u8; 8]);
        let err = QqwrySource::from_bytes(file).unwrap_err();
        assert!(matches!(err, MergeError::ResourceOpen(_)));
    }

    #[test]
    fn test_is_china_by_name_only() {
        let record = QqwryRecord {
            country_name: "中国".to_owned(),
            ..Default::default()
        };
        assert!(record.is_china());
    }
}
