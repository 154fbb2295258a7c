//! Output search trie.
//!
//! Builds the MMDB binary search tree for the merged database. The trie is a
//! single IPv6 tree: IPv4 prefixes are inserted at depth `96 + bits` under
//! `::/96`, and the standard alias prefixes (IPv4-mapped, 6to4, Teredo) are
//! linked to the IPv4 root when the tree is serialized.
//!
//! Leaves hold record values until serialization; the data-section encoder
//! deduplicates byte-identical records so equal payloads share one data
//! pointer.

use std::net::IpAddr;
use std::sync::OnceLock;

use ipnetwork::IpNetwork;

use super::data::{DataEncoder, Value};
use crate::error::{MergeError, Result};

/// Record size in bits for serialized tree nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSize {
    /// 24-bit records (6 bytes per node)
    Bits24,
    /// 28-bit records (7 bytes per node)
    Bits28,
    /// 32-bit records (8 bytes per node)
    Bits32,
}

impl RecordSize {
    /// Size of a node (two records) in bytes
    pub fn node_bytes(self) -> usize {
        match self {
            RecordSize::Bits24 => 6,
            RecordSize::Bits28 => 7,
            RecordSize::Bits32 => 8,
        }
    }

    /// Record size in bits
    pub fn bits(self) -> u16 {
        match self {
            RecordSize::Bits24 => 24,
            RecordSize::Bits28 => 28,
            RecordSize::Bits32 => 32,
        }
    }

    fn max_value(self) -> u32 {
        match self {
            RecordSize::Bits24 => (1 << 24) - 1,
            RecordSize::Bits28 => (1 << 28) - 1,
            RecordSize::Bits32 => u32::MAX,
        }
    }
}

/// A node in the trie (arena-allocated)
#[derive(Debug, Clone)]
struct Node {
    left: Pointer,
    right: Pointer,
}

impl Node {
    fn new_empty() -> Self {
        Self {
            left: Pointer::Empty,
            right: Pointer::Empty,
        }
    }

    fn child(&self, bit: u8) -> Pointer {
        if bit == 0 {
            self.left
        } else {
            self.right
        }
    }

    fn set_child(&mut self, bit: u8, ptr: Pointer) {
        if bit == 0 {
            self.left = ptr;
        } else {
            self.right = ptr;
        }
    }
}

/// Edge pointer: another node, a leaf record, or nothing.
///
/// `prefix_len` is the depth of the insert that produced the leaf. It lets
/// later inserts distinguish "covering data pushed down during a split" from
/// "data inserted exactly here", so more-specific prefixes always win.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pointer {
    Empty,
    Node(u32),
    Leaf { record: u32, prefix_len: u8 },
}

/// The write-side trie for the merged database.
///
/// `insert` gives last-writer-wins at equal depth with longest-prefix
/// semantics across depths; `insert_or_merge` combines the new record with
/// any existing leaf through a caller-supplied merge function.
pub struct OutputTree {
    nodes: Vec<Node>,
    records: Vec<Value>,
    record_size: RecordSize,
}

impl OutputTree {
    /// Create an empty tree with the given serialized record size
    pub fn new(record_size: RecordSize) -> Self {
        Self {
            nodes: vec![Node::new_empty()],
            records: Vec::new(),
            record_size,
        }
    }

    /// Number of allocated tree nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of record payloads held by leaves (before deduplication)
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Insert a record at `network`.
    ///
    /// A more specific prefix already present below `network` is preserved;
    /// an equal or less specific leaf on the target edge is replaced.
    /// Reserved networks are rejected.
    pub fn insert(&mut self, network: IpNetwork, value: Value) -> Result<()> {
        let (key, depth) = network_key(&network)?;
        let record = self.push_record(value);
        self.insert_leaf(key, depth, record);
        Ok(())
    }

    /// Insert a record at `network`, combining with existing data.
    ///
    /// Wherever the target region already holds a leaf, the leaf is replaced
    /// by `merge(existing, new)`; empty slots receive the new record as-is.
    pub fn insert_or_merge<F>(&mut self, network: IpNetwork, value: Value, merge: F) -> Result<()>
    where
        F: Fn(&Value, &Value) -> Value,
    {
        let (key, depth) = network_key(&network)?;

        let mut node_id = 0u32;
        for level in 0..depth {
            let bit = key_bit(key, level);
            let child = self.nodes[node_id as usize].child(bit);

            if level + 1 == depth {
                match child {
                    Pointer::Empty => {
                        let record = self.push_record(value);
                        self.nodes[node_id as usize]
                            .set_child(bit, Pointer::Leaf { record, prefix_len: depth });
                    }
                    Pointer::Leaf { record, prefix_len } => {
                        let merged = merge(&self.records[record as usize], &value);
                        let merged_id = self.push_record(merged);
                        self.nodes[node_id as usize].set_child(
                            bit,
                            Pointer::Leaf {
                                record: merged_id,
                                prefix_len: depth.max(prefix_len),
                            },
                        );
                    }
                    Pointer::Node(sub) => {
                        self.merge_subtree(sub, &value, depth, &merge);
                    }
                }
                return Ok(());
            }

            node_id = self.descend(node_id, bit, child);
        }

        Ok(())
    }

    /// Step one level down, materializing the path as needed.
    ///
    /// An empty edge allocates a fresh node. A leaf edge means a covering
    /// prefix was inserted earlier; it is split into a node whose children
    /// both carry the existing data, preserving the covering match while the
    /// caller continues toward a more specific depth.
    fn descend(&mut self, node_id: u32, bit: u8, child: Pointer) -> u32 {
        match child {
            Pointer::Node(id) => id,
            Pointer::Empty => {
                let new_id = self.allocate_node();
                self.nodes[node_id as usize].set_child(bit, Pointer::Node(new_id));
                new_id
            }
            Pointer::Leaf { record, prefix_len } => {
                let new_id = self.allocate_node();
                self.nodes[new_id as usize].left = Pointer::Leaf { record, prefix_len };
                self.nodes[new_id as usize].right = Pointer::Leaf { record, prefix_len };
                self.nodes[node_id as usize].set_child(bit, Pointer::Node(new_id));
                new_id
            }
        }
    }

    fn insert_leaf(&mut self, key: u128, depth: u8, record: u32) {
        let mut node_id = 0u32;

        for level in 0..depth {
            let bit = key_bit(key, level);
            let child = self.nodes[node_id as usize].child(bit);

            if level + 1 == depth {
                match child {
                    Pointer::Empty => {
                        self.nodes[node_id as usize]
                            .set_child(bit, Pointer::Leaf { record, prefix_len: depth });
                    }
                    Pointer::Leaf { prefix_len, .. } => {
                        if depth >= prefix_len {
                            self.nodes[node_id as usize]
                                .set_child(bit, Pointer::Leaf { record, prefix_len: depth });
                        }
                    }
                    Pointer::Node(sub) => {
                        // More specific prefixes already exist below; fill the
                        // gaps they left with this less specific record.
                        self.backfill(sub, record, depth);
                    }
                }
                return;
            }

            node_id = self.descend(node_id, bit, child);
        }
    }

    /// Fill a subtree's uncovered slots with a less specific record,
    /// replacing only leaves that stem from an even less specific insert.
    fn backfill(&mut self, node_id: u32, record: u32, prefix_len: u8) {
        for bit in 0..2u8 {
            match self.nodes[node_id as usize].child(bit) {
                Pointer::Empty => {
                    self.nodes[node_id as usize]
                        .set_child(bit, Pointer::Leaf { record, prefix_len });
                }
                Pointer::Leaf { prefix_len: existing, .. } => {
                    if prefix_len > existing {
                        self.nodes[node_id as usize]
                            .set_child(bit, Pointer::Leaf { record, prefix_len });
                    }
                }
                Pointer::Node(child_id) => {
                    self.backfill(child_id, record, prefix_len);
                }
            }
        }
    }

    /// Merge a record into every slot of a subtree: empty edges receive the
    /// new record, existing leaves become `merge(existing, new)`.
    fn merge_subtree<F>(&mut self, node_id: u32, value: &Value, prefix_len: u8, merge: &F)
    where
        F: Fn(&Value, &Value) -> Value,
    {
        for bit in 0..2u8 {
            match self.nodes[node_id as usize].child(bit) {
                Pointer::Empty => {
                    let record = self.push_record(value.clone());
                    self.nodes[node_id as usize]
                        .set_child(bit, Pointer::Leaf { record, prefix_len });
                }
                Pointer::Leaf { record, prefix_len: existing } => {
                    let merged = merge(&self.records[record as usize], value);
                    let merged_id = self.push_record(merged);
                    self.nodes[node_id as usize].set_child(
                        bit,
                        Pointer::Leaf {
                            record: merged_id,
                            prefix_len: existing.max(prefix_len),
                        },
                    );
                }
                Pointer::Node(child_id) => {
                    self.merge_subtree(child_id, value, prefix_len, merge);
                }
            }
        }
    }

    fn allocate_node(&mut self) -> u32 {
        let id = self.nodes.len() as u32;
        self.nodes.push(Node::new_empty());
        id
    }

    fn push_record(&mut self, value: Value) -> u32 {
        let id = self.records.len() as u32;
        self.records.push(value);
        id
    }

    /// Serialize the trie.
    ///
    /// Links the IPv4 alias subtrees, renumbers nodes in canonical
    /// left-first pre-order, and encodes every leaf record into the data
    /// section (deduplicated). The renumbering makes node ids and data
    /// offsets a function of tree shape and content alone, so identical
    /// inputs produce identical bytes no matter what order parallel
    /// insertion happened in. Returns `(tree_bytes, node_count,
    /// data_section)`.
    pub fn build(mut self) -> Result<(Vec<u8>, u32, Vec<u8>)> {
        self.link_ipv4_aliases();

        // Canonical ordering. Alias links make subtrees shared, so a node
        // keeps the id from its first (leftmost) visit.
        const UNSEEN: u32 = u32::MAX;
        let mut remap = vec![UNSEEN; self.nodes.len()];
        let mut order: Vec<u32> = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![0u32];
        while let Some(old_id) = stack.pop() {
            if remap[old_id as usize] != UNSEEN {
                continue;
            }
            remap[old_id as usize] = order.len() as u32;
            order.push(old_id);
            let node = &self.nodes[old_id as usize];
            for ptr in [node.right, node.left] {
                if let Pointer::Node(child) = ptr {
                    if remap[child as usize] == UNSEEN {
                        stack.push(child);
                    }
                }
            }
        }

        let node_count = order.len() as u32;

        // Encode leaf records in traversal order; identical encodings
        // collapse to one offset.
        let mut encoder = DataEncoder::new();
        let mut offsets = vec![0u32; self.records.len()];
        let mut encoded = vec![false; self.records.len()];
        for &old_id in &order {
            let node = &self.nodes[old_id as usize];
            for ptr in [node.left, node.right] {
                if let Pointer::Leaf { record, .. } = ptr {
                    let idx = record as usize;
                    if !encoded[idx] {
                        offsets[idx] = encoder.encode(&self.records[idx]);
                        encoded[idx] = true;
                    }
                }
            }
        }

        let node_size = self.record_size.node_bytes();
        let mut tree_bytes = vec![0u8; order.len() * node_size];
        let max_value = self.record_size.max_value();

        for (new_id, &old_id) in order.iter().enumerate() {
            let node = &self.nodes[old_id as usize];
            let left = pointer_value(node.left, node_count, &remap, &offsets);
            let right = pointer_value(node.right, node_count, &remap, &offsets);
            if left > max_value || right > max_value {
                return Err(MergeError::Insert(format!(
                    "record value exceeds {}-bit record size",
                    self.record_size.bits()
                )));
            }
            write_node(&mut tree_bytes, new_id, left, right, self.record_size);
        }

        Ok((tree_bytes, node_count, encoder.into_bytes()))
    }

    /// Link the standard IPv6 alias prefixes to the IPv4 root node.
    ///
    /// IPv4 data lives under `::/96`; `::ffff:0:0/96` (IPv4-mapped),
    /// `2002::/16` (6to4), and `2001::/32` (Teredo) are made to resolve into
    /// the same subtree. No-op when the tree holds no IPv4 data.
    fn link_ipv4_aliases(&mut self) {
        // Follow the zero spine to depth 96.
        let mut node_id = 0u32;
        for _ in 0..96 {
            match self.nodes[node_id as usize].left {
                Pointer::Node(id) => node_id = id,
                _ => return,
            }
        }
        let v4_root = node_id;

        // (prefix bits packed into u128 high bits, prefix length)
        let aliases: [(u128, u8); 3] = [
            (0x0000_0000_0000_0000_0000_ffff_0000_0000, 96), // ::ffff:0:0/96
            (0x2002_0000_0000_0000_0000_0000_0000_0000, 16), // 2002::/16
            (0x2001_0000_0000_0000_0000_0000_0000_0000, 32), // 2001::/32
        ];

        'alias: for (key, depth) in aliases {
            let mut node_id = 0u32;
            for level in 0..depth {
                let bit = key_bit(key, level);
                let child = self.nodes[node_id as usize].child(bit);

                if level + 1 == depth {
                    if child == Pointer::Empty {
                        self.nodes[node_id as usize].set_child(bit, Pointer::Node(v4_root));
                    }
                    continue 'alias;
                }

                match child {
                    Pointer::Node(id) => node_id = id,
                    Pointer::Empty => {
                        let new_id = self.allocate_node();
                        self.nodes[node_id as usize].set_child(bit, Pointer::Node(new_id));
                        node_id = new_id;
                    }
                    // Data already covers the alias path; leave it alone.
                    Pointer::Leaf { .. } => continue 'alias,
                }
            }
        }
    }
}

fn pointer_value(ptr: Pointer, node_count: u32, remap: &[u32], offsets: &[u32]) -> u32 {
    match ptr {
        Pointer::Empty => node_count,
        Pointer::Node(id) => remap[id as usize],
        // Readers compute data offsets as record - node_count - 16, the 16
        // being the null separator between tree and data section.
        Pointer::Leaf { record, .. } => node_count + 16 + offsets[record as usize],
    }
}

fn write_node(tree: &mut [u8], node_id: usize, left: u32, right: u32, size: RecordSize) {
    match size {
        RecordSize::Bits24 => {
            let off = node_id * 6;
            tree[off..off + 3].copy_from_slice(&left.to_be_bytes()[1..]);
            tree[off + 3..off + 6].copy_from_slice(&right.to_be_bytes()[1..]);
        }
        RecordSize::Bits28 => {
            // [left low 24][left high nibble | right high nibble][right low 24]
            let off = node_id * 7;
            tree[off..off + 3].copy_from_slice(&left.to_be_bytes()[1..]);
            tree[off + 3] = ((((left >> 24) & 0x0F) as u8) << 4) | (((right >> 24) & 0x0F) as u8);
            tree[off + 4..off + 7].copy_from_slice(&right.to_be_bytes()[1..]);
        }
        RecordSize::Bits32 => {
            let off = node_id * 8;
            tree[off..off + 4].copy_from_slice(&left.to_be_bytes());
            tree[off + 4..off + 8].copy_from_slice(&right.to_be_bytes());
        }
    }
}

/// Map a network onto the 128-bit trie keyspace.
///
/// IPv4 networks land under `::/96` with depth `96 + bits`. Reserved
/// networks are rejected here so no caller can deposit data in space the
/// output excludes.
fn network_key(network: &IpNetwork) -> Result<(u128, u8)> {
    if is_reserved(network) {
        return Err(MergeError::Insert(format!(
            "refusing to insert reserved network {}",
            network
        )));
    }

    match network {
        IpNetwork::V4(net) => {
            let key = u128::from(u32::from(net.network()));
            Ok((key, 96 + net.prefix()))
        }
        IpNetwork::V6(net) => {
            let key = u128::from(net.network());
            Ok((key, net.prefix()))
        }
    }
}

#[inline]
fn key_bit(key: u128, depth: u8) -> u8 {
    ((key >> (127 - depth)) & 1) as u8
}

fn reserved_networks() -> &'static Vec<IpNetwork> {
    static RESERVED: OnceLock<Vec<IpNetwork>> = OnceLock::new();
    RESERVED.get_or_init(|| {
        [
            "0.0.0.0/8",
            "10.0.0.0/8",
            "100.64.0.0/10",
            "127.0.0.0/8",
            "169.254.0.0/16",
            "172.16.0.0/12",
            "192.0.0.0/24",
            "192.0.2.0/24",
            "192.168.0.0/16",
            "198.18.0.0/15",
            "198.51.100.0/24",
            "203.0.113.0/24",
            "224.0.0.0/4",
            "240.0.0.0/4",
            "100::/64",
            "2001:db8::/32",
            "fc00::/7",
            "fe80::/10",
            "ff00::/8",
        ]
        .iter()
        .map(|s| s.parse().expect("static reserved network"))
        .collect()
    })
}

/// A network is reserved when it falls entirely inside a reserved block.
fn is_reserved(network: &IpNetwork) -> bool {
    let addr: IpAddr = network.ip();
    reserved_networks()
        .iter()
        .any(|r| r.contains(addr) && network.prefix() >= r.prefix())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> IpNetwork {
        s.parse().unwrap()
    }

    fn leaf_at(tree: &OutputTree, key: u128, depth: u8) -> Option<u32> {
        let mut node_id = 0u32;
        for level in 0..depth {
            let bit = key_bit(key, level);
            match tree.nodes[node_id as usize].child(bit) {
                Pointer::Node(id) => node_id = id,
                Pointer::Leaf { record, .. } => return Some(record),
                Pointer::Empty => return None,
            }
        }
        None
    }

    fn lookup_record<'a>(tree: &'a OutputTree, addr: &str) -> Option<&'a Value> {
        let ip: IpAddr = addr.parse().unwrap();
        let key = match ip {
            IpAddr::V4(v4) => u128::from(u32::from(v4)),
            IpAddr::V6(v6) => u128::from(v6),
        };
        leaf_at(tree, key, 128).map(|r| &tree.records[r as usize])
    }

    fn sample(code: &'static str) -> Value {
        Value::Map(vec![("iso_code", Value::Str(code))])
    }

    #[test]
    fn test_empty_tree_builds() {
        let tree = OutputTree::new(RecordSize::Bits28);
        let (bytes, node_count, data) = tree.build().unwrap();
        assert_eq!(node_count, 1);
        assert_eq!(bytes.len(), 7);
        assert!(data.is_empty());
    }

    #[test]
    fn test_insert_and_find_ipv4() {
        let mut tree = OutputTree::new(RecordSize::Bits28);
        tree.insert(net("8.8.8.0/24"), sample("US")).unwrap();
        assert_eq!(lookup_record(&tree, "8.8.8.8"), Some(&sample("US")));
        assert_eq!(lookup_record(&tree, "8.8.9.1"), None);
    }

    #[test]
    fn test_insert_and_find_ipv6() {
        let mut tree = OutputTree::new(RecordSize::Bits28);
        tree.insert(net("2001:4860::/32"), sample("US")).unwrap();
        assert_eq!(lookup_record(&tree, "2001:4860::8888"), Some(&sample("US")));
    }

    #[test]
    fn test_more_specific_survives_later_covering_insert() {
        let mut tree = OutputTree::new(RecordSize::Bits28);
        tree.insert(net("1.1.1.0/24"), sample("AU")).unwrap();
        tree.insert(net("1.1.0.0/16"), sample("US")).unwrap();
        assert_eq!(lookup_record(&tree, "1.1.1.1"), Some(&sample("AU")));
        assert_eq!(lookup_record(&tree, "1.1.2.1"), Some(&sample("US")));
    }

    #[test]
    fn test_covering_insert_splits_for_more_specific() {
        let mut tree = OutputTree::new(RecordSize::Bits28);
        tree.insert(net("1.1.0.0/16"), sample("US")).unwrap();
        tree.insert(net("1.1.1.0/24"), sample("AU")).unwrap();
        assert_eq!(lookup_record(&tree, "1.1.1.1"), Some(&sample("AU")));
        assert_eq!(lookup_record(&tree, "1.1.2.1"), Some(&sample("US")));
    }

    #[test]
    fn test_insert_or_merge_fills_missing_keys_only() {
        let merge = |existing: &Value, new: &Value| -> Value {
            let (Value::Map(old), Value::Map(add)) = (existing, new) else {
                return existing.clone();
            };
            let mut out = old.clone();
            for (k, v) in add {
                if !out.iter().any(|(ek, _)| ek == k) {
                    out.push((*k, v.clone()));
                }
            }
            Value::Map(out)
        };

        let mut tree = OutputTree::new(RecordSize::Bits28);
        tree.insert(
            net("5.5.5.0/24"),
            Value::Map(vec![("iso_code", Value::Str("DE"))]),
        )
        .unwrap();
        tree.insert_or_merge(
            net("5.5.5.0/24"),
            Value::Map(vec![
                ("iso_code", Value::Str("FR")),
                ("city", Value::Str("Paris")),
            ]),
            merge,
        )
        .unwrap();

        let got = lookup_record(&tree, "5.5.5.5").unwrap();
        assert_eq!(
            got,
            &Value::Map(vec![
                ("iso_code", Value::Str("DE")),
                ("city", Value::Str("Paris")),
            ])
        );
    }

    #[test]
    fn test_insert_or_merge_into_empty_space() {
        let mut tree = OutputTree::new(RecordSize::Bits28);
        tree.insert_or_merge(net("9.9.9.0/24"), sample("CH"), |e, _| e.clone())
            .unwrap();
        assert_eq!(lookup_record(&tree, "9.9.9.9"), Some(&sample("CH")));
    }

    #[test]
    fn test_insert_or_merge_covering_existing_subtree() {
        let mut tree = OutputTree::new(RecordSize::Bits28);
        tree.insert(
            net("7.7.7.0/25"),
            Value::Map(vec![("iso_code", Value::Str("SE"))]),
        )
        .unwrap();
        tree.insert_or_merge(
            net("7.7.7.0/24"),
            Value::Map(vec![("city", Value::Str("Kiruna"))]),
            |existing, new| {
                let (Value::Map(old), Value::Map(add)) = (existing, new) else {
                    return existing.clone();
                };
                let mut out = old.clone();
                for (k, v) in add {
                    if !out.iter().any(|(ek, _)| ek == k) {
                        out.push((*k, v.clone()));
                    }
                }
                Value::Map(out)
            },
        )
        .unwrap();

        // Covered leaf keeps its own fields plus the new ones
        let merged = lookup_record(&tree, "7.7.7.1").unwrap();
        assert_eq!(
            merged,
            &Value::Map(vec![
                ("iso_code", Value::Str("SE")),
                ("city", Value::Str("Kiruna")),
            ])
        );
        // Previously empty half of the /24 receives the new record alone
        let fresh = lookup_record(&tree, "7.7.7.200").unwrap();
        assert_eq!(fresh, &Value::Map(vec![("city", Value::Str("Kiruna"))]));
    }

    #[test]
    fn test_reserved_networks_rejected() {
        let mut tree = OutputTree::new(RecordSize::Bits28);
        for reserved in ["10.0.0.0/8", "192.168.1.0/24", "127.0.0.1/32", "fe80::/10"] {
            let err = tree.insert(net(reserved), sample("XX")).unwrap_err();
            assert!(matches!(err, MergeError::Insert(_)), "{}", reserved);
        }
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn test_identical_records_share_data_offset() {
        let mut tree = OutputTree::new(RecordSize::Bits28);
        tree.insert(net("8.8.8.0/24"), sample("US")).unwrap();
        tree.insert(net("8.8.4.0/24"), sample("US")).unwrap();
        let (_, _, data) = tree.build().unwrap();

        // One record map {"iso_code": "US"}: map ctrl + key + value
        let mut expected = Vec::new();
        expected.push(0xE1); // map, 1 entry
        expected.extend_from_slice(&[0x48]); // string, len 8
        expected.extend_from_slice(b"iso_code");
        expected.extend_from_slice(&[0x42, b'U', b'S']);
        assert_eq!(data, expected);
    }

    #[test]
    fn test_aliases_link_to_ipv4_root() {
        let mut tree = OutputTree::new(RecordSize::Bits28);
        tree.insert(net("8.8.8.0/24"), sample("US")).unwrap();
        tree.link_ipv4_aliases();

        // ::ffff:8.8.8.8 resolves to the same record as 8.8.8.8
        let mapped: u128 = 0x0000_0000_0000_0000_0000_ffff_0808_0808;
        let direct = leaf_at(&tree, u128::from(u32::from("8.8.8.8".parse::<std::net::Ipv4Addr>().unwrap())), 128);
        let aliased = leaf_at(&tree, mapped, 128);
        assert!(direct.is_some());
        assert_eq!(direct, aliased);
    }

    #[test]
    fn test_node_serialization_28_bit() {
        let mut tree = vec![0u8; 7];
        write_node(&mut tree, 0, 0x1000001, 0x2000002, RecordSize::Bits28);
        assert_eq!(tree, vec![0x00, 0x00, 0x01, 0x12, 0x00, 0x00, 0x02]);
    }

    #[test]
    fn test_node_serialization_24_bit() {
        let mut tree = vec![0u8; 6];
        write_node(&mut tree, 0, 1, 2, RecordSize::Bits24);
        assert_eq!(tree, vec![0x00, 0x00, 0x01, 0x00, 0x00, 0x02]);
    }
}
