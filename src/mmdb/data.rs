//! MMDB data-section encoding.
//!
//! Implements the subset of the MaxMind DB type system that merged records
//! and metadata actually use. Encoding follows the spec: a control byte
//! carrying type (3 bits) and size/payload (5 bits), extended types behind a
//! 0x00 marker byte.
//!
//! See: https://maxmind.github.io/MaxMind-DB/

use rustc_hash::FxHashMap;

/// A value in the output data section.
///
/// String payloads are `&'static str` on purpose: every string that reaches
/// the output has passed through the interner, and metadata strings are
/// compile-time constants. Map keys come from the same closed sets.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// UTF-8 string
    Str(&'static str),
    /// IEEE 754 double precision float
    Double(f64),
    /// Unsigned 16-bit integer
    Uint16(u16),
    /// Unsigned 32-bit integer
    Uint32(u32),
    /// Unsigned 64-bit integer
    Uint64(u64),
    /// Boolean value
    Bool(bool),
    /// Key-value map (string keys per MMDB spec)
    Map(Vec<(&'static str, Value)>),
    /// Ordered list of values
    Array(Vec<Value>),
}

/// Data section encoder.
///
/// Builds the data section by appending encoded values and tracking offsets.
/// Byte-identical encodings share one offset, so equal records end up behind
/// a single data pointer in the search tree.
pub struct DataEncoder {
    buffer: Vec<u8>,
    dedup: FxHashMap<Vec<u8>, u32>,
    scratch: Vec<u8>,
}

impl DataEncoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            dedup: FxHashMap::default(),
            scratch: Vec::new(),
        }
    }

    /// Encode a value and return its offset into the data section.
    ///
    /// A value whose encoding was seen before returns the existing offset.
    pub fn encode(&mut self, value: &Value) -> u32 {
        self.scratch.clear();
        let mut tmp = std::mem::take(&mut self.scratch);
        encode_to(value, &mut tmp);

        if let Some(&offset) = self.dedup.get(&tmp) {
            self.scratch = tmp;
            return offset;
        }

        let offset = self.buffer.len() as u32;
        self.buffer.extend_from_slice(&tmp);
        self.dedup.insert(tmp, offset);
        offset
    }

    /// Number of distinct encoded values
    pub fn distinct_values(&self) -> usize {
        self.dedup.len()
    }

    /// Current section size in bytes
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    /// Consume the encoder and return the section bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

impl Default for DataEncoder {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_to(value: &Value, buffer: &mut Vec<u8>) {
    match value {
        Value::Str(s) => encode_string(s, buffer),
        Value::Double(d) => {
            buffer.push(0x68); // type 3, size 8
            buffer.extend_from_slice(&d.to_be_bytes());
        }
        Value::Uint16(n) => {
            buffer.push(0xA2); // type 5, size 2
            buffer.extend_from_slice(&n.to_be_bytes());
        }
        Value::Uint32(n) => {
            buffer.push(0xC4); // type 6, size 4
            buffer.extend_from_slice(&n.to_be_bytes());
        }
        Value::Uint64(n) => {
            buffer.push(0x00); // extended type marker
            buffer.push(0x48); // type 9 = extended 2, size 8
            buffer.extend_from_slice(&n.to_be_bytes());
        }
        Value::Bool(b) => {
            buffer.push(0x00);
            // type 14 = extended 7; the size field carries the value
            buffer.push(if *b { 0xE1 } else { 0xE0 });
        }
        Value::Map(entries) => {
            encode_ctrl(7, entries.len(), buffer);
            // MMDB maps are unordered, but a fixed key order makes the
            // output byte-stable across runs.
            let mut sorted: Vec<&(&'static str, Value)> = entries.iter().collect();
            sorted.sort_by_key(|(k, _)| *k);
            for (key, val) in sorted {
                encode_string(key, buffer);
                encode_to(val, buffer);
            }
        }
        Value::Array(items) => {
            buffer.push(0x00);
            encode_ctrl_extended(11, items.len(), buffer);
            for item in items {
                encode_to(item, buffer);
            }
        }
    }
}

fn encode_string(s: &str, buffer: &mut Vec<u8>) {
    encode_ctrl(2, s.len(), buffer);
    buffer.extend_from_slice(s.as_bytes());
}

/// Control byte(s) for standard types
fn encode_ctrl(type_id: u8, size: usize, buffer: &mut Vec<u8>) {
    encode_type_and_size(type_id << 5, size, buffer);
}

/// Control byte(s) for extended types; caller emits the 0x00 marker
fn encode_ctrl_extended(type_id: u8, size: usize, buffer: &mut Vec<u8>) {
    encode_type_and_size((type_id - 7) << 5, size, buffer);
}

fn encode_type_and_size(type_bits: u8, size: usize, buffer: &mut Vec<u8>) {
    if size < 29 {
        buffer.push(type_bits | (size as u8));
    } else if size < 29 + 256 {
        buffer.push(type_bits | 29);
        buffer.push((size - 29) as u8);
    } else if size < 29 + 256 + 65536 {
        buffer.push(type_bits | 30);
        buffer.extend_from_slice(&((size - 29 - 256) as u16).to_be_bytes());
    } else {
        buffer.push(type_bits | 31);
        let adjusted = (size - 29 - 256 - 65536) as u32;
        buffer.extend_from_slice(&adjusted.to_be_bytes()[1..]); // 3 bytes
    }
}
