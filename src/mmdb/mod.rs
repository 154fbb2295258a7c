//! Output-side MMDB implementation: wire values, data-section encoding, and
//! the write trie. Reading source databases is the `maxminddb` crate's job;
//! this module only produces the merged file.

pub mod data;
pub mod tree;

pub use data::{DataEncoder, Value};
pub use tree::{OutputTree, RecordSize};
