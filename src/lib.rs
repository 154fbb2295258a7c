//! ipmerge - Merged IP Geolocation Database Builder
//!
//! ipmerge fuses several heterogeneous IP-geolocation and IP-reputation
//! datasets into one MaxMind-DB-format (MMDB) binary database. The output
//! records carry geographic, political, language, ASN, and
//! proxy-classification facts for every routable IPv4 and IPv6 prefix, and
//! are consumed by any MMDB lookup library via longest-prefix-match.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use ipmerge::{Merger, SourcePaths, writer};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let paths = SourcePaths::default();
//!     paths.verify_files()?;
//!
//!     let mut merger = Merger::open(&paths)?;
//!     merger.merge()?;
//!
//!     let summary = writer::write_to_path(merger.into_tree(), "Merged-IP.mmdb".as_ref())?;
//!     println!("wrote {} bytes", summary.bytes_written);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The merge runs in two passes over a shared output trie:
//!
//! ```text
//! ┌──────────────┐   work channel    ┌──────────────┐   result channel
//! │ producer     │ ────────────────▶ │ worker pool  │ ────────────────▶ serializer
//! │ (Geo-City    │  (prefix, geo)    │ ASN/country/ │  (prefix, record)   (trie
//! │  iteration)  │                   │ CN/proxy     │                     insert)
//! └──────────────┘                   │ enrichment   │
//!                                    └──────────────┘
//! Pass 2 (sequential): DB-IP prefixes fill regions Pass 1 left uncovered.
//! ```
//!
//! Field conflicts resolve by a fixed per-field source priority; partial
//! information is preserved (a source contributing only a country code still
//! lands in the output). The serialized trie deduplicates byte-identical
//! records behind single data pointers.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
/// Error types for merge operations
pub mod error;
/// Process-wide string interner
pub mod interner;
/// Merge driver and statistics
pub mod merger;
/// Output-side MMDB implementation
pub mod mmdb;
/// The unified output record
pub mod record;
/// Source database adapters
pub mod sources;
/// Worker pool and enrichment machinery
pub mod worker;
/// Output file assembly
pub mod writer;

pub use crate::config::SourcePaths;
pub use crate::error::{MergeError, Result};
pub use crate::merger::{MergeStats, Merger};
pub use crate::mmdb::{OutputTree, RecordSize, Value};
pub use crate::record::MergedRecord;
pub use crate::worker::CancelToken;
pub use crate::writer::{write_to_path, WriteSummary};

/// Library version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
