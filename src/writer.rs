//! Final database assembly and output file handling.
//!
//! Lays the serialized search tree, data section, and metadata out in MMDB
//! order and writes the result through a temp file that is atomically
//! renamed into place on success.

use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config;
use crate::error::{MergeError, Result};
use crate::mmdb::{DataEncoder, OutputTree, Value};

/// Marker preceding the metadata section
const METADATA_MARKER: &[u8] = b"\xAB\xCD\xEFMaxMind.com";

/// Separator between the search tree and the data section
const DATA_SEPARATOR: [u8; 16] = [0; 16];

/// Outcome of a successful write
#[derive(Debug, Clone, Copy)]
pub struct WriteSummary {
    /// Total bytes written
    pub bytes_written: u64,
    /// Search tree node count
    pub node_count: u32,
}

/// Serialize a tree into a complete database image with the given metadata.
///
/// Exposed so tests can fabricate small source databases; production code
/// goes through [`to_bytes`] / [`write_to_path`], which apply the merged
/// database's metadata.
pub fn database_bytes(
    tree: OutputTree,
    database_type: &'static str,
    description: &'static str,
    languages: &[&'static str],
    ip_version: u16,
) -> Result<Vec<u8>> {
    assemble(tree, database_type, description, languages, ip_version).map(|(bytes, _)| bytes)
}

fn assemble(
    tree: OutputTree,
    database_type: &'static str,
    description: &'static str,
    languages: &[&'static str],
    ip_version: u16,
) -> Result<(Vec<u8>, u32)> {
    let record_size = config::RECORD_SIZE;
    let (tree_bytes, node_count, data_bytes) = tree.build()?;

    let build_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| MergeError::Other(e.to_string()))?
        .as_secs();

    let metadata = Value::Map(vec![
        ("binary_format_major_version", Value::Uint16(2)),
        ("binary_format_minor_version", Value::Uint16(0)),
        ("build_epoch", Value::Uint64(build_epoch)),
        ("database_type", Value::Str(database_type)),
        (
            "description",
            Value::Map(vec![("en", Value::Str(description))]),
        ),
        ("ip_version", Value::Uint16(ip_version)),
        (
            "languages",
            Value::Array(languages.iter().map(|l| Value::Str(l)).collect()),
        ),
        ("node_count", Value::Uint32(node_count)),
        ("record_size", Value::Uint16(record_size)),
    ]);

    let mut meta_encoder = DataEncoder::new();
    meta_encoder.encode(&metadata);
    let metadata_bytes = meta_encoder.into_bytes();

    let mut database = Vec::with_capacity(
        tree_bytes.len() + DATA_SEPARATOR.len() + data_bytes.len() + metadata_bytes.len() + 32,
    );
    database.extend_from_slice(&tree_bytes);
    database.extend_from_slice(&DATA_SEPARATOR);
    database.extend_from_slice(&data_bytes);
    database.extend_from_slice(METADATA_MARKER);
    database.extend_from_slice(&metadata_bytes);

    Ok((database, node_count))
}

/// Serialize the merged database to bytes.
pub fn to_bytes(tree: OutputTree) -> Result<Vec<u8>> {
    database_bytes(
        tree,
        config::DATABASE_TYPE,
        config::DATABASE_DESCRIPTION,
        &config::SUPPORTED_LANGUAGES,
        6,
    )
}

/// Write the merged database to `path`.
///
/// The image is written to `<path>.tmp` first and renamed into place, so a
/// failed run never leaves a truncated database behind.
pub fn write_to_path(tree: OutputTree, path: &Path) -> Result<WriteSummary> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let (bytes, node_count) = assemble(
        tree,
        config::DATABASE_TYPE,
        config::DATABASE_DESCRIPTION,
        &config::SUPPORTED_LANGUAGES,
        6,
    )?;

    let tmp_path = {
        let mut s = path.as_os_str().to_owned();
        s.push(".tmp");
        std::path::PathBuf::from(s)
    };

    if let Err(e) = fs::write(&tmp_path, &bytes) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    Ok(WriteSummary {
        bytes_written: bytes.len() as u64,
        node_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mmdb::RecordSize;

    fn sample_tree() -> OutputTree {
        let mut tree = OutputTree::new(RecordSize::Bits28);
        tree.insert(
            "8.8.8.0/24".parse().unwrap(),
            Value::Map(vec![(
                "country",
                Value::Map(vec![("iso_code", Value::Str("US"))]),
            )]),
        )
        .unwrap();
        tree
    }

    #[test]
    fn test_database_layout() {
        let bytes = to_bytes(sample_tree()).unwrap();
        // The metadata marker appears exactly once, after tree and data.
        let marker_pos = bytes
            .windows(METADATA_MARKER.len())
            .position(|w| w == METADATA_MARKER)
            .unwrap();
        assert!(marker_pos > DATA_SEPARATOR.len());
        assert_eq!(
            bytes
                .windows(METADATA_MARKER.len())
                .filter(|w| *w == METADATA_MARKER)
                .count(),
            1
        );
    }

    #[test]
    fn test_output_readable_by_external_reader() {
        let bytes = to_bytes(sample_tree()).unwrap();
        let reader = maxminddb::Reader::from_source(bytes).unwrap();
        assert_eq!(reader.metadata().database_type, config::DATABASE_TYPE);
        assert_eq!(reader.metadata().record_size, config::RECORD_SIZE);
        assert_eq!(reader.metadata().ip_version, 6);
        let languages: Vec<String> = config::SUPPORTED_LANGUAGES
            .iter()
            .map(|l| (*l).to_owned())
            .collect();
        assert_eq!(reader.metadata().languages, languages);

        let result = reader.lookup("8.8.8.8".parse().unwrap()).unwrap();
        assert!(result.has_data());
    }

    #[test]
    fn test_write_to_path_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("merged.mmdb");
        let summary = write_to_path(sample_tree(), &out).unwrap();
        assert!(out.is_file());
        assert!(!dir.path().join("merged.mmdb.tmp").exists());
        assert_eq!(
            summary.bytes_written,
            fs::metadata(&out).unwrap().len()
        );
    }
}
