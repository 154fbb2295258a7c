/// Error types for the ipmerge library
use std::fmt;

/// Result type alias for merge operations
pub type Result<T> = std::result::Result<T, MergeError>;

/// Main error type for merge operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    /// Failed to open or parse a source database (missing file, bad header,
    /// missing required CSV column). Always fatal.
    ResourceOpen(String),

    /// A single prefix's record failed to decode during iteration
    Decode(String),

    /// A point lookup on an auxiliary source failed
    Lookup(String),

    /// The output trie rejected an insert
    Insert(String),

    /// Malformed prefix or address
    InvalidPrefix(String),

    /// I/O errors
    Io(String),

    /// The merge was cancelled via its cancellation token
    Cancelled,

    /// General errors
    Other(String),
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeError::ResourceOpen(msg) => write!(f, "Failed to open resource: {}", msg),
            MergeError::Decode(msg) => write!(f, "Decode error: {}", msg),
            MergeError::Lookup(msg) => write!(f, "Lookup error: {}", msg),
            MergeError::Insert(msg) => write!(f, "Insert error: {}", msg),
            MergeError::InvalidPrefix(msg) => write!(f, "Invalid prefix: {}", msg),
            MergeError::Io(msg) => write!(f, "I/O error: {}", msg),
            MergeError::Cancelled => write!(f, "Merge cancelled"),
            MergeError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for MergeError {}

impl From<std::io::Error> for MergeError {
    fn from(err: std::io::Error) -> Self {
        MergeError::Io(err.to_string())
    }
}

impl From<String> for MergeError {
    fn from(msg: String) -> Self {
        MergeError::Other(msg)
    }
}

impl From<&str> for MergeError {
    fn from(msg: &str) -> Self {
        MergeError::Other(msg.to_string())
    }
}
