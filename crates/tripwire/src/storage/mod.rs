//! Document storage capability: store bytes, get a handle back.

pub mod filesystem;

pub use filesystem::FileStorage;

use crate::error::StorageError;

/// Top-level directory a document is stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageArea {
    TrapDocuments,
    Submissions,
}

impl StorageArea {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageArea::TrapDocuments => "trap-documents",
            StorageArea::Submissions => "submissions",
        }
    }
}

/// Opaque byte store. Handles are stable strings that round-trip through
/// the database.
pub trait DocumentStorage: Send + Sync {
    fn store(
        &self,
        content: &[u8],
        area: StorageArea,
        stem: &str,
        extension: &str,
    ) -> Result<String, StorageError>;

    fn retrieve(&self, handle: &str) -> Result<Vec<u8>, StorageError>;

    fn exists(&self, handle: &str) -> Result<bool, StorageError>;
}
