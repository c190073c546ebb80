//! Handles to stored binary payloads.

use serde::{Deserialize, Serialize};

/// Identifies one payload written by a [`crate::BinaryDataManager`].
///
/// Treat it as opaque. It is only meaningful to the manager that issued it
/// and only while that manager is open.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryContentMetaData {
    file_path: String,
    offset: u64,
    size_in_bytes: u64,
}

impl BinaryContentMetaData {
    pub fn new(file_path: impl Into<String>, offset: u64, size_in_bytes: u64) -> Self {
        Self {
            file_path: file_path.into(),
            offset,
            size_in_bytes,
        }
    }

    /// Path of the logical file holding the payload.
    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    /// Byte offset of the payload inside its logical file.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size_in_bytes(&self) -> u64 {
        self.size_in_bytes
    }
}

impl std::fmt::Display for BinaryContentMetaData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{}+{}",
            self.file_path, self.offset, self.size_in_bytes
        )
    }
}
