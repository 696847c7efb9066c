//! Error taxonomy for the editing engine.
//!
//! Every failure an operation can report maps to one variant here. The
//! dispatch layer turns these into `{success: false, error, error_kind, ..}`
//! records, so callers never see a raw error.

use std::io;

use serde_json::{Map, Value, json};

use crate::core::apply::ApplyIssues;

/// Typed failure for every engine operation
#[derive(Debug, thiserror::Error)]
pub enum EditError {
    /// Target path or requested version does not exist
    #[error("{0}")]
    NotFound(String),

    /// A block's search text matched more than once with `replace_all=false`
    #[error(
        "Failed to apply diff due to multiple matches found. Use replace_all=true to replace \
         all occurrences or make the search text more specific."
    )]
    AmbiguousMatch {
        details: ApplyIssues,
        diff_blocks_found: usize,
    },

    /// The instruction text held no parseable SEARCH/REPLACE block
    #[error(
        "No valid diff blocks found in the provided instruction. Expected \
         '<<<<<<< SEARCH' / '=======' / '>>>>>>> REPLACE' markers."
    )]
    NoBlocksFound,

    /// Filesystem failure during backup, read, or write
    #[error("{context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Malformed input, rejected before any side effect
    #[error("invalid input: {0}")]
    Validation(String),
}

impl EditError {
    /// Stable machine-readable kind, surfaced as `error_kind`
    pub fn kind(&self) -> &'static str {
        match self {
            EditError::NotFound(_) => "not_found",
            EditError::AmbiguousMatch { .. } => "ambiguous_match",
            EditError::NoBlocksFound => "no_blocks_found",
            EditError::Storage { .. } => "storage",
            EditError::Validation(_) => "validation",
        }
    }

    /// Structured context merged into the failure record
    pub fn context_fields(&self) -> Map<String, Value> {
        let mut out = Map::new();
        match self {
            EditError::AmbiguousMatch {
                details,
                diff_blocks_found,
            } => {
                out.insert("details".into(), json!(details));
                out.insert("diff_blocks_found".into(), json!(diff_blocks_found));
            }
            EditError::NoBlocksFound => {
                out.insert("diff_blocks_found".into(), json!(0));
            }
            _ => {}
        }
        out
    }
}

/// Process exit code for a record's `error_kind`
/// 0=success, 2=ambiguous, 3=invalid/no blocks, 4=not found, 5=storage
pub fn exit_code_for_kind(kind: Option<&str>) -> i32 {
    match kind {
        None => 0,
        Some("ambiguous_match") => 2,
        Some("validation") | Some("no_blocks_found") => 3,
        Some("not_found") => 4,
        Some(_) => 5,
    }
}

/// Attach a human context to an `io::Result`, producing `EditError::Storage`
pub trait StorageContext<T> {
    fn storage<F, S>(self, context: F) -> Result<T, EditError>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> StorageContext<T> for io::Result<T> {
    fn storage<F, S>(self, context: F) -> Result<T, EditError>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|source| EditError::Storage {
            context: context().into(),
            source,
        })
    }
}
