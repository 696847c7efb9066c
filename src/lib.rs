//! **versed** - Versioned file editing for tool-calling agents
//!
//! Every mutation backs the target up first into a hidden sibling store
//! (`.<name>_versions/v<N>_<ts>[_<tag>].backup`), diffs arrive as
//! SEARCH/REPLACE blocks, and backups sharing a tag form change sessions
//! that can be restored in bulk.

/// Command-line interface with clap integration
pub mod cli;

/// Shell completion generation
pub mod completion;

/// Editing engine
pub mod core {
    /// Typed failures, error kinds, exit codes
    pub mod error;
    pub use error::{EditError, StorageContext};

    /// Per-file numbered backups
    pub mod store;
    pub use store::{Version, VersionSelector, VersionStore};

    /// SEARCH/REPLACE block parser
    pub mod blocks;
    pub use blocks::{DiffBlock, parse_blocks};

    /// Exact-match block application
    pub mod apply;
    pub use apply::{ApplyIssues, ApplyReport, BlockOutcome, apply_blocks};

    /// Exact-then-fuzzy locate
    pub mod search;

    /// Tagged change sessions across many stores
    pub mod sessions;
    pub use sessions::SessionIndex;

    /// The callable operations
    pub mod facade;
    pub use facade::Facade;

    /// Typed request enum and dispatch
    pub mod request;
    pub use request::ToolRequest;

    /// CLI command handlers
    pub mod handlers;
}

/// Infrastructure - configuration, I/O, walking, locking, logging
pub mod infra {
    /// Layered configuration with TOML/YAML/JSON + env
    pub mod config;
    pub use config::{BackupPolicy, Settings, init as config_init, load_config};

    /// Path normalization, atomic writes, durable copies, checksums
    pub mod io;

    /// Line numbers and context slices
    pub mod line_index;
    pub use line_index::LineIndex;

    /// Version-store discovery
    pub mod walk;
    pub use walk::StoreWalker;

    /// Per-path advisory lock
    pub mod lock;

    /// tracing subscriber setup
    pub mod logging;
}

// Re-exports for the binary and integration tests
pub use cli::{AppContext, Cli, Commands};
pub use core::{EditError, Facade, ToolRequest};
pub use infra::{Settings, load_config};
