//! The externally callable operations.
//!
//! Every mutation follows the same shape: normalize the path, validate,
//! compute the new bytes in memory, then (under the per-path lock) back up
//! the current file and replace it atomically. Backup failure handling
//! follows `Settings::backup_policy`.

use std::{fs, path::PathBuf};

use serde::Serialize;
use serde_json::Value;
use similar::TextDiff;
use tracing::{debug, info, instrument, warn};

use crate::{
    core::{
        apply::{ApplyIssues, ApplyReport, apply_blocks},
        blocks::{DiffBlock, parse_blocks},
        error::{EditError, StorageContext},
        search::{SearchOptions, SearchReport, search},
        sessions::SessionIndex,
        store::{Version, VersionSelector, VersionStore},
    },
    infra::{
        config::{BackupPolicy, Settings},
        io::{format_unix, human_size, mtime_secs, normalize_path, read_text, write_atomic},
        lock::with_path_lock,
        walk::StoreWalker,
    },
};

/// Message for a diff that matched nothing
pub const NO_CHANGES_WARNING: &str =
    "No changes were applied to the file. The search text might not be present.";

/// Only UTF-8 is supported
pub fn check_encoding(encoding: Option<&str>) -> Result<(), EditError> {
    match encoding.map(|e| e.trim().to_ascii_lowercase()) {
        None => Ok(()),
        Some(e) if e == "utf-8" || e == "utf8" => Ok(()),
        Some(e) => Err(EditError::Validation(format!(
            "unsupported encoding '{e}', only utf-8 is supported"
        ))),
    }
}

/// Line-ending convention of a file's text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineEnding {
    Lf,
    CrLf,
}

impl LineEnding {
    /// Blocks are matched against LF text; CRLF files are converted on the
    /// way in and back on the way out.
    fn detect(text: &str) -> Self {
        if memchr::memmem::find(text.as_bytes(), b"\r\n").is_some() {
            LineEnding::CrLf
        } else {
            LineEnding::Lf
        }
    }

    fn to_lf(self, text: &str) -> String {
        match self {
            LineEnding::Lf => text.to_string(),
            LineEnding::CrLf => text.replace("\r\n", "\n"),
        }
    }

    fn restore(self, text: &str) -> String {
        match self {
            LineEnding::Lf => text.to_string(),
            LineEnding::CrLf => text.replace('\n', "\r\n"),
        }
    }
}

/// Text to write for a content value: strings verbatim, null as empty,
/// anything else as pretty JSON.
pub fn canonical_text(content: &Value) -> Result<String, EditError> {
    match content {
        Value::String(s) => Ok(s.clone()),
        Value::Null => Ok(String::new()),
        other => serde_json::to_string_pretty(other)
            .map_err(|e| EditError::Validation(format!("Failed to convert content to string: {e}"))),
    }
}

#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub create_backup: bool,
    pub change_tag: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    pub replace_all: bool,
    pub create_backup: bool,
    pub change_tag: Option<String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct WriteOutcome {
    pub file_path: PathBuf,
    pub size: u64,
    pub size_human: String,
    pub created: bool,
    pub updated: bool,
    pub backup_created: bool,
    pub backup_info: Option<Version>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadOutcome {
    pub file_path: PathBuf,
    pub version: VersionSelector,
    pub content: String,
    pub size: u64,
    pub size_human: String,
    pub date: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionsOutcome {
    pub file_path: PathBuf,
    pub versions: Vec<Version>,
    pub versions_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreRecord {
    pub file_path: PathBuf,
    pub version: VersionSelector,
    pub size: u64,
    pub size_human: String,
    pub backup_created: bool,
    pub backup_info: Option<Version>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffOutcome {
    pub file_path: PathBuf,
    pub message: String,
    pub changes_applied: usize,
    pub diff_blocks_found: usize,
    /// False for no-ops and dry runs
    pub written: bool,
    pub dry_run: bool,
    pub size: u64,
    pub size_human: String,
    pub backup_created: bool,
    pub backup_info: Option<Version>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub details: ApplyIssues,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub file_path: PathBuf,
    pub search_text: String,
    pub total_matches: usize,
    #[serde(flatten)]
    pub report: SearchReport,
}

/// Entry point for every operation; holds the loaded settings
#[derive(Debug, Clone, Default)]
pub struct Facade {
    settings: Settings,
}

impl Facade {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Back up under the configured policy: `(backup, error_text)`
    fn backup(
        &self,
        store: &VersionStore,
        tag: Option<&str>,
    ) -> Result<(Option<Version>, Option<String>), EditError> {
        match store.create_backup(tag) {
            Ok(v) => Ok((Some(v), None)),
            Err(e) if self.settings.backup_policy == BackupPolicy::BestEffort => {
                warn!(file = %store.file().display(), error = %e, "backup failed, continuing");
                Ok((None, Some(e.to_string())))
            }
            Err(e) => Err(e),
        }
    }

    /// Create or overwrite a file, backing up the previous contents first.
    #[instrument(skip(self, content, opts), fields(create_backup = opts.create_backup))]
    pub fn write(
        &self,
        file_path: &str,
        content: &Value,
        opts: &WriteOptions,
    ) -> Result<WriteOutcome, EditError> {
        let path = normalize_path(file_path)?;
        let text = canonical_text(content)?;
        if path.is_dir() {
            return Err(EditError::Validation(format!(
                "{} is a directory",
                path.display()
            )));
        }

        let existed = path.exists();
        let store = VersionStore::for_path(&path)?;
        let backing_up = existed && opts.create_backup;

        let (backup, backup_error) =
            with_path_lock(store.dir(), self.settings.lock && backing_up, || {
                let backup = if backing_up {
                    self.backup(&store, opts.change_tag.as_deref())?
                } else {
                    (None, None)
                };
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)
                        .storage(|| format!("create parent dir {}", parent.display()))?;
                }
                write_atomic(&path, text.as_bytes())?;
                Ok(backup)
            })?;

        let size = text.len() as u64;
        info!(file = %path.display(), size, created = !existed, "wrote file");

        Ok(WriteOutcome {
            file_path: path,
            size,
            size_human: human_size(size),
            created: !existed,
            updated: existed,
            backup_created: backup.is_some(),
            backup_info: backup,
            backup_error,
        })
    }

    /// Read the live file or a stored version as UTF-8 text.
    #[instrument(skip(self))]
    pub fn read(
        &self,
        file_path: &str,
        version: VersionSelector,
    ) -> Result<ReadOutcome, EditError> {
        let path = normalize_path(file_path)?;
        let store = VersionStore::for_path(&path)?;

        let (content, size, timestamp) = match version {
            VersionSelector::Current => {
                let meta = match fs::metadata(&path) {
                    Ok(m) if m.is_file() => m,
                    Ok(_) => {
                        return Err(EditError::Validation(format!(
                            "{} is not a regular file",
                            path.display()
                        )));
                    }
                    Err(_) => {
                        return Err(EditError::NotFound(format!(
                            "File not found: {}",
                            path.display()
                        )));
                    }
                };
                (read_text(&path)?, meta.len(), mtime_secs(&meta))
            }
            VersionSelector::Number(_) => {
                let v = store.find_version(version)?;
                (read_text(&v.path)?, v.size, v.timestamp)
            }
        };

        debug!(file = %path.display(), %version, size, "read file");
        Ok(ReadOutcome {
            file_path: path,
            version,
            content,
            size,
            size_human: human_size(size),
            date: format_unix(timestamp),
        })
    }

    /// Stored versions (plus `current` when the file exists), newest first.
    /// Works for deleted files so they can still be restored.
    #[instrument(skip(self))]
    pub fn list_versions(&self, file_path: &str) -> Result<VersionsOutcome, EditError> {
        let path = normalize_path(file_path)?;
        let versions = VersionStore::for_path(&path)?.list_versions()?;
        Ok(VersionsOutcome {
            file_path: path,
            versions_count: versions.len(),
            versions,
        })
    }

    /// Replace the file with a stored version; the current state is backed
    /// up first. Restore backups are always strict.
    #[instrument(skip(self))]
    pub fn restore(
        &self,
        file_path: &str,
        version: VersionSelector,
    ) -> Result<RestoreRecord, EditError> {
        let path = normalize_path(file_path)?;
        let store = VersionStore::for_path(&path)?;
        // Fail before the lock creates anything
        store.find_version(version)?;

        let mutating = version != VersionSelector::Current;
        let outcome = with_path_lock(store.dir(), self.settings.lock && mutating, || {
            store.restore_version(version, None)
        })?;

        let size = fs::metadata(&path)
            .storage(|| format!("stat {}", path.display()))?
            .len();
        Ok(RestoreRecord {
            file_path: path,
            version: outcome.restored,
            size,
            size_human: human_size(size),
            backup_created: outcome.backup.is_some(),
            backup_info: outcome.backup,
        })
    }

    /// Run blocks against `content`; any error rejects the whole set.
    fn evaluate(
        content: &str,
        blocks: &[DiffBlock],
        replace_all: bool,
    ) -> Result<ApplyReport, EditError> {
        let report = apply_blocks(content, blocks, replace_all);
        if !report.issues.is_clean() {
            warn!(errors = ?report.issues.errors, "diff rejected");
            return Err(EditError::AmbiguousMatch {
                details: report.issues,
                diff_blocks_found: blocks.len(),
            });
        }
        Ok(report)
    }

    fn no_change_outcome(
        path: PathBuf,
        report: ApplyReport,
        blocks: usize,
        size: u64,
        dry_run: bool,
    ) -> DiffOutcome {
        DiffOutcome {
            file_path: path,
            message: "No changes were applied. The search text was not found in the file."
                .into(),
            changes_applied: 0,
            diff_blocks_found: blocks,
            written: false,
            dry_run,
            size,
            size_human: human_size(size),
            backup_created: false,
            backup_info: None,
            backup_error: None,
            warning: Some(NO_CHANGES_WARNING.into()),
            warnings: report.issues.warnings.clone(),
            details: report.issues,
            preview: None,
        }
    }

    /// Parse SEARCH/REPLACE blocks from `instruction` and apply them.
    ///
    /// The file is written only when every block applied cleanly and at
    /// least one changed something.
    #[instrument(skip(self, instruction, opts), fields(replace_all = opts.replace_all, dry_run = opts.dry_run))]
    pub fn apply_diff(
        &self,
        file_path: &str,
        instruction: &str,
        opts: &ApplyOptions,
    ) -> Result<DiffOutcome, EditError> {
        let path = normalize_path(file_path)?;
        match fs::metadata(&path) {
            Ok(m) if m.is_file() => {}
            Ok(_) => {
                return Err(EditError::Validation(format!(
                    "{} is not a regular file",
                    path.display()
                )));
            }
            Err(_) => {
                return Err(EditError::NotFound(format!(
                    "File not found: {}",
                    path.display()
                )));
            }
        }

        let raw = read_text(&path)?;
        let ending = LineEnding::detect(&raw);
        let original = ending.to_lf(&raw);
        let blocks = parse_blocks(instruction);
        if blocks.is_empty() {
            return Err(EditError::NoBlocksFound);
        }
        let report = Self::evaluate(&original, &blocks, opts.replace_all)?;

        if report.changes_made == 0 {
            info!(file = %path.display(), "diff matched nothing; file untouched");
            return Ok(Self::no_change_outcome(
                path,
                report,
                blocks.len(),
                raw.len() as u64,
                opts.dry_run,
            ));
        }

        if opts.dry_run {
            let preview = TextDiff::from_lines(&original, &report.content)
                .unified_diff()
                .context_radius(3)
                .header(&path.display().to_string(), &path.display().to_string())
                .to_string();
            let size = ending.restore(&report.content).len() as u64;
            return Ok(DiffOutcome {
                file_path: path,
                message: format!("Dry run: {} changes would be applied", report.changes_made),
                changes_applied: report.changes_made,
                diff_blocks_found: blocks.len(),
                written: false,
                dry_run: true,
                size,
                size_human: human_size(size),
                backup_created: false,
                backup_info: None,
                backup_error: None,
                warning: None,
                warnings: report.issues.warnings.clone(),
                details: report.issues,
                preview: Some(preview),
            });
        }

        let store = VersionStore::for_path(&path)?;
        let locking = self.settings.lock && opts.create_backup;
        let committed = with_path_lock(store.dir(), locking, || {
            // Someone may have written between our read and the lock
            let current_raw = read_text(&path)?;
            let (report, ending) = if current_raw == raw {
                (report, ending)
            } else {
                debug!(file = %path.display(), "file changed before lock; re-applying");
                let ending = LineEnding::detect(&current_raw);
                let again =
                    Self::evaluate(&ending.to_lf(&current_raw), &blocks, opts.replace_all)?;
                if again.changes_made == 0 {
                    return Ok(Err((again, current_raw.len() as u64)));
                }
                (again, ending)
            };

            let (backup, backup_error) = if opts.create_backup {
                self.backup(&store, opts.change_tag.as_deref())?
            } else {
                (None, None)
            };
            let bytes = ending.restore(&report.content);
            write_atomic(&path, bytes.as_bytes())?;
            Ok(Ok((report, bytes.len() as u64, backup, backup_error)))
        })?;

        let (report, size, backup, backup_error) = match committed {
            Ok(done) => done,
            Err((report, size)) => {
                return Ok(Self::no_change_outcome(
                    path,
                    report,
                    blocks.len(),
                    size,
                    false,
                ));
            }
        };

        info!(
            file = %path.display(),
            changes = report.changes_made,
            blocks = blocks.len(),
            "applied diff"
        );
        Ok(DiffOutcome {
            message: format!(
                "Successfully applied {} changes to {}",
                report.changes_made,
                path.display()
            ),
            file_path: path,
            changes_applied: report.changes_made,
            diff_blocks_found: blocks.len(),
            written: true,
            dry_run: false,
            size,
            size_human: human_size(size),
            backup_created: backup.is_some(),
            backup_info: backup,
            backup_error,
            warning: None,
            warnings: report.issues.warnings.clone(),
            details: report.issues,
            preview: None,
        })
    }

    /// Exact-then-fuzzy locate. Read-only.
    #[instrument(skip(self, text))]
    pub fn search(
        &self,
        file_path: &str,
        text: &str,
        opts: &SearchOptions,
    ) -> Result<SearchOutcome, EditError> {
        if text.is_empty() {
            return Err(EditError::Validation("search_text must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&opts.threshold) {
            return Err(EditError::Validation(format!(
                "similarity_threshold must be within 0..=1, got {}",
                opts.threshold
            )));
        }
        let path = normalize_path(file_path)?;
        if !path.is_file() {
            return Err(EditError::NotFound(format!("File not found: {}", path.display())));
        }
        let content = read_text(&path)?;
        let report = search(&content, text, opts);
        Ok(SearchOutcome {
            file_path: path,
            search_text: text.to_string(),
            total_matches: report.total(),
            report,
        })
    }

    /// Default search options from settings
    pub fn search_defaults(&self) -> SearchOptions {
        SearchOptions {
            threshold: self.settings.search.similarity_threshold,
            max_results: self.settings.search.max_results,
            context_lines: self.settings.search.context_lines,
        }
    }

    /// Session index over `root`, or the configured root
    pub fn sessions(&self, root: Option<&str>) -> Result<SessionIndex, EditError> {
        let raw = match root {
            Some(r) => r.to_string(),
            None => self.settings.root.to_string_lossy().into_owned(),
        };
        let root = normalize_path(&raw)?;
        if !root.is_dir() {
            return Err(EditError::NotFound(format!(
                "Root directory not found: {}",
                root.display()
            )));
        }
        let walker = StoreWalker::new(&self.settings.skip_dirs, &self.settings.skip_globs)?;
        Ok(SessionIndex::new(root, walker, self.settings.lock))
    }
}
