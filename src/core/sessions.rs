//! Change sessions: backups that share a tag across many files.
//!
//! A session exists only as tags embedded in backup file names, so every
//! query here is a walk over the version stores under a root. Restoring a
//! session stamps the pre-restore backups with `restore_<tag>_<ts>`, which
//! makes the restore itself a session that can be undone the same way.

use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use indexmap::IndexMap;
use itertools::Itertools;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::{
    core::{
        error::{EditError, StorageContext},
        store::{BackupName, Version, VersionSelector, VersionStore, sanitize_tag},
    },
    infra::{
        io::{format_unix, human_size, unix_now},
        lock::with_path_lock,
        walk::{StoreWalker, VersionDir},
    },
};

/// One backup carrying a tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaggedBackup {
    pub original_path: PathBuf,
    pub backup_path: PathBuf,
    pub version: u64,
    pub timestamp: i64,
    pub date: String,
    pub size: u64,
    pub size_human: String,
    pub change_tag: String,
}

/// Per-tag summary for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub file_count: usize,
    /// Sorted basenames
    pub files: Vec<String>,
    /// Integer mean of member timestamps
    pub timestamp: i64,
    pub date: String,
}

/// Result of restoring one member of a session
#[derive(Debug, Clone, Serialize)]
pub struct FileRestore {
    pub success: bool,
    pub file_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_backup: Option<Version>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    pub backup_used: TaggedBackup,
}

/// Result of a bulk restore
#[derive(Debug, Clone, Serialize)]
pub struct SessionRestore {
    pub message: String,
    pub original_tag: String,
    pub restore_tag: String,
    pub file_count: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub file_results: Vec<FileRestore>,
}

impl SessionRestore {
    /// Best-effort: one restored file is enough
    pub fn succeeded(&self) -> bool {
        self.success_count > 0
    }
}

/// Read-only view over every version store under `root`
pub struct SessionIndex {
    root: PathBuf,
    walker: StoreWalker,
    lock: bool,
}

impl SessionIndex {
    pub fn new(root: PathBuf, walker: StoreWalker, lock: bool) -> Self {
        Self { root, walker, lock }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn stores(&self) -> Vec<VersionDir> {
        self.walker.version_dirs(&self.root)
    }

    /// Every tagged backup under the root whose original file still exists
    fn tagged_backups(&self) -> Result<Vec<TaggedBackup>, EditError> {
        let mut out = Vec::new();
        for store in self.stores() {
            if !store.original.exists() {
                continue;
            }
            for entry in
                fs::read_dir(&store.dir).storage(|| format!("list {}", store.dir.display()))?
            {
                let entry = entry.storage(|| format!("list {}", store.dir.display()))?;
                let name = entry.file_name();
                let Some(parsed) = name.to_str().and_then(BackupName::parse) else {
                    continue;
                };
                let Some(tag) = parsed.tag else { continue };
                let size = entry
                    .metadata()
                    .storage(|| format!("stat {}", entry.path().display()))?
                    .len();
                out.push(TaggedBackup {
                    original_path: store.original.clone(),
                    backup_path: entry.path(),
                    version: parsed.version,
                    timestamp: parsed.timestamp,
                    date: format_unix(parsed.timestamp),
                    size,
                    size_human: human_size(size),
                    change_tag: tag,
                });
            }
        }
        Ok(out)
    }

    /// Backups tagged exactly `tag` (after sanitizing), newest first
    pub fn find_by_tag(&self, tag: &str) -> Result<Vec<TaggedBackup>, EditError> {
        let wanted = sanitize_tag(tag)
            .ok_or_else(|| EditError::Validation("change_tag must not be empty".into()))?;
        let mut hits: Vec<TaggedBackup> = self
            .tagged_backups()?
            .into_iter()
            .filter(|b| b.change_tag == wanted)
            .collect();
        hits.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.version.cmp(&a.version))
                .then_with(|| a.original_path.cmp(&b.original_path))
        });
        Ok(hits)
    }

    /// Every tag seen in any store, sorted
    pub fn list_all_tags(&self) -> Result<Vec<String>, EditError> {
        let mut tags = BTreeSet::new();
        for store in self.stores() {
            for entry in
                fs::read_dir(&store.dir).storage(|| format!("list {}", store.dir.display()))?
            {
                let entry = entry.storage(|| format!("list {}", store.dir.display()))?;
                if let Some(tag) = entry
                    .file_name()
                    .to_str()
                    .and_then(BackupName::parse)
                    .and_then(|b| b.tag)
                {
                    tags.insert(tag);
                }
            }
        }
        Ok(tags.into_iter().collect())
    }

    /// Sessions keyed by tag, newest (mean timestamp) first
    pub fn list_sessions(&self) -> Result<IndexMap<String, SessionSummary>, EditError> {
        let grouped = self
            .tagged_backups()?
            .into_iter()
            .into_group_map_by(|b| b.change_tag.clone());

        let sessions = grouped
            .into_iter()
            .map(|(tag, members)| {
                let sum: i64 = members.iter().map(|m| m.timestamp).sum();
                let timestamp = sum / members.len() as i64;
                let files = members
                    .iter()
                    .filter_map(|m| m.original_path.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
                    .sorted()
                    .collect();
                (
                    tag,
                    SessionSummary {
                        file_count: members.len(),
                        files,
                        timestamp,
                        date: format_unix(timestamp),
                    },
                )
            })
            .sorted_by(|a, b| {
                b.1.timestamp
                    .cmp(&a.1.timestamp)
                    .then_with(|| a.0.cmp(&b.0))
            })
            .collect();
        Ok(sessions)
    }

    /// Restore every file of a session. One file failing does not stop the
    /// rest; `NotFound` only when the tag matches nothing.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub fn restore_session(&self, tag: &str) -> Result<SessionRestore, EditError> {
        let members = self.find_by_tag(tag)?;
        if members.is_empty() {
            return Err(EditError::NotFound(format!(
                "No files found with change tag '{tag}'"
            )));
        }

        let original_tag = sanitize_tag(tag).unwrap_or_default();
        let restore_tag = format!("restore_{original_tag}_{}", unix_now());

        let mut file_results = Vec::with_capacity(members.len());
        for member in members {
            let outcome = VersionStore::for_path(&member.original_path).and_then(|store| {
                with_path_lock(store.dir(), self.lock, || {
                    store.restore_version(
                        VersionSelector::Number(member.version),
                        Some(restore_tag.as_str()),
                    )
                })
            });

            file_results.push(match outcome {
                Ok(done) => FileRestore {
                    success: true,
                    file_path: member.original_path.clone(),
                    message: Some(format!(
                        "Restored file from backup version {}",
                        member.version
                    )),
                    new_backup: done.backup,
                    error: None,
                    error_kind: None,
                    backup_used: member,
                },
                Err(e) => {
                    warn!(
                        file = %member.original_path.display(),
                        error = %e,
                        "session member restore failed"
                    );
                    FileRestore {
                        success: false,
                        file_path: member.original_path.clone(),
                        message: None,
                        new_backup: None,
                        error: Some(e.to_string()),
                        error_kind: Some(e.kind()),
                        backup_used: member,
                    }
                }
            });
        }

        let file_count = file_results.len();
        let success_count = file_results.iter().filter(|r| r.success).count();
        info!(
            tag = %original_tag,
            restore_tag = %restore_tag,
            success_count,
            file_count,
            "session restore finished"
        );

        Ok(SessionRestore {
            message: format!(
                "Restored {success_count} out of {file_count} files from session '{original_tag}'"
            ),
            original_tag,
            restore_tag,
            file_count,
            success_count,
            failure_count: file_count - success_count,
            file_results,
        })
    }
}
