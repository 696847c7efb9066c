//! Version-store discovery.
//! - Finds every `.<name>_versions` directory under a root
//! - Prunes configured directory names (VCS, caches, build output) early
//! - Extra skip globs match on paths relative to the root
//! - Deterministic ordering for stable listings and tests
//!
//! Backed by ripgrep's `ignore` crate and `globset`. Gitignore rules are
//! deliberately off: version stores are usually ignored by VCS, and we
//! still need to see them.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::{DirEntry, WalkBuilder};
use tracing::debug;

use crate::core::{error::EditError, store::original_for_version_dir};

/// One discovered store: the directory and the file it versions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionDir
{
    pub dir: PathBuf,
    pub original: PathBuf,
}

/// Walker that yields version directories.
/// Skips are applied while traversing (filter_entry), so pruned trees are
/// never read.
pub struct StoreWalker
{
    /// Directory names never entered
    skip_dirs: HashSet<String>,

    /// Compiled extra skip patterns
    skip_globs: GlobSet,
}

impl StoreWalker
{
    /// Build a walker. Bad glob syntax is a validation error.
    pub fn new(
        skip_dirs: &[String],
        skip_globs: &[String],
    ) -> Result<Self, EditError>
    {
        let mut builder = GlobSetBuilder::new();

        for pattern in skip_globs
        {
            let glob = Glob::new(pattern).map_err(|e| {
                EditError::Validation(format!("bad skip glob '{pattern}': {e}"))
            })?;
            builder.add(glob);
        }

        let skip_globs = builder
            .build()
            .map_err(|e| EditError::Validation(format!("bad skip globs: {e}")))?;

        Ok(Self { skip_dirs: skip_dirs.iter().cloned().collect(), skip_globs })
    }

    fn build_walk(
        &self,
        root: &Path,
    ) -> WalkBuilder
    {
        let mut b = WalkBuilder::new(root);

        // Version dirs are dot-dirs and usually git-ignored; see everything
        b.standard_filters(false);
        b.follow_links(false);
        b.sort_by_file_name(|x, y| x.cmp(y));

        let skip_dirs = self
            .skip_dirs
            .clone();
        let skip_globs = self
            .skip_globs
            .clone();
        let root_owned = root.to_path_buf();
        b.filter_entry(move |ent: &DirEntry| {
            let is_dir = ent
                .file_type()
                .map(|ft| ft.is_dir())
                .unwrap_or(false);
            if !is_dir || ent.depth() == 0
            {
                return true;
            }

            if ent
                .file_name()
                .to_str()
                .is_some_and(|n| skip_dirs.contains(n))
            {
                return false;
            }

            let rel = ent
                .path()
                .strip_prefix(&root_owned)
                .unwrap_or(ent.path());
            !skip_globs.is_match(rel)
        });

        b
    }

    /// All version directories under `root`, sorted by path
    pub fn version_dirs<P: AsRef<Path>>(
        &self,
        root: P,
    ) -> Vec<VersionDir>
    {
        let root_path = root.as_ref();
        let mut out: Vec<VersionDir> = self
            .build_walk(root_path)
            .build()
            // Unreadable entries are skipped, not fatal
            .filter_map(|res| res.ok())
            .filter(|entry| {
                entry
                    .file_type()
                    .is_some_and(|ft| ft.is_dir())
            })
            .filter_map(|entry| {
                let dir = entry.into_path();
                original_for_version_dir(&dir).map(|original| VersionDir { dir, original })
            })
            .collect();

        out.sort_by(|a, b| a.dir.cmp(&b.dir));
        debug!(root = %root_path.display(), stores = out.len(), "walked version stores");
        out
    }
}
