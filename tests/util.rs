//! Shared test utilities for integration tests
//!
//! Provides fixture creation, diff builders, and a facade wired to
//! test-friendly settings.

#![allow(dead_code)]

use std::path::Path;

use assert_fs::prelude::*;
use versed::{
    Facade,
    infra::config::{BackupPolicy, Settings},
};

/// Temp dir holding one file with `body`
pub fn fixture_with(name: &str, body: &str) -> assert_fs::TempDir
{
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    tmp.child(name)
        .write_str(body)
        .expect("write fixture");
    tmp
}

/// Absolute path string for `name` inside `dir`
pub fn path_in(dir: &Path, name: &str) -> String
{
    dir.join(name)
        .to_string_lossy()
        .into_owned()
}

/// One fenced SEARCH/REPLACE block
pub fn diff(search: &str, replace: &str) -> String
{
    format!("```diff\n<<<<<<< SEARCH\n{search}\n=======\n{replace}\n>>>>>>> REPLACE\n```\n")
}

/// Several blocks inside one fence
pub fn multi_diff(pairs: &[(&str, &str)]) -> String
{
    let mut out = String::from("```diff\n");
    for (search, replace) in pairs
    {
        out.push_str(&format!(
            "<<<<<<< SEARCH\n{search}\n=======\n{replace}\n>>>>>>> REPLACE\n"
        ));
    }
    out.push_str("```\n");
    out
}

/// Settings rooted at `root`
pub fn settings_for(root: &Path) -> Settings
{
    Settings { root: root.to_path_buf(), ..Settings::default() }
}

/// Default facade rooted at `root`
pub fn facade_for(root: &Path) -> Facade
{
    Facade::new(settings_for(root))
}

/// Best-effort backups without the lock, so a blocked version dir only
/// affects the backup step
pub fn best_effort_facade(root: &Path) -> Facade
{
    Facade::new(Settings {
        backup_policy: BackupPolicy::BestEffort,
        lock: false,
        ..settings_for(root)
    })
}

/// Names of backup files in the store next to `file`, sorted
pub fn backup_names(dir: &Path, file: &str) -> Vec<String>
{
    let store = dir.join(format!(".{file}_versions"));
    let Ok(entries) = std::fs::read_dir(&store)
    else
    {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .map(|e| {
            e.file_name()
                .to_string_lossy()
                .into_owned()
        })
        .filter(|n| n.ends_with(".backup"))
        .collect();
    names.sort();
    names
}
