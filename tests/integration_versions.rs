//! Integration tests for the version store through the facade
//!
//! Covers numbering across restores, backup-before-mutate, and listing a
//! file that no longer exists.

use std::fs;

use serde_json::json;
use versed::core::{
    facade::WriteOptions,
    store::{VersionSelector, VersionStore},
};

mod util;
use util::{backup_names, best_effort_facade, facade_for, fixture_with, path_in};

fn opts(tag: Option<&str>) -> WriteOptions
{
    WriteOptions { create_backup: true, change_tag: tag.map(str::to_string) }
}

#[test]
fn numbering_stays_monotonic_across_restores()
{
    let tmp = fixture_with("a.txt", "A");
    let f = facade_for(tmp.path());
    let path = path_in(tmp.path(), "a.txt");

    f.write(&path, &json!("B"), &opts(None))
        .unwrap(); // v1 = A
    f.write(&path, &json!("C"), &opts(None))
        .unwrap(); // v2 = B

    let restored = f
        .restore(&path, VersionSelector::Number(1))
        .unwrap(); // v3 = C
    assert_eq!(fs::read_to_string(&path).unwrap(), "A");
    assert_eq!(
        restored
            .backup_info
            .as_ref()
            .and_then(|v| v.number()),
        Some(3)
    );

    let next = f
        .write(&path, &json!("D"), &opts(None))
        .unwrap(); // v4 = A
    assert_eq!(
        next.backup_info
            .and_then(|v| v.number()),
        Some(4)
    );

    let listed = f
        .list_versions(&path)
        .unwrap();
    let labels: Vec<String> = listed
        .versions
        .iter()
        .map(|v| v.version.to_string())
        .collect();
    assert_eq!(labels, ["current", "4", "3", "2", "1"]);
    assert_eq!(listed.versions_count, 5);
}

#[test]
fn backup_holds_pre_mutation_bytes()
{
    let tmp = fixture_with("b.txt", "before\n");
    let f = facade_for(tmp.path());
    let path = path_in(tmp.path(), "b.txt");

    let out = f
        .write(&path, &json!("after\n"), &opts(Some("step one")))
        .unwrap();
    let backup = out
        .backup_info
        .expect("backup taken");
    assert_eq!(backup.change_tag.as_deref(), Some("step_one"));
    assert!(backup.checksum.is_some());
    assert_eq!(fs::read_to_string(&backup.path).unwrap(), "before\n");

    let names = backup_names(tmp.path(), "b.txt");
    assert_eq!(names.len(), 1);
    assert!(names[0].starts_with("v1_"));
    assert!(names[0].ends_with("_step_one.backup"));
}

#[test]
fn restore_round_trips_bytes()
{
    let body = "line one\r\nline two\n\ttabbed\n";
    let tmp = fixture_with("r.txt", body);
    let f = facade_for(tmp.path());
    let path = path_in(tmp.path(), "r.txt");

    f.write(&path, &json!("overwritten"), &opts(None))
        .unwrap();
    f.restore(&path, VersionSelector::Number(1))
        .unwrap();
    assert_eq!(fs::read(&path).unwrap(), body.as_bytes());
}

#[test]
fn restore_unknown_version_leaves_file_alone()
{
    let tmp = fixture_with("u.txt", "keep");
    let f = facade_for(tmp.path());
    let path = path_in(tmp.path(), "u.txt");

    let err = f
        .restore(&path, VersionSelector::Number(9))
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");
    assert_eq!(fs::read_to_string(&path).unwrap(), "keep");
    assert!(backup_names(tmp.path(), "u.txt").is_empty());
}

#[test]
fn deleted_file_can_still_be_listed_and_restored()
{
    let tmp = fixture_with("gone.txt", "original");
    let f = facade_for(tmp.path());
    let path = path_in(tmp.path(), "gone.txt");

    f.write(&path, &json!("second"), &opts(None))
        .unwrap();
    fs::remove_file(&path).unwrap();

    let listed = f
        .list_versions(&path)
        .unwrap();
    assert_eq!(listed.versions_count, 1);
    assert_eq!(listed.versions[0].version, VersionSelector::Number(1));

    let out = f
        .restore(&path, VersionSelector::Number(1))
        .unwrap();
    assert!(!out.backup_created);
    assert_eq!(fs::read_to_string(&path).unwrap(), "original");
}

#[test]
fn listing_never_creates_the_store()
{
    let tmp = fixture_with("quiet.txt", "x");
    let f = facade_for(tmp.path());
    let path = path_in(tmp.path(), "quiet.txt");

    let listed = f
        .list_versions(&path)
        .unwrap();
    assert_eq!(listed.versions_count, 1);
    assert!(
        !tmp.path()
            .join(".quiet.txt_versions")
            .exists()
    );
}

#[test]
fn write_without_backup_takes_none()
{
    let tmp = fixture_with("n.txt", "one");
    let f = facade_for(tmp.path());
    let path = path_in(tmp.path(), "n.txt");

    let out = f
        .write(&path, &json!("two"), &WriteOptions { create_backup: false, change_tag: None })
        .unwrap();
    assert!(!out.backup_created);
    assert!(backup_names(tmp.path(), "n.txt").is_empty());
}

#[test]
fn foreign_files_in_store_do_not_break_numbering()
{
    let tmp = fixture_with("f.txt", "one");
    let path = path_in(tmp.path(), "f.txt");
    let store = VersionStore::for_path(std::path::Path::new(&path)).unwrap();
    store
        .ensure()
        .unwrap();
    fs::write(store.dir().join("v7_garbage.txt"), "junk").unwrap();
    fs::write(store.dir().join("notes.md"), "junk").unwrap();

    let f = facade_for(tmp.path());
    let out = f
        .write(&path, &json!("two"), &opts(None))
        .unwrap();
    assert_eq!(
        out.backup_info
            .and_then(|v| v.number()),
        Some(8)
    );
    // Only well-formed names are listed
    let listed = f
        .list_versions(&path)
        .unwrap();
    assert_eq!(listed.versions_count, 2);
}

#[test]
fn strict_write_aborts_when_backup_fails()
{
    let tmp = fixture_with("s.txt", "kept");
    // A regular file where the version directory should go
    fs::write(tmp.path().join(".s.txt_versions"), "in the way").unwrap();
    let f = facade_for(tmp.path());
    let path = path_in(tmp.path(), "s.txt");

    let err = f
        .write(&path, &json!("lost"), &opts(None))
        .unwrap_err();
    assert_eq!(err.kind(), "storage");
    assert_eq!(fs::read_to_string(&path).unwrap(), "kept");

    let out = f.handle_json(
        &json!({ "action": "write", "file_path": path, "content": "lost" }).to_string(),
    );
    assert_eq!(out["success"], json!(false));
    assert_eq!(out["error_kind"], json!("storage"));
    assert_eq!(fs::read_to_string(&path).unwrap(), "kept");
}

#[test]
fn best_effort_write_reports_backup_failure_and_writes()
{
    let tmp = fixture_with("b.txt", "old");
    fs::write(tmp.path().join(".b.txt_versions"), "in the way").unwrap();
    let f = best_effort_facade(tmp.path());
    let path = path_in(tmp.path(), "b.txt");

    let out = f
        .write(&path, &json!("new"), &opts(Some("edit")))
        .unwrap();
    assert!(out.updated);
    assert!(!out.backup_created);
    assert!(out.backup_error.is_some());
    assert_eq!(fs::read_to_string(&path).unwrap(), "new");

    let out = f.handle_json(
        &json!({ "action": "write", "file_path": path, "content": "newer" }).to_string(),
    );
    assert_eq!(out["success"], json!(true));
    assert!(out["backup_error"].is_string());
    assert_eq!(fs::read_to_string(&path).unwrap(), "newer");
}

#[test]
fn padded_tag_keeps_its_spaces_as_underscores()
{
    let tmp = fixture_with("p.txt", "one");
    let f = facade_for(tmp.path());
    let path = path_in(tmp.path(), "p.txt");

    let out = f
        .write(&path, &json!("two"), &opts(Some(" a b ")))
        .unwrap();
    let backup = out
        .backup_info
        .expect("backup taken");
    assert_eq!(backup.change_tag.as_deref(), Some("_a_b_"));
    assert!(backup_names(tmp.path(), "p.txt")[0].ends_with("__a_b_.backup"));
}
