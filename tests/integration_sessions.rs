//! Integration tests for tagged change sessions
//!
//! Two files edited under one tag form a session; these tests find it,
//! list it, and restore it in bulk, including the partial-failure path.

use std::{fs, path::Path};

use serde_json::json;
use versed::core::{
    facade::{ApplyOptions, WriteOptions},
    request::{RootParams, TagParams, ToolRequest},
};

mod util;
use util::{diff, facade_for, path_in};

/// Write `x.txt`/`y.txt`, then edit both under `tag`
fn seed_session(root: &Path, tag: &str)
{
    let f = facade_for(root);
    let plain = WriteOptions { create_backup: true, change_tag: None };
    f.write(&path_in(root, "x.txt"), &json!("x original\n"), &plain)
        .unwrap();
    f.write(&path_in(root, "y.txt"), &json!("y original\n"), &plain)
        .unwrap();

    let tagged = ApplyOptions {
        create_backup: true,
        change_tag: Some(tag.to_string()),
        ..Default::default()
    };
    f.apply_diff(&path_in(root, "x.txt"), &diff("x original", "x edited"), &tagged)
        .unwrap();
    f.apply_diff(&path_in(root, "y.txt"), &diff("y original", "y edited"), &tagged)
        .unwrap();
}

fn root_str(root: &Path) -> Option<String>
{
    Some(
        root.to_string_lossy()
            .into_owned(),
    )
}

#[test]
fn find_by_tag_orders_newest_first()
{
    let tmp = assert_fs::TempDir::new().unwrap();
    for (name, stamp) in [("old.txt", 1000), ("new.txt", 2000)]
    {
        fs::write(tmp.path().join(name), "live").unwrap();
        let store = tmp
            .path()
            .join(format!(".{name}_versions"));
        fs::create_dir_all(&store).unwrap();
        fs::write(store.join(format!("v1_{stamp}_refactor1.backup")), "old").unwrap();
    }

    let index = facade_for(tmp.path())
        .sessions(None)
        .unwrap();
    let hits = index
        .find_by_tag("refactor1")
        .unwrap();

    assert_eq!(hits.len(), 2);
    assert!(
        hits[0]
            .original_path
            .ends_with("new.txt")
    );
    assert!(
        hits[1]
            .original_path
            .ends_with("old.txt")
    );
    assert_eq!(hits[0].timestamp, 2000);
}

#[test]
fn tag_query_is_sanitized_like_stored_tags()
{
    let tmp = assert_fs::TempDir::new().unwrap();
    let f = facade_for(tmp.path());
    let path = path_in(tmp.path(), "t.txt");
    f.write(&path, &json!("a"), &WriteOptions::default())
        .unwrap();
    f.write(&path, &json!("b"), &WriteOptions {
        create_backup: true,
        change_tag: Some("fix: bug #1".into()),
    })
    .unwrap();

    let hits = f
        .sessions(None)
        .unwrap()
        .find_by_tag("fix: bug #1")
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].change_tag, "fix__bug__1");
}

#[test]
fn restore_session_restores_every_member()
{
    let tmp = assert_fs::TempDir::new().unwrap();
    seed_session(tmp.path(), "refactor1");
    let f = facade_for(tmp.path());

    let out = f.dispatch(ToolRequest::RestoreSession(TagParams {
        change_tag: "refactor1".into(),
        root: root_str(tmp.path()),
    }));

    assert_eq!(out["success"], json!(true));
    assert_eq!(out["file_count"], json!(2));
    assert_eq!(out["success_count"], json!(2));
    assert_eq!(out["failure_count"], json!(0));
    assert_eq!(fs::read_to_string(tmp.path().join("x.txt")).unwrap(), "x original\n");
    assert_eq!(fs::read_to_string(tmp.path().join("y.txt")).unwrap(), "y original\n");

    // The pre-restore state is itself a session
    let restore_tag = out["restore_tag"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(restore_tag.starts_with("restore_refactor1_"));
    let undo = f
        .sessions(None)
        .unwrap()
        .find_by_tag(&restore_tag)
        .unwrap();
    assert_eq!(undo.len(), 2);
    for b in &undo
    {
        let saved = fs::read_to_string(&b.backup_path).unwrap();
        assert!(saved.ends_with("edited\n"));
    }
}

#[test]
fn restore_session_keeps_going_past_a_failure()
{
    let tmp = assert_fs::TempDir::new().unwrap();
    seed_session(tmp.path(), "refactor1");
    // y.txt can no longer be backed up or replaced as a file
    fs::remove_file(tmp.path().join("y.txt")).unwrap();
    fs::create_dir(tmp.path().join("y.txt")).unwrap();

    let index = facade_for(tmp.path())
        .sessions(None)
        .unwrap();
    let out = index
        .restore_session("refactor1")
        .unwrap();

    assert!(out.succeeded());
    assert_eq!(out.file_count, 2);
    assert_eq!(out.success_count, 1);
    assert_eq!(out.failure_count, 1);
    let failed = out
        .file_results
        .iter()
        .find(|r| !r.success)
        .expect("one failure");
    assert!(failed.file_path.ends_with("y.txt"));
    assert!(failed.error.is_some());
    assert_eq!(fs::read_to_string(tmp.path().join("x.txt")).unwrap(), "x original\n");
}

#[test]
fn unknown_tag_lists_available_tags()
{
    let tmp = assert_fs::TempDir::new().unwrap();
    seed_session(tmp.path(), "refactor1");
    let f = facade_for(tmp.path());

    let out = f.dispatch(ToolRequest::RestoreSession(TagParams {
        change_tag: "nope".into(),
        root: root_str(tmp.path()),
    }));

    assert_eq!(out["success"], json!(false));
    assert_eq!(out["error_kind"], json!("not_found"));
    assert_eq!(out["available_tags"], json!(["refactor1"]));
}

#[test]
fn sessions_and_tags_are_listed()
{
    let tmp = assert_fs::TempDir::new().unwrap();
    seed_session(tmp.path(), "refactor1");
    let f = facade_for(tmp.path());

    let sessions = f.dispatch(ToolRequest::ListSessions(RootParams { root: root_str(tmp.path()) }));
    assert_eq!(sessions["success"], json!(true));
    assert_eq!(sessions["session_count"], json!(1));
    assert_eq!(sessions["sessions"]["refactor1"]["file_count"], json!(2));
    assert_eq!(sessions["sessions"]["refactor1"]["files"], json!(["x.txt", "y.txt"]));

    let tags = f.dispatch(ToolRequest::ListTags(RootParams { root: root_str(tmp.path()) }));
    assert_eq!(tags["tags"], json!(["refactor1"]));
    assert_eq!(tags["count"], json!(1));
}

#[test]
fn skipped_dirs_hide_their_stores()
{
    let tmp = assert_fs::TempDir::new().unwrap();
    let hidden = tmp
        .path()
        .join("node_modules");
    fs::create_dir_all(&hidden).unwrap();
    seed_session(&hidden, "vendored");
    seed_session(tmp.path(), "mine");

    let tags = facade_for(tmp.path())
        .sessions(None)
        .unwrap()
        .list_all_tags()
        .unwrap();
    assert_eq!(tags, vec!["mine".to_string()]);
}

#[test]
fn missing_root_is_not_found()
{
    let tmp = assert_fs::TempDir::new().unwrap();
    let f = facade_for(tmp.path());

    let out = f.dispatch(ToolRequest::ListTags(RootParams {
        root: Some(path_in(tmp.path(), "no/such/dir")),
    }));
    assert_eq!(out["error_kind"], json!("not_found"));
}
