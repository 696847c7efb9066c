//! Integration tests for SEARCH/REPLACE application
//!
//! Drives `apply_diff` through both the facade and the JSON request layer
//! and checks the on-disk effects: ambiguity never writes, no-ops never back
//! up, and the backup policy decides what a failed backup means.

use std::fs;

use serde_json::{Value, json};
use versed::{
    Facade,
    core::facade::ApplyOptions,
    infra::config::Settings,
};

mod util;
use util::{backup_names, best_effort_facade, diff, facade_for, fixture_with, multi_diff, path_in, settings_for};

fn apply_opts(replace_all: bool) -> ApplyOptions
{
    ApplyOptions { replace_all, create_backup: true, ..Default::default() }
}

fn request(path: &str, instruction: &str, extra: Value) -> String
{
    let mut req = json!({
        "action": "apply_diff",
        "file_path": path,
        "instruction": instruction,
    });
    if let (Some(obj), Value::Object(more)) = (req.as_object_mut(), extra)
    {
        obj.extend(more);
    }
    req.to_string()
}

#[test]
fn ambiguous_match_leaves_file_byte_identical()
{
    let tmp = fixture_with("amb.txt", "foo bar foo");
    let f = facade_for(tmp.path());
    let path = path_in(tmp.path(), "amb.txt");

    let out = f.handle_json(&request(&path, &diff("foo", "baz"), json!({})));

    assert_eq!(out["success"], json!(false));
    assert_eq!(out["error_kind"], json!("ambiguous_match"));
    assert_eq!(out["diff_blocks_found"], json!(1));
    let errors = out["details"]["errors"]
        .as_array()
        .expect("errors listed");
    assert_eq!(errors.len(), 1);
    assert!(
        errors[0]
            .as_str()
            .unwrap()
            .contains("Multiple matches (2)")
    );
    assert_eq!(fs::read(&path).unwrap(), b"foo bar foo");
    assert!(backup_names(tmp.path(), "amb.txt").is_empty());
}

#[test]
fn replace_all_rewrites_every_occurrence()
{
    let tmp = fixture_with("all.txt", "foo bar foo");
    let f = facade_for(tmp.path());
    let path = path_in(tmp.path(), "all.txt");

    let out = f.handle_json(&request(&path, &diff("foo", "baz"), json!({"replace_all": true})));

    assert_eq!(out["success"], json!(true));
    assert_eq!(out["changes_applied"], json!(2));
    assert_eq!(out["backup_created"], json!(true));
    assert_eq!(fs::read_to_string(&path).unwrap(), "baz bar baz");

    let names = backup_names(tmp.path(), "all.txt");
    assert_eq!(names.len(), 1);
    let stored = tmp
        .path()
        .join(".all.txt_versions")
        .join(&names[0]);
    assert_eq!(fs::read_to_string(stored).unwrap(), "foo bar foo");
}

#[test]
fn unmatched_search_is_a_successful_no_op()
{
    let tmp = fixture_with("noop.txt", "alpha\nbeta\n");
    let f = facade_for(tmp.path());
    let path = path_in(tmp.path(), "noop.txt");

    let out = f
        .apply_diff(&path, &diff("gamma", "delta"), &apply_opts(false))
        .unwrap();

    assert_eq!(out.changes_applied, 0);
    assert!(!out.written);
    assert!(!out.backup_created);
    assert!(out.warning.is_some());
    assert_eq!(out.warnings.len(), 1);
    assert!(out.warnings[0].starts_with("Block 1: Search text not found in file"));
    assert_eq!(fs::read_to_string(&path).unwrap(), "alpha\nbeta\n");
    assert!(backup_names(tmp.path(), "noop.txt").is_empty());
}

#[test]
fn near_miss_reports_closest_line()
{
    let tmp = fixture_with("near.txt", "fn main() {\n    let total = 1;\n}\n");
    let f = facade_for(tmp.path());
    let path = path_in(tmp.path(), "near.txt");

    let out = f
        .apply_diff(&path, &diff("let totl = 1;", "let total = 2;"), &apply_opts(false))
        .unwrap();

    assert_eq!(out.changes_applied, 0);
    assert!(out.warnings[0].contains("closest match at line 2"));
}

#[test]
fn empty_search_appends()
{
    let tmp = fixture_with("app.txt", "alpha");
    let f = facade_for(tmp.path());
    let path = path_in(tmp.path(), "app.txt");

    let out = f
        .apply_diff(&path, &diff("", "omega"), &apply_opts(false))
        .unwrap();

    assert_eq!(out.changes_applied, 1);
    assert_eq!(fs::read_to_string(&path).unwrap(), "alpha\nomega");
}

#[test]
fn blocks_apply_in_order_against_one_buffer()
{
    let tmp = fixture_with("seq.txt", "one\ntwo\nthree\n");
    let f = facade_for(tmp.path());
    let path = path_in(tmp.path(), "seq.txt");

    let out = f
        .apply_diff(
            &path,
            &multi_diff(&[("one", "uno"), ("uno\ntwo", "uno\ndos")]),
            &apply_opts(false),
        )
        .unwrap();

    assert_eq!(out.diff_blocks_found, 2);
    assert_eq!(out.changes_applied, 2);
    assert_eq!(fs::read_to_string(&path).unwrap(), "uno\ndos\nthree\n");
    // One mutation, one backup
    assert_eq!(backup_names(tmp.path(), "seq.txt").len(), 1);
}

#[test]
fn one_ambiguous_block_rejects_the_whole_set()
{
    let tmp = fixture_with("mix.txt", "x y x\nunique\n");
    let f = facade_for(tmp.path());
    let path = path_in(tmp.path(), "mix.txt");

    let err = f
        .apply_diff(&path, &multi_diff(&[("unique", "changed"), ("x", "z")]), &apply_opts(false))
        .unwrap_err();

    assert_eq!(err.kind(), "ambiguous_match");
    assert_eq!(fs::read_to_string(&path).unwrap(), "x y x\nunique\n");
}

#[test]
fn no_blocks_is_reported_with_zero_count()
{
    let tmp = fixture_with("none.txt", "content");
    let f = facade_for(tmp.path());
    let path = path_in(tmp.path(), "none.txt");

    let out = f.handle_json(&request(&path, "just prose, no markers", json!({})));

    assert_eq!(out["success"], json!(false));
    assert_eq!(out["error_kind"], json!("no_blocks_found"));
    assert_eq!(out["diff_blocks_found"], json!(0));
    assert_eq!(fs::read_to_string(&path).unwrap(), "content");
}

#[test]
fn missing_file_is_not_found_and_creates_nothing()
{
    let tmp = assert_fs::TempDir::new().unwrap();
    let f = facade_for(tmp.path());
    let path = path_in(tmp.path(), "absent.txt");

    let out = f.handle_json(&request(&path, &diff("a", "b"), json!({})));

    assert_eq!(out["error_kind"], json!("not_found"));
    assert_eq!(out["file_path"], json!(path));
    assert!(
        !tmp.path()
            .join(".absent.txt_versions")
            .exists()
    );
}

#[test]
fn dry_run_changes_nothing_on_disk()
{
    let tmp = fixture_with("dry.txt", "keep me\n");
    let f = facade_for(tmp.path());
    let path = path_in(tmp.path(), "dry.txt");

    let out = f.handle_json(&request(
        &path,
        &diff("keep me", "replaced"),
        json!({"dry_run": true}),
    ));

    assert_eq!(out["success"], json!(true));
    assert_eq!(out["dry_run"], json!(true));
    assert_eq!(out["written"], json!(false));
    assert_eq!(out["changes_applied"], json!(1));
    assert!(
        out["preview"]
            .as_str()
            .unwrap()
            .contains("+replaced")
    );
    assert_eq!(fs::read_to_string(&path).unwrap(), "keep me\n");
    assert!(backup_names(tmp.path(), "dry.txt").is_empty());
}

#[test]
fn hints_surface_in_details()
{
    let tmp = fixture_with("hint.txt", "old\n");
    let f = facade_for(tmp.path());
    let path = path_in(tmp.path(), "hint.txt");
    let instruction = "```diff\nhint.txt\n<<<<<<< SEARCH\nold\n=======\nnew\n>>>>>>> REPLACE\n```\n";

    let out = f
        .apply_diff(&path, instruction, &apply_opts(false))
        .unwrap();

    assert_eq!(out.details.hints, vec!["Block 1: hint.txt"]);
    assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
}

#[test]
fn tag_is_embedded_in_backup_name()
{
    let tmp = fixture_with("tag.txt", "a\n");
    let f = facade_for(tmp.path());
    let path = path_in(tmp.path(), "tag.txt");

    let out = f
        .apply_diff(
            &path,
            &diff("a", "b"),
            &ApplyOptions { change_tag: Some("refactor1".into()), ..apply_opts(false) },
        )
        .unwrap();

    let backup = out
        .backup_info
        .expect("backup taken");
    assert_eq!(backup.change_tag.as_deref(), Some("refactor1"));
    assert!(backup_names(tmp.path(), "tag.txt")[0].ends_with("_refactor1.backup"));
}

#[test]
fn strict_policy_aborts_when_backup_fails()
{
    let tmp = fixture_with("strict.txt", "before");
    // A regular file where the version directory should go
    fs::write(tmp.path().join(".strict.txt_versions"), "in the way").unwrap();
    let f = Facade::new(Settings { lock: false, ..settings_for(tmp.path()) });
    let path = path_in(tmp.path(), "strict.txt");

    let out = f.handle_json(&request(&path, &diff("before", "after"), json!({})));

    assert_eq!(out["success"], json!(false));
    assert_eq!(out["error_kind"], json!("storage"));
    assert_eq!(fs::read_to_string(&path).unwrap(), "before");
}

#[test]
fn best_effort_policy_reports_backup_failure_and_writes()
{
    let tmp = fixture_with("loose.txt", "before");
    fs::write(tmp.path().join(".loose.txt_versions"), "in the way").unwrap();
    let f = best_effort_facade(tmp.path());
    let path = path_in(tmp.path(), "loose.txt");

    let out = f.handle_json(&request(&path, &diff("before", "after"), json!({})));

    assert_eq!(out["success"], json!(true));
    assert_eq!(out["backup_created"], json!(false));
    assert!(out["backup_error"].is_string());
    assert_eq!(fs::read_to_string(&path).unwrap(), "after");
}

#[test]
fn diff_text_alias_is_accepted()
{
    let tmp = fixture_with("alias.txt", "left\n");
    let f = facade_for(tmp.path());
    let path = path_in(tmp.path(), "alias.txt");

    let raw = json!({
        "action": "apply_diff",
        "file_path": path,
        "diff_text": diff("left", "right"),
    })
    .to_string();
    let out = f.handle_json(&raw);

    assert_eq!(out["success"], json!(true));
    assert_eq!(fs::read_to_string(&path).unwrap(), "right\n");
}

#[test]
fn unsupported_encoding_is_rejected_before_touching_disk()
{
    let tmp = fixture_with("enc.txt", "a\n");
    let f = facade_for(tmp.path());
    let path = path_in(tmp.path(), "enc.txt");

    let out = f.handle_json(&request(&path, &diff("a", "b"), json!({"encoding": "latin-1"})));

    assert_eq!(out["error_kind"], json!("validation"));
    assert_eq!(fs::read_to_string(&path).unwrap(), "a\n");
}

#[test]
fn crlf_file_is_edited_and_keeps_its_line_endings()
{
    let tmp = fixture_with("win.txt", "alpha\r\nbeta\r\ngamma\r\n");
    let f = facade_for(tmp.path());
    let path = path_in(tmp.path(), "win.txt");
    let instruction = diff("alpha\nbeta", "ALPHA\nBETA").replace('\n', "\r\n");

    let out = f
        .apply_diff(&path, &instruction, &apply_opts(false))
        .unwrap();

    assert_eq!(out.changes_applied, 1);
    assert!(out.written);
    assert_eq!(fs::read_to_string(&path).unwrap(), "ALPHA\r\nBETA\r\ngamma\r\n");
    assert_eq!(out.size, "ALPHA\r\nBETA\r\ngamma\r\n".len() as u64);
}

#[test]
fn crlf_dry_run_matches_without_writing()
{
    let tmp = fixture_with("win.txt", "one\r\ntwo\r\n");
    let f = facade_for(tmp.path());
    let path = path_in(tmp.path(), "win.txt");
    let opts = ApplyOptions { dry_run: true, ..apply_opts(false) };

    let out = f
        .apply_diff(&path, &diff("one\ntwo", "uno\ndos"), &opts)
        .unwrap();

    assert_eq!(out.changes_applied, 1);
    assert!(!out.written);
    assert_eq!(fs::read_to_string(&path).unwrap(), "one\r\ntwo\r\n");
}

#[test]
fn apply_without_backup_leaves_no_store_behind()
{
    let tmp = fixture_with("bare.txt", "before");
    let f = facade_for(tmp.path());
    let path = path_in(tmp.path(), "bare.txt");
    let opts = ApplyOptions { create_backup: false, ..apply_opts(false) };

    let out = f
        .apply_diff(&path, &diff("before", "after"), &opts)
        .unwrap();

    assert!(out.written);
    assert!(!out.backup_created);
    assert_eq!(fs::read_to_string(&path).unwrap(), "after");
    assert!(
        !tmp.path()
            .join(".bare.txt_versions")
            .exists()
    );
}
