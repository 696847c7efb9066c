//! CLI command handlers.
//!
//! Each handler turns parsed arguments into a `ToolRequest`, dispatches it,
//! prints the record, and returns the process exit code. Listing commands
//! can render a table instead of JSON with `--human`.

use std::{
    fs,
    io::{self, Read},
    path::Path,
};

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use serde_json::{Value, json};
use tabled::{Table, Tabled};

use crate::{
    cli::{
        AppContext, ApplyDiffArgs, Commands, ReadArgs, RestoreArgs, SearchArgs, SessionsArgs,
        SessionsSubcommand, VersionsArgs, WriteArgs,
    },
    core::{
        error::exit_code_for_kind,
        facade::Facade,
        request::{
            ApplyDiffParams, PathParams, ReadParams, RestoreParams, RootParams, SearchParams,
            TagParams, ToolRequest, WriteParams, failure_record,
        },
        store::VersionSelector,
    },
};

/// Exit code for a record
pub fn exit_code(record: &Value) -> i32 {
    if record.get("success").and_then(Value::as_bool) == Some(true) {
        return 0;
    }
    match record.get("error_kind").and_then(Value::as_str) {
        Some(kind) => exit_code_for_kind(Some(kind)),
        // A bulk restore where nothing succeeded
        None => exit_code_for_kind(Some("storage")),
    }
}

fn emit(record: &Value, ctx: &AppContext) -> Result<i32> {
    let text = if ctx.compact {
        serde_json::to_string(record)
    } else {
        serde_json::to_string_pretty(record)
    }
    .context("serialize record")?;
    println!("{text}");
    Ok(exit_code(record))
}

fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .context("read stdin")?;
    Ok(buf)
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(p) => fs::read_to_string(p).with_context(|| format!("read {}", p.display())),
        None => read_stdin(),
    }
}

/// Parse a version argument, or print the validation record
fn selector(action: &str, path: &str, raw: &str, ctx: &AppContext) -> Result<Result<VersionSelector, i32>> {
    match raw.parse::<VersionSelector>() {
        Ok(v) => Ok(Ok(v)),
        Err(e) => Ok(Err(emit(&failure_record(action, Some(path), &e), ctx)?)),
    }
}

/// Dispatch one parsed command. `Init` and `Completions` are handled by the
/// caller since they need no facade.
pub fn run(command: Commands, facade: &Facade, ctx: &AppContext) -> Result<i32> {
    match command {
        Commands::Write(args) => write(args, facade, ctx),
        Commands::Read(args) => read(args, facade, ctx),
        Commands::Versions(args) => versions(args, facade, ctx),
        Commands::Restore(args) => restore(args, facade, ctx),
        Commands::ApplyDiff(args) => apply_diff(args, facade, ctx),
        Commands::Search(args) => search(args, facade, ctx),
        Commands::Sessions(args) => sessions(args, facade, ctx),
        Commands::Call => {
            let raw = read_stdin()?;
            emit(&facade.handle_json(&raw), ctx)
        }
        Commands::Init(_) | Commands::Completions(_) => {
            anyhow::bail!("init and completions do not go through the facade")
        }
    }
}

fn write(args: WriteArgs, facade: &Facade, ctx: &AppContext) -> Result<i32> {
    let raw = match args.content {
        Some(c) => c,
        None => read_input(args.content_file.as_deref())?,
    };
    let content = if args.json {
        match serde_json::from_str::<Value>(&raw) {
            Ok(v) => v,
            Err(e) => {
                let err = crate::core::error::EditError::Validation(format!(
                    "--json content does not parse: {e}"
                ));
                return emit(&failure_record("write", Some(&args.path), &err), ctx);
            }
        }
    } else {
        Value::String(raw)
    };

    let req = ToolRequest::Write(WriteParams {
        file_path: args.path,
        content,
        create_backup: !args.no_backup,
        change_tag: args.tag,
        encoding: None,
    });
    emit(&facade.dispatch(req), ctx)
}

fn read(args: ReadArgs, facade: &Facade, ctx: &AppContext) -> Result<i32> {
    let version = match selector("read", &args.path, &args.version, ctx)? {
        Ok(v) => v,
        Err(code) => return Ok(code),
    };
    let req = ToolRequest::Read(ReadParams {
        file_path: args.path,
        version: Some(version),
        encoding: None,
    });
    emit(&facade.dispatch(req), ctx)
}

fn restore(args: RestoreArgs, facade: &Facade, ctx: &AppContext) -> Result<i32> {
    let version = match selector("restore", &args.path, &args.version, ctx)? {
        Ok(v) => v,
        Err(code) => return Ok(code),
    };
    let req = ToolRequest::Restore(RestoreParams {
        file_path: args.path,
        version,
    });
    emit(&facade.dispatch(req), ctx)
}

fn apply_diff(args: ApplyDiffArgs, facade: &Facade, ctx: &AppContext) -> Result<i32> {
    let instruction = read_input(args.instruction_file.as_deref())?;
    let req = ToolRequest::ApplyDiff(ApplyDiffParams {
        file_path: args.path,
        instruction,
        replace_all: args.replace_all,
        create_backup: !args.no_backup,
        change_tag: args.tag,
        dry_run: args.dry_run,
        encoding: None,
    });
    let record = facade.dispatch(req);
    if args.dry_run
        && !ctx.quiet
        && let Some(preview) = record.get("preview").and_then(Value::as_str)
    {
        eprintln!("{preview}");
    }
    emit(&record, ctx)
}

fn search(args: SearchArgs, facade: &Facade, ctx: &AppContext) -> Result<i32> {
    let req = ToolRequest::Search(SearchParams {
        file_path: args.path,
        search_text: args.text,
        similarity_threshold: args.threshold,
        max_results: args.max_results,
        context_lines: args.context,
    });
    emit(&facade.dispatch(req), ctx)
}

#[derive(Tabled)]
struct VersionRow {
    version: String,
    date: String,
    size: String,
    tag: String,
    path: String,
}

fn versions(args: VersionsArgs, facade: &Facade, ctx: &AppContext) -> Result<i32> {
    let record = facade.dispatch(ToolRequest::ListVersions(PathParams { file_path: args.path }));
    if !args.human {
        return emit(&record, ctx);
    }
    let Some(list) = record.get("versions").and_then(Value::as_array) else {
        return human_failure(&record, ctx);
    };

    let rows: Vec<VersionRow> = list
        .iter()
        .map(|v| {
            let label = text(v, "version");
            VersionRow {
                version: if label == "current" { paint_ok(&label, ctx) } else { label },
                date: text(v, "date"),
                size: text(v, "size_human"),
                tag: text(v, "change_tag"),
                path: text(v, "path"),
            }
        })
        .collect();
    print_table(rows, "No versions found.", ctx);
    Ok(0)
}

#[derive(Tabled)]
struct SessionRow {
    tag: String,
    files: usize,
    members: String,
    date: String,
}

#[derive(Tabled)]
struct BackupRow {
    file: String,
    version: u64,
    date: String,
    size: String,
}

#[derive(Tabled)]
struct FileRestoreRow {
    status: String,
    file: String,
    detail: String,
}

fn sessions(args: SessionsArgs, facade: &Facade, ctx: &AppContext) -> Result<i32> {
    let root = args.root.clone();
    let req = match &args.command {
        SessionsSubcommand::List => ToolRequest::ListSessions(RootParams { root }),
        SessionsSubcommand::Tags => ToolRequest::ListTags(RootParams { root }),
        SessionsSubcommand::Show { tag } => ToolRequest::FindByTag(TagParams {
            change_tag: tag.clone(),
            root,
        }),
        SessionsSubcommand::Restore { tag } => ToolRequest::RestoreSession(TagParams {
            change_tag: tag.clone(),
            root,
        }),
    };
    let record = facade.dispatch(req);
    if !args.human {
        return emit(&record, ctx);
    }
    if record.get("error_kind").is_some() {
        return human_failure(&record, ctx);
    }

    match args.command {
        SessionsSubcommand::List => {
            let rows: Vec<SessionRow> = record
                .get("sessions")
                .and_then(Value::as_object)
                .map(|m| {
                    m.iter()
                        .map(|(tag, s)| SessionRow {
                            tag: tag.clone(),
                            files: s.get("file_count").and_then(Value::as_u64).unwrap_or(0)
                                as usize,
                            members: s
                                .get("files")
                                .and_then(Value::as_array)
                                .map(|a| {
                                    a.iter()
                                        .filter_map(Value::as_str)
                                        .collect::<Vec<_>>()
                                        .join(", ")
                                })
                                .unwrap_or_default(),
                            date: text(s, "date"),
                        })
                        .collect()
                })
                .unwrap_or_default();
            print_table(rows, "No change sessions found.", ctx);
        }
        SessionsSubcommand::Tags => {
            for tag in record
                .get("tags")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(Value::as_str)
            {
                println!("{tag}");
            }
        }
        SessionsSubcommand::Show { .. } => {
            let rows: Vec<BackupRow> = record
                .get("backups")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .map(|b| BackupRow {
                    file: text(b, "original_path"),
                    version: b.get("version").and_then(Value::as_u64).unwrap_or(0),
                    date: text(b, "date"),
                    size: text(b, "size_human"),
                })
                .collect();
            print_table(rows, "No backups carry that tag.", ctx);
        }
        SessionsSubcommand::Restore { .. } => {
            let rows: Vec<FileRestoreRow> = record
                .get("file_results")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .map(|r| {
                    let ok = r.get("success").and_then(Value::as_bool) == Some(true);
                    FileRestoreRow {
                        status: if ok { paint_ok("restored", ctx) } else { paint_err("failed", ctx) },
                        file: text(r, "file_path"),
                        detail: if ok { text(r, "message") } else { text(r, "error") },
                    }
                })
                .collect();
            print_table(rows, "Nothing restored.", ctx);
            if !ctx.quiet {
                println!("{}", text(&record, "message"));
            }
        }
    }
    Ok(exit_code(&record))
}

fn text(v: &Value, key: &str) -> String {
    match v.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn paint_ok(s: &str, ctx: &AppContext) -> String {
    if ctx.no_color { s.to_string() } else { s.green().to_string() }
}

fn paint_err(s: &str, ctx: &AppContext) -> String {
    if ctx.no_color { s.to_string() } else { s.red().bold().to_string() }
}

fn print_table<T: Tabled>(rows: Vec<T>, empty: &str, ctx: &AppContext) {
    if rows.is_empty() {
        if !ctx.quiet {
            println!("{empty}");
        }
        return;
    }
    println!("{}", Table::new(rows));
}

fn human_failure(record: &Value, ctx: &AppContext) -> Result<i32> {
    eprintln!("{} {}", paint_err("error:", ctx), text(record, "error"));
    if let Some(tags) = record.get("available_tags").and_then(Value::as_array)
        && !tags.is_empty()
    {
        eprintln!("available tags: {}", json!(tags));
    }
    Ok(exit_code(record))
}
