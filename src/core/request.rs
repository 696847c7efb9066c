//! Typed invocation contract.
//!
//! A request is a JSON object whose `action` selects one operation; each
//! operation has its own parameter set. Decoding rejects unknown actions and
//! missing fields before anything runs. Every response is a JSON object
//! with `success` and `action`, and `file_path` when one file is targeted.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{error, info};

use crate::core::{
    error::EditError,
    facade::{ApplyOptions, Facade, WriteOptions, check_encoding},
    search::SearchOptions,
    store::VersionSelector,
};

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WriteParams {
    pub file_path: String,
    #[serde(default)]
    pub content: Value,
    #[serde(default = "yes")]
    pub create_backup: bool,
    #[serde(default)]
    pub change_tag: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadParams {
    pub file_path: String,
    #[serde(default)]
    pub version: Option<VersionSelector>,
    #[serde(default)]
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathParams {
    pub file_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RestoreParams {
    pub file_path: String,
    pub version: VersionSelector,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplyDiffParams {
    pub file_path: String,
    /// Text holding SEARCH/REPLACE blocks
    #[serde(alias = "diff_text")]
    pub instruction: String,
    #[serde(default)]
    pub replace_all: bool,
    #[serde(default = "yes")]
    pub create_backup: bool,
    #[serde(default)]
    pub change_tag: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchParams {
    pub file_path: String,
    pub search_text: String,
    #[serde(default)]
    pub similarity_threshold: Option<f64>,
    #[serde(default)]
    pub max_results: Option<usize>,
    #[serde(default)]
    pub context_lines: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagParams {
    pub change_tag: String,
    #[serde(default)]
    pub root: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RootParams {
    #[serde(default)]
    pub root: Option<String>,
}

/// One operation with its parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ToolRequest {
    Write(WriteParams),
    Read(ReadParams),
    ListVersions(PathParams),
    Restore(RestoreParams),
    ApplyDiff(ApplyDiffParams),
    Search(SearchParams),
    FindByTag(TagParams),
    ListTags(RootParams),
    ListSessions(RootParams),
    RestoreSession(TagParams),
}

impl ToolRequest {
    /// Wire name of the action
    pub fn action(&self) -> &'static str {
        match self {
            ToolRequest::Write(_) => "write",
            ToolRequest::Read(_) => "read",
            ToolRequest::ListVersions(_) => "list_versions",
            ToolRequest::Restore(_) => "restore",
            ToolRequest::ApplyDiff(_) => "apply_diff",
            ToolRequest::Search(_) => "search",
            ToolRequest::FindByTag(_) => "find_by_tag",
            ToolRequest::ListTags(_) => "list_tags",
            ToolRequest::ListSessions(_) => "list_sessions",
            ToolRequest::RestoreSession(_) => "restore_session",
        }
    }

    /// Raw path argument, for failure records
    pub fn file_path(&self) -> Option<&str> {
        match self {
            ToolRequest::Write(p) => Some(&p.file_path),
            ToolRequest::Read(p) => Some(&p.file_path),
            ToolRequest::ListVersions(p) => Some(&p.file_path),
            ToolRequest::Restore(p) => Some(&p.file_path),
            ToolRequest::ApplyDiff(p) => Some(&p.file_path),
            ToolRequest::Search(p) => Some(&p.file_path),
            ToolRequest::FindByTag(_)
            | ToolRequest::ListTags(_)
            | ToolRequest::ListSessions(_)
            | ToolRequest::RestoreSession(_) => None,
        }
    }
}

/// `{success: true, action, ..fields}`
fn success_record<T: Serialize>(action: &str, body: &T) -> Result<Value, EditError> {
    let mut out = Map::new();
    out.insert("success".into(), Value::Bool(true));
    out.insert("action".into(), Value::String(action.into()));
    match serde_json::to_value(body) {
        Ok(Value::Object(fields)) => out.extend(fields),
        Ok(other) => {
            out.insert("result".into(), other);
        }
        Err(e) => {
            return Err(EditError::Validation(format!("unserializable result: {e}")));
        }
    }
    Ok(Value::Object(out))
}

/// `{success: false, action, file_path?, error, error_kind, ..context}`
pub fn failure_record(action: &str, file_path: Option<&str>, err: &EditError) -> Value {
    let mut out = Map::new();
    out.insert("success".into(), Value::Bool(false));
    out.insert("action".into(), Value::String(action.into()));
    if let Some(p) = file_path {
        // Report the normalized form when we can produce one
        let shown = crate::infra::io::normalize_path(p)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|_| p.to_string());
        out.insert("file_path".into(), Value::String(shown));
    }
    out.insert("error".into(), Value::String(err.to_string()));
    out.insert("error_kind".into(), Value::String(err.kind().into()));
    out.extend(err.context_fields());
    Value::Object(out)
}

impl Facade {
    /// Run one request and always produce a record.
    pub fn dispatch(&self, req: ToolRequest) -> Value {
        let action = req.action();
        info!(action, "dispatch");
        match self.run(&req) {
            Ok(v) => v,
            Err(e) => {
                error!(action, kind = e.kind(), error = %e, "operation failed");
                let mut record = failure_record(action, req.file_path(), &e);
                if let (ToolRequest::RestoreSession(p), EditError::NotFound(_)) = (&req, &e)
                    && let Ok(index) = self.sessions(p.root.as_deref())
                    && let Ok(tags) = index.list_all_tags()
                    && let Some(obj) = record.as_object_mut()
                {
                    obj.insert("available_tags".into(), json!(tags));
                }
                record
            }
        }
    }

    fn run(&self, req: &ToolRequest) -> Result<Value, EditError> {
        let action = req.action();
        match req {
            ToolRequest::Write(p) => {
                check_encoding(p.encoding.as_deref())?;
                let opts = WriteOptions {
                    create_backup: p.create_backup,
                    change_tag: p.change_tag.clone(),
                };
                success_record(action, &self.write(&p.file_path, &p.content, &opts)?)
            }
            ToolRequest::Read(p) => {
                check_encoding(p.encoding.as_deref())?;
                let version = p.version.unwrap_or(VersionSelector::Current);
                success_record(action, &self.read(&p.file_path, version)?)
            }
            ToolRequest::ListVersions(p) => {
                success_record(action, &self.list_versions(&p.file_path)?)
            }
            ToolRequest::Restore(p) => success_record(action, &self.restore(&p.file_path, p.version)?),
            ToolRequest::ApplyDiff(p) => {
                check_encoding(p.encoding.as_deref())?;
                let opts = ApplyOptions {
                    replace_all: p.replace_all,
                    create_backup: p.create_backup,
                    change_tag: p.change_tag.clone(),
                    dry_run: p.dry_run,
                };
                success_record(action, &self.apply_diff(&p.file_path, &p.instruction, &opts)?)
            }
            ToolRequest::Search(p) => {
                let defaults = self.search_defaults();
                let opts = SearchOptions {
                    threshold: p.similarity_threshold.unwrap_or(defaults.threshold),
                    max_results: p.max_results.unwrap_or(defaults.max_results),
                    context_lines: p.context_lines.unwrap_or(defaults.context_lines),
                };
                success_record(action, &self.search(&p.file_path, &p.search_text, &opts)?)
            }
            ToolRequest::FindByTag(p) => {
                let index = self.sessions(p.root.as_deref())?;
                let backups = index.find_by_tag(&p.change_tag)?;
                success_record(
                    action,
                    &json!({
                        "root": index.root(),
                        "change_tag": p.change_tag,
                        "count": backups.len(),
                        "backups": backups,
                    }),
                )
            }
            ToolRequest::ListTags(p) => {
                let index = self.sessions(p.root.as_deref())?;
                let tags = index.list_all_tags()?;
                success_record(
                    action,
                    &json!({ "root": index.root(), "count": tags.len(), "tags": tags }),
                )
            }
            ToolRequest::ListSessions(p) => {
                let index = self.sessions(p.root.as_deref())?;
                let sessions = index.list_sessions()?;
                success_record(
                    action,
                    &json!({
                        "root": index.root(),
                        "session_count": sessions.len(),
                        "sessions": sessions,
                    }),
                )
            }
            ToolRequest::RestoreSession(p) => {
                let index = self.sessions(p.root.as_deref())?;
                let outcome = index.restore_session(&p.change_tag)?;
                let mut record = success_record(action, &outcome)?;
                if let Some(obj) = record.as_object_mut() {
                    obj.insert("success".into(), Value::Bool(outcome.succeeded()));
                }
                Ok(record)
            }
        }
    }

    /// Decode a raw JSON request and dispatch it. Malformed input becomes a
    /// validation failure record.
    pub fn handle_json(&self, raw: &str) -> Value {
        match serde_json::from_str::<ToolRequest>(raw) {
            Ok(req) => self.dispatch(req),
            Err(e) => {
                let action = serde_json::from_str::<Value>(raw)
                    .ok()
                    .and_then(|v| v.get("action").and_then(Value::as_str).map(str::to_string))
                    .unwrap_or_else(|| "unknown".into());
                let err = EditError::Validation(format!("malformed request: {e}"));
                error!(action = %action, error = %err, "request rejected");
                failure_record(&action, None, &err)
            }
        }
    }
}
