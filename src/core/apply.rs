//! Exact-match application of parsed blocks to an in-memory buffer.
//!
//! Blocks run in order against one evolving buffer, so later blocks see
//! earlier replacements. Outcomes per block:
//! - whitespace-only search: append `"\n" + replace`
//! - zero occurrences: warning, buffer unchanged
//! - several occurrences without `replace_all`: error, buffer unchanged
//! - otherwise: replace (first, or all) and count
//!
//! Nothing here touches disk. The caller persists only when `errors` is
//! empty and something changed.

use memchr::memmem;
use serde::Serialize;

use crate::core::{blocks::DiffBlock, search::closest_line};

/// What happened to one block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BlockOutcome {
    Applied { count: usize },
    Appended,
    NotFound,
    Ambiguous { count: usize },
}

impl BlockOutcome {
    /// Changes this outcome contributes to `changes_made`
    pub fn changes(&self) -> usize {
        match self {
            BlockOutcome::Applied { count } => *count,
            BlockOutcome::Appended => 1,
            BlockOutcome::NotFound | BlockOutcome::Ambiguous { .. } => 0,
        }
    }
}

/// Aggregated diagnostics, surfaced as `details` in result records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyIssues {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<String>,
}

impl ApplyIssues {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ApplyReport {
    /// Buffer after every applicable block
    pub content: String,
    pub changes_made: usize,
    pub outcomes: Vec<BlockOutcome>,
    pub issues: ApplyIssues,
}

/// Non-overlapping occurrences of `needle` in `haystack`
pub fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    memmem::find_iter(haystack.as_bytes(), needle.as_bytes()).count()
}

/// Apply `blocks` to `original`.
pub fn apply_blocks(original: &str, blocks: &[DiffBlock], replace_all: bool) -> ApplyReport {
    let mut buf = original.to_string();
    let mut outcomes = Vec::with_capacity(blocks.len());
    let mut issues = ApplyIssues::default();

    for (i, block) in blocks.iter().enumerate() {
        let n = i + 1;
        if let Some(hint) = &block.hint {
            issues.hints.push(format!("Block {n}: {hint}"));
        }

        if block.search.trim().is_empty() {
            buf.push('\n');
            buf.push_str(&block.replace);
            outcomes.push(BlockOutcome::Appended);
            continue;
        }

        let count = count_occurrences(&buf, &block.search);
        let outcome = match count {
            0 => {
                let mut msg = format!("Block {n}: Search text not found in file");
                if let Some((line, score)) = closest_line(&buf, &block.search) {
                    msg.push_str(&format!(
                        " (closest match at line {line}, similarity {score:.3})"
                    ));
                }
                issues.warnings.push(msg);
                BlockOutcome::NotFound
            }
            c if c > 1 && !replace_all => {
                issues.errors.push(format!(
                    "Block {n}: Multiple matches ({c}) found for search text, but replace_all=false"
                ));
                BlockOutcome::Ambiguous { count: c }
            }
            c if replace_all => {
                buf = buf.replace(&block.search, &block.replace);
                BlockOutcome::Applied { count: c }
            }
            _ => {
                buf = buf.replacen(&block.search, &block.replace, 1);
                BlockOutcome::Applied { count: 1 }
            }
        };
        outcomes.push(outcome);
    }

    ApplyReport {
        content: buf,
        changes_made: outcomes.iter().map(BlockOutcome::changes).sum(),
        outcomes,
        issues,
    }
}
