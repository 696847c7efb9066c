//! SEARCH/REPLACE block extraction from free-form instruction text.
//!
//! Grammar, one block:
//!
//! ```text
//! <<<<<<< SEARCH
//! text to find
//! =======
//! replacement
//! >>>>>>> REPLACE
//! ```
//!
//! Blocks may sit inside a fence opened by a line starting with
//! ```` ```diff ```` and closed by a bare ```` ``` ````; several blocks may
//! share one fence. When any fenced block exists only fenced blocks are
//! returned, otherwise bare blocks are. Parsing never fails: no blocks is
//! an empty `Vec`, and callers decide what that means.

use serde::Serialize;

const SEARCH: &str = "<<<<<<< SEARCH";
const DIVIDER: &str = "=======";
const REPLACE: &str = ">>>>>>> REPLACE";
const FENCE_OPEN: &str = "```diff";
const FENCE: &str = "```";

/// One parsed (search, replace) pair.
///
/// Both texts are trimmed. An empty `search` means "append `replace`".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffBlock {
    pub search: String,
    pub replace: String,
    /// Free text between the opening fence and the SEARCH marker, usually a
    /// file name. Informational only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Outside,
    Search,
    Replace,
}

/// Extract blocks in document order.
pub fn parse_blocks(instruction: &str) -> Vec<DiffBlock> {
    let text = instruction.replace("\r\n", "\n");
    let text = text.strip_prefix('\u{FEFF}').unwrap_or(&text);

    let mut fenced = Vec::new();
    let mut bare = Vec::new();

    let mut state = State::Outside;
    let mut in_fence = false;
    let mut block_fenced = false;
    let mut hint_lines: Vec<&str> = Vec::new();
    let mut hint: Option<String> = None;
    let mut search: Vec<&str> = Vec::new();
    let mut replace: Vec<&str> = Vec::new();

    for line in text.split('\n') {
        let t = line.trim();

        // Fences only count between blocks; inside one they are content
        if state == State::Outside {
            if t.starts_with(FENCE_OPEN) {
                in_fence = true;
                hint_lines.clear();
                continue;
            }
            if t == FENCE && in_fence {
                in_fence = false;
                hint_lines.clear();
                continue;
            }
        }

        if t == SEARCH {
            // A second SEARCH before REPLACE restarts the block
            state = State::Search;
            block_fenced = in_fence;
            hint = join_hint(&hint_lines);
            hint_lines.clear();
            search.clear();
            replace.clear();
            continue;
        }

        match state {
            State::Search if t == DIVIDER => {
                state = State::Replace;
            }
            State::Search => search.push(line),
            State::Replace if t == REPLACE => {
                let block = DiffBlock {
                    search: search.join("\n").trim().to_string(),
                    replace: replace.join("\n").trim().to_string(),
                    hint: hint.take(),
                };
                if block_fenced {
                    fenced.push(block);
                } else {
                    bare.push(block);
                }
                state = State::Outside;
            }
            State::Replace => replace.push(line),
            State::Outside => {
                if in_fence {
                    hint_lines.push(t);
                }
            }
        }
    }

    // Unterminated trailing block is dropped
    if fenced.is_empty() { bare } else { fenced }
}

fn join_hint(lines: &[&str]) -> Option<String> {
    let joined = lines
        .iter()
        .filter(|l| !l.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() { None } else { Some(joined) }
}
