//! Read-only locate: exact occurrences first, fuzzy candidates only when
//! nothing matches exactly.
//!
//! Fuzzy strategies, tried together and merged by score:
//! - whitespace-normalized line match (fixed score 0.95)
//! - sliding window of the search text's non-blank lines, scored by mean
//!   per-line character ratio
//! - best single line for one-line search text, under a relaxed floor
//!
//! The applier never uses these for replacement. They feed `search` results
//! and the "closest match" hint on not-found warnings.

use serde::Serialize;
use similar::TextDiff;

use crate::infra::line_index::LineIndex;

/// Score given to a whitespace-normalized hit
pub const NORMALIZED_SCORE: f64 = 0.95;

/// Lowest relaxed floor for single-line matching
pub const SINGLE_LINE_FLOOR: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOptions {
    pub threshold: f64,
    pub max_results: usize,
    pub context_lines: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            max_results: 10,
            context_lines: 2,
        }
    }
}

/// An exact occurrence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExactMatch {
    /// 1-based line of the first matched byte
    pub line: usize,
    pub end_line: usize,
    /// Byte span, end exclusive
    pub start: usize,
    pub end: usize,
    pub context: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Normalized,
    FuzzyMultiline,
    FuzzySingleLine,
}

/// A near miss
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FuzzyMatch {
    pub line: usize,
    pub end_line: usize,
    /// Rounded to 3 decimals
    pub similarity: f64,
    pub match_type: MatchType,
    /// The file text that was matched (whole lines)
    pub text: String,
    pub context: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchReport {
    pub exact: Vec<ExactMatch>,
    pub fuzzy: Vec<FuzzyMatch>,
}

impl SearchReport {
    pub fn total(&self) -> usize {
        self.exact.len() + self.fuzzy.len()
    }
}

/// Character-level similarity in `[0, 1]`; two empty strings are identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.0,
        _ => f64::from(TextDiff::from_chars(a, b).ratio()),
    }
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Trim and collapse internal whitespace runs to one space
fn normalize_ws(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Locate `needle` in `content`.
pub fn search(content: &str, needle: &str, opts: &SearchOptions) -> SearchReport {
    let idx = LineIndex::build(content);
    let mut report = SearchReport::default();
    if needle.is_empty() || opts.max_results == 0 {
        return report;
    }

    for start in memchr::memmem::find_iter(content.as_bytes(), needle.as_bytes())
        .take(opts.max_results)
    {
        let end = start + needle.len();
        let line = idx.line_of_byte(start);
        let end_line = idx.line_of_byte(end.saturating_sub(1).max(start));
        report.exact.push(ExactMatch {
            line,
            end_line,
            start,
            end,
            context: context_for(&idx, content, line, end_line, opts.context_lines),
        });
    }
    if !report.exact.is_empty() {
        return report;
    }

    let lines: Vec<&str> = (1..=idx.line_count())
        .filter_map(|n| idx.line(content, n))
        .collect();

    let mut found = normalized_matches(&lines, needle);
    found.extend(window_matches(&lines, needle, opts.threshold));
    if found.is_empty() {
        found.extend(best_line(&lines, needle, opts.threshold));
    }

    found.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then_with(|| a.0.start.cmp(&b.0.start))
    });
    found.dedup_by(|a, b| a.0 == b.0 && a.2 == b.2);
    found.truncate(opts.max_results);

    report.fuzzy = found
        .into_iter()
        .map(|(span, score, match_type)| FuzzyMatch {
            line: span.start,
            end_line: span.end,
            similarity: round3(score),
            match_type,
            text: idx.slice_lines(content, span.start, span.end),
            context: context_for(&idx, content, span.start, span.end, opts.context_lines),
        })
        .collect();
    report
}

/// Best single-line candidate for a not-found hint: (line, similarity)
pub fn closest_line(content: &str, needle: &str) -> Option<(usize, f64)> {
    let first = needle.lines().map(str::trim).find(|l| !l.is_empty())?;
    content
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, similarity(first, l.trim())))
        .filter(|(_, s)| *s >= SINGLE_LINE_FLOOR)
        .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
        .map(|(line, s)| (line, round3(s)))
}

/// Inclusive 1-based line span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
}

type Candidate = (Span, f64, MatchType);

fn context_for(idx: &LineIndex, content: &str, first: usize, last: usize, n: usize) -> String {
    idx.slice_lines(content, first.saturating_sub(n), last + n)
}

fn normalized_matches(lines: &[&str], needle: &str) -> Vec<Candidate> {
    let wanted: Vec<String> = needle
        .trim()
        .lines()
        .map(normalize_ws)
        .collect();
    if wanted.is_empty() || wanted.iter().all(String::is_empty) {
        return Vec::new();
    }
    let have: Vec<String> = lines.iter().map(|l| normalize_ws(l)).collect();

    let mut out = Vec::new();
    if wanted.len() == 1 {
        for (i, line) in have.iter().enumerate() {
            if line.contains(wanted[0].as_str()) {
                out.push((
                    Span {
                        start: i + 1,
                        end: i + 1,
                    },
                    NORMALIZED_SCORE,
                    MatchType::Normalized,
                ));
            }
        }
        return out;
    }

    for (i, window) in have.windows(wanted.len()).enumerate() {
        if window == wanted.as_slice() {
            out.push((
                Span {
                    start: i + 1,
                    end: i + wanted.len(),
                },
                NORMALIZED_SCORE,
                MatchType::Normalized,
            ));
        }
    }
    out
}

fn window_matches(lines: &[&str], needle: &str, threshold: f64) -> Vec<Candidate> {
    let wanted: Vec<&str> = needle
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if wanted.len() < 2 || lines.len() < wanted.len() {
        return Vec::new();
    }
    let trimmed: Vec<&str> = lines.iter().map(|l| l.trim()).collect();

    trimmed
        .windows(wanted.len())
        .enumerate()
        .filter_map(|(i, window)| {
            let total: f64 = wanted
                .iter()
                .zip(window)
                .map(|(w, h)| {
                    if h.is_empty() {
                        0.0
                    } else {
                        similarity(w, h)
                    }
                })
                .sum();
            let score = total / wanted.len() as f64;
            (score >= threshold).then_some((
                Span {
                    start: i + 1,
                    end: i + wanted.len(),
                },
                score,
                MatchType::FuzzyMultiline,
            ))
        })
        .collect()
}

fn best_line(lines: &[&str], needle: &str, threshold: f64) -> Option<Candidate> {
    let needle = needle.trim();
    if needle.is_empty() || needle.contains('\n') {
        return None;
    }
    let floor = SINGLE_LINE_FLOOR.max(threshold - 0.2);
    lines
        .iter()
        .enumerate()
        .map(|(i, l)| (i, similarity(needle, l.trim())))
        .filter(|(_, s)| *s >= floor)
        // First line wins ties
        .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
        .map(|(i, s)| {
            (
                Span {
                    start: i + 1,
                    end: i + 1,
                },
                s,
                MatchType::FuzzySingleLine,
            )
        })
}
