//! Line index over a text buffer.
//!
//! - One memchr pass records every '\n' offset
//! - 1-based line numbers, as shown to callers
//! - Line text excludes the terminator (and a trailing '\r')
//! - Byte to line lookups by binary search
//!
//! An empty buffer has 0 lines; a buffer ending in '\n' has no phantom
//! empty last line.

#[derive(Debug, Clone)]
pub struct LineIndex
{
    /// Byte offset of every '\n'
    newlines: Vec<usize>,
    len: usize,
}

impl LineIndex
{
    pub fn build(text: &str) -> Self
    {
        let bytes = text.as_bytes();
        Self { newlines: memchr::memchr_iter(b'\n', bytes).collect(), len: bytes.len() }
    }

    pub fn line_count(&self) -> usize
    {
        if self.len == 0
        {
            return 0;
        }
        match self.newlines.last()
        {
            Some(&last) if last + 1 == self.len => self.newlines.len(),
            _ => self.newlines.len() + 1,
        }
    }

    /// 1-based line containing `byte`. A '\n' belongs to the line it ends.
    pub fn line_of_byte(
        &self,
        byte: usize,
    ) -> usize
    {
        // Newlines strictly before `byte`
        self.newlines
            .partition_point(|&nl| nl < byte)
            + 1
    }

    /// Start offset of a 1-based line
    pub fn line_start(
        &self,
        line1: usize,
    ) -> Option<usize>
    {
        if line1 == 0 || line1 > self.line_count()
        {
            return None;
        }
        if line1 == 1
        {
            return Some(0);
        }
        self.newlines
            .get(line1 - 2)
            .map(|&nl| nl + 1)
    }

    /// Text of a 1-based line without its terminator
    pub fn line<'a>(
        &self,
        text: &'a str,
        line1: usize,
    ) -> Option<&'a str>
    {
        let start = self.line_start(line1)?;
        let end = self
            .newlines
            .get(line1 - 1)
            .copied()
            .unwrap_or(self.len);
        let raw = text.get(start..end)?;
        Some(
            raw.strip_suffix('\r')
                .unwrap_or(raw),
        )
    }

    /// Lines `first..=last` (clamped), joined with '\n'
    pub fn slice_lines(
        &self,
        text: &str,
        first: usize,
        last: usize,
    ) -> String
    {
        let first = first.max(1);
        let last = last.min(self.line_count());
        (first..=last)
            .filter_map(|n| self.line(text, n))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
