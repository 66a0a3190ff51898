//! Parser policies.
//!
//! Real world calendar data is frequently malformed in a handful of
//! well known ways. Each class of deviation carries a tri-valued
//! policy deciding whether the parser errors out, repairs the data, or
//! accepts it verbatim. A process-wide default can be installed at
//! start of day; parse entry points snapshot it once and thread the
//! snapshot through, so reconfiguring concurrently with an active
//! parse never tears a single parse run.

use std::sync::RwLock;

/// What the parser does when it encounters a known class of bad data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserPolicy {
    /// Fail the parse with an error.
    Raise,
    /// Repair the data to its most likely intended form.
    Fix,
    /// Accept the data as-is.
    Allow,
    /// Silently drop the offending piece.
    Ignore,
}

/// Snapshot of the per-category parser policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserContext {
    /// Blank lines between properties or components.
    pub blank_lines_in_data: ParserPolicy,
    /// Trailing data after a valid duration (e.g. `P1WT1H`).
    pub invalid_duration_value: ParserPolicy,
    /// Backslashes inside URI values.
    pub backslash_in_uri_value: ParserPolicy,
    /// `\:` escape sequences in TEXT values.
    pub invalid_colon_escape_sequence: ParserPolicy,
    /// Any other unknown backslash escape in TEXT values.
    pub invalid_escape_sequences: ParserPolicy,
    /// vCard 2.1 parameters written without a value (`;HOME;VOICE`).
    pub vcard_2_no_parameter_values: ParserPolicy,
    /// vCard `BASE64` parameter as a synonym for `ENCODING=B`.
    pub base64_parameter_synonym: ParserPolicy,
    /// ADR/N structured values with too many components.
    pub invalid_adr_n_values: ParserPolicy,
}

impl Default for ParserContext {
    fn default() -> Self {
        Self::strict()
    }
}

impl ParserContext {
    /// Policies that reject every known deviation.
    #[must_use]
    pub const fn strict() -> Self {
        Self {
            blank_lines_in_data: ParserPolicy::Raise,
            invalid_duration_value: ParserPolicy::Raise,
            backslash_in_uri_value: ParserPolicy::Raise,
            invalid_colon_escape_sequence: ParserPolicy::Raise,
            invalid_escape_sequences: ParserPolicy::Raise,
            vcard_2_no_parameter_values: ParserPolicy::Raise,
            base64_parameter_synonym: ParserPolicy::Raise,
            invalid_adr_n_values: ParserPolicy::Raise,
        }
    }

    /// Policies that repair or tolerate every known deviation.
    #[must_use]
    pub const fn lenient() -> Self {
        Self {
            blank_lines_in_data: ParserPolicy::Ignore,
            invalid_duration_value: ParserPolicy::Allow,
            backslash_in_uri_value: ParserPolicy::Fix,
            invalid_colon_escape_sequence: ParserPolicy::Fix,
            invalid_escape_sequences: ParserPolicy::Fix,
            vcard_2_no_parameter_values: ParserPolicy::Fix,
            base64_parameter_synonym: ParserPolicy::Fix,
            invalid_adr_n_values: ParserPolicy::Fix,
        }
    }

    /// The current process-wide default.
    #[must_use]
    pub fn global() -> Self {
        *GLOBAL_CONTEXT.read().expect("parser context lock poisoned")
    }

    /// Install a new process-wide default.
    ///
    /// Must not be called concurrently with active parsing; parses
    /// already in flight keep the snapshot they started with.
    pub fn set_global(ctx: Self) {
        *GLOBAL_CONTEXT.write().expect("parser context lock poisoned") = ctx;
    }
}

static GLOBAL_CONTEXT: RwLock<ParserContext> = RwLock::new(ParserContext::lenient());

/// Iterator unfolding physical lines into logical lines.
///
/// Physical lines end with CRLF or bare LF. A physical line whose
/// first byte is SPACE or HTAB continues the previous logical line
/// with its first byte removed.
#[derive(Debug)]
pub struct FoldedLines<'a> {
    rest: &'a str,
}

impl<'a> FoldedLines<'a> {
    pub fn new(data: &'a str) -> Self {
        Self { rest: data }
    }

    fn next_physical(&mut self) -> Option<&'a str> {
        if self.rest.is_empty() {
            return None;
        }
        let (line, rest) = match self.rest.find('\n') {
            Some(idx) => (&self.rest[..idx], &self.rest[idx + 1..]),
            None => (self.rest, ""),
        };
        self.rest = rest;
        Some(line.strip_suffix('\r').unwrap_or(line))
    }

    fn peek_is_continuation(&self) -> bool {
        matches!(self.rest.as_bytes().first(), Some(b' ') | Some(b'\t'))
    }
}

impl Iterator for FoldedLines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        let mut logical = self.next_physical()?.to_owned();
        while self.peek_is_continuation() {
            let next = self.next_physical().expect("peeked continuation line");
            logical.push_str(&next[1..]);
        }
        Some(logical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfolds_continuations() {
        let data = "DESCRIPTION:line one\r\n  and the rest\r\nSUMMARY:x\r\n";
        let lines: Vec<String> = FoldedLines::new(data).collect();
        assert_eq!(lines, vec!["DESCRIPTION:line one and the rest", "SUMMARY:x"]);
    }

    #[test]
    fn handles_bare_lf_and_tab_folds() {
        let data = "A:1\n\tb\nB:2";
        let lines: Vec<String> = FoldedLines::new(data).collect();
        assert_eq!(lines, vec!["A:1b", "B:2"]);
    }

    #[test]
    fn blank_line_is_reported_verbatim() {
        let data = "A:1\r\n\r\nB:2\r\n";
        let lines: Vec<String> = FoldedLines::new(data).collect();
        assert_eq!(lines, vec!["A:1", "", "B:2"]);
    }
}
