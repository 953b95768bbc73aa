//! Change extraction between two document snapshots.
//!
//! Every update cycle compares the previously evaluated document text with
//! the current one and produces a [`ChangeRecord`]: the ordered list of
//! significant lines that were added or removed.  Scripts can reference this
//! summary through the `Changes` placeholder, which is replaced with the
//! record's [token](ChangeRecord::to_token) before evaluation.
//!
//! # Algorithm
//!
//! 1. Both texts are split into lines; blank lines and `//` comment lines are
//!    dropped because they never affect the graph.
//! 2. The remaining lines are diffed with an LCS diff keyed on the *trimmed*
//!    line, so re-indenting a line is not a change.
//! 3. Within every contiguous run of differences, removed lines are emitted
//!    first (in their old order) followed by added lines (in their new
//!    order).
//!
//! # Token format
//!
//! ```text
//! removed<TAB>line one\nadded<TAB>line two
//! ```
//!
//! The record separator is the two-character sequence `\n` (backslash, `n`),
//! not a real newline, and backslashes and backticks inside lines are escaped,
//! so the token can be spliced into a backtick string literal and still be a
//! single source line.

use std::fmt;

use similar::{Algorithm, DiffTag, TextDiff};

/// The placeholder that is replaced by the change token in the document text.
pub const CHANGES_PLACEHOLDER: &str = "Changes";

/// The placeholder replaced (first occurrence only) by the program's own text.
pub const COMMAND_CODE_PLACEHOLDER: &str = "CommandCode";

/// Lines starting with this marker (after indentation) are comments.
pub const COMMENT_MARKER: &str = "//";

/// Separator between records in the rendered token: an escaped newline.
const RECORD_SEPARATOR: &str = "\\n";

/// Whether a line was added to or removed from the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Added,
    Removed,
}

impl ChangeKind {
    /// The lowercase label used in the rendered token.
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Removed => "removed",
        }
    }

    /// Returns the opposite kind.
    pub fn swapped(self) -> Self {
        match self {
            ChangeKind::Added => ChangeKind::Removed,
            ChangeKind::Removed => ChangeKind::Added,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One added or removed line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LineChange {
    pub kind: ChangeKind,
    pub line: String,
}

impl LineChange {
    fn new(kind: ChangeKind, line: &str) -> Self {
        Self {
            kind,
            line: line.to_string(),
        }
    }
}

/// The ordered list of significant line changes between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeRecord {
    entries: Vec<LineChange>,
}

impl ChangeRecord {
    /// All changes in emission order.
    pub fn entries(&self) -> &[LineChange] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LineChange> {
        self.entries.iter()
    }

    /// Renders the record as a single-line token safe to splice into a
    /// backtick string literal.
    ///
    /// An empty record renders as the empty string.
    ///
    /// # Example
    ///
    /// ```rust
    /// use livegraph_core::extract;
    ///
    /// let record = extract("a\nb", "a\nc");
    /// assert_eq!(record.to_token(), "removed\tb\\nadded\tc");
    /// ```
    pub fn to_token(&self) -> String {
        self.entries
            .iter()
            .map(|entry| escape_template_text(&format!("{}\t{}", entry.kind, entry.line)))
            .collect::<Vec<_>>()
            .join(RECORD_SEPARATOR)
    }
}

impl<'a> IntoIterator for &'a ChangeRecord {
    type Item = &'a LineChange;
    type IntoIter = std::slice::Iter<'a, LineChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Computes the change record between `previous` and `current`.
///
/// # Example
///
/// ```rust
/// use livegraph_core::{extract, ChangeKind};
///
/// let record = extract("a\nb", "a\nc");
/// let kinds: Vec<_> = record.iter().map(|c| (c.kind, c.line.as_str())).collect();
/// assert_eq!(kinds, vec![(ChangeKind::Removed, "b"), (ChangeKind::Added, "c")]);
/// ```
pub fn extract(previous: &str, current: &str) -> ChangeRecord {
    let old_lines = significant_lines(previous);
    let new_lines = significant_lines(current);

    // Diff on trimmed keys; report the untrimmed lines.
    let old_keys: Vec<&str> = old_lines.iter().map(|l| l.trim()).collect();
    let new_keys: Vec<&str> = new_lines.iter().map(|l| l.trim()).collect();

    let diff = TextDiff::configure()
        .algorithm(Algorithm::Lcs)
        .diff_slices(&old_keys, &new_keys);

    let mut entries = Vec::new();
    let mut removed: Vec<LineChange> = Vec::new();
    let mut added: Vec<LineChange> = Vec::new();

    for op in diff.ops() {
        let (tag, old_range, new_range) = op.as_tag_tuple();
        match tag {
            DiffTag::Equal => {
                flush_run(&mut entries, &mut removed, &mut added);
            }
            DiffTag::Delete => {
                removed.extend(old_range.map(|i| LineChange::new(ChangeKind::Removed, old_lines[i])));
            }
            DiffTag::Insert => {
                added.extend(new_range.map(|i| LineChange::new(ChangeKind::Added, new_lines[i])));
            }
            DiffTag::Replace => {
                removed.extend(old_range.map(|i| LineChange::new(ChangeKind::Removed, old_lines[i])));
                added.extend(new_range.map(|i| LineChange::new(ChangeKind::Added, new_lines[i])));
            }
        }
    }
    flush_run(&mut entries, &mut removed, &mut added);

    ChangeRecord { entries }
}

/// Replaces every occurrence of [`CHANGES_PLACEHOLDER`] with `token`.
pub fn substitute_changes(program: &str, token: &str) -> String {
    program.replace(CHANGES_PLACEHOLDER, token)
}

/// Replaces the first occurrence of [`COMMAND_CODE_PLACEHOLDER`] with a
/// backtick string literal holding the whole program text.
pub fn substitute_command_code(program: &str) -> String {
    if !program.contains(COMMAND_CODE_PLACEHOLDER) {
        return program.to_string();
    }
    let literal = format!("`{}`", escape_template_text(program));
    program.replacen(COMMAND_CODE_PLACEHOLDER, &literal, 1)
}

/// Escapes text for inclusion in a backtick string literal on one line.
pub fn escape_template_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '`' => out.push_str("\\`"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

fn significant_lines(text: &str) -> Vec<&str> {
    text.lines().filter(|line| is_significant(line)).collect()
}

fn is_significant(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && !trimmed.starts_with(COMMENT_MARKER)
}

fn flush_run(entries: &mut Vec<LineChange>, removed: &mut Vec<LineChange>, added: &mut Vec<LineChange>) {
    entries.append(removed);
    entries.append(added);
}

// ── Tests ─────────────────────────────────────────────────────────────────────
