//! Content comparison for reporting.
//!
//! [`DiffEngine::diff`] produces a unified diff between a file on disk and
//! candidate content, or a single parenthesised line explaining why no diff
//! is shown. Suppression rules are checked in a fixed order: disabled by
//! config, no candidate, file size, binary content, diff length.

use serde::{Deserialize, Serialize};
use similar::TextDiff;
use std::fs;
use std::path::Path;

/// Bytes inspected when deciding whether content is binary.
const BINARY_PROBE_LEN: usize = 8192;

/// Thresholds and switches for diff generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffOptions {
    /// Never produce diffs
    pub disabled: bool,
    /// Files larger than this many bytes are not diffed
    pub filesize_threshold: u64,
    /// Diffs longer than this many characters are not shown
    pub output_threshold: usize,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            disabled: false,
            filesize_threshold: 10_000_000,
            output_threshold: 1_000_000,
        }
    }
}

/// The "new" side of a comparison.
#[derive(Debug, Clone, Copy)]
pub enum Candidate<'a> {
    /// Content staged in another file
    Path(&'a Path),
    /// Content held in memory
    Content(&'a [u8]),
}

/// Outcome of a comparison: diff lines, or one explanatory line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentDiff {
    lines: Vec<String>,
    is_diff: bool,
}

impl ContentDiff {
    fn message(message: impl Into<String>) -> Self {
        Self {
            lines: vec![message.into()],
            is_diff: false,
        }
    }

    /// Lines suitable for logs and change descriptions.
    pub fn for_output(&self) -> &[String] {
        &self.lines
    }

    /// Diff text for attaching to a resource, `None` when suppressed.
    pub fn for_reporting(&self) -> Option<String> {
        self.is_diff.then(|| self.lines.join("\n"))
    }

    /// Whether real diff lines were produced.
    pub fn is_diff(&self) -> bool {
        self.is_diff
    }
}

/// Generates content diffs under a set of [`DiffOptions`].
#[derive(Debug, Clone, Default)]
pub struct DiffEngine {
    options: DiffOptions,
}

impl DiffEngine {
    pub fn new(options: DiffOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DiffOptions {
        &self.options
    }

    /// Compare `current` against `candidate`.
    ///
    /// A missing `current` file compares as empty.
    pub fn diff(&self, current: &Path, candidate: Option<Candidate<'_>>) -> ContentDiff {
        if self.options.disabled {
            return ContentDiff::message("(diff output suppressed by config)");
        }
        let Some(candidate) = candidate else {
            return ContentDiff::message("(no candidate content to diff)");
        };

        match self.try_diff(current, candidate) {
            Ok(diff) => diff,
            Err(e) => {
                log::debug!("diff of {} failed: {e}", current.display());
                ContentDiff::message(format!("(could not determine diff: {e})"))
            }
        }
    }

    fn try_diff(&self, current: &Path, candidate: Candidate<'_>) -> std::io::Result<ContentDiff> {
        let threshold = self.options.filesize_threshold;
        let current_size = match fs::metadata(current) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e),
        };
        let candidate_size = match candidate {
            Candidate::Path(path) => fs::metadata(path)?.len(),
            Candidate::Content(bytes) => bytes.len() as u64,
        };
        if current_size > threshold || candidate_size > threshold {
            return Ok(ContentDiff::message(format!(
                "(file sizes exceed {threshold} bytes, diff output suppressed)"
            )));
        }

        let old = if current_size == 0 && !current.exists() {
            Vec::new()
        } else {
            fs::read(current)?
        };
        let new = match candidate {
            Candidate::Path(path) => fs::read(path)?,
            Candidate::Content(bytes) => bytes.to_vec(),
        };

        if is_binary(&old) {
            return Ok(ContentDiff::message(
                "(current file is binary, diff output suppressed)",
            ));
        }
        if is_binary(&new) {
            return Ok(ContentDiff::message(
                "(new content is binary, diff output suppressed)",
            ));
        }

        let old = String::from_utf8_lossy(&old);
        let new = String::from_utf8_lossy(&new);
        let old_label = current.display().to_string();
        let new_label = match candidate {
            Candidate::Path(path) => path.display().to_string(),
            Candidate::Content(_) => format!("{old_label} (new content)"),
        };

        let text_diff = TextDiff::from_lines(old.as_ref(), new.as_ref());
        let unified = text_diff
            .unified_diff()
            .context_radius(3)
            .header(&old_label, &new_label)
            .to_string();

        if unified.is_empty() {
            return Ok(ContentDiff::message("(no diff)"));
        }
        let limit = self.options.output_threshold;
        if unified.chars().count() > limit {
            return Ok(ContentDiff::message(format!(
                "(long diff of over {limit} characters, diff output suppressed)"
            )));
        }

        let lines = unified
            .lines()
            .filter(|line| !line.starts_with("\\ No newline at end of file"))
            .map(str::to_string)
            .collect();
        Ok(ContentDiff {
            lines,
            is_diff: true,
        })
    }
}

/// Heuristic binary detection over a bounded prefix.
///
/// Content is binary when the prefix is not UTF-8 or contains control
/// characters other than whitespace. A multi-byte sequence cut off at the
/// probe boundary does not count.
pub fn is_binary(bytes: &[u8]) -> bool {
    let probe = &bytes[..bytes.len().min(BINARY_PROBE_LEN)];
    let text = match std::str::from_utf8(probe) {
        Ok(text) => text,
        Err(e) if e.error_len().is_none() && probe.len() < bytes.len() => {
            // Truncated final character; the valid part is all we judge.
            match std::str::from_utf8(&probe[..e.valid_up_to()]) {
                Ok(text) => text,
                Err(_) => return true,
            }
        }
        Err(_) => return true,
    };
    text.chars().any(|c| c.is_control() && !c.is_whitespace())
}
