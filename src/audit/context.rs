//! Audit context: the tail window with boundary tokens spliced in.

use crate::detect::{BoundaryCandidate, BoundaryCandidateDetector};
use crate::normalize::preprocess_lines;
use crate::options::PreprocessOptions;
use serde::Serialize;

const BOUNDARY_TOKEN_PREFIX: &str = "---BOUNDARY:";
const BOUNDARY_TOKEN_SUFFIX: &str = "---";

/// Formats the synthetic line that marks a candidate.
///
/// ```
/// use clausecut::audit::boundary_token;
///
/// assert_eq!(boundary_token("SIG_CAND_1"), "---BOUNDARY:SIG_CAND_1---");
/// ```
pub fn boundary_token(id: &str) -> String {
    format!("{BOUNDARY_TOKEN_PREFIX}{id}{BOUNDARY_TOKEN_SUFFIX}")
}

/// Returns true if the line is a boundary token rather than contract text.
pub fn is_boundary_line(line: &str) -> bool {
    line.len() > BOUNDARY_TOKEN_PREFIX.len() + BOUNDARY_TOKEN_SUFFIX.len()
        && line.starts_with(BOUNDARY_TOKEN_PREFIX)
        && line.ends_with(BOUNDARY_TOKEN_SUFFIX)
}

/// The token-augmented window sent to the classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditContext {
    /// Window lines with a token inserted before every candidate anchor.
    pub lines: Vec<String>,
    /// `lines` rendered as `[NNN] line`, newline separated.
    pub numbered_text: String,
    /// Candidates, indexed into the window before token insertion.
    pub candidates: Vec<BoundaryCandidate>,
}

impl AuditContext {
    /// Number of lines, tokens included.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Returns true if the window had no lines at all.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Builds the audit context for a tail window.
pub fn build_audit_context<S: AsRef<str>>(
    lines: &[S],
    detector: &BoundaryCandidateDetector,
    options: &PreprocessOptions,
) -> AuditContext {
    let window = preprocess_lines(lines, options);
    let candidates = detector.detect(&window);
    let lines = insert_boundary_tokens(&window, &candidates);
    let numbered_text = number_lines(&lines, options.line_number_width);

    AuditContext {
        lines,
        numbered_text,
        candidates,
    }
}

fn insert_boundary_tokens(window: &[String], candidates: &[BoundaryCandidate]) -> Vec<String> {
    let mut lines = Vec::with_capacity(window.len() + candidates.len());
    for (idx, line) in window.iter().enumerate() {
        lines.extend(
            candidates
                .iter()
                .filter(|c| c.line_index == idx)
                .map(|c| boundary_token(&c.id)),
        );
        lines.push(line.clone());
    }
    lines
}

/// Renders lines as `[NNN] line` with a zero-padded, 1-based number.
pub fn number_lines(lines: &[String], width: usize) -> String {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| format!("[{:0width$}] {}", i + 1, line, width = width))
        .collect::<Vec<_>>()
        .join("\n")
}
