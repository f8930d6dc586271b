//! Deterministic clause splitting.
//!
//! Clause starts are found with a single marker scan ("第X条" / "Article N").
//! The text before the first marker becomes title and introduction; the last
//! clause is handed to the tail pipeline (detect, audit, extract) so that a
//! trailing signature block and attachments do not stay glued to it.

use crate::audit::BoundaryAuditor;
use crate::classifier::Classifier;
use crate::error::Result;
use crate::extract::extract_sections;
use crate::model::{Clause, ContractDocument, TailSections};
use crate::normalize::to_halfwidth_digits;
use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

/// Clause marker at the start of a (digit-normalized, left-trimmed) line.
static CLAUSE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(第[0-9一二三四五六七八九十百千]+条|Article\s+\d+)").unwrap()
});

/// A clause start found by the marker scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClauseMarker {
    /// 0-based line index.
    pub line_index: usize,
    /// Matched marker text ("第5条", "Article 12").
    pub marker: String,
}

impl ClauseMarker {
    /// Number carried by the marker; the marker itself if it has no number.
    pub fn clause_number(&self) -> String {
        if let Some(rest) = self.marker.strip_prefix('第') {
            return rest.trim_end_matches('条').to_string();
        }
        if self.marker.to_lowercase().starts_with("article") {
            return self
                .marker
                .split_whitespace()
                .nth(1)
                .unwrap_or_default()
                .to_string();
        }
        self.marker.clone()
    }
}

/// Finds clause marker lines.
pub fn find_clause_markers<S: AsRef<str>>(lines: &[S]) -> Vec<ClauseMarker> {
    lines
        .iter()
        .enumerate()
        .filter_map(|(line_index, line)| {
            let normalized = to_halfwidth_digits(line.as_ref().trim_start());
            CLAUSE_MARKER.find(&normalized).map(|m| ClauseMarker {
                line_index,
                marker: m.as_str().to_string(),
            })
        })
        .collect()
}

/// Result of the marker scan, before any tail processing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClauseSplit {
    pub title: String,
    pub introduction: String,
    pub clauses: Vec<Clause>,
    /// Line range of the last clause, if any clause was found.
    pub last_clause_lines: Option<Range<usize>>,
}

/// Splits lines into title, introduction and clauses.
pub fn split_clauses<S: AsRef<str>>(lines: &[S]) -> ClauseSplit {
    let markers = find_clause_markers(lines);
    let Some(first) = markers.first() else {
        return ClauseSplit {
            title: lines.first().map(|l| l.as_ref().trim().to_string()).unwrap_or_default(),
            introduction: join_trimmed(lines.get(1..).unwrap_or_default()),
            ..Default::default()
        };
    };

    let preamble = &lines[..first.line_index];
    let mut split = ClauseSplit {
        title: preamble.first().map(|l| l.as_ref().trim().to_string()).unwrap_or_default(),
        introduction: join_trimmed(preamble.get(1..).unwrap_or_default()),
        ..Default::default()
    };

    for (idx, marker) in markers.iter().enumerate() {
        let end = markers
            .get(idx + 1)
            .map_or(lines.len(), |next| next.line_index);
        let clause_lines = &lines[marker.line_index..end];

        let heading = clause_lines[0].as_ref().trim();
        let body = join_trimmed(&clause_lines[1..]);
        let text = if body.is_empty() {
            heading.to_string()
        } else {
            format!("{heading}\n{body}")
        };

        split.clauses.push(Clause::new(idx as u32 + 1, marker.clause_number(), text));
        split.last_clause_lines = Some(marker.line_index..end);
    }

    tracing::debug!(clauses = split.clauses.len(), "clause markers scanned");
    split
}

fn join_trimmed<S: AsRef<str>>(lines: &[S]) -> String {
    lines
        .iter()
        .map(|l| l.as_ref())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Runs the tail pipeline on a window.
///
/// The returned `clause_last_text` is never empty when the window has text:
/// if the audit leaves no clause body, the whole window is used.
pub fn split_tail_sections<S, C>(
    lines: &[S],
    auditor: &BoundaryAuditor,
    classifier: &C,
) -> Result<TailSections>
where
    S: AsRef<str>,
    C: Classifier + ?Sized,
{
    let outcome = auditor.audit(lines, classifier)?;
    let sections = extract_sections(&outcome.lines, &outcome.result.final_sections);

    let clause_last_text = if sections.clause_last_text.is_empty() {
        join_trimmed(lines)
    } else {
        sections.clause_last_text
    };

    Ok(TailSections {
        clause_last_text,
        signature_text: sections.signature_text,
        attachments: sections.attachments,
        warnings: outcome.result.warnings,
    })
}

/// Marker-based splitter with tail separation for the last clause.
#[derive(Debug, Clone)]
pub struct ClauseSplitter {
    auditor: BoundaryAuditor,
    enable_tail_audit: bool,
}

impl Default for ClauseSplitter {
    fn default() -> Self {
        Self::new(BoundaryAuditor::default())
    }
}

impl ClauseSplitter {
    /// Creates a splitter that audits the last clause with `auditor`.
    pub fn new(auditor: BoundaryAuditor) -> Self {
        Self {
            auditor,
            enable_tail_audit: true,
        }
    }

    /// Enables or disables the tail audit.
    pub fn with_tail_audit(mut self, enabled: bool) -> Self {
        self.enable_tail_audit = enabled;
        self
    }

    /// Replaces the auditor.
    pub fn with_auditor(mut self, auditor: BoundaryAuditor) -> Self {
        self.auditor = auditor;
        self
    }

    /// Returns the auditor used for the last clause.
    pub fn auditor(&self) -> &BoundaryAuditor {
        &self.auditor
    }

    /// Splits a document.
    ///
    /// The classifier is only called when the tail audit is enabled and at
    /// least one clause marker exists.
    pub fn split<S, C>(&self, lines: &[S], classifier: &C) -> Result<ContractDocument>
    where
        S: AsRef<str>,
        C: Classifier + ?Sized,
    {
        let ClauseSplit {
            title,
            introduction,
            mut clauses,
            last_clause_lines,
        } = split_clauses(lines);

        let mut document = ContractDocument {
            title,
            introduction,
            ..Default::default()
        };

        if let (true, Some(range), Some(last)) =
            (self.enable_tail_audit, last_clause_lines, clauses.last_mut())
        {
            let tail = split_tail_sections(&lines[range], &self.auditor, classifier)?;
            last.text = tail.clause_last_text.trim().to_string();
            document.signature_section = tail.signature_text.trim().to_string();
            document.attachments = tail.attachments;
            document.warnings = tail.warnings;
        }

        document.signature_section =
            remove_attachment_text(document.signature_section, &document.attachments);
        document.clauses = clauses;
        Ok(document)
    }
}

/// Removes attachment text that leaked into the signature block.
fn remove_attachment_text(mut signature: String, attachments: &[String]) -> String {
    for attachment in attachments {
        if !attachment.is_empty() && signature.contains(attachment.as_str()) {
            signature = signature.replace(attachment.as_str(), "").trim().to_string();
        }
    }
    signature
}
