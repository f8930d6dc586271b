//! Output model shared by the pipeline stages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A numbered clause of the contract body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clause {
    /// Assignment order from splitting (1-based); survives merges.
    pub id: u32,
    /// Number taken from the marker ("5", "十二", ...).
    pub clause_number: String,
    /// Clause text including its marker line.
    pub text: String,
}

impl Clause {
    /// Creates a clause.
    pub fn new(id: u32, clause_number: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id,
            clause_number: clause_number.into(),
            text: text.into(),
        }
    }
}

/// Sections a tail window can be partitioned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionName {
    /// Remainder of the last clause.
    ClauseLast,
    /// Signature block.
    Signature,
    /// Attachment (one per span).
    Attachments,
}

impl fmt::Display for SectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionName::ClauseLast => write!(f, "clause_last"),
            SectionName::Signature => write!(f, "signature"),
            SectionName::Attachments => write!(f, "attachments"),
        }
    }
}

/// An inclusive, 1-based line range labeled with a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSpan {
    pub name: SectionName,
    pub start_line: usize,
    pub end_line: usize,
}

impl SectionSpan {
    /// Creates a span.
    pub fn new(name: SectionName, start_line: usize, end_line: usize) -> Self {
        Self {
            name,
            start_line,
            end_line,
        }
    }

    /// Returns true if the span is well formed for a text of `line_count` lines.
    pub fn is_within(&self, line_count: usize) -> bool {
        self.start_line >= 1 && self.end_line >= self.start_line && self.end_line <= line_count
    }
}

/// Diagnostic attached to an audit result or a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Warning code for results that could not be verified by the classifier.
pub const NEEDS_HUMAN_REVIEW: &str = "NEEDS_HUMAN_REVIEW";

impl Warning {
    /// Creates a warning.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a `NEEDS_HUMAN_REVIEW` warning.
    pub fn needs_human_review(message: impl Into<String>) -> Self {
        Self::new(NEEDS_HUMAN_REVIEW, message)
    }
}

/// Text recovered from a tail window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedSections {
    pub clause_last_text: String,
    pub signature_text: String,
    pub attachments: Vec<String>,
}

/// Result of the tail pipeline (detect, audit, extract).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TailSections {
    /// Last clause body; never empty when the window had text.
    pub clause_last_text: String,
    pub signature_text: String,
    pub attachments: Vec<String>,
    /// Audit warnings (`NEEDS_HUMAN_REVIEW` on fallback).
    pub warnings: Vec<Warning>,
}

/// A segmented contract.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractDocument {
    pub title: String,
    pub introduction: String,
    pub clauses: Vec<Clause>,
    pub signature_section: String,
    pub attachments: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
}

impl ContractDocument {
    /// Returns true if the tail audit fell back to an unsegmented result.
    pub fn needs_human_review(&self) -> bool {
        self.warnings.iter().any(|w| w.code == NEEDS_HUMAN_REVIEW)
    }

    /// Looks up a clause by its marker number.
    pub fn clause_by_number(&self, number: &str) -> Option<&Clause> {
        self.clauses.iter().find(|c| c.clause_number == number)
    }
}

/// Failure report returned instead of an error by the extraction entry points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionFailure {
    pub error: String,
    pub raw_text: String,
}

/// Either a segmented document or a structured failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtractionOutcome {
    Failed(ExtractionFailure),
    Extracted(ContractDocument),
}

impl ExtractionOutcome {
    /// Returns the document if extraction succeeded.
    pub fn document(&self) -> Option<&ContractDocument> {
        match self {
            ExtractionOutcome::Extracted(doc) => Some(doc),
            ExtractionOutcome::Failed(_) => None,
        }
    }

    /// Returns true if extraction failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, ExtractionOutcome::Failed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_name_serde() {
        let json = serde_json::to_string(&SectionName::ClauseLast).unwrap();
        assert_eq!(json, "\"clause_last\"");
        let parsed: SectionName = serde_json::from_str("\"attachments\"").unwrap();
        assert_eq!(parsed, SectionName::Attachments);
    }

    #[test]
    fn test_span_bounds() {
        assert!(SectionSpan::new(SectionName::Signature, 1, 3).is_within(3));
        assert!(!SectionSpan::new(SectionName::Signature, 0, 3).is_within(3));
        assert!(!SectionSpan::new(SectionName::Signature, 3, 2).is_within(3));
        assert!(!SectionSpan::new(SectionName::Signature, 2, 4).is_within(3));
    }

    #[test]
    fn test_failure_serializes_flat() {
        let outcome = ExtractionOutcome::Failed(ExtractionFailure {
            error: "boom".to_string(),
            raw_text: "第1条".to_string(),
        });
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value, serde_json::json!({"error": "boom", "raw_text": "第1条"}));
    }

    #[test]
    fn test_document_omits_empty_warnings() {
        let outcome = ExtractionOutcome::Extracted(ContractDocument {
            title: "契約書".to_string(),
            ..Default::default()
        });
        let value = serde_json::to_value(&outcome).unwrap();
        assert!(value.get("warnings").is_none());
        assert_eq!(value["title"], "契約書");
        assert!(outcome.document().is_some());
    }

    #[test]
    fn test_clause_lookup_and_review_flag() {
        let document = ContractDocument {
            clauses: vec![Clause::new(1, "1", "第1条 目的"), Clause::new(2, "十", "第十条 解除")],
            warnings: vec![Warning::needs_human_review("LLM監査に失敗: timeout")],
            ..Default::default()
        };
        assert_eq!(document.clause_by_number("十").map(|c| c.id), Some(2));
        assert!(document.clause_by_number("3").is_none());
        assert!(document.needs_human_review());
    }
}
