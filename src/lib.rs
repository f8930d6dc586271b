//! # clausecut
//!
//! Segments line-oriented text extracted from a legal contract into a title,
//! an introduction, numbered clauses, a signature block and attachments.
//!
//! Clause starts carry markers ("第X条" / "Article N") and are split
//! deterministically. What follows the last clause has no markers, so a rule
//! table proposes candidate boundaries and an injected [`Classifier`] (usually
//! an LLM) picks the partition. Every classifier answer is validated, retried
//! a bounded number of times, and replaced by a conservative fallback when it
//! stays unusable.
//!
//! ## Quick Start
//!
//! ```
//! use clausecut::{Clausecut, ClassifierError, Message};
//!
//! // A classifier that refuses everything: the tail stays in the last
//! // clause and the merge pass finds nothing to do.
//! let classifier = |messages: &[Message]| -> Result<String, ClassifierError> {
//!     if messages[1].content.starts_with("### 条文リスト") {
//!         Ok("[]".to_string())
//!     } else {
//!         Ok(r#"{"verdict":"reject","boundaries":[],"final_sections":[],"warnings":[]}"#.to_string())
//!     }
//! };
//!
//! let lines = ["契約書", "前文です。", "第1条 定義", "本条文です。", "第2条 責任", "別の条文です。"];
//! let document = Clausecut::new().split(&lines, &classifier)?;
//!
//! assert_eq!(document.title, "契約書");
//! assert_eq!(document.clauses.len(), 2);
//! assert!(document.needs_human_review());
//! # Ok::<(), clausecut::Error>(())
//! ```
//!
//! ## Features
//!
//! - `async`: Tokio wrappers over the blocking pipeline

pub mod audit;
pub mod batch;
pub mod classifier;
pub mod detect;
pub mod error;
pub mod extract;
pub mod merge;
pub mod model;
pub mod normalize;
pub mod options;
pub mod rules;
pub mod split;

#[cfg(feature = "async")]
pub mod async_api;

// Re-exports
pub use audit::{AuditContext, AuditOutcome, AuditResult, BoundaryAuditor, Verdict};
pub use batch::{BackoffClassifier, BackoffConfig, BatchOptions};
pub use classifier::{Classifier, Message, Role};
pub use detect::{BoundaryCandidate, BoundaryCandidateDetector};
pub use error::{ClassifierError, Error, Result};
pub use merge::ClauseBoundaryMerger;
pub use model::{
    Clause, ContractDocument, ExtractionFailure, ExtractionOutcome, SectionName, SectionSpan,
    TailSections, Warning,
};
pub use options::{DetectorConfig, LlmAuditConfig, MergeConfig, PreprocessOptions, SplitOptions};
pub use rules::{default_tail_boundary_rules, BoundaryRule};
pub use split::ClauseSplitter;

use normalize::preprocess_lines;

/// Splits a contract with default settings.
///
/// The same classifier serves the tail audit and the clause merge.
pub fn split_document<S, C>(lines: &[S], classifier: &C) -> Result<ContractDocument>
where
    S: AsRef<str>,
    C: Classifier + ?Sized,
{
    Clausecut::new().split(lines, classifier)
}

/// Splits a contract with default settings, reporting failure as data.
pub fn extract_document<S, C>(lines: &[S], classifier: &C) -> ExtractionOutcome
where
    S: AsRef<str>,
    C: Classifier + ?Sized,
{
    Clausecut::new().extract(lines, classifier)
}

/// Builder for the splitting pipeline.
///
/// # Example
///
/// ```
/// use clausecut::{Clausecut, ClassifierError, Message};
///
/// let never = |_: &[Message]| -> Result<String, ClassifierError> {
///     Err(ClassifierError::transport("offline"))
/// };
///
/// let document = Clausecut::new()
///     .deterministic_only()
///     .split(&["第1条 目的", "本契約の目的。"], &never)?;
/// assert_eq!(document.clauses[0].clause_number, "1");
/// # Ok::<(), clausecut::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Clausecut {
    options: SplitOptions,
    splitter: ClauseSplitter,
    merger: ClauseBoundaryMerger,
}

impl Default for Clausecut {
    fn default() -> Self {
        Self::new()
    }
}

impl Clausecut {
    /// Creates a pipeline with the default rules and options.
    pub fn new() -> Self {
        Self {
            options: SplitOptions::default(),
            splitter: ClauseSplitter::default(),
            merger: ClauseBoundaryMerger::default(),
        }
    }

    /// Applies a full option set.
    pub fn with_options(mut self, options: SplitOptions) -> Self {
        let auditor = self.splitter.auditor().clone();
        let detector = auditor.detector().clone().with_config(options.detector);
        let auditor = auditor
            .with_detector(detector)
            .with_config(options.audit)
            .with_preprocess(options.preprocess);

        self.splitter = self
            .splitter
            .with_auditor(auditor)
            .with_tail_audit(options.enable_tail_audit);
        self.merger = self.merger.with_config(options.merge);
        self.options = options;
        self
    }

    /// Replaces the boundary rule table.
    pub fn with_rules(mut self, rules: Vec<BoundaryRule>) -> Result<Self> {
        let detector = BoundaryCandidateDetector::new(rules, self.options.detector)?;
        let auditor = self.splitter.auditor().clone().with_detector(detector);
        self.splitter = self.splitter.with_auditor(auditor);
        Ok(self)
    }

    /// Replaces the audit reply schema.
    pub fn with_audit_schema(mut self, schema: &serde_json::Value) -> Result<Self> {
        let auditor = self.splitter.auditor().clone().with_schema(schema)?;
        self.splitter = self.splitter.with_auditor(auditor);
        Ok(self)
    }

    /// Replaces the clause merger (prompt, retries).
    pub fn with_merger(mut self, merger: ClauseBoundaryMerger) -> Self {
        self.merger = merger;
        self
    }

    /// Disables the tail audit.
    pub fn without_tail_audit(self) -> Self {
        let options = self.options.clone().without_tail_audit();
        self.with_options(options)
    }

    /// Disables the clause merge.
    pub fn without_clause_merge(self) -> Self {
        let options = self.options.clone().without_clause_merge();
        self.with_options(options)
    }

    /// Disables both classifier-backed passes.
    pub fn deterministic_only(self) -> Self {
        let options = self.options.clone().deterministic_only();
        self.with_options(options)
    }

    /// Sets the number of extra audit attempts.
    pub fn with_audit_retries(self, retries: usize) -> Self {
        let options = self.options.clone().with_audit_retries(retries);
        self.with_options(options)
    }

    /// Sets the number of extra merge attempts.
    pub fn with_merge_retries(self, retries: usize) -> Self {
        let options = self.options.clone().with_merge_retries(retries);
        self.with_options(options)
    }

    /// Returns the current options.
    pub fn options(&self) -> &SplitOptions {
        &self.options
    }

    /// Returns the auditor used for the last clause.
    pub fn auditor(&self) -> &BoundaryAuditor {
        self.splitter.auditor()
    }

    /// Splits a contract, using one classifier for both passes.
    pub fn split<S, C>(&self, lines: &[S], classifier: &C) -> Result<ContractDocument>
    where
        S: AsRef<str>,
        C: Classifier + ?Sized,
    {
        self.split_with(lines, classifier, classifier)
    }

    /// Splits a contract with separate classifiers for the tail audit and
    /// the clause merge.
    pub fn split_with<S, A, M>(
        &self,
        lines: &[S],
        audit_classifier: &A,
        merge_classifier: &M,
    ) -> Result<ContractDocument>
    where
        S: AsRef<str>,
        A: Classifier + ?Sized,
        M: Classifier + ?Sized,
    {
        let lines = preprocess_lines(lines, &self.options.preprocess);
        let mut document = self.splitter.split(&lines, audit_classifier)?;

        if self.options.audit_clause_boundaries {
            document.clauses = self.merger.merge(document.clauses, merge_classifier)?;
        }
        Ok(document)
    }

    /// Like [`split`](Self::split), but reports any failure as
    /// [`ExtractionOutcome::Failed`] carrying the input text.
    pub fn extract<S, C>(&self, lines: &[S], classifier: &C) -> ExtractionOutcome
    where
        S: AsRef<str>,
        C: Classifier + ?Sized,
    {
        match self.split(lines, classifier) {
            Ok(document) => ExtractionOutcome::Extracted(document),
            Err(err) => {
                tracing::warn!(error = %err, "contract extraction failed");
                let raw_text = lines
                    .iter()
                    .map(|line| line.as_ref())
                    .collect::<Vec<_>>()
                    .join("\n");
                ExtractionOutcome::Failed(ExtractionFailure {
                    error: err.to_string(),
                    raw_text,
                })
            }
        }
    }

    /// Runs only the tail pipeline, treating `lines` as the last clause.
    pub fn split_tail<S, C>(&self, lines: &[S], classifier: &C) -> Result<TailSections>
    where
        S: AsRef<str>,
        C: Classifier + ?Sized,
    {
        let lines = preprocess_lines(lines, &self.options.preprocess);
        split::split_tail_sections(&lines, self.splitter.auditor(), classifier)
    }

    /// Builds the audit context for the last clause without calling a classifier.
    ///
    /// Returns `None` when the text has no clause marker.
    pub fn last_clause_context<S: AsRef<str>>(&self, lines: &[S]) -> Option<AuditContext> {
        let lines = preprocess_lines(lines, &self.options.preprocess);
        let range = split::split_clauses(&lines).last_clause_lines?;
        Some(self.splitter.auditor().context(&lines[range]))
    }
}
