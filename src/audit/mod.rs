//! Boundary audit.
//!
//! The auditor asks a classifier to partition a tail window into
//! `clause_last`, `signature` and `attachments` spans, then accepts the
//! answer only if it is valid JSON, matches the audit schema, and covers the
//! window exactly. Anything else is retried and finally replaced by a
//! conservative fallback that keeps the whole window as the last clause.

mod context;

pub use context::{
    boundary_token, build_audit_context, is_boundary_line, number_lines, AuditContext,
};

use crate::classifier::{outermost_slice, retry_or_else, Classifier, Message, Validation};
use crate::detect::BoundaryCandidateDetector;
use crate::error::{Error, Result};
use crate::model::{SectionName, SectionSpan, Warning};
use crate::options::{LlmAuditConfig, PreprocessOptions};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::sync::{Arc, LazyLock};

/// Bundled system prompt for the boundary audit.
pub const BOUNDARY_AUDIT_PROMPT: &str = include_str!("../../prompts/boundary_audit.md");

/// Bundled JSON Schema for audit replies.
pub const BOUNDARY_AUDIT_SCHEMA: &str = include_str!("../../schemas/boundary_audit.schema.json");

/// User message prefix preceding the numbered window.
const AUDIT_REQUEST: &str = "以下の行番号付きテキストを監査してください。\n";

static DEFAULT_VALIDATOR: LazyLock<Arc<jsonschema::Validator>> = LazyLock::new(|| {
    let schema: Value = serde_json::from_str(BOUNDARY_AUDIT_SCHEMA).unwrap();
    Arc::new(jsonschema::validator_for(&schema).unwrap())
});

/// Overall verdict, also used for per-boundary status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Accept,
    Reject,
}

/// The classifier's decision on one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryDecision {
    pub id: String,
    pub status: Verdict,
    pub section_after_boundary: SectionName,
    pub confidence: f64,
    pub rationale: String,
}

/// A validated (or fallback) audit answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditResult {
    pub verdict: Verdict,
    pub boundaries: Vec<BoundaryDecision>,
    pub final_sections: Vec<SectionSpan>,
    pub warnings: Vec<Warning>,
}

impl AuditResult {
    /// The conservative result: the whole window is the last clause.
    ///
    /// An empty window has no line to cover and gets no span at all.
    pub fn fallback(line_count: usize, reason: &str) -> Self {
        let final_sections = if line_count == 0 {
            Vec::new()
        } else {
            vec![SectionSpan::new(SectionName::ClauseLast, 1, line_count)]
        };
        Self {
            verdict: Verdict::Reject,
            boundaries: Vec::new(),
            final_sections,
            warnings: vec![Warning::needs_human_review(format!(
                "LLM監査に失敗: {reason}"
            ))],
        }
    }

    /// Returns true if this result came from the fallback path.
    pub fn is_fallback(&self) -> bool {
        self.verdict == Verdict::Reject
            && self
                .warnings
                .iter()
                .any(|w| w.code == crate::model::NEEDS_HUMAN_REVIEW)
    }
}

/// Audit result plus diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditOutcome {
    pub result: AuditResult,
    /// Token-augmented window the spans refer to.
    pub lines: Vec<String>,
    /// Last raw classifier reply.
    pub raw_response: Option<String>,
    /// Classifier calls made.
    pub attempts: usize,
}

/// Why a single reply was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Rejection {
    /// Malformed answer; worth asking again.
    Malformed(String),
    /// Deliberate refusal; go straight to the fallback.
    Refused(String),
}

impl<T> From<Rejection> for Validation<T> {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::Malformed(reason) => Validation::Retry(reason),
            Rejection::Refused(reason) => Validation::Abort(reason),
        }
    }
}

/// Classifier-backed boundary auditor.
#[derive(Clone)]
pub struct BoundaryAuditor {
    detector: BoundaryCandidateDetector,
    preprocess: PreprocessOptions,
    config: LlmAuditConfig,
    system_prompt: Cow<'static, str>,
    validator: Arc<jsonschema::Validator>,
}

impl std::fmt::Debug for BoundaryAuditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundaryAuditor")
            .field("detector", &self.detector)
            .field("preprocess", &self.preprocess)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for BoundaryAuditor {
    fn default() -> Self {
        Self::new(BoundaryCandidateDetector::default())
    }
}

impl BoundaryAuditor {
    /// Creates an auditor with the bundled prompt and schema.
    pub fn new(detector: BoundaryCandidateDetector) -> Self {
        Self {
            detector,
            preprocess: PreprocessOptions::default(),
            config: LlmAuditConfig::default(),
            system_prompt: Cow::Borrowed(BOUNDARY_AUDIT_PROMPT.trim()),
            validator: Arc::clone(&DEFAULT_VALIDATOR),
        }
    }

    /// Sets the retry bound.
    pub fn with_config(mut self, config: LlmAuditConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets window preprocessing.
    pub fn with_preprocess(mut self, preprocess: PreprocessOptions) -> Self {
        self.preprocess = preprocess;
        self
    }

    /// Replaces the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Cow::Owned(prompt.into());
        self
    }

    /// Replaces the reply schema.
    pub fn with_schema(mut self, schema: &Value) -> Result<Self> {
        let validator =
            jsonschema::validator_for(schema).map_err(|err| Error::Schema(err.to_string()))?;
        self.validator = Arc::new(validator);
        Ok(self)
    }

    /// Replaces the candidate detector.
    pub fn with_detector(mut self, detector: BoundaryCandidateDetector) -> Self {
        self.detector = detector;
        self
    }

    /// Returns the candidate detector.
    pub fn detector(&self) -> &BoundaryCandidateDetector {
        &self.detector
    }

    /// Builds the audit context without calling the classifier.
    pub fn context<S: AsRef<str>>(&self, lines: &[S]) -> AuditContext {
        build_audit_context(lines, &self.detector, &self.preprocess)
    }

    /// Messages sent for a context.
    pub fn messages(&self, context: &AuditContext) -> Vec<Message> {
        vec![
            Message::system(&*self.system_prompt),
            Message::user(format!("{AUDIT_REQUEST}{}", context.numbered_text)),
        ]
    }

    /// Audits a tail window.
    ///
    /// Never fails on a bad reply; only classifier transport errors are
    /// returned as errors.
    pub fn audit<S, C>(&self, lines: &[S], classifier: &C) -> Result<AuditOutcome>
    where
        S: AsRef<str>,
        C: Classifier + ?Sized,
    {
        let context = self.context(lines);
        if context.is_empty() {
            return Ok(AuditOutcome {
                result: AuditResult::fallback(0, "empty tail window"),
                lines: Vec::new(),
                raw_response: None,
                attempts: 0,
            });
        }

        let messages = self.messages(&context);
        let line_count = context.line_count();
        let mut calls = 0;

        let (result, raw_response, attempts) = retry_or_else(
            classifier,
            &messages,
            self.config.max_retries,
            |reply| {
                calls += 1;
                match self.check_reply(reply, &context.lines) {
                    Ok(result) => Validation::Accept((result, Some(reply.to_string()), calls)),
                    Err(rejection) => rejection.into(),
                }
            },
            |failure| {
                tracing::warn!(
                    attempts = failure.attempts,
                    reason = %failure.reason,
                    "boundary audit fell back to unsegmented tail"
                );
                Ok::<_, Error>((
                    AuditResult::fallback(line_count, &failure.reason),
                    failure.raw_response,
                    failure.attempts,
                ))
            },
        )?;

        Ok(AuditOutcome {
            result,
            lines: context.lines,
            raw_response,
            attempts,
        })
    }

    fn check_reply(&self, reply: &str, lines: &[String]) -> std::result::Result<AuditResult, Rejection> {
        let value = extract_json_object(reply)
            .ok_or_else(|| Rejection::Malformed("reply is not a JSON object".to_string()))?;

        if let Some(error) = self.validator.iter_errors(&value).next() {
            return Err(Rejection::Malformed(format!("schema violation: {error}")));
        }

        let result: AuditResult = serde_json::from_value(value)
            .map_err(|err| Rejection::Malformed(format!("unexpected reply shape: {err}")))?;

        normalize_result(result, lines)
    }
}

/// Extracts the outermost JSON object from a reply, tolerating code fences
/// and surrounding prose.
pub fn extract_json_object(reply: &str) -> Option<Value> {
    let cleaned = reply.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    let candidate = if cleaned.starts_with('{') && cleaned.ends_with('}') {
        cleaned
    } else {
        outermost_slice(cleaned, '{', '}')?
    };
    match serde_json::from_str::<Value>(candidate) {
        Ok(value) if value.is_object() => Some(value),
        _ => None,
    }
}

/// Sorts and checks `final_sections` against the window.
///
/// The sorted spans must not overlap and must cover lines `1..=N`; the
/// only lines allowed outside every span are boundary tokens.
fn normalize_result(
    mut result: AuditResult,
    lines: &[String],
) -> std::result::Result<AuditResult, Rejection> {
    if result.verdict == Verdict::Reject {
        return Err(Rejection::Refused("classifier rejected the window".to_string()));
    }
    if result.final_sections.is_empty() {
        return Err(Rejection::Refused("classifier returned no sections".to_string()));
    }

    let line_count = lines.len();
    result.final_sections.sort_by_key(|span| span.start_line);

    let mut covered_to = 0;
    for span in &result.final_sections {
        if !span.is_within(line_count) {
            return Err(Rejection::Malformed(format!(
                "span {}..{} outside 1..{line_count}",
                span.start_line, span.end_line
            )));
        }
        if span.start_line <= covered_to {
            return Err(Rejection::Malformed(format!(
                "span starting at line {} overlaps the previous span",
                span.start_line
            )));
        }
        if !gap_is_token_only(lines, covered_to + 1, span.start_line - 1) {
            return Err(Rejection::Malformed(format!(
                "text between lines {} and {} is not covered",
                covered_to + 1,
                span.start_line - 1
            )));
        }
        covered_to = span.end_line;
    }

    if !gap_is_token_only(lines, covered_to + 1, line_count) {
        return Err(Rejection::Malformed(format!(
            "lines after {covered_to} are not covered"
        )));
    }

    Ok(result)
}

/// Returns true if every line in the 1-based inclusive range is a token.
fn gap_is_token_only(lines: &[String], start: usize, end: usize) -> bool {
    if start > end {
        return true;
    }
    lines[start - 1..end.min(lines.len())]
        .iter()
        .all(|line| is_boundary_line(line))
}
