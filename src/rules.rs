//! Declarative boundary rules for the tail audit.
//!
//! A [`BoundaryRule`] describes how one trailing section type (signature
//! block, attachments) announces itself in text. Rules are plain data so a
//! table can be shipped as JSON and swapped without recompiling; they are
//! compiled into [`CompiledRule`]s once per detector.

use crate::error::{Error, Result};
use crate::model::SectionName;
use regex::{RegexSet, RegexSetBuilder};
use serde::{Deserialize, Serialize};

/// Date formats seen in signature blocks ("2024年4月1日", "2024/4/1", "2024-04-01").
pub const DATE_PATTERN: &str = r"\d{4}[年/-]\d{1,2}[月/-]\d{1,2}日?";

/// Declarative description of one trailing section type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryRule {
    /// Prefix of candidate ids (`{id_prefix}_{ordinal}`).
    pub id_prefix: String,

    /// Section that starts after a candidate of this rule.
    pub section_name: SectionName,

    /// Patterns whose hit is an unconditional candidate (score 2).
    pub strong_patterns: Vec<String>,

    /// Patterns whose hit needs contextual confirmation (score 1).
    #[serde(default)]
    pub weak_patterns: Vec<String>,

    /// How weak hits are confirmed. Without one, weak hits are discarded.
    #[serde(default)]
    pub weak_confirmation: Option<WeakConfirmation>,

    /// Maximum number of candidates kept for this rule.
    pub max_candidates: usize,
}

/// Context that promotes a weak hit to a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WeakConfirmation {
    /// Substrings (company/name/title tokens, party abbreviations) that
    /// confirm a hit on the same line.
    #[serde(default)]
    pub role_markers: Vec<String>,

    /// Confirm hits that lie near a date-formatted line.
    #[serde(default)]
    pub near_date: bool,
}

impl WeakConfirmation {
    /// Returns true if the line carries one of the role markers.
    pub fn has_role_marker(&self, line: &str) -> bool {
        self.role_markers
            .iter()
            .any(|marker| line.contains(marker.as_str()))
    }
}

fn patterns(items: &[&str]) -> Vec<String> {
    items.iter().map(|p| p.to_string()).collect()
}

/// Signature block and attachment rules for Japanese/English contracts.
pub fn default_tail_boundary_rules() -> Vec<BoundaryRule> {
    let signature_strong = patterns(&[
        r"署名",
        r"記名",
        r"押印",
        r"捺印",
        r"締結の証",
        r"署名押印欄",
        r"IN WITNESS WHEREOF",
        r"Signed\b",
        r"Signature\b",
        DATE_PATTERN,
        r"（甲）",
        r"（乙）",
        r"\bCompany\b",
        r"\bAddress\b",
        r"\bName\b",
        r"\bTitle\b",
    ]);
    let attachment_strong = patterns(&[
        r"別紙",
        r"添付",
        r"別添",
        r"付録",
        r"Annex\b",
        r"Appendix\b",
        r"Attachment\b",
        r"Schedule\b",
        r"別紙\s*\d+",
        r"別紙\s*第\d+",
        r"Appendix\s+[A-Z]",
        r"Annex\s+\d+",
    ]);

    vec![
        BoundaryRule {
            id_prefix: "SIG_CAND".to_string(),
            section_name: SectionName::Signature,
            strong_patterns: signature_strong,
            weak_patterns: patterns(&[r"印"]),
            weak_confirmation: Some(WeakConfirmation {
                role_markers: patterns(&[
                    "代表", "役職", "Name", "Title", "Company", "（甲）", "（乙）", "(甲)", "(乙)",
                ]),
                near_date: true,
            }),
            max_candidates: 3,
        },
        BoundaryRule {
            id_prefix: "ATTACH_CAND".to_string(),
            section_name: SectionName::Attachments,
            strong_patterns: attachment_strong,
            weak_patterns: Vec::new(),
            weak_confirmation: None,
            max_candidates: 5,
        },
    ]
}

/// Parses a rule table from JSON (an array of rules).
pub fn rules_from_json(json: &str) -> Result<Vec<BoundaryRule>> {
    Ok(serde_json::from_str(json)?)
}

/// Loads a rule table from a JSON file.
pub fn rules_from_path(path: impl AsRef<std::path::Path>) -> Result<Vec<BoundaryRule>> {
    let json = std::fs::read_to_string(path)?;
    rules_from_json(&json)
}

/// A rule with its pattern sets compiled.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: BoundaryRule,
    strong: RegexSet,
    weak: RegexSet,
}

impl CompiledRule {
    /// Compiles all patterns of a rule case-insensitively.
    pub fn compile(rule: BoundaryRule) -> Result<Self> {
        let strong = compile_set(&rule.strong_patterns)?;
        let weak = compile_set(&rule.weak_patterns)?;
        Ok(Self { rule, strong, weak })
    }

    /// Returns true if any strong pattern matches.
    pub fn is_strong_hit(&self, line: &str) -> bool {
        self.strong.is_match(line)
    }

    /// Returns true if any weak pattern matches.
    pub fn is_weak_hit(&self, line: &str) -> bool {
        self.weak.is_match(line)
    }
}

fn compile_set(patterns: &[String]) -> Result<RegexSet> {
    RegexSetBuilder::new(patterns)
        .case_insensitive(true)
        .build()
        .map_err(|err| Error::InvalidPattern {
            pattern: first_invalid(patterns).unwrap_or_default(),
            message: err.to_string(),
        })
}

/// Finds the offending pattern so the error names it.
fn first_invalid(patterns: &[String]) -> Option<String> {
    patterns
        .iter()
        .find(|p| regex::Regex::new(p).is_err())
        .cloned()
}
