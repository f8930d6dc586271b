//! Boundary candidate detection for the tail of a contract.
//!
//! The detector scans a line window once per [`BoundaryRule`] and reports the
//! lines where a signature block or attachment is likely to begin. It never
//! decides anything on its own; candidates only become boundary tokens in the
//! audit context.

use crate::error::Result;
use crate::model::SectionName;
use crate::options::DetectorConfig;
use crate::rules::{default_tail_boundary_rules, BoundaryRule, CompiledRule, DATE_PATTERN};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Date line pattern used for weak-hit confirmation.
static DATE_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(DATE_PATTERN).unwrap());

/// Score of a strong pattern hit.
pub const STRONG_SCORE: u8 = 2;

/// Score of a confirmed weak pattern hit.
pub const WEAK_SCORE: u8 = 1;

/// A line where a trailing section may start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryCandidate {
    /// `{id_prefix}_{ordinal}`, ordinals starting at 1 per rule.
    pub id: String,
    /// 0-based index into the scanned window.
    pub line_index: usize,
    pub score: u8,
    pub section_name: SectionName,
}

/// Rule-driven candidate detector.
#[derive(Debug, Clone)]
pub struct BoundaryCandidateDetector {
    rules: Vec<CompiledRule>,
    config: DetectorConfig,
}

impl BoundaryCandidateDetector {
    /// Compiles a rule table.
    ///
    /// Fails with [`Error::InvalidPattern`](crate::Error::InvalidPattern) if
    /// any pattern does not compile.
    pub fn new(rules: Vec<BoundaryRule>, config: DetectorConfig) -> Result<Self> {
        let rules = rules
            .into_iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules, config })
    }

    /// Replaces the tuning constants, keeping the compiled rules.
    pub fn with_config(mut self, config: DetectorConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the tuning constants.
    pub fn config(&self) -> DetectorConfig {
        self.config
    }

    /// Returns the rules this detector was built from.
    pub fn rules(&self) -> impl Iterator<Item = &BoundaryRule> {
        self.rules.iter().map(|compiled| &compiled.rule)
    }

    /// Detects candidates for every rule, in rule order.
    ///
    /// Within a rule, candidates are sorted by line position.
    pub fn detect<S: AsRef<str>>(&self, lines: &[S]) -> Vec<BoundaryCandidate> {
        let date_lines: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| DATE_LINE.is_match(line.as_ref()))
            .map(|(idx, _)| idx)
            .collect();

        let mut candidates = Vec::new();
        for rule in &self.rules {
            let hits = self.raw_hits(rule, lines, &date_lines);
            let kept = merge_nearby(hits, self.config.merge_distance);

            candidates.extend(
                kept.into_iter()
                    .take(rule.rule.max_candidates)
                    .enumerate()
                    .map(|(ordinal, (line_index, score))| BoundaryCandidate {
                        id: format!("{}_{}", rule.rule.id_prefix, ordinal + 1),
                        line_index,
                        score,
                        section_name: rule.rule.section_name,
                    }),
            );
        }

        tracing::debug!(
            lines = lines.len(),
            candidates = candidates.len(),
            "boundary candidates detected"
        );
        candidates
    }

    fn raw_hits<S: AsRef<str>>(
        &self,
        rule: &CompiledRule,
        lines: &[S],
        date_lines: &[usize],
    ) -> Vec<(usize, u8)> {
        let mut hits = Vec::new();
        for (idx, line) in lines.iter().enumerate() {
            let line = line.as_ref();
            if line.trim().is_empty() {
                continue;
            }
            if rule.is_strong_hit(line) {
                hits.push((idx, STRONG_SCORE));
            } else if rule.is_weak_hit(line) && self.is_confirmed(rule, line, idx, date_lines) {
                hits.push((idx, WEAK_SCORE));
            }
        }
        hits
    }

    fn is_confirmed(&self, rule: &CompiledRule, line: &str, idx: usize, date_lines: &[usize]) -> bool {
        let Some(confirmation) = &rule.rule.weak_confirmation else {
            return false;
        };
        if confirmation.has_role_marker(line) {
            return true;
        }
        confirmation.near_date
            && date_lines
                .iter()
                .any(|&date_idx| date_idx.abs_diff(idx) <= self.config.date_window)
    }
}

impl Default for BoundaryCandidateDetector {
    fn default() -> Self {
        // The built-in table is known to compile.
        let rules = default_tail_boundary_rules()
            .into_iter()
            .filter_map(|rule| CompiledRule::compile(rule).ok())
            .collect();
        Self {
            rules,
            config: DetectorConfig::default(),
        }
    }
}

/// Collapses hits that lie within `distance` lines of the last kept hit.
///
/// A later hit replaces the kept one only with a strictly higher score.
fn merge_nearby(mut hits: Vec<(usize, u8)>, distance: usize) -> Vec<(usize, u8)> {
    hits.sort_unstable();
    let mut kept: Vec<(usize, u8)> = Vec::with_capacity(hits.len());
    for (idx, score) in hits {
        match kept.last_mut() {
            Some(last) if idx - last.0 <= distance => {
                if score > last.1 {
                    *last = (idx, score);
                }
            }
            _ => kept.push((idx, score)),
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn detect(lines: &[&str]) -> Vec<BoundaryCandidate> {
        BoundaryCandidateDetector::default().detect(lines)
    }

    #[test]
    fn test_empty_window() {
        assert!(detect(&[]).is_empty());
    }

    #[test]
    fn test_tail_scenario_candidates() {
        let lines = [
            "本条文末尾。",
            "2024年4月1日",
            "（甲）株式会社A 代表取締役 山田太郎",
            "別紙1 価格表",
        ];
        let candidates = detect(&lines);
        assert_eq!(candidates.len(), 2);

        assert_eq!(candidates[0].id, "SIG_CAND_1");
        assert_eq!(candidates[0].line_index, 1);
        assert_eq!(candidates[0].score, STRONG_SCORE);
        assert_eq!(candidates[0].section_name, SectionName::Signature);

        assert_eq!(candidates[1].id, "ATTACH_CAND_1");
        assert_eq!(candidates[1].line_index, 3);
        assert_eq!(candidates[1].section_name, SectionName::Attachments);
    }

    #[test]
    fn test_weak_hit_needs_confirmation() {
        let lines = ["本契約は以上とする。", "", "", "", "", "", "", "", "山田 印"];
        assert!(detect(&lines).is_empty());

        let lines = ["本契約は以上とする。", "代表 山田 印"];
        let candidates = detect(&lines);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].score, WEAK_SCORE);
        assert_eq!(candidates[0].line_index, 1);
    }

    #[test]
    fn test_weak_hit_confirmed_by_nearby_date() {
        let lines = ["2024年4月1日", "", "", "", "", "", "", "", "山田 印"];
        // date line itself is a strong hit; 印 line is 8 away (outside window)
        let candidates = detect(&lines);
        assert_eq!(candidates.len(), 1);

        let lines = ["2024年4月1日", "", "", "", "山田 印"];
        let candidates = detect(&lines);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[1].line_index, 4);
        assert_eq!(candidates[1].score, WEAK_SCORE);
    }

    #[test]
    fn test_higher_score_replaces_nearby_weak_hit() {
        let hits = vec![(3, WEAK_SCORE), (4, STRONG_SCORE), (5, WEAK_SCORE)];
        assert_eq!(merge_nearby(hits, 2), vec![(4, STRONG_SCORE)]);
    }

    #[test]
    fn test_tie_keeps_earlier_line() {
        let hits = vec![(7, STRONG_SCORE), (3, STRONG_SCORE), (5, STRONG_SCORE)];
        assert_eq!(merge_nearby(hits, 2), vec![(3, STRONG_SCORE), (7, STRONG_SCORE)]);
    }

    #[test]
    fn test_max_candidates_truncation() {
        let lines: Vec<String> = (1..=8)
            .flat_map(|n| [format!("別紙{n}"), String::new(), String::new()])
            .collect();
        let candidates = BoundaryCandidateDetector::default().detect(&lines);
        assert_eq!(candidates.len(), 5);
        assert_eq!(candidates[4].id, "ATTACH_CAND_5");
    }

    #[test]
    fn test_custom_rules_and_config() {
        let rules = vec![BoundaryRule {
            id_prefix: "EXH".to_string(),
            section_name: SectionName::Attachments,
            strong_patterns: vec![r"Exhibit\s+[A-Z]".to_string()],
            weak_patterns: Vec::new(),
            weak_confirmation: None,
            max_candidates: 2,
        }];
        let detector =
            BoundaryCandidateDetector::new(rules, DetectorConfig::default().with_merge_distance(0))
                .unwrap();
        let candidates = detector.detect(&["exhibit a", "Exhibit B", "text"]);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[1].id, "EXH_2");
        assert_eq!(candidates[1].line_index, 1);
    }

    fn tail_line() -> impl Strategy<Value = String> {
        prop::sample::select(vec![
            "本条文末尾。",
            "",
            "2024年4月1日",
            "（甲）株式会社A",
            "代表 印",
            "山田 印",
            "別紙1 価格表",
            "Appendix A",
            "IN WITNESS WHEREOF",
            "通常の文",
        ])
        .prop_map(str::to_string)
    }

    proptest! {
        #[test]
        fn prop_candidates_bounded_and_spaced(lines in prop::collection::vec(tail_line(), 0..60)) {
            let detector = BoundaryCandidateDetector::default();
            let candidates = detector.detect(&lines);
            for rule in detector.rules() {
                let own: Vec<_> = candidates
                    .iter()
                    .filter(|c| c.id.starts_with(&format!("{}_", rule.id_prefix)))
                    .collect();
                prop_assert!(own.len() <= rule.max_candidates);
                for pair in own.windows(2) {
                    prop_assert!(pair[1].line_index > pair[0].line_index + 2);
                }
            }
        }
    }
}
