//! Clause boundary repair.
//!
//! The marker scan splits on every line that starts with "第X条", which
//! breaks a clause apart when a line happens to open with a cross-reference
//! ("第5条に従い..."). The merger shows the clause list to a classifier and
//! re-joins the id groups it names.

use crate::classifier::{
    outermost_slice, retry_or_else, strip_code_fences, Classifier, Message, Validation,
};
use crate::error::{Error, Result};
use crate::model::Clause;
use crate::options::MergeConfig;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

/// Bundled system prompt for the clause merge.
pub const CLAUSE_MERGE_PROMPT: &str = include_str!("../prompts/clause_merge.md");

/// Header of the user message preceding the clause list.
const CLAUSE_LIST_HEADER: &str = "### 条文リスト:\n";

/// Parses a merge reply into id groups.
///
/// Accepted shapes are `[]`, a flat id list (`[2,3,4]`, one group) and a
/// list of groups (`[[2,3],[5,6]]`); bare ids inside a list of groups are
/// single-member groups. Anything else is an error naming the problem.
pub fn parse_merge_reply(reply: &str) -> std::result::Result<Vec<Vec<u32>>, String> {
    let cleaned = strip_code_fences(reply);
    let value: Value = match serde_json::from_str(&cleaned) {
        Ok(value) => value,
        Err(_) => outermost_slice(&cleaned, '[', ']')
            .and_then(|slice| serde_json::from_str(slice).ok())
            .ok_or_else(|| "reply is not JSON".to_string())?,
    };

    let Value::Array(items) = value else {
        return Err("top-level value is not a list".to_string());
    };

    if !items.is_empty() && items.iter().all(Value::is_number) {
        return Ok(vec![parse_ids(&items)?]);
    }

    let mut groups = Vec::with_capacity(items.len());
    for item in &items {
        match item {
            Value::Number(_) => groups.push(vec![parse_id(item)?]),
            Value::Array(ids) if ids.is_empty() => {}
            Value::Array(ids) => groups.push(parse_ids(ids)?),
            other => return Err(format!("group {other} is neither an id nor a list of ids")),
        }
    }
    Ok(groups)
}

fn parse_ids(items: &[Value]) -> std::result::Result<Vec<u32>, String> {
    items.iter().map(parse_id).collect()
}

fn parse_id(item: &Value) -> std::result::Result<u32, String> {
    item.as_u64()
        .and_then(|id| u32::try_from(id).ok())
        .ok_or_else(|| format!("{item} is not a clause id"))
}

/// Applies merge groups to a clause list.
///
/// A group merges into one clause that keeps the smallest member id and that
/// member's number; texts are trimmed and concatenated in id order. Unknown
/// ids are ignored and groups with fewer than two known members change
/// nothing. An id claimed by two groups is an error.
pub fn apply_merge_groups(clauses: Vec<Clause>, groups: &[Vec<u32>]) -> Result<Vec<Clause>> {
    let known: BTreeSet<u32> = clauses.iter().map(|c| c.id).collect();

    let mut owner: HashMap<u32, usize> = HashMap::new();
    let mut plans: Vec<BTreeSet<u32>> = Vec::new();
    for (group_idx, group) in groups.iter().enumerate() {
        let members: BTreeSet<u32> = group.iter().copied().filter(|id| known.contains(id)).collect();
        for &id in &members {
            if owner.insert(id, group_idx).is_some() {
                return Err(Error::ConflictingMergeGroups { id });
            }
        }
        if members.len() >= 2 {
            plans.push(members);
        }
    }
    tracing::debug!(groups = plans.len(), "clause merge plan");

    let mut by_id: HashMap<u32, Clause> = clauses.into_iter().map(|c| (c.id, c)).collect();
    let mut merged = Vec::with_capacity(by_id.len());

    for members in &plans {
        let parts: Vec<Clause> = members.iter().filter_map(|id| by_id.remove(id)).collect();
        let Some(head) = parts.first() else {
            continue;
        };
        let text: String = parts.iter().map(|c| c.text.trim()).collect();
        merged.push(Clause::new(head.id, head.clause_number.clone(), text));
    }

    merged.extend(by_id.into_values());
    merged.sort_by_key(|c| c.id);
    Ok(merged)
}

/// Classifier-backed clause merger.
#[derive(Debug, Clone)]
pub struct ClauseBoundaryMerger {
    config: MergeConfig,
    system_prompt: String,
}

impl Default for ClauseBoundaryMerger {
    fn default() -> Self {
        Self::new(MergeConfig::default())
    }
}

impl ClauseBoundaryMerger {
    /// Creates a merger with the bundled prompt.
    pub fn new(config: MergeConfig) -> Self {
        Self {
            config,
            system_prompt: CLAUSE_MERGE_PROMPT.trim().to_string(),
        }
    }

    /// Sets the retry bound.
    pub fn with_config(mut self, config: MergeConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Messages sent for a clause list.
    pub fn messages(&self, clauses: &[Clause]) -> Result<Vec<Message>> {
        let listing = serde_json::to_string_pretty(clauses)?;
        Ok(vec![
            Message::system(self.system_prompt.as_str()),
            Message::user(format!("{CLAUSE_LIST_HEADER}{listing}")),
        ])
    }

    /// Re-joins clauses the classifier reports as wrongly split.
    ///
    /// Lists with fewer than two clauses are returned without a classifier
    /// call. A reply that never parses is an error, not "no merge needed".
    pub fn merge<C>(&self, clauses: Vec<Clause>, classifier: &C) -> Result<Vec<Clause>>
    where
        C: Classifier + ?Sized,
    {
        if clauses.len() < 2 {
            return Ok(clauses);
        }

        let messages = self.messages(&clauses)?;
        let groups = retry_or_else(
            classifier,
            &messages,
            self.config.max_retries,
            |reply| match parse_merge_reply(reply) {
                Ok(groups) => Validation::Accept(groups),
                Err(reason) => Validation::Retry(reason),
            },
            |failure| {
                tracing::warn!(
                    attempts = failure.attempts,
                    reason = %failure.reason,
                    "malformed clause merge reply"
                );
                Err(Error::MalformedMergeReply {
                    reason: failure.reason,
                })
            },
        )?;

        apply_merge_groups(clauses, &groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClassifierError;
    use std::cell::Cell;

    fn clauses() -> Vec<Clause> {
        vec![
            Clause::new(1, "4", "第4条 目的\n本契約の目的。"),
            Clause::new(2, "5", "A."),
            Clause::new(3, "6", " B. "),
            Clause::new(4, "7", "C."),
            Clause::new(5, "8", "第8条 雑則"),
        ]
    }

    #[test]
    fn test_merge_example() {
        let merged = apply_merge_groups(clauses(), &[vec![2, 3, 4]]).unwrap();
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0], clauses()[0]);
        assert_eq!(merged[1], Clause::new(2, "5", "A.B.C."));
        assert_eq!(merged[2], clauses()[4]);
    }

    #[test]
    fn test_group_order_does_not_matter() {
        let merged = apply_merge_groups(clauses(), &[vec![4, 2, 3]]).unwrap();
        assert_eq!(merged[1], Clause::new(2, "5", "A.B.C."));
    }

    #[test]
    fn test_unknown_ids_and_singletons_pass_through() {
        let merged = apply_merge_groups(clauses(), &[vec![9, 10], vec![2], vec![5, 42]]).unwrap();
        assert_eq!(merged, clauses());
    }

    #[test]
    fn test_conflicting_groups() {
        let result = apply_merge_groups(clauses(), &[vec![2, 3], vec![3, 4]]);
        assert!(matches!(result, Err(Error::ConflictingMergeGroups { id: 3 })));
    }

    #[test]
    fn test_parse_reply_shapes() {
        assert_eq!(parse_merge_reply("[]").unwrap(), Vec::<Vec<u32>>::new());
        assert_eq!(parse_merge_reply("[2,3,4]").unwrap(), vec![vec![2, 3, 4]]);
        assert_eq!(
            parse_merge_reply("```json\n[[2,3],\n[5,6]]\n```").unwrap(),
            vec![vec![2, 3], vec![5, 6]]
        );
        assert_eq!(
            parse_merge_reply("結合すべきidは [[2,3], 7, []] です").unwrap(),
            vec![vec![2, 3], vec![7]]
        );
    }

    #[test]
    fn test_parse_reply_rejects_malformed() {
        assert!(parse_merge_reply("{\"groups\": []}").is_err());
        assert!(parse_merge_reply("[[2, \"3\"]]").is_err());
        assert!(parse_merge_reply("[[2, 3], {\"id\": 4}]").is_err());
        assert!(parse_merge_reply("[-1, 2]").is_err());
        assert!(parse_merge_reply("no merges needed").is_err());
    }

    #[test]
    fn test_parse_reply_keeps_backslashes() {
        assert!(parse_merge_reply(r"[[2,\3]]").is_err());
        assert!(parse_merge_reply(r"\[[2,3]\]").is_err());
        assert_eq!(
            parse_merge_reply("```json\n[[2,3]]\n```"),
            Ok(vec![vec![2, 3]])
        );
    }

    #[test]
    fn test_merger_applies_reply() {
        let classifier = |_: &[Message]| Ok::<_, ClassifierError>("[[2,3,4]]".to_string());
        let merged = ClauseBoundaryMerger::default().merge(clauses(), &classifier).unwrap();
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[1].text, "A.B.C.");
    }

    #[test]
    fn test_malformed_reply_is_an_error() {
        let calls = Cell::new(0);
        let classifier = |_: &[Message]| {
            calls.set(calls.get() + 1);
            Ok::<_, ClassifierError>("{\"merge\": true}".to_string())
        };
        let merger = ClauseBoundaryMerger::new(MergeConfig { max_retries: 2 });
        let err = merger.merge(clauses(), &classifier).unwrap_err();
        assert!(matches!(err, Error::MalformedMergeReply { .. }));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_single_clause_skips_classifier() {
        let classifier = |_: &[Message]| -> std::result::Result<String, ClassifierError> {
            panic!("classifier must not be called")
        };
        let one = vec![Clause::new(1, "1", "第1条")];
        let merged = ClauseBoundaryMerger::default().merge(one.clone(), &classifier).unwrap();
        assert_eq!(merged, one);
    }

    #[test]
    fn test_request_lists_clauses_as_json() {
        let messages = ClauseBoundaryMerger::default().messages(&clauses()).unwrap();
        assert!(messages[1].content.starts_with("### 条文リスト:\n[\n  {\n    \"id\": 1,"));
        assert!(messages[1].content.contains("\"clause_number\": \"5\""));
    }
}
