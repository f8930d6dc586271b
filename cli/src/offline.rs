//! Offline classifier.
//!
//! Trusts the rule table: the tail is cut at the first signature token and
//! then at the first attachment token after it, and merge requests are
//! answered with "no merge needed". Useful without network access and for
//! comparing model output against the plain rules.

use clausecut::audit::is_boundary_line;
use clausecut::{Classifier, ClassifierError, Message, Role};
use serde_json::{json, Value};

const MERGE_HEADER: &str = "### 条文リスト";

/// A boundary token found in the numbered window.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    line: usize,
    id: String,
}

impl Token {
    fn is_signature(&self) -> bool {
        self.id.starts_with("SIG")
    }

    fn is_attachment(&self) -> bool {
        self.id.starts_with("ATTACH")
    }
}

/// Rule-echo classifier that never leaves the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineClassifier;

impl Classifier for OfflineClassifier {
    fn classify(&self, messages: &[Message]) -> Result<String, ClassifierError> {
        let request = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .ok_or(ClassifierError::EmptyReply)?;

        if request.content.starts_with(MERGE_HEADER) {
            return Ok("[]".to_string());
        }

        let (line_count, tokens) = scan_window(&request.content);
        Ok(audit_reply(line_count, &tokens).to_string())
    }
}

/// Returns the number of numbered lines and the boundary tokens among them.
fn scan_window(content: &str) -> (usize, Vec<Token>) {
    let mut line_count = 0;
    let mut tokens = Vec::new();

    for line in content.lines() {
        let Some((number, text)) = parse_numbered(line) else {
            continue;
        };
        line_count = line_count.max(number);
        if is_boundary_line(text) {
            let id = text.trim_start_matches("---BOUNDARY:").trim_end_matches("---");
            tokens.push(Token {
                line: number,
                id: id.to_string(),
            });
        }
    }
    (line_count, tokens)
}

/// Splits `[NNN] text` into its number and text.
fn parse_numbered(line: &str) -> Option<(usize, &str)> {
    let rest = line.strip_prefix('[')?;
    let (number, text) = rest.split_once("] ").or_else(|| {
        rest.strip_suffix(']').map(|number| (number, ""))
    })?;
    Some((number.parse().ok()?, text))
}

fn audit_reply(line_count: usize, tokens: &[Token]) -> Value {
    let signature = tokens.iter().find(|t| t.is_signature());
    let attachment = match signature {
        Some(sig) => tokens.iter().find(|t| t.is_attachment() && t.line > sig.line),
        None => tokens.iter().find(|t| t.is_attachment()),
    };

    let first_cut = signature.or(attachment).map_or(line_count + 1, |t| t.line);
    let mut sections = Vec::new();
    push_span(&mut sections, "clause_last", 1, first_cut - 1);
    if let Some(sig) = signature {
        let end = attachment.map_or(line_count, |t| t.line - 1);
        push_span(&mut sections, "signature", sig.line + 1, end);
    }
    if let Some(attach) = attachment {
        push_span(&mut sections, "attachments", attach.line + 1, line_count);
    }

    let boundaries: Vec<Value> = tokens
        .iter()
        .map(|token| {
            let chosen = Some(token) == signature || Some(token) == attachment;
            let section = if token.is_attachment() {
                "attachments"
            } else if token.is_signature() {
                "signature"
            } else {
                "clause_last"
            };
            json!({
                "id": token.id,
                "status": if chosen { "accept" } else { "reject" },
                "section_after_boundary": section,
                "confidence": if chosen { 1.0 } else { 0.0 },
                "rationale": "rule candidate",
            })
        })
        .collect();

    json!({
        "verdict": "accept",
        "boundaries": boundaries,
        "final_sections": sections,
        "warnings": [],
    })
}

fn push_span(sections: &mut Vec<Value>, name: &str, start: usize, end: usize) {
    if start <= end {
        sections.push(json!({"name": name, "start_line": start, "end_line": end}));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clausecut::BoundaryAuditor;

    #[test]
    fn test_parse_numbered() {
        assert_eq!(parse_numbered("[012] 本文"), Some((12, "本文")));
        assert_eq!(parse_numbered("[003]"), Some((3, "")));
        assert_eq!(parse_numbered("以下の行番号付きテキスト"), None);
    }

    #[test]
    fn test_merge_request_gets_empty_list() {
        let reply = OfflineClassifier
            .classify(&[Message::system("prompt"), Message::user("### 条文リスト:\n[]")])
            .unwrap();
        assert_eq!(reply, "[]");
    }

    #[test]
    fn test_cuts_at_first_signature_then_attachment() {
        let tokens = vec![
            Token { line: 3, id: "SIG_CAND_1".to_string() },
            Token { line: 6, id: "ATTACH_CAND_1".to_string() },
        ];
        let reply = audit_reply(7, &tokens);
        assert_eq!(
            reply["final_sections"],
            json!([
                {"name": "clause_last", "start_line": 1, "end_line": 2},
                {"name": "signature", "start_line": 4, "end_line": 5},
                {"name": "attachments", "start_line": 7, "end_line": 7},
            ])
        );
    }

    #[test]
    fn test_no_tokens_keeps_whole_window() {
        let reply = audit_reply(4, &[]);
        assert_eq!(
            reply["final_sections"],
            json!([{"name": "clause_last", "start_line": 1, "end_line": 4}])
        );
    }

    #[test]
    fn test_reply_passes_the_auditor() {
        let lines = [
            "本条文末尾。",
            "2024年4月1日",
            "（甲）株式会社A 代表取締役 山田太郎",
            "別紙1 価格表",
        ];
        let outcome = BoundaryAuditor::default().audit(&lines, &OfflineClassifier).unwrap();
        assert!(!outcome.result.is_fallback());
        assert_eq!(outcome.attempts, 1);
    }
}
