//! Section extraction from audited spans.

use crate::audit::is_boundary_line;
use crate::model::{ExtractedSections, SectionName, SectionSpan};

/// Maps spans back onto the token-augmented lines.
///
/// Malformed spans and spans without text are skipped, boundary tokens are
/// dropped. The first `clause_last` span wins, `signature` spans are joined
/// in order, and every `attachments` span becomes its own entry.
pub fn extract_sections<S: AsRef<str>>(lines: &[S], spans: &[SectionSpan]) -> ExtractedSections {
    let mut sections = ExtractedSections::default();
    let mut have_clause_last = false;

    for span in spans {
        if !span.is_within(lines.len()) {
            continue;
        }
        let text = lines[span.start_line - 1..span.end_line]
            .iter()
            .map(|line| line.as_ref())
            .filter(|line| !is_boundary_line(line))
            .collect::<Vec<_>>()
            .join("\n");
        let text = text.trim();
        if text.is_empty() {
            continue;
        }

        match span.name {
            SectionName::ClauseLast if !have_clause_last => {
                sections.clause_last_text = text.to_string();
                have_clause_last = true;
            }
            SectionName::ClauseLast => {}
            SectionName::Signature if sections.signature_text.is_empty() => {
                sections.signature_text = text.to_string();
            }
            SectionName::Signature => {
                sections.signature_text.push('\n');
                sections.signature_text.push_str(text);
            }
            SectionName::Attachments => sections.attachments.push(text.to_string()),
        }
    }

    sections
}
