//! Folding generated release notes into an existing release body.
//!
//! Text written by hand above or below the generated sections survives
//! regeneration. The span starting at the first generated heading and
//! running through consecutive generated sections is replaced, and generated
//! sections found further down are removed.

use crate::parser::{GENERATED_HEADINGS, LINE_SEPARATOR};

const BLOCK_SEPARATOR: &str = "\r\n\r\n";

fn is_marker(line: &str) -> bool {
    let line = line.trim();
    GENERATED_HEADINGS.contains(&line)
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Merge `generated` release notes into the `existing` release body.
///
/// - An empty body becomes exactly `generated`.
/// - A body without generated headings gets `generated` appended after a
///   blank line.
/// - Otherwise the first generated block is replaced by `generated`, and any
///   later generated block is dropped. Hand-written text before, between,
///   and after the blocks is kept.
///
/// Lines in the result are joined with `\r\n`, and the text before the
/// notes, the notes, and the text after them are always separated by one
/// blank line. A body of `pre-text`, a `# Changes` block, and `post-text`
/// therefore becomes `pre-text\r\n\r\n# Changes\r\n...\r\n\r\npost-text`,
/// even when the original block had no blank line above it.
///
/// # Examples
///
/// ```
/// use cumulus_notes::merge_release_body;
///
/// let body = "Intro\n# Changes\r\nold\r\n\r\nOutro";
/// let merged = merge_release_body(body, "# Changes\r\nnew");
/// assert_eq!(merged, "Intro\r\n\r\n# Changes\r\nnew\r\n\r\nOutro");
/// ```
pub fn merge_release_body(existing: &str, generated: &str) -> String {
    let lines: Vec<&str> = existing.lines().collect();

    let Some(start) = lines.iter().position(|l| is_marker(l)) else {
        let body = trim_blank_edges(&lines).join(LINE_SEPARATOR);
        return join_blocks(&[body.as_str(), generated]);
    };

    let pre = trim_blank_edges(&lines[..start]).join(LINE_SEPARATOR);

    // Stale generated blocks further down are dropped; the text around them
    // stays in place.
    let mut rest = Vec::new();
    let mut idx = generated_block_end(&lines, start);
    while idx < lines.len() {
        if is_marker(lines[idx]) {
            idx = generated_block_end(&lines, idx);
        } else {
            rest.push(lines[idx]);
            idx += 1;
        }
    }
    let post = trim_blank_edges(&rest).join(LINE_SEPARATOR);

    join_blocks(&[pre.as_str(), generated, post.as_str()])
}

/// Index of the first line after the generated block that begins at `start`.
///
/// A blank line ends the block unless the next non-blank line is another
/// generated heading.
fn generated_block_end(lines: &[&str], start: usize) -> usize {
    let mut idx = start + 1;
    while idx < lines.len() {
        if is_blank(lines[idx]) {
            let next = lines[idx..]
                .iter()
                .position(|l| !is_blank(l))
                .map(|offset| idx + offset);
            match next {
                Some(n) if is_marker(lines[n]) => idx = n,
                Some(n) => return n,
                None => return lines.len(),
            }
        }
        idx += 1;
    }
    lines.len()
}

fn trim_blank_edges<'a>(lines: &[&'a str]) -> Vec<&'a str> {
    let Some(first) = lines.iter().position(|l| !is_blank(l)) else {
        return Vec::new();
    };
    let last = lines.iter().rposition(|l| !is_blank(l)).unwrap_or(first);
    lines[first..=last].to_vec()
}

fn join_blocks(blocks: &[&str]) -> String {
    blocks
        .iter()
        .copied()
        .filter(|b| !b.is_empty())
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "# Critical Changes\r\nBreaks X\r\n\r\n# Changes\r\nDid Y\r\n\r\n# Issues Closed\r\n5";

    #[test]
    fn empty_body_becomes_document() {
        assert_eq!(merge_release_body("", DOC), DOC);
        assert_eq!(merge_release_body("  \r\n", DOC), DOC);
    }

    #[test]
    fn body_without_markers_gets_document_appended() {
        assert_eq!(
            merge_release_body("Hand written intro\r\n", "# Changes\r\nnew"),
            "Hand written intro\r\n\r\n# Changes\r\nnew"
        );
    }

    #[test]
    fn generated_span_replaced_pre_and_post_kept() {
        let body = "pre-text\n# Changes\r\nold\r\n\r\npost-text";
        assert_eq!(
            merge_release_body(body, "# Changes\r\nnew"),
            "pre-text\r\n\r\n# Changes\r\nnew\r\n\r\npost-text"
        );
    }

    #[test]
    fn consecutive_generated_sections_replaced_together() {
        let body = "Intro\r\n\r\n# Critical Changes\r\nA\r\n\r\n# Changes\r\nB\r\n\r\n# Issues Closed\r\n1\r\n\r\nOutro\r\nmore outro";
        assert_eq!(
            merge_release_body(body, "# Changes\r\nC"),
            "Intro\r\n\r\n# Changes\r\nC\r\n\r\nOutro\r\nmore outro"
        );
    }

    #[test]
    fn later_generated_sections_are_dropped() {
        let body = "Intro\n\n# Changes\nold change\n\nHand-written middle\n\n# Issues Closed\n1\n\nOutro";
        let doc = "# Changes\r\nnew change\r\n\r\n# Issues Closed\r\n2";

        let merged = merge_release_body(body, doc);
        assert_eq!(
            merged,
            "Intro\r\n\r\n# Changes\r\nnew change\r\n\r\n# Issues Closed\r\n2\r\n\r\nHand-written middle\r\n\r\nOutro"
        );
        assert_eq!(merged.matches("# Issues Closed").count(), 1);
        assert_eq!(merge_release_body(&merged, doc), merged);
    }

    #[test]
    fn stale_block_at_end_is_dropped() {
        let body = "# Changes\nold\n\nNotes by hand\n# Issues Closed\n4";
        assert_eq!(
            merge_release_body(body, "# Changes\r\nnew"),
            "# Changes\r\nnew\r\n\r\nNotes by hand"
        );
    }

    #[test]
    fn block_at_end_of_body() {
        let body = "Intro\n\n# Issues Closed\n1\n2";
        assert_eq!(merge_release_body(body, DOC), format!("Intro\r\n\r\n{DOC}"));
    }

    #[test]
    fn block_at_start_of_body() {
        let body = "# Changes\nold\n\nOutro";
        assert_eq!(merge_release_body(body, DOC), format!("{DOC}\r\n\r\nOutro"));
    }

    #[test]
    fn similar_heading_is_not_a_marker() {
        let body = "# Changes in behaviour\nkept";
        assert_eq!(
            merge_release_body(body, "# Changes\r\nnew"),
            "# Changes in behaviour\r\nkept\r\n\r\n# Changes\r\nnew"
        );
    }

    #[test]
    fn merge_is_idempotent() {
        let body = "Intro\n# Changes\nold\n\nOutro";
        let once = merge_release_body(body, DOC);
        let twice = merge_release_body(&once, DOC);
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_document_removes_generated_block() {
        let body = "Intro\n\n# Changes\nold\n\nOutro";
        assert_eq!(merge_release_body(body, ""), "Intro\r\n\r\nOutro");
    }
}
