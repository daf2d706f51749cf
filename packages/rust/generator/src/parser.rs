//! Parse generated text into ordered question/answer pairs.
//!
//! The parser is lenient about whitespace, line endings, a trailing comma
//! after the question, and missing blank lines between pairs. It never
//! fails: anything it cannot use is reported as a [`ParseWarning`].

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use studyqa_shared::QaPair;

/// Max chars of an unmatched block kept for diagnostics.
const SNIPPET_CHARS: usize = 60;

/// Non-fatal problems found while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseWarning {
    /// A block (0-based position among candidate blocks) that is not a pair.
    UnmatchedBlock { index: usize, snippet: String },
    /// The number of pairs found differs from the number requested.
    CountMismatch { expected: usize, found: usize },
    /// Nothing but whitespace was supplied.
    EmptyInput,
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnmatchedBlock { index, snippet } => {
                write!(f, "block {index} is not a question/answer pair: {snippet:?}")
            }
            Self::CountMismatch { expected, found } => {
                write!(f, "expected {expected} pairs, found {found}")
            }
            Self::EmptyInput => f.write_str("generated text is empty"),
        }
    }
}

/// Pairs in output order plus everything worth reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOutcome {
    pub pairs: Vec<QaPair>,
    pub warnings: Vec<ParseWarning>,
}

/// Parse `raw` into at most `expected` pairs.
///
/// Ordinals are assigned by position (1-based), never taken from the
/// `Q<n>` label, so gaps and duplicates in the labels do not matter.
pub fn parse(raw: &str, expected: usize) -> ParseOutcome {
    let text = raw.replace("\r\n", "\n").replace('\r', "\n");
    if text.trim().is_empty() {
        return ParseOutcome {
            pairs: Vec::new(),
            warnings: vec![ParseWarning::EmptyInput],
        };
    }

    let mut outcome = ParseOutcome::default();
    for (index, block) in candidate_blocks(&text).into_iter().enumerate() {
        match match_pair(block) {
            Some((question, answer)) => outcome.pairs.push(QaPair {
                ordinal: outcome.pairs.len() as u32 + 1,
                question,
                answer,
            }),
            None => outcome.warnings.push(ParseWarning::UnmatchedBlock {
                index,
                snippet: block.chars().take(SNIPPET_CHARS).collect(),
            }),
        }
    }

    let found = outcome.pairs.len();
    if found != expected {
        outcome.pairs.truncate(expected);
        outcome
            .warnings
            .push(ParseWarning::CountMismatch { expected, found });
    }

    debug!(
        pairs = outcome.pairs.len(),
        warnings = outcome.warnings.len(),
        "parsed generated text"
    );
    outcome
}

/// Split on blank lines, then split again wherever a line opens with a
/// `Q<n>:` label so pairs run together without a blank line still separate.
fn candidate_blocks(text: &str) -> Vec<&str> {
    static BLANK_LINE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n[ \t]*\n").expect("valid regex"));
    static LABEL_LINE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?mi)^[ \t]*Q\d+[ \t]*:").expect("valid regex"));

    let mut blocks = Vec::new();
    for chunk in BLANK_LINE_RE.split(text) {
        let starts: Vec<usize> = LABEL_LINE_RE.find_iter(chunk).map(|m| m.start()).collect();

        let mut cuts = Vec::with_capacity(starts.len() + 2);
        cuts.push(0);
        cuts.extend(starts.into_iter().filter(|&s| s > 0));
        cuts.push(chunk.len());

        for window in cuts.windows(2) {
            let piece = chunk[window[0]..window[1]].trim();
            if !piece.is_empty() {
                blocks.push(piece);
            }
        }
    }
    blocks
}

/// Match one block against `Q<n>: question [,] Answer: answer`.
///
/// On the question's own line only a capitalized `Answer:` starts the
/// answer; at the start of a line any case is accepted.
fn match_pair(block: &str) -> Option<(String, String)> {
    static PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"(?s)^(?i:Q)\d+[ \t]*:\s*(.+?)\s*,?(?:[ \t]*Answer|[ \t]*\n\s*(?i:answer))[ \t]*:\s*(.+)$",
        )
        .expect("valid regex")
    });

    let caps = PAIR_RE.captures(block)?;
    let question = collapse_whitespace(caps.get(1)?.as_str());
    let answer = collapse_whitespace(caps.get(2)?.as_str());
    if question.is_empty() || answer.is_empty() {
        return None;
    }
    Some((question, answer))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(n: usize) -> String {
        format!("Q{n}: What is item {n}?\nAnswer: Item {n} is a thing.")
    }

    fn unmatched_count(outcome: &ParseOutcome) -> usize {
        outcome
            .warnings
            .iter()
            .filter(|w| matches!(w, ParseWarning::UnmatchedBlock { .. }))
            .count()
    }

    #[test]
    fn skips_garbage_and_renumbers() {
        let raw = "Q1: What is X?\nAnswer: X is Y.\n\nGARBAGE\n\nQ3: What is Z?\nAnswer: Z is W.";
        let outcome = parse(raw, 5);

        assert_eq!(outcome.pairs.len(), 2);
        assert_eq!(outcome.pairs[0].ordinal, 1);
        assert_eq!(outcome.pairs[0].question, "What is X?");
        assert_eq!(outcome.pairs[0].answer, "X is Y.");
        assert_eq!(outcome.pairs[1].ordinal, 2);
        assert_eq!(outcome.pairs[1].question, "What is Z?");
        assert_eq!(unmatched_count(&outcome), 1);
        assert!(outcome.warnings.contains(&ParseWarning::UnmatchedBlock {
            index: 1,
            snippet: "GARBAGE".into()
        }));
    }

    #[test]
    fn truncates_extra_pairs() {
        let raw = (1..=7).map(block).collect::<Vec<_>>().join("\n\n");
        let outcome = parse(&raw, 5);

        assert_eq!(outcome.pairs.len(), 5);
        let ordinals: Vec<u32> = outcome.pairs.iter().map(|p| p.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 3, 4, 5]);
        assert_eq!(
            outcome.warnings,
            vec![ParseWarning::CountMismatch {
                expected: 5,
                found: 7
            }]
        );
    }

    #[test]
    fn empty_input() {
        assert_eq!(
            parse("", 5),
            ParseOutcome {
                pairs: vec![],
                warnings: vec![ParseWarning::EmptyInput]
            }
        );
        assert_eq!(parse("  \n\t\n", 5).warnings, vec![ParseWarning::EmptyInput]);
    }

    #[test]
    fn exact_count_has_no_warnings() {
        let raw = (1..=5).map(block).collect::<Vec<_>>().join("\n\n");
        let outcome = parse(&raw, 5);
        assert_eq!(outcome.pairs.len(), 5);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn fewer_pairs_kept_with_mismatch() {
        let raw = (1..=3).map(block).collect::<Vec<_>>().join("\n\n");
        let outcome = parse(&raw, 5);
        assert_eq!(outcome.pairs.len(), 3);
        assert_eq!(
            outcome.warnings,
            vec![ParseWarning::CountMismatch {
                expected: 5,
                found: 3
            }]
        );
    }

    #[test]
    fn tolerates_crlf_and_trailing_comma() {
        let raw = "Q1: What is light,\r\nAnswer:  Energy \r\n\r\nQ2:What is dark?\r\nAnswer:No light.";
        let outcome = parse(raw, 2);
        assert_eq!(outcome.pairs[0].question, "What is light");
        assert_eq!(outcome.pairs[0].answer, "Energy");
        assert_eq!(outcome.pairs[1].question, "What is dark?");
        assert_eq!(outcome.pairs[1].answer, "No light.");
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn same_line_answer_accepted() {
        let outcome = parse("Q1: What is X? Answer: X is Y.", 1);
        assert_eq!(outcome.pairs.len(), 1);
        assert_eq!(outcome.pairs[0].question, "What is X?");
        assert_eq!(outcome.pairs[0].answer, "X is Y.");
    }

    #[test]
    fn pairs_without_blank_lines_are_split() {
        let raw = "Q1: What is A?\nAnswer: A.\nQ2: What is B?\nAnswer: B.";
        let outcome = parse(raw, 2);
        assert_eq!(outcome.pairs.len(), 2);
        assert_eq!(outcome.pairs[1].question, "What is B?");
        assert_eq!(outcome.pairs[1].answer, "B.");
    }

    #[test]
    fn preamble_reported_as_unmatched() {
        let raw = "Here are your questions:\nQ1: What is A?\nAnswer: A.";
        let outcome = parse(raw, 1);
        assert_eq!(outcome.pairs.len(), 1);
        assert_eq!(unmatched_count(&outcome), 1);
    }

    #[test]
    fn multiline_answer_collapsed() {
        let raw = "Q1: Why is the sky blue?\nAnswer: Shorter wavelengths\nscatter more.";
        let outcome = parse(raw, 1);
        assert_eq!(outcome.pairs[0].answer, "Shorter wavelengths scatter more.");
    }

    #[test]
    fn lowercase_answer_inside_question_is_kept() {
        let outcome = parse("Q1: What is the answer: 42?\nAnswer: Forty-two.", 1);
        assert_eq!(outcome.pairs.len(), 1);
        assert_eq!(outcome.pairs[0].question, "What is the answer: 42?");
        assert_eq!(outcome.pairs[0].answer, "Forty-two.");

        let outcome = parse("Q1: Is the answer: yes or no?, Answer: Yes.", 1);
        assert_eq!(outcome.pairs[0].question, "Is the answer: yes or no?");
        assert_eq!(outcome.pairs[0].answer, "Yes.");
    }

    #[test]
    fn labels_are_case_insensitive() {
        let outcome = parse("q1: What is A?\nanswer: A.", 1);
        assert_eq!(outcome.pairs.len(), 1);
    }

    #[test]
    fn block_without_answer_is_unmatched() {
        let outcome = parse("Q1: What is A?", 1);
        assert!(outcome.pairs.is_empty());
        assert_eq!(unmatched_count(&outcome), 1);
        assert!(outcome.warnings.contains(&ParseWarning::CountMismatch {
            expected: 1,
            found: 0
        }));
    }

    #[test]
    fn never_panics_on_odd_input() {
        for raw in ["Answer:", "Q1:", "Q1: Answer:", "\u{0}\u{1}", "Q99999999999999999999: x\nAnswer: y", "🙂\n\n🙃"] {
            let _ = parse(raw, 3);
        }
    }
}
