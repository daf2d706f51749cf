//! Deterministic prompt construction.
//!
//! The prompt states the exact pair count, the word limits, and the output
//! grammar the parser expects, followed by a worked example and the passage.

use studyqa_shared::AppConfig;

/// Word limits stated in the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptLimits {
    pub max_question_words: u32,
    pub max_answer_words: u32,
}

impl Default for PromptLimits {
    fn default() -> Self {
        Self {
            max_question_words: 13,
            max_answer_words: 30,
        }
    }
}

impl From<&AppConfig> for PromptLimits {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_question_words: config.prompt.max_question_words,
            max_answer_words: config.prompt.max_answer_words,
        }
    }
}

/// Build the generation prompt for already-sanitized `content`.
///
/// Pure: identical inputs always give identical output.
pub fn build_prompt(content: &str, num_questions: u8, limits: &PromptLimits) -> String {
    let noun = if num_questions == 1 { "pair" } else { "pairs" };
    let max_q = limits.max_question_words;
    let max_a = limits.max_answer_words;
    let passage = content.trim();

    format!(
        "You are writing practice questions for a student studying the passage below.\n\
         \n\
         Write exactly {num_questions} question-and-answer {noun} about the passage.\n\
         \n\
         Rules:\n\
         - Every question must be answerable from the passage alone.\n\
         - Each question must be {max_q} words or fewer.\n\
         - Each answer must be {max_a} words or fewer.\n\
         - Write plain text only, with nothing before the first pair or after the last one.\n\
         \n\
         Output format:\n\
         - One pair per block, with exactly one blank line between blocks.\n\
         - Each block is exactly two lines:\n\
         Q<number>: <question text>\n\
         Answer: <answer text>\n\
         \n\
         Example with two pairs:\n\
         \n\
         Q1: What does photosynthesis convert light into?\n\
         Answer: Photosynthesis converts light into chemical energy stored in sugar.\n\
         \n\
         Q2: Where in a plant cell does photosynthesis happen?\n\
         Answer: It happens inside the chloroplasts.\n\
         \n\
         Passage:\n\
         {passage}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOLDEN: &str = r#"You are writing practice questions for a student studying the passage below.

Write exactly 5 question-and-answer pairs about the passage.

Rules:
- Every question must be answerable from the passage alone.
- Each question must be 13 words or fewer.
- Each answer must be 30 words or fewer.
- Write plain text only, with nothing before the first pair or after the last one.

Output format:
- One pair per block, with exactly one blank line between blocks.
- Each block is exactly two lines:
Q<number>: <question text>
Answer: <answer text>

Example with two pairs:

Q1: What does photosynthesis convert light into?
Answer: Photosynthesis converts light into chemical energy stored in sugar.

Q2: Where in a plant cell does photosynthesis happen?
Answer: It happens inside the chloroplasts.

Passage:
The mitochondrion is the site of cellular respiration.
"#;

    #[test]
    fn matches_golden_output() {
        let prompt = build_prompt(
            "The mitochondrion is the site of cellular respiration.",
            5,
            &PromptLimits::default(),
        );
        assert_eq!(prompt, GOLDEN);
    }

    #[test]
    fn deterministic() {
        let limits = PromptLimits::default();
        let a = build_prompt("Cells divide by mitosis.", 3, &limits);
        let b = build_prompt("Cells divide by mitosis.", 3, &limits);
        assert_eq!(a, b);
    }

    #[test]
    fn count_and_limits_come_from_inputs() {
        let limits = PromptLimits {
            max_question_words: 8,
            max_answer_words: 20,
        };
        let prompt = build_prompt("Cells divide.", 12, &limits);
        assert!(prompt.contains("Write exactly 12 question-and-answer pairs"));
        assert!(prompt.contains("8 words or fewer"));
        assert!(prompt.contains("20 words or fewer"));
        assert!(!prompt.contains("exactly 5"));
    }

    #[test]
    fn singular_pair() {
        let prompt = build_prompt("Cells divide.", 1, &PromptLimits::default());
        assert!(prompt.contains("Write exactly 1 question-and-answer pair about"));
    }

    #[test]
    fn passage_is_trimmed_and_last() {
        let prompt = build_prompt("\n  Cells divide.  \n", 2, &PromptLimits::default());
        assert!(prompt.ends_with("Passage:\nCells divide.\n"));
    }

    #[test]
    fn limits_from_app_config() {
        let mut config = AppConfig::default();
        config.prompt.max_answer_words = 25;
        let limits = PromptLimits::from(&config);
        assert_eq!(limits.max_question_words, 13);
        assert_eq!(limits.max_answer_words, 25);
    }
}
