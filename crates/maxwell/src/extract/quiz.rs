/// Parser for generated multiple-choice quizzes.
///
/// Expected block shape, repeated:
///
/// ```text
/// QUESTION 1: <question text>
/// A) <option>
/// B) <option>
/// C) <option>
/// D) <option>
/// CORRECT: <letter>
/// EXPLANATION: <text, possibly several lines>
/// ```
///
/// Anything before the first `QUESTION n:` marker is ignored. Blocks that do not
/// yield a question, exactly the four options A-D and a correct letter are
/// dropped, so a quiz can come back shorter than requested.
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ResponseExtractor;

const NO_EXPLANATION: &str = "No explanation provided.";

static QUESTION_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"QUESTION \d+:").expect("valid regex"));
static OPTION_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-D])\)\s*(.+)$").expect("valid regex"));
static CORRECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)CORRECT:\s*([A-D])").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OptionLetter {
    A,
    B,
    C,
    D,
}

impl OptionLetter {
    pub const ALL: [OptionLetter; 4] = [
        OptionLetter::A,
        OptionLetter::B,
        OptionLetter::C,
        OptionLetter::D,
    ];

    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'A' => Some(OptionLetter::A),
            'B' => Some(OptionLetter::B),
            'C' => Some(OptionLetter::C),
            'D' => Some(OptionLetter::D),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            OptionLetter::A => 'A',
            OptionLetter::B => 'B',
            OptionLetter::C => 'C',
            OptionLetter::D => 'D',
        }
    }
}

impl fmt::Display for OptionLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl FromStr for OptionLetter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => {
                OptionLetter::from_char(c).ok_or_else(|| format!("not an option letter: {s:?}"))
            }
            _ => Err(format!("not an option letter: {s:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizOption {
    pub letter: OptionLetter,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    /// 0-based position of the block in the model output. Dropped blocks leave gaps.
    pub id: usize,
    pub question: String,
    /// Always exactly four, letters A-D each once, in the order the model wrote them.
    pub options: Vec<QuizOption>,
    pub correct: OptionLetter,
    pub explanation: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QuizExtractor;

impl ResponseExtractor for QuizExtractor {
    type Output = Vec<QuizQuestion>;

    fn extract(&self, text: &str) -> Vec<QuizQuestion> {
        parse_quiz(text)
    }
}

pub fn parse_quiz(text: &str) -> Vec<QuizQuestion> {
    let mut questions = Vec::new();
    for (id, block) in QUESTION_MARKER_RE.split(text).skip(1).enumerate() {
        match parse_block(id, block) {
            Some(q) => questions.push(q),
            None => debug!(block = id, "dropping malformed question block"),
        }
    }
    questions
}

fn parse_block(id: usize, block: &str) -> Option<QuizQuestion> {
    let mut lines = block.lines().map(str::trim).filter(|l| !l.is_empty());

    let question = lines.next()?.to_string();

    let mut options: Vec<QuizOption> = Vec::with_capacity(4);
    for line in lines {
        if let Some(caps) = OPTION_LINE_RE.captures(line) {
            let letter = caps[1].chars().next().and_then(OptionLetter::from_char)?;
            options.push(QuizOption {
                letter,
                text: caps[2].trim().to_string(),
            });
            if options.len() == 4 {
                break;
            }
        }
    }
    if !has_each_letter_once(&options) {
        return None;
    }

    let correct = CORRECT_RE
        .captures(block)
        .and_then(|caps| caps[1].chars().next())
        .and_then(OptionLetter::from_char)?;

    let explanation = block
        .find("EXPLANATION:")
        .map(|pos| block[pos + "EXPLANATION:".len()..].trim())
        .filter(|s| !s.is_empty())
        .unwrap_or(NO_EXPLANATION)
        .to_string();

    Some(QuizQuestion {
        id,
        question,
        options,
        correct,
        explanation,
    })
}

fn has_each_letter_once(options: &[QuizOption]) -> bool {
    let mut letters: Vec<OptionLetter> = options.iter().map(|o| o.letter).collect();
    letters.sort();
    letters == OptionLetter::ALL
}
