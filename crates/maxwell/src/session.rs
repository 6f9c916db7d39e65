//! Quiz session state machine.
//!
//! ```text
//! SelectingLength --choose_length--> Generating --generation_finished--> InProgress --submit--> Submitted
//!        ^                               |  (failure or zero questions)      |                   |
//!        +-------------------------------+<--------------- retry ------------+-------------------+
//! ```
//!
//! Transitions take `&self` and return the next state; an invalid transition returns
//! a [`SessionError`] and the caller keeps the state it had.

use std::collections::BTreeMap;
use std::fmt;

use crate::extract::{OptionLetter, QuizQuestion, StudySuggestion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuizLength {
    Five,
    Ten,
    TwentyFive,
}

impl QuizLength {
    pub const MENU: [QuizLength; 3] = [QuizLength::Five, QuizLength::Ten, QuizLength::TwentyFive];

    pub fn count(self) -> usize {
        match self {
            QuizLength::Five => 5,
            QuizLength::Ten => 10,
            QuizLength::TwentyFive => 25,
        }
    }

    pub fn from_count(n: usize) -> Option<Self> {
        Self::MENU.into_iter().find(|l| l.count() == n)
    }
}

impl fmt::Display for QuizLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Questions", self.count())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("cannot {action} while {phase}")]
    InvalidTransition {
        action: &'static str,
        phase: &'static str,
    },

    #[error("Please answer all questions before submitting ({unanswered} unanswered)")]
    Incomplete { unanswered: usize },

    #[error("quiz has no questions")]
    NoQuestions,
}

/// Questions being answered. Invariants: at least one question, `current` is a
/// valid index, and every answer key is the id of one of the questions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizSession {
    questions: Vec<QuizQuestion>,
    answers: BTreeMap<usize, OptionLetter>,
    current: usize,
}

impl QuizSession {
    pub fn new(questions: Vec<QuizQuestion>) -> Result<Self, SessionError> {
        if questions.is_empty() {
            return Err(SessionError::NoQuestions);
        }
        Ok(Self {
            questions,
            answers: BTreeMap::new(),
            current: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_question(&self) -> &QuizQuestion {
        &self.questions[self.current]
    }

    pub fn is_last(&self) -> bool {
        self.current + 1 == self.questions.len()
    }

    pub fn answer_for(&self, question_id: usize) -> Option<OptionLetter> {
        self.answers.get(&question_id).copied()
    }

    pub fn unanswered(&self) -> usize {
        self.questions
            .iter()
            .filter(|q| !self.answers.contains_key(&q.id))
            .count()
    }

    pub fn all_answered(&self) -> bool {
        self.unanswered() == 0
    }

    fn answered(&self, letter: OptionLetter) -> Self {
        let mut next = self.clone();
        next.answers.insert(self.current_question().id, letter);
        next
    }

    fn moved_to(&self, index: usize) -> Self {
        Self {
            current: index.min(self.questions.len() - 1),
            ..self.clone()
        }
    }
}

/// Where the post-submission study suggestions stand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suggestions {
    /// Every answer was right; nothing is requested.
    NotNeeded,
    Loading,
    Ready(Vec<StudySuggestion>),
    /// The request failed; the panel shows nothing extra.
    Unavailable,
}

/// One line of the results breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionReview<'a> {
    pub question: &'a QuizQuestion,
    pub chosen: Option<OptionLetter>,
    pub correct: bool,
}

/// A graded attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizReport {
    session: QuizSession,
    score: usize,
    suggestions: Suggestions,
}

impl QuizReport {
    fn grade(session: QuizSession) -> Self {
        let score = session
            .questions
            .iter()
            .filter(|q| session.answer_for(q.id) == Some(q.correct))
            .count();
        let suggestions = if score == session.len() {
            Suggestions::NotNeeded
        } else {
            Suggestions::Loading
        };
        Self {
            session,
            score,
            suggestions,
        }
    }

    pub fn score(&self) -> usize {
        self.score
    }

    pub fn total(&self) -> usize {
        self.session.len()
    }

    /// `round(100 * score / total)`.
    pub fn percentage(&self) -> u32 {
        (self.score as f64 * 100.0 / self.total() as f64).round() as u32
    }

    pub fn suggestions(&self) -> &Suggestions {
        &self.suggestions
    }

    pub fn needs_suggestions(&self) -> bool {
        self.suggestions == Suggestions::Loading
    }

    pub fn missed(&self) -> Vec<&QuizQuestion> {
        self.reviews()
            .into_iter()
            .filter(|r| !r.correct)
            .map(|r| r.question)
            .collect()
    }

    pub fn reviews(&self) -> Vec<QuestionReview<'_>> {
        self.session
            .questions
            .iter()
            .map(|q| {
                let chosen = self.session.answer_for(q.id);
                QuestionReview {
                    question: q,
                    chosen,
                    correct: chosen == Some(q.correct),
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuizState {
    /// `error` carries the alert text of a failed generation, if any.
    SelectingLength { error: Option<String> },
    Generating { length: QuizLength },
    InProgress(QuizSession),
    Submitted(QuizReport),
}

impl Default for QuizState {
    fn default() -> Self {
        QuizState::SelectingLength { error: None }
    }
}

impl QuizState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> &'static str {
        match self {
            QuizState::SelectingLength { .. } => "selecting a length",
            QuizState::Generating { .. } => "generating",
            QuizState::InProgress(_) => "in progress",
            QuizState::Submitted(_) => "submitted",
        }
    }

    pub(crate) fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            action,
            phase: self.phase(),
        }
    }

    pub fn choose_length(&self, length: QuizLength) -> Result<Self, SessionError> {
        match self {
            QuizState::SelectingLength { .. } => Ok(QuizState::Generating { length }),
            _ => Err(self.invalid("choose a quiz length")),
        }
    }

    /// A failed request or a response with no usable question sends the machine back
    /// to length selection with the error attached.
    pub fn generation_finished<E: fmt::Display>(
        &self,
        outcome: Result<Vec<QuizQuestion>, E>,
    ) -> Result<Self, SessionError> {
        let QuizState::Generating { .. } = self else {
            return Err(self.invalid("finish generating"));
        };
        Ok(match outcome {
            Ok(questions) => match QuizSession::new(questions) {
                Ok(session) => QuizState::InProgress(session),
                Err(_) => QuizState::SelectingLength {
                    error: Some(
                        "Failed to generate quiz: the model returned no usable questions"
                            .to_string(),
                    ),
                },
            },
            Err(e) => QuizState::SelectingLength {
                error: Some(format!("Failed to generate quiz: {e}")),
            },
        })
    }

    pub fn select_answer(&self, letter: OptionLetter) -> Result<Self, SessionError> {
        match self {
            QuizState::InProgress(session) => Ok(QuizState::InProgress(session.answered(letter))),
            _ => Err(self.invalid("answer")),
        }
    }

    pub fn next_question(&self) -> Result<Self, SessionError> {
        match self {
            QuizState::InProgress(s) => Ok(QuizState::InProgress(s.moved_to(s.current + 1))),
            _ => Err(self.invalid("move to the next question")),
        }
    }

    pub fn previous_question(&self) -> Result<Self, SessionError> {
        match self {
            QuizState::InProgress(s) => {
                Ok(QuizState::InProgress(s.moved_to(s.current.saturating_sub(1))))
            }
            _ => Err(self.invalid("move to the previous question")),
        }
    }

    pub fn submit(&self) -> Result<Self, SessionError> {
        match self {
            QuizState::InProgress(session) => match session.unanswered() {
                0 => Ok(QuizState::Submitted(QuizReport::grade(session.clone()))),
                unanswered => Err(SessionError::Incomplete { unanswered }),
            },
            _ => Err(self.invalid("submit")),
        }
    }

    /// Applies the outcome of the suggestions request. Outcomes arriving after the
    /// user has left the results (retry) are ignored.
    pub fn suggestions_finished<E: fmt::Display>(
        &self,
        outcome: Result<Vec<StudySuggestion>, E>,
    ) -> Self {
        match self {
            QuizState::Submitted(report) if report.needs_suggestions() => {
                let suggestions = match outcome {
                    Ok(list) => Suggestions::Ready(list),
                    Err(e) => {
                        tracing::warn!(error = %e, "study suggestions unavailable");
                        Suggestions::Unavailable
                    }
                };
                QuizState::Submitted(QuizReport {
                    suggestions,
                    ..report.clone()
                })
            }
            _ => {
                tracing::debug!(phase = self.phase(), "ignoring late study suggestions");
                self.clone()
            }
        }
    }

    /// Discards questions, answers, position and suggestions.
    pub fn retry(&self) -> Result<Self, SessionError> {
        match self {
            QuizState::InProgress(_) | QuizState::Submitted(_) => Ok(QuizState::default()),
            _ => Err(self.invalid("retry")),
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            QuizState::SelectingLength { error } => error.as_deref(),
            _ => None,
        }
    }
}
