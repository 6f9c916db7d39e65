//! Best-effort extraction of structured values from free-text model output.
//!
//! The model's output format is not contractually fixed, so nothing here fails:
//! a value that cannot be located is simply absent, and a malformed block is
//! dropped. Callers decide whether "nothing found" is an error for them.

pub mod circuit;
pub mod quiz;
pub mod suggestions;

pub use circuit::{AnalysisResult, CircuitExtractor};
pub use quiz::{OptionLetter, QuizExtractor, QuizQuestion};
pub use suggestions::{StudySuggestion, SuggestionExtractor};

/// `text -> partial structured result`. Implementations must never panic on
/// arbitrary input.
pub trait ResponseExtractor {
    type Output;

    fn extract(&self, text: &str) -> Self::Output;
}
