use crate::analyzer::AnalyzerState;
use crate::session::QuizState;

/// Where the user can navigate to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Home,
    CircuitAnalyzer,
    StudyBuddy,
}

impl Destination {
    pub fn route(self) -> &'static str {
        match self {
            Destination::Home => "home",
            Destination::CircuitAnalyzer => "circuit-analyzer",
            Destination::StudyBuddy => "study-buddy",
        }
    }
}

/// The current page and the state it owns. Leaving a page drops its state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Page {
    #[default]
    Landing,
    CircuitAnalyzer(AnalyzerState),
    StudyBuddy(QuizState),
}

impl Page {
    pub fn destination(&self) -> Destination {
        match self {
            Page::Landing => Destination::Home,
            Page::CircuitAnalyzer(_) => Destination::CircuitAnalyzer,
            Page::StudyBuddy(_) => Destination::StudyBuddy,
        }
    }

    /// Navigating always builds fresh state for the target page, even when the
    /// target is the current page.
    pub fn navigate(self, to: Destination) -> Page {
        tracing::debug!(from = self.destination().route(), to = to.route(), "navigate");
        match to {
            Destination::Home => Page::Landing,
            Destination::CircuitAnalyzer => Page::CircuitAnalyzer(AnalyzerState::new()),
            Destination::StudyBuddy => Page::StudyBuddy(QuizState::new()),
        }
    }
}
