//! Line-oriented front-end. It only triggers state transitions and re-renders
//! from the state they return; no view state outlives its page.

use std::io::Write;
use std::path::Path;

use maxwell_common::openai::ChatClientError;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::task::{JoinError, JoinHandle};
use tracing::warn;

use crate::analyzer::{Analyzer, AnalyzerState, CircuitImage};
use crate::extract::{AnalysisResult, OptionLetter, StudySuggestion};
use crate::math::{self, TerminalTypesetter, Typesetter};
use crate::session::{QuizLength, QuizReport, QuizSession, QuizState, Suggestions};
use crate::study::StudyBuddy;
use crate::view::{Destination, Page};

type SuggestionOutcome = Result<Vec<StudySuggestion>, ChatClientError>;
type SuggestionTask = JoinHandle<SuggestionOutcome>;

enum ResultsEvent {
    Suggestions(Result<Vec<StudySuggestion>, String>),
    /// `None` at end of input.
    Command(Option<String>),
}

fn join_outcome(
    joined: Result<SuggestionOutcome, JoinError>,
) -> Result<Vec<StudySuggestion>, String> {
    match joined {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(e) => {
            warn!(error = %e, "suggestions task failed");
            Err(e.to_string())
        }
    }
}

pub struct Terminal<R, W> {
    analyzer: Analyzer,
    study: StudyBuddy,
    typesetter: Option<TerminalTypesetter>,
    input: Lines<R>,
    out: W,
    suggestions_task: Option<SuggestionTask>,
}

impl<R, W> Terminal<R, W>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    pub fn new(analyzer: Analyzer, study: StudyBuddy, input: R, out: W) -> Self {
        Self {
            analyzer,
            study,
            typesetter: Some(TerminalTypesetter),
            input: input.lines(),
            out,
            suggestions_task: None,
        }
    }

    /// Show model math as raw TeX instead of typesetting it.
    pub fn without_math(mut self) -> Self {
        self.typesetter = None;
        self
    }

    /// Runs until the user quits or input ends, then hands back the writer.
    pub async fn run(mut self) -> anyhow::Result<W> {
        let mut page = Page::default();
        loop {
            let next = match page {
                Page::Landing => self.landing().await?,
                Page::CircuitAnalyzer(state) => self.analyzer_page(state).await?,
                Page::StudyBuddy(state) => self.study_page(state).await?,
            };
            match next {
                Some(p) => page = p,
                None => break,
            }
        }
        writeln!(self.out, "Goodbye.")?;
        Ok(self.out)
    }

    async fn prompt(&mut self) -> anyhow::Result<Option<String>> {
        write!(self.out, "> ")?;
        self.out.flush()?;
        Ok(self.input.next_line().await?.map(|l| l.trim().to_string()))
    }

    fn render(&self, text: &str) -> String {
        let typesetter = self.typesetter.as_ref().map(|t| t as &dyn Typesetter);
        math::render_to_string(text, typesetter)
    }

    async fn landing(&mut self) -> anyhow::Result<Option<Page>> {
        writeln!(self.out, "\nMaxwell - Your Circuitry Companion")?;
        writeln!(self.out, "  1) Circuit Analyzer")?;
        writeln!(self.out, "  2) Study Buddy")?;
        writeln!(self.out, "  q) Quit")?;
        let Some(choice) = self.prompt().await? else {
            return Ok(None);
        };
        Ok(match choice.as_str() {
            "1" => Some(Page::Landing.navigate(Destination::CircuitAnalyzer)),
            "2" => Some(Page::Landing.navigate(Destination::StudyBuddy)),
            "q" => None,
            other => {
                writeln!(self.out, "Unknown choice: {other}")?;
                Some(Page::Landing)
            }
        })
    }

    async fn analyzer_page(&mut self, mut state: AnalyzerState) -> anyhow::Result<Option<Page>> {
        if let Some(err) = state.error() {
            writeln!(self.out, "! {err}")?;
            state = state.dismiss_error();
        }
        match state.image() {
            Some(image) => writeln!(
                self.out,
                "\nCircuit Analyzer - image loaded ({} bytes, {})",
                image.len(),
                image.media_type()
            )?,
            None => writeln!(self.out, "\nCircuit Analyzer - no image selected")?,
        }
        writeln!(self.out, "  image <path>  select a circuit diagram")?;
        writeln!(self.out, "  analyze       send it for analysis")?;
        writeln!(self.out, "  h             back to home")?;

        let Some(line) = self.prompt().await? else {
            return Ok(None);
        };
        let (command, arg) = line.split_once(' ').unwrap_or((line.as_str(), ""));
        let next = match command {
            "image" => match CircuitImage::load(Path::new(arg.trim())).await {
                Ok(image) => state.select_image(image),
                Err(e) => {
                    writeln!(self.out, "! Could not read {}: {e}", arg.trim())?;
                    state
                }
            },
            "analyze" => {
                if state.can_analyze() {
                    writeln!(self.out, "Analyzing...")?;
                }
                match self.analyzer.analyze(&state).await {
                    Ok(done) => {
                        if let Some(result) = done.result() {
                            self.show_analysis(result)?;
                        }
                        done
                    }
                    Err(e) => {
                        writeln!(self.out, "! {e}")?;
                        state
                    }
                }
            }
            "h" => return Ok(Some(Page::CircuitAnalyzer(state).navigate(Destination::Home))),
            other => {
                writeln!(self.out, "Unknown command: {other}")?;
                state
            }
        };
        Ok(Some(Page::CircuitAnalyzer(next)))
    }

    fn show_analysis(&mut self, result: &AnalysisResult) -> anyhow::Result<()> {
        let summary = self.render(&result.summary);
        let details = self.render(&result.full_text);
        writeln!(self.out, "\nSimplified Circuit\n  {summary}")?;
        if !result.fields.is_empty() {
            let kind = if result.fields.is_ac() { "AC" } else { "DC" };
            writeln!(self.out, "\nCircuit Values ({kind})")?;
            for (quantity, value) in result.fields.present() {
                writeln!(self.out, "  {quantity}: {value}")?;
            }
        }
        writeln!(self.out, "\nDetailed Analysis\n{details}")?;
        Ok(())
    }

    async fn study_page(&mut self, state: QuizState) -> anyhow::Result<Option<Page>> {
        let state = self.collect_finished_suggestions(state).await;
        match state {
            QuizState::SelectingLength { .. } => self.length_menu(state).await,
            QuizState::Generating { .. } => {
                writeln!(self.out, "Generating your quiz...")?;
                let next = self.study.generate(&state).await?;
                Ok(Some(Page::StudyBuddy(next)))
            }
            QuizState::InProgress(ref session) => {
                let session = session.clone();
                self.question_view(state, &session).await
            }
            QuizState::Submitted(_) => self.results_view(state).await,
        }
    }

    async fn length_menu(&mut self, state: QuizState) -> anyhow::Result<Option<Page>> {
        if let Some(err) = state.error() {
            writeln!(self.out, "! {err}")?;
        }
        writeln!(self.out, "\nStudy Buddy - choose a quiz length")?;
        for length in QuizLength::MENU {
            writeln!(self.out, "  {}) {length}", length.count())?;
        }
        writeln!(self.out, "  h) back to home")?;

        let Some(choice) = self.prompt().await? else {
            return Ok(None);
        };
        if choice == "h" {
            return Ok(Some(Page::StudyBuddy(state).navigate(Destination::Home)));
        }
        let length = choice.parse::<usize>().ok().and_then(QuizLength::from_count);
        let next = match length {
            Some(length) => QuizState::new().choose_length(length)?,
            None => {
                writeln!(self.out, "Pick 5, 10 or 25.")?;
                state
            }
        };
        Ok(Some(Page::StudyBuddy(next)))
    }

    async fn question_view(
        &mut self,
        state: QuizState,
        session: &QuizSession,
    ) -> anyhow::Result<Option<Page>> {
        let question = session.current_question();
        let chosen = session.answer_for(question.id);
        writeln!(
            self.out,
            "\nQuestion {} of {}",
            session.current_index() + 1,
            session.len()
        )?;
        let text = self.render(&question.question);
        writeln!(self.out, "{text}")?;
        for option in &question.options {
            let marker = if chosen == Some(option.letter) { "*" } else { " " };
            let text = self.render(&option.text);
            writeln!(self.out, " {marker} {}) {text}", option.letter)?;
        }
        if session.is_last() && !session.all_answered() {
            writeln!(self.out, "Please answer all questions before submitting")?;
        }
        writeln!(self.out, "  a-d answer | n next | p previous | s submit | x exit quiz")?;

        let Some(cmd) = self.prompt().await? else {
            return Ok(None);
        };
        let transition = match cmd.as_str() {
            "n" => state.next_question(),
            "p" => state.previous_question(),
            "s" => state.submit(),
            "x" => state.retry(),
            other => match other.parse::<OptionLetter>() {
                Ok(letter) => state.select_answer(letter),
                Err(_) => {
                    writeln!(self.out, "Unknown command: {other}")?;
                    Ok(state.clone())
                }
            },
        };
        let next = match transition {
            Ok(next) => next,
            Err(e) => {
                writeln!(self.out, "! {e}")?;
                state
            }
        };
        if let QuizState::Submitted(report) = &next {
            self.spawn_suggestions(report);
        }
        Ok(Some(Page::StudyBuddy(next)))
    }

    /// The suggestions request runs on its own task so the score is never held up
    /// by it.
    fn spawn_suggestions(&mut self, report: &QuizReport) {
        // A request still out for an earlier attempt is detached, not cancelled.
        self.suggestions_task = None;
        if !report.needs_suggestions() {
            return;
        }
        let study = self.study.clone();
        let report = report.clone();
        self.suggestions_task = Some(tokio::spawn(async move { study.suggestions(&report).await }));
    }

    async fn results_view(&mut self, state: QuizState) -> anyhow::Result<Option<Page>> {
        // An already-answered suggestions request lands before the first render.
        tokio::task::yield_now().await;
        let mut state = self.collect_finished_suggestions(state).await;
        if let QuizState::Submitted(report) = &state {
            self.show_report(report)?;
        }

        loop {
            if self.suggestions_task.is_some() {
                writeln!(self.out, "\nLoading study suggestions...")?;
            }
            writeln!(self.out, "\n  r) take another quiz | h) back to home")?;
            write!(self.out, "> ")?;
            self.out.flush()?;

            let event = match self.suggestions_task.as_mut() {
                Some(task) => tokio::select! {
                    biased;
                    joined = task => ResultsEvent::Suggestions(join_outcome(joined)),
                    line = self.input.next_line() => ResultsEvent::Command(line?),
                },
                None => ResultsEvent::Command(self.input.next_line().await?),
            };

            match event {
                ResultsEvent::Suggestions(outcome) => {
                    self.suggestions_task = None;
                    state = state.suggestions_finished(outcome);
                    writeln!(self.out)?;
                    if let QuizState::Submitted(report) = &state {
                        self.show_suggestions(report.suggestions())?;
                    }
                }
                ResultsEvent::Command(None) => return Ok(None),
                ResultsEvent::Command(Some(cmd)) => match cmd.trim() {
                    "r" => return Ok(Some(Page::StudyBuddy(state.retry()?))),
                    "h" => return Ok(Some(Page::StudyBuddy(state).navigate(Destination::Home))),
                    other => writeln!(self.out, "Unknown command: {other}")?,
                },
            }
        }
    }

    fn show_report(&mut self, report: &QuizReport) -> anyhow::Result<()> {
        writeln!(self.out, "\nQuiz Results: {}%", report.percentage())?;
        writeln!(
            self.out,
            "You got {} out of {} questions correct",
            report.score(),
            report.total()
        )?;

        for (idx, review) in report.reviews().into_iter().enumerate() {
            let mark = if review.correct { "✓" } else { "✗" };
            let text = self.render(&review.question.question);
            writeln!(self.out, "\n{mark} Question {}: {text}", idx + 1)?;
            for option in &review.question.options {
                let note = if option.letter == review.question.correct {
                    " ✓ Correct Answer"
                } else if Some(option.letter) == review.chosen {
                    " ✗ Your Answer"
                } else {
                    ""
                };
                let text = self.render(&option.text);
                writeln!(self.out, "    {}) {text}{note}", option.letter)?;
            }
            let explanation = self.render(&review.question.explanation);
            writeln!(self.out, "    Explanation: {explanation}")?;
        }
        self.show_suggestions(report.suggestions())
    }

    /// Applies a suggestions outcome that has already arrived. Leaving the results
    /// page does not cancel the request; when it lands on any other quiz phase the
    /// state machine discards it.
    async fn collect_finished_suggestions(&mut self, state: QuizState) -> QuizState {
        match self.suggestions_task.take() {
            Some(task) if task.is_finished() => state.suggestions_finished(join_outcome(task.await)),
            pending => {
                self.suggestions_task = pending;
                state
            }
        }
    }

    fn show_suggestions(&mut self, suggestions: &Suggestions) -> anyhow::Result<()> {
        let Suggestions::Ready(list) = suggestions else {
            return Ok(());
        };
        if list.is_empty() {
            return Ok(());
        }
        writeln!(self.out, "\nStudy Suggestions")?;
        writeln!(
            self.out,
            "Based on the questions you missed, here are some topics to focus on:"
        )?;
        for (idx, s) in list.iter().enumerate() {
            writeln!(self.out, "  {}. {}", idx + 1, s.topic)?;
            if !s.focus.is_empty() {
                let focus = self.render(&s.focus);
                writeln!(self.out, "     Focus: {focus}")?;
            }
            if !s.why.is_empty() {
                let why = self.render(&s.why);
                writeln!(self.out, "     Why: {why}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use maxwell_common::openai::{ChatCompletionRequest, ChatModel};
    use std::io::Cursor;

    struct Scripted(Mutex<Vec<Result<String, ChatClientError>>>);

    #[async_trait]
    impl ChatModel for Scripted {
        async fn complete(&self, _: ChatCompletionRequest) -> Result<String, ChatClientError> {
            self.0.lock().unwrap().remove(0)
        }
    }

    fn terminal(
        replies: Vec<Result<String, ChatClientError>>,
        input: impl Into<String>,
    ) -> Terminal<Cursor<Vec<u8>>, Vec<u8>> {
        let model: Arc<dyn ChatModel> = Arc::new(Scripted(Mutex::new(replies)));
        Terminal::new(
            Analyzer::new(model.clone(), "m"),
            StudyBuddy::new(model, "m"),
            Cursor::new(input.into().into_bytes()),
            Vec::new(),
        )
    }

    const QUIZ: &str = "QUESTION 1: Unit of resistance?\nA) Volt\nB) Ohm\nC) Amp\nD) Watt\nCORRECT: B\nEXPLANATION: Ohms, $\\Omega$.\n\
QUESTION 2: Ohm's law?\nA) $V = IR$\nB) $P = t$\nC) $f = T$\nD) $L = C$\nCORRECT: A\nEXPLANATION: Basic.\n";

    #[tokio::test]
    async fn quiz_round_trip() {
        let t = terminal(
            vec![
                Ok(QUIZ.to_string()),
                Ok("TOPIC: Ohm's law\nFOCUS: $V = IR$\nWHY: It is everywhere".to_string()),
            ],
            "2\n5\nb\ns\nn\nb\ns\nh\nq\n",
        );
        let out = String::from_utf8(t.run().await.unwrap()).unwrap();

        assert!(out.contains("Question 1 of 2"));
        assert!(out.contains("! Please answer all questions before submitting (1 unanswered)"));
        assert!(out.contains("Quiz Results: 50%"));
        assert!(out.contains("You got 1 out of 2 questions correct"));
        assert!(out.contains("A) V = IR ✓ Correct Answer"));
        assert!(out.contains("Explanation: Ohms, Ω."));
        assert!(out.contains("1. Ohm's law"));
        assert!(out.contains("Focus: V = IR"));
        assert!(out.ends_with("Goodbye.\n"));
    }

    /// Answers the first call with a quiz and never answers anything after it.
    struct StallsAfterQuiz(AtomicUsize);

    #[async_trait]
    impl ChatModel for StallsAfterQuiz {
        async fn complete(&self, _: ChatCompletionRequest) -> Result<String, ChatClientError> {
            if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                return Ok(QUIZ.to_string());
            }
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn retry_does_not_wait_for_suggestions() {
        let model: Arc<dyn ChatModel> = Arc::new(StallsAfterQuiz(AtomicUsize::new(0)));
        let t = Terminal::new(
            Analyzer::new(model.clone(), "m"),
            StudyBuddy::new(model, "m"),
            Cursor::new(b"2\n5\na\nn\na\ns\nr\nh\nq\n".to_vec()),
            Vec::new(),
        );

        let out = tokio::time::timeout(Duration::from_secs(3), t.run())
            .await
            .expect("terminal stalled on the suggestions request")
            .unwrap();
        let out = String::from_utf8(out).unwrap();

        assert!(out.contains("Quiz Results: 50%"));
        assert!(out.contains("Loading study suggestions..."));
        assert!(!out.contains("Study Suggestions"));
        assert_eq!(out.matches("choose a quiz length").count(), 2);
        assert!(out.ends_with("Goodbye.\n"));
    }

    #[tokio::test]
    async fn failed_generation_shows_alert_and_menu_again() {
        let t = terminal(vec![Err(ChatClientError::EmptyCompletion)], "2\n10\nh\nq\n");
        let out = String::from_utf8(t.run().await.unwrap()).unwrap();
        assert!(out.contains("! Failed to generate quiz: No content in API response"));
        assert_eq!(out.matches("choose a quiz length").count(), 2);
    }

    #[tokio::test]
    async fn analyze_without_image_is_refused() {
        let t = terminal(vec![], "1\nanalyze\nh\nq\n");
        let out = String::from_utf8(t.run().await.unwrap()).unwrap();
        assert!(out.contains("! Please select an image first"));
    }

    #[tokio::test]
    async fn analyzer_shows_extracted_values() {
        let path = std::env::temp_dir().join(format!("maxwell-test-{}.png", std::process::id()));
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();
        let input = format!("1\nimage {}\nanalyze\nh\nq\n", path.display());
        let t = terminal(
            vec![Ok("A simple loop.\nVoltage: 9V\nCurrent: 3 mA\n$$I = \\frac{V}{R}$$".to_string())],
            input,
        )
        .without_math();
        let out = String::from_utf8(t.run().await.unwrap()).unwrap();
        let _ = std::fs::remove_file(&path);

        assert!(out.contains("image loaded (4 bytes, image/png)"));
        assert!(out.contains("Circuit Values (DC)"));
        assert!(out.contains("Voltage: 9V"));
        assert!(out.contains("Current: 3 mA"));
        assert!(out.contains("$$I = \\frac{V}{R}$$"));
    }

    #[tokio::test]
    async fn end_of_input_quits() {
        let t = terminal(vec![], "");
        let out = String::from_utf8(t.run().await.unwrap()).unwrap();
        assert!(out.ends_with("Goodbye.\n"));
    }
}
