use std::sync::Arc;

use maxwell_common::openai::{ChatClientError, ChatModel};
use tracing::{info, warn};

use crate::extract::{QuizExtractor, ResponseExtractor, StudySuggestion, SuggestionExtractor};
use crate::prompts;
use crate::session::{QuizReport, QuizState, SessionError};

/// Issues the Study Buddy's model calls and feeds the outcomes back into
/// [`QuizState`] transitions.
#[derive(Clone)]
pub struct StudyBuddy {
    model: Arc<dyn ChatModel>,
    model_id: String,
}

impl StudyBuddy {
    pub fn new(model: Arc<dyn ChatModel>, model_id: impl Into<String>) -> Self {
        Self {
            model,
            model_id: model_id.into(),
        }
    }

    /// Runs the quiz request for a `Generating` state. Failures land the machine
    /// back in `SelectingLength` with the error attached, never in an `Err`.
    pub async fn generate(&self, state: &QuizState) -> Result<QuizState, SessionError> {
        let QuizState::Generating { length } = state else {
            return Err(state.invalid("generate a quiz"));
        };
        info!(questions = length.count(), "generating quiz");

        let outcome = self
            .model
            .complete(prompts::quiz_request(&self.model_id, *length))
            .await
            .map(|text| QuizExtractor.extract(&text))
            .inspect_err(|e| warn!(error = %e, "quiz generation failed"));

        if let Ok(questions) = &outcome {
            info!(
                requested = length.count(),
                parsed = questions.len(),
                "quiz parsed"
            );
        }
        state.generation_finished(outcome)
    }

    /// Asks for study suggestions covering the missed questions. Returns an empty
    /// list without calling the model when nothing was missed.
    pub async fn suggestions(
        &self,
        report: &QuizReport,
    ) -> Result<Vec<StudySuggestion>, ChatClientError> {
        let missed = report.missed();
        if missed.is_empty() {
            return Ok(Vec::new());
        }
        info!(missed = missed.len(), "requesting study suggestions");
        let text = self
            .model
            .complete(prompts::suggestions_request(&self.model_id, &missed))
            .await?;
        Ok(SuggestionExtractor.extract(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;
    use maxwell_common::openai::{ChatCompletionRequest, MessageContent};

    use crate::extract::OptionLetter;
    use crate::session::{QuizLength, Suggestions};

    struct Scripted {
        replies: Mutex<Vec<Result<String, ChatClientError>>>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatModel for Scripted {
        async fn complete(&self, request: ChatCompletionRequest) -> Result<String, ChatClientError> {
            if let MessageContent::Text(t) = &request.messages[0].content {
                self.prompts.lock().unwrap().push(t.clone());
            }
            self.replies.lock().unwrap().remove(0)
        }
    }

    fn scripted(replies: Vec<Result<String, ChatClientError>>) -> Arc<Scripted> {
        Arc::new(Scripted {
            replies: Mutex::new(replies),
            prompts: Mutex::default(),
        })
    }

    const TWO_QUESTIONS: &str = "QUESTION 1: What is the unit of resistance?\n\
A) Volt\nB) Ohm\nC) Ampere\nD) Watt\nCORRECT: B\nEXPLANATION: Resistance is measured in ohms.\n\n\
QUESTION 2: Ohm's law relates?\n\
A) V, I and R\nB) P and t\nC) f and T\nD) L and C\nCORRECT: A\nEXPLANATION: $V = IR$.\n";

    #[tokio::test]
    async fn generate_parses_questions_into_a_session() {
        let model = scripted(vec![Ok(TWO_QUESTIONS.to_string())]);
        let buddy = StudyBuddy::new(model.clone(), "m");
        let generating = QuizState::new().choose_length(QuizLength::Five).unwrap();

        let state = buddy.generate(&generating).await.unwrap();
        let QuizState::InProgress(session) = &state else {
            panic!("expected a running quiz, got {}", state.phase());
        };
        assert_eq!(session.len(), 2);
        assert_eq!(session.current_question().correct, OptionLetter::B);
        assert!(model.prompts.lock().unwrap()[0].starts_with("Generate exactly 5 "));
    }

    #[tokio::test]
    async fn generate_failure_is_recoverable() {
        let model = scripted(vec![Err(ChatClientError::EmptyCompletion)]);
        let buddy = StudyBuddy::new(model, "m");
        let generating = QuizState::new().choose_length(QuizLength::Ten).unwrap();

        let state = buddy.generate(&generating).await.unwrap();
        assert!(state.error().unwrap().contains("No content in API response"));
        assert!(state.choose_length(QuizLength::Ten).is_ok());
    }

    #[tokio::test]
    async fn unparseable_reply_counts_as_failure() {
        let model = scripted(vec![Ok("Sorry, I cannot help with that.".to_string())]);
        let buddy = StudyBuddy::new(model, "m");
        let generating = QuizState::new().choose_length(QuizLength::Five).unwrap();

        let state = buddy.generate(&generating).await.unwrap();
        assert!(state.error().is_some());
    }

    #[tokio::test]
    async fn suggestions_cover_only_missed_questions() {
        let model = scripted(vec![
            Ok(TWO_QUESTIONS.to_string()),
            Ok("TOPIC: Units\nFOCUS: SI units\nWHY: Everything is measured".to_string()),
        ]);
        let buddy = StudyBuddy::new(model.clone(), "m");
        let state = buddy
            .generate(&QuizState::new().choose_length(QuizLength::Five).unwrap())
            .await
            .unwrap();

        let state = state
            .select_answer(OptionLetter::A)
            .and_then(|s| s.next_question())
            .and_then(|s| s.select_answer(OptionLetter::A))
            .and_then(|s| s.submit())
            .unwrap();
        let QuizState::Submitted(report) = &state else {
            panic!("expected results");
        };
        assert_eq!(report.percentage(), 50);

        let outcome = buddy.suggestions(report).await;
        let state = state.suggestions_finished(outcome);
        let QuizState::Submitted(report) = &state else {
            panic!("expected results");
        };
        match report.suggestions() {
            Suggestions::Ready(list) => {
                assert_eq!(list.len(), 1);
                assert_eq!(list[0].topic, "Units");
            }
            other => panic!("expected suggestions, got {other:?}"),
        }

        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[1].contains("1. What is the unit of resistance?"));
        assert!(!prompts[1].contains("Ohm's law relates?"));
    }
}
