//! The three fixed model request templates.
//!
//! The quiz and suggestion instructions pin down the exact text layout the
//! extractors in [`crate::extract`] expect, so the two must change together.

use maxwell_common::openai::{ChatCompletionRequest, ContentPart, ImageUrl, Message};

use crate::analyzer::CircuitImage;
use crate::extract::QuizQuestion;
use crate::session::QuizLength;

pub const DEFAULT_MODEL: &str = "nvidia/nemotron-nano-12b-v2-vl";

const ANALYSIS_INSTRUCTION: &str = "Analyze this circuit diagram completely. \
First, give a brief simplified description of the circuit (for example \"This is a circuit with a 12V battery \
and equivalent resistance of 300Ω in series\"). Then give a detailed analysis including: \
1) Total equivalent resistance (Req), 2) Voltage, 3) Current, \
4) For AC circuits: impedance, average power, and frequency, \
5) A complete mathematical explanation showing all work and formulas used. \
Use LaTeX for mathematical expressions: $ for inline math like $V = IR$ and $$ for display math like $$R_{eq} = R_1 + R_2$$.";

pub fn analysis_request(model: &str, image: &CircuitImage) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: model.to_string(),
        messages: vec![Message::user_parts(vec![
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: image.data_uri(),
                },
            },
            ContentPart::Text {
                text: ANALYSIS_INSTRUCTION.to_string(),
            },
        ])],
        max_tokens: Some(2048),
        temperature: Some(0.2),
        stream: Some(false),
    }
}

pub fn quiz_request(model: &str, length: QuizLength) -> ChatCompletionRequest {
    let n = length.count();
    let instruction = format!(
        "Generate exactly {n} multiple choice questions about circuit theory. Topics should include: \
Ohm's Law, series and parallel circuits, Kirchhoff's laws, AC/DC circuits, capacitors, inductors, \
resistors, power calculations, and circuit analysis.\n\n\
For each question, provide:\n\
1. The question text\n\
2. Four answer options (A, B, C, D)\n\
3. The correct answer letter\n\
4. A detailed explanation of why the correct answer is right and why the other answers are wrong\n\n\
Format your response EXACTLY like this:\n\n\
QUESTION 1: [question text]\n\
A) [option A]\n\
B) [option B]\n\
C) [option C]\n\
D) [option D]\n\
CORRECT: [letter]\n\
EXPLANATION: [detailed explanation]\n\n\
QUESTION 2: [question text]\n\
...and so on."
    );
    ChatCompletionRequest {
        model: model.to_string(),
        messages: vec![Message::user_text(instruction)],
        max_tokens: Some(4096),
        temperature: Some(0.7),
        stream: Some(false),
    }
}

pub fn suggestions_request(model: &str, missed: &[&QuizQuestion]) -> ChatCompletionRequest {
    let listed = missed
        .iter()
        .enumerate()
        .map(|(i, q)| format!("{}. {}", i + 1, q.question))
        .collect::<Vec<_>>()
        .join("\n");
    let instruction = format!(
        "Based on these circuit theory questions that a student got wrong:\n\n\
{listed}\n\n\
Analyze the common themes and knowledge gaps, then provide 3-5 specific study recommendations. \
For each recommendation, include:\n\
1. The topic name\n\
2. A brief description of what to focus on\n\
3. Why it's important for understanding circuits\n\n\
Format as:\n\
TOPIC: [topic name]\n\
FOCUS: [what to study]\n\
WHY: [importance]\n\n\
Keep recommendations concise and actionable."
    );
    ChatCompletionRequest {
        model: model.to_string(),
        messages: vec![Message::user_text(instruction)],
        max_tokens: Some(1024),
        temperature: Some(0.5),
        stream: Some(false),
    }
}
