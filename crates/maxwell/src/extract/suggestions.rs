use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ResponseExtractor;

const TOPIC: &str = "TOPIC:";
const FOCUS: &str = "FOCUS:";
const WHY: &str = "WHY:";

/// A study recommendation derived from missed quiz questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudySuggestion {
    pub topic: String,
    pub focus: String,
    pub why: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SuggestionExtractor;

impl ResponseExtractor for SuggestionExtractor {
    type Output = Vec<StudySuggestion>;

    fn extract(&self, text: &str) -> Vec<StudySuggestion> {
        parse_suggestions(text)
    }
}

/// Split on `TOPIC:` and read `FOCUS:` / `WHY:` out of each block. Missing focus or
/// why become empty strings; a block without a topic is dropped.
pub fn parse_suggestions(text: &str) -> Vec<StudySuggestion> {
    text.split(TOPIC)
        .skip(1)
        .filter_map(|block| {
            let topic_end = [FOCUS, WHY]
                .iter()
                .filter_map(|m| block.find(m))
                .min()
                .unwrap_or(block.len());
            let topic = clean(&block[..topic_end]);
            if topic.is_empty() {
                debug!("dropping suggestion block without a topic");
                return None;
            }
            Some(StudySuggestion {
                topic,
                focus: section(block, FOCUS, Some(WHY)),
                why: section(block, WHY, None),
            })
        })
        .collect()
}

fn section(block: &str, marker: &str, until: Option<&str>) -> String {
    let Some(start) = block.find(marker).map(|p| p + marker.len()) else {
        return String::new();
    };
    let rest = &block[start..];
    let end = until.and_then(|u| rest.find(u)).unwrap_or(rest.len());
    clean(&rest[..end])
}

/// Models like to bold the markers (`**TOPIC:** ...`); strip the leftover stars.
fn clean(s: &str) -> String {
    s.trim_matches(|c: char| c.is_whitespace() || c == '*').to_string()
}
