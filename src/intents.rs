//! Intent classification surface
//!
//! The engine never classifies anything itself; user events arrive already
//! named (`UserIntent`, `UtteranceUserActionFinished`, ...). This trait is the
//! seam the surrounding application plugs a classifier into. The keyword
//! implementation exists for the demo binary and tests.

use std::collections::BTreeMap;

/// A scored candidate intent.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentMatch {
    pub intent: String,
    pub score: f64,
}

pub trait IntentResolver: Send + Sync {
    /// Rank known intents against a piece of user text.
    fn search(&self, text: &str, max_results: usize) -> Vec<IntentMatch>;

    /// Render the prompt for an out-of-band classification task.
    fn render_task_prompt(&self, task: &str, context: &BTreeMap<String, String>) -> String;

    /// Parse the raw output of a classification task back into an intent name.
    fn parse_task_output(&self, task: &str, raw: &str) -> Option<String>;
}

/// Case-insensitive keyword lookup. One intent per keyword set; score is the
/// fraction of keywords present in the text.
#[derive(Debug, Default)]
pub struct KeywordIntentResolver {
    intents: Vec<(String, Vec<String>)>,
}

impl KeywordIntentResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_intent(&mut self, intent: impl Into<String>, keywords: &[&str]) {
        self.intents.push((
            intent.into(),
            keywords.iter().map(|k| k.to_lowercase()).collect(),
        ));
    }
}

impl IntentResolver for KeywordIntentResolver {
    fn search(&self, text: &str, max_results: usize) -> Vec<IntentMatch> {
        let text = text.to_lowercase();
        let mut matches: Vec<IntentMatch> = self
            .intents
            .iter()
            .filter_map(|(intent, keywords)| {
                if keywords.is_empty() {
                    return None;
                }
                let hits = keywords.iter().filter(|k| text.contains(k.as_str())).count();
                if hits == 0 {
                    return None;
                }
                Some(IntentMatch {
                    intent: intent.clone(),
                    score: hits as f64 / keywords.len() as f64,
                })
            })
            .collect();
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.intent.cmp(&b.intent))
        });
        matches.truncate(max_results);
        matches
    }

    fn render_task_prompt(&self, task: &str, context: &BTreeMap<String, String>) -> String {
        let mut prompt = format!("task: {}\n", task);
        for (key, value) in context {
            prompt.push_str(&format!("{}: {}\n", key, value));
        }
        prompt
    }

    fn parse_task_output(&self, _task: &str, raw: &str) -> Option<String> {
        let name = raw.trim().trim_matches('"');
        if name.is_empty() {
            return None;
        }
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> KeywordIntentResolver {
        let mut r = KeywordIntentResolver::new();
        r.add_intent("greet", &["hi", "hello"]);
        r.add_intent("goodbye", &["bye", "later"]);
        r
    }

    #[test]
    fn test_search_ranks_by_keyword_hits() {
        let r = resolver();
        let matches = r.search("hi there, hello!", 5);
        assert_eq!(matches[0].intent, "greet");
        assert_eq!(matches[0].score, 1.0);
    }

    #[test]
    fn test_search_respects_max_results() {
        let r = resolver();
        let matches = r.search("hi and bye", 1);
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn test_parse_task_output_trims() {
        let r = resolver();
        assert_eq!(r.parse_task_output("classify", "\"greet\"\n"), Some("greet".into()));
        assert_eq!(r.parse_task_output("classify", "   "), None);
    }
}
