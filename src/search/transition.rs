use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::prompts::FINAL_ANSWER_MARKER;
use crate::tools::sanitize;

/// What a node did to come into existence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transition {
    /// Invoke a tool with raw, unsanitized input
    Act { tool: String, tool_input: String },
    /// Give a final answer
    Finish { return_value: String },
    /// Oracle output that could not be interpreted
    #[default]
    None,
}

/// Canonical identity of a parsed candidate within one expansion.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    Finish(String),
    Act(String, String),
}

fn action_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)Action\s*\d*\s*:[\s]*(.*?)[\s]*Action\s*\d*\s*Input\s*\d*\s*:[\s]*(.*)")
            .expect("action pattern is valid")
    })
}

fn action_only_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)Action\s*\d*\s*:[\s]*(.*?)").expect("action pattern is valid"))
}

fn action_input_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)[\s]*Action\s*\d*\s*Input\s*\d*\s*:[\s]*(.*)")
            .expect("action input pattern is valid")
    })
}

impl Transition {
    /// Parse oracle output written in the ReAct action grammar.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let includes_answer = text.contains(FINAL_ANSWER_MARKER);

        if let Some(caps) = action_regex().captures(text) {
            if includes_answer {
                return Err(ParseError::BothActionAndAnswer);
            }
            let tool = caps.get(1).map_or("", |m| m.as_str()).trim().to_string();
            let tool_input = caps
                .get(2)
                .map_or("", |m| m.as_str())
                .trim()
                .trim_matches('"')
                .to_string();
            return Ok(Transition::Act { tool, tool_input });
        }

        if includes_answer {
            let return_value = text
                .rsplit(FINAL_ANSWER_MARKER)
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();
            return Ok(Transition::Finish { return_value });
        }

        if !action_only_regex().is_match(text) {
            Err(ParseError::MissingAction)
        } else if !action_input_regex().is_match(text) {
            Err(ParseError::MissingActionInput)
        } else {
            Err(ParseError::Unparseable {
                output: text.to_string(),
            })
        }
    }

    /// Key used to drop duplicate candidates. `None` transitions have no key.
    pub fn dedup_key(&self) -> Option<DedupKey> {
        match self {
            Transition::Act { tool, tool_input } => {
                Some(DedupKey::Act(tool.trim().to_string(), sanitize(tool_input)))
            }
            Transition::Finish { return_value } => Some(DedupKey::Finish(return_value.clone())),
            Transition::None => None,
        }
    }

    /// Whether this is a tool call
    pub fn is_act(&self) -> bool {
        matches!(self, Transition::Act { .. })
    }

    /// Whether this is a final answer
    pub fn is_finish(&self) -> bool {
        matches!(self, Transition::Finish { .. })
    }

    /// Whether parsing failed
    pub fn is_none(&self) -> bool {
        matches!(self, Transition::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_action() {
        let text = "Thought1: I should locate it\nAction1: geocode\nAction Input1: \"Eiffel Tower\"\n";
        assert_eq!(
            Transition::parse(text).unwrap(),
            Transition::Act {
                tool: "geocode".to_string(),
                tool_input: "Eiffel Tower".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_action_without_step_numbers() {
        let text = "Action: search\nAction Input: a, b";
        assert_eq!(
            Transition::parse(text).unwrap(),
            Transition::Act {
                tool: "search".to_string(),
                tool_input: "a, b".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_final_answer_takes_last_marker() {
        let text = "Thought: done\nFinal Answer: first\nFinal Answer:  Paris ";
        assert_eq!(
            Transition::parse(text).unwrap(),
            Transition::Finish {
                return_value: "Paris".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_both_is_error() {
        let text = "Action: search\nAction Input: x\nFinal Answer: y";
        assert_eq!(
            Transition::parse(text).unwrap_err(),
            ParseError::BothActionAndAnswer
        );
    }

    #[test]
    fn test_parse_missing_pieces() {
        assert_eq!(
            Transition::parse("I am thinking").unwrap_err(),
            ParseError::MissingAction
        );
        assert_eq!(
            Transition::parse("Action: search").unwrap_err(),
            ParseError::MissingActionInput
        );
    }

    #[test]
    fn test_dedup_key_sanitizes_arguments() {
        let a = Transition::Act {
            tool: "search".to_string(),
            tool_input: "Paris\n".to_string(),
        };
        let b = Transition::Act {
            tool: "search ".to_string(),
            tool_input: "\"Paris\"".to_string(),
        };
        assert_eq!(a.dedup_key(), b.dedup_key());
        assert!(Transition::None.dedup_key().is_none());
    }

    #[test]
    fn test_serde_tagging() {
        let json = serde_json::to_value(Transition::Finish {
            return_value: "x".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "finish");
        assert_eq!(json["return_value"], "x");

        let none: Transition = serde_json::from_str(r#"{"type":"none"}"#).unwrap();
        assert!(none.is_none());
    }
}
