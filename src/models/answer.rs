use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};
use crate::models::question::{QuestionKind, MAX_TEXT_ANSWER_LEN};

/// A recorded answer: an option id for MCQ questions, free text otherwise.
/// Stored as two mutually exclusive columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerPayload {
    Option(i64),
    Text(String),
}

impl AnswerPayload {
    /// Interprets a raw client answer for a question of `kind`.
    pub fn from_raw(kind: QuestionKind, raw: &JsonValue) -> Result<Self> {
        match kind {
            QuestionKind::Mcq => {
                let id = match raw {
                    JsonValue::Number(n) => n.as_i64(),
                    JsonValue::String(s) => s.trim().parse::<i64>().ok(),
                    _ => None,
                };
                id.map(AnswerPayload::Option).ok_or_else(|| {
                    Error::InvalidAnswer(format!(
                        "multiple-choice answers must be an option id, got {}",
                        raw
                    ))
                })
            }
            QuestionKind::Tf | QuestionKind::Fib => {
                let text = match raw {
                    JsonValue::String(s) => s.clone(),
                    JsonValue::Bool(b) => b.to_string(),
                    JsonValue::Number(n) => n.to_string(),
                    other => {
                        return Err(Error::InvalidAnswer(format!(
                            "expected a text answer, got {}",
                            other
                        )))
                    }
                };
                if text.chars().count() > MAX_TEXT_ANSWER_LEN {
                    return Err(Error::InvalidAnswer(format!(
                        "answers are limited to {} characters",
                        MAX_TEXT_ANSWER_LEN
                    )));
                }
                Ok(AnswerPayload::Text(text))
            }
        }
    }

    pub fn from_columns(option_id: Option<i64>, input: Option<String>) -> Option<Self> {
        match (option_id, input) {
            (Some(id), None) => Some(AnswerPayload::Option(id)),
            (None, Some(text)) => Some(AnswerPayload::Text(text)),
            _ => None,
        }
    }

    pub fn option_id(&self) -> Option<i64> {
        match self {
            AnswerPayload::Option(id) => Some(*id),
            AnswerPayload::Text(_) => None,
        }
    }

    pub fn input(&self) -> Option<&str> {
        match self {
            AnswerPayload::Option(_) => None,
            AnswerPayload::Text(text) => Some(text),
        }
    }
}
