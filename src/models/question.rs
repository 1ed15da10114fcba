use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::models::target::{TargetKind, TargetRef};

pub const MIN_MCQ_OPTIONS: usize = 4;
pub const MAX_TEXT_ANSWER_LEN: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Difficulty {
    Easy,
    Normal,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Normal, Difficulty::Hard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "EASY",
            Difficulty::Normal => "NORMAL",
            Difficulty::Hard => "HARD",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EASY" => Ok(Difficulty::Easy),
            "NORMAL" => Ok(Difficulty::Normal),
            "HARD" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum QuestionKind {
    Mcq,
    Tf,
    Fib,
}

impl QuestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::Mcq => "MCQ",
            QuestionKind::Tf => "TF",
            QuestionKind::Fib => "FIB",
        }
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MCQ" => Ok(QuestionKind::Mcq),
            "TF" => Ok(QuestionKind::Tf),
            "FIB" => Ok(QuestionKind::Fib),
            other => Err(other.to_string()),
        }
    }
}

/// Ways a question's correctness payload can disagree with its kind.
///
/// Returned by the constructors when authoring a question, and reported (then
/// degraded to "incorrect") when a stored question is marked.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuestionIntegrityError {
    #[error("question {question_id}: {kind} questions must carry {field}")]
    MissingPayload {
        question_id: i64,
        kind: QuestionKind,
        field: &'static str,
    },

    #[error("question {question_id}: {kind} questions must not carry {field}")]
    ForeignPayload {
        question_id: i64,
        kind: QuestionKind,
        field: &'static str,
    },

    #[error("question {question_id}: MCQ questions need at least {min} options, got {got}")]
    TooFewOptions { question_id: i64, min: usize, got: usize },

    #[error("question {0} has no option flagged correct")]
    NoCorrectOption(i64),

    #[error("question {question_id} has {count} options flagged correct")]
    MultipleCorrectOptions { question_id: i64, count: usize },

    #[error("question {question_id}: correct answer exceeds {max} characters")]
    AnswerTooLong { question_id: i64, max: usize },

    #[error("question {0}: timed-test questions need a difficulty tier")]
    MissingDifficulty(i64),

    #[error("question {0}: question text is empty")]
    EmptyText(i64),

    #[error("question {question_id} has unsupported kind '{kind}'")]
    UnsupportedKind { question_id: i64, kind: String },

    #[error("question {question_id} is malformed: {reason}")]
    Malformed { question_id: i64, reason: String },

    #[error("question {0} is no longer in the question bank")]
    Missing(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: i64,
    pub question_id: i64,
    pub text: String,
    pub is_correct: bool,
}

/// A question from the bank. Build one through `multiple_choice`,
/// `true_false` or `fill_in_blank`; rows loaded from storage are re-checked
/// by [`Question::answer_key`] when marked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub owner: TargetRef,
    pub difficulty: Option<Difficulty>,
    pub kind: QuestionKind,
    pub text: String,
    pub is_true: Option<bool>,
    pub correct_answer: Option<String>,
    pub options: Vec<QuestionOption>,
    pub is_active: bool,
}

/// The single correctness rule a question resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerKey<'a> {
    Choice(i64),
    Truth(bool),
    Blank(&'a str),
}

pub struct NewOption {
    pub id: i64,
    pub text: String,
    pub is_correct: bool,
}

impl NewOption {
    pub fn new(id: i64, text: impl Into<String>, is_correct: bool) -> Self {
        Self {
            id,
            text: text.into(),
            is_correct,
        }
    }
}

impl Question {
    pub fn multiple_choice(
        id: i64,
        owner: TargetRef,
        difficulty: Option<Difficulty>,
        text: impl Into<String>,
        options: Vec<NewOption>,
    ) -> Result<Self, QuestionIntegrityError> {
        if options.len() < MIN_MCQ_OPTIONS {
            return Err(QuestionIntegrityError::TooFewOptions {
                question_id: id,
                min: MIN_MCQ_OPTIONS,
                got: options.len(),
            });
        }
        let options = options
            .into_iter()
            .map(|o| QuestionOption {
                id: o.id,
                question_id: id,
                text: o.text,
                is_correct: o.is_correct,
            })
            .collect();
        Self::build(id, owner, difficulty, QuestionKind::Mcq, text.into(), None, None, options)
    }

    pub fn true_false(
        id: i64,
        owner: TargetRef,
        difficulty: Option<Difficulty>,
        text: impl Into<String>,
        is_true: bool,
    ) -> Result<Self, QuestionIntegrityError> {
        Self::build(
            id,
            owner,
            difficulty,
            QuestionKind::Tf,
            text.into(),
            Some(is_true),
            None,
            Vec::new(),
        )
    }

    pub fn fill_in_blank(
        id: i64,
        owner: TargetRef,
        difficulty: Option<Difficulty>,
        text: impl Into<String>,
        correct_answer: impl Into<String>,
    ) -> Result<Self, QuestionIntegrityError> {
        let correct_answer = correct_answer.into();
        if correct_answer.trim().is_empty() {
            return Err(QuestionIntegrityError::MissingPayload {
                question_id: id,
                kind: QuestionKind::Fib,
                field: "a correct answer",
            });
        }
        if correct_answer.chars().count() > MAX_TEXT_ANSWER_LEN {
            return Err(QuestionIntegrityError::AnswerTooLong {
                question_id: id,
                max: MAX_TEXT_ANSWER_LEN,
            });
        }
        Self::build(
            id,
            owner,
            difficulty,
            QuestionKind::Fib,
            text.into(),
            None,
            Some(correct_answer),
            Vec::new(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        id: i64,
        owner: TargetRef,
        difficulty: Option<Difficulty>,
        kind: QuestionKind,
        text: String,
        is_true: Option<bool>,
        correct_answer: Option<String>,
        options: Vec<QuestionOption>,
    ) -> Result<Self, QuestionIntegrityError> {
        if text.trim().is_empty() {
            return Err(QuestionIntegrityError::EmptyText(id));
        }
        if owner.kind == TargetKind::Test && difficulty.is_none() {
            return Err(QuestionIntegrityError::MissingDifficulty(id));
        }
        let question = Self {
            id,
            owner,
            difficulty,
            kind,
            text,
            is_true,
            correct_answer,
            options,
            is_active: true,
        };
        question.check_payload()?;
        Ok(question)
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Checks that exactly the payload fields of this question's kind are set.
    pub fn check_payload(&self) -> Result<(), QuestionIntegrityError> {
        let present = |field: &'static str, set: bool, wanted: bool| match (set, wanted) {
            (true, false) => Err(QuestionIntegrityError::ForeignPayload {
                question_id: self.id,
                kind: self.kind,
                field,
            }),
            (false, true) => Err(QuestionIntegrityError::MissingPayload {
                question_id: self.id,
                kind: self.kind,
                field,
            }),
            _ => Ok(()),
        };

        present("options", !self.options.is_empty(), self.kind == QuestionKind::Mcq)?;
        present("a truth value", self.is_true.is_some(), self.kind == QuestionKind::Tf)?;
        present(
            "a correct answer",
            self.correct_answer.is_some(),
            self.kind == QuestionKind::Fib,
        )?;
        Ok(())
    }

    pub fn answer_key(&self) -> Result<AnswerKey<'_>, QuestionIntegrityError> {
        self.check_payload()?;
        match self.kind {
            QuestionKind::Mcq => {
                let mut correct = self.options.iter().filter(|o| o.is_correct);
                match (correct.next(), correct.count()) {
                    (None, _) => Err(QuestionIntegrityError::NoCorrectOption(self.id)),
                    (Some(option), 0) => Ok(AnswerKey::Choice(option.id)),
                    (Some(_), rest) => Err(QuestionIntegrityError::MultipleCorrectOptions {
                        question_id: self.id,
                        count: rest + 1,
                    }),
                }
            }
            QuestionKind::Tf => self
                .is_true
                .map(AnswerKey::Truth)
                .ok_or(QuestionIntegrityError::MissingPayload {
                    question_id: self.id,
                    kind: self.kind,
                    field: "a truth value",
                }),
            QuestionKind::Fib => self
                .correct_answer
                .as_deref()
                .map(AnswerKey::Blank)
                .ok_or(QuestionIntegrityError::MissingPayload {
                    question_id: self.id,
                    kind: self.kind,
                    field: "a correct answer",
                }),
        }
    }
}

/// What a candidate sees of a question: never the correctness payload.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuestionView {
    pub id: i64,
    pub kind: QuestionKind,
    pub text: String,
    pub difficulty: Option<Difficulty>,
    pub options: Vec<OptionView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OptionView {
    pub id: i64,
    pub text: String,
}

impl From<&Question> for QuestionView {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            kind: q.kind,
            text: q.text.clone(),
            difficulty: q.difficulty,
            options: q
                .options
                .iter()
                .map(|o| OptionView {
                    id: o.id,
                    text: o.text.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiz() -> TargetRef {
        TargetRef::new(TargetKind::Lesson, 1)
    }

    fn four_options(correct: Option<usize>) -> Vec<NewOption> {
        (0..4)
            .map(|i| NewOption::new(10 + i as i64, format!("option {}", i), Some(i) == correct))
            .collect()
    }

    #[test]
    fn mcq_resolves_its_single_correct_option() {
        let q = Question::multiple_choice(1, quiz(), None, "Pick", four_options(Some(2))).unwrap();
        assert_eq!(q.answer_key().unwrap(), AnswerKey::Choice(12));
    }

    #[test]
    fn mcq_without_correct_option_builds_but_has_no_key() {
        let q = Question::multiple_choice(1, quiz(), None, "Pick", four_options(None)).unwrap();
        assert_eq!(q.answer_key(), Err(QuestionIntegrityError::NoCorrectOption(1)));
    }

    #[test]
    fn mcq_needs_four_options() {
        let err = Question::multiple_choice(
            1,
            quiz(),
            None,
            "Pick",
            vec![NewOption::new(1, "a", true), NewOption::new(2, "b", false)],
        )
        .unwrap_err();
        assert_eq!(
            err,
            QuestionIntegrityError::TooFewOptions {
                question_id: 1,
                min: 4,
                got: 2
            }
        );
    }

    #[test]
    fn fib_rejects_blank_answer() {
        let err = Question::fill_in_blank(3, quiz(), None, "Capital of France?", "  ").unwrap_err();
        assert!(matches!(err, QuestionIntegrityError::MissingPayload { .. }));
    }

    #[test]
    fn timed_test_questions_require_difficulty() {
        let owner = TargetRef::new(TargetKind::Test, 9);
        let err = Question::true_false(4, owner, None, "Sky is blue", true).unwrap_err();
        assert_eq!(err, QuestionIntegrityError::MissingDifficulty(4));
        assert!(Question::true_false(4, owner, Some(Difficulty::Easy), "Sky is blue", true).is_ok());
    }

    #[test]
    fn payloads_are_mutually_exclusive() {
        let mut q = Question::true_false(5, quiz(), None, "2 + 2 = 4", true).unwrap();
        q.correct_answer = Some("4".into());
        assert_eq!(
            q.answer_key(),
            Err(QuestionIntegrityError::ForeignPayload {
                question_id: 5,
                kind: QuestionKind::Tf,
                field: "a correct answer"
            })
        );
    }

    #[test]
    fn difficulty_parses_case_insensitively() {
        assert_eq!("normal".parse::<Difficulty>().unwrap(), Difficulty::Normal);
        assert!("DIFFICULT".parse::<Difficulty>().is_err());
    }
}
