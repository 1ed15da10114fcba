use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::answer::AnswerPayload;
use crate::models::question::{AnswerKey, Question, QuestionIntegrityError};

/// One recorded answer joined with the question it answers. `question` is an
/// error when the stored row could not be read as a valid question.
#[derive(Debug, Clone)]
pub struct GradableAnswer {
    pub answer_id: Uuid,
    pub question_id: i64,
    pub payload: AnswerPayload,
    pub question: std::result::Result<Question, QuestionIntegrityError>,
}

#[derive(Debug, Clone)]
pub struct MarkingInput {
    pub session_id: Uuid,
    /// Every question in the session, answered or not.
    pub total_questions: usize,
    pub answers: Vec<GradableAnswer>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marking {
    pub score: Decimal,
    pub correct: usize,
    pub total: usize,
    pub verdicts: Vec<(Uuid, bool)>,
}

/// The marking function a store runs inside its submission transaction.
pub type Marker = dyn Fn(&MarkingInput) -> Result<Marking> + Send + Sync;

pub struct GradingService;

impl GradingService {
    pub fn mark(input: &MarkingInput) -> Result<Marking> {
        let fail = |reason: String| Error::TestSessionMarking {
            session_id: input.session_id,
            reason,
        };

        if input.answers.len() > input.total_questions {
            return Err(fail(format!(
                "{} answers recorded for {} questions",
                input.answers.len(),
                input.total_questions
            )));
        }

        let mut seen = HashSet::with_capacity(input.answers.len());
        let mut verdicts = Vec::with_capacity(input.answers.len());
        let mut correct = 0;

        for answer in &input.answers {
            if !seen.insert(answer.question_id) {
                return Err(fail(format!(
                    "question {} was answered more than once",
                    answer.question_id
                )));
            }

            let verdict = match &answer.question {
                Ok(question) => match Self::is_correct(question, &answer.payload) {
                    Ok(verdict) => verdict,
                    Err(fault) => {
                        tracing::warn!(
                            session_id = %input.session_id,
                            error = %fault,
                            "integrity fault while marking, counted as incorrect"
                        );
                        false
                    }
                },
                Err(fault) => {
                    tracing::warn!(
                        session_id = %input.session_id,
                        error = %fault,
                        "unreadable question while marking, counted as incorrect"
                    );
                    false
                }
            };

            if verdict {
                correct += 1;
            }
            verdicts.push((answer.answer_id, verdict));
        }

        Ok(Marking {
            score: Self::score(correct, input.total_questions),
            correct,
            total: input.total_questions,
            verdicts,
        })
    }

    /// Applies the question's correctness rule to one answer.
    ///
    /// TF answers are trimmed and lower-cased before being compared with
    /// `"true"`/`"false"`. FIB answers are trimmed and lower-cased on both
    /// sides and must match exactly.
    pub fn is_correct(
        question: &Question,
        payload: &AnswerPayload,
    ) -> std::result::Result<bool, QuestionIntegrityError> {
        let key = question.answer_key()?;
        let verdict = match (key, payload) {
            (AnswerKey::Choice(correct_id), AnswerPayload::Option(selected)) => {
                *selected == correct_id
            }
            (AnswerKey::Truth(truth), AnswerPayload::Text(given)) => {
                normalize(given) == truth.to_string()
            }
            (AnswerKey::Blank(expected), AnswerPayload::Text(given)) => {
                normalize(given) == normalize(expected)
            }
            (key, payload) => {
                tracing::warn!(
                    question_id = question.id,
                    ?key,
                    ?payload,
                    "answer payload does not fit the question kind"
                );
                false
            }
        };
        Ok(verdict)
    }

    /// `correct / total * 100` rounded half-to-even to two places, 0 when
    /// there are no questions.
    pub fn score(correct: usize, total: usize) -> Decimal {
        if total == 0 {
            return Decimal::ZERO;
        }
        let raw = Decimal::from(correct as u64) * Decimal::ONE_HUNDRED / Decimal::from(total as u64);
        raw.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
            .clamp(Decimal::ZERO, Decimal::ONE_HUNDRED)
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::{NewOption, QuestionKind};
    use crate::models::target::{TargetKind, TargetRef};

    fn quiz() -> TargetRef {
        TargetRef::new(TargetKind::Lesson, 1)
    }

    fn mcq(id: i64, correct: Option<i64>) -> Question {
        let options = (1..=4)
            .map(|i| NewOption::new(id * 10 + i, format!("choice {}", i), Some(id * 10 + i) == correct))
            .collect();
        Question::multiple_choice(id, quiz(), None, "Pick one", options).unwrap()
    }

    fn answer(question: Question, payload: AnswerPayload) -> GradableAnswer {
        GradableAnswer {
            answer_id: Uuid::new_v4(),
            question_id: question.id,
            payload,
            question: Ok(question),
        }
    }

    fn input(total: usize, answers: Vec<GradableAnswer>) -> MarkingInput {
        MarkingInput {
            session_id: Uuid::new_v4(),
            total_questions: total,
            answers,
        }
    }

    #[test]
    fn mcq_matches_the_correct_option_id() {
        let q = mcq(1, Some(12));
        assert_eq!(GradingService::is_correct(&q, &AnswerPayload::Option(12)), Ok(true));
        assert_eq!(GradingService::is_correct(&q, &AnswerPayload::Option(13)), Ok(false));
    }

    #[test]
    fn fib_ignores_case_and_surrounding_whitespace() {
        let q = Question::fill_in_blank(2, quiz(), None, "Capital of France?", "Paris").unwrap();
        for given in [" Paris ", "paris", "PARIS"] {
            assert_eq!(
                GradingService::is_correct(&q, &AnswerPayload::Text(given.into())),
                Ok(true),
                "{given:?}"
            );
        }
        assert_eq!(
            GradingService::is_correct(&q, &AnswerPayload::Text("Pari".into())),
            Ok(false)
        );
    }

    #[test]
    fn tf_normalizes_before_comparing() {
        let q = Question::true_false(3, quiz(), None, "Water is wet", true).unwrap();
        assert_eq!(GradingService::is_correct(&q, &AnswerPayload::Text("true".into())), Ok(true));
        assert_eq!(GradingService::is_correct(&q, &AnswerPayload::Text("True ".into())), Ok(true));
        assert_eq!(GradingService::is_correct(&q, &AnswerPayload::Text("false".into())), Ok(false));
        assert_eq!(GradingService::is_correct(&q, &AnswerPayload::Text("yes".into())), Ok(false));
    }

    #[test]
    fn mismatched_payload_is_incorrect_not_an_error() {
        let q = Question::true_false(3, quiz(), None, "Water is wet", true).unwrap();
        assert_eq!(GradingService::is_correct(&q, &AnswerPayload::Option(1)), Ok(false));
    }

    #[test]
    fn mcq_without_correct_option_marks_everything_incorrect() {
        let q = mcq(4, None);
        let marking = GradingService::mark(&input(
            2,
            vec![answer(q.clone(), AnswerPayload::Option(41))],
        ))
        .unwrap();
        assert_eq!(marking.correct, 0);
        assert_eq!(marking.score, Decimal::ZERO);
        assert_eq!(marking.verdicts.len(), 1);
        assert!(!marking.verdicts[0].1);
    }

    #[test]
    fn unreadable_questions_count_as_incorrect() {
        let broken = GradableAnswer {
            answer_id: Uuid::new_v4(),
            question_id: 9,
            payload: AnswerPayload::Text("x".into()),
            question: Err(QuestionIntegrityError::UnsupportedKind {
                question_id: 9,
                kind: "ESSAY".into(),
            }),
        };
        let good = answer(mcq(1, Some(11)), AnswerPayload::Option(11));
        let marking = GradingService::mark(&input(2, vec![broken, good])).unwrap();
        assert_eq!(marking.correct, 1);
        assert_eq!(marking.score, Decimal::new(5000, 2));
    }

    #[test]
    fn unanswered_questions_lower_the_score() {
        let answers = vec![answer(mcq(1, Some(11)), AnswerPayload::Option(11))];
        let marking = GradingService::mark(&input(3, answers)).unwrap();
        assert_eq!(marking.score.to_string(), "33.33");
    }

    #[test]
    fn score_rounds_to_two_places() {
        assert_eq!(GradingService::score(2, 3).to_string(), "66.67");
        assert_eq!(GradingService::score(1, 8).to_string(), "12.50");
        assert_eq!(GradingService::score(15, 15), Decimal::ONE_HUNDRED);
    }

    #[test]
    fn empty_session_scores_zero() {
        assert_eq!(GradingService::score(0, 0), Decimal::ZERO);
        let marking = GradingService::mark(&input(0, vec![])).unwrap();
        assert_eq!(marking.score, Decimal::ZERO);
    }

    #[test]
    fn score_is_stable_across_repeated_marking() {
        let build = || {
            input(
                7,
                vec![
                    answer(mcq(1, Some(11)), AnswerPayload::Option(11)),
                    answer(mcq(2, Some(21)), AnswerPayload::Option(21)),
                ],
            )
        };
        let first = GradingService::mark(&build()).unwrap().score;
        for _ in 0..10 {
            assert_eq!(GradingService::mark(&build()).unwrap().score, first);
        }
        assert_eq!(first.to_string(), "28.57");
    }

    #[test]
    fn more_answers_than_questions_fails_marking() {
        let answers = vec![
            answer(mcq(1, Some(11)), AnswerPayload::Option(11)),
            answer(mcq(2, Some(21)), AnswerPayload::Option(21)),
        ];
        assert!(matches!(
            GradingService::mark(&input(1, answers)),
            Err(Error::TestSessionMarking { .. })
        ));
    }

    #[test]
    fn duplicate_answers_fail_marking() {
        let q = mcq(1, Some(11));
        let answers = vec![
            answer(q.clone(), AnswerPayload::Option(11)),
            answer(q, AnswerPayload::Option(12)),
        ];
        assert!(GradingService::mark(&input(5, answers)).is_err());
    }

    #[test]
    fn kinds_round_trip_through_their_codes() {
        for kind in [QuestionKind::Mcq, QuestionKind::Tf, QuestionKind::Fib] {
            assert_eq!(kind.as_str().parse::<QuestionKind>().unwrap(), kind);
        }
    }
}
