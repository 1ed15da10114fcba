use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::models::blueprint::{BlueprintRules, TestBlueprint};
use crate::models::question::{Difficulty, Question};
use crate::models::target::{AssessmentTarget, TestAssessment};
use crate::store::{QuestionBankReader, TargetStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierCounts {
    pub easy: usize,
    pub normal: usize,
    pub hard: usize,
}

impl TierCounts {
    pub fn get(&self, tier: Difficulty) -> usize {
        match tier {
            Difficulty::Easy => self.easy,
            Difficulty::Normal => self.normal,
            Difficulty::Hard => self.hard,
        }
    }

    pub fn total(&self) -> usize {
        self.easy + self.normal + self.hard
    }
}

/// EASY and NORMAL get `round(ratio * pool_size)` (half-to-even); HARD takes
/// whatever is left so the counts always add up to `pool_size`. A declared
/// HARD ratio is ignored.
pub fn tier_counts(rules: &BlueprintRules, pool_size: usize) -> TierCounts {
    let share = |tier: Difficulty| -> usize {
        (rules.ratio(tier) * Decimal::from(pool_size as u64))
            .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
            .to_usize()
            .unwrap_or(0)
    };
    let easy = share(Difficulty::Easy).min(pool_size);
    let normal = share(Difficulty::Normal).min(pool_size - easy);
    TierCounts {
        easy,
        normal,
        hard: pool_size - easy - normal,
    }
}

/// Samples each tier independently, then shuffles the combined list so EASY
/// questions do not always come first. Short tiers are taken whole.
pub fn select_with<R: Rng + ?Sized>(
    rng: &mut R,
    rules: &BlueprintRules,
    pool: Vec<Question>,
    pool_size: usize,
) -> Vec<Question> {
    let counts = tier_counts(rules, pool_size);
    let mut partitions: [Vec<Question>; 3] = Default::default();
    for question in pool {
        match question.difficulty {
            Some(Difficulty::Easy) => partitions[0].push(question),
            Some(Difficulty::Normal) => partitions[1].push(question),
            Some(Difficulty::Hard) => partitions[2].push(question),
            None => tracing::warn!(
                question_id = question.id,
                "timed-test question without difficulty left out of selection"
            ),
        }
    }

    let mut selected = Vec::with_capacity(pool_size);
    for (tier, mut partition) in Difficulty::ALL.into_iter().zip(partitions) {
        let wanted = counts.get(tier);
        if partition.len() < wanted {
            tracing::debug!(%tier, wanted, available = partition.len(), "tier under-filled");
        }
        partition.shuffle(rng);
        partition.truncate(wanted);
        selected.extend(partition);
    }
    selected.shuffle(rng);
    selected
}

pub struct Selection {
    pub blueprint: TestBlueprint,
    pub questions: Vec<Question>,
}

/// Chooses the questions for a timed test session. Holds its own random
/// source so a fixed seed gives repeatable selections.
#[derive(Clone)]
pub struct BlueprintSelector {
    rng: Arc<Mutex<StdRng>>,
    pool_size: usize,
}

impl BlueprintSelector {
    pub fn new(pool_size: usize) -> Self {
        Self {
            rng: Arc::new(Mutex::new(StdRng::from_entropy())),
            pool_size,
        }
    }

    pub fn seeded(pool_size: usize, seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))),
            pool_size,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub async fn select_questions(
        &self,
        targets: &dyn TargetStore,
        bank: &dyn QuestionBankReader,
        test: &TestAssessment,
        difficulty: Difficulty,
    ) -> Result<Selection> {
        let blueprint = targets
            .active_blueprint(test.id, difficulty)
            .await?
            .ok_or(Error::NoTestBlueprint {
                test_assessment_id: test.id,
                difficulty,
            })?;

        let pool = AssessmentTarget::TimedTest(test.clone())
            .question_pool(bank, None)
            .await?;
        let questions = self.select(&blueprint.rules, pool)?;
        Ok(Selection {
            blueprint,
            questions,
        })
    }

    pub fn select(&self, rules: &BlueprintRules, pool: Vec<Question>) -> Result<Vec<Question>> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| Error::Internal("selection rng lock poisoned".to_string()))?;
        Ok(select_with(&mut *rng, rules, pool, self.pool_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::target::{TargetKind, TargetRef};
    use std::collections::HashSet;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn rules(easy: &str, normal: &str) -> BlueprintRules {
        BlueprintRules {
            easy: Some(dec(easy)),
            normal: Some(dec(normal)),
            hard: None,
        }
    }

    fn bank(per_tier: i64) -> Vec<Question> {
        let owner = TargetRef::new(TargetKind::Test, 1);
        let mut questions = Vec::new();
        for (offset, tier) in Difficulty::ALL.into_iter().enumerate() {
            for n in 0..per_tier {
                let id = offset as i64 * 1000 + n;
                questions.push(
                    Question::true_false(id, owner, Some(tier), format!("q{}", id), true).unwrap(),
                );
            }
        }
        questions
    }

    fn count(selected: &[Question], tier: Difficulty) -> usize {
        selected.iter().filter(|q| q.difficulty == Some(tier)).count()
    }

    #[test]
    fn sixty_thirty_over_ten_is_six_three_one() {
        let counts = tier_counts(&rules("0.6", "0.3"), 10);
        assert_eq!(
            counts,
            TierCounts {
                easy: 6,
                normal: 3,
                hard: 1
            }
        );
    }

    #[test]
    fn counts_always_sum_to_pool_size() {
        for size in 1..40 {
            for (e, n) in [("0.33", "0.33"), ("0.5", "0.5"), ("0.15", "0.25"), ("0", "0")] {
                assert_eq!(tier_counts(&rules(e, n), size).total(), size);
            }
        }
    }

    #[test]
    fn rounding_halves_go_to_even() {
        // 0.25 * 10 = 2.5 -> 2, 0.35 * 10 = 3.5 -> 4
        let counts = tier_counts(&rules("0.25", "0.35"), 10);
        assert_eq!((counts.easy, counts.normal, counts.hard), (2, 4, 4));
    }

    #[test]
    fn declared_hard_ratio_is_replaced_by_remainder() {
        let mut r = rules("0.5", "0.2");
        r.hard = Some(dec("0.1"));
        assert_eq!(tier_counts(&r, 10).hard, 3);
    }

    #[test]
    fn selection_honours_tier_counts() {
        let mut rng = StdRng::seed_from_u64(7);
        let selected = select_with(&mut rng, &rules("0.6", "0.3"), bank(20), 10);
        assert_eq!(selected.len(), 10);
        assert_eq!(count(&selected, Difficulty::Easy), 6);
        assert_eq!(count(&selected, Difficulty::Normal), 3);
        assert_eq!(count(&selected, Difficulty::Hard), 1);
        let ids: HashSet<_> = selected.iter().map(|q| q.id).collect();
        assert_eq!(ids.len(), 10);
    }

    #[test]
    fn short_tiers_are_under_filled() {
        let mut rng = StdRng::seed_from_u64(1);
        let pool: Vec<_> = bank(20)
            .into_iter()
            .filter(|q| q.difficulty != Some(Difficulty::Easy) || q.id < 2)
            .collect();
        let selected = select_with(&mut rng, &rules("0.6", "0.3"), pool, 10);
        assert_eq!(count(&selected, Difficulty::Easy), 2);
        assert_eq!(selected.len(), 6);
    }

    #[test]
    fn same_seed_same_selection() {
        let pick = || {
            BlueprintSelector::seeded(10, 42)
                .select(&rules("0.6", "0.3"), bank(20))
                .unwrap()
                .into_iter()
                .map(|q| q.id)
                .collect::<Vec<_>>()
        };
        assert_eq!(pick(), pick());
    }

    #[test]
    fn easy_questions_are_not_always_first() {
        let mut rng = StdRng::seed_from_u64(3);
        let moved = (0..20).any(|_| {
            let selected = select_with(&mut rng, &rules("0.6", "0.3"), bank(20), 10);
            selected[..6].iter().any(|q| q.difficulty != Some(Difficulty::Easy))
        });
        assert!(moved);
    }
}
