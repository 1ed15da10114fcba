use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::question::Difficulty;

/// Share of a session drawn from each tier, e.g. `{"easy": 0.6, "normal": 0.3}`.
/// Whatever the declared tiers leave over is drawn from HARD.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlueprintRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub easy: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normal: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hard: Option<Decimal>,
}

impl BlueprintRules {
    pub fn ratio(&self, tier: Difficulty) -> Decimal {
        match tier {
            Difficulty::Easy => self.easy,
            Difficulty::Normal => self.normal,
            Difficulty::Hard => self.hard,
        }
        .unwrap_or(Decimal::ZERO)
    }

    pub fn validate(&self) -> Result<()> {
        let mut total = Decimal::ZERO;
        for tier in Difficulty::ALL {
            let ratio = self.ratio(tier);
            if ratio < Decimal::ZERO || ratio > Decimal::ONE {
                return Err(Error::InvalidBlueprint(format!(
                    "ratio for {} must be between 0 and 1, got {}",
                    tier, ratio
                )));
            }
            total += ratio;
        }
        if total > Decimal::ONE {
            return Err(Error::InvalidBlueprint(format!(
                "ratios must sum to at most 1, got {}",
                total
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestBlueprint {
    pub id: i64,
    pub test_assessment_id: i64,
    pub difficulty: Difficulty,
    pub rules: BlueprintRules,
    pub created_by: Option<Uuid>,
    pub is_active: bool,
}

impl TestBlueprint {
    pub fn new(
        id: i64,
        test_assessment_id: i64,
        difficulty: Difficulty,
        rules: BlueprintRules,
    ) -> Result<Self> {
        rules.validate()?;
        Ok(Self {
            id,
            test_assessment_id,
            difficulty,
            rules,
            created_by: None,
            is_active: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn rules_parse_from_lowercase_json_keys() {
        let rules: BlueprintRules =
            serde_json::from_value(serde_json::json!({"easy": 0.6, "normal": 0.3})).unwrap();
        assert_eq!(rules.ratio(Difficulty::Easy), dec("0.6"));
        assert_eq!(rules.ratio(Difficulty::Normal), dec("0.3"));
        assert_eq!(rules.ratio(Difficulty::Hard), Decimal::ZERO);
    }

    #[test]
    fn ratios_over_one_are_rejected() {
        let rules = BlueprintRules {
            easy: Some(dec("0.7")),
            normal: Some(dec("0.4")),
            hard: None,
        };
        assert!(matches!(
            TestBlueprint::new(1, 1, Difficulty::Easy, rules),
            Err(Error::InvalidBlueprint(_))
        ));
    }

    #[test]
    fn negative_ratio_is_rejected() {
        let rules = BlueprintRules {
            easy: Some(dec("-0.1")),
            ..Default::default()
        };
        assert!(rules.validate().is_err());
    }
}
