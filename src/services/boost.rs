use std::collections::BTreeMap;

use crate::types::error::TdhError;
use crate::types::models::{BoostBreakdown, BoostComponent};

pub const CARD_SETS_BASE: f64 = 0.25;
pub const CARD_SETS_ADDITIONAL_STEP: f64 = 0.02;
pub const CARD_SETS_ADDITIONAL_MAX: f64 = 0.04;
pub const SEASON_SET: f64 = 0.05;
pub const GENESIS: f64 = 0.01;
pub const FOUNDING: f64 = 0.01;
pub const GRADIENT_STEP: f64 = 0.02;
pub const GRADIENTS_MAX: f64 = 0.06;
pub const ENS: f64 = 0.01;
pub const PROFILE: f64 = 0.03;

const EPSILON: f64 = 1e-9;

/// Holdings and identity facts the boost is derived from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoostInputs {
    pub card_sets: u32,
    /// Complete sets held per boost-eligible season (0 when incomplete).
    pub season_sets: BTreeMap<u32, u32>,
    /// Season whose set bonus falls back to the genesis/founding bonuses.
    pub first_season: Option<u32>,
    pub genesis: u32,
    pub founding: u32,
    pub gradients: u32,
    pub has_ens: bool,
    pub has_profile: bool,
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Returns the boost multiplier (>= 1.0, two decimals) and its itemised breakdown.
///
/// Holding at least one full catalog set earns the card-set component and
/// excludes every season, genesis and founding component. Otherwise each
/// complete eligible season earns its own bonus, and for the first season
/// an incomplete set can still earn the genesis and founding bonuses.
pub fn calculate_boost(inputs: &BoostInputs) -> (f64, BoostBreakdown) {
    let mut breakdown = BoostBreakdown {
        memes_card_sets: BoostComponent::new(CARD_SETS_BASE + CARD_SETS_ADDITIONAL_MAX, 0.0),
        memes_seasons: inputs
            .season_sets
            .keys()
            .map(|season| (*season, BoostComponent::new(SEASON_SET, 0.0)))
            .collect(),
        memes_genesis: BoostComponent::new(GENESIS, 0.0),
        memes_founding: BoostComponent::new(FOUNDING, 0.0),
        gradients: BoostComponent::new(GRADIENTS_MAX, 0.0),
        ens: BoostComponent::new(ENS, 0.0),
        profile: BoostComponent::new(PROFILE, 0.0),
    };

    if inputs.card_sets > 0 {
        let additional = ((inputs.card_sets - 1) as f64 * CARD_SETS_ADDITIONAL_STEP)
            .min(CARD_SETS_ADDITIONAL_MAX);
        breakdown.memes_card_sets.acquired = CARD_SETS_BASE + additional;
    } else {
        for (season, sets) in &inputs.season_sets {
            if *sets > 0 {
                if let Some(component) = breakdown.memes_seasons.get_mut(season) {
                    component.acquired = SEASON_SET;
                }
            }
        }

        let first_complete = inputs
            .first_season
            .and_then(|s| inputs.season_sets.get(&s))
            .map(|sets| *sets > 0)
            .unwrap_or(false);
        if !first_complete {
            if inputs.genesis > 0 {
                breakdown.memes_genesis.acquired = GENESIS;
            }
            if inputs.founding > 0 {
                breakdown.memes_founding.acquired = FOUNDING;
            }
        }
    }

    breakdown.gradients.acquired = (inputs.gradients as f64 * GRADIENT_STEP).min(GRADIENTS_MAX);
    if inputs.has_ens {
        breakdown.ens.acquired = ENS;
    }
    if inputs.has_profile {
        breakdown.profile.acquired = PROFILE;
    }

    let boost = round2(1.0 + breakdown.total_acquired());
    (boost, breakdown)
}

pub fn check_breakdown(boost: f64, breakdown: &BoostBreakdown) -> Result<(), TdhError> {
    if boost < 1.0 {
        return Err(TdhError::InvariantViolation(format!("boost {} below 1.0", boost)));
    }
    if let Some(c) = breakdown
        .components()
        .find(|c| c.acquired < 0.0 || c.acquired > c.available + EPSILON)
    {
        return Err(TdhError::InvariantViolation(format!(
            "boost component acquired {} outside [0, {}]",
            c.acquired, c.available
        )));
    }
    let expected = round2(1.0 + breakdown.total_acquired());
    if (expected - boost).abs() > EPSILON {
        return Err(TdhError::InvariantViolation(format!(
            "boost {} does not match breakdown total {}",
            boost, expected
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seasons(sets: &[(u32, u32)]) -> BTreeMap<u32, u32> {
        sets.iter().copied().collect()
    }

    #[test]
    fn test_no_holdings_is_neutral() {
        let (boost, breakdown) = calculate_boost(&BoostInputs::default());
        assert_eq!(boost, 1.0);
        assert_eq!(breakdown.total_acquired(), 0.0);
        assert!(check_breakdown(boost, &breakdown).is_ok());
    }

    #[test]
    fn test_single_full_set_gets_base_only() {
        let (boost, breakdown) = calculate_boost(&BoostInputs {
            card_sets: 1,
            ..Default::default()
        });
        assert_eq!(breakdown.memes_card_sets.acquired, 0.25);
        assert_eq!(boost, 1.25);
    }

    #[test]
    fn test_additional_sets_are_capped() {
        let (two, _) = calculate_boost(&BoostInputs {
            card_sets: 2,
            ..Default::default()
        });
        let (ten, breakdown) = calculate_boost(&BoostInputs {
            card_sets: 10,
            ..Default::default()
        });
        assert_eq!(two, 1.27);
        assert_eq!(ten, 1.29);
        assert!(check_breakdown(ten, &breakdown).is_ok());
    }

    #[test]
    fn test_full_set_excludes_season_and_genesis_bonuses() {
        let (boost, breakdown) = calculate_boost(&BoostInputs {
            card_sets: 1,
            season_sets: seasons(&[(1, 1), (2, 1)]),
            first_season: Some(1),
            genesis: 1,
            founding: 1,
            ..Default::default()
        });
        assert_eq!(boost, 1.25);
        assert!(breakdown.memes_seasons.values().all(|c| c.acquired == 0.0));
        assert_eq!(breakdown.memes_genesis.acquired, 0.0);
    }

    #[test]
    fn test_season_sets_are_independent() {
        let (boost, _) = calculate_boost(&BoostInputs {
            season_sets: seasons(&[(1, 0), (2, 1), (3, 0), (4, 2), (5, 1)]),
            first_season: Some(1),
            ..Default::default()
        });
        assert_eq!(boost, 1.15);
    }

    #[test]
    fn test_genesis_and_founding_only_without_first_season_set() {
        let inputs = BoostInputs {
            season_sets: seasons(&[(1, 0), (2, 0)]),
            first_season: Some(1),
            genesis: 1,
            founding: 2,
            ..Default::default()
        };
        let (boost, _) = calculate_boost(&inputs);
        assert_eq!(boost, 1.02);

        let (boost, breakdown) = calculate_boost(&BoostInputs {
            season_sets: seasons(&[(1, 1), (2, 0)]),
            ..inputs
        });
        assert_eq!(boost, 1.05);
        assert_eq!(breakdown.memes_genesis.acquired, 0.0);
        assert_eq!(breakdown.memes_founding.acquired, 0.0);
    }

    #[test]
    fn test_gradients_ens_and_profile() {
        let (boost, breakdown) = calculate_boost(&BoostInputs {
            gradients: 5,
            has_ens: true,
            has_profile: true,
            ..Default::default()
        });
        assert_eq!(breakdown.gradients.acquired, 0.06);
        assert_eq!(boost, 1.1);
        assert!(check_breakdown(boost, &breakdown).is_ok());
    }

    #[test]
    fn test_breakdown_bounds_hold_for_every_combination() {
        for card_sets in 0..4 {
            for gradients in 0..5 {
                for flags in 0..4u8 {
                    let (boost, breakdown) = calculate_boost(&BoostInputs {
                        card_sets,
                        season_sets: seasons(&[(1, card_sets % 2), (2, 1)]),
                        first_season: Some(1),
                        genesis: 1,
                        founding: 1,
                        gradients,
                        has_ens: flags & 1 == 1,
                        has_profile: flags & 2 == 2,
                    });
                    assert!(boost >= 1.0);
                    assert!(check_breakdown(boost, &breakdown).is_ok());
                }
            }
        }
    }

    #[test]
    fn test_check_breakdown_rejects_mismatch() {
        let (_, breakdown) = calculate_boost(&BoostInputs {
            card_sets: 1,
            ..Default::default()
        });
        assert!(matches!(
            check_breakdown(1.3, &breakdown),
            Err(TdhError::InvariantViolation(_))
        ));
    }
}
