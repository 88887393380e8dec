//! Energy and macro targets derived from a [`Profile`].
//!
//! Everything here is pure. Targets are recomputed on every read of the profile and are
//! never stored.

use crate::models::{Gender, Goal, GoalTargets, Profile};

const KCAL_PER_G_PROTEIN: f64 = 4.0;
const KCAL_PER_G_CARBS: f64 = 4.0;
const KCAL_PER_G_FAT: f64 = 9.0;

const FAT_G_PER_KG: f64 = 1.0;
const WATER_ML_PER_KG: f64 = 30.0;

pub const DEFAULT_BURN_TARGET_KCAL: i64 = 500;

/// Mifflin-St Jeor basal metabolic rate in kcal/day.
#[must_use]
pub fn bmr(profile: &Profile) -> f64 {
    let offset = match profile.gender {
        Gender::Male => 5.0,
        Gender::Female => -161.0,
    };
    10.0 * profile.weight_kg + 6.25 * profile.height_cm - 5.0 * f64::from(profile.age) + offset
}

#[must_use]
pub fn tdee(profile: &Profile) -> f64 {
    bmr(profile) * profile.activity_factor
}

/// Daily calorie budget for a goal given total energy expenditure.
#[must_use]
pub fn calorie_target(goal: Goal, tdee: f64) -> f64 {
    match goal {
        Goal::Recomposition => tdee + 100.0,
        Goal::Bulk => tdee + 300.0,
        Goal::Cut => tdee - 400.0,
    }
}

#[must_use]
pub fn protein_g_per_kg(goal: Goal) -> f64 {
    match goal {
        Goal::Recomposition | Goal::Cut => 2.2,
        Goal::Bulk => 2.0,
    }
}

/// Compute the full target set. The profile is clamped first, so this never fails.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn compute_targets(profile: &Profile) -> GoalTargets {
    let profile = profile.sanitized();

    let calories = calorie_target(profile.goal, tdee(&profile));
    let protein = protein_g_per_kg(profile.goal) * profile.weight_kg;
    let fat = FAT_G_PER_KG * profile.weight_kg;
    let carbs =
        ((calories - protein * KCAL_PER_G_PROTEIN - fat * KCAL_PER_G_FAT) / KCAL_PER_G_CARBS)
            .max(0.0);
    let water = WATER_ML_PER_KG * profile.weight_kg;

    GoalTargets {
        calorie_target: calories.round() as i64,
        protein_target_g: protein.round() as i64,
        carb_target_g: carbs.round() as i64,
        fat_target_g: fat.round() as i64,
        water_target_ml: water.round() as i64,
        burn_target_kcal: DEFAULT_BURN_TARGET_KCAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn athlete(gender: Gender) -> Profile {
        Profile {
            weight_kg: 80.0,
            goal_weight_kg: 78.0,
            height_cm: 184.0,
            age: 25,
            gender,
            goal: Goal::Recomposition,
            activity_factor: 1.2,
        }
    }

    #[test]
    fn test_bmr_male() {
        // 10*80 + 6.25*184 - 5*25 + 5
        assert!((bmr(&athlete(Gender::Male)) - 1830.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_bmr_female_offset() {
        // Same stats, -161 instead of +5
        assert!((bmr(&athlete(Gender::Female)) - 1664.0).abs() < f64::EPSILON);
        let diff = bmr(&athlete(Gender::Male)) - bmr(&athlete(Gender::Female));
        assert!((diff - 166.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_calorie_target_by_goal() {
        assert!((calorie_target(Goal::Cut, 2500.0) - 2100.0).abs() < f64::EPSILON);
        assert!((calorie_target(Goal::Bulk, 2500.0) - 2800.0).abs() < f64::EPSILON);
        assert!((calorie_target(Goal::Recomposition, 2500.0) - 2600.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_compute_targets_recomposition() {
        let targets = compute_targets(&athlete(Gender::Male));
        // tdee = 1830 * 1.2 = 2196, +100
        assert_eq!(targets.calorie_target, 2296);
        assert_eq!(targets.protein_target_g, 176);
        assert_eq!(targets.fat_target_g, 80);
        // (2296 - 176*4 - 80*9) / 4 = 218
        assert_eq!(targets.carb_target_g, 218);
        assert_eq!(targets.water_target_ml, 2400);
        assert_eq!(targets.burn_target_kcal, 500);
    }

    #[test]
    fn test_compute_targets_bulk_uses_lower_protein() {
        let profile = Profile {
            goal: Goal::Bulk,
            ..athlete(Gender::Male)
        };
        let targets = compute_targets(&profile);
        assert_eq!(targets.protein_target_g, 160);
        assert_eq!(targets.calorie_target, 2496);
    }

    #[test]
    fn test_carb_target_never_negative() {
        // Heavy, short, old, sedentary, cutting: protein + fat exceed the budget
        let profile = Profile {
            weight_kg: 300.0,
            goal_weight_kg: 120.0,
            height_cm: 100.0,
            age: 100,
            gender: Gender::Female,
            goal: Goal::Cut,
            activity_factor: 1.2,
        };
        let targets = compute_targets(&profile);
        assert_eq!(targets.carb_target_g, 0);
    }

    #[test]
    fn test_compute_targets_deterministic() {
        let profile = athlete(Gender::Female);
        assert_eq!(compute_targets(&profile), compute_targets(&profile));
    }

    #[test]
    fn test_compute_targets_clamps_garbage_input() {
        let profile = Profile {
            weight_kg: f64::NAN,
            activity_factor: 0.0,
            ..Profile::default()
        };
        let targets = compute_targets(&profile);
        // NaN weight falls back to the default 80 kg
        assert_eq!(targets.water_target_ml, 2400);
        assert!(targets.calorie_target > 0);
    }
}
