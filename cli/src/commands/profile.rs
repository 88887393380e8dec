use anyhow::Result;

use platelog_core::goals::{bmr, tdee};
use platelog_core::models::{Gender, Goal, Profile};
use platelog_core::service::NutritionService;
use platelog_core::user::UserId;

/// Fields given on the command line; anything left `None` keeps its stored value.
#[derive(Default)]
pub(crate) struct ProfileUpdate {
    pub weight_kg: Option<f64>,
    pub goal_weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub goal: Option<String>,
    pub activity_factor: Option<f64>,
}

impl ProfileUpdate {
    fn is_empty(&self) -> bool {
        self.weight_kg.is_none()
            && self.goal_weight_kg.is_none()
            && self.height_cm.is_none()
            && self.age.is_none()
            && self.gender.is_none()
            && self.goal.is_none()
            && self.activity_factor.is_none()
    }

    fn apply(self, mut profile: Profile) -> Result<Profile> {
        if let Some(v) = self.weight_kg {
            profile.weight_kg = v;
        }
        if let Some(v) = self.goal_weight_kg {
            profile.goal_weight_kg = v;
        }
        if let Some(v) = self.height_cm {
            profile.height_cm = v;
        }
        if let Some(v) = self.age {
            profile.age = v;
        }
        if let Some(v) = self.gender {
            profile.gender = v.parse::<Gender>()?;
        }
        if let Some(v) = self.goal {
            profile.goal = v.parse::<Goal>()?;
        }
        if let Some(v) = self.activity_factor {
            profile.activity_factor = v;
        }
        Ok(profile)
    }
}

fn print_profile(profile: &Profile) {
    println!("  Weight:          {:.1} kg", profile.weight_kg);
    println!("  Goal weight:     {:.1} kg", profile.goal_weight_kg);
    println!("  Height:          {:.0} cm", profile.height_cm);
    println!("  Age:             {}", profile.age);
    println!("  Gender:          {:?}", profile.gender);
    println!("  Goal:            {:?}", profile.goal);
    println!("  Activity factor: {:.3}", profile.activity_factor);
}

pub(crate) fn cmd_profile_show(svc: &NutritionService, user: &UserId, json: bool) -> Result<()> {
    let profile = svc.get_profile(user)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
    } else {
        println!("Profile for {user}:");
        print_profile(&profile);
    }
    Ok(())
}

pub(crate) fn cmd_profile_set(
    svc: &NutritionService,
    user: &UserId,
    update: ProfileUpdate,
    json: bool,
) -> Result<()> {
    if update.is_empty() {
        anyhow::bail!("Nothing to update. Pass at least one of --weight, --goal-weight, --height, --age, --gender, --goal, --activity");
    }
    let profile = update.apply(svc.get_profile(user)?)?;
    svc.save_profile(user, &profile)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
    } else {
        println!("Saved profile for {user}:");
        print_profile(&profile);
    }
    Ok(())
}

pub(crate) fn cmd_goals(svc: &NutritionService, user: &UserId, json: bool) -> Result<()> {
    let profile = svc.get_profile(user)?;
    let targets = svc.get_targets(user)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&targets)?);
        return Ok(());
    }

    let sanitized = profile.sanitized();
    println!("Daily targets for {user} ({:?}):", sanitized.goal);
    println!("  BMR:      {:.0} kcal", bmr(&sanitized));
    println!("  TDEE:     {:.0} kcal", tdee(&sanitized));
    println!("  Calories: {} kcal", targets.calorie_target);
    println!("  Protein:  {} g", targets.protein_target_g);
    println!("  Carbs:    {} g", targets.carb_target_g);
    println!("  Fat:      {} g", targets.fat_target_g);
    println!("  Water:    {} ml", targets.water_target_ml);
    println!("  Burn:     {} kcal", targets.burn_target_kcal);
    Ok(())
}
