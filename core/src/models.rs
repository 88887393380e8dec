use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Gender {
    #[default]
    #[serde(alias = "male")]
    Male,
    #[serde(alias = "female")]
    Female,
}

impl FromStr for Gender {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "male" | "m" => Ok(Self::Male),
            "female" | "f" => Ok(Self::Female),
            _ => bail!("Invalid gender '{s}'. Must be one of: male, female"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Goal {
    #[default]
    #[serde(alias = "recomposition")]
    Recomposition,
    #[serde(alias = "bulk")]
    Bulk,
    #[serde(alias = "cut")]
    Cut,
}

impl FromStr for Goal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "recomposition" | "recomp" => Ok(Self::Recomposition),
            "bulk" => Ok(Self::Bulk),
            "cut" => Ok(Self::Cut),
            _ => bail!("Invalid goal '{s}'. Must be one of: recomposition, bulk, cut"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MealSlot {
    Breakfast,
    Lunch,
    Snack,
    Dinner,
    Other,
}

impl MealSlot {
    /// Display order for grouped summaries.
    pub const ALL: [MealSlot; 5] = [
        Self::Breakfast,
        Self::Lunch,
        Self::Snack,
        Self::Dinner,
        Self::Other,
    ];

    /// Classify a local hour of day: [5,10) breakfast, [10,14) lunch, [14,18) snack,
    /// everything else dinner.
    #[must_use]
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=9 => Self::Breakfast,
            10..=13 => Self::Lunch,
            14..=17 => Self::Snack,
            _ => Self::Dinner,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Breakfast => "Breakfast",
            Self::Lunch => "Lunch",
            Self::Snack => "Snack",
            Self::Dinner => "Dinner",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for MealSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MealSlot {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|slot| slot.as_str().to_lowercase() == lower)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid meal slot '{s}'. Must be one of: breakfast, lunch, snack, dinner, other"
                )
            })
    }
}

// --- Profile ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub weight_kg: f64,
    pub goal_weight_kg: f64,
    pub height_cm: f64,
    pub age: u32,
    pub gender: Gender,
    pub goal: Goal,
    pub activity_factor: f64,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            weight_kg: 80.0,
            goal_weight_kg: 75.0,
            height_cm: 180.0,
            age: 30,
            gender: Gender::Male,
            goal: Goal::Recomposition,
            activity_factor: 1.375,
        }
    }
}

const WEIGHT_RANGE: (f64, f64) = (30.0, 300.0);
const HEIGHT_RANGE: (f64, f64) = (100.0, 250.0);
const AGE_RANGE: (u32, u32) = (13, 100);
const ACTIVITY_RANGE: (f64, f64) = (1.2, 2.5);

fn clamp_or(value: f64, (lo, hi): (f64, f64), fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(lo, hi)
    } else {
        fallback
    }
}

impl Profile {
    /// Copy of the profile with every numeric field forced into a plausible range.
    /// Non-finite values fall back to the defaults.
    #[must_use]
    pub fn sanitized(&self) -> Self {
        let defaults = Self::default();
        Self {
            weight_kg: clamp_or(self.weight_kg, WEIGHT_RANGE, defaults.weight_kg),
            goal_weight_kg: clamp_or(self.goal_weight_kg, WEIGHT_RANGE, defaults.goal_weight_kg),
            height_cm: clamp_or(self.height_cm, HEIGHT_RANGE, defaults.height_cm),
            age: self.age.clamp(AGE_RANGE.0, AGE_RANGE.1),
            gender: self.gender,
            goal: self.goal,
            activity_factor: clamp_or(
                self.activity_factor,
                ACTIVITY_RANGE,
                defaults.activity_factor,
            ),
        }
    }

    /// Reject values that can only be input mistakes. Out-of-range but positive values are
    /// accepted here and clamped at computation time.
    pub fn validate(&self) -> Result<()> {
        for (label, value) in [
            ("weight_kg", self.weight_kg),
            ("goal_weight_kg", self.goal_weight_kg),
            ("height_cm", self.height_cm),
            ("activity_factor", self.activity_factor),
        ] {
            if !value.is_finite() || value <= 0.0 {
                bail!("{label} must be a positive number");
            }
        }
        if self.age == 0 {
            bail!("age must be greater than 0");
        }
        Ok(())
    }
}

/// Derived daily targets. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GoalTargets {
    pub calorie_target: i64,
    pub protein_target_g: i64,
    pub carb_target_g: i64,
    pub fat_target_g: i64,
    pub water_target_ml: i64,
    pub burn_target_kcal: i64,
}

// --- Log entries ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodEntry {
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    pub meal_slot: MealSlot,
    pub name: String,
    pub calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterEntry {
    pub date: NaiveDate,
    pub volume_ml: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightEntry {
    pub date: NaiveDate,
    pub weight_kg: f64,
}

/// Nutrition fields recovered from a model reply, before timestamping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MealFields {
    pub name: String,
    pub calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
}

impl MealFields {
    #[must_use]
    pub fn into_entry(self, date: NaiveDate, time: NaiveTime, meal_slot: MealSlot) -> FoodEntry {
        FoodEntry {
            date,
            time,
            meal_slot,
            name: self.name,
            calories: self.calories,
            protein_g: self.protein_g,
            carbs_g: self.carbs_g,
            fat_g: self.fat_g,
        }
    }
}

pub fn validate_meal_fields(fields: &MealFields) -> Result<()> {
    if fields.name.trim().is_empty() {
        bail!("Meal name must not be empty");
    }
    for (label, value) in [
        ("calories", fields.calories),
        ("protein", fields.protein_g),
        ("carbs", fields.carbs_g),
        ("fat", fields.fat_g),
    ] {
        if !value.is_finite() || value < 0.0 {
            bail!("{label} must be a non-negative number");
        }
    }
    Ok(())
}

pub fn validate_water_volume(volume_ml: f64) -> Result<()> {
    if !volume_ml.is_finite() || volume_ml <= 0.0 {
        bail!("Water volume must be greater than 0");
    }
    Ok(())
}

pub fn validate_weight(weight_kg: f64) -> Result<()> {
    if !weight_kg.is_finite() || weight_kg <= 0.0 {
        bail!("weight_kg must be greater than 0");
    }
    Ok(())
}

// --- Aggregates ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DailyTotals {
    pub calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
}

impl DailyTotals {
    pub fn add(&mut self, entry: &FoodEntry) {
        self.calories += entry.calories;
        self.protein_g += entry.protein_g;
        self.carbs_g += entry.carbs_g;
        self.fat_g += entry.fat_g;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MealGroup {
    pub meal_slot: MealSlot,
    pub entries: Vec<FoodEntry>,
    pub subtotal: DailyTotals,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub meals: Vec<MealGroup>,
    pub totals: DailyTotals,
    pub water_ml: f64,
}

/// One day in a multi-day history view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryDay {
    pub date: NaiveDate,
    pub totals: DailyTotals,
    pub water_ml: f64,
    pub entry_count: usize,
}

/// Consumed / target ratios. A zero target yields a zero ratio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Progress {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub water: f64,
    pub burn: f64,
}

/// Everything a dashboard needs for one user and one day.
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub date: NaiveDate,
    pub summary: DailySummary,
    pub targets: GoalTargets,
    pub remaining: DailyTotals,
    pub progress: Progress,
    pub current_weight_kg: f64,
    pub goal_weight_kg: f64,
    pub weight_to_goal_kg: f64,
    pub burned_kcal: i64,
    pub logging_streak: i64,
}

/// `HH:MM` (24-hour) serde representation for [`NaiveTime`]. Seconds are accepted on read.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIME_FORMAT;

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format(TIME_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let raw = raw.trim();
        NaiveTime::parse_from_str(raw, TIME_FORMAT)
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
            .map_err(|_| serde::de::Error::custom(format!("invalid time '{raw}', expected HH:MM")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meal_slot_from_hour_boundaries() {
        assert_eq!(MealSlot::from_hour(4), MealSlot::Dinner);
        assert_eq!(MealSlot::from_hour(5), MealSlot::Breakfast);
        assert_eq!(MealSlot::from_hour(9), MealSlot::Breakfast);
        assert_eq!(MealSlot::from_hour(10), MealSlot::Lunch);
        assert_eq!(MealSlot::from_hour(13), MealSlot::Lunch);
        assert_eq!(MealSlot::from_hour(14), MealSlot::Snack);
        assert_eq!(MealSlot::from_hour(17), MealSlot::Snack);
        assert_eq!(MealSlot::from_hour(18), MealSlot::Dinner);
        assert_eq!(MealSlot::from_hour(0), MealSlot::Dinner);
        assert_eq!(MealSlot::from_hour(23), MealSlot::Dinner);
    }

    #[test]
    fn test_meal_slot_parse_case_insensitive() {
        assert_eq!("lunch".parse::<MealSlot>().unwrap(), MealSlot::Lunch);
        assert_eq!("DINNER".parse::<MealSlot>().unwrap(), MealSlot::Dinner);
        assert_eq!("Other".parse::<MealSlot>().unwrap(), MealSlot::Other);
        assert!("brunch".parse::<MealSlot>().is_err());
    }

    #[test]
    fn test_gender_and_goal_parse() {
        assert_eq!("F".parse::<Gender>().unwrap(), Gender::Female);
        assert_eq!("recomp".parse::<Goal>().unwrap(), Goal::Recomposition);
        assert_eq!("Cut".parse::<Goal>().unwrap(), Goal::Cut);
        assert!("maintain".parse::<Goal>().is_err());
    }

    #[test]
    fn test_profile_missing_fields_use_defaults() {
        let profile: Profile = serde_json::from_str(r#"{"weight_kg": 92.5, "goal": "Cut"}"#).unwrap();
        assert!((profile.weight_kg - 92.5).abs() < f64::EPSILON);
        assert_eq!(profile.goal, Goal::Cut);
        assert_eq!(profile.age, Profile::default().age);
        assert_eq!(profile.gender, Gender::Male);
        assert!((profile.height_cm - 180.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_profile_sanitized_clamps() {
        let profile = Profile {
            weight_kg: 5.0,
            goal_weight_kg: f64::NAN,
            height_cm: 400.0,
            age: 3,
            activity_factor: 9.0,
            ..Profile::default()
        };
        let clean = profile.sanitized();
        assert!((clean.weight_kg - 30.0).abs() < f64::EPSILON);
        assert!((clean.goal_weight_kg - 75.0).abs() < f64::EPSILON);
        assert!((clean.height_cm - 250.0).abs() < f64::EPSILON);
        assert_eq!(clean.age, 13);
        assert!((clean.activity_factor - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_profile_validate() {
        assert!(Profile::default().validate().is_ok());
        let bad = Profile {
            height_cm: -1.0,
            ..Profile::default()
        };
        assert!(bad.validate().is_err());
        let bad_age = Profile {
            age: 0,
            ..Profile::default()
        };
        assert!(bad_age.validate().is_err());
    }

    #[test]
    fn test_validate_meal_fields() {
        let fields = MealFields {
            name: "Apple".to_string(),
            calories: 95.0,
            protein_g: 0.5,
            carbs_g: 25.0,
            fat_g: 0.3,
        };
        assert!(validate_meal_fields(&fields).is_ok());

        let unnamed = MealFields {
            name: "  ".to_string(),
            ..fields.clone()
        };
        assert!(validate_meal_fields(&unnamed).is_err());

        let negative = MealFields {
            fat_g: -1.0,
            ..fields
        };
        assert!(validate_meal_fields(&negative).is_err());
    }

    #[test]
    fn test_validate_water_and_weight() {
        assert!(validate_water_volume(250.0).is_ok());
        assert!(validate_water_volume(0.0).is_err());
        assert!(validate_weight(81.2).is_ok());
        assert!(validate_weight(-3.0).is_err());
        assert!(validate_weight(f64::INFINITY).is_err());
    }

    #[test]
    fn test_food_entry_time_serializes_as_hhmm() {
        let entry = FoodEntry {
            date: NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
            time: NaiveTime::from_hms_opt(7, 5, 42).unwrap(),
            meal_slot: MealSlot::Breakfast,
            name: "Oats".to_string(),
            calories: 300.0,
            protein_g: 10.0,
            carbs_g: 50.0,
            fat_g: 6.0,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["date"], "2024-06-15");
        assert_eq!(json["time"], "07:05");
        assert_eq!(json["meal_slot"], "Breakfast");
    }

    #[test]
    fn test_daily_totals_add() {
        let mut totals = DailyTotals::default();
        let entry = FoodEntry {
            date: NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
            time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            meal_slot: MealSlot::Lunch,
            name: "Rice".to_string(),
            calories: 200.0,
            protein_g: 4.0,
            carbs_g: 44.0,
            fat_g: 0.5,
        };
        totals.add(&entry);
        totals.add(&entry);
        assert!((totals.calories - 400.0).abs() < f64::EPSILON);
        assert!((totals.carbs_g - 88.0).abs() < f64::EPSILON);
    }
}
