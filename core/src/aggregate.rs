//! Read-only reductions over a user's logs.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};

use crate::goals::compute_targets;
use crate::models::{
    Dashboard, DailySummary, DailyTotals, FoodEntry, GoalTargets, HistoryDay, MealGroup, MealSlot,
    Progress,
};
use crate::store::UserStore;

fn totals_of<'a>(entries: impl IntoIterator<Item = &'a FoodEntry>) -> DailyTotals {
    let mut totals = DailyTotals::default();
    for entry in entries {
        totals.add(entry);
    }
    totals
}

/// Sum of all food entries on `date`. All zero when nothing was logged.
#[must_use]
pub fn daily_totals(store: &UserStore, date: NaiveDate) -> DailyTotals {
    totals_of(&store.list_food(Some(date)))
}

#[must_use]
pub fn water_total(store: &UserStore, date: NaiveDate) -> f64 {
    store
        .list_water(Some(date))
        .iter()
        .map(|w| w.volume_ml)
        .sum()
}

/// Weight from the most recently dated log entry, falling back to the profile.
#[must_use]
pub fn current_weight(store: &UserStore) -> f64 {
    store
        .list_weight()
        .into_iter()
        .max_by_key(|w| w.date)
        .map_or_else(|| store.load_profile().weight_kg, |w| w.weight_kg)
}

/// Consecutive days with at least one food entry, ending today or yesterday.
#[must_use]
pub fn logging_streak(store: &UserStore, today: NaiveDate) -> i64 {
    streak_from_dates(store.list_food(None).iter().map(|e| e.date), today)
}

/// Entries dated after `today` are ignored.
fn streak_from_dates(dates: impl IntoIterator<Item = NaiveDate>, today: NaiveDate) -> i64 {
    let mut dates: Vec<NaiveDate> = dates.into_iter().filter(|d| *d <= today).collect();
    dates.sort_unstable_by(|a, b| b.cmp(a));
    dates.dedup();

    let yesterday = today - Duration::days(1);
    let start = match dates.first() {
        Some(&d) if d == today || d == yesterday => d,
        _ => return 0,
    };

    let mut streak: i64 = 0;
    for date in &dates {
        if *date == start - Duration::days(streak) {
            streak += 1;
        } else {
            break;
        }
    }
    streak
}

/// The day's entries grouped by meal slot, in slot order. Empty slots are omitted.
#[must_use]
pub fn daily_summary(store: &UserStore, date: NaiveDate) -> DailySummary {
    let entries = store.list_food(Some(date));

    let meals = MealSlot::ALL
        .into_iter()
        .filter_map(|slot| {
            let group: Vec<FoodEntry> = entries
                .iter()
                .filter(|e| e.meal_slot == slot)
                .cloned()
                .collect();
            if group.is_empty() {
                return None;
            }
            Some(MealGroup {
                meal_slot: slot,
                subtotal: totals_of(&group),
                entries: group,
            })
        })
        .collect();

    DailySummary {
        date,
        meals,
        totals: totals_of(&entries),
        water_ml: water_total(store, date),
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(consumed: f64, target: i64) -> f64 {
    if target <= 0 {
        0.0
    } else {
        consumed / target as f64
    }
}

#[allow(clippy::cast_precision_loss)]
fn remaining(targets: &GoalTargets, totals: &DailyTotals) -> DailyTotals {
    DailyTotals {
        calories: targets.calorie_target as f64 - totals.calories,
        protein_g: targets.protein_target_g as f64 - totals.protein_g,
        carbs_g: targets.carb_target_g as f64 - totals.carbs_g,
        fat_g: targets.fat_target_g as f64 - totals.fat_g,
    }
}

/// Everything shown for one day: grouped meals, targets, what is left, progress ratios,
/// weight and streak. `burned_kcal` comes from the caller's session.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn dashboard(store: &UserStore, date: NaiveDate, burned_kcal: i64) -> Dashboard {
    let profile = store.load_profile();
    let targets = compute_targets(&profile);
    let summary = daily_summary(store, date);
    let totals = summary.totals;

    let progress = Progress {
        calories: ratio(totals.calories, targets.calorie_target),
        protein: ratio(totals.protein_g, targets.protein_target_g),
        carbs: ratio(totals.carbs_g, targets.carb_target_g),
        fat: ratio(totals.fat_g, targets.fat_target_g),
        water: ratio(summary.water_ml, targets.water_target_ml),
        burn: ratio(burned_kcal as f64, targets.burn_target_kcal),
    };

    let current_weight_kg = current_weight(store);
    Dashboard {
        date,
        remaining: remaining(&targets, &totals),
        targets,
        progress,
        current_weight_kg,
        goal_weight_kg: profile.goal_weight_kg,
        weight_to_goal_kg: current_weight_kg - profile.goal_weight_kg,
        burned_kcal,
        logging_streak: logging_streak(store, date),
        summary,
    }
}

/// Per-day totals for the `days` days ending at `end`, oldest first. Days without entries
/// are included with zero totals.
#[must_use]
pub fn history(store: &UserStore, end: NaiveDate, days: u32) -> Vec<HistoryDay> {
    if days == 0 {
        return Vec::new();
    }
    let start = end - Duration::days(i64::from(days) - 1);

    let mut food: BTreeMap<NaiveDate, Vec<FoodEntry>> = BTreeMap::new();
    for entry in store.list_food(None) {
        if entry.date >= start && entry.date <= end {
            food.entry(entry.date).or_default().push(entry);
        }
    }
    let mut water: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for entry in store.list_water(None) {
        if entry.date >= start && entry.date <= end {
            *water.entry(entry.date).or_default() += entry.volume_ml;
        }
    }

    start
        .iter_days()
        .take_while(|d| *d <= end)
        .map(|date| {
            let entries = food.get(&date).map(Vec::as_slice).unwrap_or_default();
            HistoryDay {
                date,
                totals: totals_of(entries),
                water_ml: water.get(&date).copied().unwrap_or_default(),
                entry_count: entries.len(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Profile, WaterEntry, WeightEntry};
    use crate::user::UserId;
    use chrono::NaiveTime;

    fn store(dir: &tempfile::TempDir) -> UserStore {
        UserStore::open(dir.path(), UserId::from_display_name("Agg").unwrap()).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
    }

    fn days_ago(n: i64) -> NaiveDate {
        today() - Duration::days(n)
    }

    fn food(date: NaiveDate, slot: MealSlot, calories: f64) -> FoodEntry {
        FoodEntry {
            date,
            time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            meal_slot: slot,
            name: "Meal".to_string(),
            calories,
            protein_g: 10.0,
            carbs_g: 10.0,
            fat_g: 5.0,
        }
    }

    #[test]
    fn test_streak_consecutive_including_today() {
        assert_eq!(
            streak_from_dates([today(), days_ago(1), days_ago(2)], today()),
            3
        );
    }

    #[test]
    fn test_streak_starts_yesterday_when_today_empty() {
        assert_eq!(streak_from_dates([days_ago(1), days_ago(2)], today()), 2);
    }

    #[test]
    fn test_streak_zero_after_gap() {
        assert_eq!(streak_from_dates([days_ago(2)], today()), 0);
        assert_eq!(streak_from_dates([], today()), 0);
    }

    #[test]
    fn test_streak_stops_at_gap_and_ignores_duplicates() {
        let dates = [today(), today(), days_ago(1), days_ago(3), days_ago(4)];
        assert_eq!(streak_from_dates(dates, today()), 2);
    }

    #[test]
    fn test_streak_ignores_future_dates() {
        let tomorrow = today() + Duration::days(1);
        assert_eq!(streak_from_dates([tomorrow, today()], today()), 1);
    }

    #[test]
    fn test_empty_log_totals_are_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        assert_eq!(daily_totals(&store, today()), DailyTotals::default());
        assert!(water_total(&store, today()).abs() < f64::EPSILON);
        assert_eq!(logging_streak(&store, today()), 0);
    }

    #[test]
    fn test_daily_totals_only_count_date() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.append_food(&food(today(), MealSlot::Lunch, 500.0)).unwrap();
        store.append_food(&food(today(), MealSlot::Dinner, 700.0)).unwrap();
        store.append_food(&food(days_ago(1), MealSlot::Lunch, 900.0)).unwrap();

        let totals = daily_totals(&store, today());
        assert!((totals.calories - 1200.0).abs() < f64::EPSILON);
        assert!((totals.protein_g - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_water_total_sums_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        for ml in [250.0, 500.0, 330.0] {
            store
                .append_water(&WaterEntry {
                    date: today(),
                    volume_ml: ml,
                })
                .unwrap();
        }
        assert!((water_total(&store, today()) - 1080.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_current_weight_prefers_latest_log_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        assert!((current_weight(&store) - Profile::default().weight_kg).abs() < f64::EPSILON);

        store
            .upsert_weight(&WeightEntry {
                date: days_ago(1),
                weight_kg: 78.5,
            })
            .unwrap();
        store
            .upsert_weight(&WeightEntry {
                date: days_ago(5),
                weight_kg: 79.0,
            })
            .unwrap();
        assert!((current_weight(&store) - 78.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_summary_groups_in_slot_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.append_food(&food(today(), MealSlot::Dinner, 700.0)).unwrap();
        store.append_food(&food(today(), MealSlot::Breakfast, 300.0)).unwrap();
        store.append_food(&food(today(), MealSlot::Dinner, 100.0)).unwrap();

        let summary = daily_summary(&store, today());
        let slots: Vec<MealSlot> = summary.meals.iter().map(|g| g.meal_slot).collect();
        assert_eq!(slots, vec![MealSlot::Breakfast, MealSlot::Dinner]);
        assert!((summary.meals[1].subtotal.calories - 800.0).abs() < f64::EPSILON);
        assert!((summary.totals.calories - 1100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_dashboard_progress_and_remaining() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.save_profile(&Profile::default()).unwrap();
        store.append_food(&food(today(), MealSlot::Lunch, 1000.0)).unwrap();
        store.append_food(&food(days_ago(1), MealSlot::Lunch, 1000.0)).unwrap();

        let dash = dashboard(&store, today(), 250);
        let targets = compute_targets(&Profile::default());
        assert_eq!(dash.targets, targets);
        #[allow(clippy::cast_precision_loss)]
        let expected_left = targets.calorie_target as f64 - 1000.0;
        assert!((dash.remaining.calories - expected_left).abs() < f64::EPSILON);
        assert!((dash.progress.burn - 0.5).abs() < f64::EPSILON);
        assert_eq!(dash.logging_streak, 2);
        assert!((dash.weight_to_goal_kg - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_history_includes_empty_days() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.append_food(&food(today(), MealSlot::Lunch, 600.0)).unwrap();
        store.append_food(&food(days_ago(2), MealSlot::Lunch, 400.0)).unwrap();
        store.append_food(&food(days_ago(9), MealSlot::Lunch, 999.0)).unwrap();

        let days = history(&store, today(), 3);
        assert_eq!(days.len(), 3);
        assert_eq!(days[0].date, days_ago(2));
        assert_eq!(days[0].entry_count, 1);
        assert_eq!(days[1].entry_count, 0);
        assert!((days[2].totals.calories - 600.0).abs() < f64::EPSILON);
        assert!(history(&store, today(), 0).is_empty());
    }
}
