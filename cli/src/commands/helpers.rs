use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use platelog_core::models::{DATE_FORMAT, FoodEntry};
use platelog_core::service::NutritionService;
use platelog_core::user::UserId;

/// Resolve a date argument against the service clock's `today`.
pub(crate) fn parse_date(date_str: Option<&str>, today: NaiveDate) -> Result<NaiveDate> {
    match date_str {
        None | Some("today") => Ok(today),
        Some("yesterday") => Ok(today - chrono::Duration::days(1)),
        Some("tomorrow") => Ok(today + chrono::Duration::days(1)),
        Some(s) => NaiveDate::parse_from_str(s, DATE_FORMAT).with_context(|| {
            format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
        }),
    }
}

/// The user selected with `--user` / `PLATELOG_USER`, registered on first use.
pub(crate) fn active_user(svc: &NutritionService, name: Option<&str>) -> Result<UserId> {
    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        bail!("No user selected. Pass --user NAME or set PLATELOG_USER");
    };
    svc.register_user(name)
}

pub(crate) fn print_food_table(entries: &[FoodEntry]) {
    #[derive(Tabled)]
    struct FoodRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Time")]
        time: String,
        #[tabled(rename = "Meal")]
        meal: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "kcal")]
        calories: String,
        #[tabled(rename = "P")]
        protein: String,
        #[tabled(rename = "C")]
        carbs: String,
        #[tabled(rename = "F")]
        fat: String,
    }

    let rows: Vec<FoodRow> = entries
        .iter()
        .map(|e| FoodRow {
            date: e.date.format(DATE_FORMAT).to_string(),
            time: e.time.format("%H:%M").to_string(),
            meal: e.meal_slot.to_string(),
            name: truncate(&e.name, 35),
            calories: format!("{:.0}", no_neg_zero(e.calories)),
            protein: format!("{:.1}g", no_neg_zero(e.protein_g)),
            carbs: format!("{:.1}g", no_neg_zero(e.carbs_g)),
            fat: format!("{:.1}g", no_neg_zero(e.fat_g)),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(4..8)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn describe_entry(e: &FoodEntry) -> String {
    format!(
        "{} — {:.0} kcal | P:{:.0}g C:{:.0}g F:{:.0}g ({} {}, {})",
        e.name,
        e.calories,
        e.protein_g,
        e.carbs_g,
        e.fat_g,
        e.date.format(DATE_FORMAT),
        e.time.format("%H:%M"),
        e.meal_slot,
    )
}

/// Ten-cell progress bar for a consumed/target ratio.
pub(crate) fn progress_bar(ratio: f64) -> String {
    #[allow(clippy::cast_sign_loss)]
    let filled = (ratio.clamp(0.0, 1.0) * 10.0).round() as usize;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(10 - filled))
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
