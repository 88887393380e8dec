use anyhow::Result;
use std::process;

use platelog_core::models::{MealFields, MealSlot};
use platelog_core::pipeline::SessionContext;
use platelog_core::service::NutritionService;
use platelog_core::user::UserId;

use super::helpers::{describe_entry, json_error, parse_date, print_food_table};

/// Log a meal with known nutrition values, without the AI.
#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_food_add(
    svc: &NutritionService,
    user: &UserId,
    name: &str,
    calories: f64,
    protein: Option<f64>,
    carbs: Option<f64>,
    fat: Option<f64>,
    meal: Option<&str>,
    json: bool,
) -> Result<()> {
    let slot = meal.map(str::parse::<MealSlot>).transpose()?;
    let fields = MealFields {
        name: name.trim().to_string(),
        calories,
        protein_g: protein.unwrap_or(0.0),
        carbs_g: carbs.unwrap_or(0.0),
        fat_g: fat.unwrap_or(0.0),
    };

    let mut session = SessionContext::new(user.clone());
    let entry = svc.log_manual_meal(&mut session, fields, slot)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        println!("Logged: {}", describe_entry(&entry));
    }
    Ok(())
}

/// List logged food, for one date or (with `all`) every date.
pub(crate) fn cmd_food_list(
    svc: &NutritionService,
    user: &UserId,
    date: Option<&str>,
    all: bool,
    json: bool,
) -> Result<()> {
    let filter = if all {
        None
    } else {
        Some(parse_date(date, svc.today())?)
    };
    let entries = svc.list_food(user, filter)?;

    if entries.is_empty() {
        let msg = match filter {
            Some(d) => format!("No food logged on {d}"),
            None => "No food logged yet".to_string(),
        };
        if json {
            println!("{}", json_error(&msg));
        } else {
            eprintln!("{msg}");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    print_food_table(&entries);
    Ok(())
}
