use anyhow::{Result, bail};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use platelog_core::models::DATE_FORMAT;
use platelog_core::service::NutritionService;
use platelog_core::user::UserId;

use super::helpers::{no_neg_zero, parse_date};

const LBS_PER_KG: f64 = 2.20462;
const KG_PER_LB: f64 = 0.453_592;

fn to_kg(value: f64, unit: &str) -> Result<f64> {
    if value <= 0.0 {
        bail!("Weight must be greater than 0");
    }
    match unit.to_lowercase().as_str() {
        "kg" => Ok(value),
        "lbs" | "lb" => Ok(no_neg_zero(value * KG_PER_LB)),
        _ => bail!("Invalid unit '{unit}'. Use 'kg' or 'lbs'"),
    }
}

/// Record weight for a date. A second entry on the same date replaces the first.
pub(crate) fn cmd_weight_log(
    svc: &NutritionService,
    user: &UserId,
    value: f64,
    unit: &str,
    date: Option<&str>,
    json: bool,
) -> Result<()> {
    let weight_kg = to_kg(value, unit)?;
    if !unit.eq_ignore_ascii_case("kg") {
        eprintln!("Converting {value:.1} lbs → {weight_kg:.2} kg");
    }

    let date = parse_date(date, svc.today())?;
    let result = svc.log_weight(user, weight_kg, Some(date))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        let lbs = result.weight_kg * LBS_PER_KG;
        println!(
            "Logged {:.1} kg ({:.1} lbs) for {}",
            result.weight_kg,
            lbs,
            result.date.format(DATE_FORMAT)
        );
        let goal = svc.get_profile(user)?.goal_weight_kg;
        let delta = result.weight_kg - goal;
        if delta.abs() < 0.05 {
            println!("  At goal weight ({goal:.1} kg)");
        } else {
            println!("  {:.1} kg to goal ({goal:.1} kg)", delta.abs());
        }
    }

    Ok(())
}

pub(crate) fn cmd_weight_history(
    svc: &NutritionService,
    user: &UserId,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let entries = svc.weight_history(user, limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        eprintln!("No weight entries found. Use `platelog weight log` to record your weight.");
    } else {
        #[derive(Tabled)]
        struct WeightRow {
            #[tabled(rename = "Date")]
            date: String,
            #[tabled(rename = "Weight (kg)")]
            kg: String,
            #[tabled(rename = "Weight (lbs)")]
            lbs: String,
            #[tabled(rename = "Change")]
            change: String,
        }

        // entries are newest first; change is relative to the previous (older) row
        let rows: Vec<WeightRow> = entries
            .iter()
            .enumerate()
            .map(|(i, e)| WeightRow {
                date: e.date.format(DATE_FORMAT).to_string(),
                kg: format!("{:.1}", e.weight_kg),
                lbs: format!("{:.1}", e.weight_kg * LBS_PER_KG),
                change: entries.get(i + 1).map_or_else(String::new, |older| {
                    format!("{:+.1}", no_neg_zero(e.weight_kg - older.weight_kg))
                }),
            })
            .collect();

        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(1..4)).with(Alignment::right()))
            .to_string();
        println!("{table}");
    }

    Ok(())
}
