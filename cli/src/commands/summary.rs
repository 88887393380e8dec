use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use platelog_core::models::{DATE_FORMAT, Dashboard};
use platelog_core::pipeline::SessionContext;
use platelog_core::service::NutritionService;
use platelog_core::user::UserId;

use super::helpers::{json_error, no_neg_zero, parse_date, progress_bar};

/// Daily dashboard: meals grouped by slot, totals against targets, water and weight.
pub(crate) fn cmd_summary(
    svc: &NutritionService,
    user: &UserId,
    date: Option<&str>,
    burned: Option<i64>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date, svc.today())?;
    let mut session = SessionContext::new(user.clone());
    if let Some(kcal) = burned {
        session.add_burn(kcal)?;
    }
    let dashboard = svc.get_dashboard(&session, date)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&dashboard)?);
        return Ok(());
    }

    print_dashboard(&dashboard);
    Ok(())
}

fn print_dashboard(d: &Dashboard) {
    let date = d.date.format(DATE_FORMAT);
    println!("=== {date} ===\n");

    if d.summary.meals.is_empty() {
        println!("  No meals logged\n");
    }
    for group in &d.summary.meals {
        let label = group.meal_slot.as_str().to_uppercase();
        let sub = group.subtotal.calories;
        println!("  {label} ({sub:.0} kcal)");
        for e in &group.entries {
            println!(
                "    {} {} — {:.0} kcal | P:{:.0}g C:{:.0}g F:{:.0}g",
                e.time.format("%H:%M"),
                e.name,
                e.calories,
                e.protein_g,
                e.carbs_g,
                e.fat_g
            );
        }
        println!();
    }

    let t = &d.summary.totals;
    let g = &d.targets;
    let r = &d.remaining;
    let p = &d.progress;
    println!(
        "  TOTAL:     {:.0} kcal | P:{:.0}g C:{:.0}g F:{:.0}g",
        t.calories, t.protein_g, t.carbs_g, t.fat_g
    );
    println!(
        "  TARGET:    {} kcal | P:{}g C:{}g F:{}g",
        g.calorie_target, g.protein_target_g, g.carb_target_g, g.fat_target_g
    );
    println!(
        "  REMAINING: {:.0} kcal | P:{:.0}g C:{:.0}g F:{:.0}g\n",
        no_neg_zero(r.calories),
        no_neg_zero(r.protein_g),
        no_neg_zero(r.carbs_g),
        no_neg_zero(r.fat_g)
    );

    let bars = [
        ("Calories", p.calories),
        ("Protein", p.protein),
        ("Carbs", p.carbs),
        ("Fat", p.fat),
        ("Water", p.water),
        ("Burn", p.burn),
    ];
    for (label, ratio) in bars {
        println!("  {label:<9}{} {:>4.0}%", progress_bar(ratio), ratio * 100.0);
    }
    println!();

    println!(
        "  Water: {:.0} / {} ml",
        d.summary.water_ml, g.water_target_ml
    );
    println!("  Burned: {} / {} kcal", d.burned_kcal, g.burn_target_kcal);
    println!(
        "  Weight: {:.1} kg (goal {:.1} kg, {:+.1} kg to go)",
        d.current_weight_kg,
        d.goal_weight_kg,
        no_neg_zero(d.weight_to_goal_kg)
    );
    let days = if d.logging_streak == 1 { "day" } else { "days" };
    println!("  Streak: {} {days}", d.logging_streak);
}

/// Per-day totals for the last `days` days ending today.
pub(crate) fn cmd_history(
    svc: &NutritionService,
    user: &UserId,
    days: u32,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct HistoryRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Meals")]
        meals: usize,
        #[tabled(rename = "Calories")]
        calories: String,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Carbs")]
        carbs: String,
        #[tabled(rename = "Fat")]
        fat: String,
        #[tabled(rename = "Water")]
        water: String,
    }

    let history = svc.get_history(user, days)?;

    if history.iter().all(|d| d.entry_count == 0 && d.water_ml == 0.0) {
        let message = format!("No entries in the last {days} days");
        if json {
            println!("{}", json_error(&message));
        } else {
            eprintln!("{message}");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }

    let rows: Vec<HistoryRow> = history
        .iter()
        .map(|d| HistoryRow {
            date: d.date.format(DATE_FORMAT).to_string(),
            meals: d.entry_count,
            calories: format!("{:.0}", no_neg_zero(d.totals.calories)),
            protein: format!("{:.0}g", no_neg_zero(d.totals.protein_g)),
            carbs: format!("{:.0}g", no_neg_zero(d.totals.carbs_g)),
            fat: format!("{:.0}g", no_neg_zero(d.totals.fat_g)),
            water: format!("{:.0}ml", no_neg_zero(d.water_ml)),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}
