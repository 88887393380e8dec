use anyhow::Result;

use platelog_core::service::NutritionService;
use platelog_core::user::UserId;

use super::helpers::{parse_date, progress_bar};

pub(crate) fn cmd_water_add(
    svc: &NutritionService,
    user: &UserId,
    volume_ml: f64,
    date: Option<&str>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date, svc.today())?;
    let entry = svc.log_water(user, volume_ml, Some(date))?;
    let total = svc.water_total(user, date)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        println!("Added {volume_ml:.0} ml of water ({total:.0} ml on {date})");
    }
    Ok(())
}

pub(crate) fn cmd_water_show(
    svc: &NutritionService,
    user: &UserId,
    date: Option<&str>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date, svc.today())?;
    let total = svc.water_total(user, date)?;
    let target = svc.get_targets(user)?.water_target_ml;

    if json {
        println!(
            "{}",
            serde_json::json!({ "date": date, "total_ml": total, "target_ml": target })
        );
        return Ok(());
    }

    #[allow(clippy::cast_precision_loss)]
    let ratio = if target > 0 { total / target as f64 } else { 0.0 };
    println!(
        "{date}: {total:.0} / {target} ml {}",
        progress_bar(ratio)
    );
    Ok(())
}
