use anyhow::Result;
use serde::Serialize;
use std::process;

use platelog_core::service::NutritionService;
use platelog_core::user::UserId;

use super::helpers::json_error;

#[derive(Serialize)]
struct UserRow {
    name: String,
    user_id: Option<UserId>,
}

pub(crate) fn cmd_user_add(svc: &NutritionService, name: &str, json: bool) -> Result<()> {
    let user_id = svc.register_user(name)?;
    let name = name.trim();
    let sharing: Vec<String> = svc
        .list_users()
        .into_iter()
        .filter(|n| n != name && UserId::from_display_name(n).is_ok_and(|id| id == user_id))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&UserRow {
            name: name.to_string(),
            user_id: Some(user_id),
        })?);
        return Ok(());
    }

    println!("Registered '{name}' (data in users/{user_id})");
    if !sharing.is_empty() {
        eprintln!(
            "Warning: '{name}' shares storage with {}; their logs are merged",
            sharing.join(", ")
        );
    }
    Ok(())
}

pub(crate) fn cmd_user_list(svc: &NutritionService, json: bool) -> Result<()> {
    let names = svc.list_users();

    if names.is_empty() {
        if json {
            println!("{}", json_error("No users registered"));
        } else {
            eprintln!("No users registered. Add one with: platelog user add NAME");
        }
        process::exit(2);
    }

    if json {
        let rows: Vec<UserRow> = names
            .into_iter()
            .map(|name| UserRow {
                user_id: UserId::from_display_name(&name).ok(),
                name,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for name in &names {
        match UserId::from_display_name(name) {
            Ok(id) if id.as_str() == name => println!("  {name}"),
            Ok(id) => println!("  {name} ({id})"),
            Err(_) => println!("  {name} (invalid)"),
        }
    }
    Ok(())
}
