use anyhow::{Context, Result, bail};
use std::path::Path;
use std::process;

use platelog_core::analyzer::{ImagePayload, MealInput};
use platelog_core::error::IngestionError;
use platelog_core::pipeline::SessionContext;
use platelog_core::service::NutritionService;
use platelog_core::user::UserId;

use crate::config::Config;
use crate::gemini::GeminiClient;

use super::helpers::{describe_entry, json_error, parse_date};

fn read_image(path: &Path) -> Result<ImagePayload> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read image: {}", path.display()))?;
    if bytes.is_empty() {
        bail!("Image file is empty: {}", path.display());
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    Ok(ImagePayload::from_extension(ext, bytes))
}

fn meal_input(description: Option<String>, image: Option<&Path>) -> Result<MealInput> {
    let description = description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());
    let image = image.map(read_image).transpose()?;
    Ok(match (description, image) {
        (Some(text), Some(image)) => MealInput::TextAndImage(text, image),
        (Some(text), None) => MealInput::Text(text),
        (None, Some(image)) => MealInput::Image(image),
        (None, None) => bail!("Describe the meal, pass --image PATH, or both"),
    })
}

/// Analyze a meal with Gemini and log it.
pub(crate) fn cmd_log(
    svc: &NutritionService,
    config: &Config,
    user: &UserId,
    description: Option<String>,
    image: Option<&Path>,
    json: bool,
) -> Result<()> {
    let input = meal_input(description, image)?;
    let api_key = config.gemini_api_key()?;
    let client = GeminiClient::new(api_key, &config.model, config.ai_timeout)?;
    let mut session = SessionContext::new(user.clone());

    // The client blocks on the runtime handle; step off the async worker first.
    let result = tokio::task::block_in_place(|| svc.log_meal(&client, &mut session, &input));

    match result {
        Ok(entry) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&entry)?);
            } else {
                println!("Logged: {}", describe_entry(&entry));
            }
            Ok(())
        }
        Err(IngestionError::Storage(e)) => Err(e.context("Meal was analyzed but not saved")),
        Err(e) => {
            if json {
                println!("{}", json_error(&e.to_string()));
            } else {
                eprintln!("Meal not logged: {e}");
            }
            process::exit(1);
        }
    }
}

/// Remove the last meal logged on a date.
pub(crate) fn cmd_undo(
    svc: &NutritionService,
    user: &UserId,
    date: Option<&str>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date, svc.today())?;
    match svc.undo_last_meal(user, Some(date))? {
        Some(entry) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&entry)?);
            } else {
                println!("Removed: {}", describe_entry(&entry));
            }
            Ok(())
        }
        None => {
            if json {
                println!("{}", json_error(&format!("No meals logged on {date}")));
            } else {
                eprintln!("No meals logged on {date}");
            }
            process::exit(2);
        }
    }
}
