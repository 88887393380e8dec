use anyhow::Result;
use std::process;
use tabled::{Table, Tabled, settings::Style};

use crate::config::Config;
use crate::gemini::GeminiClient;

use super::helpers::json_error;

/// List the Gemini models this key can use for content generation.
pub(crate) async fn cmd_models(config: &Config, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct ModelRow {
        #[tabled(rename = "Model")]
        name: String,
        #[tabled(rename = "Display name")]
        display_name: String,
        #[tabled(rename = "Active")]
        active: String,
    }

    let client = GeminiClient::new(config.gemini_api_key()?, &config.model, config.ai_timeout)?;
    let models = client.list_models().await?;

    if models.is_empty() {
        let msg = "No models supporting content generation are available for this key";
        if json {
            println!("{}", json_error(msg));
        } else {
            eprintln!("{msg}");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }

    let rows: Vec<ModelRow> = models
        .into_iter()
        .map(|m| ModelRow {
            active: if m.name == client.model() { "*".to_string() } else { String::new() },
            name: m.name,
            display_name: m.display_name,
        })
        .collect();
    println!("{}", Table::new(&rows).with(Style::rounded()));

    if !rows.iter().any(|r| !r.active.is_empty()) {
        eprintln!(
            "Warning: configured model '{}' is not in this list; set PLATELOG_MODEL to one above",
            client.model()
        );
    }
    Ok(())
}
