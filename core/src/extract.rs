//! Pull a meal record out of free-form model output.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ExtractionError;
use crate::models::MealFields;

/// Name used when the reply carries no usable `name`.
pub const PLACEHOLDER_NAME: &str = "Unnamed meal";

/// Locate the outermost `{ ... }` in `raw` and read a meal from it.
///
/// Code fences and surrounding prose are ignored. Numeric fields that are missing,
/// non-numeric, negative or non-finite become 0; a missing or blank name becomes
/// [`PLACEHOLDER_NAME`]. Only the absence of a parseable JSON object is an error.
pub fn extract_meal(raw: &str) -> Result<MealFields, ExtractionError> {
    let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) else {
        return Err(ExtractionError::MalformedResponse);
    };
    if end < start {
        return Err(ExtractionError::MalformedResponse);
    }

    let object: Map<String, Value> = serde_json::from_str(&raw[start..=end]).map_err(|e| {
        debug!(error = %e, "model reply is not a JSON object");
        ExtractionError::MalformedResponse
    })?;

    let name = object
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(PLACEHOLDER_NAME)
        .to_string();

    Ok(MealFields {
        name,
        calories: number(&object, &["calories", "kcal"]),
        protein_g: number(&object, &["protein", "protein_g"]),
        carbs_g: number(&object, &["carbs", "carbs_g", "carbohydrates"]),
        fat_g: number(&object, &["fat", "fat_g"]),
    })
}

fn number(object: &Map<String, Value>, keys: &[&str]) -> f64 {
    keys.iter()
        .find_map(|k| object.get(*k))
        .and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            // models sometimes quote numbers or append units ("12g")
            Value::String(s) => leading_number(s),
            _ => None,
        })
        .filter(|n| n.is_finite() && *n >= 0.0)
        .unwrap_or(0.0)
}

fn leading_number(s: &str) -> Option<f64> {
    let s = s.trim();
    let end = s
        .char_indices()
        .find(|&(_, c)| !(c.is_ascii_digit() || c == '.'))
        .map_or(s.len(), |(i, _)| i);
    s[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < f64::EPSILON, "{a} != {b}");
    }

    #[test]
    fn test_plain_json() {
        let meal = extract_meal(
            r#"{"name": "Oatmeal", "calories": 300, "protein": 10.5, "carbs": 54, "fat": 6}"#,
        )
        .unwrap();
        assert_eq!(meal.name, "Oatmeal");
        assert_close(meal.calories, 300.0);
        assert_close(meal.protein_g, 10.5);
        assert_close(meal.carbs_g, 54.0);
        assert_close(meal.fat_g, 6.0);
    }

    #[test]
    fn test_fenced_json_with_prose_defaults_missing_macros() {
        let raw = "Here you go:\n```json\n{\"name\":\"Apple\",\"calories\":95}\n```\nEnjoy!";
        let meal = extract_meal(raw).unwrap();
        assert_eq!(
            meal,
            MealFields {
                name: "Apple".to_string(),
                calories: 95.0,
                protein_g: 0.0,
                carbs_g: 0.0,
                fat_g: 0.0,
            }
        );
    }

    #[test]
    fn test_no_braces_is_malformed() {
        assert_eq!(
            extract_meal("I could not identify this meal."),
            Err(ExtractionError::MalformedResponse)
        );
    }

    #[test]
    fn test_reversed_braces_is_malformed() {
        assert_eq!(
            extract_meal("} nothing here {"),
            Err(ExtractionError::MalformedResponse)
        );
    }

    #[test]
    fn test_invalid_json_between_braces_is_malformed() {
        assert_eq!(
            extract_meal("{name: Apple, calories: 95}"),
            Err(ExtractionError::MalformedResponse)
        );
    }

    #[test]
    fn test_non_numeric_and_negative_values_default_to_zero() {
        let meal = extract_meal(
            r#"{"name": "Mystery", "calories": "unknown", "protein": -4, "carbs": null, "fat": [1]}"#,
        )
        .unwrap();
        assert_close(meal.calories, 0.0);
        assert_close(meal.protein_g, 0.0);
        assert_close(meal.carbs_g, 0.0);
        assert_close(meal.fat_g, 0.0);
    }

    #[test]
    fn test_quoted_numbers_with_units_are_read() {
        let meal = extract_meal(r#"{"name": "Toast", "calories": "120 kcal", "protein": "4g"}"#)
            .unwrap();
        assert_close(meal.calories, 120.0);
        assert_close(meal.protein_g, 4.0);
    }

    #[test]
    fn test_missing_name_uses_placeholder() {
        let meal = extract_meal(r#"{"calories": 200}"#).unwrap();
        assert_eq!(meal.name, PLACEHOLDER_NAME);
        let blank = extract_meal(r#"{"name": "  ", "calories": 200}"#).unwrap();
        assert_eq!(blank.name, PLACEHOLDER_NAME);
    }

    #[test]
    fn test_nested_objects_use_outermost_braces() {
        let raw = r#"Result: {"name": "Bowl", "calories": 500, "details": {"source": "estimate"}} done"#;
        let meal = extract_meal(raw).unwrap();
        assert_eq!(meal.name, "Bowl");
        assert_close(meal.calories, 500.0);
    }
}
