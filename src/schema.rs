//! Structured-output contract for the analysis response.
//!
//! The same descriptor is sent to Gemini as `responseSchema` and checked locally
//! against every reply before it reaches a caller.

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::models::{FoodAnalysis, RiskLevel, Verdict};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("model returned no text (finish reason: {})", .finish_reason.as_deref().unwrap_or("unknown"))]
    EmptyResponse { finish_reason: Option<String> },
    #[error("response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing required field `{path}`")]
    MissingField { path: String },
    #[error("field `{path}` should be {expected}")]
    WrongType { path: String, expected: &'static str },
    #[error("field `{path}` has value {value} outside the allowed set")]
    NotInEnum { path: String, value: String },
    #[error("field `{path}` = {value} is outside [{min}, {max}]")]
    OutOfRange { path: String, value: f64, min: f64, max: f64 },
}

fn string_enum(values: impl IntoIterator<Item = &'static str>) -> Value {
    Value::Array(values.into_iter().map(|v| Value::String(v.into())).collect())
}

pub fn analysis_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "productName": { "type": "STRING", "description": "The identified name of the product. If the brand is hidden, use the product category (e.g. 'Orange Juice')." },
            "healthScore": { "type": "INTEGER", "minimum": 0, "maximum": 100, "description": "A health score from 0 (very unhealthy) to 100 (very healthy)." },
            "verdict": {
                "type": "STRING",
                "enum": string_enum(Verdict::ALL.iter().map(Verdict::as_str)),
                "description": "A single word verdict on the overall healthiness."
            },
            "summary": { "type": "STRING", "description": "A short paragraph summarizing the analysis." },
            "pros": { "type": "ARRAY", "items": { "type": "STRING" }, "description": "Positive aspects, e.g. high protein, no added sugar." },
            "cons": { "type": "ARRAY", "items": { "type": "STRING" }, "description": "Negative aspects, e.g. high sodium, palm oil." },
            "alternatives": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "productName": { "type": "STRING", "description": "Name of a healthier generic alternative." },
                        "reason": { "type": "STRING", "description": "Why this alternative is better." }
                    },
                    "required": ["productName", "reason"]
                },
                "description": "If healthScore < 60, 2-3 healthier generic alternatives. Otherwise leave empty."
            },
            "additives": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "code": { "type": "STRING", "description": "E-number if available, or name." },
                        "name": { "type": "STRING", "description": "Common name of the additive." },
                        "riskLevel": { "type": "STRING", "enum": string_enum(RiskLevel::ALL.iter().map(RiskLevel::as_str)) },
                        "description": { "type": "STRING", "description": "Short description of why it is good or bad." }
                    },
                    "required": ["code", "name", "riskLevel", "description"]
                },
                "description": "Notable additives found on the label."
            },
            "highlights": { "type": "ARRAY", "items": { "type": "STRING" }, "description": "Key highlights like 'High Protein' or 'Low Carb'." },
            "isVegetarian": { "type": "BOOLEAN" },
            "isGlutenFree": { "type": "BOOLEAN" },
            "isPalmOilFree": { "type": "BOOLEAN" }
        },
        "required": [
            "productName", "healthScore", "verdict", "summary", "pros", "cons",
            "additives", "highlights", "isVegetarian", "isGlutenFree", "isPalmOilFree"
        ]
    })
}

/// Checks `value` against a schema descriptor; extra fields are ignored.
pub fn validate(value: &Value, schema: &Value) -> Result<(), ValidationError> {
    check(value, schema, "")
}

/// Strict parse of model output into a [`FoodAnalysis`].
pub fn parse_analysis(text: &str) -> Result<FoodAnalysis, ValidationError> {
    let value: Value = serde_json::from_str(text.trim())?;
    validate(&value, &analysis_schema())?;
    Ok(serde_json::from_value(value)?)
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() { key.to_string() } else { format!("{path}.{key}") }
}

fn check(value: &Value, schema: &Value, path: &str) -> Result<(), ValidationError> {
    let kind = schema
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_ascii_uppercase)
        .unwrap_or_default();
    let wrong = |expected| ValidationError::WrongType { path: display_path(path), expected };

    match kind.as_str() {
        "OBJECT" => {
            let object = value.as_object().ok_or_else(|| wrong("an object"))?;
            check_object(object, schema, path)?;
        }
        "ARRAY" => {
            let items = value.as_array().ok_or_else(|| wrong("an array"))?;
            if let Some(item_schema) = schema.get("items") {
                for (i, item) in items.iter().enumerate() {
                    check(item, item_schema, &format!("{path}[{i}]"))?;
                }
            }
        }
        "STRING" => {
            let text = value.as_str().ok_or_else(|| wrong("a string"))?;
            if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
                if !allowed.iter().any(|v| v.as_str() == Some(text)) {
                    return Err(ValidationError::NotInEnum { path: display_path(path), value: format!("{text:?}") });
                }
            }
        }
        "INTEGER" => {
            let whole = value.as_i64().is_some() || value.as_u64().is_some();
            if !whole {
                return Err(wrong("an integer"));
            }
            check_bounds(value, schema, path)?;
        }
        "NUMBER" => {
            if !value.is_number() {
                return Err(wrong("a number"));
            }
            check_bounds(value, schema, path)?;
        }
        "BOOLEAN" => {
            if !value.is_boolean() {
                return Err(wrong("a boolean"));
            }
        }
        _ => {}
    }
    Ok(())
}

fn check_object(object: &Map<String, Value>, schema: &Value, path: &str) -> Result<(), ValidationError> {
    let required = schema.get("required").and_then(Value::as_array);
    for key in required.into_iter().flatten().filter_map(Value::as_str) {
        if object.get(key).map_or(true, Value::is_null) {
            return Err(ValidationError::MissingField { path: join(path, key) });
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };
    for (key, property) in properties {
        match object.get(key) {
            // Optional fields may be omitted or sent as null.
            None | Some(Value::Null) => {}
            Some(field) => check(field, property, &join(path, key))?,
        }
    }
    Ok(())
}

fn check_bounds(value: &Value, schema: &Value, path: &str) -> Result<(), ValidationError> {
    let Some(number) = value.as_f64() else { return Ok(()) };
    let min = schema.get("minimum").and_then(Value::as_f64).unwrap_or(f64::NEG_INFINITY);
    let max = schema.get("maximum").and_then(Value::as_f64).unwrap_or(f64::INFINITY);
    if number < min || number > max {
        return Err(ValidationError::OutOfRange { path: display_path(path), value: number, min, max });
    }
    Ok(())
}

fn display_path(path: &str) -> String {
    if path.is_empty() { "<root>".to_string() } else { path.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Value {
        json!({
            "productName": "Cola",
            "healthScore": 22,
            "verdict": "Bad",
            "summary": "Yüksek şeker içeriği.",
            "pros": [],
            "cons": ["Yüksek şeker"],
            "additives": [
                { "code": "E150d", "name": "Karamel", "riskLevel": "Moderate", "description": "Renklendirici." }
            ],
            "alternatives": [
                { "productName": "Maden suyu", "reason": "Şekersiz" }
            ],
            "highlights": ["Kafeinli"],
            "isVegetarian": true,
            "isGlutenFree": true,
            "isPalmOilFree": true
        })
    }

    #[test]
    fn schema_declares_closed_enums_and_required_additive_fields() {
        let schema = analysis_schema();
        assert_eq!(
            schema["properties"]["verdict"]["enum"],
            json!(["Excellent", "Good", "Average", "Poor", "Bad"])
        );
        let additive = &schema["properties"]["additives"]["items"];
        assert_eq!(additive["properties"]["riskLevel"]["enum"], json!(["Safe", "Moderate", "High"]));
        assert_eq!(additive["required"], json!(["code", "name", "riskLevel", "description"]));
        let required = schema["required"].as_array().unwrap();
        assert!(!required.contains(&json!("alternatives")));
        assert_eq!(required.len(), 11);
    }

    #[test]
    fn well_formed_response_parses() {
        let analysis = parse_analysis(&sample().to_string()).unwrap();
        assert_eq!(analysis.health_score, 22);
        assert_eq!(analysis.verdict, Verdict::Bad);
        assert_eq!(analysis.additives[0].risk_level, RiskLevel::Moderate);
        assert_eq!(analysis.additives[0].code.as_deref(), Some("E150d"));
        assert!(analysis.has_alternatives());
    }

    #[test]
    fn extra_fields_and_missing_alternatives_are_accepted() {
        let mut value = sample();
        value["servingSize"] = json!("330ml");
        value.as_object_mut().unwrap().remove("alternatives");
        let analysis = parse_analysis(&value.to_string()).unwrap();
        assert!(analysis.alternatives.is_none());
    }

    #[test]
    fn additive_without_risk_level_is_rejected() {
        let mut value = sample();
        value["additives"][0].as_object_mut().unwrap().remove("riskLevel");
        let err = parse_analysis(&value.to_string()).unwrap_err();
        assert!(
            matches!(&err, ValidationError::MissingField { path } if path == "additives[0].riskLevel"),
            "{err}"
        );
    }

    #[test]
    fn unknown_verdict_is_rejected() {
        let mut value = sample();
        value["verdict"] = json!("Terrible");
        let err = parse_analysis(&value.to_string()).unwrap_err();
        assert!(matches!(err, ValidationError::NotInEnum { .. }));
    }

    #[test]
    fn unknown_risk_level_is_rejected() {
        let mut value = sample();
        value["additives"][0]["riskLevel"] = json!("Low");
        let err = parse_analysis(&value.to_string()).unwrap_err();
        assert!(matches!(&err, ValidationError::NotInEnum { path, .. } if path == "additives[0].riskLevel"));
    }

    #[test]
    fn score_outside_bounds_is_rejected() {
        for score in [json!(101), json!(-1)] {
            let mut value = sample();
            value["healthScore"] = score;
            let err = parse_analysis(&value.to_string()).unwrap_err();
            assert!(matches!(err, ValidationError::OutOfRange { .. }), "{err}");
        }
    }

    #[test]
    fn fractional_score_is_rejected() {
        let mut value = sample();
        value["healthScore"] = json!(55.5);
        let err = parse_analysis(&value.to_string()).unwrap_err();
        assert!(matches!(err, ValidationError::WrongType { expected: "an integer", .. }));
    }

    #[test]
    fn wrong_boolean_type_is_rejected() {
        let mut value = sample();
        value["isVegetarian"] = json!("yes");
        let err = parse_analysis(&value.to_string()).unwrap_err();
        assert!(matches!(&err, ValidationError::WrongType { path, .. } if path == "isVegetarian"));
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = parse_analysis("{\"productName\": ").unwrap_err();
        assert!(matches!(err, ValidationError::Json(_)));
    }
}
