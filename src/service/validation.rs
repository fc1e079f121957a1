//! Request shaping (types, required fields, key handling) and per-field rules from config.

use crate::config::{ResolvedEntity, ValidationRule};
use crate::error::AppError;
use crate::record::{coerce, value_eq, Record};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

/// Which write a body is shaped for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteMode {
    /// Every required field must be present; generated keys are left for the engine.
    Create,
    /// Every non-key field is written; an omitted one becomes null.
    Replace,
    /// Only present, non-null fields are written.
    Patch,
}

pub struct RequestValidator;

impl RequestValidator {
    /// Turn a raw body into the exact set of column writes for `mode`, with canonical values.
    pub fn shape(entity: &ResolvedEntity, body: &Record, mode: WriteMode) -> Result<Record, AppError> {
        if let Some(unknown) = body.keys().find(|k| entity.column(k).is_none()) {
            return Err(AppError::InvalidInput(format!(
                "unknown field '{}' for {}",
                unknown, entity.path_segment
            )));
        }
        let mut out = Record::new();
        for col in &entity.columns {
            if col.generated {
                continue;
            }
            let raw = body.get(&col.name).unwrap_or(&Value::Null);
            let value = coerce(col, raw)?;
            match mode {
                WriteMode::Patch => {
                    if value.is_null() {
                        continue;
                    }
                }
                WriteMode::Replace if col.is_key => {
                    if value.is_null() {
                        continue;
                    }
                }
                WriteMode::Create | WriteMode::Replace => {
                    if value.is_null() && !col.nullable {
                        return Err(AppError::InvalidInput(format!("{} is required", col.name)));
                    }
                }
            }
            if !col.nullable && value.as_str().map(|s| s.trim().is_empty()).unwrap_or(false) {
                return Err(AppError::InvalidInput(format!("{} is empty", col.name)));
            }
            out.insert(col.name.clone(), value);
        }
        Ok(out)
    }

    /// Validate every present, non-null field against its rule.
    pub fn validate(body: &Record, rules: &HashMap<String, ValidationRule>) -> Result<(), AppError> {
        for (col, v) in body {
            if let Some(rule) = rules.get(col) {
                validate_field(col, v, rule)?;
            }
        }
        Ok(())
    }
}

fn validate_field(col: &str, v: &Value, rule: &ValidationRule) -> Result<(), AppError> {
    if v.is_null() {
        return Ok(());
    }
    if let Some(max) = rule.max_length {
        if let Some(s) = v.as_str() {
            if s.chars().count() > max as usize {
                return Err(AppError::InvalidInput(format!(
                    "{} must be at most {} characters",
                    col, max
                )));
            }
        }
    }
    if let Some(min) = rule.min_length {
        if let Some(s) = v.as_str() {
            if s.chars().count() < min as usize {
                return Err(AppError::InvalidInput(format!(
                    "{} must be at least {} characters",
                    col, min
                )));
            }
        }
    }
    if let Some(ref pattern) = rule.pattern {
        let re = Regex::new(pattern).map_err(|_| AppError::InvalidInput(format!("invalid pattern for {}", col)))?;
        if let Some(s) = v.as_str() {
            if !re.is_match(s) {
                return Err(AppError::InvalidInput(format!("{} does not match required pattern", col)));
            }
        }
    }
    if let Some(ref allowed) = rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            return Err(AppError::InvalidInput(format!(
                "{} must be one of: {:?}",
                col,
                allowed.iter().take(5).collect::<Vec<_>>()
            )));
        }
    }
    if let Some(min) = rule.minimum {
        if let Some(n) = v.as_f64() {
            if n < min {
                return Err(AppError::InvalidInput(format!("{} must be at least {}", col, min)));
            }
        }
    }
    if let Some(max) = rule.maximum {
        if let Some(n) = v.as_f64() {
            if n > max {
                return Err(AppError::InvalidInput(format!("{} must be at most {}", col, max)));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{builtin_config, resolve, ResolvedModel};
    use serde_json::json;

    fn model() -> ResolvedModel {
        resolve(&builtin_config().unwrap()).unwrap()
    }

    fn record(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn create_requires_non_nullable_fields_and_rejects_blank_text() {
        let model = model();
        let units = model.entity_by_path("units").unwrap();
        let err = RequestValidator::shape(units, &Record::new(), WriteMode::Create).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(m) if m == "unit is required"));
        let err = RequestValidator::shape(units, &record(json!({"unit": "  "})), WriteMode::Create).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(m) if m == "unit is empty"));
    }

    #[test]
    fn create_ignores_client_supplied_generated_key() {
        let model = model();
        let fertilizers = model.entity_by_path("fertilizers").unwrap();
        let body = record(json!({"id": "c3244185-8318-41a7-9e10-84eaa772ab4b", "unit": "KG", "name": "NPK"}));
        let shaped = RequestValidator::shape(fertilizers, &body, WriteMode::Create).unwrap();
        assert!(!shaped.contains_key("id"));
        assert_eq!(shaped["name"], json!("NPK"));
    }

    #[test]
    fn replace_writes_null_for_omitted_nullable_fields() {
        let model = model();
        let plots = model.entity_by_path("plots").unwrap();
        let shaped = RequestValidator::shape(plots, &record(json!({"surface": 12})), WriteMode::Replace).unwrap();
        assert_eq!(shaped["surface"], json!(12));
        assert_eq!(shaped["name"], Value::Null);
        assert_eq!(shaped["location"], Value::Null);
        assert!(!shaped.contains_key("number"));
    }

    #[test]
    fn replace_rejects_null_on_required_field() {
        let model = model();
        let productions = model.entity_by_path("productions").unwrap();
        let err = RequestValidator::shape(productions, &record(json!({"unit": "KG"})), WriteMode::Replace)
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(m) if m == "name is required"));
    }

    #[test]
    fn patch_keeps_only_present_non_null_fields() {
        let model = model();
        let productions = model.entity_by_path("productions").unwrap();
        let shaped = RequestValidator::shape(
            productions,
            &record(json!({"name": "EC 200L", "unit": null})),
            WriteMode::Patch,
        )
        .unwrap();
        assert_eq!(shaped, record(json!({"name": "EC 200L"})));
    }

    #[test]
    fn unknown_fields_and_wrong_types_are_invalid_input() {
        let model = model();
        let plots = model.entity_by_path("plots").unwrap();
        assert!(RequestValidator::shape(plots, &record(json!({"colour": "red"})), WriteMode::Patch).is_err());
        assert!(RequestValidator::shape(plots, &record(json!({"surface": "big"})), WriteMode::Patch).is_err());
    }

    #[test]
    fn rules_apply_to_present_values() {
        let mut rules = HashMap::new();
        rules.insert(
            "spread_quantity".to_string(),
            ValidationRule {
                minimum: Some(0.0),
                ..Default::default()
            },
        );
        rules.insert(
            "code".to_string(),
            ValidationRule {
                pattern: Some("^[A-Z]".into()),
                ..Default::default()
            },
        );
        assert!(RequestValidator::validate(&record(json!({"spread_quantity": 4})), &rules).is_ok());
        assert!(RequestValidator::validate(&record(json!({"spread_quantity": -1})), &rules).is_err());
        assert!(RequestValidator::validate(&record(json!({"code": "n"})), &rules).is_err());
        assert!(RequestValidator::validate(&Record::new(), &rules).is_ok());
    }
}
