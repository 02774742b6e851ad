use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde_json::{Map, Value};

use super::schema::{FieldKind, FieldSpec};
use super::{risk_level, Resource};

/// Fields assigned by the server that a full replace must not drop
const SERVER_MANAGED: &[&str] = &["numero_registro"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    /// PUT: every required field must be present again
    Replace,
    /// PATCH: only the supplied fields are checked and merged
    Patch,
}

/// Per-field validation messages, keyed by field name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationErrors {
    errors: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.errors.get(field).map(String::as_str)
    }

    pub fn into_map(self) -> HashMap<String, String> {
        self.errors.into_iter().collect()
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.errors.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Validate a request body against the resource schema and return the data to store.
///
/// `existing` is the stored payload for updates. Derived fields (risk score and
/// level) are recomputed from the merged result and never taken from the input.
pub fn validate_payload(
    resource: Resource,
    input: &Value,
    existing: Option<&Map<String, Value>>,
    mode: WriteMode,
) -> Result<Map<String, Value>, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let Some(input) = input.as_object() else {
        errors.add("non_field_errors", "Expected a JSON object.");
        return Err(errors);
    };

    let mut data = match (mode, existing) {
        (WriteMode::Patch, Some(existing)) => existing.clone(),
        (_, Some(existing)) => SERVER_MANAGED
            .iter()
            .filter_map(|k| existing.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect(),
        (_, None) => Map::new(),
    };

    for spec in resource.fields() {
        match input.get(spec.name) {
            Some(Value::Null) if spec.required => {
                errors.add(spec.name, "This field may not be null.");
            }
            Some(Value::Null) => {
                data.insert(spec.name.to_string(), Value::Null);
            }
            Some(value) => match check_value(spec, value) {
                Ok(v) => {
                    data.insert(spec.name.to_string(), v);
                }
                Err(msg) => errors.add(spec.name, msg),
            },
            None if mode == WriteMode::Patch => {}
            None if spec.required => errors.add(spec.name, "This field is required."),
            None => {
                data.insert(spec.name.to_string(), default_value(spec));
            }
        }
    }

    if errors.is_empty() {
        apply_cross_field_rules(resource, &mut data, &mut errors);
    }

    if errors.is_empty() {
        Ok(data)
    } else {
        Err(errors)
    }
}

/// References to other records that must exist before the write is accepted
pub fn references(resource: Resource, data: &Map<String, Value>) -> Vec<(&'static str, Resource, i64)> {
    resource
        .fields()
        .iter()
        .filter_map(|spec| match spec.kind {
            FieldKind::Reference(target) => data
                .get(spec.name)
                .and_then(Value::as_i64)
                .map(|id| (spec.name, target, id)),
            _ => None,
        })
        .collect()
}

fn default_value(spec: &FieldSpec) -> Value {
    match (spec.kind, spec.default) {
        (FieldKind::Boolean, Some(d)) => Value::Bool(d == "true"),
        (_, Some(d)) => Value::String(d.to_string()),
        (_, None) => Value::Null,
    }
}

fn check_value(spec: &FieldSpec, value: &Value) -> Result<Value, String> {
    match spec.kind {
        FieldKind::Text { max_len } => {
            let s = value.as_str().ok_or_else(|| "Not a valid string.".to_string())?;
            let s = s.trim();
            if spec.required && s.is_empty() {
                return Err("This field may not be blank.".into());
            }
            if s.chars().count() > max_len {
                return Err(format!("Ensure this field has no more than {} characters.", max_len));
            }
            Ok(Value::String(s.to_string()))
        }
        FieldKind::Integer { min, max } => {
            let n = as_integer(value).ok_or_else(|| "A valid integer is required.".to_string())?;
            if n < min || n > max {
                return Err(format!("Ensure this value is between {} and {}.", min, max));
            }
            Ok(Value::from(n))
        }
        FieldKind::Boolean => match value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::String(s) if s == "true" || s == "1" => Ok(Value::Bool(true)),
            Value::String(s) if s == "false" || s == "0" => Ok(Value::Bool(false)),
            _ => Err("Must be a valid boolean.".into()),
        },
        FieldKind::Date => {
            let s = value.as_str().map(str::trim).unwrap_or_default();
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                .map_err(|_| "Date has wrong format. Use YYYY-MM-DD.".to_string())
        }
        FieldKind::Choice(choices) => {
            let s = value.as_str().map(str::trim).unwrap_or_default();
            if choices.contains(&s) {
                Ok(Value::String(s.to_string()))
            } else {
                Err(format!("\"{}\" is not a valid choice.", value_label(value)))
            }
        }
        FieldKind::Reference(_) => match as_integer(value) {
            Some(id) if id > 0 => Ok(Value::from(id)),
            _ => Err("Incorrect type. Expected pk value.".into()),
        },
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn apply_cross_field_rules(resource: Resource, data: &mut Map<String, Value>, errors: &mut ValidationErrors) {
    match resource {
        Resource::Riscos => {
            let p = data.get("probabilidade").and_then(Value::as_i64);
            let i = data.get("impacto").and_then(Value::as_i64);
            match (p, i) {
                (Some(p), Some(i)) => {
                    let score = p * i;
                    data.insert("pontuacao".into(), Value::from(score));
                    data.insert(
                        "nivel_risco".into(),
                        risk_level(score).map(Value::from).unwrap_or(Value::Null),
                    );
                }
                _ => {
                    data.insert("pontuacao".into(), Value::Null);
                    data.insert("nivel_risco".into(), Value::Null);
                }
            }
        }
        Resource::Inventarios => {
            let shares = data
                .get("compartilhamento_terceiros")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let named = data
                .get("nome_terceiro")
                .and_then(Value::as_str)
                .is_some_and(|s| !s.is_empty());
            if shares && !named {
                errors.add("nome_terceiro", "Required when data is shared with third parties.");
            }
        }
        Resource::Incidentes => {
            let opened = date_of(data, "data_registro");
            let closed = date_of(data, "data_encerramento");
            if let (Some(opened), Some(closed)) = (opened, closed) {
                if closed < opened {
                    errors.add("data_encerramento", "Must not be earlier than data_registro.");
                }
            }
        }
        _ => {}
    }
}

fn date_of(data: &Map<String, Value>, field: &str) -> Option<NaiveDate> {
    data.get(field)
        .and_then(Value::as_str)
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}
