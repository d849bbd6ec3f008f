//! Minimal JSON-schema checker for the shapes the pipeline asks the backend for.
//!
//! Supports the subset those shapes use: `type`, `enum`, `const`, `required`,
//! `properties`, `additionalProperties: false`, `items`, `minItems`, `maxItems` and
//! local `$ref` into `#/$defs`. Unknown keywords are ignored.

use serde_json::{Map, Value};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{path}: {message}")]
pub struct SchemaViolation {
    /// JSON pointer to the offending value.
    pub path: String,
    pub message: String,
}

/// Check `instance` against `schema`. Returns the first violation found.
pub fn validate(schema: &Value, instance: &Value) -> Result<(), SchemaViolation> {
    let mut checker = Checker { root: schema, path: Vec::new() };
    checker.check(schema, instance)
}

struct Checker<'a> {
    root: &'a Value,
    path: Vec<String>,
}

impl<'a> Checker<'a> {
    fn check(&mut self, schema: &'a Value, instance: &Value) -> Result<(), SchemaViolation> {
        let Some(obj) = schema.as_object() else {
            // `true`/`{}`-like schemas accept anything.
            return Ok(());
        };

        if let Some(reference) = obj.get("$ref").and_then(Value::as_str) {
            let target = self.resolve(reference)?;
            return self.check(target, instance);
        }

        if let Some(ty) = obj.get("type") {
            self.check_type(ty, instance)?;
        }

        if let Some(allowed) = obj.get("enum").and_then(Value::as_array) {
            if !allowed.contains(instance) {
                return Err(self.violation(format!(
                    "{instance} is not one of {}",
                    Value::Array(allowed.clone())
                )));
            }
        }

        if let Some(expected) = obj.get("const") {
            if expected != instance {
                return Err(self.violation(format!("expected {expected}, got {instance}")));
            }
        }

        if let Some(map) = instance.as_object() {
            self.check_object(obj, map)?;
        }

        if let Some(items) = instance.as_array() {
            self.check_array(obj, items)?;
        }

        Ok(())
    }

    fn check_object(
        &mut self,
        schema: &'a Map<String, Value>,
        map: &Map<String, Value>,
    ) -> Result<(), SchemaViolation> {
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for key in required.iter().filter_map(Value::as_str) {
                if !map.contains_key(key) {
                    return Err(self.violation(format!("missing required property '{key}'")));
                }
            }
        }

        let properties = schema.get("properties").and_then(Value::as_object);
        let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));

        for (key, value) in map {
            match properties.and_then(|p| p.get(key)) {
                Some(sub) => {
                    self.path.push(key.clone());
                    let result = self.check(sub, value);
                    self.path.pop();
                    result?;
                }
                None if closed => {
                    return Err(self.violation(format!("unexpected property '{key}'")));
                }
                None => {}
            }
        }
        Ok(())
    }

    fn check_array(
        &mut self,
        schema: &'a Map<String, Value>,
        items: &[Value],
    ) -> Result<(), SchemaViolation> {
        if let Some(min) = schema.get("minItems").and_then(Value::as_u64) {
            if (items.len() as u64) < min {
                return Err(self.violation(format!(
                    "expected at least {min} items, got {}",
                    items.len()
                )));
            }
        }
        if let Some(max) = schema.get("maxItems").and_then(Value::as_u64) {
            if (items.len() as u64) > max {
                return Err(self.violation(format!(
                    "expected at most {max} items, got {}",
                    items.len()
                )));
            }
        }
        if let Some(item_schema) = schema.get("items") {
            for (idx, item) in items.iter().enumerate() {
                self.path.push(idx.to_string());
                let result = self.check(item_schema, item);
                self.path.pop();
                result?;
            }
        }
        Ok(())
    }

    fn check_type(&self, ty: &Value, instance: &Value) -> Result<(), SchemaViolation> {
        let matches = match ty {
            Value::String(name) => type_matches(name, instance),
            Value::Array(names) => names
                .iter()
                .filter_map(Value::as_str)
                .any(|name| type_matches(name, instance)),
            _ => true,
        };
        if matches {
            Ok(())
        } else {
            Err(self.violation(format!("expected type {ty}, got {}", type_name(instance))))
        }
    }

    fn resolve(&self, reference: &str) -> Result<&'a Value, SchemaViolation> {
        let target = reference
            .strip_prefix("#/$defs/")
            .and_then(|name| self.root.get("$defs").and_then(|defs| defs.get(name)));
        target.ok_or_else(|| self.violation(format!("unresolvable $ref '{reference}'")))
    }

    fn violation(&self, message: String) -> SchemaViolation {
        let path = if self.path.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", self.path.join("/"))
        };
        SchemaViolation { path, message }
    }
}

fn type_matches(name: &str, instance: &Value) -> bool {
    match name {
        "object" => instance.is_object(),
        "array" => instance.is_array(),
        "string" => instance.is_string(),
        "boolean" => instance.is_boolean(),
        "null" => instance.is_null(),
        "number" => instance.is_number(),
        "integer" => {
            instance.is_i64()
                || instance.is_u64()
                || instance.as_f64().is_some_and(|f| f.fract() == 0.0)
        }
        _ => true,
    }
}

fn type_name(instance: &Value) -> &'static str {
    match instance {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
