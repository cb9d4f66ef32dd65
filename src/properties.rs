use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Reserved key prefix marking a property as tracked by the engine.
pub const PIX_PREFIX: &str = "pix_";
/// Identifier minted onto a template collection on first realization.
pub const PIX_ID: &str = "pix_id";
/// Reverse index on a realized duplicate, pointing back at the template id.
pub const PIX_ID_DUPS: &str = "pix_id_dups";
/// Comma-joined registry of declared tracked property names.
pub const PIX_PROPERTIES: &str = "pix_properties";

/// Scalar property value hosted in an entity's bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Float(f64),
    Int(i64),
    Text(String),
}

impl Value {
    /// Coerces a raw string the way property edits arrive from the host UI:
    /// float first, then integer, otherwise kept as text.
    pub fn parse(input: &str) -> Value {
        if let Ok(f) = input.parse::<f64>() {
            return Value::Float(f);
        }
        if let Ok(i) = input.parse::<i64>() {
            return Value::Int(i);
        }
        Value::Text(input.to_string())
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::Text(s) => s.parse::<f64>().ok(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Flat key-value store on every host entity. Keys without the reserved
/// prefix are opaque host data and never touched by the engine.
pub type PropertyBag = BTreeMap<String, Value>;

/// Parsed view over one declared tracked property.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedProperty {
    /// Name with the reserved prefix stripped.
    pub name: String,
    pub base_value: Value,
    /// Absent means the property is static: no driver is synthesized.
    pub expression: Option<String>,
    /// `(variable name, data path)` pairs feeding the driver expression.
    pub input_bindings: Vec<(String, String)>,
}

/// Appends `new_value` to a comma-joined registry string, skipping
/// duplicates.
fn add_unique(new_value: &str, existing: &str) -> String {
    let mut values: Vec<&str> = if existing.is_empty() {
        Vec::new()
    } else {
        existing.split(',').collect()
    };
    if !values.contains(&new_value) {
        values.push(new_value);
    }
    values.join(",")
}

/// Declares a tracked property on a bag: sets the prefixed base value,
/// registers the name, and seeds placeholder binding/expression entries.
/// Calling it again for the same name merges instead of duplicating.
pub fn declare_property(bag: &mut PropertyBag, name: &str, base: Value) {
    bag.insert(format!("{PIX_PREFIX}{name}"), base);

    let registry = bag
        .get(PIX_PROPERTIES)
        .and_then(|v| v.as_text())
        .unwrap_or("")
        .to_string();
    bag.insert(
        PIX_PROPERTIES.to_string(),
        Value::Text(add_unique(name, &registry)),
    );

    let props_key = format!("{PIX_PREFIX}{name}_properties");
    bag.entry(props_key)
        .or_insert_with(|| Value::Text("var1".to_string()));
    let paths_key = format!("{PIX_PREFIX}{name}_property_paths");
    bag.entry(paths_key)
        .or_insert_with(|| Value::Text(name.to_string()));
    let expr_key = format!("{PIX_PREFIX}{name}_expression");
    bag.entry(expr_key)
        .or_insert_with(|| Value::Text("var1".to_string()));
}

/// Plain add/edit of a prefixed property, without registry seeding.
pub fn set_property(bag: &mut PropertyBag, name: &str, value: Value) {
    bag.insert(format!("{PIX_PREFIX}{name}"), value);
}

/// Removes a raw prefixed key. Deleting an unknown name is a no-op.
pub fn delete_property(bag: &mut PropertyBag, name: &str) {
    bag.remove(&format!("{PIX_PREFIX}{name}"));
}

/// Sets an unprefixed key only if it does not exist yet. Used when
/// realization copies base values onto a duplicate.
pub fn set_if_absent(bag: &mut PropertyBag, name: &str, value: Value) {
    if !bag.contains_key(name) {
        bag.insert(name.to_string(), value);
    }
}

/// Every key carrying the reserved prefix, as a raw view.
pub fn read_tracked(bag: &PropertyBag) -> PropertyBag {
    bag.iter()
        .filter(|(k, _)| k.starts_with(PIX_PREFIX))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Parses the declared tracked properties out of a bag, once, at the codec
/// boundary. Names registered without a base value are skipped.
pub fn parse_tracked(bag: &PropertyBag) -> Vec<TrackedProperty> {
    let Some(registry) = bag.get(PIX_PROPERTIES).and_then(|v| v.as_text()) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for name in registry.split(',').filter(|n| !n.is_empty()) {
        let raw_key = format!("{PIX_PREFIX}{name}");
        let Some(base_value) = bag.get(&raw_key).cloned() else {
            continue;
        };

        let expression = bag
            .get(&format!("{raw_key}_expression"))
            .and_then(|v| v.as_text())
            .map(str::to_string);

        let mut input_bindings = Vec::new();
        if let (Some(vars), Some(paths)) = (
            bag.get(&format!("{raw_key}_properties"))
                .and_then(|v| v.as_text()),
            bag.get(&format!("{raw_key}_property_paths"))
                .and_then(|v| v.as_text()),
        ) {
            for (var, path) in vars.split(',').zip(paths.split(',')) {
                input_bindings.push((var.to_string(), path.to_string()));
            }
        }

        out.push(TrackedProperty {
            name: name.to_string(),
            base_value,
            expression,
            input_bindings,
        });
    }
    out
}
