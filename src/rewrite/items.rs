//! Update item sets carried in plugin and theme update checks.

use serde_json::{Map, Value};

use crate::rewrite::RewriteError;

/// How a JSON value was carried in its body field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldEncoding {
    /// The field holds JSON text (form bodies).
    Text,
    /// The field holds the JSON value itself (JSON bodies).
    Inline,
}

impl FieldEncoding {
    /// Decode a body field. Strings are parsed as JSON text.
    pub fn decode(field: &'static str, raw: &Value) -> Result<(Value, Self), RewriteError> {
        match raw {
            Value::String(text) => serde_json::from_str(text)
                .map(|value| (value, FieldEncoding::Text))
                .map_err(|source| RewriteError::Json { field, source }),
            other => Ok((other.clone(), FieldEncoding::Inline)),
        }
    }

    /// Encode a value back into the shape it was decoded from, as compact JSON.
    pub fn encode(&self, value: Value) -> Value {
        match self {
            FieldEncoding::Text => Value::String(value.to_string()),
            FieldEncoding::Inline => value,
        }
    }
}

/// Items of one update check, keyed by identifier (e.g. `akismet/akismet.php`).
///
/// The item map arrives either flat (the body field is the map) or inside an
/// envelope (`{"plugins": {...}, "active": [...]}`); both are written back
/// in the shape they came in.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateItemSet {
    field: &'static str,
    items: Map<String, Value>,
    active: Option<Vec<Value>>,
    envelope: Option<Map<String, Value>>,
}

impl UpdateItemSet {
    /// Interpret the decoded body field named `field`.
    pub fn parse(field: &'static str, decoded: Value) -> Result<Self, RewriteError> {
        let Value::Object(outer) = decoded else {
            return Err(RewriteError::NotAnObject(field));
        };

        match outer.get(field) {
            Some(Value::Object(items)) => {
                let items = items.clone();
                let active = match outer.get("active") {
                    Some(Value::Array(active)) => Some(active.clone()),
                    _ => None,
                };
                Ok(Self {
                    field,
                    items,
                    active,
                    envelope: Some(outer),
                })
            }
            _ => Ok(Self {
                field,
                items: outer,
                active: None,
                envelope: None,
            }),
        }
    }

    /// Attach an `active` list that travelled in its own body field.
    pub fn with_active(mut self, active: Vec<Value>) -> Self {
        self.active = Some(active);
        self
    }

    pub fn is_enveloped(&self) -> bool {
        self.envelope.is_some()
    }

    pub fn items(&self) -> &Map<String, Value> {
        &self.items
    }

    pub fn active(&self) -> Option<&[Value]> {
        self.active.as_deref()
    }

    /// Remove every item whose `marker` field is set. Returns the removed
    /// identifiers in item order.
    pub fn strip_alternate_sources(&mut self, marker: &str) -> Vec<String> {
        let removed: Vec<String> = self
            .items
            .iter()
            .filter(|(_, item)| item.get(marker).is_some_and(is_marker_set))
            .map(|(id, _)| id.clone())
            .collect();

        if !removed.is_empty() {
            let items = std::mem::take(&mut self.items);
            self.items = items
                .into_iter()
                .filter(|(id, _)| !removed.contains(id))
                .collect();
        }
        removed
    }

    /// Drop `removed` identifiers from the active list, keeping the order of
    /// the rest. Returns the identifiers actually dropped.
    pub fn prune_active(&mut self, removed: &[String]) -> Vec<String> {
        let Some(active) = self.active.as_mut() else {
            return Vec::new();
        };

        let mut dropped = Vec::new();
        active.retain(|entry| match entry.as_str() {
            Some(id) if removed.iter().any(|r| r == id) => {
                dropped.push(id.to_string());
                false
            }
            _ => true,
        });
        dropped
    }

    /// Split back into the value for the category field and, for flat sets,
    /// the value for a separate `active` field.
    pub fn into_parts(self) -> (Value, Option<Value>) {
        let Self {
            field,
            items,
            active,
            envelope,
        } = self;

        match envelope {
            Some(envelope) => {
                let mut items = Some(items);
                let mut active = active;
                let rebuilt = envelope
                    .into_iter()
                    .map(|(key, value)| {
                        let value = if key == field {
                            items.take().map(Value::Object).unwrap_or(value)
                        } else if key == "active" {
                            active.take().map(Value::Array).unwrap_or(value)
                        } else {
                            value
                        };
                        (key, value)
                    })
                    .collect();
                (Value::Object(rebuilt), None)
            }
            None => (Value::Object(items), active.map(Value::Array)),
        }
    }
}

/// Whether a marker value counts as set: missing, null, false, 0, "", "0",
/// empty arrays and empty objects do not.
pub fn is_marker_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(set) => *set,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
