//! Helpers over raw JSON records
//!
//! Raw option records are plain [`serde_json::Value`]s. These helpers give them
//! the loose semantics the select needs: dotted field paths, loose equality of
//! identity keys, display strings and URL component encoding.

use std::fmt;

use serde_json::{Map, Value};

/// A dotted path into a JSON record (`"user.name"`, `"tags.0"`)
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// Parse a dotted path; empty segments are ignored
    pub fn parse(path: &str) -> Self {
        Self(
            path.split('.')
                .filter(|segment| !segment.is_empty())
                .map(str::to_owned)
                .collect(),
        )
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The path without its last segment, and that segment
    pub fn split_last(&self) -> (FieldPath, Option<&str>) {
        match self.0.split_last() {
            Some((last, prefix)) => (FieldPath(prefix.to_vec()), Some(last.as_str())),
            None => (FieldPath::default(), None),
        }
    }

    pub fn join(&self, tail: &[String]) -> FieldPath {
        FieldPath(self.0.iter().chain(tail).cloned().collect())
    }

    /// Read the value at this path
    pub fn get<'a>(&self, target: &'a Value) -> Option<&'a Value> {
        self.0.iter().try_fold(target, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    /// Write a value at this path, creating intermediate objects
    pub fn set(&self, target: &mut Value, value: Value) {
        let Some((last, prefix)) = self.0.split_last() else {
            *target = value;
            return;
        };
        let mut current = target;
        for segment in prefix {
            current = object_mut(current)
                .entry(segment.clone())
                .or_insert(Value::Null);
        }
        object_mut(current).insert(last.clone(), value);
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl From<&str> for FieldPath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

fn object_mut(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced by an object"),
    }
}

/// Relative paths of the keys below `value`
///
/// Without `deep` only the own keys are listed; with `deep` every nested key
/// is listed as well.
pub fn crawl(value: &Value, deep: bool) -> Vec<Vec<String>> {
    let children: Vec<(String, &Value)> = match value {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(items) => items.iter().enumerate().map(|(i, v)| (i.to_string(), v)).collect(),
        _ => return Vec::new(),
    };

    let mut paths = Vec::new();
    for (key, child) in children {
        paths.push(vec![key.clone()]);
        if deep {
            for mut nested in crawl(child, true) {
                nested.insert(0, key.clone());
                paths.push(nested);
            }
        }
    }
    paths
}

/// First array found in `value`, searching depth-first
pub fn find_array(value: &Value) -> Option<&Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(map) => map.values().find_map(find_array),
        _ => None,
    }
}

/// Loose equality used for item identity
///
/// Numbers compare numerically, a number and a string compare through the
/// string's numeric reading, anything else compares structurally.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            match (n.as_f64(), s.trim().parse::<f64>()) {
                (Some(n), Ok(s)) => n == s,
                _ => false,
            }
        }
        _ => a == b,
    }
}

/// Display string of a value, `None` for null
pub fn display(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .map(|item| display(item).unwrap_or_default())
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Object(_) => Some(value.to_string()),
    }
}

/// Whether a value carries anything (not null, not an empty string)
pub fn is_set(value: &Value) -> bool {
    !matches!(value, Value::Null) && value.as_str() != Some("")
}

/// Percent-encode a URL component, keeping `A-Z a-z 0-9 - _ . ! ~ * ' ( )`
pub fn encode_uri_component(input: &str) -> String {
    let mut encoded = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')' => encoded.push(byte as char),
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}
