pub mod convert;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Insertion-ordered map with unique keys.
pub type GenericMap = IndexMap<String, GenericValue>;

/// Engine-neutral value passed across the script/native boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GenericValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<GenericValue>),
    Object(GenericMap),
}

impl GenericValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&GenericMap> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Looks up `key` when the value is map-shaped.
    pub fn get(&self, key: &str) -> Option<&GenericValue> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Short name of the variant, used in coercion diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Self::String(s) => JsonValue::String(s.clone()),
            Self::Array(items) => JsonValue::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(map) => JsonValue::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<JsonValue> for GenericValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => n.as_f64().map(Self::Number).unwrap_or(Self::Null),
            JsonValue::String(s) => Self::String(s),
            JsonValue::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            JsonValue::Object(map) => Self::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Self::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for GenericValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for GenericValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for GenericValue {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<&str> for GenericValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for GenericValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<GenericValue>> for GenericValue {
    fn from(items: Vec<GenericValue>) -> Self {
        Self::Array(items)
    }
}

impl From<GenericMap> for GenericValue {
    fn from(map: GenericMap) -> Self {
        Self::Object(map)
    }
}

impl<K: Into<String>> FromIterator<(K, GenericValue)> for GenericValue {
    fn from_iter<I: IntoIterator<Item = (K, GenericValue)>>(iter: I) -> Self {
        Self::Object(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_keeps_insertion_order() {
        let value: GenericValue = [
            ("width", GenericValue::from(10)),
            ("height", GenericValue::from(5)),
            ("alpha", GenericValue::from(true)),
        ]
        .into_iter()
        .collect();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["width", "height", "alpha"]);
    }

    #[test]
    fn duplicate_keys_keep_a_single_entry() {
        let value: GenericValue = [("a", GenericValue::from(1)), ("a", GenericValue::from(2))]
            .into_iter()
            .collect();
        let map = value.as_object().unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("a"), Some(&GenericValue::Number(2.0)));
    }

    #[test]
    fn json_conversion_preserves_shape() {
        let json = json!({"text": "hi", "sizes": [1, 2.5], "bold": false, "none": null});
        let value = GenericValue::from(json.clone());
        assert_eq!(value.get("text"), Some(&GenericValue::from("hi")));
        assert_eq!(
            value.get("sizes"),
            Some(&GenericValue::Array(vec![GenericValue::from(1), GenericValue::from(2.5)]))
        );
        assert_eq!(
            value.to_json(),
            json!({"text": "hi", "sizes": [1.0, 2.5], "bold": false, "none": null})
        );
    }

    #[test]
    fn deserializes_from_yaml() {
        let value: GenericValue = serde_yaml::from_str("width: 10\nlabel: ok\n").unwrap();
        assert_eq!(value.get("width"), Some(&GenericValue::Number(10.0)));
        assert_eq!(value.get("label").and_then(GenericValue::as_str), Some("ok"));
    }
}
