//! Tagged wrapper for JSON-typed columns
//!
//! JSON columns are stored as text and boxed on read. The box supports
//! nested path addressing: `a.b.0.c` walks object keys and array indexes.

use serde_json::{Map, Value as JsonValue};

#[derive(Debug, Clone, PartialEq)]
pub struct JsonBox {
    inner: JsonValue,
}

impl JsonBox {
    pub fn new(inner: JsonValue) -> Self {
        Self { inner }
    }

    /// Parses stored text
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text).map(Self::new)
    }

    pub fn as_json(&self) -> &JsonValue {
        &self.inner
    }

    pub fn into_inner(self) -> JsonValue {
        self.inner
    }

    /// Serialized form written to the text column
    pub fn to_text(&self) -> String {
        self.inner.to_string()
    }

    /// Reads the value at a dot path; an empty path is the whole document
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        if path.is_empty() {
            return Some(&self.inner);
        }
        path.split('.').try_fold(&self.inner, |node, segment| match node {
            JsonValue::Object(obj) => obj.get(segment),
            JsonValue::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    /// Writes the value at a dot path, creating intermediate objects.
    ///
    /// Returns false when the path crosses a scalar or an out-of-range index.
    pub fn set(&mut self, path: &str, value: JsonValue) -> bool {
        if path.is_empty() {
            self.inner = value;
            return true;
        }
        let segments: Vec<&str> = path.split('.').collect();
        set_at(&mut self.inner, &segments, value)
    }

    /// Removes the value at a dot path and returns it
    pub fn remove(&mut self, path: &str) -> Option<JsonValue> {
        let (parent, last) = match path.rsplit_once('.') {
            Some((parent, last)) => (parent, last),
            None => ("", path),
        };
        let node: Option<&mut JsonValue> = if parent.is_empty() {
            Some(&mut self.inner)
        } else {
            parent.split('.').try_fold(&mut self.inner, |node, segment| match node {
                JsonValue::Object(obj) => obj.get_mut(segment),
                JsonValue::Array(items) => {
                    segment.parse::<usize>().ok().and_then(move |i| items.get_mut(i))
                }
                _ => None,
            })
        };
        match node? {
            JsonValue::Object(obj) => obj.remove(last),
            JsonValue::Array(items) => match last.parse::<usize>() {
                Ok(i) if i < items.len() => Some(items.remove(i)),
                _ => None,
            },
            _ => None,
        }
    }
}

fn set_at(node: &mut JsonValue, segments: &[&str], value: JsonValue) -> bool {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return true;
    };

    if node.is_null() {
        *node = JsonValue::Object(Map::new());
    }

    match node {
        JsonValue::Object(obj) => {
            let child = obj.entry(head.to_string()).or_insert(JsonValue::Null);
            set_at(child, rest, value)
        }
        JsonValue::Array(items) => match head.parse::<usize>() {
            Ok(i) if i < items.len() => set_at(&mut items[i], rest, value),
            Ok(i) if i == items.len() => {
                items.push(JsonValue::Null);
                set_at(&mut items[i], rest, value)
            }
            _ => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_walks_objects_and_arrays() {
        let boxed = JsonBox::new(json!({"a": {"b": [{"c": 1}, {"c": 2}]}}));
        assert_eq!(boxed.get("a.b.1.c"), Some(&json!(2)));
        assert_eq!(boxed.get("a.x"), None);
        assert_eq!(boxed.get("a.b.9"), None);
    }

    #[test]
    fn test_set_creates_intermediate_objects() {
        let mut boxed = JsonBox::new(JsonValue::Null);
        assert!(boxed.set("settings.theme.color", json!("dark")));
        assert_eq!(boxed.as_json(), &json!({"settings": {"theme": {"color": "dark"}}}));
    }

    #[test]
    fn test_set_through_scalar_fails() {
        let mut boxed = JsonBox::new(json!({"a": 1}));
        assert!(!boxed.set("a.b", json!(2)));
    }

    #[test]
    fn test_remove_returns_value() {
        let mut boxed = JsonBox::new(json!({"a": {"b": 1, "c": 2}}));
        assert_eq!(boxed.remove("a.b"), Some(json!(1)));
        assert_eq!(boxed.as_json(), &json!({"a": {"c": 2}}));
    }

    #[test]
    fn test_text_round_trip() {
        let boxed = JsonBox::parse(r#"{"k":[1,2]}"#).unwrap();
        assert_eq!(JsonBox::parse(&boxed.to_text()).unwrap(), boxed);
    }
}
