//! Query-string serialization following `OpenAPI` `style`/`explode` rules.

use crate::client::QueryPair;
use openapiv3::QueryStyle;
use serde_json::{Map, Value};

/// How a single query parameter is written to the URL.
#[derive(Debug, Clone)]
pub struct QuerySerialization {
    pub style: QueryStyle,
    pub explode: bool,
    pub allow_reserved: bool,
    pub allow_empty_value: bool,
}

impl QuerySerialization {
    /// `OpenAPI` defaults: `explode` is true for `form` and `deepObject` unless stated.
    #[must_use]
    pub fn new(
        style: QueryStyle,
        explode: Option<bool>,
        allow_reserved: bool,
        allow_empty_value: bool,
    ) -> Self {
        let explode =
            explode.unwrap_or_else(|| matches!(style, QueryStyle::Form | QueryStyle::DeepObject));
        Self {
            style,
            explode,
            allow_reserved,
            allow_empty_value,
        }
    }
}

impl Default for QuerySerialization {
    fn default() -> Self {
        Self::new(QueryStyle::Form, None, false, false)
    }
}

/// Serialize one argument into zero or more query pairs.
#[must_use]
pub fn serialize(
    name: &str,
    value: &Value,
    required: bool,
    ser: &QuerySerialization,
) -> Vec<QueryPair> {
    let pair = |key: String, value: String| QueryPair {
        key,
        value,
        allow_reserved: ser.allow_reserved,
    };

    if is_empty(value) {
        // An empty value is only sent when the API asks for it.
        return if ser.allow_empty_value || required {
            vec![pair(name.to_string(), String::new())]
        } else {
            Vec::new()
        };
    }

    match value {
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(value_to_string).collect();
            match ser.style {
                QueryStyle::Form if ser.explode => items
                    .into_iter()
                    .map(|v| pair(name.to_string(), v))
                    .collect(),
                QueryStyle::Form | QueryStyle::DeepObject => {
                    vec![pair(name.to_string(), items.join(","))]
                }
                QueryStyle::SpaceDelimited => vec![pair(name.to_string(), items.join(" "))],
                QueryStyle::PipeDelimited => vec![pair(name.to_string(), items.join("|"))],
            }
        }
        Value::Object(map) => serialize_object(name, map, ser)
            .into_iter()
            .map(|(k, v)| pair(k, v))
            .collect(),
        _ => vec![pair(name.to_string(), value_to_string(value))],
    }
}

fn serialize_object(
    name: &str,
    map: &Map<String, Value>,
    ser: &QuerySerialization,
) -> Vec<(String, String)> {
    match ser.style {
        QueryStyle::DeepObject => map
            .iter()
            .map(|(k, v)| (format!("{name}[{k}]"), value_to_string(v)))
            .collect(),
        QueryStyle::Form if ser.explode => map
            .iter()
            .map(|(k, v)| (k.clone(), value_to_string(v)))
            .collect(),
        QueryStyle::Form => {
            let flat: Vec<String> = map
                .iter()
                .flat_map(|(k, v)| [k.clone(), value_to_string(v)])
                .collect();
            vec![(name.to_string(), flat.join(","))]
        }
        // Not defined for objects; send the JSON text.
        QueryStyle::SpaceDelimited | QueryStyle::PipeDelimited => {
            vec![(name.to_string(), Value::Object(map.clone()).to_string())]
        }
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Null => true,
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Render a JSON value for a path segment, header or query value.
#[must_use]
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kv(pairs: &[QueryPair]) -> Vec<(&str, &str)> {
        pairs
            .iter()
            .map(|p| (p.key.as_str(), p.value.as_str()))
            .collect()
    }

    #[test]
    fn form_arrays_follow_explode() {
        let exploded = QuerySerialization::default();
        let pairs = serialize("status", &json!(["ok", "failed"]), false, &exploded);
        assert_eq!(kv(&pairs), vec![("status", "ok"), ("status", "failed")]);

        let joined = QuerySerialization::new(QueryStyle::Form, Some(false), false, false);
        let pairs = serialize("status", &json!(["ok", "failed"]), false, &joined);
        assert_eq!(kv(&pairs), vec![("status", "ok,failed")]);
    }

    #[test]
    fn delimited_styles_join_arrays() {
        let space = QuerySerialization::new(QueryStyle::SpaceDelimited, None, false, false);
        assert_eq!(
            kv(&serialize("ids", &json!([1, 2]), false, &space)),
            vec![("ids", "1 2")]
        );

        let pipe = QuerySerialization::new(QueryStyle::PipeDelimited, None, false, false);
        assert_eq!(
            kv(&serialize("ids", &json!([1, 2]), false, &pipe)),
            vec![("ids", "1|2")]
        );
    }

    #[test]
    fn objects_by_style() {
        let deep = QuerySerialization::new(QueryStyle::DeepObject, None, false, false);
        let pairs = serialize("filter", &json!({"event": "push"}), false, &deep);
        assert_eq!(kv(&pairs), vec![("filter[event]", "push")]);

        let form = QuerySerialization::default();
        let pairs = serialize("filter", &json!({"event": "push"}), false, &form);
        assert_eq!(kv(&pairs), vec![("event", "push")]);

        let flat = QuerySerialization::new(QueryStyle::Form, Some(false), false, false);
        let pairs = serialize("filter", &json!({"event": "push"}), false, &flat);
        assert_eq!(kv(&pairs), vec![("filter", "event,push")]);
    }

    #[test]
    fn empty_values_are_dropped_unless_required_or_allowed() {
        let ser = QuerySerialization::default();
        assert!(serialize("q", &json!(""), false, &ser).is_empty());
        assert_eq!(kv(&serialize("q", &json!(""), true, &ser)), vec![("q", "")]);

        let allow = QuerySerialization::new(QueryStyle::Form, None, false, true);
        assert_eq!(kv(&serialize("q", &json!([]), false, &allow)), vec![("q", "")]);
    }

    #[test]
    fn scalars_render_plainly() {
        assert_eq!(value_to_string(&json!("abc")), "abc");
        assert_eq!(value_to_string(&json!(42)), "42");
        assert_eq!(value_to_string(&json!(true)), "true");
        assert_eq!(value_to_string(&json!(null)), "");
        assert_eq!(value_to_string(&json!({"a": 1})), r#"{"a":1}"#);
    }
}
