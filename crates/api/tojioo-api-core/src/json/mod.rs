use serde_json::{Map, Value as JsonValue};

use crate::{TensorLike, Value};

/// Convert untagged host JSON into a [`Value`]. `null` has no value counterpart and maps
/// to `None`; nulls nested in arrays or objects are skipped.
pub fn from_plain_json(json: JsonValue) -> Option<Value> {
    match json {
        JsonValue::Null => None,
        JsonValue::Bool(b) => Some(Value::Bool(b)),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Some(Value::Int(i)),
            None => n.as_f64().map(Value::Float),
        },
        JsonValue::String(s) => Some(Value::Text(s)),
        JsonValue::Array(items) => Some(Value::List(
            items.into_iter().filter_map(from_plain_json).collect(),
        )),
        JsonValue::Object(obj) => Some(Value::Record(
            obj.into_iter()
                .filter_map(|(k, v)| from_plain_json(v).map(|v| (k, v)))
                .collect(),
        )),
    }
}

/// Decode JSON that is either a tagged [`Value`] (`{ "type": ..., "data": ... }`) or plain data.
pub fn decode_value_json(json: JsonValue) -> Option<Value> {
    if json.is_object() {
        if let Ok(value) = serde_json::from_value::<Value>(json.clone()) {
            return Some(value);
        }
    }
    from_plain_json(json)
}

/// Render a value as untagged JSON for display. Tensors and handles collapse to
/// short descriptive strings since their payload is not meant for text output.
pub fn to_plain_json(value: &Value) -> JsonValue {
    match value {
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int(i) => JsonValue::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(f.to_string())),
        Value::Text(s) => JsonValue::String(s.clone()),
        Value::Tensor(t) => JsonValue::String(format!("Tensor(shape={:?})", t.shape())),
        Value::List(items) | Value::Tuple(items) => {
            JsonValue::Array(items.iter().map(to_plain_json).collect())
        }
        Value::Record(map) => JsonValue::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), to_plain_json(v)))
                .collect::<Map<_, _>>(),
        ),
        Value::Handle { kind, id } => JsonValue::String(format!("<{kind} {id}>")),
        Value::Bus(bus) => JsonValue::Object(
            bus.iter()
                .map(|(idx, entry)| {
                    let mut obj = Map::new();
                    obj.insert("data".to_string(), to_plain_json(&entry.data));
                    obj.insert(
                        "type".to_string(),
                        JsonValue::String(entry.type_tag.to_string()),
                    );
                    (idx.to_string(), JsonValue::Object(obj))
                })
                .collect(),
        ),
    }
}
