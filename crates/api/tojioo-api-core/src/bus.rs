//! Bus: ordered slot index -> typed entry mapping threaded between bus nodes.
//!
//! Outbound, a bus is always a JSON object keyed by the decimal slot index with
//! `{ "data": <value>, "type": <tag> }` records. Inbound it is lenient: keys may be
//! strings or integers, entries may be raw values (treated as `*`), and keys that do
//! not coerce to a non-negative integer are dropped.

use std::collections::BTreeMap;

use log::debug;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;

use crate::json::decode_value_json;
use crate::{TypeTag, Value};

/// Serde tag names used by [`Value`]; a `type` field holding one of these marks a raw
/// tagged value rather than a typed bus record.
const VALUE_TAGS: &[&str] = &[
    "bool", "int", "float", "text", "tensor", "list", "tuple", "record", "handle", "bus",
];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BusEntry {
    pub data: Value,
    #[serde(rename = "type", default)]
    pub type_tag: TypeTag,
}

impl BusEntry {
    pub fn new(data: Value, type_tag: TypeTag) -> Self {
        BusEntry { data, type_tag }
    }

    /// Legacy untyped entry.
    pub fn raw(data: Value) -> Self {
        BusEntry {
            data,
            type_tag: TypeTag::Wildcard,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Bus {
    entries: BTreeMap<usize, BusEntry>,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&BusEntry> {
        self.entries.get(&index)
    }

    pub fn insert(&mut self, index: usize, entry: BusEntry) -> Option<BusEntry> {
        self.entries.insert(index, entry)
    }

    /// Entries in ascending slot order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &BusEntry)> {
        self.entries.iter().map(|(idx, entry)| (*idx, entry))
    }

    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.keys().copied()
    }

    /// `max(existing) + 1`, or 0 for an empty bus. `None` once `usize::MAX` is taken.
    pub fn next_index(&self) -> Option<usize> {
        match self.entries.keys().next_back() {
            Some(last) => last.checked_add(1),
            None => Some(0),
        }
    }

    /// Normalise whatever arrived on a bus socket. Anything that is not a bus or a
    /// record yields an empty bus.
    pub fn coerce(value: Option<Value>) -> Bus {
        match value {
            None => Bus::new(),
            Some(Value::Bus(bus)) => bus,
            Some(Value::Record(map)) => {
                let mut bus = Bus::new();
                for (key, item) in map {
                    match parse_slot_key(&key) {
                        Some(idx) => {
                            bus.insert(idx, entry_from_value(item));
                        }
                        None => debug!("bus: dropping non-integer key '{key}'"),
                    }
                }
                bus
            }
            Some(other) => {
                debug!("bus: ignoring non-mapping bus input of kind {:?}", other.kind());
                Bus::new()
            }
        }
    }

    /// Lenient decode of the JSON wire form.
    pub fn from_json(json: JsonValue) -> Option<Bus> {
        let JsonValue::Object(obj) = json else {
            return None;
        };
        let mut bus = Bus::new();
        for (key, item) in obj {
            let Some(idx) = parse_slot_key(&key) else {
                debug!("bus: dropping non-integer key '{key}'");
                continue;
            };
            if let Some(entry) = entry_from_json(item) {
                bus.insert(idx, entry);
            }
        }
        Some(bus)
    }
}

impl FromIterator<(usize, BusEntry)> for Bus {
    fn from_iter<I: IntoIterator<Item = (usize, BusEntry)>>(iter: I) -> Self {
        Bus {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Serialize for Bus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter().map(|(idx, entry)| (idx.to_string(), entry)))
    }
}

impl<'de> Deserialize<'de> for Bus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = JsonValue::deserialize(deserializer)?;
        Bus::from_json(json).ok_or_else(|| D::Error::custom("bus must be a JSON object"))
    }
}

fn parse_slot_key(key: &str) -> Option<usize> {
    key.trim().parse::<usize>().ok()
}

fn entry_from_value(item: Value) -> BusEntry {
    match item {
        Value::Record(mut map) if map.contains_key("data") => {
            let type_tag = match map.get("type") {
                Some(Value::Text(tag)) => TypeTag::from(tag.as_str()),
                _ => TypeTag::Wildcard,
            };
            match map.shift_remove("data") {
                Some(data) => BusEntry::new(data, type_tag),
                None => BusEntry::raw(Value::Record(map)),
            }
        }
        other => BusEntry::raw(other),
    }
}

fn entry_from_json(item: JsonValue) -> Option<BusEntry> {
    let (has_data, tag) = match &item {
        JsonValue::Object(obj) => (
            obj.contains_key("data"),
            obj.get("type").and_then(JsonValue::as_str).map(str::to_string),
        ),
        _ => (false, None),
    };
    if !has_data {
        return decode_value_json(item).map(BusEntry::raw);
    }
    if let Some(tag) = &tag {
        if VALUE_TAGS.contains(&tag.as_str()) {
            if let Ok(value) = serde_json::from_value::<Value>(item.clone()) {
                return Some(BusEntry::raw(value));
            }
        }
    }
    let JsonValue::Object(mut obj) = item else {
        return None;
    };
    let data = obj.remove("data").and_then(decode_value_json)?;
    Some(BusEntry::new(
        data,
        tag.map(TypeTag::from).unwrap_or(TypeTag::Wildcard),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_form_uses_string_keys_and_typed_records() {
        let bus: Bus = [
            (0, BusEntry::new(Value::Int(1), TypeTag::named("INT"))),
            (3, BusEntry::raw(Value::text("x"))),
        ]
        .into_iter()
        .collect();
        let json = serde_json::to_value(&bus).expect("serialize");
        assert_eq!(
            json,
            json!({
                "0": { "data": { "type": "int", "data": 1 }, "type": "INT" },
                "3": { "data": { "type": "text", "data": "x" }, "type": "*" },
            })
        );
        let back: Bus = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, bus);
    }

    #[test]
    fn inbound_json_coerces_keys_and_raw_entries() {
        let bus = Bus::from_json(json!({
            "1": { "data": "plain", "type": "STRING" },
            " 4 ": 12,
            "name": 5,
            "-1": 6,
            "2": { "type": "float", "data": 0.5 },
        }))
        .expect("object");
        let indices: Vec<_> = bus.indices().collect();
        assert_eq!(indices, vec![1, 2, 4]);
        assert_eq!(
            bus.get(1),
            Some(&BusEntry::new(Value::text("plain"), TypeTag::named("STRING")))
        );
        assert_eq!(bus.get(2), Some(&BusEntry::raw(Value::Float(0.5))));
        assert_eq!(bus.get(4), Some(&BusEntry::raw(Value::Int(12))));
    }

    #[test]
    fn coerce_record_with_string_keys() {
        let record = Value::record([
            (
                "0",
                Value::record([("data", Value::Int(1)), ("type", Value::text("INT"))]),
            ),
            ("1", Value::Bool(true)),
            ("x", Value::Bool(false)),
        ]);
        let bus = Bus::coerce(Some(record));
        assert_eq!(bus.len(), 2);
        assert_eq!(bus.get(0).map(|e| e.type_tag.clone()), Some(TypeTag::named("INT")));
        assert!(bus.get(1).expect("raw entry").type_tag.is_wildcard());
        assert_eq!(bus.next_index(), Some(2));
    }

    #[test]
    fn largest_key_has_no_next_index() {
        let mut obj = serde_json::Map::new();
        obj.insert(usize::MAX.to_string(), json!(1));
        let bus = Bus::from_json(JsonValue::Object(obj)).expect("object");
        assert_eq!(bus.indices().collect::<Vec<_>>(), vec![usize::MAX]);
        assert_eq!(bus.next_index(), None);
    }

    #[test]
    fn non_mapping_input_yields_empty_bus() {
        assert!(Bus::coerce(Some(Value::Int(3))).is_empty());
        assert!(Bus::coerce(None).is_empty());
        assert_eq!(Bus::new().next_index(), Some(0));
    }
}
