use tojioo_api_core::json::from_plain_json;
use tojioo_api_core::{Bus, TypeTag, Value};
use tojioo_passthrough_core::eval::NodeInputs;
use tojioo_passthrough_core::{registry, run_by_class, RunContext};
use tojioo_test_fixtures::buses;

fn run_bus(pairs: Vec<(&str, Option<Value>)>) -> Vec<Option<Value>> {
    let inputs: NodeInputs = pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    let out = run_by_class(&registry(), "PT_DynamicBus", inputs, RunContext::default()).expect("bus runs");
    out.values().map(<[Option<Value>]>::to_vec).expect("bus returns values")
}

fn bus_of(value: &Option<Value>) -> &Bus {
    match value {
        Some(Value::Bus(bus)) => bus,
        other => panic!("expected a bus, got {other:?}"),
    }
}

#[test]
fn typed_wire_bus_decodes_entries_and_tags() {
    let bus: Bus = buses::load("typed").expect("typed bus");
    assert_eq!(bus.indices().collect::<Vec<_>>(), vec![0, 1, 3]);
    let first = bus.get(0).expect("slot 0");
    assert_eq!(first.data, Value::Int(42));
    assert_eq!(first.type_tag, TypeTag::from("INT"));
    assert_eq!(bus.get(3).map(|e| &e.data), Some(&Value::handle("MODEL", "model#1")));
    assert_eq!(bus.next_index(), Some(4));
}

#[test]
fn legacy_bus_decodes_the_same_from_json_or_host_record() {
    let json = buses::json("legacy-mixed").expect("legacy bus");
    let from_wire = Bus::from_json(json.clone()).expect("object");
    let from_record = Bus::coerce(from_plain_json(json));
    assert_eq!(from_wire, from_record);
    assert_eq!(from_wire.indices().collect::<Vec<_>>(), vec![0, 2, 5]);
    assert!(from_wire.get(0).is_some_and(|e| e.type_tag.is_wildcard()));
    assert_eq!(from_wire.get(2).map(|e| e.type_tag.as_str()), Some("STRING"));
}

#[test]
fn typed_bus_unpacks_by_output_hints() {
    let bus: Bus = buses::load("typed").expect("typed bus");
    let out = run_bus(vec![
        ("bus", Some(Value::Bus(bus.clone()))),
        ("_output_hints", Some(Value::text("1:MODEL:0,2:INT:0,3:STRING:0,4:*:0"))),
    ]);
    assert_eq!(bus_of(&out[0]), &bus);
    assert_eq!(out[1], Some(Value::handle("MODEL", "model#1")));
    assert_eq!(out[2], Some(Value::Int(42)));
    assert_eq!(out[3], Some(Value::text("steps")));
    assert_eq!(out[4], None);
}

#[test]
fn legacy_entries_match_any_hint_and_new_inputs_append() {
    let json = buses::json("legacy-mixed").expect("legacy bus");
    let out = run_bus(vec![
        ("bus", from_plain_json(json)),
        ("input_1", Some(Value::text("fresh"))),
        ("_slot_types", Some(Value::text("1:STRING"))),
        ("_output_hints", Some(Value::text("1:STRING:1,2:STRING:0"))),
    ]);
    let bus = bus_of(&out[0]);
    assert_eq!(bus.indices().collect::<Vec<_>>(), vec![0, 2, 5, 6]);
    assert_eq!(bus.get(6).map(|e| &e.data), Some(&Value::text("fresh")));
    assert_eq!(out[1], Some(Value::text("fresh")));
    // slot 0 is an untyped legacy entry, so it satisfies the STRING hint first
    assert_eq!(out[2], Some(Value::Int(7)));
}

#[test]
fn overwrite_mode_replaces_matching_typed_entry() {
    let bus: Bus = buses::load("typed").expect("typed bus");
    let out = run_bus(vec![
        ("bus", Some(Value::Bus(bus))),
        ("input_1", Some(Value::Int(7))),
        ("_slot_types", Some(Value::text("1:INT"))),
        ("_overwrite_mode", Some(Value::text("1"))),
    ]);
    let bus = bus_of(&out[0]);
    assert_eq!(bus.len(), 3);
    assert_eq!(bus.get(0).map(|e| &e.data), Some(&Value::Int(7)));
}
