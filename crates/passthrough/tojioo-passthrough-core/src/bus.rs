//! BusStore: pack direct inputs into a bus and unpack typed outputs from it.
//!
//! Each call is pure. The incoming bus is copied, direct inputs are appended (or, with
//! overwrite enabled, take over the first unclaimed entry of the same concrete type), and
//! the fixed-width output tuple is resolved in ascending slot order. Matching always scans
//! bus indices in ascending order and never hands one index to two claimants.

use hashbrown::{HashMap, HashSet};
use log::debug;
use tojioo_api_core::{Bus, BusEntry, TypeTag, Value};

use crate::slot::is_reserved;

/// Keyword carrying the upstream bus.
pub const BUS_INPUT: &str = "bus";
/// Dynamic input family handled by the bus node.
pub const BUS_SLOT_PREFIX: &str = "input_";

/// Requested type for one output slot, parsed from `slot:type[:has_input]`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutputHint {
    pub ty: TypeTag,
    pub has_input: bool,
}

/// Per-call policy decoded from the hidden control strings.
#[derive(Clone, Debug, Default)]
pub struct StepOptions {
    pub slot_types: HashMap<usize, TypeTag>,
    pub output_hints: HashMap<usize, OutputHint>,
    pub overwrite: bool,
}

impl StepOptions {
    pub fn from_hidden(slot_types: &str, output_hints: &str, overwrite_mode: &str) -> Self {
        StepOptions {
            slot_types: parse_slot_types(slot_types),
            output_hints: parse_output_hints(output_hints),
            overwrite: overwrite_mode.trim() == "1",
        }
    }
}

/// Result of one bus step. `outputs[i]` feeds logical output slot `i + 1`.
#[derive(Clone, Debug, PartialEq)]
pub struct BusStep {
    pub bus: Bus,
    pub outputs: Vec<Option<Value>>,
}

impl BusStep {
    /// Full output tuple with the bus in slot 0.
    pub fn into_tuple(self) -> Vec<Option<Value>> {
        let mut out = Vec::with_capacity(self.outputs.len() + 1);
        out.push(Some(Value::Bus(self.bus)));
        out.extend(self.outputs);
        out
    }
}

/// Slot of a bus input key (`input_3` -> 3). Other keys are not bus slots.
pub fn bus_slot(key: &str) -> Option<usize> {
    key.strip_prefix(BUS_SLOT_PREFIX)?.parse().ok()
}

/// `"1:IMAGE,2:MASK"` -> {1: IMAGE, 2: MASK}. Malformed parts are skipped.
pub fn parse_slot_types(text: &str) -> HashMap<usize, TypeTag> {
    let mut map = HashMap::new();
    for part in text.split(',').filter(|p| !p.trim().is_empty()) {
        let Some((slot, ty)) = part.split_once(':') else {
            debug!("bus: skipping slot type '{part}' without ':'");
            continue;
        };
        match slot.trim().parse::<usize>() {
            Ok(idx) => {
                map.insert(idx, TypeTag::from(ty));
            }
            Err(_) => debug!("bus: skipping slot type '{part}' with bad index"),
        }
    }
    map
}

/// `"1:IMAGE:1,2:MASK"` -> per-slot hints; a missing flag means no direct input.
pub fn parse_output_hints(text: &str) -> HashMap<usize, OutputHint> {
    let mut map = HashMap::new();
    for part in text.split(',').filter(|p| !p.trim().is_empty()) {
        let fields: Vec<&str> = part.split(':').collect();
        let [slot, ty, rest @ ..] = fields.as_slice() else {
            debug!("bus: skipping output hint '{part}'");
            continue;
        };
        let Ok(idx) = slot.trim().parse::<usize>() else {
            debug!("bus: skipping output hint '{part}' with bad index");
            continue;
        };
        let has_input = rest.first().is_some_and(|flag| flag.trim() == "1");
        map.insert(
            idx,
            OutputHint {
                ty: TypeTag::from(*ty),
                has_input,
            },
        );
    }
    map
}

/// Run one pack/unpack step. `width` is the total output count including the bus slot.
pub fn step<I, K>(incoming: Option<Value>, direct_inputs: I, options: &StepOptions, width: usize) -> BusStep
where
    I: IntoIterator<Item = (K, Option<Value>)>,
    K: AsRef<str>,
{
    let mut bus = Bus::coerce(incoming);

    let mut direct: Vec<(usize, Value)> = direct_inputs
        .into_iter()
        .filter_map(|(key, value)| {
            let key = key.as_ref();
            if key == BUS_INPUT || is_reserved(key) {
                return None;
            }
            let slot = bus_slot(key);
            if slot.is_none() {
                debug!("bus: ignoring non-slot input '{key}'");
            }
            Some((slot?, value?))
        })
        .collect();
    direct.sort_by_key(|(slot, _)| *slot);

    let mut cursor = bus.next_index();
    let mut overwritten: HashSet<usize> = HashSet::new();
    let mut by_slot: HashMap<usize, Value> = HashMap::with_capacity(direct.len());

    for (slot, value) in direct {
        let ty = options.slot_types.get(&slot).cloned().unwrap_or_default();
        let target = if options.overwrite && !ty.is_wildcard() {
            first_exact(&bus, &ty, &overwritten)
        } else {
            None
        };
        let index = match (target, cursor) {
            (Some(idx), _) => {
                overwritten.insert(idx);
                idx
            }
            (None, Some(idx)) => {
                cursor = idx.checked_add(1);
                idx
            }
            (None, None) => {
                debug!("bus: no free index left, input_{slot} is only passed through");
                by_slot.insert(slot, value);
                continue;
            }
        };
        bus.insert(index, BusEntry::new(value.clone(), ty));
        by_slot.insert(slot, value);
    }

    let mut claimed: HashSet<usize> = HashSet::new();
    let mut outputs = Vec::with_capacity(width.saturating_sub(1));
    for slot in 1..width {
        if let Some(value) = by_slot.remove(&slot) {
            outputs.push(Some(value));
            continue;
        }
        let resolved = match options.output_hints.get(&slot) {
            Some(hint) if !hint.has_input => first_match(&bus, &hint.ty, &claimed).map(|idx| {
                claimed.insert(idx);
                bus.get(idx).map(|entry| entry.data.clone())
            }),
            Some(hint) => {
                debug!("bus: output {slot} expects a direct {} input but none arrived", hint.ty);
                None
            }
            None => None,
        };
        outputs.push(resolved.flatten());
    }

    BusStep { bus, outputs }
}

/// Lowest unclaimed index whose tag equals `ty` exactly (overwrite policy).
fn first_exact(bus: &Bus, ty: &TypeTag, claimed: &HashSet<usize>) -> Option<usize> {
    bus.iter()
        .find(|(idx, entry)| !claimed.contains(idx) && entry.type_tag == *ty)
        .map(|(idx, _)| idx)
}

/// Lowest unclaimed index whose tag matches `ty`, wildcard on either side.
fn first_match(bus: &Bus, ty: &TypeTag, claimed: &HashSet<usize>) -> Option<usize> {
    bus.iter()
        .find(|(idx, entry)| !claimed.contains(idx) && entry.type_tag.matches(ty))
        .map(|(idx, _)| idx)
}
