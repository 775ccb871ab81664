use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use tojioo_api_core::TypeTag;

use crate::batch::BatchKind;
use crate::config::PassthroughConfig;
use crate::slot::is_reserved;
use crate::types::{
    forces_input, NodeKind, PassthroughSpec, SwitchSpec, BATCH_SWITCH_SPECS, SWITCH_SPECS,
    TYPE_SPECS,
};

/// Widget options for an input the host renders inline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WidgetSpec {
    pub default: JsonValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<i64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub multiline: bool,
    #[serde(skip_serializing_if = "is_blank")]
    pub tooltip: &'static str,
}

fn is_blank(text: &&str) -> bool {
    text.is_empty()
}

impl WidgetSpec {
    pub fn int(default: i64, min: i64, max: i64, step: i64, tooltip: &'static str) -> Self {
        WidgetSpec {
            default: json!(default),
            min: Some(min),
            max: Some(max),
            step: Some(step),
            multiline: false,
            tooltip,
        }
    }

    fn text(default: &str, multiline: bool) -> Self {
        WidgetSpec {
            default: json!(default),
            min: None,
            max: None,
            step: None,
            multiline,
            tooltip: "",
        }
    }

    /// Clamp an integer into `[min, max]`.
    pub fn clamp_int(&self, value: i64) -> i64 {
        let lo = self.min.unwrap_or(i64::MIN);
        let hi = self.max.unwrap_or(i64::MAX);
        value.clamp(lo, hi)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeTag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub widget: Option<WidgetSpec>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub force_input: bool,
}

impl PortSpec {
    pub fn new(name: impl Into<String>, ty: &str) -> Self {
        PortSpec {
            name: name.into(),
            ty: TypeTag::from(ty),
            widget: None,
            force_input: false,
        }
    }

    /// Socket-only input; primitive types get `forceInput` so the host shows a socket.
    pub fn socket(name: impl Into<String>, ty: &str) -> Self {
        PortSpec {
            force_input: forces_input(ty),
            ..PortSpec::new(name, ty)
        }
    }

    pub fn with_widget(mut self, widget: WidgetSpec) -> Self {
        self.widget = Some(widget);
        self
    }
}

/// Open-ended input set: any non-reserved key (optionally restricted to a prefix) is
/// accepted and typed as `ty`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DynamicInputs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(rename = "type")]
    pub ty: TypeTag,
}

impl DynamicInputs {
    pub fn any(ty: &str) -> Self {
        DynamicInputs {
            prefix: None,
            ty: TypeTag::from(ty),
        }
    }

    pub fn prefixed(prefix: &str, ty: &str) -> Self {
        DynamicInputs {
            prefix: Some(prefix.to_string()),
            ty: TypeTag::from(ty),
        }
    }

    pub fn accepts(&self, key: &str) -> bool {
        if is_reserved(key) {
            return false;
        }
        match &self.prefix {
            Some(prefix) => key.starts_with(prefix.as_str()),
            None => true,
        }
    }

    pub fn type_for(&self, key: &str) -> Option<TypeTag> {
        self.accepts(key).then(|| self.ty.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSignature {
    pub class_name: String,
    pub display_name: String,
    pub description: String,
    pub category: String,
    #[serde(flatten)]
    pub kind: NodeKind,
    pub required: Vec<PortSpec>,
    pub optional: Vec<PortSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamic_inputs: Option<DynamicInputs>,
    pub hidden: Vec<PortSpec>,
    pub outputs: Vec<PortSpec>,
    pub output_node: bool,
    pub function: String,
}

impl NodeSignature {
    fn new(kind: NodeKind, class_name: &str, display_name: &str, category: &str) -> Self {
        NodeSignature {
            class_name: class_name.to_string(),
            display_name: display_name.to_string(),
            description: String::new(),
            category: category.to_string(),
            kind,
            required: Vec::new(),
            optional: Vec::new(),
            dynamic_inputs: None,
            hidden: Vec::new(),
            outputs: Vec::new(),
            output_node: false,
            function: "run".to_string(),
        }
    }

    fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    fn static_inputs(&self) -> impl Iterator<Item = &PortSpec> {
        self.required
            .iter()
            .chain(&self.optional)
            .chain(&self.hidden)
    }

    /// Whether the host may send `key` as an input keyword.
    pub fn accepts_input(&self, key: &str) -> bool {
        self.input_type(key).is_some()
    }

    /// Type tag for `key`; the dynamic capability is asked before the static tables.
    pub fn input_type(&self, key: &str) -> Option<TypeTag> {
        if let Some(ty) = self.dynamic_inputs.as_ref().and_then(|d| d.type_for(key)) {
            return Some(ty);
        }
        self.static_inputs()
            .find(|port| port.name == key)
            .map(|port| port.ty.clone())
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|port| port.name.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Registry {
    pub version: &'static str,
    pub nodes: IndexMap<String, NodeSignature>,
}

impl Registry {
    pub fn get(&self, class_name: &str) -> Option<&NodeSignature> {
        self.nodes.get(class_name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push(&mut self, sig: NodeSignature) {
        self.nodes.insert(sig.class_name.clone(), sig);
    }
}

/// Registry built from the default configuration.
pub fn registry() -> Registry {
    registry_with(&PassthroughConfig::default())
}

pub fn registry_with(cfg: &PassthroughConfig) -> Registry {
    let cats = &cfg.categories;
    let mut reg = Registry {
        version: env!("CARGO_PKG_VERSION"),
        nodes: IndexMap::new(),
    };

    for spec in TYPE_SPECS {
        reg.push(passthrough_node(spec, false, &cats.simple));
    }
    for spec in TYPE_SPECS.iter().filter(|s| forces_input(s.type_name)) {
        reg.push(passthrough_node(spec, true, &cats.widgets));
    }

    let mut conditioning =
        NodeSignature::new(NodeKind::Conditioning, "PT_Conditioning", "Conditioning Passthrough", &cats.simple)
            .describe("Passthrough for positive and negative conditioning.");
    conditioning.optional = vec![
        PortSpec::new("positive", "CONDITIONING"),
        PortSpec::new("negative", "CONDITIONING"),
    ];
    conditioning.outputs = conditioning.optional.clone();
    conditioning.output_node = true;
    reg.push(conditioning);

    let mut multi = NodeSignature::new(NodeKind::MultiPass, "PT_MultiPass", "Multi-Passthrough", &cats.root)
        .describe("Multi-type passthrough. Wire only the sockets you need.");
    multi.optional = MULTI_PASS_SOCKETS
        .iter()
        .map(|(name, ty)| PortSpec::socket(*name, ty))
        .collect();
    multi.outputs = MULTI_PASS_SOCKETS
        .iter()
        .map(|(name, ty)| PortSpec::new(*name, ty))
        .collect();
    reg.push(multi);

    for spec in SWITCH_SPECS {
        reg.push(switch_node(spec, NodeKind::Switch, &cats.switch));
    }
    for spec in BATCH_SWITCH_SPECS {
        let Some(kind) = BatchKind::from_type_name(spec.type_name) else {
            continue;
        };
        reg.push(switch_node(spec, NodeKind::BatchSwitch(kind), &cats.batch_switch));
    }

    let mut any = NodeSignature::new(NodeKind::DynamicAny, "PT_DynamicAny", "Dynamic Any", &cats.dynamic)
        .describe("Pass any type through unchanged. Type follows the connection.");
    any.optional = vec![PortSpec::new("input", "*")];
    any.outputs = vec![PortSpec::new("output", "*")];
    reg.push(any);

    let width = cfg.max_sockets;
    let mut dynamic = NodeSignature::new(
        NodeKind::DynamicPassthrough,
        "PT_DynamicPassthrough",
        "Dynamic Passthrough",
        &cats.dynamic,
    )
    .describe("One output per input; slots appear as connections are made.");
    dynamic.dynamic_inputs = Some(DynamicInputs::any("*"));
    dynamic.outputs = (1..=width)
        .map(|i| match i {
            1 => PortSpec::new("output", "*"),
            _ => PortSpec::new(format!("output_{i}"), "*"),
        })
        .collect();
    reg.push(dynamic);

    let mut bus = NodeSignature::new(NodeKind::DynamicBus, "PT_DynamicBus", "Dynamic Bus", &cats.dynamic)
        .describe("Pack values into a bus, unpack values from a received bus, or pass through.");
    bus.optional = vec![PortSpec::new("bus", "*")];
    bus.dynamic_inputs = Some(DynamicInputs::any("*"));
    bus.hidden = vec![
        PortSpec::new("_slot_types", "STRING").with_widget(WidgetSpec::text("", false)),
        PortSpec::new("_output_hints", "STRING").with_widget(WidgetSpec::text("", false)),
        PortSpec::new("_overwrite_mode", "STRING").with_widget(WidgetSpec::text("0", false)),
    ];
    bus.outputs = std::iter::once(PortSpec::new("bus", "*"))
        .chain((1..width).map(|i| PortSpec::new(format!("output_{i}"), "*")))
        .collect();
    reg.push(bus);

    let mut preview =
        NodeSignature::new(NodeKind::DynamicPreview, "PT_DynamicPreview", "Dynamic Preview", &cats.dynamic)
            .describe("Previews any value. Images and masks display visually; other types display as text.");
    preview.dynamic_inputs = Some(DynamicInputs::any("*"));
    preview.hidden = vec![
        PortSpec::new("prompt", "PROMPT"),
        PortSpec::new("extra_pnginfo", "EXTRA_PNGINFO"),
        PortSpec::new("unique_id", "UNIQUE_ID"),
    ];
    preview.output_node = true;
    preview.function = "preview_images".to_string();
    reg.push(preview);

    let mut dual = NodeSignature::new(
        NodeKind::DualClipEncode,
        "PT_DualCLIPEncode",
        "Dual CLIP Text Encode",
        &cats.root,
    )
    .describe("Encodes a positive and a negative prompt with one shared CLIP model.");
    dual.required = vec![
        PortSpec::new("clip", "CLIP"),
        PortSpec::new("positive", "STRING").with_widget(WidgetSpec::text("", true)),
        PortSpec::new("negative", "STRING").with_widget(WidgetSpec::text("", true)),
    ];
    dual.outputs = vec![
        PortSpec::new("positive", "CONDITIONING"),
        PortSpec::new("negative", "CONDITIONING"),
    ];
    reg.push(dual);

    let mut tiled = NodeSignature::new(
        NodeKind::TiledVaeSettings,
        "PT_TiledVAESettings",
        "Tiled VAE Settings",
        &cats.root,
    )
    .describe("Tiled VAE encode/decode settings as connectable outputs.");
    tiled.required = tiled_vae_widgets()
        .into_iter()
        .map(|(name, widget)| PortSpec::new(name, "INT").with_widget(widget))
        .collect();
    tiled.outputs = tiled
        .required
        .iter()
        .map(|port| PortSpec::new(port.name.clone(), "INT"))
        .collect();
    reg.push(tiled);

    reg
}

pub const MULTI_PASS_SOCKETS: &[(&str, &str)] = &[
    ("image", "IMAGE"),
    ("mask", "MASK"),
    ("latent", "LATENT"),
    ("positive", "CONDITIONING"),
    ("negative", "CONDITIONING"),
    ("clip", "CLIP"),
    ("model", "MODEL"),
    ("vae", "VAE"),
    ("control_net", "CONTROL_NET"),
    ("sam_model", "SAM_MODEL"),
    ("string", "STRING"),
    ("int", "INT"),
    ("float", "FLOAT"),
    ("boolean", "BOOLEAN"),
];

fn tiled_vae_widgets() -> [(&'static str, WidgetSpec); 4] {
    [
        ("tile_size", WidgetSpec::int(512, 64, 4096, 32, "Size of each tile for VAE encoding/decoding")),
        ("overlap", WidgetSpec::int(64, 0, 4096, 32, "Overlap between adjacent tiles in pixels")),
        ("temporal_size", WidgetSpec::int(64, 8, 4096, 4, "Number of frames per temporal tile (video VAE)")),
        ("temporal_overlap", WidgetSpec::int(8, 4, 4096, 4, "Overlap between temporal tiles in frames")),
    ]
}

fn passthrough_node(spec: &PassthroughSpec, widget: bool, category: &str) -> NodeSignature {
    let base = spec.class_name.trim_start_matches("PT_").replace("String", "Text");
    let (class_name, display_name) = if widget {
        (format!("{}Widget", spec.class_name), format!("{base} Passthrough (Widget)"))
    } else {
        (spec.class_name.to_string(), format!("{base} Passthrough"))
    };
    let mut sig = NodeSignature::new(NodeKind::Passthrough, &class_name, &display_name, category)
        .describe(format!("Pass {} through unchanged.", spec.type_name));
    let input = if widget {
        PortSpec::new(spec.socket, spec.type_name)
    } else {
        PortSpec::socket(spec.socket, spec.type_name)
    };
    sig.optional = vec![input];
    sig.outputs = vec![PortSpec::new(spec.socket, spec.type_name)];
    sig
}

fn switch_node(spec: &SwitchSpec, kind: NodeKind, category: &str) -> NodeSignature {
    let description = match kind {
        NodeKind::BatchSwitch(_) => format!(
            "Returns the connected {ty} input, or merges several into one batch.",
            ty = spec.type_name
        ),
        _ => format!(
            "Returns the first connected {ty} input by index. Bypassed or muted inputs are ignored.",
            ty = spec.type_name
        ),
    };
    let mut sig = NodeSignature::new(kind, spec.class_name, spec.display_name, category).describe(description);
    let first = format!("{}_1", spec.prefix);
    sig.optional = vec![match kind {
        NodeKind::Switch => PortSpec::socket(first, spec.type_name),
        _ => PortSpec::new(first, spec.type_name),
    }];
    sig.dynamic_inputs = Some(DynamicInputs::prefixed(spec.prefix, spec.type_name));
    sig.outputs = vec![PortSpec::new(spec.output, spec.type_name)];
    sig
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_every_family() {
        let reg = registry();
        // 12 simple + 4 widgets + conditioning + multi + 12 switches + 4 batch switches
        // + dynamic any/passthrough/bus/preview + dual clip + tiled vae
        assert_eq!(reg.len(), 12 + 4 + 1 + 1 + 12 + 4 + 4 + 2);
        for class in ["PT_IntWidget", "PT_BoolWidget", "PT_AnyConditioningBatchSwitch", "PT_TiledVAESettings"] {
            assert!(reg.get(class).is_some(), "{class} missing");
        }
        assert!(reg.get("PT_ImageWidget").is_none());
    }

    #[test]
    fn prefixless_dynamic_nodes_accept_any_key() {
        let reg = registry();
        for sig in reg.nodes.values().filter(|s| s.kind.is_dynamic()) {
            let Some(dynamic) = &sig.dynamic_inputs else {
                panic!("{} has no dynamic inputs", sig.class_name);
            };
            if dynamic.prefix.is_none() {
                for key in ["input_1", "anything", "x_-1"] {
                    assert!(sig.accepts_input(key), "{} rejects {key}", sig.class_name);
                    assert_eq!(sig.input_type(key), Some(TypeTag::Wildcard));
                }
            }
            assert!(!dynamic.accepts("_slot_types"));
        }
    }

    #[test]
    fn switch_accepts_its_family_only() {
        let reg = registry();
        let sig = reg.get("PT_AnyMaskSwitch").expect("mask switch");
        assert_eq!(sig.input_type("mask_9"), Some(TypeTag::named("MASK")));
        assert!(!sig.accepts_input("image_1"));
        assert_eq!(sig.category, "Tojioo Passthrough/Dynamic Nodes/Switch Nodes");
    }

    #[test]
    fn force_input_only_on_socket_variants() {
        let reg = registry();
        let int = reg.get("PT_Int").expect("int");
        let widget = reg.get("PT_IntWidget").expect("int widget");
        assert!(int.optional[0].force_input);
        assert!(!widget.optional[0].force_input);
        assert_eq!(widget.display_name, "Int Passthrough (Widget)");
        assert_eq!(reg.get("PT_String").map(|s| s.display_name.as_str()), Some("Text Passthrough"));
        assert!(!reg.get("PT_Image").expect("image").optional[0].force_input);
    }

    #[test]
    fn dynamic_widths_follow_config() {
        let cfg = PassthroughConfig {
            max_sockets: 4,
            ..PassthroughConfig::default()
        };
        let reg = registry_with(&cfg);
        let bus = reg.get("PT_DynamicBus").expect("bus");
        assert_eq!(bus.output_names().collect::<Vec<_>>(), ["bus", "output_1", "output_2", "output_3"]);
        let dynamic = reg.get("PT_DynamicPassthrough").expect("dynamic");
        assert_eq!(dynamic.output_names().collect::<Vec<_>>(), ["output", "output_2", "output_3", "output_4"]);
    }

    #[test]
    fn registry_serializes_kind_and_types() {
        let json = serde_json::to_value(registry()).expect("serialize");
        let node = &json["nodes"]["PT_AnyLatentBatchSwitch"];
        assert_eq!(node["kind"], "batch_switch");
        assert_eq!(node["batch"], "latent");
        assert_eq!(node["dynamic_inputs"]["type"], "LATENT");
        assert_eq!(json["nodes"]["PT_TiledVAESettings"]["required"][0]["widget"]["default"], 512);
    }
}
