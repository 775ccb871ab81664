use serde::{Deserialize, Serialize};
use tojioo_api_core::Value;

use crate::batch::BatchKind;
use crate::preview::PreviewUi;

/// Behaviour family of a registered node; selects the body `run_node` executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "batch")]
pub enum NodeKind {
    Passthrough,
    Switch,
    BatchSwitch(BatchKind),
    MultiPass,
    Conditioning,
    DynamicAny,
    DynamicPassthrough,
    DynamicBus,
    DynamicPreview,
    DualClipEncode,
    TiledVaeSettings,
}

impl NodeKind {
    /// Nodes whose input set is open-ended.
    pub fn is_dynamic(self) -> bool {
        matches!(
            self,
            NodeKind::Switch
                | NodeKind::BatchSwitch(_)
                | NodeKind::DynamicPassthrough
                | NodeKind::DynamicBus
                | NodeKind::DynamicPreview
        )
    }
}

/// One simple 1-in/1-out passthrough: class name, host type, socket name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassthroughSpec {
    pub class_name: &'static str,
    pub type_name: &'static str,
    pub socket: &'static str,
}

const fn pt(class_name: &'static str, type_name: &'static str, socket: &'static str) -> PassthroughSpec {
    PassthroughSpec {
        class_name,
        type_name,
        socket,
    }
}

pub const TYPE_SPECS: &[PassthroughSpec] = &[
    pt("PT_Image", "IMAGE", "image"),
    pt("PT_Mask", "MASK", "mask"),
    pt("PT_Latent", "LATENT", "latent"),
    pt("PT_CLIP", "CLIP", "clip"),
    pt("PT_Model", "MODEL", "model"),
    pt("PT_VAE", "VAE", "vae"),
    pt("PT_ControlNet", "CONTROL_NET", "control_net"),
    pt("PT_SAMModel", "SAM_MODEL", "sam_model"),
    pt("PT_String", "STRING", "string"),
    pt("PT_Int", "INT", "int"),
    pt("PT_Float", "FLOAT", "float"),
    pt("PT_Bool", "BOOLEAN", "boolean"),
];

/// Primitive types the host would otherwise render as widgets.
pub const FORCE_INPUT_TYPES: &[&str] = &["INT", "FLOAT", "BOOLEAN", "STRING"];

pub fn forces_input(type_name: &str) -> bool {
    FORCE_INPUT_TYPES.contains(&type_name)
}

/// A "first connected wins" or batching switch over a `<prefix>_N` input family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchSpec {
    pub class_name: &'static str,
    pub type_name: &'static str,
    pub prefix: &'static str,
    pub output: &'static str,
    pub display_name: &'static str,
}

const fn sw(
    class_name: &'static str,
    type_name: &'static str,
    prefix: &'static str,
    output: &'static str,
    display_name: &'static str,
) -> SwitchSpec {
    SwitchSpec {
        class_name,
        type_name,
        prefix,
        output,
        display_name,
    }
}

pub const SWITCH_SPECS: &[SwitchSpec] = &[
    sw("PT_AnyImageSwitch", "IMAGE", "image", "image", "Any Image Switch"),
    sw("PT_AnyMaskSwitch", "MASK", "mask", "mask", "Any Mask Switch"),
    sw("PT_AnyLatentSwitch", "LATENT", "latent", "latent", "Any Latent Switch"),
    sw("PT_AnyCLIPSwitch", "CLIP", "clip", "clip", "Any CLIP Switch"),
    sw("PT_AnyModelSwitch", "MODEL", "model", "model", "Any Model Switch"),
    sw("PT_AnyVAESwitch", "VAE", "vae", "vae", "Any VAE Switch"),
    sw("PT_AnyControlNetSwitch", "CONTROL_NET", "control_net", "control_net", "Any ControlNet Switch"),
    sw("PT_AnySAMModelSwitch", "SAM_MODEL", "sam_model", "sam_model", "Any SAM Model Switch"),
    sw("PT_AnyStringSwitch", "STRING", "string", "string", "Any String Switch"),
    sw("PT_AnyIntSwitch", "INT", "int", "int", "Any Int Switch"),
    sw("PT_AnyFloatSwitch", "FLOAT", "float", "float", "Any Float Switch"),
    sw("PT_AnyBoolSwitch", "BOOLEAN", "boolean", "boolean", "Any Bool Switch"),
];

pub const BATCH_SWITCH_SPECS: &[SwitchSpec] = &[
    sw("PT_AnyImageBatchSwitch", "IMAGE", "image", "images", "Any Image Batch Switch"),
    sw("PT_AnyMaskBatchSwitch", "MASK", "mask", "masks", "Any Mask Batch Switch"),
    sw("PT_AnyLatentBatchSwitch", "LATENT", "latent", "latents", "Any Latent Batch Switch"),
    sw(
        "PT_AnyConditioningBatchSwitch",
        "CONDITIONING",
        "conditioning",
        "conditioning",
        "Any Conditioning Batch Switch",
    ),
];

/// What a node hands back to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeOutput {
    /// Positional outputs; `None` is an unconnected/empty output.
    Values(Vec<Option<Value>>),
    Ui(PreviewUi),
}

impl NodeOutput {
    pub fn values(&self) -> Option<&[Option<Value>]> {
        match self {
            NodeOutput::Values(values) => Some(values),
            NodeOutput::Ui(_) => None,
        }
    }

    pub fn ui(&self) -> Option<&PreviewUi> {
        match self {
            NodeOutput::Ui(ui) => Some(ui),
            NodeOutput::Values(_) => None,
        }
    }
}
