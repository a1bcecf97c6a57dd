//! Capability view of a loaded model, its configuration and its tokenizer.
//!
//! The operations in this crate never own a model's weights. They read what a
//! handle reports about itself and call back into it for the few mutations
//! they perform (weight tying, device placement). Anything optional is an
//! explicit `Option` or a defaulted trait method.

use crate::device::DeviceId;
use crate::dispatch::DeviceMap;
use crate::error::Result;
use candle_core::DType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Quantization method name reported by bitsandbytes-quantized models.
pub const BITSANDBYTES: &str = "bitsandbytes";

/// Architecture that keeps its own placement and names its head `output_layer`.
pub const CHATGLM: &str = "chatglm";

/// Layer type of a sub-module, as far as adapter targeting cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    /// Full-precision dense linear layer.
    Linear,
    /// bitsandbytes 4-bit linear layer.
    Linear4bit,
    /// bitsandbytes 8-bit linear layer.
    Linear8bitLt,
    Other,
}

/// One entry of a model's named module tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    /// Dotted path from the model root; the root itself is `""`.
    pub name: String,
    pub class_name: String,
    pub kind: ModuleKind,
    /// Parameters held directly by this module, excluding children.
    #[serde(default)]
    pub num_params: u64,
}

impl ModuleInfo {
    pub fn new(name: impl Into<String>, class_name: impl Into<String>, kind: ModuleKind) -> Self {
        Self {
            name: name.into(),
            class_name: class_name.into(),
            kind,
            num_params: 0,
        }
    }

    pub fn with_params(mut self, num_params: u64) -> Self {
        self.num_params = num_params;
        self
    }

    /// Last dotted path segment.
    pub fn leaf_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Whether `other` lives strictly below this module.
    pub fn is_ancestor_of(&self, other: &ModuleInfo) -> bool {
        if self.name.is_empty() {
            return !other.name.is_empty();
        }
        other
            .name
            .strip_prefix(&self.name)
            .is_some_and(|rest| rest.starts_with('.'))
    }
}

/// A class that can be exposed to the generic auto-loaders.
pub trait AutoRegistrable {
    /// Fully qualified name the auto-loaders resolve to.
    fn class_name(&self) -> &str;
}

/// A model's configuration object.
pub trait ModelConfig: AutoRegistrable {
    fn model_type(&self) -> &str;

    /// The `auto_map` declared by the configuration; empty when absent.
    fn auto_map(&self) -> &HashMap<String, String>;
}

/// The tokenizer paired with a model.
pub trait TokenizerHandle: AutoRegistrable {
    /// The `auto_map` passed through the tokenizer's init kwargs, if any.
    fn auto_map(&self) -> Option<&HashMap<String, String>>;
}

/// A loaded model.
pub trait PreTrainedModel: AutoRegistrable {
    /// Quantization method the model was loaded with, if any.
    fn quantization_method(&self) -> Option<&str>;

    fn is_loaded_in_4bit(&self) -> bool {
        false
    }

    /// Architecture tag from the model configuration.
    fn model_type(&self) -> &str;

    fn dtype(&self) -> DType;

    /// Every named sub-module, root included, in discovery order.
    fn named_modules(&self) -> Vec<ModuleInfo>;

    /// Module classes that must stay on one device. `None` when undeclared.
    fn no_split_modules(&self) -> Option<Vec<String>> {
        None
    }

    /// Keys the device-placement hooks should leave alone.
    fn skip_keys_device_placement(&self) -> Option<Vec<String>> {
        None
    }

    /// Whether this handle exposes the whole pretrained-model surface.
    /// Wrappers such as value-head models report `false`.
    fn is_pretrained(&self) -> bool {
        true
    }

    fn tie_weights(&mut self);

    /// Move every parameter to a single device.
    fn to_device(&mut self, device: DeviceId) -> Result<()>;

    /// Place sub-modules according to `device_map`.
    fn apply_device_map(
        &mut self,
        device_map: &DeviceMap,
        skip_keys: Option<&[String]>,
    ) -> Result<()>;
}
