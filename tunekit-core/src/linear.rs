//! Discovery of LoRA target modules.

use crate::error::{Result, TuneError};
use crate::model::{BITSANDBYTES, CHATGLM, ModuleKind, PreTrainedModel};
use std::collections::HashSet;

/// The linear layer type used by a model given its quantization state.
pub fn linear_kind(model: &dyn PreTrainedModel) -> Result<ModuleKind> {
    match model.quantization_method() {
        None => Ok(ModuleKind::Linear),
        Some(BITSANDBYTES) if model.is_loaded_in_4bit() => Ok(ModuleKind::Linear4bit),
        Some(BITSANDBYTES) => Ok(ModuleKind::Linear8bitLt),
        Some(other) => Err(TuneError::config(format!(
            "Finding linear modules for {other} models is not supported."
        ))),
    }
}

/// Path fragments identifying the output projection of a model.
pub fn output_layer_names(model_type: &str) -> Vec<&'static str> {
    let mut names = vec!["lm_head"];
    if model_type == CHATGLM {
        names.push("output_layer");
    }
    names
}

/// Leaf names of every linear module that can take a LoRA adapter.
///
/// Output projections are never returned. Names are distinct and keep the
/// order in which they were first seen.
pub fn find_all_linear_modules(model: &dyn PreTrainedModel) -> Result<Vec<String>> {
    let kind = linear_kind(model)?;
    let excluded = output_layer_names(model.model_type());

    let mut seen = HashSet::new();
    let mut module_names = Vec::new();
    for module in model.named_modules() {
        if module.kind != kind || excluded.iter().any(|name| module.name.contains(name)) {
            continue;
        }
        let leaf = module.leaf_name();
        if seen.insert(leaf.to_string()) {
            module_names.push(leaf.to_string());
        }
    }

    tracing::info!("Found linear modules: {}", module_names.join(","));
    Ok(module_names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_layer_names() {
        assert_eq!(output_layer_names("llama"), vec!["lm_head"]);
        assert_eq!(output_layer_names("chatglm"), vec!["lm_head", "output_layer"]);
    }
}
