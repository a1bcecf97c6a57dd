//! Model card metadata for fine-tuned checkpoints.

use crate::config::{DataArguments, FinetuningArguments, FinetuningType, ModelArguments};
use serde::{Deserialize, Serialize};

/// Tag attached to every model card produced by tunekit.
pub const TUNEKIT_TAG: &str = "tunekit";

/// Arguments for the model card written next to a fine-tuned checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCardArgs {
    pub tasks: String,
    pub license: String,
    pub finetuned_from: String,
    #[serde(default)]
    pub dataset: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

pub fn get_modelcard_args(
    model_args: &ModelArguments,
    data_args: &DataArguments,
    finetuning_args: &FinetuningArguments,
) -> ModelCardArgs {
    let mut tags = vec![TUNEKIT_TAG.to_string()];
    if finetuning_args.finetuning_type == FinetuningType::Lora {
        tags.push("lora".to_string());
    }
    ModelCardArgs {
        tasks: "text-generation".to_string(),
        license: "other".to_string(),
        finetuned_from: model_args.model_name_or_path.clone(),
        dataset: data_args.dataset_list(),
        tags,
    }
}
