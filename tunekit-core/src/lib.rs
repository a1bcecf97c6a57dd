//! # tunekit-core — model utilities for LLM fine-tuning
//!
//! Small building blocks used around a fine-tuning run:
//!
//! - [`dispatch`] places a loaded model on one or several accelerators.
//! - [`linear`] finds the linear layers a LoRA adapter can target.
//! - [`valuehead`] loads value-head weights from a checkpoint directory or Hub repo.
//! - [`autoclass`] registers custom classes with the generic auto-loaders.
//! - [`modelcard`] builds model-card metadata from the run arguments.
//!
//! Models, configurations and tokenizers are seen through the traits in
//! [`model`]; nothing here owns weights.

pub mod autoclass;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod hub;
pub mod linear;
pub mod model;
pub mod modelcard;
pub mod valuehead;

// Re-exports
pub use autoclass::{AutoClass, AutoClassRegistry, GlobalRegistry, register_autoclass};
pub use config::{
    DataArguments, DeviceConfig, FinetuningArguments, FinetuningType, ModelArguments, TuneConfig,
    load_config,
};
pub use device::{AcceleratorProbe, DeviceId, SystemAccelerators, current_device};
pub use dispatch::{BalancedPlacer, DeviceMap, DevicePlacer, MaxMemory, dispatch_model};
pub use error::TuneError;
pub use hub::{CheckpointResolver, HubResolver};
pub use linear::find_all_linear_modules;
pub use model::{
    AutoRegistrable, ModelConfig, ModuleInfo, ModuleKind, PreTrainedModel, TokenizerHandle,
};
pub use modelcard::{ModelCardArgs, get_modelcard_args};
pub use valuehead::{ValueHeadLoader, ValueHeadParams, WeightFormat, load_valuehead_params};
