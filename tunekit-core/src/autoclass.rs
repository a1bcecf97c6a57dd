//! Registration of custom classes with the generic auto-loaders.
//!
//! Models that ship their own configuration, modelling or tokenizer code
//! declare an `auto_map`. When saving such a model the classes must be
//! registered so the generic loaders can resolve them again.

use crate::model::{AutoRegistrable, ModelConfig, TokenizerHandle};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{LazyLock, Mutex, PoisonError};

/// Generic loader a class can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AutoClass {
    AutoConfig,
    AutoModelForCausalLM,
    AutoTokenizer,
}

impl AutoClass {
    pub const ALL: [AutoClass; 3] = [
        AutoClass::AutoConfig,
        AutoClass::AutoModelForCausalLM,
        AutoClass::AutoTokenizer,
    ];

    /// Key used for this loader in an `auto_map`.
    pub fn as_str(&self) -> &'static str {
        match self {
            AutoClass::AutoConfig => "AutoConfig",
            AutoClass::AutoModelForCausalLM => "AutoModelForCausalLM",
            AutoClass::AutoTokenizer => "AutoTokenizer",
        }
    }
}

impl fmt::Display for AutoClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink for auto-class registrations.
pub trait AutoClassRegistry {
    fn register(&self, auto_class: AutoClass, class_name: &str);
}

static REGISTERED: LazyLock<Mutex<BTreeMap<AutoClass, Vec<String>>>> =
    LazyLock::new(|| Mutex::new(BTreeMap::new()));

/// The process-wide registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalRegistry;

impl GlobalRegistry {
    /// Classes registered for `auto_class`, in registration order.
    pub fn registered(auto_class: AutoClass) -> Vec<String> {
        REGISTERED
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&auto_class)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_registered(auto_class: AutoClass, class_name: &str) -> bool {
        Self::registered(auto_class).iter().any(|c| c == class_name)
    }
}

impl AutoClassRegistry for GlobalRegistry {
    fn register(&self, auto_class: AutoClass, class_name: &str) {
        let mut registered = REGISTERED.lock().unwrap_or_else(PoisonError::into_inner);
        let classes = registered.entry(auto_class).or_default();
        if !classes.iter().any(|c| c == class_name) {
            classes.push(class_name.to_string());
            tracing::debug!(%auto_class, class_name, "Registered auto class");
        }
    }
}

fn register_if_declared(
    registry: &dyn AutoClassRegistry,
    declared: Option<&HashMap<String, String>>,
    auto_class: AutoClass,
    object: &dyn AutoRegistrable,
) {
    if declared.is_some_and(|auto_map| auto_map.contains_key(auto_class.as_str())) {
        registry.register(auto_class, object.class_name());
    }
}

/// Register the configuration, model and tokenizer classes whose `auto_map`
/// asks for it. Missing declarations are skipped.
pub fn register_autoclass(
    config: &dyn ModelConfig,
    model: &dyn AutoRegistrable,
    tokenizer: &dyn TokenizerHandle,
    registry: &dyn AutoClassRegistry,
) {
    let config_map = Some(config.auto_map());
    register_if_declared(registry, config_map, AutoClass::AutoConfig, config);
    register_if_declared(registry, config_map, AutoClass::AutoModelForCausalLM, model);
    register_if_declared(registry, tokenizer.auto_map(), AutoClass::AutoTokenizer, tokenizer);
}

/// [`register_autoclass`] against the [`GlobalRegistry`].
pub fn register_autoclass_global(
    config: &dyn ModelConfig,
    model: &dyn AutoRegistrable,
    tokenizer: &dyn TokenizerHandle,
) {
    register_autoclass(config, model, tokenizer, &GlobalRegistry);
}
