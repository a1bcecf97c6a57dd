//! Model placement across one or more accelerators.
//!
//! [`dispatch_model`] decides between a single-device move and a balanced
//! multi-device placement. The placement math itself lives behind
//! [`DevicePlacer`]; [`BalancedPlacer`] is the default implementation.

pub mod balanced;

pub use balanced::{BalancedPlacer, PlacementUnit};

use crate::device::{AcceleratorProbe, DeviceId, current_device};
use crate::error::{Result, TuneError};
use crate::model::{CHATGLM, PreTrainedModel};
use candle_core::DType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-device memory budget in bytes.
pub type MaxMemory = BTreeMap<DeviceId, u64>;

/// Assignment of module paths to devices, in placement order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMap {
    entries: Vec<(String, DeviceId)>,
}

impl DeviceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the placement of `module`.
    pub fn insert(&mut self, module: impl Into<String>, device: DeviceId) {
        let module = module.into();
        match self.entries.iter_mut().find(|(name, _)| *name == module) {
            Some(entry) => entry.1 = device,
            None => self.entries.push((module, device)),
        }
    }

    /// Exact lookup.
    pub fn get(&self, module: &str) -> Option<DeviceId> {
        self.entries
            .iter()
            .find(|(name, _)| name == module)
            .map(|(_, device)| *device)
    }

    /// Device for an arbitrary module or parameter path.
    ///
    /// The longest entry that is the path itself or one of its dotted
    /// ancestors wins; the empty entry matches everything.
    pub fn device_for(&self, path: &str) -> Option<DeviceId> {
        self.entries
            .iter()
            .filter(|(name, _)| {
                name.is_empty()
                    || path == name
                    || path
                        .strip_prefix(name.as_str())
                        .is_some_and(|rest| rest.starts_with('.'))
            })
            .max_by_key(|(name, _)| name.len())
            .map(|(_, device)| *device)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, DeviceId)> {
        self.entries.iter().map(|(name, device)| (name.as_str(), *device))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct devices used by the map, sorted.
    pub fn devices(&self) -> Vec<DeviceId> {
        let mut devices: Vec<DeviceId> = self.entries.iter().map(|(_, d)| *d).collect();
        devices.sort();
        devices.dedup();
        devices
    }
}

/// The device-placement layer the dispatcher delegates to.
pub trait DevicePlacer {
    /// Memory budget per device that spreads the model evenly.
    fn balanced_memory(
        &self,
        model: &dyn PreTrainedModel,
        dtype: DType,
        no_split_module_classes: &[String],
    ) -> Result<MaxMemory>;

    /// Device map that fits `max_memory` without splitting protected classes.
    fn infer_device_map(
        &self,
        model: &dyn PreTrainedModel,
        max_memory: &MaxMemory,
        dtype: DType,
        no_split_module_classes: &[String],
    ) -> Result<DeviceMap>;

    /// Apply `device_map` to the model.
    fn dispatch(
        &self,
        model: &mut dyn PreTrainedModel,
        device_map: &DeviceMap,
        skip_keys: Option<&[String]>,
    ) -> Result<()>;
}

/// Place a freshly loaded model on the available accelerators.
///
/// Quantized models are returned untouched since their loader already placed
/// them. Models spread over several accelerators must declare their
/// non-splittable module classes.
pub fn dispatch_model<M: PreTrainedModel>(
    mut model: M,
    probe: &dyn AcceleratorProbe,
    placer: &dyn DevicePlacer,
) -> Result<M> {
    if model.quantization_method().is_some_and(|method| !method.is_empty()) {
        tracing::debug!("Model is quantized, keeping its current placement");
        return Ok(model);
    }

    let device_count = probe.device_count();
    if device_count > 1 && model.is_pretrained() && model.model_type() != CHATGLM {
        let no_split = model.no_split_modules().ok_or_else(|| {
            TuneError::config(
                "The model class needs to implement the `_no_split_modules` attribute.",
            )
        })?;
        let dtype = model.dtype();

        let max_memory = placer.balanced_memory(&model, dtype, &no_split)?;
        // Tied weights must be tied before the map is computed.
        model.tie_weights();
        let device_map = placer.infer_device_map(&model, &max_memory, dtype, &no_split)?;

        tracing::info!(
            devices = device_count,
            modules = device_map.len(),
            "Dispatching model across accelerators"
        );
        let skip_keys = model.skip_keys_device_placement();
        placer.dispatch(&mut model, &device_map, skip_keys.as_deref())?;
        Ok(model)
    } else {
        let device = current_device(probe);
        tracing::debug!(%device, "Moving model to a single device");
        model.to_device(device)?;
        Ok(model)
    }
}

/// [`dispatch_model`] with a [`BalancedPlacer`] built from `probe`.
pub fn dispatch_model_balanced<M: PreTrainedModel>(
    model: M,
    probe: &dyn AcceleratorProbe,
) -> Result<M> {
    let placer = BalancedPlacer::from_probe(probe);
    dispatch_model(model, probe, &placer)
}
