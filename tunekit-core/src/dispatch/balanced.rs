//! Greedy, memory-balanced device placement.

use super::{DeviceMap, DevicePlacer, MaxMemory};
use crate::device::{AcceleratorProbe, DeviceId};
use crate::error::Result;
use crate::model::{ModuleInfo, PreTrainedModel};
use candle_core::DType;

/// A group of modules that is always placed as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementUnit {
    pub name: String,
    pub class_name: String,
    /// Bytes of the parameters the unit places. Container units count only
    /// their direct parameters.
    pub size_bytes: u64,
    /// Whether the unit's class was declared non-splittable.
    pub no_split: bool,
}

/// Split a module tree into placement units.
///
/// The outermost module of each non-splittable class becomes one unit, and
/// so does every leaf module outside of such a unit. A container holding
/// parameters of its own gets a unit sized by those parameters only; its
/// children keep their own, longer entries in the device map.
pub fn placement_units(
    modules: &[ModuleInfo],
    dtype: DType,
    no_split_module_classes: &[String],
) -> Vec<PlacementUnit> {
    let elem = dtype.size_in_bytes() as u64;
    let mut units: Vec<PlacementUnit> = Vec::new();
    let mut protected: Vec<&ModuleInfo> = Vec::new();

    for module in modules {
        if protected.iter().any(|p| p.is_ancestor_of(module)) {
            continue;
        }
        let no_split = no_split_module_classes.contains(&module.class_name);
        let is_leaf = !modules.iter().any(|other| module.is_ancestor_of(other));
        if !no_split && !is_leaf {
            if module.num_params > 0 {
                units.push(PlacementUnit {
                    name: module.name.clone(),
                    class_name: module.class_name.clone(),
                    size_bytes: module.num_params * elem,
                    no_split: false,
                });
            }
            continue;
        }

        let params: u64 = module.num_params
            + modules
                .iter()
                .filter(|other| module.is_ancestor_of(other))
                .map(|other| other.num_params)
                .sum::<u64>();
        if no_split {
            protected.push(module);
        }
        units.push(PlacementUnit {
            name: module.name.clone(),
            class_name: module.class_name.clone(),
            size_bytes: params * elem,
            no_split,
        });
    }
    units
}

/// Spreads a model evenly over the visible accelerators, spilling to CPU.
#[derive(Debug, Clone, Default)]
pub struct BalancedPlacer {
    /// Reported memory per accelerator ordinal, when known.
    device_memory: Vec<Option<u64>>,
}

impl BalancedPlacer {
    pub fn new(device_memory: Vec<Option<u64>>) -> Self {
        Self { device_memory }
    }

    pub fn from_probe(probe: &dyn AcceleratorProbe) -> Self {
        let device_memory = (0..probe.device_count())
            .map(|ordinal| probe.total_memory(ordinal))
            .collect();
        Self { device_memory }
    }

    /// Budget computation over precomputed units.
    pub fn budget_for(&self, units: &[PlacementUnit]) -> MaxMemory {
        let mut max_memory = MaxMemory::new();
        let num_devices = self.device_memory.len();
        if num_devices > 0 {
            let total: u64 = units.iter().map(|u| u.size_bytes).sum();
            let headroom = units
                .iter()
                .filter(|u| u.no_split)
                .map(|u| u.size_bytes)
                .max()
                .unwrap_or(0);
            let per_device = total.div_ceil(num_devices as u64) + headroom;

            for (ordinal, reported) in self.device_memory.iter().enumerate() {
                let budget = if ordinal + 1 == num_devices {
                    reported.unwrap_or(per_device)
                } else {
                    reported.map_or(per_device, |mem| mem.min(per_device))
                };
                max_memory.insert(DeviceId::Cuda(ordinal), budget);
            }
        }
        max_memory.insert(DeviceId::Cpu, u64::MAX);
        max_memory
    }

    /// Greedy assignment of units to devices in budget order.
    pub fn map_units(&self, units: &[PlacementUnit], max_memory: &MaxMemory) -> DeviceMap {
        let accelerators: Vec<(DeviceId, u64)> = max_memory
            .iter()
            .filter(|(device, _)| device.is_accelerator())
            .map(|(device, budget)| (*device, *budget))
            .collect();

        let mut device_map = DeviceMap::new();
        let mut current = 0;
        let mut used: u64 = 0;
        for unit in units {
            let device = loop {
                let Some((device, budget)) = accelerators.get(current) else {
                    break DeviceId::Cpu;
                };
                if used.saturating_add(unit.size_bytes) <= *budget {
                    used += unit.size_bytes;
                    break *device;
                }
                current += 1;
                used = 0;
            };
            if device == DeviceId::Cpu {
                tracing::debug!(module = %unit.name, bytes = unit.size_bytes, "Offloading to CPU");
            }
            device_map.insert(unit.name.clone(), device);
        }
        device_map
    }
}

impl DevicePlacer for BalancedPlacer {
    fn balanced_memory(
        &self,
        model: &dyn PreTrainedModel,
        dtype: DType,
        no_split_module_classes: &[String],
    ) -> Result<MaxMemory> {
        let units = placement_units(&model.named_modules(), dtype, no_split_module_classes);
        Ok(self.budget_for(&units))
    }

    fn infer_device_map(
        &self,
        model: &dyn PreTrainedModel,
        max_memory: &MaxMemory,
        dtype: DType,
        no_split_module_classes: &[String],
    ) -> Result<DeviceMap> {
        let units = placement_units(&model.named_modules(), dtype, no_split_module_classes);
        Ok(self.map_units(&units, max_memory))
    }

    fn dispatch(
        &self,
        model: &mut dyn PreTrainedModel,
        device_map: &DeviceMap,
        skip_keys: Option<&[String]>,
    ) -> Result<()> {
        model.apply_device_map(device_map, skip_keys)
    }
}
