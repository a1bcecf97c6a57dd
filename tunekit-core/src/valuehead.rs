//! Loading of value-head weights for reward modelling and PPO.
//!
//! A value head is a single linear summary layer stored next to a
//! checkpoint. Checkpoint formats are tried in order until one yields both
//! tensors; a missing value head is an expected outcome, not an error.

use crate::config::ModelArguments;
use crate::error::{Result, TuneError};
use crate::hub::{CheckpointResolver, HubResolver, SAFE_WEIGHTS_NAME, WEIGHTS_NAME};
use candle_core::safetensors::MmapedSafetensors;
use candle_core::{Device, Tensor};
use std::collections::HashMap;
use std::path::Path;

pub const V_HEAD_WEIGHT: &str = "v_head.summary.weight";
pub const V_HEAD_BIAS: &str = "v_head.summary.bias";

/// Weight and bias of the value-head summary layer, on CPU.
#[derive(Debug, Clone)]
pub struct ValueHeadParams {
    pub weight: Tensor,
    pub bias: Tensor,
}

impl ValueHeadParams {
    /// Pick the two value-head tensors out of a full state dict.
    ///
    /// Unrelated entries are ignored.
    pub fn from_named(tensors: impl IntoIterator<Item = (String, Tensor)>) -> Result<Self> {
        let mut weight = None;
        let mut bias = None;
        for (name, tensor) in tensors {
            match name.as_str() {
                V_HEAD_WEIGHT => weight = Some(tensor),
                V_HEAD_BIAS => bias = Some(tensor),
                _ => {}
            }
        }
        match (weight, bias) {
            (Some(weight), Some(bias)) => Ok(Self { weight, bias }),
            (None, _) => Err(TuneError::checkpoint(format!("missing tensor {V_HEAD_WEIGHT}"))),
            (_, None) => Err(TuneError::checkpoint(format!("missing tensor {V_HEAD_BIAS}"))),
        }
    }

    /// The tensors keyed by their state-dict names.
    pub fn into_state_dict(self) -> HashMap<String, Tensor> {
        HashMap::from([
            (V_HEAD_WEIGHT.to_string(), self.weight),
            (V_HEAD_BIAS.to_string(), self.bias),
        ])
    }
}

/// Reads value-head tensors out of a resolved checkpoint file.
pub type WeightReader = fn(&Path) -> Result<ValueHeadParams>;

/// A checkpoint format: its canonical filename and how to read it.
#[derive(Debug, Clone, Copy)]
pub struct WeightFormat {
    pub filename: &'static str,
    pub read: WeightReader,
}

impl WeightFormat {
    pub const SAFETENSORS: Self = Self {
        filename: SAFE_WEIGHTS_NAME,
        read: read_safetensors,
    };

    pub const PICKLE: Self = Self {
        filename: WEIGHTS_NAME,
        read: read_pickle,
    };

    /// Preferred format first.
    pub fn defaults() -> Vec<Self> {
        vec![Self::SAFETENSORS, Self::PICKLE]
    }
}

/// Read exactly the two value-head tensors from a safetensors file.
///
/// The file is memory-mapped; only the requested tensors are materialized.
pub fn read_safetensors(path: &Path) -> Result<ValueHeadParams> {
    // SAFETY: the mapping lives only for this call and checkpoint files are
    // not rewritten while being read.
    let file = unsafe { MmapedSafetensors::new(path)? };
    let weight = file.load(V_HEAD_WEIGHT, &Device::Cpu)?;
    let bias = file.load(V_HEAD_BIAS, &Device::Cpu)?;
    Ok(ValueHeadParams { weight, bias })
}

/// Fully deserialize a legacy pickle checkpoint onto CPU.
pub fn read_pickle(path: &Path) -> Result<ValueHeadParams> {
    let tensors = candle_core::pickle::read_all(path)?;
    ValueHeadParams::from_named(tensors)
}

/// Tries each configured format in order and keeps the first success.
pub struct ValueHeadLoader<R> {
    resolver: R,
    formats: Vec<WeightFormat>,
}

impl<R: CheckpointResolver> ValueHeadLoader<R> {
    pub fn new(resolver: R) -> Self {
        Self::with_formats(resolver, WeightFormat::defaults())
    }

    pub fn with_formats(resolver: R, formats: Vec<WeightFormat>) -> Self {
        Self { resolver, formats }
    }

    pub fn formats(&self) -> &[WeightFormat] {
        &self.formats
    }

    /// Load value-head weights from a local directory or Hub repository.
    ///
    /// Returns `None` when no format yields both tensors.
    pub fn load(&self, path_or_repo_id: &str) -> Option<ValueHeadParams> {
        for format in &self.formats {
            match self.try_format(path_or_repo_id, format) {
                Ok(params) => {
                    tracing::debug!(file = format.filename, "Loaded value head");
                    return Some(params);
                }
                Err(err) => tracing::info!("Failed to load {}: {}", format.filename, err),
            }
        }

        tracing::warn!(
            "Provided path ({}) does not contain valuehead weights.",
            path_or_repo_id
        );
        None
    }

    fn try_format(&self, path_or_repo_id: &str, format: &WeightFormat) -> Result<ValueHeadParams> {
        let file = self.resolver.resolve(path_or_repo_id, format.filename)?;
        (format.read)(&file)
    }
}

/// Load value-head weights using the cache directory and token in `model_args`.
pub fn load_valuehead_params(
    path_or_repo_id: &str,
    model_args: &ModelArguments,
) -> Option<ValueHeadParams> {
    ValueHeadLoader::new(HubResolver::from_args(model_args)).load(path_or_repo_id)
}
