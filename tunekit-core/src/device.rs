//! Compute device identifiers and accelerator discovery.

use crate::config::DeviceConfig;
use crate::error::TuneError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upper bound for sequential CUDA ordinal probing.
const MAX_PROBED_ORDINALS: usize = 64;

/// A compute device a module can live on.
///
/// Accelerators order before the CPU so sorted maps list them first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum DeviceId {
    Cuda(usize),
    Cpu,
}

impl DeviceId {
    pub fn is_accelerator(&self) -> bool {
        matches!(self, Self::Cuda(_))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cuda(ordinal) => write!(f, "cuda:{ordinal}"),
            Self::Cpu => f.write_str("cpu"),
        }
    }
}

impl FromStr for DeviceId {
    type Err = TuneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda(0)),
            _ => s
                .strip_prefix("cuda:")
                .and_then(|ordinal| ordinal.parse().ok())
                .map(Self::Cuda)
                .ok_or_else(|| TuneError::config(format!("unrecognized device '{s}'"))),
        }
    }
}

impl From<DeviceId> for String {
    fn from(device: DeviceId) -> Self {
        device.to_string()
    }
}

impl TryFrom<String> for DeviceId {
    type Error = TuneError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Reports which accelerators the process can see.
pub trait AcceleratorProbe {
    /// Number of visible accelerators.
    fn device_count(&self) -> usize;

    /// Total memory in bytes of the accelerator with the given ordinal, if known.
    fn total_memory(&self, ordinal: usize) -> Option<u64> {
        let _ = ordinal;
        None
    }
}

/// Accelerator view of the running process.
#[derive(Debug, Clone, Default)]
pub struct SystemAccelerators {
    count: usize,
    memory_bytes: Option<u64>,
}

impl SystemAccelerators {
    /// A fixed view, mostly useful for tests and dry runs.
    pub fn fixed(count: usize, memory_bytes: Option<u64>) -> Self {
        Self {
            count,
            memory_bytes,
        }
    }

    /// Probe the host for CUDA devices.
    ///
    /// Opens ordinals sequentially until one fails, never past the entries
    /// listed in `CUDA_VISIBLE_DEVICES` when it is set.
    pub fn detect() -> Self {
        if !candle_core::utils::cuda_is_available() {
            tracing::debug!("CUDA support not available, using CPU only");
            return Self::default();
        }

        let visible = std::env::var("CUDA_VISIBLE_DEVICES").ok();
        let count = count_openable(visible.as_deref(), |ordinal| {
            candle_core::Device::new_cuda(ordinal).is_ok()
        });
        tracing::debug!(count, "Detected CUDA accelerators");
        Self {
            count,
            memory_bytes: None,
        }
    }

    /// Build from configuration, falling back to detection for unset fields.
    pub fn from_config(config: &DeviceConfig) -> Self {
        let count = match config.visible_accelerators {
            Some(count) => count,
            None => Self::detect().count,
        };
        let memory_bytes = config
            .memory_gb
            .filter(|gb| *gb > 0.0)
            .map(|gb| (gb * 1024.0 * 1024.0 * 1024.0) as u64);
        Self {
            count,
            memory_bytes,
        }
    }
}

impl AcceleratorProbe for SystemAccelerators {
    fn device_count(&self) -> usize {
        self.count
    }

    fn total_memory(&self, ordinal: usize) -> Option<u64> {
        if ordinal < self.count {
            self.memory_bytes
        } else {
            None
        }
    }
}

/// Count the entries of a `CUDA_VISIBLE_DEVICES` value.
///
/// Enumeration stops at the first invalid (negative) entry, matching the
/// driver's behaviour.
pub fn parse_visible_devices(value: &str) -> usize {
    value
        .split(',')
        .map(str::trim)
        .take_while(|entry| !entry.is_empty() && !entry.starts_with('-'))
        .count()
}

/// Number of leading ordinals that `open` succeeds on, bounded by the
/// entries of `visible` when given.
pub fn count_openable(visible: Option<&str>, open: impl Fn(usize) -> bool) -> usize {
    let limit = visible.map_or(MAX_PROBED_ORDINALS, parse_visible_devices);
    (0..limit).take_while(|&ordinal| open(ordinal)).count()
}

/// The default device for single-device placement.
///
/// `cuda:<LOCAL_RANK>` when any accelerator is visible, else `cpu`.
pub fn current_device(probe: &dyn AcceleratorProbe) -> DeviceId {
    let local_rank = std::env::var("LOCAL_RANK").ok();
    current_device_for_rank(probe, local_rank.as_deref())
}

/// Same as [`current_device`] with an explicit local rank value.
pub fn current_device_for_rank(probe: &dyn AcceleratorProbe, local_rank: Option<&str>) -> DeviceId {
    if probe.device_count() == 0 {
        return DeviceId::Cpu;
    }
    let rank = local_rank
        .and_then(|rank| rank.trim().parse().ok())
        .unwrap_or(0);
    DeviceId::Cuda(rank)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_display_and_parse() {
        assert_eq!(DeviceId::Cuda(3).to_string(), "cuda:3");
        assert_eq!(DeviceId::Cpu.to_string(), "cpu");
        assert_eq!("cuda:1".parse::<DeviceId>().unwrap(), DeviceId::Cuda(1));
        assert_eq!("cuda".parse::<DeviceId>().unwrap(), DeviceId::Cuda(0));
        assert_eq!(" cpu ".parse::<DeviceId>().unwrap(), DeviceId::Cpu);
        assert!("tpu:0".parse::<DeviceId>().is_err());
        assert!("cuda:x".parse::<DeviceId>().is_err());
    }

    #[test]
    fn test_device_serde() {
        let json = serde_json::to_string(&DeviceId::Cuda(2)).unwrap();
        assert_eq!(json, "\"cuda:2\"");
        let parsed: DeviceId = serde_json::from_str("\"cpu\"").unwrap();
        assert_eq!(parsed, DeviceId::Cpu);
    }

    #[test]
    fn test_accelerators_sort_before_cpu() {
        let mut devices = vec![DeviceId::Cpu, DeviceId::Cuda(1), DeviceId::Cuda(0)];
        devices.sort();
        assert_eq!(devices, vec![DeviceId::Cuda(0), DeviceId::Cuda(1), DeviceId::Cpu]);
    }

    #[test]
    fn test_parse_visible_devices() {
        assert_eq!(parse_visible_devices("0,1,2"), 3);
        assert_eq!(parse_visible_devices("1"), 1);
        assert_eq!(parse_visible_devices(""), 0);
        assert_eq!(parse_visible_devices("0,-1,2"), 1);
        assert_eq!(parse_visible_devices("-1"), 0);
    }

    #[test]
    fn test_visible_devices_capped_by_openable() {
        let one_gpu = |ordinal: usize| ordinal < 1;
        assert_eq!(count_openable(Some("0,1,2,3"), one_gpu), 1);
        assert_eq!(count_openable(Some("2,3"), |ordinal| ordinal < 4), 2);
        assert_eq!(count_openable(Some("-1"), one_gpu), 0);
        assert_eq!(count_openable(None, |ordinal| ordinal < 3), 3);
    }

    #[test]
    fn test_current_device() {
        let none = SystemAccelerators::fixed(0, None);
        assert_eq!(current_device_for_rank(&none, Some("2")), DeviceId::Cpu);

        let two = SystemAccelerators::fixed(2, None);
        assert_eq!(current_device_for_rank(&two, None), DeviceId::Cuda(0));
        assert_eq!(current_device_for_rank(&two, Some("1")), DeviceId::Cuda(1));
        assert_eq!(current_device_for_rank(&two, Some("bogus")), DeviceId::Cuda(0));
    }

    #[test]
    fn test_from_config_overrides_detection() {
        let config = DeviceConfig {
            visible_accelerators: Some(4),
            memory_gb: Some(1.0),
        };
        let probe = SystemAccelerators::from_config(&config);
        assert_eq!(probe.device_count(), 4);
        assert_eq!(probe.total_memory(3), Some(1024 * 1024 * 1024));
        assert_eq!(probe.total_memory(4), None);
    }
}
