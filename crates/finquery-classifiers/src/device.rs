//! Compute device selection for neural inference

use candle_core::Device;
use finquery_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Device policy for inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DeviceType {
    /// CUDA if available, then Metal, otherwise CPU
    #[default]
    Auto,
    /// CPU inference (always available)
    Cpu,
    /// CUDA GPU inference
    Cuda(usize), // GPU index
    /// Metal (Apple Silicon)
    Metal(usize),
}

impl DeviceType {
    /// Resolve the policy into a concrete device.
    ///
    /// Called once per model load; the resulting device is kept with the model.
    pub fn resolve(self) -> Result<Device> {
        match self {
            Self::Auto => {
                if candle_core::utils::cuda_is_available() {
                    match Device::new_cuda(0) {
                        Ok(device) => return Ok(device),
                        Err(e) => tracing::warn!("CUDA reported available but failed to start: {}", e),
                    }
                }
                if candle_core::utils::metal_is_available() {
                    match Device::new_metal(0) {
                        Ok(device) => return Ok(device),
                        Err(e) => tracing::warn!("Metal reported available but failed to start: {}", e),
                    }
                }
                Ok(Device::Cpu)
            }
            Self::Cpu => Ok(Device::Cpu),
            Self::Cuda(idx) => Device::new_cuda(idx).map_err(|e| {
                Error::classifier(format!("Failed to create CUDA device {}: {}", idx, e))
            }),
            Self::Metal(idx) => Device::new_metal(idx).map_err(|e| {
                Error::classifier(format!("Failed to create Metal device {}: {}", idx, e))
            }),
        }
    }
}

/// Short name of a resolved device, for logs
pub fn device_label(device: &Device) -> &'static str {
    if device.is_cuda() {
        "cuda"
    } else if device.is_metal() {
        "metal"
    } else {
        "cpu"
    }
}

impl FromStr for DeviceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        let (kind, index) = match s.split_once(':') {
            Some((kind, idx)) => {
                let idx = idx.parse::<usize>().map_err(|_| {
                    Error::config(format!("Invalid device index in '{}'", s))
                })?;
                (kind.to_string(), Some(idx))
            }
            None => (s.clone(), None),
        };

        match (kind.as_str(), index) {
            ("auto", None) => Ok(Self::Auto),
            ("cpu", None) => Ok(Self::Cpu),
            ("cuda" | "gpu", idx) => Ok(Self::Cuda(idx.unwrap_or(0))),
            ("metal" | "mps", idx) => Ok(Self::Metal(idx.unwrap_or(0))),
            _ => Err(Error::config(format!(
                "Unknown device '{}' (expected auto, cpu, cuda[:N] or metal[:N])",
                s
            ))),
        }
    }
}

impl TryFrom<String> for DeviceType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DeviceType> for String {
    fn from(value: DeviceType) -> Self {
        value.to_string()
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda(idx) => write!(f, "cuda:{}", idx),
            Self::Metal(idx) => write!(f, "metal:{}", idx),
        }
    }
}
