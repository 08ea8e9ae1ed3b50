//! Where argument data lives, and what the executing host can run.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A compute device an argument can be resident on.
///
/// Only host kernels exist; arguments tagged with a GPU are staged on the
/// host by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Device {
    #[default]
    Cpu,
    Gpu(usize),
}

impl Device {
    pub fn cpu() -> Self {
        Device::Cpu
    }

    pub fn gpu(index: usize) -> Self {
        Device::Gpu(index)
    }

    pub fn is_cpu(&self) -> bool {
        matches!(self, Device::Cpu)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Gpu(index) => write!(f, "gpu:{}", index),
        }
    }
}

/// What the executing host can do.
///
/// `accelerated` is true when the parallel tiled executor is compiled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapability {
    pub device: Device,
    pub workers: usize,
    pub accelerated: bool,
}

impl DeviceCapability {
    /// Capabilities of the current process.
    pub fn detect() -> Self {
        Self {
            device: Device::Cpu,
            workers: worker_count(),
            accelerated: cfg!(feature = "parallel"),
        }
    }

    /// A single-threaded host without the tiled executor.
    pub fn host_only() -> Self {
        Self {
            device: Device::Cpu,
            workers: 1,
            accelerated: false,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }
}

impl Default for DeviceCapability {
    fn default() -> Self {
        Self::detect()
    }
}

#[cfg(feature = "parallel")]
fn worker_count() -> usize {
    rayon::current_num_threads().max(1)
}

#[cfg(not(feature = "parallel"))]
fn worker_count() -> usize {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_display() {
        assert_eq!(Device::cpu().to_string(), "cpu");
        assert_eq!(Device::gpu(1).to_string(), "gpu:1");
        assert!(!Device::gpu(0).is_cpu());
    }

    #[test]
    fn test_detect() {
        let cap = DeviceCapability::detect();
        assert!(cap.workers >= 1);
        assert_eq!(cap.accelerated, cfg!(feature = "parallel"));
        assert!(cap.device.is_cpu());
    }

    #[test]
    fn test_host_only() {
        let cap = DeviceCapability::host_only().with_workers(0);
        assert_eq!(cap.workers, 1);
        assert!(!cap.accelerated);
    }
}
