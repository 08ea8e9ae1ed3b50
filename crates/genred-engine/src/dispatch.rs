//! Backend selection and capability negotiation.
//!
//! [`select`] maps a requested [`BackendMode`] to a concrete [`BackendKind`]
//! and never fails. [`negotiate`] is the strict entry point used by the
//! engine: explicit requests that cannot run here are rejected, only
//! [`BackendMode::Auto`] is allowed to fall back.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::backend::{DenseBackend, ReductionBackend, Tiled1D, Tiled2D};
use crate::device::DeviceCapability;
use crate::error::{ReductionError, ReductionResult};
use crate::tensor::Residency;

/// Requested execution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// Heuristic choice, may fall back
    #[default]
    Auto,
    Tiled1D,
    Tiled2D,
    DenseFallback,
    /// Any tiled strategy, chosen by the heuristic
    Accelerated,
}

impl BackendMode {
    pub fn name(&self) -> &'static str {
        match self {
            BackendMode::Auto => "auto",
            BackendMode::Tiled1D => "Tiled1D",
            BackendMode::Tiled2D => "Tiled2D",
            BackendMode::DenseFallback => "DenseFallback",
            BackendMode::Accelerated => "Accelerated",
        }
    }

    /// Parse a mode, mapping unknown spellings to `Auto`.
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or(BackendMode::Auto)
    }

    fn needs_accelerator(&self) -> bool {
        matches!(
            self,
            BackendMode::Tiled1D | BackendMode::Tiled2D | BackendMode::Accelerated
        )
    }
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for BackendMode {
    type Err = ReductionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Ok(BackendMode::Auto),
            "tiled1d" | "gpu_1d" | "1d" => Ok(BackendMode::Tiled1D),
            "tiled2d" | "gpu_2d" | "2d" => Ok(BackendMode::Tiled2D),
            "densefallback" | "dense" | "pytorch" | "cpu" => Ok(BackendMode::DenseFallback),
            "accelerated" | "gpu" => Ok(BackendMode::Accelerated),
            _ => Err(ReductionError::backend_unavailable(
                s,
                "any device",
                "unknown backend name",
            )),
        }
    }
}

/// Concrete execution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    DenseFallback,
    Tiled1D,
    Tiled2D,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::DenseFallback => "DenseFallback",
            BackendKind::Tiled1D => "Tiled1D",
            BackendKind::Tiled2D => "Tiled2D",
        };
        write!(f, "{}", name)
    }
}

/// Tiling parameters and the auto heuristic's thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileSizes {
    pub block_rows: usize,
    pub block_cols: usize,
    /// Problems whose `(M, N, D)` table has at most this many values run
    /// dense under `Auto`
    pub dense_max_elements: usize,
}

impl Default for TileSizes {
    fn default() -> Self {
        Self {
            block_rows: 64,
            block_cols: 256,
            dense_max_elements: 16_384,
        }
    }
}

impl TileSizes {
    pub fn backend(&self, kind: BackendKind) -> Box<dyn ReductionBackend> {
        match kind {
            BackendKind::DenseFallback => Box::new(DenseBackend),
            BackendKind::Tiled1D => Box::new(Tiled1D::new(self.block_rows)),
            BackendKind::Tiled2D => Box::new(Tiled2D::new(self.block_rows, self.block_cols)),
        }
    }
}

fn heuristic_tiled(m: usize, capability: &DeviceCapability, tiles: &TileSizes) -> BackendKind {
    let outer_blocks = m.div_ceil(tiles.block_rows.max(1));
    if outer_blocks >= capability.workers {
        BackendKind::Tiled1D
    } else {
        BackendKind::Tiled2D
    }
}

/// Map a requested mode to a concrete strategy. Never fails.
///
/// `Auto` picks the dense fallback without an accelerator or when the
/// pairwise table has at most `dense_max_elements` values. Otherwise it picks
/// `Tiled1D` when the outer index gives at least one row block per worker and
/// `Tiled2D` when it does not.
pub fn select(
    m: usize,
    n: usize,
    d: usize,
    capability: &DeviceCapability,
    requested: BackendMode,
    tiles: &TileSizes,
) -> BackendKind {
    match requested {
        BackendMode::DenseFallback => BackendKind::DenseFallback,
        BackendMode::Tiled1D => BackendKind::Tiled1D,
        BackendMode::Tiled2D => BackendKind::Tiled2D,
        BackendMode::Accelerated => heuristic_tiled(m, capability, tiles),
        BackendMode::Auto => {
            if !capability.accelerated
                || m.saturating_mul(n).saturating_mul(d) <= tiles.dense_max_elements
            {
                BackendKind::DenseFallback
            } else {
                heuristic_tiled(m, capability, tiles)
            }
        }
    }
}

/// Outcome of negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    pub mode: BackendMode,
    /// Device-resident arguments must be staged on the host first
    pub stage_to_host: bool,
}

/// Check that `requested` can run here.
pub fn negotiate(
    requested: BackendMode,
    capability: &DeviceCapability,
    residency: Residency,
) -> ReductionResult<Negotiated> {
    if let Some(device) = residency.device() {
        if requested != BackendMode::Auto {
            return Err(ReductionError::backend_unavailable(
                requested.name(),
                device.to_string(),
                "device-resident arguments need a device kernel, which is not available",
            ));
        }
        warn!(%device, "staging device-resident arguments on the host");
        return Ok(Negotiated {
            mode: BackendMode::Auto,
            stage_to_host: true,
        });
    }
    if requested.needs_accelerator() && !capability.accelerated {
        return Err(ReductionError::backend_unavailable(
            requested.name(),
            capability.device.to_string(),
            "the parallel tiled executor is not compiled in",
        ));
    }
    Ok(Negotiated {
        mode: requested,
        stage_to_host: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;

    fn accelerated(workers: usize) -> DeviceCapability {
        DeviceCapability {
            device: Device::cpu(),
            workers,
            accelerated: true,
        }
    }

    #[test]
    fn test_parse_modes() {
        assert_eq!("auto".parse::<BackendMode>().unwrap(), BackendMode::Auto);
        assert_eq!("GPU_1D".parse::<BackendMode>().unwrap(), BackendMode::Tiled1D);
        assert_eq!("tiled2d".parse::<BackendMode>().unwrap(), BackendMode::Tiled2D);
        assert_eq!("pytorch".parse::<BackendMode>().unwrap(), BackendMode::DenseFallback);
        assert_eq!("GPU".parse::<BackendMode>().unwrap(), BackendMode::Accelerated);
        assert!("quantum".parse::<BackendMode>().is_err());
        assert_eq!(BackendMode::parse_lenient("quantum"), BackendMode::Auto);
    }

    #[test]
    fn test_select_auto() {
        let tiles = TileSizes::default();
        assert_eq!(
            select(10, 10, 3, &accelerated(4), BackendMode::Auto, &tiles),
            BackendKind::DenseFallback
        );
        assert_eq!(
            select(1000, 1000, 3, &DeviceCapability::host_only(), BackendMode::Auto, &tiles),
            BackendKind::DenseFallback
        );
        assert_eq!(
            select(1000, 1000, 3, &accelerated(4), BackendMode::Auto, &tiles),
            BackendKind::Tiled1D
        );
        assert_eq!(
            select(100, 100_000, 3, &accelerated(16), BackendMode::Auto, &tiles),
            BackendKind::Tiled2D
        );
    }

    #[test]
    fn test_select_explicit_is_honoured() {
        let tiles = TileSizes::default();
        let cap = DeviceCapability::host_only();
        assert_eq!(
            select(5, 5, 1, &cap, BackendMode::Tiled2D, &tiles),
            BackendKind::Tiled2D
        );
        assert_eq!(
            select(5, 5, 1, &cap, BackendMode::DenseFallback, &tiles),
            BackendKind::DenseFallback
        );
    }

    #[test]
    fn test_negotiate_rejects_without_accelerator() {
        let cap = DeviceCapability::host_only();
        for mode in [BackendMode::Tiled1D, BackendMode::Tiled2D, BackendMode::Accelerated] {
            assert!(matches!(
                negotiate(mode, &cap, Residency::Host),
                Err(ReductionError::BackendUnavailable(_))
            ));
        }
        assert!(negotiate(BackendMode::DenseFallback, &cap, Residency::Host).is_ok());
        assert!(negotiate(BackendMode::Auto, &cap, Residency::Host).is_ok());
    }

    #[test]
    fn test_negotiate_device_residency() {
        let cap = accelerated(4);
        let on_gpu = Residency::Device(Device::gpu(0));
        assert!(matches!(
            negotiate(BackendMode::Tiled1D, &cap, on_gpu),
            Err(ReductionError::BackendUnavailable(_))
        ));
        let auto = negotiate(BackendMode::Auto, &cap, on_gpu).unwrap();
        assert!(auto.stage_to_host);
    }
}
