//! Argument and output tensors.
//!
//! Arguments are dense 2-D arrays of `f32` or `f64` with a residency tag.
//! Reductions accumulate in `f64` and hand results back in the precision of
//! the arguments.

use scirs2_core::ndarray::Array2;
use std::fmt;

use crate::device::Device;

/// Element type of an argument array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Precision {
    F32,
    #[default]
    F64,
}

impl Precision {
    pub fn size_bytes(&self) -> usize {
        match self {
            Precision::F32 => 4,
            Precision::F64 => 8,
        }
    }

    /// Absolute tolerance used when comparing results of this precision.
    pub fn tolerance(&self) -> f64 {
        match self {
            Precision::F32 => 1e-6,
            Precision::F64 => 1e-12,
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precision::F32 => write!(f, "f32"),
            Precision::F64 => write!(f, "f64"),
        }
    }
}

/// Where the array data lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Residency {
    #[default]
    Host,
    Device(Device),
}

impl Residency {
    pub fn device(&self) -> Option<Device> {
        match self {
            Residency::Host => None,
            Residency::Device(d) => Some(*d),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TensorData {
    F32(Array2<f32>),
    F64(Array2<f64>),
}

/// A dense `(rows, cols)` argument or output array.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgTensor {
    data: TensorData,
    residency: Residency,
}

impl ArgTensor {
    pub fn from_f64(data: Array2<f64>) -> Self {
        Self {
            data: TensorData::F64(data),
            residency: Residency::Host,
        }
    }

    pub fn from_f32(data: Array2<f32>) -> Self {
        Self {
            data: TensorData::F32(data),
            residency: Residency::Host,
        }
    }

    /// Wrap an `f64` array, narrowing it when `precision` is `F32`.
    pub fn with_precision(data: Array2<f64>, precision: Precision) -> Self {
        match precision {
            Precision::F64 => Self::from_f64(data),
            Precision::F32 => Self::from_f32(data.mapv(|v| v as f32)),
        }
    }

    /// Tag the tensor as resident on `device`.
    pub fn on_device(mut self, device: Device) -> Self {
        self.residency = if device.is_cpu() {
            Residency::Host
        } else {
            Residency::Device(device)
        };
        self
    }

    /// The same data tagged as host resident.
    pub fn to_host(&self) -> Self {
        Self {
            data: self.data.clone(),
            residency: Residency::Host,
        }
    }

    pub fn residency(&self) -> Residency {
        self.residency
    }

    pub fn precision(&self) -> Precision {
        match self.data {
            TensorData::F32(_) => Precision::F32,
            TensorData::F64(_) => Precision::F64,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        match &self.data {
            TensorData::F32(a) => a.dim(),
            TensorData::F64(a) => a.dim(),
        }
    }

    pub fn rows(&self) -> usize {
        self.shape().0
    }

    pub fn cols(&self) -> usize {
        self.shape().1
    }

    pub fn as_f64(&self) -> Option<&Array2<f64>> {
        match &self.data {
            TensorData::F64(a) => Some(a),
            TensorData::F32(_) => None,
        }
    }

    pub fn as_f32(&self) -> Option<&Array2<f32>> {
        match &self.data {
            TensorData::F32(a) => Some(a),
            TensorData::F64(_) => None,
        }
    }

    /// The values widened to `f64`.
    pub fn to_f64(&self) -> Array2<f64> {
        match &self.data {
            TensorData::F64(a) => a.clone(),
            TensorData::F32(a) => a.mapv(f64::from),
        }
    }

    /// Row-major values widened to `f64`.
    pub fn to_row_major_vec(&self) -> Vec<f64> {
        match &self.data {
            TensorData::F64(a) => a.iter().copied().collect(),
            TensorData::F32(a) => a.iter().map(|&v| f64::from(v)).collect(),
        }
    }
}

impl From<Array2<f64>> for ArgTensor {
    fn from(data: Array2<f64>) -> Self {
        Self::from_f64(data)
    }
}

impl From<Array2<f32>> for ArgTensor {
    fn from(data: Array2<f32>) -> Self {
        Self::from_f32(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scirs2_core::ndarray::array;

    #[test]
    fn test_shape_and_precision() {
        let t = ArgTensor::from_f32(array![[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert_eq!(t.shape(), (2, 3));
        assert_eq!(t.precision(), Precision::F32);
        assert_eq!(t.to_row_major_vec(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert!(t.as_f64().is_none());
    }

    #[test]
    fn test_with_precision_narrows() {
        let t = ArgTensor::with_precision(array![[0.5, 1.5]], Precision::F32);
        assert_eq!(t.precision(), Precision::F32);
        assert_eq!(t.to_f64(), array![[0.5, 1.5]]);
    }

    #[test]
    fn test_residency() {
        let t = ArgTensor::from_f64(array![[1.0]]);
        assert_eq!(t.residency(), Residency::Host);

        let on_gpu = t.clone().on_device(Device::gpu(0));
        assert_eq!(on_gpu.residency().device(), Some(Device::gpu(0)));
        assert_eq!(on_gpu.to_host().residency(), Residency::Host);

        let on_cpu = t.on_device(Device::cpu());
        assert_eq!(on_cpu.residency(), Residency::Host);
    }
}
