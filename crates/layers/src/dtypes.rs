//! Precision policy for projections and attention math.
//!
//! Parameters and caller tensors may be stored in `f16`/`bf16`, but scores,
//! softmax normalisation, and the log-probabilities gathered during sampling
//! must be evaluated in at least `f32`: a reduced-precision `-inf` mask or a
//! tiny Dirichlet concentration does not survive a round trip through `bf16`.
//! [`PrecisionPolicy`] records the storage dtype callers expect back and the
//! compute dtype used internally.

use candle_core::{DType, Result, Tensor};

/// Describes how tensors are cast on the way into and out of a computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrecisionPolicy {
    storage: DType,
    compute: DType,
}

impl PrecisionPolicy {
    /// Constructs a policy from explicit dtype selections.
    pub fn new(storage: DType, compute: DType) -> Self {
        Self { storage, compute }
    }

    /// Builds a policy from the dtype parameters are stored in.
    pub fn from_parameter_dtype(storage: DType) -> Self {
        let compute = match storage {
            DType::F16 | DType::BF16 => DType::F32,
            other => other,
        };
        Self::new(storage, compute)
    }

    /// Returns the dtype outputs are handed back in.
    pub fn storage(&self) -> DType {
        self.storage
    }

    /// Returns the dtype used for matmuls, normalisation, and nonlinearities.
    pub fn compute(&self) -> DType {
        self.compute
    }

    /// Casts a tensor to the compute dtype.
    pub fn cast_for_compute(&self, tensor: &Tensor) -> Result<Tensor> {
        cast_tensor(tensor, self.compute)
    }

    /// Casts a tensor back to the storage dtype (or leaves it unchanged).
    pub fn cast_to_storage(&self, tensor: &Tensor) -> Result<Tensor> {
        cast_tensor(tensor, self.storage)
    }
}

impl Default for PrecisionPolicy {
    fn default() -> Self {
        Self::from_parameter_dtype(DType::F32)
    }
}

fn cast_tensor(tensor: &Tensor, dtype: DType) -> Result<Tensor> {
    if tensor.dtype() == dtype {
        Ok(tensor.clone())
    } else {
        tensor.to_dtype(dtype)
    }
}
