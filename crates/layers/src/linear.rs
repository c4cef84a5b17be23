//! Bias-free projections used by the attention unit.
//!
//! A [`Linear`] maps the trailing feature axis from `input_dim` to
//! `output_dim` and leaves every leading axis untouched, so the same layer
//! serves `(batch, tgt_len, dim)` queries and `(n_samples, batch, tgt_len,
//! 2 * dim)` sampled contexts alike. Leading axes are flattened into rows for
//! a single matmul and restored afterwards.
//!
//! The weight lives behind an `RwLock`: forward passes only take read guards,
//! while an external optimizer swaps weights through
//! [`Linear::copy_weight_from`] between calls.

use std::sync::{Arc, RwLock};

use candle_core::{DType, Device, Error, Result, Tensor};

use crate::{checks, dtypes::PrecisionPolicy};

const WEIGHT: &str = "linear.weight";

/// Shape of a projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearConfig {
    pub input_dim: usize,
    pub output_dim: usize,
}

impl LinearConfig {
    pub fn new(input_dim: usize, output_dim: usize) -> Self {
        Self {
            input_dim,
            output_dim,
        }
    }

    fn weight_dims(&self) -> [usize; 2] {
        [self.output_dim, self.input_dim]
    }
}

/// Shared interface for projections applied over the trailing axis.
pub trait LinearLayer: Send + Sync {
    /// Returns the static configuration used to validate inputs.
    fn config(&self) -> &LinearConfig;

    /// Applies the projection over the trailing axis.
    fn forward(&self, hidden: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor>;
}

/// `y = x W^T` with `W` shaped `(output_dim, input_dim)`.
#[derive(Debug, Clone)]
pub struct Linear {
    config: LinearConfig,
    weight: Arc<RwLock<Tensor>>,
}

impl Linear {
    /// Wraps an existing `(output_dim, input_dim)` weight.
    pub fn new(config: LinearConfig, weight: Tensor) -> Result<Self> {
        validate_weight(&config, &weight)?;
        Ok(Self {
            config,
            weight: Arc::new(RwLock::new(weight)),
        })
    }

    /// Draws the weight uniformly from `±1/sqrt(input_dim)`.
    pub fn fan_in_uniform(config: LinearConfig, device: &Device, dtype: DType) -> Result<Self> {
        let bound = 1.0 / (config.input_dim.max(1) as f32).sqrt();
        let weight = Tensor::rand(-bound, bound, &config.weight_dims(), device)?.to_dtype(dtype)?;
        Self::new(config, weight)
    }

    /// Returns a clone of the current weight.
    pub fn weight(&self) -> Result<Tensor> {
        self.weight
            .read()
            .map(|guard| guard.clone())
            .map_err(|_| Error::Msg(format!("{WEIGHT} lock poisoned")))
    }

    /// Replaces the weight with `value`, cast to the current parameter dtype.
    pub fn copy_weight_from(&self, value: &Tensor) -> Result<()> {
        validate_weight(&self.config, value)?;
        let mut weight = self
            .weight
            .write()
            .map_err(|_| Error::Msg(format!("{WEIGHT} lock poisoned")))?;
        *weight = value.to_dtype(weight.dtype())?;
        Ok(())
    }
}

fn validate_weight(config: &LinearConfig, weight: &Tensor) -> Result<()> {
    checks::expect_shape(WEIGHT, weight, &config.weight_dims())?;
    checks::expect_dtype_in(
        WEIGHT,
        weight,
        &[DType::F16, DType::BF16, DType::F32, DType::F64],
    )?;
    checks::expect_contiguous(WEIGHT, weight)
}

impl LinearLayer for Linear {
    fn config(&self) -> &LinearConfig {
        &self.config
    }

    fn forward(&self, hidden: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor> {
        checks::expect_rank_at_least("linear.input", hidden, 2)?;
        checks::expect_last_dim("linear.input", hidden, self.config.input_dim)?;

        let input = policy.cast_for_compute(hidden)?;
        let weight = policy.cast_for_compute(&self.weight()?)?;

        let mut dims = input.dims().to_vec();
        let rows: usize = dims[..dims.len() - 1].iter().product();
        let output = input
            .reshape((rows, self.config.input_dim))?
            .matmul(&weight.t()?)?;

        if let Some(last) = dims.last_mut() {
            *last = self.config.output_dim;
        }
        policy.cast_to_storage(&output.reshape(dims)?)
    }
}
