//! Distributions over source positions and the samplers that draw from them.
//!
//! Draws are taken on the host from an injected [`rand::Rng`], so seeding the
//! RNG makes every draw reproducible regardless of backend. What flows back
//! to the caller stays attached to the parameter tensors: Dirichlet samples
//! are reparameterized in `alpha`, and categorical log-probabilities are
//! gathered from `log_alpha` on its own device.
//!
//! Each supported family implements [`AlignmentSampler`]; [`sample_attn`]
//! dispatches on the tagged union and returns `Ok(None)` for
//! [`AttentionDistribution::None`].

pub mod categorical;
pub mod dirichlet;
mod gamma;
pub mod params;

use candle_core::{DType, Tensor};
use rand::Rng;

use crate::core::{AttentionError, DirichletSupport};

pub use categorical::CategoricalSampler;
pub use dirichlet::DirichletSampler;
pub use params::{AttentionDistribution, DistInfo, DistributionParams};

/// Samples drawn from one distribution.
#[derive(Debug, Clone)]
pub struct SampleDraw {
    /// `[n_samples, batch, tgt_len, src_len]`, zero at padded positions.
    pub samples: Tensor,
    /// `[n_samples, batch, tgt_len]` when the family has a closed-form
    /// log-probability.
    pub log_probs: Option<Tensor>,
}

/// Common capability of samplable attention distributions.
pub trait AlignmentSampler {
    /// Draws `n_samples` alignments per `(batch, target)` cell.
    ///
    /// `lengths` restricts each batch element to its valid source prefix.
    fn sample<R: Rng + ?Sized>(
        &self,
        n_samples: usize,
        lengths: Option<&[usize]>,
        rng: &mut R,
    ) -> Result<SampleDraw, AttentionError>;
}

/// Draws `n_samples` alignments from `params`.
///
/// Returns `Ok(None)` for [`AttentionDistribution::None`] and
/// `UnsupportedDistribution` for families without a sampler.
pub fn sample_attn<R: Rng + ?Sized>(
    params: &DistributionParams,
    n_samples: usize,
    lengths: Option<&[usize]>,
    support: DirichletSupport,
    rng: &mut R,
) -> Result<Option<SampleDraw>, AttentionError> {
    if n_samples == 0 {
        return Err(AttentionError::invalid("n_samples must be greater than 0"));
    }
    let draw = match &params.dist {
        AttentionDistribution::Dirichlet { alpha } => {
            DirichletSampler::new(alpha, support).sample(n_samples, lengths, rng)?
        }
        AttentionDistribution::Categorical { alpha, log_alpha } => {
            CategoricalSampler::new(alpha, log_alpha).sample(n_samples, lengths, rng)?
        }
        AttentionDistribution::Unsupported { kind, .. } => {
            return Err(AttentionError::UnsupportedDistribution {
                kind: *kind,
                context: "no sampler is available for this family",
            });
        }
        AttentionDistribution::None => return Ok(None),
    };
    log::debug!(
        "sample_attn kind={} n_samples={} shape={:?}",
        params.kind(),
        n_samples,
        draw.samples.dims()
    );
    Ok(Some(draw))
}

/// Host copy of a `[batch, tgt_len, src_len]` parameter tensor.
pub(crate) struct HostGrid {
    pub batch: usize,
    pub tgt: usize,
    pub src: usize,
    data: Vec<f32>,
}

impl HostGrid {
    pub fn from_tensor(label: &str, tensor: &Tensor) -> Result<Self, AttentionError> {
        let (batch, tgt, src) = tensor.dims3().map_err(|_| {
            AttentionError::shape(format!(
                "{label} must be [batch, tgt_len, src_len], got {:?}",
                tensor.dims()
            ))
        })?;
        let data = tensor.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?;
        Ok(Self {
            batch,
            tgt,
            src,
            data,
        })
    }

    pub fn row(&self, b: usize, t: usize) -> &[f32] {
        let start = (b * self.tgt + t) * self.src;
        &self.data[start..start + self.src]
    }

    /// Valid prefix length per batch element.
    pub fn resolve_lengths(&self, lengths: Option<&[usize]>) -> Result<Vec<usize>, AttentionError> {
        match lengths {
            None => Ok(vec![self.src; self.batch]),
            Some(lengths) => {
                if lengths.len() != self.batch {
                    return Err(AttentionError::shape(format!(
                        "expected {} lengths, got {}",
                        self.batch,
                        lengths.len()
                    )));
                }
                if let Some(&bad) = lengths.iter().find(|&&l| l == 0 || l > self.src) {
                    return Err(AttentionError::shape(format!(
                        "length {bad} outside 1..={}",
                        self.src
                    )));
                }
                Ok(lengths.to_vec())
            }
        }
    }
}
