//! Categorical alignments drawn as one-hot vectors.
//!
//! Padded positions are removed from the weights before sampling, so a draw
//! can never land on them even if the caller's probabilities leak mass
//! there. The log-probability of each draw is gathered from the `log_alpha`
//! tensor at the sampled index, so it stays differentiable in `log_alpha`.

use candle_core::Tensor;
use rand::{
    distributions::{Distribution, WeightedIndex},
    Rng,
};

use super::{AlignmentSampler, HostGrid, SampleDraw};
use crate::core::AttentionError;

/// Sampler over `[batch, tgt_len, src_len]` probabilities.
#[derive(Debug, Clone, Copy)]
pub struct CategoricalSampler<'a> {
    alpha: &'a Tensor,
    log_alpha: &'a Tensor,
}

impl<'a> CategoricalSampler<'a> {
    pub fn new(alpha: &'a Tensor, log_alpha: &'a Tensor) -> Self {
        Self { alpha, log_alpha }
    }
}

impl AlignmentSampler for CategoricalSampler<'_> {
    fn sample<R: Rng + ?Sized>(
        &self,
        n_samples: usize,
        lengths: Option<&[usize]>,
        rng: &mut R,
    ) -> Result<SampleDraw, AttentionError> {
        if self.log_alpha.dims() != self.alpha.dims() {
            return Err(AttentionError::shape(format!(
                "log_alpha {:?} must match alpha {:?}",
                self.log_alpha.dims(),
                self.alpha.dims()
            )));
        }
        let probs = HostGrid::from_tensor("categorical alpha", self.alpha)?;
        let lengths = probs.resolve_lengths(lengths)?;
        let (batch, tgt, src) = (probs.batch, probs.tgt, probs.src);

        let mut cells = Vec::with_capacity(batch * tgt);
        for (b, &valid) in lengths.iter().enumerate() {
            for t in 0..tgt {
                let mut weights = probs.row(b, t).to_vec();
                weights[valid..].fill(0.0);
                let dist = WeightedIndex::new(&weights).map_err(|err| {
                    AttentionError::invalid(format!(
                        "categorical weights for batch {b}, target {t}: {err}"
                    ))
                })?;
                cells.push(dist);
            }
        }

        let mut one_hot = vec![0f32; n_samples * batch * tgt * src];
        let mut picked = Vec::with_capacity(n_samples * batch * tgt);
        for k in 0..n_samples {
            for (cell, dist) in cells.iter().enumerate() {
                let idx = dist.sample(rng);
                one_hot[(k * batch * tgt + cell) * src + idx] = 1.0;
                picked.push(idx as u32);
            }
        }

        let device = self.alpha.device();
        let samples = Tensor::from_vec(one_hot, (n_samples, batch, tgt, src), device)?
            .to_dtype(self.alpha.dtype())?;
        let picked = Tensor::from_vec(picked, (n_samples, batch, tgt, 1), self.log_alpha.device())?;
        let log_probs = self
            .log_alpha
            .unsqueeze(0)?
            .broadcast_as((n_samples, batch, tgt, src))?
            .contiguous()?
            .gather(&picked, 3)?
            .squeeze(3)?;
        Ok(SampleDraw {
            samples,
            log_probs: Some(log_probs),
        })
    }
}
