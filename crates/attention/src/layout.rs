//! Boundary adapter between the public calling conventions and the
//! canonical internal layout.
//!
//! Internally every tensor carries an explicit target axis:
//! `[batch, tgt_len, ..]` for per-query tensors and
//! `[n_samples, batch, tgt_len, ..]` for per-sample tensors. At the boundary:
//!
//! | tensor            | one-step        | sequence                 |
//! |-------------------|-----------------|--------------------------|
//! | query (input)     | `[batch, dim]`  | `[batch, tgt_len, dim]`  |
//! | per-query output  | `[batch, ..]`   | `[tgt_len, batch, ..]`   |
//! | per-sample output | `[k, batch, ..]`| `[tgt_len, k, batch, ..]`|
//!
//! so a one-step output equals the sequence output at `tgt_len = 1` with the
//! leading time axis removed.

use candle_core::{Result as CandleResult, Tensor};

use crate::core::AttentionError;
use crate::distributions::DistributionParams;

/// Calling convention of a forward invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepLayout {
    /// Incremental decoding: the query has no time axis.
    OneStep,
    /// Whole target sequence at once.
    Sequence,
}

impl StepLayout {
    /// Infers the layout from the query rank.
    pub fn of_query(query: &Tensor) -> Result<Self, AttentionError> {
        match query.rank() {
            2 => Ok(StepLayout::OneStep),
            3 => Ok(StepLayout::Sequence),
            _ => Err(AttentionError::shape(format!(
                "query must be [batch, dim] or [batch, tgt_len, dim], got {:?}",
                query.dims()
            ))),
        }
    }

    /// Adds the unit target axis to a one-step query.
    pub fn promote_query(&self, query: &Tensor) -> CandleResult<Tensor> {
        match self {
            StepLayout::OneStep => query.unsqueeze(1),
            StepLayout::Sequence => Ok(query.clone()),
        }
    }

    /// Brings caller-supplied parameters to `[batch, tgt_len, src_len]`.
    ///
    /// One-step callers may pass `[batch, src_len]`.
    pub fn promote_params(&self, params: &DistributionParams) -> CandleResult<DistributionParams> {
        let promote = |t: &Tensor| match (self, t.rank()) {
            (StepLayout::OneStep, 2) => t.unsqueeze(1),
            _ => Ok(t.clone()),
        };
        Ok(DistributionParams {
            dist: params.dist.map_tensors(promote)?,
            samples: None,
            sample_log_probs: None,
        })
    }

    /// `[batch, tgt_len, ..]` -> `[batch, ..]` or `[tgt_len, batch, ..]`.
    pub fn per_query(&self, tensor: &Tensor) -> CandleResult<Tensor> {
        match self {
            StepLayout::OneStep => tensor.squeeze(1),
            StepLayout::Sequence => tensor.transpose(0, 1)?.contiguous(),
        }
    }

    /// `[k, batch, tgt_len, ..]` -> `[k, batch, ..]` or `[tgt_len, k, batch, ..]`.
    pub fn per_sample(&self, tensor: &Tensor) -> CandleResult<Tensor> {
        match self {
            StepLayout::OneStep => tensor.squeeze(2),
            StepLayout::Sequence => match tensor.rank() {
                3 => tensor.permute((2, 0, 1))?.contiguous(),
                4 => tensor.permute((2, 0, 1, 3))?.contiguous(),
                _ => Err(candle_core::Error::Msg(format!(
                    "per-sample tensors must be rank 3 or 4, got {:?}",
                    tensor.dims()
                ))),
            },
        }
    }

    /// Applies the boundary layout to parameters and their samples.
    pub fn finish_params(&self, params: DistributionParams) -> CandleResult<DistributionParams> {
        Ok(DistributionParams {
            dist: params.dist.map_tensors(|t| self.per_query(t))?,
            samples: params
                .samples
                .as_ref()
                .map(|s| self.per_sample(s))
                .transpose()?,
            sample_log_probs: params
                .sample_log_probs
                .as_ref()
                .map(|s| self.per_sample(s))
                .transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn rank_selects_layout() -> CandleResult<()> {
        let device = Device::Cpu;
        let one = Tensor::zeros((2, 4), DType::F32, &device)?;
        let seq = Tensor::zeros((2, 3, 4), DType::F32, &device)?;
        let bad = Tensor::zeros(4, DType::F32, &device)?;
        assert_eq!(StepLayout::of_query(&one).ok(), Some(StepLayout::OneStep));
        assert_eq!(StepLayout::of_query(&seq).ok(), Some(StepLayout::Sequence));
        assert!(StepLayout::of_query(&bad).is_err());
        assert_eq!(StepLayout::OneStep.promote_query(&one)?.dims(), &[2, 1, 4]);
        Ok(())
    }

    #[test]
    fn one_step_matches_sequence_without_time_axis() -> CandleResult<()> {
        let device = Device::Cpu;
        let per_query = Tensor::randn(0f32, 1.0, (2, 1, 3), &device)?;
        let per_sample = Tensor::randn(0f32, 1.0, (5, 2, 1, 3), &device)?;

        let one = StepLayout::OneStep.per_query(&per_query)?;
        let seq = StepLayout::Sequence.per_query(&per_query)?;
        assert_eq!(one.dims(), &seq.dims()[1..]);
        assert_eq!(one.to_vec2::<f32>()?, seq.squeeze(0)?.to_vec2::<f32>()?);

        let one = StepLayout::OneStep.per_sample(&per_sample)?;
        let seq = StepLayout::Sequence.per_sample(&per_sample)?;
        assert_eq!(seq.dims(), &[1, 5, 2, 3]);
        assert_eq!(one.to_vec3::<f32>()?, seq.squeeze(0)?.to_vec3::<f32>()?);
        Ok(())
    }

    #[test]
    fn sequence_moves_time_axis_first() -> CandleResult<()> {
        let device = Device::Cpu;
        let log_probs = Tensor::arange(0f32, 12.0, &device)?.reshape((2, 3, 2))?;
        let moved = StepLayout::Sequence.per_sample(&log_probs)?;
        assert_eq!(moved.dims(), &[2, 2, 3]);
        // [k, b, t] -> [t, k, b]
        let values = moved.to_vec3::<f32>()?;
        assert_eq!(values[1][0][2], 5.0);
        assert_eq!(values[0][1][0], 6.0);
        Ok(())
    }
}
