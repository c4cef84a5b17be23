//! Compatibility scores between queries and source vectors.
//!
//! A [`ScoreFunction`] maps queries `[batch, tgt_len, dim]` and source
//! vectors `[batch, src_len, dim]` to raw, unnormalised scores
//! `[batch, tgt_len, src_len]`. The unit owns one behind a trait object so
//! callers can substitute their own via
//! [`VariationalAttention::with_score`](crate::VariationalAttention::with_score).

use candle_core::{DType, Device, Tensor};
use layers::{Linear, LinearConfig, LinearLayer, PrecisionPolicy};

use crate::core::{AttentionError, ScoreKind};

/// Raw attention scores for a batch of queries.
pub trait ScoreFunction: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Computes `[batch, tgt_len, src_len]` scores.
    fn score(
        &self,
        query: &Tensor,
        memory: &Tensor,
        policy: &PrecisionPolicy,
    ) -> Result<Tensor, AttentionError>;
}

/// Luong "general" score: `h_s^T W_a h_t`.
#[derive(Debug, Clone)]
pub struct GeneralScore {
    linear_in: Linear,
}

impl GeneralScore {
    pub fn new(dim: usize, device: &Device, dtype: DType) -> Result<Self, AttentionError> {
        let linear_in = Linear::fan_in_uniform(LinearConfig::new(dim, dim), device, dtype)?;
        Ok(Self { linear_in })
    }

    /// The learned `W_a` projection applied to queries.
    pub fn linear_in(&self) -> &Linear {
        &self.linear_in
    }
}

impl ScoreFunction for GeneralScore {
    fn name(&self) -> &'static str {
        "general"
    }

    fn score(
        &self,
        query: &Tensor,
        memory: &Tensor,
        policy: &PrecisionPolicy,
    ) -> Result<Tensor, AttentionError> {
        expect_query_memory(query, memory, self.linear_in.config().input_dim)?;
        let projected = self.linear_in.forward(query, policy)?;
        batched_dot(&projected, memory, policy)
    }
}

/// Luong "dot" score: `h_s^T h_t`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DotScore;

impl ScoreFunction for DotScore {
    fn name(&self) -> &'static str {
        "dot"
    }

    fn score(
        &self,
        query: &Tensor,
        memory: &Tensor,
        policy: &PrecisionPolicy,
    ) -> Result<Tensor, AttentionError> {
        let (_, _, dim) = memory
            .dims3()
            .map_err(|_| AttentionError::shape("memory must be [batch, src_len, dim]"))?;
        expect_query_memory(query, memory, dim)?;
        batched_dot(query, memory, policy)
    }
}

/// Builds the score function named by `kind`.
pub fn build_score(
    kind: ScoreKind,
    dim: usize,
    device: &Device,
    dtype: DType,
) -> Result<Box<dyn ScoreFunction>, AttentionError> {
    Ok(match kind {
        ScoreKind::General => Box::new(GeneralScore::new(dim, device, dtype)?),
        ScoreKind::Dot => Box::new(DotScore),
    })
}

/// `(batch, t, d) x (batch, s, d)^T -> (batch, t, s)` in the compute dtype.
fn batched_dot(
    query: &Tensor,
    memory: &Tensor,
    policy: &PrecisionPolicy,
) -> Result<Tensor, AttentionError> {
    let query = policy.cast_for_compute(query)?;
    let memory_t = policy.cast_for_compute(memory)?.t()?.contiguous()?;
    Ok(query.contiguous()?.matmul(&memory_t)?)
}

/// Validates batch and feature agreement between queries and source vectors.
pub fn expect_query_memory(
    query: &Tensor,
    memory: &Tensor,
    dim: usize,
) -> Result<(), AttentionError> {
    let (src_batch, _, src_dim) = memory.dims3().map_err(|_| {
        AttentionError::shape(format!(
            "memory must be [batch, src_len, dim], got {:?}",
            memory.dims()
        ))
    })?;
    let (tgt_batch, _, tgt_dim) = query.dims3().map_err(|_| {
        AttentionError::shape(format!(
            "query must be [batch, tgt_len, dim], got {:?}",
            query.dims()
        ))
    })?;
    if src_batch != tgt_batch {
        return Err(AttentionError::shape(format!(
            "batch sizes differ: query {tgt_batch}, memory {src_batch}"
        )));
    }
    if src_dim != tgt_dim || src_dim != dim {
        return Err(AttentionError::shape(format!(
            "feature dims differ: query {tgt_dim}, memory {src_dim}, configured {dim}"
        )));
    }
    Ok(())
}
