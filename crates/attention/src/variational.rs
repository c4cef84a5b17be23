//! The variational attention unit.
//!
//! One forward call runs two paths over the same scores:
//!
//! 1. **Deterministic (prior, `p`)**: scores are masked and normalised into
//!    `c_align_vectors`, which weight the source vectors into the context
//!    `h_c = tanh(W_out [c; q])`. For a Dirichlet prior the concentrations
//!    `alpha = f(scores)` are reported in `p`, but the context uses the
//!    softmax of the raw scores, not the Dirichlet mean.
//! 2. **Stochastic (posterior, `q`)**: alignments drawn from the caller's
//!    posterior (or every source position, in enumerate mode) weight the
//!    source vectors into sampled contexts, projected by the same `W_out`
//!    into `h_y`.
//!
//! Padded positions are masked before every softmax (`-inf`) and after the
//! concentration map (a tiny positive constant), so they never receive
//! probability mass and Dirichlet parameters stay valid.

use std::sync::{Arc, OnceLock};

use candle_core::{DType, Device, Tensor, D};
use candle_nn::ops::{log_softmax, softmax_last_dim};
use layers::{builtin, Activation, ActivationKind, Linear, LinearConfig, LinearLayer, PrecisionPolicy};
use rand::Rng;

use crate::core::{AttentionError, AttnMode, DistKind, VariationalConfig};
use crate::distributions::{sample_attn, DistInfo, DistributionParams, SampleDraw};
use crate::layout::StepLayout;
use crate::masks::{masked_fill, padding::additive_mask_like, sequence_mask};
use crate::score::{build_score, expect_query_memory, ScoreFunction};

/// Concentration assigned to padded source positions, `e^-10`. Also the
/// floor for prior concentrations at valid positions.
pub const MASKED_CONCENTRATION: f64 = 4.539_992_976_248_485e-5;

/// Result of one forward call.
///
/// Shapes for one-step calls (sequence calls prepend `tgt_len`, see
/// [`StepLayout`]):
///
/// * `h_y`: `[k, batch, dim]` with `k = n_samples`, or `k = src_len` when
///   enumerating.
/// * `h_c`: `[batch, dim]`.
/// * `c_align_vectors`: `[batch, src_len]`.
///
/// The three tensors above come back in the parameter dtype; `dist_info`
/// keeps the compute dtype so log-probabilities and tiny concentrations
/// survive for loss computation.
#[derive(Debug, Clone)]
pub struct AttentionOutput {
    pub h_y: Tensor,
    pub h_c: Tensor,
    pub c_align_vectors: Tensor,
    pub dist_info: DistInfo,
}

/// Variational attention over a bank of source vectors.
pub struct VariationalAttention {
    config: VariationalConfig,
    score: Box<dyn ScoreFunction>,
    linear_out: Linear,
    concentration: Arc<dyn Activation>,
    output_act: Arc<dyn Activation>,
    policy: PrecisionPolicy,
    compute: PrecisionPolicy,
    first_call: OnceLock<()>,
}

impl std::fmt::Debug for VariationalAttention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariationalAttention")
            .field("config", &self.config)
            .field("score", &self.score.name())
            .field("policy", &self.policy)
            .finish()
    }
}

impl VariationalAttention {
    /// Builds a unit with the score function named in `config`.
    pub fn new(
        config: VariationalConfig,
        device: &Device,
        dtype: DType,
    ) -> Result<Self, AttentionError> {
        Self::check_config(&config, dtype)?;
        let score = build_score(config.score, config.dim, device, dtype)?;
        Self::with_score(config, score, device, dtype)
    }

    /// Builds a unit around a caller-supplied score function.
    pub fn with_score(
        config: VariationalConfig,
        score: Box<dyn ScoreFunction>,
        device: &Device,
        dtype: DType,
    ) -> Result<Self, AttentionError> {
        Self::check_config(&config, dtype)?;
        let policy = PrecisionPolicy::from_parameter_dtype(dtype);
        let linear_out = Linear::fan_in_uniform(
            LinearConfig::new(2 * config.dim, config.dim),
            device,
            dtype,
        )?;
        Ok(Self {
            concentration: builtin(config.concentration.activation()),
            output_act: builtin(ActivationKind::Tanh),
            policy,
            compute: PrecisionPolicy::new(policy.compute(), policy.compute()),
            config,
            score,
            linear_out,
            first_call: OnceLock::new(),
        })
    }

    fn check_config(config: &VariationalConfig, dtype: DType) -> Result<(), AttentionError> {
        if !matches!(dtype, DType::F32 | DType::F16 | DType::BF16 | DType::F64) {
            return Err(AttentionError::UnsupportedDType {
                requested: format!("{dtype:?}"),
            });
        }
        if config.p_dist_type == DistKind::LogNormal {
            return Err(AttentionError::UnsupportedDistribution {
                kind: DistKind::LogNormal,
                context: "log-normal priors are not supported",
            });
        }
        config.validate()
    }

    pub fn config(&self) -> &VariationalConfig {
        &self.config
    }

    pub fn score_fn(&self) -> &dyn ScoreFunction {
        self.score.as_ref()
    }

    /// Output projection `W_out`, shaped `[dim, 2 * dim]`.
    pub fn linear_out(&self) -> &Linear {
        &self.linear_out
    }

    /// Draws alignments from `params` using this unit's Dirichlet support.
    pub fn sample_attn<R: Rng + ?Sized>(
        &self,
        params: &DistributionParams,
        n_samples: usize,
        lengths: Option<&[usize]>,
        rng: &mut R,
    ) -> Result<Option<SampleDraw>, AttentionError> {
        sample_attn(params, n_samples, lengths, self.config.dirichlet_support, rng)
    }

    /// Runs both attention paths.
    ///
    /// * `query`: `[batch, dim]` (one step) or `[batch, tgt_len, dim]`.
    /// * `memory`: `[batch, src_len, dim]`.
    /// * `memory_lengths`: valid source length per batch element.
    /// * `q_params`: posterior parameters, `[batch, src_len]` for one-step
    ///   calls or `[batch, tgt_len, src_len]`. Required in sample mode.
    pub fn forward<R: Rng + ?Sized>(
        &self,
        query: &Tensor,
        memory: &Tensor,
        memory_lengths: Option<&[usize]>,
        q_params: Option<&DistributionParams>,
        rng: &mut R,
    ) -> Result<AttentionOutput, AttentionError> {
        if self.first_call.set(()).is_ok() {
            log::info!(
                "variational_attention init dim={} score={} p={} q={} mode={:?} n_samples={} concentration={:?} dirichlet_support={:?} use_prior={}",
                self.config.dim,
                self.score.name(),
                self.config.p_dist_type,
                self.config.q_dist_type,
                self.config.mode,
                self.config.n_samples,
                self.config.concentration,
                self.config.dirichlet_support,
                self.config.use_prior,
            );
        }

        let layout = StepLayout::of_query(query)?;
        let query = self.policy.cast_for_compute(&layout.promote_query(query)?)?;
        let memory = self.policy.cast_for_compute(memory)?;
        expect_query_memory(&query, &memory, self.config.dim)?;
        let (batch, src_len, _) = memory.dims3()?;
        let (_, tgt_len, _) = query.dims3()?;
        if let Some(lengths) = memory_lengths {
            check_lengths(lengths, batch, src_len)?;
        }
        let q_params = q_params
            .map(|params| self.prepare_posterior(layout, params, (batch, tgt_len, src_len)))
            .transpose()?;

        log::debug!(
            "variational_attention forward layout={layout:?} batch={batch} tgt_len={tgt_len} src_len={src_len} masked={}",
            memory_lengths.is_some()
        );

        let raw_scores = self.score.score(&query, &memory, &self.compute)?;
        let (p_params, c_align_vectors) = self.prior(&raw_scores, memory_lengths)?;

        let context_c = c_align_vectors.matmul(&memory)?;
        let h_c = self.project(&context_c, &query)?;

        let (h_y, q_params) = match self.config.mode {
            AttnMode::Sample => {
                let posterior = match q_params {
                    Some(params) if !self.config.use_prior => params,
                    _ => {
                        return Err(AttentionError::UnsupportedMode {
                            context: "sampling from the prior is disabled; supply posterior parameters"
                                .to_string(),
                        })
                    }
                };
                let draw = self
                    .sample_attn(&posterior, self.config.n_samples, memory_lengths, rng)?
                    .ok_or(AttentionError::UnsupportedDistribution {
                        kind: DistKind::None,
                        context: "sample mode needs a dirichlet or categorical posterior",
                    })?;
                let context_y = sampled_context(&draw.samples, &memory, &self.compute)?;
                let h_y = self.project(&context_y, &query)?;
                (h_y, Some(posterior.with_draw(Some(draw))))
            }
            AttnMode::Enumerate => {
                let context_y = enumerated_context(&memory, tgt_len)?;
                (self.project(&context_y, &query)?, q_params)
            }
        };

        let storage = |t: &Tensor| self.policy.cast_to_storage(t);
        let dist_info = DistInfo {
            q: q_params
                .map(|params| layout.finish_params(params))
                .transpose()?,
            p: Some(layout.finish_params(p_params)?),
        };
        Ok(AttentionOutput {
            h_y: storage(&layout.per_sample(&h_y)?)?,
            h_c: storage(&layout.per_query(&h_c)?)?,
            c_align_vectors: storage(&layout.per_query(&c_align_vectors)?)?,
            dist_info,
        })
    }

    /// Masks raw scores and builds the prior plus the context weights.
    ///
    /// Everything here runs in the compute dtype; the boundary casts back.
    fn prior(
        &self,
        raw_scores: &Tensor,
        memory_lengths: Option<&[usize]>,
    ) -> Result<(DistributionParams, Tensor), AttentionError> {
        match self.config.p_dist_type {
            DistKind::Dirichlet => {
                let mut log_scores = raw_scores.clone();
                // softplus/exp underflow to 0 for very negative scores.
                let mut alpha = self
                    .concentration
                    .forward(raw_scores, &self.compute)?
                    .maximum(MASKED_CONCENTRATION)?;
                if let Some(lengths) = memory_lengths {
                    log_scores = log_scores.broadcast_add(&additive_mask_like(raw_scores, lengths)?)?;
                    let (_, _, src_len) = raw_scores.dims3()?;
                    let keep = sequence_mask(raw_scores.device(), lengths, src_len)?.unsqueeze(1)?;
                    alpha = masked_fill(&alpha, &keep, MASKED_CONCENTRATION)?;
                }
                let c_align_vectors = softmax_last_dim(&log_scores.contiguous()?)?;
                Ok((DistributionParams::dirichlet(alpha), c_align_vectors))
            }
            DistKind::Categorical => {
                let mut scores = raw_scores.clone();
                if let Some(lengths) = memory_lengths {
                    scores = scores.broadcast_add(&additive_mask_like(raw_scores, lengths)?)?;
                }
                let scores = scores.contiguous()?;
                let probs = softmax_last_dim(&scores)?;
                let log_probs = log_softmax(&scores, D::Minus1)?;
                Ok((
                    DistributionParams::categorical(probs.clone(), log_probs),
                    probs,
                ))
            }
            kind => Err(AttentionError::UnsupportedDistribution {
                kind,
                context: "prior must be dirichlet or categorical",
            }),
        }
    }

    /// Promotes and validates caller-supplied posterior parameters.
    fn prepare_posterior(
        &self,
        layout: StepLayout,
        params: &DistributionParams,
        expected: (usize, usize, usize),
    ) -> Result<DistributionParams, AttentionError> {
        if params.kind() != self.config.q_dist_type {
            return Err(AttentionError::UnsupportedDistribution {
                kind: params.kind(),
                context: "posterior kind differs from the configured q_dist_type",
            });
        }
        let promoted = layout.promote_params(params)?;
        let (batch, tgt_len, src_len) = expected;
        for tensor in [promoted.alpha(), promoted.log_alpha()].into_iter().flatten() {
            if tensor.dims() != [batch, tgt_len, src_len] {
                return Err(AttentionError::shape(format!(
                    "posterior parameters must be [{batch}, {tgt_len}, {src_len}], got {:?}",
                    tensor.dims()
                )));
            }
        }
        Ok(promoted)
    }

    /// `tanh(W_out [context; query])` over any number of leading axes.
    fn project(&self, context: &Tensor, query: &Tensor) -> Result<Tensor, AttentionError> {
        let query = query.broadcast_as(context.shape())?.contiguous()?;
        let concat = Tensor::cat(&[&context.contiguous()?, &query], D::Minus1)?;
        let projected = self.linear_out.forward(&concat, &self.compute)?;
        Ok(self.output_act.forward(&projected, &self.compute)?)
    }
}

fn check_lengths(lengths: &[usize], batch: usize, src_len: usize) -> Result<(), AttentionError> {
    if lengths.len() != batch {
        return Err(AttentionError::shape(format!(
            "memory_lengths has {} entries for batch {batch}",
            lengths.len()
        )));
    }
    if let Some(&bad) = lengths.iter().find(|&&l| l == 0 || l > src_len) {
        return Err(AttentionError::shape(format!(
            "memory length {bad} outside 1..={src_len}"
        )));
    }
    Ok(())
}

/// `[k, batch, tgt, src] x [batch, src, dim] -> [k, batch, tgt, dim]`.
fn sampled_context(
    samples: &Tensor,
    memory: &Tensor,
    policy: &PrecisionPolicy,
) -> Result<Tensor, AttentionError> {
    let (k, batch, tgt_len, src_len) = samples.dims4()?;
    let (_, _, dim) = memory.dims3()?;
    let weights = policy
        .cast_for_compute(samples)?
        .reshape((k * batch, tgt_len, src_len))?;
    let memory = memory
        .unsqueeze(0)?
        .broadcast_as((k, batch, src_len, dim))?
        .contiguous()?
        .reshape((k * batch, src_len, dim))?;
    Ok(weights
        .matmul(&memory)?
        .reshape((k, batch, tgt_len, dim))?)
}

/// Every source vector as its own pseudo-sample: `[src, batch, tgt, dim]`.
fn enumerated_context(memory: &Tensor, tgt_len: usize) -> Result<Tensor, AttentionError> {
    let (batch, src_len, dim) = memory.dims3()?;
    Ok(memory
        .unsqueeze(0)?
        .broadcast_as((tgt_len, batch, src_len, dim))?
        .permute((2, 1, 0, 3))?
        .contiguous()?)
}
