//! Parameter bundles describing attention distributions.

use candle_core::{Result as CandleResult, Tensor};

use crate::core::{AttentionError, DistKind};

/// Parameters of one attention distribution, shaped `[batch, tgt_len, src_len]`.
#[derive(Debug, Clone)]
pub enum AttentionDistribution {
    /// Dirichlet with strictly positive concentrations.
    Dirichlet { alpha: Tensor },
    /// Categorical with probabilities and their logs.
    Categorical { alpha: Tensor, log_alpha: Tensor },
    /// A recognised family without a sampler (log-normal).
    Unsupported { kind: DistKind, alpha: Tensor },
    /// No distribution.
    None,
}

impl AttentionDistribution {
    /// Builds a distribution from a kind tag and its parameters.
    ///
    /// Categorical parameters without `log_alpha` take `ln(alpha)`, so zero
    /// probabilities map to `-inf`.
    pub fn from_kind(
        kind: DistKind,
        alpha: Tensor,
        log_alpha: Option<Tensor>,
    ) -> Result<Self, AttentionError> {
        match kind {
            DistKind::Dirichlet => Ok(Self::Dirichlet { alpha }),
            DistKind::Categorical => {
                let log_alpha = match log_alpha {
                    Some(log_alpha) => {
                        if log_alpha.dims() != alpha.dims() {
                            return Err(AttentionError::shape(format!(
                                "log_alpha {:?} must match alpha {:?}",
                                log_alpha.dims(),
                                alpha.dims()
                            )));
                        }
                        log_alpha
                    }
                    None => alpha.log()?,
                };
                Ok(Self::Categorical { alpha, log_alpha })
            }
            DistKind::LogNormal => Ok(Self::Unsupported { kind, alpha }),
            DistKind::None => Ok(Self::None),
        }
    }

    pub fn kind(&self) -> DistKind {
        match self {
            Self::Dirichlet { .. } => DistKind::Dirichlet,
            Self::Categorical { .. } => DistKind::Categorical,
            Self::Unsupported { kind, .. } => *kind,
            Self::None => DistKind::None,
        }
    }

    /// Concentrations (Dirichlet) or probabilities (Categorical).
    pub fn alpha(&self) -> Option<&Tensor> {
        match self {
            Self::Dirichlet { alpha }
            | Self::Categorical { alpha, .. }
            | Self::Unsupported { alpha, .. } => Some(alpha),
            Self::None => None,
        }
    }

    pub fn log_alpha(&self) -> Option<&Tensor> {
        match self {
            Self::Categorical { log_alpha, .. } => Some(log_alpha),
            _ => None,
        }
    }

    /// Applies `f` to every parameter tensor, keeping the variant.
    pub fn map_tensors<F>(&self, mut f: F) -> CandleResult<Self>
    where
        F: FnMut(&Tensor) -> CandleResult<Tensor>,
    {
        Ok(match self {
            Self::Dirichlet { alpha } => Self::Dirichlet { alpha: f(alpha)? },
            Self::Categorical { alpha, log_alpha } => Self::Categorical {
                alpha: f(alpha)?,
                log_alpha: f(log_alpha)?,
            },
            Self::Unsupported { kind, alpha } => Self::Unsupported {
                kind: *kind,
                alpha: f(alpha)?,
            },
            Self::None => Self::None,
        })
    }
}

/// A distribution together with any samples drawn from it.
///
/// `samples` is shaped `[n_samples, batch, tgt_len, src_len]` and
/// `sample_log_probs` `[n_samples, batch, tgt_len]` while inside the unit;
/// [`StepLayout`](crate::layout::StepLayout) rearranges both on the way out.
#[derive(Debug, Clone)]
pub struct DistributionParams {
    pub dist: AttentionDistribution,
    pub samples: Option<Tensor>,
    pub sample_log_probs: Option<Tensor>,
}

impl DistributionParams {
    pub fn new(dist: AttentionDistribution) -> Self {
        Self {
            dist,
            samples: None,
            sample_log_probs: None,
        }
    }

    /// Shorthand for [`AttentionDistribution::from_kind`] without samples.
    pub fn from_kind(
        kind: DistKind,
        alpha: Tensor,
        log_alpha: Option<Tensor>,
    ) -> Result<Self, AttentionError> {
        Ok(Self::new(AttentionDistribution::from_kind(
            kind, alpha, log_alpha,
        )?))
    }

    pub fn dirichlet(alpha: Tensor) -> Self {
        Self::new(AttentionDistribution::Dirichlet { alpha })
    }

    pub fn categorical(alpha: Tensor, log_alpha: Tensor) -> Self {
        Self::new(AttentionDistribution::Categorical { alpha, log_alpha })
    }

    pub fn kind(&self) -> DistKind {
        self.dist.kind()
    }

    pub fn alpha(&self) -> Option<&Tensor> {
        self.dist.alpha()
    }

    pub fn log_alpha(&self) -> Option<&Tensor> {
        self.dist.log_alpha()
    }

    /// Attaches samples (and their log-probabilities, if known).
    pub fn with_draw(mut self, draw: Option<super::SampleDraw>) -> Self {
        if let Some(draw) = draw {
            self.samples = Some(draw.samples);
            self.sample_log_probs = draw.log_probs;
        }
        self
    }
}

/// Posterior and prior parameters handed to downstream loss computation.
#[derive(Debug, Clone, Default)]
pub struct DistInfo {
    pub q: Option<DistributionParams>,
    pub p: Option<DistributionParams>,
}
