//! Dirichlet alignments via normalised Gamma draws.
//!
//! A draw `x ~ Dir(alpha)` is `g / sum(g)` with independent
//! `g_i ~ Gamma(alpha_i, 1)`. Two supports are available:
//!
//! * [`DirichletSupport::Full`] samples over every source position, padded
//!   ones included (their concentration is tiny but positive), then zeroes
//!   the padded entries. Rows are left as drawn and are not renormalised.
//! * [`DirichletSupport::Restricted`] samples only over each example's valid
//!   prefix, so every row sums to one, and zero-pads the rest.
//!
//! The Gamma draws themselves come from the host RNG. Samples stay
//! differentiable in `alpha`: each draw carries its implicit
//! reparameterization slope and the simplex normalisation runs as tensor ops.

use candle_core::{DType, Tensor};
use rand::{distributions::Distribution, Rng};
use rand_distr::Gamma;

use super::{gamma::reparam_slope, AlignmentSampler, HostGrid, SampleDraw};
use crate::{
    core::{AttentionError, DirichletSupport},
    masks::sequence_mask,
};

/// Sampler over `[batch, tgt_len, src_len]` concentrations.
#[derive(Debug, Clone, Copy)]
pub struct DirichletSampler<'a> {
    alpha: &'a Tensor,
    support: DirichletSupport,
}

impl<'a> DirichletSampler<'a> {
    pub fn new(alpha: &'a Tensor, support: DirichletSupport) -> Self {
        Self { alpha, support }
    }
}

impl AlignmentSampler for DirichletSampler<'_> {
    fn sample<R: Rng + ?Sized>(
        &self,
        n_samples: usize,
        lengths: Option<&[usize]>,
        rng: &mut R,
    ) -> Result<SampleDraw, AttentionError> {
        let grid = HostGrid::from_tensor("dirichlet alpha", self.alpha)?;
        let lengths = grid.resolve_lengths(lengths)?;
        let (batch, tgt, src) = (grid.batch, grid.tgt, grid.src);

        let cells = n_samples * batch * tgt * src;
        let (mut gammas, mut slopes) = (vec![0f32; cells], vec![0f32; cells]);
        for k in 0..n_samples {
            for (b, &valid) in lengths.iter().enumerate() {
                let span = match self.support {
                    DirichletSupport::Full => src,
                    DirichletSupport::Restricted => valid,
                };
                for t in 0..tgt {
                    let offset = ((k * batch + b) * tgt + t) * src;
                    draw_gammas(
                        &grid.row(b, t)[..span],
                        &mut gammas[offset..offset + span],
                        &mut slopes[offset..offset + span],
                        rng,
                    )?;
                }
            }
        }

        let shape = (n_samples, batch, tgt, src);
        let device = self.alpha.device();
        let alpha = self
            .alpha
            .to_dtype(DType::F32)?
            .unsqueeze(0)?
            .broadcast_as(shape)?;
        // Zero in value; carries dg/dalpha back to alpha.
        let tangent = alpha
            .sub(&alpha.detach())?
            .mul(&Tensor::from_vec(slopes, shape, device)?)?;
        let gammas = Tensor::from_vec(gammas, shape, device)?.add(&tangent)?;
        let mut samples = gammas.broadcast_div(&gammas.sum_keepdim(3)?)?;

        if self.support == DirichletSupport::Full && lengths.iter().any(|&l| l < src) {
            let keep = sequence_mask(device, &lengths, src)?
                .to_dtype(DType::F32)?
                .reshape((1, batch, 1, src))?;
            samples = samples.broadcast_mul(&keep)?;
        }

        Ok(SampleDraw {
            samples: samples.to_dtype(self.alpha.dtype())?,
            log_probs: None,
        })
    }
}

/// Fills `gammas` with `Gamma(alpha_i, 1)` draws and `slopes` with their
/// reparameterization derivatives.
///
/// When every draw underflows (all concentrations tiny) the mass goes to the
/// largest concentration, the limit the distribution approaches, and the row
/// carries no gradient.
fn draw_gammas<R: Rng + ?Sized>(
    alpha: &[f32],
    gammas: &mut [f32],
    slopes: &mut [f32],
    rng: &mut R,
) -> Result<(), AttentionError> {
    for ((&a, g_out), s_out) in alpha.iter().zip(gammas.iter_mut()).zip(slopes.iter_mut()) {
        let shape = f64::from(a);
        let gamma = Gamma::new(shape, 1.0).map_err(|err| {
            AttentionError::invalid(format!("dirichlet concentration {a}: {err}"))
        })?;
        let g = gamma.sample(rng);
        *g_out = g as f32;
        *s_out = reparam_slope(shape, g) as f32;
    }

    let total: f32 = gammas.iter().sum();
    if !(total > 0.0 && total.is_finite()) {
        gammas.fill(0.0);
        slopes.fill(0.0);
        let peak = alpha
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(idx, _)| idx);
        if let Some(idx) = peak {
            gammas[idx] = 1.0;
        }
    }
    Ok(())
}
