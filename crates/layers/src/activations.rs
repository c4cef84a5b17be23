//! Elementwise nonlinearities used around attention scores and projections.
//!
//! Activations accept tensors of any shape and return tensors with identical
//! layout. Each implementation promotes inputs to the compute dtype requested
//! by [`PrecisionPolicy`] before evaluating the nonlinearity, then casts the
//! result back to the storage dtype.
//!
//! # Built-in formulas
//!
//! * **Softplus** is evaluated as `relu(x) + log1p(exp(-|x|))`, which never
//!   overflows and maps `-inf` to exactly `0`. `log1p` switches to its
//!   second-order series for tiny arguments, which keeps the result positive
//!   down to about `x = -103` in `f32`; below that `exp` underflows and the
//!   result is `0`.
//! * **Exp** is the plain exponential. It underflows to `0` in the same
//!   range and grows quickly for large scores.
//! * **Tanh** bounds projected context vectors to `(-1, 1)`.
//!
//! Callers that need strictly positive outputs must floor them.

use std::{str::FromStr, sync::Arc};

use candle_core::{Result, Tensor};

use crate::{dtypes::PrecisionPolicy, LayerError};

/// Identifies which nonlinearity is implemented by an [`Activation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationKind {
    /// Smooth positive map `ln(1 + e^x)`.
    Softplus,
    /// Exponential map `e^x`.
    Exp,
    /// Hyperbolic tangent.
    Tanh,
}

impl ActivationKind {
    /// Canonical lower-case name, as accepted by [`FromStr`].
    pub fn name(&self) -> &'static str {
        match self {
            ActivationKind::Softplus => "softplus",
            ActivationKind::Exp => "exp",
            ActivationKind::Tanh => "tanh",
        }
    }
}

impl FromStr for ActivationKind {
    type Err = LayerError;

    fn from_str(name: &str) -> std::result::Result<Self, Self::Err> {
        match name.trim().to_ascii_lowercase().as_str() {
            "softplus" => Ok(ActivationKind::Softplus),
            "exp" => Ok(ActivationKind::Exp),
            "tanh" => Ok(ActivationKind::Tanh),
            other => Err(LayerError::UnknownActivation(other.to_string())),
        }
    }
}

/// Common interface shared by elementwise nonlinearities.
pub trait Activation: Send + Sync {
    /// Returns the [`ActivationKind`] for introspection.
    fn kind(&self) -> ActivationKind;

    /// Applies the activation to `input` using the precision rules in `policy`.
    fn forward(&self, input: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor>;
}

/// Built-in activation backed by Candle kernels.
struct BuiltinActivation {
    kind: ActivationKind,
}

impl Activation for BuiltinActivation {
    fn kind(&self) -> ActivationKind {
        self.kind
    }

    fn forward(&self, input: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor> {
        let compute = policy.cast_for_compute(input)?;
        let output = match self.kind {
            ActivationKind::Softplus => softplus(&compute)?,
            ActivationKind::Exp => compute.exp()?,
            ActivationKind::Tanh => compute.tanh()?,
        };
        policy.cast_to_storage(&output)
    }
}

const LOG1P_SERIES_CUTOFF: f64 = 1e-4;

fn softplus(x: &Tensor) -> Result<Tensor> {
    let u = x.abs()?.neg()?.exp()?;
    let direct = u.affine(1.0, 1.0)?.log()?;
    let series = u.sub(&u.sqr()?.affine(0.5, 0.0)?)?;
    let tail = u.lt(LOG1P_SERIES_CUTOFF)?.where_cond(&series, &direct)?;
    x.relu()?.add(&tail)
}

/// Returns a shared built-in activation implementation.
pub fn builtin(kind: ActivationKind) -> Arc<dyn Activation> {
    Arc::new(BuiltinActivation { kind })
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn softplus_matches_reference_formula() -> Result<()> {
        let device = Device::Cpu;
        let activation = builtin(ActivationKind::Softplus);
        let values = [-30.0f32, -2.5, -0.5, 0.0, 1.0, 3.0, 50.0];
        let input = Tensor::from_slice(&values, (values.len(),), &device)?;
        let policy = PrecisionPolicy::from_parameter_dtype(DType::F32);
        let output = activation.forward(&input, &policy)?.to_vec1::<f32>()?;

        for (x, y) in values.iter().zip(output.iter()) {
            let reference = (1.0f64 + f64::from(*x).exp()).ln() as f32;
            assert!((reference - y).abs() < 1e-5, "softplus({x}) = {y}");
            assert!(*y > 0.0);
        }
        Ok(())
    }

    #[test]
    fn softplus_underflows_to_zero_far_below_zero() -> Result<()> {
        let device = Device::Cpu;
        let input = Tensor::from_slice(&[f32::NEG_INFINITY, -200.0, -80.0], (3,), &device)?;
        let output = builtin(ActivationKind::Softplus)
            .forward(&input, &PrecisionPolicy::default())?
            .to_vec1::<f32>()?;
        assert_eq!(&output[..2], &[0.0, 0.0]);
        assert!(output[2] > 0.0);
        Ok(())
    }

    #[test]
    fn tanh_and_exp_preserve_shape() -> Result<()> {
        let device = Device::Cpu;
        let input = Tensor::randn(0f32, 2.0, (2, 3, 4), &device)?;
        let policy = PrecisionPolicy::default();
        let tanh = builtin(ActivationKind::Tanh).forward(&input, &policy)?;
        let exp = builtin(ActivationKind::Exp).forward(&input, &policy)?;
        assert_eq!(tanh.dims(), &[2, 3, 4]);
        assert_eq!(exp.dims(), &[2, 3, 4]);
        let max_abs = tanh.abs()?.max_all()?.to_vec0::<f32>()?;
        assert!(max_abs < 1.0);
        let min_exp = exp.min_all()?.to_vec0::<f32>()?;
        assert!(min_exp > 0.0);
        Ok(())
    }

    #[test]
    fn names_round_trip_through_from_str() {
        for kind in [ActivationKind::Softplus, ActivationKind::Exp, ActivationKind::Tanh] {
            assert_eq!(kind.name().parse::<ActivationKind>(), Ok(kind));
        }
        assert_eq!(
            "gelu".parse::<ActivationKind>(),
            Err(LayerError::UnknownActivation("gelu".into()))
        );
    }
}
