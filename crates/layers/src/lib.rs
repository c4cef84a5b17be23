//! Building blocks shared by the attention crate.
//!
//! Hosts dense projections, the score and output nonlinearities, and the
//! precision policy that decides which dtype each phase runs in. Everything is
//! assembled from Candle primitives and returns `candle_core::Result` so
//! callers can propagate failures with `?`.

pub mod activations;
pub mod checks;
pub mod dtypes;
pub mod linear;

use thiserror::Error;

pub use activations::{builtin, Activation, ActivationKind};
pub use dtypes::PrecisionPolicy;
pub use linear::{Linear, LinearConfig, LinearLayer};

/// Errors raised while resolving layer components by name.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayerError {
    /// The activation name does not match any built-in kernel.
    #[error("unknown activation '{0}'")]
    UnknownActivation(String),
}
