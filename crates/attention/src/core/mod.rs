//! Configuration and error types shared across the crate.
//!
//! Tensors handed to the unit use a batch-major layout internally:
//! queries `[batch, tgt_len, dim]`, source vectors `[batch, src_len, dim]`,
//! and distribution parameters `[batch, tgt_len, src_len]`. Samples prepend
//! an `n_samples` axis. The public boundary converts to and from the
//! one-step and time-major layouts (see [`crate::layout`]).

pub mod config;
pub mod errors;

pub use config::{
    AttnMode, ConcentrationFn, DirichletSupport, DistKind, ScoreKind, VariationalConfig,
};
pub use errors::AttentionError;
