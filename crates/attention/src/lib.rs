//! Variational attention for sequence-to-sequence decoders.
//!
//! Given decoder queries and a bank of encoder states, the unit produces:
//!
//! * a deterministic attention distribution (`c_align_vectors`) and the
//!   context vector `h_c` fed to the decoder, and
//! * Monte-Carlo context vectors `h_y` built from alignments sampled from a
//!   posterior (Dirichlet or Categorical), together with the parameters and
//!   sample log-probabilities needed for variational objectives.
//!
//! Variable-length sources are handled through per-batch lengths; padded
//! positions never receive probability mass on either path. Both incremental
//! (one-step) and full-sequence calls are supported, see [`layout`].
//!
//! Sampling takes an injected [`rand::Rng`], so seeded generators give
//! reproducible draws.

pub mod core;
pub mod distributions;
pub mod layout;
pub mod masks;
pub mod score;
pub mod variational;

pub use crate::core::{AttentionError, AttnMode, DistKind, VariationalConfig};
pub use distributions::{sample_attn, AttentionDistribution, DistInfo, DistributionParams};
pub use score::ScoreFunction;
pub use variational::{AttentionOutput, VariationalAttention};
