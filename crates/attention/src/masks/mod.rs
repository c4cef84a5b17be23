//! Length masks shared by the deterministic and stochastic paths.
//!
//! Two encodings are produced from the same per-batch valid lengths:
//!
//! * keep masks (`u8`, `1` = valid source position) used with
//!   [`masked_fill`] to overwrite values after a nonlinearity, and
//! * additive masks (`0.0` keep, `-inf` discard) added to scores before a
//!   softmax so padded positions receive exactly zero probability.

pub mod padding;

use candle_core::DType;

/// Dtype shared by all additive masks.
pub const MASK_DTYPE: DType = DType::F32;

/// Dtype shared by all keep masks.
pub const KEEP_DTYPE: DType = DType::U8;

pub use padding::{masked_fill, padding_mask_from_lengths, sequence_mask};
